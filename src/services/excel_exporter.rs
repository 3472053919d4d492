//! Excel 导出
//!
//! 把测试用例（以及可选的评审结果）写成 xlsx 文件。xlsx 本身是一个 zip 包，
//! 这里直接写出最小的 SpreadsheetML 部件：工作簿、样式表和一到两个工作表。

use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use quick_xml::escape::escape;
use tracing::{error, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{AppError, AppResult, ExportError};
use crate::models::{ReviewResult, TestCase};

/// 下载接口的路径前缀
pub const DOWNLOAD_ROUTE: &str = "/api/download";

const CASE_SHEET: &str = "测试用例";
const REVIEW_SHEET: &str = "评审结果";
const CASE_HEADERS: [&str; 7] = [
    "用例ID",
    "测试类型",
    "用例描述",
    "前置条件",
    "测试步骤",
    "预期结果",
    "优先级",
];
const CASE_WIDTHS: [f64; 7] = [12.0, 12.0, 30.0, 20.0, 40.0, 30.0, 10.0];
const REVIEW_WIDTHS: [f64; 3] = [15.0, 10.0, 50.0];

// styles.xml 中 cellXfs 的下标
const STYLE_HEADER: u32 = 1;
const STYLE_BODY: u32 = 2;
const STYLE_CENTER: u32 = 3;
const STYLE_WRAP: u32 = 4;
const STYLE_BOLD: u32 = 5;

/// 导出结果
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub filename: String,
    pub download_url: String,
}

/// 测试用例导出能力，编排层只依赖这个 trait
pub trait TestCaseExporter: Send + Sync {
    fn export(&self, cases: &[TestCase], review: Option<&ReviewResult>) -> AppResult<ExportedFile>;
}

/// 写入本地目录的 Excel 导出器
#[derive(Debug, Clone)]
pub struct ExcelExporter {
    output_dir: PathBuf,
}

impl ExcelExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn next_filename() -> String {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("testcases_{}_{}.xlsx", timestamp, &suffix[..8])
    }
}

impl TestCaseExporter for ExcelExporter {
    fn export(&self, cases: &[TestCase], review: Option<&ReviewResult>) -> AppResult<ExportedFile> {
        if cases.is_empty() {
            return Err(ExportError::EmptyTestCases.into());
        }

        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| AppError::file_write_failed(self.output_dir.display().to_string(), e))?;

        let filename = Self::next_filename();
        let path = self.output_dir.join(&filename);
        let file = File::create(&path)
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;

        if let Err(source) = write_workbook(file, cases, review) {
            error!("生成Excel文件失败: {}", source);
            let _ = std::fs::remove_file(&path);
            return Err(ExportError::ArchiveFailed {
                path: path.display().to_string(),
                source,
            }
            .into());
        }

        info!(
            "成功生成Excel文件: {}，包含 {} 个测试用例",
            path.display(),
            cases.len()
        );

        Ok(ExportedFile {
            download_url: format!("{}/{}", DOWNLOAD_ROUTE, filename),
            path,
            filename,
        })
    }
}

/// 把工作簿写入任意可定位的输出
pub fn write_workbook<W: Write + Seek>(
    writer: W,
    cases: &[TestCase],
    review: Option<&ReviewResult>,
) -> zip::result::ZipResult<W> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, body) in workbook_parts(cases, review) {
        zip.start_file(name, options)?;
        zip.write_all(body.as_bytes())?;
    }
    zip.finish()
}

/// 组成 xlsx 的全部部件：(包内路径, XML 内容)
pub fn workbook_parts(cases: &[TestCase], review: Option<&ReviewResult>) -> Vec<(String, String)> {
    let mut sheets = vec![(CASE_SHEET, case_sheet(cases))];
    if let Some(review) = review {
        sheets.push((REVIEW_SHEET, review_sheet(review)));
    }

    let mut parts = vec![
        ("[Content_Types].xml".to_string(), content_types(sheets.len())),
        ("_rels/.rels".to_string(), ROOT_RELS.to_string()),
        ("xl/workbook.xml".to_string(), workbook(&sheets)),
        (
            "xl/_rels/workbook.xml.rels".to_string(),
            workbook_rels(sheets.len()),
        ),
        ("xl/styles.xml".to_string(), STYLES.to_string()),
    ];
    for (index, (_, xml)) in sheets.into_iter().enumerate() {
        parts.push((format!("xl/worksheets/sheet{}.xml", index + 1), xml));
    }
    parts
}

fn case_sheet(cases: &[TestCase]) -> String {
    let mut sheet = SheetBuilder::new(&CASE_WIDTHS);
    sheet.row(
        Some(30.0),
        CASE_HEADERS.iter().map(|h| Cell::text(*h, STYLE_HEADER)).collect(),
    );
    for case in cases {
        sheet.row(
            Some(60.0),
            vec![
                Cell::text(&case.id, STYLE_BODY),
                Cell::text(&case.case_type, STYLE_BODY),
                Cell::text(&case.description, STYLE_BODY),
                Cell::text(case.preconditions.as_deref().unwrap_or_default(), STYLE_BODY),
                Cell::text(case.numbered_steps(), STYLE_BODY),
                Cell::text(&case.expected_result, STYLE_BODY),
                Cell::text(&case.priority, STYLE_BODY),
            ],
        );
    }
    sheet.finish()
}

fn review_sheet(review: &ReviewResult) -> String {
    let mut sheet = SheetBuilder::new(&REVIEW_WIDTHS);
    sheet.row(
        None,
        ["评审项", "得分", "说明"]
            .iter()
            .map(|h| Cell::text(*h, STYLE_HEADER))
            .collect(),
    );

    let scores = [
        ("覆盖率", review.coverage_score),
        ("可执行性", review.executability_score),
        ("无歧义性", review.clarity_score),
        ("总分", round2(review.score)),
    ];
    for (label, score) in scores {
        sheet.row(
            None,
            vec![
                Cell::text(label, STYLE_CENTER),
                Cell::Number(score, STYLE_CENTER),
                Cell::text("", STYLE_CENTER),
            ],
        );
    }
    sheet.row(
        None,
        vec![
            Cell::text("是否通过", STYLE_CENTER),
            Cell::text(if review.is_passed { "是" } else { "否" }, STYLE_CENTER),
            Cell::text("", STYLE_CENTER),
        ],
    );

    if !review.suggestions.is_empty() {
        sheet.row(None, vec![Cell::text("优化建议", STYLE_BOLD)]);
        for (index, suggestion) in review.suggestions.iter().enumerate() {
            sheet.row(
                None,
                vec![Cell::text(format!("{}. {}", index + 1, suggestion), STYLE_WRAP)],
            );
        }
    }
    sheet.finish()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

enum Cell {
    Text(String, u32),
    Number(f64, u32),
}

impl Cell {
    fn text(value: impl Into<String>, style: u32) -> Self {
        Cell::Text(value.into(), style)
    }
}

/// 逐行拼接 worksheet XML
struct SheetBuilder {
    cols: String,
    rows: String,
    next_row: usize,
}

impl SheetBuilder {
    fn new(widths: &[f64]) -> Self {
        let cols = widths
            .iter()
            .enumerate()
            .map(|(i, w)| {
                format!(
                    r#"<col min="{0}" max="{0}" width="{1}" customWidth="1"/>"#,
                    i + 1,
                    w
                )
            })
            .collect();
        Self {
            cols,
            rows: String::new(),
            next_row: 1,
        }
    }

    fn row(&mut self, height: Option<f64>, cells: Vec<Cell>) {
        let r = self.next_row;
        self.next_row += 1;

        let height = height
            .map(|h| format!(r#" ht="{}" customHeight="1""#, h))
            .unwrap_or_default();
        self.rows.push_str(&format!(r#"<row r="{}"{}>"#, r, height));

        for (index, cell) in cells.into_iter().enumerate() {
            let reference = format!("{}{}", column_letter(index), r);
            match cell {
                Cell::Text(value, style) if value.is_empty() => {
                    self.rows
                        .push_str(&format!(r#"<c r="{}" s="{}"/>"#, reference, style));
                }
                Cell::Text(value, style) => {
                    self.rows.push_str(&format!(
                        r#"<c r="{}" s="{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                        reference,
                        style,
                        escape(&sanitize(&value))
                    ));
                }
                Cell::Number(value, style) => {
                    self.rows.push_str(&format!(
                        r#"<c r="{}" s="{}"><v>{}</v></c>"#,
                        reference, style, value
                    ));
                }
            }
        }
        self.rows.push_str("</row>");
    }

    fn finish(self) -> String {
        format!(
            r#"{}<worksheet xmlns="{}"><cols>{}</cols><sheetData>{}</sheetData></worksheet>"#,
            XML_DECL, MAIN_NS, self.cols, self.rows
        )
    }
}

fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Excel 单元格最多容纳的字符数（按 UTF-16 计）
const MAX_CELL_CHARS: usize = 32767;

/// 去掉 XML 1.0 不允许的字符，并截断到单元格上限
fn sanitize(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut units = 0;
    for c in text.chars().filter(|&c| is_xml_char(c)) {
        units += c.len_utf16();
        if units > MAX_CELL_CHARS {
            break;
        }
        result.push(c);
    }
    result
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const STYLES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    r#"<fonts count="3">"#,
    r#"<font><sz val="11"/><name val="Calibri"/></font>"#,
    r#"<font><b/><sz val="11"/><color rgb="FFFFFFFF"/><name val="Calibri"/></font>"#,
    r#"<font><b/><sz val="11"/><name val="Calibri"/></font>"#,
    r#"</fonts>"#,
    r#"<fills count="3">"#,
    r#"<fill><patternFill patternType="none"/></fill>"#,
    r#"<fill><patternFill patternType="gray125"/></fill>"#,
    r#"<fill><patternFill patternType="solid"><fgColor rgb="FF366092"/><bgColor indexed="64"/></patternFill></fill>"#,
    r#"</fills>"#,
    r#"<borders count="2">"#,
    r#"<border><left/><right/><top/><bottom/><diagonal/></border>"#,
    r#"<border><left style="thin"><color indexed="64"/></left><right style="thin"><color indexed="64"/></right>"#,
    r#"<top style="thin"><color indexed="64"/></top><bottom style="thin"><color indexed="64"/></bottom><diagonal/></border>"#,
    r#"</borders>"#,
    r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    r#"<cellXfs count="6">"#,
    r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#,
    r#"<xf numFmtId="0" fontId="1" fillId="2" borderId="1" xfId="0" applyFont="1" applyFill="1" applyBorder="1" applyAlignment="1"><alignment horizontal="center" vertical="center" wrapText="1"/></xf>"#,
    r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="1" xfId="0" applyBorder="1" applyAlignment="1"><alignment vertical="top" wrapText="1"/></xf>"#,
    r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="1" xfId="0" applyBorder="1" applyAlignment="1"><alignment horizontal="center" vertical="center"/></xf>"#,
    r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0" applyAlignment="1"><alignment wrapText="1"/></xf>"#,
    r#"<xf numFmtId="0" fontId="2" fillId="0" borderId="0" xfId="0" applyFont="1"/>"#,
    r#"</cellXfs>"#,
    r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
    r#"</styleSheet>"#,
);

fn content_types(sheet_count: usize) -> String {
    let sheets: String = (1..=sheet_count)
        .map(|i| {
            format!(
                r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
                i
            )
        })
        .collect();
    format!(
        concat!(
            "{}",
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
            r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
            r#"<Default Extension="xml" ContentType="application/xml"/>"#,
            r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
            "{}",
            r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
            "</Types>"
        ),
        XML_DECL, sheets
    )
}

fn workbook(sheets: &[(&str, String)]) -> String {
    let entries: String = sheets
        .iter()
        .enumerate()
        .map(|(i, (name, _))| {
            format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                escape(*name),
                i + 1,
                i + 1
            )
        })
        .collect();
    format!(
        r#"{}<workbook xmlns="{}" xmlns:r="{}"><sheets>{}</sheets></workbook>"#,
        XML_DECL, MAIN_NS, REL_NS, entries
    )
}

fn workbook_rels(sheet_count: usize) -> String {
    let mut rels: String = (1..=sheet_count)
        .map(|i| {
            format!(
                r#"<Relationship Id="rId{0}" Type="{1}/worksheet" Target="worksheets/sheet{0}.xml"/>"#,
                i, REL_NS
            )
        })
        .collect();
    rels.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="{}/styles" Target="styles.xml"/>"#,
        sheet_count + 1,
        REL_NS
    ));
    format!(
        r#"{}<Relationships xmlns="{}">{}</Relationships>"#,
        XML_DECL, PKG_REL_NS, rels
    )
}
