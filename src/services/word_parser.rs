//! Word 文档解析
//!
//! 直接读取 docx 压缩包中的 `word/document.xml`，提取正文段落和表格文本，
//! 供生成 Agent 作为需求输入。

use std::io::{Cursor, Read};
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, info};

use crate::error::{AppError, AppResult, DocumentError, FileError};

/// 从 docx 中提取的文本
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WordContent {
    /// 正文中的非空段落（不含表格内段落）
    pub paragraphs: Vec<String>,
    /// 每个表格一项，行内单元格以 ` | ` 连接，行之间换行
    pub tables: Vec<String>,
}

impl WordContent {
    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty() && self.tables.is_empty()
    }

    /// 段落在前、表格在后的完整文本
    pub fn body(&self) -> String {
        let mut parts = Vec::new();
        if !self.paragraphs.is_empty() {
            parts.push(self.paragraphs.join("\n"));
        }
        if !self.tables.is_empty() {
            parts.push(format!("\n\n表格内容：\n{}", self.tables.join("\n\n")));
        }
        parts.join("\n\n")
    }
}

/// `parse_word_document` 工具的实现：优先使用 base64 数据，否则读取文件路径
pub fn parse_word_document(file_path: Option<&str>, base64_data: Option<&str>) -> AppResult<String> {
    let base64_data = base64_data.map(str::trim).filter(|d| !d.is_empty());
    let file_path = file_path.map(str::trim).filter(|p| !p.is_empty());

    let (content, source) = match (base64_data, file_path) {
        (Some(data), _) => (parse_base64(data)?, "base64数据".to_string()),
        (None, Some(path)) => (parse_path(Path::new(path))?, path.to_string()),
        (None, None) => return Err(DocumentError::MissingInput.into()),
    };

    info!(
        "成功解析Word文档: {}，提取了 {} 个段落和 {} 个表格",
        source,
        content.paragraphs.len(),
        content.tables.len()
    );

    let body = if content.is_empty() {
        "文档为空".to_string()
    } else {
        content.body()
    };
    Ok(format!("Word文档内容提取成功：\n\n{}", body))
}

/// 解析磁盘上的 Word 文档，仅接受 .docx / .doc 扩展名
pub fn parse_path(path: &Path) -> AppResult<WordContent> {
    if !path.exists() {
        return Err(FileError::NotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if extension != "docx" && extension != "doc" {
        return Err(DocumentError::UnsupportedFormat {
            extension: if extension.is_empty() {
                String::new()
            } else {
                format!(".{}", extension)
            },
        }
        .into());
    }

    let bytes =
        std::fs::read(path).map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
    Ok(parse_docx_bytes(&bytes)?)
}

/// 解析 base64 编码的 docx 数据
pub fn parse_base64(data: &str) -> Result<WordContent, DocumentError> {
    let bytes = general_purpose::STANDARD.decode(data.trim())?;
    parse_docx_bytes(&bytes)
}

/// 解析内存中的 docx 数据
pub fn parse_docx_bytes(bytes: &[u8]) -> Result<WordContent, DocumentError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let mut xml = String::new();
    archive.by_name("word/document.xml")?.read_to_string(&mut xml)?;
    debug!("document.xml 长度: {} 字节", xml.len());

    extract_document_xml(&xml)
}

fn extract_document_xml(xml: &str) -> Result<WordContent, DocumentError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut content = WordContent::default();
    let mut paragraph = String::new();
    let mut in_text = false;

    // 嵌套表格的内容归入最外层表格的当前单元格
    let mut table_depth = 0usize;
    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        rows.clear();
                    }
                }
                b"tr" if table_depth == 1 => row.clear(),
                b"tc" if table_depth == 1 => cell.clear(),
                b"p" => paragraph.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" | b"cr" => paragraph.push('\n'),
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if table_depth == 0 {
                        let text = paragraph.trim();
                        if !text.is_empty() {
                            content.paragraphs.push(text.to_string());
                        }
                    } else {
                        cell.push(std::mem::take(&mut paragraph));
                    }
                }
                b"tc" if table_depth == 1 => row.push(cell.join("\n").trim().to_string()),
                b"tr" if table_depth == 1 => {
                    if row.iter().any(|c| !c.is_empty()) {
                        rows.push(row.join(" | "));
                    }
                }
                b"tbl" => {
                    if table_depth == 1 && !rows.is_empty() {
                        content.tables.push(rows.join("\n"));
                    }
                    table_depth = table_depth.saturating_sub(1);
                }
                _ => {}
            },
            Event::Text(e) if in_text => {
                if let Ok(text) = e.unescape() {
                    paragraph.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(content)
}
