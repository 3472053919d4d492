//! 业务能力层
//!
//! 每个服务只负责一项能力，不关心流程顺序。

pub mod attachment;
pub mod excel_exporter;
pub mod report;
pub mod sql_tools;
pub mod word_parser;

pub use attachment::merge_attachments;
pub use excel_exporter::{ExcelExporter, ExportedFile, TestCaseExporter, DOWNLOAD_ROUTE};
pub use report::render_markdown;
pub use sql_tools::{validate_select, SqlDatabase};
pub use word_parser::{parse_word_document, WordContent};
