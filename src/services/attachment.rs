//! 附件转文本
//!
//! DeepSeek 等模型不支持多模态输入，用户消息上附带的文件在进入 Agent 前
//! 统一转换为纯文本：Word 文档解析为正文，PDF / 图片给出提示，其他文件仅列出名称。

use tracing::{error, info};

use super::word_parser;
use crate::models::Attachment;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const DOC_MIME: &str = "application/msword";

#[derive(Debug, PartialEq, Eq)]
enum AttachmentKind {
    Word,
    Pdf,
    Image,
    Other,
}

fn classify(attachment: &Attachment) -> AttachmentKind {
    let mime = attachment.mime_type.to_ascii_lowercase();
    let name = attachment.filename.to_ascii_lowercase();

    if mime == DOCX_MIME || mime == DOC_MIME || name.ends_with(".docx") || name.ends_with(".doc") {
        AttachmentKind::Word
    } else if mime == "application/pdf" || name.ends_with(".pdf") {
        AttachmentKind::Pdf
    } else if mime.starts_with("image/") {
        AttachmentKind::Image
    } else {
        AttachmentKind::Other
    }
}

/// 把附件内容合并进用户消息文本
pub fn merge_attachments(content: &str, attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        return content.to_string();
    }

    let mut text_parts = vec![content.to_string()];
    let mut other_files = Vec::new();

    for attachment in attachments {
        let filename = &attachment.filename;
        match classify(attachment) {
            AttachmentKind::Word => match word_parser::parse_base64(&attachment.data) {
                Ok(word) => {
                    info!("成功解析Word文档: {}", filename);
                    text_parts.push(format!(
                        "\n\n[Word文档内容 - {}]\n{}\n",
                        filename,
                        word.body()
                    ));
                }
                Err(e) => {
                    error!("解析Word文档失败: {}", e);
                    text_parts.push(format!(
                        "\n\n[错误：无法解析Word文档 {}: 解析Word文档失败: {}]\n",
                        filename, e
                    ));
                }
            },
            AttachmentKind::Pdf => text_parts.push(format!(
                "\n\n[提示：检测到PDF文件 {}，请提供文本内容或使用支持PDF的LLM]\n",
                filename
            )),
            AttachmentKind::Image => text_parts.push(format!(
                "\n\n[提示：检测到图片文件 {}，请提供图片的文字描述]\n",
                filename
            )),
            AttachmentKind::Other => {
                other_files.push(format!("文件: {} (类型: {})", filename, attachment.mime_type))
            }
        }
    }

    if !other_files.is_empty() {
        text_parts.push(format!("\n[上传的文件: {}]\n", other_files.join(", ")));
    }

    text_parts.join("\n")
}
