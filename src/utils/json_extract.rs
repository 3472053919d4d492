//! 从 LLM 的自由文本中提取 JSON
//!
//! Agent 没有通过工具保存结果时，用它从最终回复里兜底取出测试用例 / 评审结果。

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("fence regex is valid")
    })
}

/// 提取文本中的 JSON 数组
///
/// 优先使用 ```json 代码块（取最后一个能解析为数组的），
/// 否则取第一个 `[` 到最后一个 `]` 之间的内容。
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    extract(text, '[', ']').and_then(|v| match v {
        Value::Array(items) => Some(items),
        _ => None,
    })
}

/// 提取文本中的 JSON 对象
pub fn extract_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    extract(text, '{', '}').and_then(|v| match v {
        Value::Object(map) => Some(map),
        _ => None,
    })
}

fn extract(text: &str, open: char, close: char) -> Option<Value> {
    let fenced = fence_regex()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .filter_map(|m| serde_json::from_str::<Value>(m.as_str().trim()).ok())
        .filter(|v| matches_kind(v, open))
        .last();
    if fenced.is_some() {
        return fenced;
    }

    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end])
        .ok()
        .filter(|v| matches_kind(v, open))
}

fn matches_kind(value: &Value, open: char) -> bool {
    match open {
        '[' => value.is_array(),
        _ => value.is_object(),
    }
}
