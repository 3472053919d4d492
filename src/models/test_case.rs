use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单个测试用例
///
/// 字段名与提示词中约定的 JSON 格式保持一致（`test_case_id` 等），
/// 同时接受 `id` / `type` / `description` / `steps` 这样的简写。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(rename = "test_case_id", alias = "id", default)]
    pub id: String,

    #[serde(rename = "test_type", alias = "type", default)]
    pub case_type: String,

    #[serde(rename = "test_description", alias = "description", default)]
    pub description: String,

    #[serde(
        rename = "test_steps",
        alias = "steps",
        default,
        deserialize_with = "deserialize_steps"
    )]
    pub steps: Vec<String>,

    #[serde(default)]
    pub expected_result: String,

    #[serde(default)]
    pub priority: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preconditions: Option<String>,
}

impl TestCase {
    /// 把 `save_test_cases` 收到的 JSON 转成测试用例列表
    ///
    /// 单个对象视为只有一个元素的列表；参数既可以是 JSON 字符串，也可以是已解析的值。
    pub fn list_from_value(value: Value) -> Result<Vec<TestCase>, serde_json::Error> {
        match value {
            Value::String(raw) => Self::list_from_value(serde_json::from_str(&raw)?),
            Value::Array(items) => items.into_iter().map(serde_json::from_value).collect(),
            other => Ok(vec![serde_json::from_value(other)?]),
        }
    }

    /// 按 "1. xxx" 的格式拼接步骤（Excel / Markdown 共用）
    pub fn numbered_steps(&self) -> String {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// 步骤既可能是字符串数组，也可能是一整段多行文本
fn deserialize_steps<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{SeqAccess, Visitor};
    use std::fmt;

    struct StepsVisitor;

    impl<'de> Visitor<'de> for StepsVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a list of steps or a multi-line string")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Vec::new())
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Vec::new())
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut steps = Vec::new();
            while let Some(item) = seq.next_element::<Value>()? {
                match item {
                    Value::String(s) => steps.push(s),
                    Value::Null => {}
                    other => steps.push(other.to_string()),
                }
            }
            Ok(steps)
        }
    }

    deserializer.deserialize_any(StepsVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_prompt_format() {
        let value = json!({
            "test_case_id": "TC_001",
            "test_type": "功能测试",
            "test_description": "正常登录场景",
            "test_steps": ["步骤1: 打开登录页面", "步骤2: 输入正确的用户名和密码"],
            "expected_result": "登录成功",
            "priority": "高",
            "preconditions": "用户已注册"
        });
        let case: TestCase = serde_json::from_value(value).unwrap();
        assert_eq!(case.id, "TC_001");
        assert_eq!(case.case_type, "功能测试");
        assert_eq!(case.steps.len(), 2);
        assert_eq!(case.preconditions.as_deref(), Some("用户已注册"));
    }

    #[test]
    fn test_steps_from_multiline_string() {
        let value = json!({"id": "TC_002", "steps": "打开页面\n\n点击登录\n"});
        let case: TestCase = serde_json::from_value(value).unwrap();
        assert_eq!(case.steps, vec!["打开页面", "点击登录"]);
        assert_eq!(case.numbered_steps(), "1. 打开页面\n2. 点击登录");
    }

    #[test]
    fn test_single_object_becomes_list() {
        let cases = TestCase::list_from_value(json!({"test_case_id": "TC_001"})).unwrap();
        assert_eq!(cases.len(), 1);
    }

    #[test]
    fn test_list_from_json_string() {
        let raw = r#"[{"test_case_id": "TC_001"}, {"test_case_id": "TC_002"}]"#;
        let cases = TestCase::list_from_value(Value::String(raw.to_string())).unwrap();
        assert_eq!(cases[1].id, "TC_002");
    }

    #[test]
    fn test_invalid_json_string_is_error() {
        assert!(TestCase::list_from_value(Value::String("not json".to_string())).is_err());
    }

    #[test]
    fn test_serialize_uses_prompt_names() {
        let case = TestCase {
            id: "TC_001".to_string(),
            case_type: "边界测试".to_string(),
            description: String::new(),
            steps: vec![],
            expected_result: String::new(),
            priority: "中".to_string(),
            preconditions: None,
        };
        let value = serde_json::to_value(&case).unwrap();
        assert_eq!(value["test_case_id"], "TC_001");
        assert_eq!(value["test_type"], "边界测试");
        assert!(value.get("preconditions").is_none());
    }
}
