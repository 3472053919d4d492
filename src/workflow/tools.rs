//! Agent 可调用的工具
//!
//! 每组工具是一个 [`ToolHost`]：对外给出工具定义，对内按名字分发调用。
//! 工具失败不会中断 Agent 循环，错误以文本形式返回给 LLM。

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::clients::ToolSpec;
use crate::error::{AppError, SqlError};
use crate::models::{ReviewResult, TestCase, ToolCall};
use crate::services::{parse_word_document, SqlDatabase};
use crate::workflow::state::IterationState;

pub const SAVE_TEST_CASES: &str = "save_test_cases";
pub const PARSE_WORD_DOCUMENT: &str = "parse_word_document";
pub const GET_TEST_CASES: &str = "get_test_cases";
pub const SAVE_REVIEW_RESULT: &str = "save_review_result";

/// 一组工具
#[async_trait]
pub trait ToolHost: Send {
    /// 提供给 LLM 的工具定义
    fn specs(&self) -> Vec<ToolSpec>;

    /// 执行一次工具调用，返回交给 LLM 的文本
    async fn call(&mut self, call: &ToolCall) -> String;
}

/// 不提供任何工具
pub struct NoTools;

#[async_trait]
impl ToolHost for NoTools {
    fn specs(&self) -> Vec<ToolSpec> {
        Vec::new()
    }

    async fn call(&mut self, call: &ToolCall) -> String {
        unknown_tool(&call.name)
    }
}

fn unknown_tool(name: &str) -> String {
    warn!("⚠️ LLM 调用了未知工具: {}", name);
    format!("错误: 未知的工具 {}", name)
}

/// 取出工具参数
///
/// 参数不是 JSON 对象时（LLM 直接给了字符串或数组），整体视为唯一参数。
fn arg<'a>(call: &'a ToolCall, key: &str) -> Option<&'a Value> {
    match &call.args {
        Value::Object(map) => map.get(key).filter(|v| !v.is_null()),
        Value::Null => None,
        other => Some(other),
    }
}

fn str_arg<'a>(call: &'a ToolCall, key: &str) -> Option<&'a str> {
    arg(call, key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn string_param(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

// ========== 测试用例生成 ==========

/// 生成 Agent 的工具：保存测试用例、解析 Word 文档
pub struct GenerationTools<'a> {
    state: &'a mut IterationState,
}

impl<'a> GenerationTools<'a> {
    pub fn new(state: &'a mut IterationState) -> Self {
        Self { state }
    }

    fn save_test_cases(&mut self, call: &ToolCall) -> String {
        let Some(value) = arg(call, "test_cases_json") else {
            return "保存失败: 缺少参数 test_cases_json".to_string();
        };
        match TestCase::list_from_value(value.clone()) {
            Ok(cases) => {
                let count = cases.len();
                self.state.test_cases = cases;
                info!("💾 保存测试用例编写结果: {} 个测试用例", count);
                format!("测试用例编写结果已保存: {} 个测试用例", count)
            }
            Err(e) => format!("保存失败: {}", e),
        }
    }

    async fn parse_word_document(&self, call: &ToolCall) -> String {
        let file_path = str_arg(call, "file_path").map(str::to_string);
        let base64_data = str_arg(call, "base64_data").map(str::to_string);

        let parsed = tokio::task::spawn_blocking(move || {
            parse_word_document(file_path.as_deref(), base64_data.as_deref())
        })
        .await;

        match parsed {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => format!("错误：{}", e.detail()),
            Err(e) => format!("解析Word文档失败: {}", e),
        }
    }
}

#[async_trait]
impl<'a> ToolHost for GenerationTools<'a> {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new(
                SAVE_TEST_CASES,
                "保存测试用例编写结果",
                json!({
                    "type": "object",
                    "properties": {
                        "test_cases_json": string_param("JSON格式的测试用例列表")
                    },
                    "required": ["test_cases_json"]
                }),
            ),
            ToolSpec::new(
                PARSE_WORD_DOCUMENT,
                "解析Word文档，提取文本内容。支持文件路径或base64编码的文件数据",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": string_param("Word文档路径（.docx 或 .doc）"),
                        "base64_data": string_param("base64编码的Word文档数据，优先于 file_path")
                    }
                }),
            ),
        ]
    }

    async fn call(&mut self, call: &ToolCall) -> String {
        match call.name.as_str() {
            SAVE_TEST_CASES => self.save_test_cases(call),
            PARSE_WORD_DOCUMENT => self.parse_word_document(call).await,
            other => unknown_tool(other),
        }
    }
}

// ========== 测试用例评审 ==========

/// 评审 Agent 的工具：读取测试用例、保存评审结果
pub struct ReviewTools<'a> {
    state: &'a mut IterationState,
    threshold: f64,
}

impl<'a> ReviewTools<'a> {
    pub fn new(state: &'a mut IterationState, threshold: f64) -> Self {
        Self { state, threshold }
    }

    fn get_test_cases(&self) -> String {
        serde_json::to_string(&self.state.test_cases).unwrap_or_else(|e| format!("错误: {}", e))
    }

    fn save_review_result(&mut self, call: &ToolCall) -> String {
        let Some(value) = arg(call, "review_result_json") else {
            return "保存失败: 缺少参数 review_result_json".to_string();
        };
        match ReviewResult::from_value(value.clone(), self.threshold) {
            Ok(review) => {
                let message = format!("评审结果已保存: 得分 {:.1}/100", review.score);
                info!(
                    "💾 保存评审结果: 得分 {:.1}/100 ({})",
                    review.score,
                    if review.is_passed { "通过" } else { "不通过" }
                );
                self.state.review_result = Some(review);
                message
            }
            Err(e) => format!("保存失败: {}", e),
        }
    }
}

#[async_trait]
impl<'a> ToolHost for ReviewTools<'a> {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new(
                GET_TEST_CASES,
                "获取已保存的测试用例编写结果（JSON格式的测试用例列表）",
                json!({ "type": "object", "properties": {} }),
            ),
            ToolSpec::new(
                SAVE_REVIEW_RESULT,
                "保存评审结果",
                json!({
                    "type": "object",
                    "properties": {
                        "review_result_json": string_param("JSON格式的评审结果")
                    },
                    "required": ["review_result_json"]
                }),
            ),
        ]
    }

    async fn call(&mut self, call: &ToolCall) -> String {
        match call.name.as_str() {
            GET_TEST_CASES => self.get_test_cases(),
            SAVE_REVIEW_RESULT => self.save_review_result(call),
            other => unknown_tool(other),
        }
    }
}

// ========== SQL 助手 ==========

/// SQL 助手的只读数据库工具
pub struct SqlTools<'a> {
    db: &'a SqlDatabase,
}

impl<'a> SqlTools<'a> {
    pub fn new(db: &'a SqlDatabase) -> Self {
        Self { db }
    }

    async fn table_schema(&self, call: &ToolCall) -> String {
        let tables: Vec<String> = match arg(call, "table_names") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(raw)) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        if tables.is_empty() {
            return "错误: 没有传入表名".to_string();
        }
        sql_output(self.db.table_schema(&tables).await)
    }
}

fn sql_output(result: Result<String, SqlError>) -> String {
    match result {
        Ok(text) => text,
        Err(SqlError::Database(e)) => format!("SQL语句执行失败，错误信息: {}", e),
        Err(e) => format!("错误: {}", AppError::from(e).detail()),
    }
}

#[async_trait]
impl<'a> ToolHost for SqlTools<'a> {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new(
                "sql_table_list",
                "获取数据库中的所有表名",
                json!({ "type": "object", "properties": {} }),
            ),
            ToolSpec::new(
                "sql_table_schema",
                "获取数据库中的所有表架构",
                json!({
                    "type": "object",
                    "properties": {
                        "table_names": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "表名列表"
                        }
                    },
                    "required": ["table_names"]
                }),
            ),
            ToolSpec::new(
                "sql_db_query",
                "执行SELECT SQL查询语句并返回结果",
                json!({
                    "type": "object",
                    "properties": { "sql": string_param("要执行的SQL语句") },
                    "required": ["sql"]
                }),
            ),
            ToolSpec::new(
                "sql_db_query_checker",
                "检查SQL语句是否是正确,提供验证反馈，输入应为要检查的SQL语句",
                json!({
                    "type": "object",
                    "properties": { "sql": string_param("要检查的SQL语句") },
                    "required": ["sql"]
                }),
            ),
        ]
    }

    async fn call(&mut self, call: &ToolCall) -> String {
        match call.name.as_str() {
            "sql_table_list" => sql_output(self.db.table_list().await),
            "sql_table_schema" => self.table_schema(call).await,
            "sql_db_query" | "sql_db_query_checker" => {
                let Some(sql) = str_arg(call, "sql") else {
                    return "错误: 没有传入SQL语句".to_string();
                };
                if call.name == "sql_db_query" {
                    sql_output(self.db.query(sql).await)
                } else {
                    sql_output(self.db.check(sql).await)
                }
            }
            other => unknown_tool(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            args,
        }
    }

    const CASES: &str = r#"[{"test_case_id":"TC_001","test_type":"功能测试","test_description":"正常登录","test_steps":["打开登录页"],"expected_result":"登录成功","priority":"高"}]"#;

    #[tokio::test]
    async fn test_save_and_get_test_cases() {
        let mut state = IterationState::new("登录", 3);

        let reply = GenerationTools::new(&mut state)
            .call(&call(SAVE_TEST_CASES, json!({ "test_cases_json": CASES })))
            .await;
        assert_eq!(reply, "测试用例编写结果已保存: 1 个测试用例");
        assert_eq!(state.test_cases[0].id, "TC_001");

        let reply = ReviewTools::new(&mut state, 90.0)
            .call(&call(GET_TEST_CASES, json!({})))
            .await;
        let value: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value[0]["test_case_id"], "TC_001");
    }

    #[tokio::test]
    async fn test_save_single_object_and_bad_json() {
        let mut state = IterationState::new("登录", 3);
        let mut tools = GenerationTools::new(&mut state);

        let reply = tools
            .call(&call(
                SAVE_TEST_CASES,
                json!({ "test_cases_json": { "test_case_id": "TC_009" } }),
            ))
            .await;
        assert_eq!(reply, "测试用例编写结果已保存: 1 个测试用例");

        let reply = tools
            .call(&call(SAVE_TEST_CASES, json!({ "test_cases_json": "[{" })))
            .await;
        assert!(reply.starts_with("保存失败: "));

        let reply = tools.call(&call(SAVE_TEST_CASES, json!({}))).await;
        assert!(reply.starts_with("保存失败: "));
        assert_eq!(state.test_cases[0].id, "TC_009");
    }

    #[tokio::test]
    async fn test_save_review_recomputes_score() {
        let mut state = IterationState::new("登录", 3);
        let review = r#"{"score": 99, "coverage_score": 80, "executability_score": 90, "clarity_score": 100, "suggestions": ["补充异常场景"], "is_passed": true}"#;

        let reply = ReviewTools::new(&mut state, 95.0)
            .call(&call(SAVE_REVIEW_RESULT, json!({ "review_result_json": review })))
            .await;
        assert_eq!(reply, "评审结果已保存: 得分 90.0/100");

        let saved = state.review_result.unwrap();
        assert_eq!(saved.score, 90.0);
        assert!(!saved.is_passed);
        assert_eq!(saved.suggestions, vec!["补充异常场景".to_string()]);
    }

    #[tokio::test]
    async fn test_parse_word_document_errors_are_text() {
        let mut state = IterationState::new("登录", 3);
        let reply = GenerationTools::new(&mut state)
            .call(&call(PARSE_WORD_DOCUMENT, json!({})))
            .await;
        assert_eq!(reply, "错误：必须提供file_path或base64_data参数");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let mut state = IterationState::new("登录", 3);
        let reply = ReviewTools::new(&mut state, 90.0)
            .call(&call("drop_everything", json!({})))
            .await;
        assert!(reply.contains("未知的工具"));
        assert!(NoTools.specs().is_empty());
    }

    #[tokio::test]
    async fn test_sql_tools_on_sqlite() {
        let db = tokio_test::assert_ok!(SqlDatabase::connect("sqlite::memory:").await);
        tokio_test::assert_ok!(
            db.execute_unchecked("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
                .await
        );
        let mut tools = SqlTools::new(&db);
        assert_eq!(tools.specs().len(), 4);

        let reply = tools
            .call(&call("sql_db_query", json!({ "sql": "DELETE FROM users" })))
            .await;
        assert!(reply.starts_with("错误: 只允许执行SELECT查询语句"));

        let reply = tools
            .call(&call("sql_db_query", json!({ "sql": "SELECT * FROM missing" })))
            .await;
        assert!(reply.starts_with("SQL语句执行失败，错误信息: "));

        let reply = tools.call(&call("sql_table_schema", json!({}))).await;
        assert_eq!(reply, "错误: 没有传入表名");

        let reply = tools.call(&call("sql_table_list", json!({}))).await;
        assert!(reply.starts_with("总共有1张表"));
    }
}
