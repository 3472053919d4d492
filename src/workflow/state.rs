//! 迭代状态
//!
//! 每个会话一份，由会话任务独占；工具函数在 Agent 运行期间直接借用它。

use crate::models::{ReviewResult, TestCase};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationState {
    /// 原始需求（已合并附件内容）
    pub original_requirement: String,
    pub test_cases: Vec<TestCase>,
    pub review_result: Option<ReviewResult>,
    /// 已进行的生成次数
    pub iteration_count: u32,
    pub max_iterations: u32,
}

impl IterationState {
    pub fn new(requirement: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            original_requirement: requirement.into(),
            max_iterations: max_iterations.max(1),
            ..Default::default()
        }
    }

    /// 生成次数是否已用完
    pub fn budget_exhausted(&self) -> bool {
        self.iteration_count >= self.max_iterations
    }

    /// 上一轮评审给出的建议
    pub fn suggestions(&self) -> &[String] {
        self.review_result
            .as_ref()
            .map(|r| r.suggestions.as_slice())
            .unwrap_or_default()
    }
}
