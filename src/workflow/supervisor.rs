//! 测试用例生成流程 - 流程层
//!
//! 核心职责：编排"一个需求"从生成到导出的完整流程
//!
//! 流程顺序：
//! 1. GENERATE：生成 Agent 产出测试用例（失败时从回复文本兜底提取）
//! 2. REVIEW：评审 Agent 打分；本轮没有测试用例时跳过
//! 3. 通过或次数用完 → EXPORT，否则带着优化建议回到 GENERATE
//! 4. EXPORT：导出 Excel，生成 Markdown 文档（每次运行只导出一次）

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::clients::LlmClient;
use crate::config::Config;
use crate::error::{AppError, AppResult, SessionError};
use crate::models::{ChatMessage, ReviewResult, StreamEvent, TestCase};
use crate::services::{render_markdown, ExportedFile, TestCaseExporter};
use crate::utils::json_extract::{extract_json_array, extract_json_object};
use crate::utils::logging;
use crate::workflow::agent::{emit, Agent, EventSender};
use crate::workflow::prompts::{self, PreviousAttempt};
use crate::workflow::state::IterationState;
use crate::workflow::tools::{GenerationTools, ReviewTools};

pub const GENERATION_AGENT: &str = "test_case_generation_agent";
pub const REVIEW_AGENT: &str = "test_case_review_agent";
pub const SUPERVISOR: &str = "supervisor";

/// 流程所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Generate,
    Review,
    Export,
}

/// 生成之后的去向：有新用例就评审，否则按剩余次数决定重试还是结束
pub fn after_generation(produced: bool, budget_exhausted: bool) -> Phase {
    if produced {
        Phase::Review
    } else if budget_exhausted {
        Phase::Export
    } else {
        Phase::Generate
    }
}

/// 评审之后的去向：通过或次数用完就导出；没有评审结果视为不通过
pub fn after_review(review: Option<&ReviewResult>, budget_exhausted: bool) -> Phase {
    let passed = review.is_some_and(|r| r.is_passed);
    if passed || budget_exhausted {
        Phase::Export
    } else {
        Phase::Generate
    }
}

/// 一次运行的产出
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub markdown: String,
    pub export: ExportedFile,
    pub test_cases: Vec<TestCase>,
    pub review: Option<ReviewResult>,
    /// 全部中间消息，最后一条是最终回复
    pub messages: Vec<ChatMessage>,
    pub iterations: u32,
}

impl RunOutcome {
    /// 最终回复
    pub fn final_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// 流程参数
#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    pub pass_threshold: f64,
    pub max_agent_turns: usize,
}

impl From<&Config> for SupervisorSettings {
    fn from(config: &Config) -> Self {
        Self {
            pass_threshold: config.pass_threshold,
            max_agent_turns: config.max_agent_turns,
        }
    }
}

/// 测试用例生成流程
///
/// - 决定何时生成、何时评审、何时导出
/// - 不持有会话状态，状态由调用方（会话任务）传入
#[derive(Clone)]
pub struct Supervisor {
    llm: Arc<dyn LlmClient>,
    exporter: Arc<dyn TestCaseExporter>,
    settings: SupervisorSettings,
}

impl Supervisor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        exporter: Arc<dyn TestCaseExporter>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            llm,
            exporter,
            settings,
        }
    }

    pub async fn run(
        &self,
        thread_id: &str,
        state: &mut IterationState,
        events: Option<&EventSender>,
    ) -> AppResult<RunOutcome> {
        logging::log_run_start(thread_id, &state.original_requirement);

        let mut messages = Vec::new();
        let mut previous = None;
        let mut phase = Phase::Generate;
        loop {
            phase = match phase {
                Phase::Generate => {
                    state.iteration_count += 1;
                    logging::log_iteration_start(
                        thread_id,
                        state.iteration_count,
                        state.max_iterations,
                    );
                    let produced = self
                        .generate(thread_id, state, previous, events, &mut messages)
                        .await?;
                    if !produced {
                        previous = Some(PreviousAttempt::Empty);
                    }
                    after_generation(produced, state.budget_exhausted())
                }
                Phase::Review => {
                    self.review(thread_id, state, events, &mut messages).await?;
                    previous = Some(PreviousAttempt::Rejected);
                    after_review(state.review_result.as_ref(), state.budget_exhausted())
                }
                Phase::Export => break,
            };
        }

        if state.test_cases.is_empty() {
            warn!("[会话 {}] ❌ 没有可导出的测试用例", thread_id);
            return Err(SessionError::NoTestCases {
                iterations: state.iteration_count,
            }
            .into());
        }

        let export = self.export(state).await?;
        info!(
            "[会话 {}] 📁 Excel 已生成: {}",
            thread_id,
            export.path.display()
        );

        let markdown = render_markdown(
            &state.original_requirement,
            &state.test_cases,
            state.review_result.as_ref(),
        );
        let final_message = ChatMessage::ai(format!(
            "{}\n\n---\n\nExcel文件已生成: [{}]({})",
            markdown, export.filename, export.download_url
        ))
        .with_name(SUPERVISOR);
        emit(events, StreamEvent::Message(final_message.clone()));
        messages.push(final_message);

        logging::log_run_complete(
            thread_id,
            state.test_cases.len(),
            state.iteration_count,
            state.review_result.as_ref().map(|r| r.score),
        );

        Ok(RunOutcome {
            markdown,
            export,
            test_cases: state.test_cases.clone(),
            review: state.review_result.clone(),
            messages,
            iterations: state.iteration_count,
        })
    }

    /// 生成一轮测试用例，返回本轮是否产出了用例
    ///
    /// 本轮没有产出时保留上一轮的用例。
    async fn generate(
        &self,
        thread_id: &str,
        state: &mut IterationState,
        previous: Option<PreviousAttempt>,
        events: Option<&EventSender>,
        messages: &mut Vec<ChatMessage>,
    ) -> AppResult<bool> {
        info!("[会话 {}] ✍️ 生成测试用例...", thread_id);
        let request = prompts::generation_request(
            &state.original_requirement,
            previous,
            state.suggestions(),
            state.iteration_count,
            state.max_iterations,
        );
        let previous = std::mem::take(&mut state.test_cases);

        let agent = Agent::new(
            GENERATION_AGENT,
            prompts::generation_prompt(),
            self.settings.max_agent_turns,
        );
        let run = {
            let mut tools = GenerationTools::new(state);
            agent.run(self.llm.as_ref(), &request, &mut tools, events).await?
        };
        messages.extend(run.messages);

        if state.test_cases.is_empty() {
            if let Some(cases) = cases_from_text(&run.final_text) {
                info!(
                    "[会话 {}] 从回复文本中提取到 {} 个测试用例",
                    thread_id,
                    cases.len()
                );
                state.test_cases = cases;
            }
        }

        if state.test_cases.is_empty() {
            warn!("[会话 {}] ⚠️ 本轮没有生成测试用例", thread_id);
            state.test_cases = previous;
            return Ok(false);
        }

        // 新用例需要重新评审
        state.review_result = None;
        info!(
            "[会话 {}] ✓ 本轮生成 {} 个测试用例",
            thread_id,
            state.test_cases.len()
        );
        Ok(true)
    }

    async fn review(
        &self,
        thread_id: &str,
        state: &mut IterationState,
        events: Option<&EventSender>,
        messages: &mut Vec<ChatMessage>,
    ) -> AppResult<()> {
        info!("[会话 {}] 🧐 评审测试用例...", thread_id);
        let threshold = self.settings.pass_threshold;
        let request = prompts::review_request(&state.original_requirement, state.test_cases.len());

        let agent = Agent::new(
            REVIEW_AGENT,
            prompts::review_prompt(threshold),
            self.settings.max_agent_turns,
        );
        let run = {
            let mut tools = ReviewTools::new(state, threshold);
            agent.run(self.llm.as_ref(), &request, &mut tools, events).await?
        };
        messages.extend(run.messages);

        if state.review_result.is_none() {
            state.review_result = review_from_text(&run.final_text, threshold);
        }

        match &state.review_result {
            Some(review) => info!(
                "[会话 {}] 📊 评审得分 {:.1}/100，{}",
                thread_id,
                review.score,
                if review.is_passed { "通过" } else { "不通过" }
            ),
            None => warn!("[会话 {}] ⚠️ 没有得到评审结果，按不通过处理", thread_id),
        }
        Ok(())
    }

    async fn export(&self, state: &IterationState) -> AppResult<ExportedFile> {
        let exporter = Arc::clone(&self.exporter);
        let cases = state.test_cases.clone();
        let review = state.review_result.clone();
        tokio::task::spawn_blocking(move || exporter.export(&cases, review.as_ref()))
            .await
            .map_err(|e| AppError::Other(format!("导出任务异常退出: {}", e)))?
    }
}

/// 回复文本中的 JSON 数组兜底解析为测试用例
fn cases_from_text(text: &str) -> Option<Vec<TestCase>> {
    let items = extract_json_array(text)?;
    TestCase::list_from_value(Value::Array(items))
        .ok()
        .filter(|cases| !cases.is_empty())
}

/// 回复文本中带 `score` 的 JSON 对象兜底解析为评审结果
fn review_from_text(text: &str, threshold: f64) -> Option<ReviewResult> {
    let object = extract_json_object(text).filter(|o| o.contains_key("score"))?;
    ReviewResult::from_value(Value::Object(object), threshold).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(passed: bool) -> ReviewResult {
        let score = if passed { 95.0 } else { 60.0 };
        ReviewResult::from_scores(score, score, score, Vec::new(), 90.0)
    }

    fn state_at(iteration_count: u32, max_iterations: u32) -> IterationState {
        IterationState {
            iteration_count,
            ..IterationState::new("需求", max_iterations)
        }
    }

    #[test]
    fn test_after_review_routing() {
        let early = state_at(1, 3).budget_exhausted();
        let last = state_at(3, 3).budget_exhausted();
        assert_eq!(after_review(Some(&review(true)), early), Phase::Export);
        assert_eq!(after_review(Some(&review(false)), early), Phase::Generate);
        assert_eq!(after_review(Some(&review(false)), last), Phase::Export);
        assert_eq!(after_review(None, state_at(2, 3).budget_exhausted()), Phase::Generate);
        assert_eq!(after_review(None, last), Phase::Export);
    }

    #[test]
    fn test_after_generation_routing() {
        assert_eq!(after_generation(true, state_at(3, 3).budget_exhausted()), Phase::Review);
        assert_eq!(after_generation(false, state_at(1, 3).budget_exhausted()), Phase::Generate);
        assert_eq!(after_generation(false, state_at(3, 3).budget_exhausted()), Phase::Export);
    }

    #[test]
    fn test_threshold_boundary_routes_to_export() {
        for score in [90.0, 90.5, 100.0] {
            let r = ReviewResult::from_scores(score, score, score, Vec::new(), 90.0);
            assert_eq!(after_review(Some(&r), false), Phase::Export);
        }
        let r = ReviewResult::from_scores(89.9, 89.9, 89.9, Vec::new(), 90.0);
        assert_eq!(after_review(Some(&r), false), Phase::Generate);
    }

    #[test]
    fn test_fallback_extraction() {
        let text = "测试用例如下：\n```json\n[{\"test_case_id\": \"TC_001\", \"test_type\": \"功能测试\"}]\n```";
        let cases = cases_from_text(text).unwrap();
        assert_eq!(cases[0].id, "TC_001");
        assert!(cases_from_text("没有 JSON").is_none());
        assert!(cases_from_text("[]").is_none());

        let text = r#"评审完成 {"coverage_score": 100, "executability_score": 100, "clarity_score": 70, "score": 1}"#;
        let review = review_from_text(text, 90.0).unwrap();
        assert_eq!(review.score, 90.0);
        assert!(review.is_passed);
        assert!(review_from_text(r#"{"coverage_score": 100}"#, 90.0).is_none());
    }
}
