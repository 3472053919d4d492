//! 各 Agent 的系统提示词

/// 测试用例生成专家
pub fn generation_prompt() -> String {
    r#"你是一个专业的测试用例生成专家。你的任务是：
1. 如果用户提供了Word文档路径，首先使用 parse_word_document 工具解析Word文档内容
2. 仔细分析用户提供的需求文档（可能是文本内容或Word文档解析结果）
3. 直接生成详细的测试用例，包括：
   - test_case_id: 测试用例ID（格式：TC_001, TC_002...）
   - test_type: 测试类型（功能测试/边界测试/异常测试等）
   - test_description: 测试用例描述
   - test_steps: 清晰的测试步骤列表（步骤1、步骤2...）
   - expected_result: 明确的预期结果
   - priority: 优先级（高/中/低）
   - preconditions: 前置条件（可选）
4. 测试用例应该：
   - 覆盖正常场景、边界场景和异常场景
   - 步骤完整、可执行
   - 预期结果明确、无歧义
   - 易于理解和维护
5. 将测试用例以JSON数组格式输出
6. 使用 save_test_cases 工具保存测试用例

输出格式示例：
[
  {
    "test_case_id": "TC_001",
    "test_type": "功能测试",
    "test_description": "正常登录场景",
    "test_steps": ["步骤1: 打开登录页面", "步骤2: 输入正确的用户名和密码", "步骤3: 点击登录按钮"],
    "expected_result": "登录成功，页面跳转到主页",
    "priority": "高",
    "preconditions": "用户已注册"
  }
]"#
    .to_string()
}

/// 测试用例评审专家，分数线来自配置
pub fn review_prompt(threshold: f64) -> String {
    format!(
        r#"你是一个专业的测试用例评审专家。你的任务是：
1. 使用 get_test_cases 工具获取测试用例
2. 对测试用例进行全面评审，从以下维度打分（0-100分）：
   - coverage_score: 覆盖率（是否充分覆盖需求的各种场景）
   - executability_score: 可执行性（步骤是否清晰、可执行）
   - clarity_score: 无歧义性（预期结果是否明确）
3. 总分 = (coverage_score + executability_score + clarity_score) / 3
4. 输出JSON格式的评审结果，并使用 save_review_result 工具保存：
   {{
     "score": 总分,
     "coverage_score": 覆盖率评分,
     "executability_score": 可执行性评分,
     "clarity_score": 无歧义性评分,
     "suggestions": ["优化建议1", "优化建议2"],
     "is_passed": true/false (score >= {threshold})
   }}
5. 如果评审不通过（score < {threshold}），提供具体的优化建议

评审要严格、客观，确保测试用例质量。你只需要评审，不需要生成Excel文件。"#,
        threshold = threshold
    )
}

/// SQL 助手
pub fn sql_prompt() -> String {
    "你是一个Mysql智能助手，请使用提供的工具函数进行数据库操作，完成用户的需求".to_string()
}

/// 上一次生成的结局，决定重试时怎么措辞
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviousAttempt {
    /// 生成了用例但评审未通过（或没有得到评审结果）
    Rejected,
    /// 没有生成任何用例，评审被跳过
    Empty,
}

/// 生成阶段的用户消息
///
/// 第一次只有需求；重试时说明上一次的结局，并带上最近一次评审的建议。
pub fn generation_request(
    requirement: &str,
    previous: Option<PreviousAttempt>,
    suggestions: &[String],
    iteration: u32,
    max_iterations: u32,
) -> String {
    let mut request = format!("请根据以下需求文档生成测试用例：\n\n{}", requirement);
    let Some(previous) = previous else {
        return request;
    };

    request.push_str(&format!("\n\n这是第 {}/{} 次生成。", iteration, max_iterations));
    match previous {
        PreviousAttempt::Rejected => {
            request.push_str("上一轮评审未通过，请根据以下优化建议重新生成完整的测试用例列表：");
            if suggestions.is_empty() {
                request.push_str("\n- 评审没有给出具体建议，请全面提升覆盖率、可执行性和无歧义性");
            }
        }
        PreviousAttempt::Empty => {
            request.push_str(
                "上一轮没有生成任何测试用例，请生成完整的测试用例列表并使用 save_test_cases 工具保存。",
            );
            if !suggestions.is_empty() {
                request.push_str("\n此前评审给出的优化建议：");
            }
        }
    }
    for suggestion in suggestions {
        request.push_str(&format!("\n- {}", suggestion));
    }
    request
}

/// 评审阶段的用户消息
pub fn review_request(requirement: &str, case_count: usize) -> String {
    format!(
        "请评审已保存的 {} 个测试用例。原始需求如下：\n\n{}",
        case_count, requirement
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_interpolated() {
        let prompt = review_prompt(85.0);
        assert!(prompt.contains("score >= 85"));
        assert!(prompt.contains("score < 85"));
        assert!(prompt.contains("\"suggestions\""));
    }

    #[test]
    fn test_generation_request_carries_suggestions() {
        let first = generation_request("登录需求", None, &["无关".to_string()], 1, 3);
        assert_eq!(first, "请根据以下需求文档生成测试用例：\n\n登录需求");

        let retry = generation_request(
            "登录需求",
            Some(PreviousAttempt::Rejected),
            &["补充锁定场景".to_string()],
            2,
            3,
        );
        assert!(retry.contains("第 2/3 次生成"));
        assert!(retry.contains("上一轮评审未通过"));
        assert!(retry.ends_with("- 补充锁定场景"));
    }

    #[test]
    fn test_retry_wording_follows_previous_attempt() {
        let empty = generation_request("登录需求", Some(PreviousAttempt::Empty), &[], 2, 3);
        assert!(empty.contains("第 2/3 次生成"));
        assert!(empty.contains("上一轮没有生成任何测试用例"));
        assert!(!empty.contains("评审"));

        // 更早的评审建议仍然带上，但不声称上一轮评审未通过
        let empty = generation_request(
            "登录需求",
            Some(PreviousAttempt::Empty),
            &["补充锁定场景".to_string()],
            3,
            3,
        );
        assert!(!empty.contains("评审未通过"));
        assert!(empty.ends_with("此前评审给出的优化建议：\n- 补充锁定场景"));

        let rejected = generation_request("登录需求", Some(PreviousAttempt::Rejected), &[], 2, 3);
        assert!(rejected.ends_with("请全面提升覆盖率、可执行性和无歧义性"));
    }
}
