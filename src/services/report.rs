//! 最终 Markdown 文档
//!
//! 需求概述、按测试类型分组（保持首次出现的顺序）的测试用例、评审结果。

use crate::models::{ReviewResult, TestCase};

pub fn render_markdown(
    requirement: &str,
    cases: &[TestCase],
    review: Option<&ReviewResult>,
) -> String {
    let mut lines = vec![
        "# 测试用例文档".to_string(),
        format!(
            "\n生成时间: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ),
        "\n## 1. 需求概述".to_string(),
        format!("\n{}", requirement),
        "\n## 2. 测试用例".to_string(),
    ];

    for (case_type, group) in group_by_type(cases) {
        lines.push(format!("\n### {}", case_type));
        for case in group {
            lines.push(format!("\n#### 测试用例 {}", or_na(&case.id)));
            lines.push(format!("**测试描述**: {}", or_na(&case.description)));
            lines.push(format!("**优先级**: {}", or_na(&case.priority)));
            lines.push(format!(
                "**前置条件**: {}",
                case.preconditions
                    .as_deref()
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or("无")
            ));
            lines.push("\n**测试步骤**:".to_string());
            if !case.steps.is_empty() {
                lines.push(case.numbered_steps());
            }
            lines.push(format!("\n**预期结果**: {}", or_na(&case.expected_result)));
        }
    }

    if let Some(review) = review {
        lines.push("\n## 3. 评审结果".to_string());
        lines.push(format!("**总分**: {:.1}/100", review.score));
        lines.push(format!("**覆盖率**: {}/100", review.coverage_score));
        lines.push(format!("**可执行性**: {}/100", review.executability_score));
        lines.push(format!("**无歧义性**: {}/100", review.clarity_score));
        lines.push(format!(
            "**评审结果**: {}",
            if review.is_passed { "通过" } else { "不通过" }
        ));
        if !review.suggestions.is_empty() {
            lines.push("\n**优化建议**:".to_string());
            lines.extend(review.suggestions.iter().map(|s| format!("- {}", s)));
        }
    }

    lines.join("\n")
}

fn group_by_type(cases: &[TestCase]) -> Vec<(&str, Vec<&TestCase>)> {
    let mut groups: Vec<(&str, Vec<&TestCase>)> = Vec::new();
    for case in cases {
        let case_type = if case.case_type.trim().is_empty() {
            "其他"
        } else {
            case.case_type.as_str()
        };
        match groups.iter_mut().find(|(t, _)| *t == case_type) {
            Some((_, group)) => group.push(case),
            None => groups.push((case_type, vec![case])),
        }
    }
    groups
}

fn or_na(value: &str) -> &str {
    if value.trim().is_empty() {
        "N/A"
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: &str, case_type: &str) -> TestCase {
        TestCase {
            id: id.to_string(),
            case_type: case_type.to_string(),
            description: format!("{} 描述", id),
            steps: vec!["打开页面".to_string(), "提交表单".to_string()],
            expected_result: "成功".to_string(),
            priority: "中".to_string(),
            preconditions: None,
        }
    }

    #[test]
    fn test_groups_keep_first_seen_order() {
        let cases = vec![
            case("TC_001", "功能测试"),
            case("TC_002", "异常测试"),
            case("TC_003", "功能测试"),
            case("TC_004", ""),
        ];
        let doc = render_markdown("登录需求", &cases, None);

        let functional = doc.find("### 功能测试").unwrap();
        let abnormal = doc.find("### 异常测试").unwrap();
        let other = doc.find("### 其他").unwrap();
        assert!(functional < abnormal && abnormal < other);
        assert!(doc.find("TC_003").unwrap() < abnormal);
        assert!(doc.contains("**前置条件**: 无"));
        assert!(doc.contains("1. 打开页面\n2. 提交表单"));
        assert!(!doc.contains("## 3. 评审结果"));
    }

    #[test]
    fn test_review_section() {
        let review = ReviewResult::from_scores(
            95.0,
            90.0,
            92.0,
            vec!["补充并发登录场景".to_string()],
            90.0,
        );
        let doc = render_markdown("登录需求", &[case("TC_001", "功能测试")], Some(&review));
        assert!(doc.contains("## 3. 评审结果"));
        assert!(doc.contains("**总分**: 92.3/100"));
        assert!(doc.contains("**评审结果**: 通过"));
        assert!(doc.contains("- 补充并发登录场景"));
    }
}
