use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 测试用例评审结果
///
/// `score` 恒为三个分项的算术平均，`is_passed` 恒等于 `score >= 分数线`；
/// 保存时通过 [`ReviewResult::normalized`] 重新计算，不信任 LLM 自报的总分。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub coverage_score: f64,
    #[serde(default)]
    pub executability_score: f64,
    #[serde(default)]
    pub clarity_score: f64,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub is_passed: bool,
}

impl ReviewResult {
    /// 由三个分项构造评审结果
    pub fn from_scores(
        coverage_score: f64,
        executability_score: f64,
        clarity_score: f64,
        suggestions: Vec<String>,
        threshold: f64,
    ) -> Self {
        Self {
            score: 0.0,
            coverage_score,
            executability_score,
            clarity_score,
            suggestions,
            is_passed: false,
        }
        .normalized(threshold)
    }

    /// 解析 `save_review_result` 的参数（JSON 字符串或对象）
    pub fn from_value(value: Value, threshold: f64) -> Result<Self, serde_json::Error> {
        let review: ReviewResult = match value {
            Value::String(raw) => serde_json::from_str(&raw)?,
            other => serde_json::from_value(other)?,
        };
        Ok(review.normalized(threshold))
    }

    /// 分项截断到 [0, 100]，并重新计算总分和是否通过
    pub fn normalized(mut self, threshold: f64) -> Self {
        self.coverage_score = clamp_score(self.coverage_score);
        self.executability_score = clamp_score(self.executability_score);
        self.clarity_score = clamp_score(self.clarity_score);
        self.score = (self.coverage_score + self.executability_score + self.clarity_score) / 3.0;
        self.is_passed = self.score >= threshold;
        self.suggestions.retain(|s| !s.trim().is_empty());
        self
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}
