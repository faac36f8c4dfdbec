//! 总体反馈服务 - 业务能力层
//!
//! 根据逐题评分结果写一段总体反馈；模型不可用时退回到按分数生成的固定模板。

use std::fmt::Write as _;
use tracing::warn;

use crate::infrastructure::{CompletionOptions, LanguageModel};
use crate::models::{GradingResult, ReportTotals};

const SYSTEM_BRIEF: &str = "You are a feedback generation assistant for an exam grading system. \
Provide constructive, personalized feedback to the student:
1. Be encouraging and constructive
2. Highlight specific strengths
3. Provide actionable improvement suggestions
4. Maintain a supportive tone
Reply with one short paragraph of plain text, no markdown.";

/// 总体反馈服务
pub struct FeedbackWriter<L> {
    model: L,
    options: CompletionOptions,
}

impl<L: LanguageModel> FeedbackWriter<L> {
    pub fn new(model: L) -> Self {
        Self {
            model,
            options: CompletionOptions {
                temperature: 0.4,
                max_tokens: 600,
            },
        }
    }

    /// 生成总体反馈，从不失败
    pub async fn write(&self, results: &[GradingResult]) -> String {
        if results.is_empty() {
            return fallback_feedback(results);
        }

        let prompt = format!("{}\n\n{}", SYSTEM_BRIEF, summarize_results(results));
        match self.model.complete(&prompt, self.options).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("⚠️ 反馈模型返回为空，使用模板反馈");
                fallback_feedback(results)
            }
            Err(e) => {
                warn!("⚠️ 反馈模型调用失败，使用模板反馈: {:#}", e);
                fallback_feedback(results)
            }
        }
    }
}

/// 逐题结果摘要（送给模型）
fn summarize_results(results: &[GradingResult]) -> String {
    let totals = ReportTotals::from_results(results);
    let mut summary = format!(
        "Overall score: {:.1}/{:.1} ({:.1}%)\n",
        totals.awarded_marks, totals.total_marks, totals.percentage
    );
    for r in results {
        let _ = writeln!(
            summary,
            "Q{} ({:.1}/{:.1}): {} | grader note: {}",
            r.question_number, r.marks_awarded, r.total_marks, r.question, r.feedback
        );
    }
    summary
}

/// 按得分率生成的模板反馈
pub fn fallback_feedback(results: &[GradingResult]) -> String {
    if results.is_empty() {
        return "No answers could be graded for this submission.".to_string();
    }

    let totals = ReportTotals::from_results(results);
    let opening = match totals.percentage {
        p if p >= 85.0 => "Excellent work!",
        p if p >= 70.0 => "Good work!",
        p if p >= 50.0 => "A fair attempt.",
        _ => "This submission needs more work.",
    };

    let weakest = results
        .iter()
        .filter(|r| r.total_marks > 0.0)
        .min_by(|a, b| {
            (a.marks_awarded / a.total_marks).total_cmp(&(b.marks_awarded / b.total_marks))
        });

    let mut text = format!(
        "{} You scored {:.1} out of {:.1} ({:.1}%).",
        opening, totals.awarded_marks, totals.total_marks, totals.percentage
    );
    if let Some(weakest) = weakest {
        if weakest.marks_awarded < weakest.total_marks {
            let _ = write!(
                text,
                " Review question {} first, where the most marks were lost.",
                weakest.question_number
            );
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    struct FixedModel(Option<&'static str>);

    impl LanguageModel for FixedModel {
        async fn complete(&self, prompt: &str, _options: CompletionOptions) -> Result<String> {
            assert!(prompt.contains("Overall score"));
            self.0
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("model offline"))
        }
    }

    fn result(n: u32, awarded: f64, total: f64) -> GradingResult {
        GradingResult {
            question_number: n,
            question: format!("Q{}", n),
            correct_answer: String::new(),
            student_answer: String::new(),
            marks_awarded: awarded,
            feedback: String::new(),
            total_marks: total,
        }
    }

    #[tokio::test]
    async fn test_model_feedback_is_used() {
        let writer = FeedbackWriter::new(FixedModel(Some("  Well done overall.  ")));
        let text = writer.write(&[result(1, 5.0, 5.0)]).await;
        assert_eq!(text, "Well done overall.");
    }

    #[tokio::test]
    async fn test_falls_back_when_model_fails() {
        let writer = FeedbackWriter::new(FixedModel(None));
        let text = writer.write(&[result(1, 5.0, 5.0), result(2, 1.0, 5.0)]).await;
        assert!(text.starts_with("A fair attempt."));
        assert!(text.contains("question 2"));
    }

    #[test]
    fn test_fallback_for_empty_results() {
        assert!(fallback_feedback(&[]).contains("No answers"));
        assert!(fallback_feedback(&[result(1, 9.0, 10.0)]).starts_with("Excellent"));
    }
}
