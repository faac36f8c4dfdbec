//! 回复汇总
//!
//! agent 回复无序、可能缺失、可能重复。汇总只看发送者身份：
//! - 评分：最后一条能解析出 `results` 列表的回复
//! - 反馈：最后一条反馈回复的原文
//!
//! 缺数据不是失败，`success` 仍为 `true`。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{GradingReport, GradingResult, QaPair, ReportTotals};
use crate::orchestrator::bus::{AgentId, AgentResponse};

/// 评分工作流的汇总结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub success: bool,
    pub student_name: String,
    pub exam_title: String,
    pub results: Vec<GradingResult>,
    pub total_marks: f64,
    pub awarded_marks: f64,
    pub percentage: f64,
    pub feedback: String,
    pub responses_received: usize,
    pub agent_responses: Vec<AgentResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowOutcome {
    /// 调用本身失败时的结果
    pub fn failure(
        student_name: impl Into<String>,
        exam_title: impl Into<String>,
        error: impl std::fmt::Display,
    ) -> Self {
        Self {
            success: false,
            student_name: student_name.into(),
            exam_title: exam_title.into(),
            results: Vec::new(),
            total_marks: 0.0,
            awarded_marks: 0.0,
            percentage: 0.0,
            feedback: String::new(),
            responses_received: 0,
            agent_responses: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    /// 转换为可保存的评分报告
    pub fn into_report(self) -> GradingReport {
        let feedback = (!self.feedback.is_empty()).then_some(self.feedback);
        GradingReport::new(self.student_name, self.exam_title, self.results, feedback)
    }
}

/// 文档处理工作流的汇总结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub success: bool,
    pub processing_type: String,
    pub extracted_text: String,
    pub qa_pairs: Vec<QaPair>,
    pub responses_received: usize,
    pub agent_responses: Vec<AgentResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentOutcome {
    pub fn failure(processing_type: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            processing_type: processing_type.into(),
            extracted_text: String::new(),
            qa_pairs: Vec::new(),
            responses_received: 0,
            agent_responses: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// 汇总评分工作流的回复
pub fn synthesize_grading(
    responses: Vec<AgentResponse>,
    student_name: &str,
    exam_title: &str,
) -> WorkflowOutcome {
    let mut results: Option<Vec<GradingResult>> = None;
    let mut feedback: Option<&str> = None;

    for response in &responses {
        match response.sender_agent() {
            Some(AgentId::Grading) => match parse_results(&response.content) {
                Some(parsed) => results = Some(parsed),
                None => warn!("⚠️ 评分回复无法解析，忽略: {}", response.sender),
            },
            Some(AgentId::Feedback) => feedback = Some(&response.content),
            Some(agent) => debug!("[{}] 回复不参与评分汇总", agent),
            None => warn!("⚠️ 未知发送者: {}", response.sender),
        }
    }

    let results = results.unwrap_or_default();
    let totals = ReportTotals::from_results(&results);
    let feedback = feedback.unwrap_or_default().to_string();

    WorkflowOutcome {
        success: true,
        student_name: student_name.to_string(),
        exam_title: exam_title.to_string(),
        results,
        total_marks: totals.total_marks,
        awarded_marks: totals.awarded_marks,
        percentage: totals.percentage,
        feedback,
        responses_received: responses.len(),
        agent_responses: responses,
        error: None,
    }
}

/// 汇总文档处理工作流的回复
pub fn synthesize_document(responses: Vec<AgentResponse>, processing_type: &str) -> DocumentOutcome {
    let mut extracted_text = String::new();
    let mut qa_pairs = Vec::new();

    for response in &responses {
        match response.sender_agent() {
            Some(AgentId::Ocr) => extracted_text = response.content.clone(),
            Some(AgentId::Document) => match parse_pairs(&response.content) {
                Some(pairs) => qa_pairs = pairs,
                None => warn!("⚠️ 分段回复无法解析，忽略"),
            },
            Some(agent) => debug!("[{}] 回复不参与文档汇总", agent),
            None => warn!("⚠️ 未知发送者: {}", response.sender),
        }
    }

    DocumentOutcome {
        success: true,
        processing_type: processing_type.to_string(),
        extracted_text,
        qa_pairs,
        responses_received: responses.len(),
        agent_responses: responses,
        error: None,
    }
}

/// 从评分回复中取出 `results` 列表，无法识别的条目跳过
fn parse_results(content: &str) -> Option<Vec<GradingResult>> {
    let value: Value = serde_json::from_str(content).ok()?;
    let items = value.get("results")?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
    )
}

fn parse_pairs(content: &str) -> Option<Vec<QaPair>> {
    let value: Value = serde_json::from_str(content).ok()?;
    serde_json::from_value(value.get("qa_pairs")?.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grading(results: Value) -> AgentResponse {
        AgentResponse::new("grading-agent", json!({ "results": results }).to_string())
    }

    #[test]
    fn test_partial_responses_still_succeed() {
        let responses = vec![
            grading(json!([
                {"question_number": 1, "marks_awarded": 4.0, "total_marks": 5.0},
                {"question_number": 2, "marks_awarded": 3.0, "totalMarks": 5.0}
            ])),
            AgentResponse::new("ocr-agent", "raw text"),
        ];

        let outcome = synthesize_grading(responses, "Alice", "Midterm");
        assert!(outcome.success);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.total_marks, 10.0);
        assert_eq!(outcome.awarded_marks, 7.0);
        assert!((outcome.percentage - 70.0).abs() < 1e-9);
        assert!(outcome.feedback.is_empty());
        assert_eq!(outcome.responses_received, 2);
    }

    #[test]
    fn test_last_valid_grading_and_feedback_win() {
        let responses = vec![
            AgentResponse::new("feedback-agent", "first"),
            grading(json!([{"marks_awarded": 1.0, "total_marks": 2.0}])),
            AgentResponse::new("grading-agent", "not json"),
            AgentResponse::new("feedback-agent", "second"),
        ];

        let outcome = synthesize_grading(responses, "Bob", "Quiz");
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.feedback, "second");
    }

    #[test]
    fn test_no_grading_data_gives_zero_totals() {
        let responses = vec![AgentResponse::new("grading-agent", "{\"status\": \"ok\"}")];
        let outcome = synthesize_grading(responses, "Carol", "Final");
        assert!(outcome.success);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.percentage, 0.0);
    }

    #[test]
    fn test_overlapping_sender_names_are_not_misattributed() {
        let responses = vec![
            AgentResponse::new("document-agent-backup", "{\"results\": [{\"total_marks\": 9.0}]}"),
            AgentResponse::new("not-the-grading-agent", "{\"results\": [{\"total_marks\": 9.0}]}"),
        ];
        let outcome = synthesize_grading(responses, "Dan", "Quiz");
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn test_document_synthesis() {
        let responses = vec![
            AgentResponse::new(
                "document-agent",
                json!({"qa_pairs": [{"question": "Q1", "answer": "A1"}]}).to_string(),
            ),
            AgentResponse::new("ocr-agent", "Question 1 ..."),
        ];
        let outcome = synthesize_document(responses, "qa_extraction");
        assert!(outcome.success);
        assert_eq!(outcome.extracted_text, "Question 1 ...");
        assert_eq!(outcome.qa_pairs, vec![QaPair::new("Q1", "A1")]);
    }

    #[test]
    fn test_outcome_into_report() {
        let outcome = synthesize_grading(
            vec![
                grading(json!([{"marks_awarded": 2.0, "total_marks": 4.0}])),
                AgentResponse::new("feedback-agent", "Keep going."),
            ],
            "Eve",
            "Quiz",
        );
        let report = outcome.into_report();
        assert_eq!(report.percentage, 50.0);
        assert_eq!(report.feedback.as_deref(), Some("Keep going."));
    }
}
