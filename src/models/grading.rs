use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// 一个问答单元（题目, 作答）
///
/// 题目为空的问答对会被丢弃；答案可以为空（未作答）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }

    /// 填充用的空问答对
    pub fn blank() -> Self {
        Self::new("", "")
    }
}

/// 文字的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    /// 视觉模型识别
    Vision,
    /// 文档本身就是可读文本，跳过视觉调用
    EmbeddedText,
    /// 无法恢复任何文字
    Unavailable,
}

/// 单个文档的提取结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    /// 视觉路径成功时为固定值，失败时为空
    pub confidence: Option<f32>,
    pub source: ExtractionSource,
    pub page_count: usize,
}

impl ExtractedText {
    pub const VISION_CONFIDENCE: f32 = 0.95;

    pub fn vision(text: String, page_count: usize) -> Self {
        Self {
            text,
            confidence: Some(Self::VISION_CONFIDENCE),
            source: ExtractionSource::Vision,
            page_count,
        }
    }

    pub fn embedded(text: String) -> Self {
        Self {
            text,
            confidence: None,
            source: ExtractionSource::EmbeddedText,
            page_count: 0,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            text: String::new(),
            confidence: None,
            source: ExtractionSource::Unavailable,
            page_count: 0,
        }
    }

    /// 空文本表示"没有可恢复的文字"，不是需要中止的错误
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// 单题评分结果，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    #[serde(default)]
    pub question_number: u32,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default)]
    pub student_answer: String,
    #[serde(default)]
    pub marks_awarded: f64,
    #[serde(default)]
    pub feedback: String,
    #[serde(default, alias = "totalMarks")]
    pub total_marks: f64,
}

impl GradingResult {
    /// 评分失败时的零分行
    pub fn failed(question_number: u32, question: impl Into<String>, total_marks: f64, error: impl std::fmt::Display) -> Self {
        Self {
            question_number,
            question: question.into(),
            correct_answer: String::new(),
            student_answer: String::new(),
            marks_awarded: 0.0,
            feedback: format!("Error grading question: {}", error),
            total_marks,
        }
    }
}

/// 汇总分数
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportTotals {
    pub total_marks: f64,
    pub awarded_marks: f64,
    pub percentage: f64,
}

impl ReportTotals {
    /// 总分为 0 时百分比为 0
    pub fn from_results(results: &[GradingResult]) -> Self {
        let total_marks: f64 = results.iter().map(|r| r.total_marks).sum();
        let awarded_marks: f64 = results.iter().map(|r| r.marks_awarded).sum();
        let percentage = if total_marks > 0.0 {
            awarded_marks / total_marks * 100.0
        } else {
            0.0
        };
        Self {
            total_marks,
            awarded_marks,
            percentage,
        }
    }
}

/// 评分报告（交给报告渲染器）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingReport {
    pub student_name: String,
    pub exam_title: String,
    pub results: Vec<GradingResult>,
    pub total_marks: f64,
    pub awarded_marks: f64,
    pub percentage: f64,
    #[serde(default)]
    pub feedback: Option<String>,
    pub generated_at: DateTime<Local>,
}

impl GradingReport {
    pub fn new(
        student_name: impl Into<String>,
        exam_title: impl Into<String>,
        results: Vec<GradingResult>,
        feedback: Option<String>,
    ) -> Self {
        let totals = ReportTotals::from_results(&results);
        Self {
            student_name: student_name.into(),
            exam_title: exam_title.into(),
            results,
            total_marks: totals.total_marks,
            awarded_marks: totals.awarded_marks,
            percentage: totals.percentage,
            feedback,
            generated_at: Local::now(),
        }
    }

    pub fn totals(&self) -> ReportTotals {
        ReportTotals {
            total_marks: self.total_marks,
            awarded_marks: self.awarded_marks,
            percentage: self.percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(awarded: f64, total: f64) -> GradingResult {
        GradingResult {
            question_number: 1,
            question: "q".to_string(),
            correct_answer: String::new(),
            student_answer: String::new(),
            marks_awarded: awarded,
            feedback: String::new(),
            total_marks: total,
        }
    }

    #[test]
    fn test_totals_and_percentage() {
        let totals = ReportTotals::from_results(&[result(8.0, 10.0), result(2.0, 10.0)]);
        assert_eq!(totals.total_marks, 20.0);
        assert_eq!(totals.awarded_marks, 10.0);
        assert!((totals.percentage - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_total_guards_percentage() {
        let totals = ReportTotals::from_results(&[result(0.0, 0.0)]);
        assert_eq!(totals.percentage, 0.0);
        assert_eq!(ReportTotals::from_results(&[]).percentage, 0.0);
    }

    #[test]
    fn test_result_accepts_camel_case_total() {
        let r: GradingResult =
            serde_json::from_str(r#"{"marks_awarded": 3, "totalMarks": 5}"#).unwrap();
        assert_eq!(r.total_marks, 5.0);
        assert_eq!(r.marks_awarded, 3.0);
        assert!(r.question.is_empty());
    }
}
