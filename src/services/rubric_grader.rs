//! 评分服务 - 业务能力层
//!
//! 只负责"单题打分"能力，两种模式：
//! - 评分标准模式：模型给 0-100 的掌握度，本地按题目满分线性换算
//! - 简单模式：无评分标准，模型直接给绝对分，本地截断到 `[0, 满分]`
//!
//! 每题独立：一题出错只会得到一行零分记录，不影响其他题目。

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::infrastructure::{CompletionOptions, LanguageModel};
use crate::models::{GradingResult, QaPair, QuestionRubric, Rubric};
use crate::utils::{lenient_f64, strip_code_fences};

const NO_FEEDBACK: &str = "No feedback provided.";

/// 评分服务
///
/// 职责：
/// - 按位置对齐评分标准、标准答案、学生答案
/// - 调用语言模型并容错解析 JSON
/// - 分数换算与截断在本地完成，不信任模型
pub struct RubricGrader<L> {
    model: L,
    options: CompletionOptions,
}

impl<L: LanguageModel> RubricGrader<L> {
    pub fn new(model: L, temperature: f32) -> Self {
        Self {
            model,
            options: CompletionOptions {
                temperature,
                max_tokens: 1000,
            },
        }
    }

    /// 评分标准模式
    ///
    /// 第 i 题使用第 i 个标准答案与第 i 个学生答案；越界时以空串代替。
    /// 返回行数总是等于评分标准的题目数。
    pub async fn grade_with_rubric(
        &self,
        rubric: &Rubric,
        key_pairs: &[QaPair],
        student_pairs: &[QaPair],
    ) -> Vec<GradingResult> {
        info!(
            "开始评分: {} 道题 (标准答案 {} 对, 学生答案 {} 对)",
            rubric.len(),
            key_pairs.len(),
            student_pairs.len()
        );

        let mut results = Vec::with_capacity(rubric.len());
        for (i, question) in rubric.questions.iter().enumerate() {
            let correct_answer = key_pairs.get(i).map(|p| p.answer.as_str()).unwrap_or("");
            let student_answer = student_pairs.get(i).map(|p| p.answer.as_str()).unwrap_or("");
            let total_marks = f64::from(question.total_marks);

            let row = match self
                .grade_rubric_question(question, correct_answer, student_answer)
                .await
            {
                Ok((marks_awarded, feedback)) => {
                    debug!(
                        "第 {} 题: {:.2}/{}",
                        question.question_number, marks_awarded, question.total_marks
                    );
                    GradingResult {
                        question_number: question.question_number,
                        question: question.question_text.clone(),
                        correct_answer: correct_answer.to_string(),
                        student_answer: student_answer.to_string(),
                        marks_awarded,
                        feedback,
                        total_marks,
                    }
                }
                Err(e) => {
                    warn!("⚠️ 第 {} 题评分失败: {:#}", question.question_number, e);
                    GradingResult::failed(
                        question.question_number,
                        question.question_text.clone(),
                        total_marks,
                        format!("{:#}", e),
                    )
                }
            };
            results.push(row);
        }

        results
    }

    /// 单题评分（评分标准模式）
    ///
    /// 模型调用失败返回错误；JSON 解析失败返回 0 分及解析错误说明
    pub async fn grade_rubric_question(
        &self,
        question: &QuestionRubric,
        correct_answer: &str,
        student_answer: &str,
    ) -> Result<(f64, String)> {
        let prompt = rubric_prompt(question, correct_answer, student_answer);
        let response = self
            .model
            .complete(&prompt, self.options)
            .await
            .context("评分模型调用失败")?;
        Ok(parse_rubric_response(&response, question.total_marks))
    }

    /// 简单模式
    ///
    /// 题目数以标准答案为准：学生答案多则截断，少则用空问答对补齐
    pub async fn grade_simple(
        &self,
        key_pairs: &[QaPair],
        student_pairs: &[QaPair],
        total_marks: &[u32],
        criteria: &str,
    ) -> Vec<GradingResult> {
        let student_pairs = align_to_key(key_pairs, student_pairs);
        info!("开始简单模式评分: {} 道题", key_pairs.len());

        let mut results = Vec::with_capacity(key_pairs.len());
        for (i, (key, student)) in key_pairs.iter().zip(student_pairs.iter()).enumerate() {
            let question_number = (i + 1) as u32;
            let total_mark = total_marks.get(i).copied().unwrap_or(0);

            let row = match self
                .grade_simple_question(&key.question, &key.answer, &student.answer, total_mark, criteria)
                .await
            {
                Ok((marks_awarded, feedback)) => GradingResult {
                    question_number,
                    question: key.question.clone(),
                    correct_answer: key.answer.clone(),
                    student_answer: student.answer.clone(),
                    marks_awarded,
                    feedback,
                    total_marks: f64::from(total_mark),
                },
                Err(e) => {
                    warn!("⚠️ 第 {} 题评分失败: {:#}", question_number, e);
                    GradingResult::failed(
                        question_number,
                        key.question.clone(),
                        f64::from(total_mark),
                        format!("{:#}", e),
                    )
                }
            };
            results.push(row);
        }

        results
    }

    /// 单题评分（简单模式）
    pub async fn grade_simple_question(
        &self,
        question: &str,
        correct_answer: &str,
        student_answer: &str,
        total_mark: u32,
        criteria: &str,
    ) -> Result<(f64, String)> {
        let prompt = simple_prompt(question, correct_answer, student_answer, total_mark, criteria);
        let response = self
            .model
            .complete(&prompt, self.options)
            .await
            .context("评分模型调用失败")?;
        Ok(parse_simple_response(&response, total_mark))
    }
}

/// 学生答案对齐到标准答案的长度
fn align_to_key(key_pairs: &[QaPair], student_pairs: &[QaPair]) -> Vec<QaPair> {
    if key_pairs.len() != student_pairs.len() {
        warn!(
            "⚠️ 问答对数量不一致: 标准答案 {} 对, 学生答案 {} 对，按标准答案对齐",
            key_pairs.len(),
            student_pairs.len()
        );
    }
    let mut aligned: Vec<QaPair> = student_pairs.iter().take(key_pairs.len()).cloned().collect();
    aligned.resize_with(key_pairs.len(), QaPair::blank);
    aligned
}

fn rubric_prompt(question: &QuestionRubric, correct_answer: &str, student_answer: &str) -> String {
    format!(
        r#"You are an expert academic grader. Evaluate the student's answer against the correct answer using the provided rubric.

GRADING INSTRUCTIONS:
1. Compare the student's answer with the correct answer objectively
2. Apply the rubric criteria strictly and fairly
3. Award partial credit for partially correct answers
4. Consider key concepts, accuracy, and completeness
5. Provide constructive feedback that helps the student improve
6. Base your evaluation ONLY on what the student actually wrote
7. Do not penalize for minor spelling/grammar errors unless specified in rubric

QUESTION: {question}

CORRECT ANSWER: {correct_answer}

STUDENT ANSWER: {student_answer}

RUBRIC CRITERIA:
{criteria}

TOTAL MARKS: {total_marks}

Provide your evaluation in this exact JSON format (no markdown, no extra text):
{{
    "score": <number between 0 and 100>,
    "feedback": "<specific feedback on what the student did well and what needs improvement>",
    "suggestions": "<concrete suggestions for improvement>"
}}"#,
        question = question.question_text,
        correct_answer = correct_answer,
        student_answer = student_answer,
        criteria = question.criteria_lines(),
        total_marks = question.total_marks,
    )
}

fn simple_prompt(
    question: &str,
    correct_answer: &str,
    student_answer: &str,
    total_mark: u32,
    criteria: &str,
) -> String {
    format!(
        r#"You are an expert academic examiner. Grade the student's answer objectively and fairly.

GRADING INSTRUCTIONS:
1. Compare the student's answer with the correct answer
2. Award marks based on accuracy, completeness, and understanding
3. Ignore minor spelling and grammar errors unless they affect meaning
4. Award partial credit for partially correct answers
5. Base evaluation ONLY on what the student actually wrote
6. Provide constructive feedback to help the student improve

QUESTION: {question}

CORRECT ANSWER: {correct_answer}

STUDENT ANSWER: {student_answer}

GRADING CRITERIA: {criteria}

TOTAL MARKS AVAILABLE: {total_mark}

Return ONLY this JSON format (no markdown, no extra text):
{{
    "marks_awarded": <number between 0 and {total_mark}>,
    "feedback": "<specific feedback on what the student did well and what needs improvement>"
}}"#
    )
}

fn parse_json_object(response: &str) -> Result<serde_json::Map<String, Value>, String> {
    match serde_json::from_str::<Value>(strip_code_fences(response)) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", other)),
        Err(e) => Err(e.to_string()),
    }
}

fn text_field(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 解析 `{score, feedback, suggestions}`，分数截断到 0-100 后按满分换算
pub fn parse_rubric_response(response: &str, total_marks: u32) -> (f64, String) {
    let map = match parse_json_object(response) {
        Ok(map) => map,
        Err(e) => {
            warn!("⚠️ 评分结果不是有效 JSON: {}", e);
            return (0.0, format!("Error parsing grading response: {}", e));
        }
    };

    let score = map
        .get("score")
        .and_then(lenient_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 100.0);
    let awarded = score / 100.0 * f64::from(total_marks);

    let mut feedback = text_field(&map, "feedback").unwrap_or_else(|| NO_FEEDBACK.to_string());
    if let Some(suggestions) = text_field(&map, "suggestions") {
        feedback.push_str("\n\nSuggestions: ");
        feedback.push_str(&suggestions);
    }

    (awarded, feedback)
}

/// 解析 `{marks_awarded, feedback}`，分数截断到 `[0, total_mark]`
pub fn parse_simple_response(response: &str, total_mark: u32) -> (f64, String) {
    let map = match parse_json_object(response) {
        Ok(map) => map,
        Err(e) => {
            warn!("⚠️ 评分结果不是有效 JSON: {}", e);
            return (0.0, format!("Error parsing grading response: {}", e));
        }
    };

    let marks = map
        .get("marks_awarded")
        .and_then(lenient_f64)
        .unwrap_or(0.0)
        .clamp(0.0, f64::from(total_mark));
    let feedback = text_field(&map, "feedback").unwrap_or_else(|| NO_FEEDBACK.to_string());

    (marks, feedback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 按调用顺序返回脚本回复，`None` 表示调用失败
    struct ScriptedModel {
        replies: Vec<Option<&'static str>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Option<&'static str>>) -> Self {
            Self {
                replies,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl LanguageModel for ScriptedModel {
        async fn complete(&self, _prompt: &str, options: CompletionOptions) -> Result<String> {
            assert!(options.temperature <= 0.2);
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(i).copied().flatten() {
                Some(reply) => Ok(reply.to_string()),
                None => Err(anyhow::anyhow!("connection reset")),
            }
        }
    }

    fn question(n: u32, total: u32) -> QuestionRubric {
        QuestionRubric {
            question_number: n,
            question_text: format!("Question number {}", n),
            total_marks: total,
            rubric: BTreeMap::from([("accuracy".to_string(), Value::from("full marks if correct"))]),
        }
    }

    fn pairs(n: usize) -> Vec<QaPair> {
        (1..=n)
            .map(|i| QaPair::new(format!("Question number {}", i), format!("answer {}", i)))
            .collect()
    }

    #[test]
    fn test_rubric_score_is_scaled() {
        let (awarded, feedback) =
            parse_rubric_response(r#"{"score": 80, "feedback": "Good", "suggestions": ""}"#, 10);
        assert!((awarded - 8.0).abs() < 1e-9);
        assert_eq!(feedback, "Good");
    }

    #[test]
    fn test_rubric_response_fenced_and_clamped() {
        let (awarded, feedback) = parse_rubric_response(
            "```json\n{\"score\": 140, \"feedback\": \"Great\", \"suggestions\": \"Cite sources\"}\n```",
            5,
        );
        assert_eq!(awarded, 5.0);
        assert!(feedback.starts_with("Great"));
        assert!(feedback.contains("Suggestions: Cite sources"));
    }

    #[test]
    fn test_rubric_response_invalid_json() {
        let (awarded, feedback) = parse_rubric_response("The student did well.", 10);
        assert_eq!(awarded, 0.0);
        assert!(feedback.starts_with("Error parsing grading response"));
    }

    #[test]
    fn test_simple_marks_clamped() {
        let (marks, _) = parse_simple_response(r#"{"marks_awarded": 15, "feedback": "ok"}"#, 10);
        assert_eq!(marks, 10.0);
        let (marks, _) = parse_simple_response(r#"{"marks_awarded": -3, "feedback": "ok"}"#, 10);
        assert_eq!(marks, 0.0);
        let (marks, feedback) = parse_simple_response(r#"{"marks_awarded": "4.5"}"#, 10);
        assert_eq!(marks, 4.5);
        assert_eq!(feedback, NO_FEEDBACK);
    }

    #[test]
    fn test_non_finite_marks_fall_back_to_zero() {
        let (marks, _) = parse_simple_response(r#"{"marks_awarded": "NaN"}"#, 10);
        assert_eq!(marks, 0.0);
        let (marks, _) = parse_simple_response(r#"{"marks_awarded": "inf"}"#, 10);
        assert_eq!(marks, 0.0);
        let (awarded, _) = parse_rubric_response(r#"{"score": "nan"}"#, 10);
        assert_eq!(awarded, 0.0);
    }

    #[tokio::test]
    async fn test_failed_question_is_isolated() {
        let model = ScriptedModel::new(vec![
            Some(r#"{"score": 100, "feedback": "Perfect"}"#),
            None,
            Some(r#"{"score": 50, "feedback": "Half"}"#),
        ]);
        let grader = RubricGrader::new(model, 0.1);
        let rubric = Rubric::new(vec![question(1, 4), question(2, 6), question(3, 10)]);

        let results = grader.grade_with_rubric(&rubric, &pairs(3), &pairs(3)).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].marks_awarded, 4.0);
        assert_eq!(results[1].marks_awarded, 0.0);
        assert!(results[1].feedback.starts_with("Error grading question"));
        assert_eq!(results[1].question_number, 2);
        assert_eq!(results[2].marks_awarded, 5.0);
        assert_eq!(results[2].correct_answer, "answer 3");
    }

    #[tokio::test]
    async fn test_missing_pairs_become_empty_answers() {
        let model = ScriptedModel::new(vec![
            Some(r#"{"score": 100, "feedback": "ok"}"#),
            Some(r#"{"score": 0, "feedback": "missing"}"#),
        ]);
        let grader = RubricGrader::new(model, 0.1);
        let rubric = Rubric::new(vec![question(1, 2), question(2, 2)]);

        let results = grader.grade_with_rubric(&rubric, &pairs(2), &pairs(1)).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].student_answer, "");
        assert_eq!(results[1].correct_answer, "answer 2");
    }

    #[tokio::test]
    async fn test_simple_mode_pads_and_truncates() {
        let reply = Some(r#"{"marks_awarded": 15, "feedback": "ok"}"#);
        let grader = RubricGrader::new(ScriptedModel::new(vec![reply; 3]), 0.1);

        // 学生答案少：补齐
        let results = grader.grade_simple(&pairs(3), &pairs(1), &[10, 5], "accuracy").await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].marks_awarded, 10.0);
        assert_eq!(results[1].marks_awarded, 5.0);
        assert_eq!(results[1].student_answer, "");
        // 没有对应分值的题目满分为 0
        assert_eq!(results[2].total_marks, 0.0);
        assert_eq!(results[2].marks_awarded, 0.0);

        // 学生答案多：截断
        let aligned = align_to_key(&pairs(1), &pairs(3));
        assert_eq!(aligned.len(), 1);
    }
}
