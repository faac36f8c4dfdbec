use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::GradingError;

/// 单题评分标准
///
/// `rubric` 为开放映射（评分项名称 → 权重/说明），原样转述给模型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRubric {
    /// 题号（≥1）
    pub question_number: u32,
    pub question_text: String,
    pub total_marks: u32,
    #[serde(default, alias = "criteria")]
    pub rubric: BTreeMap<String, serde_json::Value>,
}

impl QuestionRubric {
    /// 评分项渲染为 `名称: 说明` 行，跳过 totalMarks
    pub fn criteria_lines(&self) -> String {
        self.rubric
            .iter()
            .filter(|(k, _)| k.as_str() != "totalMarks")
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => format!("{}: {}", k, s),
                other => format!("{}: {}", k, other),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 评分标准：题目顺序决定与问答对列表的位置对齐
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub questions: Vec<QuestionRubric>,
}

impl Rubric {
    pub fn new(questions: Vec<QuestionRubric>) -> Self {
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn total_marks(&self) -> u32 {
        self.questions.iter().map(|q| q.total_marks).sum()
    }

    /// 校验：至少一题，题号 ≥ 1，题干非空
    pub fn validate(&self) -> Result<(), GradingError> {
        if self.questions.is_empty() {
            return Err(GradingError::InvalidRubric("评分标准中没有题目".to_string()));
        }
        for (i, q) in self.questions.iter().enumerate() {
            if q.question_number < 1 {
                return Err(GradingError::InvalidRubric(format!(
                    "第 {} 题的题号必须 ≥ 1",
                    i + 1
                )));
            }
            if q.question_text.trim().is_empty() {
                return Err(GradingError::InvalidRubric(format!(
                    "第 {} 题缺少题干",
                    q.question_number
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case() {
        let json = r#"{
            "questions": [
                {"questionNumber": 1, "questionText": "Define osmosis", "totalMarks": 5,
                 "rubric": {"accuracy": "3 marks for a correct definition", "clarity": 2}}
            ]
        }"#;
        let rubric: Rubric = serde_json::from_str(json).unwrap();
        assert_eq!(rubric.len(), 1);
        assert_eq!(rubric.total_marks(), 5);
        let lines = rubric.questions[0].criteria_lines();
        assert!(lines.contains("accuracy: 3 marks for a correct definition"));
        assert!(lines.contains("clarity: 2"));
        assert!(rubric.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_question_number() {
        let rubric = Rubric::new(vec![QuestionRubric {
            question_number: 0,
            question_text: "Q".to_string(),
            total_marks: 1,
            rubric: BTreeMap::new(),
        }]);
        assert!(rubric.validate().is_err());
        assert!(Rubric::default().validate().is_err());
    }
}
