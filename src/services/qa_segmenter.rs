//! 问答分段服务 - 业务能力层
//!
//! 两步：
//! 1. 结构化：让语言模型在每个完整问答单元后插入分隔符 `>>>>>>`，不改动原文
//! 2. 解析：按分隔符切分，再在第一个 `Answer:` 处（或第一个换行处）拆成题目与答案
//!
//! 分隔符是模型输出与本地解析之间的内部协议，必须逐字切分。

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::SegmentationError;
use crate::infrastructure::{CompletionOptions, LanguageModel};
use crate::models::QaPair;
use crate::services::hallucination::HallucinationDetector;
use crate::utils::truncate_text;

/// 问答单元分隔符
pub const SEPARATOR: &str = ">>>>>>";

/// 结构化文本短于该字符数时视为无效
const MIN_TEXT_CHARS: usize = 10;
/// 题目短于该字符数时视为误识别
const MIN_QUESTION_CHARS: usize = 5;

/// 只由这些字符（及空白）组成的片段是无意义片段
const TRIVIAL_CHARS: &str = ".,:;!?><-*_`'\"()[]{}|\\/";

const STRUCTURING_PROMPT: &str = r#"You are a text processing system that extracts question-answer pairs from academic documents.

CRITICAL INSTRUCTIONS:
1. Process the text EXACTLY as provided - do not add, modify, or interpret anything
2. Identify questions and their corresponding answers in the text
3. After each complete question-answer pair, insert the separator '>>>>>>'
4. If you find a question without an answer, include only the question (no separator)
5. Do NOT make assumptions about missing answers
6. Do NOT complete partial sentences or add missing words
7. Do NOT change the wording of questions or answers
8. Preserve the original text exactly as written
9. If text is unclear, include it as-is with [unclear] markers
10. Return ONLY the processed text with separators, no explanations

Format: Question: [exact question text] Answer: [exact answer text] >>>>>>

Process this text:
"#;

/// 问答分段服务
///
/// 职责：
/// - 调用语言模型标注问答边界
/// - 解析分隔符协议，过滤无意义片段
/// - 不补齐、不截断：数量不一致由评分方处理
pub struct QaSegmenter<L> {
    model: L,
    detector: HallucinationDetector,
    options: CompletionOptions,
    answer_label: Regex,
    question_label: Regex,
}

impl<L: LanguageModel> QaSegmenter<L> {
    /// 创建分段服务
    ///
    /// `temperature` 应接近 0：结构化需要逐字保留原文
    pub fn new(model: L, detector: HallucinationDetector, temperature: f32) -> Result<Self> {
        Ok(Self {
            model,
            detector,
            options: CompletionOptions {
                temperature,
                ..CompletionOptions::default()
            },
            answer_label: Regex::new(r"(?i)\banswer\s*:")?,
            question_label: Regex::new(r"(?i)^\s*question\b\s*\d*\s*[:.)]\s*")?,
        })
    }

    /// 结构化 + 解析
    ///
    /// 结构化调用失败或结果被判定为幻觉时返回空列表
    pub async fn segment(&self, raw_text: &str) -> Vec<QaPair> {
        if raw_text.trim().is_empty() {
            debug!("原文为空，跳过结构化");
            return Vec::new();
        }

        match self
            .structure(raw_text)
            .await
            .and_then(|structured| self.parse(&structured))
        {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!("⚠️ 分段失败，结果为空: {}", e);
                Vec::new()
            }
        }
    }

    /// 让模型插入分隔符
    pub async fn structure(&self, raw_text: &str) -> Result<String, SegmentationError> {
        let prompt = format!("{}{}", STRUCTURING_PROMPT, raw_text);
        let structured = self
            .model
            .complete(&prompt, self.options)
            .await
            .map_err(|e| SegmentationError::StructuringFailed(format!("{:#}", e)))?;
        debug!("结构化结果: {}", truncate_text(&structured, 200));
        Ok(structured)
    }

    /// 解析带分隔符的结构化文本
    ///
    /// 文本过短时返回空列表；被判定为幻觉时返回 `Hallucinated`
    pub fn parse(&self, structured: &str) -> Result<Vec<QaPair>, SegmentationError> {
        let text = structured.trim();
        if text.chars().count() < MIN_TEXT_CHARS {
            warn!("⚠️ 结构化文本过短或为空 ({} 字符)", text.chars().count());
            return Ok(Vec::new());
        }

        let verdict = self.detector.verdict(text);
        if verdict.is_flagged() {
            return Err(SegmentationError::Hallucinated {
                rule: verdict.to_string(),
            });
        }

        let mut pairs = Vec::new();
        for (i, section) in text
            .split(SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .enumerate()
        {
            if is_trivial(section) {
                debug!("片段 {} 为无意义片段，跳过", i + 1);
                continue;
            }

            let (question_part, answer) = self.split_section(section);
            if question_part.chars().count() < MIN_QUESTION_CHARS {
                warn!("⚠️ 片段 {} 的题目过短，跳过: {:?}", i + 1, question_part);
                continue;
            }

            let question = self.question_label.replace(question_part, "").trim().to_string();
            if question.is_empty() || is_trivial(&question) {
                continue;
            }

            debug!(
                "问答对 {}: 题目 {} 字符, 答案 {} 字符",
                pairs.len() + 1,
                question.chars().count(),
                answer.chars().count()
            );
            pairs.push(QaPair::new(question, answer));
        }

        info!("共解析出 {} 个问答对", pairs.len());
        Ok(pairs)
    }

    /// 在第一个 `Answer:` 标签处拆分；没有标签时第一行为题目，其余为答案
    fn split_section<'a>(&self, section: &'a str) -> (&'a str, &'a str) {
        if let Some(label) = self.answer_label.find(section) {
            return (
                section[..label.start()].trim(),
                section[label.end()..].trim(),
            );
        }
        match section.split_once('\n') {
            Some((question, answer)) => (question.trim(), answer.trim()),
            None => (section.trim(), ""),
        }
    }
}

/// 片段是否只由标点与空白组成
pub fn is_trivial(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_whitespace() || TRIVIAL_CHARS.contains(c))
}
