//! 答卷批改流程 - 流程层
//!
//! 核心职责：定义"一份答卷"的完整处理流程
//!
//! 流程顺序（严格串行）：
//! 1. 标准答案：提取文字 → 分段（批量评分时只做一次）
//! 2. 学生答卷：提取文字 → 分段
//! 3. 逐题评分（评分标准模式 / 简单模式）
//! 4. 总体反馈 → 评分报告
//!
//! 任何一步降级（空文本、空问答对、单题失败）都不会中断流程，
//! 最坏情况下也会得到一份全是零分错误行的报告。

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::infrastructure::{LanguageModel, OpenAiClient, VisionModel};
use crate::models::{Document, ExtractedText, GradingReport, QaPair, Rubric};
use crate::services::{
    FeedbackWriter, HallucinationDetector, ImageNormalizer, QaSegmenter, RubricGrader,
    TextExtractor,
};
use crate::utils::truncate_text;
use crate::workflow::grading_ctx::SubmissionCtx;

/// 评分模式
#[derive(Debug, Clone)]
pub enum GradingMode {
    /// 按评分标准逐题评分（分数按百分比折算）
    Rubric(Rubric),
    /// 只有每题满分与统一的评分要求
    Simple {
        total_marks: Vec<u32>,
        criteria: String,
    },
}

impl GradingMode {
    pub fn label(&self) -> &'static str {
        match self {
            GradingMode::Rubric(_) => "评分标准模式",
            GradingMode::Simple { .. } => "简单模式",
        }
    }
}

/// 单个文档的处理结果
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub extracted: ExtractedText,
    pub pairs: Vec<QaPair>,
}

/// 答卷批改流程
///
/// - 编排提取、分段、评分、反馈的顺序
/// - 不持有批量状态，可被多个并发任务共享
/// - 只依赖业务能力（services）
pub struct GradingFlow<M> {
    extractor: TextExtractor<Arc<M>>,
    segmenter: QaSegmenter<Arc<M>>,
    grader: RubricGrader<Arc<M>>,
    feedback: FeedbackWriter<Arc<M>>,
    verbose_logging: bool,
}

impl GradingFlow<OpenAiClient> {
    /// 使用 OpenAI 兼容客户端与默认光栅化引擎创建
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            Arc::new(OpenAiClient::new(config)),
            ImageNormalizer::new(&config.pdftoppm_path),
            config,
        )
    }
}

impl<M: LanguageModel + VisionModel> GradingFlow<M> {
    /// 创建新的批改流程
    pub fn new(model: Arc<M>, normalizer: ImageNormalizer, config: &Config) -> Result<Self> {
        let detector = HallucinationDetector::default();
        Ok(Self {
            extractor: TextExtractor::new(Arc::clone(&model), normalizer, detector.clone()),
            segmenter: QaSegmenter::new(
                Arc::clone(&model),
                detector,
                config.structuring_temperature,
            )?,
            grader: RubricGrader::new(Arc::clone(&model), config.grading_temperature),
            feedback: FeedbackWriter::new(model),
            verbose_logging: config.verbose_logging,
        })
    }

    pub fn extractor(&self) -> &TextExtractor<Arc<M>> {
        &self.extractor
    }

    pub fn segmenter(&self) -> &QaSegmenter<Arc<M>> {
        &self.segmenter
    }

    pub fn grader(&self) -> &RubricGrader<Arc<M>> {
        &self.grader
    }

    pub fn feedback(&self) -> &FeedbackWriter<Arc<M>> {
        &self.feedback
    }

    /// 提取文字并分段
    ///
    /// 没有可恢复的文字时直接返回空问答对，不调用结构化模型
    pub async fn process_document(&self, document: &Document) -> ProcessedDocument {
        let extracted = self.extractor.extract(document).await;
        if extracted.is_empty() {
            warn!("⚠️ [文档 {}] 没有可用文字，问答对为空", document.name);
            return ProcessedDocument {
                extracted,
                pairs: Vec::new(),
            };
        }

        if self.verbose_logging {
            info!(
                "[文档 {}] 提取文字: {}",
                document.name,
                truncate_text(&extracted.text, 120)
            );
        }

        let pairs = self.segmenter.segment(&extracted.text).await;
        info!("[文档 {}] 分段完成: {} 个问答对", document.name, pairs.len());
        ProcessedDocument { extracted, pairs }
    }

    /// 一份答卷的完整流程（含标准答案处理）
    pub async fn run(
        &self,
        key: &Document,
        student: &Document,
        mode: &GradingMode,
        ctx: &SubmissionCtx,
    ) -> GradingReport {
        let key_doc = self.process_document(key).await;
        if key_doc.pairs.is_empty() {
            warn!("{} ⚠️ 标准答案没有解析出问答对", ctx);
        }
        self.grade_submission(&key_doc.pairs, student, mode, ctx).await
    }

    /// 标准答案已分段时，只处理学生答卷并评分
    ///
    /// 批量评分时标准答案只需处理一次
    pub async fn grade_submission(
        &self,
        key_pairs: &[QaPair],
        student: &Document,
        mode: &GradingMode,
        ctx: &SubmissionCtx,
    ) -> GradingReport {
        info!("{} 📝 开始批改 ({}，{})", ctx, ctx.exam_title, mode.label());

        let student_doc = self.process_document(student).await;
        if student_doc.pairs.is_empty() {
            warn!("{} ⚠️ 学生答卷没有解析出问答对", ctx);
        }

        let results = match mode {
            GradingMode::Rubric(rubric) => {
                self.grader
                    .grade_with_rubric(rubric, key_pairs, &student_doc.pairs)
                    .await
            }
            GradingMode::Simple {
                total_marks,
                criteria,
            } => {
                self.grader
                    .grade_simple(key_pairs, &student_doc.pairs, total_marks, criteria)
                    .await
            }
        };
        let feedback = self.feedback.write(&results).await;

        let report = GradingReport::new(
            ctx.student_name.clone(),
            ctx.exam_title.clone(),
            results,
            Some(feedback),
        );
        self.log_report(ctx, &report);
        report
    }

    // ========== 日志辅助方法 ==========

    fn log_report(&self, ctx: &SubmissionCtx, report: &GradingReport) {
        info!(
            "{} ✓ 批改完成: {:.1}/{:.1} ({:.1}%)，共 {} 题",
            ctx,
            report.awarded_marks,
            report.total_marks,
            report.percentage,
            report.results.len()
        );
    }
}
