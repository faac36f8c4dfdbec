//! 批量答卷处理器 - 编排层
//!
//! ## 职责
//!
//! 用同一份标准答案批改多份学生答卷，负责并发控制与全局统计。
//!
//! ## 核心功能
//!
//! 1. **标准答案只处理一次**：提取、分段后在所有答卷间共享
//! 2. **并发控制**：使用 Semaphore 限制同时批改的答卷数量
//! 3. **分批处理**：每批完成后再开始下一批
//! 4. **报告落盘**：每份报告通过 `FileStore` 保存为 JSON
//! 5. **全局统计**：汇总成功/失败数量
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单份答卷的细节，委托 `GradingFlow`
//! - **失败隔离**：单份答卷失败不影响其它答卷

use anyhow::Result;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::{FileStore, LanguageModel, OpenAiClient, VisionModel};
use crate::models::{Document, QaPair};
use crate::utils::logging;
use crate::workflow::{GradingFlow, GradingMode, SubmissionCtx};

/// 一份待批改的学生答卷
#[derive(Debug, Clone)]
pub struct Submission {
    pub student_name: String,
    pub path: PathBuf,
}

impl Submission {
    pub fn new(student_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            student_name: student_name.into(),
            path: path.into(),
        }
    }

    /// 以文件名（不含扩展名）作为学生姓名
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let student_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "student".to_string());
        Self { student_name, path }
    }
}

/// 处理统计
#[derive(Debug, Default, Clone)]
pub struct ProcessingStats {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
    /// 已保存的报告路径
    pub reports: Vec<PathBuf>,
}

/// 批次处理结果
#[derive(Debug, Default)]
struct BatchResult {
    success: usize,
    failed: usize,
    reports: Vec<PathBuf>,
}

/// 应用主结构
pub struct App<M> {
    config: Config,
    flow: Arc<GradingFlow<M>>,
    store: FileStore,
}

impl App<OpenAiClient> {
    /// 使用 OpenAI 兼容客户端初始化应用
    pub fn initialize(config: Config) -> Result<Self> {
        let flow = Arc::new(GradingFlow::from_config(&config)?);
        Ok(Self::new(config, flow))
    }
}

impl<M: LanguageModel + VisionModel + 'static> App<M> {
    pub fn new(config: Config, flow: Arc<GradingFlow<M>>) -> Self {
        let store = FileStore::new(&config.report_folder);
        Self {
            config,
            flow,
            store,
        }
    }

    pub fn flow(&self) -> &Arc<GradingFlow<M>> {
        &self.flow
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// 运行批量评分
    pub async fn run(
        &self,
        key_path: &Path,
        submissions: Vec<Submission>,
        mode: GradingMode,
        exam_title: &str,
    ) -> Result<ProcessingStats> {
        logging::log_startup(mode.label(), self.config.max_concurrent_gradings);

        if submissions.is_empty() {
            warn!("⚠️ 没有待批改的答卷，程序结束");
            return Ok(ProcessingStats::default());
        }

        info!("\n📁 正在处理标准答案: {}", key_path.display());
        let key = Document::from_path(key_path).await?;
        let key_doc = self.flow.process_document(&key).await;
        if key_doc.pairs.is_empty() {
            warn!("⚠️ 标准答案没有解析出问答对，所有题目将按空答案评分");
        }

        let stats = self
            .process_all(
                Arc::new(key_doc.pairs),
                submissions,
                Arc::new(mode),
                exam_title,
            )
            .await?;

        logging::print_final_stats(
            stats.success,
            stats.failed,
            stats.total,
            &self.config.report_folder,
        );
        Ok(stats)
    }

    /// 分批处理所有答卷
    async fn process_all(
        &self,
        key_pairs: Arc<Vec<QaPair>>,
        submissions: Vec<Submission>,
        mode: Arc<GradingMode>,
        exam_title: &str,
    ) -> Result<ProcessingStats> {
        let batch_size = self.config.max_concurrent_gradings.max(1);
        let semaphore = Arc::new(Semaphore::new(batch_size));
        let total = submissions.len();
        let total_batches = total.div_ceil(batch_size);
        let mut stats = ProcessingStats {
            total,
            ..Default::default()
        };

        for (batch_idx, batch) in submissions.chunks(batch_size).enumerate() {
            let batch_start = batch_idx * batch_size;
            logging::log_batch_start(
                batch_idx + 1,
                total_batches,
                batch_start + 1,
                batch_start + batch.len(),
                total,
            );

            let result = self
                .process_batch(
                    batch,
                    batch_start,
                    &key_pairs,
                    &mode,
                    exam_title,
                    semaphore.clone(),
                )
                .await?;

            logging::log_batch_complete(batch_idx + 1, result.success, batch.len());
            stats.success += result.success;
            stats.failed += result.failed;
            stats.reports.extend(result.reports);
        }

        Ok(stats)
    }

    /// 处理单个批次
    async fn process_batch(
        &self,
        batch: &[Submission],
        batch_start: usize,
        key_pairs: &Arc<Vec<QaPair>>,
        mode: &Arc<GradingMode>,
        exam_title: &str,
        semaphore: Arc<Semaphore>,
    ) -> Result<BatchResult> {
        let mut handles = Vec::with_capacity(batch.len());

        for (idx, submission) in batch.iter().enumerate() {
            let permit = semaphore.clone().acquire_owned().await?;
            let ctx = SubmissionCtx::new(
                submission.student_name.clone(),
                exam_title,
                batch_start + idx + 1,
            );
            let path = submission.path.clone();
            let flow = Arc::clone(&self.flow);
            let store = self.store.clone();
            let key_pairs = Arc::clone(key_pairs);
            let mode = Arc::clone(mode);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let student = Document::from_path(&path).await?;
                let report = flow
                    .grade_submission(&key_pairs, &student, &mode, &ctx)
                    .await;
                let saved = store.save_report(&report).await?;
                info!("{} 💾 报告已保存: {}", ctx, saved.display());
                Ok::<PathBuf, anyhow::Error>(saved)
            }));
        }

        let mut result = BatchResult::default();
        for (idx, outcome) in join_all(handles).await.into_iter().enumerate() {
            let submission = &batch[idx];
            match outcome {
                Ok(Ok(saved)) => {
                    result.success += 1;
                    result.reports.push(saved);
                }
                Ok(Err(e)) => {
                    error!("[答卷 {}] ❌ 处理过程中发生错误: {:#}", submission.student_name, e);
                    result.failed += 1;
                }
                Err(e) => {
                    error!("[答卷 {}] 任务执行失败: {}", submission.student_name, e);
                    result.failed += 1;
                }
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_name_from_path() {
        let submission = Submission::from_path("/tmp/scans/alice_smith.pdf");
        assert_eq!(submission.student_name, "alice_smith");
        assert_eq!(submission.path, PathBuf::from("/tmp/scans/alice_smith.pdf"));
    }
}
