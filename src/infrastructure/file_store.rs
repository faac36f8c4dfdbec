//! 文件存储 - 基础设施层
//!
//! 只负责"存/取/删"能力：评分报告与临时文件，不关心评分流程

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::models::GradingReport;

/// 文件存储
///
/// 职责：
/// - 将评分报告以 JSON 写入报告目录
/// - 读取、删除单个文件
/// - 创建随 drop 自动删除的临时文件
#[derive(Debug, Clone)]
pub struct FileStore {
    report_folder: PathBuf,
}

impl FileStore {
    pub fn new(report_folder: impl Into<PathBuf>) -> Self {
        Self {
            report_folder: report_folder.into(),
        }
    }

    pub fn report_folder(&self) -> &Path {
        &self.report_folder
    }

    /// 保存评分报告
    ///
    /// 文件名为 `<学生>_<毫秒时间戳>_<随机后缀>.json`，同名学生同一时刻保存也不会互相覆盖；
    /// 返回写入的路径
    pub async fn save_report(&self, report: &GradingReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.report_folder)
            .await
            .with_context(|| format!("无法创建报告目录: {}", self.report_folder.display()))?;

        let suffix = Uuid::new_v4().simple().to_string();
        let file_name = format!(
            "{}_{}_{}.json",
            sanitize_file_stem(&report.student_name),
            report.generated_at.format("%Y%m%d_%H%M%S_%3f"),
            &suffix[..8]
        );
        let path = self.report_folder.join(file_name);

        let json = serde_json::to_string_pretty(report)?;
        fs::write(&path, json)
            .await
            .with_context(|| format!("无法写入报告: {}", path.display()))?;

        debug!("报告已写入: {}", path.display());
        Ok(path)
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path)
            .await
            .with_context(|| format!("无法读取文件: {}", path.display()))
    }

    /// 删除文件；文件不存在时视为成功
    pub async fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("无法删除文件: {}", path.display())),
        }
    }

    /// 写入内容到临时文件，文件在返回值 drop 时删除
    pub fn temp_file(contents: &[u8], suffix: &str) -> Result<NamedTempFile> {
        use std::io::Write;

        let mut file = tempfile::Builder::new()
            .prefix("smart-grade-")
            .suffix(suffix)
            .tempfile()
            .context("无法创建临时文件")?;
        file.write_all(contents).context("无法写入临时文件")?;
        file.flush()?;
        Ok(file)
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new("static/reports")
    }
}

/// 文件名只保留字母数字、`-`、`_`，其余替换为 `_`
fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "student".to_string()
    } else {
        stem
    }
}
