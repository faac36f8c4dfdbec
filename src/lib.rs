//! # Smart Grade
//!
//! 扫描试卷自动批改：文字提取 → 问答分段 → 逐题评分 → 汇总报告
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有外部资源，只暴露能力
//! - `OpenAiClient` - 语言模型 / 视觉模型
//! - `PopplerRasterizer` / `PdfiumRasterizer` - PDF 光栅化
//! - `FileStore` - 报告与临时文件
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个文档或单道题
//! - `ImageNormalizer` - 文档 → 页面图像（降级链）
//! - `TextExtractor` + `HallucinationDetector` - 视觉模型提取文字
//! - `QaSegmenter` - 文字 → 问答对
//! - `RubricGrader` - 评分标准模式 / 简单模式
//! - `FeedbackWriter` - 总体反馈
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一份答卷"的完整处理流程
//! - `SubmissionCtx` - 上下文封装（学生 + 考试 + 序号）
//! - `GradingFlow` - 流程编排（extract → segment → grade → feedback）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量答卷处理器，管理并发
//! - `orchestrator/session` - 基于消息总线的 agent 工作流
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{FileStore, LanguageModel, OpenAiClient, VisionModel};
pub use models::{Document, GradingReport, GradingResult, QaPair, Rubric};
pub use orchestrator::{App, LocalBus, Submission, WorkflowSession};
pub use workflow::{GradingFlow, GradingMode, SubmissionCtx};
