//! 基础设施层
//!
//! 持有外部资源（模型端点、光栅化引擎、文件系统），只暴露最小能力

pub mod file_store;
pub mod llm_client;
pub mod rasterizer;

pub use file_store::FileStore;
pub use llm_client::{CompletionOptions, EncodedImage, LanguageModel, OpenAiClient, VisionModel};
pub use rasterizer::{PdfRasterizer, PdfiumRasterizer, PopplerRasterizer};
