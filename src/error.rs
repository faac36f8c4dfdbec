use thiserror::Error;

/// 应用程序错误类型
///
/// 分类与降级策略一致：OCR / 幻觉 / 分段 / 评分 这几类错误在各自阶段内被吸收，
/// 只有编排层错误会作为整体失败返回给调用方。
#[derive(Debug, Error)]
pub enum AppError {
    /// OCR（图像规范化、文字提取）错误
    #[error("OCR错误: {0}")]
    Ocr(#[from] OcrError),
    /// 问答分段错误
    #[error("分段错误: {0}")]
    Segmentation(#[from] SegmentationError),
    /// 评分错误
    #[error("评分错误: {0}")]
    Grading(#[from] GradingError),
    /// 编排层错误
    #[error("编排错误: {0}")]
    Orchestration(#[from] OrchestrationError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),
    /// TOML 解析失败
    #[error("TOML解析失败: {0}")]
    Toml(#[from] toml::de::Error),
}

/// OCR 相关错误
#[derive(Debug, Error)]
pub enum OcrError {
    /// 文档为空
    #[error("文档为空: {name}")]
    EmptyDocument { name: String },
    /// 某个光栅化引擎失败
    #[error("PDF光栅化失败 ({engine}, {dpi} DPI): {reason}")]
    RasterizeFailed {
        engine: &'static str,
        dpi: u32,
        reason: String,
    },
    /// 光栅化成功但没有得到任何页面
    #[error("PDF没有可用页面 ({engine})")]
    NoPages { engine: &'static str },
    /// 所有降级方案都失败
    #[error("所有规范化方案均失败: {name}")]
    NormalizationExhausted { name: String },
    /// 图像解码/编码失败
    #[error("图像处理失败: {0}")]
    Image(#[from] image::ImageError),
    /// 视觉模型调用失败
    #[error("视觉模型调用失败 (模型: {model}): {reason}")]
    VisionCallFailed { model: String, reason: String },
}

/// 分段相关错误
#[derive(Debug, Error)]
pub enum SegmentationError {
    /// 结构化调用失败
    #[error("结构化文本失败: {0}")]
    StructuringFailed(String),
    /// 结构化文本被判定为幻觉
    #[error("结构化文本疑似幻觉: {rule}")]
    Hallucinated { rule: String },
}

/// 评分相关错误
#[derive(Debug, Error)]
pub enum GradingError {
    /// LLM 调用失败
    #[error("LLM API调用失败 (模型: {model}): {reason}")]
    ApiCallFailed { model: String, reason: String },
    /// LLM 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 评分标准无效
    #[error("评分标准无效: {0}")]
    InvalidRubric(String),
}

/// 编排层错误
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// 编排会话尚未初始化
    #[error("编排会话未初始化")]
    NotInitialized,
    /// 消息总线不可达
    #[error("无法连接消息总线")]
    BusUnreachable,
    /// 创建线程失败
    #[error("创建线程失败: {name}")]
    ThreadCreationFailed { name: String },
    /// 线程不存在
    #[error("线程不存在: {name}")]
    ThreadNotFound { name: String },
    /// 发送消息失败
    #[error("发送消息失败 (线程: {thread}, 目标: {mention})")]
    SendFailed { thread: String, mention: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 必需的配置项缺失
    #[error("缺少必需的配置项: {name}")]
    MissingValue { name: String },
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Ocr(OcrError::Image(err))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_error_display() {
        let err: AppError = OrchestrationError::ThreadNotFound {
            name: "grading-workflow".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "编排错误: 线程不存在: grading-workflow");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingValue {
            name: "BUS_MAIN_AGENT_ID".to_string(),
        };
        assert!(err.to_string().contains("BUS_MAIN_AGENT_ID"));
    }
}
