use crate::error::ConfigError;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时评分的学生答卷数量
    pub max_concurrent_gradings: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 评分报告输出目录
    pub report_folder: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    /// 用于结构化与评分的语言模型
    pub llm_model_name: String,
    /// 用于文字提取的视觉模型
    pub vision_model_name: String,
    /// 评分温度（接近确定性）
    pub grading_temperature: f32,
    /// 结构化温度（需逐字保留原文）
    pub structuring_temperature: f32,
    pub llm_max_tokens: u32,
    // --- 消息总线配置 ---
    /// 编排器在总线上的身份，必填
    pub bus_main_agent_id: String,
    /// 评分工作流等待响应的超时（毫秒）
    pub workflow_timeout_ms: u64,
    /// 文档处理工作流等待响应的超时（毫秒）
    pub document_timeout_ms: u64,
    /// 单个 agent 处理一条指令的超时（毫秒）
    pub agent_timeout_ms: u64,
    /// 发送失败时的尝试次数
    pub send_attempts: u32,
    // --- 光栅化配置 ---
    pub pdftoppm_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_gradings: 4,
            verbose_logging: false,
            report_folder: "static/reports".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            vision_model_name: "pixtral-12b-2409".to_string(),
            grading_temperature: 0.1,
            structuring_temperature: 0.1,
            llm_max_tokens: 4096,
            bus_main_agent_id: "grading-system".to_string(),
            workflow_timeout_ms: 60_000,
            document_timeout_ms: 30_000,
            agent_timeout_ms: 120_000,
            send_attempts: 2,
            pdftoppm_path: "pdftoppm".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_gradings: env_parse("MAX_CONCURRENT_GRADINGS", default.max_concurrent_gradings),
            verbose_logging: env_parse("VERBOSE_LOGGING", default.verbose_logging),
            report_folder: std::env::var("REPORT_FOLDER").unwrap_or(default.report_folder),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            vision_model_name: std::env::var("VISION_MODEL_NAME").unwrap_or(default.vision_model_name),
            grading_temperature: env_parse("GRADING_TEMPERATURE", default.grading_temperature),
            structuring_temperature: env_parse("STRUCTURING_TEMPERATURE", default.structuring_temperature),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS", default.llm_max_tokens),
            bus_main_agent_id: std::env::var("BUS_MAIN_AGENT_ID").unwrap_or(default.bus_main_agent_id),
            workflow_timeout_ms: env_parse("WORKFLOW_TIMEOUT_MS", default.workflow_timeout_ms),
            document_timeout_ms: env_parse("DOCUMENT_TIMEOUT_MS", default.document_timeout_ms),
            agent_timeout_ms: env_parse("AGENT_TIMEOUT_MS", default.agent_timeout_ms),
            send_attempts: env_parse("SEND_ATTEMPTS", default.send_attempts),
            pdftoppm_path: std::env::var("PDFTOPPM_PATH").unwrap_or(default.pdftoppm_path),
        }
    }

    /// 检查编排所需的配置项
    ///
    /// 缺少任一必需项时返回第一个缺失的配置名
    pub fn validate_for_workflow(&self) -> Result<(), ConfigError> {
        if self.bus_main_agent_id.trim().is_empty() {
            return Err(ConfigError::MissingValue {
                name: "BUS_MAIN_AGENT_ID".to_string(),
            });
        }
        if self.workflow_timeout_ms == 0 {
            return Err(ConfigError::MissingValue {
                name: "WORKFLOW_TIMEOUT_MS".to_string(),
            });
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
