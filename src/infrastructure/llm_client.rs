//! 模型客户端 - 基础设施层
//!
//! 只负责"调用模型"能力，不关心评分流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Mistral, Doubao 等）

use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use base64::Engine as _;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{GradingError, OcrError};

/// 单次补全请求的参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 4096,
        }
    }
}

/// 送入视觉模型的已编码图像（总是有损格式）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            mime: "image/jpeg",
            bytes,
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// base64 编码后的长度（字节）
    pub fn base64_len(&self) -> usize {
        self.bytes.len().div_ceil(3) * 4
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.to_base64())
    }
}

/// 语言模型：`complete(prompt) -> text`
///
/// 期望返回 JSON 时也可能带代码块或多余说明，调用方需自行容错
pub trait LanguageModel: Send + Sync {
    fn complete(
        &self,
        prompt: &str,
        options: CompletionOptions,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// 视觉语言模型：`complete(prompt, image) -> text`
pub trait VisionModel: Send + Sync {
    fn complete_with_image(
        &self,
        prompt: &str,
        image: &EncodedImage,
    ) -> impl Future<Output = Result<String>> + Send;
}

impl<T: LanguageModel> LanguageModel for Arc<T> {
    fn complete(
        &self,
        prompt: &str,
        options: CompletionOptions,
    ) -> impl Future<Output = Result<String>> + Send {
        (**self).complete(prompt, options)
    }
}

impl<T: VisionModel> VisionModel for Arc<T> {
    fn complete_with_image(
        &self,
        prompt: &str,
        image: &EncodedImage,
    ) -> impl Future<Output = Result<String>> + Send {
        (**self).complete_with_image(prompt, image)
    }
}

/// OpenAI 兼容的模型客户端
///
/// 同时实现 [`LanguageModel`]（结构化、评分、反馈）与 [`VisionModel`]（文字提取）
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    vision_model_name: String,
    max_tokens: u32,
}

impl OpenAiClient {
    /// 创建新的模型客户端
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
            vision_model_name: config.vision_model_name.clone(),
            max_tokens: config.llm_max_tokens,
        }
    }

    /// 通用的模型调用函数
    ///
    /// # 参数
    /// - `model`: 模型名称
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    /// - `image`: 图片（可选），以 data URL 形式附加到用户消息中
    /// - `options`: 温度与最大 token 数
    ///
    /// # 返回
    /// 返回模型的响应内容（已去除首尾空白）
    pub async fn send_to_llm(
        &self,
        model: &str,
        user_message: &str,
        system_message: Option<&str>,
        image: Option<&EncodedImage>,
        options: CompletionOptions,
    ) -> Result<String> {
        debug!("调用模型 API，模型: {}", model);
        debug!("用户消息长度: {} 字符", user_message.len());

        // 构建消息列表
        let mut messages = Vec::new();

        // 添加系统消息（如果提供）
        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        // 构建用户消息内容（支持图片）
        let user_msg = match image {
            Some(image) => {
                debug!(
                    "使用 Vision API，图片大小: {} 字节 ({})",
                    image.bytes.len(),
                    image.mime
                );
                let content_parts = vec![
                    ChatCompletionRequestUserMessageContentPart::Text(
                        ChatCompletionRequestMessageContentPartText {
                            text: user_message.to_string(),
                        },
                    ),
                    ChatCompletionRequestUserMessageContentPart::ImageUrl(
                        ChatCompletionRequestMessageContentPartImage {
                            image_url: ImageUrl {
                                url: image.data_url(),
                                detail: Some(ImageDetail::High),
                            },
                        },
                    ),
                ];
                ChatCompletionRequestUserMessageArgs::default()
                    .content(ChatCompletionRequestUserMessageContent::Array(
                        content_parts,
                    ))
                    .build()?
            }
            None => ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()?,
        };

        messages.push(ChatCompletionRequestMessage::User(user_msg));

        // 构建请求
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(options.temperature)
            .max_tokens(options.max_tokens.min(self.max_tokens))
            .build()?;

        // 调用 API
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("模型 API 调用失败: {}", e);
            GradingError::ApiCallFailed {
                model: model.to_string(),
                reason: e.to_string(),
            }
        })?;

        debug!("模型 API 调用成功");

        // 提取响应内容
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| GradingError::EmptyContent {
                model: model.to_string(),
            })?;

        Ok(content.trim().to_string())
    }
}

impl LanguageModel for OpenAiClient {
    async fn complete(&self, prompt: &str, options: CompletionOptions) -> Result<String> {
        self.send_to_llm(&self.model_name, prompt, None, None, options)
            .await
    }
}

impl VisionModel for OpenAiClient {
    async fn complete_with_image(&self, prompt: &str, image: &EncodedImage) -> Result<String> {
        let options = CompletionOptions {
            temperature: 0.0,
            max_tokens: self.max_tokens,
        };
        self.send_to_llm(&self.vision_model_name, prompt, None, Some(image), options)
            .await
            .map_err(|e| {
                OcrError::VisionCallFailed {
                    model: self.vision_model_name.clone(),
                    reason: e.to_string(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 创建测试用的客户端
    fn create_test_client() -> OpenAiClient {
        let config = Config {
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
            ..Config::default()
        };
        OpenAiClient::new(&config)
    }

    #[test]
    fn test_encoded_image_data_url() {
        let image = EncodedImage::jpeg(vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(image.data_url(), "data:image/jpeg;base64,/9j/");
        assert_eq!(image.base64_len(), image.to_base64().len());
    }

    #[test]
    fn test_base64_len_matches_padding() {
        for n in 0..10 {
            let image = EncodedImage::jpeg(vec![7u8; n]);
            assert_eq!(image.base64_len(), image.to_base64().len());
        }
    }

    /// 测试通用模型调用（需要真实 API）
    #[tokio::test]
    #[ignore]
    async fn test_send_to_llm_simple() {
        let _ = tracing_subscriber::fmt::try_init();

        let client = create_test_client();
        let result = client
            .complete("Reply with the single word: ready", CompletionOptions::default())
            .await;

        match result {
            Ok(response) => {
                println!("LLM 响应: {}", response);
                assert!(!response.is_empty());
            }
            Err(e) => panic!("测试失败: {}", e),
        }
    }
}
