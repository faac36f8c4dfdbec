//! 文字提取服务 - 业务能力层
//!
//! 规范化 → 视觉模型 → 幻觉检测。任何失败都降级为空文本，从不向上抛错。

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::infrastructure::VisionModel;
use crate::models::{Document, ExtractedText, PageImage};
use crate::services::hallucination::HallucinationDetector;
use crate::services::image_normalizer::{ImageNormalizer, Normalized};
use crate::utils::truncate_text;

/// 交给视觉模型的提取指令：只转写可见文字，看不清的用 [unclear] 标注
pub const OCR_PROMPT: &str = r#"You are an OCR (Optical Character Recognition) system. Your task is to extract text from this image with 100% accuracy.

CRITICAL INSTRUCTIONS:
1. Extract ONLY the text that is actually visible in the image
2. Do NOT add, modify, or interpret any text
3. Do NOT make assumptions about missing words
4. Do NOT complete partial sentences
5. If text is unclear or partially visible, transcribe exactly what you can see
6. Preserve the original formatting, line breaks, and structure
7. If you cannot read something, use [unclear] instead of guessing
8. Do NOT add any explanations, comments, or additional text
9. Return ONLY the extracted text, nothing else

Extract the text now:"#;

/// 文字提取服务
///
/// 职责：
/// - 每个规范化页面调用一次视觉模型
/// - 按页序拼接，多页时插入页标记
/// - 被判定为幻觉的输出整体丢弃
pub struct TextExtractor<V> {
    vision: V,
    normalizer: ImageNormalizer,
    detector: HallucinationDetector,
}

impl<V: VisionModel> TextExtractor<V> {
    pub fn new(vision: V, normalizer: ImageNormalizer, detector: HallucinationDetector) -> Self {
        Self {
            vision,
            normalizer,
            detector,
        }
    }

    /// 提取文档文字
    ///
    /// 返回空文本表示"没有可恢复的文字"，调用方应继续处理而不是中止
    pub async fn extract(&self, document: &Document) -> ExtractedText {
        match self.try_extract(document).await {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!("⚠️ [文档 {}] 文字提取失败，降级为空文本: {:#}", document.name, e);
                ExtractedText::unavailable()
            }
        }
    }

    async fn try_extract(&self, document: &Document) -> Result<ExtractedText> {
        let normalized = self
            .normalizer
            .normalize(document)
            .await
            .context("文档规范化失败")?;

        let pages = match normalized {
            Normalized::Text(text) => {
                info!(
                    "[文档 {}] 内容为可读文本，跳过视觉调用 ({} 字符)",
                    document.name,
                    text.chars().count()
                );
                return Ok(ExtractedText::embedded(text));
            }
            Normalized::Pages(pages) => pages,
        };

        let page_count = pages.len();
        let text = self.extract_pages(pages).await?;

        if text.trim().is_empty() {
            warn!("⚠️ [文档 {}] 视觉模型未返回任何文字", document.name);
            return Ok(ExtractedText::unavailable());
        }

        let verdict = self.detector.verdict(&text);
        if verdict.is_flagged() {
            warn!(
                "⚠️ [文档 {}] 提取结果疑似幻觉 ({})，已丢弃: {}",
                document.name,
                verdict,
                truncate_text(&text, 80)
            );
            return Ok(ExtractedText::unavailable());
        }

        info!(
            "✓ [文档 {}] 提取完成: {} 页, {} 字符",
            document.name,
            page_count,
            text.chars().count()
        );
        Ok(ExtractedText::vision(text, page_count))
    }

    /// 逐页调用视觉模型并拼接
    pub async fn extract_pages(&self, pages: Vec<PageImage>) -> Result<String> {
        let multi_page = pages.len() > 1;
        let mut combined = String::new();

        for page in pages {
            let page_number = page.index + 1;
            let image = self
                .normalizer
                .encode_for_vision(page)
                .await
                .with_context(|| format!("第 {} 页编码失败", page_number))?;
            debug!("第 {} 页编码完成: {} 字节", page_number, image.bytes.len());

            let text = self
                .vision
                .complete_with_image(OCR_PROMPT, &image)
                .await
                .with_context(|| format!("第 {} 页视觉调用失败", page_number))?;
            debug!("第 {} 页识别结果: {}", page_number, truncate_text(&text, 200));

            if multi_page {
                combined.push_str(&page_marker(page_number));
            }
            combined.push_str(text.trim());
        }

        Ok(combined.trim().to_string())
    }
}

/// 页边界标记
pub fn page_marker(page_number: usize) -> String {
    format!("\n--- Page {} ---\n", page_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use crate::infrastructure::{EncodedImage, PdfRasterizer};
    use crate::models::ExtractionSource;
    use crate::services::image_normalizer::NormalizerConfig;
    use image::{DynamicImage, RgbImage};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// 依次返回脚本中的回复
    struct ScriptedVision {
        replies: Vec<Result<String, String>>,
        calls: AtomicUsize,
    }

    impl ScriptedVision {
        fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                replies: replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl VisionModel for ScriptedVision {
        async fn complete_with_image(&self, prompt: &str, image: &EncodedImage) -> Result<String> {
            assert!(prompt.contains("[unclear]"));
            assert_eq!(image.mime, "image/jpeg");
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(i) {
                Some(Ok(text)) => Ok(text.clone()),
                Some(Err(e)) => Err(anyhow::anyhow!(e.clone())),
                None => Err(anyhow::anyhow!("no scripted reply")),
            }
        }
    }

    struct TwoPages;

    impl PdfRasterizer for TwoPages {
        fn name(&self) -> &'static str {
            "two-pages"
        }
        fn rasterize_file(&self, _: &Path, _: u32) -> Result<Vec<DynamicImage>, OcrError> {
            Ok(vec![
                DynamicImage::ImageRgb8(RgbImage::new(4, 4)),
                DynamicImage::ImageRgb8(RgbImage::new(4, 4)),
            ])
        }
        fn rasterize_bytes(&self, _: &[u8], dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
            self.rasterize_file(Path::new(""), dpi)
        }
    }

    struct Broken;

    impl PdfRasterizer for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn rasterize_file(&self, _: &Path, _: u32) -> Result<Vec<DynamicImage>, OcrError> {
            Err(OcrError::NoPages { engine: "broken" })
        }
        fn rasterize_bytes(&self, _: &[u8], _: u32) -> Result<Vec<DynamicImage>, OcrError> {
            Err(OcrError::NoPages { engine: "broken" })
        }
    }

    fn extractor_with(
        replies: Vec<Result<&str, &str>>,
        stitch: bool,
        engine: Arc<dyn PdfRasterizer>,
    ) -> TextExtractor<ScriptedVision> {
        let config = NormalizerConfig {
            stitch_pages: stitch,
            ..NormalizerConfig::default()
        };
        let normalizer = ImageNormalizer::with_engines(config, engine.clone(), engine);
        TextExtractor::new(
            ScriptedVision::new(replies),
            normalizer,
            HallucinationDetector::default(),
        )
    }

    fn extractor(replies: Vec<Result<&str, &str>>, stitch: bool) -> TextExtractor<ScriptedVision> {
        extractor_with(replies, stitch, Arc::new(TwoPages))
    }

    fn png_document() -> Document {
        let mut buf = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(8, 8))
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        Document::from_bytes("scan.png", buf.into_inner())
    }

    #[tokio::test]
    async fn test_single_page_vision_path() {
        let extractor = extractor(vec![Ok("Question 1: Define osmosis\nAnswer: Water movement")], true);
        let extracted = extractor.extract(&png_document()).await;
        assert_eq!(extracted.source, ExtractionSource::Vision);
        assert_eq!(extracted.confidence, Some(ExtractedText::VISION_CONFIDENCE));
        assert!(!extracted.text.contains("--- Page"));
    }

    #[tokio::test]
    async fn test_multi_page_text_has_markers() {
        let extractor = extractor(vec![Ok("first page text"), Ok("second page text")], false);
        let doc = Document::from_bytes("exam.pdf", b"%PDF-1.4\n\xff".to_vec());
        let extracted = extractor.extract(&doc).await;
        assert_eq!(extracted.page_count, 2);
        assert_eq!(
            extracted.text,
            "--- Page 1 ---\nfirst page text\n--- Page 2 ---\nsecond page text"
        );
    }

    #[tokio::test]
    async fn test_vision_failure_degrades_to_empty() {
        let extractor = extractor(vec![Err("503 Service Unavailable")], true);
        let extracted = extractor.extract(&png_document()).await;
        assert!(extracted.is_empty());
        assert_eq!(extracted.source, ExtractionSource::Unavailable);
        assert_eq!(extracted.confidence, None);
    }

    #[tokio::test]
    async fn test_hallucinated_output_is_discarded() {
        let extractor = extractor(vec![Ok("Based on what I can see, the page is about biology.")], true);
        let extracted = extractor.extract(&png_document()).await;
        assert!(extracted.is_empty());
    }

    #[tokio::test]
    async fn test_plain_text_document_skips_vision() {
        let extractor = extractor_with(vec![], true, Arc::new(Broken));
        let doc = Document::from_bytes("notes.pdf", b"Question: What is H2O?\nAnswer: Water".to_vec());
        let extracted = extractor.extract(&doc).await;
        assert_eq!(extracted.source, ExtractionSource::EmbeddedText);
        assert!(extracted.text.starts_with("Question:"));
        assert_eq!(extractor.vision.calls.load(Ordering::SeqCst), 0);
    }
}
