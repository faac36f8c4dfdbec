//! 图像规范化服务 - 业务能力层
//!
//! 把任意输入文档（PDF、JPEG/PNG/GIF/BMP、扩展名不可信的文件）转换为适合视觉模型的页面，
//! 并负责送入模型前的尺寸控制与有损编码。
//!
//! 降级链按顺序尝试，第一个成功的方案生效：
//! 1. 内容签名是光栅图像：原字节直接作为唯一页面
//! 2. 方案 A（pdftoppm）按 DPI 阶梯光栅化
//! 3. 方案 B（pdfium）光栅化
//! 4. 作为纯文本读取（长度 > 10 时直接返回文字，跳过视觉调用）
//! 5. 方案 A 从内存字节光栅化
//!
//! 多页结果默认拼接为一张长图，保证每个文档只调用一次视觉模型。

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::OcrError;
use crate::infrastructure::{
    EncodedImage, FileStore, PdfRasterizer, PdfiumRasterizer, PopplerRasterizer,
};
use crate::models::{Document, DocumentKind, PageImage};

const MB: usize = 1024 * 1024;

/// 一次压缩：最长边上限 + JPEG 质量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionPass {
    pub max_side: u32,
    pub quality: u8,
}

/// 规范化参数
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// 方案 A 的 DPI 阶梯，取第一个得到页面的分辨率
    pub dpi_ladder: Vec<u32>,
    /// 方案 B 的渲染分辨率（72 DPI × 1.5）
    pub pdfium_dpi: u32,
    /// 内存字节光栅化使用的分辨率
    pub bytes_dpi: u32,
    /// 多页拼接为一张图
    pub stitch_pages: bool,
    /// 纯文本短路所需的最小字符数（不含）
    pub min_text_chars: usize,
    /// 超过该字节数时执行第一轮压缩
    pub compress_threshold_bytes: usize,
    /// base64 后超过该字节数时执行第二轮压缩
    pub max_base64_bytes: usize,
    pub primary_pass: CompressionPass,
    pub aggressive_pass: CompressionPass,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            dpi_ladder: vec![150, 200, 300],
            pdfium_dpi: 108,
            bytes_dpi: 150,
            stitch_pages: true,
            min_text_chars: 10,
            compress_threshold_bytes: 5 * MB,
            max_base64_bytes: 20 * MB,
            primary_pass: CompressionPass {
                max_side: 2048,
                quality: 85,
            },
            aggressive_pass: CompressionPass {
                max_side: 1024,
                quality: 60,
            },
        }
    }
}

/// 规范化结果
#[derive(Debug, Clone)]
pub enum Normalized {
    /// 按页序排列的光栅页面
    Pages(Vec<PageImage>),
    /// 文档本身就是可读文本，直接作为提取结果
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Engine {
    Primary,
    Secondary,
}

/// 降级链中的一个方案
#[derive(Debug, Clone, PartialEq, Eq)]
enum Strategy {
    DirectRaster,
    RasterizeFile { engine: Engine, dpis: Vec<u32> },
    PlainText,
    RasterizeBytes { dpi: u32 },
}

impl Strategy {
    fn label(&self) -> &'static str {
        match self {
            Strategy::DirectRaster => "直接使用光栅图像",
            Strategy::RasterizeFile {
                engine: Engine::Primary,
                ..
            } => "方案A光栅化",
            Strategy::RasterizeFile {
                engine: Engine::Secondary,
                ..
            } => "方案B光栅化",
            Strategy::PlainText => "纯文本读取",
            Strategy::RasterizeBytes { .. } => "方案A内存光栅化",
        }
    }
}

/// 图像规范化服务
///
/// 职责：
/// - 按降级链把文档转成页面或文字
/// - 把页面编码为视觉模型可接受的 JPEG
/// - 不调用任何模型
pub struct ImageNormalizer {
    config: NormalizerConfig,
    primary: Arc<dyn PdfRasterizer>,
    secondary: Arc<dyn PdfRasterizer>,
    chain: Vec<Strategy>,
}

impl ImageNormalizer {
    /// 使用 pdftoppm + pdfium 创建
    pub fn new(pdftoppm_path: &str) -> Self {
        Self::with_engines(
            NormalizerConfig::default(),
            Arc::new(PopplerRasterizer::new(pdftoppm_path)),
            Arc::new(PdfiumRasterizer::new()),
        )
    }

    /// 自定义参数与光栅化引擎
    pub fn with_engines(
        config: NormalizerConfig,
        primary: Arc<dyn PdfRasterizer>,
        secondary: Arc<dyn PdfRasterizer>,
    ) -> Self {
        let chain = vec![
            Strategy::DirectRaster,
            Strategy::RasterizeFile {
                engine: Engine::Primary,
                dpis: config.dpi_ladder.clone(),
            },
            Strategy::RasterizeFile {
                engine: Engine::Secondary,
                dpis: vec![config.pdfium_dpi],
            },
            Strategy::PlainText,
            Strategy::RasterizeBytes {
                dpi: config.bytes_dpi,
            },
        ];
        Self {
            config,
            primary,
            secondary,
            chain,
        }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// 规范化文档
    ///
    /// 只有全部方案都失败时才返回错误
    pub async fn normalize(&self, document: &Document) -> Result<Normalized, OcrError> {
        if document.is_empty() {
            return Err(OcrError::EmptyDocument {
                name: document.name.clone(),
            });
        }

        debug!(
            "开始规范化: {} ({} 字节, 检测类型: {})",
            document.name,
            document.len(),
            document.kind
        );

        for strategy in &self.chain {
            match self.attempt(strategy, document).await {
                Ok(Some(normalized)) => {
                    info!("✓ 规范化成功 [{}]: {}", strategy.label(), document.name);
                    return Ok(normalized);
                }
                Ok(None) => debug!("跳过 [{}]: 不适用", strategy.label()),
                Err(e) => warn!("⚠️ [{}] 失败: {}", strategy.label(), e),
            }
        }

        Err(OcrError::NormalizationExhausted {
            name: document.name.clone(),
        })
    }

    async fn attempt(
        &self,
        strategy: &Strategy,
        document: &Document,
    ) -> Result<Option<Normalized>, OcrError> {
        match strategy {
            Strategy::DirectRaster => {
                if !document.kind.is_raster() {
                    return Ok(None);
                }
                Ok(Some(Normalized::Pages(vec![PageImage::encoded(
                    0,
                    document.bytes.clone(),
                    document.kind,
                )])))
            }
            Strategy::RasterizeFile { engine, dpis } => {
                let rasterizer = self.engine(*engine);
                let bytes = document.bytes.clone();
                let dpis = dpis.clone();
                let pages = run_blocking(rasterizer.name(), move || {
                    rasterize_via_temp_file(rasterizer.as_ref(), &bytes, &dpis)
                })
                .await?;
                Ok(Some(self.collect_pages(pages)))
            }
            Strategy::PlainText => Ok(self.read_as_text(&document.bytes).map(Normalized::Text)),
            Strategy::RasterizeBytes { dpi } => {
                let rasterizer = Arc::clone(&self.primary);
                let bytes = document.bytes.clone();
                let dpi = *dpi;
                let pages =
                    run_blocking(rasterizer.name(), move || rasterizer.rasterize_bytes(&bytes, dpi))
                        .await?;
                Ok(Some(self.collect_pages(pages)))
            }
        }
    }

    fn engine(&self, engine: Engine) -> Arc<dyn PdfRasterizer> {
        match engine {
            Engine::Primary => Arc::clone(&self.primary),
            Engine::Secondary => Arc::clone(&self.secondary),
        }
    }

    /// 严格 UTF-8 解码；内容足够长才视为可读文本
    fn read_as_text(&self, bytes: &[u8]) -> Option<String> {
        let text = std::str::from_utf8(bytes).ok()?;
        if text.trim().chars().count() > self.config.min_text_chars {
            Some(text.to_string())
        } else {
            None
        }
    }

    fn collect_pages(&self, pages: Vec<DynamicImage>) -> Normalized {
        if self.config.stitch_pages && pages.len() > 1 {
            info!("拼接 {} 页为单张图像", pages.len());
            let stitched = stitch_pages(pages).map(|img| PageImage::decoded(0, img));
            return Normalized::Pages(stitched.into_iter().collect());
        }
        Normalized::Pages(
            pages
                .into_iter()
                .enumerate()
                .map(|(i, img)| PageImage::decoded(i, img))
                .collect(),
        )
    }

    /// 把页面编码为送入视觉模型的 JPEG（在阻塞线程池中执行）
    pub async fn encode_for_vision(&self, page: PageImage) -> Result<EncodedImage, OcrError> {
        let config = self.config.clone();
        run_blocking("jpeg", move || encode_page(&config, &page)).await
    }
}

async fn run_blocking<T, F>(engine: &'static str, f: F) -> Result<T, OcrError>
where
    F: FnOnce() -> Result<T, OcrError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| OcrError::RasterizeFailed {
            engine,
            dpi: 0,
            reason: format!("阻塞任务异常退出: {}", e),
        })?
}

/// 写入临时 PDF 后按 DPI 阶梯光栅化；临时文件在函数返回时删除
fn rasterize_via_temp_file(
    rasterizer: &dyn PdfRasterizer,
    bytes: &[u8],
    dpis: &[u32],
) -> Result<Vec<DynamicImage>, OcrError> {
    let engine = rasterizer.name();
    let file = FileStore::temp_file(bytes, ".pdf").map_err(|e| OcrError::RasterizeFailed {
        engine,
        dpi: 0,
        reason: format!("{:#}", e),
    })?;

    let mut last_error = OcrError::NoPages { engine };
    for &dpi in dpis {
        match rasterizer.rasterize_file(file.path(), dpi) {
            Ok(pages) if !pages.is_empty() => {
                info!("{} 光栅化成功: {} DPI, {} 页", engine, dpi, pages.len());
                return Ok(pages);
            }
            Ok(_) => last_error = OcrError::NoPages { engine },
            Err(e) => {
                debug!("{} 在 {} DPI 失败: {}", engine, dpi, e);
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// 将多页纵向拼接到白色画布上，较窄的页面水平居中
///
/// 单页原样返回，空列表返回 `None`
pub fn stitch_pages(pages: Vec<DynamicImage>) -> Option<DynamicImage> {
    if pages.len() <= 1 {
        return pages.into_iter().next();
    }

    let width = pages.iter().map(|p| p.width()).max().unwrap_or(0);
    let height: u32 = pages.iter().map(|p| p.height()).sum();
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));

    let mut y_offset: u32 = 0;
    for page in &pages {
        let rgb = page.to_rgb8();
        let x_offset = (width - rgb.width()) / 2;
        image::imageops::replace(&mut canvas, &rgb, i64::from(x_offset), i64::from(y_offset));
        y_offset += rgb.height();
    }

    Some(DynamicImage::ImageRgb8(canvas))
}

/// 页面 → JPEG
///
/// - 原始 JPEG 且不超过阈值：原样透传
/// - 否则转 RGB 后按 q85 编码，源文件或编码结果超过阈值时先缩放到 2048
/// - base64 后仍超过上限：缩放到 1024 并以 q60 重新编码
pub fn encode_page(config: &NormalizerConfig, page: &PageImage) -> Result<EncodedImage, OcrError> {
    let source_len = match page.encoded_bytes() {
        Some((bytes, DocumentKind::Jpeg)) if bytes.len() <= config.compress_threshold_bytes => {
            return Ok(EncodedImage::jpeg(bytes.to_vec()));
        }
        Some((bytes, _)) => bytes.len(),
        None => 0,
    };

    let rgb = page.to_rgb()?;
    let primary = config.primary_pass;

    let encoded = if source_len > config.compress_threshold_bytes {
        debug!("源图像 {:.2} MB，执行第一轮压缩", source_len as f64 / MB as f64);
        encode_jpeg(&rgb, Some(primary.max_side), primary.quality)?
    } else {
        let plain = encode_jpeg(&rgb, None, primary.quality)?;
        if plain.len() > config.compress_threshold_bytes {
            debug!("编码后 {:.2} MB，执行第一轮压缩", plain.len() as f64 / MB as f64);
            encode_jpeg(&rgb, Some(primary.max_side), primary.quality)?
        } else {
            plain
        }
    };

    let mut image = EncodedImage::jpeg(encoded);
    if image.base64_len() > config.max_base64_bytes {
        let aggressive = config.aggressive_pass;
        warn!(
            "图像 base64 后 {:.2} MB 超过上限，执行第二轮压缩",
            image.base64_len() as f64 / MB as f64
        );
        image = EncodedImage::jpeg(encode_jpeg(&rgb, Some(aggressive.max_side), aggressive.quality)?);
    }

    Ok(image)
}

fn encode_jpeg(rgb: &RgbImage, max_side: Option<u32>, quality: u8) -> Result<Vec<u8>, OcrError> {
    let resized;
    let source = match max_side {
        Some(max) if rgb.width() > max || rgb.height() > max => {
            let (w, h) = fit_within(rgb.width(), rgb.height(), max);
            resized = image::imageops::resize(rgb, w, h, FilterType::Lanczos3);
            &resized
        }
        _ => rgb,
    };

    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(source)?;
    Ok(buffer)
}

/// 等比缩放使最长边不超过 `max_side`
fn fit_within(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_side {
        return (width, height);
    }
    let scale = f64::from(max_side) / f64::from(longest);
    let w = (f64::from(width) * scale).round().max(1.0) as u32;
    let h = (f64::from(height) * scale).round().max(1.0) as u32;
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageData;
    use std::path::Path;
    use std::sync::Mutex;

    /// 按脚本返回结果的光栅化引擎
    struct ScriptedRasterizer {
        name: &'static str,
        ok_dpis: Vec<u32>,
        page_sizes: Vec<(u32, u32)>,
        calls: Mutex<Vec<(String, u32)>>,
    }

    impl ScriptedRasterizer {
        fn new(name: &'static str, ok_dpis: Vec<u32>, page_sizes: Vec<(u32, u32)>) -> Arc<Self> {
            Arc::new(Self {
                name,
                ok_dpis,
                page_sizes,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Self::new(name, vec![], vec![])
        }

        fn calls(&self) -> Vec<(String, u32)> {
            self.calls.lock().unwrap().clone()
        }

        fn render(&self, dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
            if !self.ok_dpis.contains(&dpi) {
                return Err(OcrError::RasterizeFailed {
                    engine: self.name,
                    dpi,
                    reason: "scripted failure".to_string(),
                });
            }
            Ok(self
                .page_sizes
                .iter()
                .map(|&(w, h)| DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([0, 0, 0]))))
                .collect())
        }
    }

    impl PdfRasterizer for ScriptedRasterizer {
        fn name(&self) -> &'static str {
            self.name
        }

        fn rasterize_file(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
            assert!(path.exists(), "temp file must exist during rasterization");
            self.calls.lock().unwrap().push(("file".to_string(), dpi));
            self.render(dpi)
        }

        fn rasterize_bytes(&self, _bytes: &[u8], dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
            self.calls.lock().unwrap().push(("bytes".to_string(), dpi));
            self.render(dpi)
        }
    }

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(w, h))
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn pdf_document() -> Document {
        Document::from_bytes("exam.pdf", b"%PDF-1.4\n\xff\xfe binary".to_vec())
    }

    #[tokio::test]
    async fn test_raster_document_is_single_identical_page() {
        let primary = ScriptedRasterizer::failing("a");
        let secondary = ScriptedRasterizer::failing("b");
        let normalizer =
            ImageNormalizer::with_engines(NormalizerConfig::default(), primary.clone(), secondary);

        let bytes = png_bytes(3, 2);
        let doc = Document::from_bytes("scan.pdf", bytes.clone());
        let Normalized::Pages(pages) = normalizer.normalize(&doc).await.unwrap() else {
            panic!("expected pages");
        };
        assert_eq!(pages.len(), 1);
        match &pages[0].data {
            PageData::Encoded { bytes: b, kind } => {
                assert_eq!(b, &bytes);
                assert_eq!(*kind, DocumentKind::Png);
            }
            PageData::Decoded(_) => panic!("raster pages must keep original bytes"),
        }
        assert!(primary.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dpi_ladder_stops_at_first_success_and_stitches() {
        let primary = ScriptedRasterizer::new("a", vec![200, 300], vec![(10, 5), (6, 7)]);
        let secondary = ScriptedRasterizer::failing("b");
        let normalizer =
            ImageNormalizer::with_engines(NormalizerConfig::default(), primary.clone(), secondary.clone());

        let Normalized::Pages(pages) = normalizer.normalize(&pdf_document()).await.unwrap() else {
            panic!("expected pages");
        };
        assert_eq!(primary.calls(), vec![("file".to_string(), 150), ("file".to_string(), 200)]);
        assert!(secondary.calls().is_empty());

        assert_eq!(pages.len(), 1);
        let stitched = pages[0].to_dynamic().unwrap();
        assert_eq!((stitched.width(), stitched.height()), (10, 12));
    }

    #[tokio::test]
    async fn test_unstitched_pages_keep_order() {
        let primary = ScriptedRasterizer::new("a", vec![150], vec![(4, 4), (4, 8)]);
        let config = NormalizerConfig {
            stitch_pages: false,
            ..NormalizerConfig::default()
        };
        let normalizer =
            ImageNormalizer::with_engines(config, primary, ScriptedRasterizer::failing("b"));

        let Normalized::Pages(pages) = normalizer.normalize(&pdf_document()).await.unwrap() else {
            panic!("expected pages");
        };
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].index, 1);
        assert_eq!(pages[1].to_dynamic().unwrap().height(), 8);
    }

    #[tokio::test]
    async fn test_secondary_engine_used_after_primary_exhausted() {
        let primary = ScriptedRasterizer::failing("a");
        let secondary = ScriptedRasterizer::new("b", vec![108], vec![(5, 5)]);
        let normalizer =
            ImageNormalizer::with_engines(NormalizerConfig::default(), primary.clone(), secondary.clone());

        let result = normalizer.normalize(&pdf_document()).await.unwrap();
        assert!(matches!(result, Normalized::Pages(ref p) if p.len() == 1));
        assert_eq!(primary.calls().len(), 3);
        assert_eq!(secondary.calls(), vec![("file".to_string(), 108)]);
    }

    #[tokio::test]
    async fn test_plain_text_short_circuits() {
        let normalizer = ImageNormalizer::with_engines(
            NormalizerConfig::default(),
            ScriptedRasterizer::failing("a"),
            ScriptedRasterizer::failing("b"),
        );
        let doc = Document::from_bytes("answers.pdf", b"Question 1: What is 2+2?\nAnswer: 4".to_vec());
        match normalizer.normalize(&doc).await.unwrap() {
            Normalized::Text(text) => assert!(text.contains("What is 2+2?")),
            Normalized::Pages(_) => panic!("expected text"),
        }
    }

    #[tokio::test]
    async fn test_bytes_rasterization_is_last_resort() {
        // 只有内存光栅化成功
        struct BytesOnly;
        impl PdfRasterizer for BytesOnly {
            fn name(&self) -> &'static str {
                "a"
            }
            fn rasterize_file(&self, _: &Path, dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
                Err(OcrError::RasterizeFailed {
                    engine: "a",
                    dpi,
                    reason: "bad handle".to_string(),
                })
            }
            fn rasterize_bytes(&self, _: &[u8], _: u32) -> Result<Vec<DynamicImage>, OcrError> {
                Ok(vec![DynamicImage::ImageRgb8(RgbImage::new(2, 2))])
            }
        }

        let normalizer = ImageNormalizer::with_engines(
            NormalizerConfig::default(),
            Arc::new(BytesOnly),
            ScriptedRasterizer::failing("b"),
        );
        let result = normalizer.normalize(&pdf_document()).await.unwrap();
        assert!(matches!(result, Normalized::Pages(ref p) if p.len() == 1));
    }

    #[tokio::test]
    async fn test_exhausted_and_empty_documents_fail() {
        let normalizer = ImageNormalizer::with_engines(
            NormalizerConfig::default(),
            ScriptedRasterizer::failing("a"),
            ScriptedRasterizer::failing("b"),
        );
        assert!(matches!(
            normalizer.normalize(&pdf_document()).await,
            Err(OcrError::NormalizationExhausted { .. })
        ));
        assert!(matches!(
            normalizer.normalize(&Document::from_bytes("x", Vec::new())).await,
            Err(OcrError::EmptyDocument { .. })
        ));
    }

    #[test]
    fn test_stitch_centers_narrow_pages_on_white() {
        let wide = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 2, Rgb([0, 0, 0])));
        let narrow = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([0, 0, 0])));
        let stitched = stitch_pages(vec![wide, narrow]).unwrap().to_rgb8();

        assert_eq!(stitched.dimensions(), (6, 4));
        assert_eq!(stitched.get_pixel(0, 3), &Rgb([255, 255, 255]));
        assert_eq!(stitched.get_pixel(2, 3), &Rgb([0, 0, 0]));
        assert_eq!(stitched.get_pixel(3, 3), &Rgb([0, 0, 0]));
        assert_eq!(stitched.get_pixel(5, 3), &Rgb([255, 255, 255]));
        assert!(stitch_pages(Vec::new()).is_none());
    }

    #[test]
    fn test_small_jpeg_passes_through() {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, 90)
            .encode_image(&RgbImage::new(4, 4))
            .unwrap();
        let page = PageImage::encoded(0, buf.clone(), DocumentKind::Jpeg);
        let encoded = encode_page(&NormalizerConfig::default(), &page).unwrap();
        assert_eq!(encoded.bytes, buf);
        assert_eq!(encoded.mime, "image/jpeg");
    }

    #[test]
    fn test_oversized_image_is_downscaled() {
        let config = NormalizerConfig {
            compress_threshold_bytes: 10,
            max_base64_bytes: usize::MAX,
            primary_pass: CompressionPass {
                max_side: 16,
                quality: 85,
            },
            ..NormalizerConfig::default()
        };
        let page = PageImage::encoded(0, png_bytes(64, 32), DocumentKind::Png);
        let encoded = encode_page(&config, &page).unwrap();
        let decoded = image::load_from_memory(&encoded.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_aggressive_pass_when_base64_too_large() {
        let config = NormalizerConfig {
            max_base64_bytes: 1,
            aggressive_pass: CompressionPass {
                max_side: 8,
                quality: 60,
            },
            ..NormalizerConfig::default()
        };
        let page = PageImage::decoded(0, DynamicImage::ImageRgb8(RgbImage::new(40, 20)));
        let encoded = encode_page(&config, &page).unwrap();
        let decoded = image::load_from_memory(&encoded.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(4000, 2000, 2048), (2048, 1024));
        assert_eq!(fit_within(100, 50, 2048), (100, 50));
        assert_eq!(fit_within(3000, 1, 1024), (1024, 1));
    }
}
