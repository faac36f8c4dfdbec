//! PDF 光栅化引擎 - 基础设施层
//!
//! 两个相互独立的引擎：
//! - [`PopplerRasterizer`]：调用 poppler 的 `pdftoppm` 子进程，支持文件与内存字节两种输入
//! - [`PdfiumRasterizer`]：通过 `pdfium-render` 绑定系统 pdfium 库
//!
//! 引擎都是阻塞调用，由调用方放进 `spawn_blocking`。临时文件与目录由 `tempfile`
//! 持有，任何退出路径上都会在 drop 时删除。

use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::debug;

use crate::error::OcrError;

/// PDF 光栅化引擎
pub trait PdfRasterizer: Send + Sync {
    /// 引擎名称（用于日志与错误）
    fn name(&self) -> &'static str;

    /// 从文件路径光栅化所有页面，按页序返回
    fn rasterize_file(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, OcrError>;

    /// 从内存字节光栅化所有页面，按页序返回
    fn rasterize_bytes(&self, bytes: &[u8], dpi: u32) -> Result<Vec<DynamicImage>, OcrError>;
}

/// poppler `pdftoppm` 引擎
pub struct PopplerRasterizer {
    executable: PathBuf,
}

impl PopplerRasterizer {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    fn failed(&self, dpi: u32, reason: impl Into<String>) -> OcrError {
        OcrError::RasterizeFailed {
            engine: self.name(),
            dpi,
            reason: reason.into(),
        }
    }

    fn check_output(&self, output: &Output, dpi: u32) -> Result<(), OcrError> {
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(self.failed(dpi, format!("退出码 {:?}: {}", output.status.code(), stderr.trim())))
    }
}

impl Default for PopplerRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PdfRasterizer for PopplerRasterizer {
    fn name(&self) -> &'static str {
        "pdftoppm"
    }

    fn rasterize_file(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
        let out_dir = tempfile::tempdir().map_err(|e| self.failed(dpi, e.to_string()))?;
        let prefix = out_dir.path().join("page");
        debug!("pdftoppm {} -> {} ({} DPI)", path.display(), prefix.display(), dpi);

        let output = Command::new(&self.executable)
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-png")
            .arg(path)
            .arg(&prefix)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| self.failed(dpi, format!("无法启动 pdftoppm: {}", e)))?;
        self.check_output(&output, dpi)?;

        read_pages(out_dir.path(), self.name())
    }

    fn rasterize_bytes(&self, bytes: &[u8], dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
        let out_dir = tempfile::tempdir().map_err(|e| self.failed(dpi, e.to_string()))?;
        let prefix = out_dir.path().join("page");
        debug!("pdftoppm <stdin:{} bytes> ({} DPI)", bytes.len(), dpi);

        // "-" 表示从 stdin 读取 PDF
        let mut child = Command::new(&self.executable)
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-png")
            .arg("-")
            .arg(&prefix)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.failed(dpi, format!("无法启动 pdftoppm: {}", e)))?;

        // stdin 在匹配结束时关闭
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin
                .write_all(bytes)
                .map_err(|e| format!("写入 stdin 失败: {}", e)),
            None => Err("无法获取 stdin".to_string()),
        };
        if let Err(reason) = written {
            // pdftoppm 提前退出时回收子进程
            let _ = child.kill();
            let _ = child.wait();
            return Err(self.failed(dpi, reason));
        }

        let output = child
            .wait_with_output()
            .map_err(|e| self.failed(dpi, e.to_string()))?;
        self.check_output(&output, dpi)?;

        read_pages(out_dir.path(), self.name())
    }
}

/// 按文件名顺序读取 pdftoppm 输出的页面
///
/// pdftoppm 的页号按总页数补零，字典序即页序
fn read_pages(dir: &Path, engine: &'static str) -> Result<Vec<DynamicImage>, OcrError> {
    let entries = std::fs::read_dir(dir).map_err(|e| OcrError::RasterizeFailed {
        engine,
        dpi: 0,
        reason: e.to_string(),
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("png"))
        .collect();
    paths.sort();

    let mut pages = Vec::with_capacity(paths.len());
    for path in paths {
        pages.push(image::open(&path)?);
    }

    if pages.is_empty() {
        return Err(OcrError::NoPages { engine });
    }
    Ok(pages)
}

/// pdfium 引擎
///
/// 每次调用时绑定系统库；库不可用时返回错误，由降级链继续尝试下一种方案
#[derive(Debug, Default)]
pub struct PdfiumRasterizer;

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self
    }

    fn bind(&self, dpi: u32) -> Result<Pdfium, OcrError> {
        let bindings = Pdfium::bind_to_system_library()
            .map_err(|e| self.failed(dpi, format!("无法加载 pdfium 库: {}", e)))?;
        Ok(Pdfium::new(bindings))
    }

    fn failed(&self, dpi: u32, reason: impl Into<String>) -> OcrError {
        OcrError::RasterizeFailed {
            engine: self.name(),
            dpi,
            reason: reason.into(),
        }
    }

    fn render_document(&self, document: &PdfDocument<'_>, dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
        let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);

        let mut pages = Vec::new();
        for page in document.pages().iter() {
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| self.failed(dpi, e.to_string()))?;
            let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
            let rgba = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes())
                .ok_or_else(|| self.failed(dpi, "位图尺寸与像素数据不一致"))?;
            pages.push(DynamicImage::ImageRgba8(rgba));
        }

        if pages.is_empty() {
            return Err(OcrError::NoPages {
                engine: self.name(),
            });
        }
        Ok(pages)
    }
}

impl PdfRasterizer for PdfiumRasterizer {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn rasterize_file(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
        let pdfium = self.bind(dpi)?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| self.failed(dpi, e.to_string()))?;
        self.render_document(&document, dpi)
    }

    fn rasterize_bytes(&self, bytes: &[u8], dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
        let pdfium = self.bind(dpi)?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| self.failed(dpi, e.to_string()))?;
        self.render_document(&document, dpi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_pdftoppm_reports_engine() {
        let rasterizer = PopplerRasterizer::new("/nonexistent/pdftoppm");
        let err = rasterizer.rasterize_bytes(b"%PDF-1.4", 150).unwrap_err();
        match err {
            OcrError::RasterizeFailed { engine, dpi, .. } => {
                assert_eq!(engine, "pdftoppm");
                assert_eq!(dpi, 150);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_early_exit_while_writing_stdin_is_an_error() {
        // `true` 不读 stdin 就退出，写入超过管道缓冲区的数据必然失败
        let rasterizer = PopplerRasterizer::new("true");
        let err = rasterizer.rasterize_bytes(&vec![b'x'; 4 * 1024 * 1024], 150).unwrap_err();
        match err {
            OcrError::RasterizeFailed { reason, .. } => assert!(reason.contains("stdin"), "{}", reason),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_read_pages_sorted_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_pages(dir.path(), "pdftoppm"),
            Err(OcrError::NoPages { .. })
        ));

        // 第二页比第一页高，用来确认顺序
        image::RgbImage::new(4, 8).save(dir.path().join("page-2.png")).unwrap();
        image::RgbImage::new(4, 4).save(dir.path().join("page-1.png")).unwrap();
        let pages = read_pages(dir.path(), "pdftoppm").unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].height(), 4);
        assert_eq!(pages[1].height(), 8);
    }
}
