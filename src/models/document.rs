//! 文档与页面图像
//!
//! 文档类型只由内容签名（magic bytes）决定，与文件名、扩展名无关：
//! 一个名为 `.pdf` 但内容是 JPEG 的文件按 JPEG 处理。

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// 文档类型（由内容签名检测）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Jpeg,
    Png,
    Gif,
    Bmp,
    Unknown,
}

impl DocumentKind {
    /// 根据文件头检测实际类型
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"%PDF") {
            DocumentKind::Pdf
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            DocumentKind::Jpeg
        } else if bytes.starts_with(b"\x89PNG") {
            DocumentKind::Png
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            DocumentKind::Gif
        } else if bytes.starts_with(b"BM") {
            DocumentKind::Bmp
        } else {
            DocumentKind::Unknown
        }
    }

    /// 是否为可直接送入视觉模型的光栅图像
    pub fn is_raster(&self) -> bool {
        matches!(
            self,
            DocumentKind::Jpeg | DocumentKind::Png | DocumentKind::Gif | DocumentKind::Bmp
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Jpeg => "jpeg",
            DocumentKind::Png => "png",
            DocumentKind::Gif => "gif",
            DocumentKind::Bmp => "bmp",
            DocumentKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 待处理的文档：原始字节 + 检测出的类型
#[derive(Debug, Clone)]
pub struct Document {
    /// 来源名称（仅用于日志）
    pub name: String,
    pub bytes: Vec<u8>,
    pub kind: DocumentKind,
}

impl Document {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let kind = DocumentKind::detect(&bytes);
        Self {
            name: name.into(),
            bytes,
            kind,
        }
    }

    /// 从磁盘读取文档
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("无法读取文档: {}", path.display()))?;
        Ok(Self::from_bytes(path.display().to_string(), bytes))
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// 页面图像内容
#[derive(Debug, Clone)]
pub enum PageData {
    /// 原始编码字节（直接来自光栅图像文档）
    Encoded { bytes: Vec<u8>, kind: DocumentKind },
    /// 已解码的位图（来自 PDF 光栅化/拼接）
    Decoded(DynamicImage),
}

/// 从文档派生的一张光栅页面，按页序排列
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 页序（从 0 开始）
    pub index: usize,
    pub data: PageData,
}

impl PageImage {
    pub fn encoded(index: usize, bytes: Vec<u8>, kind: DocumentKind) -> Self {
        Self {
            index,
            data: PageData::Encoded { bytes, kind },
        }
    }

    pub fn decoded(index: usize, image: DynamicImage) -> Self {
        Self {
            index,
            data: PageData::Decoded(image),
        }
    }

    /// 解码为动态图像
    pub fn to_dynamic(&self) -> Result<DynamicImage, image::ImageError> {
        match &self.data {
            PageData::Encoded { bytes, .. } => image::load_from_memory(bytes),
            PageData::Decoded(img) => Ok(img.clone()),
        }
    }

    /// 转换为 RGB（编码前总是先转 RGB）
    pub fn to_rgb(&self) -> Result<RgbImage, image::ImageError> {
        Ok(self.to_dynamic()?.to_rgb8())
    }

    /// 原始编码字节（仅当页面来自光栅图像文档时存在）
    pub fn encoded_bytes(&self) -> Option<(&[u8], DocumentKind)> {
        match &self.data {
            PageData::Encoded { bytes, kind } => Some((bytes.as_slice(), *kind)),
            PageData::Decoded(_) => None,
        }
    }
}
