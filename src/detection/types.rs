// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测/跟踪输入数据结构定义
/// Data structures handed over by the detection + tracking stage
use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::embedding::AttachedEmbedding;

// ========== 公共常量 ==========

/// 最大视频源数量 (stream_id ∈ [0, MAX_SOURCE_BINS))
pub const MAX_SOURCE_BINS: usize = 16;

// ========== 数据结构 ==========

/// 检测框 (Detection bounding box), 像素坐标
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct BoxRect {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

impl BoxRect {
    pub fn new(top: f32, left: f32, width: f32, height: f32) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    /// 按比例缩放 (流水线分辨率 → 原始视频分辨率)
    pub fn scaled(&self, scale_w: f32, scale_h: f32) -> Self {
        Self {
            top: self.top * scale_h,
            left: self.left * scale_w,
            width: self.width * scale_w,
            height: self.height * scale_h,
        }
    }

    /// 裁剪到图像范围内, 返回 (x, y, w, h); 面积为0时返回None
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.left.max(0.0).min(width as f32);
        let y1 = self.top.max(0.0).min(height as f32);
        let x2 = self.right().max(0.0).min(width as f32);
        let y2 = self.bottom().max(0.0).min(height as f32);

        let w = (x2 - x1).floor() as u32;
        let h = (y2 - y1).floor() as u32;
        if w == 0 || h == 0 {
            return None;
        }
        Some((x1 as u32, y1 as u32, w, h))
    }
}

/// 帧图像内存 (RGBA), 同一批次的所有编码任务只读共享
#[derive(Clone)]
pub struct FrameSurface {
    pub rgba_data: Arc<Vec<u8>>, // 使用Arc共享数据,避免复制
    pub width: u32,
    pub height: u32,
}

impl FrameSurface {
    pub fn new(width: u32, height: u32, rgba_data: Vec<u8>) -> Self {
        Self {
            rgba_data: Arc::new(rgba_data),
            width,
            height,
        }
    }

    /// 黑色画面 (没有图像数据的回放源)
    pub fn blank(width: u32, height: u32) -> Self {
        let mut rgba = vec![0u8; (width as usize) * (height as usize) * 4];
        rgba.iter_mut().skip(3).step_by(4).for_each(|a| *a = 255);
        Self::new(width, height, rgba)
    }

    pub fn from_image(img: &DynamicImage) -> Self {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new(width, height, rgba.into_raw())
    }

    /// 缓冲区大小与宽高一致
    pub fn is_valid(&self) -> bool {
        self.rgba_data.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

impl std::fmt::Debug for FrameSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba_data.len())
            .finish()
    }
}

/// 检测/跟踪对象
#[derive(Clone, Debug)]
pub struct DetectedObject {
    /// 跟踪ID
    pub object_id: u64,
    pub class_id: u32,
    pub class_label: String,
    pub confidence: f32,
    /// 流水线分辨率下的检测框
    pub rect: BoxRect,
    /// 本帧推理产生的嵌入 (tracker reid 或二级分类器输出)
    pub embedding: Option<AttachedEmbedding>,
}

/// 单路视频的一帧检测结果
#[derive(Clone, Debug)]
pub struct FrameMeta {
    pub stream_id: usize,
    pub frame_number: i64,
    /// 缓冲区时间戳 (纳秒)
    pub pts_ns: u64,
    pub source_uri: String,
    /// 原始视频分辨率 (用于缩放检测框)
    pub source_width: u32,
    pub source_height: u32,
    /// 流水线分辨率下的帧图像
    pub surface: FrameSurface,
    pub objects: Vec<DetectedObject>,
}

impl FrameMeta {
    /// 流水线分辨率 → 原始分辨率的缩放比例
    pub fn scale(&self) -> (f32, f32) {
        let sw = if self.surface.width > 0 && self.source_width > 0 {
            self.source_width as f32 / self.surface.width as f32
        } else {
            1.0
        };
        let sh = if self.surface.height > 0 && self.source_height > 0 {
            self.source_height as f32 / self.surface.height as f32
        } else {
            1.0
        };
        (sw, sh)
    }
}

/// 一个批次 (多路视频各一帧)
#[derive(Clone, Debug, Default)]
pub struct FrameBatch {
    pub frames: Vec<FrameMeta>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_to_surface() {
        let rect = BoxRect::new(-10.0, 90.0, 50.0, 30.0);
        assert_eq!(rect.clamp_to(100, 100), Some((90, 0, 10, 20)));

        let outside = BoxRect::new(200.0, 200.0, 10.0, 10.0);
        assert_eq!(outside.clamp_to(100, 100), None);
    }

    #[test]
    fn test_blank_surface_is_opaque() {
        let surface = FrameSurface::blank(4, 2);
        assert!(surface.is_valid());
        assert_eq!(surface.rgba_data[3], 255);
        assert_eq!(surface.rgba_data[0], 0);
    }

    #[test]
    fn test_frame_scale() {
        let frame = FrameMeta {
            stream_id: 0,
            frame_number: 0,
            pts_ns: 0,
            source_uri: String::new(),
            source_width: 1920,
            source_height: 1080,
            surface: FrameSurface::blank(960, 540),
            objects: Vec::new(),
        };
        assert_eq!(frame.scale(), (2.0, 2.0));
    }
}
