// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测输入 (Detection input)
///
/// 推理/跟踪阶段交给归档系统的数据
/// - types:     检测框、帧图像、检测对象、批次
/// - embedding: ReID嵌入引用 (主机/设备内存)
pub mod embedding;
pub mod types;

pub use embedding::{
    AttachedEmbedding, DeviceBuffer, EmbeddingOrigin, EmbeddingRef, EmbeddingSource,
};
pub use types::{BoxRect, DetectedObject, FrameBatch, FrameMeta, FrameSurface, MAX_SOURCE_BINS};
