// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// ReID连续性 (Re-identification continuity)
///
/// - EmbeddingCache: 每路视频的嵌入历史 (按帧号窗口淘汰)
/// - ReidResolver:   本帧嵌入缺失时回退到历史
pub mod cache;
pub mod resolver;

pub use cache::{EmbeddingCache, FrameEmbedding, ObjectEmbedding};
pub use resolver::{ReidResolver, ResolvedEmbedding, ResolvedFrom};
