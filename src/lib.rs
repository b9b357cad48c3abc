// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod archive; // 图像与元数据归档
pub mod config; // 归档配置参数
pub mod detection; // 检测/跟踪输入
pub mod error;
pub mod events; // 目标事件消息
pub mod pipeline; // 批处理流水线
pub mod reid; // ReID嵌入缓存与解析
pub mod timestamp;

pub use crate::archive::{
    ArtifactConsumer, ArtifactProducer, CandidateArtifact, CommitReport, ImageEncoder,
    ThreadedImageEncoder,
};
pub use crate::config::{ArchiveConfig, ReidSettings};
pub use crate::error::{ArchiveError, EncodeError};
pub use crate::pipeline::{BatchProcessor, BatchReport, FrameReport};
pub use crate::reid::{EmbeddingCache, ReidResolver};
