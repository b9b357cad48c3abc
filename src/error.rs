// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 归档系统错误类型
//! Error types of the archive consumer

use std::path::PathBuf;

/// 归档消费者错误 (配置错误 / 提交被拒)
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("output root is empty or not a usable directory: {0:?}")]
    InvalidOutputRoot(PathBuf),

    #[error("frame-to-skip rules file missing: {0:?}")]
    MissingRulesFile(PathBuf),

    #[error("invalid skip rule at line {line}: {reason}")]
    InvalidRules { line: usize, reason: String },

    #[error("seconds_to_skip_interval must be positive")]
    NonPositiveInterval,

    #[error("stream id {stream_id} out of range (source count {source_count})")]
    StreamOutOfRange { stream_id: usize, source_count: usize },

    #[error("consumer is not initialized")]
    NotRunning,

    #[error("consumer stopped")]
    Stopped,

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 单个图像编码任务的错误 (不影响同批其他任务)
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("path too long ({len} bytes, must be less than {max}): {path:?}")]
    PathTooLong { path: PathBuf, len: usize, max: usize },

    #[error("crop region is empty after clamping to the surface")]
    EmptyRegion,

    #[error("surface buffer does not match {width}x{height} RGBA")]
    SurfaceMismatch { width: u32, height: u32 },

    #[error("image encode failed: {0}")]
    Image(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("encoder worker disconnected")]
    Disconnected,
}

impl From<image::ImageError> for EncodeError {
    fn from(e: image::ImageError) -> Self {
        EncodeError::Image(e.to_string())
    }
}
