// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 图像与元数据归档
//! producer (单批次暂存) → consumer (准入 + 每路互斥提交) → encoder (异步JPEG)

pub mod artifact;
pub mod clock;
pub mod consumer;
pub mod encoder;
pub mod producer;
pub mod rules;

pub use artifact::{csv_field, CandidateArtifact, MetadataWriter, METADATA_HEADER};
pub use clock::{Clock, ManualClock, SystemClock};
pub use consumer::{ArtifactConsumer, CommitReport, ConsumerState, ImageKind};
pub use encoder::{
    encode_to_file, EncodeHandle, EncodeJob, EncodeOutcome, ImageEncoder, ThreadedImageEncoder,
    MAX_IMAGE_PATH_LEN,
};
pub use producer::ArtifactProducer;
pub use rules::{CaptureTimeRule, CaptureTimeRules};
