// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 单批次暂存 (ArtifactProducer)
//! 只在一次批处理调用内使用, 不跨线程共享; `flush` 之后不可再用。

use std::path::{Path, PathBuf};

use tracing::warn;

use super::artifact::CandidateArtifact;
use super::consumer::{ArtifactConsumer, CommitReport, ImageKind};
use crate::detection::FrameSurface;
use crate::error::ArchiveError;
use crate::timestamp::path_safe;

pub struct ArtifactProducer<'a> {
    consumer: &'a ArtifactConsumer,
    stream_id: usize,
    staged: Vec<CandidateArtifact>,
    full_frame_path: Option<PathBuf>,
}

impl<'a> ArtifactProducer<'a> {
    pub fn new(consumer: &'a ArtifactConsumer, stream_id: usize) -> Self {
        Self {
            consumer,
            stream_id,
            staged: Vec::new(),
            full_frame_path: None,
        }
    }

    /// 整帧图像路径, 同一批次内只生成一次, 之后复用
    pub fn generate_full_frame_path(&mut self, timestamp: &str) -> &Path {
        let consumer = self.consumer;
        let stream_id = self.stream_id;
        self.full_frame_path.get_or_insert_with(|| {
            consumer.make_image_path(ImageKind::FullFrame, stream_id, &path_safe(timestamp))
        })
    }

    pub fn full_frame_path(&self) -> Option<&Path> {
        self.full_frame_path.as_deref()
    }

    /// 暂存一个目标并补全图像路径
    ///
    /// 需要整帧但还没有生成整帧路径, 或者视频源不一致时返回 false。
    pub fn stage(&mut self, mut candidate: CandidateArtifact) -> bool {
        if candidate.stream_id != self.stream_id {
            warn!(
                "⚠️  目标属于视频源 {}, 暂存区属于 {}",
                candidate.stream_id, self.stream_id
            );
            return false;
        }
        let config = self.consumer.config();
        if config.save_full_frame {
            match &self.full_frame_path {
                Some(path) => candidate.full_frame_path = Some(path.clone()),
                None => return false,
            }
        }
        if config.save_cropped_object && candidate.cropped_object_path.is_none() {
            let stem = format!("{}_{}", candidate.object_id, candidate.frame_number);
            let path = self
                .consumer
                .make_image_path(ImageKind::CroppedObject, self.stream_id, &stem);
            candidate.cropped_object_path = Some(path);
        }
        self.staged.push(candidate);
        true
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn staged(&self) -> &[CandidateArtifact] {
        &self.staged
    }

    /// 把暂存列表整体交给消费者; 没有暂存目标时不提交
    pub fn flush(self, surface: &FrameSurface) -> Result<CommitReport, ArchiveError> {
        if self.staged.is_empty() {
            return Ok(CommitReport::empty(self.stream_id));
        }
        self.consumer.commit(self.stream_id, self.staged, surface)
    }
}
