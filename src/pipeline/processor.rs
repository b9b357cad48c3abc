// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 批处理器 (BatchProcessor)
/// 职责: 接收检测/跟踪结果 → ReID嵌入解析 → 图像归档 → 事件消息
///
/// 可以被多个线程同时调用 (每路视频一个线程), 状态都按视频源分区。
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{BatchReport, FrameReport};
use crate::archive::{ArtifactConsumer, ArtifactProducer, CandidateArtifact, ConsumerState};
use crate::detection::{EmbeddingOrigin, FrameBatch, FrameMeta};
use crate::error::ArchiveError;
use crate::events::{is_message_frame, EventMessage};
use crate::reid::{EmbeddingCache, FrameEmbedding, ReidResolver, ResolvedFrom};
use crate::timestamp::{rfc3339_millis, StreamClock};

pub struct BatchProcessor {
    consumer: Arc<ArtifactConsumer>,
    resolver: ReidResolver,
    stream_clock: StreamClock,
}

impl BatchProcessor {
    pub fn new(consumer: Arc<ArtifactConsumer>) -> Self {
        let source_count = consumer.source_count();
        let cache = Arc::new(EmbeddingCache::new(source_count));
        Self {
            consumer,
            resolver: ReidResolver::new(cache),
            stream_clock: StreamClock::new(source_count),
        }
    }

    pub fn consumer(&self) -> &Arc<ArtifactConsumer> {
        &self.consumer
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        self.resolver.cache()
    }

    pub fn process_batch(&self, batch: &FrameBatch) -> BatchReport {
        BatchReport {
            frames: batch.frames.iter().map(|f| self.process_frame(f)).collect(),
        }
    }

    pub fn process_frame(&self, frame: &FrameMeta) -> FrameReport {
        let config = self.consumer.config();
        let stream_id = frame.stream_id;
        let frame_number = frame.frame_number;
        let window = config.reid.retention_window();
        let wanted_origin = if config.reid.use_tracker_reid {
            EmbeddingOrigin::Tracker
        } else {
            EmbeddingOrigin::Classifier
        };
        let cache = self.resolver.cache();

        // 1. 淘汰过期嵌入
        if window > 0 {
            let evicted = cache.evict(stream_id, frame_number, window);
            if evicted > 0 {
                debug!("视频源 {} 帧 {}: 淘汰 {} 帧嵌入", stream_id, frame_number, evicted);
            }
        }

        let now = self.consumer.clock().now();
        let frame_time = self.stream_clock.frame_time(
            stream_id,
            &frame.source_uri,
            frame.pts_ns,
            now.with_timezone(&Utc),
        );
        let timestamp = rfc3339_millis(&frame_time);

        // 2. 跳帧预检查 (每批每路一次)
        let state = self.consumer.state();
        let saving = state == ConsumerState::Running && self.consumer.should_save(stream_id);

        // 3. 整帧路径
        let mut producer = ArtifactProducer::new(&self.consumer, stream_id);
        if saving && config.save_full_frame {
            producer.generate_full_frame_path(&now.format("%Y-%m-%dT%H:%M:%S%.3f%z").to_string());
        }

        // 4. 逐目标
        let message_frame = is_message_frame(frame_number, config.message_rate);
        let mut frame_embedding = FrameEmbedding::new(frame_number);
        let mut embeddings = Vec::with_capacity(frame.objects.len());
        let mut events = Vec::new();

        for obj in &frame.objects {
            let current = obj
                .embedding
                .as_ref()
                .filter(|e| e.origin == wanted_origin)
                .map(|e| e.embedding_ref());
            let resolved =
                self.resolver
                    .resolve(stream_id, frame_number, window, obj.object_id, current);

            if let Some(r) = &resolved {
                if r.from == ResolvedFrom::Current && window > 0 {
                    frame_embedding.push(obj.object_id, r.vector.clone());
                }
            }

            if saving && self.consumer.admits(obj.confidence, &obj.rect) {
                let candidate = CandidateArtifact::from_object(frame, obj, &timestamp);
                if !producer.stage(candidate) {
                    warn!(
                        "⚠️  视频源 {} 目标 {} 暂存失败 (缺少整帧路径)",
                        stream_id, obj.object_id
                    );
                }
            }

            if message_frame {
                events.push(EventMessage::from_object(
                    frame,
                    obj,
                    &timestamp,
                    resolved.as_ref().map(|r| r.vector.clone()),
                ));
            }
            embeddings.push((obj.object_id, resolved));
        }

        // 5. 提交
        let staged = producer.len();
        let commit = match state {
            ConsumerState::Running if saving => Some(producer.flush(&frame.surface)),
            ConsumerState::Running => None,
            ConsumerState::Stopped => Some(Err(ArchiveError::Stopped)),
            ConsumerState::Uninitialized => Some(Err(ArchiveError::NotRunning)),
        };
        if let Some(Err(e)) = &commit {
            debug!("视频源 {} 帧 {}: 提交被拒绝: {}", stream_id, frame_number, e);
        }

        // 6. 写入嵌入缓存
        if window > 0 {
            cache.push(stream_id, frame_embedding, window);
        }

        FrameReport {
            stream_id,
            frame_number,
            staged,
            commit,
            embeddings,
            events,
        }
    }

    /// 停止消费者 (等待进行中的提交) 并释放所有嵌入历史
    pub fn shutdown(&self) {
        self.consumer.stop();
        self.resolver.cache().clear_all();
        info!("🛑 批处理器已关闭");
    }
}
