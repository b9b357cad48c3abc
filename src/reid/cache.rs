// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 每路视频的ReID嵌入历史缓存
//! Per-stream, frame-windowed history of recent object embeddings
//!
//! 每路视频一个双端队列, 队头是最新帧, 队尾是最旧帧。
//! 帧号从队头到队尾单调不增 (调用方保证同一路视频帧号不减)。

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// 单个对象的嵌入
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectEmbedding {
    pub object_id: u64,
    pub vector: Arc<[f32]>,
}

/// 一帧内所有对象的嵌入
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameEmbedding {
    pub frame_number: i64,
    pub embeddings: Vec<ObjectEmbedding>,
}

impl FrameEmbedding {
    pub fn new(frame_number: i64) -> Self {
        Self {
            frame_number,
            embeddings: Vec::new(),
        }
    }

    pub fn push(&mut self, object_id: u64, vector: Arc<[f32]>) {
        self.embeddings.push(ObjectEmbedding { object_id, vector });
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// 按对象ID查找 (同一帧内取第一个)
    pub fn find(&self, object_id: u64) -> Option<&ObjectEmbedding> {
        self.embeddings.iter().find(|e| e.object_id == object_id)
    }
}

/// 单路视频的历史 (front = 最新, back = 最旧)
#[derive(Debug, Default)]
struct StreamEmbeddingHistory {
    frames: VecDeque<FrameEmbedding>,
}

/// 窗口下界: 帧号小于该值的历史已过期
fn cutoff(current_frame_number: i64, retention_window: u32) -> i64 {
    current_frame_number.saturating_sub(retention_window as i64)
}

/// ReID嵌入历史缓存 (按 stream_id 分区, 每路一把锁)
///
/// `retention_window == 0` 表示缓存关闭: push 不写入, lookup 永远找不到,
/// evict 不做任何事。
pub struct EmbeddingCache {
    streams: Vec<Mutex<StreamEmbeddingHistory>>,
}

impl EmbeddingCache {
    pub fn new(source_count: usize) -> Self {
        Self {
            streams: (0..source_count)
                .map(|_| Mutex::new(StreamEmbeddingHistory::default()))
                .collect(),
        }
    }

    pub fn source_count(&self) -> usize {
        self.streams.len()
    }

    /// 在队头插入当前帧的嵌入; 空帧或缓存关闭时不做任何事
    pub fn push(&self, stream_id: usize, frame_embedding: FrameEmbedding, retention_window: u32) {
        if retention_window == 0 || frame_embedding.is_empty() {
            return;
        }
        let Some(stream) = self.streams.get(stream_id) else {
            debug!("stream {} 超出缓存范围, 忽略嵌入", stream_id);
            return;
        };
        stream.lock().frames.push_front(frame_embedding);
    }

    /// 从队尾移除 `frame_number < current - window` 的历史帧, 返回移除数量
    pub fn evict(
        &self,
        stream_id: usize,
        current_frame_number: i64,
        retention_window: u32,
    ) -> usize {
        if retention_window == 0 {
            return 0;
        }
        let Some(stream) = self.streams.get(stream_id) else {
            return 0;
        };
        let limit = cutoff(current_frame_number, retention_window);
        let mut history = stream.lock();
        let mut evicted = 0;
        while history
            .frames
            .back()
            .is_some_and(|tail| tail.frame_number < limit)
        {
            history.frames.pop_back();
            evicted += 1;
        }
        evicted
    }

    /// 从队头向队尾查找该对象最近一次的嵌入
    ///
    /// 遇到第一个过期帧即停止: 按帧号有序, 其后的历史全部过期。
    pub fn lookup(
        &self,
        stream_id: usize,
        current_frame_number: i64,
        retention_window: u32,
        object_id: u64,
    ) -> Option<Arc<[f32]>> {
        if retention_window == 0 {
            return None;
        }
        let stream = self.streams.get(stream_id)?;
        let limit = cutoff(current_frame_number, retention_window);
        let history = stream.lock();
        for frame in history.frames.iter() {
            if frame.frame_number < limit {
                return None;
            }
            if let Some(hit) = frame.find(object_id) {
                return Some(hit.vector.clone());
            }
        }
        None
    }

    /// 当前缓存的帧数
    pub fn len(&self, stream_id: usize) -> usize {
        self.streams
            .get(stream_id)
            .map_or(0, |stream| stream.lock().frames.len())
    }

    pub fn is_empty(&self, stream_id: usize) -> bool {
        self.len(stream_id) == 0
    }

    /// 缓存中最旧的帧号
    pub fn oldest_frame(&self, stream_id: usize) -> Option<i64> {
        self.streams
            .get(stream_id)
            .and_then(|stream| stream.lock().frames.back().map(|f| f.frame_number))
    }

    pub fn clear(&self, stream_id: usize) {
        if let Some(stream) = self.streams.get(stream_id) {
            stream.lock().frames.clear();
        }
    }

    pub fn clear_all(&self) {
        for stream in &self.streams {
            stream.lock().frames.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(frame_number: i64, ids: &[(u64, f32)]) -> FrameEmbedding {
        let mut fe = FrameEmbedding::new(frame_number);
        for &(id, v) in ids {
            fe.push(id, Arc::from(vec![v; 4]));
        }
        fe
    }

    /// 历史: [50:{7}, 40:{7}, 30:{7}] (head → tail)
    fn history_of_seven() -> EmbeddingCache {
        let cache = EmbeddingCache::new(4);
        cache.push(0, frame(30, &[(7, 30.0)]), 15);
        cache.push(0, frame(40, &[(7, 40.0)]), 15);
        cache.push(0, frame(50, &[(7, 50.0)]), 15);
        cache
    }

    #[test]
    fn test_lookup_returns_most_recent_match() {
        let cache = history_of_seven();
        let hit = cache.lookup(0, 52, 15, 7).expect("hit");
        assert_eq!(hit[0], 50.0);
    }

    #[test]
    fn test_lookup_stops_at_window_boundary() {
        let cache = history_of_seven();
        // 50 < 66 - 15 = 51
        assert!(cache.lookup(0, 66, 15, 7).is_none());
        // 边界: 50 >= 65 - 15
        assert_eq!(cache.lookup(0, 65, 15, 7).map(|v| v[0]), Some(50.0));
    }

    #[test]
    fn test_lookup_skips_frames_without_object() {
        let cache = EmbeddingCache::new(1);
        cache.push(0, frame(10, &[(3, 1.0)]), 20);
        cache.push(0, frame(11, &[(4, 2.0)]), 20);
        assert_eq!(cache.lookup(0, 12, 20, 3).map(|v| v[0]), Some(1.0));
        assert!(cache.lookup(0, 12, 20, 99).is_none());
    }

    #[test]
    fn test_evict_keeps_only_frames_in_window() {
        let cache = EmbeddingCache::new(2);
        for f in 0..20 {
            cache.push(1, frame(f, &[(1, f as f32)]), 5);
        }
        let evicted = cache.evict(1, 20, 5);
        assert_eq!(evicted, 15);
        assert_eq!(cache.len(1), 5);
        assert_eq!(cache.oldest_frame(1), Some(15));

        // 其他视频流不受影响
        assert!(cache.is_empty(0));
    }

    #[test]
    fn test_evict_invariant_over_random_walk() {
        let cache = EmbeddingCache::new(1);
        let window = 7;
        let mut current = 0i64;
        for step in 0..200i64 {
            current += step % 3; // 帧号不减, 可能重复
            cache.evict(0, current, window);
            cache.push(0, frame(current, &[(step as u64 % 5, 0.0)]), window);
            let oldest = cache.oldest_frame(0).expect("non-empty");
            assert!(oldest >= current - window as i64);
        }
    }

    #[test]
    fn test_disabled_cache() {
        let cache = EmbeddingCache::new(1);
        cache.push(0, frame(10, &[(7, 1.0)]), 0);
        assert!(cache.is_empty(0));

        cache.push(0, frame(10, &[(7, 1.0)]), 30);
        assert!(cache.lookup(0, 10, 0, 7).is_none());
        assert_eq!(cache.evict(0, 1000, 0), 0);
        assert_eq!(cache.len(0), 1);
    }

    #[test]
    fn test_empty_frame_is_not_pushed() {
        let cache = EmbeddingCache::new(1);
        cache.push(0, FrameEmbedding::new(3), 10);
        assert!(cache.is_empty(0));
    }

    #[test]
    fn test_out_of_range_stream_is_ignored() {
        let cache = EmbeddingCache::new(1);
        cache.push(5, frame(1, &[(1, 1.0)]), 10);
        assert!(cache.lookup(5, 1, 10, 1).is_none());
        assert_eq!(cache.evict(5, 1, 10), 0);
    }

    #[test]
    fn test_clear_all() {
        let cache = history_of_seven();
        cache.push(1, frame(1, &[(1, 1.0)]), 15);
        cache.clear(0);
        assert!(cache.is_empty(0));
        assert_eq!(cache.len(1), 1);
        cache.clear_all();
        assert!(cache.is_empty(1));
    }
}
