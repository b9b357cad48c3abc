// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ReID嵌入解析: 本帧嵌入优先, 缺失时回退到历史缓存
//! Two-tier embedding resolution (current frame first, history cache second)

use std::sync::Arc;

use crate::detection::EmbeddingRef;

use super::cache::EmbeddingCache;

/// 嵌入来自哪里
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolvedFrom {
    /// 本帧推理输出 (已物化到主机内存)
    Current,
    /// 历史缓存回退
    Cache,
}

/// 解析结果
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedEmbedding {
    pub vector: Arc<[f32]>,
    pub from: ResolvedFrom,
}

pub struct ReidResolver {
    cache: Arc<EmbeddingCache>,
}

impl ReidResolver {
    pub fn new(cache: Arc<EmbeddingCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// 解析对象在当前帧使用的嵌入
    ///
    /// 1. 本帧有嵌入: 物化后返回, 不访问缓存
    /// 2. 否则 `retention_window > 0` 时查询缓存
    /// 3. 否则返回 None
    pub fn resolve(
        &self,
        stream_id: usize,
        frame_number: i64,
        retention_window: u32,
        object_id: u64,
        current_embedding: Option<EmbeddingRef<'_>>,
    ) -> Option<ResolvedEmbedding> {
        if let Some(current) = current_embedding.filter(|e| !e.is_empty()) {
            return Some(ResolvedEmbedding {
                vector: current.materialize(),
                from: ResolvedFrom::Current,
            });
        }

        if retention_window == 0 {
            return None;
        }

        self.cache
            .lookup(stream_id, frame_number, retention_window, object_id)
            .map(|vector| ResolvedEmbedding {
                vector,
                from: ResolvedFrom::Cache,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::embedding::tests::CountingDeviceBuffer;
    use crate::reid::FrameEmbedding;
    use std::sync::atomic::Ordering;

    fn resolver_with_history() -> ReidResolver {
        let cache = Arc::new(EmbeddingCache::new(2));
        let mut fe = FrameEmbedding::new(100);
        fe.push(9, Arc::from(vec![0.9f32, 0.1]));
        cache.push(0, fe, 30);
        ReidResolver::new(cache)
    }

    #[test]
    fn test_current_embedding_wins() {
        let resolver = resolver_with_history();
        let current = [1.0f32, 2.0, 3.0];
        let resolved = resolver
            .resolve(0, 101, 30, 9, Some(EmbeddingRef::Host(&current)))
            .expect("resolved");
        assert_eq!(resolved.from, ResolvedFrom::Current);
        assert_eq!(&*resolved.vector, &current);
    }

    #[test]
    fn test_device_embedding_materialized_once() {
        let resolver = resolver_with_history();
        let buf = CountingDeviceBuffer::new(vec![4.0, 5.0]);
        let resolved = resolver
            .resolve(0, 101, 30, 9, Some(EmbeddingRef::Device(&buf)))
            .expect("resolved");
        assert_eq!(&*resolved.vector, &[4.0, 5.0]);
        assert_eq!(buf.copies.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_falls_back_to_cache() {
        let resolver = resolver_with_history();
        let resolved = resolver.resolve(0, 120, 30, 9, None).expect("cache hit");
        assert_eq!(resolved.from, ResolvedFrom::Cache);
        assert_eq!(&*resolved.vector, &[0.9, 0.1]);
    }

    #[test]
    fn test_empty_current_embedding_treated_as_absent() {
        let resolver = resolver_with_history();
        let empty: [f32; 0] = [];
        let resolved = resolver
            .resolve(0, 110, 30, 9, Some(EmbeddingRef::Host(&empty)))
            .expect("cache hit");
        assert_eq!(resolved.from, ResolvedFrom::Cache);
    }

    #[test]
    fn test_miss_without_window() {
        let resolver = resolver_with_history();
        assert!(resolver.resolve(0, 101, 0, 9, None).is_none());
        assert!(resolver.resolve(0, 200, 30, 9, None).is_none());
        assert!(resolver.resolve(1, 101, 30, 9, None).is_none());
    }
}
