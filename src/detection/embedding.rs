// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ReID嵌入引用 (主机内存 / 设备内存)
//! Embedding references that may live in host or device memory

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// 设备内存中的嵌入 (例如GPU张量输出)
///
/// 实现者只需要提供同步拷贝到主机内存的能力。
pub trait DeviceBuffer: Send + Sync + fmt::Debug {
    /// 元素个数 (f32)
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 同步拷贝到主机内存, `dst.len() == self.len()`
    fn copy_to_host(&self, dst: &mut [f32]);
}

/// 嵌入来源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingOrigin {
    /// 跟踪器 re-identification 特征
    Tracker,
    /// 二级分类器 (SGIE) 张量输出
    Classifier,
}

/// 本帧嵌入的借用引用
#[derive(Clone, Copy, Debug)]
pub enum EmbeddingRef<'a> {
    Host(&'a [f32]),
    Device(&'a dyn DeviceBuffer),
}

impl EmbeddingRef<'_> {
    pub fn len(&self) -> usize {
        match self {
            EmbeddingRef::Host(data) => data.len(),
            EmbeddingRef::Device(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_on_device(&self) -> bool {
        matches!(self, EmbeddingRef::Device(_))
    }

    /// 物化到主机内存 (设备内存时执行一次同步拷贝)
    pub fn materialize(&self) -> Arc<[f32]> {
        match self {
            EmbeddingRef::Host(data) => Arc::from(*data),
            EmbeddingRef::Device(buf) => {
                let mut host = vec![0.0f32; buf.len()];
                buf.copy_to_host(&mut host);
                Arc::from(host)
            }
        }
    }
}

/// 对象上附带的嵌入 (拥有所有权)
#[derive(Clone)]
pub enum EmbeddingSource {
    Host(Arc<[f32]>),
    Device(Arc<dyn DeviceBuffer>),
}

impl fmt::Debug for EmbeddingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingSource::Host(data) => write!(f, "Host(len={})", data.len()),
            EmbeddingSource::Device(buf) => write!(f, "Device({:?})", buf),
        }
    }
}

/// 带来源标记的嵌入
#[derive(Clone, Debug)]
pub struct AttachedEmbedding {
    pub origin: EmbeddingOrigin,
    pub source: EmbeddingSource,
}

impl AttachedEmbedding {
    pub fn host(origin: EmbeddingOrigin, data: Vec<f32>) -> Self {
        Self {
            origin,
            source: EmbeddingSource::Host(Arc::from(data)),
        }
    }

    pub fn device(origin: EmbeddingOrigin, buf: Arc<dyn DeviceBuffer>) -> Self {
        Self {
            origin,
            source: EmbeddingSource::Device(buf),
        }
    }

    pub fn embedding_ref(&self) -> EmbeddingRef<'_> {
        match &self.source {
            EmbeddingSource::Host(data) => EmbeddingRef::Host(&data[..]),
            EmbeddingSource::Device(buf) => EmbeddingRef::Device(&**buf),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 统计拷贝次数的设备缓冲区
    #[derive(Debug)]
    pub(crate) struct CountingDeviceBuffer {
        pub data: Vec<f32>,
        pub copies: AtomicUsize,
    }

    impl CountingDeviceBuffer {
        pub fn new(data: Vec<f32>) -> Self {
            Self {
                data,
                copies: AtomicUsize::new(0),
            }
        }
    }

    impl DeviceBuffer for CountingDeviceBuffer {
        fn len(&self) -> usize {
            self.data.len()
        }

        fn copy_to_host(&self, dst: &mut [f32]) {
            self.copies.fetch_add(1, Ordering::SeqCst);
            dst.copy_from_slice(&self.data);
        }
    }

    #[test]
    fn test_materialize_device_copies_once() {
        let buf = CountingDeviceBuffer::new(vec![0.5, 0.25, 0.125]);
        let emb = EmbeddingRef::Device(&buf);
        assert!(emb.is_on_device());

        let host = emb.materialize();
        assert_eq!(&*host, &[0.5, 0.25, 0.125]);
        assert_eq!(buf.copies.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attached_host_embedding() {
        let attached = AttachedEmbedding::host(EmbeddingOrigin::Tracker, vec![1.0, 2.0]);
        let emb = attached.embedding_ref();
        assert!(!emb.is_on_device());
        assert_eq!(emb.len(), 2);
        assert_eq!(&*emb.materialize(), &[1.0, 2.0]);
    }
}
