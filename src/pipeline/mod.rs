// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 批处理流水线 (Batch Processing Pipeline)
///
/// 每帧: 淘汰过期嵌入 → 跳帧预检查 → 整帧路径 → 逐目标 (ReID解析 / 准入 / 暂存 / 事件)
/// → 提交 → 写入嵌入缓存
pub mod processor;

pub use processor::BatchProcessor;

use crate::archive::CommitReport;
use crate::error::ArchiveError;
use crate::events::EventMessage;
use crate::reid::ResolvedEmbedding;

// ========== 处理结果 ==========

/// 单帧处理结果
#[derive(Debug)]
pub struct FrameReport {
    pub stream_id: usize,
    pub frame_number: i64,
    /// 暂存并交给消费者的目标数
    pub staged: usize,
    /// None = 本批次未到保存时间 (跳帧)
    pub commit: Option<Result<CommitReport, ArchiveError>>,
    /// 每个目标解析到的嵌入 (object_id, 嵌入)
    pub embeddings: Vec<(u64, Option<ResolvedEmbedding>)>,
    pub events: Vec<EventMessage>,
}

impl FrameReport {
    pub fn rows_written(&self) -> usize {
        match &self.commit {
            Some(Ok(report)) => report.rows_written,
            _ => 0,
        }
    }

    pub fn failed_jobs(&self) -> usize {
        match &self.commit {
            Some(Ok(report)) => report.failed_jobs,
            _ => 0,
        }
    }

    /// 消费者已停止 / 未初始化
    pub fn rejected(&self) -> bool {
        matches!(
            self.commit,
            Some(Err(ArchiveError::Stopped)) | Some(Err(ArchiveError::NotRunning))
        )
    }
}

/// 一个批次的处理结果
#[derive(Debug, Default)]
pub struct BatchReport {
    pub frames: Vec<FrameReport>,
}

impl BatchReport {
    pub fn rows_written(&self) -> usize {
        self.frames.iter().map(FrameReport::rows_written).sum()
    }

    pub fn failed_jobs(&self) -> usize {
        self.frames.iter().map(FrameReport::failed_jobs).sum()
    }

    pub fn events(&self) -> impl Iterator<Item = &EventMessage> {
        self.frames.iter().flat_map(|f| f.events.iter())
    }
}
