// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 归档消费者 (ArtifactConsumer)
//! 职责: 准入控制 → 每路视频互斥提交 → 写元数据 → 派发编码任务 → 等待完成
//!
//! 进程内只创建一个实例, 通过 `Arc` 传给每个处理线程。
//! 不同视频源的提交互不阻塞; 同一视频源的提交串行执行。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::artifact::{CandidateArtifact, MetadataWriter, METADATA_FILE_NAME};
use super::clock::{Clock, SystemClock};
use super::encoder::{EncodeJob, ImageEncoder};
use super::rules::CaptureTimeRules;
use crate::config::ArchiveConfig;
use crate::detection::{BoxRect, FrameSurface};
use crate::error::ArchiveError;

/// 还没有保存过
const NEVER_SAVED: i64 = i64::MIN;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    Uninitialized,
    Running,
    Stopped,
}

/// 图像类别 → 子目录
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    FullFrame,
    CroppedObject,
}

impl ImageKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            ImageKind::FullFrame => "full_frame",
            ImageKind::CroppedObject => "cropped_obj",
        }
    }
}

/// 一次提交的结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub stream_id: usize,
    pub rows_written: usize,
    pub jobs_dispatched: usize,
    pub failed_jobs: usize,
    /// 锁内复查时被跳帧间隔拒绝
    pub rate_limited: bool,
    /// 不满足置信度/检测框规则而丢弃的目标
    pub filtered_out: usize,
}

impl CommitReport {
    pub fn empty(stream_id: usize) -> Self {
        Self {
            stream_id,
            ..Default::default()
        }
    }

    /// 元数据已写入但有编码任务失败
    pub fn is_partial(&self) -> bool {
        self.failed_jobs > 0
    }
}

/// 每路视频的准入状态, 只在持有该路的锁时修改
#[derive(Debug, Default)]
struct SourceAdmissionState {
    last_saved: Option<DateTime<Local>>,
    metadata: Option<MetadataWriter>,
}

struct SourceSlot {
    state: Mutex<SourceAdmissionState>,
    /// last_saved 的毫秒镜像, 供不加锁的预检查使用
    last_saved_ms: AtomicI64,
}

impl SourceSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SourceAdmissionState::default()),
            last_saved_ms: AtomicI64::new(NEVER_SAVED),
        }
    }
}

pub struct ArtifactConsumer {
    config: ArchiveConfig,
    encoder: Arc<dyn ImageEncoder>,
    clock: Arc<dyn Clock>,
    state: RwLock<ConsumerState>,
    rules: RwLock<CaptureTimeRules>,
    sources: Vec<SourceSlot>,
}

impl ArtifactConsumer {
    pub fn new(config: ArchiveConfig, encoder: Arc<dyn ImageEncoder>) -> Self {
        let sources = (0..config.source_count).map(|_| SourceSlot::new()).collect();
        let rules = CaptureTimeRules::new(config.seconds_to_skip_interval);
        Self {
            config,
            encoder,
            clock: Arc::new(SystemClock),
            state: RwLock::new(ConsumerState::Uninitialized),
            rules: RwLock::new(rules),
            sources,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.read()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ConsumerState::Running
    }

    /// 未初始化或已停止
    pub fn is_stopped(&self) -> bool {
        !self.is_running()
    }

    /// Uninitialized → Running
    ///
    /// 检查输出目录和跳帧规则文件; 失败时保持 Uninitialized。
    pub fn init(&self) -> Result<(), ArchiveError> {
        let mut state = self.state.write();
        match *state {
            ConsumerState::Running => return Ok(()),
            ConsumerState::Stopped => return Err(ArchiveError::Stopped),
            ConsumerState::Uninitialized => {}
        }

        let rules = self.prepare().map_err(|e| {
            error!("❌ 归档初始化失败: {}", e);
            e
        })?;
        *self.rules.write() = rules;
        *state = ConsumerState::Running;
        info!(
            "✅ 归档已启动: {} ({} 路视频)",
            self.config.output_root.display(),
            self.sources.len()
        );
        Ok(())
    }

    fn prepare(&self) -> Result<CaptureTimeRules, ArchiveError> {
        self.config.validate()?;
        let root = &self.config.output_root;
        fs::create_dir_all(root).map_err(|_| ArchiveError::InvalidOutputRoot(root.clone()))?;
        if !root.is_dir() {
            return Err(ArchiveError::InvalidOutputRoot(root.clone()));
        }
        let rules = CaptureTimeRules::load(
            &self.config.skip_rules_path,
            self.config.seconds_to_skip_interval,
        )?;
        info!("📋 跳帧规则: {} 条", rules.len());
        Ok(rules)
    }

    /// 重新加载跳帧规则; 依次持有所有视频源的锁后替换
    pub fn reload_rules(&self, path: &Path) -> Result<(), ArchiveError> {
        if !self.is_running() {
            return Err(ArchiveError::NotRunning);
        }
        let rules = CaptureTimeRules::load(path, self.config.seconds_to_skip_interval)?;
        let _guards: Vec<_> = self.sources.iter().map(|s| s.state.lock()).collect();
        let count = rules.len();
        *self.rules.write() = rules;
        info!("🔄 跳帧规则已重新加载: {} 条 ({})", count, path.display());
        Ok(())
    }

    /// Running → Stopped; 等待进行中的提交结束并刷新元数据文件
    pub fn stop(&self) {
        {
            let mut state = self.state.write();
            if *state == ConsumerState::Stopped {
                return;
            }
            *state = ConsumerState::Stopped;
        }
        for (stream_id, slot) in self.sources.iter().enumerate() {
            let mut source = slot.state.lock();
            if let Some(mut writer) = source.metadata.take() {
                if let Err(e) = writer.flush() {
                    warn!("⚠️  视频源 {} 元数据刷新失败: {}", stream_id, e);
                }
            }
        }
        info!("🛑 归档已停止");
    }

    /// 准入规则 1 + 2 (置信度区间 / 检测框大小)
    pub fn admits(&self, confidence: f32, rect: &BoxRect) -> bool {
        if !(0.0..=1.0).contains(&confidence) {
            warn!("⚠️  置信度超出 [0, 1]: {}", confidence);
        }
        let ok = self.passes_filters(confidence, rect);
        if !ok {
            debug!(
                "跳过目标: conf={:.3} box={}x{}",
                confidence, rect.width, rect.height
            );
        }
        ok
    }

    fn passes_filters(&self, confidence: f32, rect: &BoxRect) -> bool {
        let c = &self.config;
        c.min_confidence < confidence
            && confidence < c.max_confidence
            && rect.width > c.min_box_width as f32
            && rect.height > c.min_box_height as f32
    }

    fn eligible(&self, last_saved_ms: i64, now: DateTime<Local>) -> bool {
        if last_saved_ms == NEVER_SAVED {
            return true;
        }
        let interval = self.rules.read().interval_at(now.time());
        now.timestamp_millis() - last_saved_ms >= interval.num_milliseconds()
    }

    /// 准入规则 3 的预检查 (不加锁); 提交时在锁内复查
    pub fn should_save(&self, stream_id: usize) -> bool {
        if !self.is_running() {
            return false;
        }
        let Some(slot) = self.sources.get(stream_id) else {
            return false;
        };
        let last = slot.last_saved_ms.load(Ordering::Acquire);
        self.eligible(last, self.clock.now())
    }

    pub fn last_saved(&self, stream_id: usize) -> Option<DateTime<Local>> {
        self.sources.get(stream_id)?.state.lock().last_saved
    }

    pub fn stream_dir(&self, stream_id: usize) -> PathBuf {
        self.config
            .output_root
            .join(format!("camera-{}", stream_id))
    }

    /// `output_root/camera-<id>/<kind>/<stem>.jpg`
    pub fn make_image_path(&self, kind: ImageKind, stream_id: usize, stem: &str) -> PathBuf {
        self.stream_dir(stream_id)
            .join(kind.dir_name())
            .join(format!("{}.jpg", stem))
    }

    /// 提交一批目标
    ///
    /// 持有该路视频的锁: 复查跳帧间隔, 丢弃不满足准入规则 1 + 2 的目标,
    /// 逐行写元数据, 派发整帧 (每批最多一次) 和裁剪编码任务, 更新保存时间,
    /// 等待全部编码完成后释放。`surface` 在返回前不会被其他人修改。
    pub fn commit(
        &self,
        stream_id: usize,
        candidates: Vec<CandidateArtifact>,
        surface: &FrameSurface,
    ) -> Result<CommitReport, ArchiveError> {
        match self.state() {
            ConsumerState::Running => {}
            ConsumerState::Stopped => return Err(ArchiveError::Stopped),
            ConsumerState::Uninitialized => return Err(ArchiveError::NotRunning),
        }
        let slot = self
            .sources
            .get(stream_id)
            .ok_or(ArchiveError::StreamOutOfRange {
                stream_id,
                source_count: self.sources.len(),
            })?;

        let mut source = slot.state.lock();
        // 等锁期间可能已经 stop()
        if !self.is_running() {
            return Err(ArchiveError::Stopped);
        }

        let now = self.clock.now();
        let mut report = CommitReport::empty(stream_id);
        if !self.eligible(slot.last_saved_ms.load(Ordering::Acquire), now) {
            debug!("视频源 {} 在跳帧间隔内, 放弃 {} 个目标", stream_id, candidates.len());
            report.rate_limited = true;
            return Ok(report);
        }
        let (candidates, dropped): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| self.passes_filters(c.confidence, &c.rect));
        report.filtered_out = dropped.len();
        if !dropped.is_empty() {
            debug!("视频源 {} 丢弃 {} 个不满足准入规则的目标", stream_id, dropped.len());
        }
        if candidates.is_empty() {
            return Ok(report);
        }

        let writer = match source.metadata.take() {
            Some(w) => w,
            None => MetadataWriter::open(&self.stream_dir(stream_id).join(METADATA_FILE_NAME))?,
        };
        let writer = source.metadata.insert(writer);
        for candidate in &candidates {
            writer.append(candidate)?;
            report.rows_written += 1;
        }
        writer.flush()?;

        let quality = self.config.jpeg_quality;
        let mut handles = Vec::new();
        if self.config.save_full_frame {
            if let Some(path) = candidates.iter().find_map(|c| c.full_frame_path.clone()) {
                handles.push(self.encoder.submit(EncodeJob {
                    destination: path,
                    surface: surface.clone(),
                    region: None,
                    quality,
                }));
            }
        }
        if self.config.save_cropped_object {
            for candidate in &candidates {
                if let Some(path) = &candidate.cropped_object_path {
                    handles.push(self.encoder.submit(EncodeJob {
                        destination: path.clone(),
                        surface: surface.clone(),
                        region: Some(candidate.rect),
                        quality,
                    }));
                }
            }
        }
        report.jobs_dispatched = handles.len();

        source.last_saved = Some(now);
        slot.last_saved_ms.store(now.timestamp_millis(), Ordering::Release);

        for outcome in self.encoder.await_all(handles) {
            if let Err(e) = &outcome.result {
                warn!(
                    "⚠️  视频源 {} 图像保存失败 {}: {}",
                    stream_id,
                    outcome.destination.display(),
                    e
                );
                report.failed_jobs += 1;
            }
        }
        drop(source);

        debug!(
            "💾 视频源 {}: {} 行元数据, {} 个编码任务 ({} 失败)",
            stream_id, report.rows_written, report.jobs_dispatched, report.failed_jobs
        );
        Ok(report)
    }
}
