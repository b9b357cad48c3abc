// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测日志回放 + 图像归档 (Archiver)
///
/// 系统架构:
/// 1. 主线程:   读取 JSON-lines 检测日志, 按视频源分发
/// 2. 处理线程: 每路视频一个, ReID解析 + 准入 + 提交
/// 3. 编码线程: JPEG编码池 (ThreadedImageEncoder)
///
/// 日志每行一帧:
/// `{"stream_id":0,"frame_number":30,"pts_ns":0,"source_uri":"...","image":"frame.png",
///   "objects":[{"object_id":7,"class_label":"person","confidence":0.95,
///   "rect":{"top":10,"left":10,"width":100,"height":100},"embedding":[0.1,0.2]}]}`
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, Sender};
use serde::Deserialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use reid_archive::archive::{ArtifactConsumer, ThreadedImageEncoder};
use reid_archive::config::ArchiveConfig;
use reid_archive::detection::{
    AttachedEmbedding, BoxRect, DetectedObject, EmbeddingOrigin, FrameBatch, FrameMeta,
    FrameSurface,
};
use reid_archive::pipeline::BatchProcessor;

/// 归档参数
#[derive(Parser, Debug)]
#[command(author, version, about = "检测日志回放 - 图像与元数据归档", long_about = None)]
struct Args {
    /// 配置文件 (不存在时写出默认配置)
    #[arg(short, long, default_value = "archive_config.json")]
    config: PathBuf,

    /// 检测日志 (JSON lines)
    #[arg(short, long)]
    detections: PathBuf,

    /// 覆盖输出目录
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 覆盖跳帧规则文件
    #[arg(long)]
    rules: Option<PathBuf>,

    /// 使用跟踪器ReID特征
    #[arg(long, default_value_t = false)]
    tracker_reid: bool,

    /// ReID历史保留帧数
    #[arg(long)]
    reid_store_age: Option<u32>,

    /// 每N帧生成一次事件消息
    #[arg(long)]
    message_rate: Option<u32>,

    /// 事件消息输出 (JSON lines)
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Deserialize, Debug)]
struct ObjectRecord {
    object_id: u64,
    #[serde(default)]
    class_id: u32,
    #[serde(default)]
    class_label: String,
    confidence: f32,
    rect: BoxRect,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default = "default_origin")]
    embedding_origin: EmbeddingOrigin,
}

fn default_origin() -> EmbeddingOrigin {
    EmbeddingOrigin::Tracker
}

#[derive(Deserialize, Debug)]
struct FrameRecord {
    stream_id: usize,
    frame_number: i64,
    #[serde(default)]
    pts_ns: u64,
    #[serde(default)]
    source_uri: String,
    /// 帧图像; 没有时使用黑色画面
    #[serde(default)]
    image: Option<PathBuf>,
    #[serde(default = "default_width")]
    width: u32,
    #[serde(default = "default_height")]
    height: u32,
    #[serde(default)]
    source_width: u32,
    #[serde(default)]
    source_height: u32,
    #[serde(default)]
    objects: Vec<ObjectRecord>,
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn nonzero_or(value: u32, fallback: u32) -> u32 {
    if value > 0 {
        value
    } else {
        fallback
    }
}

impl FrameRecord {
    fn into_frame(self) -> FrameMeta {
        let surface = match &self.image {
            Some(path) => match image::open(path) {
                Ok(img) => FrameSurface::from_image(&img),
                Err(e) => {
                    warn!("⚠️  图像加载失败 {}: {}, 使用黑色画面", path.display(), e);
                    FrameSurface::blank(self.width, self.height)
                }
            },
            None => FrameSurface::blank(self.width, self.height),
        };
        let objects = self
            .objects
            .into_iter()
            .map(|o| DetectedObject {
                object_id: o.object_id,
                class_id: o.class_id,
                class_label: o.class_label,
                confidence: o.confidence,
                rect: o.rect,
                embedding: o
                    .embedding
                    .map(|v| AttachedEmbedding::host(o.embedding_origin, v)),
            })
            .collect();
        FrameMeta {
            stream_id: self.stream_id,
            frame_number: self.frame_number,
            pts_ns: self.pts_ns,
            source_uri: self.source_uri,
            source_width: nonzero_or(self.source_width, surface.width),
            source_height: nonzero_or(self.source_height, surface.height),
            surface,
            objects,
        }
    }
}

/// 每路视频的统计
#[derive(Debug, Default)]
struct StreamSummary {
    frames: usize,
    rows: usize,
    failed_jobs: usize,
    rejected: usize,
    events: Vec<String>,
}

fn spawn_worker(
    stream_id: usize,
    processor: Arc<BatchProcessor>,
    keep_events: bool,
) -> Result<(Sender<FrameMeta>, JoinHandle<StreamSummary>)> {
    let (tx, rx) = bounded::<FrameMeta>(64);
    let handle = std::thread::Builder::new()
        .name(format!("stream-{}", stream_id))
        .spawn(move || {
            let mut summary = StreamSummary::default();
            for frame in rx.iter() {
                let report = processor.process_batch(&FrameBatch {
                    frames: vec![frame],
                });
                summary.frames += 1;
                summary.rows += report.rows_written();
                summary.failed_jobs += report.failed_jobs();
                summary.rejected += report.frames.iter().filter(|f| f.rejected()).count();
                if keep_events {
                    for event in report.events() {
                        match event.to_json() {
                            Ok(json) => summary.events.push(json),
                            Err(e) => warn!("⚠️  事件序列化失败: {}", e),
                        }
                    }
                }
            }
            summary
        })
        .context("启动处理线程失败")?;
    Ok((tx, handle))
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let mut config = ArchiveConfig::load(&args.config)?;
    if let Some(output) = &args.output {
        config.output_root = output.clone();
    }
    if let Some(rules) = &args.rules {
        config.skip_rules_path = rules.clone();
    }
    if args.tracker_reid {
        config.reid.use_tracker_reid = true;
    }
    if let Some(age) = args.reid_store_age {
        config.reid.store_age = age;
    }
    if let Some(rate) = args.message_rate {
        config.message_rate = rate;
    }
    config.normalize_interval();
    config.print_summary();

    let encoder = Arc::new(
        ThreadedImageEncoder::new(config.encoder_threads).context("启动编码线程失败")?,
    );
    let consumer = Arc::new(ArtifactConsumer::new(config, encoder));
    consumer.init().context("归档初始化失败")?;
    let processor = Arc::new(BatchProcessor::new(consumer.clone()));

    let reader = BufReader::new(
        File::open(&args.detections)
            .with_context(|| format!("打开检测日志失败: {}", args.detections.display()))?,
    );

    let start = Instant::now();
    let mut workers: HashMap<usize, (Sender<FrameMeta>, JoinHandle<StreamSummary>)> =
        HashMap::new();
    let mut skipped = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("读取第 {} 行失败", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: FrameRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!("⚠️  第 {} 行解析失败: {}", idx + 1, e);
                skipped += 1;
                continue;
            }
        };
        if record.stream_id >= consumer.source_count() {
            warn!(
                "⚠️  第 {} 行: 视频源 {} 超出范围 (最多 {})",
                idx + 1,
                record.stream_id,
                consumer.source_count()
            );
            skipped += 1;
            continue;
        }

        let stream_id = record.stream_id;
        if !workers.contains_key(&stream_id) {
            info!("🎬 视频源 {} 开始处理", stream_id);
            let worker = spawn_worker(stream_id, processor.clone(), args.events.is_some())?;
            workers.insert(stream_id, worker);
        }
        if let Some((tx, _)) = workers.get(&stream_id) {
            if tx.send(record.into_frame()).is_err() {
                error!("❌ 视频源 {} 处理线程已退出", stream_id);
            }
        }
    }

    let mut stream_ids: Vec<usize> = workers.keys().copied().collect();
    stream_ids.sort_unstable();
    let mut all_events = Vec::new();
    let (mut total_frames, mut total_rows) = (0usize, 0usize);
    for stream_id in stream_ids {
        let Some((tx, handle)) = workers.remove(&stream_id) else {
            continue;
        };
        drop(tx);
        match handle.join() {
            Ok(summary) => {
                info!(
                    "📊 视频源 {}: {} 帧 | {} 行元数据 | {} 个编码失败 | {} 次拒绝",
                    stream_id, summary.frames, summary.rows, summary.failed_jobs, summary.rejected
                );
                total_frames += summary.frames;
                total_rows += summary.rows;
                all_events.extend(summary.events);
            }
            Err(_) => error!("❌ 视频源 {} 处理线程异常退出", stream_id),
        }
    }

    processor.shutdown();

    if let Some(path) = &args.events {
        let mut text = all_events.join("\n");
        text.push('\n');
        fs::write(path, text).with_context(|| format!("写入事件失败: {}", path.display()))?;
        info!("📨 {} 条事件消息已写入 {}", all_events.len(), path.display());
    }

    info!(
        "✅ 完成: {} 帧, {} 行元数据, 跳过 {} 行, 耗时 {:.2}s",
        total_frames,
        total_rows,
        skipped,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
