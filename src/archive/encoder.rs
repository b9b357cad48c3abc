// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 异步JPEG编码 (整帧 / 目标裁剪)
//! 提交任务后立即返回句柄, 调用方在需要时等待全部完成。

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, GenericImageView, ImageBuffer, Rgb, RgbImage, Rgba};
use tracing::{debug, warn};

use crate::detection::{BoxRect, FrameSurface};
use crate::error::EncodeError;

/// 图像路径最大长度 (字节, 不含)
pub const MAX_IMAGE_PATH_LEN: usize = 1024;

#[derive(Clone, Debug)]
pub struct EncodeJob {
    pub destination: PathBuf,
    pub surface: FrameSurface,
    /// None = 整帧
    pub region: Option<BoxRect>,
    pub quality: u8,
}

/// 单个编码任务的结果
#[derive(Debug)]
pub struct EncodeOutcome {
    pub destination: PathBuf,
    pub result: Result<(), EncodeError>,
}

impl EncodeOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// 编码任务句柄
#[derive(Debug)]
pub struct EncodeHandle {
    destination: PathBuf,
    done: Receiver<Result<(), EncodeError>>,
}

impl EncodeHandle {
    /// 返回一对 (句柄, 完成通知发送端)
    pub fn pending(destination: PathBuf) -> (Self, Sender<Result<(), EncodeError>>) {
        let (tx, rx) = bounded(1);
        (
            Self {
                destination,
                done: rx,
            },
            tx,
        )
    }

    /// 已经完成的任务 (同步编码或提交前即失败)
    pub fn ready(destination: PathBuf, result: Result<(), EncodeError>) -> Self {
        let (handle, tx) = Self::pending(destination);
        let _ = tx.send(result);
        handle
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// 阻塞直到任务完成; 工作线程退出而未回复视为失败
    pub fn wait(self) -> EncodeOutcome {
        let result = self.done.recv().unwrap_or(Err(EncodeError::Disconnected));
        EncodeOutcome {
            destination: self.destination,
            result,
        }
    }
}

pub trait ImageEncoder: Send + Sync {
    fn submit(&self, job: EncodeJob) -> EncodeHandle;

    fn await_all(&self, handles: Vec<EncodeHandle>) -> Vec<EncodeOutcome> {
        handles.into_iter().map(EncodeHandle::wait).collect()
    }
}

fn check_path_len(path: &Path) -> Result<(), EncodeError> {
    let len = path.as_os_str().len();
    if len >= MAX_IMAGE_PATH_LEN {
        return Err(EncodeError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: MAX_IMAGE_PATH_LEN,
        });
    }
    Ok(())
}

fn to_rgb<V: GenericImageView<Pixel = Rgba<u8>>>(view: &V) -> RgbImage {
    let (w, h) = view.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        let p = view.get_pixel(x, y);
        Rgb([p[0], p[1], p[2]])
    })
}

/// 同步编码一个任务并写入文件
pub fn encode_to_file(job: &EncodeJob) -> Result<(), EncodeError> {
    check_path_len(&job.destination)?;

    let surface = &job.surface;
    let view = ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(
        surface.width,
        surface.height,
        &surface.rgba_data[..],
    )
    .ok_or(EncodeError::SurfaceMismatch {
        width: surface.width,
        height: surface.height,
    })?;

    let rgb = match job.region {
        Some(rect) => {
            let (x, y, w, h) = rect
                .clamp_to(surface.width, surface.height)
                .ok_or(EncodeError::EmptyRegion)?;
            to_rgb(&*imageops::crop_imm(&view, x, y, w, h))
        }
        None => to_rgb(&view),
    };

    if let Some(parent) = job.destination.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(&job.destination)?);
    JpegEncoder::new_with_quality(&mut writer, job.quality).encode_image(&rgb)?;
    // BufWriter 的 Drop 会吞掉写入错误
    writer.flush()?;
    Ok(())
}

type Task = (EncodeJob, Sender<Result<(), EncodeError>>);

/// 后台线程池编码器
pub struct ThreadedImageEncoder {
    tx: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadedImageEncoder {
    pub fn new(threads: usize) -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<Task>();
        let mut workers = Vec::with_capacity(threads.max(1));
        for i in 0..threads.max(1) {
            let rx = rx.clone();
            let worker = thread::Builder::new()
                .name(format!("jpeg-encoder-{}", i))
                .spawn(move || {
                    for (job, done) in rx.iter() {
                        let result = encode_to_file(&job);
                        match &result {
                            Ok(()) => debug!("🖼️  已保存 {}", job.destination.display()),
                            Err(e) => warn!("⚠️  图像保存失败 {}: {}", job.destination.display(), e),
                        }
                        let _ = done.send(result);
                    }
                })?;
            workers.push(worker);
        }
        Ok(Self {
            tx: Some(tx),
            workers,
        })
    }
}

impl ImageEncoder for ThreadedImageEncoder {
    fn submit(&self, job: EncodeJob) -> EncodeHandle {
        if let Err(e) = check_path_len(&job.destination) {
            warn!("⚠️  {}", e);
            return EncodeHandle::ready(job.destination, Err(e));
        }
        let (handle, done) = EncodeHandle::pending(job.destination.clone());
        // 发送失败时 done 被丢弃, 等待句柄得到 Disconnected
        if let Some(tx) = &self.tx {
            let _ = tx.send((job, done));
        }
        handle
    }
}

impl Drop for ThreadedImageEncoder {
    fn drop(&mut self) {
        self.tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
