// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 时间戳工具
//! RFC3339 timestamps and per-stream frame clocks

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tracing::warn;

/// URI中的UTC时间 (例如 `rtsp://cam/2023-06-01T08:30:00.250Z.mp4`)
static URI_UTC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z").expect("valid regex")
});

/// `2023-06-01T08:30:00.250Z`
pub fn rfc3339_millis(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// 可用作文件名的时间戳 (去掉 `:`)
pub fn path_safe(timestamp: &str) -> String {
    timestamp
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' => '-',
            c => c,
        })
        .collect()
}

/// 从源URI中提取UTC时间
pub fn extract_utc_from_uri(uri: &str) -> Option<DateTime<Utc>> {
    let m = URI_UTC.find(uri)?;
    DateTime::parse_from_rfc3339(m.as_str())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[derive(Clone, Copy, Debug)]
struct Anchor {
    utc: DateTime<Utc>,
    first_pts: u64,
    last_pts: u64,
}

/// 每路视频的帧时钟
///
/// 第一帧以URI中的UTC时间 (没有则用当前时间) 为锚点,
/// 之后的帧时间 = 锚点 + (pts - 第一帧pts)。
pub struct StreamClock {
    anchors: Vec<Mutex<Option<Anchor>>>,
}

impl StreamClock {
    pub fn new(source_count: usize) -> Self {
        Self {
            anchors: (0..source_count).map(|_| Mutex::new(None)).collect(),
        }
    }

    pub fn frame_time(
        &self,
        stream_id: usize,
        source_uri: &str,
        pts_ns: u64,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let Some(slot) = self.anchors.get(stream_id) else {
            return now;
        };
        let mut slot = slot.lock();
        match slot.as_mut() {
            None => {
                let utc = extract_utc_from_uri(source_uri).unwrap_or(now);
                *slot = Some(Anchor {
                    utc,
                    first_pts: pts_ns,
                    last_pts: pts_ns,
                });
                utc
            }
            Some(anchor) => {
                if pts_ns < anchor.last_pts {
                    warn!(
                        "⚠️  视频源 {}: 时间戳回退 (当前 {} < 上一帧 {})",
                        stream_id, pts_ns, anchor.last_pts
                    );
                }
                anchor.last_pts = pts_ns;
                let elapsed = pts_ns.saturating_sub(anchor.first_pts);
                anchor.utc + Duration::nanoseconds(elapsed.min(i64::MAX as u64) as i64)
            }
        }
    }
}
