// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 待归档目标 + 元数据CSV
//!
//! 每路视频一个 `metadata.csv`, 表头只写一次:
//! `stream_id,frame_number,object_id,class_label,confidence,top,left,width,height,timestamp,source_uri,full_frame_path,cropped_object_path`

use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::detection::{BoxRect, DetectedObject, FrameMeta};

pub const METADATA_FILE_NAME: &str = "metadata.csv";

pub const METADATA_HEADER: &str = "stream_id,frame_number,object_id,class_label,confidence,top,left,width,height,timestamp,source_uri,full_frame_path,cropped_object_path";

/// 一个通过准入检查的目标, 等待提交
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateArtifact {
    pub stream_id: usize,
    pub frame_number: i64,
    pub object_id: u64,
    pub class_label: String,
    pub confidence: f32,
    pub rect: BoxRect,
    pub timestamp: String,
    pub source_uri: String,
    pub full_frame_path: Option<PathBuf>,
    pub cropped_object_path: Option<PathBuf>,
}

impl CandidateArtifact {
    /// 路径在暂存时由生产者填写
    pub fn from_object(frame: &FrameMeta, obj: &DetectedObject, timestamp: &str) -> Self {
        Self {
            stream_id: frame.stream_id,
            frame_number: frame.frame_number,
            object_id: obj.object_id,
            class_label: obj.class_label.clone(),
            confidence: obj.confidence,
            rect: obj.rect,
            timestamp: timestamp.to_string(),
            source_uri: frame.source_uri.clone(),
            full_frame_path: None,
            cropped_object_path: None,
        }
    }

    pub fn to_csv_row(&self) -> String {
        let path_field = |p: &Option<PathBuf>| {
            p.as_deref()
                .map(|p| csv_field(&p.to_string_lossy()).into_owned())
                .unwrap_or_default()
        };
        format!(
            "{},{},{},{},{:.4},{:.1},{:.1},{:.1},{:.1},{},{},{},{}",
            self.stream_id,
            self.frame_number,
            self.object_id,
            csv_field(&self.class_label),
            self.confidence,
            self.rect.top,
            self.rect.left,
            self.rect.width,
            self.rect.height,
            csv_field(&self.timestamp),
            csv_field(&self.source_uri),
            path_field(&self.full_frame_path),
            path_field(&self.cropped_object_path),
        )
    }
}

/// 含 `,` `"` 或换行的字段加引号, 内部引号双写
pub fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// 追加写入的元数据文件
#[derive(Debug)]
pub struct MetadataWriter {
    out: BufWriter<File>,
}

impl MetadataWriter {
    /// 打开 (或创建) 文件; 文件为空时先写表头
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_new = file.metadata()?.len() == 0;
        let mut out = BufWriter::new(file);
        if is_new {
            writeln!(out, "{}", METADATA_HEADER)?;
        }
        Ok(Self { out })
    }

    pub fn append(&mut self, artifact: &CandidateArtifact) -> io::Result<()> {
        writeln!(self.out, "{}", artifact.to_csv_row())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> CandidateArtifact {
        CandidateArtifact {
            stream_id: 1,
            frame_number: 120,
            object_id: 42,
            class_label: "person".into(),
            confidence: 0.95,
            rect: BoxRect::new(10.0, 20.0, 30.0, 40.0),
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            source_uri: "rtsp://cam/a,b".into(),
            full_frame_path: Some(PathBuf::from("out/camera-1/full_frame/x.jpg")),
            cropped_object_path: None,
        }
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_row_matches_header_columns() {
        let row = artifact().to_csv_row();
        assert_eq!(
            row,
            "1,120,42,person,0.9500,10.0,20.0,30.0,40.0,2024-01-01T00:00:00.000Z,\"rtsp://cam/a,b\",out/camera-1/full_frame/x.jpg,"
        );
        assert_eq!(METADATA_HEADER.split(',').count(), 13);
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera-1").join(METADATA_FILE_NAME);

        let mut writer = MetadataWriter::open(&path).unwrap();
        writer.append(&artifact()).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let mut writer = MetadataWriter::open(&path).unwrap();
        writer.append(&artifact()).unwrap();
        writer.flush().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], METADATA_HEADER);
        assert_eq!(text.matches("stream_id,").count(), 1);
    }
}
