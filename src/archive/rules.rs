// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 按时段跳帧规则 (capture time rules)
//!
//! CSV 每行一条规则: `开始时间,结束时间,间隔秒数`, 时间格式 `HH:MM` 或 `HH:MM:SS`。
//! 空行和 `#` 开头的行忽略。窗口为 `[开始, 结束)`, 允许跨越午夜;
//! 开始等于结束表示全天。没有匹配的规则时使用默认间隔。
//!
//! ```text
//! # begin,end,seconds
//! 00:00,07:00,1800
//! 07:00,19:00,600
//! ```

use std::fs;
use std::path::Path;

use chrono::{Duration, NaiveTime};

use crate::error::ArchiveError;

#[derive(Clone, Debug, PartialEq)]
pub struct CaptureTimeRule {
    pub begin: NaiveTime,
    pub end: NaiveTime,
    pub interval_secs: i64,
}

impl CaptureTimeRule {
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.begin == self.end {
            true
        } else if self.begin < self.end {
            self.begin <= t && t < self.end
        } else {
            t >= self.begin || t < self.end
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaptureTimeRules {
    rules: Vec<CaptureTimeRule>,
    default_interval_secs: i64,
}

fn parse_time(field: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(field, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(field, "%H:%M"))
        .ok()
}

impl CaptureTimeRules {
    /// 没有时段规则, 始终使用默认间隔
    pub fn new(default_interval_secs: i64) -> Self {
        Self {
            rules: Vec::new(),
            default_interval_secs,
        }
    }

    pub fn parse(text: &str, default_interval_secs: i64) -> Result<Self, ArchiveError> {
        let mut rules = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let invalid = |reason: &str| ArchiveError::InvalidRules {
                line: idx + 1,
                reason: reason.to_string(),
            };

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 3 {
                return Err(invalid("expected `begin,end,seconds`"));
            }
            let begin = parse_time(fields[0]).ok_or_else(|| invalid("bad begin time"))?;
            let end = parse_time(fields[1]).ok_or_else(|| invalid("bad end time"))?;
            let interval_secs: i64 = fields[2]
                .parse()
                .map_err(|_| invalid("interval is not an integer"))?;
            if interval_secs <= 0 {
                return Err(invalid("interval must be positive"));
            }
            rules.push(CaptureTimeRule {
                begin,
                end,
                interval_secs,
            });
        }
        Ok(Self {
            rules,
            default_interval_secs,
        })
    }

    pub fn load(path: &Path, default_interval_secs: i64) -> Result<Self, ArchiveError> {
        if !path.is_file() {
            return Err(ArchiveError::MissingRulesFile(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        Self::parse(&text, default_interval_secs)
    }

    /// 给定时刻生效的跳帧间隔 (第一条匹配规则, 否则默认值)
    pub fn interval_at(&self, t: NaiveTime) -> Duration {
        let secs = self
            .rules
            .iter()
            .find(|r| r.contains(t))
            .map_or(self.default_interval_secs, |r| r.interval_secs);
        Duration::seconds(secs)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_and_match() {
        let text = "# begin,end,seconds\n\n00:00,07:00,1800\n07:00:00, 19:00:00 ,60\n";
        let rules = CaptureTimeRules::parse(text, 600).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.interval_at(t(3, 0)), Duration::seconds(1800));
        assert_eq!(rules.interval_at(t(7, 0)), Duration::seconds(60));
        // 没有规则覆盖的时段
        assert_eq!(rules.interval_at(t(20, 0)), Duration::seconds(600));
    }

    #[test]
    fn test_window_wraps_midnight() {
        let rules = CaptureTimeRules::parse("22:00,02:00,5", 600).unwrap();
        assert_eq!(rules.interval_at(t(23, 30)), Duration::seconds(5));
        assert_eq!(rules.interval_at(t(1, 59)), Duration::seconds(5));
        assert_eq!(rules.interval_at(t(2, 0)), Duration::seconds(600));
    }

    #[test]
    fn test_invalid_lines() {
        let err = CaptureTimeRules::parse("00:00,07:00\n", 600).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidRules { line: 1, .. }));

        let err = CaptureTimeRules::parse("# ok\n00:00,25:00,3\n", 600).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidRules { line: 2, .. }));

        let err = CaptureTimeRules::parse("00:00,01:00,-3\n", 600).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidRules { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CaptureTimeRules::load(&dir.path().join("nope.csv"), 600).unwrap_err();
        assert!(matches!(err, ArchiveError::MissingRulesFile(_)));
    }

    #[test]
    fn test_empty_rules_use_default() {
        let rules = CaptureTimeRules::new(42);
        assert!(rules.is_empty());
        assert_eq!(rules.interval_at(t(12, 0)), Duration::seconds(42));
    }
}
