// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 归档配置 - 通过JSON文件调整参数

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::MAX_SOURCE_BINS;
use crate::error::ArchiveError;

/// 默认跳帧间隔 (秒)
pub const DEFAULT_SECONDS_TO_SKIP_INTERVAL: i64 = 600;

/// ReID嵌入设置
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReidSettings {
    /// 使用跟踪器ReID特征 (否则使用二级分类器输出)
    pub use_tracker_reid: bool,
    /// 历史嵌入保留帧数, 0 表示关闭缓存
    pub store_age: u32,
}

impl ReidSettings {
    /// 实际生效的保留窗口: 只有跟踪器特征会进入缓存
    pub fn retention_window(&self) -> u32 {
        if self.use_tracker_reid {
            self.store_age
        } else {
            0
        }
    }
}

/// 图像与元数据归档参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    // === 输出 ===
    pub gpu_id: u32,
    /// 输出根目录
    pub output_root: PathBuf,
    /// 按时段跳帧规则 (CSV)
    pub skip_rules_path: PathBuf,
    pub save_full_frame: bool,
    /// 保存目标裁剪图
    pub save_cropped_object: bool,

    // === 准入规则 (均不含边界) ===
    pub min_confidence: f32,
    pub max_confidence: f32,
    pub min_box_width: u32,
    pub min_box_height: u32,
    /// 同一路视频两次保存的最小间隔 (秒)
    pub seconds_to_skip_interval: i64,

    // === 运行 ===
    pub source_count: usize,
    pub jpeg_quality: u8,
    pub encoder_threads: usize,
    pub message_rate: u32, // 每N帧生成一次事件消息

    pub reid: ReidSettings,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            gpu_id: 0,
            output_root: PathBuf::from("./output"),
            skip_rules_path: PathBuf::from("capture_time_rules.csv"),
            save_full_frame: true,
            save_cropped_object: false,

            min_confidence: 0.9,
            max_confidence: 1.0,
            min_box_width: 5,
            min_box_height: 5,
            seconds_to_skip_interval: DEFAULT_SECONDS_TO_SKIP_INTERVAL,

            source_count: MAX_SOURCE_BINS,
            jpeg_quality: 80,
            encoder_threads: 2,
            message_rate: 30,

            reid: ReidSettings::default(),
        }
    }
}

impl ArchiveConfig {
    /// 从JSON文件加载配置; 文件不存在时写出默认配置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("📝 配置文件不存在,创建默认配置: {}", path.display());
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }
        let json = fs::read_to_string(path)
            .with_context(|| format!("读取配置失败: {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("配置文件解析失败: {}", path.display()))?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, json).with_context(|| format!("保存配置失败: {}", path.display()))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 检查配置是否可以启动归档
    pub fn validate(&self) -> std::result::Result<(), ArchiveError> {
        if self.output_root.as_os_str().is_empty() {
            return Err(ArchiveError::InvalidOutputRoot(self.output_root.clone()));
        }
        if self.skip_rules_path.as_os_str().is_empty() {
            return Err(ArchiveError::MissingRulesFile(self.skip_rules_path.clone()));
        }
        if self.seconds_to_skip_interval <= 0 {
            return Err(ArchiveError::NonPositiveInterval);
        }
        if self.source_count == 0 {
            return Err(ArchiveError::Config("source_count must be positive".into()));
        }
        if self.source_count > MAX_SOURCE_BINS {
            return Err(ArchiveError::Config(format!(
                "source_count ({}) exceeds {}",
                self.source_count, MAX_SOURCE_BINS
            )));
        }
        // NaN 边界也拒绝
        if self.min_confidence.partial_cmp(&self.max_confidence) != Some(Ordering::Less) {
            return Err(ArchiveError::Config(format!(
                "min_confidence ({}) must be below max_confidence ({})",
                self.min_confidence, self.max_confidence
            )));
        }
        Ok(())
    }

    /// 非正跳帧间隔重置为默认值 (启动程序时使用)
    pub fn normalize_interval(&mut self) {
        if self.seconds_to_skip_interval <= 0 {
            warn!(
                "⚠️  seconds_to_skip_interval 应为正整数 ({}), 使用默认值 {}",
                self.seconds_to_skip_interval, DEFAULT_SECONDS_TO_SKIP_INTERVAL
            );
            self.seconds_to_skip_interval = DEFAULT_SECONDS_TO_SKIP_INTERVAL;
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前归档配置:");
        info!("  输出目录: {}", self.output_root.display());
        info!("  跳帧规则: {}", self.skip_rules_path.display());
        info!(
            "  置信度区间: ({:.2}, {:.2}) | 最小框: {}x{}",
            self.min_confidence, self.max_confidence, self.min_box_width, self.min_box_height
        );
        info!(
            "  保存整帧: {} | 保存裁剪: {} | 跳帧间隔: {}s",
            self.save_full_frame, self.save_cropped_object, self.seconds_to_skip_interval
        );
        info!(
            "  ReID: tracker={} store_age={} | 消息频率: 每{}帧",
            self.reid.use_tracker_reid, self.reid.store_age, self.message_rate
        );
    }
}
