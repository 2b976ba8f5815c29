//! 流水线配置 - 通过JSON文件调整参数

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// 流水线参数配置 (时间字段以毫秒存储)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // === 检测参数 ===
    pub target_class_id: u32,      // 目标类别 (COCO: 0=person)
    pub target_label: String,      // 叠加标签前缀
    pub confidence_threshold: f32, // 置信度阈值 [0,1]

    // === 线程节奏 ===
    #[serde(rename = "detection_wait_timeout_ms", with = "duration_ms")]
    pub detection_wait_timeout: Duration, // 检测线程等待新帧的超时 (取消检查点)
    #[serde(rename = "rate_report_interval_ms", with = "duration_ms")]
    pub rate_report_interval: Duration, // FPS统计窗口
    #[serde(rename = "idle_sleep_interval_ms", with = "duration_ms")]
    pub idle_sleep_interval: Duration, // 渲染循环无新结果时的让步
    #[serde(rename = "capture_retry_interval_ms", with = "duration_ms")]
    pub capture_retry_interval: Duration, // 读帧失败后的退避
    pub max_consecutive_failures: Option<u32>, // 连续失败多少次记为降级, None=不报告

    // === 关闭 ===
    #[serde(rename = "join_timeout_ms", with = "duration_ms")]
    pub join_timeout: Duration, // 等待后台线程退出的上限

    // === 叠加绘制 ===
    pub font_path: Option<PathBuf>, // 标签字体 (TTF/OTF), 为空时只画框
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_class_id: 0,
            target_label: "Person".to_string(),
            confidence_threshold: 0.5,

            detection_wait_timeout: Duration::from_secs(1),
            rate_report_interval: Duration::from_secs(2),
            idle_sleep_interval: Duration::from_millis(1),
            capture_retry_interval: Duration::from_millis(1),
            max_consecutive_failures: Some(100),

            join_timeout: Duration::from_secs(1),

            font_path: None,
        }
    }
}

impl PipelineConfig {
    /// 从JSON文件加载配置。文件不存在时写入默认配置, 解析失败时使用默认值。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    log::info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    log::error!("❌ 保存配置失败: {:#}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, json).with_context(|| format!("写入 {} 失败", path.display()))?;
        log::info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            bail!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            );
        }
        for (name, value) in [
            ("detection_wait_timeout", self.detection_wait_timeout),
            ("rate_report_interval", self.rate_report_interval),
            ("join_timeout", self.join_timeout),
        ] {
            if value.is_zero() {
                bail!("{} must be greater than zero", name);
            }
        }
        if self.max_consecutive_failures == Some(0) {
            bail!("max_consecutive_failures must be at least 1");
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        log::info!(
            "🎛️  目标类别: {} ({}) | 置信度: {:.2} | 检测等待: {:?} | 统计窗口: {:?}",
            self.target_class_id,
            self.target_label,
            self.confidence_threshold,
            self.detection_wait_timeout,
            self.rate_report_interval
        );
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.target_class_id, 0);
        assert_eq!(config.rate_report_interval, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.detection_wait_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.max_consecutive_failures = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations_are_milliseconds_in_json() {
        let json = serde_json::to_value(PipelineConfig::default()).unwrap();
        assert_eq!(json["detection_wait_timeout_ms"], 1000);
        assert_eq!(json["idle_sleep_interval_ms"], 1);

        let partial: PipelineConfig =
            serde_json::from_str(r#"{"target_class_id": 2, "join_timeout_ms": 250}"#).unwrap();
        assert_eq!(partial.target_class_id, 2);
        assert_eq!(partial.join_timeout, Duration::from_millis(250));
        assert_eq!(partial.confidence_threshold, 0.5);
    }

    #[test]
    fn test_load_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let config = PipelineConfig::load(&path);
        assert_eq!(config, PipelineConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_load_roundtrip_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");

        let mut config = PipelineConfig::default();
        config.confidence_threshold = 0.3;
        config.font_path = Some(PathBuf::from("assets/font/DejaVuSans.ttf"));
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path), config);

        fs::write(&path, "not json").unwrap();
        assert_eq!(PipelineConfig::load(&path), PipelineConfig::default());
    }
}
