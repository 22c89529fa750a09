//! 应用配置模块
//!
//! 配置在启动时加载一次：先读取配置目录下的 `config.json`（`mirror` 节点），
//! 再用环境变量覆盖，之后显式传递给各个组件。

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 单页最多列举的对象数（S3 ListObjectsV2 上限）
pub const MAX_PAGE_SIZE: usize = 1000;

/// 调度方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ScheduleMode {
    /// 上一次同步结束后再等待一个间隔
    #[default]
    AfterPass,
    /// 固定频率触发，不受单次同步耗时影响
    FixedRate,
}

/// 列举失败时的处理策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ListingFailurePolicy {
    /// 记录错误，下一个周期重试
    #[default]
    RetryNextTick,
    /// 以非零状态退出进程
    Exit,
}

/// 镜像配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    #[serde(default)]
    pub bucket: String,
    /// 只同步此前缀下的对象
    #[serde(default)]
    pub prefix: String,
    /// 本地目标根目录
    #[serde(default)]
    pub destination: PathBuf,
    #[serde(default = "default_region")]
    pub region: String,
    /// S3 兼容服务的地址
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// 早于该天数的对象不再同步，None 表示不过滤
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
    /// 运行超过该秒数后主动退出
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runtime_secs: Option<u64>,
    #[serde(default = "default_decode_metadata_headers")]
    pub decode_metadata_headers: bool,
    #[serde(default)]
    pub schedule_mode: ScheduleMode,
    #[serde(default)]
    pub listing_failure_policy: ListingFailurePolicy,
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_sync_interval_secs() -> u64 {
    300 // 5 分钟
}

fn default_decode_metadata_headers() -> bool {
    true
}

fn default_max_concurrent_downloads() -> usize {
    1
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: String::new(),
            destination: PathBuf::new(),
            region: default_region(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            page_size: default_page_size(),
            sync_interval_secs: default_sync_interval_secs(),
            retention_days: None,
            max_runtime_secs: None,
            decode_metadata_headers: default_decode_metadata_headers(),
            schedule_mode: ScheduleMode::default(),
            listing_failure_policy: ListingFailurePolicy::default(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
        }
    }
}

impl MirrorConfig {
    /// 从配置目录加载，并应用进程环境变量覆盖
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(config_dir)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// 读取 `config.json` 中的 `mirror` 节点，文件不存在时使用默认值
    pub fn from_file(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_file = config_dir.join("config.json");
        if !config_file.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_file)?;
        let root: serde_json::Value = serde_json::from_str(&content)?;
        match root.get("mirror") {
            Some(mirror) => Ok(serde_json::from_value(mirror.clone())?),
            None => Ok(Self::default()),
        }
    }

    /// 用环境变量覆盖配置项
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("BUCKET") {
            self.bucket = v;
        }
        if let Some(v) = get("MAIN_FOLDER") {
            self.prefix = v;
        }
        if let Some(v) = get("SAVE_PATH") {
            self.destination = PathBuf::from(v);
        }
        if let Some(v) = get("AWS_REGION") {
            self.region = v;
        }
        if let Some(v) = get("S3_ENDPOINT") {
            self.endpoint = Some(v);
        }
        if let Some(v) = get("AWS_ACCESS_KEY_ID") {
            self.access_key_id = Some(v);
        }
        if let Some(v) = get("AWS_SECRET_ACCESS_KEY") {
            self.secret_access_key = Some(v);
        }
        if let Some(v) = get("PAGE_SIZE") {
            self.page_size = parse_env("PAGE_SIZE", &v)?;
        }
        if let Some(v) = get("SYNC_INTERVAL_SECS") {
            self.sync_interval_secs = parse_env("SYNC_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("RETENTION_DAYS") {
            self.retention_days = Some(parse_env("RETENTION_DAYS", &v)?);
        }
        if let Some(v) = get("MAX_RUNTIME_SECS") {
            self.max_runtime_secs = Some(parse_env("MAX_RUNTIME_SECS", &v)?);
        }
        if let Some(v) = get("DECODE_METADATA_HEADERS") {
            self.decode_metadata_headers = parse_env("DECODE_METADATA_HEADERS", &v)?;
        }

        Ok(())
    }

    /// 校验必填项并修正页大小
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::Missing("bucket"));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(ConfigError::Missing("destination"));
        }
        if self.sync_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "syncIntervalSecs",
                value: "0".to_string(),
            });
        }
        if self.max_concurrent_downloads == 0 {
            return Err(ConfigError::Invalid {
                key: "maxConcurrentDownloads",
                value: "0".to_string(),
            });
        }
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn max_runtime(&self) -> Option<Duration> {
        self.max_runtime_secs.map(Duration::from_secs)
    }

    /// 单次同步使用的参数
    pub fn pass_options(&self) -> PassOptions {
        PassOptions {
            prefix: self.prefix.clone(),
            page_size: self.page_size,
            retention: self
                .retention_days
                .map(|days| chrono::Duration::days(i64::from(days))),
            decode_metadata_headers: self.decode_metadata_headers,
            max_concurrent: self.max_concurrent_downloads,
        }
    }
}

/// 同步流水线参数
#[derive(Debug, Clone)]
pub struct PassOptions {
    pub prefix: String,
    pub page_size: usize,
    pub retention: Option<chrono::Duration>,
    pub decode_metadata_headers: bool,
    pub max_concurrent: usize,
}

impl Default for PassOptions {
    fn default() -> Self {
        MirrorConfig::default().pass_options()
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
