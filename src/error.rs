//! 同步错误分类
//!
//! 只有列举失败会越过单次同步的边界，其余错误都按对象隔离并记录日志。

use std::path::PathBuf;
use thiserror::Error;

/// 同步过程中的错误
#[derive(Debug, Error)]
pub enum SyncError {
    /// 列举存储桶失败（致命，终止整次同步）
    #[error("列举存储桶 {bucket} 失败: {source}")]
    Listing {
        bucket: String,
        #[source]
        source: anyhow::Error,
    },

    /// 读取本地文件状态失败（NotFound 以外的错误）
    #[error("无法读取本地文件状态 {path:?}: {source}")]
    LocalStat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 下载对象失败
    #[error("下载对象 {key} 失败: {source}")]
    Retrieval {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// 写入本地文件失败
    #[error("写入文件 {path:?} 失败: {reason}")]
    Write { path: PathBuf, reason: String },

    /// 元数据头解码失败，调用方回退到原始值
    #[error("无法解码元数据头 {value:?}: {reason}")]
    MetadataDecode { value: String, reason: String },

    /// 创建目标目录失败，跳过该对象的下载
    #[error("无法创建目录 {path:?}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("同步已取消")]
    Cancelled,
}

impl SyncError {
    /// 是否需要终止整次同步
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Listing { .. })
    }

    pub(crate) fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SyncError::Write {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("缺少必填配置项: {0}")]
    Missing(&'static str),

    #[error("配置项 {key} 的值无效: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("解析配置文件失败: {0}")]
    Parse(#[from] serde_json::Error),
}
