pub mod s3;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;

pub use s3::S3Store;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- list, stat 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 远程对象描述，由列举产生，只在一次同步内有效
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

/// 分页列举请求
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub prefix: String,
    pub page_size: usize,
    /// 上一页返回的续传令牌
    pub continuation_token: Option<String>,
}

/// 一页列举结果
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<RemoteObject>,
    pub next_token: Option<String>,
    pub is_truncated: bool,
}

/// 对象内容：按顺序到达的数据块 + 元数据头
pub struct ObjectBody {
    pub stream: BoxStream<'static, Result<Bytes>>,
    pub metadata: HashMap<String, String>,
}

impl std::fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBody")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// 对象存储抽象接口（只读）
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 列举一页对象
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage>;

    /// 获取对象内容和元数据
    async fn get_object(&self, key: &str) -> Result<ObjectBody>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;

    /// 存储桶名称
    fn bucket(&self) -> &str;
}

/// 根据配置创建存储实例
pub fn create_store(config: &crate::config::MirrorConfig) -> Result<Arc<dyn ObjectStore>> {
    tracing::info!(
        "初始化S3存储: bucket={}, region={}",
        config.bucket,
        config.region
    );
    Ok(Arc::new(S3Store::new(
        &config.bucket,
        &config.region,
        config.endpoint.as_deref(),
        config.access_key_id.as_deref(),
        config.secret_access_key.as_deref(),
    )?) as Arc<dyn ObjectStore>)
}
