use super::{
    ListPage, ListRequest, ObjectBody, ObjectStore, RemoteObject, IO_TIMEOUT_SECS,
    OP_TIMEOUT_SECS,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use opendal::{layers::TimeoutLayer, Metakey, Operator};
use std::collections::HashMap;
use std::time::Duration;

pub struct S3Store {
    operator: Operator,
    bucket: String,
    name: String,
}

impl S3Store {
    pub fn new(
        bucket: &str,
        region: &str,
        endpoint: Option<&str>,
        access_key: Option<&str>,
        secret_key: Option<&str>,
    ) -> Result<Self> {
        use opendal::services::S3;

        let mut builder = S3::default().bucket(bucket).region(region);

        if let Some(ep) = endpoint {
            builder = builder.endpoint(ep);
        }

        // 未显式配置密钥时使用 AWS 默认凭证链
        if let (Some(ak), Some(sk)) = (access_key, secret_key) {
            builder = builder.access_key_id(ak).secret_access_key(sk);
        }

        // 添加超时层
        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        Ok(Self {
            operator,
            bucket: bucket.to_string(),
            name: format!("s3://{}", bucket),
        })
    }

    /// 前缀所在的目录，opendal 只能从目录开始列举
    fn list_root(prefix: &str) -> &str {
        match prefix.rfind('/') {
            Some(idx) => &prefix[..=idx],
            None => "",
        }
    }

    /// 第一页的起点：去掉前缀最后一个字符，所有以前缀开头的 key 都严格大于它
    fn seek_key(prefix: &str) -> Option<&str> {
        let (last, _) = prefix.char_indices().last()?;
        Some(&prefix[..last]).filter(|seek| !seek.is_empty())
    }
}

/// key 相对于前缀区间的位置，S3 按字典序列举
#[derive(Debug, PartialEq, Eq)]
enum KeyPosition {
    Before,
    Inside,
    After,
}

fn key_position(key: &str, prefix: &str) -> KeyPosition {
    if key.starts_with(prefix) {
        KeyPosition::Inside
    } else if key < prefix {
        KeyPosition::Before
    } else {
        KeyPosition::After
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        let mut future = self
            .operator
            .lister_with(Self::list_root(&request.prefix))
            .recursive(true)
            .limit(request.page_size + 1)
            .metakey(Metakey::ContentLength | Metakey::LastModified | Metakey::Mode);

        // 续传令牌是上一页最后一个 key
        let start_after = request
            .continuation_token
            .as_deref()
            .or_else(|| Self::seek_key(&request.prefix));
        if let Some(start_after) = start_after {
            future = future.start_after(start_after);
        }

        let mut lister = future.await?;
        let mut objects = Vec::with_capacity(request.page_size.min(crate::config::MAX_PAGE_SIZE));
        let mut is_truncated = false;

        while let Some(entry) = lister.try_next().await? {
            let key = entry.path().trim_start_matches('/');

            match key_position(key, &request.prefix) {
                KeyPosition::Before => continue,
                KeyPosition::After => break,
                KeyPosition::Inside => {}
            }

            // 目录占位对象
            if key.is_empty() || key.ends_with('/') {
                continue;
            }

            if objects.len() == request.page_size {
                is_truncated = true;
                break;
            }

            let meta = entry.metadata();
            objects.push(RemoteObject {
                key: key.to_string(),
                size: meta.content_length(),
                last_modified: meta.last_modified().unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                metadata: HashMap::new(),
            });
        }

        let next_token = if is_truncated {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_token,
            is_truncated,
        })
    }

    async fn get_object(&self, key: &str) -> Result<ObjectBody> {
        // 用户元数据来自 x-amz-meta-* 响应头，opendal 只在 stat 中返回
        let meta = self.operator.stat(key).await?;
        let metadata = meta.user_metadata().cloned().unwrap_or_default();

        // 开启版本控制时读取 stat 看到的那个版本；否则两次请求之间对象可能被覆盖，
        // 由下载后的大小校验兜底
        let mut reader = self.operator.reader_with(key);
        if let Some(version) = meta.version() {
            reader = reader.version(version);
        }

        let stream = reader
            .await?
            .into_bytes_stream(..)
            .await?
            .map_err(anyhow::Error::from)
            .boxed();

        Ok(ObjectBody { stream, metadata })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
