//! 分页列举存储桶

use crate::error::SyncError;
use crate::storage::{ListRequest, ObjectStore, RemoteObject};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::debug;

/// 列举游标，只在一次同步内存在
#[derive(Debug, Default)]
struct Cursor {
    token: Option<String>,
    finished: bool,
    pages: usize,
}

/// 存储桶列举器
///
/// 每次调用 [`BucketLister::objects`] 都从头开始，按续传令牌依次拉取所有页，
/// 直到存储端报告不再截断。任何一页失败都会以 [`SyncError::Listing`] 结束序列。
pub struct BucketLister {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    page_size: usize,
}

impl BucketLister {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        prefix: impl Into<String>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            page_size: page_size.max(1),
        }
    }

    /// 惰性的对象序列，页内保持列举顺序
    pub fn objects(&self) -> BoxStream<'static, Result<RemoteObject, SyncError>> {
        self.pages()
            .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, SyncError>)))
            .try_flatten()
            .boxed()
    }

    fn pages(&self) -> BoxStream<'static, Result<Vec<RemoteObject>, SyncError>> {
        let store = self.store.clone();
        let prefix = self.prefix.clone();
        let page_size = self.page_size;

        stream::try_unfold(Cursor::default(), move |mut cursor| {
            let store = store.clone();
            let prefix = prefix.clone();
            async move {
                if cursor.finished {
                    return Ok(None);
                }

                let request = ListRequest {
                    prefix,
                    page_size,
                    continuation_token: cursor.token.take(),
                };
                let page = store
                    .list_page(&request)
                    .await
                    .map_err(|source| SyncError::Listing {
                        bucket: store.bucket().to_string(),
                        source,
                    })?;

                cursor.pages += 1;
                debug!(
                    "列举第 {} 页: {} 个对象, truncated={}",
                    cursor.pages,
                    page.objects.len(),
                    page.is_truncated
                );

                if page.is_truncated {
                    match page.next_token {
                        Some(token) => cursor.token = Some(token),
                        None => {
                            return Err(SyncError::Listing {
                                bucket: store.bucket().to_string(),
                                source: anyhow::anyhow!(
                                    "截断的列举结果缺少续传令牌 (第 {} 页)",
                                    cursor.pages
                                ),
                            })
                        }
                    }
                } else {
                    cursor.finished = true;
                }

                Ok(Some((page.objects, cursor)))
            }
        })
        .boxed()
    }
}
