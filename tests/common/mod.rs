//! 测试用的内存对象存储

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use bucket_mirror_lib::storage::{ListPage, ListRequest, ObjectBody, ObjectStore, RemoteObject};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Clone)]
struct StoredObject {
    body: Bytes,
    last_modified: DateTime<Utc>,
    metadata: HashMap<String, String>,
}

/// 按 key 字典序分页的内存存储，记录 list/get 调用次数
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failing_keys: Mutex<HashSet<String>>,
    /// 第 N 次（从 1 开始）list 调用失败
    fail_list_call: Mutex<Option<usize>>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    get_keys: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, body: impl Into<Bytes>) {
        self.put_with(key, body, Utc::now(), &[]);
    }

    pub fn put_with(
        &self,
        key: &str,
        body: impl Into<Bytes>,
        last_modified: DateTime<Utc>,
        metadata: &[(&str, &str)],
    ) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body: body.into(),
                last_modified,
                metadata: metadata
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
    }

    pub fn fail_get(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_list_on_call(&self, call: usize) {
        *self.fail_list_call.lock().unwrap() = Some(call);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn fetched_keys(&self) -> Vec<String> {
        self.get_keys.lock().unwrap().clone()
    }

    pub fn reset_counters(&self) {
        self.list_calls.store(0, Ordering::SeqCst);
        self.get_calls.store(0, Ordering::SeqCst);
        self.get_keys.lock().unwrap().clear();
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_list_call.lock().unwrap() == Some(call) {
            anyhow::bail!("AccessDenied on list call {}", call);
        }

        let objects = self.objects.lock().unwrap();
        let mut remaining = objects
            .iter()
            .filter(|(key, _)| key.starts_with(&request.prefix))
            .filter(|(key, _)| match &request.continuation_token {
                Some(token) => key.as_str() > token.as_str(),
                None => true,
            });

        let page: Vec<RemoteObject> = remaining
            .by_ref()
            .take(request.page_size)
            .map(|(key, obj)| RemoteObject {
                key: key.clone(),
                size: obj.body.len() as u64,
                last_modified: obj.last_modified,
                metadata: HashMap::new(),
            })
            .collect();
        let is_truncated = remaining.next().is_some();

        Ok(ListPage {
            next_token: if is_truncated {
                page.last().map(|o| o.key.clone())
            } else {
                None
            },
            objects: page,
            is_truncated,
        })
    }

    async fn get_object(&self, key: &str) -> Result<ObjectBody> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.get_keys.lock().unwrap().push(key.to_string());

        if self.failing_keys.lock().unwrap().contains(key) {
            anyhow::bail!("NoSuchKey: {}", key);
        }

        let object = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("NoSuchKey: {}", key))?;

        // 拆成小块，模拟分块到达
        let chunks: Vec<Result<Bytes>> = object
            .body
            .chunks(4)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        Ok(ObjectBody {
            stream: futures::stream::iter(chunks).boxed(),
            metadata: object.metadata,
        })
    }

    fn name(&self) -> &str {
        "memory://test"
    }

    fn bucket(&self) -> &str {
        "test"
    }
}
