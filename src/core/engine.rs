use crate::config::PassOptions;
use crate::core::comparator::{FileComparator, SyncDecision};
use crate::core::lister::BucketLister;
use crate::core::sanitize;
use crate::core::sidecar::SidecarWriter;
use crate::core::staleness::StalenessFilter;
use crate::core::transfer::{sweep_partial_files, Downloader};
use crate::error::SyncError;
use crate::storage::{ObjectStore, RemoteObject};
use chrono::{DateTime, Utc};
use futures::{future, TryStreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 单次同步报告
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub objects_listed: u64,
    pub objects_filtered: u64,
    pub files_skipped: u64,
    pub files_fetched: u64,
    pub files_replaced: u64,
    pub files_failed: u64,
    pub bytes_transferred: u64,
    pub sidecars_written: u64,
    pub partials_removed: u64,
    pub duration: Duration,
    pub errors: Vec<String>,
}

impl SyncReport {
    /// 本次实际发起下载的对象数
    pub fn downloads(&self) -> u64 {
        self.files_fetched + self.files_replaced
    }
}

/// 传输统计
#[derive(Debug, Default)]
struct PassStats {
    listed: AtomicU64,
    filtered: AtomicU64,
    skipped: AtomicU64,
    fetched: AtomicU64,
    replaced: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
    sidecars: AtomicU64,
}

/// 按路径的互斥锁，保证同一路径同时只有一个写入者
#[derive(Default)]
struct PathLocks {
    inner: std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(path.to_path_buf()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// 一次同步期间的全部状态，同步结束即释放
struct PassState {
    started: DateTime<Utc>,
    stats: PassStats,
    locks: PathLocks,
    errors: Mutex<Vec<String>>,
}

/// 单个对象的处理结果
enum Outcome {
    Skipped,
    Downloaded {
        replaced: bool,
        bytes: u64,
        sidecar_written: bool,
    },
}

/// 同步引擎：列举 → 过期过滤 → 比较 → 下载 / 写旁路文件
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    destination: PathBuf,
    options: PassOptions,
    staleness: StalenessFilter,
    comparator: FileComparator,
    downloader: Downloader,
    sidecars: SidecarWriter,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        destination: impl Into<PathBuf>,
        options: PassOptions,
    ) -> Self {
        Self {
            staleness: StalenessFilter::new(options.retention),
            sidecars: SidecarWriter::new(options.decode_metadata_headers),
            comparator: FileComparator,
            downloader: Downloader,
            store,
            destination: destination.into(),
            options,
        }
    }

    /// 执行一次完整同步
    ///
    /// 单个对象的失败只记录在报告里；列举失败会终止整次同步并返回错误。
    /// 取消信号在对象之间检查，正在写入的对象会先完成。
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<SyncReport, SyncError> {
        let timer = Instant::now();
        info!(
            "开始同步: {} -> {:?} (prefix={:?})",
            self.store.name(),
            self.destination,
            self.options.prefix
        );

        let partials_removed = sweep_partial_files(&self.destination).await as u64;
        if partials_removed > 0 {
            info!("清理了 {} 个遗留的临时文件", partials_removed);
        }

        let state = PassState {
            started: Utc::now(),
            stats: PassStats::default(),
            locks: PathLocks::default(),
            errors: Mutex::new(Vec::new()),
        };

        let lister = BucketLister::new(
            self.store.clone(),
            self.options.prefix.clone(),
            self.options.page_size,
        );

        lister
            .objects()
            .try_take_while(|_| future::ready(Ok(!cancel.is_cancelled())))
            .try_for_each_concurrent(self.options.max_concurrent.max(1), |object| {
                let state = &state;
                async move {
                    self.sync_object(object, state).await;
                    Ok(())
                }
            })
            .await?;

        if cancel.is_cancelled() {
            info!("同步已取消");
            return Err(SyncError::Cancelled);
        }

        let stats = &state.stats;
        let report = SyncReport {
            objects_listed: stats.listed.load(Ordering::Relaxed),
            objects_filtered: stats.filtered.load(Ordering::Relaxed),
            files_skipped: stats.skipped.load(Ordering::Relaxed),
            files_fetched: stats.fetched.load(Ordering::Relaxed),
            files_replaced: stats.replaced.load(Ordering::Relaxed),
            files_failed: stats.failed.load(Ordering::Relaxed),
            bytes_transferred: stats.bytes.load(Ordering::Relaxed),
            sidecars_written: stats.sidecars.load(Ordering::Relaxed),
            partials_removed,
            duration: timer.elapsed(),
            errors: state.errors.into_inner(),
        };

        info!(
            "同步完成: 列举 {}, 过滤 {}, 跳过 {}, 下载 {}, 替换 {}, 失败 {}, {} 字节, 耗时 {:?}",
            report.objects_listed,
            report.objects_filtered,
            report.files_skipped,
            report.files_fetched,
            report.files_replaced,
            report.files_failed,
            report.bytes_transferred,
            report.duration
        );

        Ok(report)
    }

    /// 处理单个对象，错误不会向外传播
    async fn sync_object(&self, object: RemoteObject, state: &PassState) {
        let stats = &state.stats;
        stats.listed.fetch_add(1, Ordering::Relaxed);

        if !self.staleness.keep_at(&object, state.started) {
            debug!("对象过旧，跳过: {} ({})", object.key, object.last_modified);
            stats.filtered.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let relative = sanitize::relative_path(&object.key);
        if object.key.ends_with('/') || relative.as_os_str().is_empty() {
            debug!("不是文件对象，跳过: {:?}", object.key);
            stats.filtered.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let target = self.destination.join(&relative);
        let _guard = state.locks.lock(&target).await;

        match self.apply(&object, &target).await {
            Ok(Outcome::Skipped) => {
                stats.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Outcome::Downloaded {
                replaced,
                bytes,
                sidecar_written,
            }) => {
                if replaced {
                    stats.replaced.fetch_add(1, Ordering::Relaxed);
                } else {
                    stats.fetched.fetch_add(1, Ordering::Relaxed);
                }
                stats.bytes.fetch_add(bytes, Ordering::Relaxed);
                if sidecar_written {
                    stats.sidecars.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                warn!("同步对象失败，下次同步重试: {}", e);
                stats.failed.fetch_add(1, Ordering::Relaxed);
                state.errors.lock().await.push(e.to_string());
            }
        }
    }

    async fn apply(&self, object: &RemoteObject, target: &Path) -> Result<Outcome, SyncError> {
        let decision = self.comparator.evaluate(target, object).await?;

        match decision {
            SyncDecision::Skip => {
                debug!("文件未变化，跳过: {:?}", target);
                return Ok(Outcome::Skipped);
            }
            SyncDecision::Replace => {
                info!("文件大小不一致，删除后重新下载: {:?}", target);
                tokio::fs::remove_file(target)
                    .await
                    .map_err(|e| SyncError::write(target, e))?;
            }
            SyncDecision::Fetch => {
                debug!("本地文件不存在: {:?}", target);
            }
        }

        let downloaded = self
            .downloader
            .download(self.store.as_ref(), &object.key, target, object.size)
            .await?;

        let sidecar_written = match target.parent() {
            Some(dir) => match self.sidecars.write_once(dir, &downloaded.metadata).await {
                Ok(written) => written,
                Err(e) => {
                    warn!("写入旁路文件失败: {}", e);
                    false
                }
            },
            None => false,
        };

        Ok(Outcome::Downloaded {
            replaced: decision == SyncDecision::Replace,
            bytes: downloaded.bytes,
            sidecar_written,
        })
    }
}
