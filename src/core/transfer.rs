//! 对象下载 - 顺序写入临时文件，落盘后原子重命名

use crate::error::SyncError;
use crate::storage::ObjectStore;
use async_trait::async_trait;
use futures::TryStreamExt;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

/// 未完成下载的文件后缀
pub const PARTIAL_SUFFIX: &str = ".partial";

/// 只支持顺序追加的写入目标
///
/// 不提供按偏移写入的能力，即使传输层给出了偏移信息也一律按到达顺序追加。
#[async_trait]
pub trait SequentialSink: Send {
    async fn append(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// 已写入的字节数
    fn written(&self) -> u64;
}

/// 写在目标文件旁边的临时文件
pub struct PartialFile {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl PartialFile {
    pub async fn create(target: &Path) -> io::Result<Self> {
        let path = partial_path(target);
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 刷新缓冲并 fsync，返回临时文件路径和写入字节数
    pub async fn finish(mut self) -> io::Result<(PathBuf, u64)> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;
        Ok((self.path, self.written))
    }
}

#[async_trait]
impl SequentialSink for PartialFile {
    async fn append(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }
}

/// 临时文件名和 uuid 之间的分隔符，清洗后的本地路径里不会出现
const PARTIAL_SEPARATOR: char = ',';

/// 临时文件名：`.<name>,<uuid>.partial`，与目标位于同一目录以保证 rename 原子性
pub fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(
        ".{}{}{}{}",
        name,
        PARTIAL_SEPARATOR,
        uuid::Uuid::new_v4().simple(),
        PARTIAL_SUFFIX
    ))
}

/// 是否是本程序留下的临时文件（`.<name>,<32位十六进制>.partial`）
pub fn is_partial_file(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(PARTIAL_SUFFIX) else {
        return false;
    };
    match stem.rsplit_once(PARTIAL_SEPARATOR) {
        Some((head, id)) => {
            head.starts_with('.')
                && head.len() > 1
                && id.len() == 32
                && id.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// 清理上次异常退出时遗留的临时文件，返回删除数量
pub async fn sweep_partial_files(root: &Path) -> usize {
    if !root.exists() {
        return 0;
    }

    let root = root.to_path_buf();
    // 使用 spawn_blocking 避免阻塞 async runtime
    let result = tokio::task::spawn_blocking(move || {
        walkdir::WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| is_partial_file(&e.file_name().to_string_lossy()))
            .filter(|e| match std::fs::remove_file(e.path()) {
                Ok(()) => true,
                Err(err) => {
                    warn!("删除遗留临时文件失败: {:?} ({})", e.path(), err);
                    false
                }
            })
            .count()
    })
    .await;

    match result {
        Ok(removed) => removed,
        Err(e) => {
            warn!("清理临时文件任务失败: {}", e);
            0
        }
    }
}

/// 下载结果
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub bytes: u64,
    pub metadata: HashMap<String, String>,
}

/// 下载器
#[derive(Debug, Default, Clone, Copy)]
pub struct Downloader;

impl Downloader {
    /// 下载对象到 `target`
    ///
    /// 目录创建失败时直接放弃本对象；写入或读取失败时临时文件被删除，
    /// 目标路径上不会留下不完整的文件。
    pub async fn download(
        &self,
        store: &dyn ObjectStore,
        key: &str,
        target: &Path,
        expected_size: u64,
    ) -> Result<Downloaded, SyncError> {
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| SyncError::DirectoryCreation {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        debug!(
            "下载: {} -> {:?} ({:.2} MB)",
            key,
            target,
            expected_size as f64 / 1024.0 / 1024.0
        );

        let body = store
            .get_object(key)
            .await
            .map_err(|source| SyncError::Retrieval {
                key: key.to_string(),
                source,
            })?;

        let mut sink = PartialFile::create(target)
            .await
            .map_err(|e| SyncError::write(target, e))?;

        // 任何提前返回都删除临时文件
        let cleanup = scopeguard::guard(sink.path().to_path_buf(), |path| {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("删除临时文件失败: {:?} ({})", path, e);
                }
            }
        });

        let mut stream = body.stream;
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|source| SyncError::Retrieval {
                key: key.to_string(),
                source,
            })?
        {
            sink.append(&chunk)
                .await
                .map_err(|e| SyncError::write(target, e))?;
        }

        let (partial, written) = sink.finish().await.map_err(|e| SyncError::write(target, e))?;

        if written != expected_size {
            return Err(SyncError::write(
                target,
                format!("收到 {} 字节，期望 {} 字节", written, expected_size),
            ));
        }

        fs::rename(&partial, target)
            .await
            .map_err(|e| SyncError::write(target, e))?;
        scopeguard::ScopeGuard::into_inner(cleanup);

        Ok(Downloaded {
            bytes: written,
            metadata: body.metadata,
        })
    }
}
