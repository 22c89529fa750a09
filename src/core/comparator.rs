use crate::error::SyncError;
use crate::storage::RemoteObject;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// 同步决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// 本地文件大小一致，不发起网络请求
    Skip,
    /// 大小不一致：先删除本地文件再下载
    Replace,
    /// 本地不存在，直接下载
    Fetch,
}

/// 本地文件状态，每次决策前重新读取
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileState {
    pub path: PathBuf,
    pub exists: bool,
    pub size: u64,
}

impl LocalFileState {
    /// 读取本地文件状态，NotFound 视为不存在，其他错误原样返回
    pub async fn probe(path: &Path) -> Result<Self, SyncError> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(Self {
                path: path.to_path_buf(),
                exists: true,
                size: metadata.len(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self {
                path: path.to_path_buf(),
                exists: false,
                size: 0,
            }),
            Err(e) => Err(SyncError::LocalStat {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

/// 基于文件大小的比较器
///
/// 大小只是廉价的一致性近似，大小恰好相同的内容损坏无法发现。
#[derive(Debug, Default, Clone, Copy)]
pub struct FileComparator;

impl FileComparator {
    pub fn decide(&self, local: &LocalFileState, remote: &RemoteObject) -> SyncDecision {
        if !local.exists {
            return SyncDecision::Fetch;
        }

        if local.size == remote.size {
            SyncDecision::Skip
        } else {
            tracing::debug!(
                "文件大小不同: {:?} (local={}, remote={})",
                local.path,
                local.size,
                remote.size
            );
            SyncDecision::Replace
        }
    }

    /// 读取本地状态并给出决策
    pub async fn evaluate(
        &self,
        path: &Path,
        remote: &RemoteObject,
    ) -> Result<SyncDecision, SyncError> {
        let local = LocalFileState::probe(path).await?;
        Ok(self.decide(&local, remote))
    }
}
