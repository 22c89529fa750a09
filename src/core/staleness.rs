use crate::storage::RemoteObject;
use chrono::{DateTime, Duration, Utc};

/// 按最后修改时间排除过旧的对象
///
/// 在做任何本地 IO 之前判断，窗口为 None 时保留全部对象。
#[derive(Debug, Clone, Copy, Default)]
pub struct StalenessFilter {
    window: Option<Duration>,
}

impl StalenessFilter {
    pub fn new(window: Option<Duration>) -> Self {
        Self { window }
    }

    /// 以 `now` 为基准计算截止时间，早于截止时间的对象被丢弃
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.window.and_then(|w| now.checked_sub_signed(w))
    }

    pub fn keep_at(&self, object: &RemoteObject, now: DateTime<Utc>) -> bool {
        match self.cutoff(now) {
            Some(cutoff) => object.last_modified >= cutoff,
            None => true,
        }
    }
}
