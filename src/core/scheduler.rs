//! 周期性同步调度

use crate::config::{ListingFailurePolicy, ScheduleMode};
use crate::core::engine::{SyncEngine, SyncReport};
use crate::error::SyncError;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// 调度参数
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub interval: Duration,
    pub mode: ScheduleMode,
    pub on_listing_failure: ListingFailurePolicy,
    /// 运行超过该时长后退出
    pub max_runtime: Option<Duration>,
}

impl From<&crate::config::MirrorConfig> for ScheduleConfig {
    fn from(config: &crate::config::MirrorConfig) -> Self {
        Self {
            interval: config.sync_interval(),
            mode: config.schedule_mode,
            on_listing_failure: config.listing_failure_policy,
            max_runtime: config.max_runtime(),
        }
    }
}

/// 调度器退出原因
#[derive(Debug)]
pub enum SchedulerExit {
    Cancelled,
    MaxRuntimeReached,
    /// 列举失败且策略为退出
    ListingFailed(SyncError),
}

/// 调度器
pub struct Scheduler {
    engine: SyncEngine,
    config: ScheduleConfig,
}

impl Scheduler {
    pub fn new(engine: SyncEngine, config: ScheduleConfig) -> Self {
        Self { engine, config }
    }

    /// 无限循环执行同步，直到取消、达到最长运行时间或列举失败需要退出
    pub async fn run(&self, cancel: CancellationToken) -> SchedulerExit {
        self.run_observed(cancel, |_| {}).await
    }

    /// 同 [`Scheduler::run`]，每次同步成功后回调报告
    pub async fn run_observed<F>(
        &self,
        cancel: CancellationToken,
        mut on_report: F,
    ) -> SchedulerExit
    where
        F: FnMut(&SyncReport),
    {
        let started = Instant::now();
        let deadline = self.config.max_runtime.map(|d| started + d);
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut pass_no: u64 = 0;

        loop {
            if self.config.mode == ScheduleMode::FixedRate {
                // 第一次 tick 立即完成
                tokio::select! {
                    _ = cancel.cancelled() => return SchedulerExit::Cancelled,
                    _ = Self::sleep_until_deadline(deadline) => {
                        info!("已达到最长运行时间，退出调度");
                        return SchedulerExit::MaxRuntimeReached;
                    }
                    _ = ticker.tick() => {}
                }
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    info!("已达到最长运行时间，退出调度");
                    return SchedulerExit::MaxRuntimeReached;
                }
            }

            pass_no += 1;
            let span = info_span!("pass", no = pass_no);
            match self.engine.run_pass(&cancel).instrument(span).await {
                Ok(report) => {
                    match serde_json::to_string(&report) {
                        Ok(json) => debug!(target: "bucket_mirror::report", "{}", json),
                        Err(e) => warn!("无法序列化同步报告: {}", e),
                    }
                    on_report(&report)
                }
                Err(SyncError::Cancelled) => return SchedulerExit::Cancelled,
                Err(e) if e.is_fatal() => {
                    error!("同步失败: {}", e);
                    if self.config.on_listing_failure == ListingFailurePolicy::Exit {
                        return SchedulerExit::ListingFailed(e);
                    }
                    warn!("将在下一个周期重试");
                }
                Err(e) => warn!("同步未完成: {}", e),
            }

            if self.config.mode == ScheduleMode::AfterPass {
                let wake = match deadline {
                    Some(deadline) => deadline.min(Instant::now() + self.config.interval),
                    None => Instant::now() + self.config.interval,
                };
                tokio::select! {
                    _ = cancel.cancelled() => return SchedulerExit::Cancelled,
                    _ = tokio::time::sleep_until(wake) => {}
                }
            }
        }
    }

    async fn sleep_until_deadline(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
