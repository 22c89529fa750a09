use bucket_mirror_lib::core::ScheduleConfig;
use bucket_mirror_lib::logging::{LogConfig, SizeRotatingWriter};
use bucket_mirror_lib::{storage, MirrorConfig, Scheduler, SchedulerExit, SyncEngine};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

/// 初始化日志系统：控制台始终输出，按配置额外写入文件
fn init_logging(config_dir: &Path) {
    let config = LogConfig::load(config_dir);

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(config.tracing_level().into())
        .add_directive("hyper=warn".parse().expect("static directive"))
        .add_directive("reqwest=warn".parse().expect("static directive"))
        .add_directive("opendal=warn".parse().expect("static directive"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let file_layer = if config.enabled {
        match SizeRotatingWriter::new(&config.log_dir(config_dir), config.max_size_mb) {
            Ok(file_writer) => Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_writer)
                    .with_ansi(false)
                    .with_target(false),
            ),
            Err(e) => {
                eprintln!("无法创建日志文件，仅输出到控制台: {}", e);
                None
            }
        }
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_dir = bucket_mirror_lib::config_dir();
    init_logging(&config_dir);

    let config = MirrorConfig::load(&config_dir)?;
    tracing::info!(
        "启动镜像: bucket={}, prefix={:?}, 目标={:?}, 间隔={}s",
        config.bucket,
        config.prefix,
        config.destination,
        config.sync_interval_secs
    );

    let store = storage::create_store(&config)?;
    let engine = SyncEngine::new(store, config.destination.clone(), config.pass_options());
    let scheduler = Scheduler::new(engine, ScheduleConfig::from(&config));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("收到退出信号，等待当前对象完成...");
            shutdown.cancel();
        }
    });

    match scheduler.run(cancel).await {
        SchedulerExit::Cancelled => {
            tracing::info!("已停止");
            Ok(())
        }
        SchedulerExit::MaxRuntimeReached => {
            tracing::info!("达到最长运行时间，退出以便重启");
            Ok(())
        }
        SchedulerExit::ListingFailed(e) => {
            tracing::error!("列举失败，退出: {}", e);
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
