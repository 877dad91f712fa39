use clap::Parser;
use replisync_lib::logging::{LogConfig, SizeRotatingWriter};
use replisync_lib::{Cli, MirrorConfig, SyncError};
use tracing::error;
use tracing_subscriber::prelude::*;

/// 初始化日志系统：同时输出到日志文件和控制台
fn init_logging(config: &LogConfig) {
    if !config.enabled {
        // 日志已禁用，只初始化一个空的 subscriber
        let subscriber = tracing_subscriber::registry();
        let _ = tracing::subscriber::set_global_default(subscriber);
        return;
    }

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(config.level.tracing_level().into())
        .from_env_lossy();

    match SizeRotatingWriter::new(&config.file, config.max_size_mb) {
        Ok(file_writer) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false);

            let console_layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false);

            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(console_layer);
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        Err(e) => {
            // 文件日志创建失败，回退到控制台
            let console_layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false);
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer);
            let _ = tracing::subscriber::set_global_default(subscriber);
            error!("无法打开日志文件 {}: {}", config.file.display(), e);
        }
    }
}

#[tokio::main]
async fn main() {
    let config = match MirrorConfig::from_cli(Cli::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("配置错误: {:#}", e);
            std::process::exit(2);
        }
    };

    init_logging(&config.log);

    if let Err(e) = replisync_lib::run(&config).await {
        match e.downcast_ref::<SyncError>() {
            Some(SyncError::SourceMissing(path)) => {
                error!("源目录不存在，无法启动: {}", path.display())
            }
            _ => error!("同步器异常退出: {:#}", e),
        }
        std::process::exit(1);
    }
}
