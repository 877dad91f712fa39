use anyhow::Result;
use std::sync::Arc;

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod storage;

pub use config::{Cli, MirrorConfig};
pub use crate::core::{SyncReport, Synchronizer};
pub use error::SyncError;
pub use scheduler::Scheduler;
pub use storage::{LocalStorage, Storage};

/// 初始化同步器，完成首次全量复制后进入定时同步
pub async fn run(config: &MirrorConfig) -> Result<()> {
    let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new());

    let mut synchronizer = Synchronizer::new(
        storage,
        config.source_dir.clone(),
        config.replica_dir.clone(),
    )
    .await?;
    synchronizer.initialize().await?;

    Scheduler::new(config.interval())
        .exit_on_interrupt(config.exit_on_interrupt)
        .run(&mut synchronizer)
        .await;

    Ok(())
}
