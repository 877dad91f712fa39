//! 定时触发同步

use crate::core::{SyncReport, Synchronizer};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// 按固定间隔执行同步，上一次同步结束之前不会开始下一次
pub struct Scheduler {
    interval: Duration,
    exit_on_interrupt: bool,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            exit_on_interrupt: false,
        }
    }

    pub fn exit_on_interrupt(mut self, exit: bool) -> Self {
        self.exit_on_interrupt = exit;
        self
    }

    /// 运行调度循环
    ///
    /// 中断信号只在两次同步之间的等待期间处理，正在进行的同步不会被打断。
    pub async fn run(&self, synchronizer: &mut Synchronizer) {
        // 初始化已经完成一次全量复制，第一次同步在一个间隔之后
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("每 {} 秒同步一次", self.interval.as_secs());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match synchronizer.sync().await {
                        Ok(report) => log_report(&report),
                        Err(e) => error!("同步失败，将在下一个周期重试: {}", e),
                    }
                }
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        error!("无法监听中断信号: {}", e);
                        return;
                    }
                    info!("正在停止同步器。");
                    if self.exit_on_interrupt {
                        return;
                    }
                }
            }
        }
    }
}

fn log_report(report: &SyncReport) {
    for message in &report.errors {
        warn!("{}", message);
    }
    info!(
        "同步完成: 新建 {}, 删除 {}, 移动 {}, 重写 {}, 未变 {}, 失败 {} ({} ms)",
        report.created,
        report.removed,
        report.moved,
        report.rewritten,
        report.unchanged,
        report.failed,
        report.duration
    );
}
