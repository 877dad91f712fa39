//! 应用配置模块

use crate::logging::{LogConfig, LogLevel};
use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 命令行参数
#[derive(Parser, Debug, Default)]
#[command(name = "replisync")]
#[command(about = "Periodically mirror a source directory onto a replica directory")]
pub struct Cli {
    /// Path to source directory
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// Path to replica directory
    #[arg(long)]
    pub replica_dir: Option<PathBuf>,

    /// Synchronization interval in seconds [default: 30]
    #[arg(long)]
    pub interval: Option<u64>,

    /// Path to log file [default: ./console.log]
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Logging level
    #[arg(long, value_enum, ignore_case = true)]
    pub log_level: Option<LogLevel>,

    /// JSON config file; command line values take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stop on Ctrl-C instead of logging and continuing
    #[arg(long)]
    pub exit_on_interrupt: bool,
}

/// 同步配置（可来自 JSON 文件）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    #[serde(default)]
    pub source_dir: PathBuf,
    #[serde(default)]
    pub replica_dir: PathBuf,
    /// 同步间隔（秒）
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// 收到中断信号后是否退出
    #[serde(default)]
    pub exit_on_interrupt: bool,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_interval() -> u64 {
    30 // 默认 30 秒
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::new(),
            replica_dir: PathBuf::new(),
            interval: default_interval(),
            exit_on_interrupt: false,
            log: LogConfig::default(),
        }
    }
}

impl MirrorConfig {
    /// 从 JSON 文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("配置文件格式错误 {}", path.display()))
    }

    /// 合并配置文件与命令行参数，并把路径转换为绝对路径
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(source_dir) = cli.source_dir {
            config.source_dir = source_dir;
        }
        if let Some(replica_dir) = cli.replica_dir {
            config.replica_dir = replica_dir;
        }
        if let Some(interval) = cli.interval {
            config.interval = interval;
        }
        if let Some(log_file) = cli.log_file {
            config.log.file = log_file;
        }
        if let Some(level) = cli.log_level {
            config.log.level = level;
        }
        config.exit_on_interrupt |= cli.exit_on_interrupt;

        let cwd = std::env::current_dir().context("无法获取当前工作目录")?;
        config.source_dir = absolute(&cwd, &config.source_dir);
        config.replica_dir = absolute(&cwd, &config.replica_dir);
        config.log.file = absolute(&cwd, &config.log.file);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_dir.as_os_str().is_empty() {
            bail!("缺少源目录 (--source-dir)");
        }
        if self.replica_dir.as_os_str().is_empty() {
            bail!("缺少副本目录 (--replica-dir)");
        }
        if self.interval == 0 {
            bail!("同步间隔必须大于 0 秒");
        }
        if self.replica_dir.starts_with(&self.source_dir) || self.source_dir.starts_with(&self.replica_dir) {
            bail!(
                "源目录与副本目录不能相同或互相包含: {} / {}",
                self.source_dir.display(),
                self.replica_dir.display()
            );
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

/// 相对路径按工作目录解析，并去掉 `.` / `..` 组件
fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        return PathBuf::new();
    }
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli(source: &str, replica: &str) -> Cli {
        Cli {
            source_dir: Some(PathBuf::from(source)),
            replica_dir: Some(PathBuf::from(replica)),
            ..Default::default()
        }
    }

    #[test]
    fn test_cli_defaults() {
        let parsed = Cli::parse_from([
            "replisync",
            "--source-dir",
            "/tmp/src",
            "--replica-dir",
            "/tmp/rep",
            "--log-level",
            "debug",
        ]);
        let config = MirrorConfig::from_cli(parsed).unwrap();

        assert_eq!(config.interval(), Duration::from_secs(30));
        assert_eq!(config.log.level, LogLevel::Debug);
        assert!(config.log.file.is_absolute());
        assert!(config.log.file.ends_with("console.log"));
        assert!(!config.exit_on_interrupt);
    }

    #[test]
    fn test_relative_paths_become_absolute() {
        let config = MirrorConfig::from_cli(cli("data/./src", "data/x/../rep")).unwrap();
        let cwd = std::env::current_dir().unwrap();

        assert_eq!(config.source_dir, cwd.join("data/src"));
        assert_eq!(config.replica_dir, cwd.join("data/rep"));
    }

    #[test]
    fn test_config_file_is_overridden_by_cli() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"sourceDir": "/a/src", "replicaDir": "/a/rep", "interval": 5, "log": {"level": "ERROR"}}"#,
        )
        .unwrap();

        let config = MirrorConfig::from_cli(Cli {
            config: Some(path),
            interval: Some(7),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(config.source_dir, PathBuf::from("/a/src"));
        assert_eq!(config.interval, 7);
        assert_eq!(config.log.level, LogLevel::Error);
    }

    #[test]
    fn test_validation_errors() {
        assert!(MirrorConfig::from_cli(Cli::default()).is_err());
        assert!(MirrorConfig::from_cli(cli("/a", "/a/replica")).is_err());
        assert!(MirrorConfig::from_cli(cli("/a/src", "/a/src")).is_err());

        let mut zero = cli("/a/src", "/a/rep");
        zero.interval = Some(0);
        assert!(MirrorConfig::from_cli(zero).is_err());
    }
}
