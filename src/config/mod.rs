// 配置管理模块

use crate::status::CoordinatorConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 下载状态配置
    #[serde(default)]
    pub status: StatusConfig,
    /// 用户选项存储配置
    #[serde(default)]
    pub options: OptionsConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 50MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    50 * 1024 * 1024 // 50MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// CORS允许的源
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18889,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// 下载状态配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// 有下载进行中时的对账间隔（毫秒），默认 1000
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// 标签页连接无心跳多久视为断开（秒），默认 120
    #[serde(default = "default_stale_timeout_secs")]
    pub stale_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_stale_timeout_secs() -> u64 {
    120
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stale_timeout_secs: default_stale_timeout_secs(),
        }
    }
}

impl StatusConfig {
    /// 转换为协调器配置
    pub fn to_coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_secs)
    }

    /// 验证配置取值
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            anyhow::bail!("status.poll_interval_ms 必须大于 0");
        }
        if self.stale_timeout_secs == 0 {
            anyhow::bail!("status.stale_timeout_secs 必须大于 0");
        }
        Ok(())
    }
}

/// 用户选项存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsConfig {
    /// 选项 JSON 文件路径
    #[serde(default = "default_options_path")]
    pub path: PathBuf,

    /// 是否监听文件变化并热加载
    #[serde(default = "default_options_watch")]
    pub watch: bool,
}

fn default_options_path() -> PathBuf {
    PathBuf::from("config/options.json")
}

fn default_options_watch() -> bool {
    true
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            path: default_options_path(),
            watch: default_options_watch(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            status: StatusConfig::default(),
            options: OptionsConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config.status.validate().context("配置文件中的状态配置验证失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.status
            .validate()
            .context("保存配置失败：状态配置无效")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);

        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {}", e);
                let default_config = Self::default();

                // 只在文件不存在时写出默认配置，避免覆盖用户写错的文件
                if !std::path::Path::new(path).exists() {
                    if let Err(e) = default_config.save_to_file(path).await {
                        tracing::error!("保存默认配置失败: {}", e);
                    }
                }

                default_config
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[tokio::test]
    async fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 18889); // 默认端口 18889
        assert_eq!(config.status.poll_interval_ms, 1000);
        assert!(config.options.watch);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let mut config = AppConfig::default();
        config.status.poll_interval_ms = 250;
        config.save_to_file(path).await.unwrap();

        let loaded = AppConfig::load_from_file(path).await.unwrap();
        assert_eq!(loaded.server.port, config.server.port);
        assert_eq!(loaded.status.poll_interval_ms, 250);
        assert_eq!(loaded.options.path, config.options.path);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let toml_str = r#"
[server]
host = "0.0.0.0"
port = 9000
cors_origins = []
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.status.stale_timeout_secs, 120);
        assert_eq!(config.options.path, PathBuf::from("config/options.json"));
        assert_eq!(config.log.retention_days, 7);
    }

    #[test]
    fn test_status_config_to_coordinator() {
        let status = StatusConfig {
            poll_interval_ms: 500,
            stale_timeout_secs: 30,
        };
        let coordinator = status.to_coordinator_config();
        assert_eq!(coordinator.poll_interval, Duration::from_millis(500));
        assert_eq!(status.stale_timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_zero_poll_interval_rejected() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();
        std::fs::write(
            path,
            r#"
[server]
host = "127.0.0.1"
port = 18889
cors_origins = ["*"]

[status]
poll_interval_ms = 0
"#,
        )
        .unwrap();

        assert!(AppConfig::load_from_file(path).await.is_err());
    }

    #[tokio::test]
    async fn test_load_or_default_writes_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("app.toml");
        let path = path.to_str().unwrap();

        let config = AppConfig::load_or_default(path).await;
        assert_eq!(config.server.port, 18889);
        assert!(std::path::Path::new(path).exists());
    }
}
