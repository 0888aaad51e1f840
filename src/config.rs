//! 配置系统
//! 默认值 + `RUNNER_` 前缀环境变量 + `GIT_BRANCH`，加载后统一校验

use config::{Config, ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::error::RunnerResult;

/// 测试分支所在的环境变量（不带前缀）
pub const BRANCH_ENV_VAR: &str = "GIT_BRANCH";

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// 派发脚本路径，例如 "/stackable.sh"
    pub script: String,
    /// 凭据文件路径（原样传给派发脚本）
    pub key_path: PathBuf,
    /// 单条远程命令超时（秒），未设置则无限等待
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostsConfig {
    /// 安装工具链并执行测试的主机
    pub test_driver: String,
    /// 提供服务日志的主机
    pub main: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    pub hostname: String,
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolchainConfig {
    /// 引导安装脚本地址（仅允许 https）
    pub installer_url: String,
    /// 安装后的版本查询命令，仅用于诊断
    pub version_command: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackagesConfig {
    /// 系统包管理器，例如 apt-get
    pub manager: String,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestRepoConfig {
    pub url: String,
    /// clone 后的目录名
    pub directory: String,
    /// 在仓库目录内执行的测试命令
    pub test_command: String,
    /// 来自 GIT_BRANCH，未设置时为空字符串
    #[serde(default)]
    pub branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogCaptureConfig {
    /// 在 main 主机上输出服务日志的命令
    pub command: String,
    /// 本地日志产物路径
    pub artifact_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty, compact
    pub format: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportConfig {
    /// 运行报告输出路径（JSON），未设置则不写
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub dispatch: DispatchConfig,
    pub hosts: HostsConfig,
    pub dns: DnsConfig,
    pub toolchain: ToolchainConfig,
    pub packages: PackagesConfig,
    pub test_repo: TestRepoConfig,
    pub log: LogCaptureConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> RunnerResult<Self> {
        let settings = Self::defaults()?
            .add_source(
                Environment::with_prefix("RUNNER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(" ")
                    .with_list_parse_key("packages.names"),
            )
            .set_override_option("test_repo.branch", std::env::var(BRANCH_ENV_VAR).ok())?;

        let config: AppConfig = settings.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// 仅使用内置默认值（不读取环境变量）
    pub fn from_defaults() -> RunnerResult<Self> {
        let config: AppConfig = Self::defaults()?.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("dispatch.script", "/stackable.sh")?
            .set_default("dispatch.key_path", "/.cluster/key")?
            .set_default("hosts.test_driver", "testdriver-1")?
            .set_default("hosts.main", "main-1")?
            .set_default("dns.hostname", "kubernetes")?
            .set_default("dns.address", "10.0.0.1")?
            .set_default("toolchain.installer_url", "https://sh.rustup.rs")?
            .set_default("toolchain.version_command", "~/.cargo/bin/cargo --version")?
            .set_default("packages.manager", "apt-get")?
            .set_default(
                "packages.names",
                vec!["build-essential", "pkg-config", "libssl-dev", "git"],
            )?
            .set_default(
                "test_repo.url",
                "https://github.com/stackabletech/agent-integration-tests.git",
            )?
            .set_default("test_repo.directory", "agent-integration-tests")?
            .set_default(
                "test_repo.test_command",
                "~/.cargo/bin/cargo test -- --test-threads=1",
            )?
            .set_default("test_repo.branch", "")?
            .set_default("log.command", "journalctl -u stackable-agent")?
            .set_default("log.artifact_path", "/target/stackable-agent.log")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")
    }

    /// 验证配置合法性
    fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.script.trim().is_empty() {
            return Err(ConfigError::Message("dispatch.script must not be empty".to_string()));
        }

        if self.dispatch.command_timeout_secs == Some(0) {
            return Err(ConfigError::Message(
                "dispatch.command_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.hosts.test_driver.trim().is_empty() || self.hosts.main.trim().is_empty() {
            return Err(ConfigError::Message("host names must not be empty".to_string()));
        }

        if self.dns.address.parse::<IpAddr>().is_err() {
            return Err(ConfigError::Message(format!(
                "Invalid dns.address: {}. Must be an IPv4 or IPv6 address",
                self.dns.address
            )));
        }

        if self.dns.hostname.trim().is_empty() || self.dns.hostname.contains(char::is_whitespace) {
            return Err(ConfigError::Message(format!(
                "Invalid dns.hostname: {:?}",
                self.dns.hostname
            )));
        }

        if !self.toolchain.installer_url.starts_with("https://") {
            return Err(ConfigError::Message(
                "toolchain.installer_url must use https".to_string(),
            ));
        }

        if self.test_repo.directory.trim().is_empty() {
            return Err(ConfigError::Message(
                "test_repo.directory must not be empty".to_string(),
            ));
        }

        if self.log.artifact_path.as_os_str().is_empty() {
            return Err(ConfigError::Message("log.artifact_path must not be empty".to_string()));
        }

        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty, compact",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }
}
