//! 执行计划
//!
//! 根据配置生成有序的远程步骤列表。命令字符串在这里一次性拼好，
//! 运行时不再修改。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::config::AppConfig;
use crate::dispatch::OutputSink;

/// 步骤类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ConfigureDns,
    InstallToolchain,
    VerifyToolchain,
    InstallPackages,
    CloneTestRepository,
    RunTests,
    CollectLog,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::ConfigureDns => "configure_dns",
            StepKind::InstallToolchain => "install_toolchain",
            StepKind::VerifyToolchain => "verify_toolchain",
            StepKind::InstallPackages => "install_packages",
            StepKind::CloneTestRepository => "clone_test_repository",
            StepKind::RunTests => "run_tests",
            StepKind::CollectLog => "collect_log",
        }
    }

    /// 只有测试步骤的结果决定最终退出码
    pub fn is_authoritative(&self) -> bool {
        matches!(self, StepKind::RunTests)
    }

    /// 尽力而为的准备步骤
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            StepKind::ConfigureDns
                | StepKind::InstallToolchain
                | StepKind::VerifyToolchain
                | StepKind::InstallPackages
                | StepKind::CloneTestRepository
        )
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个远程步骤
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub host: String,
    pub command: String,
    pub sink: OutputSink,
}

impl Step {
    fn on(kind: StepKind, host: &str, command: String) -> Self {
        Self {
            kind,
            host: host.to_string(),
            command,
            sink: OutputSink::Inherit,
        }
    }
}

/// 有序的步骤列表
#[derive(Debug, Clone)]
pub struct Plan {
    steps: Vec<Step>,
}

static SHELL_METACHARACTERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\s;&|<>$`\\"'(){}*?!#~]"#).expect("valid regex"));

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// 按固定顺序生成完整计划
    pub fn from_config(config: &AppConfig) -> Self {
        let driver = config.hosts.test_driver.as_str();
        let branch = config.test_repo.branch.as_str();

        check_branch(branch);

        let mut collect_log =
            Step::on(StepKind::CollectLog, &config.hosts.main, config.log.command.clone());
        collect_log.sink = OutputSink::File(config.log.artifact_path.clone());

        Self::new(vec![
            Step::on(
                StepKind::ConfigureDns,
                driver,
                dns_command(&config.dns.address, &config.dns.hostname),
            ),
            Step::on(
                StepKind::InstallToolchain,
                driver,
                toolchain_command(&config.toolchain.installer_url),
            ),
            Step::on(
                StepKind::VerifyToolchain,
                driver,
                config.toolchain.version_command.clone(),
            ),
            Step::on(
                StepKind::InstallPackages,
                driver,
                packages_command(&config.packages.manager, &config.packages.names),
            ),
            Step::on(
                StepKind::CloneTestRepository,
                driver,
                clone_command(branch, &config.test_repo.url),
            ),
            Step::on(
                StepKind::RunTests,
                driver,
                test_command(&config.test_repo.directory, &config.test_repo.test_command),
            ),
            collect_log,
        ])
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// 追加静态 hosts 记录（需要 sudo）
pub fn dns_command(address: &str, hostname: &str) -> String {
    format!("echo '{} {}' | sudo tee -a /etc/hosts", address, hostname)
}

/// 通过管道执行引导安装脚本，只允许 https + TLS 1.2 以上
pub fn toolchain_command(installer_url: &str) -> String {
    format!(
        "curl --proto '=https' --tlsv1.2 -sSf {} | sh -s -- -y",
        installer_url
    )
}

pub fn packages_command(manager: &str, packages: &[String]) -> String {
    format!("sudo {} install -y {}", manager, packages.join(" "))
}

/// 分支名原样拼接，不做转义
pub fn clone_command(branch: &str, url: &str) -> String {
    format!("git clone -b {} {}", branch, url)
}

pub fn test_command(directory: &str, command: &str) -> String {
    format!("cd {} && {}", directory, command)
}

/// 分支名是否会被远程 shell 按字面以外的方式解释
pub fn branch_needs_quoting(branch: &str) -> bool {
    SHELL_METACHARACTERS.is_match(branch)
}

fn check_branch(branch: &str) {
    if branch.is_empty() {
        warn!("GIT_BRANCH is not set, the clone command will be malformed");
    } else if branch_needs_quoting(branch) {
        warn!(
            branch = %branch,
            "GIT_BRANCH contains shell metacharacters and is passed to the remote shell unescaped"
        );
    }
}
