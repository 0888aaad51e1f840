//! 统一错误模型
//! 定义运行器的所有错误类型

use std::path::PathBuf;
use thiserror::Error;

/// 运行器错误类型
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for dispatched command: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Failed to open artifact {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Report error: {0}")]
    Report(String),
}

impl RunnerError {
    /// 派发失败时对应的退出码
    ///
    /// 沿用 shell 约定：命令无法启动时为 127，其他本地错误为 1
    pub fn exit_code(&self) -> i32 {
        match self {
            RunnerError::Spawn { .. } => 127,
            RunnerError::Config(_)
            | RunnerError::Wait(_)
            | RunnerError::Artifact { .. }
            | RunnerError::Report(_) => 1,
        }
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for RunnerError {
    fn from(e: config::ConfigError) -> Self {
        RunnerError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for RunnerError {
    fn from(e: serde_json::Error) -> Self {
        RunnerError::Report(e.to_string())
    }
}

/// 便捷类型别名
pub type RunnerResult<T> = Result<T, RunnerError>;
