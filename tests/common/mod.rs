//! 测试公共模块
//! 提供可编排结果的派发器和测试配置

#![allow(dead_code)]

use async_trait::async_trait;
use stackable_test_runner::{
    config::AppConfig,
    execution::ExecutionResult,
    OutputSink, RemoteDispatcher, RunnerError, RunnerResult,
};
use std::sync::Mutex;

/// 记录下来的一次派发
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub host: String,
    pub command: String,
    pub sink: OutputSink,
}

type Responder = Box<dyn Fn(&str, &str) -> RunnerResult<ExecutionResult> + Send + Sync>;

/// 按命令内容返回预设结果，并记录所有调用
pub struct ScriptedDispatcher {
    responder: Responder,
    calls: Mutex<Vec<Dispatched>>,
}

impl ScriptedDispatcher {
    pub fn new(
        responder: impl Fn(&str, &str) -> RunnerResult<ExecutionResult> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 所有命令都成功
    pub fn succeeding() -> Self {
        Self::new(|_, _| Ok(ExecutionResult::success(0.01)))
    }

    /// 测试命令返回 `test_code`，日志命令返回 `log_result`，其余成功
    pub fn with_test_exit(
        test_code: i32,
        log_result: impl Fn() -> RunnerResult<ExecutionResult> + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |_, command| {
            if is_test_command(command) {
                Ok(ExecutionResult::completed(test_code, 0.01))
            } else if is_log_command(command) {
                log_result()
            } else {
                Ok(ExecutionResult::success(0.01))
            }
        })
    }

    pub fn calls(&self) -> Vec<Dispatched> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteDispatcher for ScriptedDispatcher {
    async fn execute(
        &self,
        host: &str,
        command: &str,
        sink: &OutputSink,
    ) -> RunnerResult<ExecutionResult> {
        self.calls.lock().unwrap().push(Dispatched {
            host: host.to_string(),
            command: command.to_string(),
            sink: sink.clone(),
        });
        (self.responder)(host, command)
    }
}

pub fn is_test_command(command: &str) -> bool {
    command.starts_with("cd agent-integration-tests && ")
}

pub fn is_log_command(command: &str) -> bool {
    command.starts_with("journalctl")
}

pub fn artifact_error() -> RunnerError {
    RunnerError::Artifact {
        path: "/target/stackable-agent.log".into(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    }
}

pub fn spawn_error() -> RunnerError {
    RunnerError::Spawn {
        program: "/stackable.sh".to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    }
}

/// 创建测试配置
pub fn create_test_config(branch: &str) -> AppConfig {
    let mut config = AppConfig::from_defaults().expect("default configuration is valid");
    config.test_repo.branch = branch.to_string();
    config
}
