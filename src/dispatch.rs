//! 远程派发模块
//!
//! 远程命令通过外部派发脚本执行：
//! `<script> <host> -i <key_path> <command>`
//! 脚本负责连接主机并把远程命令的退出码作为自己的退出码返回。

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::execution::ExecutionResult;

/// 远程命令标准输出的去向
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// 直接输出到当前进程的 stdout
    Inherit,
    /// 重定向到本地文件（每次派发都会截断）
    File(PathBuf),
}

/// 远程派发能力
#[async_trait]
pub trait RemoteDispatcher: Send + Sync {
    /// 在 `host` 上执行 `command`，等待其结束并返回退出状态
    async fn execute(
        &self,
        host: &str,
        command: &str,
        sink: &OutputSink,
    ) -> RunnerResult<ExecutionResult>;
}

/// 基于派发脚本的实现
pub struct StackableDispatcher {
    script: String,
    key_path: PathBuf,
    command_timeout: Option<Duration>,
}

impl StackableDispatcher {
    pub fn new(script: impl Into<String>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            key_path: key_path.into(),
            command_timeout: None,
        }
    }

    /// 从配置创建
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.script.clone(), config.key_path.clone())
            .with_timeout(config.command_timeout_secs.map(Duration::from_secs))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// 设置超时时命令在独立进程组中运行，超时后整组终止
    fn build_command(&self, host: &str, command: &str, stdout: Stdio) -> Command {
        let mut cmd = Command::new(&self.script);
        cmd.arg(host)
            .arg("-i")
            .arg(&self.key_path)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            if self.command_timeout.is_some() {
                cmd.process_group(0);
            }
        }

        cmd
    }
}

fn open_sink(sink: &OutputSink) -> RunnerResult<Stdio> {
    match sink {
        OutputSink::Inherit => Ok(Stdio::inherit()),
        OutputSink::File(path) => {
            let file = std::fs::File::create(path).map_err(|source| RunnerError::Artifact {
                path: path.clone(),
                source,
            })?;
            Ok(Stdio::from(file))
        }
    }
}

/// 终止派发脚本及其启动的所有进程，并回收派发脚本
async fn kill_dispatch(child: &mut Child, host: &str) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                warn!(host = %host, pid = pid, error = %e, "Failed to kill process group");
            }
        }
    }

    if let Err(e) = child.kill().await {
        warn!(host = %host, error = %e, "Failed to kill dispatch process");
    }
}

/// 将进程退出状态转换为 shell 风格的退出码
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[async_trait]
impl RemoteDispatcher for StackableDispatcher {
    async fn execute(
        &self,
        host: &str,
        command: &str,
        sink: &OutputSink,
    ) -> RunnerResult<ExecutionResult> {
        let start_time = Instant::now();

        debug!(
            script = %self.script,
            host = %host,
            command = %command,
            "Dispatching remote command"
        );

        let stdout = open_sink(sink)?;
        let mut child = self
            .build_command(host, command, stdout)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: self.script.clone(),
                source,
            })?;

        let result = match self.command_timeout {
            Some(limit) => {
                tokio::select! {
                    status = child.wait() => {
                        let status = status.map_err(RunnerError::Wait)?;
                        ExecutionResult::completed(
                            exit_code_of(status),
                            start_time.elapsed().as_secs_f64(),
                        )
                    }
                    _ = tokio::time::sleep(limit) => {
                        warn!(
                            host = %host,
                            timeout = ?limit,
                            "Remote command timed out, killing it"
                        );
                        kill_dispatch(&mut child, host).await;
                        ExecutionResult::timeout(start_time.elapsed().as_secs_f64())
                    }
                }
            }
            None => {
                let status = child.wait().await.map_err(RunnerError::Wait)?;
                ExecutionResult::completed(exit_code_of(status), start_time.elapsed().as_secs_f64())
            }
        };

        info!(
            host = %host,
            exit_code = result.exit_code,
            duration_secs = result.duration_secs,
            timed_out = result.timed_out,
            "Remote command finished"
        );

        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    // 丢弃 host、-i、key 三个参数，在本地执行命令
    fn fake_script(dir: &Path) -> PathBuf {
        write_script(dir, "#!/bin/sh\nshift 3\nexec sh -c \"$1\"\n")
    }

    // 不使用 exec，命令作为派发脚本的子进程运行
    fn forking_script(dir: &Path) -> PathBuf {
        write_script(dir, "#!/bin/sh\nshift 3\nsh -c \"$1\"\n")
    }

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("dispatch.sh");
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_exit_code_is_propagated() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_script(dir.path());
        let dispatcher = StackableDispatcher::new(script.to_string_lossy(), "/.cluster/key");

        let result = dispatcher
            .execute("testdriver-1", "exit 3", &OutputSink::Inherit)
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_stdout_redirected_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_script(dir.path());
        let artifact = dir.path().join("service.log");
        let dispatcher = StackableDispatcher::new(script.to_string_lossy(), "/.cluster/key");

        let result = dispatcher
            .execute("main-1", "echo agent started", &OutputSink::File(artifact.clone()))
            .await
            .unwrap();

        assert!(result.is_success());
        let content = std::fs::read_to_string(&artifact).unwrap();
        assert_eq!(content, "agent started\n");
    }

    #[tokio::test]
    async fn test_missing_script_is_spawn_error() {
        let dispatcher = StackableDispatcher::new("/nonexistent/stackable.sh", "/.cluster/key");

        let result = dispatcher
            .execute("testdriver-1", "true", &OutputSink::Inherit)
            .await;

        assert!(matches!(result, Err(RunnerError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_script(dir.path());
        let dispatcher = StackableDispatcher::new(script.to_string_lossy(), "/.cluster/key")
            .with_timeout(Some(Duration::from_millis(200)));

        let result = dispatcher
            .execute("testdriver-1", "sleep 5", &OutputSink::Inherit)
            .await
            .unwrap();

        assert!(result.timed_out);
        assert_eq!(result.exit_code, crate::execution::TIMEOUT_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_timeout_kills_processes_started_by_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = forking_script(dir.path());
        let artifact = dir.path().join("service.log");
        let dispatcher = StackableDispatcher::new(script.to_string_lossy(), "/.cluster/key")
            .with_timeout(Some(Duration::from_millis(200)));

        let result = dispatcher
            .execute(
                "main-1",
                "sleep 1; echo late",
                &OutputSink::File(artifact.clone()),
            )
            .await
            .unwrap();

        assert!(result.timed_out);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let content = std::fs::read_to_string(&artifact).unwrap();
        assert_eq!(content, "");
    }

    #[tokio::test]
    async fn test_signal_maps_to_128_plus_signal() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_script(dir.path());
        let dispatcher = StackableDispatcher::new(script.to_string_lossy(), "/.cluster/key");

        let result = dispatcher
            .execute("testdriver-1", "kill -9 $$", &OutputSink::Inherit)
            .await
            .unwrap();

        assert_eq!(result.exit_code, 137);
        assert_eq!(result.status(), crate::execution::StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_unwritable_artifact_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_script(dir.path());
        let dispatcher = StackableDispatcher::new(script.to_string_lossy(), "/.cluster/key");
        let artifact = dir.path().join("missing-dir").join("service.log");

        let result = dispatcher
            .execute("main-1", "true", &OutputSink::File(artifact))
            .await;

        assert!(matches!(result, Err(RunnerError::Artifact { .. })));
    }
}
