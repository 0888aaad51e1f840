//! 统一执行结果模型
//!
//! 单条派发命令的结果，以及步骤在报告中的状态

use serde::{Deserialize, Serialize};

/// 超时退出码（与 coreutils `timeout` 一致）
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// 进程退出码只能是 0-255，超出范围按 shell 的方式取低 8 位
pub fn shell_exit_byte(code: i32) -> u8 {
    (code & 0xff) as u8
}

/// 执行结果 - 派发命令的退出状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    /// 退出码
    pub exit_code: i32,

    /// 执行时长（秒）
    pub duration_secs: f64,

    /// 是否超时
    pub timed_out: bool,
}

impl ExecutionResult {
    /// 创建成功结果
    pub fn success(duration_secs: f64) -> Self {
        Self {
            exit_code: 0,
            duration_secs,
            timed_out: false,
        }
    }

    /// 创建失败结果
    pub fn failure(exit_code: i32, duration_secs: f64) -> Self {
        Self {
            exit_code,
            duration_secs,
            timed_out: false,
        }
    }

    /// 按退出码创建结果
    pub fn completed(exit_code: i32, duration_secs: f64) -> Self {
        if exit_code == 0 {
            Self::success(duration_secs)
        } else {
            Self::failure(exit_code, duration_secs)
        }
    }

    /// 创建超时结果
    pub fn timeout(duration_secs: f64) -> Self {
        Self {
            exit_code: TIMEOUT_EXIT_CODE,
            duration_secs,
            timed_out: true,
        }
    }

    /// 判断是否成功
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// 对应的步骤状态
    pub fn status(&self) -> StepStatus {
        if self.timed_out {
            StepStatus::Timeout
        } else if self.exit_code == 0 {
            StepStatus::Succeeded
        } else {
            StepStatus::Failed
        }
    }
}

/// 步骤执行状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// 成功
    Succeeded,
    /// 失败（非零退出码）
    Failed,
    /// 超时
    Timeout,
    /// 未能派发（脚本缺失、无法启动等）
    Errored,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Timeout => "timeout",
            StepStatus::Errored => "errored",
        }
    }
}
