//! 运行报告
//! 记录每个步骤的结果以及最终退出码

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::error::{RunnerError, RunnerResult};
use crate::execution::StepStatus;
use crate::plan::StepKind;

/// 单个步骤的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub kind: StepKind,
    pub host: String,
    pub status: StepStatus,
    /// 未能派发时为空
    pub exit_code: Option<i32>,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 一次完整运行的报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepOutcome>,
    /// 进程最终退出码，等于测试步骤的退出码
    pub exit_code: i32,
}

/// 报告统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunReport {
    pub fn outcome(&self, kind: StepKind) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.kind == kind)
    }

    pub fn summary(&self) -> ReportSummary {
        let succeeded = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Succeeded)
            .count();

        ReportSummary {
            total: self.steps.len(),
            succeeded,
            failed: self.steps.len() - succeeded,
        }
    }

    /// 以 JSON 格式写入文件
    pub fn write_json(&self, path: &Path) -> RunnerResult<()> {
        let body = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, body)
            .map_err(|e| RunnerError::Report(format!("{}: {}", path.display(), e)))
    }
}
