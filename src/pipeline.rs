//! 测试运行流水线
//!
//! 顺序执行计划中的步骤：
//! - 准备步骤尽力而为，失败只记录日志
//! - 测试步骤的退出码是唯一权威结果
//! - 日志收集步骤总是在测试之后执行一次，其结果不影响退出码

use chrono::Utc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::dispatch::RemoteDispatcher;
use crate::error::RunnerError;
use crate::execution::{ExecutionResult, StepStatus};
use crate::plan::{Plan, Step, StepKind};
use crate::report::{RunReport, StepOutcome};
use crate::telemetry;

/// 计划中缺少测试步骤时使用的退出码
const MISSING_TEST_STEP_EXIT_CODE: i32 = 1;

/// 一次测试运行
pub struct TestRun<D> {
    dispatcher: D,
}

impl<D: RemoteDispatcher> TestRun<D> {
    pub fn new(dispatcher: D) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// 执行计划并返回报告
    pub async fn run(&self, plan: &Plan) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("test_run", run_id = %run_id);

        async move {
            let started_at = Utc::now();
            let mut outcomes = Vec::with_capacity(plan.len());
            let mut test_exit_code = None;

            info!(steps = plan.len(), "Starting test run");

            for step in plan.steps() {
                let (outcome, code) = self.run_step(step).await;

                if step.kind.is_authoritative() {
                    info!(exit_code = code, "Test step finished, result captured");
                    test_exit_code = Some(code);
                }

                outcomes.push(outcome);
            }

            let exit_code = test_exit_code.unwrap_or_else(|| {
                error!("Plan contains no test step, reporting failure");
                MISSING_TEST_STEP_EXIT_CODE
            });

            let report = RunReport {
                run_id,
                started_at,
                finished_at: Utc::now(),
                steps: outcomes,
                exit_code,
            };

            let summary = report.summary();
            info!(
                exit_code = report.exit_code,
                total = summary.total,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Test run finished"
            );

            report
        }
        .instrument(span)
        .await
    }

    /// 执行单个步骤，返回结果以及按 shell 约定换算的退出码
    async fn run_step(&self, step: &Step) -> (StepOutcome, i32) {
        info!(step = %step.kind, host = %step.host, "Running step");

        let result = self
            .dispatcher
            .execute(&step.host, &step.command, &step.sink)
            .await;

        let (outcome, code) = outcome_of(step, result);
        telemetry::record_step(&outcome);

        if outcome.status != StepStatus::Succeeded {
            if step.kind.is_setup() {
                warn!(
                    step = %step.kind,
                    status = outcome.status.as_str(),
                    exit_code = ?outcome.exit_code,
                    error = ?outcome.error,
                    "Setup step failed, continuing"
                );
            } else if step.kind == StepKind::CollectLog {
                warn!(
                    status = outcome.status.as_str(),
                    exit_code = ?outcome.exit_code,
                    error = ?outcome.error,
                    "Log collection failed, artifact may be empty or missing"
                );
            }
        }

        (outcome, code)
    }
}

fn outcome_of(step: &Step, result: Result<ExecutionResult, RunnerError>) -> (StepOutcome, i32) {
    match result {
        Ok(result) => (
            StepOutcome {
                kind: step.kind,
                host: step.host.clone(),
                status: result.status(),
                exit_code: Some(result.exit_code),
                duration_secs: result.duration_secs,
                error: None,
            },
            result.exit_code,
        ),
        Err(e) => (
            StepOutcome {
                kind: step.kind,
                host: step.host.clone(),
                status: StepStatus::Errored,
                exit_code: None,
                duration_secs: 0.0,
                error: Some(e.to_string()),
            },
            e.exit_code(),
        ),
    }
}
