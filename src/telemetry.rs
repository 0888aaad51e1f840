//! 日志与指标
//! 初始化结构化日志，记录步骤级指标

use crate::config::LoggingConfig;
use crate::report::StepOutcome;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// 初始化日志系统
///
/// 日志写到 stderr，stdout 留给远程命令的输出
pub fn init_telemetry(config: &LoggingConfig) {
    // 从环境变量构建过滤器
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    // 根据配置选择日志格式
    let log_layer = match config.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        "pretty" => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
    };

    // 初始化 subscriber
    tracing_subscriber::registry()
        .with(env_filter)
        .with(log_layer)
        .init();

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = %config.format,
        "Telemetry initialized"
    );
}

/// 记录单个步骤的指标
///
/// 未安装 recorder 时为空操作
pub fn record_step(outcome: &StepOutcome) {
    let step = outcome.kind.as_str();
    let status = outcome.status.as_str();

    metrics::counter!("runner_steps_total", "step" => step, "status" => status).increment(1);
    metrics::histogram!("runner_step_duration_seconds", "step" => step)
        .record(outcome.duration_secs);
}
