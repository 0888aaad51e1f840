//! 运行器主入口
//!
//! 退出码等于远程测试步骤的退出码

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use stackable_test_runner::{
    config::AppConfig, execution::shell_exit_byte, telemetry, Plan, StackableDispatcher, TestRun,
};

/// Run the agent integration tests on the remote test driver
#[derive(Parser, Debug)]
#[command(name = "stackable-test-runner")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Print the planned remote commands without dispatching them
    #[arg(long)]
    dry_run: bool,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // 加载 .env 文件（本地调试）
    dotenv::dotenv().ok();

    // 1. 加载配置
    let mut config = AppConfig::from_env().map_err(|e| {
        eprintln!("{}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;
    if cli.report.is_some() {
        config.report.path = cli.report;
    }

    // 2. 初始化日志
    telemetry::init_telemetry(&config.logging);

    // 3. 生成计划
    let plan = Plan::from_config(&config);

    if cli.dry_run {
        for (index, step) in plan.steps().iter().enumerate() {
            println!("{}. [{}] {}: {}", index + 1, step.kind, step.host, step.command);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let dispatcher = StackableDispatcher::from_config(&config.dispatch);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        script = %dispatcher.script(),
        key_path = %dispatcher.key_path().display(),
        test_driver = %config.hosts.test_driver,
        main = %config.hosts.main,
        branch = %config.test_repo.branch,
        "Test runner starting"
    );

    // 4. 顺序执行
    let run = TestRun::new(dispatcher);
    let report = run.run(&plan).await;

    if let Some(path) = &config.report.path {
        if let Err(e) = report.write_json(path) {
            tracing::warn!(error = %e, "Failed to write run report");
        }
    }

    Ok(ExitCode::from(shell_exit_byte(report.exit_code)))
}
