//! 远程集成测试运行器
//! 通过派发脚本在测试节点上准备环境、执行测试并收集服务日志

pub mod config;
pub mod dispatch;
pub mod error;
pub mod execution;
pub mod pipeline;
pub mod plan;
pub mod report;
pub mod telemetry;

pub use dispatch::{OutputSink, RemoteDispatcher, StackableDispatcher};
pub use error::{RunnerError, RunnerResult};
pub use pipeline::TestRun;
pub use plan::{Plan, Step, StepKind};
pub use report::RunReport;
