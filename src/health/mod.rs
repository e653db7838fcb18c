//! 连接检测模块
//!
//! 提供网关探测、检测结果和周期调度功能

pub mod probe;
pub mod result;
pub mod scheduler;

// 重新导出主要类型
pub use probe::{HttpProbe, Prober};
pub use result::{CheckOutcome, ProbeStage, TargetStatus};
pub use scheduler::{CheckScheduler, CycleReport, SchedulerConfig, SchedulerStatus};
