//! Gateway Vitals - WhatsApp 网关连接状态监控
//!
//! 周期性探测一组 WhatsApp 网关实例，记录在线/离线状态和检测历史：
//! - 版本化状态接口探测，404 时回退到基础地址
//! - 有界并发的检测周期
//! - 内存注册表与 JSON 快照持久化
//! - JSON Web API 与命令行工具

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod registry;
pub mod web;

// 重新导出主要类型
pub use config::{Config, GlobalConfig, WebConfig};
pub use error::GatewayVitalsError;
pub use health::{CheckOutcome, CheckScheduler, HttpProbe, Prober, TargetStatus};
pub use registry::{InMemoryRegistry, MonitoredTarget, TargetRegistry};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
