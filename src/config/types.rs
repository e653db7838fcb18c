//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::registry::NewTarget;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 主配置结构，包含全局配置和初始目标列表
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    pub global: GlobalConfig,
    /// 初始目标列表，仅在注册表为空时导入
    #[serde(default)]
    pub targets: Vec<NewTarget>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 检测间隔（分钟）
    #[serde(default = "default_check_interval")]
    pub check_interval_minutes: u64,
    /// 最大并发检测数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_checks: usize,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 日志文件（不设置时只输出到控制台）
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// 注册表快照文件
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    /// 检测日志最大保留条数
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,
    /// Web 服务器配置
    pub web: Option<WebConfig>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: default_check_interval(),
            max_concurrent_checks: default_max_concurrent(),
            log_level: default_log_level(),
            log_file: None,
            state_file: None,
            max_log_entries: default_max_log_entries(),
            web: None,
        }
    }
}

/// Web 服务器配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebConfig {
    /// 是否启用 Web API
    #[serde(default = "default_web_enabled")]
    pub enabled: bool,
    /// 绑定地址
    #[serde(default = "default_web_bind_address")]
    pub bind_address: String,
    /// 监听端口
    #[serde(default = "default_web_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: default_web_enabled(),
            bind_address: default_web_bind_address(),
            port: default_web_port(),
        }
    }
}

/// 检测间隔上限（分钟），即一周
pub const MAX_CHECK_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

// 默认值函数
fn default_check_interval() -> u64 {
    crate::health::scheduler::DEFAULT_CHECK_INTERVAL_MINUTES
}
fn default_max_concurrent() -> usize {
    crate::health::scheduler::DEFAULT_MAX_CONCURRENT_CHECKS
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_log_entries() -> usize {
    crate::registry::memory::DEFAULT_MAX_LOG_ENTRIES
}
fn default_web_enabled() -> bool {
    true
}
fn default_web_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_web_port() -> u16 {
    3000
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    let global = &config.global;

    if global.check_interval_minutes == 0 {
        return Err("检测间隔不能为0".to_string());
    }
    if global.check_interval_minutes > MAX_CHECK_INTERVAL_MINUTES {
        return Err(format!(
            "检测间隔过大: {}分钟，最大 {} 分钟",
            global.check_interval_minutes, MAX_CHECK_INTERVAL_MINUTES
        ));
    }

    if global.max_concurrent_checks == 0 {
        return Err("最大并发检测数不能为0".to_string());
    }

    if global.max_log_entries == 0 {
        return Err("检测日志保留条数不能为0".to_string());
    }

    let valid_log_levels = ["debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            global.log_level, valid_log_levels
        ));
    }

    if let Some(ref web_config) = global.web {
        if web_config.enabled {
            if web_config.port == 0 {
                return Err("无效的Web服务器端口: 0，端口不能为0".to_string());
            }
            if web_config.bind_address.trim().is_empty() {
                return Err("Web服务器绑定地址不能为空".to_string());
            }
        }
    }

    // 目标列表可以为空，运行时通过API添加
    for (index, target) in config.targets.iter().enumerate() {
        target
            .validate()
            .map_err(|e| format!("第 {} 个目标 ({}) 配置无效: {}", index + 1, target.name, e))?;
    }

    Ok(())
}
