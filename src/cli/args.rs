//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::config::{Config, GlobalConfig, WebConfig};
use crate::logging::LogConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Gateway Vitals - WhatsApp 网关连接状态监控
#[derive(Parser, Debug, Clone)]
#[command(
    name = "gateway-vitals",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "GATEWAY_VITALS_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// 日志级别
    #[arg(
        short,
        long,
        value_enum,
        help = "日志级别（默认取配置文件中的 log_level）",
        env = "GATEWAY_VITALS_LOG_LEVEL",
        global = true
    )]
    pub log_level: Option<LogLevel>,

    /// 以JSON格式输出日志
    #[arg(long, help = "以JSON格式输出日志", global = true)]
    pub json_logs: bool,

    /// 日志文件路径
    #[arg(
        long,
        value_name = "FILE",
        help = "日志文件路径（默认取配置文件中的 log_file）",
        env = "GATEWAY_VITALS_LOG_FILE",
        global = true
    )]
    pub log_file: Option<PathBuf>,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 在前台启动周期检测（以及 Web API）
    Start {
        /// 检测间隔（分钟）
        #[arg(
            short,
            long,
            value_name = "MINUTES",
            help = "检测间隔（分钟）",
            env = "CHECK_INTERVAL"
        )]
        interval: Option<u64>,

        /// 最大并发检测数
        #[arg(long, value_name = "COUNT", help = "最大并发检测数")]
        max_concurrent: Option<usize>,

        /// Web API 端口
        #[arg(short, long, value_name = "PORT", help = "Web API 端口", env = "PORT")]
        port: Option<u16>,

        /// 注册表快照文件
        #[arg(long, value_name = "FILE", help = "注册表快照文件")]
        state_file: Option<PathBuf>,
    },

    /// 对配置文件中的目标执行一次性检测（不写入注册表）
    Check {
        /// 目标名称（可选，不指定则检测所有目标）
        #[arg(value_name = "TARGET", help = "目标名称")]
        target: Option<String>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 初始化配置文件
    Init {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径", default_value = "config.toml")]
        config_path: PathBuf,

        /// 是否覆盖现有文件
        #[arg(short, long, help = "覆盖现有文件")]
        force: bool,

        /// 配置模板类型
        #[arg(short, long, value_enum, default_value = "basic", help = "配置模板类型")]
        template: ConfigTemplate,
    },

    /// 验证配置文件
    Validate {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径")]
        config_path: Option<PathBuf>,

        /// 是否显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
    /// 表格格式
    Table,
}

/// 配置模板类型
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum ConfigTemplate {
    /// 基础模板
    Basic,
    /// 最小模板
    Minimal,
}

impl Args {
    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::loader::get_default_config_path)
    }

    /// 将 `start` 子命令的参数覆盖到配置上
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Commands::Start {
            interval,
            max_concurrent,
            port,
            state_file,
        } = &self.command
        {
            if let Some(interval) = interval {
                config.global.check_interval_minutes = *interval;
            }
            if let Some(max_concurrent) = max_concurrent {
                config.global.max_concurrent_checks = *max_concurrent;
            }
            if let Some(port) = port {
                config
                    .global
                    .web
                    .get_or_insert_with(WebConfig::default)
                    .port = *port;
            }
            if let Some(state_file) = state_file {
                config.global.state_file = Some(state_file.clone());
            }
        }

        if let Some(level) = self.log_level {
            config.global.log_level = level.to_string();
        }
        if let Some(log_file) = &self.log_file {
            config.global.log_file = Some(log_file.clone());
        }
    }

    /// 生成日志配置，命令行参数优先于配置文件
    pub fn log_config(&self, global: Option<&GlobalConfig>) -> LogConfig {
        let mut log_config = match (self.log_level, global) {
            (Some(level), _) => LogConfig {
                level: level.into(),
                ..Default::default()
            },
            (None, Some(global)) => LogConfig::with_level_str(&global.log_level),
            (None, None) => LogConfig::default(),
        };

        log_config.file_path = self
            .log_file
            .clone()
            .or_else(|| global.and_then(|g| g.log_file.clone()));
        log_config.json_format = self.json_logs;
        log_config
    }
}
