//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Gateway Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum GatewayVitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 注册表相关错误
    #[error("注册表错误: {0}")]
    Registry(#[from] RegistryError),

    /// 连接检测相关错误
    #[error("连接检测错误: {0}")]
    Check(#[from] CheckError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 注册表错误类型
#[derive(Error, Debug)]
pub enum RegistryError {
    /// 目标不存在
    #[error("监控目标不存在: {id}")]
    TargetNotFound { id: i64 },

    /// 目标字段不合法
    #[error("目标信息无效: {0}")]
    Invalid(String),

    /// 存储读写失败
    #[error("存储操作失败: {0}")]
    Storage(String),

    /// 快照文件读写失败
    #[error("快照文件操作失败: {path}: {reason}")]
    Snapshot { path: String, reason: String },
}

/// 连接检测错误类型
#[derive(Error, Debug)]
pub enum CheckError {
    /// 按需检测时目标不存在
    #[error("监控目标不存在: {id}")]
    UnknownTarget { id: i64 },

    /// 目标地址不满足探测前提
    #[error("无效的目标地址 '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// HTTP客户端构建失败
    #[error("HTTP客户端错误: {0}")]
    Client(#[from] reqwest::Error),

    /// 读取注册表失败
    #[error("读取注册表失败: {0}")]
    Registry(#[from] RegistryError),
}

impl CheckError {
    /// 是否为目标不存在
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CheckError::UnknownTarget { .. }
                | CheckError::Registry(RegistryError::TargetNotFound { .. })
        )
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, GatewayVitalsError>;
