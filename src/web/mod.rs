//! Web API 模块
//!
//! 提供目标管理、按需检测和检测日志查询的 JSON 接口

use crate::health::{CheckScheduler, SchedulerStatus, TargetStatus};
use crate::registry::memory::{StatusCounts, TargetRecord};
use crate::registry::{InMemoryRegistry, TargetId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

pub mod handlers;
pub mod server;

pub use server::{create_router, WebServer};

/// Web 应用共享状态
#[derive(Clone)]
pub struct WebAppState {
    /// 注册表
    pub registry: Arc<InMemoryRegistry>,
    /// 检测调度器
    pub scheduler: Arc<CheckScheduler>,
    /// 启动时间
    pub start_time: DateTime<Utc>,
}

impl WebAppState {
    /// 创建新的 Web 应用状态
    pub fn new(registry: Arc<InMemoryRegistry>, scheduler: Arc<CheckScheduler>) -> Self {
        Self {
            registry,
            scheduler,
            start_time: Utc::now(),
        }
    }
}

/// API响应包装器
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// 是否成功
    pub success: bool,
    /// 响应数据
    pub data: Option<T>,
    /// 错误信息
    pub error: Option<String>,
    /// 时间戳
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// 创建错误响应
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

/// 对外展示的目标信息，凭证已脱敏
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetView {
    pub id: TargetId,
    pub name: String,
    pub endpoint: String,
    pub token: String,
    pub description: Option<String>,
    pub status: TargetStatus,
    pub connection_status: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TargetRecord> for TargetView {
    fn from(record: TargetRecord) -> Self {
        Self {
            id: record.target.id,
            name: record.target.name,
            endpoint: record.target.endpoint,
            token: mask_token(&record.target.token),
            description: record.target.description,
            status: record.latest.status,
            connection_status: record.latest.connection_status,
            last_checked_at: record.latest.last_checked_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// 健康检查响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 版本信息
    pub version: String,
    /// 运行时间
    pub uptime_seconds: u64,
    /// 调度器状态
    pub scheduler: SchedulerStatus,
    /// 目标状态分布
    pub targets: StatusCounts,
}

/// 凭证脱敏，只保留末尾4位
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}
