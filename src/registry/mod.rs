//! 监控目标注册表模块
//!
//! 定义检测引擎依赖的注册表接口，以及目标、最新状态和检测日志的数据结构

pub mod memory;

use crate::error::RegistryError;
use crate::health::{CheckOutcome, TargetStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::InMemoryRegistry;

/// 目标标识
pub type TargetId = i64;

/// 被监控的网关实例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredTarget {
    /// 目标ID
    pub id: TargetId,
    /// 名称
    pub name: String,
    /// 网关基础地址
    pub endpoint: String,
    /// Bearer 凭证
    pub token: String,
    /// 描述
    #[serde(default)]
    pub description: Option<String>,
}

/// 创建或更新目标时提交的字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTarget {
    /// 名称
    pub name: String,
    /// 网关基础地址
    pub endpoint: String,
    /// Bearer 凭证
    pub token: String,
    /// 描述
    #[serde(default)]
    pub description: Option<String>,
}

impl NewTarget {
    /// 校验必填字段
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("名称不能为空".to_string());
        }
        if self.token.trim().is_empty() {
            return Err("凭证不能为空".to_string());
        }
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err("地址不能为空".to_string());
        }
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(format!("地址格式无效: {}", self.endpoint));
        }
        Ok(())
    }
}

/// 目标的最新状态投影，每次检测后覆盖
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestStatus {
    /// 在线状态
    pub status: TargetStatus,
    /// 网关连接状态
    pub connection_status: Option<String>,
    /// 最后检测时间
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// 不可变的检测日志记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckLogEntry {
    /// 日志序号
    pub id: u64,
    /// 所属目标
    pub target_id: TargetId,
    /// 在线状态
    pub status: TargetStatus,
    /// 网关连接状态
    pub connection_status: Option<String>,
    /// 响应体
    pub response_body: Option<serde_json::Value>,
    /// 错误信息
    pub error_message: Option<String>,
    /// 检测时间
    pub checked_at: DateTime<Utc>,
}

impl CheckLogEntry {
    /// 由检测结果构建日志记录
    pub fn from_outcome(id: u64, target_id: TargetId, outcome: &CheckOutcome) -> Self {
        Self {
            id,
            target_id,
            status: outcome.status,
            connection_status: outcome.connection_status.clone(),
            response_body: outcome.response_body.clone(),
            error_message: outcome.error_message.clone(),
            checked_at: outcome.checked_at,
        }
    }
}

/// 注册表trait，检测引擎只通过它读写目标数据
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    /// 列出全部目标（每个检测周期读取一次）
    async fn list_all_targets(&self) -> Result<Vec<MonitoredTarget>, RegistryError>;

    /// 按ID查找目标
    async fn get_target(&self, id: TargetId) -> Result<Option<MonitoredTarget>, RegistryError>;

    /// 覆盖目标的最新状态
    ///
    /// # 参数
    /// * `id` - 目标ID
    /// * `status` - 在线状态
    /// * `checked_at` - 检测时间
    /// * `connection_status` - 网关连接状态
    async fn write_latest_status(
        &self,
        id: TargetId,
        status: TargetStatus,
        checked_at: DateTime<Utc>,
        connection_status: Option<&str>,
    ) -> Result<(), RegistryError>;

    /// 追加一条检测日志
    async fn append_check_log(
        &self,
        target_id: TargetId,
        outcome: &CheckOutcome,
    ) -> Result<(), RegistryError>;
}
