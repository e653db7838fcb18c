//! 连接检测结果数据结构
//!
//! 定义单次探测的结果类型和目标状态枚举

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 目标状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    /// 尚未检测
    #[default]
    Unknown,
    /// 在线
    Online,
    /// 离线
    Offline,
}

impl TargetStatus {
    /// 状态的字符串表示
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Unknown => "unknown",
            TargetStatus::Online => "online",
            TargetStatus::Offline => "offline",
        }
    }

    /// 判断是否在线
    pub fn is_online(&self) -> bool {
        matches!(self, TargetStatus::Online)
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 探测阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStage {
    /// 版本化状态接口 `/api/v1/qr/status`
    Primary,
    /// 基础地址回退探测
    Fallback,
}

/// 单次连接检测结果
///
/// 由探测器创建后不再修改，`status` 在构造时由 `success` 推导。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    /// 是否探测成功
    pub success: bool,
    /// 在线/离线
    pub status: TargetStatus,
    /// 网关上报的连接状态（仅主探测路径提供）
    pub connection_status: Option<String>,
    /// 响应体
    pub response_body: Option<serde_json::Value>,
    /// 错误信息
    pub error_message: Option<String>,
    /// 检测时间
    pub checked_at: DateTime<Utc>,
    /// 最后尝试的探测阶段
    pub stage: ProbeStage,
    /// 整个探测耗时
    #[serde(rename = "responseTimeMs", with = "duration_serde")]
    pub response_time: Duration,
}

impl CheckOutcome {
    /// 创建新的检测结果
    ///
    /// # 参数
    /// * `success` - 是否成功
    /// * `stage` - 最后尝试的探测阶段
    pub fn new(success: bool, stage: ProbeStage) -> Self {
        Self {
            success,
            status: if success {
                TargetStatus::Online
            } else {
                TargetStatus::Offline
            },
            connection_status: None,
            response_body: None,
            error_message: None,
            checked_at: Utc::now(),
            stage,
            response_time: Duration::from_millis(0),
        }
    }

    /// 创建在线结果
    pub fn online(stage: ProbeStage) -> Self {
        Self::new(true, stage)
    }

    /// 创建离线结果
    pub fn offline(stage: ProbeStage, error_message: impl Into<String>) -> Self {
        Self::new(false, stage).with_error(error_message)
    }

    /// 设置连接状态
    pub fn with_connection_status(mut self, connection_status: Option<String>) -> Self {
        self.connection_status = connection_status;
        self
    }

    /// 设置响应体
    pub fn with_response_body(mut self, body: Option<serde_json::Value>) -> Self {
        self.response_body = body;
        self
    }

    /// 设置错误信息
    pub fn with_error(mut self, error_message: impl Into<String>) -> Self {
        self.error_message = Some(error_message.into());
        self
    }

    /// 设置耗时
    pub fn with_response_time(mut self, response_time: Duration) -> Self {
        self.response_time = response_time;
        self
    }

    /// 获取耗时（毫秒）
    pub fn response_time_ms(&self) -> u64 {
        self.response_time.as_millis() as u64
    }
}

/// Duration序列化模块
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_derived_from_success() {
        let online = CheckOutcome::online(ProbeStage::Primary);
        assert!(online.success);
        assert_eq!(online.status, TargetStatus::Online);

        let offline = CheckOutcome::offline(ProbeStage::Fallback, "HTTP 500 Internal Server Error");
        assert!(!offline.success);
        assert_eq!(offline.status, TargetStatus::Offline);
        assert_eq!(
            offline.error_message.as_deref(),
            Some("HTTP 500 Internal Server Error")
        );
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TargetStatus::Unknown.to_string(), "unknown");
        assert_eq!(TargetStatus::Online.to_string(), "online");
        assert_eq!(TargetStatus::Offline.to_string(), "offline");
        assert_eq!(TargetStatus::default(), TargetStatus::Unknown);
    }

    #[test]
    fn test_outcome_wire_shape() {
        let outcome = CheckOutcome::online(ProbeStage::Primary)
            .with_connection_status(Some("connected".to_string()))
            .with_response_body(Some(serde_json::json!({"success": true})))
            .with_response_time(Duration::from_millis(250));

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "online");
        assert_eq!(json["connectionStatus"], "connected");
        assert_eq!(json["responseTimeMs"], 250);
        assert_eq!(json["stage"], "primary");
        assert!(json["errorMessage"].is_null());
        assert!(json.get("checkedAt").is_some());

        let back: CheckOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }
}
