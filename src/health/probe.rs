//! 网关连接探测器实现
//!
//! 对单个网关执行两阶段HTTP探测：先请求版本化状态接口，仅当其返回404时
//! 才回退到基础地址

use crate::error::CheckError;
use crate::health::result::{CheckOutcome, ProbeStage};
use crate::registry::MonitoredTarget;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// 网关状态接口路径
pub const STATUS_PATH: &str = "/api/v1/qr/status";

/// 主探测超时时间
pub const PRIMARY_TIMEOUT: Duration = Duration::from_secs(10);

/// 回退探测超时时间
pub const FALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// 探测器trait，定义单目标探测接口
#[async_trait]
pub trait Prober: Send + Sync {
    /// 探测单个目标
    ///
    /// 网络与HTTP层面的失败都折叠进离线结果；只有目标本身不满足探测前提
    /// （如地址为空）时才返回错误。
    ///
    /// # 参数
    /// * `target` - 目标快照
    ///
    /// # 返回
    /// * `Result<CheckOutcome, CheckError>` - 检测结果
    async fn probe(&self, target: &MonitoredTarget) -> Result<CheckOutcome, CheckError>;
}

/// 单次请求的结果
#[derive(Debug)]
enum Attempt {
    /// 收到HTTP响应
    Response { status: StatusCode, body: String },
    /// 未收到响应（超时、DNS、连接失败等）
    Failed(String),
}

/// HTTP探测器实现
#[derive(Debug, Clone)]
pub struct HttpProbe {
    /// HTTP客户端
    client: Client,
    /// 主探测超时
    primary_timeout: Duration,
    /// 回退探测超时
    fallback_timeout: Duration,
}

impl HttpProbe {
    /// 使用默认超时（10秒/5秒）创建探测器
    pub fn new() -> Result<Self, CheckError> {
        Self::with_timeouts(PRIMARY_TIMEOUT, FALLBACK_TIMEOUT)
    }

    /// 使用指定超时创建探测器
    ///
    /// # 参数
    /// * `primary_timeout` - 主探测超时
    /// * `fallback_timeout` - 回退探测超时
    pub fn with_timeouts(
        primary_timeout: Duration,
        fallback_timeout: Duration,
    ) -> Result<Self, CheckError> {
        let client = Client::builder()
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()?;

        Ok(Self {
            client,
            primary_timeout,
            fallback_timeout,
        })
    }

    /// 规范化基础地址：去掉末尾斜杠并校验格式
    pub fn normalize_base_url(endpoint: &str) -> Result<String, CheckError> {
        let invalid = |reason: &str| CheckError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };

        let base = endpoint.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(invalid("地址为空"));
        }

        let url = Url::parse(base).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("仅支持 http/https"));
        }
        if url.host_str().is_none() {
            return Err(invalid("缺少主机名"));
        }

        Ok(base.to_string())
    }

    /// 发送带Bearer凭证的GET请求（连接、响应头和响应体都受超时约束）
    async fn get(&self, url: &str, token: &str, timeout_duration: Duration) -> Attempt {
        let request = self.client.get(url).bearer_auth(token);

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = if status.is_success() {
                response.text().await?
            } else {
                String::new()
            };
            Ok::<_, reqwest::Error>((status, body))
        };

        match timeout(timeout_duration, exchange).await {
            Ok(Ok((status, body))) => Attempt::Response { status, body },
            Ok(Err(e)) => Attempt::Failed(format_request_error(&e)),
            Err(_) => Attempt::Failed("Request timeout".to_string()),
        }
    }

    /// 回退探测：仅在主探测返回404后调用
    async fn probe_fallback(&self, base: &str, target: &MonitoredTarget) -> CheckOutcome {
        debug!(target_id = target.id, url = %base, "状态接口返回404，回退到基础地址");

        match self.get(base, &target.token, self.fallback_timeout).await {
            Attempt::Response { status, .. } if status.is_success() => {
                CheckOutcome::online(ProbeStage::Fallback)
            }
            Attempt::Response { status, .. } => {
                CheckOutcome::offline(ProbeStage::Fallback, format_status(status))
            }
            Attempt::Failed(message) => CheckOutcome::offline(ProbeStage::Fallback, message),
        }
    }
}

#[async_trait]
impl Prober for HttpProbe {
    async fn probe(&self, target: &MonitoredTarget) -> Result<CheckOutcome, CheckError> {
        let base = Self::normalize_base_url(&target.endpoint)?;
        let status_url = format!("{base}{STATUS_PATH}");
        let start_time = Instant::now();

        debug!(target_id = target.id, url = %status_url, "开始探测网关状态接口");

        let outcome = match self.get(&status_url, &target.token, self.primary_timeout).await {
            Attempt::Response { status, body } if status.is_success() => {
                let response_body = parse_body(&body);
                let connection_status = response_body
                    .as_ref()
                    .and_then(extract_connection_status);
                CheckOutcome::online(ProbeStage::Primary)
                    .with_connection_status(connection_status)
                    .with_response_body(response_body)
            }
            Attempt::Response { status, .. } if status == StatusCode::NOT_FOUND => {
                self.probe_fallback(&base, target).await
            }
            Attempt::Response { status, .. } => {
                CheckOutcome::offline(ProbeStage::Primary, format_status(status))
            }
            Attempt::Failed(message) => CheckOutcome::offline(ProbeStage::Primary, message),
        };

        Ok(outcome.with_response_time(start_time.elapsed()))
    }
}

/// 解析响应体：能解析为JSON则保留结构，否则保留原文
fn parse_body(body: &str) -> Option<Value> {
    if body.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
}

/// 从 `{success, data: {connectionStatus}}` 形状的响应中提取连接状态
///
/// 形状不符时返回 `None`，不影响探测结果。
pub fn extract_connection_status(body: &Value) -> Option<String> {
    if !body.get("success").is_some_and(is_truthy) {
        return None;
    }
    body.get("data")?
        .get("connectionStatus")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn format_status(status: StatusCode) -> String {
    format!(
        "HTTP {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    )
}

/// 格式化请求错误信息，使其更加清晰易读
fn format_request_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timeout".to_string()
    } else if is_dns_error(error) {
        // 连接阶段的解析失败同样带有 is_connect 标记
        "DNS resolution failed".to_string()
    } else if error.is_connect() {
        "Connection refused".to_string()
    } else if error.is_request() {
        "Invalid request".to_string()
    } else if error.is_decode() || error.is_body() {
        "Response decode error".to_string()
    } else {
        let error_str = error.to_string();
        if error_str.contains("certificate")
            || error_str.contains("tls")
            || error_str.contains("ssl")
        {
            "SSL/TLS certificate error".to_string()
        } else {
            format!("Request failed: {error_str}")
        }
    }
}

/// 沿错误链查找域名解析失败
fn is_dns_error(error: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(error);
    while let Some(err) = source {
        let message = err.to_string().to_lowercase();
        if message.contains("dns error")
            || message.contains("failed to lookup address")
            || message.contains("name resolution")
            || message.contains("name or service not known")
        {
            return true;
        }
        source = err.source();
    }
    false
}
