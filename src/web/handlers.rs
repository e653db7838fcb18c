//! Web 路由处理函数
//!
//! 实现目标管理、按需检测和日志查询接口

use super::{ApiResponse, HealthResponse, TargetView, WebAppState};
use crate::error::{CheckError, RegistryError};
use crate::health::CheckOutcome;
use crate::registry::{CheckLogEntry, NewTarget, TargetId};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::error;

/// 日志查询的默认条数
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// 日志查询的最大条数
pub const MAX_LOG_LIMIT: usize = 1000;

/// 处理函数的错误响应
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(id: TargetId) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("监控目标不存在: {id}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::TargetNotFound { id } => Self::not_found(id),
            RegistryError::Invalid(message) => Self::bad_request(message),
            other => {
                error!("注册表操作失败: {}", other);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl From<CheckError> for ApiError {
    fn from(e: CheckError) -> Self {
        match e {
            CheckError::UnknownTarget { id } => Self::not_found(id),
            CheckError::Registry(inner) => inner.into(),
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// 创建或更新目标的请求体
#[derive(Debug, Default, Deserialize)]
pub struct TargetPayload {
    pub name: Option<String>,
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub description: Option<String>,
}

impl TargetPayload {
    /// 校验必填字段并转换为 `NewTarget`
    fn into_new_target(self) -> Result<NewTarget, ApiError> {
        let target = NewTarget {
            name: self.name.unwrap_or_default(),
            endpoint: self.endpoint.unwrap_or_default(),
            token: self.token.unwrap_or_default(),
            description: self.description.filter(|d| !d.trim().is_empty()),
        };
        if target.name.trim().is_empty()
            || target.endpoint.trim().is_empty()
            || target.token.trim().is_empty()
        {
            return Err(ApiError::bad_request("名称、地址和凭证均为必填项"));
        }
        target.validate().map_err(ApiError::bad_request)?;
        Ok(target)
    }
}

/// 日志查询参数
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    #[serde(rename = "apiId")]
    pub api_id: Option<TargetId>,
    pub limit: Option<usize>,
}

/// 进程与调度器状态
pub async fn health(State(state): State<WebAppState>) -> Json<ApiResponse<HealthResponse>> {
    let uptime = chrono::Utc::now() - state.start_time;
    Json(ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        scheduler: state.scheduler.status().await,
        targets: state.registry.status_counts().await,
    }))
}

/// 全部目标及其最新状态
pub async fn list_targets(State(state): State<WebAppState>) -> Json<ApiResponse<Vec<TargetView>>> {
    let targets = state
        .registry
        .list_target_records()
        .await
        .into_iter()
        .map(TargetView::from)
        .collect();
    Json(ApiResponse::success(targets))
}

/// 创建目标
pub async fn create_target(
    State(state): State<WebAppState>,
    Json(payload): Json<TargetPayload>,
) -> Result<(StatusCode, Json<ApiResponse<TargetView>>), ApiError> {
    let new_target = payload.into_new_target()?;
    let target = state.registry.create_target(new_target).await?;

    let record = state
        .registry
        .get_target_record(target.id)
        .await
        .ok_or_else(|| ApiError::not_found(target.id))?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(record.into()))))
}

/// 更新目标
pub async fn update_target(
    State(state): State<WebAppState>,
    Path(id): Path<TargetId>,
    Json(payload): Json<TargetPayload>,
) -> ApiResult<TargetView> {
    if state.registry.get_target_record(id).await.is_none() {
        return Err(ApiError::not_found(id));
    }
    let new_target = payload.into_new_target()?;
    state.registry.update_target(id, new_target).await?;

    let record = state
        .registry
        .get_target_record(id)
        .await
        .ok_or_else(|| ApiError::not_found(id))?;
    Ok(Json(ApiResponse::success(record.into())))
}

/// 删除目标及其检测日志
pub async fn delete_target(
    State(state): State<WebAppState>,
    Path(id): Path<TargetId>,
) -> ApiResult<TargetId> {
    state.registry.delete_target(id).await?;
    Ok(Json(ApiResponse::success(id)))
}

/// 立即检测单个目标
pub async fn check_target(
    State(state): State<WebAppState>,
    Path(id): Path<TargetId>,
) -> ApiResult<CheckOutcome> {
    let outcome = state.scheduler.trigger_single_check(id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// 查询检测日志，最新的在前
pub async fn list_logs(
    State(state): State<WebAppState>,
    Query(query): Query<LogsQuery>,
) -> Json<ApiResponse<Vec<CheckLogEntry>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);
    let logs = state.registry.list_check_logs(query.api_id, limit).await;
    Json(ApiResponse::success(logs))
}
