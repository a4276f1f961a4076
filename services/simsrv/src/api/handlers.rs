//! Admin API handlers
//!
//! Thin pass-throughs to the device manager. Native error conditions map to
//! HTTP statuses; validation failures carry the full violation list.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use common::api_types::{ErrorResponse, SuccessResponse};

use super::dto::{
    CreateDeviceRequest, HealthResponse, InstantiateRequest, LifecycleResponse,
    PointValueResponse,
};
use super::AppState;
use crate::core::device::DeviceConfig;
use crate::error::SimSrvError;
use crate::storage::DeviceKind;

/// Adapter mapping service errors onto HTTP responses
pub struct ApiError(SimSrvError);

impl From<SimSrvError> for ApiError {
    fn from(err: SimSrvError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, errors) = match &self.0 {
            SimSrvError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation",
                errors.clone(),
            ),
            SimSrvError::DuplicateName(_) => {
                (StatusCode::CONFLICT, "duplicate_name", vec![self.0.to_string()])
            },
            SimSrvError::DeviceRunning(_) => {
                (StatusCode::CONFLICT, "device_running", vec![self.0.to_string()])
            },
            SimSrvError::DeviceNotRunning(_) => (
                StatusCode::CONFLICT,
                "device_not_running",
                vec![self.0.to_string()],
            ),
            SimSrvError::PortInUse(_) => {
                (StatusCode::CONFLICT, "port_in_use", vec![self.0.to_string()])
            },
            SimSrvError::TemplateNotStartable(_) => (
                StatusCode::CONFLICT,
                "template_not_startable",
                vec![self.0.to_string()],
            ),
            SimSrvError::DeviceNotFound(_)
            | SimSrvError::UnitNotFound(_)
            | SimSrvError::PointNotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found", vec![self.0.to_string()])
            },
            SimSrvError::Parse(_) => {
                (StatusCode::BAD_REQUEST, "parse", vec![self.0.to_string()])
            },
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                vec![self.0.to_string()],
            ),
        };

        (status, Json(ErrorResponse::with_errors(kind, errors))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let devices = state.manager.list(DeviceKind::Device).await;
    let running = devices.iter().filter(|d| d.running).count();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        devices: devices.len(),
        running,
    })
}

// ---- devices -------------------------------------------------------------

pub async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    Json(SuccessResponse::new(
        state.manager.list(DeviceKind::Device).await,
    ))
}

pub async fn create_device(
    State(state): State<AppState>,
    Json(req): Json<CreateDeviceRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .manager
        .create(DeviceKind::Device, &req.file_name, req.config)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::new(req.file_name)),
    ))
}

pub async fn get_device(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<SuccessResponse<DeviceConfig>>> {
    let config = state.manager.get_config(DeviceKind::Device, &name).await?;
    Ok(Json(SuccessResponse::new(config)))
}

pub async fn update_device(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(config): Json<DeviceConfig>,
) -> ApiResult<Json<SuccessResponse<String>>> {
    state
        .manager
        .update(DeviceKind::Device, &name, config)
        .await?;
    Ok(Json(SuccessResponse::new(name)))
}

pub async fn delete_device(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.manager.delete(DeviceKind::Device, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start_device(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<SuccessResponse<LifecycleResponse>>> {
    state.manager.start(&name).await?;
    Ok(Json(SuccessResponse::new(LifecycleResponse {
        file_name: name,
        running: true,
    })))
}

pub async fn stop_device(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<SuccessResponse<LifecycleResponse>>> {
    state.manager.stop(&name).await?;
    Ok(Json(SuccessResponse::new(LifecycleResponse {
        file_name: name,
        running: false,
    })))
}

pub async fn device_logs(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let logs = state.manager.logs(&name).await?;
    Ok(Json(SuccessResponse::new(logs)))
}

pub async fn device_clients(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let clients = state.manager.clients(&name).await?;
    Ok(Json(SuccessResponse::new(clients)))
}

pub async fn point_value(
    State(state): State<AppState>,
    Path((name, unit_id, point_id)): Path<(String, u8, String)>,
) -> ApiResult<Json<SuccessResponse<PointValueResponse>>> {
    let value = state.manager.point_value(&name, unit_id, &point_id).await?;
    Ok(Json(SuccessResponse::new(PointValueResponse {
        unit_id,
        data_type: value.data_type().as_str().to_string(),
        value: value.to_json(),
        point_id,
    })))
}

// ---- templates -----------------------------------------------------------

pub async fn list_templates(State(state): State<AppState>) -> impl IntoResponse {
    Json(SuccessResponse::new(
        state.manager.list(DeviceKind::Template).await,
    ))
}

pub async fn create_template(
    State(state): State<AppState>,
    Json(req): Json<CreateDeviceRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .manager
        .create(DeviceKind::Template, &req.file_name, req.config)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::new(req.file_name)),
    ))
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<SuccessResponse<DeviceConfig>>> {
    let config = state.manager.get_config(DeviceKind::Template, &name).await?;
    Ok(Json(SuccessResponse::new(config)))
}

pub async fn update_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(config): Json<DeviceConfig>,
) -> ApiResult<Json<SuccessResponse<String>>> {
    state
        .manager
        .update(DeviceKind::Template, &name, config)
        .await?;
    Ok(Json(SuccessResponse::new(name)))
}

pub async fn delete_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.manager.delete(DeviceKind::Template, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn instantiate_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<InstantiateRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .manager
        .instantiate_template(&name, &req.file_name)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::new(req.file_name)),
    ))
}
