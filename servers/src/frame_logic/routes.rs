//! # HTTP Surface
//!
//! One axum router serves both populations: the polling display clients
//! (`POST /api/sync`) and the admin console (photos, settings, clients,
//! power). Every handler is a thin shell over the shared stores; all
//! recomputation happens synchronously inside the triggering request and
//! there are no background sweep tasks.

use crate::frame_logic::config::Config;
use crate::frame_logic::model::{MessageResponse, PowerRequest};
use crate::frame_logic::state::AppState;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use axum_server::tls_rustls::RustlsConfig;
use lib_frame::{
    InventoryError, NewPhoto, Photo, PhotoStats, PollRequest, PollResponse, RegistryError,
    Settings, SettingsError, SettingsUpdate, StoreError,
};
use serde_json::json;
use std::net::SocketAddr;
use tokio::sync::broadcast;

/// # Application Error
///
/// Wraps the domain errors surfaced by the stores and maps each to an HTTP
/// status code and a JSON error body.
#[derive(Debug)]
pub enum AppError {
    Settings(SettingsError),
    Registry(RegistryError),
    Inventory(InventoryError),
    Store(StoreError),
}

impl From<SettingsError> for AppError {
    fn from(e: SettingsError) -> Self {
        AppError::Settings(e)
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        AppError::Registry(e)
    }
}

impl From<InventoryError> for AppError {
    fn from(e: InventoryError) -> Self {
        AppError::Inventory(e)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_json) = match &self {
            AppError::Settings(SettingsError::Validation { field, reason }) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error_type": "ValidationError",
                    "field": field,
                    "message": reason
                }),
            ),
            AppError::Registry(RegistryError::UnknownClient(client_id)) => (
                StatusCode::NOT_FOUND,
                json!({
                    "error_type": "UnknownClientError",
                    "client_id": client_id,
                    "message": "client has never polled this server"
                }),
            ),
            AppError::Inventory(InventoryError::UnknownPhoto(id)) => (
                StatusCode::NOT_FOUND,
                json!({
                    "error_type": "UnknownPhotoError",
                    "photo_id": id,
                    "message": "photo not found"
                }),
            ),
            AppError::Inventory(InventoryError::NotPortrait(id)) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error_type": "NotPortraitError",
                    "photo_id": id,
                    "message": "only portrait photos can be paired"
                }),
            ),
            AppError::Inventory(InventoryError::PairingInconsistency { .. }) => {
                log::error!("Pairing recompute aborted: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error_type": "PairingInconsistencyError",
                        "message": self.to_string()
                    }),
                )
            }
            AppError::Settings(SettingsError::Store(_))
            | AppError::Registry(RegistryError::Store(_))
            | AppError::Inventory(InventoryError::Store(_))
            | AppError::Store(_) => {
                log::error!("Snapshot store failure: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error_type": "StoreError",
                        "message": "failed to persist or load server state"
                    }),
                )
            }
        };
        (status, Json(error_json)).into_response()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Settings(e) => write!(f, "Settings error: {}", e),
            AppError::Registry(e) => write!(f, "Registry error: {}", e),
            AppError::Inventory(e) => write!(f, "Inventory error: {}", e),
            AppError::Store(e) => write!(f, "Store error: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Settings(e) => Some(e),
            AppError::Registry(e) => Some(e),
            AppError::Inventory(e) => Some(e),
            AppError::Store(e) => Some(e),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sync", post(sync_handler))
        .route("/api/photos", get(list_photos_handler).post(register_photo_handler))
        .route("/api/photos/{id}", delete(delete_photo_handler))
        .route("/api/photos/{id}/unpair", post(unpair_handler))
        .route("/api/photos/{a}/pair/{b}", post(pair_handler))
        .route("/api/config", get(get_config_handler).post(update_config_handler))
        .route("/api/clients", get(clients_handler))
        .route("/api/client/{id}/power", post(power_handler))
        .route("/api/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

pub async fn run(config: Config, state: AppState, mut shutdown: broadcast::Receiver<()>) {
    let app = router(state);

    let port = config.port.unwrap_or(5000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    log::info!("Frame server listening on {}", addr);

    if let (Some(cert_path), Some(key_path)) = (config.tls_cert_path, config.tls_key_path) {
        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .expect("Failed to load TLS configuration");

        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
            .unwrap();
    } else {
        let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.recv().await.ok();
                log::info!("Frame server shutting down.");
            })
            .await
            .unwrap();
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// The poll endpoint. Heartbeat, settings, manifest and command handoff
/// happen inside [`SyncProtocol::poll`]; each poll is independent and a
/// failure here never touches another client's state.
///
/// [`SyncProtocol::poll`]: lib_frame::SyncProtocol::poll
async fn sync_handler(
    State(state): State<AppState>,
    Json(request): Json<PollRequest>,
) -> Result<Json<PollResponse>, AppError> {
    let response = state.protocol.poll(&request)?;
    Ok(Json(response))
}

async fn list_photos_handler(State(state): State<AppState>) -> Json<Vec<Photo>> {
    Json(state.inventory.all_photos())
}

/// Registers metadata for a photo the upload collaborator has stored. The
/// binary itself never passes through this server.
async fn register_photo_handler(
    State(state): State<AppState>,
    Json(new): Json<NewPhoto>,
) -> Result<(StatusCode, Json<Photo>), AppError> {
    let photo = state.inventory.add_photo(new)?;
    state.reconcile_if_enabled()?;
    // The stored record may have been paired by the reconciliation.
    let photo = state.inventory.photo(photo.id).unwrap_or(photo);
    Ok((StatusCode::CREATED, Json(photo)))
}

async fn delete_photo_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    state.inventory.delete_photo(id)?;
    state.reconcile_if_enabled()?;
    Ok(Json(MessageResponse::new("Photo deleted successfully")))
}

async fn unpair_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    let unpaired = state.inventory.unpair_photo(id)?;
    let message = if unpaired {
        "Photo unpaired successfully"
    } else {
        "Photo was not paired"
    };
    Ok(Json(MessageResponse::new(message)))
}

async fn pair_handler(
    State(state): State<AppState>,
    Path((a, b)): Path<(i64, i64)>,
) -> Result<Json<MessageResponse>, AppError> {
    state.inventory.pair_photos(a, b)?;
    Ok(Json(MessageResponse::new("Photos paired successfully")))
}

async fn get_config_handler(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.snapshot())
}

/// Validated settings update. A pairing toggle dissolves or recomputes the
/// pairs in the same request; a sort-mode change restarts the display
/// cycle.
async fn update_config_handler(
    State(state): State<AppState>,
    Json(delta): Json<SettingsUpdate>,
) -> Result<Json<Settings>, AppError> {
    let change = state.settings.update(delta)?;
    if change.pairing_toggled() {
        if change.current.enable_portrait_pairs {
            state.inventory.reconcile_pairs()?;
        } else {
            state.inventory.dissolve_pairs()?;
        }
    }
    if change.sort_mode_changed() {
        state.protocol.restart_cycle();
    }
    Ok(Json(change.current))
}

async fn clients_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.protocol.client_report())
}

/// Drops a power command into the client's single-slot mailbox. Delivery
/// rides on the next poll; an unconsumed previous command is overwritten.
async fn power_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PowerRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.registry.enqueue_command(&id, request.action)?;
    Ok(Json(MessageResponse::new(format!(
        "{:?} command queued for next poll",
        request.action
    ))))
}

async fn stats_handler(State(state): State<AppState>) -> Json<PhotoStats> {
    Json(state.inventory.stats())
}
