use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    detection::NewDetection,
    error::{AppError, UploadError},
    model::{interpret, Classifier, Interpretation},
    storage::DetectionStore,
    upload::{content_type_for, sanitize_filename, validate_filename, UploadDir},
    views,
};

const IMAGE_FIELD: &str = "image";

pub struct AppState {
    pub store: DetectionStore,
    pub classifier: Arc<dyn Classifier>,
    pub uploads: UploadDir,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub prediction: String,
    pub confidence: f64,
    pub image_url: String,
}

pub fn router(state: Arc<AppState>, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/predict", post(predict_handler))
        .route("/history", get(history_handler))
        .route("/delete/:id", post(delete_handler))
        .route("/uploads/:filename", get(upload_handler))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(state)
        .route("/health", get(health_check))
}

async fn index_handler() -> Html<String> {
    Html(views::index_page())
}

/// Pulls the `image` field out of the form as `(filename, bytes)`.
async fn read_image_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(Option<String>, Vec<u8>), UploadError> {
    let mut multipart = multipart.map_err(|_| UploadError::MissingFile)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::Multipart(err.to_string()))?
    {
        if field.name() == Some(IMAGE_FIELD) {
            let filename = field.file_name().map(str::to_owned);
            let bytes = field
                .bytes()
                .await
                .map_err(|err| UploadError::Multipart(err.to_string()))?;
            return Ok((filename, bytes.to_vec()));
        }
    }

    Err(UploadError::MissingFile)
}

async fn predict_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, AppError> {
    let (filename, bytes) = read_image_field(multipart).await?;
    let filename = validate_filename(filename.as_deref(), state.uploads.allowed_extensions())?;
    let upload = state.uploads.save(&filename, &bytes).await?;
    let path = &upload.path;

    let result = match state.classifier.classify(path).await {
        Ok(result) => result,
        Err(err) => {
            error!("Classification of {} failed: {err}", path.display());
            upload.discard().await;
            return Err(err.into());
        }
    };

    let interpretation = interpret(&result);
    match &interpretation {
        Interpretation::Recognized { ripeness, confidence } => {
            let detection = NewDetection::new(*ripeness, path.to_string_lossy());
            let id = match state.store.insert(&detection).await {
                Ok(id) => id,
                Err(err) => {
                    upload.discard().await;
                    return Err(err.into());
                }
            };
            info!(
                "Detection {id}: {} ({confidence:.2}) for {}",
                ripeness.as_str(),
                path.display()
            );
        }
        Interpretation::Unrecognized { class, .. } => {
            warn!("Unrecognized class {class:?} for {}, not recorded", path.display());
        }
        Interpretation::NoDetection => {
            info!("No banana detected in {}", path.display());
        }
    }

    Ok(Json(PredictionResponse {
        prediction: interpretation.label(),
        confidence: interpretation.confidence(),
        image_url: upload.url(),
    }))
}

async fn history_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    let records = state.store.list_all().await.unwrap_or_else(|err| {
        warn!("Rendering empty history: {err}");
        Vec::new()
    });
    Html(views::history_page(&records))
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Response {
    match state.store.delete_by_id(id).await {
        Ok(()) => (StatusCode::FOUND, [(header::LOCATION, "/history")]).into_response(),
        Err(err) => {
            error!("Failed to delete detection {id}: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error deleting record").into_response()
        }
    }
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Response {
    if sanitize_filename(&filename) != filename {
        return StatusCode::NOT_FOUND.into_response();
    }

    match tokio::fs::read(state.uploads.path_for(&filename)).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type_for(&filename))], bytes).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}
