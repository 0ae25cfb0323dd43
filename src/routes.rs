use axum::{
    Json, Form, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post, put},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use include_dir::{include_dir, Dir};
use parking_lot::RwLock;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use uuid::Uuid;

use crate::{
    error::AppError,
    gemini::DesignService,
    media,
    models::{ConfigPatch, GeneratedVariant, SelectRequest},
    pdf::generate_report,
    render::render_studio,
    session::{Action, SessionState},
    studio::Studio,
};

static ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<HashMap<Uuid, Arc<Studio>>>>,
    pub service: Arc<dyn DesignService>,
}

impl AppState {
    pub fn new(service: Arc<dyn DesignService>) -> Self {
        Self { store: Arc::default(), service }
    }

    fn studio(&self, id: Uuid) -> Result<Arc<Studio>, AppError> {
        let studio = self.store.read().get(&id).cloned().ok_or(AppError::SessionNotFound)?;
        studio.touch();
        Ok(studio)
    }

    fn create_studio(&self) -> Arc<Studio> {
        let studio = Arc::new(Studio::new(self.service.clone()));
        self.store.write().insert(studio.id, studio.clone());
        tracing::info!(session = %studio.id, "🆕 Session created");
        studio
    }

    /// Drops sessions untouched for at least `ttl`. Sessions with a request in
    /// flight are kept whatever their age.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let mut store = self.store.write();
        let before = store.len();
        store.retain(|_, studio| {
            let idle = (now - studio.last_active()).to_std().is_ok_and(|idle| idle >= ttl);
            studio.is_busy() || !idle
        });
        before - store.len()
    }
}

pub fn spawn_session_sweeper(state: AppState, ttl: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60).min(ttl.max(Duration::from_secs(1))));
        loop {
            ticker.tick().await;
            let evicted = state.evict_idle(ttl);
            if evicted > 0 {
                tracing::info!(evicted, remaining = state.store.read().len(), "🧹 Evicted idle sessions");
            }
        }
    })
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/studio/:id", get(studio_page))
        .route("/studio/:id/upload", post(studio_upload))
        .route("/studio/:id/configure", post(studio_configure))
        .route("/studio/:id/generate", post(studio_generate))
        .route("/studio/:id/select", post(studio_select))
        .route("/studio/:id/variants/:variant_id/delete", post(studio_delete))
        .route("/studio/:id/overlay", post(studio_overlay))
        .route("/static/*path", get(static_asset))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/image", put(upload_image).get(download_image))
        .route("/api/sessions/:id/config", axum::routing::patch(update_config))
        .route("/api/sessions/:id/variants", post(generate_variant))
        .route("/api/sessions/:id/variants/:variant_id", axum::routing::delete(delete_variant))
        .route("/api/sessions/:id/variants/:variant_id/select", post(select_variant))
        .route("/api/sessions/:id/original/select", post(select_original))
        .route("/api/sessions/:id/overlay", post(toggle_overlay))
        .route("/api/sessions/:id/pdf", get(export_pdf))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub state: SessionState,
}

impl From<&Studio> for SessionView {
    fn from(studio: &Studio) -> Self {
        Self { id: studio.id, created_at: studio.created_at, state: studio.snapshot() }
    }
}

// --- JSON API ---

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let studio = state.create_studio();
    (StatusCode::CREATED, Json(SessionView::from(studio.as_ref())))
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, AppError> {
    let studio = state.studio(id)?;
    Ok(Json(SessionView::from(studio.as_ref())))
}

pub async fn delete_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.store.write().remove(&id).ok_or(AppError::SessionNotFound)?;
    tracing::info!(session = %id, "🗑️ Session deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_image(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SessionView>, AppError> {
    let studio = state.studio(id)?;
    if body.is_empty() {
        return Err(AppError::BadRequest("empty image body".into()));
    }
    let declared = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    studio.upload(&body, declared).await?;
    Ok(Json(SessionView::from(studio.as_ref())))
}

pub async fn update_config(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(patch): Json<ConfigPatch>,
) -> Result<Json<SessionView>, AppError> {
    let studio = state.studio(id)?;
    studio.dispatch(Action::Configure(patch));
    Ok(Json(SessionView::from(studio.as_ref())))
}

pub async fn generate_variant(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<GeneratedVariant>), AppError> {
    let studio = state.studio(id)?;
    let variant = studio.generate().await?;
    Ok((StatusCode::CREATED, Json(variant)))
}

pub async fn select_variant(
    Path((id, variant_id)): Path<(Uuid, String)>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, AppError> {
    let studio = state.studio(id)?;
    if studio.snapshot().variant(&variant_id).is_none() {
        return Err(AppError::VariantNotFound);
    }
    studio.dispatch(Action::SelectVariant { id: variant_id });
    Ok(Json(SessionView::from(studio.as_ref())))
}

pub async fn delete_variant(
    Path((id, variant_id)): Path<(Uuid, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let studio = state.studio(id)?;
    if studio.snapshot().variant(&variant_id).is_none() {
        return Err(AppError::VariantNotFound);
    }
    studio.dispatch(Action::DeleteVariant { id: variant_id });
    Ok(StatusCode::NO_CONTENT)
}

pub async fn select_original(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, AppError> {
    let studio = state.studio(id)?;
    studio.dispatch(Action::SelectOriginal);
    Ok(Json(SessionView::from(studio.as_ref())))
}

pub async fn toggle_overlay(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, AppError> {
    let studio = state.studio(id)?;
    studio.dispatch(Action::ToggleOverlay);
    Ok(Json(SessionView::from(studio.as_ref())))
}

pub async fn download_image(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Response, AppError> {
    let studio = state.studio(id)?;
    let active = studio
        .snapshot()
        .active_image
        .ok_or_else(|| AppError::BadRequest("no image to download".into()))?;
    let decoded = media::decode_data_uri(&active)?;
    let extension = decoded.mime_type.rsplit('/').next().unwrap_or("bin").to_string();
    let disposition = format!("attachment; filename=\"guard_design_{}.{}\"", id, extension);
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, decoded.mime_type), (header::CONTENT_DISPOSITION, disposition)],
        decoded.bytes,
    )
        .into_response())
}

pub async fn export_pdf(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Response, AppError> {
    let studio = state.studio(id)?;
    let pdf_bytes = generate_report(&studio.snapshot())?;
    let disposition = format!("attachment; filename=\"guard_design_{}.pdf\"", id);
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/pdf".to_string()), (header::CONTENT_DISPOSITION, disposition)],
        pdf_bytes,
    )
        .into_response())
}

// --- HTML pages ---

fn to_studio(id: Uuid) -> Redirect {
    Redirect::to(&format!("/studio/{id}"))
}

pub async fn index(State(state): State<AppState>) -> Redirect {
    to_studio(state.create_studio().id)
}

pub async fn studio_page(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let studio = state.studio(id)?;
    Ok(Html(render_studio(id, &studio.snapshot())))
}

pub async fn studio_upload(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Redirect, AppError> {
    let studio = state.studio(id)?;
    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::BadRequest(e.to_string()))? {
        if field.name() != Some("image") {
            continue;
        }
        let declared = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| AppError::BadRequest(e.to_string()))?;
        if bytes.is_empty() {
            break;
        }
        let ticket = studio.begin_upload(&bytes, declared.as_deref());
        let studio = studio.clone();
        tokio::spawn(async move {
            if let Err(e) = studio.analyze(ticket, &bytes).await {
                tracing::debug!(session = %studio.id, "upload finished with {}", e);
            }
        });
        break;
    }
    Ok(to_studio(id))
}

pub async fn studio_configure(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Form(patch): Form<ConfigPatch>,
) -> Result<Redirect, AppError> {
    state.studio(id)?.dispatch(Action::Configure(patch));
    Ok(to_studio(id))
}

pub async fn studio_generate(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Redirect, AppError> {
    let studio = state.studio(id)?;
    if let Ok(pending) = studio.begin_generation() {
        tokio::spawn(async move {
            if let Err(e) = studio.render(pending).await {
                tracing::debug!(session = %studio.id, "generation finished with {}", e);
            }
        });
    }
    Ok(to_studio(id))
}

pub async fn studio_select(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Form(body): Form<SelectRequest>,
) -> Result<Redirect, AppError> {
    let studio = state.studio(id)?;
    if body.target == "original" {
        studio.dispatch(Action::SelectOriginal);
    } else {
        studio.dispatch(Action::SelectVariant { id: body.target });
    }
    Ok(to_studio(id))
}

pub async fn studio_delete(
    Path((id, variant_id)): Path<(Uuid, String)>,
    State(state): State<AppState>,
) -> Result<Redirect, AppError> {
    state.studio(id)?.dispatch(Action::DeleteVariant { id: variant_id });
    Ok(to_studio(id))
}

pub async fn studio_overlay(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Redirect, AppError> {
    state.studio(id)?.dispatch(Action::ToggleOverlay);
    Ok(to_studio(id))
}

pub async fn static_asset(Path(path): Path<String>) -> Response {
    let Some(file) = ASSETS.get_file(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let content_type = match path.rsplit('.').next() {
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    };
    ([(header::CONTENT_TYPE, content_type)], file.contents()).into_response()
}
