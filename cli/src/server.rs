use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{
        Path, Request, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use crate::llm::{CompletionClient, UpstreamError};
use pantry_core::error::PantryError;
use pantry_core::generation::clean_markdown;
use pantry_core::models::{FoodItem, FoodItemFields, Recipe, RecipeFields, ValidationErrors};
use pantry_core::service::PantryService;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

const MARKDOWN_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";

#[derive(Clone)]
pub(crate) struct AppState {
    service: Arc<Mutex<PantryService>>,
    llm: Arc<CompletionClient>,
    api_key: Option<String>,
}

impl AppState {
    pub(crate) fn new(
        service: PantryService,
        llm: CompletionClient,
        api_key: Option<String>,
    ) -> Self {
        Self {
            service: Arc::new(Mutex::new(service)),
            llm: Arc::new(llm),
            api_key,
        }
    }

    fn service(&self) -> MutexGuard<'_, PantryService> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ServeOptions {
    pub port: u16,
    pub bind: String,
    pub api_key: Option<String>,
    /// Browser origins allowed by CORS. Empty means any origin.
    pub allowed_origins: Vec<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<String, Vec<String>>>,
}

impl ErrorResponse {
    fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            fields: None,
        }
    }
}

// --- Error handling ---

enum ApiError {
    Validation(ValidationErrors),
    NotFound(String),
    BadRequest(String),
    Upstream(UpstreamError),
    Rejected(JsonRejection),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse {
                    error: errors.to_string(),
                    fields: Some(errors.fields().clone()),
                },
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::message(msg)),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::message(msg)),
            Self::Upstream(err) => {
                error!("Recipe generation failed: {}", upstream_detail(err));
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::message("Recipe generation service is unavailable"),
                )
            }
            Self::Rejected(rejection) => return rejection.into_response(),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::message("Internal server error"),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<PantryError> for ApiError {
    fn from(err: PantryError) -> Self {
        match err {
            PantryError::Validation(errors) => Self::Validation(errors),
            err @ PantryError::NotFound { .. } => Self::NotFound(err.to_string()),
            PantryError::PreconditionFailed(msg) => Self::BadRequest(msg),
            PantryError::Internal(err) => Self::Internal(err),
        }
    }
}

/// The error and every underlying cause, for the server log only.
fn upstream_detail(err: UpstreamError) -> String {
    format!("{:#}", anyhow::Error::from(err))
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        Self::Upstream(err)
    }
}

// Unparseable bodies are reported like any other invalid input; failures to
// read the body at all (e.g. over the size limit) keep axum's own status.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::BytesRejection(_) => Self::Rejected(rejection),
            _ => {
                let mut errors = ValidationErrors::new();
                errors.add("body", rejection.body_text());
                Self::Validation(errors)
            }
        }
    }
}

/// Ids that don't parse as an integer can't name a stored row.
fn row_id(id: Result<Path<i64>, PathRejection>, entity: &str) -> Result<i64, ApiError> {
    match id {
        Ok(Path(id)) => Ok(id),
        Err(PathRejection::FailedToDeserializePathParams(_)) => {
            Err(ApiError::NotFound(format!("{entity} not found")))
        }
        Err(rejection) => Err(ApiError::Internal(anyhow::anyhow!(rejection.body_text()))),
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::message("Invalid or missing API key")),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

fn cors_layer(allowed_origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origin = if allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let origins = allowed_origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin '{o}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60)))
}

// --- Food item handlers ---

async fn list_food_items(State(state): State<AppState>) -> Result<Json<Vec<FoodItem>>, ApiError> {
    let items = state.service().list_food_items()?;
    Ok(Json(items))
}

async fn create_food_item(
    State(state): State<AppState>,
    payload: Result<Json<FoodItemFields>, JsonRejection>,
) -> Result<(StatusCode, Json<FoodItem>), ApiError> {
    let Json(fields) = payload?;
    let item = state.service().create_food_item(&fields)?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn get_food_item(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<FoodItem>, ApiError> {
    let id = row_id(id, "Food item")?;
    let item = state.service().get_food_item(id)?;
    Ok(Json(item))
}

async fn update_food_item(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<FoodItemFields>, JsonRejection>,
) -> Result<Json<FoodItem>, ApiError> {
    let id = row_id(id, "Food item")?;
    let Json(fields) = payload?;
    let item = state.service().update_food_item(id, &fields)?;
    Ok(Json(item))
}

async fn delete_food_item(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = row_id(id, "Food item")?;
    state.service().delete_food_item(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Recipe handlers ---

async fn generate_recipe(State(state): State<AppState>) -> Result<Response, ApiError> {
    // The database lock is released before the upstream call.
    let prompt = {
        let service = state.service();
        service.generation_prompt()?
    };
    let raw = state.llm.complete(prompt).await?;
    let markdown = clean_markdown(&raw);
    Ok(([(header::CONTENT_TYPE, MARKDOWN_CONTENT_TYPE)], markdown).into_response())
}

async fn list_recipes(State(state): State<AppState>) -> Result<Json<Vec<Recipe>>, ApiError> {
    let recipes = state.service().list_recipes()?;
    Ok(Json(recipes))
}

async fn create_recipe(
    State(state): State<AppState>,
    payload: Result<Json<RecipeFields>, JsonRejection>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let Json(fields) = payload?;
    let recipe = state.service().create_recipe(&fields)?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn get_recipe(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Recipe>, ApiError> {
    let id = row_id(id, "Recipe")?;
    let recipe = state.service().get_recipe(id)?;
    Ok(Json(recipe))
}

async fn delete_recipe(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = row_id(id, "Recipe")?;
    state.service().delete_recipe(id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/food-items", get(list_food_items).post(create_food_item))
        .route(
            "/api/food-items/{id}",
            get(get_food_item)
                .put(update_food_item)
                .patch(update_food_item)
                .delete(delete_food_item),
        )
        .route("/api/recipes/generate", get(generate_recipe))
        .route("/api/recipes", get(list_recipes).post(create_recipe))
        .route("/api/recipes/{id}", get(get_recipe).delete(delete_recipe))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub async fn start_server(
    service: PantryService,
    llm: CompletionClient,
    options: ServeOptions,
) -> anyhow::Result<()> {
    let ServeOptions {
        port,
        bind,
        api_key,
        allowed_origins,
    } = options;

    if let Some(ref key) = api_key {
        info!(
            "API key: {} (see api_key file in data directory)",
            mask_key(key)
        );
    } else if bind != "127.0.0.1" && bind != "localhost" {
        warn!(
            "Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let cors = cors_layer(&allowed_origins)?;
    let app = build_router(AppState::new(service, llm, api_key)).layer(cors);

    let address = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Listening on http://{address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
