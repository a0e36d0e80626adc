// Catalog Sync - Web Server
// REST API over one shared reconciliation session (Axum)

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use catalog_sync::{
    logging, CatalogAccessor, ClassificationSnapshot, DateRange, ImportDefaults,
    LedgerExport, OperationOutcome, OperationReport, ReconciliationSession, SqliteCatalog,
    SyncConfig, SyncError, SyncResult, WindowSummary,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<ReconciliationSession>>,
    catalog: SqliteCatalog,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApiError>,
}

#[derive(Serialize)]
struct ApiError {
    code: &'static str,
    title: &'static str,
    message: String,
}

impl From<&SyncError> for ApiError {
    fn from(err: &SyncError) -> Self {
        ApiError {
            code: err.code(),
            title: err.title(),
            message: err.message(),
        }
    }
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    fn failed(data: T, err: &SyncError) -> Self {
        Self {
            success: false,
            data,
            error: Some(err.into()),
        }
    }
}

fn status_for(err: &SyncError) -> StatusCode {
    match err {
        SyncError::InvalidRange { .. } => StatusCode::BAD_REQUEST,
        SyncError::NotFound { .. } => StatusCode::NOT_FOUND,
        SyncError::AlreadyLinked { .. } | SyncError::SessionBusy { .. } => StatusCode::CONFLICT,
        SyncError::NoCategoryAvailable => StatusCode::UNPROCESSABLE_ENTITY,
        SyncError::Fetch { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(err: &SyncError) -> Response {
    (status_for(err), Json(ApiResponse::failed((), err))).into_response()
}

fn internal_error(message: String) -> Response {
    error!("{}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse {
            success: false,
            data: (),
            error: Some(ApiError {
                code: "internal",
                title: "Internal error",
                message,
            }),
        }),
    )
        .into_response()
}

/// Operation response: outcome (if any) plus the classification after it
#[derive(Serialize)]
struct OperationResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<OperationOutcome>,
    snapshot: ClassificationSnapshot,
}

impl IntoResponse for Reported {
    fn into_response(self) -> Response {
        let OperationReport { outcome, snapshot } = self.0;
        match outcome {
            Ok(outcome) => (
                StatusCode::OK,
                Json(ApiResponse::ok(OperationResponse {
                    outcome: Some(outcome),
                    snapshot,
                })),
            )
                .into_response(),
            Err(err) => (
                status_for(&err),
                Json(ApiResponse::failed(
                    OperationResponse {
                        outcome: None,
                        snapshot,
                    },
                    &err,
                )),
            )
                .into_response(),
        }
    }
}

struct Reported(OperationReport);

#[derive(Deserialize)]
struct PairRequest {
    ledger_id: String,
    local_id: String,
}

#[derive(Deserialize)]
struct ImportRequest {
    ledger_id: String,
    #[serde(default)]
    category_id: Option<String>,
}

#[derive(Deserialize)]
struct WindowRequest {
    start: NaiveDate,
    end: NaiveDate,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/classification - Current Unlinked / Diff / Synced sets
async fn get_classification(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(ApiResponse::ok(session.classification()))
}

/// GET /api/categories - Catalog categories (Import targets)
async fn get_categories(State(state): State<AppState>) -> Response {
    match state.catalog.list_categories().await {
        Ok(categories) => (StatusCode::OK, Json(ApiResponse::ok(categories))).into_response(),
        Err(e) => internal_error(format!("Error listing categories: {:#}", e)),
    }
}

/// Session work runs on its own task: once dispatched it finishes even if the
/// client goes away.
async fn run_detached<T, F, Fut>(state: AppState, run: F) -> Result<T, tokio::task::JoinError>
where
    F: FnOnce(OwnedMutexGuard<ReconciliationSession>) -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let session = state.session.clone();
    tokio::spawn(async move {
        let guard = session.lock_owned().await;
        run(guard).await
    })
    .await
}

async fn dispatch<F, Fut>(state: AppState, run: F) -> Response
where
    F: FnOnce(OwnedMutexGuard<ReconciliationSession>) -> Fut + Send + 'static,
    Fut: Future<Output = OperationReport> + Send + 'static,
{
    match run_detached(state, run).await {
        Ok(report) => Reported(report).into_response(),
        Err(e) => internal_error(format!("Operation task failed: {}", e)),
    }
}

type WindowResult = Result<SyncResult<ClassificationSnapshot>, tokio::task::JoinError>;

fn window_response(result: WindowResult) -> Response {
    match result {
        Ok(Ok(snapshot)) => (StatusCode::OK, Json(ApiResponse::ok(snapshot))).into_response(),
        Ok(Err(err)) => error_response(&err),
        Err(e) => internal_error(format!("Window task failed: {}", e)),
    }
}

/// POST /api/operations/link
async fn post_link(State(state): State<AppState>, Json(body): Json<PairRequest>) -> Response {
    dispatch(state, move |mut session| async move {
        session.link(&body.ledger_id, &body.local_id).await
    })
    .await
}

/// POST /api/operations/import
async fn post_import(State(state): State<AppState>, Json(body): Json<ImportRequest>) -> Response {
    dispatch(state, move |mut session| async move {
        let defaults = ImportDefaults {
            category_id: body.category_id,
        };
        session.import(&body.ledger_id, defaults).await
    })
    .await
}

/// POST /api/operations/update
async fn post_update(State(state): State<AppState>, Json(body): Json<PairRequest>) -> Response {
    dispatch(state, move |mut session| async move {
        session.update(&body.ledger_id, &body.local_id).await
    })
    .await
}

/// POST /api/window/expand - One week further back
async fn post_expand(State(state): State<AppState>) -> Response {
    let result = run_detached(state, |mut session| async move {
        match session.expand_window().await {
            Ok(_) => Ok(session.classification()),
            Err(err) => Err(err),
        }
    })
    .await;
    window_response(result)
}

/// PUT /api/window - Replace the window
async fn put_window(State(state): State<AppState>, Json(body): Json<WindowRequest>) -> Response {
    let result = run_detached(state, move |mut session| async move {
        match session.set_window(body.start, body.end).await {
            Ok(_) => Ok(session.classification()),
            Err(err) => Err(err),
        }
    })
    .await;
    window_response(result)
}

/// GET /api/window - Window bounds only
async fn get_window(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    let window: WindowSummary = session.classification().window;
    Json(ApiResponse::ok(window))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    logging::init_tracing();

    println!("🌐 Catalog Sync - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = match SyncConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let catalog = match SqliteCatalog::open(&config.database_path) {
        Ok(catalog) => catalog.with_actor(&config.actor),
        Err(e) => {
            eprintln!("❌ Could not open catalog: {:#}", e);
            std::process::exit(1);
        }
    };
    println!("✓ Catalog opened: {:?}", config.database_path);

    let ledger = LedgerExport::from_csv_path(config.ledger_export_path.clone());
    let range = DateRange::trailing_days(Local::now().date_naive(), config.window_days);

    let session = match ReconciliationSession::open(
        Arc::new(ledger),
        Arc::new(catalog.clone()),
        &config,
        range.start,
        range.end,
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            eprintln!("❌ {}: {}", e.title(), e.message());
            std::process::exit(1);
        }
    };
    println!("✓ Window loaded: {}", range);

    // Create shared state
    let state = AppState {
        session: Arc::new(Mutex::new(session)),
        catalog,
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/classification", get(get_classification))
        .route("/categories", get(get_categories))
        .route("/operations/link", post(post_link))
        .route("/operations/import", post(post_import))
        .route("/operations/update", post(post_update))
        .route("/window", get(get_window).put(put_window))
        .route("/window/expand", post(post_expand))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = match tokio::net::TcpListener::bind(&config.server_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("❌ Failed to bind to {}: {}", config.server_addr, e);
            std::process::exit(1);
        }
    };

    info!(addr = %config.server_addr, "server listening");
    println!("\n🚀 Server running on http://{}", config.server_addr);
    println!("   API: http://{}/api/classification", config.server_addr);
    println!("\n   Press Ctrl+C to stop\n");

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("❌ Server error: {}", e);
        std::process::exit(1);
    }
}
