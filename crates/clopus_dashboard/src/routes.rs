//! Dashboard routes
//!
//! Full page, htmx partials, the JSON API and the health check. List and
//! aggregate queries degrade to empty results when the store fails; single
//! run lookups answer 400/404.

use crate::error::DashboardError;
use crate::server::AppState;
use crate::views::{self, PageData};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Json, Router,
};
use clopus_common::{Fix, FixStats, NamespaceStats, Run, Store, StoreResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

type AppStateArc = Arc<AppState>;

/// Runs shown in the page and the runs partial
pub const RUN_LIST_LIMIT: usize = 50;

/// Upper bound for JSON list endpoints
pub const API_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub ns: Option<String>,
    pub run: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NamespaceQuery {
    #[serde(default)]
    pub ns: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunsQuery {
    #[serde(default)]
    pub ns: String,
    /// Run to keep highlighted; unparsable values highlight nothing
    pub run: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunIdQuery {
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    /// Unparsable values fall back to [`API_LIMIT`]
    pub limit: Option<String>,
}

/// `/api/run` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWithFixes {
    pub run: Run,
    pub fixes: Vec<Fix>,
}

fn or_empty<T: Default>(result: StoreResult<T>, what: &str) -> T {
    result.unwrap_or_else(|e| {
        warn!("Failed to load {}: {}", what, e);
        T::default()
    })
}

fn run_not_found() -> DashboardError {
    DashboardError::NotFound("Run not found".to_string())
}

// ============================================================================
// Page
// ============================================================================

pub fn page_routes() -> Router<AppStateArc> {
    Router::new().route("/", get(index))
}

async fn index(
    State(state): State<AppStateArc>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, DashboardError> {
    let requested_ns = query.ns.unwrap_or_default();
    let run_param = query.run.filter(|r| !r.is_empty());

    let mut page = state
        .with_store(move |store| Ok(build_page(store, requested_ns, run_param)))
        .await?;
    page.log = state.read_log().await;

    Ok(Html(views::render_index(&page)?))
}

/// Namespace and run selection for the main page.
///
/// An explicit `run` id is looked up directly and may belong to another
/// namespace than the one shown.
pub fn build_page(store: &Store, requested_ns: String, run_param: Option<String>) -> PageData {
    let namespaces = or_empty(store.get_namespaces(), "namespaces");

    let current_ns = if requested_ns.is_empty() {
        namespaces
            .first()
            .map(|n| n.namespace.clone())
            .unwrap_or_default()
    } else {
        requested_ns
    };

    let runs = if current_ns.is_empty() {
        Vec::new()
    } else {
        or_empty(store.get_runs(&current_ns, RUN_LIST_LIMIT), "runs")
    };

    let selected_run = match run_param {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|id| store.get_run(id).ok()),
        None => runs.first().cloned(),
    };

    let selected_fixes = selected_run
        .as_ref()
        .map(|run| or_empty(store.get_fixes_by_run(run.id), "fixes"))
        .unwrap_or_default();

    let (stats, last_run_time) = if current_ns.is_empty() {
        (None, String::new())
    } else {
        (
            store.get_namespace_stats(&current_ns).ok(),
            or_empty(store.get_last_run_time(&current_ns), "last run time"),
        )
    };

    PageData {
        namespaces,
        current_ns,
        runs,
        selected_run,
        selected_fixes,
        stats,
        last_run_time,
        fix_stats: or_empty(store.get_stats(), "fix stats"),
        log: String::new(),
    }
}

// ============================================================================
// Partials
// ============================================================================

pub fn partial_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/partials/runs", get(runs_partial))
        .route("/partials/run", get(run_partial))
        .route("/partials/stats", get(stats_partial))
        .route("/partials/log", get(log_partial))
}

async fn runs_partial(
    State(state): State<AppStateArc>,
    Query(query): Query<RunsQuery>,
) -> Result<Html<String>, DashboardError> {
    let selected = query.run.as_deref().and_then(|r| r.trim().parse::<i64>().ok());
    let ns = query.ns.clone();
    let runs = or_empty(
        state
            .with_store(move |store| store.get_runs(&ns, RUN_LIST_LIMIT))
            .await,
        "runs",
    );
    Ok(Html(views::render_runs_list(&runs, &query.ns, selected)?))
}

async fn run_partial(
    State(state): State<AppStateArc>,
    Query(query): Query<RunIdQuery>,
) -> Result<Html<String>, DashboardError> {
    let RunWithFixes { run, fixes } = load_run(&state, query.id).await?;
    Ok(Html(views::render_run_detail(&run, &fixes)?))
}

async fn stats_partial(
    State(state): State<AppStateArc>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Html<String>, DashboardError> {
    let ns = query.ns.clone();
    let stats = state
        .with_store(move |store| store.get_namespace_stats(&ns))
        .await
        .unwrap_or_else(|e| {
            warn!("Failed to load namespace stats: {}", e);
            NamespaceStats {
                namespace: query.ns,
                ..Default::default()
            }
        });
    Ok(Html(views::render_stats(&stats)?))
}

async fn log_partial(State(state): State<AppStateArc>) -> Html<String> {
    Html(views::render_log(&state.read_log().await))
}

/// Run plus its fixes; 400 without an id, 404 when the lookup fails
async fn load_run(state: &AppState, id: Option<String>) -> Result<RunWithFixes, DashboardError> {
    let raw = id
        .filter(|s| !s.is_empty())
        .ok_or(DashboardError::MissingParam("run id"))?;
    let id: i64 = raw.trim().parse().map_err(|_| run_not_found())?;

    state
        .with_store(move |store| {
            let run = store.get_run(id)?;
            let fixes = or_empty(store.get_fixes_by_run(id), "fixes");
            Ok(RunWithFixes { run, fixes })
        })
        .await
        .map_err(|e| {
            if !e.is_not_found() {
                warn!("Run {} lookup failed: {}", id, e);
            }
            run_not_found()
        })
}

// ============================================================================
// JSON API
// ============================================================================

pub fn api_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/namespaces", get(api_namespaces))
        .route("/api/runs", get(api_runs))
        .route("/api/run", get(api_run))
        .route("/api/fixes", get(api_fixes))
        .route("/api/stats", get(api_stats))
}

async fn api_namespaces(State(state): State<AppStateArc>) -> Json<Vec<NamespaceStats>> {
    Json(or_empty(
        state.with_store(|store| store.get_namespaces()).await,
        "namespaces",
    ))
}

async fn api_runs(
    State(state): State<AppStateArc>,
    Query(query): Query<NamespaceQuery>,
) -> Json<Vec<Run>> {
    Json(or_empty(
        state
            .with_store(move |store| store.get_runs(&query.ns, API_LIMIT))
            .await,
        "runs",
    ))
}

async fn api_run(
    State(state): State<AppStateArc>,
    Query(query): Query<RunIdQuery>,
) -> Result<Json<RunWithFixes>, DashboardError> {
    Ok(Json(load_run(&state, query.id).await?))
}

async fn api_fixes(
    State(state): State<AppStateArc>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<Fix>> {
    let limit = query
        .limit
        .and_then(|l| l.trim().parse::<usize>().ok())
        .unwrap_or(API_LIMIT)
        .min(API_LIMIT);
    Json(or_empty(
        state.with_store(move |store| store.get_fixes(limit)).await,
        "fixes",
    ))
}

async fn api_stats(State(state): State<AppStateArc>) -> Json<FixStats> {
    Json(or_empty(
        state.with_store(|store| store.get_stats()).await,
        "fix stats",
    ))
}

// ============================================================================
// Health
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/health", get(health))
}

async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
