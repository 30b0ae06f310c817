//! axum router and handlers.
//!
//! Creating or deleting a jail restarts or reloads fail2ban and waits for it
//! to settle, so those requests routinely take several seconds. They are not
//! cancelled when the client disconnects.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::info;

use jailkeeper_config::AppConfig;

use super::error::ApiError;
use super::types::*;
use crate::allowlist::{AllowListStore, AllowListUpdate};
use crate::channel::ControlChannel;
use crate::command::Command;
use crate::daemon::{CommandReport, Daemon};
use crate::engine::{DeleteOutcome, ReconcileEngine, ReconcileOutcome, SettlePolicy};
use crate::filter::{FilterFile, FilterStore};
use crate::jail::JailDefinition;
use crate::parser::JailStatus;
use crate::store::{JailConfigStore, JailListing};
use crate::templates;

/// Shared state for every handler.
pub struct AppState {
    pub engine: Arc<ReconcileEngine>,
    pub allowlist: Arc<AllowListStore>,
    pub filters: Arc<FilterStore>,
    pub api_token: Option<String>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every store and the engine from `config` around `channel`.
    pub fn from_config(config: &AppConfig, channel: Arc<dyn ControlChannel>) -> Self {
        let daemon = Arc::new(Daemon::new(channel));
        let store = Arc::new(JailConfigStore::from_config(&config.store));
        let policy = SettlePolicy::from_config(&config.daemon);
        Self {
            engine: Arc::new(ReconcileEngine::new(daemon, store, policy)),
            allowlist: Arc::new(AllowListStore::from_config(&config.store)),
            filters: Arc::new(FilterStore::from_config(&config.store)),
            api_token: config.server.api_token.clone(),
            started_at: Instant::now(),
        }
    }

    fn daemon(&self) -> &Daemon {
        self.engine.daemon()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/jails", get(handle_jails))
        .route(
            "/api/jails/config",
            get(handle_jail_configs).post(handle_create_jail),
        )
        .route("/api/jails/config/{name}", delete(handle_delete_jail))
        .route("/api/jails/templates", get(handle_templates))
        .route("/api/jails/{name}/{action}", post(handle_jail_action))
        .route("/api/banned/{jail}", get(handle_banned))
        .route("/api/ban", post(handle_ban))
        .route("/api/unban", post(handle_unban))
        .route("/api/ignoreip", get(handle_get_allowlist).post(handle_set_allowlist))
        .route("/api/filters/{name}", get(handle_filter))
        .route("/api/daemon/{action}", post(handle_daemon_action))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(handle_health))
        .merge(api)
        .with_state(state)
}

/// Serve `state` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    if state.api_token.is_none() {
        info!("no api_token configured; API is unauthenticated");
    }
    info!(%addr, "HTTP control plane listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("HTTP control plane shutting down");
        })
        .await
}

fn tokens_match(given: &str, expected: &str) -> bool {
    given.len() == expected.len()
        && given
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

async fn require_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.api_token.as_deref() {
        let given = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);
        if !given.is_some_and(|g| tokens_match(g, expected)) {
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(next.run(request).await)
}

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::build_info::VERSION.to_string(),
        git_hash: crate::build_info::GIT_HASH.to_string(),
        build_profile: crate::build_info::BUILD_PROFILE.to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        daemon_running: state.daemon().ping().await,
    })
}

async fn handle_jails(State(state): State<Arc<AppState>>) -> ApiResult<JailsResponse> {
    let live = state.daemon().query(&Command::Status).await;
    let configured = state.engine.store().list().await?.names();
    Ok(Json(JailsResponse { live, configured }))
}

async fn handle_jail_configs(State(state): State<Arc<AppState>>) -> ApiResult<JailListing> {
    Ok(Json(state.engine.store().list().await?))
}

async fn handle_create_jail(
    State(state): State<Arc<AppState>>,
    Json(def): Json<JailDefinition>,
) -> ApiResult<ReconcileOutcome> {
    info!(jail = %def.name, "create requested via HTTP");
    Ok(Json(state.engine.create(def).await?))
}

async fn handle_delete_jail(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<DeleteOutcome> {
    let outcome = state.engine.delete(&name).await?;
    if !outcome.existed {
        return Err(ApiError::NotFound(format!("jail {name:?} is not configured")));
    }
    Ok(Json(outcome))
}

async fn handle_templates() -> Json<TemplatesResponse> {
    Json(TemplatesResponse {
        templates: templates::catalogue(),
    })
}

/// 200 with the report when the daemon accepted the command, 502 otherwise.
fn report_response(report: CommandReport) -> (StatusCode, Json<CommandReport>) {
    let status = if report.ok {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(report))
}

async fn handle_jail_action(
    State(state): State<Arc<AppState>>,
    Path((name, action)): Path<(String, String)>,
) -> Result<(StatusCode, Json<CommandReport>), ApiError> {
    let command = match action.as_str() {
        "start" => Command::start_jail(&name),
        "stop" => Command::stop_jail(&name),
        other => return Err(ApiError::BadRequest(format!("unknown jail action {other:?}"))),
    }
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(report_response(state.engine.control(&command).await))
}

async fn handle_daemon_action(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
) -> Result<(StatusCode, Json<CommandReport>), ApiError> {
    let command = match action.as_str() {
        "start" => Command::Start,
        "stop" => Command::Stop,
        "reload" => Command::Reload,
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown daemon action {other:?}"
            )));
        }
    };
    Ok(report_response(state.engine.control(&command).await))
}

async fn handle_banned(
    State(state): State<Arc<AppState>>,
    Path(jail): Path<String>,
) -> ApiResult<JailStatus> {
    Ok(Json(state.daemon().jail_status(&jail).await?))
}

async fn handle_ban(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BanRequest>,
) -> ApiResult<BanResponse> {
    let outcome = state.daemon().ban(&req.jail, &req.ip).await?;
    Ok(Json(BanResponse {
        jail: req.jail,
        ip: req.ip,
        outcome,
    }))
}

async fn handle_unban(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BanRequest>,
) -> ApiResult<BanResponse> {
    let outcome = state.daemon().unban(&req.jail, &req.ip).await?;
    Ok(Json(BanResponse {
        jail: req.jail,
        ip: req.ip,
        outcome,
    }))
}

async fn handle_get_allowlist(State(state): State<Arc<AppState>>) -> ApiResult<AllowListBody> {
    Ok(Json(AllowListBody {
        ignoreip: state.allowlist.read().await?,
    }))
}

async fn handle_set_allowlist(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AllowListBody>,
) -> ApiResult<AllowListUpdate> {
    Ok(Json(
        state
            .allowlist
            .write(body.ignoreip.as_slice(), &state.engine)
            .await?,
    ))
}

async fn handle_filter(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<FilterFile> {
    state
        .filters
        .read(&name)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("filter {name:?} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxFuture;
    use crate::channel::ChannelError;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    /// Answers `ping` and nothing else.
    struct PongOnly;

    impl ControlChannel for PongOnly {
        fn send<'a>(&'a self, line: &'a str) -> BoxFuture<'a, Result<String, ChannelError>> {
            Box::pin(async move {
                if line == "ping" {
                    Ok("Server replied: pong".to_string())
                } else {
                    Err(ChannelError::Daemon {
                        code: Some(255),
                        message: format!("unsupported: {line}"),
                    })
                }
            })
        }
    }

    fn test_state(token: Option<&str>) -> (tempfile::TempDir, Arc<AppState>) {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.store.jail_dir = dir.path().join("jail.d").display().to_string();
        config.store.filter_dir = dir.path().join("filter.d").display().to_string();
        config.server.api_token = token.map(str::to_string);
        let state = Arc::new(AppState::from_config(&config, Arc::new(PongOnly)));
        (dir, state)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_dir, state) = test_state(None);
        let app = router(state);
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let health = body_json(resp).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["daemon_running"], true);
    }

    #[tokio::test]
    async fn test_token_required_when_configured() {
        let (_dir, state) = test_state(Some("s3cret"));
        let app = router(state);

        let req = Request::get("/api/jails/templates").body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["kind"], "unauthorized");

        let req = Request::get("/api/jails/templates")
            .header("authorization", "Bearer wrong!")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = Request::get("/api/jails/templates")
            .header("authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // Health stays open for load balancers.
        let req = Request::get("/health").body(Body::empty()).unwrap();
        assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_templates_endpoint() {
        let (_dir, state) = test_state(None);
        let req = Request::get("/api/jails/templates").body(Body::empty()).unwrap();
        let resp = router(state).oneshot(req).await.unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["templates"]["sshd"]["filter"], "sshd");
        assert_eq!(body["templates"]["recidive"]["bantime"], 604_800);
    }

    #[tokio::test]
    async fn test_unknown_actions_rejected() {
        let (_dir, state) = test_state(None);
        let app = router(state);

        let req = Request::post("/api/daemon/restart").body(Body::empty()).unwrap();
        assert_eq!(
            app.clone().oneshot(req).await.unwrap().status(),
            StatusCode::BAD_REQUEST
        );
        let req = Request::post("/api/jails/sshd/pause").body(Body::empty()).unwrap();
        assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_daemon_error_is_bad_gateway() {
        let (_dir, state) = test_state(None);
        let req = Request::post("/api/daemon/reload").body(Body::empty()).unwrap();
        let resp = router(state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let report = body_json(resp).await;
        assert_eq!(report["command"], "reload");
        assert_eq!(report["ok"], false);
    }

    #[tokio::test]
    async fn test_missing_filter_is_not_found() {
        let (dir, state) = test_state(None);
        let app = router(state);
        let req = Request::get("/api/filters/sshd").body(Body::empty()).unwrap();
        assert_eq!(
            app.clone().oneshot(req).await.unwrap().status(),
            StatusCode::NOT_FOUND
        );

        std::fs::create_dir_all(dir.path().join("filter.d")).unwrap();
        std::fs::write(dir.path().join("filter.d/sshd.conf"), "[Definition]\n").unwrap();
        let req = Request::get("/api/filters/sshd").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["content"], "[Definition]\n");
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abc", "abd"));
        assert!(!tokens_match("ab", "abc"));
    }
}
