//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Every request except
//! health and version checks passes the per-route throttle first.

use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::{AccountService, JwtValidator, LoginService};
use crate::config::Args;
use crate::db::{SurveyStore, UserStore};
use crate::limiter::{route_key, spawn_sweep_task, AttemptLimiter};
use crate::logging::AuditLogger;
use crate::routes::{self, BoxBody, BoxError};
use crate::services::{spawn_abandon_task, DistributionEngine, LifecycleController};
use crate::types::Result;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn SurveyStore>,
    /// "mongodb" or "memory"
    pub store_backend: &'static str,
    pub jwt: JwtValidator,
    pub login: LoginService,
    pub accounts: AccountService,
    pub distribution: DistributionEngine,
    pub lifecycle: Arc<LifecycleController>,
    /// Brute-force protection keyed by login identifier
    pub login_limiter: Arc<AttemptLimiter>,
    /// Generic throttle keyed by client ip and route
    pub route_limiter: Arc<AttemptLimiter>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        store: Arc<dyn SurveyStore>,
        users: Arc<dyn UserStore>,
        store_backend: &'static str,
        audit: AuditLogger,
    ) -> Result<Self> {
        let jwt = JwtValidator::new(&args.jwt_secret()?, args.jwt_expiry_seconds);
        let login_limiter = Arc::new(AttemptLimiter::new("login", args.login_limit()));
        let route_limiter = Arc::new(AttemptLimiter::new("route", args.route_limit()));

        Ok(Self {
            login: LoginService::new(Arc::clone(&users), Arc::clone(&login_limiter), jwt.clone()),
            accounts: AccountService::new(users, audit),
            distribution: DistributionEngine::new(Arc::clone(&store), args.distribution()),
            lifecycle: Arc::new(LifecycleController::new(Arc::clone(&store), args.store_timeout())),
            store,
            store_backend,
            jwt,
            login_limiter,
            route_limiter,
            started_at: Instant::now(),
            args,
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("survey-gate listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - in-memory store and default JWT secret");
    }

    let sweep_interval = Duration::from_secs(state.args.limiter_sweep_interval_secs);
    spawn_sweep_task(Arc::clone(&state.login_limiter), sweep_interval);
    spawn_sweep_task(Arc::clone(&state.route_limiter), sweep_interval);

    spawn_abandon_task(
        Arc::clone(&state.lifecycle),
        Duration::from_secs(state.args.abandon_sweep_interval_secs),
        Duration::from_secs(state.args.abandon_after_secs),
    );
    info!(
        "Abandon sweep enabled (idle after {}s, every {}s)",
        state.args.abandon_after_secs, state.args.abandon_sweep_interval_secs
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    Ok(dispatch(&state, addr, req).await)
}

/// Route shape used as the throttle key, ids replaced by placeholders
fn route_template(method: &Method, path: &str) -> String {
    let mut template = String::new();
    let mut previous = "";
    for segment in routes::path_segments(path) {
        template.push('/');
        match previous {
            "forms" | "users" => template.push_str("{id}"),
            "r" => template.push_str("{token}"),
            _ => template.push_str(segment),
        }
        previous = segment;
    }
    if template.is_empty() {
        template.push('/');
    }
    format!("{} {}", method, template)
}

/// Route a request to its handler
pub async fn dispatch<B>(state: &AppState, addr: SocketAddr, req: Request<B>) -> Response<BoxBody>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("[{}] {} {}", addr, method, path);

    match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => return routes::cors_preflight(),
        (&Method::GET, "/health") => return routes::health_check(state),
        (&Method::GET, "/version") => return routes::version_info(),
        _ => {}
    }

    let key = route_key(
        &routes::client_ip(&req, addr, state.args.trust_forwarded_for),
        &route_template(&method, &path),
    );
    if let Err(e) = state.route_limiter.enforce(&key) {
        warn!("Throttled {}", key);
        return routes::error_response(&e);
    }

    if path.starts_with("/auth/") {
        routes::handle_auth_request(req, state).await
    } else if path.starts_with("/admin/users/") {
        routes::handle_admin_users_request(req, state).await
    } else if path == "/forms" || path.starts_with("/forms/") {
        routes::handle_forms_request(req, state).await
    } else if path.starts_with("/r/") {
        routes::handle_response_request(req, state).await
    } else {
        routes::not_found(&path)
    }
}
