use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use tokio::{
    net::TcpListener,
    sync::{watch, Mutex},
    time::MissedTickBehavior,
};
use tower_http::cors::CorsLayer;
use tracing::{info, trace, warn};

use faceplate_common::{EngineAction, FaceplateEngine, RuntimeConfig, ToggleOutcome, TogglePayload};

use crate::web::{self, CONTROL_HTML, INDEX_HTML};

const DEFAULT_HTTP_PORT: u16 = 8080;

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<FaceplateEngine>>,
    completions: Arc<watch::Sender<u64>>,
}

impl AppState {
    fn new(engine: FaceplateEngine) -> Self {
        let (completions, _) = watch::channel(engine.completed_toggles());
        Self {
            engine: Arc::new(Mutex::new(engine)),
            completions: Arc::new(completions),
        }
    }
}

/// Stand-in for the servo and light drivers; tracks what the hardware would be holding.
#[derive(Debug, Default)]
struct SimulatedOutputs {
    servo_a: u16,
    servo_b: u16,
    light: u8,
}

impl SimulatedOutputs {
    fn apply(&mut self, action: &EngineAction) {
        match *action {
            EngineAction::MoveServos { a, b } => {
                self.servo_a = a;
                self.servo_b = b;
                info!("servos: a={a} b={b}");
            }
            EngineAction::SetBrightness(level) => {
                self.light = level;
                trace!("light: {level}");
            }
            EngineAction::Completed(state) => {
                info!(
                    "faceplate {} | light transition completed (a={}, b={}, light={})",
                    state.label(),
                    self.servo_a,
                    self.servo_b,
                    self.light
                );
            }
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut runtime = RuntimeConfig::default();
    if let Err(err) = runtime.faceplate.validate() {
        warn!("invalid faceplate config ({err}); clamping to supported range");
        runtime.faceplate.sanitize();
    }
    if runtime.faceplate.toggle_wait_timeout_ms < runtime.faceplate.toggle_duration_ms() {
        warn!(
            "toggle wait timeout {}ms is shorter than a full toggle ({}ms); responses may report the old state",
            runtime.faceplate.toggle_wait_timeout_ms,
            runtime.faceplate.toggle_duration_ms()
        );
    }

    let engine = FaceplateEngine::new(runtime.faceplate);
    let mut outputs = SimulatedOutputs::default();
    for action in engine.initial_actions() {
        outputs.apply(&action);
    }

    let app_state = AppState::new(engine);
    spawn_control_loop(app_state.clone(), outputs);

    let app = build_router(app_state);

    let port = std::env::var("FACEPLATE_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_HTTP_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind faceplate server at {addr}"))?;

    info!("faceplate controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/control", get(handle_control))
        .route("/toggle", post(handle_toggle))
        .route("/api/status", get(handle_get_status))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

fn spawn_control_loop(app_state: AppState, mut outputs: SimulatedOutputs) {
    tokio::spawn(async move {
        let tick_ms = app_state.engine.lock().await.config.tick_interval_ms;
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let now_ms = monotonic_ms();

            let (actions, completed) = {
                let mut engine = app_state.engine.lock().await;
                let actions = engine.tick(now_ms);
                (actions, engine.completed_toggles())
            };

            for action in &actions {
                outputs.apply(action);
            }

            app_state.completions.send_if_modified(|current| {
                if *current == completed {
                    return false;
                }
                *current = completed;
                true
            });
        }
    });
}

async fn handle_root() -> impl IntoResponse {
    Html(INDEX_HTML)
}

async fn handle_control() -> impl IntoResponse {
    Html(CONTROL_HTML)
}

async fn handle_toggle(State(state): State<AppState>) -> impl IntoResponse {
    let now_ms = monotonic_ms();
    let (outcome, timeout_ms) = {
        let mut engine = state.engine.lock().await;
        let outcome = engine.request_toggle(now_ms);
        (outcome, engine.config.toggle_wait_timeout_ms)
    };
    info!("http: {}", web::describe_outcome(&outcome));

    if let ToggleOutcome::Started { ticket, .. } = outcome {
        wait_for_completion(&state, ticket, timeout_ms).await;
    }

    // Rejected requests report the unchanged state rather than an error.
    let current = state.engine.lock().await.state();
    Json(TogglePayload { state: current })
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let now_ms = monotonic_ms();
    let status = state.engine.lock().await.status(now_ms);
    Json(status)
}

async fn wait_for_completion(state: &AppState, ticket: u64, timeout_ms: u64) {
    let mut completions = state.completions.subscribe();
    let completed = async move {
        completions
            .wait_for(|done| *done >= ticket)
            .await
            .map(|_| ())
    };

    match tokio::time::timeout(Duration::from_millis(timeout_ms), completed).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("toggle #{ticket} completion channel closed: {err}"),
        Err(_) => warn!("toggle #{ticket} still running after {timeout_ms}ms"),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{self, Body},
        http::{header, Request, StatusCode},
    };
    use faceplate_common::{ActuatorPair, FaceplateConfig, FaceplateState};
    use tower::ServiceExt;

    use super::*;

    fn fast_config(cooldown_ms: u64) -> FaceplateConfig {
        FaceplateConfig {
            servo_step: 65,
            step_delay_ms: 1,
            fade_delay_ms: 1,
            max_brightness: 8,
            cooldown_ms,
            tick_interval_ms: 1,
            toggle_wait_timeout_ms: 2_000,
            ..FaceplateConfig::default()
        }
    }

    fn test_app(config: FaceplateConfig) -> (Router, AppState) {
        let state = AppState::new(FaceplateEngine::new(config));
        spawn_control_loop(state.clone(), SimulatedOutputs::default());
        (build_router(state.clone()), state)
    }

    async fn post_toggle(app: &Router) -> (Option<String>, TogglePayload) {
        let request = Request::post("/toggle")
            .header(header::ORIGIN, "http://panel.local")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let allow_origin = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let payload = serde_json::from_slice(&body).expect("toggle payload");
        (allow_origin, payload)
    }

    #[tokio::test]
    async fn root_links_to_control_panel() {
        let (app, _state) = test_app(fast_config(1_000));
        let request = Request::get("/").body(Body::empty()).expect("request");
        let response = app.oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("text/html"));

        let body = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert!(String::from_utf8_lossy(&body).contains("/control"));
    }

    #[tokio::test]
    async fn control_page_is_served_cross_origin() {
        let (app, _state) = test_app(fast_config(1_000));
        let request = Request::get("/control")
            .header(header::ORIGIN, "http://panel.local")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.starts_with("text/html"));
        assert_eq!(
            headers
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|value| value.to_str().ok()),
            Some("*")
        );

        let body = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert!(String::from_utf8_lossy(&body).contains("/toggle"));
    }

    #[tokio::test]
    async fn toggle_reports_open_and_ignores_repeat_in_cooldown() {
        let (app, state) = test_app(fast_config(60_000));

        let (allow_origin, first) = post_toggle(&app).await;
        assert_eq!(allow_origin.as_deref(), Some("*"));
        assert_eq!(first.state, FaceplateState::Open);

        let (_, second) = post_toggle(&app).await;
        assert_eq!(second.state, FaceplateState::Open);

        let engine = state.engine.lock().await;
        assert_eq!(engine.actuators(), ActuatorPair { a: 130, b: 0 });
        assert_eq!(engine.brightness(), 0);
        assert_eq!(engine.completed_toggles(), 1);
    }

    #[tokio::test]
    async fn toggle_after_cooldown_closes_again() {
        let (app, state) = test_app(fast_config(20));

        let (_, first) = post_toggle(&app).await;
        assert_eq!(first.state, FaceplateState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        let (_, second) = post_toggle(&app).await;
        assert_eq!(second.state, FaceplateState::Closed);

        let engine = state.engine.lock().await;
        assert_eq!(engine.actuators(), ActuatorPair { a: 0, b: 130 });
        assert_eq!(engine.brightness(), 8);
    }

    #[tokio::test]
    async fn status_starts_closed() {
        let (app, _state) = test_app(fast_config(1_000));
        let request = Request::get("/api/status")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let status: serde_json::Value = serde_json::from_slice(&body).expect("status json");
        assert_eq!(status["state"], "CLOSED");
        assert_eq!(status["angleA"], 0);
        assert_eq!(status["angleB"], 130);
        assert_eq!(status["brightness"], 8);
        assert_eq!(status["busy"], false);
    }
}
