use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use clap::Parser;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use siteaudit::app::form::{AppDefaults, AuditForm};
use siteaudit::app::page;
use siteaudit::findings::{FindingsGenerator, OpenAiBackend};
use siteaudit::walk::{DelayRange, Walker};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Default model list offered in the form, in priority order.
    #[arg(long = "model", default_values_t = siteaudit::findings::DEFAULT_MODELS.iter().map(|m| m.to_string()))]
    models: Vec<String>,

    #[arg(long, default_value = siteaudit::openai::DEFAULT_BASE_URL)]
    openai_base_url: String,

    #[arg(long, default_value_t = 0.2)]
    openai_temperature: f32,

    #[arg(long, default_value_t = 500)]
    delay_min_ms: u64,

    #[arg(long, default_value_t = 1500)]
    delay_max_ms: u64,

    /// Wall-clock cap for one walk.
    #[arg(long, default_value_t = 120)]
    max_elapsed_secs: u64,

    #[arg(long, default_value_t = 5000)]
    rate_limit_backoff_ms: u64,
}

#[derive(Clone)]
struct AppState {
    defaults: Arc<AppDefaults>,
    openai_base_url: String,
    openai_temperature: f32,
    /// Held for the duration of one audit; the tool serves a single operator.
    running: Arc<Mutex<()>>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    siteaudit::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting siteaudit-app");

    if std::env::var("OPENAI_API_KEY").is_err() {
        tracing::warn!("OPENAI_API_KEY is not set; audits will fail until it is");
    }

    let state = AppState {
        defaults: Arc::new(AppDefaults {
            models: args.models.clone(),
            delay: DelayRange::from_millis(args.delay_min_ms, args.delay_max_ms),
            max_elapsed: Duration::from_secs(args.max_elapsed_secs.max(1)),
            rate_limit_backoff: Duration::from_millis(args.rate_limit_backoff_ms),
            digest_max_chars: siteaudit::digest::DEFAULT_MAX_CHARS,
        }),
        openai_base_url: args.openai_base_url.clone(),
        openai_temperature: args.openai_temperature,
        running: Arc::new(Mutex::new(())),
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(form_handler))
        .route("/audit", get(form_handler).post(audit_handler))
        .route("/healthz", get(|| async { "ok\n" }))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn form_handler(State(state): State<AppState>) -> Html<String> {
    Html(page::form_page(&state.defaults.models))
}

async fn audit_handler(
    State(state): State<AppState>,
    Form(form): Form<AuditForm>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let fail = |status: StatusCode, message: String| (status, Html(page::error_page(&message)));

    let Ok(_running) = Arc::clone(&state.running).try_lock_owned() else {
        return Err(fail(
            StatusCode::CONFLICT,
            "another audit is already running".to_string(),
        ));
    };

    let config = form
        .to_config(&state.defaults)
        .map_err(|err| fail(StatusCode::BAD_REQUEST, format!("{err:#}")))?;

    let backend = OpenAiBackend::from_env(&state.openai_base_url, state.openai_temperature)
        .map_err(|err| fail(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")))?;
    let walker = Walker::http(config.walk.clone())
        .map_err(|err| fail(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")))?;
    let generator = FindingsGenerator::new(backend, config.models, config.rate_limit_backoff);

    tracing::info!(url = %form.url, budget = walker.config().page_budget, "audit requested");

    let report = siteaudit::audit::audit(
        &form.url,
        &walker,
        &generator,
        config.digest_max_chars,
        &CancellationToken::new(),
        |record| tracing::debug!(url = %record.url, "page collected"),
    )
    .await
    .map_err(|err| fail(StatusCode::BAD_REQUEST, err.to_string()))?;

    Ok(Html(page::report_page(&report)))
}
