use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use lead_quiz::config::AppConfig;
use lead_quiz::error::AppError;
use lead_quiz::quiz::{
    lead_router, AnswerMap, AnswerValue, Catalog, SlidingWindowLimiter, SmtpMailer,
    SubmissionGateway,
};
use lead_quiz::telemetry;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: Arc<PrometheusHandle>,
}

#[derive(Parser, Debug)]
#[command(
    name = "Lead Quiz Service",
    about = "Qualify inbound marketing leads through a branching project quiz",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect the question catalogs from the command line
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// Show which questions a visitor with the given answers would see
    Preview(PreviewArgs),
}

#[derive(Args, Debug)]
struct PreviewArgs {
    /// Use the flat five-step catalog instead of the branching one
    #[arg(long)]
    flat: bool,
    /// Seed an answer as id=value (repeatable; comma-separate values for
    /// multiple choice, plain numbers become range answers)
    #[arg(long = "answer", value_parser = parse_answer_pair)]
    answers: Vec<(String, String)>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Catalog {
            command: CatalogCommand::Preview(args),
        } => {
            run_catalog_preview(args);
            Ok(())
        }
    }
}

fn parse_answer_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(id, value)| (id.trim().to_string(), value.trim().to_string()))
        .filter(|(id, _)| !id.is_empty())
        .ok_or_else(|| format!("expected id=value, got '{raw}'"))
}

fn coerce_answer(raw: &str) -> AnswerValue {
    if raw.contains(',') {
        return AnswerValue::Selections(
            raw.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        );
    }
    if let Ok(number) = raw.parse::<f64>() {
        return AnswerValue::Number(number);
    }
    AnswerValue::from(raw)
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let catalog = Arc::new(Catalog::branching());
    let mailer = Arc::new(SmtpMailer::from_config(&config.mail)?);
    let limiter = SlidingWindowLimiter::from_config(&config.rate_limit);
    let gateway = Arc::new(SubmissionGateway::new(
        catalog,
        mailer,
        limiter,
        config.mail.agency_email.clone(),
        config.mail.from_name.clone(),
    ));

    let app = lead_router(gateway)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .layer(Extension(state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "lead quiz service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn run_catalog_preview(args: PreviewArgs) {
    let catalog = if args.flat {
        Catalog::standard()
    } else {
        Catalog::branching()
    };

    let mut answers = AnswerMap::new();
    for (id, value) in &args.answers {
        answers.insert(id.clone(), coerce_answer(value));
    }

    let variant = if args.flat { "flat" } else { "branching" };
    println!("Catalog preview ({variant})");

    for question in catalog.questions() {
        let marker = if question.is_visible(&answers) {
            "visible"
        } else {
            "hidden "
        };
        let answered = match answers.get(&question.id) {
            Some(AnswerValue::Text(value)) => {
                format!(" | answered: {}", catalog.option_label(&question.id, value))
            }
            Some(AnswerValue::Selections(values)) => {
                let labels: Vec<&str> = values
                    .iter()
                    .map(|value| catalog.option_label(&question.id, value))
                    .collect();
                format!(" | answered: {}", labels.join(", "))
            }
            Some(AnswerValue::Number(value)) => format!(" | answered: {value}"),
            Some(AnswerValue::Contact(_)) => " | answered: contact details".to_string(),
            None => String::new(),
        };
        println!("- [{marker}] {} | {}{answered}", question.id, question.title);
    }

    let visible = catalog.visible_questions(&answers).len();
    println!("\nVisible: {visible} of {} questions", catalog.len());
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
