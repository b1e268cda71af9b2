use order_fulfillment::app::App;
use std::env;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Reads `app.log_level` without validating the rest of the file.
fn peek_log_level(path: &str) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let value: serde_yaml::Value = serde_yaml::from_str(&content).ok()?;
    value
        .get("app")?
        .get("log_level")?
        .as_str()
        .map(str::to_string)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config_path = parse_config_path();
    init_tracing(peek_log_level(&config_path).as_deref());

    let app = match App::from_config_path(&config_path).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to start service: {}", e);
            std::process::exit(1);
        }
    };

    info!(config = %config_path, "Service initialized");

    if let Err(e) = app.run().await {
        error!(error = %e, "Service error");
        app.stop().await;
    }
}
