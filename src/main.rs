mod app;
mod completion;
mod config;
mod http;
mod line;
mod relay;

use crate::app::{AppHandles, SentryGuard};
use crate::config::{AppConfig, Credentials};
use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use std::path::PathBuf;
use tracing::log::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

const VERSION: &str = env!("VERSION");

/// Used when `RUST_LOG` is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Parser)]
#[command(name = "line-relay", about = env!("CARGO_PKG_DESCRIPTION"), version = VERSION)]
struct CliArguments {
    /// TOML config file, defaults to ./config.toml when present.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Load the config and credentials, then exit without serving.
    #[arg(long)]
    check: bool,
}

pub type TracingReloadHandle = reload::Handle<EnvFilter, Registry>;

fn init_tracing() -> TracingReloadHandle {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let (filter_layer, reload_handle) = reload::Layer::new(filter);

    let registry = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer());

    #[cfg(feature = "sentry")]
    let registry = registry.with(sentry_tracing::layer());

    registry.init();
    reload_handle
}

/// The file config with environment overrides applied, plus the env-only secrets.
fn load_settings(config_path: Option<PathBuf>) -> Result<(AppConfig, Credentials)> {
    let mut config = AppConfig::load(config_path)?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    let credentials = Credentials::from_env()?;
    Ok((config, credentials))
}

#[cfg(feature = "sentry")]
fn init_sentry(config: &AppConfig) -> SentryGuard {
    let sentry_config = config.sentry.as_ref()?;
    let panic_integration = sentry_panic::PanicIntegration::default().add_extractor(|_| None);

    let guard = sentry::init((
        sentry_config.dsn.clone(),
        sentry::ClientOptions {
            environment: sentry_config.environment.clone().map(Into::into),
            server_name: sentry_config.server_name.clone().map(Into::into),
            debug: sentry_config.debug,
            send_default_pii: sentry_config.send_default_pii,
            release: Some(VERSION.into()),
            integrations: vec![std::sync::Arc::new(panic_integration)],
            ..Default::default()
        },
    ));
    info!("Reporting errors to Sentry");
    Some(guard)
}

#[cfg(not(feature = "sentry"))]
fn init_sentry(_config: &AppConfig) -> SentryGuard {
    None
}

fn main() -> Result<()> {
    dotenv().ok();
    let tracing_reload = init_tracing();
    info!("line-relay {VERSION}");

    let args = CliArguments::parse();
    let (config, credentials) = load_settings(args.config)?;
    if args.check {
        info!("Configuration OK: {config:?} {credentials:?}");
        return Ok(());
    }

    let sentry_guard = init_sentry(&config);
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async move {
            AppHandles::new(config, credentials, tracing_reload, sentry_guard)?
                .run()
                .await;
            Ok(())
        })
}
