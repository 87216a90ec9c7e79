mod cli;
mod config;
mod error;
mod output;

use std::io;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use regwatch::utils::http_client::build_client;
use regwatch::{
    HttpBackend, NotificationDelivery, NotificationSettingsPatch, NotificationStore,
    NotificationsBackend,
};
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::cli::{Args, Commands, OutputFormat};
use crate::config::AppConfig;
use crate::output::{OutputManager, PrinterSink};

const API_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    init_logging(args.verbose, args.quiet, args.json_logs);

    let config_path = args.config.as_deref();
    let mut config = AppConfig::load(config_path).context("loading configuration")?;
    config.apply_overrides(args.base_url.clone(), args.token.clone());
    let output = OutputManager::new(config.colored_output);

    match args.command {
        Commands::Watch {
            output: format,
            no_history,
            limit,
        } => {
            let token = config.require_token(config_path)?.to_string();
            let mut delivery_config = config.delivery.clone();
            if no_history {
                delivery_config.load_history = false;
            }
            if let Some(limit) = limit {
                delivery_config.history_limit = limit;
            }

            let store = NotificationStore::from_config(&config.store);
            if !store.settings().show_toasts {
                info!("Toasts are disabled; enable with `regwatch settings --show-toasts true`");
            }

            let delivery = NotificationDelivery::http(config.stream.clone(), store, &token)
                .context("creating event stream")?
                .with_config(delivery_config)
                .with_alerts(Arc::new(PrinterSink::new(
                    OutputManager::new(config.colored_output),
                    format,
                )));
            watch(&delivery, &output, format).await?;
        }

        Commands::History {
            limit,
            output: format,
        } => {
            let backend = backend(&config, config_path)?;
            let records = backend
                .history(limit)
                .await
                .context("fetching notification history")?;
            println!("{}", output.format_history(&records, format)?);
        }

        Commands::MarkRead { id } => {
            let backend = backend(&config, config_path)?;
            backend
                .mark_read(&id)
                .await
                .with_context(|| format!("marking {id} as read"))?;
            info!(id = %id, "Marked as read");
        }

        Commands::MarkAllRead => {
            let backend = backend(&config, config_path)?;
            backend
                .mark_all_read()
                .await
                .context("marking all notifications as read")?;
            info!("Marked all notifications as read");
        }

        Commands::Settings {
            show_toasts,
            only_significant,
            output: format,
        } => {
            let store = NotificationStore::from_config(&config.store);
            let patch = NotificationSettingsPatch {
                show_toasts,
                show_only_significant: only_significant,
            };
            let settings = if patch.is_empty() {
                store.settings()
            } else {
                store.update_settings(patch)
            };
            println!("{}", output.format_settings(&settings, format)?);
        }

        Commands::Config { show, reset } => {
            if reset {
                let path = AppConfig::reset(config_path)?;
                println!("Configuration reset to defaults at {}", path.display());
            } else if show {
                println!("{}", config.show()?);
            } else {
                println!(
                    "Use --show to display current configuration or --reset to reset to defaults"
                );
            }
        }
    }

    Ok(())
}

/// Stream notifications until Ctrl-C.
async fn watch(
    delivery: &NotificationDelivery,
    output: &OutputManager,
    format: OutputFormat,
) -> anyhow::Result<()> {
    delivery.start().await;

    let state = delivery.state();
    let mut backlog: Vec<_> = state.notifications().collect();
    backlog.reverse();
    for notification in backlog {
        println!("{}", output.format_notification(notification, format)?);
    }

    let mut status = delivery.client().status();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for Ctrl-C")?;
                info!("Interrupted, shutting down");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                eprintln!("{}", output.format_status(&current, format));
            }
        }
    }

    delivery.shutdown().await;
    Ok(())
}

fn backend(
    config: &AppConfig,
    config_path: Option<&std::path::Path>,
) -> anyhow::Result<HttpBackend> {
    let token = config.require_token(config_path)?;
    config.stream.validate()?;
    let client = build_client(config.stream.connect_timeout_duration(), API_TIMEOUT);
    Ok(HttpBackend::new(client, config.stream.base()?, token))
}

fn init_logging(verbose: bool, quiet: bool, json: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(verbose)
                    .with_writer(io::stderr),
            )
            .init();
    }
}
