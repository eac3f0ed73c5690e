use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vod_uploader::config::{Config, DEFAULT_CONFIG_PATH};
use vod_uploader::core::{command_hooks, JsonLinesRecordSink, UploadRatioGauge};
use vod_uploader::{Hooks, Registry, Services, UploadManager, Vod};

#[derive(Parser, Debug)]
#[command(name = "vod-uploader")]
#[command(author, version, about = "Mirrors recorded VODs to video hosting destinations", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "VOD_UPLOADER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn shutdown_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
            cancel.cancel();
        }
    });
}

/// Feeds every newline-delimited VOD message from `reader` to `manager`.
/// Lines that are not valid UTF-8 JSON are logged and skipped.
/// Returns how many VODs were processed.
async fn serve<R>(
    mut reader: R,
    manager: &UploadManager,
    cancel: &CancellationToken,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut processed = 0;
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = reader.read_until(b'\n', &mut line) => read?,
        };
        if read == 0 {
            break;
        }
        if line.trim_ascii().is_empty() {
            continue;
        }

        let vod: Vod = match serde_json::from_slice(line.trim_ascii()) {
            Ok(vod) => vod,
            Err(err) => {
                tracing::error!(error = %err, "unable to decode VOD message");
                continue;
            }
        };

        let outcomes = manager.process(cancel, &vod).await;
        processed += 1;
        for outcome in &outcomes {
            if outcome.success {
                tracing::info!(
                    vod.id = %vod.id,
                    destination = %outcome.destination,
                    identifiers = ?outcome.identifiers,
                    "destination done"
                );
            } else {
                tracing::warn!(
                    vod.id = %vod.id,
                    destination = %outcome.destination,
                    error = outcome.error.as_deref().unwrap_or_default(),
                    "destination failed"
                );
            }
        }
    }

    Ok(processed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.apply_env();
    init_tracing(config.uploader.verbose);
    config.validate()?;

    let hooks = if config.plugins.enabled {
        command_hooks(config.plugins.command.clone())
    } else {
        Hooks::new()
    };
    let gauge = Arc::new(UploadRatioGauge::new());
    let services = Services {
        sink: Arc::new(JsonLinesRecordSink::new(&config.uploader.record_file)),
        gauge: gauge.clone(),
        hooks: hooks.clone(),
    };

    let registry = Registry::builtin();
    let destinations = config.enabled_destinations();
    if destinations.is_empty() {
        tracing::warn!(available = ?registry.names(), "no destination is enabled, VODs will only be logged");
    }
    let uploaders = registry.build(&destinations, &config, &services)?;
    let manager = UploadManager::new(uploaders, hooks)
        .with_destination_delay(config.uploader.destination_delay);
    tracing::info!(destinations = ?manager.destinations(), "waiting for VODs on stdin");

    let cancel = CancellationToken::new();
    shutdown_on_ctrl_c(cancel.clone());

    let processed = serve(BufReader::new(tokio::io::stdin()), &manager, &cancel).await?;

    for (labels, percent) in gauge.snapshot() {
        tracing::debug!(vod.id = %labels.id, vod.title = %labels.vod_title, percent, "last upload ratio");
    }
    tracing::info!(processed, "stdin closed");

    Ok(())
}
