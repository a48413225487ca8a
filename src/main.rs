use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use stac_sync::builder::{BuildOutcome, CatalogBuilder};
use stac_sync::config::Settings;
use stac_sync::extract::{RasterReader, RasterSource};
use stac_sync::logging::{init_logging, LogFormat};
use stac_sync::pipeline::EventPipeline;
use stac_sync::s3_operations::S3Provider;
use stac_sync::transport::{spawn_line_reader, LinePublisher};
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Parser)]
#[command(version, about = "Keeps a STAC catalog in sync with a bucket of raster acquisitions")]
struct Cli {
    /// Settings file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handle `subject payload` requests from stdin, publishing results to stdout
    Run,
    /// Create the collection of a sensor key and items for all of its acquisitions
    Collection { sensor_key: String },
    /// Create the item of an acquisition key
    Item { acquisition_key: String },
    /// Print footprint, CRS and grid of a raster url
    Probe { url: Url },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let settings = Settings::read(&cli.config)?;
    let provider = S3Provider::from_settings(&settings.object_store).await;

    match cli.command {
        Command::Run => run(&settings, &provider).await?,
        Command::Collection { sensor_key } => {
            let builder = CatalogBuilder::new(&settings, &provider);
            print_outcome(&builder.ensure_collection(&sensor_key).await?);
        }
        Command::Item { acquisition_key } => {
            let builder = CatalogBuilder::new(&settings, &provider);
            print_outcome(&builder.ensure_item(&acquisition_key).await?);
        }
        Command::Probe { url } => {
            let reader = RasterReader::new(&provider, settings.worker.header_bytes);
            let source = RasterSource::Url(url);
            let (footprint, crs) = reader.extract_footprint(&source).await;
            let (shape, transform) = reader.extract_grid(&source).await;
            let summary = json!({
                "bbox": footprint.bounds(),
                "epsg": crs.epsg(),
                "shape": shape,
                "transform": transform,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

async fn run(settings: &Settings, provider: &S3Provider) -> Result<()> {
    let (tx, rx) = mpsc::channel(settings.worker.channel_capacity);
    let reader = spawn_line_reader(std::io::BufReader::new(std::io::stdin()), tx);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            let _ = shutdown_tx.send(true);
        }
    });

    let publisher = LinePublisher::new(tokio::io::stdout());
    let pipeline = EventPipeline::new(CatalogBuilder::new(settings, provider), &publisher);
    info!(
        inbound = %settings.worker.inbound_prefix,
        outbound = %settings.worker.outbound_prefix,
        "Waiting for requests"
    );
    let stats = pipeline.run(rx, shutdown_rx).await;

    if reader.is_finished() {
        let forwarded = reader
            .join()
            .map_err(|_| anyhow!("Inbound reader panicked"))??;
        info!(forwarded, "Inbound reader finished");
    } else {
        // still blocked on stdin; the thread ends with the process
        debug!("Leaving inbound reader behind");
    }
    if stats.failed > 0 {
        warn!(failed = stats.failed, "Some requests failed");
    }
    Ok(())
}

fn print_outcome(outcome: &BuildOutcome) {
    match &outcome.key {
        Some(key) => println!("{} {}", outcome.kind, key),
        None => println!("{} not created", outcome.kind),
    }
}
