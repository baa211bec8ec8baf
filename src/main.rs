use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use rasterfetch::{
    suffix_description, ExecutionStage, LocatorSource, Pipeline, PipelineConfig,
    ProgressRenderer, StageEvent, TileCatalog, TOPODATA_BASE_URL,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "rasterfetch")]
#[command(about = "Download raster tile archives and extract their GeoTIFFs", long_about = None)]
#[command(version)]
struct Args {
    /// Archive URLs to fetch, in order (repeatable)
    #[arg(short, long = "url")]
    urls: Vec<String>,

    /// Tile codes to resolve through the catalog (comma-separated, e.g. "12S45_,13S45_")
    #[arg(short, long, value_delimiter = ',')]
    tiles: Vec<String>,

    /// Product suffixes to fetch for each tile (comma-separated)
    #[arg(short, long, value_delimiter = ',', default_value = "ZN")]
    products: Vec<String>,

    /// CSV catalog with a `code,suffix,file_name` header
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Base URL prepended to catalog file names
    #[arg(long, default_value = TOPODATA_BASE_URL)]
    base_url: String,

    /// Working directory for archives and extracted rasters
    #[arg(short, long, default_value = "rasters")]
    output: PathBuf,

    /// Payload file suffixes to keep (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = ".tif,.tiff")]
    extensions: Vec<String>,

    /// Which stages to run
    #[arg(long, value_enum, default_value_t = StageArg::All)]
    stage: StageArg,

    /// Connect timeout per request (e.g. "30s", "1m")
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    connect_timeout: Duration,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StageArg {
    All,
    FetchOnly,
    ExtractOnly,
}

impl From<StageArg> for ExecutionStage {
    fn from(stage: StageArg) -> Self {
        match stage {
            StageArg::All => ExecutionStage::All,
            StageArg::FetchOnly => ExecutionStage::FetchOnly,
            StageArg::ExtractOnly => ExecutionStage::ExtractOnly,
        }
    }
}

fn collect_locators(args: &Args) -> anyhow::Result<Vec<String>> {
    let mut locators = args.urls.clone();

    if !args.tiles.is_empty() {
        let Some(catalog_path) = &args.catalog else {
            bail!("--tiles requires --catalog");
        };
        let catalog = TileCatalog::load(catalog_path, args.base_url.clone())
            .with_context(|| format!("failed to load catalog {:?}", catalog_path))?;
        if catalog.is_empty() {
            bail!("catalog {:?} lists no tiles", catalog_path);
        }
        info!("📋 Catalog lists {} tiles", catalog.len());

        for (code, suffix) in catalog.missing(&args.tiles, &args.products) {
            warn!(
                "⚠️  No {} ({}) product listed for tile {}",
                suffix,
                suffix_description(&suffix).unwrap_or("unknown product"),
                code
            );
        }
        locators.extend(catalog.locators(&args.tiles, &args.products));
    }

    Ok(locators)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("rasterfetch={}", log_level))
        .with_writer(std::io::stderr)
        .init();

    info!("🛰️  RasterFetch - raster tile downloader");
    info!("Output directory: {:?}", args.output);

    let stage = ExecutionStage::from(args.stage);
    let locators = collect_locators(&args)?;

    if stage != ExecutionStage::ExtractOnly && locators.is_empty() {
        eprintln!("Error: nothing to fetch; pass --url or --tiles with --catalog");
        std::process::exit(1);
    }

    // Create output directory if it doesn't exist
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create {:?}", args.output))?;

    let config = PipelineConfig {
        destination_dir: args.output.clone(),
        payload_extensions: args.extensions.clone(),
        connect_timeout: args.connect_timeout,
        stage,
        ..PipelineConfig::default()
    };

    let pipeline = Pipeline::new(config, locators)?;

    let canceller = pipeline.canceller();
    // Every interrupt cancels whichever stage is running at that moment.
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received, cancelling...");
            canceller.cancel();
        }
    });

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<StageEvent>();
    let renderer = ProgressRenderer::new(atty::is(atty::Stream::Stderr));
    let render_task = tokio::spawn(renderer.drain(rx));

    let result = pipeline.run(&tx).await;
    drop(tx);
    render_task.await?;

    if result.cancelled {
        warn!("Run was cancelled before all items were processed");
    }
    if result.archives.len() < result.requested {
        warn!(
            "⚠️  Only {} of {} archives are available",
            result.archives.len(),
            result.requested
        );
    }
    info!(
        "✅ {} raster file(s) in {:?}",
        result.payloads.len(),
        result.destination
    );
    for path in &result.payloads {
        println!("{}", path.display());
    }

    Ok(())
}
