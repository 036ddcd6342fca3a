use clap::{Parser, Subcommand};
use image::ImageReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use roadeye::config::{CountrySetting, Settings};
use roadeye::core::db::DetectionDb;
use roadeye::detection::ocr::build_recognizers;
use roadeye::detection::{ContourPlateDetector, PlatePreprocessor, RecognitionFusionEngine, RegionSelector, SelectionMode};
use roadeye::pipeline::PlatePipeline;
use roadeye::stream::{RecognitionPool, StreamOrchestrator};
use roadeye::tracking::PlateTracker;
use roadeye::web::{self, AppState};

#[derive(Parser)]
#[command(name = "roadeye")]
#[command(about = "Recognize vehicle license plates in images and video streams")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to a JSON settings file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the ocrs models
    #[arg(long, global = true, env = "ROADEYE_MODEL_DIR", value_name = "DIR")]
    model_dir: Option<PathBuf>,

    /// Active country template (IN, UK, DE)
    #[arg(long, global = true)]
    country: Option<String>,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, global = true, value_name = "DIR")]
    debug_out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP and WebSocket server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// SQLite URL, e.g. sqlite://detections.db
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
        /// Concurrent recognition jobs
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Detect plates in a single image and print them
    Detect {
        /// Path to input image file
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(true)
        .init();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(dir) = &cli.model_dir {
        settings.recognition.model_dir = Some(dir.clone());
    }
    if let Some(country) = &cli.country {
        settings.recognition.country = country.clone();
    }

    let country = Arc::new(CountrySetting::new(&settings.recognition.country));
    let pipeline = Arc::new(build_pipeline(&settings, country.clone(), cli.debug_out.clone())?);

    match cli.command {
        Command::Serve {
            host,
            port,
            database_url,
            workers,
        } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            if let Some(workers) = workers {
                settings.server.workers = workers;
            }
            serve(settings, pipeline, country, database_url).await?;
        }
        Command::Detect { image_path } => {
            detect(&pipeline, &image_path, cli.verbose)?;
        }
    }

    Ok(())
}

/// Detector, engines and selection wired together once at startup.
fn build_pipeline(
    settings: &Settings,
    country: Arc<CountrySetting>,
    debug_out: Option<PathBuf>,
) -> anyhow::Result<PlatePipeline> {
    let recognizers = build_recognizers(&settings.recognition)?;
    let fusion = RecognitionFusionEngine::new(
        recognizers,
        PlatePreprocessor::new(settings.preprocess.clone()),
        country,
    );
    let mut pipeline = PlatePipeline::new(
        Arc::new(ContourPlateDetector::default()),
        RegionSelector::from(&settings.selection),
        fusion,
    );
    if let Some(dir) = debug_out {
        pipeline = pipeline.with_debug(dir)?;
    }
    tracing::info!(
        engines = ?pipeline.fusion().engine_names(),
        country = %settings.recognition.country,
        "Pipeline ready"
    );
    Ok(pipeline)
}

fn detect(pipeline: &PlatePipeline, image_path: &Path, verbose: bool) -> anyhow::Result<()> {
    if verbose {
        println!("Loading image: {:?}", image_path);
    }

    let img = ImageReader::open(image_path)?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;

    if verbose {
        println!("Image loaded: {}x{}\n", img.width(), img.height());
    }

    let analysis = pipeline.analyze(&img, SelectionMode::AllQualifying);

    println!("\n=== License Plate Detection Results ===");
    println!("Regions examined: {}", analysis.readings.len());

    let plates: Vec<_> = analysis.readings.iter().filter(|r| !r.plate.is_empty()).collect();
    if plates.is_empty() {
        println!("No plates recognized.");
    } else {
        println!("\nRecognized plates:");
        for reading in plates {
            let b = reading.region.bbox;
            println!(
                "  {} at ({}, {})-({}, {}) - confidence: {:.2} (region {:.2})",
                reading.plate.text, b.x1, b.y1, b.x2, b.y2, reading.plate.confidence, reading.region.confidence
            );
        }
    }

    Ok(())
}

async fn serve(
    settings: Settings,
    pipeline: Arc<PlatePipeline>,
    country: Arc<CountrySetting>,
    database_url: Option<String>,
) -> anyhow::Result<()> {
    let db = match database_url {
        Some(url) => DetectionDb::open_url(&url).await?,
        None => DetectionDb::open(&settings.storage.database_path).await?,
    };

    let uploads_dir = settings.storage.uploads_dir.clone();
    std::fs::create_dir_all(uploads_dir.join(web::IMAGES_DIR))?;

    let pool = RecognitionPool::new(settings.server.workers);
    let tracker = Arc::new(PlateTracker::new(&settings.tracking));
    let sweeper = tracker.spawn_sweeper(settings.tracking.sweep_interval());
    let orchestrator = Arc::new(StreamOrchestrator::new(
        pipeline.clone(),
        tracker,
        db.clone(),
        pool.clone(),
        settings.recognition.stream_min_confidence,
    ));

    let pool_workers = pool.workers();
    let state = AppState {
        pipeline,
        orchestrator,
        db: db.clone(),
        pool,
        country,
        uploads_dir,
        image_min_confidence: settings.recognition.image_min_confidence,
        outbound_buffer: settings.server.outbound_buffer,
    };
    let app = web::build_app(state, &settings.server.allowed_origins);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!(%addr, workers = pool_workers, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    db.close().await;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
