use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use geoshot::config::{self, AppConfig};
use geoshot::geotag::{GeoTag, read_geotag, tagger_from_config};
use geoshot::imaging::{RustBackend, get_dimensions};
use geoshot::output;
use geoshot::pipeline::Pipeline;
use geoshot::store::{StorePaths, is_valid_name};
use geoshot::urls::UrlResolver;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "geoshot")]
#[command(about = "Geotagged photo ingestion with resized derivatives")]
#[command(long_about = "\
Geotagged photo ingestion with resized derivatives

Each ingest decodes a base64 upload, stores it as the original, stamps
capture time, GPS position and bearing into its EXIF block, then writes one
resized JPEG per configured size. Any failure rolls the store back.

Store layout:

  media/
  ├── {id}.jpg           # tagged original
  └── {id}-{size}.jpg    # one per [[media.sizes]] entry

Run 'geoshot gen-config' to generate a documented geoshot.toml.")]
#[command(version)]
struct Cli {
    /// Config file, relative to the base directory unless absolute
    #[arg(long, default_value = "geoshot.toml", global = true)]
    config: PathBuf,

    /// Application base directory; the store path resolves against it
    #[arg(long, default_value = ".", global = true)]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store, geotag and resize one photo
    Ingest(IngestArgs),
    /// Print the public URLs of a media id
    Urls {
        /// Media id
        id: String,
    },
    /// Print the dimensions and geotag stored in an image
    Inspect {
        /// Image file
        path: PathBuf,
    },
    /// Delete everything in the media store
    ResetStore {
        /// Required; the store is emptied without further prompting
        #[arg(long)]
        yes: bool,
    },
    /// Print a stock geoshot.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct IngestArgs {
    /// Media id; names every file in the store
    id: String,

    /// File holding the base64 payload
    payload: PathBuf,

    /// Treat the payload file as raw image bytes instead of base64
    #[arg(long)]
    raw: bool,

    /// Longitude in degrees, east positive
    #[arg(long, allow_negative_numbers = true, value_parser = parse_longitude)]
    lon: f64,

    /// Latitude in degrees, north positive
    #[arg(long, allow_negative_numbers = true, value_parser = parse_latitude)]
    lat: f64,

    /// Camera bearing in degrees from true north
    #[arg(long, default_value_t = 0.0)]
    heading: f64,

    /// Capture time (RFC 3339); defaults to now
    #[arg(long)]
    created_at: Option<DateTime<Utc>>,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the ingest report as JSON
    #[arg(long)]
    json: bool,
}

fn parse_degrees(s: &str, limit: f64) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !(-limit..=limit).contains(&value) {
        return Err(format!("must be within ±{limit}"));
    }
    Ok(value)
}

fn parse_longitude(s: &str) -> Result<f64, String> {
    parse_degrees(s, 180.0)
}

fn parse_latitude(s: &str) -> Result<f64, String> {
    parse_degrees(s, 90.0)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Ingest(args) => {
            let app = load_app_config(&cli.base_dir, &cli.config)?;
            init_thread_pool(&app.media.processing);

            let raw = std::fs::read(&args.payload)?;
            let payload = if args.raw {
                STANDARD.encode(&raw)
            } else {
                String::from_utf8(raw)?
            };
            let tag = GeoTag {
                lon: args.lon,
                lat: args.lat,
                heading: args.heading,
                created_at: args.created_at.unwrap_or_else(Utc::now),
            };

            let store = StorePaths::new(app.media.store_root(&cli.base_dir));
            let pipeline = Pipeline::new(
                &app.media,
                store,
                RustBackend::new(),
                tagger_from_config(&app.media.tagger),
            );
            let result = match args.timeout {
                Some(secs) => pipeline.ingest_with_deadline(
                    &args.id,
                    &payload,
                    &tag,
                    Instant::now() + Duration::from_secs(secs),
                ),
                None => pipeline.ingest(&args.id, &payload, &tag),
            };
            match result {
                Ok(report) if args.json => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                Ok(report) => output::print_ingest_report(&report, &cli.base_dir),
                Err(e) => {
                    output::print_ingest_error(&e);
                    std::process::exit(if e.is_client_error() { 2 } else { 1 });
                }
            }
        }
        Command::Urls { id } => {
            if !is_valid_name(&id) {
                return Err(format!("invalid media id {id:?}: must be a single file name").into());
            }
            let app = load_app_config(&cli.base_dir, &cli.config)?;
            let urls = UrlResolver::from_config(&app.media);
            output::print_urls(&id, &urls.original_url_for(&id), &urls.all_urls_for(&id));
        }
        Command::Inspect { path } => {
            let dimensions = get_dimensions(&RustBackend::new(), &path)?;
            let tag = read_geotag(&path)?;
            output::print_inspect(&path, dimensions, tag.as_ref());
        }
        Command::ResetStore { yes } => {
            let app = load_app_config(&cli.base_dir, &cli.config)?;
            let store = StorePaths::new(app.media.store_root(&cli.base_dir));
            if !yes {
                return Err(format!(
                    "refusing to empty {} without --yes",
                    store.root().display()
                )
                .into());
            }
            store.reset_store()?;
            tracing::info!(root = %store.root().display(), "Store reset");
            println!("Emptied {}", store.root().display());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the config file, resolving a relative path against the base directory.
fn load_app_config(base_dir: &Path, config_path: &Path) -> Result<AppConfig, config::ConfigError> {
    let path = if config_path.is_absolute() {
        config_path.to_path_buf()
    } else {
        base_dir.join(config_path)
    };
    let app = config::load_config(&path)?;
    tracing::debug!(config = %path.display(), sizes = app.media.sizes.len(), "Config loaded");
    Ok(app)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; users can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
