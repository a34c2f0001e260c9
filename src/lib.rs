//! Roadwatch - road damage detection dashboard.
//!
//! Downloads street-level imagery around a location, runs an ONNX object
//! detector over it and renders the geo-tagged detections on a map.

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod constants;
pub mod dashboard;
pub mod error;
pub mod geo;
pub mod geocode;
pub mod imagery;
pub mod inference;
pub mod intake;
pub mod locking;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod summary;
pub mod utils;

use clap::Parser;
use cli::{
    Cli, Command, ConfigAction, FetchArgs, InferArgs, MapArgs, ModelArgs, ReportArgs, ServeArgs,
    SummaryArgs,
};
use config::{
    Config, DataPaths, ModelConfig, OutputFormat, config_file_path, load_config_file,
    load_default_config, resolve_api_key, save_config, validate_config, validate_radius,
};
use constants::output_files;
use dashboard::server::{AppState, run_server};
use dashboard::{
    Dashboard, Engine, MapOptions, Mode, RunOutcome, SessionContext, default_labels, load_markers,
    render_map,
};
use error::FetchFailure;
use geo::Coordinate;
use geocode::Geocoder;
use imagery::{Coverage, FetchReport, FetchRequest, FetchSettings, fetch_imagery};
use locking::OperationLock;
use output::DetectionReport;
use pipeline::output_path_for;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub use error::{Error, Result};

/// Main entry point for the roadwatch CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet);

    // Remove lock files and staging directories on interrupt
    if let Err(e) = ctrlc::set_handler(|| {
        locking::cleanup_all();
        std::process::exit(130); // 128 + SIGINT(2)
    }) {
        warn!("Failed to install Ctrl+C handler: {e}");
    }

    let config = match cli.global.config.as_deref() {
        Some(path) => load_config_file(path)?,
        None => load_default_config()?,
    };

    let Some(command) = cli.command else {
        cli::help::print_smart_help(&config);
        return Ok(());
    };

    if let Command::Config { action } = command {
        return handle_config_command(action, &config, cli.global.config.as_deref());
    }

    validate_config(&config)?;
    let paths = DataPaths::resolve(&config, cli.global.data_dir.as_deref())?;
    let progress = !cli.global.quiet;

    match command {
        Command::Infer(args) => handle_infer(args, config, paths, progress),
        Command::Fetch(args) => handle_fetch(args, config, paths, progress),
        Command::Summary(args) => handle_summary(&args, &config, &paths),
        Command::Map(args) => handle_map(&args, &config, &paths),
        Command::Geocode { query } => handle_geocode(&query, &config),
        Command::Report(args) => handle_report(&args, &paths),
        Command::Serve(args) => handle_serve(args, config, paths),
        Command::Unlock => handle_unlock(&paths),
        Command::Config { .. } => Ok(()),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    // ORT logging is noisy at load time; -v and above let it through.
    let filter_str = if quiet {
        "warn,ort=off".to_string()
    } else {
        match verbose {
            0 => "info,ort=off".to_string(),
            1 => "debug,ort=warn".to_string(),
            2 => "trace,ort=info".to_string(),
            _ => "trace".to_string(),
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn create_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| Error::Internal {
        message: format!("failed to create async runtime: {e}"),
    })
}

/// Apply `--model-path`, `--labels-path` and `--layout` on top of the config.
fn apply_model_overrides(config: &mut Config, args: &ModelArgs) {
    let model = match (config.model.take(), &args.model_path) {
        (Some(mut model), path) => {
            if let Some(path) = path {
                model.path.clone_from(path);
            }
            Some(model)
        }
        (None, Some(path)) => {
            let labels = args
                .labels_path
                .clone()
                .unwrap_or_else(|| path.with_extension("txt"));
            Some(ModelConfig::new(path.clone(), labels))
        }
        (None, None) => None,
    };

    config.model = model.map(|mut model| {
        if let Some(labels) = &args.labels_path {
            model.labels.clone_from(labels);
        }
        if let Some(layout) = args.layout {
            model.layout = layout;
        }
        model
    });
}

fn handle_infer(
    args: InferArgs,
    mut config: Config,
    mut paths: DataPaths,
    progress: bool,
) -> Result<()> {
    apply_model_overrides(&mut config, &args.model);
    if let Some(formats) = args.format {
        config.defaults.formats = formats;
    }
    if let Some(images) = args.images {
        paths.images_dir = images;
    }
    if let Some(output_dir) = args.output_dir {
        paths.output_dir = output_dir;
    }

    let threshold = args
        .confidence
        .unwrap_or(config.defaults.confidence_threshold);
    let session = SessionContext::from_config(&config).with_threshold(threshold)?;

    let engine = Engine::load(&config)?;
    let dashboard = Dashboard::new(&config, paths, engine, None, progress);
    let (_, outcome) = dashboard.run_preloaded(session)?;
    print_outcome(&outcome);
    Ok(())
}

fn handle_fetch(
    args: FetchArgs,
    mut config: Config,
    paths: DataPaths,
    progress: bool,
) -> Result<()> {
    let radius = args.radius.unwrap_or(config.defaults.radius_km);
    validate_radius(radius)?;
    let explicit = match (args.lat, args.lon) {
        (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)?),
        _ => None,
    };

    apply_model_overrides(&mut config, &args.model);
    if args.high_res {
        config.imagery.high_res = true;
    }
    if let Some(max_images) = args.max_images {
        config.imagery.max_images = max_images.max(1);
    }

    let api_key =
        resolve_api_key(args.api_key.as_deref())?.ok_or(FetchFailure::MissingCredential)?;
    let threshold = args
        .confidence
        .unwrap_or(config.defaults.confidence_threshold);
    let session = SessionContext::from_config(&config)
        .with_mode(Mode::Fetch)
        .with_radius(radius)?
        .with_threshold(threshold)?;

    let runtime = create_runtime()?;
    let center = match (explicit, args.place.as_deref()) {
        (Some(center), _) => center,
        (None, Some(place)) => {
            let geocoder = Geocoder::new(&config.geocode)?;
            runtime.block_on(geocoder.search(place))?.location
        }
        (None, None) => {
            return Err(Error::ConfigValidation {
                message: "a location is required (--lat/--lon or --place)".to_string(),
            });
        }
    };

    if args.download_only {
        let request = FetchRequest::new(center.lat, center.lon, radius)?;
        let _lock = OperationLock::acquire(&paths.data_dir, "fetch")?;
        let settings = FetchSettings::from_config(&config.imagery, progress);
        let report = runtime.block_on(fetch_imagery(
            &request,
            Some(&api_key),
            &paths.images_dir,
            &settings,
        ))?;
        print_fetch(&report);
        return Ok(());
    }

    let engine = Engine::load(&config)?;
    let dashboard = Arc::new(Dashboard::new(
        &config,
        paths,
        engine,
        Some(api_key),
        progress,
    ));
    let (_, outcome) = runtime.block_on(dashboard.download_and_process(session, center))?;
    print_outcome(&outcome);
    Ok(())
}

fn handle_summary(args: &SummaryArgs, config: &Config, paths: &DataPaths) -> Result<()> {
    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| output_path_for(&paths.output_dir, OutputFormat::Json));
    let report = DetectionReport::load(&report_path)?;
    let threshold = args
        .confidence
        .unwrap_or(config.defaults.confidence_threshold);
    let summary = summary::summarize(&report, threshold);

    if args.json {
        let json = serde_json::to_string_pretty(&summary).map_err(|e| Error::Internal {
            message: format!("failed to serialize summary: {e}"),
        })?;
        println!("{json}");
    } else {
        println!("Report: {}", report_path.display());
        println!("Threshold: {threshold:.2}");
        print!("{}", summary.render());
    }
    Ok(())
}

fn handle_map(args: &MapArgs, config: &Config, paths: &DataPaths) -> Result<()> {
    let markers = load_markers(paths, args.mode, args.labels.as_deref())?;
    let [lat, lon] = config.defaults.map_center;
    let options = MapOptions {
        title: "Road Damage Detection".to_string(),
        center: Coordinate { lat, lon },
        zoom: config.defaults.map_zoom,
        image_dir: Some(paths.output_dir.clone()),
        label_filter: args.labels.clone(),
        interactive: false,
    };
    let html = render_map(&markers, &default_labels(config), &options);

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| paths.output_dir.join(output_files::MAP));
    utils::fs::write_atomic(&output, html.as_bytes())?;
    println!(
        "Wrote map with {} markers to {}",
        markers.features.len(),
        output.display()
    );
    Ok(())
}

fn handle_geocode(query: &str, config: &Config) -> Result<()> {
    let geocoder = Geocoder::new(&config.geocode)?;
    let place = create_runtime()?.block_on(geocoder.search(query))?;
    println!(
        "{:.6}, {:.6}  {}",
        place.location.lat, place.location.lon, place.display_name
    );
    Ok(())
}

fn handle_unlock(paths: &DataPaths) -> Result<()> {
    if !OperationLock::is_held(&paths.data_dir) {
        println!("No operation lock in {}", paths.data_dir.display());
        return Ok(());
    }
    match OperationLock::holder(&paths.data_dir) {
        Some(info) => println!(
            "Removing {} lock held by pid {} since {}",
            info.operation, info.pid, info.started
        ),
        None => println!("Removing unreadable operation lock"),
    }
    OperationLock::remove_stale(&paths.data_dir)?;
    println!("Removed {}", OperationLock::lock_path_for(&paths.data_dir).display());
    Ok(())
}

fn handle_report(args: &ReportArgs, paths: &DataPaths) -> Result<()> {
    if args.stats {
        let today = chrono::Local::now().date_naive();
        let stats = intake::report_stats(&paths.reports_dir, today)?;
        print!("{}", stats.render());
        return Ok(());
    }

    let (Some(image), Some(lat), Some(lon)) = (args.image.as_deref(), args.lat, args.lon) else {
        return Err(Error::ConfigValidation {
            message: "--image, --lat and --lon are required to submit a report".to_string(),
        });
    };
    let submitted = intake::submit_report(&paths.reports_dir, image, Coordinate::new(lat, lon)?)?;
    println!(
        "Stored report {} ({})",
        submitted.record.id,
        submitted.path.display()
    );
    Ok(())
}

fn handle_serve(args: ServeArgs, mut config: Config, paths: DataPaths) -> Result<()> {
    apply_model_overrides(&mut config, &args.model);
    let bind = args.bind.clone().unwrap_or_else(|| config.server.bind.clone());

    let api_key = resolve_api_key(args.api_key.as_deref())?;
    if api_key.is_none() {
        warn!("No imagery API key configured; downloads will fail");
    }

    let engine = Engine::load(&config)?;
    let dashboard = Dashboard::new(&config, paths, engine, api_key, false);
    let session = SessionContext::from_config(&config).with_mode(args.mode);
    if session.mode() == Mode::Preloaded {
        let markers = dashboard.markers(&session)?;
        info!("Loaded {} pre-loaded markers", markers.features.len());
    }

    let state = AppState::new(dashboard, Geocoder::new(&config.geocode)?, session);
    create_runtime()?.block_on(run_server(&bind, state))
}

fn print_fetch(report: &FetchReport) {
    if report.coverage == Coverage::NoCoverage {
        println!("No imagery available in this area.");
    } else {
        println!(
            "Downloaded {} of {} images into {}",
            report.image_count,
            report.found,
            report.images_dir.display()
        );
    }
}

fn print_outcome(outcome: &RunOutcome) {
    if let Some(fetch) = &outcome.fetch {
        print_fetch(fetch);
        if fetch.coverage == Coverage::NoCoverage {
            println!("Skipped detection.");
        }
    }
    print!("{}", outcome.summary.render());

    if !outcome.failed_images.is_empty() {
        println!("{} images could not be processed:", outcome.failed_images.len());
        for failure in &outcome.failed_images {
            println!("  {}: {}", failure.image, failure.reason);
        }
    }
    if !outcome.missing_metadata.is_empty() {
        println!(
            "{} images with detections have no coordinates and are not on the map",
            outcome.missing_metadata.len()
        );
    }
    for path in &outcome.outputs {
        println!("Wrote {}", path.display());
    }
}

fn handle_config_command(
    action: ConfigAction,
    config: &Config,
    explicit: Option<&Path>,
) -> Result<()> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };

    match action {
        ConfigAction::Init => {
            if path.exists() {
                println!("Configuration file already exists: {}", path.display());
            } else {
                save_config(&Config::default(), &path)?;
                println!("Created configuration file: {}", path.display());
                println!("\nNext steps:");
                println!("  Set [model] path and labels in {}", path.display());
            }
            Ok(())
        }
        ConfigAction::Show => {
            let text = toml::to_string_pretty(config)
                .map_err(|e| Error::ConfigSerialize { source: e })?;
            println!("{text}");
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}
