use clap::{Parser, Subcommand};
use delta_resize::cache::DeltaCache;
use delta_resize::config::{self, Anchor, AspectRatio, OutputFormat, Profile, TransformConfig};
use delta_resize::imaging::RustBackend;
use delta_resize::process::{self, Batch, CancellationToken};
use delta_resize::raw::ExiftoolExtractor;
use delta_resize::report::{SessionInfo, SessionReport};
use delta_resize::{logging, naming, output, scan};
use std::path::PathBuf;
use tracing::{info, warn};

/// Transform settings that override the profile.
#[derive(clap::Args, Clone, Default)]
struct TransformArgs {
    /// Profile file (TOML). Stock defaults apply when omitted
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Output format: webp, jpeg, png, tiff, bmp, ico, pdf, avif
    #[arg(long, short = 'f')]
    format: Option<OutputFormat>,

    /// Target short edge in pixels
    #[arg(long, short = 's')]
    size: Option<u32>,

    /// Encoding quality (50-100)
    #[arg(long, short = 'q')]
    quality: Option<u32>,

    /// Enlarge images whose short edge is below the target
    #[arg(long)]
    upscale: bool,

    /// Crop to an aspect ratio after resizing, e.g. 1:1 or 16:9
    #[arg(long, value_name = "ASPECT")]
    crop: Option<AspectRatio>,

    /// Region kept when cropping, e.g. center, top-left, bottom-right
    #[arg(long, requires = "crop")]
    anchor: Option<Anchor>,

    /// Try a lower quality and keep it when visually indistinguishable
    #[arg(long)]
    smart: bool,
}

/// Input selection shared by `run` and `plan`.
#[derive(clap::Args, Clone)]
struct InputArgs {
    /// Directory containing the images to process
    input: PathBuf,

    /// Descend into subdirectories; outputs mirror the input tree
    #[arg(long, short = 'r')]
    recursive: bool,
}

#[derive(Parser)]
#[command(name = "delta-resize")]
#[command(about = "Batch image resizer with a delta-sync cache")]
#[command(long_about = "\
Batch image resizer with a delta-sync cache

Every image is scaled so its short edge matches the target size, optionally
cropped to a fixed aspect ratio, and re-encoded to a single format. Outputs
land in a fresh session directory per run:

  resized_images/
  ├── .delta-sync.json                 # Cache: fingerprint → prior output
  ├── run_20260314_091500/
  │   ├── session.json                 # Per-item results and stats
  │   ├── beach_800w_20260314_091500.webp
  │   └── trips/
  │       └── alps_800w_20260314_091500.webp
  └── run_20260314_093000_test/        # Verification pass (--test)

An unchanged source processed with unchanged settings is copied from the
previous output instead of being re-encoded.

Camera RAW files (.cr3) are converted from their embedded preview, which
requires exiftool on PATH.

Run 'delta-resize gen-config' to print a documented profile.")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resize and re-encode every image in a directory
    Run {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        transform: TransformArgs,

        /// Base output directory; each run creates a session directory inside
        #[arg(long, short = 'o', default_value = "resized_images")]
        output: PathBuf,

        /// Parallel workers (default: cores + 4, max 32)
        #[arg(long, short = 'w')]
        workers: Option<usize>,

        /// Ignore prior outputs; every image is re-encoded
        #[arg(long)]
        no_cache: bool,

        /// Verification pass: process only the first image with one worker
        #[arg(long)]
        test: bool,
    },
    /// Show what a run would do without decoding or writing anything
    Plan {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        transform: TransformArgs,
    },
    /// Print a stock profile with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs);

    match cli.command {
        Command::Run {
            input,
            transform,
            output: output_dir,
            workers,
            no_cache,
            test,
        } => {
            let mut profile = config::load_profile(transform.config.as_deref())?;
            let transform_config = resolve_transform(&profile, &transform)?;
            if workers.is_some() {
                profile.processing.max_workers = workers;
            }

            let mut items = scan::scan(&input.input, input.recursive)?;
            if items.is_empty() {
                println!("No supported images in {}", input.input.display());
                return Ok(());
            }
            if test {
                items.truncate(1);
            }

            std::fs::create_dir_all(&output_dir)?;
            let output_base = output_dir.canonicalize()?;
            let timestamp = naming::batch_timestamp(&chrono::Local::now());
            let session_root = output_base.join(naming::session_dir_name(&timestamp, test));

            let cache_path = profile
                .processing
                .cache_file
                .clone()
                .unwrap_or_else(|| DeltaCache::default_path(&output_base));
            let cache = if no_cache {
                DeltaCache::empty(cache_path)
            } else {
                DeltaCache::load(cache_path)
            };

            let cancel = CancellationToken::new();
            let handler_token = cancel.clone();
            if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
                warn!(error = %e, "could not install Ctrl+C handler");
            }

            let batch = Batch {
                items: &items,
                input_root: &input.input,
                session_root: &session_root,
                timestamp: &timestamp,
                config: &transform_config,
                workers: config::effective_workers(&profile.processing, test),
            };

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_process_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let outcome = process::run_batch(
                &RustBackend::new(),
                &ExiftoolExtractor::new(),
                &cache,
                &batch,
                &cancel,
                Some(tx),
            );
            if printer.join().is_err() {
                warn!("progress printer panicked");
            }
            let outcome = outcome?;

            let report = SessionReport::new(
                &SessionInfo {
                    timestamp: &timestamp,
                    input_root: &input.input,
                    session_root: &session_root,
                    test_pass: test,
                    config: &transform_config,
                },
                &outcome,
            );
            match report.write() {
                Ok(path) => info!(path = %path.display(), "session report written"),
                Err(e) => warn!(error = %e, "could not write session report"),
            }
            output::print_summary(&outcome, &session_root);
        }
        Command::Plan { input, transform } => {
            let profile = config::load_profile(transform.config.as_deref())?;
            let transform_config = resolve_transform(&profile, &transform)?;
            let items = scan::scan(&input.input, input.recursive)?;
            let plan = process::plan_batch(&items, &input.input, &transform_config);
            output::print_plan(&plan, &transform_config);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Apply command-line overrides to the profile's `[transform]` table and
/// validate the result.
fn resolve_transform(
    profile: &Profile,
    args: &TransformArgs,
) -> Result<TransformConfig, config::ConfigError> {
    let mut settings = profile.transform.clone();
    if let Some(format) = args.format {
        settings.format = format;
    }
    if let Some(size) = args.size {
        settings.size = size;
    }
    if let Some(quality) = args.quality {
        settings.quality = quality;
    }
    if args.upscale {
        settings.allow_upscale = true;
    }
    if let Some(aspect) = args.crop {
        settings.crop = true;
        settings.aspect = Some(aspect);
    }
    if let Some(anchor) = args.anchor {
        settings.anchor = Some(anchor);
    }
    if args.smart {
        settings.smart_optimize = true;
    }
    TransformConfig::try_from(settings)
}
