//! taggrid CLI: scan a tag grid, decode single images, grab snapshots and
//! persist a recalibrated ROI.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use log::{info, warn, LevelFilter};
use taggrid::pipeline::ScanVisualization;
use taggrid::{
    load_gray, open_source, save_gray, store_roi, AcquisitionSettings, AcquisitionWorker,
    NotificationTemplate, Roi, ScanStage, Scanner, ScannerConfig,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "taggrid")]
#[command(about = "Scan a grid of binary fiducial tags and report changes")]
#[command(version)]
struct Cli {
    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scanner until `q` or end of input (or for a fixed duration).
    Scan(ScanArgs),

    /// Decode the tag grid in a single image and print it as JSON.
    Decode(DecodeArgs),

    /// Save one frame from the configured source.
    Snapshot {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Seconds to wait for the first frame.
        #[arg(long, default_value = "5.0")]
        timeout: f64,
    },

    /// Store a new ROI (TL, TR, BR, BL corners) in the config file.
    SetRoi {
        #[arg(long)]
        config: PathBuf,
        /// Corners as x0 y0 x1 y1 x2 y2 x3 y3, relative to the frame size
        /// unless --frame is given.
        #[arg(num_args = 8, value_name = "COORD", allow_negative_numbers = true)]
        corners: Vec<f64>,
        /// Interpret corners as pixels of a frame of this size.
        #[arg(long, num_args = 2, value_names = ["WIDTH", "HEIGHT"])]
        frame: Option<Vec<usize>>,
    },
}

#[derive(Debug, Clone, Args)]
struct ScanArgs {
    #[arg(long)]
    config: PathBuf,

    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Write the rectified ROI and the tile mosaic here whenever they change.
    #[arg(long)]
    viz_dir: Option<PathBuf>,

    /// Do not read commands from stdin.
    #[arg(long)]
    no_input: bool,
}

#[derive(Debug, Clone, Args)]
struct DecodeArgs {
    #[arg(long)]
    config: PathBuf,

    #[arg(long)]
    image: PathBuf,

    /// Ignore the configured ROI and use the whole image.
    #[arg(long)]
    full_frame: bool,

    /// Print the notification payload instead of the bare grid.
    #[arg(long)]
    template: bool,

    /// Write the rectified ROI and the tile mosaic here.
    #[arg(long)]
    viz_dir: Option<PathBuf>,
}

fn init_logging(level: LevelFilter) {
    #[cfg(feature = "tracing")]
    {
        let _ = tracing_log::LogTracer::builder()
            .with_max_level(level)
            .init();
        taggrid::core::init_tracing(false);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let _ = taggrid::core::init_with_level(level);
    }
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let level: LevelFilter = cli
        .log_level
        .parse()
        .map_err(|_| format!("invalid log level {:?}", cli.log_level))?;
    init_logging(level);

    match cli.command {
        Commands::Scan(args) => run_scan(&args),
        Commands::Decode(args) => run_decode(&args),
        Commands::Snapshot {
            config,
            output,
            timeout,
        } => run_snapshot(&config, &output, timeout),
        Commands::SetRoi {
            config,
            corners,
            frame,
        } => run_set_roi(&config, &corners, frame.as_deref()),
    }
}

fn write_visualization(dir: &Path, viz: &ScanVisualization) -> CliResult<()> {
    std::fs::create_dir_all(dir)?;
    save_gray(&viz.rectified, dir.join("rectified.png"))?;
    save_gray(&viz.tiles, dir.join("tiles.png"))?;
    Ok(())
}

// ── scan ───────────────────────────────────────────────────────────────

enum InputCommand {
    Quit,
    ToggleVisualization,
}

fn spawn_input_reader() -> CliResult<Receiver<InputCommand>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let cmd = match line.trim() {
                    "q" | "quit" => InputCommand::Quit,
                    _ => InputCommand::ToggleVisualization,
                };
                let quit = matches!(cmd, InputCommand::Quit);
                if tx.send(cmd).is_err() || quit {
                    return;
                }
            }
            let _ = tx.send(InputCommand::Quit);
        })?;
    Ok(rx)
}

fn run_scan(args: &ScanArgs) -> CliResult<()> {
    let config = ScannerConfig::load_validated(&args.config)?;
    let mut scanner = Scanner::from_config(&config)?;
    if args.viz_dir.is_some() {
        scanner.set_visualization(true);
    }

    let input = if args.no_input {
        None
    } else {
        eprintln!("Press ENTER to toggle visualization, q + ENTER to quit.");
        Some(spawn_input_reader()?)
    };
    let deadline = args
        .duration
        .map(|s| Instant::now() + Duration::from_secs_f64(s.max(0.0)));
    let stop = scanner.stop_signal();

    scanner.run_with(deadline, |scanner, output| {
        if let Some(rx) = &input {
            match rx.try_recv() {
                Ok(InputCommand::Quit) | Err(TryRecvError::Disconnected) => stop.stop(),
                Ok(InputCommand::ToggleVisualization) => scanner.toggle_visualization(),
                Err(TryRecvError::Empty) => {}
            }
        }
        if let (Some(dir), Some(viz)) = (
            args.viz_dir.as_deref(),
            output.and_then(|o| o.visualization.as_ref()),
        ) {
            if let Err(err) = write_visualization(dir, viz) {
                warn!("cannot write visualization: {err}");
            }
        }
    });

    let status = scanner.acquisition_status();
    let summary = scanner.shutdown();
    info!(
        "{} results, {} notifications, {} frames, {} reconnects",
        summary.results, summary.notifications, status.frames, status.reconnects
    );
    Ok(())
}

// ── decode ─────────────────────────────────────────────────────────────

fn run_decode(args: &DecodeArgs) -> CliResult<()> {
    let config = ScannerConfig::load_validated(&args.config)?;
    let stage = ScanStage::from_config(&config)?;
    let frame = load_gray(&args.image)?;
    info!("decoding {} ({}x{})", args.image.display(), frame.width, frame.height);

    let roi = if args.full_frame {
        Roi::full_frame()
    } else {
        config.dimensions.roi
    };
    let (rectified, scan) = stage
        .run(&frame, &roi)
        .ok_or("the configured ROI cannot be rectified")?;

    let payload = if args.template {
        NotificationTemplate::from_config(&config.notify).render(&scan.grid)?
    } else {
        serde_json::to_string(&scan.grid)?
    };
    println!("{payload}");

    if let Some(dir) = &args.viz_dir {
        let tiles = taggrid::tags::render_tiles(&scan, taggrid::pipeline::MOSAIC_SCALE);
        write_visualization(dir, &ScanVisualization { rectified, tiles })?;
    }
    Ok(())
}

// ── snapshot ───────────────────────────────────────────────────────────

fn run_snapshot(config: &Path, output: &Path, timeout: f64) -> CliResult<()> {
    let config = ScannerConfig::load_validated(config)?;
    let source = open_source(&config.camera)?;
    let mut worker =
        AcquisitionWorker::spawn(source, AcquisitionSettings::from_config(&config.camera))?;
    let frame = worker
        .reader()
        .wait_first(Duration::from_secs_f64(timeout.max(0.0)))
        .ok_or("no frame received from the source")?;
    worker.stop();

    save_gray(&frame, output)?;
    eprintln!("Saved snapshot to {}", output.display());
    Ok(())
}

// ── set-roi ────────────────────────────────────────────────────────────

fn run_set_roi(config: &Path, corners: &[f64], frame: Option<&[usize]>) -> CliResult<()> {
    let [x0, y0, x1, y1, x2, y2, x3, y3] = corners else {
        return Err("expected exactly 8 corner coordinates".into());
    };
    let points = [[*x0, *y0], [*x1, *y1], [*x2, *y2], [*x3, *y3]];
    let roi = match frame {
        Some([w, h]) => Roi::from_abs(points, *w, *h),
        Some(_) => return Err("--frame takes WIDTH HEIGHT".into()),
        None => Roi::new(points),
    }
    .clamped();

    store_roi(config, &roi)?;
    eprintln!("{}", serde_json::to_string(&roi)?);
    eprintln!("Saved ROI to {}", config.display());
    Ok(())
}
