//! Mapping coordinator demo - Main Entry Point
//!
//! Runs the coordinator with the reference pose-graph engine over a
//! synthetic circular trajectory: a camera thread submits frames, the main
//! thread prints the published statistics, then labels the start of the
//! loop, plans a path back to it, exports the trajectory and closes.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use slam_coordinator::{
    config::CoordinatorConfig,
    coordinator::{Command, CoordinatorHandle, GoalTarget, MappingCoordinator, MappingEvent},
    engine::{PoseFormat, PoseGraphEngine},
    types::{
        pose_from_xyz_rpy, ImageBuffer, ImageEncoding, OdometryEvent, SensorFrame, SensorPayload,
        Uncertainty, STAT_IMAGES_BUFFERED, STAT_WORKING_MEMORY_SIZE,
    },
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Label given to the first node of the trajectory
const START_LABEL: &str = "start";

/// How long to wait for the worker to catch up
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "slam-coordinator", version, about = "Asynchronous SLAM mapping coordinator")]
struct Args {
    /// Path to TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Number of simulated camera frames
    #[arg(long, default_value_t = 60)]
    frames: u32,
    /// Simulated camera rate in Hz
    #[arg(long, default_value_t = 30.0)]
    rate: f64,
    /// Override the database path from the configuration
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,
    /// Write the trajectory to this file
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,
    /// Trajectory file format
    #[arg(long, value_enum, default_value_t = ExportFormat::Raw)]
    format: ExportFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum ExportFormat {
    Raw,
    Rgbd,
    G2o,
}

impl From<ExportFormat> for PoseFormat {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Raw => PoseFormat::Raw,
            ExportFormat::Rgbd => PoseFormat::Rgbd,
            ExportFormat::G2o => PoseFormat::G2o,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CoordinatorConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => CoordinatorConfig::default(),
    };
    if let Some(database) = &args.database {
        config.engine.database_path = database.clone();
    }

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = init_logging(&config)?;

    tracing::info!("Starting mapping coordinator");

    anyhow::ensure!(args.rate > 0.0, "--rate must be positive");

    let (coordinator, events) = MappingCoordinator::spawn(PoseGraphEngine::new(), config.buffer);
    coordinator.init(&config.engine.database_path, config.to_parameters());

    let camera = {
        let handle = coordinator.handle();
        let frames = args.frames;
        let period = Duration::from_secs_f64(1.0 / args.rate);
        std::thread::spawn(move || run_camera(handle, frames, period))
    };

    let mut processed = 0usize;
    while !camera.is_finished() {
        if let Ok(event) = events.recv_timeout(Duration::from_millis(100)) {
            processed += report(event);
        }
    }
    if camera.join().is_err() {
        anyhow::bail!("Camera thread panicked");
    }
    wait_idle(&coordinator)?;
    processed += events.try_iter().map(report).sum::<usize>();
    tracing::info!("{} of {} frames became nodes", processed, args.frames);

    coordinator.submit_command(Command::Label {
        id: 1,
        label: START_LABEL.to_string(),
    });
    wait_idle(&coordinator)?;

    coordinator.submit_command(Command::SetGoal(GoalTarget::Label(START_LABEL.to_string())));
    loop {
        match events.recv_timeout(IDLE_TIMEOUT).context("No answer to goal request")? {
            MappingEvent::Path { target_id, path } => {
                println!("Path to \"{}\" (node {}): {} nodes", START_LABEL, target_id, path.len());
                break;
            }
            MappingEvent::LabelError { id, label } => {
                tracing::warn!("Could not label node {} as \"{}\"", id, label);
            }
            other => {
                report(other);
            }
        }
    }

    if let Some(path) = &args.export {
        coordinator.submit_command(Command::ExportPoses {
            path: path.clone(),
            optimized: true,
            global: true,
            format: args.format.into(),
        });
        wait_idle(&coordinator)?;
        println!("Exported trajectory to {}", path.display());
    }

    coordinator.close();
    tracing::info!("Shutting down...");
    coordinator.join();

    Ok(())
}

fn init_logging(
    config: &CoordinatorConfig,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("Invalid log filter")?;

    let (file_layer, guard) = match &config.logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "slam-coordinator.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Submit frames along a unit circle, one lap over the run
fn run_camera(handle: CoordinatorHandle, frames: u32, period: Duration) {
    let start = Instant::now();
    for i in 0..frames {
        let angle = std::f64::consts::TAU * i as f64 / frames.max(1) as f64;
        // The first pose is the identity so the run starts in the first map
        let pose = pose_from_xyz_rpy(angle.sin(), 1.0 - angle.cos(), 0.0, 0.0, 0.0, angle);

        let image = ImageBuffer::new(4, 4, ImageEncoding::Mono8, vec![i as u8; 16]);
        let payload = SensorPayload {
            images: vec![image],
            ..Default::default()
        };
        let stamp = start.elapsed().as_secs_f64();
        let mut frame = SensorFrame::new(i as i32 + 1, stamp, payload);
        if i % 10 == 0 {
            frame = frame.with_user_data(format!("lap-marker-{}", i).into_bytes());
        }

        handle.submit_frame(OdometryEvent::new(frame, Some(pose), Uncertainty::new(0.01, 0.02)));
        std::thread::sleep(period);
    }
}

/// Print a published event, returning 1 for processed frames
fn report(event: MappingEvent) -> usize {
    match event {
        MappingEvent::Statistics(stats) => {
            println!(
                "node {:>4} | map {} | nodes {:>4} | buffered {}",
                stats.ref_id,
                stats.map_id,
                stats.get(STAT_WORKING_MEMORY_SIZE).unwrap_or(0.0),
                stats.get(STAT_IMAGES_BUFFERED).unwrap_or(0.0)
            );
            1
        }
        other => {
            tracing::debug!("Ignoring {} event", other.name());
            0
        }
    }
}

/// Wait until no command or frame is pending
///
/// A command popped by the worker may still be executing when this returns;
/// commands submitted afterwards run after it.
fn wait_idle(handle: &CoordinatorHandle) -> anyhow::Result<()> {
    let deadline = Instant::now() + IDLE_TIMEOUT;
    while handle.pending_commands() > 0 || handle.buffered() > 0 {
        anyhow::ensure!(Instant::now() < deadline, "Mapping worker did not become idle");
        std::thread::sleep(Duration::from_millis(5));
    }
    Ok(())
}
