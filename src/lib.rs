//! # slam-coordinator: asynchronous mapping thread for pose-graph SLAM
//!
//! Sensor capture, odometry and user commands arrive on several producer
//! threads at rates the mapping back-end cannot sustain. This crate sits in
//! between: it buffers, throttles and prioritizes the incoming work and
//! feeds it to a single-threaded mapping engine.
//!
//! ## Architecture
//!
//! - **Coordinator**: bounded frame queue, rate limiter and LIFO command
//!   stack shared by producers, drained by one worker thread
//! - **Engine**: the [`MappingEngine`] contract plus an in-memory reference
//!   engine ([`PoseGraphEngine`]) with JSON persistence
//! - **Communication**: results are published on a bounded crossbeam
//!   channel as [`MappingEvent`]s
//!
//! ## Configuration
//!
//! Settings are read from a TOML file (see [`CoordinatorConfig`]). The
//! default database lives in the platform data directory under
//! `slam-coordinator`:
//!
//! - **Linux**: `~/.local/share/slam-coordinator/`
//! - **macOS**: `~/Library/Application Support/slam-coordinator/`
//! - **Windows**: `%APPDATA%\slam-coordinator\`
//!
//! ## Example
//!
//! ```no_run
//! use slam_coordinator::{
//!     config::CoordinatorConfig,
//!     coordinator::{Command, GoalTarget, MappingCoordinator, MappingEvent},
//!     engine::PoseGraphEngine,
//!     types::{OdometryEvent, Pose, SensorFrame, SensorPayload, Uncertainty},
//! };
//!
//! let config = CoordinatorConfig::load_or_default("coordinator.toml");
//! let (coordinator, events) = MappingCoordinator::spawn(PoseGraphEngine::new(), config.buffer);
//! coordinator.init(&config.engine.database_path, config.to_parameters());
//!
//! let frame = SensorFrame::new(1, 0.0, SensorPayload::default());
//! coordinator.submit_frame(OdometryEvent::new(frame, Some(Pose::identity()), Uncertainty::default()));
//! coordinator.submit_command(Command::SetGoal(GoalTarget::Id(1)));
//!
//! while let Ok(event) = events.recv() {
//!     if let MappingEvent::Path { target_id, path } = event {
//!         println!("{} steps to {}", path.len(), target_id);
//!         break;
//!     }
//! }
//! coordinator.close();
//! coordinator.join();
//! ```

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{BufferSettings, CoordinatorConfig, ParametersMap};
pub use coordinator::{
    Command, CoordinatorEvent, CoordinatorHandle, GoalTarget, MappingCoordinator, MappingEvent,
    MappingWorker,
};
pub use engine::{MappingEngine, PoseGraphEngine};
pub use error::{MappingError, Result};
