//! Asynchronous mapping coordinator
//!
//! Decouples sensor producers from the mapping engine. Producers submit
//! frames, user data and commands through a cloneable [`CoordinatorHandle`]
//! without ever blocking; a single worker thread owns the engine and
//! processes one unit of work per wake-up.
//!
//! # Architecture
//!
//! - [`DataQueue`] - Bounded FIFO of frames, oldest evicted when full
//! - [`RateLimiter`] - Full / intermediate / dropped decision per frame
//! - [`CommandStack`] - LIFO stack of typed [`Command`]s, served before frames
//! - [`WakeSignal`] - Counting wake primitive shared by producers and the worker
//! - [`MappingWorker`] - The main loop, publishing [`MappingEvent`]s
//! - [`MappingCoordinator`] - Spawns the worker thread and joins it on drop
//!
//! # Example
//!
//! ```no_run
//! use slam_coordinator::config::BufferSettings;
//! use slam_coordinator::coordinator::{Command, MappingCoordinator};
//! use slam_coordinator::engine::PoseGraphEngine;
//!
//! let (coordinator, events) =
//!     MappingCoordinator::spawn(PoseGraphEngine::new(), BufferSettings::default());
//! coordinator.submit_command(Command::Init {
//!     database_path: "map.json".into(),
//!     parameters: Default::default(),
//! });
//!
//! for event in events.try_iter() {
//!     println!("{}", event.name());
//! }
//! coordinator.join();
//! ```

pub mod command_queue;
pub mod data_queue;
pub mod events;
pub mod rate_limiter;
mod shared;
pub mod wake;
pub mod worker;

pub use command_queue::{Command, CommandStack, GoalTarget, LoopState, QueuedCommand};
pub use data_queue::DataQueue;
pub use events::{CoordinatorEvent, MappingEvent};
pub use rate_limiter::{Admission, FrameDecision, RateLimiter};
pub use wake::WakeSignal;
pub use worker::{MappingWorker, EVENT_CHANNEL_CAPACITY};

use crate::config::{BufferSettings, ParametersMap};
use crate::engine::MappingEngine;
use crate::types::OdometryEvent;
use crossbeam_channel::Receiver;
use shared::SharedState;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Producer-side handle, cheap to clone and safe to use from any thread
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    shared: Arc<SharedState>,
}

impl CoordinatorHandle {
    /// Queue a command for the main loop (`Pause` is applied immediately)
    pub fn submit_command(&self, cmd: Command) {
        self.shared.submit_command(cmd);
    }

    /// Submit a frame with its odometry, returning what the policy decided
    pub fn submit_frame(&self, event: OdometryEvent) -> Admission {
        self.shared.submit_frame_at(event, Instant::now())
    }

    /// Same as [`submit_frame`](Self::submit_frame) with an explicit arrival time
    pub fn submit_frame_at(&self, event: OdometryEvent, now: Instant) -> Admission {
        self.shared.submit_frame_at(event, now)
    }

    /// Store a blob to attach to the next node, replacing any pending one
    pub fn submit_user_data(&self, data: Vec<u8>) {
        self.shared.submit_user_data(data);
    }

    /// Dispatch an inbound event
    pub fn handle_event(&self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::SensorFrame(frame) => {
                self.submit_frame(OdometryEvent::without_odometry(frame));
            }
            CoordinatorEvent::Odometry(event) => {
                if event.pose.is_some() {
                    self.submit_frame(event);
                } else {
                    self.shared.mark_lost();
                }
            }
            CoordinatorEvent::UserData(data) => self.submit_user_data(data),
            CoordinatorEvent::Command(cmd) => self.submit_command(cmd),
            CoordinatorEvent::ParamChange(parameters) => {
                self.submit_command(Command::ChangeParameters(parameters))
            }
        }
    }

    /// Clear buffered data and stop the main loop. Never blocks.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    /// Queue `Init` for `database_path`
    pub fn init(&self, database_path: impl Into<PathBuf>, parameters: ParametersMap) {
        self.submit_command(Command::Init {
            database_path: database_path.into(),
            parameters,
        });
    }

    pub fn close(&self) {
        self.submit_command(Command::Close);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Entries waiting in the data queue
    pub fn buffered(&self) -> usize {
        self.shared.buffered()
    }

    /// Ids of the queued frames, oldest first
    pub fn buffered_ids(&self) -> Vec<i32> {
        self.shared.buffered_ids()
    }

    pub fn pending_commands(&self) -> usize {
        self.shared.pending_commands()
    }

    pub fn has_pending_user_data(&self) -> bool {
        self.shared.has_user_data()
    }

    pub fn settings(&self) -> BufferSettings {
        self.shared.settings()
    }
}

/// Owns the mapping thread
///
/// Dereferences to its [`CoordinatorHandle`]. Dropping the coordinator
/// shuts the loop down and joins the thread.
pub struct MappingCoordinator {
    handle: CoordinatorHandle,
    thread: Option<JoinHandle<()>>,
}

impl MappingCoordinator {
    /// Start the main loop on a new thread
    pub fn spawn(
        engine: impl MappingEngine + 'static,
        settings: BufferSettings,
    ) -> (Self, Receiver<MappingEvent>) {
        let (mut worker, handle, events) = MappingWorker::new(engine, settings);
        let thread = std::thread::spawn(move || worker.run());
        (
            Self {
                handle,
                thread: Some(thread),
            },
            events,
        )
    }

    /// A new producer handle
    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    /// Shut down and wait for the main loop to exit
    pub fn join(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.handle.shutdown();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Mapping worker thread panicked");
            }
        }
    }
}

impl std::ops::Deref for MappingCoordinator {
    type Target = CoordinatorHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for MappingCoordinator {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{EngineCall, RecordingEngine};
    use crate::types::{pose_from_xyz_rpy, Pose, SensorFrame, SensorPayload, Uncertainty};

    fn camera_frame(id: i32) -> SensorFrame {
        SensorFrame::new(id, id as f64, SensorPayload::default())
    }

    #[test]
    fn test_sensor_frame_without_odometry() {
        let (_worker, handle, _events) =
            MappingWorker::new(RecordingEngine::new().0, BufferSettings::unlimited());
        handle.handle_event(CoordinatorEvent::SensorFrame(camera_frame(1)));

        assert_eq!(handle.buffered(), 1);

        handle.shutdown();
        handle.handle_event(CoordinatorEvent::SensorFrame(camera_frame(2)));
        assert_eq!(handle.buffered(), 0);
    }

    #[test]
    fn test_lost_odometry_is_not_queued() {
        let (_worker, handle, _events) =
            MappingWorker::new(RecordingEngine::new().0, BufferSettings::default());
        let lost = OdometryEvent::new(camera_frame(1), None, Uncertainty::default());
        handle.handle_event(CoordinatorEvent::Odometry(lost));
        assert_eq!(handle.buffered(), 0);

        // Identity after lost odometry starts a new map
        let reset = OdometryEvent::new(camera_frame(2), Some(Pose::identity()), Uncertainty::default());
        handle.handle_event(CoordinatorEvent::Odometry(reset));
        assert_eq!(handle.buffered(), 1);
        assert_eq!(handle.pending_commands(), 1);
    }

    #[test]
    fn test_param_change_becomes_command() {
        let (mut worker, handle, _events) =
            MappingWorker::new(RecordingEngine::new().0, BufferSettings::default());
        handle.handle_event(CoordinatorEvent::ParamChange(ParametersMap::new()));
        assert_eq!(worker.step(), LoopState::ChangingParameters);
    }

    #[test]
    fn test_spawned_coordinator_processes_and_joins() {
        let (engine, calls) = RecordingEngine::initialized();
        let (coordinator, events) = MappingCoordinator::spawn(engine, BufferSettings::unlimited());

        coordinator.submit_frame(OdometryEvent::new(
            camera_frame(1),
            Some(pose_from_xyz_rpy(1.0, 0.0, 0.0, 0.0, 0.0, 0.0)),
            Uncertainty::default(),
        ));
        let first = events
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        assert!(matches!(first, MappingEvent::Statistics(_)));

        coordinator.close();
        coordinator.join();

        assert_eq!(events.try_iter().last().map(|e| e.name()), Some("shutdown"));
        assert!(calls.lock().contains(&EngineCall::Close));
    }

    #[test]
    fn test_handle_outliving_worker_drops_frames() {
        let (coordinator, _events) =
            MappingCoordinator::spawn(RecordingEngine::initialized().0, BufferSettings::unlimited());
        let handle = coordinator.handle();
        coordinator.join();

        for id in 1..=10_000 {
            let event = OdometryEvent::new(
                camera_frame(id),
                Some(pose_from_xyz_rpy(id as f64, 0.0, 0.0, 0.0, 0.0, 0.0)),
                Uncertainty::default(),
            );
            assert_eq!(handle.submit_frame(event), Admission::Dropped);
        }
        handle.handle_event(CoordinatorEvent::SensorFrame(camera_frame(10_001)));

        assert!(!handle.is_running());
        assert_eq!(handle.buffered(), 0);
    }
}
