//! Main loop of the mapping thread
//!
//! The worker owns the mapping engine. Each wake-up performs exactly one
//! unit of work: the most recently queued command if any, otherwise one
//! buffered frame. Results are published on a bounded channel without ever
//! blocking the loop.

use super::command_queue::{Command, GoalTarget, LoopState, QueuedCommand};
use super::events::MappingEvent;
use super::shared::SharedState;
use super::CoordinatorHandle;
use crate::config::{BufferSettings, ParametersMap, KEY_DATABASE_PATH};
use crate::engine::MappingEngine;
use crate::types::{OdometryEvent, STAT_IMAGES_BUFFERED};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::path::Path;
use std::sync::Arc;

/// Capacity of the published event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Consumer side of the coordinator
pub struct MappingWorker {
    shared: Arc<SharedState>,
    engine: Box<dyn MappingEngine>,
    event_tx: Sender<MappingEvent>,
    /// Events dropped because the channel was full
    dropped_events: u64,
}

impl MappingWorker {
    /// Create a worker around `engine` with the producer handle and event receiver
    ///
    /// The worker can be driven with [`step`](Self::step) or moved into a
    /// thread running [`run`](Self::run).
    pub fn new(
        engine: impl MappingEngine + 'static,
        settings: BufferSettings,
    ) -> (Self, CoordinatorHandle, Receiver<MappingEvent>) {
        let shared = Arc::new(SharedState::new(settings));
        let (event_tx, event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let worker = Self {
            shared: shared.clone(),
            engine: Box::new(engine),
            event_tx,
            dropped_events: 0,
        };
        (worker, CoordinatorHandle { shared }, event_rx)
    }

    /// Run until the coordinator is shut down
    ///
    /// Commands still queued at shutdown are executed before returning so a
    /// `Close` submitted just before shutting down is honored.
    pub fn run(&mut self) {
        tracing::info!("Mapping worker started");

        loop {
            self.shared.wait();
            if !self.shared.is_running() {
                break;
            }
            self.process_next();
        }

        while let Some(cmd) = self.shared.pop_command() {
            self.handle_command(cmd);
        }

        self.publish(MappingEvent::Shutdown);
        tracing::info!(
            "Mapping worker stopped ({} events dropped)",
            self.dropped_events
        );
    }

    /// Wait for one wake-up and perform its unit of work
    pub fn step(&mut self) -> LoopState {
        self.shared.wait();
        self.process_next()
    }

    /// Like [`step`](Self::step), but returns `None` instead of blocking
    pub fn try_step(&mut self) -> Option<LoopState> {
        if self.shared.try_wait() {
            Some(self.process_next())
        } else {
            None
        }
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    fn process_next(&mut self) -> LoopState {
        match self.shared.pop_command() {
            Some(cmd) => {
                let state = cmd.state();
                tracing::debug!("State: {}", state);
                self.handle_command(cmd);
                state
            }
            None => {
                self.detect();
                LoopState::Detecting
            }
        }
    }

    fn handle_command(&mut self, cmd: QueuedCommand) {
        let cmd = match cmd {
            QueuedCommand::AddUserData => {
                self.add_user_data();
                return;
            }
            QueuedCommand::Command(cmd) => cmd,
        };

        match cmd {
            Command::Init {
                database_path,
                parameters,
            } => {
                self.init(&database_path, parameters);
            }
            Command::ChangeParameters(parameters) => {
                self.shared.apply_parameters(&parameters);
                self.engine.parse_parameters(&parameters);
            }
            Command::ResetMemory => {
                self.engine.reset_memory();
                self.shared.clear_buffered_data();
            }
            Command::Close => {
                let buffered = self.shared.buffered();
                if buffered > 0 {
                    tracing::warn!(
                        "Closing... {} data still buffered! They will be cleared.",
                        buffered
                    );
                    self.shared.clear_buffered_data();
                }
                self.engine.close();
            }
            Command::DumpMemory => {
                if let Err(e) = self.engine.dump_data() {
                    tracing::error!("Failed to dump memory: {}", e);
                }
            }
            Command::DumpPrediction => {
                if let Err(e) = self.engine.dump_prediction() {
                    tracing::error!("Failed to dump prediction: {}", e);
                }
            }
            Command::ExportDotGraph { path, scope } => {
                if let Err(e) = self.engine.generate_dot_graph(&path, scope) {
                    tracing::error!("Failed to export graph: {}", e);
                }
            }
            Command::ExportPoses {
                path,
                optimized,
                global,
                format,
            } => {
                if let Err(e) = self.engine.export_poses(&path, optimized, global, format) {
                    tracing::error!("Failed to export poses: {}", e);
                }
            }
            Command::CleanDataBuffer => {
                self.shared.clear_buffered_data();
            }
            Command::PublishMap {
                optimized,
                global,
                graph_only,
            } => {
                let map = if graph_only {
                    self.engine.get_graph(optimized, global)
                } else {
                    self.engine.get_3d_map(optimized, global)
                };
                self.publish(MappingEvent::Map3D(map));
            }
            Command::TriggerNewMap => {
                let map_id = self.engine.trigger_new_map();
                tracing::info!("Started new map {}", map_id);
            }
            Command::Pause => {
                // Toggled on submission
            }
            Command::SetGoal(target) => {
                self.set_goal(target);
            }
            Command::CancelGoal => {
                self.engine.clear_path();
            }
            Command::Label { id, label } => {
                if !self.engine.label_location(id, &label) {
                    self.publish(MappingEvent::LabelError { id, label });
                }
            }
        }
    }

    fn init(&mut self, database_path: &Path, mut parameters: ParametersMap) {
        assert!(
            !database_path.as_os_str().is_empty(),
            "Init requires a database path"
        );
        self.shared.apply_parameters(&parameters);
        parameters.insert(
            KEY_DATABASE_PATH.to_string(),
            database_path.display().to_string(),
        );
        if let Err(e) = self.engine.init(&parameters, database_path) {
            tracing::error!(
                "Failed to initialize mapping engine with {}: {}",
                database_path.display(),
                e
            );
        }
    }

    fn add_user_data(&mut self) {
        match self.shared.take_user_data() {
            Some(data) => {
                if !self.engine.set_user_data(0, data) {
                    tracing::warn!("Failed to attach user data to the last node");
                }
            }
            None => tracing::debug!("No pending user data"),
        }
    }

    fn set_goal(&mut self, target: GoalTarget) {
        let id = match &target {
            GoalTarget::Id(id) => *id,
            GoalTarget::Label(label) => match self.engine.memory() {
                Some(memory) => memory.signature_id_by_label(label).unwrap_or(0),
                None => {
                    tracing::error!("Cannot resolve label \"{}\", engine not initialized", label);
                    0
                }
            },
        };

        let path = if id <= 0 {
            tracing::error!("Planning: unknown goal {:?}", target);
            Vec::new()
        } else if !self.engine.compute_path(id, true) {
            tracing::error!("Planning: cannot compute a path to node {}", id);
            Vec::new()
        } else {
            let path = self.engine.path();
            tracing::info!("Planning: path of {} nodes to node {}", path.len(), id);
            path
        };

        self.publish(MappingEvent::Path {
            target_id: id,
            path,
        });
    }

    fn detect(&mut self) {
        let Some(event) = self.shared.pop_frame() else {
            tracing::trace!("Woke up without pending frame");
            return;
        };

        if self.engine.memory().is_none() {
            tracing::error!(
                "Mapping engine is not initialized! Ignoring frame {}",
                event.id()
            );
            return;
        }

        let OdometryEvent {
            frame,
            pose,
            uncertainty,
        } = event;
        if self.engine.process(frame, pose, uncertainty) {
            let mut statistics = self.engine.statistics();
            statistics.add(STAT_IMAGES_BUFFERED, self.shared.buffered() as f32);
            self.publish(MappingEvent::Statistics(statistics));
        }
    }

    /// Publish without blocking, counting events dropped on a full channel
    fn publish(&mut self, event: MappingEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped_events += 1;
                tracing::warn!(
                    "Event channel full, dropped {} event ({} total)",
                    event.name(),
                    self.dropped_events
                );
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
