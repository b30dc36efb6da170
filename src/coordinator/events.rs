//! Inbound and outbound coordinator events

use super::command_queue::Command;
use crate::config::ParametersMap;
use crate::types::{MapData, OdometryEvent, PathStep, SensorFrame, Statistics};

/// Input accepted by [`CoordinatorHandle::handle_event`](super::CoordinatorHandle::handle_event)
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// Camera frame without odometry
    SensorFrame(SensorFrame),
    /// Frame with an odometry estimate (`pose: None` when tracking is lost)
    Odometry(OdometryEvent),
    /// Auxiliary blob attached to the next processed node
    UserData(Vec<u8>),
    Command(Command),
    /// Parameter update, handled as `Command::ChangeParameters`
    ParamChange(ParametersMap),
}

/// Output published by the main loop
#[derive(Debug, Clone)]
pub enum MappingEvent {
    /// Engine statistics after a processed frame
    Statistics(Statistics),
    Map3D(MapData),
    /// Result of a goal request, `path` is empty on failure
    Path { target_id: i32, path: Vec<PathStep> },
    LabelError { id: i32, label: String },
    /// The main loop exited
    Shutdown,
}

impl MappingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MappingEvent::Statistics(_) => "statistics",
            MappingEvent::Map3D(_) => "map",
            MappingEvent::Path { .. } => "path",
            MappingEvent::LabelError { .. } => "label error",
            MappingEvent::Shutdown => "shutdown",
        }
    }
}
