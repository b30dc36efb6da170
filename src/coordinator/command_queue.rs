//! Typed commands, the LIFO command stack and the main loop states

use crate::config::ParametersMap;
use crate::engine::{DotScope, PoseFormat};
use parking_lot::Mutex;
use std::path::PathBuf;

/// Target of a `SetGoal` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalTarget {
    /// Node id
    Id(i32),
    /// Label resolved through the engine memory
    Label(String),
}

/// Administrative command submitted to the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Initialize the engine with a database and parameters
    Init {
        database_path: PathBuf,
        parameters: ParametersMap,
    },
    /// Apply new parameters to the buffer policy and the engine
    ChangeParameters(ParametersMap),
    /// Clear the engine memory and all buffered data
    ResetMemory,
    /// Persist and close the engine
    Close,
    DumpMemory,
    DumpPrediction,
    ExportDotGraph {
        path: PathBuf,
        scope: DotScope,
    },
    ExportPoses {
        path: PathBuf,
        optimized: bool,
        global: bool,
        format: PoseFormat,
    },
    /// Drop every buffered frame
    CleanDataBuffer,
    /// Publish the map (graph only or with sensor data)
    PublishMap {
        optimized: bool,
        global: bool,
        graph_only: bool,
    },
    TriggerNewMap,
    /// Toggle pause. Applied on submission, never queued.
    Pause,
    SetGoal(GoalTarget),
    CancelGoal,
    Label {
        id: i32,
        label: String,
    },
}

impl Command {
    /// State the main loop enters to handle this command
    pub fn state(&self) -> LoopState {
        match self {
            Command::Init { .. } => LoopState::Init,
            Command::ChangeParameters(_) => LoopState::ChangingParameters,
            Command::ResetMemory => LoopState::Reseting,
            Command::Close => LoopState::Close,
            Command::DumpMemory => LoopState::DumpingMemory,
            Command::DumpPrediction => LoopState::DumpingPrediction,
            Command::ExportDotGraph { .. } => LoopState::ExportingDotGraph,
            Command::ExportPoses { .. } => LoopState::ExportingPoses,
            Command::CleanDataBuffer => LoopState::CleanDataBuffer,
            Command::PublishMap { .. } => LoopState::PublishingMap,
            Command::TriggerNewMap => LoopState::TriggeringNewMap,
            // Pause never reaches the loop
            Command::Pause => LoopState::Detecting,
            Command::SetGoal(_) => LoopState::SettingGoal,
            Command::CancelGoal => LoopState::CancellingGoal,
            Command::Label { .. } => LoopState::Labelling,
        }
    }
}

/// Entry of the command stack
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedCommand {
    Command(Command),
    /// Hand the pending user-data blob to the engine
    AddUserData,
}

impl QueuedCommand {
    pub fn state(&self) -> LoopState {
        match self {
            QueuedCommand::Command(cmd) => cmd.state(),
            QueuedCommand::AddUserData => LoopState::AddingUserData,
        }
    }
}

impl From<Command> for QueuedCommand {
    fn from(cmd: Command) -> Self {
        QueuedCommand::Command(cmd)
    }
}

/// Unit of work performed by one main loop wake-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// Process one buffered frame
    Detecting,
    Init,
    ChangingParameters,
    Reseting,
    Close,
    DumpingMemory,
    DumpingPrediction,
    ExportingDotGraph,
    ExportingPoses,
    CleanDataBuffer,
    PublishingMap,
    TriggeringNewMap,
    AddingUserData,
    SettingGoal,
    CancellingGoal,
    Labelling,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopState::Detecting => "Detecting",
            LoopState::Init => "Init",
            LoopState::ChangingParameters => "ChangingParameters",
            LoopState::Reseting => "Reseting",
            LoopState::Close => "Close",
            LoopState::DumpingMemory => "DumpingMemory",
            LoopState::DumpingPrediction => "DumpingPrediction",
            LoopState::ExportingDotGraph => "ExportingDOTGraph",
            LoopState::ExportingPoses => "ExportingPoses",
            LoopState::CleanDataBuffer => "CleanDataBuffer",
            LoopState::PublishingMap => "PublishingMap",
            LoopState::TriggeringNewMap => "TriggeringNewMap",
            LoopState::AddingUserData => "AddingUserData",
            LoopState::SettingGoal => "SettingGoal",
            LoopState::CancellingGoal => "CancellingGoal",
            LoopState::Labelling => "Labelling",
        };
        write!(f, "{}", name)
    }
}

/// Thread-safe LIFO stack of pending commands
#[derive(Debug, Default)]
pub struct CommandStack {
    entries: Mutex<Vec<QueuedCommand>>,
}

impl CommandStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, cmd: QueuedCommand) {
        self.entries.lock().push(cmd);
    }

    /// Most recently pushed command
    pub fn pop(&self) -> Option<QueuedCommand> {
        self.entries.lock().pop()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifo_order() {
        let stack = CommandStack::new();
        stack.push(Command::DumpMemory.into());
        stack.push(Command::TriggerNewMap.into());
        stack.push(QueuedCommand::AddUserData);

        assert_eq!(stack.len(), 3);
        assert_eq!(stack.pop(), Some(QueuedCommand::AddUserData));
        assert_eq!(stack.pop(), Some(Command::TriggerNewMap.into()));
        assert_eq!(stack.pop(), Some(Command::DumpMemory.into()));
        assert!(stack.pop().is_none());
        assert!(stack.is_empty());
    }

    #[test]
    fn test_command_states() {
        assert_eq!(Command::ResetMemory.state(), LoopState::Reseting);
        assert_eq!(
            Command::SetGoal(GoalTarget::Label("kitchen".into())).state(),
            LoopState::SettingGoal
        );
        assert_eq!(QueuedCommand::AddUserData.state(), LoopState::AddingUserData);
        assert_eq!(LoopState::ExportingDotGraph.to_string(), "ExportingDOTGraph");
    }
}
