//! Mapping engine interface
//!
//! The coordinator drives a stateful mapping engine that owns the pose
//! graph. The engine is only ever touched by the coordinator's worker
//! thread, so implementations need `Send` but not `Sync`.
//!
//! # Components
//!
//! - [`MappingEngine`] - The contract the worker relies on
//! - [`EngineMemory`] - Read access to the engine's node memory
//! - [`PoseGraphEngine`] - In-memory reference engine with JSON persistence
//! - [`export`] - DOT graph and pose file writers

pub mod export;
pub mod pose_graph;

pub use export::{DotScope, PoseFormat};
pub use pose_graph::PoseGraphEngine;

use crate::config::ParametersMap;
use crate::error::Result;
use crate::types::{MapData, PathStep, Pose, SensorFrame, Statistics, Uncertainty};
use std::path::Path;

/// Read access to the nodes held by an initialized engine
pub trait EngineMemory {
    /// Id of the node carrying `label`, if any
    fn signature_id_by_label(&self, label: &str) -> Option<i32>;

    /// Id of the most recently added node (0 if the memory is empty)
    fn last_signature_id(&self) -> i32;
}

/// Contract of the stateful mapping engine
///
/// Methods that act on a node id accept `0` as "the last added node".
pub trait MappingEngine: Send {
    /// Initialize the engine, loading any existing map from `database_path`
    fn init(&mut self, parameters: &ParametersMap, database_path: &Path) -> Result<()>;

    /// Update engine parameters at runtime
    fn parse_parameters(&mut self, parameters: &ParametersMap);

    /// Process one frame
    ///
    /// Returns true if new statistics are available.
    fn process(&mut self, frame: SensorFrame, pose: Option<Pose>, uncertainty: Uncertainty) -> bool;

    /// Statistics of the last update
    fn statistics(&self) -> Statistics;

    /// Graph with full signatures (sensor payload included)
    fn get_3d_map(&self, optimized: bool, global: bool) -> MapData;

    /// Graph with payload-free signatures
    fn get_graph(&self, optimized: bool, global: bool) -> MapData;

    /// Clear the memory, keeping the engine initialized
    fn reset_memory(&mut self);

    /// Persist and release the map
    fn close(&mut self);

    /// Write a report of the memory content
    fn dump_data(&self) -> Result<()>;

    /// Write a report of the current place predictions
    fn dump_prediction(&self) -> Result<()>;

    fn generate_dot_graph(&self, path: &Path, scope: DotScope) -> Result<()>;

    fn export_poses(&self, path: &Path, optimized: bool, global: bool, format: PoseFormat)
        -> Result<()>;

    /// Start a new map, returning its id
    fn trigger_new_map(&mut self) -> i32;

    /// Plan a path from the current node to `target_id`
    fn compute_path(&mut self, target_id: i32, global: bool) -> bool;

    /// Current planned path
    fn path(&self) -> Vec<PathStep>;

    fn clear_path(&mut self);

    fn label_location(&mut self, id: i32, label: &str) -> bool;

    fn set_user_data(&mut self, id: i32, data: Vec<u8>) -> bool;

    /// Node memory, `None` until the engine is initialized
    fn memory(&self) -> Option<&dyn EngineMemory>;
}
