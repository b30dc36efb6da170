//! Core data types for the mapping coordinator
//!
//! This module contains the fundamental data structures exchanged between
//! sensor producers, the coordinator and the mapping engine.
//!
//! # Main Types
//!
//! - [`SensorFrame`] - One synchronized sensor capture (images, depth, scan)
//! - [`OdometryEvent`] - A frame paired with an estimated pose and its uncertainty
//! - [`Statistics`] - Named statistics reported by the engine after each update
//! - [`Signature`] / [`Link`] / [`MapData`] - Graph snapshots published to listeners
//!
//! # Poses
//!
//! Poses are rigid 3D transforms ([`Pose`]). A lost odometry estimate is
//! represented as `None` rather than a sentinel transform.

use nalgebra::{Isometry3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rigid 3D transform used for all poses and link constraints
pub type Pose = Isometry3<f64>;

/// One step of a planned path: node id and its pose
pub type PathStep = (i32, Pose);

/// Statistic key carrying the number of entries waiting in the data queue
pub const STAT_IMAGES_BUFFERED: &str = "Memory/Images_buffered/";

/// Statistic key carrying the number of nodes in the graph
pub const STAT_WORKING_MEMORY_SIZE: &str = "Memory/Working_memory_size/";

/// Statistic key carrying the current map id
pub const STAT_MAP_ID: &str = "Memory/Map_id/";

/// Returns true if the pose is exactly the identity transform
pub fn is_identity(pose: &Pose) -> bool {
    *pose == Pose::identity()
}

/// Build a pose from a translation and roll/pitch/yaw angles (radians)
pub fn pose_from_xyz_rpy(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Pose {
    Isometry3::from_parts(
        Translation3::new(x, y, z),
        UnitQuaternion::from_euler_angles(roll, pitch, yaw),
    )
}

/// Pixel encoding of an image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ImageEncoding {
    /// 8-bit single channel
    Mono8,
    /// 8-bit BGR
    #[default]
    Bgr8,
    /// 16-bit depth in millimeters
    Depth16,
    /// 32-bit float depth in meters
    Depth32F,
}

impl std::fmt::Display for ImageEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageEncoding::Mono8 => write!(f, "mono8"),
            ImageEncoding::Bgr8 => write!(f, "bgr8"),
            ImageEncoding::Depth16 => write!(f, "16UC1"),
            ImageEncoding::Depth32F => write!(f, "32FC1"),
        }
    }
}

/// Raw or compressed image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub encoding: ImageEncoding,
    /// True if `data` holds a compressed stream rather than raw pixels
    pub compressed: bool,
    pub data: Vec<u8>,
}

impl ImageBuffer {
    /// Create a raw image buffer
    pub fn new(width: u32, height: u32, encoding: ImageEncoding, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            encoding,
            compressed: false,
            data,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The heavy part of a frame, dropped for intermediate nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SensorPayload {
    /// One image for monocular/RGB-D, two for stereo
    pub images: Vec<ImageBuffer>,
    pub depth: Option<ImageBuffer>,
    /// Laser scan points in the sensor frame
    pub scan: Option<Vec<[f32; 3]>>,
}

impl SensorPayload {
    /// Approximate payload size in bytes
    pub fn size_bytes(&self) -> usize {
        let images: usize = self.images.iter().map(|i| i.data.len()).sum();
        let depth = self.depth.as_ref().map_or(0, |d| d.data.len());
        let scan = self.scan.as_ref().map_or(0, |s| s.len() * 12);
        images + depth + scan
    }
}

/// One synchronized sensor observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SensorFrame {
    /// Monotonic frame id assigned by the capture source
    pub id: i32,
    /// Capture timestamp in seconds
    pub stamp: f64,
    /// Sensor data, `None` for intermediate (pose-only) frames
    pub payload: Option<SensorPayload>,
    /// Optional user-attached auxiliary blob
    pub user_data: Vec<u8>,
}

impl SensorFrame {
    /// Create a frame carrying a sensor payload
    pub fn new(id: i32, stamp: f64, payload: SensorPayload) -> Self {
        Self {
            id,
            stamp,
            payload: Some(payload),
            user_data: Vec::new(),
        }
    }

    /// Attach a user data blob
    pub fn with_user_data(mut self, user_data: Vec<u8>) -> Self {
        self.user_data = user_data;
        self
    }

    /// Copy of this frame keeping only id, stamp and user data
    pub fn stripped(&self) -> Self {
        Self {
            id: self.id,
            stamp: self.stamp,
            payload: None,
            user_data: self.user_data.clone(),
        }
    }

    /// True if the sensor payload has been stripped
    pub fn is_intermediate(&self) -> bool {
        self.payload.is_none()
    }
}

/// Rotational and translational variance of an odometry estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Uncertainty {
    pub rot_variance: f64,
    pub trans_variance: f64,
}

impl Uncertainty {
    pub fn new(rot_variance: f64, trans_variance: f64) -> Self {
        Self {
            rot_variance,
            trans_variance,
        }
    }
}

impl Default for Uncertainty {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

/// A frame paired with an estimated pose
#[derive(Debug, Clone, PartialEq)]
pub struct OdometryEvent {
    pub frame: SensorFrame,
    /// `None` when odometry is lost
    pub pose: Option<Pose>,
    pub uncertainty: Uncertainty,
}

impl OdometryEvent {
    pub fn new(frame: SensorFrame, pose: Option<Pose>, uncertainty: Uncertainty) -> Self {
        Self {
            frame,
            pose,
            uncertainty,
        }
    }

    /// Event for a camera frame without odometry (null pose, unit variances)
    pub fn without_odometry(frame: SensorFrame) -> Self {
        Self::new(frame, None, Uncertainty::default())
    }

    pub fn id(&self) -> i32 {
        self.frame.id
    }
}

/// Statistics reported by the mapping engine after an update
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Statistics {
    /// Id of the node created by the last update
    pub ref_id: i32,
    pub map_id: i32,
    pub stamp: f64,
    pub values: BTreeMap<String, f32>,
}

impl Statistics {
    pub fn add(&mut self, name: impl Into<String>, value: f32) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.values.get(name).copied()
    }
}

/// Kind of constraint between two graph nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LinkKind {
    /// Sequential odometry constraint
    #[default]
    Neighbor,
    /// Loop closure found by the engine
    GlobalClosure,
    /// Constraint added by the user
    UserClosure,
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkKind::Neighbor => write!(f, "neighbor"),
            LinkKind::GlobalClosure => write!(f, "loop"),
            LinkKind::UserClosure => write!(f, "user"),
        }
    }
}

/// Constraint between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub from: i32,
    pub to: i32,
    /// Transform from `from` to `to`
    pub transform: Pose,
    pub kind: LinkKind,
}

/// Summary of a graph node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Signature {
    pub id: i32,
    pub map_id: i32,
    pub stamp: f64,
    pub label: Option<String>,
    /// Negative weight marks intermediate nodes
    pub weight: i32,
    pub user_data: Vec<u8>,
    /// Sensor data, omitted for graph-only snapshots
    pub payload: Option<SensorPayload>,
}

impl Signature {
    pub fn is_intermediate(&self) -> bool {
        self.weight < 0
    }
}

/// Snapshot of the map published to listeners
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapData {
    pub signatures: BTreeMap<i32, Signature>,
    pub poses: BTreeMap<i32, Pose>,
    pub constraints: Vec<Link>,
}

impl MapData {
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}
