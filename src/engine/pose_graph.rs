//! In-memory pose-graph engine
//!
//! A reference [`MappingEngine`] that keeps one node per processed frame and
//! chains consecutive nodes of the same map with neighbor links. It performs
//! no loop-closure detection and no graph optimization, so "optimized" poses
//! are the odometry poses.
//!
//! # Persistence
//!
//! The graph is stored as a JSON snapshot at the database path: loaded by
//! [`MappingEngine::init`] when the file exists and written by
//! [`MappingEngine::close`].

use super::export::{self, DotScope, PoseFormat};
use super::{EngineMemory, MappingEngine};
use crate::config::ParametersMap;
use crate::error::{MappingError, Result, ResultExt};
use crate::types::{
    Link, LinkKind, MapData, PathStep, Pose, SensorFrame, SensorPayload, Signature, Statistics,
    Uncertainty, STAT_MAP_ID, STAT_WORKING_MEMORY_SIZE,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Snapshot format version
const SNAPSHOT_VERSION: u32 = 1;

/// A node of the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    id: i32,
    map_id: i32,
    stamp: f64,
    /// `None` for frames received while odometry was lost
    pose: Option<Pose>,
    label: Option<String>,
    weight: i32,
    user_data: Vec<u8>,
    #[serde(skip)]
    payload: Option<SensorPayload>,
}

/// Nodes and links of the graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphMemory {
    nodes: BTreeMap<i32, Node>,
    links: Vec<Link>,
    last_id: i32,
    map_id: i32,
}

impl GraphMemory {
    fn last_node(&self) -> Option<&Node> {
        self.nodes.get(&self.last_id)
    }

    fn resolve(&self, id: i32) -> i32 {
        if id == 0 {
            self.last_id
        } else {
            id
        }
    }
}

impl EngineMemory for GraphMemory {
    fn signature_id_by_label(&self, label: &str) -> Option<i32> {
        self.nodes
            .values()
            .find(|n| n.label.as_deref() == Some(label))
            .map(|n| n.id)
    }

    fn last_signature_id(&self) -> i32 {
        self.last_id
    }
}

/// On-disk snapshot
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    memory: GraphMemory,
}

/// Min-heap entry for Dijkstra
#[derive(Debug, PartialEq)]
struct Frontier {
    cost: f64,
    id: i32,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reference pose-graph engine
#[derive(Debug, Default)]
pub struct PoseGraphEngine {
    memory: Option<GraphMemory>,
    database_path: Option<PathBuf>,
    parameters: ParametersMap,
    statistics: Statistics,
    path: Vec<PathStep>,
}

impl PoseGraphEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in memory
    pub fn node_count(&self) -> usize {
        self.memory.as_ref().map_or(0, |m| m.nodes.len())
    }

    /// Parameters received at init or through `parse_parameters`
    pub fn parameters(&self) -> &ParametersMap {
        &self.parameters
    }

    fn load_snapshot(path: &Path) -> Result<GraphMemory> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Reading database {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(MappingError::Engine(format!(
                "Unsupported database version {}",
                snapshot.version
            )));
        }
        tracing::info!(
            "Loaded {} nodes from {} (saved {})",
            snapshot.memory.nodes.len(),
            path.display(),
            snapshot.saved_at
        );
        Ok(snapshot.memory)
    }

    fn save_snapshot(&self, memory: &GraphMemory, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating {}", parent.display()))?;
        }
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            memory: memory.clone(),
        };
        let content = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, content).with_context(|| format!("Writing database {}", path.display()))
    }

    /// Path of a report file written next to the database
    fn report_path(&self, name: &str) -> Result<PathBuf> {
        let db = self.database_path.as_ref().ok_or(MappingError::NotInitialized)?;
        let dir = db.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(dir.join(name))
    }

    fn snapshot(&self, global: bool, with_payload: bool) -> MapData {
        let mut map = MapData::default();
        let Some(memory) = self.memory.as_ref() else {
            return map;
        };
        for node in memory.nodes.values() {
            if !global && node.map_id != memory.map_id {
                continue;
            }
            let Some(pose) = node.pose else {
                continue;
            };
            map.poses.insert(node.id, pose);
            map.signatures.insert(
                node.id,
                Signature {
                    id: node.id,
                    map_id: node.map_id,
                    stamp: node.stamp,
                    label: node.label.clone(),
                    weight: node.weight,
                    user_data: node.user_data.clone(),
                    payload: if with_payload { node.payload.clone() } else { None },
                },
            );
        }
        map.constraints = memory
            .links
            .iter()
            .filter(|l| map.poses.contains_key(&l.from) && map.poses.contains_key(&l.to))
            .cloned()
            .collect();
        map
    }

    fn shortest_path(memory: &GraphMemory, from: i32, to: i32, global: bool) -> Option<Vec<i32>> {
        let usable = |id: &i32| {
            memory
                .nodes
                .get(id)
                .is_some_and(|n| n.pose.is_some() && (global || n.map_id == memory.map_id))
        };
        if !usable(&from) || !usable(&to) {
            return None;
        }

        let mut adjacency: BTreeMap<i32, Vec<(i32, f64)>> = BTreeMap::new();
        for link in &memory.links {
            if usable(&link.from) && usable(&link.to) {
                let cost = link.transform.translation.vector.norm();
                adjacency.entry(link.from).or_default().push((link.to, cost));
                adjacency.entry(link.to).or_default().push((link.from, cost));
            }
        }

        let mut best: BTreeMap<i32, f64> = BTreeMap::from([(from, 0.0)]);
        let mut previous: BTreeMap<i32, i32> = BTreeMap::new();
        let mut heap = BinaryHeap::from([Frontier { cost: 0.0, id: from }]);

        while let Some(Frontier { cost, id }) = heap.pop() {
            if id == to {
                let mut ids = vec![to];
                let mut current = to;
                while let Some(&p) = previous.get(&current) {
                    ids.push(p);
                    current = p;
                }
                ids.reverse();
                return Some(ids);
            }
            if cost > best.get(&id).copied().unwrap_or(f64::INFINITY) {
                continue;
            }
            for &(next, step) in adjacency.get(&id).into_iter().flatten() {
                let candidate = cost + step;
                if candidate < best.get(&next).copied().unwrap_or(f64::INFINITY) {
                    best.insert(next, candidate);
                    previous.insert(next, id);
                    heap.push(Frontier {
                        cost: candidate,
                        id: next,
                    });
                }
            }
        }
        None
    }
}

impl MappingEngine for PoseGraphEngine {
    fn init(&mut self, parameters: &ParametersMap, database_path: &Path) -> Result<()> {
        let memory = if database_path.exists() {
            Self::load_snapshot(database_path).context("Failed to open database")?
        } else {
            tracing::info!("Creating new database {}", database_path.display());
            GraphMemory::default()
        };
        self.memory = Some(memory);
        self.database_path = Some(database_path.to_path_buf());
        self.parameters = parameters.clone();
        self.statistics = Statistics::default();
        self.path.clear();
        Ok(())
    }

    fn parse_parameters(&mut self, parameters: &ParametersMap) {
        for (key, value) in parameters {
            self.parameters.insert(key.clone(), value.clone());
        }
    }

    fn process(&mut self, frame: SensorFrame, pose: Option<Pose>, uncertainty: Uncertainty) -> bool {
        let Some(memory) = self.memory.as_mut() else {
            return false;
        };

        let id = memory.last_id + 1;
        let intermediate = frame.is_intermediate();
        let previous = memory
            .last_node()
            .filter(|n| n.map_id == memory.map_id)
            .and_then(|n| n.pose.map(|p| (n.id, p)));

        if let (Some((prev_id, prev_pose)), Some(pose)) = (previous, pose) {
            memory.links.push(Link {
                from: prev_id,
                to: id,
                transform: prev_pose.inverse() * pose,
                kind: LinkKind::Neighbor,
            });
        }

        memory.nodes.insert(
            id,
            Node {
                id,
                map_id: memory.map_id,
                stamp: frame.stamp,
                pose,
                label: None,
                weight: if intermediate { -1 } else { 0 },
                user_data: frame.user_data,
                payload: frame.payload,
            },
        );
        memory.last_id = id;

        let mut stats = Statistics {
            ref_id: id,
            map_id: memory.map_id,
            stamp: frame.stamp,
            ..Default::default()
        };
        stats.add(STAT_WORKING_MEMORY_SIZE, memory.nodes.len() as f32);
        stats.add(STAT_MAP_ID, memory.map_id as f32);
        stats.add("Odometry/RotVariance/", uncertainty.rot_variance as f32);
        stats.add("Odometry/TransVariance/", uncertainty.trans_variance as f32);
        self.statistics = stats;
        true
    }

    fn statistics(&self) -> Statistics {
        self.statistics.clone()
    }

    fn get_3d_map(&self, _optimized: bool, global: bool) -> MapData {
        self.snapshot(global, true)
    }

    fn get_graph(&self, _optimized: bool, global: bool) -> MapData {
        self.snapshot(global, false)
    }

    fn reset_memory(&mut self) {
        if let Some(memory) = self.memory.as_mut() {
            *memory = GraphMemory::default();
        }
        self.statistics = Statistics::default();
        self.path.clear();
    }

    fn close(&mut self) {
        if let (Some(memory), Some(path)) = (self.memory.take(), self.database_path.take()) {
            match self.save_snapshot(&memory, &path) {
                Ok(()) => tracing::info!("Saved {} nodes to {}", memory.nodes.len(), path.display()),
                Err(e) => tracing::error!("Failed to save database: {}", e),
            }
        }
        self.path.clear();
    }

    fn dump_data(&self) -> Result<()> {
        let memory = self.memory.as_ref().ok_or(MappingError::NotInitialized)?;
        let mut out = String::from("# id map_id weight stamp label\n");
        for node in memory.nodes.values() {
            let _ = writeln!(
                out,
                "{} {} {} {:.6} {}",
                node.id,
                node.map_id,
                node.weight,
                node.stamp,
                node.label.as_deref().unwrap_or("-")
            );
        }
        let path = self.report_path("DumpMemory.txt")?;
        std::fs::write(&path, out).with_context(|| format!("Writing {}", path.display()))
    }

    fn dump_prediction(&self) -> Result<()> {
        let memory = self.memory.as_ref().ok_or(MappingError::NotInitialized)?;
        let current = memory.last_node().and_then(|n| n.pose);
        let mut out = String::from("# id distance_to_current\n");
        for node in memory.nodes.values() {
            let distance = match (current, node.pose) {
                (Some(c), Some(p)) => (c.translation.vector - p.translation.vector).norm(),
                _ => f64::NAN,
            };
            let _ = writeln!(out, "{} {:.6}", node.id, distance);
        }
        let path = self.report_path("DumpPrediction.txt")?;
        std::fs::write(&path, out).with_context(|| format!("Writing {}", path.display()))
    }

    fn generate_dot_graph(&self, path: &Path, scope: DotScope) -> Result<()> {
        if self.memory.is_none() {
            return Err(MappingError::NotInitialized);
        }
        export::write_dot(&self.snapshot(true, false), path, scope)
    }

    fn export_poses(
        &self,
        path: &Path,
        optimized: bool,
        global: bool,
        format: PoseFormat,
    ) -> Result<()> {
        if self.memory.is_none() {
            return Err(MappingError::NotInitialized);
        }
        export::write_poses(&self.get_graph(optimized, global), path, format)
    }

    fn trigger_new_map(&mut self) -> i32 {
        match self.memory.as_mut() {
            Some(memory) => {
                // An empty current map is reused
                let has_nodes = memory.nodes.values().any(|n| n.map_id == memory.map_id);
                if has_nodes {
                    memory.map_id += 1;
                }
                tracing::info!("New map {} started", memory.map_id);
                memory.map_id
            }
            None => -1,
        }
    }

    fn compute_path(&mut self, target_id: i32, global: bool) -> bool {
        self.path.clear();
        let Some(memory) = self.memory.as_ref() else {
            return false;
        };
        let Some(ids) = Self::shortest_path(memory, memory.last_id, target_id, global) else {
            return false;
        };
        self.path = ids
            .into_iter()
            .filter_map(|id| memory.nodes.get(&id).and_then(|n| n.pose.map(|p| (id, p))))
            .collect();
        true
    }

    fn path(&self) -> Vec<PathStep> {
        self.path.clone()
    }

    fn clear_path(&mut self) {
        self.path.clear();
    }

    fn label_location(&mut self, id: i32, label: &str) -> bool {
        let Some(memory) = self.memory.as_mut() else {
            return false;
        };
        let id = memory.resolve(id);
        if label.is_empty() || !memory.nodes.contains_key(&id) {
            tracing::warn!("Cannot label node {}: not in memory", id);
            return false;
        }
        if let Some(owner) = memory.signature_id_by_label(label).filter(|&owner| owner != id) {
            tracing::warn!("Label \"{}\" is already used by node {}", label, owner);
            return false;
        }
        if let Some(node) = memory.nodes.get_mut(&id) {
            node.label = Some(label.to_string());
        }
        true
    }

    fn set_user_data(&mut self, id: i32, data: Vec<u8>) -> bool {
        let Some(memory) = self.memory.as_mut() else {
            return false;
        };
        let id = memory.resolve(id);
        match memory.nodes.get_mut(&id) {
            Some(node) => {
                node.user_data = data;
                true
            }
            None => false,
        }
    }

    fn memory(&self) -> Option<&dyn EngineMemory> {
        self.memory.as_ref().map(|m| m as &dyn EngineMemory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{pose_from_xyz_rpy, ImageBuffer, ImageEncoding};

    fn frame(id: i32) -> SensorFrame {
        SensorFrame::new(
            id,
            id as f64 * 0.1,
            SensorPayload {
                images: vec![ImageBuffer::new(1, 1, ImageEncoding::Mono8, vec![id as u8])],
                ..Default::default()
            },
        )
    }

    fn engine_with_line(n: i32, dir: &Path) -> PoseGraphEngine {
        let mut engine = PoseGraphEngine::new();
        engine.init(&ParametersMap::new(), &dir.join("map.json")).unwrap();
        for i in 1..=n {
            let pose = pose_from_xyz_rpy(i as f64, 0.0, 0.0, 0.0, 0.0, 0.0);
            assert!(engine.process(frame(i), Some(pose), Uncertainty::default()));
        }
        engine
    }

    #[test]
    fn test_uninitialized_engine() {
        let mut engine = PoseGraphEngine::new();
        assert!(engine.memory().is_none());
        assert!(!engine.process(frame(1), None, Uncertainty::default()));
        assert!(!engine.label_location(1, "a"));
        assert!(matches!(engine.dump_data(), Err(MappingError::NotInitialized)));
    }

    #[test]
    fn test_process_builds_chain() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_line(3, dir.path());

        let graph = engine.get_graph(true, true);
        assert_eq!(graph.poses.len(), 3);
        assert_eq!(graph.constraints.len(), 2);
        assert!(graph.constraints.iter().all(|l| l.kind == LinkKind::Neighbor));
        assert!(graph.signatures.values().all(|s| s.payload.is_none()));

        let map = engine.get_3d_map(true, true);
        assert!(map.signatures.values().all(|s| s.payload.is_some()));

        let stats = engine.statistics();
        assert_eq!(stats.ref_id, 3);
        assert_eq!(stats.get(STAT_WORKING_MEMORY_SIZE), Some(3.0));
    }

    #[test]
    fn test_intermediate_nodes_have_negative_weight() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with_line(1, dir.path());
        engine.process(frame(2).stripped(), Some(Pose::identity()), Uncertainty::default());

        let graph = engine.get_graph(false, true);
        assert!(graph.signatures[&2].is_intermediate());
        assert!(!graph.signatures[&1].is_intermediate());
    }

    #[test]
    fn test_new_map_breaks_chain() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with_line(2, dir.path());
        assert_eq!(engine.trigger_new_map(), 1);
        engine.process(frame(3), Some(Pose::identity()), Uncertainty::default());

        assert_eq!(engine.get_graph(false, true).constraints.len(), 1);
        let local = engine.get_graph(false, false);
        assert_eq!(local.poses.keys().copied().collect::<Vec<_>>(), vec![3]);

        // An empty map is reused by consecutive triggers
        engine.trigger_new_map();
        assert_eq!(engine.trigger_new_map(), 2);
    }

    #[test]
    fn test_labels() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with_line(3, dir.path());

        assert!(engine.label_location(2, "kitchen"));
        assert!(engine.label_location(0, "door"));
        assert!(!engine.label_location(1, "kitchen"));
        assert!(!engine.label_location(99, "nowhere"));

        let memory = engine.memory().unwrap();
        assert_eq!(memory.signature_id_by_label("kitchen"), Some(2));
        assert_eq!(memory.signature_id_by_label("door"), Some(3));
        assert_eq!(memory.signature_id_by_label("garage"), None);
    }

    #[test]
    fn test_compute_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with_line(4, dir.path());

        assert!(engine.compute_path(1, true));
        let ids: Vec<i32> = engine.path().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);

        assert!(!engine.compute_path(42, true));
        assert!(engine.path().is_empty());

        engine.compute_path(2, true);
        engine.clear_path();
        assert!(engine.path().is_empty());
    }

    #[test]
    fn test_user_data_on_last_node() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with_line(2, dir.path());
        assert!(engine.set_user_data(0, vec![1, 2, 3]));
        assert_eq!(engine.get_graph(false, true).signatures[&2].user_data, vec![1, 2, 3]);
    }

    #[test]
    fn test_close_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("map.json");
        let mut engine = engine_with_line(3, dir.path());
        engine.label_location(1, "start");
        engine.close();
        assert!(engine.memory().is_none());
        assert!(db.exists());

        let mut reopened = PoseGraphEngine::new();
        reopened.init(&ParametersMap::new(), &db).unwrap();
        assert_eq!(reopened.node_count(), 3);
        assert_eq!(reopened.memory().unwrap().signature_id_by_label("start"), Some(1));
        assert_eq!(reopened.memory().unwrap().last_signature_id(), 3);
    }

    #[test]
    fn test_corrupt_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("map.json");
        std::fs::write(&db, "not json").unwrap();

        let mut engine = PoseGraphEngine::new();
        assert!(engine.init(&ParametersMap::new(), &db).is_err());
        assert!(engine.memory().is_none());
    }

    #[test]
    fn test_reset_memory() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with_line(3, dir.path());
        engine.reset_memory();
        assert_eq!(engine.node_count(), 0);
        assert!(engine.memory().is_some());
    }

    #[test]
    fn test_reports_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_line(3, dir.path());

        engine.dump_data().unwrap();
        engine.dump_prediction().unwrap();
        assert!(dir.path().join("DumpMemory.txt").exists());
        assert!(dir.path().join("DumpPrediction.txt").exists());

        let dot = dir.path().join("graph.dot");
        engine.generate_dot_graph(&dot, DotScope::Full).unwrap();
        assert!(std::fs::read_to_string(&dot).unwrap().contains("\"2\" -> \"3\""));

        let poses = dir.path().join("poses.txt");
        engine.export_poses(&poses, true, true, PoseFormat::Rgbd).unwrap();
        assert_eq!(std::fs::read_to_string(&poses).unwrap().lines().count(), 4);
    }

    #[test]
    fn test_parse_parameters_merges() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with_line(0, dir.path());
        let mut params = ParametersMap::new();
        params.insert("Mapping/DetectionRate".to_string(), "2".to_string());
        engine.parse_parameters(&params);
        assert_eq!(engine.parameters().get("Mapping/DetectionRate").map(String::as_str), Some("2"));
    }
}
