//! Integration tests for engine reports and exports
//!
//! Export commands go through the coordinator and must leave the expected
//! files on disk.

mod common;

use common::assert_float_eq;
use common::builders::OdometryBuilder;
use slam_coordinator::config::{BufferSettings, ParametersMap};
use slam_coordinator::coordinator::{Command, LoopState, MappingWorker};
use slam_coordinator::engine::{DotScope, MappingEngine, PoseFormat, PoseGraphEngine};
use std::path::Path;

fn mapped_worker(dir: &Path, frames: i32) -> (MappingWorker, slam_coordinator::CoordinatorHandle) {
    let (mut worker, handle, _events) =
        MappingWorker::new(PoseGraphEngine::new(), BufferSettings::unlimited());
    handle.init(dir.join("map.json"), ParametersMap::new());
    assert_eq!(worker.step(), LoopState::Init);

    for id in 1..=frames {
        handle.submit_frame(OdometryBuilder::new(id).at(id as f64, 0.5, 0.0).build());
    }
    while worker.try_step().is_some() {}
    (worker, handle)
}

#[test]
fn test_export_poses_formats() {
    let dir = tempfile::tempdir().unwrap();
    let (mut worker, handle) = mapped_worker(dir.path(), 4);

    for (name, format) in [
        ("raw.txt", PoseFormat::Raw),
        ("tum.txt", PoseFormat::Rgbd),
        ("graph.g2o", PoseFormat::G2o),
    ] {
        handle.submit_command(Command::ExportPoses {
            path: dir.path().join(name),
            optimized: true,
            global: true,
            format,
        });
        assert_eq!(worker.step(), LoopState::ExportingPoses);
    }

    let raw = std::fs::read_to_string(dir.path().join("raw.txt")).unwrap();
    assert_eq!(raw.lines().count(), 4);
    let last: Vec<f64> = raw
        .lines()
        .last()
        .unwrap()
        .split_whitespace()
        .map(|v| v.parse().unwrap())
        .collect();
    assert_float_eq(last[3], 4.0, 1e-9);
    assert_float_eq(last[7], 0.5, 1e-9);

    let tum = std::fs::read_to_string(dir.path().join("tum.txt")).unwrap();
    assert!(tum.starts_with('#'));
    assert_eq!(tum.lines().count(), 5);

    let g2o = std::fs::read_to_string(dir.path().join("graph.g2o")).unwrap();
    assert_eq!(g2o.lines().filter(|l| l.starts_with("EDGE_SE3:QUAT")).count(), 3);
}

#[test]
fn test_export_dot_graph_around_node() {
    let dir = tempfile::tempdir().unwrap();
    let (mut worker, handle) = mapped_worker(dir.path(), 6);

    let path = dir.path().join("graph.dot");
    handle.submit_command(Command::ExportDotGraph {
        path: path.clone(),
        scope: DotScope::Around { root: 3, margin: 1 },
    });
    assert_eq!(worker.step(), LoopState::ExportingDotGraph);

    let dot = std::fs::read_to_string(path).unwrap();
    assert!(dot.contains("\"2\" -> \"3\""));
    assert!(dot.contains("\"3\" -> \"4\""));
    assert!(!dot.contains("\"5\""));
}

#[test]
fn test_dump_reports_next_to_database() {
    let dir = tempfile::tempdir().unwrap();
    let (mut worker, handle) = mapped_worker(dir.path(), 3);

    handle.submit_command(Command::DumpMemory);
    handle.submit_command(Command::DumpPrediction);
    assert_eq!(worker.step(), LoopState::DumpingPrediction);
    assert_eq!(worker.step(), LoopState::DumpingMemory);

    let memory = std::fs::read_to_string(dir.path().join("DumpMemory.txt")).unwrap();
    assert_eq!(memory.lines().count(), 4);
    assert!(dir.path().join("DumpPrediction.txt").exists());
}

#[test]
fn test_export_before_init_fails_without_panicking() {
    let dir = tempfile::tempdir().unwrap();
    let engine = PoseGraphEngine::new();
    let result = engine.export_poses(&dir.path().join("poses.txt"), true, true, PoseFormat::Raw);
    assert!(result.is_err());

    let (mut worker, handle, _events) =
        MappingWorker::new(PoseGraphEngine::new(), BufferSettings::unlimited());
    handle.submit_command(Command::ExportPoses {
        path: dir.path().join("poses.txt"),
        optimized: true,
        global: true,
        format: PoseFormat::Raw,
    });
    assert_eq!(worker.step(), LoopState::ExportingPoses);
    assert!(!dir.path().join("poses.txt").exists());
}
