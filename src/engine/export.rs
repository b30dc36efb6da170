//! Graph and trajectory export formats
//!
//! Writers used by the reference engine for the `ExportDotGraph` and
//! `ExportPoses` commands. They operate on a [`MapData`] snapshot so any
//! engine can reuse them.

use crate::error::{MappingError, Result, ResultExt};
use crate::types::{LinkKind, MapData, Pose};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write as _;
use std::path::Path;

/// Which part of the graph a DOT export covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DotScope {
    /// The whole graph
    Full,
    /// Nodes within `margin` links of `root`
    Around { root: i32, margin: u32 },
}

/// Pose file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoseFormat {
    /// One 3x4 row-major matrix per line (KITTI style)
    #[default]
    Raw,
    /// `stamp x y z qx qy qz qw` per line (TUM RGB-D benchmark)
    Rgbd,
    /// g2o vertices and edges
    G2o,
}

impl std::fmt::Display for PoseFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoseFormat::Raw => write!(f, "raw"),
            PoseFormat::Rgbd => write!(f, "rgbd"),
            PoseFormat::G2o => write!(f, "g2o"),
        }
    }
}

/// Node ids within `margin` hops of `root`, following links both ways
pub fn nodes_around(map: &MapData, root: i32, margin: u32) -> BTreeSet<i32> {
    let mut adjacency: BTreeMap<i32, Vec<i32>> = BTreeMap::new();
    for link in &map.constraints {
        adjacency.entry(link.from).or_default().push(link.to);
        adjacency.entry(link.to).or_default().push(link.from);
    }

    let mut visited = BTreeSet::new();
    if !map.poses.contains_key(&root) {
        return visited;
    }
    let mut queue = VecDeque::from([(root, 0u32)]);
    visited.insert(root);
    while let Some((id, depth)) = queue.pop_front() {
        if depth == margin {
            continue;
        }
        for &next in adjacency.get(&id).into_iter().flatten() {
            if visited.insert(next) {
                queue.push_back((next, depth + 1));
            }
        }
    }
    visited
}

/// Escape a string for a quoted DOT attribute
fn escape_dot(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render the graph in Graphviz DOT format
pub fn render_dot(map: &MapData, scope: DotScope) -> Result<String> {
    let ids: BTreeSet<i32> = match scope {
        DotScope::Full => map.poses.keys().copied().collect(),
        DotScope::Around { root, margin } => {
            let ids = nodes_around(map, root, margin);
            if ids.is_empty() {
                return Err(MappingError::Export(format!("Node {} not found in graph", root)));
            }
            ids
        }
    };

    let mut out = String::from("digraph G {\n");
    for id in &ids {
        let label = map
            .signatures
            .get(id)
            .and_then(|s| s.label.clone())
            .map(|l| format!("{}:{}", id, escape_dot(&l)))
            .unwrap_or_else(|| id.to_string());
        let shape = match map.signatures.get(id) {
            Some(s) if s.is_intermediate() => "point",
            _ => "ellipse",
        };
        let _ = writeln!(out, "  \"{}\" [label=\"{}\", shape={}];", id, label, shape);
    }
    for link in &map.constraints {
        if !ids.contains(&link.from) || !ids.contains(&link.to) {
            continue;
        }
        let style = match link.kind {
            LinkKind::Neighbor => "solid",
            LinkKind::GlobalClosure => "dashed",
            LinkKind::UserClosure => "dotted",
        };
        let _ = writeln!(
            out,
            "  \"{}\" -> \"{}\" [label=\"{}\", style={}];",
            link.from, link.to, link.kind, style
        );
    }
    out.push_str("}\n");
    Ok(out)
}

fn raw_line(pose: &Pose) -> String {
    let m = pose.to_homogeneous();
    let mut values = Vec::with_capacity(12);
    for row in 0..3 {
        for col in 0..4 {
            values.push(format!("{:.6}", m[(row, col)]));
        }
    }
    values.join(" ")
}

fn tum_fields(pose: &Pose) -> String {
    let t = pose.translation.vector;
    let q = pose.rotation.quaternion();
    format!(
        "{:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6}",
        t.x, t.y, t.z, q.i, q.j, q.k, q.w
    )
}

/// Render the poses of `map` in the requested format
pub fn render_poses(map: &MapData, format: PoseFormat) -> String {
    let mut out = String::new();
    match format {
        PoseFormat::Raw => {
            for pose in map.poses.values() {
                let _ = writeln!(out, "{}", raw_line(pose));
            }
        }
        PoseFormat::Rgbd => {
            out.push_str("# timestamp x y z qx qy qz qw\n");
            for (id, pose) in &map.poses {
                let stamp = map.signatures.get(id).map_or(0.0, |s| s.stamp);
                let _ = writeln!(out, "{:.6} {}", stamp, tum_fields(pose));
            }
        }
        PoseFormat::G2o => {
            for (id, pose) in &map.poses {
                let _ = writeln!(out, "VERTEX_SE3:QUAT {} {}", id, tum_fields(pose));
            }
            for link in &map.constraints {
                // Upper triangle of a 6x6 identity information matrix
                let _ = writeln!(
                    out,
                    "EDGE_SE3:QUAT {} {} {} 1 0 0 0 0 0 1 0 0 0 0 1 0 0 0 1 0 0 1 0 1",
                    link.from,
                    link.to,
                    tum_fields(&link.transform)
                );
            }
        }
    }
    out
}

/// Write a DOT rendering of `map` to `path`
pub fn write_dot(map: &MapData, path: &Path, scope: DotScope) -> Result<()> {
    let content = render_dot(map, scope)?;
    std::fs::write(path, content).with_context(|| format!("Writing DOT graph {}", path.display()))
}

/// Write the poses of `map` to `path`
pub fn write_poses(map: &MapData, path: &Path, format: PoseFormat) -> Result<()> {
    if map.is_empty() {
        return Err(MappingError::Export("No poses to export".to_string()));
    }
    std::fs::write(path, render_poses(map, format))
        .with_context(|| format!("Writing {} poses {}", format, path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{pose_from_xyz_rpy, Link, Signature};

    fn chain(n: i32) -> MapData {
        let mut map = MapData::default();
        for id in 1..=n {
            map.poses.insert(id, pose_from_xyz_rpy(id as f64, 0.0, 0.0, 0.0, 0.0, 0.0));
            map.signatures.insert(
                id,
                Signature {
                    id,
                    stamp: id as f64 * 0.5,
                    ..Default::default()
                },
            );
            if id > 1 {
                map.constraints.push(Link {
                    from: id - 1,
                    to: id,
                    transform: pose_from_xyz_rpy(1.0, 0.0, 0.0, 0.0, 0.0, 0.0),
                    kind: LinkKind::Neighbor,
                });
            }
        }
        map
    }

    #[test]
    fn test_dot_escapes_labels() {
        let mut map = chain(2);
        if let Some(signature) = map.signatures.get_mut(&1) {
            signature.label = Some(r#"say "hi" \ bye"#.to_string());
        }
        let dot = render_dot(&map, DotScope::Full).unwrap();
        assert!(dot.contains(r#"[label="1:say \"hi\" \\ bye", shape="#));
        assert_eq!(escape_dot("plain"), "plain");
    }

    #[test]
    fn test_nodes_around() {
        let map = chain(6);
        let ids: Vec<i32> = nodes_around(&map, 3, 1).into_iter().collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert!(nodes_around(&map, 42, 3).is_empty());
    }

    #[test]
    fn test_dot_full_and_around() {
        let map = chain(4);
        let full = render_dot(&map, DotScope::Full).unwrap();
        assert!(full.starts_with("digraph G {"));
        assert!(full.contains("\"1\" -> \"2\""));
        assert!(full.contains("\"3\" -> \"4\""));

        let partial = render_dot(&map, DotScope::Around { root: 1, margin: 1 }).unwrap();
        assert!(partial.contains("\"1\" -> \"2\""));
        assert!(!partial.contains("\"3\""));

        assert!(render_dot(&map, DotScope::Around { root: 9, margin: 1 }).is_err());
    }

    #[test]
    fn test_raw_format() {
        let map = chain(2);
        let text = render_poses(&map, PoseFormat::Raw);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split_whitespace().count(), 12);
        assert!(lines[1].starts_with("1.000000 0.000000 0.000000 2.000000"));
    }

    #[test]
    fn test_rgbd_format() {
        let map = chain(1);
        let text = render_poses(&map, PoseFormat::Rgbd);
        let line = text.lines().nth(1).unwrap();
        assert_eq!(
            line,
            "0.500000 1.000000 0.000000 0.000000 0.000000 0.000000 0.000000 1.000000"
        );
    }

    #[test]
    fn test_g2o_format() {
        let map = chain(3);
        let text = render_poses(&map, PoseFormat::G2o);
        assert_eq!(text.lines().filter(|l| l.starts_with("VERTEX_SE3:QUAT")).count(), 3);
        assert_eq!(text.lines().filter(|l| l.starts_with("EDGE_SE3:QUAT")).count(), 2);
    }

    #[test]
    fn test_write_poses_rejects_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_poses(&MapData::default(), &dir.path().join("p.txt"), PoseFormat::Raw);
        assert!(err.is_err());
    }
}
