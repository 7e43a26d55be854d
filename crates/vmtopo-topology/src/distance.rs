//! Inter-node distance table.
//!
//! Re-walks the group list to place every node on its (package, die) pair,
//! then fills an N×N table from, in precedence order: a full `dist-all`
//! matrix (authoritative, may be asymmetric), symmetric `node-dist`
//! overrides, and topological defaults. The result is total: every ordered
//! pair has exactly one value.

use std::collections::BTreeMap;

use crate::error::{CompileError, Result};
use crate::input::NumaGroupSpec;

/// Distance from a node to itself.
pub const DIST_SELF: u32 = 10;
/// Default distance between nodes sharing a die.
pub const DEFAULT_DIST_SAME_DIE: u32 = 11;
/// Default distance between dies of one package.
pub const DEFAULT_DIST_SAME_PACKAGE: u32 = 21;
/// Default distance between packages.
pub const DEFAULT_DIST_OTHER_PACKAGE: u32 = 21;

/// N×N table of node-to-node distances, row-major.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DistanceMatrix {
    nodes: usize,
    data: Vec<u32>,
}

impl DistanceMatrix {
    fn filled(nodes: usize, value: u32) -> Self {
        Self { nodes, data: vec![value; nodes * nodes] }
    }

    /// Number of nodes (rows and columns).
    #[must_use]
    pub const fn size(&self) -> usize {
        self.nodes
    }

    /// Distance from `src` to `dst`.
    #[must_use]
    pub fn get(&self, src: usize, dst: usize) -> u32 {
        self.data[src * self.nodes + dst]
    }

    fn set(&mut self, src: usize, dst: usize, value: u32) {
        self.data[src * self.nodes + dst] = value;
    }
}

/// Build the distance table for the expanded node set of `groups`.
pub fn build_distances(groups: &[&NumaGroupSpec]) -> Result<DistanceMatrix> {
    // Pass 1: place nodes and capture the last-seen distance controls.
    let mut node_package_die: Vec<(u32, u32)> = Vec::new();
    let mut same_die = DEFAULT_DIST_SAME_DIE;
    let mut same_package = DEFAULT_DIST_SAME_PACKAGE;
    let mut other_package = DEFAULT_DIST_OTHER_PACKAGE;
    let mut full_matrix: Option<&Vec<Vec<u32>>> = None;
    let mut node_overrides: BTreeMap<usize, &BTreeMap<usize, u32>> = BTreeMap::new();
    let mut package = 0u32;

    for spec in groups {
        let first_node = node_package_die.len();
        for _ in 0..spec.packages {
            let pkg = package;
            package += 1;
            for die in 0..spec.dies {
                for _ in 0..spec.nodes {
                    node_package_die.push((pkg, die));
                }
            }
        }
        if let Some(v) = spec.dist_same_die {
            same_die = v;
        }
        if let Some(v) = spec.dist_same_package {
            same_package = v;
        }
        if let Some(v) = spec.dist_other_package {
            other_package = v;
        }
        if let Some(matrix) = &spec.dist_all {
            full_matrix = Some(matrix);
        }
        if let Some(overrides) = &spec.node_dist {
            for node in first_node..node_package_die.len() {
                node_overrides.insert(node, overrides);
            }
        }
    }

    let nodes = node_package_die.len();
    if nodes == 0 {
        return Err(CompileError::Topology("no NUMA nodes found".into()));
    }

    // Pass 2a: a full matrix is copied verbatim and settles everything.
    if let Some(matrix) = full_matrix {
        if matrix.len() != nodes {
            return Err(CompileError::Topology(format!(
                "wrong dimensions in dist-all: {} rows seen, {nodes} expected",
                matrix.len()
            )));
        }
        let mut table = DistanceMatrix::filled(nodes, 0);
        for (src, row) in matrix.iter().enumerate() {
            if row.len() != nodes {
                return Err(CompileError::Topology(format!(
                    "wrong dimensions in dist-all on row {}: {} distances seen, {nodes} expected",
                    src + 1,
                    row.len()
                )));
            }
            for (dst, &value) in row.iter().enumerate() {
                table.set(src, dst, value);
            }
        }
        return Ok(table);
    }

    // Pass 2b: topological defaults first, then symmetric overrides on top.
    let mut table = DistanceMatrix::filled(nodes, 0);
    for src in 0..nodes {
        for dst in 0..nodes {
            let value = if src == dst {
                DIST_SELF
            } else if node_package_die[src] == node_package_die[dst] {
                same_die
            } else if node_package_die[src].0 == node_package_die[dst].0 {
                same_package
            } else {
                other_package
            };
            table.set(src, dst, value);
        }
    }
    for src in 0..nodes {
        let Some(overrides) = node_overrides.get(&src) else {
            continue;
        };
        for (&dst, &value) in overrides.iter() {
            // Self distance stays 10; unknown destinations are ignored.
            if dst == src || dst >= nodes {
                continue;
            }
            table.set(src, dst, value);
            table.set(dst, src, value);
        }
    }
    Ok(table)
}
