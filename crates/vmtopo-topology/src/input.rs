//! Input document model and schema validation.
//!
//! A topology document is a JSON list whose entries are either NUMA-group
//! objects or single-key `{"cxl": [...]}` objects. [`parse_document`] checks
//! every entry against the allowed key set and per-key type/range rules
//! before anything downstream allocates a single ID, then hands back the
//! typed [`TopologyEntry`] list.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use crate::error::{CompileError, Result};
use crate::size::{MemSize, SizeUnit};

// ── Typed model ──────────────────────────────────────────────────────

/// How a node's memory is exposed to the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DimmMode {
    /// The backend object backs the node directly; no hot-plug device.
    #[default]
    Builtin,
    /// Cold-plugged DIMM device, present at boot.
    Plugged,
    /// Backing object only; the slot stays free for hot plug at runtime.
    Unplugged,
}

/// One NUMA group entry: a batch of identical nodes plus distance controls.
#[derive(Debug, Clone)]
pub struct NumaGroupSpec {
    /// RAM per node in this group.
    pub mem: MemSize,
    /// Non-volatile RAM per node in this group.
    pub nvmem: MemSize,
    pub dimm: DimmMode,
    /// CPU cores per node; 0 means the group is memory-only.
    pub cores: u32,
    /// Threads per core, if given explicitly. Defaults to 2 at expansion.
    pub threads: Option<u32>,
    /// NUMA nodes per die.
    pub nodes: u32,
    /// Dies per package.
    pub dies: u32,
    pub packages: u32,
    /// Present-at-boot CPU count override; 0 means "all allocated CPUs".
    pub cpus_present: u32,
    /// Symmetric distance overrides from this group's nodes to named nodes.
    pub node_dist: Option<BTreeMap<usize, u32>>,
    /// Full distance matrix; authoritative when present.
    pub dist_all: Option<Vec<Vec<u32>>>,
    pub dist_same_die: Option<u32>,
    pub dist_same_package: Option<u32>,
    pub dist_other_package: Option<u32>,
}

impl Default for NumaGroupSpec {
    fn default() -> Self {
        Self {
            mem: MemSize::ZERO_G,
            nvmem: MemSize::ZERO_G,
            dimm: DimmMode::Builtin,
            cores: 0,
            threads: None,
            nodes: 1,
            dies: 1,
            packages: 1,
            cpus_present: 0,
            node_dist: None,
            dist_all: None,
            dist_same_die: None,
            dist_same_package: None,
            dist_other_package: None,
        }
    }
}

/// A CXL host bridge and the root ports hanging off it.
///
/// Bridge *i* in document order attaches to NUMA node *i*.
#[derive(Debug, Clone)]
pub struct CxlHostBridgeSpec {
    pub rootports: Vec<CxlDeviceSpec>,
}

/// A device attached to a CXL root or downstream port.
#[derive(Debug, Clone)]
pub enum CxlDeviceSpec {
    /// A type-3 memory expander. The backing object is always created;
    /// `present` only controls whether the device itself exists at boot.
    Memory { size: MemSize, present: bool },
    /// A switch fanning out into further ports, nestable.
    Switch { ports: Vec<CxlDeviceSpec> },
}

/// One entry of the input list.
#[derive(Debug, Clone)]
pub enum TopologyEntry {
    Numa(NumaGroupSpec),
    Cxl(Vec<CxlHostBridgeSpec>),
}

// ── Validation and conversion ────────────────────────────────────────

const GROUP_KEYS: &[&str] = &[
    "mem",
    "nvmem",
    "dimm",
    "cores",
    "threads",
    "nodes",
    "dies",
    "packages",
    "cpus-present",
    "node-dist",
    "dist-all",
    "dist",
    "dist-same-die",
    "dist-same-package",
    "dist-other-package",
];

/// Parse and validate a topology document.
///
/// The whole document is checked before any entry is returned, so a
/// downstream failure can never follow a swallowed schema problem.
pub fn parse_document(text: &str) -> Result<Vec<TopologyEntry>> {
    let raw: Value = serde_json::from_str(text)
        .map_err(|e| CompileError::Schema(format!("error reading JSON: {e}")))?;
    let Value::Array(list) = raw else {
        return Err(CompileError::Schema(format!(
            "expected a list of group objects, got {}",
            json_type(&raw)
        )));
    };
    let mut entries = Vec::with_capacity(list.len());
    for (group, value) in list.iter().enumerate() {
        let Value::Object(map) = value else {
            return Err(CompileError::Schema(format!(
                "expected an object for group {group}, got {}",
                json_type(value)
            )));
        };
        if let Some(cxl) = map.get("cxl") {
            if map.len() != 1 {
                return Err(CompileError::Schema(format!(
                    "a \"cxl\" group carries no other keys, group {group} has {}",
                    map.len()
                )));
            }
            entries.push(TopologyEntry::Cxl(parse_cxl_bridges(cxl, group)?));
        } else {
            entries.push(TopologyEntry::Numa(parse_numa_group(map, group)?));
        }
    }
    Ok(entries)
}

fn parse_numa_group(
    map: &serde_json::Map<String, Value>,
    group: usize,
) -> Result<NumaGroupSpec> {
    for key in map.keys() {
        if !GROUP_KEYS.contains(&key.as_str()) {
            return Err(CompileError::Schema(format!(
                "invalid key {key:?} in group {group}"
            )));
        }
    }
    if map.contains_key("dist") {
        warn!("group {group}: key \"dist\" is accepted but has no effect on the distance table");
    }

    let cores = ranged_int(map, "cores", group, |v| v >= 0, ">= 0")?.unwrap_or(0);
    let threads = ranged_int(map, "threads", group, |v| v > 0, "> 0")?;
    if let Some(t) = threads {
        if cores == 0 {
            return Err(CompileError::Range(format!(
                "threads set to {t} but \"cores\" is 0 in group {group}"
            )));
        }
    }

    Ok(NumaGroupSpec {
        mem: gig_size(map, "mem", group)?,
        nvmem: gig_size(map, "nvmem", group)?,
        dimm: dimm_mode(map, group)?,
        cores,
        threads,
        nodes: ranged_int(map, "nodes", group, |v| v > 0, "> 0")?.unwrap_or(1),
        dies: ranged_int(map, "dies", group, |v| v > 0, "> 0")?.unwrap_or(1),
        packages: ranged_int(map, "packages", group, |v| v > 0, "> 0")?.unwrap_or(1),
        cpus_present: ranged_int(map, "cpus-present", group, |v| v >= 0, ">= 0")?
            .unwrap_or(0),
        node_dist: node_dist(map, group)?,
        dist_all: dist_all(map, group)?,
        dist_same_die: dist_default(map, "dist-same-die", group)?,
        dist_same_package: dist_default(map, "dist-same-package", group)?,
        dist_other_package: dist_default(map, "dist-other-package", group)?,
    })
}

/// Read an integer key, separating type errors from range errors.
fn ranged_int(
    map: &serde_json::Map<String, Value>,
    key: &str,
    group: usize,
    in_range: impl Fn(i64) -> bool,
    expect: &str,
) -> Result<Option<u32>> {
    let Some(value) = map.get(key) else {
        return Ok(None);
    };
    let Some(n) = value.as_i64() else {
        return Err(CompileError::Schema(format!(
            "invalid {key} in group {group}, expected integer {expect}"
        )));
    };
    if !in_range(n) || n > i64::from(u32::MAX) {
        return Err(CompileError::Range(format!(
            "invalid {key} in group {group}, expected integer {expect}"
        )));
    }
    Ok(Some(n as u32))
}

/// Read a gigabyte-only size key (`mem`, `nvmem`).
fn gig_size(
    map: &serde_json::Map<String, Value>,
    key: &str,
    group: usize,
) -> Result<MemSize> {
    let Some(value) = map.get(key) else {
        return Ok(MemSize::ZERO_G);
    };
    let bad = || {
        CompileError::Schema(format!(
            "invalid {key} in group {group}, expected string like \"2G\""
        ))
    };
    let Value::String(s) = value else {
        return Err(bad());
    };
    let size: MemSize = s.parse().map_err(|_| bad())?;
    if size.unit() != SizeUnit::Gibi {
        return Err(bad());
    }
    Ok(size)
}

fn dimm_mode(map: &serde_json::Map<String, Value>, group: usize) -> Result<DimmMode> {
    let Some(value) = map.get("dimm") else {
        return Ok(DimmMode::Builtin);
    };
    let Value::String(s) = value else {
        return Err(CompileError::Schema(format!(
            "invalid dimm in group {group}, expected \"plugged\" or \"unplugged\""
        )));
    };
    match s.as_str() {
        "" | "none" => Ok(DimmMode::Builtin),
        "plugged" => Ok(DimmMode::Plugged),
        "unplugged" => Ok(DimmMode::Unplugged),
        other => Err(CompileError::Schema(format!(
            "unsupported dimm {other:?} in group {group}, expected \"plugged\" or \"unplugged\""
        ))),
    }
}

fn distance_int(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

fn dist_default(
    map: &serde_json::Map<String, Value>,
    key: &str,
    group: usize,
) -> Result<Option<u32>> {
    let Some(value) = map.get(key) else {
        return Ok(None);
    };
    distance_int(value).map(Some).ok_or_else(|| {
        CompileError::Schema(format!(
            "invalid {key} in group {group}, expected a non-negative integer"
        ))
    })
}

fn node_dist(
    map: &serde_json::Map<String, Value>,
    group: usize,
) -> Result<Option<BTreeMap<usize, u32>>> {
    let Some(value) = map.get("node-dist") else {
        return Ok(None);
    };
    let Value::Object(entries) = value else {
        return Err(CompileError::Schema(format!(
            "invalid node-dist in group {group}, expected an object of node/distance pairs"
        )));
    };
    let mut out = BTreeMap::new();
    for (name, dist) in entries {
        let node: usize = name.parse().map_err(|_| {
            CompileError::Schema(format!(
                "invalid node index {name:?} in node-dist of group {group}"
            ))
        })?;
        let dist = distance_int(dist).ok_or_else(|| {
            CompileError::Schema(format!(
                "invalid distance for node {name} in node-dist of group {group}"
            ))
        })?;
        out.insert(node, dist);
    }
    Ok(Some(out))
}

fn dist_all(
    map: &serde_json::Map<String, Value>,
    group: usize,
) -> Result<Option<Vec<Vec<u32>>>> {
    let Some(value) = map.get("dist-all") else {
        return Ok(None);
    };
    let bad = || {
        CompileError::Schema(format!(
            "invalid dist-all in group {group}, expected a list of integer rows"
        ))
    };
    let Value::Array(rows) = value else {
        return Err(bad());
    };
    let mut matrix = Vec::with_capacity(rows.len());
    for row in rows {
        let Value::Array(cells) = row else {
            return Err(bad());
        };
        let row: Option<Vec<u32>> = cells.iter().map(distance_int).collect();
        matrix.push(row.ok_or_else(bad)?);
    }
    Ok(Some(matrix))
}

// ── CXL subtree ──────────────────────────────────────────────────────

fn parse_cxl_bridges(value: &Value, group: usize) -> Result<Vec<CxlHostBridgeSpec>> {
    let Value::Array(bridges) = value else {
        return Err(CompileError::Schema(format!(
            "invalid \"cxl\" value in group {group}, expected a list of host bridges"
        )));
    };
    bridges
        .iter()
        .map(|bridge| {
            let Value::Object(map) = bridge else {
                return Err(CompileError::Schema(format!(
                    "CXL host bridge in group {group} must be an object with \"rootports\""
                )));
            };
            for key in map.keys() {
                if key != "rootports" {
                    return Err(CompileError::Schema(format!(
                        "invalid key {key:?} in CXL host bridge of group {group}"
                    )));
                }
            }
            let Some(Value::Array(ports)) = map.get("rootports") else {
                return Err(CompileError::Schema(format!(
                    "CXL host bridge in group {group} needs a \"rootports\" list"
                )));
            };
            let rootports = ports
                .iter()
                .map(|p| parse_cxl_device(p, group))
                .collect::<Result<Vec<_>>>()?;
            Ok(CxlHostBridgeSpec { rootports })
        })
        .collect()
}

fn parse_cxl_device(value: &Value, group: usize) -> Result<CxlDeviceSpec> {
    let unsupported = || {
        CompileError::Topology(format!(
            "unsupported CXL device entry in group {group}, expected \"mem\" or \"switch\""
        ))
    };
    let Value::Object(map) = value else {
        return Err(unsupported());
    };
    if map.contains_key("mem") {
        for key in map.keys() {
            if key != "mem" && key != "present" {
                return Err(CompileError::Schema(format!(
                    "invalid key {key:?} in CXL memory device of group {group}"
                )));
            }
        }
        let bad_size = || {
            CompileError::Schema(format!(
                "invalid mem in CXL device of group {group}, expected string like \"256M\" or \"2G\""
            ))
        };
        let Some(Value::String(s)) = map.get("mem") else {
            return Err(bad_size());
        };
        let size: MemSize = s.parse().map_err(|_| bad_size())?;
        let present = match map.get("present") {
            None => true,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(CompileError::Schema(format!(
                    "invalid present in CXL device of group {group}, expected a boolean"
                )));
            }
        };
        Ok(CxlDeviceSpec::Memory { size, present })
    } else if map.contains_key("switch") {
        for key in map.keys() {
            if key != "switch" {
                return Err(CompileError::Schema(format!(
                    "invalid key {key:?} in CXL switch of group {group}"
                )));
            }
        }
        let Some(Value::Array(downstream)) = map.get("switch") else {
            return Err(CompileError::Schema(format!(
                "invalid switch in CXL device of group {group}, expected a list of devices"
            )));
        };
        let ports = downstream
            .iter()
            .map(|p| parse_cxl_device(p, group))
            .collect::<Result<Vec<_>>>()?;
        Ok(CxlDeviceSpec::Switch { ports })
    } else {
        Err(unsupported())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_group(json: &str) -> Result<Vec<TopologyEntry>> {
        parse_document(&format!("[{json}]"))
    }

    // ── NUMA groups ──────────────────────────────────────────────────

    #[test]
    fn defaults_apply_to_empty_group() {
        let entries = one_group("{}").unwrap();
        let TopologyEntry::Numa(g) = &entries[0] else {
            panic!("expected a NUMA group");
        };
        assert_eq!(g.nodes, 1);
        assert_eq!(g.dies, 1);
        assert_eq!(g.packages, 1);
        assert_eq!(g.cores, 0);
        assert!(g.threads.is_none());
        assert!(g.mem.is_zero());
        assert_eq!(g.dimm, DimmMode::Builtin);
    }

    #[test]
    fn unknown_key_is_schema_error() {
        let err = one_group(r#"{"memory": "2G"}"#).unwrap_err();
        assert!(matches!(err, CompileError::Schema(_)), "{err}");
        assert!(err.to_string().contains("memory"));
    }

    #[test]
    fn mem_must_be_a_gigabyte_string() {
        assert!(matches!(
            one_group(r#"{"mem": 2}"#),
            Err(CompileError::Schema(_))
        ));
        assert!(matches!(
            one_group(r#"{"mem": "512M"}"#),
            Err(CompileError::Schema(_))
        ));
        assert!(one_group(r#"{"mem": "0"}"#).is_ok());
    }

    #[test]
    fn integer_keys_reject_wrong_type_and_range() {
        assert!(matches!(
            one_group(r#"{"cores": "2"}"#),
            Err(CompileError::Schema(_))
        ));
        assert!(matches!(
            one_group(r#"{"cores": -1}"#),
            Err(CompileError::Range(_))
        ));
        assert!(matches!(
            one_group(r#"{"nodes": 0}"#),
            Err(CompileError::Range(_))
        ));
        assert!(matches!(
            one_group(r#"{"cores": 1, "threads": 0}"#),
            Err(CompileError::Range(_))
        ));
    }

    #[test]
    fn threads_without_cores_is_rejected() {
        let err = one_group(r#"{"threads": 2}"#).unwrap_err();
        assert!(matches!(err, CompileError::Range(_)), "{err}");
        assert!(err.to_string().contains("cores"));
    }

    #[test]
    fn dimm_modes_parse() {
        for (literal, mode) in [
            ("\"\"", DimmMode::Builtin),
            ("\"none\"", DimmMode::Builtin),
            ("\"plugged\"", DimmMode::Plugged),
            ("\"unplugged\"", DimmMode::Unplugged),
        ] {
            let entries =
                one_group(&format!(r#"{{"mem": "1G", "dimm": {literal}}}"#)).unwrap();
            let TopologyEntry::Numa(g) = &entries[0] else {
                panic!("expected a NUMA group");
            };
            assert_eq!(g.dimm, mode, "literal {literal}");
        }
        assert!(matches!(
            one_group(r#"{"dimm": "hotplug"}"#),
            Err(CompileError::Schema(_))
        ));
    }

    #[test]
    fn node_dist_keys_are_node_indices() {
        let entries =
            one_group(r#"{"node-dist": {"0": 88, "3": 66}}"#).unwrap();
        let TopologyEntry::Numa(g) = &entries[0] else {
            panic!("expected a NUMA group");
        };
        let map = g.node_dist.as_ref().unwrap();
        assert_eq!(map[&0], 88);
        assert_eq!(map[&3], 66);
        assert!(matches!(
            one_group(r#"{"node-dist": {"x": 88}}"#),
            Err(CompileError::Schema(_))
        ));
    }

    #[test]
    fn dist_all_parses_rows() {
        let entries =
            one_group(r#"{"dist-all": [[10, 21], [21, 10]]}"#).unwrap();
        let TopologyEntry::Numa(g) = &entries[0] else {
            panic!("expected a NUMA group");
        };
        assert_eq!(g.dist_all.as_ref().unwrap()[1], vec![21, 10]);
        assert!(matches!(
            one_group(r#"{"dist-all": [10, 21]}"#),
            Err(CompileError::Schema(_))
        ));
    }

    #[test]
    fn document_must_be_a_list_of_objects() {
        assert!(matches!(
            parse_document(r#"{"mem": "2G"}"#),
            Err(CompileError::Schema(_))
        ));
        assert!(matches!(
            parse_document("[42]"),
            Err(CompileError::Schema(_))
        ));
        assert!(matches!(
            parse_document("not json"),
            Err(CompileError::Schema(_))
        ));
    }

    // ── CXL groups ───────────────────────────────────────────────────

    #[test]
    fn cxl_group_carries_no_other_keys() {
        let err = one_group(r#"{"cxl": [], "mem": "1G"}"#).unwrap_err();
        assert!(matches!(err, CompileError::Schema(_)), "{err}");
    }

    #[test]
    fn cxl_memory_device_defaults_to_present() {
        let entries = one_group(
            r#"{"cxl": [{"rootports": [{"mem": "256M"}]}]}"#,
        )
        .unwrap();
        let TopologyEntry::Cxl(bridges) = &entries[0] else {
            panic!("expected a CXL group");
        };
        let CxlDeviceSpec::Memory { size, present } = &bridges[0].rootports[0] else {
            panic!("expected a memory device");
        };
        assert_eq!(size.to_string(), "256M");
        assert!(*present);
    }

    #[test]
    fn cxl_switch_nests() {
        let entries = one_group(
            r#"{"cxl": [{"rootports": [
                {"switch": [{"mem": "1G"}, {"switch": [{"mem": "512M"}]}]}
            ]}]}"#,
        )
        .unwrap();
        let TopologyEntry::Cxl(bridges) = &entries[0] else {
            panic!("expected a CXL group");
        };
        let CxlDeviceSpec::Switch { ports } = &bridges[0].rootports[0] else {
            panic!("expected a switch");
        };
        assert_eq!(ports.len(), 2);
        assert!(matches!(ports[1], CxlDeviceSpec::Switch { .. }));
    }

    #[test]
    fn cxl_device_without_mem_or_switch_is_topology_error() {
        let err = one_group(
            r#"{"cxl": [{"rootports": [{"bridge": true}]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Topology(_)), "{err}");
    }

    #[test]
    fn cxl_mem_accepts_megabytes_and_gigabytes() {
        assert!(one_group(r#"{"cxl": [{"rootports": [{"mem": "2G"}]}]}"#).is_ok());
        assert!(matches!(
            one_group(r#"{"cxl": [{"rootports": [{"mem": "2T"}]}]}"#),
            Err(CompileError::Schema(_))
        ));
    }
}
