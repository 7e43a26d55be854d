//! NUMA group expansion: nodes, CPU ranges, memory backends.
//!
//! Walks the ordered group list and turns every group into concrete nodes
//! with sequential global IDs, emitting the per-node `-numa`, `-device` and
//! `-object` tokens as it goes. Node IDs are handed out in group, then
//! package, then die, then node order; that order is observable downstream
//! (CXL host-bridge attachment and distance output both depend on it).

use tracing::debug;

use crate::error::{CompileError, Result};
use crate::input::{DimmMode, NumaGroupSpec};
use crate::size::MemSize;

/// Default threads per core when the first CPU-bearing group leaves
/// `threads` unset.
pub const DEFAULT_THREADS: u32 = 2;

/// A monotonically increasing ID source.
///
/// Node, CPU, backend, die and socket IDs all survive across the nested
/// package/die/node loops; giving each its own allocator keeps the mutation
/// points visible instead of spreading ambient counters around.
#[derive(Debug, Default, Clone, Copy)]
struct IdAlloc {
    next: u32,
}

impl IdAlloc {
    fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Reserve `count` consecutive IDs, returning the first.
    fn next_range(&mut self, count: u32) -> u32 {
        let first = self.next;
        self.next += count;
        first
    }

    const fn allocated(self) -> u32 {
        self.next
    }
}

/// Everything the expansion pass produces.
#[derive(Debug, Clone)]
pub struct Expansion {
    /// `-numa` token pairs, per-node lines only (distances come later).
    pub numa_params: Vec<String>,
    /// `-device` token pairs for plugged DIMMs.
    pub device_params: Vec<String>,
    /// `-object` token pairs for memory backends.
    pub object_params: Vec<String>,
    /// At least one non-volatile backend exists; machine needs `nvdimm=on`.
    pub nvdimm: bool,
    pub node_count: usize,
    /// Total allocated logical CPUs; the `-smp maxcpus=` value.
    pub max_cpus: u32,
    /// CPUs present at boot; the `-smp cpus=` value.
    pub present_cpus: u32,
    /// Threads per core, fixed by the first CPU-bearing group.
    pub threads: Option<u32>,
    pub sockets: u32,
    pub dies: u32,
    pub total_mem: MemSize,
    pub total_nvmem: MemSize,
    /// Cold-plugged DIMM total: present at boot but attached via devices,
    /// so excluded from the initial `-m size=`.
    pub plugged: MemSize,
    /// Reserved-slot total: excluded from the initial size, included in
    /// `maxmem`.
    pub unplugged: MemSize,
    pub mem_slots: u32,
}

/// Expand the NUMA groups of a document, in list order.
pub fn expand(groups: &[&NumaGroupSpec]) -> Result<Expansion> {
    let mut out = Expansion {
        numa_params: Vec::new(),
        device_params: Vec::new(),
        object_params: Vec::new(),
        nvdimm: false,
        node_count: 0,
        max_cpus: 0,
        present_cpus: 0,
        threads: None,
        sockets: 0,
        dies: 0,
        total_mem: MemSize::ZERO_G,
        total_nvmem: MemSize::ZERO_G,
        plugged: MemSize::ZERO_G,
        unplugged: MemSize::ZERO_G,
        mem_slots: 0,
    };
    let mut nodes = IdAlloc::default();
    let mut cpus = IdAlloc::default();
    let mut backends = IdAlloc::default();
    let mut sockets = IdAlloc::default();
    let mut dies = IdAlloc::default();

    for (group, spec) in groups.iter().enumerate() {
        if spec.cores > 0 {
            match out.threads {
                None => out.threads = Some(spec.threads.unwrap_or(DEFAULT_THREADS)),
                Some(fixed) => {
                    if let Some(explicit) = spec.threads {
                        if explicit != fixed {
                            return Err(CompileError::ThreadMismatch(format!(
                                "all CPUs must have the same number of threads, \
                                 but group {group} sets {explicit} while an earlier \
                                 group fixed {fixed}"
                            )));
                        }
                    }
                }
            }
        }
        let cpus_per_node = if spec.cores > 0 {
            spec.cores * out.threads.unwrap_or(DEFAULT_THREADS)
        } else {
            0
        };

        let mut group_cpus = 0u32;
        for _package in 0..spec.packages {
            if cpus_per_node > 0 {
                sockets.next_id();
            }
            for _die in 0..spec.dies {
                if cpus_per_node > 0 {
                    dies.next_id();
                }
                for _node in 0..spec.nodes {
                    let node = nodes.next_id();
                    let mut node_params = Vec::new();
                    if !spec.mem.is_zero() {
                        emit_node_memory(
                            spec.mem,
                            false,
                            spec.dimm,
                            node,
                            &mut backends,
                            &mut out,
                            &mut node_params,
                        )?;
                    }
                    if !spec.nvmem.is_zero() {
                        out.nvdimm = true;
                        emit_node_memory(
                            spec.nvmem,
                            true,
                            spec.dimm,
                            node,
                            &mut backends,
                            &mut out,
                            &mut node_params,
                        )?;
                    }
                    if cpus_per_node > 0 {
                        if node_params.is_empty() {
                            node_params.push("-numa".into());
                            node_params.push(format!("node,nodeid={node}"));
                        }
                        let first = cpus.next_range(cpus_per_node);
                        let last = first + cpus_per_node - 1;
                        // CPUs ride on the node's last -numa line.
                        if let Some(tail) = node_params.last_mut() {
                            tail.push_str(&format!(",cpus={first}-{last}"));
                        }
                        group_cpus += cpus_per_node;
                    }
                    out.numa_params.extend(node_params);
                }
            }
        }
        if spec.cpus_present != 0 {
            // An explicit override replaces the running count outright.
            out.present_cpus = spec.cpus_present;
        } else {
            out.present_cpus += group_cpus;
        }
        debug!(
            group,
            nodes = nodes.allocated(),
            cpus = cpus.allocated(),
            "expanded NUMA group"
        );
    }

    out.node_count = nodes.allocated() as usize;
    out.max_cpus = cpus.allocated();
    out.sockets = sockets.allocated();
    out.dies = dies.allocated();
    Ok(out)
}

/// Emit the backend object, NUMA association and (for plugged DIMMs) the
/// device line for one node's RAM or NVRAM.
fn emit_node_memory(
    size: MemSize,
    nv: bool,
    dimm: DimmMode,
    node: u32,
    backends: &mut IdAlloc,
    out: &mut Expansion,
    node_params: &mut Vec<String>,
) -> Result<()> {
    let backend = backends.next_id();
    match dimm {
        DimmMode::Builtin => {
            let prefix = if nv { "memnvbuiltin" } else { "membuiltin" };
            out.object_params.push("-object".into());
            out.object_params.push(format!(
                "memory-backend-ram,size={size},id={prefix}_{backend}_node_{node}"
            ));
            node_params.push("-numa".into());
            node_params.push(format!(
                "node,nodeid={node},memdev={prefix}_{backend}_node_{node}"
            ));
        }
        DimmMode::Plugged => {
            let prefix = if nv { "memnvdimm" } else { "memdimm" };
            let (device, dev_id) = if nv { ("nvdimm", "nvdimm") } else { ("pc-dimm", "dimm") };
            out.object_params.push("-object".into());
            out.object_params.push(format!(
                "memory-backend-ram,size={size},id={prefix}_{backend}_node_{node}"
            ));
            node_params.push("-numa".into());
            node_params.push(format!("node,nodeid={node}"));
            out.device_params.push("-device".into());
            out.device_params.push(format!(
                "{device},node={node},id={dev_id}{backend},memdev={prefix}_{backend}_node_{node}"
            ));
            out.plugged = out.plugged.checked_add(size)?;
            out.mem_slots += 1;
        }
        DimmMode::Unplugged => {
            let prefix = if nv { "memnvdimm" } else { "memdimm" };
            out.object_params.push("-object".into());
            out.object_params.push(format!(
                "memory-backend-ram,size={size},id={prefix}_{backend}_node_{node}"
            ));
            node_params.push("-numa".into());
            node_params.push(format!("node,nodeid={node}"));
            out.unplugged = out.unplugged.checked_add(size)?;
            out.mem_slots += 1;
        }
    }
    if nv {
        out.total_nvmem = out.total_nvmem.checked_add(size)?;
    } else {
        out.total_mem = out.total_mem.checked_add(size)?;
    }
    Ok(())
}
