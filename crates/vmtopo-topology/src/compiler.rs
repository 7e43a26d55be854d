//! Top-level compilation: validated document in, option set out.
//!
//! Data flows strictly forward: expand the NUMA groups, derive the distance
//! table from the same group order, compile the CXL forest against the node
//! count, then assemble the summary parameters around the accumulated
//! buckets. The whole pass is a pure function of the document; identical
//! input yields an identical option set.

use crate::cxl::{build_fabric, CxlFabric};
use crate::distance::build_distances;
use crate::error::{CompileError, Result};
use crate::expand::{expand, Expansion};
use crate::input::{CxlHostBridgeSpec, NumaGroupSpec, TopologyEntry};
use crate::options::QemuOptionSet;
use crate::size::MemSize;

/// Compile a validated topology document into QEMU options.
pub fn compile(entries: &[TopologyEntry]) -> Result<QemuOptionSet> {
    let groups: Vec<&NumaGroupSpec> = entries
        .iter()
        .filter_map(|e| match e {
            TopologyEntry::Numa(g) => Some(g),
            TopologyEntry::Cxl(_) => None,
        })
        .collect();
    let bridges: Vec<&CxlHostBridgeSpec> = entries
        .iter()
        .filter_map(|e| match e {
            TopologyEntry::Cxl(b) => Some(b),
            TopologyEntry::Numa(_) => None,
        })
        .flat_map(|b| b.iter())
        .collect();

    let expansion = expand(&groups)?;
    let distances = build_distances(&groups)?;
    let fabric = if bridges.is_empty() {
        None
    } else {
        Some(build_fabric(&bridges, expansion.node_count)?)
    };

    let Some(threads) = expansion.threads else {
        return Err(CompileError::Topology(
            "no CPUs found, make sure at least one NUMA node has \"cores\" > 0".into(),
        ));
    };

    let mut opts = QemuOptionSet::default();
    opts.machine.push("-machine".into());
    opts.machine.push(machine_value(&expansion, fabric.as_ref()));
    if let Some(f) = &fabric {
        opts.machine.extend(f.machine_params.iter().cloned());
    }

    opts.cpu.push("-cpu".into());
    opts.cpu.push("host".into());

    opts.smp.push("-smp".into());
    opts.smp.push(smp_value(&expansion, threads));

    opts.mem.push("-m".into());
    opts.mem.push(mem_value(&expansion, fabric.as_ref())?);

    opts.numa = expansion.numa_params;
    for src in 0..distances.size() {
        for dst in 0..distances.size() {
            if src == dst {
                continue;
            }
            opts.numa.push("-numa".into());
            opts.numa.push(format!(
                "dist,src={src},dst={dst},val={}",
                distances.get(src, dst)
            ));
        }
    }

    opts.device = expansion.device_params;
    opts.object = expansion.object_params;
    if let Some(f) = fabric {
        opts.device.extend(f.device_params);
        opts.object.extend(f.object_params);
    }
    Ok(opts)
}

fn machine_value(expansion: &Expansion, fabric: Option<&CxlFabric>) -> String {
    let mut value = String::from("pc");
    if expansion.nvdimm {
        value.push_str(",nvdimm=on");
    }
    if fabric.is_some() {
        value.push_str(",cxl=on");
    }
    value
}

fn smp_value(expansion: &Expansion, threads: u32) -> String {
    // The dies qualifier needs a newer machine type, so it is emitted only
    // when a socket actually holds more than one die.
    let dies_per_socket = expansion.dies / expansion.sockets;
    let dies = if dies_per_socket > 1 {
        format!(",dies={dies_per_socket}")
    } else {
        String::new()
    };
    format!(
        "cpus={},threads={threads}{dies},sockets={},maxcpus={}",
        expansion.present_cpus, expansion.sockets, expansion.max_cpus
    )
}

fn mem_value(expansion: &Expansion, fabric: Option<&CxlFabric>) -> Result<String> {
    let boot_and_plug = expansion.total_mem.checked_add(expansion.total_nvmem)?;
    let initial = boot_and_plug
        .checked_sub(expansion.unplugged)?
        .checked_sub(expansion.plugged)?;
    let cxl_devices = fabric.map_or(0, |f| f.memory_devices);
    let cxl_gib = fabric.map_or(0, CxlFabric::total_gib);
    // CXL capacity arrives through its own device tree, never through -m,
    // but it raises the plug ceiling.
    let maxmem = MemSize::gibibytes(boot_and_plug.amount() + cxl_gib);
    let slots = expansion.mem_slots + cxl_devices;

    if initial.amount() <= 0 {
        let hotplug_only = !expansion.plugged.is_zero()
            || !expansion.unplugged.is_zero()
            || cxl_devices > 0;
        return Err(CompileError::Topology(if hotplug_only {
            "no initial memory in any NUMA node - cannot boot with hotpluggable memory"
                .into()
        } else {
            "no memory in any NUMA node".into()
        }));
    }
    Ok(format!("size={initial},slots={slots},maxmem={maxmem}"))
}
