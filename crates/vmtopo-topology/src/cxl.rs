//! CXL fabric compilation: host bridges, root ports, switches, memory
//! expanders.
//!
//! The whole forest shares one [`CxlAllocator`]: a bus-number cursor that
//! parcels out a fixed stride per host bridge, a port-index cursor shared by
//! root ports and downstream switch ports, a (chassis, slot) pair stepped
//! per port so every port's pair is globally unique, and the memory-device
//! counter that fixes each expander's backend ID and serial number
//! independent of its position in the tree.

use tracing::debug;

use crate::error::{CompileError, Result};
use crate::input::{CxlDeviceSpec, CxlHostBridgeSpec};

/// Bus number handed to the first host bridge.
pub const BUS_NR_BASE: u32 = 12;
/// Bus numbers reserved per host bridge for its subordinate buses.
pub const BUS_NR_STRIDE: u32 = 20;

/// Firmware windows grow in whole multiples of this many gibibytes.
const WINDOW_GRANULE_GIB: u64 = 4;

/// Counter state threaded through the whole fabric build.
#[derive(Debug)]
struct CxlAllocator {
    bus_nr: u32,
    port: u32,
    chassis: u32,
    slot: u32,
    memdev: u32,
}

impl CxlAllocator {
    const fn new() -> Self {
        Self { bus_nr: BUS_NR_BASE, port: 0, chassis: 0, slot: 0, memdev: 0 }
    }

    fn next_bus_nr(&mut self) -> u32 {
        let nr = self.bus_nr;
        self.bus_nr += BUS_NR_STRIDE;
        nr
    }

    fn next_port(&mut self) -> u32 {
        let port = self.port;
        self.port += 1;
        port
    }

    fn next_chassis_slot(&mut self) -> (u32, u32) {
        let pair = (self.chassis, self.slot);
        self.chassis += 1;
        self.slot += 1;
        pair
    }

    fn next_memdev(&mut self) -> u32 {
        let id = self.memdev;
        self.memdev += 1;
        id
    }
}

/// Compiled fabric: device/object tokens plus the memory accounting the
/// option assembler folds into `-m` and the machine flags.
#[derive(Debug, Clone)]
pub struct CxlFabric {
    pub device_params: Vec<String>,
    pub object_params: Vec<String>,
    /// `-M cxl-fmw...` token pairs, one window per host bridge.
    pub machine_params: Vec<String>,
    /// Sum of all expander sizes, present or not.
    pub total_mib: u64,
    /// Number of memory expanders; each occupies a hot-plug capable slot.
    pub memory_devices: u32,
}

impl CxlFabric {
    /// Total fabric memory rounded up to the next whole gibibyte.
    #[must_use]
    pub const fn total_gib(&self) -> i64 {
        (self.total_mib.div_ceil(1024)) as i64
    }

    /// Firmware window span: the total rounded up to the granule, and never
    /// smaller than one granule, so hot-plugged capacity always fits.
    #[must_use]
    pub const fn window_gib(&self) -> u64 {
        let granules = self.total_mib.div_ceil(WINDOW_GRANULE_GIB * 1024);
        if granules == 0 {
            WINDOW_GRANULE_GIB
        } else {
            granules * WINDOW_GRANULE_GIB
        }
    }
}

/// Compile a forest of host bridges. Bridge `i` attaches to NUMA node `i`;
/// `node_count` is the number of nodes the expansion produced.
pub fn build_fabric(
    bridges: &[&CxlHostBridgeSpec],
    node_count: usize,
) -> Result<CxlFabric> {
    let mut alloc = CxlAllocator::new();
    let mut fabric = CxlFabric {
        device_params: Vec::new(),
        object_params: Vec::new(),
        machine_params: Vec::new(),
        total_mib: 0,
        memory_devices: 0,
    };

    for (index, bridge) in bridges.iter().enumerate() {
        if index >= node_count {
            return Err(CompileError::Topology(format!(
                "CXL host bridge {index} attaches to NUMA node {index}, \
                 but only {node_count} nodes are defined"
            )));
        }
        let bus_nr = alloc.next_bus_nr();
        let bridge_id = format!("cxl.{index}");
        fabric.device_params.push("-device".into());
        fabric.device_params.push(format!(
            "pxb-cxl,id={bridge_id},bus=pcie.0,bus_nr={bus_nr},numa_node={index}"
        ));
        for port in &bridge.rootports {
            build_root_port(port, &bridge_id, &mut alloc, &mut fabric)?;
        }
    }

    let window = fabric.window_gib();
    for index in 0..bridges.len() {
        fabric.machine_params.push("-M".into());
        fabric.machine_params.push(format!(
            "cxl-fmw.{index}.targets.0=cxl.{index},cxl-fmw.{index}.size={window}G"
        ));
    }
    debug!(
        bridges = bridges.len(),
        memory_devices = fabric.memory_devices,
        total_mib = fabric.total_mib,
        "compiled CXL fabric"
    );
    Ok(fabric)
}

fn build_root_port(
    device: &CxlDeviceSpec,
    bridge_id: &str,
    alloc: &mut CxlAllocator,
    fabric: &mut CxlFabric,
) -> Result<()> {
    let port = alloc.next_port();
    let (chassis, slot) = alloc.next_chassis_slot();
    fabric.device_params.push("-device".into());
    fabric.device_params.push(format!(
        "cxl-rp,id=cxl-rp{port},bus={bridge_id},port={port},chassis={chassis},slot={slot}"
    ));
    attach_device(device, &format!("cxl-rp{port}"), port, alloc, fabric)
}

/// Attach one device below a port, recursing through switches.
fn attach_device(
    device: &CxlDeviceSpec,
    parent_bus: &str,
    parent_port: u32,
    alloc: &mut CxlAllocator,
    fabric: &mut CxlFabric,
) -> Result<()> {
    match device {
        CxlDeviceSpec::Memory { size, present } => {
            let memdev = alloc.next_memdev();
            // The backend always exists so the expander can be hot-added
            // later without re-deriving its identity.
            fabric.object_params.push("-object".into());
            fabric.object_params.push(format!(
                "memory-backend-ram,id=cxl-mem{memdev},size={size},share=on"
            ));
            fabric.total_mib += size.as_mebibytes() as u64;
            fabric.memory_devices += 1;
            if *present {
                fabric.device_params.push("-device".into());
                fabric.device_params.push(format!(
                    "cxl-type3,bus={parent_bus},volatile-memdev=cxl-mem{memdev},\
                     id=cxl-type3-{memdev},sn={memdev}"
                ));
            }
            Ok(())
        }
        CxlDeviceSpec::Switch { ports } => {
            fabric.device_params.push("-device".into());
            fabric.device_params.push(format!(
                "cxl-upstream,bus={parent_bus},id=cxl-up{parent_port}"
            ));
            for downstream in ports {
                let port = alloc.next_port();
                let (chassis, slot) = alloc.next_chassis_slot();
                fabric.device_params.push("-device".into());
                fabric.device_params.push(format!(
                    "cxl-downstream,port={port},bus=cxl-up{parent_port},\
                     id=cxl-dp{port},chassis={chassis},slot={slot}"
                ));
                attach_device(downstream, &format!("cxl-dp{port}"), port, alloc, fabric)?;
            }
            Ok(())
        }
    }
}
