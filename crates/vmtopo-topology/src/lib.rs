//! Machine topology compiler.
//!
//! Takes a declarative JSON description of a machine's NUMA/memory/CPU
//! layout and optional CXL fabric and compiles it into the exact QEMU
//! parameters that boot a virtual machine with that hardware shape.
//!
//! The pipeline is strictly forward: [`parse_document`] validates the raw
//! document, [`compile`] expands NUMA groups into nodes with sequential
//! global IDs, derives the node-to-node distance table, compiles the CXL
//! forest, and assembles the final [`QemuOptionSet`]. Everything is a pure
//! function of the input; re-running on identical bytes yields identical
//! output.

pub mod compiler;
pub mod cxl;
pub mod distance;
pub mod error;
pub mod expand;
pub mod input;
pub mod options;
pub mod size;

pub use compiler::compile;
pub use distance::DistanceMatrix;
pub use error::{CompileError, Result};
pub use input::{
    parse_document, CxlDeviceSpec, CxlHostBridgeSpec, DimmMode, NumaGroupSpec,
    TopologyEntry,
};
pub use options::{QemuOptionSet, RenderMode};
pub use size::{MemSize, SizeUnit};
