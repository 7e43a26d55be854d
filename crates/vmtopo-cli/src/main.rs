//! vmtopo command-line front end.
//!
//! Reads a topology document from a file argument or standard input, prints
//! the compiled QEMU parameter line to standard output. Every failure is a
//! single `vmtopo: message` line on standard error and a non-zero exit;
//! standard output stays empty so callers can splice it into a command line
//! unconditionally.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use vmtopo_topology::{compile, parse_document, RenderMode};

mod exit;

/// Environment toggle: `1` switches to the separated output rendering.
const SEPARATED_OUTPUT_VAR: &str = "VMTOPO_SEPARATED_OUTPUT";

const LONG_ABOUT: &str = r#"Reads a JSON machine topology description and prints the QEMU parameters
that boot a virtual machine with that hardware shape.

The input is a list of NUMA group objects. Group keys:

  "mem"       RAM size per node in this group, e.g. "2G" (default "0G")
  "nvmem"     non-volatile RAM size per node, e.g. "8G" (default "0G")
  "dimm"      "none" (default): memory is built into the node,
              "plugged": cold-plugged DIMM device, present at boot,
              "unplugged": backing object only, slot kept free for hot plug
  "cores"     CPU cores per node (default 0)
  "threads"   threads per core (default 2, requires "cores" > 0; all
              CPU-bearing groups must agree)
  "nodes"     NUMA nodes per die (default 1)
  "dies"      dies per package (default 1)
  "packages"  packages (default 1)
  "cpus-present"  present-at-boot CPU count override (default: all)

Distance keys (a node's distance to itself is always 10):

  "dist-all"            full matrix [[from0to0, from0to1, ...], ...],
                        authoritative when given
  "node-dist"           {"node": dist, ...} symmetric overrides from this
                        group's nodes to the named nodes
  "dist-same-die"       default between nodes on one die (11)
  "dist-same-package"   default between dies of one package (21)
  "dist-other-package"  default between packages (21)

A CXL fabric goes into its own {"cxl": [...]} list entry; host bridge N
attaches to NUMA node N:

  {"cxl": [{"rootports": [
      {"mem": "256M"},
      {"mem": "1G", "present": false},
      {"switch": [{"mem": "512M"}]}
  ]}]}

Example:

  $ echo '[{"mem": "2G", "cores": 2, "nodes": 2},
           {"mem": "1G", "cores": 2, "nodes": 2},
           {"nvmem": "8G", "node-dist": {"0": 88, "1": 88}}]' | vmtopo

Set VMTOPO_SEPARATED_OUTPUT=1 to print MACHINE:|CPU:|SMP:|MEM:|EXTRA:
segments instead of one flat parameter string."#;

#[derive(Parser)]
#[command(name = "vmtopo")]
#[command(about = "Compile a NUMA/CXL topology description into QEMU options")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
struct Cli {
    /// Topology JSON file (reads standard input when omitted)
    input: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();
    match run(&cli) {
        Ok(line) => println!("{line}"),
        Err(err) => {
            eprintln!("vmtopo: {err:#}");
            std::process::exit(exit::EXIT_FAIL);
        }
    }
}

fn run(cli: &Cli) -> Result<String> {
    let text = match &cli.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("cannot read standard input")?;
            buffer
        }
    };
    let entries = parse_document(&text)?;
    let options = compile(&entries)?;
    Ok(options.render(render_mode()))
}

fn render_mode() -> RenderMode {
    let separated = std::env::var(SEPARATED_OUTPUT_VAR)
        .map(|v| v == "1")
        .unwrap_or(false);
    if separated {
        RenderMode::Separated
    } else {
        RenderMode::Flat
    }
}

/// Tracing goes to stderr; stdout carries only the compiled line.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
