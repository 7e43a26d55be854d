//! Ordered option buckets and output rendering.

/// How the compiled parameters are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// One flat, space-joined parameter string.
    #[default]
    Flat,
    /// `NAME:value` segments delimited by `|`, with the numa/device/object
    /// tokens quoted and comma-joined under `EXTRA`.
    Separated,
}

/// The compiled parameter set: ordered, append-only token buckets.
///
/// Tokens come in flag/value pairs (`"-numa"`, `"node,nodeid=0"`); the
/// fixed bucket order below is what QEMU sees on its command line.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QemuOptionSet {
    pub machine: Vec<String>,
    pub cpu: Vec<String>,
    pub smp: Vec<String>,
    pub mem: Vec<String>,
    pub numa: Vec<String>,
    pub device: Vec<String>,
    pub object: Vec<String>,
}

impl QemuOptionSet {
    /// All tokens in output order.
    fn tokens(&self) -> impl Iterator<Item = &String> {
        self.machine
            .iter()
            .chain(&self.cpu)
            .chain(&self.smp)
            .chain(&self.mem)
            .chain(&self.numa)
            .chain(&self.device)
            .chain(&self.object)
    }

    /// Render the option set as a single output line.
    #[must_use]
    pub fn render(&self, mode: RenderMode) -> String {
        match mode {
            RenderMode::Flat => {
                self.tokens().map(String::as_str).collect::<Vec<_>>().join(" ")
            }
            RenderMode::Separated => {
                let extra = self
                    .numa
                    .iter()
                    .chain(&self.device)
                    .chain(&self.object)
                    .map(|token| format!("\"{token}\""))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "MACHINE:{}|CPU:{}|SMP:{}|MEM:{}|EXTRA:{extra}",
                    self.machine.join(" "),
                    self.cpu.join(" "),
                    self.smp.join(" "),
                    self.mem.join(" "),
                )
            }
        }
    }
}
