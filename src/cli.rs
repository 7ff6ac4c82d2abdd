//! command line arguments of the vmsh binary

use clap::Parser;

use crate::config::ShellConfig;
use crate::vbox::Binding;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "interactive virtual machine management shell")]
pub struct Cli {
    /// talk to the service over the web-service binding
    #[arg(short = 'w', long)]
    pub webservice: bool,

    /// start with verbose diagnostics off
    #[arg(short, long)]
    pub quiet: bool,

    /// tracing filter, e.g. `vmsh=debug`; falls back to RUST_LOG, then `warn`
    #[arg(long, value_name = "FILTER")]
    pub log: Option<String>,

    /// do not set up the performance collector
    #[arg(long)]
    pub no_metrics: bool,

    /// populate the simulated host with sample machines
    #[arg(long)]
    pub seed_demo: bool,
}

impl Cli {
    pub fn binding(&self) -> Binding {
        if self.webservice {
            Binding::Remote
        } else {
            Binding::Local
        }
    }

    pub fn shell_config(&self) -> ShellConfig {
        ShellConfig {
            verbose: !self.quiet,
            metrics: !self.no_metrics,
            ..ShellConfig::default()
        }
    }
}
