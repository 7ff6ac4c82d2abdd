//! vmsh - interactive virtual machine management shell

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use rustyline::DefaultEditor;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use vmsh::cli::Cli;
use vmsh::interrupt::Interrupt;
use vmsh::output::Output;
use vmsh::shell::{self, Context};
use vmsh::sim::SimHost;

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref());

    let host = if cli.seed_demo {
        SimHost::demo(cli.binding())
    } else {
        SimHost::with_binding(cli.binding())
    };
    debug!(binding = ?cli.binding(), "service binding ready");

    let interrupt = Interrupt::new();
    interrupt
        .install_handler()
        .context("failed to install Ctrl+C handler")?;

    let mut editor = DefaultEditor::new().context("failed to set up the terminal")?;
    let mut ctx = Context::new(Arc::new(host), cli.shell_config(), Output::stdout())
        .with_interrupt(interrupt);

    shell::run(&mut ctx, &mut editor);
    Ok(())
}
