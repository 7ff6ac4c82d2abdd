//! shell housekeeping and host-wide commands

use std::sync::Arc;

use super::{ALIASES, Command, Flow};
use crate::error::{Result, ShellError};
use crate::listener::{VBoxMonitor, VirtualBoxListener};
use crate::monitor::MonitorDuration;
use crate::say;
use crate::shell::Context;
use crate::vbox::{Subject, VirtualBox};

pub(super) fn help(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    match args.get(1) {
        None => {
            say!(ctx.out, "Help page:");
            for command in Command::ALL {
                say!(ctx.out, "    {} : {}", command.name(), command.help());
            }
        }
        Some(&name) => match Command::ALL.iter().find(|c| c.name() == name) {
            Some(command) => say!(ctx.out, "    {} : {}", command.name(), command.help()),
            None => say!(ctx.out, "Command '{}' not known", name),
        },
    }
    Ok(Flow::Continue)
}

pub(super) fn aliases(ctx: &mut Context, _args: &[&str]) -> Result<Flow> {
    for (alias, command) in ALIASES {
        say!(ctx.out, "'{}' is an alias for '{}'", alias, command.name());
    }
    Ok(Flow::Continue)
}

pub(super) fn verbose(ctx: &mut Context, _args: &[&str]) -> Result<Flow> {
    ctx.verbose = !ctx.verbose;
    Ok(Flow::Continue)
}

pub(super) fn quit(_ctx: &mut Context, _args: &[&str]) -> Result<Flow> {
    Ok(Flow::Exit)
}

pub(super) fn host(ctx: &mut Context, _args: &[&str]) -> Result<Flow> {
    let host = ctx.vbox.host()?;
    say!(ctx.out, "Processor count: {}", host.processor_count());
    for (i, speed) in host.processor_speeds.iter().enumerate() {
        say!(ctx.out, "Processor #{} speed: {}MHz", i, speed);
    }
    if let Some(perf) = &ctx.perf {
        for metric in perf.query(&["*"], &[Subject::Host])? {
            say!(ctx.out, "{} {}", metric.name, metric.display);
        }
    }
    Ok(Flow::Continue)
}

pub(super) fn eval(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    let text = args.get(1..).unwrap_or(&[]).join(" ");
    let printed = ctx.script.eval(&text)?;
    if !printed.is_empty() {
        say!(ctx.out, "{}", printed.trim_end());
    }
    Ok(Flow::Continue)
}

pub(super) fn monitor_vbox(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    let usage = || ShellError::Usage("monitorVbox (duration)".into());
    if args.len() > 2 {
        return Err(usage());
    }
    let duration = match args.get(1) {
        Some(text) => MonitorDuration::parse(text).ok_or_else(usage)?,
        None => MonitorDuration::Seconds(ctx.config.default_monitor_secs),
    };
    let listener: Arc<dyn VirtualBoxListener> = Arc::new(VBoxMonitor::new(ctx.out.clone()));
    let source: &dyn VirtualBox = ctx.vbox.as_ref();
    let outcome = ctx.monitor().run(source, listener, duration)?;
    ctx.note_monitor_outcome(&outcome);
    Ok(Flow::Continue)
}
