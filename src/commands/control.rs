//! commands that drive a machine through a session

use std::sync::Arc;

use tracing::debug;

use super::Flow;
use crate::error::{Result, ShellError};
use crate::listener::{ConsoleListener, GuestMonitor};
use crate::monitor::MonitorDuration;
use crate::resolve::machine_arg;
use crate::say;
use crate::session::{SessionManager, with_console};
use crate::shell::Context;
use crate::vbox::{Console, MachineRef, Subject};

/// what to do with the console of an attached session
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleOp {
    Pause,
    Resume,
    PowerDown,
    Stats,
    /// guest additions statistics, local binding only
    ExtendedStats,
    /// arbitrary command text, passed through unchecked
    Guest(String),
    Monitor(MonitorDuration),
}

impl ConsoleOp {
    pub fn name(&self) -> &'static str {
        match self {
            ConsoleOp::Pause => "pause",
            ConsoleOp::Resume => "resume",
            ConsoleOp::PowerDown => "powerdown",
            ConsoleOp::Stats => "stats",
            ConsoleOp::ExtendedStats => "stats2",
            ConsoleOp::Guest(_) => "guest",
            ConsoleOp::Monitor(_) => "monitorGuest",
        }
    }

    fn local_only(&self) -> bool {
        matches!(self, ConsoleOp::ExtendedStats)
    }

    fn run(&self, ctx: &Context, machine: &MachineRef, console: &dyn Console) -> Result<()> {
        if self.local_only() && ctx.vbox.binding().is_remote() {
            return Err(ShellError::LocalOnly(self.name()));
        }
        match self {
            ConsoleOp::Pause => console.pause()?,
            ConsoleOp::Resume => console.resume()?,
            ConsoleOp::PowerDown => console.power_down()?,
            ConsoleOp::Stats => {
                let subject = Subject::Machine(machine.id.clone());
                if let Some(perf) = &ctx.perf {
                    for metric in perf.query(&["*"], &[subject])? {
                        say!(ctx.out, "{} {}", metric.name, metric.display);
                    }
                }
            }
            ConsoleOp::ExtendedStats => {
                for (name, value) in console.guest_statistics()? {
                    say!(ctx.out, "  {}: {}", name, value);
                }
            }
            ConsoleOp::Guest(command) => {
                let reply = console.execute(command)?;
                if !reply.is_empty() {
                    say!(ctx.out, "{}", reply.trim_end());
                }
            }
            ConsoleOp::Monitor(duration) => {
                let listener: Arc<dyn ConsoleListener> =
                    Arc::new(GuestMonitor::new(&machine.name, ctx.out.clone()));
                let outcome = ctx.monitor().run(console, listener, *duration)?;
                ctx.note_monitor_outcome(&outcome);
            }
        }
        Ok(())
    }
}

/// attach to `machine`, run `op` on its console, release the session
pub fn console_op(ctx: &Context, machine: &MachineRef, op: ConsoleOp) -> Result<()> {
    debug!(machine = %machine.name, op = op.name(), "console operation");
    with_console(ctx.vbox.as_ref(), machine, |console| op.run(ctx, machine, console))
}

fn machine_op(ctx: &mut Context, args: &[&str], op: ConsoleOp) -> Result<Flow> {
    let machine = machine_arg(ctx.vbox.as_ref(), args)?;
    console_op(ctx, &machine, op)?;
    Ok(Flow::Continue)
}

pub(super) fn start(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    let machine = machine_arg(ctx.vbox.as_ref(), args)?;
    let frontend = args
        .get(2)
        .copied()
        .unwrap_or(ctx.config.default_frontend.as_str());

    let (session, launch) = SessionManager::new(ctx.vbox.as_ref()).launch(&machine, frontend)?;
    say!(ctx.out, "Completed: {}, rc: {:#x}", launch.completed, launch.result_code);

    if launch.succeeded() {
        // a machine without stats is still a started machine
        if let Some(perf) = &ctx.perf {
            let subject = Subject::Machine(machine.id.clone());
            let (period, samples) = (ctx.config.metric_period, ctx.config.metric_samples);
            if let Err(e) = perf.setup(&["*"], &[subject], period, samples) {
                debug!("metrics setup for {} failed: {}", machine.name, e);
                if ctx.verbose {
                    say!(ctx.out, "metrics unavailable: {}", e);
                }
            }
        }
        // the launched process owns the machine now
        session.close()?;
    } else if ctx.vbox.binding().is_remote() {
        debug!("error lookup skipped on remote binding");
    } else {
        match ctx.vbox.error_info(launch.result_code) {
            Ok(description) => say!(ctx.out, "{}", description),
            Err(e) => debug!("error lookup failed: {}", e),
        }
    }
    Ok(Flow::Continue)
}

pub(super) fn pause(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    machine_op(ctx, args, ConsoleOp::Pause)
}

pub(super) fn resume(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    machine_op(ctx, args, ConsoleOp::Resume)
}

pub(super) fn powerdown(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    machine_op(ctx, args, ConsoleOp::PowerDown)
}

pub(super) fn stats(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    machine_op(ctx, args, ConsoleOp::Stats)
}

pub(super) fn stats2(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    machine_op(ctx, args, ConsoleOp::ExtendedStats)
}

pub(super) fn guest(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    if args.len() < 3 {
        return Err(ShellError::Usage("guest name commands".into()));
    }
    let command = args[2..].join(" ");
    machine_op(ctx, args, ConsoleOp::Guest(command))
}

pub(super) fn monitor_guest(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    if args.len() < 2 {
        return Err(ShellError::Usage("monitorGuest name (duration)".into()));
    }
    let duration = match args.get(2) {
        Some(text) => MonitorDuration::parse(text)
            .ok_or_else(|| ShellError::Usage("monitorGuest name (duration)".into()))?,
        None => MonitorDuration::Seconds(ctx.config.default_monitor_secs),
    };
    machine_op(ctx, args, ConsoleOp::Monitor(duration))
}
