//! shell context and the interactive loop

use std::error::Error as _;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::commands::{CommandTable, Flow};
use crate::config::ShellConfig;
use crate::error::ShellError;
use crate::input::{LineReader, ReadEvent};
use crate::interrupt::Interrupt;
use crate::metrics::PerfCollector;
use crate::monitor::{Monitor, MonitorOutcome};
use crate::output::Output;
use crate::say;
use crate::script::{HostShell, ScriptEngine};
use crate::vbox::{Subject, VirtualBox};

const QUIT_HINT: &str = "====== You can type quit or q to leave";

/// everything a command handler can reach
pub struct Context {
    pub vbox: Arc<dyn VirtualBox>,
    /// `None` when metrics are switched off or the service has no collector
    pub perf: Option<PerfCollector>,
    pub config: ShellConfig,
    pub verbose: bool,
    pub out: Output,
    pub interrupt: Interrupt,
    pub script: Box<dyn ScriptEngine>,
}

impl Context {
    pub fn new(vbox: Arc<dyn VirtualBox>, config: ShellConfig, out: Output) -> Self {
        let perf = if config.metrics {
            match vbox.performance_collector() {
                Ok(collector) => Some(PerfCollector::new(collector)),
                Err(e) => {
                    warn!("performance collector unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Self {
            vbox,
            perf,
            verbose: config.verbose,
            config,
            out,
            interrupt: Interrupt::new(),
            script: Box::new(HostShell),
        }
    }

    pub fn with_script(mut self, script: Box<dyn ScriptEngine>) -> Self {
        self.script = script;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn monitor(&self) -> Monitor<'_> {
        Monitor::new(self.vbox.as_ref(), &self.interrupt)
            .with_slice(self.config.monitor_slice)
            .with_ceiling(self.config.monitor_ceiling)
    }

    pub(crate) fn note_monitor_outcome(&self, outcome: &MonitorOutcome) {
        match outcome {
            MonitorOutcome::Elapsed => {}
            MonitorOutcome::Interrupted => debug!("monitoring interrupted"),
            MonitorOutcome::Faulted(e) => {
                if self.verbose {
                    say!(self.out, "monitoring stopped: {}", e);
                }
            }
        }
    }

    /// print a failed command; the source chain only when verbose
    pub fn report(&self, err: &ShellError) {
        say!(self.out, "{}", err);
        if !self.verbose {
            return;
        }
        let shown = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            // `#[from]` variants already embed their source in the message
            if !shown.contains(&text) {
                say!(self.out, "  caused by: {}", text);
            }
            source = cause.source();
        }
    }

    fn setup_host_metrics(&self) {
        let Some(perf) = &self.perf else {
            return;
        };
        let (period, samples) = (self.config.metric_period, self.config.metric_samples);
        if let Err(e) = perf.setup(&["*"], &[Subject::Host], period, samples) {
            debug!("host metrics setup failed: {}", e);
        }
    }

    fn teardown_host_metrics(&self) {
        let Some(perf) = &self.perf else {
            return;
        };
        if let Err(e) = perf.disable(&["*"], &[Subject::Host]) {
            debug!("host metrics teardown failed: {}", e);
        }
    }
}

/// read, dispatch and report until quit, Ctrl+C at the prompt or end of input
pub fn run(ctx: &mut Context, input: &mut dyn LineReader) {
    let table = CommandTable::new();

    match ctx.vbox.version() {
        Ok(version) => say!(ctx.out, "Running VirtualBox version {}", version),
        Err(e) => warn!("cannot query service version: {}", e),
    }
    ctx.setup_host_metrics();

    loop {
        let prompt = ctx.config.prompt.clone();
        let line = match input.read_line(&prompt) {
            Ok(ReadEvent::Line(line)) => line,
            Ok(ReadEvent::Interrupted) => {
                say!(ctx.out, "{}", QUIT_HINT);
                break;
            }
            Ok(ReadEvent::Eof) => break,
            Err(e) => {
                ctx.report(&ShellError::Io(e));
                break;
            }
        };
        match table.dispatch(ctx, &line) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break,
            Err(e) => ctx.report(&e),
        }
        // Ctrl+C while a command ran; monitors consume their own
        if ctx.interrupt.is_set() {
            ctx.interrupt.clear();
            say!(ctx.out, "{}", QUIT_HINT);
            break;
        }
    }

    ctx.teardown_host_metrics();
}
