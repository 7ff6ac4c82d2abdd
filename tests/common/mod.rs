//! shared harness: a shell context over a simulated host with captured output

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use vmsh::commands::{CommandTable, Flow};
use vmsh::config::ShellConfig;
use vmsh::error::ScriptError;
use vmsh::output::{Captured, Output};
use vmsh::script::ScriptEngine;
use vmsh::shell::Context;
use vmsh::sim::SimHost;
use vmsh::vbox::{Binding, VirtualBox};

pub struct Harness {
    pub host: SimHost,
    pub ctx: Context,
    pub captured: Captured,
    pub table: CommandTable,
    pub scripts: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_host(SimHost::new())
    }

    pub fn remote() -> Self {
        Self::with_host(SimHost::with_binding(Binding::Remote))
    }

    pub fn with_host(host: SimHost) -> Self {
        Self::with_config(host, ShellConfig::default())
    }

    pub fn with_config(host: SimHost, config: ShellConfig) -> Self {
        let (out, captured) = Output::capture();
        let scripts = Arc::new(Mutex::new(Vec::new()));
        let vbox: Arc<dyn VirtualBox> = Arc::new(host.clone());
        let ctx = Context::new(vbox, config, out).with_script(Box::new(Recorder {
            seen: scripts.clone(),
        }));
        Self {
            host,
            ctx,
            captured,
            table: CommandTable::new(),
            scripts,
        }
    }

    /// dispatch one line the way the loop does and return what it printed
    pub fn line(&mut self, line: &str) -> String {
        self.line_flow(line).1
    }

    pub fn line_flow(&mut self, line: &str) -> (Flow, String) {
        let flow = match self.table.dispatch(&mut self.ctx, line) {
            Ok(flow) => flow,
            Err(e) => {
                self.ctx.report(&e);
                Flow::Continue
            }
        };
        (flow, self.captured.take())
    }

    /// output with machine ids replaced by names, timestamps dropped
    pub fn normalized(&self, output: &str) -> String {
        let mut text = output.to_string();
        for m in self.host.machines().unwrap() {
            text = text.replace(&m.id, &format!("<{}>", m.name));
        }
        text.lines()
            .filter(|l| !l.starts_with("  Last changed:"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// scripting engine that records what it was asked to run
pub struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptEngine for Recorder {
    fn eval(&mut self, text: &str) -> Result<String, ScriptError> {
        if text.is_empty() {
            return Err(ScriptError::Rejected("nothing to evaluate".into()));
        }
        self.seen.lock().unwrap().push(text.to_string());
        Ok(format!("evaluated {}\n", text))
    }
}

/// host with a powered-off and a running machine
pub fn populated() -> SimHost {
    let host = SimHost::new();
    host.add_machine("VM1", "Linux26");
    let running = host.add_machine("Box2", "WindowsXP");
    host.set_machine_state(&running.id, vmsh::vbox::MachineState::Running);
    host
}
