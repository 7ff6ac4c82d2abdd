//! command table, aliases and dispatch
//!
//! lines are split on whitespace only; there is no quoting, so machine
//! names containing spaces cannot be passed as arguments.

mod control;
mod misc;
mod registry;

use std::collections::HashMap;

use crate::error::Result;
use crate::say;
use crate::shell::Context;

pub use control::ConsoleOp;

/// what the loop should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub type Handler = fn(&mut Context, &[&str]) -> Result<Flow>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Help,
    Start,
    Create,
    Remove,
    Pause,
    Resume,
    Stats,
    Stats2,
    PowerDown,
    List,
    Info,
    Aliases,
    Verbose,
    SetVar,
    Eval,
    Quit,
    Host,
    Guest,
    MonitorGuest,
    MonitorVbox,
}

impl Command {
    pub const ALL: [Command; 20] = [
        Command::Help,
        Command::Start,
        Command::Create,
        Command::Remove,
        Command::Pause,
        Command::Resume,
        Command::Stats,
        Command::Stats2,
        Command::PowerDown,
        Command::List,
        Command::Info,
        Command::Aliases,
        Command::Verbose,
        Command::SetVar,
        Command::Eval,
        Command::Quit,
        Command::Host,
        Command::Guest,
        Command::MonitorGuest,
        Command::MonitorVbox,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Start => "start",
            Command::Create => "create",
            Command::Remove => "remove",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stats => "stats",
            Command::Stats2 => "stats2",
            Command::PowerDown => "powerdown",
            Command::List => "list",
            Command::Info => "info",
            Command::Aliases => "aliases",
            Command::Verbose => "verbose",
            Command::SetVar => "setvar",
            Command::Eval => "eval",
            Command::Quit => "quit",
            Command::Host => "host",
            Command::Guest => "guest",
            Command::MonitorGuest => "monitorGuest",
            Command::MonitorVbox => "monitorVbox",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Command::Help => "Prints help information",
            Command::Start => "Start virtual machine by name or uuid: start Linux headless",
            Command::Create => "Create virtual machine: create name ostype <basefolder>",
            Command::Remove => "Remove virtual machine",
            Command::Pause => "Pause virtual machine",
            Command::Resume => "Resume virtual machine",
            Command::Stats => "Stats for virtual machine",
            Command::Stats2 => {
                "Guest additions statistics for virtual machine (local binding only)"
            }
            Command::PowerDown => "Power down virtual machine",
            Command::List => "Shows known virtual machines",
            Command::Info => "Shows info on machine",
            Command::Aliases => "Shows aliases",
            Command::Verbose => "Toggle verbosity",
            Command::SetVar => "Set VMs variable: setvar Fedora BIOSSettings.ACPIEnabled True",
            Command::Eval => "Evaluate arbitrary text on the host, unsafe: eval uname -a",
            Command::Quit => "Exits",
            Command::Host => "Show host information",
            Command::Guest => {
                "Execute command for guest: guest Win32 mouse.putMouseEvent(20, 20, 0, 0)"
            }
            Command::MonitorGuest => {
                "Monitor what happens with the guest for some time: monitorGuest Win32 10"
            }
            Command::MonitorVbox => {
                "Monitor what happens with Virtual Box for some time: monitorVbox 10"
            }
        }
    }

    fn handler(self) -> Handler {
        match self {
            Command::Help => misc::help,
            Command::Start => control::start,
            Command::Create => registry::create,
            Command::Remove => registry::remove,
            Command::Pause => control::pause,
            Command::Resume => control::resume,
            Command::Stats => control::stats,
            Command::Stats2 => control::stats2,
            Command::PowerDown => control::powerdown,
            Command::List => registry::list,
            Command::Info => registry::info,
            Command::Aliases => misc::aliases,
            Command::Verbose => misc::verbose,
            Command::SetVar => registry::setvar,
            Command::Eval => misc::eval,
            Command::Quit => misc::quit,
            Command::Host => misc::host,
            Command::Guest => control::guest,
            Command::MonitorGuest => control::monitor_guest,
            Command::MonitorVbox => misc::monitor_vbox,
        }
    }
}

/// short tokens standing in for a command; never keys of the table itself
pub const ALIASES: &[(&str, Command)] = &[
    ("s", Command::Start),
    ("i", Command::Info),
    ("l", Command::List),
    ("h", Command::Help),
    ("a", Command::Aliases),
    ("q", Command::Quit),
    ("exit", Command::Quit),
    ("v", Command::Verbose),
];

pub fn alias(token: &str) -> Option<Command> {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == token)
        .map(|(_, command)| *command)
}

pub fn tokenize(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

#[derive(Clone, Copy)]
pub struct CommandEntry {
    pub command: Command,
    pub help: &'static str,
    pub handler: Handler,
}

/// canonical command name → entry, built once per shell
pub struct CommandTable {
    entries: HashMap<&'static str, CommandEntry>,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTable {
    pub fn new() -> Self {
        let entries = Command::ALL
            .iter()
            .map(|&command| {
                let entry = CommandEntry {
                    command,
                    help: command.help(),
                    handler: command.handler(),
                };
                (command.name(), entry)
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.entries.get(name)
    }

    /// alias lookup first, then the table
    pub fn resolve(&self, token: &str) -> Option<&CommandEntry> {
        let name = alias(token).map(Command::name).unwrap_or(token);
        self.get(name)
    }

    /// run one input line; the handler decides whether the shell goes on
    pub fn dispatch(&self, ctx: &mut Context, line: &str) -> Result<Flow> {
        let mut args = tokenize(line);
        let Some(&first) = args.first() else {
            return Ok(Flow::Continue);
        };
        let Some(entry) = self.resolve(first) else {
            say!(
                ctx.out,
                "Unknown command: '{}', type 'help' for list of known commands",
                first
            );
            let known: Vec<&str> = Command::ALL.iter().map(|c| c.name()).collect();
            say!(ctx.out, "Known commands: {}", known.join(", "));
            return Ok(Flow::Continue);
        };
        // handlers see the canonical name, so an alias behaves like its command
        args[0] = entry.command.name();
        (entry.handler)(ctx, &args)
    }
}
