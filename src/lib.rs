//! vmsh: interactive shell for a virtualization management service
//!
//! sequences registry, session, console and metrics calls against a
//! `VirtualBox` binding; `sim` provides an in-memory one.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod input;
pub mod interrupt;
pub mod listener;
pub mod metrics;
pub mod monitor;
pub mod output;
pub mod resolve;
pub mod script;
pub mod session;
pub mod shell;
pub mod sim;
pub mod vbox;
