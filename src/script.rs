//! unsafe scripting interface behind `eval`
//!
//! whatever text the operator types is handed to the engine as is. the
//! default engine runs it through the host shell with the privileges of
//! this process; nothing is sandboxed.

use std::process::Command;

use crate::error::ScriptError;

pub trait ScriptEngine {
    /// run `text`, returning what it printed
    fn eval(&mut self, text: &str) -> Result<String, ScriptError>;
}

/// runs text with `sh -c` (`cmd /C` on windows)
#[derive(Debug, Default)]
pub struct HostShell;

impl ScriptEngine for HostShell {
    fn eval(&mut self, text: &str) -> Result<String, ScriptError> {
        if text.trim().is_empty() {
            return Err(ScriptError::Rejected("nothing to evaluate".into()));
        }
        let output = if cfg!(windows) {
            Command::new("cmd").arg("/C").arg(text).output()
        } else {
            Command::new("sh").arg("-c").arg(text).output()
        }
        .map_err(ScriptError::Spawn)?;

        if !output.status.success() {
            return Err(ScriptError::Exit {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// refuses everything; for bindings where `eval` must stay off
#[derive(Debug, Default)]
pub struct Disabled;

impl ScriptEngine for Disabled {
    fn eval(&mut self, _text: &str) -> Result<String, ScriptError> {
        Err(ScriptError::Rejected("scripting is disabled".into()))
    }
}
