//! map a user token to a registered machine

use crate::error::{ApiResult, Result, ShellError};
use crate::vbox::{MachineRef, VirtualBox, strip_braces};

/// first machine whose name, or brace-stripped id, equals `token`
pub fn resolve(vbox: &dyn VirtualBox, token: &str) -> ApiResult<Option<MachineRef>> {
    let machines = vbox.machines()?;
    Ok(machines
        .into_iter()
        .find(|m| m.name == token || strip_braces(&m.id) == token))
}

/// resolve `args[1]` for a command taking `[vmname|uuid]`
pub fn machine_arg(vbox: &dyn VirtualBox, args: &[&str]) -> Result<MachineRef> {
    let Some(token) = args.get(1) else {
        let cmd = args.first().copied().unwrap_or("command");
        return Err(ShellError::Usage(format!("{} [vmname|uuid]", cmd)));
    };
    resolve(vbox, token)?.ok_or_else(|| ShellError::MachineNotFound(token.to_string()))
}
