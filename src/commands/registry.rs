//! commands working on the machine registry

use tracing::debug;

use super::Flow;
use crate::error::{Result, ShellError};
use crate::resolve::machine_arg;
use crate::say;
use crate::session::with_machine;
use crate::shell::Context;

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

pub(super) fn list(ctx: &mut Context, _args: &[&str]) -> Result<Flow> {
    for m in ctx.vbox.machines()? {
        say!(ctx.out, "Machine '{}' [{}], state={}", m.name, m.id, m.session_state);
    }
    Ok(Flow::Continue)
}

pub(super) fn info(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    let m = machine_arg(ctx.vbox.as_ref(), args)?;
    let os = ctx.vbox.guest_os_type(&m.os_type_id)?;
    let s = &m.settings;
    let out = &ctx.out;
    say!(out, "  Name: {}", m.name);
    say!(out, "  ID: {}", m.id);
    say!(out, "  OS Type: {}", os.description);
    say!(out, "  RAM:  {}M", s.memory_size);
    say!(out, "  VRAM:  {}M", s.vram_size);
    say!(out, "  Clipboard mode:  {}", s.clipboard_mode);
    say!(out, "  Machine status: {}", m.session_state);
    say!(out, "  Machine state: {}", m.state);
    say!(out, "  BIOS ACPI: {}", s.acpi_enabled);
    say!(out, "  PAE: {}", s.pae_enabled);
    say!(out, "  Hardware virtualization: {}", on_off(s.hw_virt_ex_enabled));
    say!(out, "  Nested paging: {}", on_off(s.nested_paging_enabled));
    say!(out, "  Last changed: {}", m.last_state_change.format("%Y-%m-%d %H:%M:%S UTC"));
    Ok(Flow::Continue)
}

pub(super) fn create(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    if args.len() < 3 || args.len() > 4 {
        return Err(ShellError::Usage("create name ostype <basefolder>".into()));
    }
    let name = args[1];
    let os_type = args[2];
    let base = args.get(3).copied().unwrap_or("");

    if let Err(e) = ctx.vbox.guest_os_type(os_type) {
        debug!("guest OS type lookup failed: {}", e);
        say!(ctx.out, "Unknown OS type: {}", os_type);
        return Ok(Flow::Continue);
    }

    let machine = ctx.vbox.create_machine(name, os_type, base)?;
    ctx.vbox.save_machine_settings(&machine)?;
    say!(ctx.out, "created machine with UUID {}", machine.id);
    ctx.vbox.register_machine(&machine)?;
    Ok(Flow::Continue)
}

pub(super) fn remove(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    let m = machine_arg(ctx.vbox.as_ref(), args)?;
    say!(ctx.out, "removing machine {} with UUID {}", m.name, m.id);

    // storage has to go before the registry lets go of the machine
    with_machine(ctx.vbox.as_ref(), &m, |machine| {
        for disk in machine.hard_disk_attachments()? {
            debug!(
                controller = %disk.controller,
                port = disk.port,
                device = disk.device,
                "detaching hard disk"
            );
            machine.detach_hard_disk(&disk)?;
        }
        Ok(())
    })?;

    let removed = ctx.vbox.unregister_machine(&m.id)?;
    ctx.vbox.delete_settings(&removed)?;
    Ok(Flow::Continue)
}

pub(super) fn setvar(ctx: &mut Context, args: &[&str]) -> Result<Flow> {
    if args.len() < 4 {
        return Err(ShellError::Usage("setvar [vmname|uuid] expr value".into()));
    }
    let m = machine_arg(ctx.vbox.as_ref(), args)?;
    let (path, value) = (args[2], args[3]);
    say!(ctx.out, "Executing {}.{} = {}", m.name, path, value);

    with_machine(ctx.vbox.as_ref(), &m, |machine| {
        machine.set_attribute(path, value)?;
        machine.save_settings()?;
        Ok(())
    })?;
    Ok(Flow::Continue)
}
