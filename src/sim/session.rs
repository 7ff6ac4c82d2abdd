use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{ApiError, ApiResult};
use crate::listener::ConsoleListener;
use crate::vbox::{
    CallbackId, Console, HardDiskAttachment, MachineRef, MachineState, Progress, Session,
    SessionMachine, SessionState, VirtualBox,
};

use super::SimHost;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SessionKind {
    /// session that launched the machine
    Launch,
    /// shared lock on a running machine
    Shared,
    /// exclusive lock for editing settings
    Write,
}

pub(super) struct SimSession {
    host: SimHost,
    machine_id: String,
    kind: SessionKind,
    state: SessionState,
    console: SimConsole,
    machine: Option<SimSessionMachine>,
}

impl SimSession {
    pub(super) fn new(
        host: SimHost,
        machine_id: &str,
        name: &str,
        kind: SessionKind,
        state: SessionState,
    ) -> Self {
        Self {
            console: SimConsole {
                host: host.clone(),
                machine_id: machine_id.to_string(),
                name: name.to_string(),
            },
            host,
            machine_id: machine_id.to_string(),
            kind,
            state,
            machine: None,
        }
    }

    pub(super) fn write(host: SimHost, draft: MachineRef, disks: Vec<HardDiskAttachment>) -> Self {
        let mut session = Self::new(
            host.clone(),
            &draft.id,
            &draft.name,
            SessionKind::Write,
            SessionState::Open,
        );
        session.machine = Some(SimSessionMachine {
            host,
            draft: Mutex::new(draft),
            disks: Mutex::new(disks),
        });
        session
    }
}

impl Session for SimSession {
    fn state(&self) -> SessionState {
        self.state
    }

    fn console(&self) -> ApiResult<&dyn Console> {
        if self.kind == SessionKind::Write || self.state != SessionState::Open {
            return Err(ApiError::InvalidState("session has no console".into()));
        }
        Ok(&self.console)
    }

    fn machine(&self) -> ApiResult<&dyn SessionMachine> {
        match (&self.machine, self.state) {
            (Some(machine), SessionState::Open) => Ok(machine),
            _ => Err(ApiError::InvalidState("session has no mutable machine".into())),
        }
    }

    fn close(&mut self) -> ApiResult<()> {
        if matches!(self.state, SessionState::Closed | SessionState::Null) {
            return Err(ApiError::InvalidState("session is not open".into()));
        }
        self.state = SessionState::Closed;
        self.host.session_closed(&self.machine_id, self.kind);
        Ok(())
    }
}

pub(super) struct SimConsole {
    host: SimHost,
    machine_id: String,
    name: String,
}

impl SimConsole {
    fn require(&self, allowed: &[MachineState], what: &str) -> ApiResult<()> {
        let state = self.host.machine_state(&self.machine_id)?;
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(ApiError::InvalidState(format!(
                "cannot {} machine '{}' while {}",
                what, self.name, state
            )))
        }
    }
}

impl Console for SimConsole {
    fn pause(&self) -> ApiResult<()> {
        self.require(&[MachineState::Running], "pause")?;
        self.host.transition(&self.machine_id, MachineState::Paused)
    }

    fn resume(&self) -> ApiResult<()> {
        self.require(&[MachineState::Paused], "resume")?;
        self.host.transition(&self.machine_id, MachineState::Running)
    }

    fn power_down(&self) -> ApiResult<()> {
        self.require(&[MachineState::Running, MachineState::Paused], "power down")?;
        self.host.transition(&self.machine_id, MachineState::PoweredOff)
    }

    fn guest_statistics(&self) -> ApiResult<Vec<(String, u64)>> {
        self.require(&[MachineState::Running, MachineState::Paused], "query")?;
        Ok(vec![
            ("CPU load idle %".to_string(), 92),
            ("CPU load kernel %".to_string(), 3),
            ("CPU load user %".to_string(), 5),
            ("Threads".to_string(), 311),
            ("Processes".to_string(), 57),
            ("Memory total MB".to_string(), 512),
            ("Memory free MB".to_string(), 214),
            ("Memory balloon MB".to_string(), 0),
        ])
    }

    fn execute(&self, command: &str) -> ApiResult<String> {
        let command = command.trim();
        if command.is_empty() {
            return Err(ApiError::InvalidArgument("empty command".into()));
        }
        self.host.record_exec(&self.name, command);
        match command {
            "pause()" => self.pause().map(|_| "paused".to_string()),
            "resume()" => self.resume().map(|_| "resumed".to_string()),
            "powerDown()" => self.power_down().map(|_| "powered down".to_string()),
            _ => Ok(format!("sent to '{}'", self.name)),
        }
    }

    fn register_callback(&self, listener: Arc<dyn ConsoleListener>) -> ApiResult<CallbackId> {
        Ok(self.host.add_console_listener(&self.machine_id, listener))
    }

    fn unregister_callback(&self, id: CallbackId) -> ApiResult<()> {
        self.host.remove_console_listener(id)
    }
}

pub(super) struct SimSessionMachine {
    host: SimHost,
    draft: Mutex<MachineRef>,
    disks: Mutex<Vec<HardDiskAttachment>>,
}

fn parse_bool(value: &str) -> ApiResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" => Ok(false),
        _ => Err(ApiError::InvalidArgument(format!("not a boolean: {}", value))),
    }
}

fn parse_u32(value: &str) -> ApiResult<u32> {
    value
        .parse()
        .map_err(|_| ApiError::InvalidArgument(format!("not a number: {}", value)))
}

impl SessionMachine for SimSessionMachine {
    fn hard_disk_attachments(&self) -> ApiResult<Vec<HardDiskAttachment>> {
        Ok(self.disks.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn detach_hard_disk(&self, attachment: &HardDiskAttachment) -> ApiResult<()> {
        let id = self.draft.lock().unwrap_or_else(|e| e.into_inner()).id.clone();
        self.host.detach(&id, attachment)?;
        self.disks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|d| d != attachment);
        Ok(())
    }

    fn set_attribute(&self, path: &str, value: &str) -> ApiResult<()> {
        let mut draft = self.draft.lock().unwrap_or_else(|e| e.into_inner());
        match path {
            "memorySize" => draft.settings.memory_size = parse_u32(value)?,
            "VRAMSize" => draft.settings.vram_size = parse_u32(value)?,
            "clipboardMode" => draft.settings.clipboard_mode = parse_u32(value)?,
            "BIOSSettings.ACPIEnabled" => draft.settings.acpi_enabled = parse_bool(value)?,
            "PAEEnabled" => draft.settings.pae_enabled = parse_bool(value)?,
            "HWVirtExEnabled" => draft.settings.hw_virt_ex_enabled = parse_bool(value)?,
            "HWVirtExNestedPagingEnabled" => {
                draft.settings.nested_paging_enabled = parse_bool(value)?
            }
            "name" => draft.name = value.to_string(),
            "OSTypeId" => {
                self.host.guest_os_type(value)?;
                draft.os_type_id = value.to_string();
            }
            _ => {
                return Err(ApiError::InvalidArgument(format!("unknown attribute: {}", path)));
            }
        }
        Ok(())
    }

    fn save_settings(&self) -> ApiResult<()> {
        let draft = self.draft.lock().unwrap_or_else(|e| e.into_inner()).clone();
        self.host.commit_settings(&draft)
    }
}

/// launches finish immediately in the simulation
pub(super) struct SimProgress {
    result_code: u32,
}

impl SimProgress {
    pub(super) fn new(result_code: u32) -> Self {
        Self { result_code }
    }
}

impl Progress for SimProgress {
    fn wait_for_completion(&self, _timeout: Option<Duration>) -> ApiResult<()> {
        Ok(())
    }

    fn completed(&self) -> bool {
        true
    }

    fn result_code(&self) -> u32 {
        self.result_code
    }
}
