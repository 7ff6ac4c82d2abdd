//! in-memory virtualization host
//!
//! implements the service traits without running anything: machines are
//! records, launching flips states, events go through a channel and reach
//! listeners only from `wait_for_events`. it also counts session and
//! callback bookkeeping so callers can check nothing leaked.

mod metrics;
mod session;

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::listener::{ConsoleEvent, ConsoleListener, RegistryEvent, VirtualBoxListener};
use crate::vbox::{
    Binding, CallbackId, GuestOsType, HardDiskAttachment, HostInfo, MachineRef, MachineSettings,
    MachineState, PerformanceCollector, Progress, Session, SessionState, VirtualBox,
};

pub use metrics::SimCollector;
use session::{SessionKind, SimProgress, SimSession};

pub const E_FAIL: u32 = 0x8000_4005;
pub const E_INVALIDARG: u32 = 0x8007_0057;
pub const VBOX_E_INVALID_VM_STATE: u32 = 0x80BB_0002;
pub const VBOX_E_INVALID_OBJECT_STATE: u32 = 0x80BB_0007;

const OS_TYPES: &[(&str, &str)] = &[
    ("Other", "Other/Unknown"),
    ("Windows31", "Windows 3.1"),
    ("Windows95", "Windows 95"),
    ("Windows98", "Windows 98"),
    ("WindowsXP", "Windows XP"),
    ("Windows2003", "Windows 2003"),
    ("WindowsVista", "Windows Vista"),
    ("Windows7", "Windows 7"),
    ("Linux22", "Linux 2.2"),
    ("Linux24", "Linux 2.4"),
    ("Linux26", "Linux 2.6"),
    ("Linux26_64", "Linux 2.6 (64 bit)"),
    ("Ubuntu", "Ubuntu"),
    ("Fedora", "Fedora"),
    ("Debian", "Debian"),
    ("Solaris", "Solaris"),
    ("FreeBSD", "FreeBSD"),
    ("OpenBSD", "OpenBSD"),
];

/// bookkeeping counters of the simulated host
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimStats {
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub callbacks_registered: usize,
    pub callbacks_unregistered: usize,
    pub event_waits: usize,
}

impl SimStats {
    pub fn sessions_balanced(&self) -> bool {
        self.sessions_opened == self.sessions_closed
    }

    pub fn callbacks_balanced(&self) -> bool {
        self.callbacks_registered == self.callbacks_unregistered
    }
}

#[derive(Debug, Clone)]
struct SimMachine {
    machine: MachineRef,
    disks: Vec<HardDiskAttachment>,
    /// settings are only written to disk when created with a base folder
    persisted: bool,
}

enum Queued {
    Console { machine_id: String, event: ConsoleEvent },
    Registry(RegistryEvent),
}

struct State {
    machines: Vec<SimMachine>,
    pending: Vec<SimMachine>,
    console_listeners: Vec<(CallbackId, String, Arc<dyn ConsoleListener>)>,
    registry_listeners: Vec<(CallbackId, Arc<dyn VirtualBoxListener>)>,
    next_callback: u64,
    stats: SimStats,
    pump_faults: usize,
    approvals: Vec<bool>,
    executed: Vec<(String, String)>,
}

struct Inner {
    binding: Binding,
    state: Mutex<State>,
    collector: Arc<SimCollector>,
    host: HostInfo,
    tx: Sender<Queued>,
    rx: Receiver<Queued>,
}

#[derive(Clone)]
pub struct SimHost {
    inner: Arc<Inner>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    /// empty host reached through a local binding
    pub fn new() -> Self {
        Self::with_binding(Binding::Local)
    }

    pub fn with_binding(binding: Binding) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            inner: Arc::new(Inner {
                binding,
                state: Mutex::new(State {
                    machines: Vec::new(),
                    pending: Vec::new(),
                    console_listeners: Vec::new(),
                    registry_listeners: Vec::new(),
                    next_callback: 1,
                    stats: SimStats::default(),
                    pump_faults: 0,
                    approvals: Vec::new(),
                    executed: Vec::new(),
                }),
                collector: Arc::new(SimCollector::new()),
                host: HostInfo {
                    processor_speeds: vec![2400; 4],
                },
                tx,
                rx,
            }),
        }
    }

    /// host with a few machines to play with
    pub fn demo(binding: Binding) -> Self {
        let host = Self::with_binding(binding);
        host.add_machine("WinXP", "WindowsXP");
        let fedora = host.add_machine("Fedora", "Fedora");
        host.add_disk(&fedora.id, "IDE", 0, 0);
        let ubuntu = host.add_machine("Ubuntu", "Ubuntu");
        host.set_machine_state(&ubuntu.id, MachineState::Running);
        host
    }

    /// register a powered-off machine directly
    pub fn add_machine(&self, name: &str, os_type: &str) -> MachineRef {
        let machine = new_machine(name, os_type, Path::new(""));
        self.lock().machines.push(SimMachine {
            machine: machine.clone(),
            disks: Vec::new(),
            persisted: false,
        });
        machine
    }

    pub fn add_disk(&self, machine_id: &str, controller: &str, port: i32, device: i32) {
        let mut state = self.lock();
        if let Some(m) = state.find_mut(machine_id) {
            m.disks.push(HardDiskAttachment {
                controller: controller.to_string(),
                port,
                device,
            });
        }
    }

    /// force a machine state; running machines get an open session
    pub fn set_machine_state(&self, machine_id: &str, machine_state: MachineState) {
        let mut state = self.lock();
        if let Some(m) = state.find_mut(machine_id) {
            m.machine.state = machine_state;
            m.machine.session_state = match machine_state {
                MachineState::Running | MachineState::Paused => SessionState::Open,
                MachineState::Starting => SessionState::Spawning,
                _ => SessionState::Closed,
            };
            m.machine.last_state_change = Utc::now();
        }
    }

    pub fn set_session_state(&self, machine_id: &str, session_state: SessionState) {
        let mut state = self.lock();
        if let Some(m) = state.find_mut(machine_id) {
            m.machine.session_state = session_state;
        }
    }

    pub fn machine(&self, id_or_name: &str) -> Option<MachineRef> {
        let state = self.lock();
        state
            .machines
            .iter()
            .find(|m| m.machine.id == id_or_name || m.machine.name == id_or_name)
            .map(|m| m.machine.clone())
    }

    pub fn disks(&self, machine_id: &str) -> Vec<HardDiskAttachment> {
        let mut state = self.lock();
        state.find_mut(machine_id).map(|m| m.disks.clone()).unwrap_or_default()
    }

    pub fn stats(&self) -> SimStats {
        self.lock().stats.clone()
    }

    /// listeners currently registered, console and registry together
    pub fn active_callbacks(&self) -> usize {
        let state = self.lock();
        state.console_listeners.len() + state.registry_listeners.len()
    }

    /// make the next `n` event waits fail
    pub fn fail_event_waits(&self, n: usize) {
        self.lock().pump_faults = n;
    }

    pub fn collector(&self) -> Arc<SimCollector> {
        self.inner.collector.clone()
    }

    /// answers given to extra-data approval requests, in order
    pub fn approvals(&self) -> Vec<bool> {
        self.lock().approvals.clone()
    }

    /// (machine name, command) pairs run through a console
    pub fn executed(&self) -> Vec<(String, String)> {
        self.lock().executed.clone()
    }

    /// queue a console event for listeners of `machine_id`
    pub fn fire_console(&self, machine_id: &str, event: ConsoleEvent) {
        let state = self.lock();
        self.post_console(&state, machine_id, event);
    }

    /// queue a registry event for registry listeners
    pub fn fire_registry(&self, event: RegistryEvent) {
        let state = self.lock();
        self.post_registry(&state, event);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // events nobody listens to are dropped instead of piling up
    fn post_console(&self, state: &State, machine_id: &str, event: ConsoleEvent) {
        if state.console_listeners.iter().any(|(_, id, _)| id == machine_id) {
            let _ = self.inner.tx.send(Queued::Console {
                machine_id: machine_id.to_string(),
                event,
            });
        }
    }

    fn post_registry(&self, state: &State, event: RegistryEvent) {
        if !state.registry_listeners.is_empty() {
            let _ = self.inner.tx.send(Queued::Registry(event));
        }
    }

    fn dispatch(&self, queued: Queued) {
        match queued {
            Queued::Console { machine_id, event } => {
                let listeners: Vec<_> = self
                    .lock()
                    .console_listeners
                    .iter()
                    .filter(|(_, id, _)| *id == machine_id)
                    .map(|(_, _, l)| l.clone())
                    .collect();
                for listener in listeners {
                    event.deliver(listener.as_ref());
                }
            }
            Queued::Registry(event) => {
                let listeners: Vec<_> = self
                    .lock()
                    .registry_listeners
                    .iter()
                    .map(|(_, l)| l.clone())
                    .collect();
                let mut decision = None;
                for listener in listeners {
                    if let Some(allow) = event.deliver(listener.as_ref()) {
                        decision = Some(decision.unwrap_or(true) && allow);
                    }
                }
                if let Some(allow) = decision {
                    self.lock().approvals.push(allow);
                }
            }
        }
    }

    /// move a machine to `next`, telling console and registry listeners
    fn transition(&self, machine_id: &str, next: MachineState) -> ApiResult<()> {
        let mut state = self.lock();
        let m = state
            .find_mut(machine_id)
            .ok_or_else(|| ApiError::ObjectNotFound(machine_id.to_string()))?;
        m.machine.state = next;
        m.machine.last_state_change = Utc::now();
        if next == MachineState::PoweredOff {
            m.machine.session_state = SessionState::Closed;
        }
        self.post_console(&state, machine_id, ConsoleEvent::State(next));
        self.post_registry(
            &state,
            RegistryEvent::MachineState {
                machine_id: machine_id.to_string(),
                state: next,
            },
        );
        Ok(())
    }

    fn machine_state(&self, machine_id: &str) -> ApiResult<MachineState> {
        let mut state = self.lock();
        state
            .find_mut(machine_id)
            .map(|m| m.machine.state)
            .ok_or_else(|| ApiError::ObjectNotFound(machine_id.to_string()))
    }

    fn record_exec(&self, machine_name: &str, command: &str) {
        self.lock()
            .executed
            .push((machine_name.to_string(), command.to_string()));
    }

    fn session_closed(&self, machine_id: &str, kind: SessionKind) {
        let mut state = self.lock();
        state.stats.sessions_closed += 1;
        if kind == SessionKind::Write {
            if let Some(m) = state.find_mut(machine_id) {
                m.machine.session_state = SessionState::Closed;
            }
        }
    }

    fn add_console_listener(
        &self,
        machine_id: &str,
        listener: Arc<dyn ConsoleListener>,
    ) -> CallbackId {
        let mut state = self.lock();
        let id = state.next_id();
        state
            .console_listeners
            .push((id, machine_id.to_string(), listener));
        state.stats.callbacks_registered += 1;
        id
    }

    fn remove_console_listener(&self, id: CallbackId) -> ApiResult<()> {
        let mut state = self.lock();
        let before = state.console_listeners.len();
        state.console_listeners.retain(|(cid, _, _)| *cid != id);
        if state.console_listeners.len() == before {
            return Err(ApiError::ObjectNotFound(format!("callback {}", id.0)));
        }
        state.stats.callbacks_unregistered += 1;
        Ok(())
    }

    /// write session commit: replace the registry copy, persist if needed
    fn commit_settings(&self, draft: &MachineRef) -> ApiResult<()> {
        let mut state = self.lock();
        let m = state
            .find_mut(&draft.id)
            .ok_or_else(|| ApiError::ObjectNotFound(draft.id.clone()))?;
        m.machine.name = draft.name.clone();
        m.machine.os_type_id = draft.os_type_id.clone();
        m.machine.settings = draft.settings.clone();
        if m.persisted {
            write_settings(&m.machine)?;
        }
        self.post_registry(
            &state,
            RegistryEvent::MachineData {
                machine_id: draft.id.clone(),
            },
        );
        Ok(())
    }

    fn detach(&self, machine_id: &str, attachment: &HardDiskAttachment) -> ApiResult<()> {
        let mut state = self.lock();
        let m = state
            .find_mut(machine_id)
            .ok_or_else(|| ApiError::ObjectNotFound(machine_id.to_string()))?;
        let before = m.disks.len();
        m.disks.retain(|d| d != attachment);
        if m.disks.len() == before {
            return Err(ApiError::ObjectNotFound(format!(
                "no hard disk at {}:{}:{}",
                attachment.controller, attachment.port, attachment.device
            )));
        }
        Ok(())
    }
}

impl State {
    fn find_mut(&mut self, machine_id: &str) -> Option<&mut SimMachine> {
        self.machines.iter_mut().find(|m| m.machine.id == machine_id)
    }

    fn next_id(&mut self) -> CallbackId {
        let id = CallbackId(self.next_callback);
        self.next_callback += 1;
        id
    }
}

fn new_machine(name: &str, os_type: &str, base_folder: &Path) -> MachineRef {
    let id = format!("{{{}}}", Uuid::new_v4());
    let settings_file = if base_folder.as_os_str().is_empty() {
        PathBuf::from(name).join(format!("{}.xml", name))
    } else {
        base_folder.join(name).join(format!("{}.xml", name))
    };
    MachineRef {
        id,
        name: name.to_string(),
        os_type_id: os_type.to_string(),
        session_state: SessionState::Closed,
        state: MachineState::PoweredOff,
        settings: MachineSettings::default(),
        last_state_change: Utc::now(),
        settings_file,
    }
}

fn write_settings(machine: &MachineRef) -> ApiResult<()> {
    let io_err = |e: std::io::Error| ApiError::Failed {
        code: E_FAIL,
        message: format!("cannot write {}: {}", machine.settings_file.display(), e),
    };
    if let Some(dir) = machine.settings_file.parent() {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    let s = &machine.settings;
    let body = format!(
        "uuid={}\nname={}\nostype={}\nmemory={}\nvram={}\nclipboard={}\n\
         acpi={}\npae={}\nhwvirtex={}\nnestedpaging={}\n",
        machine.id,
        machine.name,
        machine.os_type_id,
        s.memory_size,
        s.vram_size,
        s.clipboard_mode,
        s.acpi_enabled,
        s.pae_enabled,
        s.hw_virt_ex_enabled,
        s.nested_paging_enabled,
    );
    fs::write(&machine.settings_file, body).map_err(io_err)
}

fn describe(code: u32) -> &'static str {
    match code {
        E_FAIL => "Unspecified error",
        E_INVALIDARG => "Invalid argument value",
        VBOX_E_INVALID_VM_STATE => "The machine is not in a state that allows this operation",
        VBOX_E_INVALID_OBJECT_STATE => "The machine is already locked by another session",
        _ => "Unknown error",
    }
}

impl VirtualBox for SimHost {
    fn version(&self) -> ApiResult<String> {
        Ok("3.1.0_SIM".to_string())
    }

    fn binding(&self) -> Binding {
        self.inner.binding
    }

    fn machines(&self) -> ApiResult<Vec<MachineRef>> {
        Ok(self.lock().machines.iter().map(|m| m.machine.clone()).collect())
    }

    fn guest_os_type(&self, id: &str) -> ApiResult<GuestOsType> {
        OS_TYPES
            .iter()
            .find(|(os, _)| *os == id)
            .map(|(os, description)| GuestOsType {
                id: os.to_string(),
                description: description.to_string(),
            })
            .ok_or_else(|| ApiError::ObjectNotFound(format!("guest OS type {}", id)))
    }

    fn create_machine(
        &self,
        name: &str,
        os_type: &str,
        base_folder: &str,
    ) -> ApiResult<MachineRef> {
        if name.is_empty() {
            return Err(ApiError::InvalidArgument("machine name is empty".into()));
        }
        self.guest_os_type(os_type)?;
        let machine = new_machine(name, os_type, Path::new(base_folder));
        self.lock().pending.push(SimMachine {
            machine: machine.clone(),
            disks: Vec::new(),
            persisted: !base_folder.is_empty(),
        });
        debug!(name, id = %machine.id, "machine created");
        Ok(machine)
    }

    fn save_machine_settings(&self, machine: &MachineRef) -> ApiResult<()> {
        let state = self.lock();
        let sim = state
            .pending
            .iter()
            .chain(state.machines.iter())
            .find(|m| m.machine.id == machine.id)
            .ok_or_else(|| ApiError::ObjectNotFound(machine.id.clone()))?;
        if sim.persisted {
            write_settings(&sim.machine)?;
        }
        Ok(())
    }

    fn register_machine(&self, machine: &MachineRef) -> ApiResult<()> {
        let mut state = self.lock();
        if state.machines.iter().any(|m| m.machine.id == machine.id) {
            return Err(ApiError::InvalidState(format!(
                "machine {} is already registered",
                machine.id
            )));
        }
        let pos = state
            .pending
            .iter()
            .position(|m| m.machine.id == machine.id)
            .ok_or_else(|| ApiError::ObjectNotFound(machine.id.clone()))?;
        let sim = state.pending.remove(pos);
        state.machines.push(sim);
        self.post_registry(
            &state,
            RegistryEvent::MachineRegistered {
                machine_id: machine.id.clone(),
                registered: true,
            },
        );
        Ok(())
    }

    fn unregister_machine(&self, id: &str) -> ApiResult<MachineRef> {
        let mut state = self.lock();
        let pos = state
            .machines
            .iter()
            .position(|m| m.machine.id == id)
            .ok_or_else(|| ApiError::ObjectNotFound(id.to_string()))?;
        let sim = &state.machines[pos];
        if sim.machine.session_state != SessionState::Closed {
            return Err(ApiError::InvalidState(format!(
                "machine '{}' has an open session",
                sim.machine.name
            )));
        }
        if !sim.disks.is_empty() {
            return Err(ApiError::InvalidState(format!(
                "machine '{}' has {} hard disk(s) attached",
                sim.machine.name,
                sim.disks.len()
            )));
        }
        let sim = state.machines.remove(pos);
        self.post_registry(
            &state,
            RegistryEvent::MachineRegistered {
                machine_id: id.to_string(),
                registered: false,
            },
        );
        Ok(sim.machine)
    }

    fn delete_settings(&self, machine: &MachineRef) -> ApiResult<()> {
        if machine.settings_file.exists() {
            fs::remove_file(&machine.settings_file).map_err(|e| ApiError::Failed {
                code: E_FAIL,
                message: format!("cannot delete {}: {}", machine.settings_file.display(), e),
            })?;
        }
        Ok(())
    }

    fn host(&self) -> ApiResult<HostInfo> {
        Ok(self.inner.host.clone())
    }

    fn performance_collector(&self) -> ApiResult<Arc<dyn PerformanceCollector>> {
        Ok(self.inner.collector.clone())
    }

    fn open_remote_session(
        &self,
        id: &str,
        frontend: &str,
        _environment: &str,
    ) -> ApiResult<(Box<dyn Session>, Box<dyn Progress>)> {
        let mut state = self.lock();
        let m = state
            .find_mut(id)
            .ok_or_else(|| ApiError::ObjectNotFound(id.to_string()))?;
        let name = m.machine.name.clone();

        let failure = if !matches!(frontend, "gui" | "headless" | "vrdp" | "sdl") {
            Some(E_INVALIDARG)
        } else if m.machine.session_state != SessionState::Closed {
            Some(VBOX_E_INVALID_OBJECT_STATE)
        } else if !m.machine.state.is_launchable() {
            Some(VBOX_E_INVALID_VM_STATE)
        } else {
            None
        };

        if let Some(code) = failure {
            let session = SimSession::new(
                self.clone(),
                id,
                &name,
                SessionKind::Launch,
                SessionState::Closed,
            );
            return Ok((Box::new(session), Box::new(SimProgress::new(code))));
        }

        m.machine.state = MachineState::Running;
        m.machine.session_state = SessionState::Open;
        m.machine.last_state_change = Utc::now();
        state.stats.sessions_opened += 1;
        self.post_registry(
            &state,
            RegistryEvent::MachineState {
                machine_id: id.to_string(),
                state: MachineState::Running,
            },
        );
        self.post_registry(
            &state,
            RegistryEvent::SessionState {
                machine_id: id.to_string(),
                state: SessionState::Open,
            },
        );
        debug!(machine = %name, frontend, "machine launched");

        let session = SimSession::new(
            self.clone(),
            id,
            &name,
            SessionKind::Launch,
            SessionState::Open,
        );
        Ok((Box::new(session), Box::new(SimProgress::new(0))))
    }

    fn open_existing_session(&self, id: &str) -> ApiResult<Box<dyn Session>> {
        let mut state = self.lock();
        let m = state
            .find_mut(id)
            .ok_or_else(|| ApiError::ObjectNotFound(id.to_string()))?;
        let name = m.machine.name.clone();
        let session_state = match m.machine.session_state {
            SessionState::Open => SessionState::Open,
            SessionState::Spawning => SessionState::Spawning,
            other => {
                return Err(ApiError::InvalidState(format!(
                    "machine '{}' has no session to share (session state {})",
                    name, other
                )));
            }
        };
        state.stats.sessions_opened += 1;
        Ok(Box::new(SimSession::new(
            self.clone(),
            id,
            &name,
            SessionKind::Shared,
            session_state,
        )))
    }

    fn open_session(&self, id: &str) -> ApiResult<Box<dyn Session>> {
        let mut state = self.lock();
        let m = state
            .find_mut(id)
            .ok_or_else(|| ApiError::ObjectNotFound(id.to_string()))?;
        if m.machine.session_state != SessionState::Closed {
            return Err(ApiError::InvalidState(format!(
                "machine '{}' is locked by another session",
                m.machine.name
            )));
        }
        m.machine.session_state = SessionState::Open;
        let draft = m.machine.clone();
        let disks = m.disks.clone();
        state.stats.sessions_opened += 1;
        Ok(Box::new(SimSession::write(self.clone(), draft, disks)))
    }

    fn register_callback(&self, listener: Arc<dyn VirtualBoxListener>) -> ApiResult<CallbackId> {
        let mut state = self.lock();
        let id = state.next_id();
        state.registry_listeners.push((id, listener));
        state.stats.callbacks_registered += 1;
        Ok(id)
    }

    fn unregister_callback(&self, id: CallbackId) -> ApiResult<()> {
        let mut state = self.lock();
        let before = state.registry_listeners.len();
        state.registry_listeners.retain(|(cid, _)| *cid != id);
        if state.registry_listeners.len() == before {
            return Err(ApiError::ObjectNotFound(format!("callback {}", id.0)));
        }
        state.stats.callbacks_unregistered += 1;
        Ok(())
    }

    fn wait_for_events(&self, timeout: Duration) -> ApiResult<()> {
        {
            let mut state = self.lock();
            state.stats.event_waits += 1;
            if state.pump_faults > 0 {
                state.pump_faults -= 1;
                return Err(ApiError::Failed {
                    code: E_FAIL,
                    message: "event queue failure".into(),
                });
            }
        }
        let first = match self.inner.rx.recv_timeout(timeout) {
            Ok(queued) => queued,
            Err(RecvTimeoutError::Timeout) => return Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ApiError::Unavailable("event queue closed".into()));
            }
        };
        let mut batch = VecDeque::from([first]);
        batch.extend(self.inner.rx.try_iter());
        for queued in batch {
            self.dispatch(queued);
        }
        Ok(())
    }

    fn error_info(&self, code: u32) -> ApiResult<String> {
        match self.inner.binding {
            Binding::Local => Ok(format!("{} (rc={:#010x})", describe(code), code)),
            Binding::Remote => Err(ApiError::Unavailable(
                "error information is not exposed over the web service".into(),
            )),
        }
    }
}
