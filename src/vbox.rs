//! interfaces of the virtualization management service
//!
//! the shell never implements these itself; it sequences calls against
//! whatever binding it was handed (see `sim` for the in-memory host).

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::ApiResult;
use crate::listener::{ConsoleListener, VirtualBoxListener};

/// how the shell reaches the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// in-process / local COM-style binding
    Local,
    /// web-service binding, some diagnostics are missing
    Remote,
}

impl Binding {
    pub fn is_remote(self) -> bool {
        self == Binding::Remote
    }
}

/// lock state of a session on a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Null,
    Closed,
    Spawning,
    Open,
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Null => "Null",
            SessionState::Closed => "Closed",
            SessionState::Spawning => "Spawning",
            SessionState::Open => "Open",
            SessionState::Closing => "Closing",
        };
        f.write_str(s)
    }
}

/// execution state of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    PoweredOff,
    Saved,
    Aborted,
    Starting,
    Running,
    Paused,
    Stopping,
}

impl MachineState {
    /// states a machine can be launched from
    pub fn is_launchable(self) -> bool {
        matches!(
            self,
            MachineState::PoweredOff | MachineState::Saved | MachineState::Aborted
        )
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MachineState::PoweredOff => "PoweredOff",
            MachineState::Saved => "Saved",
            MachineState::Aborted => "Aborted",
            MachineState::Starting => "Starting",
            MachineState::Running => "Running",
            MachineState::Paused => "Paused",
            MachineState::Stopping => "Stopping",
        };
        f.write_str(s)
    }
}

/// static configuration of a machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineSettings {
    pub memory_size: u32,
    pub vram_size: u32,
    pub clipboard_mode: u32,
    pub acpi_enabled: bool,
    pub pae_enabled: bool,
    pub hw_virt_ex_enabled: bool,
    pub nested_paging_enabled: bool,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            memory_size: 128,
            vram_size: 8,
            clipboard_mode: 3,
            acpi_enabled: true,
            pae_enabled: false,
            hw_virt_ex_enabled: false,
            nested_paging_enabled: false,
        }
    }
}

/// snapshot of a registered machine as reported by the registry
#[derive(Debug, Clone, PartialEq)]
pub struct MachineRef {
    pub id: String,
    pub name: String,
    pub os_type_id: String,
    pub session_state: SessionState,
    pub state: MachineState,
    pub settings: MachineSettings,
    pub last_state_change: DateTime<Utc>,
    pub settings_file: PathBuf,
}

impl MachineRef {
    /// identifier without enclosing braces
    pub fn bare_id(&self) -> &str {
        strip_braces(&self.id)
    }
}

pub fn strip_braces(id: &str) -> &str {
    id.strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(id)
}

/// entry of the guest OS type catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestOsType {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// speed of each processor in MHz
    pub processor_speeds: Vec<u32>,
}

impl HostInfo {
    pub fn processor_count(&self) -> usize {
        self.processor_speeds.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardDiskAttachment {
    pub controller: String,
    pub port: i32,
    pub device: i32,
}

/// object a metric is sampled for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    Host,
    Machine(String),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Host => f.write_str("host"),
            Subject::Machine(id) => f.write_str(id),
        }
    }
}

/// raw answer of a metrics query: parallel arrays, one slot per metric,
/// samples of metric `i` are `values[indices[i]..indices[i] + lengths[i]]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsData {
    pub values: Vec<i64>,
    pub names: Vec<String>,
    pub subjects: Vec<Subject>,
    pub units: Vec<String>,
    pub scales: Vec<u32>,
    pub sequence_numbers: Vec<u32>,
    pub indices: Vec<usize>,
    pub lengths: Vec<usize>,
}

/// token handed out by a callback registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub u64);

/// asynchronous operation started by the service
pub trait Progress {
    /// block until done; `None` waits forever
    fn wait_for_completion(&self, timeout: Option<Duration>) -> ApiResult<()>;
    fn completed(&self) -> bool;
    fn result_code(&self) -> u32;
}

/// control channel of a running machine
pub trait Console {
    fn pause(&self) -> ApiResult<()>;
    fn resume(&self) -> ApiResult<()>;
    fn power_down(&self) -> ApiResult<()>;

    /// statistics reported by the guest additions
    fn guest_statistics(&self) -> ApiResult<Vec<(String, u64)>>;

    /// run arbitrary command text against the console
    fn execute(&self, command: &str) -> ApiResult<String>;

    fn register_callback(&self, listener: Arc<dyn ConsoleListener>) -> ApiResult<CallbackId>;
    fn unregister_callback(&self, id: CallbackId) -> ApiResult<()>;
}

/// mutable view of a machine obtained through a write session
pub trait SessionMachine {
    fn hard_disk_attachments(&self) -> ApiResult<Vec<HardDiskAttachment>>;
    fn detach_hard_disk(&self, attachment: &HardDiskAttachment) -> ApiResult<()>;

    /// assign a dotted attribute path, e.g. `BIOSSettings.ACPIEnabled`
    fn set_attribute(&self, path: &str, value: &str) -> ApiResult<()>;
    fn save_settings(&self) -> ApiResult<()>;
}

/// lock on a machine handed out by the session broker
pub trait Session {
    fn state(&self) -> SessionState;
    fn console(&self) -> ApiResult<&dyn Console>;
    fn machine(&self) -> ApiResult<&dyn SessionMachine>;
    fn close(&mut self) -> ApiResult<()>;
}

pub trait PerformanceCollector {
    fn setup_metrics(
        &self,
        names: &[&str],
        subjects: &[Subject],
        period: u32,
        count: u32,
    ) -> ApiResult<()>;
    fn enable_metrics(&self, names: &[&str], subjects: &[Subject]) -> ApiResult<()>;
    fn disable_metrics(&self, names: &[&str], subjects: &[Subject]) -> ApiResult<()>;
    fn query_metrics_data(&self, names: &[&str], subjects: &[Subject])
    -> ApiResult<MetricsData>;
}

/// the management service: registry, session broker, event source
pub trait VirtualBox {
    fn version(&self) -> ApiResult<String>;
    fn binding(&self) -> Binding;

    fn machines(&self) -> ApiResult<Vec<MachineRef>>;
    fn guest_os_type(&self, id: &str) -> ApiResult<GuestOsType>;
    /// create an unregistered machine
    fn create_machine(&self, name: &str, os_type: &str, base_folder: &str)
    -> ApiResult<MachineRef>;
    fn save_machine_settings(&self, machine: &MachineRef) -> ApiResult<()>;
    fn register_machine(&self, machine: &MachineRef) -> ApiResult<()>;
    fn unregister_machine(&self, id: &str) -> ApiResult<MachineRef>;
    fn delete_settings(&self, machine: &MachineRef) -> ApiResult<()>;

    fn host(&self) -> ApiResult<HostInfo>;
    fn performance_collector(&self) -> ApiResult<Arc<dyn PerformanceCollector>>;

    /// launch a machine in a new process; the session tracks the launch
    fn open_remote_session(
        &self,
        id: &str,
        frontend: &str,
        environment: &str,
    ) -> ApiResult<(Box<dyn Session>, Box<dyn Progress>)>;
    /// share the session of an already running machine
    fn open_existing_session(&self, id: &str) -> ApiResult<Box<dyn Session>>;
    /// exclusive write session on a machine that is not running
    fn open_session(&self, id: &str) -> ApiResult<Box<dyn Session>>;

    fn register_callback(&self, listener: Arc<dyn VirtualBoxListener>) -> ApiResult<CallbackId>;
    fn unregister_callback(&self, id: CallbackId) -> ApiResult<()>;

    /// block up to `timeout` and dispatch pending events to listeners
    fn wait_for_events(&self, timeout: Duration) -> ApiResult<()>;

    /// service-side description of a result code, local binding only
    fn error_info(&self, code: u32) -> ApiResult<String>;
}
