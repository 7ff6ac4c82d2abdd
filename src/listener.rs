//! event listeners for console and registry notifications
//!
//! every notification has a default no-op so a listener only overrides what
//! it cares about. `on_extra_data_can_change` is the one approval hook; its
//! answer goes back to the service.

use crate::output::Output;
use crate::say;
use crate::vbox::{MachineState, SessionState};

/// machine-scoped notifications, delivered through a console
#[allow(unused_variables)]
pub trait ConsoleListener: Send + Sync {
    fn on_mouse_pointer_shape_change(
        &self,
        visible: bool,
        x_hot: u32,
        y_hot: u32,
        width: u32,
        height: u32,
    ) {
    }
    fn on_mouse_capability_change(&self, supports_absolute: bool, needs_host_cursor: bool) {}
    fn on_keyboard_leds_change(&self, num_lock: bool, caps_lock: bool, scroll_lock: bool) {}
    fn on_state_change(&self, state: MachineState) {}
    fn on_additions_state_change(&self) {}
    fn on_dvd_drive_change(&self) {}
    fn on_floppy_drive_change(&self) {}
    fn on_network_adapter_change(&self, slot: u32) {}
    fn on_serial_port_change(&self, slot: u32) {}
    fn on_parallel_port_change(&self, slot: u32) {}
    fn on_storage_controller_change(&self) {}
    fn on_vrdp_server_change(&self) {}
    fn on_usb_controller_change(&self) {}
    fn on_usb_device_state_change(&self, device: &str, attached: bool) {}
    fn on_shared_folder_change(&self, global: bool) {}
    fn on_runtime_error(&self, fatal: bool, id: &str, message: &str) {}
    fn on_can_show_window(&self) {}
    fn on_show_window(&self, win_id: u64) {}
}

/// registry-level notifications, delivered by the service itself
#[allow(unused_variables)]
pub trait VirtualBoxListener: Send + Sync {
    fn on_machine_state_change(&self, machine_id: &str, state: MachineState) {}
    fn on_machine_data_change(&self, machine_id: &str) {}
    /// approve an extra-data change; any listener returning false vetoes it
    fn on_extra_data_can_change(&self, machine_id: &str, key: &str, value: &str) -> bool {
        true
    }
    fn on_extra_data_change(&self, machine_id: &str, key: &str, value: &str) {}
    fn on_media_registered(&self, media_id: &str, registered: bool) {}
    fn on_machine_registered(&self, machine_id: &str, registered: bool) {}
    fn on_session_state_change(&self, machine_id: &str, state: SessionState) {}
    fn on_snapshot_taken(&self, machine_id: &str, snapshot_id: &str) {}
    fn on_snapshot_discarded(&self, machine_id: &str, snapshot_id: &str) {}
    fn on_snapshot_change(&self, machine_id: &str, snapshot_id: &str) {}
    fn on_guest_property_change(&self, machine_id: &str, name: &str, value: &str, flags: &str) {}
}

/// console notification as queued by an event source
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    MousePointerShape { visible: bool, x_hot: u32, y_hot: u32, width: u32, height: u32 },
    MouseCapability { supports_absolute: bool, needs_host_cursor: bool },
    KeyboardLeds { num_lock: bool, caps_lock: bool, scroll_lock: bool },
    State(MachineState),
    AdditionsState,
    DvdDrive,
    FloppyDrive,
    NetworkAdapter(u32),
    SerialPort(u32),
    ParallelPort(u32),
    StorageController,
    VrdpServer,
    UsbController,
    UsbDeviceState { device: String, attached: bool },
    SharedFolder { global: bool },
    RuntimeError { fatal: bool, id: String, message: String },
    CanShowWindow,
    ShowWindow(u64),
}

impl ConsoleEvent {
    pub fn deliver(&self, listener: &dyn ConsoleListener) {
        match self {
            ConsoleEvent::MousePointerShape { visible, x_hot, y_hot, width, height } => {
                listener.on_mouse_pointer_shape_change(*visible, *x_hot, *y_hot, *width, *height)
            }
            ConsoleEvent::MouseCapability { supports_absolute, needs_host_cursor } => {
                listener.on_mouse_capability_change(*supports_absolute, *needs_host_cursor)
            }
            ConsoleEvent::KeyboardLeds { num_lock, caps_lock, scroll_lock } => {
                listener.on_keyboard_leds_change(*num_lock, *caps_lock, *scroll_lock)
            }
            ConsoleEvent::State(state) => listener.on_state_change(*state),
            ConsoleEvent::AdditionsState => listener.on_additions_state_change(),
            ConsoleEvent::DvdDrive => listener.on_dvd_drive_change(),
            ConsoleEvent::FloppyDrive => listener.on_floppy_drive_change(),
            ConsoleEvent::NetworkAdapter(slot) => listener.on_network_adapter_change(*slot),
            ConsoleEvent::SerialPort(slot) => listener.on_serial_port_change(*slot),
            ConsoleEvent::ParallelPort(slot) => listener.on_parallel_port_change(*slot),
            ConsoleEvent::StorageController => listener.on_storage_controller_change(),
            ConsoleEvent::VrdpServer => listener.on_vrdp_server_change(),
            ConsoleEvent::UsbController => listener.on_usb_controller_change(),
            ConsoleEvent::UsbDeviceState { device, attached } => {
                listener.on_usb_device_state_change(device, *attached)
            }
            ConsoleEvent::SharedFolder { global } => listener.on_shared_folder_change(*global),
            ConsoleEvent::RuntimeError { fatal, id, message } => {
                listener.on_runtime_error(*fatal, id, message)
            }
            ConsoleEvent::CanShowWindow => listener.on_can_show_window(),
            ConsoleEvent::ShowWindow(win_id) => listener.on_show_window(*win_id),
        }
    }
}

/// registry notification as queued by an event source
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    MachineState { machine_id: String, state: MachineState },
    MachineData { machine_id: String },
    ExtraDataCanChange { machine_id: String, key: String, value: String },
    ExtraData { machine_id: String, key: String, value: String },
    MediaRegistered { media_id: String, registered: bool },
    MachineRegistered { machine_id: String, registered: bool },
    SessionState { machine_id: String, state: SessionState },
    SnapshotTaken { machine_id: String, snapshot_id: String },
    SnapshotDiscarded { machine_id: String, snapshot_id: String },
    SnapshotChange { machine_id: String, snapshot_id: String },
    GuestProperty { machine_id: String, name: String, value: String, flags: String },
}

impl RegistryEvent {
    /// hand the event to `listener`; `Some(allow)` for approval requests
    pub fn deliver(&self, listener: &dyn VirtualBoxListener) -> Option<bool> {
        match self {
            RegistryEvent::MachineState { machine_id, state } => {
                listener.on_machine_state_change(machine_id, *state)
            }
            RegistryEvent::MachineData { machine_id } => {
                listener.on_machine_data_change(machine_id)
            }
            RegistryEvent::ExtraDataCanChange { machine_id, key, value } => {
                return Some(listener.on_extra_data_can_change(machine_id, key, value));
            }
            RegistryEvent::ExtraData { machine_id, key, value } => {
                listener.on_extra_data_change(machine_id, key, value)
            }
            RegistryEvent::MediaRegistered { media_id, registered } => {
                listener.on_media_registered(media_id, *registered)
            }
            RegistryEvent::MachineRegistered { machine_id, registered } => {
                listener.on_machine_registered(machine_id, *registered)
            }
            RegistryEvent::SessionState { machine_id, state } => {
                listener.on_session_state_change(machine_id, *state)
            }
            RegistryEvent::SnapshotTaken { machine_id, snapshot_id } => {
                listener.on_snapshot_taken(machine_id, snapshot_id)
            }
            RegistryEvent::SnapshotDiscarded { machine_id, snapshot_id } => {
                listener.on_snapshot_discarded(machine_id, snapshot_id)
            }
            RegistryEvent::SnapshotChange { machine_id, snapshot_id } => {
                listener.on_snapshot_change(machine_id, snapshot_id)
            }
            RegistryEvent::GuestProperty { machine_id, name, value, flags } => {
                listener.on_guest_property_change(machine_id, name, value, flags)
            }
        }
        None
    }
}

/// prints every console notification of one machine
pub struct GuestMonitor {
    machine: String,
    out: Output,
}

impl GuestMonitor {
    pub fn new(machine: &str, out: Output) -> Self {
        Self {
            machine: machine.to_string(),
            out,
        }
    }
}

impl ConsoleListener for GuestMonitor {
    fn on_mouse_pointer_shape_change(
        &self,
        visible: bool,
        _x_hot: u32,
        _y_hot: u32,
        _width: u32,
        _height: u32,
    ) {
        say!(self.out, "{}: mouse pointer shape change: visible={}", self.machine, visible);
    }

    fn on_mouse_capability_change(&self, _supports_absolute: bool, needs_host_cursor: bool) {
        say!(
            self.out,
            "{}: mouse capability change: needs host cursor={}",
            self.machine,
            needs_host_cursor
        );
    }

    fn on_keyboard_leds_change(&self, _num_lock: bool, caps_lock: bool, _scroll_lock: bool) {
        say!(self.out, "{}: keyboard leds change: caps lock={}", self.machine, caps_lock);
    }

    fn on_state_change(&self, state: MachineState) {
        say!(self.out, "{}: state change: {}", self.machine, state);
    }

    fn on_additions_state_change(&self) {
        say!(self.out, "{}: additions state change", self.machine);
    }

    fn on_dvd_drive_change(&self) {
        say!(self.out, "{}: dvd drive change", self.machine);
    }

    fn on_floppy_drive_change(&self) {
        say!(self.out, "{}: floppy drive change", self.machine);
    }

    fn on_network_adapter_change(&self, slot: u32) {
        say!(self.out, "{}: network adapter {} change", self.machine, slot);
    }

    fn on_serial_port_change(&self, slot: u32) {
        say!(self.out, "{}: serial port {} change", self.machine, slot);
    }

    fn on_parallel_port_change(&self, slot: u32) {
        say!(self.out, "{}: parallel port {} change", self.machine, slot);
    }

    fn on_storage_controller_change(&self) {
        say!(self.out, "{}: storage controller change", self.machine);
    }

    fn on_vrdp_server_change(&self) {
        say!(self.out, "{}: vrdp server change", self.machine);
    }

    fn on_usb_controller_change(&self) {
        say!(self.out, "{}: usb controller change", self.machine);
    }

    fn on_usb_device_state_change(&self, device: &str, attached: bool) {
        say!(self.out, "{}: usb device {} attached={}", self.machine, device, attached);
    }

    fn on_shared_folder_change(&self, global: bool) {
        say!(self.out, "{}: shared folder change: global={}", self.machine, global);
    }

    fn on_runtime_error(&self, fatal: bool, id: &str, message: &str) {
        say!(self.out, "{}: runtime error {} fatal={}: {}", self.machine, id, fatal, message);
    }

    fn on_can_show_window(&self) {
        say!(self.out, "{}: can show window", self.machine);
    }

    fn on_show_window(&self, win_id: u64) {
        say!(self.out, "{}: show window: {}", self.machine, win_id);
    }
}

/// prints every registry notification
pub struct VBoxMonitor {
    out: Output,
}

impl VBoxMonitor {
    pub fn new(out: Output) -> Self {
        Self { out }
    }
}

impl VirtualBoxListener for VBoxMonitor {
    fn on_machine_state_change(&self, machine_id: &str, state: MachineState) {
        say!(self.out, "machine state change: {} {}", machine_id, state);
    }

    fn on_machine_data_change(&self, machine_id: &str) {
        say!(self.out, "machine data change: {}", machine_id);
    }

    fn on_extra_data_can_change(&self, machine_id: &str, key: &str, value: &str) -> bool {
        say!(self.out, "extra data can change: {} {}=>{}", machine_id, key, value);
        true
    }

    fn on_extra_data_change(&self, machine_id: &str, key: &str, value: &str) {
        say!(self.out, "extra data change: {} {}=>{}", machine_id, key, value);
    }

    fn on_media_registered(&self, media_id: &str, registered: bool) {
        say!(self.out, "media registered: {} {}", media_id, registered);
    }

    fn on_machine_registered(&self, machine_id: &str, registered: bool) {
        say!(self.out, "machine registered: {} {}", machine_id, registered);
    }

    fn on_session_state_change(&self, machine_id: &str, state: SessionState) {
        say!(self.out, "session state change: {} {}", machine_id, state);
    }

    fn on_snapshot_taken(&self, machine_id: &str, snapshot_id: &str) {
        say!(self.out, "snapshot taken: {} {}", machine_id, snapshot_id);
    }

    fn on_snapshot_discarded(&self, machine_id: &str, snapshot_id: &str) {
        say!(self.out, "snapshot discarded: {} {}", machine_id, snapshot_id);
    }

    fn on_snapshot_change(&self, machine_id: &str, snapshot_id: &str) {
        say!(self.out, "snapshot change: {} {}", machine_id, snapshot_id);
    }

    fn on_guest_property_change(&self, machine_id: &str, name: &str, value: &str, _flags: &str) {
        say!(self.out, "guest property change: {} {}={}", machine_id, name, value);
    }
}
