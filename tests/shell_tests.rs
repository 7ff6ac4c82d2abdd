//! end-to-end command scenarios against the simulated host

mod common;

use std::io;
use std::time::{Duration, Instant};

use common::{Harness, populated};
use vmsh::commands::Flow;
use vmsh::config::ShellConfig;
use vmsh::error::ScriptError;
use vmsh::input::{BufReadLines, LineReader, ReadEvent};
use vmsh::interrupt::Interrupt;
use vmsh::script::ScriptEngine;
use vmsh::shell;
use vmsh::sim::SimHost;
use vmsh::vbox::{Binding, MachineState, SessionState, VirtualBox};

#[test]
fn create_then_list() {
    let mut h = Harness::new();
    let out = h.line("create VM1 Linux26");
    assert!(out.starts_with("created machine with UUID {"), "{out}");

    let listed = h.line("list");
    let vm = h.host.machine("VM1").unwrap();
    assert_eq!(listed, format!("Machine 'VM1' [{}], state=Closed\n", vm.id));
}

#[test]
fn create_argument_checks() {
    let mut h = Harness::new();
    assert_eq!(h.line("create VM1"), "usage: create name ostype <basefolder>\n");
    assert_eq!(h.line("create VM1 Plan9"), "Unknown OS type: Plan9\n");
    assert!(h.host.machines().unwrap().is_empty());
}

#[test]
fn create_with_base_folder_writes_settings() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = Harness::new();
    let base = dir.path().display().to_string();
    h.line(&format!("create VM2 Ubuntu {}", base));

    let settings = dir.path().join("VM2").join("VM2.xml");
    assert!(settings.exists());
    let body = std::fs::read_to_string(&settings).unwrap();
    assert!(body.contains("ostype=Ubuntu"));

    h.line("setvar VM2 memorySize 1024");
    let body = std::fs::read_to_string(&settings).unwrap();
    assert!(body.contains("memory=1024"));

    h.line("remove VM2");
    assert!(!settings.exists());
    assert!(h.host.machine("VM2").is_none());
}

#[test]
fn start_unknown_machine() {
    let mut h = Harness::with_host(populated());
    let out = h.line("start NoSuchVM");
    assert!(out.contains("NoSuchVM"));
    assert!(out.contains("list"));
    assert_eq!(h.host.stats().sessions_opened, 0);
}

#[test]
fn unknown_command_then_next_line() {
    let mut h = Harness::with_host(populated());
    let (flow, out) = h.line_flow("foo");
    assert_eq!(flow, Flow::Continue);
    assert!(out.contains("'foo'"));
    assert!(out.contains("help"));

    let (flow, out) = h.line_flow("list");
    assert_eq!(flow, Flow::Continue);
    assert!(out.contains("Machine 'VM1'"));
}

#[test]
fn monitor_vbox_without_events() {
    let mut h = Harness::new();
    let started = Instant::now();
    let out = h.line("monitorVbox 0.5");
    let elapsed = started.elapsed();

    assert!(out.is_empty(), "{out}");
    assert!(elapsed >= Duration::from_millis(450), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
    let stats = h.host.stats();
    assert_eq!(stats.callbacks_registered, 1);
    assert_eq!(stats.callbacks_unregistered, 1);
}

#[test]
fn monitor_vbox_reports_registry_events() {
    let mut h = Harness::with_host(populated());
    let host = h.host.clone();
    let id = host.machine("Box2").unwrap().id;
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        host.fire_registry(vmsh::listener::RegistryEvent::MachineData { machine_id: id });
    });
    let out = h.line("monitorVbox 0.4");
    handle.join().unwrap();
    assert!(out.starts_with("machine data change: {"), "{out}");
    assert!(h.host.stats().callbacks_balanced());
}

#[test]
fn monitor_duration_errors() {
    let mut h = Harness::with_host(populated());
    assert_eq!(h.line("monitorVbox 1 2"), "usage: monitorVbox (duration)\n");
    assert_eq!(h.line("monitorVbox soon"), "usage: monitorVbox (duration)\n");
    assert_eq!(h.line("monitorGuest Box2 -5"), "usage: monitorGuest name (duration)\n");
    assert_eq!(h.host.stats().callbacks_registered, 0);
}

#[test]
fn monitor_guest_balances_everything() {
    let mut h = Harness::with_host(populated());
    h.line("monitorGuest Box2 0.1");
    let stats = h.host.stats();
    assert_eq!(stats.callbacks_registered, 1);
    assert!(stats.callbacks_balanced());
    assert_eq!(stats.sessions_opened, 1);
    assert!(stats.sessions_balanced());
}

#[test]
fn monitor_fault_is_reported_when_verbose() {
    let mut h = Harness::new();
    h.host.fail_event_waits(1);
    let out = h.line("monitorVbox 1");
    assert!(out.starts_with("monitoring stopped: "), "{out}");

    h.line("verbose");
    h.host.fail_event_waits(1);
    assert_eq!(h.line("monitorVbox 1"), "");
    assert!(h.host.stats().callbacks_balanced());
}

#[test]
fn verbose_twice_restores() {
    let mut h = Harness::new();
    let before = h.ctx.verbose;
    h.line("verbose");
    assert_eq!(h.ctx.verbose, !before);
    h.line("v");
    assert_eq!(h.ctx.verbose, before);
}

#[test]
fn lifecycle() {
    let mut h = Harness::with_host(populated());
    assert_eq!(h.line("start VM1"), "Completed: true, rc: 0x0\n");
    assert_eq!(h.host.machine("VM1").unwrap().state, MachineState::Running);

    h.line("pause VM1");
    assert_eq!(h.host.machine("VM1").unwrap().state, MachineState::Paused);
    h.line("resume VM1");
    assert_eq!(h.host.machine("VM1").unwrap().state, MachineState::Running);
    h.line("powerdown VM1");
    let vm = h.host.machine("VM1").unwrap();
    assert_eq!(vm.state, MachineState::PoweredOff);
    assert_eq!(vm.session_state, SessionState::Closed);

    let stats = h.host.stats();
    assert_eq!(stats.sessions_opened, 4);
    assert!(stats.sessions_balanced());
}

#[test]
fn start_failure_is_decoded_locally() {
    let mut h = Harness::with_host(populated());
    let out = h.line("start VM1 tv");
    assert_eq!(
        out,
        "Completed: true, rc: 0x80070057\nInvalid argument value (rc=0x80070057)\n"
    );
    assert_eq!(h.host.stats().sessions_opened, 0);
}

#[test]
fn start_failure_is_not_decoded_remotely() {
    let host = SimHost::with_binding(Binding::Remote);
    host.add_machine("VM1", "Linux26");
    let mut h = Harness::with_host(host);
    assert_eq!(h.line("start VM1 tv"), "Completed: true, rc: 0x80070057\n");
}

#[test]
fn start_running_machine_fails() {
    let mut h = Harness::with_host(populated());
    let out = h.line("s Box2 headless");
    assert!(out.starts_with("Completed: true, rc: 0x80bb0007\n"), "{out}");
    assert!(h.host.stats().sessions_balanced());
}

#[test]
fn pause_without_session_runs_nothing() {
    let mut h = Harness::with_host(populated());
    let out = h.line("pause VM1");
    assert!(out.starts_with("Session to 'VM1' not open"), "{out}");
    assert_eq!(h.host.stats().sessions_opened, 0);
    assert_eq!(h.host.machine("VM1").unwrap().state, MachineState::PoweredOff);
}

#[test]
fn failing_operation_still_releases_session() {
    let mut h = Harness::with_host(populated());
    let out = h.line("resume Box2");
    assert!(out.starts_with("failed: invalid object state"), "{out}");
    let stats = h.host.stats();
    assert_eq!(stats.sessions_opened, 1);
    assert!(stats.sessions_balanced());
}

#[test]
fn stats_after_start() {
    let mut h = Harness::with_host(populated());
    h.line("start VM1");
    let out = h.line("stats VM1");
    assert!(out.contains("Guest/CPU/Load/User ["), "{out}");
    assert!(out.contains("Guest/RAM/Usage/Total ["), "{out}");
    assert!(!out.contains("RAM/Usage/Used"), "{out}");
}

#[test]
fn stats2_is_local_only() {
    let host = SimHost::with_binding(Binding::Remote);
    let vm = host.add_machine("VM1", "Linux26");
    host.set_machine_state(&vm.id, MachineState::Running);
    let mut h = Harness::with_host(host);
    assert_eq!(h.line("stats2 VM1"), "'stats2' is not available over this binding\n");
    assert!(h.host.stats().sessions_balanced());

    let mut local = Harness::with_host(populated());
    let out = local.line("stats2 Box2");
    assert!(out.contains("  Threads: 311"), "{out}");
}

#[test]
fn guest_passes_text_through() {
    let mut h = Harness::with_host(populated());
    assert_eq!(h.line("guest Box2"), "usage: guest name commands\n");
    let out = h.line("guest Box2 mouse.putMouseEvent(20, 20, 0, 0)");
    assert_eq!(out, "sent to 'Box2'\n");
    h.line("guest Box2 pause()");
    assert_eq!(
        h.host.executed(),
        vec![
            ("Box2".to_string(), "mouse.putMouseEvent(20, 20, 0, 0)".to_string()),
            ("Box2".to_string(), "pause()".to_string()),
        ]
    );
    assert_eq!(h.host.machine("Box2").unwrap().state, MachineState::Paused);
}

#[test]
fn info_shows_settings() {
    let mut h = Harness::with_host(populated());
    let out = h.line("i VM1");
    assert!(out.contains("  Name: VM1\n"));
    assert!(out.contains("  OS Type: Linux 2.6\n"));
    assert!(out.contains("  RAM:  128M\n"));
    assert!(out.contains("  Hardware virtualization: off\n"));
    assert_eq!(h.line("info"), "usage: info [vmname|uuid]\n");
}

#[test]
fn setvar_saves_through_write_session() {
    let mut h = Harness::with_host(populated());
    let out = h.line("setvar VM1 BIOSSettings.ACPIEnabled False");
    assert_eq!(out, "Executing VM1.BIOSSettings.ACPIEnabled = False\n");
    assert!(!h.host.machine("VM1").unwrap().settings.acpi_enabled);

    let out = h.line("setvar VM1 noSuchThing 1");
    assert!(out.contains("unknown attribute"), "{out}");
    assert_eq!(h.line("setvar VM1 memorySize"), "usage: setvar [vmname|uuid] expr value\n");

    let vm = h.host.machine("VM1").unwrap();
    assert_eq!(vm.session_state, SessionState::Closed);
    assert!(h.host.stats().sessions_balanced());
}

#[test]
fn remove_detaches_disks_first() {
    let host = populated();
    let vm = host.machine("VM1").unwrap();
    host.add_disk(&vm.id, "IDE", 0, 0);
    host.add_disk(&vm.id, "SATA", 1, 0);
    let mut h = Harness::with_host(host);

    let out = h.line("remove VM1");
    assert_eq!(out, format!("removing machine VM1 with UUID {}\n", vm.id));
    assert!(h.host.machine("VM1").is_none());
    assert!(h.host.disks(&vm.id).is_empty());
    assert!(h.host.stats().sessions_balanced());
}

#[test]
fn remove_running_machine_is_refused() {
    let mut h = Harness::with_host(populated());
    let out = h.line("remove Box2");
    assert!(out.contains("Session to 'Box2' not open"), "{out}");
    assert!(h.host.machine("Box2").is_some());
}

#[test]
fn host_information() {
    let mut h = Harness::new();
    let out = h.line("host");
    assert!(out.starts_with("Processor count: 4\nProcessor #0 speed: 2400MHz\n"), "{out}");
}

#[test]
fn help_and_aliases() {
    let mut h = Harness::new();
    let out = h.line("help");
    assert!(out.starts_with("Help page:\n"));
    assert!(out.contains("    monitorVbox : "));
    assert_eq!(h.line("h quit"), "    quit : Exits\n");
    assert_eq!(h.line("help bogus"), "Command 'bogus' not known\n");

    let out = h.line("aliases");
    assert!(out.contains("'q' is an alias for 'quit'\n"));
    assert!(out.contains("'exit' is an alias for 'quit'\n"));
}

#[test]
fn eval_goes_through_engine() {
    let mut h = Harness::new();
    assert_eq!(h.line("eval echo   hi"), "evaluated echo hi\n");
    assert_eq!(h.scripts.lock().unwrap().as_slice(), ["echo hi".to_string()]);
    assert!(h.line("eval").starts_with("failed: script rejected"));
}

#[test]
fn quit_and_aliases_exit() {
    let mut h = Harness::new();
    for line in ["quit", "q", "exit", "  q  "] {
        assert_eq!(h.line_flow(line).0, Flow::Exit);
    }
}

#[test]
fn whitespace_lines_do_nothing() {
    let mut h = Harness::new();
    assert_eq!(h.line_flow(""), (Flow::Continue, String::new()));
    assert_eq!(h.line_flow(" \t "), (Flow::Continue, String::new()));
}

#[test]
fn loop_runs_until_quit() {
    let host = populated();
    let collector = host.collector();
    let mut h = Harness::with_host(host);
    let mut input = BufReadLines::new("list\n\nquit\nlist\n".as_bytes());
    shell::run(&mut h.ctx, &mut input);

    let out = h.captured.take();
    assert!(out.starts_with("Running VirtualBox version 3.1.0_SIM\n"));
    assert_eq!(out.matches("Machine 'VM1'").count(), 1);
    assert!(collector.configured() > 0);
    assert_eq!(collector.enabled(), 0);
}

#[test]
fn loop_ends_at_eof() {
    let mut h = Harness::new();
    let mut input = BufReadLines::new("foo\n".as_bytes());
    shell::run(&mut h.ctx, &mut input);
    let out = h.captured.take();
    assert!(out.contains("Unknown command: 'foo'"));
}

struct Scripted(Vec<io::Result<ReadEvent>>);

impl LineReader for Scripted {
    fn read_line(&mut self, _prompt: &str) -> io::Result<ReadEvent> {
        if self.0.is_empty() {
            return Ok(ReadEvent::Eof);
        }
        self.0.remove(0)
    }
}

#[test]
fn interrupt_at_prompt_leaves_with_hint() {
    let mut h = Harness::new();
    let mut input = Scripted(vec![
        Ok(ReadEvent::Line("verbose".into())),
        Ok(ReadEvent::Interrupted),
        Ok(ReadEvent::Line("list".into())),
    ]);
    shell::run(&mut h.ctx, &mut input);
    let out = h.captured.take();
    assert!(out.ends_with("====== You can type quit or q to leave\n"), "{out}");
    assert_eq!(input.0.len(), 1);
}

#[test]
fn read_error_is_reported() {
    let mut h = Harness::new();
    let mut input = Scripted(vec![Err(io::Error::other("terminal gone"))]);
    shell::run(&mut h.ctx, &mut input);
    assert!(h.captured.take().contains("terminal gone"));
}

#[test]
fn failed_command_keeps_the_loop_going() {
    let mut h = Harness::with_host(populated());
    let mut input = BufReadLines::new("resume Box2\nlist\n".as_bytes());
    shell::run(&mut h.ctx, &mut input);
    let out = h.captured.take();
    let failure = out.find("failed: invalid object state").expect(&out);
    let listing = out.find("Machine 'VM1'").expect(&out);
    assert!(failure < listing, "{out}");
    assert!(h.host.stats().sessions_balanced());
}

/// engine that behaves like an operator hitting Ctrl+C mid-command
struct CtrlC(Interrupt);

impl ScriptEngine for CtrlC {
    fn eval(&mut self, _text: &str) -> Result<String, ScriptError> {
        self.0.trigger();
        Ok(String::new())
    }
}

#[test]
fn interrupt_during_command_leaves_with_hint() {
    let mut h = Harness::with_host(populated());
    h.ctx.script = Box::new(CtrlC(h.ctx.interrupt.clone()));
    let mut input = BufReadLines::new("eval sleep 5\nlist\n".as_bytes());
    shell::run(&mut h.ctx, &mut input);
    let out = h.captured.take();
    assert!(out.ends_with("====== You can type quit or q to leave\n"), "{out}");
    assert!(!out.contains("Machine 'VM1'"), "{out}");
    assert!(!h.ctx.interrupt.is_set());
}

#[test]
fn huge_monitor_duration_is_capped() {
    let config = ShellConfig {
        monitor_ceiling: Duration::from_millis(200),
        ..ShellConfig::default()
    };
    let mut h = Harness::with_config(populated(), config);
    let started = Instant::now();
    h.line("monitorVbox 1e20");
    h.line("monitorGuest Box2 1e20");
    assert!(started.elapsed() < Duration::from_secs(3));
    let stats = h.host.stats();
    assert_eq!(stats.callbacks_registered, 2);
    assert!(stats.callbacks_balanced());
    assert!(stats.sessions_balanced());
}

#[test]
fn metrics_can_be_switched_off() {
    let host = populated();
    let collector = host.collector();
    let config = ShellConfig {
        metrics: false,
        ..ShellConfig::default()
    };
    let mut h = Harness::with_config(host, config);
    assert!(h.ctx.perf.is_none());
    assert_eq!(h.line("start VM1"), "Completed: true, rc: 0x0\n");
    assert_eq!(h.line("stats VM1"), "");
    assert_eq!(collector.configured(), 0);
}

#[test]
fn metric_setup_failure_does_not_fail_start() {
    let host = populated();
    host.collector().fail_setup(true);
    let mut h = Harness::with_host(host);
    let out = h.line("start VM1");
    assert!(out.starts_with("Completed: true, rc: 0x0\nmetrics unavailable: "), "{out}");
    assert_eq!(h.host.machine("VM1").unwrap().state, MachineState::Running);
}
