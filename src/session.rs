//! session acquisition and release
//!
//! every session handed out here is wrapped in a `SessionGuard`; the guard
//! closes the session when it goes out of scope unless it was closed
//! explicitly, so handler errors and early returns cannot leak it.

use tracing::{debug, warn};

use crate::error::{ApiResult, Result, ShellError};
use crate::vbox::{Console, MachineRef, Session, SessionMachine, SessionState, VirtualBox};

pub struct SessionGuard {
    session: Box<dyn Session>,
    machine: String,
    closed: bool,
}

impl SessionGuard {
    fn new(session: Box<dyn Session>, machine: &str) -> Self {
        Self {
            session,
            machine: machine.to_string(),
            closed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn console(&self) -> ApiResult<&dyn Console> {
        self.session.console()
    }

    pub fn machine(&self) -> ApiResult<&dyn SessionMachine> {
        self.session.machine()
    }

    /// close now and report the outcome instead of logging it on drop
    pub fn close(mut self) -> ApiResult<()> {
        self.release()
    }

    fn release(&mut self) -> ApiResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // a session that never opened has nothing to release
        if matches!(self.session.state(), SessionState::Closed | SessionState::Null) {
            return Ok(());
        }
        debug!(machine = %self.machine, "closing session");
        self.session.close()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(machine = %self.machine, "failed to close session: {}", e);
        }
    }
}

/// outcome of a launch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub completed: bool,
    pub result_code: u32,
}

impl Launch {
    pub fn succeeded(&self) -> bool {
        self.result_code == 0
    }
}

pub struct SessionManager<'a> {
    vbox: &'a dyn VirtualBox,
}

impl<'a> SessionManager<'a> {
    pub fn new(vbox: &'a dyn VirtualBox) -> Self {
        Self { vbox }
    }

    /// open a remote session of kind `frontend` and wait for the launch;
    /// the returned guard still holds the launching session
    pub fn launch(
        &self,
        machine: &MachineRef,
        frontend: &str,
    ) -> ApiResult<(SessionGuard, Launch)> {
        let (session, progress) = self.vbox.open_remote_session(&machine.id, frontend, "")?;
        let guard = SessionGuard::new(session, &machine.name);
        // no timeout: the launch either completes or fails
        progress.wait_for_completion(None)?;
        let launch = Launch {
            completed: progress.completed(),
            result_code: progress.result_code(),
        };
        debug!(machine = %machine.name, rc = launch.result_code, "launch finished");
        Ok((guard, launch))
    }

    /// attach to the session of a running machine, which must end up Open
    pub fn attach(&self, machine: &MachineRef) -> Result<SessionGuard> {
        let session = self
            .vbox
            .open_existing_session(&machine.id)
            .map_err(|source| ShellError::SessionNotOpen {
                machine: machine.name.clone(),
                source,
            })?;
        let guard = SessionGuard::new(session, &machine.name);
        let state = guard.state();
        if state != SessionState::Open {
            return Err(ShellError::SessionState {
                machine: machine.name.clone(),
                state,
            });
        }
        Ok(guard)
    }

    /// exclusive session for changing a machine's settings
    pub fn open_write(&self, machine: &MachineRef) -> Result<SessionGuard> {
        let session = self
            .vbox
            .open_session(&machine.id)
            .map_err(|source| ShellError::SessionNotOpen {
                machine: machine.name.clone(),
                source,
            })?;
        let guard = SessionGuard::new(session, &machine.name);
        if guard.state() != SessionState::Open {
            let state = guard.state();
            return Err(ShellError::SessionState {
                machine: machine.name.clone(),
                state,
            });
        }
        Ok(guard)
    }
}

/// run `f` against the console of an attached session; the session is
/// released before this returns, whatever `f` did
pub fn with_console<T>(
    vbox: &dyn VirtualBox,
    machine: &MachineRef,
    f: impl FnOnce(&dyn Console) -> Result<T>,
) -> Result<T> {
    let guard = SessionManager::new(vbox).attach(machine)?;
    let console = guard.console()?;
    f(console)
}

/// run `f` against the mutable machine of a write session
pub fn with_machine<T>(
    vbox: &dyn VirtualBox,
    machine: &MachineRef,
    f: impl FnOnce(&dyn SessionMachine) -> Result<T>,
) -> Result<T> {
    let guard = SessionManager::new(vbox).open_write(machine)?;
    let result = f(guard.machine()?);
    let closed = guard.close();
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(machine = %machine.name, "failed to close session: {}", close_err);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::sim::SimHost;
    use crate::vbox::MachineState;

    fn running(host: &SimHost, name: &str) -> MachineRef {
        let m = host.add_machine(name, "Linux26");
        host.set_machine_state(&m.id, MachineState::Running);
        host.machine(&m.id).unwrap()
    }

    #[test]
    fn attach_closes_after_success() {
        let host = SimHost::new();
        let m = running(&host, "VM1");
        with_console(&host, &m, |console| Ok(console.pause()?)).unwrap();
        let stats = host.stats();
        assert_eq!(stats.sessions_opened, 1);
        assert!(stats.sessions_balanced());
        assert_eq!(host.machine("VM1").unwrap().state, MachineState::Paused);
    }

    #[test]
    fn attach_closes_after_handler_error() {
        let host = SimHost::new();
        let m = running(&host, "VM1");
        // resuming a running machine is refused by the console
        let err = with_console(&host, &m, |console| Ok(console.resume()?)).unwrap_err();
        assert!(matches!(err, ShellError::Api(ApiError::InvalidState(_))));
        assert!(host.stats().sessions_balanced());
    }

    #[test]
    fn wrong_state_runs_nothing() {
        let host = SimHost::new();
        let m = host.add_machine("VM1", "Linux26");
        host.set_machine_state(&m.id, MachineState::Starting);
        let mut ran = false;
        let err = with_console(&host, &m, |_| {
            ran = true;
            Ok(())
        })
        .unwrap_err();
        assert!(!ran);
        assert!(matches!(
            err,
            ShellError::SessionState {
                state: SessionState::Spawning,
                ..
            }
        ));
        let stats = host.stats();
        assert_eq!(stats.sessions_opened, 1);
        assert!(stats.sessions_balanced());
    }

    #[test]
    fn powered_off_machine_has_no_session_to_attach() {
        let host = SimHost::new();
        let m = host.add_machine("VM1", "Linux26");
        let err = with_console(&host, &m, |_| Ok(())).unwrap_err();
        assert!(matches!(err, ShellError::SessionNotOpen { .. }));
        assert_eq!(host.stats().sessions_opened, 0);
    }

    #[test]
    fn write_session_is_released() {
        let host = SimHost::new();
        let m = host.add_machine("VM1", "Linux26");
        with_machine(&host, &m, |machine| {
            machine.set_attribute("memorySize", "512")?;
            machine.save_settings()?;
            Ok(())
        })
        .unwrap();
        let after = host.machine("VM1").unwrap();
        assert_eq!(after.settings.memory_size, 512);
        assert_eq!(after.session_state, SessionState::Closed);
        assert!(host.stats().sessions_balanced());
    }

    #[test]
    fn failed_write_is_not_saved() {
        let host = SimHost::new();
        let m = host.add_machine("VM1", "Linux26");
        let err = with_machine(&host, &m, |machine| {
            machine.set_attribute("memorySize", "lots")?;
            machine.save_settings()?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, ShellError::Api(_)));
        assert_eq!(host.machine("VM1").unwrap().settings.memory_size, 128);
        assert_eq!(host.machine("VM1").unwrap().session_state, SessionState::Closed);
        assert!(host.stats().sessions_balanced());
    }

    #[test]
    fn launch_keeps_machine_running_after_close() {
        let host = SimHost::new();
        let m = host.add_machine("VM1", "Linux26");
        let (guard, launch) = SessionManager::new(&host).launch(&m, "headless").unwrap();
        assert!(launch.completed);
        assert!(launch.succeeded());
        guard.close().unwrap();
        assert!(host.stats().sessions_balanced());
        assert_eq!(host.machine("VM1").unwrap().state, MachineState::Running);
    }
}
