//! event monitoring: register a listener, pump the service's event loop,
//! unregister
//!
//! the listener stays registered only while a `Registration` is alive; its
//! drop unregisters, so deadline expiry, Ctrl+C, a failing pump and even a
//! panicking listener all leave the source clean.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::interrupt::Interrupt;
use crate::listener::{ConsoleListener, VirtualBoxListener};
use crate::vbox::{CallbackId, Console, VirtualBox};

/// something listeners of type `L` can be attached to
pub trait CallbackSource<L: ?Sized> {
    fn register(&self, listener: Arc<L>) -> ApiResult<CallbackId>;
    fn unregister(&self, id: CallbackId) -> ApiResult<()>;
}

impl CallbackSource<dyn ConsoleListener> for dyn Console + '_ {
    fn register(&self, listener: Arc<dyn ConsoleListener>) -> ApiResult<CallbackId> {
        self.register_callback(listener)
    }

    fn unregister(&self, id: CallbackId) -> ApiResult<()> {
        self.unregister_callback(id)
    }
}

impl CallbackSource<dyn VirtualBoxListener> for dyn VirtualBox + '_ {
    fn register(&self, listener: Arc<dyn VirtualBoxListener>) -> ApiResult<CallbackId> {
        self.register_callback(listener)
    }

    fn unregister(&self, id: CallbackId) -> ApiResult<()> {
        self.unregister_callback(id)
    }
}

struct Registration<'s, L: ?Sized, S: CallbackSource<L> + ?Sized> {
    source: &'s S,
    id: CallbackId,
    _listener: PhantomData<fn(Arc<L>)>,
}

impl<'s, L: ?Sized, S: CallbackSource<L> + ?Sized> Registration<'s, L, S> {
    fn new(source: &'s S, listener: Arc<L>) -> ApiResult<Self> {
        let id = source.register(listener)?;
        debug!(id = id.0, "callback registered");
        Ok(Self {
            source,
            id,
            _listener: PhantomData,
        })
    }
}

impl<L: ?Sized, S: CallbackSource<L> + ?Sized> Drop for Registration<'_, L, S> {
    fn drop(&mut self) {
        match self.source.unregister(self.id) {
            Ok(()) => debug!(id = self.id.0, "callback unregistered"),
            Err(e) => warn!(id = self.id.0, "failed to unregister callback: {}", e),
        }
    }
}

/// how long to monitor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MonitorDuration {
    Seconds(f64),
    /// until interrupted, capped at the configured ceiling
    Unbounded,
}

impl MonitorDuration {
    /// seconds as typed by the operator; `-1` means unbounded
    pub fn parse(text: &str) -> Option<Self> {
        let secs: f64 = text.parse().ok()?;
        if secs == -1.0 {
            Some(MonitorDuration::Unbounded)
        } else if secs.is_finite() && secs >= 0.0 {
            Some(MonitorDuration::Seconds(secs))
        } else {
            None
        }
    }

    pub fn to_duration(self, ceiling: Duration) -> Duration {
        match self {
            // clamp first: huge values do not fit a `Duration`
            MonitorDuration::Seconds(secs) => {
                Duration::try_from_secs_f64(secs).map_or(ceiling, |d| d.min(ceiling))
            }
            MonitorDuration::Unbounded => ceiling,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutcome {
    /// the deadline passed
    Elapsed,
    /// Ctrl+C arrived while pumping
    Interrupted,
    /// the event pump failed; monitoring stopped early
    Faulted(ApiError),
}

pub struct Monitor<'a> {
    vbox: &'a dyn VirtualBox,
    interrupt: &'a Interrupt,
    slice: Duration,
    ceiling: Duration,
}

impl<'a> Monitor<'a> {
    pub fn new(vbox: &'a dyn VirtualBox, interrupt: &'a Interrupt) -> Self {
        Self {
            vbox,
            interrupt,
            slice: Duration::from_millis(500),
            ceiling: Duration::from_secs(100_000),
        }
    }

    /// longest single wait on the event pump
    pub fn with_slice(mut self, slice: Duration) -> Self {
        self.slice = slice;
        self
    }

    /// stand-in for "forever"
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// register `listener` with `source` and pump events for `duration`
    pub fn run<L, S>(
        &self,
        source: &S,
        listener: Arc<L>,
        duration: MonitorDuration,
    ) -> ApiResult<MonitorOutcome>
    where
        L: ?Sized,
        S: CallbackSource<L> + ?Sized,
    {
        self.interrupt.clear();
        let _registration = Registration::new(source, listener)?;
        let deadline = Instant::now() + duration.to_duration(self.ceiling);
        let outcome = self.pump(deadline);
        if outcome == MonitorOutcome::Interrupted {
            self.interrupt.clear();
        }
        Ok(outcome)
    }

    fn pump(&self, deadline: Instant) -> MonitorOutcome {
        loop {
            if self.interrupt.is_set() {
                return MonitorOutcome::Interrupted;
            }
            let now = Instant::now();
            if now >= deadline {
                return MonitorOutcome::Elapsed;
            }
            let slice = (deadline - now).min(self.slice);
            if let Err(e) = self.vbox.wait_for_events(slice) {
                debug!("event pump failed: {}", e);
                return MonitorOutcome::Faulted(e);
            }
        }
    }
}
