//! shared sink for user-facing output
//!
//! handlers and event listeners write through the same sink so tests can
//! capture everything the operator would see.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct Output {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Output {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// output that lands in memory, plus a handle to read it back
    pub fn capture() -> (Self, Captured) {
        let buf = Captured::default();
        (Self::new(buf.clone()), buf)
    }

    /// write one line; a broken sink is not worth failing a command over
    pub fn line(&self, args: fmt::Arguments<'_>) {
        let mut sink = self.lock();
        let _ = sink.write_fmt(args);
        let _ = sink.write_all(b"\n");
        let _ = sink.flush();
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.sink.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// print a line to an [`Output`]
#[macro_export]
macro_rules! say {
    ($out:expr, $($arg:tt)*) => {
        $out.line(format_args!($($arg)*))
    };
}

/// in-memory buffer behind [`Output::capture`]
#[derive(Clone, Default)]
pub struct Captured {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Captured {
    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// return what was written so far and reset the buffer
    pub fn take(&self) -> String {
        let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        let out = String::from_utf8_lossy(&buf).into_owned();
        buf.clear();
        out
    }
}

impl Write for Captured {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_collects_lines() {
        let (out, captured) = Output::capture();
        say!(out, "one {}", 1);
        let clone = out.clone();
        say!(clone, "two");
        assert_eq!(captured.contents(), "one 1\ntwo\n");
        assert_eq!(captured.take(), "one 1\ntwo\n");
        assert!(captured.contents().is_empty());
    }
}
