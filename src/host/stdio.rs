//! Output sinks for the guest's standard streams

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

enum Sink {
    Stdout,
    Stderr,
    Capture(Vec<u8>),
}

impl Sink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            Sink::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(bytes)?;
                out.flush()?;
            }
            Sink::Stderr => std::io::stderr().lock().write_all(bytes)?,
            Sink::Capture(buf) => buf.extend_from_slice(bytes),
        }
        Ok(())
    }

    fn take(&mut self) -> Vec<u8> {
        match self {
            Sink::Capture(buf) => std::mem::take(buf),
            _ => Vec::new(),
        }
    }
}

/// Where descriptors 1 and 2 of the guest end up
///
/// Cloning shares the sinks, so the `wasmWrite` import and the global `fs`
/// and `console` objects write to the same place.
#[derive(Clone)]
pub struct Stdio {
    stdout: Rc<RefCell<Sink>>,
    stderr: Rc<RefCell<Sink>>,
}

impl Stdio {
    /// Forward to the host process's own stdout/stderr
    pub fn inherit() -> Self {
        Self {
            stdout: Rc::new(RefCell::new(Sink::Stdout)),
            stderr: Rc::new(RefCell::new(Sink::Stderr)),
        }
    }

    /// Buffer everything in memory
    pub fn capture() -> Self {
        Self {
            stdout: Rc::new(RefCell::new(Sink::Capture(Vec::new()))),
            stderr: Rc::new(RefCell::new(Sink::Capture(Vec::new()))),
        }
    }

    /// Write `bytes` to descriptor `fd`, returning the number of bytes written
    pub fn write(&self, fd: i64, bytes: &[u8]) -> Result<usize> {
        let sink = match fd {
            1 => &self.stdout,
            2 => &self.stderr,
            other => return Err(Error::resource(format!("bad file descriptor {}", other))),
        };
        sink.borrow_mut().write(bytes)?;
        Ok(bytes.len())
    }

    /// Drain captured stdout (empty when inheriting)
    pub fn take_stdout(&self) -> Vec<u8> {
        self.stdout.borrow_mut().take()
    }

    /// Drain captured stderr (empty when inheriting)
    pub fn take_stderr(&self) -> Vec<u8> {
        self.stderr.borrow_mut().take()
    }
}
