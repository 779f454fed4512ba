//! Host side of the `go` import namespace
//!
//! Import handlers are written against the [`Guest`] trait rather than the
//! engine: a guest is anything that can lend out its linear memory together
//! with the [`HostState`], and report its current stack pointer. The bridge
//! implements it over a wasmtime `Caller`; tests implement it over a plain
//! byte vector.

pub mod globals;
pub mod imports;
pub mod stdio;

use std::time::Instant;

use crate::bridge::BridgeConfig;
use crate::concurrency::CancellationToken;
use crate::error::Result;
use crate::memory::Memory;
use crate::value::{codec, RefTable, Value};

pub use stdio::Stdio;

/// Everything the import handlers share across calls
pub struct HostState {
    table: RefTable,
    stdio: Stdio,
    exit_code: Option<i32>,
    exit: CancellationToken,
    started: Instant,
    lenient_lookups: bool,
}

impl HostState {
    pub fn new(config: &BridgeConfig) -> Self {
        let stdio = if config.capture_output {
            Stdio::capture()
        } else {
            Stdio::inherit()
        };
        let table = RefTable::new(globals::global_object(&stdio), globals::runtime_object());
        Self {
            table,
            stdio,
            exit_code: None,
            exit: CancellationToken::new(),
            started: Instant::now(),
            lenient_lookups: config.lenient_lookups,
        }
    }

    pub fn table(&self) -> &RefTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut RefTable {
        &mut self.table
    }

    pub fn global(&self) -> Value {
        self.table.global()
    }

    pub fn stdio(&self) -> &Stdio {
        &self.stdio
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Record the guest's exit code and fire the exit signal
    pub fn record_exit(&mut self, code: i32) {
        tracing::debug!(code, "guest exited");
        self.exit_code = Some(code);
        self.exit.cancel();
    }

    /// Signal fired when the guest exits
    pub fn exit_signal(&self) -> &CancellationToken {
        &self.exit
    }

    pub fn set_exit_signal(&mut self, token: CancellationToken) {
        self.exit = token;
    }

    /// Nanoseconds since the host state was created
    pub fn uptime_nanos(&self) -> i64 {
        i64::try_from(self.started.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }

    pub fn lenient_lookups(&self) -> bool {
        self.lenient_lookups
    }
}

/// A running guest, as seen from inside an import call
pub trait Guest {
    /// Borrow linear memory and host state at the same time
    fn split(&mut self) -> Result<(&mut [u8], &mut HostState)>;

    /// Current stack pointer; `sp` when the guest cannot report one
    ///
    /// The guest stack may move whenever control passes back into the guest,
    /// so results are always written relative to a freshly read pointer.
    fn stack_pointer(&mut self, sp: i32) -> Result<i32>;
}

/// The argument frame of one import call
pub struct Frame<'a> {
    pub mem: Memory<'a>,
    pub host: &'a mut HostState,
    sp: u64,
}

/// Open the frame at `sp`
pub fn frame<'a>(guest: &'a mut (dyn Guest + '_), sp: i32) -> Result<Frame<'a>> {
    let (data, host) = guest.split()?;
    Ok(Frame {
        mem: Memory::new(data),
        host,
        // The guest passes its 32-bit stack pointer as a signed value.
        sp: u64::from(sp as u32),
    })
}

impl Frame<'_> {
    /// Absolute address of the slot at `offset`
    pub fn at(&self, offset: u64) -> u64 {
        self.sp + offset
    }

    pub fn get_i32(&self, offset: u64) -> Result<i32> {
        self.mem.get_i32(self.at(offset))
    }

    pub fn get_i64(&self, offset: u64) -> Result<i64> {
        self.mem.get_i64(self.at(offset))
    }

    pub fn set_i32(&mut self, offset: u64, val: i32) -> Result<()> {
        let addr = self.at(offset);
        self.mem.set_i32(addr, val)
    }

    pub fn set_i64(&mut self, offset: u64, val: i64) -> Result<()> {
        let addr = self.at(offset);
        self.mem.set_i64(addr, val)
    }

    pub fn set_u8(&mut self, offset: u64, val: u8) -> Result<()> {
        let addr = self.at(offset);
        self.mem.set_u8(addr, val)
    }

    pub fn load_value(&self, offset: u64) -> Result<Value> {
        codec::load_value(&self.mem, self.host.table(), self.at(offset))
    }

    pub fn store_value(&mut self, offset: u64, value: &Value) -> Result<()> {
        let addr = self.at(offset);
        codec::store_value(&mut self.mem, self.host.table_mut(), addr, value)
    }

    pub fn load_string(&self, offset: u64) -> Result<String> {
        self.mem.load_string(self.at(offset))
    }

    pub fn load_values(&self, offset: u64) -> Result<Vec<Value>> {
        codec::load_values(&self.mem, self.host.table(), self.at(offset))
    }

    /// Mutable view of the guest slice whose header is at `offset`
    pub fn load_slice(&mut self, offset: u64) -> Result<&mut [u8]> {
        let addr = self.at(offset);
        self.mem.load_slice(addr)
    }

    /// Write a result value and its success flag
    ///
    /// Recoverable failures become a thrown `Error` object with the flag
    /// cleared; anything else aborts the call.
    pub fn store_outcome(&mut self, value_offset: u64, flag_offset: u64, outcome: Result<Value>) -> Result<()> {
        match outcome {
            Ok(value) => {
                self.store_value(value_offset, &value)?;
                self.set_u8(flag_offset, 1)
            }
            Err(err) if !err.is_fatal() => {
                tracing::debug!(error = %err, "host call threw");
                self.store_value(value_offset, &Value::thrown(&err))?;
                self.set_u8(flag_offset, 0)
            }
            Err(err) => Err(err),
        }
    }
}
