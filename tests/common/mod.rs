//! Shared test helpers for integration tests
#![allow(dead_code)]

use gowasm::host::{imports, Guest, HostState};
use gowasm::memory::Memory;
use gowasm::value::codec;
use gowasm::{BridgeConfig, Value};

/// Stack pointer used for every simulated import call
pub const SP: i32 = 1024;

/// Absolute address of the frame slot at `offset`
pub fn at(offset: u64) -> u64 {
    SP as u64 + offset
}

/// A guest made of a plain byte vector, driving import handlers directly
pub struct TestGuest {
    pub mem: Vec<u8>,
    pub host: HostState,
}

impl TestGuest {
    pub fn new() -> Self {
        Self::with_config(BridgeConfig {
            capture_output: true,
            ..BridgeConfig::default()
        })
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        Self {
            mem: vec![0; 64 * 1024],
            host: HostState::new(&config),
        }
    }

    pub fn mem(&mut self) -> Memory<'_> {
        Memory::new(&mut self.mem)
    }

    /// Encode `value` into the cell at `addr`
    pub fn put_value(&mut self, addr: u64, value: &Value) {
        let mut mem = Memory::new(&mut self.mem);
        codec::store_value(&mut mem, self.host.table_mut(), addr, value).unwrap();
    }

    /// Decode the cell at `addr`
    pub fn get_value(&mut self, addr: u64) -> Value {
        let mem = Memory::new(&mut self.mem);
        codec::load_value(&mem, self.host.table(), addr).unwrap()
    }

    /// Write `bytes` at `data` and a slice header for them at `addr`
    pub fn put_slice(&mut self, addr: u64, data: u64, bytes: &[u8]) {
        let mut mem = self.mem();
        mem.write(data, bytes).unwrap();
        mem.set_i64(addr, data as i64).unwrap();
        mem.set_i64(addr + 8, bytes.len() as i64).unwrap();
    }

    /// Write `values` as cells at `data` and a slice header at `addr`
    pub fn put_values(&mut self, addr: u64, data: u64, values: &[Value]) {
        for (i, value) in values.iter().enumerate() {
            self.put_value(data + 8 * i as u64, value);
        }
        let mut mem = self.mem();
        mem.set_i64(addr, data as i64).unwrap();
        mem.set_i64(addr + 8, values.len() as i64).unwrap();
    }

    /// Invoke the import `name` with the frame at [`SP`]
    pub fn call(&mut self, name: &str) -> gowasm::Result<()> {
        let handler = imports::lookup(name).unwrap_or_else(|| panic!("no import {}", name));
        handler(self, SP)
    }
}

impl Guest for TestGuest {
    fn split(&mut self) -> gowasm::Result<(&mut [u8], &mut HostState)> {
        Ok((&mut self.mem, &mut self.host))
    }

    fn stack_pointer(&mut self, sp: i32) -> gowasm::Result<i32> {
        Ok(sp)
    }
}
