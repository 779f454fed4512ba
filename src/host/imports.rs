//! Import handlers for the `go` namespace
//!
//! Every import has the signature `(sp: i32) -> ()`. Arguments and results
//! live in the guest stack frame at fixed offsets from `sp`:
//!
//! | import | reads | writes |
//! |--------|-------|--------|
//! | `runtime.wasmExit` | i32 code @8 | |
//! | `runtime.wasmWrite` | i64 fd @8, i64 ptr @16, i32 len @24 | |
//! | `runtime.nanotime` | | i64 ns @8 |
//! | `runtime.walltime` | | i64 sec @8, i32 nsec @16 |
//! | `runtime.getRandomData` | slice @8 | slice contents |
//! | `syscall/js.stringVal` | string @8 | value @24 |
//! | `syscall/js.valueGet` | value @8, string @16 | value @sp'+32 |
//! | `syscall/js.valueSet` | value @8, string @16, value @32 | |
//! | `syscall/js.valueDelete` | value @8, string @16 | |
//! | `syscall/js.valueIndex` | value @8, i64 @16 | value @24 |
//! | `syscall/js.valueCall` | value @8, string @16, values @32 | value @sp'+56, u8 @sp'+64 |
//! | `syscall/js.valueInvoke` | value @8, values @16 | value @sp'+40, u8 @sp'+48 |
//! | `syscall/js.valueNew` | value @8, values @16 | value @sp'+40, u8 @sp'+48 |
//! | `syscall/js.valueLength` | value @8 | i64 @16 |
//! | `syscall/js.valuePrepareString` | value @8 | value @16, i64 @24 |
//! | `syscall/js.valueLoadString` | value @8, slice @16 | slice contents |
//! | `syscall/js.valueInstanceOf` | value @8, value @16 | u8 @24 |
//! | `syscall/js.copyBytesToGo` | slice @8, value @32 | i64 @40, u8 @48 |
//! | `syscall/js.copyBytesToJS` | value @8, slice @16 | i64 @40, u8 @48 |
//!
//! `sp'` is the stack pointer re-read after the host operation finished.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

use super::{frame, Guest};
use crate::error::{Error, Result};
use crate::value::Value;

/// Module name of every import
pub const NAMESPACE: &str = "go";

/// An import handler
pub type Handler = fn(&mut dyn Guest, i32) -> Result<()>;

/// Every import the bridge provides, by name
pub const IMPORTS: &[(&str, Handler)] = &[
    ("debug", debug),
    ("runtime.wasmExit", wasm_exit),
    ("runtime.wasmWrite", wasm_write),
    ("runtime.resetMemoryDataView", reset_memory_data_view),
    ("runtime.nanotime", nanotime),
    ("runtime.nanotime1", nanotime),
    ("runtime.walltime", walltime),
    ("runtime.walltime1", walltime),
    ("runtime.scheduleCallback", schedule_callback),
    ("runtime.clearScheduledCallback", clear_scheduled_callback),
    ("runtime.scheduleTimeoutEvent", schedule_timeout_event),
    ("runtime.clearTimeoutEvent", clear_timeout_event),
    ("runtime.getRandomData", get_random_data),
    ("syscall/js.finalizeRef", finalize_ref),
    ("syscall/js.stringVal", string_val),
    ("syscall/js.valueGet", value_get),
    ("syscall/js.valueSet", value_set),
    ("syscall/js.valueDelete", value_delete),
    ("syscall/js.valueIndex", value_index),
    ("syscall/js.valueSetIndex", value_set_index),
    ("syscall/js.valueCall", value_call),
    ("syscall/js.valueInvoke", value_invoke),
    ("syscall/js.valueNew", value_new),
    ("syscall/js.valueLength", value_length),
    ("syscall/js.valuePrepareString", value_prepare_string),
    ("syscall/js.valueLoadString", value_load_string),
    ("syscall/js.valueInstanceOf", value_instance_of),
    ("syscall/js.copyBytesToGo", copy_bytes_to_go),
    ("syscall/js.copyBytesToJS", copy_bytes_to_js),
];

/// Look up a handler by import name
pub fn lookup(name: &str) -> Option<Handler> {
    IMPORTS
        .iter()
        .find(|(import, _)| *import == name)
        .map(|(_, handler)| *handler)
}

fn debug(_guest: &mut dyn Guest, sp: i32) -> Result<()> {
    tracing::debug!(sp, "guest debug");
    Ok(())
}

fn wasm_exit(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let mut f = frame(guest, sp)?;
    let code = f.get_i32(8)?;
    f.host.record_exit(code);
    // Unwind the guest; the bridge turns this back into an exit code.
    Err(Error::Exit(code))
}

fn wasm_write(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let f = frame(guest, sp)?;
    let fd = f.get_i64(8)?;
    let ptr = f.get_i64(16)?;
    let len = f.get_i32(24)?;
    let (Ok(ptr), Ok(len)) = (u64::try_from(ptr), u64::try_from(len)) else {
        return Err(Error::abi(format!("wasmWrite: bad buffer ptr={} len={}", ptr, len)));
    };
    let bytes = f.mem.bytes(ptr, len)?;
    tracing::trace!(fd, len, "wasmWrite");
    f.host.stdio().write(fd, bytes)?;
    Ok(())
}

fn reset_memory_data_view(_guest: &mut dyn Guest, _sp: i32) -> Result<()> {
    // Memory is borrowed afresh on every call, so growth needs no bookkeeping.
    Ok(())
}

fn nanotime(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let mut f = frame(guest, sp)?;
    let now = f.host.uptime_nanos();
    f.set_i64(8, now)
}

fn walltime(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let mut f = frame(guest, sp)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::resource(format!("system clock: {}", e)))?;
    f.set_i64(8, now.as_secs() as i64)?;
    f.set_i32(16, now.subsec_nanos() as i32)
}

fn schedule_callback(_guest: &mut dyn Guest, _sp: i32) -> Result<()> {
    Err(Error::not_implemented("runtime.scheduleCallback"))
}

fn clear_scheduled_callback(_guest: &mut dyn Guest, _sp: i32) -> Result<()> {
    Err(Error::not_implemented("runtime.clearScheduledCallback"))
}

fn schedule_timeout_event(_guest: &mut dyn Guest, _sp: i32) -> Result<()> {
    Err(Error::not_implemented("runtime.scheduleTimeoutEvent"))
}

fn clear_timeout_event(_guest: &mut dyn Guest, _sp: i32) -> Result<()> {
    Err(Error::not_implemented("runtime.clearTimeoutEvent"))
}

fn get_random_data(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let mut f = frame(guest, sp)?;
    rand::rngs::OsRng
        .try_fill_bytes(f.load_slice(8)?)
        .map_err(|e| Error::resource(format!("random source: {}", e)))
}

fn finalize_ref(_guest: &mut dyn Guest, _sp: i32) -> Result<()> {
    Err(Error::not_implemented("syscall/js.finalizeRef"))
}

fn string_val(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let mut f = frame(guest, sp)?;
    let s = f.load_string(8)?;
    f.store_value(24, &Value::string(s))
}

/// Lookups have no flag slot, so a failure either aborts or reads as undefined
fn lookup_result(lenient: bool, result: Result<Value>) -> Result<Value> {
    match result {
        Err(err) if lenient && !err.is_fatal() => {
            tracing::debug!(error = %err, "lookup failed, yielding undefined");
            Ok(Value::Undefined)
        }
        other => other,
    }
}

fn value_get(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let result = {
        let f = frame(guest, sp)?;
        let target = f.load_value(8)?;
        let prop = f.load_string(16)?;
        tracing::trace!(%prop, "valueGet");
        // Non-objects read back as themselves.
        if target.as_object().is_some() {
            lookup_result(f.host.lenient_lookups(), target.get(&prop))?
        } else {
            target
        }
    };
    let sp = guest.stack_pointer(sp)?;
    frame(guest, sp)?.store_value(32, &result)
}

fn value_set(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let f = frame(guest, sp)?;
    let target = f.load_value(8)?;
    let prop = f.load_string(16)?;
    let value = f.load_value(32)?;
    target.set(&prop, value)
}

fn value_delete(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let f = frame(guest, sp)?;
    let target = f.load_value(8)?;
    let prop = f.load_string(16)?;
    target.delete(&prop)
}

fn value_index(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let mut f = frame(guest, sp)?;
    let target = f.load_value(8)?;
    let index = f.get_i64(16)?;
    let result = lookup_result(f.host.lenient_lookups(), target.index(index))?;
    f.store_value(24, &result)
}

fn value_set_index(_guest: &mut dyn Guest, _sp: i32) -> Result<()> {
    Err(Error::not_implemented("syscall/js.valueSetIndex"))
}

fn value_call(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let outcome = {
        let f = frame(guest, sp)?;
        let target = f.load_value(8)?;
        let method = f.load_string(16)?;
        let args = f.load_values(32)?;
        tracing::trace!(%method, argc = args.len(), "valueCall");
        target.call(&method, &args)
    };
    let sp = guest.stack_pointer(sp)?;
    frame(guest, sp)?.store_outcome(56, 64, outcome)
}

fn value_invoke(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let outcome = {
        let f = frame(guest, sp)?;
        let callee = f.load_value(8)?;
        let args = f.load_values(16)?;
        callee.invoke(&args)
    };
    let sp = guest.stack_pointer(sp)?;
    frame(guest, sp)?.store_outcome(40, 48, outcome)
}

fn value_new(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let outcome = {
        let f = frame(guest, sp)?;
        let class = f.load_value(8)?;
        let args = f.load_values(16)?;
        class.construct(&args)
    };
    let sp = guest.stack_pointer(sp)?;
    frame(guest, sp)?.store_outcome(40, 48, outcome)
}

fn value_length(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let mut f = frame(guest, sp)?;
    let len = f.load_value(8)?.length()?;
    f.set_i64(16, len as i64)
}

fn value_prepare_string(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let mut f = frame(guest, sp)?;
    let s = f.load_value(8)?.to_js_string();
    let len = s.len() as i64;
    f.store_value(16, &Value::string(s))?;
    f.set_i64(24, len)
}

fn value_load_string(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let mut f = frame(guest, sp)?;
    let bytes = match f.load_value(8)? {
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Array(arr) => arr.borrow().buf.clone(),
        other => {
            return Err(Error::TypeMismatch {
                expected: "string",
                found: other.kind(),
            })
        }
    };
    let dst = f.load_slice(16)?;
    if bytes.len() > dst.len() {
        return Err(Error::abi(format!(
            "valueLoadString: {} bytes do not fit a {} byte buffer",
            bytes.len(),
            dst.len()
        )));
    }
    dst[..bytes.len()].copy_from_slice(&bytes);
    Ok(())
}

fn value_instance_of(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let mut f = frame(guest, sp)?;
    let value = f.load_value(8)?;
    let class = f.load_value(16)?;
    f.set_u8(24, u8::from(value.instance_of(&class)))
}

fn copy_bytes_to_go(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let mut f = frame(guest, sp)?;
    let src = f.load_value(32)?;
    let Some(src) = src.as_array() else {
        return f.set_u8(48, 0);
    };
    let copied = {
        let src = src.borrow();
        let dst = f.load_slice(8)?;
        let n = dst.len().min(src.buf.len());
        dst[..n].copy_from_slice(&src.buf[..n]);
        n
    };
    f.set_i64(40, copied as i64)?;
    f.set_u8(48, 1)
}

fn copy_bytes_to_js(guest: &mut dyn Guest, sp: i32) -> Result<()> {
    let mut f = frame(guest, sp)?;
    let dst = f.load_value(8)?;
    let Some(dst) = dst.as_array() else {
        return f.set_u8(48, 0);
    };
    let copied = {
        let mut dst = dst.borrow_mut();
        let src = f.load_slice(16)?;
        let n = dst.buf.len().min(src.len());
        dst.buf[..n].copy_from_slice(&src[..n]);
        n
    };
    f.set_i64(40, copied as i64)?;
    f.set_u8(48, 1)
}
