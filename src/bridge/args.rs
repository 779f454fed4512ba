//! Command-line arguments and environment in guest memory
//!
//! The guest runtime reads `argv` the way a C program would: an array of
//! string pointers terminated by a zero entry, immediately followed by the
//! environment in the same form. Each entry is eight bytes, a 32-bit pointer
//! and a zero high word.

use crate::error::{Error, Result};
use crate::memory::Memory;

/// Where the strings start; below this the guest keeps its own data
pub const ARGS_OFFSET: u64 = 4096;

/// Space reserved for strings and pointers; the guest's data starts right after
pub const ARGS_LIMIT: u64 = 8192;

fn align8(offset: u64) -> u64 {
    (offset + 7) & !7
}

/// Lay out `args` and `env`, returning `(argc, argv)` for the entry point
///
/// Environment entries are written sorted by key. Nothing is written when the
/// whole layout does not fit below `ARGS_OFFSET + ARGS_LIMIT`.
pub fn write_args(mem: &mut Memory<'_>, args: &[String], env: &[(String, String)]) -> Result<(i32, i32)> {
    let mut env: Vec<_> = env.iter().collect();
    env.sort_by(|a, b| a.0.cmp(&b.0));
    let env: Vec<String> = env.iter().map(|(key, value)| format!("{}={}", key, value)).collect();

    let strings_end = args
        .iter()
        .chain(&env)
        .fold(ARGS_OFFSET, |offset, s| align8(offset + s.len() as u64 + 1));
    let argv = strings_end;
    let end = argv + 8 * (args.len() + env.len() + 2) as u64;
    if end >= ARGS_OFFSET + ARGS_LIMIT {
        return Err(Error::Config(format!(
            "command line and environment take {} bytes, over the {} byte limit",
            end - ARGS_OFFSET,
            ARGS_LIMIT
        )));
    }

    let mut offset = ARGS_OFFSET;
    let mut put = |mem: &mut Memory<'_>, s: &str| -> Result<u64> {
        let ptr = offset;
        mem.write(ptr, s.as_bytes())?;
        mem.set_u8(ptr + s.len() as u64, 0)?;
        offset = align8(ptr + s.len() as u64 + 1);
        Ok(ptr)
    };

    let mut pointers = Vec::with_capacity(args.len() + env.len() + 2);
    for arg in args {
        pointers.push(put(mem, arg)?);
    }
    pointers.push(0);
    for entry in &env {
        pointers.push(put(mem, entry)?);
    }
    pointers.push(0);

    for (i, ptr) in pointers.iter().enumerate() {
        let entry = argv + 8 * i as u64;
        mem.set_u32(entry, *ptr as u32)?;
        mem.set_u32(entry + 4, 0)?;
    }
    tracing::debug!(argc = args.len(), argv, "wrote guest arguments");
    Ok((args.len() as i32, argv as i32))
}
