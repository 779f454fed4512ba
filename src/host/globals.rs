//! The JavaScript environment the guest runtime looks up at startup
//!
//! The guest resolves `Object`, `Array`, `Uint8Array`, `process`, `fs`,
//! `crypto` and `Date` from the global object during package initialization,
//! so these have to exist before the first instruction runs. Everything here
//! is plain host code; nothing calls back into the guest.

use super::stdio::Stdio;
use crate::error::{Error, Result};
use crate::value::{Object, Value};
use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};

fn arg(args: &[Value], i: usize) -> &Value {
    args.get(i).unwrap_or(&Value::Undefined)
}

fn number_arg(args: &[Value], i: usize, what: &str) -> Result<f64> {
    arg(args, i)
        .as_number()
        .ok_or_else(|| Error::type_error(format!("{}: argument {} must be a number", what, i)))
}

fn length_arg(args: &[Value], what: &str) -> Result<usize> {
    match arg(args, 0) {
        Value::Undefined => Ok(0),
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64 => Ok(*n as usize),
        other => Err(Error::Thrown(format!("RangeError: {}: invalid length {:?}", what, other))),
    }
}

fn byte_array_constructor(name: &'static str) -> impl Fn(&[Value]) -> Result<Value> {
    move |args: &[Value]| match arg(args, 0) {
        Value::Array(src) => Ok(Value::array(src.borrow().buf.clone())),
        _ => Ok(Value::array(vec![0u8; length_arg(args, name)?])),
    }
}

fn constant(n: f64) -> impl Fn(&[Value]) -> Result<Value> {
    move |_: &[Value]| Ok(Value::Number(n))
}

fn now_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

fn process_object() -> Value {
    Value::object(
        Object::new("process")
            .with("pid", Value::Number(f64::from(std::process::id())))
            .with("ppid", Value::Number(-1.0))
            .with("getuid", Value::function("getuid", constant(-1.0)))
            .with("getgid", Value::function("getgid", constant(-1.0)))
            .with("geteuid", Value::function("geteuid", constant(-1.0)))
            .with("getegid", Value::function("getegid", constant(-1.0)))
            .with("umask", Value::function("umask", constant(f64::from(0o022))))
            .with("cwd", Value::function("cwd", |_| Ok(Value::string("/")))),
    )
}

fn fs_object(stdio: &Stdio) -> Value {
    let mut constants = Object::new("constants");
    for flag in ["O_WRONLY", "O_RDWR", "O_CREAT", "O_TRUNC", "O_APPEND", "O_EXCL"] {
        constants.set(flag, Value::Number(-1.0));
    }

    let stdio = stdio.clone();
    let write_sync = move |args: &[Value]| -> Result<Value> {
        let fd = number_arg(args, 0, "fs.writeSync")?;
        let buf = arg(args, 1)
            .as_array()
            .ok_or_else(|| Error::type_error("fs.writeSync: buffer must be a Uint8Array"))?
            .clone();
        let buf = buf.borrow();
        let offset = match arg(args, 2) {
            Value::Number(n) => *n as usize,
            _ => 0,
        };
        let length = match arg(args, 3) {
            Value::Number(n) => *n as usize,
            _ => buf.buf.len().saturating_sub(offset),
        };
        let bytes = offset
            .checked_add(length)
            .and_then(|end| buf.buf.get(offset..end))
            .ok_or_else(|| Error::Thrown("RangeError: fs.writeSync: range out of bounds".into()))?;
        let written = stdio.write(fd as i64, bytes)?;
        Ok(Value::Number(written as f64))
    };

    Value::object(
        Object::new("fs")
            .with("constants", Value::object(constants))
            .with("writeSync", Value::function("writeSync", write_sync)),
    )
}

fn crypto_object() -> Value {
    Value::object(Object::new("crypto").with(
        "getRandomValues",
        Value::function("getRandomValues", |args| {
            let target = arg(args, 0);
            let arr = target
                .as_array()
                .ok_or_else(|| Error::type_error("crypto.getRandomValues: expected a Uint8Array"))?;
            rand::rngs::OsRng
                .try_fill_bytes(&mut arr.borrow_mut().buf)
                .map_err(|e| Error::resource(format!("random source: {}", e)))?;
            Ok(target.clone())
        }),
    ))
}

fn date_constructor() -> Value {
    Value::object(Object::new("Date").with_constructor(|_| {
        let created = now_millis();
        Ok(Value::object(
            Object::new("Date")
                .with("getTimezoneOffset", Value::function("getTimezoneOffset", constant(0.0)))
                .with("getTime", Value::function("getTime", constant(created))),
        ))
    }))
}

fn console_object(stdio: &Stdio) -> Value {
    let printer = |name: &'static str, fd: i64| {
        let stdio = stdio.clone();
        Value::function(name, move |args| {
            let mut line = args
                .iter()
                .map(Value::to_js_string)
                .collect::<Vec<_>>()
                .join(" ");
            line.push('\n');
            stdio.write(fd, line.as_bytes())?;
            Ok(Value::Undefined)
        })
    };
    Value::object(
        Object::new("console")
            .with("log", printer("log", 1))
            .with("info", printer("info", 1))
            .with("warn", printer("warn", 2))
            .with("error", printer("error", 2)),
    )
}

/// Build the global object (reference id 5)
pub fn global_object(stdio: &Stdio) -> Value {
    Value::object(
        Object::new("global")
            .with(
                "Object",
                Value::object(
                    Object::new("Object").with_constructor(|_| Ok(Value::object(Object::new("Object")))),
                ),
            )
            .with(
                "Array",
                Value::object(Object::new("Array").with_constructor(byte_array_constructor("Array"))),
            )
            .with(
                "Uint8Array",
                Value::object(
                    Object::new("Uint8Array").with_constructor(byte_array_constructor("Uint8Array")),
                ),
            )
            .with("process", process_object())
            .with("fs", fs_object(stdio))
            .with("crypto", crypto_object())
            .with("Date", date_constructor())
            .with("console", console_object(stdio)),
    )
}

/// Build the object standing for the runtime instance (reference id 6)
///
/// Wrapped guest functions can be created but never run: running them needs
/// the callback scheduler, which the bridge does not provide.
pub fn runtime_object() -> Value {
    Value::object(
        Object::new("go")
            .with("_pendingEvent", Value::Null)
            .with(
                "_makeFuncWrapper",
                Value::function("_makeFuncWrapper", |args| {
                    let id = arg(args, 0).to_js_string();
                    Ok(Value::function(format!("wrapper{}", id), move |_| {
                        Err(Error::not_implemented(format!("invoking guest function {}", id)))
                    }))
                }),
            ),
    )
}
