//! gowasm: run Go `js/wasm` modules without a JavaScript engine
//!
//! Go compiles for WebAssembly against a JavaScript host: the module imports
//! a fixed set of functions from the `go` namespace and exchanges values with
//! the host as NaN-boxed 8-byte cells that refer to host-side objects. gowasm
//! emulates that host on top of wasmtime, so such modules can run natively.
//!
//! # Quick Start
//!
//! ```no_run
//! use gowasm::{Bridge, BridgeConfig, CancellationToken};
//! use std::sync::mpsc;
//!
//! fn main() -> gowasm::Result<()> {
//!     let config = BridgeConfig {
//!         args: vec!["hello".into(), "-n".into(), "3".into()],
//!         ..BridgeConfig::default()
//!     };
//!     let mut bridge = Bridge::from_file("hello", "hello.wasm", Some(config))?;
//!     let (tx, _rx) = mpsc::channel();
//!     let code = bridge.run(&CancellationToken::new(), tx)?;
//!     std::process::exit(code);
//! }
//! ```
//!
//! # Module Overview
//!
//! | Module | Role |
//! |--------|------|
//! | [`memory`] | bounds-checked access to guest linear memory |
//! | [`value`] | host-side values, the reference table and the cell codec |
//! | [`host`] | the `go` import handlers and the default global object |
//! | [`bridge`] | loading, linking and the run lifecycle |
//! | [`concurrency`] | cancellation tokens |
#![allow(clippy::type_complexity)]

pub mod bridge;
pub mod concurrency;
pub mod host;
pub mod memory;
pub mod prelude;
pub mod value;

mod error;

pub use bridge::{Bridge, BridgeConfig, BridgeState, MainFunc};
pub use concurrency::CancellationToken;
pub use error::{Error, Result, Severity};
pub use value::{Object, RefTable, Value};

/// gowasm version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
