//! Prelude module for convenient imports
//!
//! ```no_run
//! use gowasm::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let mut bridge = Bridge::from_file("app", "app.wasm", None)?;
//!     bridge.global().set("appName", Value::string("demo"))?;
//!     let (tx, _rx) = std::sync::mpsc::channel();
//!     bridge.run(&CancellationToken::new(), tx)?;
//!     Ok(())
//! }
//! ```

// Bridge lifecycle
pub use crate::bridge::{Bridge, BridgeConfig, BridgeState, MainFunc};

// Error handling
pub use crate::error::{Error, Result, Severity};

// Values exchanged with the guest
pub use crate::value::{Object, RefTable, Value};

// Host side of the import namespace
pub use crate::host::{Guest, HostState, Stdio};

// Cancellation
pub use crate::concurrency::CancellationToken;

// Version constant
pub use crate::VERSION;
