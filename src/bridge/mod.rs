//! The bridge: loads a Go `js/wasm` module into wasmtime and runs it
//!
//! # Example
//! ```no_run
//! use gowasm::{Bridge, BridgeConfig, CancellationToken};
//! use std::sync::mpsc;
//!
//! let mut bridge = Bridge::from_file("hello", "hello.wasm", Some(BridgeConfig::default()))?;
//! let (tx, _rx) = mpsc::channel();
//! let code = bridge.run(&CancellationToken::new(), tx)?;
//! println!("exit code {}", code);
//! # Ok::<(), gowasm::Error>(())
//! ```

pub mod args;
pub mod config;

use std::fmt;
use std::path::Path;
use std::sync::mpsc::Sender;

use wasmtime::{
    Caller, Engine, ExternType, Func, Instance, Linker, Module, Store, StoreLimits,
    StoreLimitsBuilder, TypedFunc, Val,
};

use crate::concurrency::CancellationToken;
use crate::error::{Error, Result};
use crate::host::imports::{self, NAMESPACE};
use crate::host::{Guest, HostState};
use crate::memory::Memory;
use crate::value::Value;

pub use config::BridgeConfig;

/// Lifecycle of a [`Bridge`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Loaded and linked; no guest code has run
    Instantiated,
    /// Inside `run`
    Running,
    /// The guest called its exit import
    Exited(i32),
    /// The run was cancelled before the guest exited
    Cancelled,
    /// The run stopped on an error
    Failed,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeState::Instantiated => write!(f, "instantiated"),
            BridgeState::Running => write!(f, "running"),
            BridgeState::Exited(code) => write!(f, "exited({})", code),
            BridgeState::Cancelled => write!(f, "cancelled"),
            BridgeState::Failed => write!(f, "failed"),
        }
    }
}

/// Data owned by the wasmtime store
pub struct StoreData {
    host: HostState,
    limits: StoreLimits,
    memory: Option<wasmtime::Memory>,
    getsp: Option<TypedFunc<(), i32>>,
}

/// A guest seen through the caller of an import
struct CallerGuest<'c> {
    caller: Caller<'c, StoreData>,
}

impl Guest for CallerGuest<'_> {
    fn split(&mut self) -> Result<(&mut [u8], &mut HostState)> {
        let memory = self
            .caller
            .data()
            .memory
            .ok_or_else(|| Error::abi("import called before guest memory was bound"))?;
        let (data, store) = memory.data_and_store_mut(&mut self.caller);
        Ok((data, &mut store.host))
    }

    fn stack_pointer(&mut self, sp: i32) -> Result<i32> {
        match self.caller.data().getsp.clone() {
            Some(getsp) => getsp.call(&mut self.caller, ()).map_err(Error::from_engine),
            None => Ok(sp),
        }
    }
}

fn link(engine: &Engine, module: &Module) -> Result<Linker<StoreData>> {
    let link_error = |e: anyhow::Error| Error::Module(format!("link: {:#}", e));
    let mut linker = Linker::new(engine);

    for &(name, handler) in imports::IMPORTS {
        linker
            .func_wrap(
                NAMESPACE,
                name,
                move |caller: Caller<'_, StoreData>, sp: i32| -> anyhow::Result<()> {
                    let mut guest = CallerGuest { caller };
                    handler(&mut guest, sp).map_err(|err| {
                        if !matches!(err, Error::Exit(_)) {
                            tracing::debug!(import = name, error = %err, "import failed");
                        }
                        anyhow::Error::new(err)
                    })
                },
            )
            .map_err(link_error)?;
    }

    for import in module.imports() {
        if import.module() != NAMESPACE {
            return Err(Error::Module(format!(
                "unknown import namespace '{}' (for '{}')",
                import.module(),
                import.name()
            )));
        }
        if imports::lookup(import.name()).is_some() {
            continue;
        }
        if let ExternType::Func(ty) = import.ty() {
            tracing::warn!(import = import.name(), "import not provided; calling it will fail");
            let name = import.name().to_string();
            linker
                .func_new(NAMESPACE, import.name(), ty, move |_, _, _| {
                    Err(anyhow::Error::new(Error::not_implemented(name.clone())))
                })
                .map_err(link_error)?;
        }
    }
    Ok(linker)
}

/// Give the run's error to both the caller and the notification channel
fn replicate(err: &Error) -> Error {
    match err {
        Error::Exit(code) => Error::Exit(*code),
        Error::Cancelled => Error::Cancelled,
        Error::NotImplemented(what) => Error::NotImplemented(what.clone()),
        Error::AbiViolation(msg) => Error::AbiViolation(msg.clone()),
        Error::NotFound(id) => Error::NotFound(*id),
        Error::OutOfBounds { addr, len, size } => Error::OutOfBounds {
            addr: *addr,
            len: *len,
            size: *size,
        },
        other => Error::Engine(anyhow::anyhow!("{}", other)),
    }
}

/// A Go `js/wasm` module instantiated against the `go` import namespace
///
/// Holds `Rc` values through its host state and is therefore confined to the
/// thread that created it. Other threads interact with a run only through its
/// [`CancellationToken`].
pub struct Bridge {
    name: String,
    config: BridgeConfig,
    engine: Engine,
    store: Store<StoreData>,
    instance: Instance,
    state: BridgeState,
}

impl Bridge {
    /// Load, compile and instantiate the module at `path`
    pub fn from_file(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        config: Option<BridgeConfig>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| Error::Module(format!("reading {}: {}", path.display(), e)))?;
        Self::from_bytes(name, &bytes, config)
    }

    /// Compile and instantiate a module from its binary (or text) form
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8], config: Option<BridgeConfig>) -> Result<Self> {
        let name = name.into();
        let config = config.unwrap_or_default();

        let mut engine_config = wasmtime::Config::new();
        engine_config.epoch_interruption(true);
        let engine = Engine::new(&engine_config).map_err(|e| Error::Module(format!("engine: {:#}", e)))?;
        let module =
            Module::new(&engine, bytes).map_err(|e| Error::Module(format!("compiling {}: {:#}", name, e)))?;

        let limits = match config.memory_limit {
            Some(limit) => StoreLimitsBuilder::new().memory_size(limit).build(),
            None => StoreLimits::default(),
        };
        let mut store = Store::new(
            &engine,
            StoreData {
                host: HostState::new(&config),
                limits,
                memory: None,
                getsp: None,
            },
        );
        store.limiter(|data| &mut data.limits);
        store.set_epoch_deadline(1);

        let linker = link(&engine, &module)?;
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| Error::Module(format!("instantiating {}: {:#}", name, e)))?;

        let memory = instance
            .get_memory(&mut store, "mem")
            .or_else(|| instance.get_memory(&mut store, "memory"))
            .ok_or_else(|| Error::Module(format!("{} exports no linear memory", name)))?;
        let getsp = instance.get_typed_func::<(), i32>(&mut store, "getsp").ok();
        if getsp.is_none() {
            tracing::debug!(module = %name, "no getsp export; stack pointer is never re-read");
        }
        store.data_mut().memory = Some(memory);
        store.data_mut().getsp = getsp;

        tracing::debug!(module = %name, "instantiated");
        Ok(Self {
            name,
            config,
            engine,
            store,
            instance,
            state: BridgeState::Instantiated,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Exit code once the guest has called its exit import
    pub fn exit_code(&self) -> Option<i32> {
        self.store.data().host.exit_code()
    }

    /// The global object, for installing host values before `run`
    pub fn global(&self) -> Value {
        self.store.data().host.global()
    }

    /// Drain captured guest stdout
    pub fn take_stdout(&self) -> Vec<u8> {
        self.store.data().host.stdio().take_stdout()
    }

    /// Drain captured guest stderr
    pub fn take_stderr(&self) -> Vec<u8> {
        self.store.data().host.stdio().take_stderr()
    }

    fn write_args(&mut self) -> Result<(i32, i32)> {
        let memory = self
            .store
            .data()
            .memory
            .ok_or_else(|| Error::abi("guest memory is not bound"))?;
        let args = self.config.args_for(&self.name);
        let mut mem = Memory::new(memory.data_mut(&mut self.store));
        args::write_args(&mut mem, &args, &self.config.env)
    }

    fn enter(&mut self) -> Result<()> {
        let (argc, argv) = self.write_args()?;
        let entry = self
            .instance
            .get_typed_func::<(i32, i32), ()>(&mut self.store, "run")
            .map_err(|e| Error::Module(format!("{}: no usable run export: {:#}", self.name, e)))?;
        self.state = BridgeState::Running;
        tracing::debug!(module = %self.name, argc, "entering guest");
        entry.call(&mut self.store, (argc, argv)).map_err(Error::from_engine)
    }

    /// Run the module to completion
    ///
    /// `notify` receives `Ok(())` once the entry point has returned or the
    /// guest exited, or the error that stopped the run. Afterwards this blocks
    /// until the guest has exited or `cancel` fires, and returns the exit code.
    /// Cancelling while guest code executes interrupts the guest.
    pub fn run(&mut self, cancel: &CancellationToken, notify: Sender<Result<()>>) -> Result<i32> {
        if self.state != BridgeState::Instantiated {
            return Err(Error::State(format!("cannot run {} while {}", self.name, self.state)));
        }

        if cancel.is_cancelled() {
            tracing::debug!(module = %self.name, "run cancelled before entry");
            self.state = BridgeState::Cancelled;
            let _ = notify.send(Err(Error::Cancelled));
            return Err(Error::Cancelled);
        }

        let exit = cancel.child_token();
        self.store.data_mut().host.set_exit_signal(exit.clone());
        // The deadline must be armed before any epoch bump can arrive.
        self.store.set_epoch_deadline(1);
        let engine = self.engine.clone();
        cancel.on_cancel(move || engine.increment_epoch());

        let outcome = self.enter();
        let exited = self.exit_code().is_some();
        match outcome {
            Ok(()) | Err(Error::Exit(_)) => {
                let _ = notify.send(Ok(()));
            }
            Err(_) if cancel.is_cancelled() && !exited => {
                tracing::debug!(module = %self.name, "run cancelled");
                self.state = BridgeState::Cancelled;
                let _ = notify.send(Err(Error::Cancelled));
                return Err(Error::Cancelled);
            }
            Err(err) => {
                tracing::warn!(module = %self.name, error = %err, "guest failed");
                self.state = BridgeState::Failed;
                let _ = notify.send(Err(replicate(&err)));
                return Err(err);
            }
        }

        exit.wait();
        match self.exit_code() {
            Some(code) => {
                self.state = BridgeState::Exited(code);
                Ok(code)
            }
            None => {
                self.state = BridgeState::Cancelled;
                Err(Error::Cancelled)
            }
        }
    }

    /// The guest's `main` export as a plain synchronous call
    ///
    /// Bypasses the run protocol: no cancellation and no state bookkeeping.
    /// A guest exit during the call comes back as [`Error::Exit`].
    pub fn get_main(&mut self) -> Result<MainFunc<'_>> {
        let func = self
            .instance
            .get_func(&mut self.store, "main")
            .ok_or_else(|| Error::Module(format!("{} has no main export", self.name)))?;
        Ok(MainFunc {
            store: &mut self.store,
            func,
        })
    }
}

/// Handle to a module's `main` export
pub struct MainFunc<'b> {
    store: &'b mut Store<StoreData>,
    func: Func,
}

impl MainFunc<'_> {
    pub fn call(&mut self, params: &[Val]) -> Result<Vec<Val>> {
        let ty = self.func.ty(&*self.store);
        let mut results = vec![Val::I32(0); ty.results().len()];
        self.store.set_epoch_deadline(1);
        self.func
            .call(&mut *self.store, params, &mut results)
            .map_err(Error::from_engine)?;
        Ok(results)
    }
}
