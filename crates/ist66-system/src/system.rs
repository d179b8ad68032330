//! The top-level system (§2 item 9 "Boot/loader surface"): wires the
//! memory unit, interrupt controller, main CPU, optional IOCPU, and
//! device table into one runnable machine, the way `C64::new` in the
//! teacher's `emu-c64/src/c64.rs` wires bus + CPU + VIC-II + CIAs.
//!
//! Unlike the teacher's frame-stepped `C64`, §5 requires the CPU to run
//! on its own thread of execution cooperating with device worker threads
//! through the interrupt controller's mutex + condvar. `System` owns that
//! thread's lifecycle: [`System::start`]/[`System::stop`]/[`System::step`]
//! are the boot/loader surface's start/stop/step primitives.

use std::fs::{File, OpenOptions};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use ist66_core::{InterruptController, MemoryUnit, Observable, Value};
use ist66_cpu::{Cpu, StepOutcome};
use ist66_devices::{ids, LinePrinter, PaperTapePunch, PaperTapeReader, Tty};
use ist66_iocpu::Iocpu;

use crate::config::{DeviceBinding, SystemConfig};
use crate::error::SystemError;

/// The hot CPU record behind one mutex, per §9 Design Notes' "small hot
/// record behind a mutex" alternative — the memory buffer behind its own
/// lock is `ist66_cpu::SharedMemory`, already shared this way by `Cpu`
/// itself.
type SharedCpu = Arc<Mutex<Cpu>>;
type SharedIocpu = Arc<Mutex<Iocpu>>;

/// A fully wired IST-66 system: memory, interrupt controller, CPU, an
/// optional IOCPU, and whatever peripherals the configuration bound.
pub struct System {
    memory: ist66_cpu::SharedMemory,
    interrupts: Arc<InterruptController>,
    cpu: SharedCpu,
    iocpu: Option<SharedIocpu>,
    cpu_handle: Mutex<Option<JoinHandle<()>>>,
    iocpu_handle: Mutex<Option<JoinHandle<()>>>,
}

impl System {
    /// Build a system from `config`. Per-device bind/open failures are
    /// non-fatal (§7): the device is left unregistered and a one-line
    /// diagnostic goes to `stderr`. Only a structurally invalid
    /// configuration (a load-image deposit outside the memory size) fails
    /// construction outright.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::LoadImageOutOfRange`] if `config.load_image`
    /// names an address `>= config.memory_words`.
    pub fn new(config: &SystemConfig) -> Result<Self, SystemError> {
        for deposit in &config.load_image {
            if deposit.addr as usize >= config.memory_words {
                return Err(SystemError::LoadImageOutOfRange {
                    addr: deposit.addr,
                    memory_words: config.memory_words,
                });
            }
        }

        let memory = Arc::new(Mutex::new(MemoryUnit::new(config.memory_words)));
        let interrupts = Arc::new(InterruptController::new());

        {
            let mut mem = memory.lock().unwrap();
            for deposit in &config.load_image {
                mem.deposit(deposit.addr, deposit.word);
            }
        }

        let mut cpu = Cpu::new(Arc::clone(&memory), Arc::clone(&interrupts), config.device_table_capacity);
        cpu.set_fpu_enabled(config.fpu_enabled);
        cpu.set_pc(config.initial_pc);

        for binding in &config.devices {
            register_device(&mut cpu, &interrupts, binding);
        }

        let iocpu = if config.iocpu_enabled {
            Some(Arc::new(Mutex::new(Iocpu::new(
                config.iocpu_local_words,
                Arc::clone(&memory),
                Arc::clone(&interrupts),
                128,
            ))))
        } else {
            None
        };

        Ok(Self {
            memory,
            interrupts,
            cpu: Arc::new(Mutex::new(cpu)),
            iocpu,
            cpu_handle: Mutex::new(None),
            iocpu_handle: Mutex::new(None),
        })
    }

    /// Handle to the shared word memory, e.g. for an external front-panel
    /// thread's read-only peeks.
    #[must_use]
    pub fn memory(&self) -> &ist66_cpu::SharedMemory {
        &self.memory
    }

    /// Handle to the shared interrupt controller.
    #[must_use]
    pub fn interrupts(&self) -> &Arc<InterruptController> {
        &self.interrupts
    }

    /// Deposit a word directly into memory, bypassing protection checks —
    /// the boot/loader surface's basic primitive (§9 Design Notes).
    pub fn deposit(&self, addr: u32, word: u64) {
        self.memory.lock().unwrap().deposit(addr, word);
    }

    /// Seed the CPU's program counter.
    pub fn set_pc(&self, pc: u32) {
        self.cpu.lock().unwrap().set_pc(pc);
    }

    /// The stop code of the most recent `HLT`, if any.
    #[must_use]
    pub fn last_stop_code(&self) -> Option<u32> {
        self.cpu.lock().unwrap().last_stop_code()
    }

    /// Start the CPU free-running on its own thread of execution (§5).
    /// A no-op if the CPU thread is already running.
    pub fn start(&self) {
        let mut handle = self.cpu_handle.lock().unwrap();
        if handle.is_some() {
            return;
        }
        self.interrupts.set_running(true);
        let cpu = Arc::clone(&self.cpu);
        *handle = Some(std::thread::spawn(move || {
            loop {
                let outcome = cpu.lock().unwrap().step();
                if outcome == StepOutcome::Terminated {
                    break;
                }
            }
        }));
    }

    /// Request the CPU thread to stop and join it. A no-op if no thread
    /// is running.
    pub fn stop(&self) {
        let mut handle = self.cpu_handle.lock().unwrap();
        if let Some(h) = handle.take() {
            self.interrupts.request_exit();
            let _ = h.join();
        }
    }

    /// Execute a single step on the calling thread. Only meaningful while
    /// no CPU thread is running (the console's single-step command).
    ///
    /// # Panics
    ///
    /// Panics if the CPU thread started by [`System::start`] is still
    /// running, since single-stepping and free-running the same `Cpu`
    /// concurrently would race.
    pub fn step(&self) -> StepOutcome {
        assert!(self.cpu_handle.lock().unwrap().is_none(), "cannot single-step while the CPU thread is running");
        self.cpu.lock().unwrap().step()
    }

    /// Start the IOCPU, if configured, on its own thread of execution.
    pub fn start_iocpu(&self) {
        let Some(iocpu) = self.iocpu.clone() else { return };
        let mut handle = self.iocpu_handle.lock().unwrap();
        if handle.is_some() {
            return;
        }
        *handle = Some(std::thread::spawn(move || {
            iocpu.lock().unwrap().run();
        }));
    }

    /// Join the IOCPU thread, if one was started by [`System::start_iocpu`].
    pub fn join_iocpu(&self) {
        if let Some(h) = self.iocpu_handle.lock().unwrap().take() {
            let _ = h.join();
        }
    }

    /// Seed the IOCPU's local program counter, if one is configured.
    pub fn set_iocpu_pc(&self, pc: u32) {
        if let Some(iocpu) = &self.iocpu {
            iocpu.lock().unwrap().set_pc(pc);
        }
    }

    /// Shut down: stop the CPU and IOCPU threads (§5 "Shutdown destroys
    /// devices in id order" — device teardown itself happens when the
    /// last `Arc` to this `System`, and so to its `Cpu`'s `DeviceTable`,
    /// is dropped).
    pub fn shutdown(&self) {
        self.stop();
        self.join_iocpu();
    }
}

impl Drop for System {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn register_device(cpu: &mut Cpu, interrupts: &Arc<InterruptController>, binding: &DeviceBinding) {
    match binding {
        DeviceBinding::PaperTapeReader { device, irq, tape_path } => match File::open(tape_path) {
            Ok(f) => cpu.devices.register(*device, Box::new(PaperTapeReader::new(f, Arc::clone(interrupts), *irq))),
            Err(e) => eprintln!("ist66: cannot open paper tape {}: {e}", tape_path.display()),
        },
        DeviceBinding::LinePrinter { device, irq, output_path } => {
            match OpenOptions::new().create(true).append(true).open(output_path) {
                Ok(f) => cpu.devices.register(*device, Box::new(LinePrinter::new(f, Arc::clone(interrupts), *irq))),
                Err(e) => eprintln!("ist66: cannot open line printer output {}: {e}", output_path.display()),
            }
        }
        DeviceBinding::PaperTapePunch { device, irq, output_path } => {
            match OpenOptions::new().create(true).write(true).truncate(true).open(output_path) {
                Ok(f) => cpu.devices.register(*device, Box::new(PaperTapePunch::new(f, Arc::clone(interrupts), *irq))),
                Err(e) => eprintln!("ist66: cannot open punch output {}: {e}", output_path.display()),
            }
        }
        DeviceBinding::Tty { device, irq, port } => match Tty::new(*port, Arc::clone(interrupts), *irq) {
            Ok(tty) => cpu.devices.register(*device, Box::new(tty)),
            Err(e) => eprintln!("ist66: cannot bind TTY on port {port}: {e}"),
        },
    }
}

const QUERY_PATHS: &[&str] = &["irq.min_pending", "irq.mask", "irq.running"];

/// Read-only state the front-panel thread (§5) would poll, mirroring the
/// teacher's `Observable`/`Value` convention (`emu-core/src/observable.rs`).
/// Paths under `cpu.` and `iocpu.` delegate to the respective component's
/// own `Observable` impl.
impl Observable for System {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            return self.cpu.lock().unwrap().query(rest);
        }
        if let Some(rest) = path.strip_prefix("iocpu.") {
            return self.iocpu.as_ref()?.lock().unwrap().query(rest);
        }
        match path {
            "irq.min_pending" => Some(Value::U8(self.interrupts.min_pending())),
            "irq.mask" => Some(Value::U16(self.interrupts.mask())),
            "irq.running" => Some(Value::Bool(self.interrupts.is_running())),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}

/// Reserved device ids re-exported for callers assembling a
/// [`SystemConfig`] (§6 "I/O device numbering").
pub mod reserved_ids {
    pub use super::ids::{LPT, PCH, PPT};
}
