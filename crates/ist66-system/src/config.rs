//! System configuration (§2 item 9 "Boot/loader surface"): memory size,
//! initial load image, device bindings. Mirrors `C64Config` in the
//! teacher's `emu-c64/src/config.rs` — a plain struct the caller fills in
//! and hands to [`crate::System::new`], no builder, no defaults magic.

use std::path::PathBuf;

/// One word deposited at a specific address before the CPU starts, the
/// boot/loader surface's basic primitive (§2 item 9, §9 Design Notes).
#[derive(Debug, Clone, Copy)]
pub struct MemoryDeposit {
    pub addr: u32,
    pub word: u64,
}

/// A device binding requested at boot. Device ids follow §6's reference
/// configuration (`ist66_devices::ids`); `Tty` is the only kind allocated
/// dynamically, by TCP port, per §6.
#[derive(Debug, Clone)]
pub enum DeviceBinding {
    /// Paper-tape reader at device id [`ist66_devices::ids::PPT`], sourced
    /// from a Nineball-encoded file.
    PaperTapeReader { device: usize, irq: u8, tape_path: PathBuf },
    /// Line printer at device id [`ist66_devices::ids::LPT`], writing to a
    /// file (truncated/created if absent).
    LinePrinter { device: usize, irq: u8, output_path: PathBuf },
    /// Paper-tape punch at device id [`ist66_devices::ids::PCH`], writing
    /// Nineball-encoded symbols to a file.
    PaperTapePunch { device: usize, irq: u8, output_path: PathBuf },
    /// A TELNET-framed TTY bound to `port`.
    Tty { device: usize, irq: u8, port: u16 },
}

/// Configuration for constructing a [`crate::System`].
pub struct SystemConfig {
    /// Main-CPU word memory size, in words (§3 "Address": 27 bits of
    /// addressable space, but a configuration need not allocate the full
    /// range).
    pub memory_words: usize,
    /// Program counter the CPU starts at.
    pub initial_pc: u32,
    /// Words deposited into memory before the CPU starts running.
    pub load_image: Vec<MemoryDeposit>,
    /// Whether the FPU surface (§4.6) is present.
    pub fpu_enabled: bool,
    /// Whether to instantiate the IOCPU (§4.3) alongside the main CPU.
    pub iocpu_enabled: bool,
    /// IOCPU local memory size, in 18-bit words, if `iocpu_enabled`.
    pub iocpu_local_words: usize,
    /// Device ids to register on the main CPU's device table at boot.
    pub devices: Vec<DeviceBinding>,
    /// Device capacity of the main CPU's device table (§3 "Device
    /// record": up to 4096 ids).
    pub device_table_capacity: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            memory_words: 1 << 17,
            initial_pc: 0,
            load_image: Vec::new(),
            fpu_enabled: true,
            iocpu_enabled: false,
            iocpu_local_words: 1 << 13,
            devices: Vec::new(),
            device_table_capacity: 4096,
        }
    }
}
