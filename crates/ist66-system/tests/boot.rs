//! End-to-end boot test: a short hand-assembled program polls the paper
//! tape reader's status, reads one byte once it is ready, and halts.
//!
//! Instruction words are built directly from the bit layout
//! `ist66_cpu::decode` implements (see that module's doc comment), the
//! same way `ist66-cpu`'s own `decode`/`exec` test modules build them.

use std::fs;
use std::sync::atomic::{AtomicU32, Ordering};

use ist66_core::Observable;
use ist66_cpu::StepOutcome;
use ist66_devices::ids;
use ist66_system::{DeviceBinding, MemoryDeposit, System, SystemConfig};

fn ea_tail(indirect: bool, index: u8, disp: i32) -> u64 {
    let disp_bits = (disp as i64 as u64) & 0x3FFFF;
    (u64::from(indirect) << 22) | ((u64::from(index) & 0xF) << 18) | disp_bits
}

fn word_jmp(disp: i32) -> u64 {
    ea_tail(false, 0, disp)
}

fn word_io1(device: u16, ctl: u8, transfer: u8, ac: u8) -> u64 {
    let tail = (u64::from(device) << 15) | (u64::from(ctl) << 13) | (u64::from(transfer) << 9) | (u64::from(ac) << 5);
    (0o670u64 << 27) | tail
}

fn word_hlt(code: u32) -> u64 {
    (0o600u64 << 27) | (u64::from(code) & ((1 << 27) - 1))
}

/// A fresh path under the system temp directory, unique per call so
/// concurrent test binaries never collide.
fn unique_temp_path(label: &str) -> std::path::PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("ist66-system-test-{label}-{}-{n}.tmp", std::process::id()))
}

#[test]
fn reads_one_byte_from_paper_tape_then_halts() {
    // A full 9-byte Nineball group: 8 data bytes (only the first used) plus
    // one extra-bits byte, all zero (see `ist66_tape::NineballReader`).
    let tape_path = unique_temp_path("ppt");
    fs::write(&tape_path, b"A\0\0\0\0\0\0\0\0").unwrap();

    use ist66_core::{status_ctl, transfer as xfer, xfer_ctl};

    // addr 0: start the reader
    // addr 1: poll status, skip to addr 3 once done
    // addr 2: jump back to addr 1
    // addr 3: read the byte into AC1
    // addr 4: halt with stop code 1
    let program = [
        MemoryDeposit { addr: 0, word: word_io1(ids::PPT as u16, xfer_ctl::START, 0, 1) },
        MemoryDeposit { addr: 1, word: word_io1(ids::PPT as u16, status_ctl::SKIP_IF_DONE, xfer::STATUS, 1) },
        MemoryDeposit { addr: 2, word: word_jmp(1) },
        MemoryDeposit { addr: 3, word: word_io1(ids::PPT as u16, xfer_ctl::NONE, 0, 1) },
        MemoryDeposit { addr: 4, word: word_hlt(1) },
    ];

    let config = SystemConfig {
        memory_words: 256,
        initial_pc: 0,
        load_image: program.to_vec(),
        fpu_enabled: false,
        iocpu_enabled: false,
        devices: vec![DeviceBinding::PaperTapeReader { device: ids::PPT, irq: 3, tape_path: tape_path.clone() }],
        device_table_capacity: 32,
        ..SystemConfig::default()
    };

    let system = System::new(&config).expect("valid configuration");
    system.interrupts().set_running(true);

    let stop_code = loop {
        match system.step() {
            StepOutcome::Continue => {}
            StepOutcome::Halted(code) => break code,
            StepOutcome::Terminated => panic!("CPU terminated before halting"),
        }
    };

    assert_eq!(stop_code, 1);
    assert_eq!(system.last_stop_code(), Some(1));
    assert_eq!(system.query("cpu.ac.1"), Some(ist66_core::Value::U64(u64::from(b'A'))));

    system.shutdown();
    let _ = fs::remove_file(&tape_path);
}

#[test]
fn rejects_a_load_image_outside_memory() {
    let config = SystemConfig {
        memory_words: 4,
        load_image: vec![MemoryDeposit { addr: 10, word: 0 }],
        ..SystemConfig::default()
    };
    let err = System::new(&config).unwrap_err();
    assert!(matches!(err, ist66_system::SystemError::LoadImageOutOfRange { addr: 10, memory_words: 4 }));
}
