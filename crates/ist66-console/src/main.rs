//! `ist66` — a thin console command REPL driving an `ist66_system::System`.
//!
//! Reads command lines from the controlling terminal and drives the
//! machine through `ist66-system`'s public surface; it owns no emulation
//! logic of its own. Mirrors `emu-c64/src/main.rs`'s hand-rolled
//! `parse_args` over `std::env::args()`, and keeps the REPL itself a
//! plain `stdin` line loop rather than reaching for a line-editing crate.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use ist66_core::{Observable, Value};
use ist66_cpu::StepOutcome;
use ist66_devices::ids;
use ist66_system::{DeviceBinding, System, SystemConfig};

// Reserved-id devices get fixed IRQs in this binary's own reference
// configuration; the spec names device ids but not their IRQ lines.
const PPT_IRQ: u8 = 1;
const LPT_IRQ: u8 = 2;
const PCH_IRQ: u8 = 3;
const TTY_IRQ: u8 = 4;

struct CliArgs {
    memory_words: usize,
    initial_pc: u32,
    ppt: Option<PathBuf>,
    lpt: Option<PathBuf>,
    pch: Option<PathBuf>,
    tty_port: Option<u16>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        memory_words: 1 << 17,
        initial_pc: 0,
        ppt: None,
        lpt: None,
        pch: None,
        tty_port: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--memory" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.memory_words = s.parse().unwrap_or(cli.memory_words);
                }
            }
            "--pc" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.initial_pc = u32::from_str_radix(s, 8).unwrap_or(0);
                }
            }
            "--ppt" => {
                i += 1;
                cli.ppt = args.get(i).map(PathBuf::from);
            }
            "--lpt" => {
                i += 1;
                cli.lpt = args.get(i).map(PathBuf::from);
            }
            "--pch" => {
                i += 1;
                cli.pch = args.get(i).map(PathBuf::from);
            }
            "--tty" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.tty_port = s.parse().ok();
                }
            }
            "--help" | "-h" => {
                eprintln!("Usage: ist66 [OPTIONS]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --memory <words>  Main memory size, in words [default: 131072]");
                eprintln!("  --pc <octal>      Initial program counter [default: 0]");
                eprintln!("  --ppt <file>      Bind a paper-tape reader to a Nineball-encoded file");
                eprintln!("  --lpt <file>      Bind a line printer, appending to a file");
                eprintln!("  --pch <file>      Bind a paper-tape punch, writing to a file");
                eprintln!("  --tty <port>      Bind a TELNET-framed TTY on a TCP port");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn devices_from(cli: &CliArgs) -> Vec<DeviceBinding> {
    let mut devices = Vec::new();
    if let Some(path) = &cli.ppt {
        devices.push(DeviceBinding::PaperTapeReader { device: ids::PPT, irq: PPT_IRQ, tape_path: path.clone() });
    }
    if let Some(path) = &cli.lpt {
        devices.push(DeviceBinding::LinePrinter { device: ids::LPT, irq: LPT_IRQ, output_path: path.clone() });
    }
    if let Some(path) = &cli.pch {
        devices.push(DeviceBinding::PaperTapePunch { device: ids::PCH, irq: PCH_IRQ, output_path: path.clone() });
    }
    if let Some(port) = cli.tty_port {
        // No reserved id for TTY (§6: "allocated dynamically"); 020 is this
        // binary's own choice, just past the reserved PPT/LPT/PCH run.
        devices.push(DeviceBinding::Tty { device: 0o20, irq: TTY_IRQ, port });
    }
    devices
}

/// The REPL's own state: the running machine plus the command pointer
/// (§6 "Console command language").
struct Console {
    system: System,
    pointer: u32,
}

impl Console {
    fn run(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if let Some(rest) = line.strip_prefix('/') {
            match u32::from_str_radix(rest.trim(), 8) {
                Ok(addr) => self.pointer = addr,
                Err(_) => eprintln!("ist66: bad address {rest:?}"),
            }
            return;
        }

        if let Some(rest) = line.strip_prefix('.') {
            self.print_words(rest.trim());
            return;
        }

        if let Some(rest) = line.strip_prefix('=') {
            self.deposit_words(rest.trim());
            return;
        }

        match line {
            "?" => println!("{:#013o}", self.pointer),
            "W" => self.wait(),
            "S" => self.start(),
            "P" => self.pause(),
            "GW" => {
                self.system.set_pc(self.pointer);
                self.wait();
            }
            "GS" => {
                self.system.set_pc(self.pointer);
                self.start();
            }
            "X" => {
                self.system.shutdown();
                process::exit(0);
            }
            other => eprintln!("ist66: unrecognized command {other:?}"),
        }
    }

    fn print_words(&mut self, arg: &str) {
        let Ok(count) = arg.parse::<u32>() else {
            eprintln!("ist66: bad word count {arg:?}");
            return;
        };
        let mem = self.system.memory().lock().unwrap();
        for _ in 0..count {
            match mem.peek(self.pointer) {
                Some(word) => println!("{:#013o}  {word:#015o}", self.pointer),
                None => {
                    eprintln!("ist66: address {:#013o} out of range", self.pointer);
                    break;
                }
            }
            self.pointer = self.pointer.wrapping_add(1);
        }
    }

    fn deposit_words(&mut self, arg: &str) {
        for tok in arg.split_whitespace() {
            match u64::from_str_radix(tok, 8) {
                Ok(word) => {
                    self.system.deposit(self.pointer, word);
                    self.pointer = self.pointer.wrapping_add(1);
                }
                Err(_) => eprintln!("ist66: bad word {tok:?}"),
            }
        }
    }

    fn wait(&mut self) {
        self.system.interrupts().set_running(true);
        loop {
            match self.system.step() {
                StepOutcome::Continue => {}
                StepOutcome::Halted(code) => {
                    println!("HALT {code:#015o}");
                    break;
                }
                StepOutcome::Terminated => break,
            }
        }
    }

    fn start(&mut self) {
        self.system.interrupts().set_running(true);
        self.system.start();
    }

    fn pause(&mut self) {
        self.system.stop();
        if let Some(Value::U32(pc)) = self.system.query("cpu.pc") {
            self.pointer = pc;
        }
    }
}

fn main() {
    let cli = parse_args();
    let config = SystemConfig {
        memory_words: cli.memory_words,
        initial_pc: cli.initial_pc,
        devices: devices_from(&cli),
        ..SystemConfig::default()
    };

    let system = match System::new(&config) {
        Ok(system) => system,
        Err(e) => {
            eprintln!("ist66: {e}");
            process::exit(1);
        }
    };

    let mut console = Console { system, pointer: cli.initial_pc };

    let stdin = io::stdin();
    print!("ist66> ");
    let _ = io::stdout().flush();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        console.run(&line);
        print!("ist66> ");
        let _ = io::stdout().flush();
    }
    console.system.shutdown();
}
