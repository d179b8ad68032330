//! The IOCPU's execution loop (§4.3): fetch/decode/execute over its local
//! memory, with data references above the local window routed to the
//! host's shared memory, and `API` raising interrupts on the host.

use std::sync::{Arc, Mutex};

use ist66_core::{DeviceTable, InterruptController, MemResult, MemoryUnit, Observable, Value, ADDR_MASK};

use crate::address::{compute_effective_address, LocalMemory};
use crate::decode::{decode, Instruction, MrOp, Opr3};
use crate::registers::IocpuRegs;
use crate::word::{HOST_BASE, LOCAL_ADDR_MASK, WORD18_MASK};

/// Handle to the host's word memory, shared with the main CPU.
pub type SharedHostMemory = Arc<Mutex<MemoryUnit>>;

/// What one instruction does to `PC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Next,
    Skip,
    Jump(u32),
    Halt,
}

/// What one call to [`Iocpu::step`] accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Halted,
}

/// The 18-bit auxiliary I/O processor.
pub struct Iocpu {
    pub regs: IocpuRegs,
    local: LocalMemory,
    host_memory: SharedHostMemory,
    host_interrupts: Arc<InterruptController>,
    pub devices: DeviceTable,
    running: bool,
}

impl Iocpu {
    #[must_use]
    pub fn new(
        local_size: usize,
        host_memory: SharedHostMemory,
        host_interrupts: Arc<InterruptController>,
        device_capacity: usize,
    ) -> Self {
        Self {
            regs: IocpuRegs::new(),
            local: LocalMemory::new(local_size),
            host_memory,
            host_interrupts,
            devices: DeviceTable::new(device_capacity),
            running: false,
        }
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.regs.set_pc(pc);
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Read a data word through the local/host bridge: addresses at or
    /// below [`LOCAL_ADDR_MASK`] hit local memory; addresses above it
    /// are rebased into the host's 27-bit space and read with
    /// supervisor key 0, returning 0 on any fault (§4.3: "returning 0 on
    /// bus error").
    fn load_data(&mut self, addr: u32) -> u32 {
        if addr <= LOCAL_ADDR_MASK {
            self.local.read(addr) & WORD18_MASK
        } else {
            let host_addr = (addr - HOST_BASE) & ADDR_MASK;
            match self.host_memory.lock().unwrap().read(0, host_addr) {
                MemResult::Ok(w) => (w as u32) & WORD18_MASK,
                _ => 0,
            }
        }
    }

    fn store_data(&mut self, addr: u32, value: u32) {
        if addr <= LOCAL_ADDR_MASK {
            self.local.write(addr, value & WORD18_MASK);
        } else {
            let host_addr = (addr - HOST_BASE) & ADDR_MASK;
            let _ = self.host_memory.lock().unwrap().write(0, host_addr, u64::from(value & WORD18_MASK));
        }
    }

    fn exec_mr(&mut self, op: MrOp, ea: crate::decode::EaTail18) -> Control {
        let addr = compute_effective_address(ea, self.regs.ac, self.regs.pc, &mut self.local);
        match op {
            MrOp::And => {
                let v = self.load_data(addr);
                self.regs.set_ac(self.regs.ac & v);
                Control::Next
            }
            MrOp::Tad => {
                let v = self.load_data(addr);
                let sum = u64::from(self.regs.ac) + u64::from(v);
                if sum > u64::from(WORD18_MASK) {
                    self.regs.link = !self.regs.link;
                }
                self.regs.set_ac(sum as u32);
                Control::Next
            }
            MrOp::Isz => {
                let v = self.load_data(addr).wrapping_add(1) & WORD18_MASK;
                self.store_data(addr, v);
                if v == 0 {
                    Control::Skip
                } else {
                    Control::Next
                }
            }
            MrOp::Dca => {
                self.store_data(addr, self.regs.ac);
                self.regs.set_ac(0);
                Control::Next
            }
            MrOp::Jms => {
                self.store_data(addr, self.regs.pc.wrapping_add(1));
                Control::Jump(addr.wrapping_add(1))
            }
            MrOp::Jmp => Control::Jump(addr),
        }
    }

    fn exec_io(&mut self, device: u8, ctl: u8, transfer: u8) -> Control {
        use ist66_core::{status_ctl, transfer as xfer};

        let Ok(result) = self.devices.io(device as usize, u64::from(self.regs.ac), ctl, transfer) else {
            return Control::Next;
        };

        if transfer == xfer::STATUS {
            let busy = result & 1 != 0;
            let done = (result >> 1) & 1 != 0;
            let skip = match ctl {
                status_ctl::SKIP_IF_BUSY => busy,
                status_ctl::SKIP_IF_NOT_BUSY => !busy,
                status_ctl::SKIP_IF_DONE => done,
                status_ctl::SKIP_IF_NOT_DONE => !done,
                _ => false,
            };
            return if skip { Control::Skip } else { Control::Next };
        }
        if transfer <= xfer::MAX_INPUT && transfer % 2 == 0 {
            self.regs.set_ac(self.regs.ac | (result as u32));
        }
        Control::Next
    }

    fn exec_opr0(&mut self, flags: crate::decode::Opr0) -> Control {
        if flags.cla {
            self.regs.ac = 0;
        }
        if flags.cll {
            self.regs.link = false;
        }
        if flags.cma {
            self.regs.ac = (!self.regs.ac) & WORD18_MASK;
        }
        if flags.cml {
            self.regs.link = !self.regs.link;
        }
        if flags.iac {
            let new = self.regs.ac.wrapping_add(1);
            if new > WORD18_MASK {
                self.regs.link = !self.regs.link;
            }
            self.regs.ac = new & WORD18_MASK;
        }
        if flags.ral {
            let combined = (u32::from(self.regs.link) << 18) | self.regs.ac;
            let rotated = ((combined << 1) | (combined >> 18)) & 0x7_FFFF;
            self.regs.ac = rotated & WORD18_MASK;
            self.regs.link = (rotated >> 18) & 1 != 0;
        }
        if flags.rar {
            let combined = (u32::from(self.regs.link) << 18) | self.regs.ac;
            let rotated = ((combined >> 1) | (combined << 18)) & 0x7_FFFF;
            self.regs.ac = rotated & WORD18_MASK;
            self.regs.link = (rotated >> 18) & 1 != 0;
        }
        Control::Next
    }

    fn exec_opr1(&mut self, flags: crate::decode::Opr1) -> Control {
        let mut test = false;
        if flags.sma {
            test |= self.regs.ac & (1 << 17) != 0;
        }
        if flags.sza {
            test |= self.regs.ac == 0;
        }
        if flags.snl {
            test |= self.regs.link;
        }
        if flags.reverse {
            test = !test;
        }
        if flags.cla {
            self.regs.ac = 0;
        }
        if test {
            Control::Skip
        } else {
            Control::Next
        }
    }

    fn exec_opr3(&mut self, op: Opr3) -> Control {
        match op {
            Opr3::Api => {
                self.host_interrupts.assert(self.regs.c_irq);
                Control::Next
            }
            Opr3::Ldcirq => {
                self.regs.c_irq = (self.regs.ac & 0xF) as u8;
                Control::Next
            }
            Opr3::Hlt => Control::Halt,
        }
    }

    fn apply(&mut self, control: Control) -> StepOutcome {
        match control {
            Control::Next => {
                self.regs.set_pc(self.regs.pc.wrapping_add(1));
                StepOutcome::Continue
            }
            Control::Skip => {
                self.regs.set_pc(self.regs.pc.wrapping_add(2));
                StepOutcome::Continue
            }
            Control::Jump(addr) => {
                self.regs.set_pc(addr);
                StepOutcome::Continue
            }
            Control::Halt => {
                self.running = false;
                StepOutcome::Halted
            }
        }
    }

    /// Fetch, decode, and execute one instruction.
    pub fn step(&mut self) -> StepOutcome {
        let word = self.local.read(self.regs.pc) & WORD18_MASK;
        let control = match decode(word) {
            Instruction::Mr { op, ea } => self.exec_mr(op, ea),
            Instruction::Io { device, ctl, transfer } => self.exec_io(device, ctl, transfer),
            Instruction::Opr0(flags) => self.exec_opr0(flags),
            Instruction::Opr1(flags) => self.exec_opr1(flags),
            Instruction::Opr3(op) => self.exec_opr3(op),
            Instruction::Illegal => Control::Next,
        };
        self.apply(control)
    }

    /// Run until `HLT` (`OPR3`'s halt op) stops the loop.
    pub fn run(&mut self) {
        self.running = true;
        while self.running {
            self.step();
        }
    }

    /// Deposit a word directly into local memory, bypassing instruction
    /// fetch — used by the boot/loader surface.
    pub fn deposit_local(&mut self, addr: u32, value: u32) {
        self.local.write(addr, value);
    }

    #[must_use]
    pub fn peek_local(&self, addr: u32) -> u32 {
        self.local.read(addr)
    }
}

const QUERY_PATHS: &[&str] = &["ac", "link", "pc", "c_irq", "running"];

impl Observable for Iocpu {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "ac" => Some(Value::U32(self.regs.ac)),
            "link" => Some(Value::Bool(self.regs.link)),
            "pc" => Some(Value::U32(self.regs.pc)),
            "c_irq" => Some(Value::U8(self.regs.c_irq)),
            "running" => Some(Value::Bool(self.running)),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iocpu() -> Iocpu {
        let mem = Arc::new(Mutex::new(MemoryUnit::new(8192)));
        let ic = Arc::new(InterruptController::new());
        Iocpu::new(0x1000, mem, ic, 16)
    }

    fn word(opcode: u32, tail: u32) -> u32 {
        (opcode << 15) | (tail & 0x7FFF)
    }

    #[test]
    fn and_masks_accumulator_with_memory() {
        let mut c = iocpu();
        c.deposit_local(0, word(0, (1 << 13) | 0o20)); // AND zero-page 020
        c.deposit_local(0o20, 0o017);
        c.regs.ac = 0o371;
        c.set_pc(0);
        c.step();
        assert_eq!(c.regs.ac, 0o017 & 0o371);
    }

    #[test]
    fn tad_toggles_link_on_overflow() {
        let mut c = iocpu();
        c.deposit_local(0, word(1, (1 << 13) | 0o20));
        c.deposit_local(0o20, WORD18_MASK);
        c.regs.ac = 1;
        c.set_pc(0);
        c.step();
        assert_eq!(c.regs.ac, 0);
        assert!(c.regs.link);
    }

    #[test]
    fn isz_skips_when_result_is_zero() {
        let mut c = iocpu();
        c.deposit_local(0, word(2, (1 << 13) | 0o20));
        c.deposit_local(0o20, WORD18_MASK);
        c.set_pc(0);
        c.step();
        assert_eq!(c.regs.pc, 2);
        assert_eq!(c.peek_local(0o20), 0);
    }

    #[test]
    fn jms_stages_return_address_then_jumps_past_it() {
        let mut c = iocpu();
        c.deposit_local(0o100, word(4, (1 << 13) | 0o40));
        c.set_pc(0o100);
        c.step();
        assert_eq!(c.peek_local(0o40), 0o101);
        assert_eq!(c.regs.pc, 0o41);
    }

    #[test]
    fn opr0_cma_iac_negates_accumulator() {
        let mut c = iocpu();
        c.deposit_local(0, word(7, (1 << 9) | (1 << 7))); // CMA, IAC
        c.regs.ac = 5;
        c.set_pc(0);
        c.step();
        assert_eq!(c.regs.ac, (WORD18_MASK + 1 - 5) & WORD18_MASK);
    }

    #[test]
    fn opr1_sza_skips_on_zero_accumulator() {
        let mut c = iocpu();
        c.deposit_local(0, word(7, (1 << 13) | (1 << 10))); // group 1, SZA
        c.regs.ac = 0;
        c.set_pc(0);
        c.step();
        assert_eq!(c.regs.pc, 2);
    }

    #[test]
    fn api_asserts_the_host_irq_at_c_irq_level() {
        let mut c = iocpu();
        c.host_interrupts.set_mask(0xFFFF);
        c.regs.c_irq = 5;
        c.deposit_local(0, word(7, (3 << 13))); // group 3, Api
        c.set_pc(0);
        c.step();
        assert_eq!(c.host_interrupts.min_pending(), 5);
    }

    #[test]
    fn hlt_stops_the_run_loop() {
        let mut c = iocpu();
        c.deposit_local(0, word(7, (3 << 13) | 2)); // group 3, Hlt
        c.set_pc(0);
        c.run();
        assert!(!c.is_running());
    }

    #[test]
    fn data_reference_above_local_window_reaches_host_memory() {
        let mut c = iocpu();
        c.host_memory.lock().unwrap().deposit(5, 0o123);
        // Stage a pointer at an autoindex slot one below the host boundary,
        // then dereference it indirectly: the increment carries it across.
        c.deposit_local(10, HOST_BASE - 1 + 5);
        let ea = crate::decode::EaTail18 { indirect: true, zero_page: true, indexed: false, disp: 10 };
        let addr = compute_effective_address(ea, 0, 0, &mut c.local);
        assert_eq!(c.load_data(addr), 0o123);
    }
}
