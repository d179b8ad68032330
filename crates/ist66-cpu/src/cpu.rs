//! The CPU's execution loop (§4.2): interrupt/exception entry and return,
//! the fetch-decode-execute cycle, and the deferred-write commit point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ist66_core::{InterruptController, MemoryUnit, Observable, Value, ADDR_MASK, WORD_MASK};
use ist66_fpu::Extended80;

use crate::decode::decode;
use crate::exception::Fault;
use crate::exec::Control;
use crate::registers::{ctl, RegisterFile};
use ist66_core::DeviceTable;

/// The current-IRQL field is a nibble (`registers::RegisterFile`), so 15
/// is its natural "nothing preempts me" sentinel — the same role
/// `ist66_core::interrupt::NO_IRQ` plays for `min_pending`. A freshly
/// created CPU starts here so any masked-in interrupt can reach it.
const BASE_LEVEL: u8 = 15;

/// A word synthesized by `EDT`/`ESK`, to be decoded and executed in place
/// of the next ordinary fetch. `ExecuteAndSkip` additionally bumps `PC` by
/// one after the synthesized instruction runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingExecute {
    Execute(u64),
    ExecuteAndSkip(u64),
}

/// What one call to [`Cpu::step`] accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The loop made progress; call `step` again.
    Continue,
    /// The CPU executed `HLT` with this stop code.
    Halted(u32),
    /// The execution loop has nothing left to do: not running, no
    /// enabled IRQ pending, and shutdown was requested.
    Terminated,
}

/// Shared handle to the word memory, passed to both the CPU and the
/// IOCPU. A `Mutex` stands in for the source's single-logical-writer
/// discipline (§5) — Rust requires synchronized access across threads
/// even though at most one of {CPU, IOCPU} is expected to write any
/// given word at a time.
pub type SharedMemory = Arc<Mutex<MemoryUnit>>;

/// The main CPU: register file, memory handle, interrupt controller
/// handle, and this CPU's own device table.
pub struct Cpu {
    pub regs: RegisterFile,
    pub memory: SharedMemory,
    pub interrupts: Arc<InterruptController>,
    pub devices: DeviceTable,
    pub(crate) deferred_write: Option<crate::address::DeferredWrite>,
    pub(crate) pending_execute: Option<PendingExecute>,
    pub(crate) fpu_enabled: bool,
    last_stop_code: Option<u32>,
}

impl Cpu {
    #[must_use]
    pub fn new(memory: SharedMemory, interrupts: Arc<InterruptController>, device_capacity: usize) -> Self {
        let mut regs = RegisterFile::new();
        regs.set_current_irql(BASE_LEVEL);
        Self {
            regs,
            memory,
            interrupts,
            devices: DeviceTable::new(device_capacity),
            deferred_write: None,
            pending_execute: None,
            fpu_enabled: true,
            last_stop_code: None,
        }
    }

    /// Disable the FPU surface; FP-family instructions then raise `NFPU`.
    pub fn set_fpu_enabled(&mut self, enabled: bool) {
        self.fpu_enabled = enabled;
    }

    /// The stop code of the most recent `HLT`, if any.
    #[must_use]
    pub fn last_stop_code(&self) -> Option<u32> {
        self.last_stop_code
    }

    /// Seed the program counter, e.g. from the boot/loader surface.
    pub fn set_pc(&mut self, pc: u32) {
        self.regs.set_pc(pc);
    }

    fn raw_load(&self, addr: u32) -> u64 {
        self.memory.lock().unwrap().read(0, addr).ok().unwrap_or(0)
    }

    fn raw_store(&self, addr: u32, value: u64) {
        let _ = self.memory.lock().unwrap().write(0, addr, value);
    }

    /// Discard all deferred state: the staged indirect auto-mod write and
    /// any armed `EDT`/`ESK` synthesized instruction. Invariant (§3, §7):
    /// always a no-op from the caller's perspective on exception entry.
    fn clear_deferred_state(&mut self) {
        self.deferred_write = None;
        self.pending_execute = None;
    }

    /// Common interrupt/exception entry (§4.4): save `{PSW, CW}` to the
    /// level-indexed vector slot, load the new `PSW`/`CW` from the
    /// interrupt's vector template, and discard deferred state.
    fn enter_interrupt(&mut self, irq: u8) {
        let current = self.regs.current_irql();
        let save_base = 32 + 2 * u32::from(current);
        self.raw_store(save_base, self.regs.ctl[ctl::PSW]);
        self.raw_store(save_base + 1, self.regs.ctl[ctl::CW]);

        let template_psw = self.raw_load(2 * u32::from(irq)) & WORD_MASK;
        let template_cw_low18 = self.raw_load(2 * u32::from(irq) + 1) & ((1u64 << 18) - 1);

        self.regs.ctl[ctl::CW] = template_cw_low18;
        self.regs.set_current_irql(irq);
        self.regs.set_prior_irql(current);
        self.regs.ctl[ctl::PSW] = template_psw;

        self.clear_deferred_state();
    }

    /// Exception entry (§4.4): interrupt entry at IRQ 0, with the 4-bit
    /// cause written into the field `enter_interrupt` just used for the
    /// prior IRQ level — the two share storage by design (see
    /// `registers::RegisterFile::cause`, and Open Question 1 in
    /// `DESIGN.md`).
    pub(crate) fn do_except(&mut self, fault: Fault) {
        self.enter_interrupt(0);
        self.regs.set_cause(fault.0.as_nibble());
    }

    /// `RFI`/`RMSK` (§4.4): restore `{PSW, CW}` from the save slot
    /// indexed by the current `CW`'s prior-IRQL field.
    pub(crate) fn return_from_interrupt(&mut self) {
        let prior = self.regs.prior_irql();
        let save_base = 32 + 2 * u32::from(prior);
        self.regs.ctl[ctl::PSW] = self.raw_load(save_base) & WORD_MASK;
        self.regs.ctl[ctl::CW] = self.raw_load(save_base + 1) & WORD_MASK;
        self.clear_deferred_state();
    }

    fn apply_control(&mut self, control: Control) {
        match control {
            Control::Next => self.regs.set_pc(self.regs.pc().wrapping_add(1) & ADDR_MASK),
            Control::Skip => self.regs.set_pc(self.regs.pc().wrapping_add(2) & ADDR_MASK),
            Control::Jump(addr) => self.regs.set_pc(addr & ADDR_MASK),
            Control::Halt(_) => unreachable!("handled by the caller before apply_control"),
        }
    }

    /// Commit a staged indirect auto-mod write (§3's "Deferred memory
    /// write"), if the just-executed instruction armed one.
    fn commit_deferred(&mut self) -> Result<(), Fault> {
        if let Some((addr, value)) = self.deferred_write.take() {
            self.store(addr, value)?;
        }
        Ok(())
    }

    fn run_pending_execute(&mut self, pending: PendingExecute) -> StepOutcome {
        let (word, extra_skip) = match pending {
            PendingExecute::Execute(w) => (w, false),
            PendingExecute::ExecuteAndSkip(w) => (w, true),
        };
        let instr = decode(word);
        match self.execute(instr) {
            Ok(Control::Halt(code)) => {
                self.interrupts.set_running(false);
                self.last_stop_code = Some(code);
                StepOutcome::Halted(code)
            }
            Ok(control) => {
                self.apply_control(control);
                if extra_skip {
                    self.regs.set_pc(self.regs.pc().wrapping_add(1) & ADDR_MASK);
                }
                if let Err(fault) = self.commit_deferred() {
                    self.do_except(fault);
                }
                StepOutcome::Continue
            }
            Err(fault) => {
                self.deferred_write = None;
                self.do_except(fault);
                StepOutcome::Continue
            }
        }
    }

    fn fetch_and_execute(&mut self) -> StepOutcome {
        let pc = self.regs.pc();
        match self.load(pc) {
            Ok(word) => {
                let instr = decode(word);
                match self.execute(instr) {
                    Ok(Control::Halt(code)) => {
                        self.interrupts.set_running(false);
                        self.last_stop_code = Some(code);
                        StepOutcome::Halted(code)
                    }
                    Ok(control) => {
                        self.apply_control(control);
                        if let Err(fault) = self.commit_deferred() {
                            self.do_except(fault);
                        }
                        StepOutcome::Continue
                    }
                    Err(fault) => {
                        self.deferred_write = None;
                        self.do_except(fault);
                        StepOutcome::Continue
                    }
                }
            }
            Err(fault) => {
                self.do_except(fault);
                StepOutcome::Continue
            }
        }
    }

    /// One iteration of the execution loop (§4.2 steps 1-5). Blocks the
    /// calling thread when the CPU has halted and no unmasked IRQ is
    /// pending; returns [`StepOutcome::Terminated`] once shutdown was
    /// requested and there is nothing left pending.
    pub fn step(&mut self) -> StepOutcome {
        if let Some(pending) = self.pending_execute.take() {
            return self.run_pending_execute(pending);
        }

        let min_pending = self.interrupts.min_pending();
        if min_pending < self.regs.current_irql() {
            self.enter_interrupt(min_pending);
            return StepOutcome::Continue;
        }

        if self.interrupts.is_running() {
            return self.fetch_and_execute();
        }

        if self.interrupts.is_exiting() || self.interrupts.mask() == 0 {
            return StepOutcome::Terminated;
        }

        self.interrupts.wait_while_idle();
        StepOutcome::Continue
    }

    /// Run the execution loop until shutdown is requested, returning the
    /// most recent `HLT` stop code (if any) observed along the way.
    pub fn run(&mut self) -> Option<u32> {
        loop {
            match self.step() {
                StepOutcome::Continue | StepOutcome::Halted(_) => {}
                StepOutcome::Terminated => break,
            }
        }
        self.last_stop_code
    }
}

fn float_value(x: Extended80) -> Value {
    let mut map = HashMap::new();
    map.insert("sign".to_string(), Value::Bool(x.sign));
    map.insert("exponent".to_string(), Value::U16(x.exponent));
    map.insert("significand".to_string(), Value::U64(x.significand));
    Value::Map(map)
}

const QUERY_PATHS: &[&str] = &["pc", "psw", "cw", "carry", "key", "irql", "stop_code"];

impl Observable for Cpu {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(n) = path.strip_prefix("ac.") {
            let idx: usize = n.parse().ok()?;
            return self.regs.ac.get(idx).map(|v| Value::U64(*v));
        }
        if let Some(n) = path.strip_prefix("fac.") {
            let idx: usize = n.parse().ok()?;
            return self.regs.fac.get(idx).map(|x| float_value(*x));
        }
        match path {
            "pc" => Some(Value::U32(self.regs.pc())),
            "psw" => Some(Value::U64(self.regs.ctl[ctl::PSW])),
            "cw" => Some(Value::U64(self.regs.ctl[ctl::CW])),
            "carry" => Some(Value::Bool(self.regs.carry())),
            "key" => Some(Value::U8(self.regs.key())),
            "irql" => Some(Value::U8(self.regs.current_irql())),
            "stop_code" => self.last_stop_code.map(Value::U32),
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
    use crate::exception::Cause;

    fn cpu() -> Cpu {
        let mem = Arc::new(Mutex::new(MemoryUnit::new(8192)));
        let ic = Arc::new(InterruptController::new());
        Cpu::new(mem, ic, 16)
    }

    fn store(c: &Cpu, addr: u32, value: u64) {
        c.memory.lock().unwrap().deposit(addr, value);
    }

    #[test]
    fn halt_instruction_stops_and_reports_code() {
        let mut c = cpu();
        // SMI family opcode 0600 (HLT), tail = stop code.
        store(&c, 0, (0o600u64 << 27) | 1);
        c.set_pc(0);
        c.interrupts.set_running(true);
        let outcome = c.step();
        assert_eq!(outcome, StepOutcome::Halted(1));
        assert_eq!(c.last_stop_code(), Some(1));
    }

    #[test]
    fn exception_entry_saves_and_reloads_psw_cw_and_sets_cause() {
        let mut c = cpu();
        // Illegal instruction at PC=0 (opcode in an unused range raises INST).
        store(&c, 0, 0o500u64 << 27);
        c.set_pc(0);
        c.interrupts.set_running(true);
        let outcome = c.step();
        assert_eq!(outcome, StepOutcome::Continue);
        assert_eq!(c.regs.current_irql(), 0);
        assert_eq!(c.regs.cause(), Cause::Inst.as_nibble());
    }

    #[test]
    fn rfi_restores_saved_state() {
        let mut c = cpu();
        c.regs.set_current_irql(15);
        c.set_pc(0o1000);
        c.enter_interrupt(3);
        assert_eq!(c.regs.current_irql(), 3);
        assert_eq!(c.regs.prior_irql(), 15);
        c.return_from_interrupt();
        assert_eq!(c.regs.current_irql(), 15);
        assert_eq!(c.regs.pc(), 0o1000);
    }

    #[test]
    fn interrupt_preempts_only_when_strictly_lower_than_current_level() {
        let mut c = cpu();
        c.interrupts.set_mask(0xFFFF);
        c.regs.set_current_irql(15);
        c.interrupts.assert(14);
        c.step();
        assert_eq!(c.regs.current_irql(), 14);

        c.interrupts.assert(14);
        let before = c.regs.current_irql();
        c.step();
        assert_eq!(c.regs.current_irql(), before, "same-level IRQ must not preempt");
    }

    #[test]
    fn terminates_when_halted_with_no_enabled_irq() {
        let mut c = cpu();
        c.interrupts.set_running(false);
        assert_eq!(c.step(), StepOutcome::Terminated);
    }
}
