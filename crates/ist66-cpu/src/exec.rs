//! Instruction execution (§4.2): one function per family, dispatched from
//! [`crate::cpu::Cpu::execute`]. Each family function returns the control
//! transfer its instruction produces; the caller applies it to `PC`.
//!
//! A handful of per-op semantics are this implementation's own choice where
//! the source prose names only the mnemonic, not its effect — see the
//! per-op comments below. The two places where the source text pins an
//! exact behavior (CLM/RTM's push/pop order and atomicity, the AA family's
//! alternate-destination reinterpretation of `mk`) are honored exactly.

use crate::address::{compute_effective_address, DeferredWrite};
use crate::cpu::{Cpu, PendingExecute};
use crate::decode::{AmOp, EaTail, FpOp, Instruction, MdOp, MrOp, SmiOp};
use crate::exception::{Cause, Fault, FaultResult};
use ist66_alu::{AluInput, AluOutput, RotateWidth};
use ist66_core::{MemResult, ADDR_MASK, WORD_MASK};
use ist66_fpu::Extended80;

/// Negate an extended-80 value for use as the `b` operand of a
/// subtraction expressed as `add(a, negate(b))`. Flipping the sign bit of
/// a zero would produce `(sign=1, exponent=0, significand=0)`, which per
/// §3's encoding rule is a NaN, not "negative zero" — this format has no
/// negative zero, so zero's sign is left alone.
fn fpu_negate(x: Extended80) -> Extended80 {
    if x.is_zero() {
        x
    } else {
        Extended80 { sign: !x.sign, ..x }
    }
}

/// What an executed instruction does to `PC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// `PC += 1`.
    Next,
    /// `PC += 2` (a skip condition fired).
    Skip,
    /// `PC = addr` (a jump, call, or return).
    Jump(u32),
    /// The CPU halts with this stop code.
    Halt(u32),
}

fn sign_extend36(v: u64) -> i64 {
    let v = (v & WORD_MASK) as i64;
    if v & (1 << 35) != 0 {
        v - (1 << 36)
    } else {
        v
    }
}

fn pack72(v: i128) -> (u64, u64) {
    let bits = (v as u128) & ((1u128 << 72) - 1);
    let hi = ((bits >> 36) & u128::from(WORD_MASK)) as u64;
    let lo = (bits & u128::from(WORD_MASK)) as u64;
    (hi, lo)
}

fn unpack72_signed(hi: u64, lo: u64) -> i128 {
    let bits = (u128::from(hi & WORD_MASK) << 36) | u128::from(lo & WORD_MASK);
    if bits & (1 << 71) != 0 {
        (bits as i128) - (1i128 << 72)
    } else {
        bits as i128
    }
}

impl Cpu {
    fn ea(&mut self, tail: EaTail) -> FaultResult<(u32, Option<DeferredWrite>)> {
        let key = self.regs.key();
        let pc = self.regs.pc();
        let dpb = self.regs.direct_page_base();
        let mem = self.memory.lock().unwrap();
        compute_effective_address(tail, &mut self.regs.ac, pc, dpb, key, &mem)
    }

    pub(crate) fn load(&self, addr: u32) -> FaultResult<u64> {
        match self.memory.lock().unwrap().read(self.regs.key(), addr) {
            MemResult::Ok(w) => Ok(w),
            MemResult::MemFault => Err(Fault(Cause::Memx)),
            MemResult::KeyFault => Err(Fault(Cause::Ppfr)),
        }
    }

    pub(crate) fn store(&mut self, addr: u32, value: u64) -> FaultResult<()> {
        let key = self.regs.key();
        match self.memory.lock().unwrap().write(key, addr, value) {
            MemResult::Ok(_) => Ok(()),
            MemResult::MemFault => Err(Fault(Cause::Memx)),
            MemResult::KeyFault => Err(Fault(Cause::Ppfw)),
        }
    }

    fn require_supervisor(&self) -> FaultResult<()> {
        if self.regs.key() == 0 {
            Ok(())
        } else {
            Err(Fault(Cause::Ppfs))
        }
    }

    pub(crate) fn execute(&mut self, instr: Instruction) -> FaultResult<Control> {
        match instr {
            Instruction::Mr { op, ea } => self.exec_mr(op, ea),
            Instruction::Am { op, ac, ea } => self.exec_am(op, ac, ea),
            Instruction::Md { op, ac, ac2 } => self.exec_md(op, ac, ac2),
            Instruction::Fp(op) => self.exec_fp(op),
            Instruction::Clm { ea } => self.exec_clm(ea),
            Instruction::Rtm { ea } => self.exec_rtm(ea),
            Instruction::Smi(op) => self.exec_smi(op),
            Instruction::Io1 { device, ctl, transfer, ac } => self.exec_io1(device, ctl, transfer, ac),
            Instruction::Aa { op, ci, cond, no_load, rotate_wide, mk, rt, a_ac, b_ac, dest_alt } => {
                self.exec_aa(op, ci, cond, no_load, rotate_wide, mk, rt, a_ac, b_ac, dest_alt)
            }
            Instruction::Illegal => Err(Fault(Cause::Inst)),
        }
    }

    fn exec_mr(&mut self, op: MrOp, tail: EaTail) -> FaultResult<Control> {
        let (addr, deferred) = self.ea(tail)?;
        self.arm_deferred(deferred);
        match op {
            MrOp::Jmp => Ok(Control::Jump(addr)),
            MrOp::Jsr => {
                let ret = self.regs.pc().wrapping_add(1);
                self.store(addr, u64::from(ret))?;
                Ok(Control::Jump(addr.wrapping_add(1)))
            }
            MrOp::Isz => {
                let v = self.load(addr)?.wrapping_add(1) & WORD_MASK;
                self.store(addr, v)?;
                Ok(if v == 0 { Control::Skip } else { Control::Next })
            }
            MrOp::Dsz => {
                let v = self.load(addr)?.wrapping_sub(1) & WORD_MASK;
                self.store(addr, v)?;
                Ok(if v == 0 { Control::Skip } else { Control::Next })
            }
        }
    }

    /// `ea`'s computed address doubles as the loaded value for `MOVEA`/
    /// `ADDEA`: these two ops treat the effective address itself as an
    /// operand, the way a `LEA` would, rather than dereferencing it.
    fn exec_am(&mut self, op: AmOp, ac: u8, tail: EaTail) -> FaultResult<Control> {
        let (addr, deferred) = self.ea(tail)?;
        self.arm_deferred(deferred);
        let idx = ac as usize;
        match op {
            AmOp::Edt => {
                let word = self.load(addr)?;
                self.pending_execute = Some(PendingExecute::Execute(word));
                Ok(Control::Next)
            }
            AmOp::Esk => {
                let word = self.load(addr)?;
                self.pending_execute = Some(PendingExecute::ExecuteAndSkip(word));
                Ok(Control::Next)
            }
            AmOp::Movea => {
                self.regs.ac[idx] = u64::from(addr);
                Ok(Control::Next)
            }
            AmOp::Addea => {
                self.regs.ac[idx] = self.regs.ac[idx].wrapping_add(u64::from(addr)) & WORD_MASK;
                Ok(Control::Next)
            }
            AmOp::Ise => {
                let v = self.load(addr)?.wrapping_add(1) & WORD_MASK;
                self.store(addr, v)?;
                Ok(if v == self.regs.ac[idx] { Control::Skip } else { Control::Next })
            }
            AmOp::Dse => {
                let v = self.load(addr)?.wrapping_sub(1) & WORD_MASK;
                self.store(addr, v)?;
                Ok(if v == self.regs.ac[idx] { Control::Skip } else { Control::Next })
            }
            AmOp::Moveas => {
                let v = self.load(addr)?;
                self.regs.ac[idx] = v;
                Ok(if v == 0 { Control::Skip } else { Control::Next })
            }
            AmOp::Ldcom => {
                self.regs.ac[idx] = (!self.load(addr)?) & WORD_MASK;
                Ok(Control::Next)
            }
            AmOp::Ldneg => {
                let v = self.load(addr)?;
                self.regs.ac[idx] = v.wrapping_neg() & WORD_MASK;
                Ok(Control::Next)
            }
            AmOp::Lda => {
                self.regs.ac[idx] = self.load(addr)?;
                Ok(Control::Next)
            }
            AmOp::Sta => {
                let v = self.regs.ac[idx];
                self.store(addr, v)?;
                Ok(Control::Next)
            }
            AmOp::Adcm => {
                let v = (self.load(addr)?.wrapping_add(self.regs.ac[idx]).wrapping_add(u64::from(self.regs.carry()))) & WORD_MASK;
                self.store(addr, v)?;
                Ok(Control::Next)
            }
            AmOp::Subm => {
                let v = self.load(addr)?.wrapping_sub(self.regs.ac[idx]) & WORD_MASK;
                self.store(addr, v)?;
                Ok(Control::Next)
            }
            AmOp::Addm => {
                let v = self.load(addr)?.wrapping_add(self.regs.ac[idx]) & WORD_MASK;
                self.store(addr, v)?;
                Ok(Control::Next)
            }
            AmOp::Andm => {
                let v = self.load(addr)? & self.regs.ac[idx];
                self.store(addr, v)?;
                Ok(Control::Next)
            }
            AmOp::Orm => {
                let v = self.load(addr)? | self.regs.ac[idx];
                self.store(addr, v)?;
                Ok(Control::Next)
            }
            AmOp::Xorm => {
                let v = self.load(addr)? ^ self.regs.ac[idx];
                self.store(addr, v)?;
                Ok(Control::Next)
            }
        }
    }

    fn exec_md(&mut self, op: MdOp, ac: u8, ac2: u8) -> FaultResult<Control> {
        let (i, j) = (ac as usize, ac2 as usize);
        match op {
            MdOp::Mpy => {
                let product = i128::from(sign_extend36(self.regs.ac[i])) * i128::from(sign_extend36(self.regs.ac[j]));
                let (hi, lo) = pack72(product);
                self.regs.ac[i] = hi;
                self.regs.ac[j] = lo;
                Ok(Control::Next)
            }
            MdOp::Mpa => {
                let product = i128::from(sign_extend36(self.regs.ac[i])) * i128::from(sign_extend36(self.regs.ac[j]));
                let acc = unpack72_signed(self.regs.ac[i], self.regs.ac[j]);
                let (hi, lo) = pack72(acc + product);
                self.regs.ac[i] = hi;
                self.regs.ac[j] = lo;
                Ok(Control::Next)
            }
            MdOp::Mna => {
                let product = i128::from(sign_extend36(self.regs.ac[i])) * i128::from(sign_extend36(self.regs.ac[j]));
                let acc = unpack72_signed(self.regs.ac[i], self.regs.ac[j]);
                let (hi, lo) = pack72(acc - product);
                self.regs.ac[i] = hi;
                self.regs.ac[j] = lo;
                Ok(Control::Next)
            }
            MdOp::Div => {
                let divisor = sign_extend36(self.regs.ac[j]);
                if divisor == 0 {
                    return Err(Fault(Cause::Divz));
                }
                let dividend = sign_extend36(self.regs.ac[i]);
                let quotient = dividend / divisor;
                let remainder = dividend % divisor;
                self.regs.ac[i] = (quotient as u64) & WORD_MASK;
                self.regs.ac[j] = (remainder as u64) & WORD_MASK;
                Ok(Control::Next)
            }
        }
    }

    /// The FPU surface (§4.6) wired onto nine opcodes reserved for it (see
    /// `decode::FpOp`). Raises `NFPU` if the FPU was configured absent.
    fn exec_fp(&mut self, op: FpOp) -> FaultResult<Control> {
        if !self.fpu_enabled {
            return Err(Fault(Cause::Nfpu));
        }
        match op {
            FpOp::Ldf36 { fac, ea } => {
                let (addr, deferred) = self.ea(ea)?;
                self.arm_deferred(deferred);
                let word = self.load(addr)?;
                let (ext, _flags) = ist66_fpu::float36_to_extended80(word);
                self.regs.fac[fac as usize] = ext;
                Ok(Control::Next)
            }
            FpOp::Stf36 { fac, ea } => {
                let (addr, deferred) = self.ea(ea)?;
                self.arm_deferred(deferred);
                let (word, _flags) = ist66_fpu::extended80_to_float36(self.regs.fac[fac as usize], true);
                self.store(addr, word)?;
                Ok(Control::Next)
            }
            FpOp::Ldf72 { fac, ea } => {
                let (addr, deferred) = self.ea(ea)?;
                self.arm_deferred(deferred);
                let w0 = self.load(addr)?;
                let w1 = self.load(addr.wrapping_add(1) & ADDR_MASK)?;
                let (ext, _flags) = ist66_fpu::float72_to_extended80(w0, w1);
                self.regs.fac[fac as usize] = ext;
                Ok(Control::Next)
            }
            FpOp::Stf72 { fac, ea } => {
                let (addr, deferred) = self.ea(ea)?;
                self.arm_deferred(deferred);
                let (w0, w1, _flags) = ist66_fpu::extended80_to_float72(self.regs.fac[fac as usize]);
                self.store(addr, w0)?;
                self.store(addr.wrapping_add(1) & ADDR_MASK, w1)?;
                Ok(Control::Next)
            }
            FpOp::Fad { dst, src } => {
                let (result, _flags) = ist66_fpu::add(self.regs.fac[dst as usize], self.regs.fac[src as usize]);
                self.regs.fac[dst as usize] = result;
                Ok(Control::Next)
            }
            FpOp::Fsb { dst, src } => {
                let negated = fpu_negate(self.regs.fac[src as usize]);
                let (result, _flags) = ist66_fpu::add(self.regs.fac[dst as usize], negated);
                self.regs.fac[dst as usize] = result;
                Ok(Control::Next)
            }
            FpOp::Fmu { dst, src } => {
                let (result, _flags) = ist66_fpu::multiply(self.regs.fac[dst as usize], self.regs.fac[src as usize]);
                self.regs.fac[dst as usize] = result;
                Ok(Control::Next)
            }
            FpOp::Fdv { dst, src } => {
                if self.regs.fac[src as usize].is_zero() {
                    return Err(Fault(Cause::Divz));
                }
                let (result, _flags) = ist66_fpu::divide(self.regs.fac[dst as usize], self.regs.fac[src as usize]);
                self.regs.fac[dst as usize] = result;
                Ok(Control::Next)
            }
            FpOp::Fmov { dst, src } => {
                self.regs.fac[dst as usize] = self.regs.fac[src as usize];
                Ok(Control::Next)
            }
        }
    }

    /// Push order descends the mask's bit index (15 down to 0); combined
    /// with `AC[15-n]` this pushes low-numbered accumulators first. Any
    /// fault partway through leaves every register untouched — the pushes
    /// are staged locally and only committed once the whole sequence
    /// succeeds.
    fn exec_clm(&mut self, tail: EaTail) -> FaultResult<Control> {
        let (ea_addr, deferred) = self.ea(tail)?;
        let mask = self.load(ea_addr)? & 0xFFFF;

        let mut sp = self.regs.ac[13];
        let mut writes: Vec<(u32, u64)> = Vec::new();
        for n in (0..16u8).rev() {
            if mask & (1 << n) != 0 {
                let ac_idx = 15 - n;
                sp = sp.wrapping_sub(1) & WORD_MASK;
                writes.push((sp as u32, self.regs.ac[ac_idx as usize]));
            }
        }
        sp = sp.wrapping_sub(1) & WORD_MASK;
        writes.push((sp as u32, mask));
        let return_addr = u64::from(self.regs.pc().wrapping_add(1));
        sp = sp.wrapping_sub(1) & WORD_MASK;
        writes.push((sp as u32, return_addr));

        for (addr, value) in &writes {
            self.store(*addr, *value)?;
        }

        self.regs.ac[13] = sp;
        self.arm_deferred(deferred);
        Ok(Control::Jump(ea_addr.wrapping_add(1)))
    }

    /// Pops in the opposite order from [`Cpu::exec_clm`]'s pushes, reading
    /// every value before mutating any register so a fault mid-sequence
    /// leaves the CPU exactly as it was.
    fn exec_rtm(&mut self, tail: EaTail) -> FaultResult<Control> {
        let (_, deferred) = self.ea(tail)?;
        let mut sp = self.regs.ac[13];

        let return_addr = self.load(sp as u32)?;
        sp = sp.wrapping_add(1) & WORD_MASK;
        let mask = self.load(sp as u32)? & 0xFFFF;
        sp = sp.wrapping_add(1) & WORD_MASK;

        let mut pops: Vec<(u8, u64)> = Vec::new();
        let mut restored_ac13 = false;
        for n in 0..16u8 {
            if mask & (1 << n) != 0 {
                let ac_idx = 15 - n;
                let v = self.load(sp as u32)?;
                sp = sp.wrapping_add(1) & WORD_MASK;
                if ac_idx == 13 {
                    restored_ac13 = true;
                }
                pops.push((ac_idx, v));
            }
        }

        for (idx, value) in pops {
            self.regs.ac[idx as usize] = value;
        }
        if !restored_ac13 {
            self.regs.ac[13] = sp;
        }
        self.arm_deferred(deferred);
        Ok(Control::Jump((return_addr & u64::from(ist66_core::ADDR_MASK)) as u32))
    }

    fn exec_smi(&mut self, op: SmiOp) -> FaultResult<Control> {
        self.require_supervisor()?;
        match op {
            SmiOp::Hlt(code) => Ok(Control::Halt(code)),
            SmiOp::Int => Err(Fault(Cause::User)),
            SmiOp::Rfi => {
                self.return_from_interrupt();
                Ok(Control::Jump(self.regs.pc()))
            }
            SmiOp::Rmsk(tail) => {
                let (addr, deferred) = self.ea(tail)?;
                let mask = self.load(addr)?;
                self.interrupts.set_mask((mask & 0xFFFF) as u16);
                self.arm_deferred(deferred);
                self.return_from_interrupt();
                Ok(Control::Jump(self.regs.pc()))
            }
            SmiOp::Ldmsk { ac } => {
                let mask = self.regs.ac[ac as usize] & 0xFFFF;
                self.interrupts.set_mask(mask as u16);
                Ok(Control::Next)
            }
            SmiOp::Stmsk { ac } => {
                self.regs.ac[ac as usize] = u64::from(self.interrupts.mask());
                Ok(Control::Next)
            }
            SmiOp::Ldk { ac } => {
                let key = (self.regs.ac[ac as usize] & 0xFF) as u8;
                self.regs.set_key(key);
                Ok(Control::Next)
            }
            SmiOp::Stk { ac } => {
                self.regs.ac[ac as usize] = u64::from(self.regs.key());
                Ok(Control::Next)
            }
            SmiOp::Lct { ac, ctlreg } => {
                self.regs.ctl[ctlreg as usize] = self.regs.ac[ac as usize];
                Ok(Control::Next)
            }
            SmiOp::Stctl { ac, ctlreg } => {
                self.regs.ac[ac as usize] = self.regs.ctl[ctlreg as usize];
                Ok(Control::Next)
            }
        }
    }

    fn exec_io1(&mut self, device: u16, ctl: u8, transfer: u8, ac: u8) -> FaultResult<Control> {
        self.require_supervisor()?;
        use ist66_core::{status_ctl, transfer as xfer};

        let idx = ac as usize;
        let acc_in = self.regs.ac[idx];
        let result = self
            .devices
            .io(device as usize, acc_in, ctl, transfer)
            .map_err(|_| Fault(Cause::Devx))?;

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
            return Ok(if skip { Control::Skip } else { Control::Next });
        }
        if transfer <= xfer::MAX_INPUT && transfer % 2 == 0 {
            self.regs.ac[idx] |= result;
            return Ok(Control::Next);
        }
        if transfer <= xfer::MAX_OUTPUT && transfer % 2 == 1 {
            return Ok(Control::Next);
        }
        Err(Fault(Cause::Inst))
    }

    #[allow(clippy::too_many_arguments)]
    fn exec_aa(
        &mut self,
        op: ist66_alu::AluOp,
        ci: ist66_alu::CarryIn,
        cond: ist66_alu::Cond,
        no_load: bool,
        rotate_wide: bool,
        mk: i8,
        rt: i8,
        a_ac: u8,
        b_ac: u8,
        dest_alt: Option<u8>,
    ) -> FaultResult<Control> {
        let (dest, rotate_amount, mask) = match dest_alt {
            Some(d) => (d, mk, 0i8),
            None => (a_ac, rt, mk),
        };
        let input = AluInput {
            a: self.regs.ac[a_ac as usize],
            b: self.regs.ac[b_ac as usize],
            carry_in: self.regs.carry(),
            op,
            ci,
            cond,
            no_load,
            rotate_width: if rotate_wide { RotateWidth::Bits37 } else { RotateWidth::Bits36 },
            rotate_amount,
            mask,
        };
        let AluOutput { result, carry, skip } = ist66_alu::compute(input);
        self.regs.set_carry(carry);
        if !no_load {
            self.regs.ac[dest as usize] = result;
        }
        Ok(if skip { Control::Skip } else { Control::Next })
    }

    fn arm_deferred(&mut self, deferred: Option<DeferredWrite>) {
        if deferred.is_some() {
            self.deferred_write = deferred;
        }
    }
}
