//! The IOCPU's register file: one accumulator, a link (carry) bit, the
//! local program counter, and `C_IRQ` (the host IRQ level used by `API`).

use crate::word::{LOCAL_ADDR_MASK, WORD18_MASK};

#[derive(Debug, Clone, Copy, Default)]
pub struct IocpuRegs {
    pub ac: u32,
    pub link: bool,
    pub pc: u32,
    pub c_irq: u8,
}

impl IocpuRegs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ac(&mut self, value: u32) {
        self.ac = value & WORD18_MASK;
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc & LOCAL_ADDR_MASK;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ac_and_pc_are_masked_on_write() {
        let mut r = IocpuRegs::new();
        r.set_ac(0xFF_FFFF);
        assert_eq!(r.ac, WORD18_MASK);
        r.set_pc(0xFF_FFFF);
        assert_eq!(r.pc, LOCAL_ADDR_MASK);
    }
}
