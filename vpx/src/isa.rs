// isa.rs - instruction semantics
//
// Each routine fetches its own operands in table order (see `opcode.rs`),
// then writes at most one register or one memory location. `start` is the
// address of the instruction's opcode byte; every PC-relative form adds its
// immediate to it, except a branch reached through `cjmp`, which is relative
// to the condition byte. The program counter has already moved past the
// instruction's bytes when a routine returns unless it branched.
//
// Arithmetic wraps. Shift amounts are taken modulo 32.

use crate::cpu::{Cpu, CPU_ID};
use crate::fault::FaultKind;
use crate::opcode::{Condition, Opcode};
use crate::posture::Posture;
use crate::registers::PC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DivOp {
    Udiv,
    Sdiv,
    Urem,
    Srem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    W8,
    W16,
    W32,
}

impl<P: Posture> Cpu<P> {
    /// Execute `op`, whose opcode byte at `start` has just been fetched.
    pub(crate) fn execute(&mut self, op: Opcode, start: u32) {
        match op {
            // The run-loop yields on hostcall before reaching here
            Opcode::Nop | Opcode::Hostcall => {}

            // =================================================================
            // Data movement
            // =================================================================
            Opcode::Cpuid => {
                let r1 = self.fetch8();
                self.wreg(r1, CPU_ID);
            }
            Opcode::Mov => {
                let r1 = self.fetch8();
                let r2 = self.fetch8();
                let value = self.rreg(r2);
                self.wreg(r1, value);
            }
            Opcode::Movi => {
                let r1 = self.fetch8();
                let imm = self.fetch32();
                self.wreg(r1, imm);
            }
            Opcode::Inc => self.unary(|a| a.wrapping_add(1)),
            Opcode::Dec => self.unary(|a| a.wrapping_sub(1)),

            // =================================================================
            // Bitwise
            // =================================================================
            Opcode::Or => self.alu_rrr(|a, b| a | b),
            Opcode::Xor => self.alu_rrr(|a, b| a ^ b),
            Opcode::And => self.alu_rrr(|a, b| a & b),
            Opcode::Not => {
                let r1 = self.fetch8();
                let r2 = self.fetch8();
                let value = self.rreg(r2);
                self.wreg(r1, !value);
            }
            Opcode::Ori => self.alu_rri(|a, imm| a | imm),
            Opcode::Xori => self.alu_rri(|a, imm| a ^ imm),
            Opcode::Andi => self.alu_rri(|a, imm| a & imm),

            // =================================================================
            // Shifts
            // =================================================================
            Opcode::Sll => self.alu_rrr(|a, b| a.wrapping_shl(b)),
            Opcode::Srl => self.alu_rrr(|a, b| a.wrapping_shr(b)),
            Opcode::Sra => self.alu_rrr(|a, b| (a as i32).wrapping_shr(b) as u32),
            Opcode::Slli => self.shift_imm(|a, n| a.wrapping_shl(n)),
            Opcode::Srli => self.shift_imm(|a, n| a.wrapping_shr(n)),
            Opcode::Srai => self.shift_imm(|a, n| (a as i32).wrapping_shr(n) as u32),

            // =================================================================
            // Arithmetic
            // =================================================================
            Opcode::Add => self.alu_rrr(u32::wrapping_add),
            Opcode::Sub => self.alu_rrr(u32::wrapping_sub),
            Opcode::Mul => self.alu_rrr(u32::wrapping_mul),
            Opcode::Udiv => self.div_rrr(DivOp::Udiv),
            Opcode::Sdiv => self.div_rrr(DivOp::Sdiv),
            Opcode::Urem => self.div_rrr(DivOp::Urem),
            Opcode::Srem => self.div_rrr(DivOp::Srem),
            Opcode::Addi => self.alu_rri(u32::wrapping_add),
            Opcode::Subi => self.alu_rri(u32::wrapping_sub),
            Opcode::Muli => self.alu_rri(u32::wrapping_mul),
            Opcode::Udivi => self.div_rri(DivOp::Udiv),
            Opcode::Sdivi => self.div_rri(DivOp::Sdiv),
            Opcode::Uremi => self.div_rri(DivOp::Urem),
            Opcode::Sremi => self.div_rri(DivOp::Srem),

            // =================================================================
            // Load / store
            // =================================================================
            Opcode::Ld8 => self.load_rel(Width::W8, start),
            Opcode::Ld16 => self.load_rel(Width::W16, start),
            Opcode::Ld32 => self.load_rel(Width::W32, start),
            Opcode::St8 => self.store_rel(Width::W8, start),
            Opcode::St16 => self.store_rel(Width::W16, start),
            Opcode::St32 => self.store_rel(Width::W32, start),
            Opcode::Ld8r => self.load_off(Width::W8),
            Opcode::Ld16r => self.load_off(Width::W16),
            Opcode::Ld32r => self.load_off(Width::W32),
            Opcode::St8r => self.store_off(Width::W8),
            Opcode::St16r => self.store_off(Width::W16),
            Opcode::St32r => self.store_off(Width::W32),

            // =================================================================
            // Control flow
            // =================================================================
            Opcode::Jmp => {
                let imm = self.fetch32();
                self.wreg(PC, start.wrapping_add(imm));
            }
            Opcode::Jmpr => {
                let r1 = self.fetch8();
                let imm = self.fetch32();
                let base = self.rreg(r1);
                self.wreg(PC, base.wrapping_add(imm));
            }
            Opcode::Jmps => {
                let imm = self.fetch16() as u32;
                self.wreg(PC, start.wrapping_add(imm));
            }
            Opcode::Jmprs => {
                let r1 = self.fetch8();
                let imm = self.fetch16() as u32;
                let base = self.rreg(r1);
                self.wreg(PC, base.wrapping_add(imm));
            }
            Opcode::Zjmp => self.branch(Condition::Zero, start),
            Opcode::Ejmp => self.branch(Condition::Equal, start),
            Opcode::Nejmp => self.branch(Condition::NotEqual, start),
            Opcode::Gjmp => self.branch(Condition::Greater, start),
            Opcode::Gejmp => self.branch(Condition::GreaterEqual, start),
            Opcode::Sjmp => self.branch(Condition::Less, start),
            Opcode::Sejmp => self.branch(Condition::LessEqual, start),
            Opcode::Cjmp => {
                let code = self.fetch8();
                match Condition::from_code(code) {
                    Some(cond) => self.branch(cond, start.wrapping_add(1)),
                    None if P::CHECKED => {
                        self.log_fault(FaultKind::InvalidCondition, code as u32)
                    }
                    None => {}
                }
            }

            // =================================================================
            // Stack
            // =================================================================
            Opcode::Push8 => {
                let r1 = self.fetch8();
                let value = self.rreg(r1);
                self.push8(value as u8);
            }
            Opcode::Push16 => {
                let r1 = self.fetch8();
                let value = self.rreg(r1);
                self.push16(value as u16);
            }
            Opcode::Push32 => {
                let r1 = self.fetch8();
                let value = self.rreg(r1);
                self.push32(value);
            }
            Opcode::Pop8 => {
                let r1 = self.fetch8();
                let value = self.pop8();
                self.wreg(r1, value as u32);
            }
            Opcode::Pop16 => {
                let r1 = self.fetch8();
                let value = self.pop16();
                self.wreg(r1, value as u32);
            }
            Opcode::Pop32 => {
                let r1 = self.fetch8();
                let value = self.pop32();
                self.wreg(r1, value);
            }

            // =================================================================
            // Calls
            // =================================================================
            Opcode::Call => {
                let imm = self.fetch32();
                let ret = self.rreg(PC);
                self.push32(ret);
                self.wreg(PC, start.wrapping_add(imm));
            }
            Opcode::Callr => {
                let r1 = self.fetch8();
                let imm = self.fetch32();
                let target = self.rreg(r1).wrapping_add(imm);
                let ret = self.rreg(PC);
                self.push32(ret);
                self.wreg(PC, target);
            }
            Opcode::Ret => {
                let ret = self.pop32();
                self.wreg(PC, ret);
            }
        }
    }

    /// `op r1` : r1 := f(r1)
    fn unary(&mut self, f: impl FnOnce(u32) -> u32) {
        let r1 = self.fetch8();
        let value = self.rreg(r1);
        self.wreg(r1, f(value));
    }

    /// `op r1, r2, r3` : r1 := f(r2, r3)
    fn alu_rrr(&mut self, f: impl FnOnce(u32, u32) -> u32) {
        let r1 = self.fetch8();
        let r2 = self.fetch8();
        let r3 = self.fetch8();
        let a = self.rreg(r2);
        let b = self.rreg(r3);
        self.wreg(r1, f(a, b));
    }

    /// `op r1, r2, imm32` : r1 := f(r2, imm)
    fn alu_rri(&mut self, f: impl FnOnce(u32, u32) -> u32) {
        let r1 = self.fetch8();
        let r2 = self.fetch8();
        let imm = self.fetch32();
        let a = self.rreg(r2);
        self.wreg(r1, f(a, imm));
    }

    /// `op r1, r2, imm8` : r1 := f(r2, imm)
    fn shift_imm(&mut self, f: impl FnOnce(u32, u32) -> u32) {
        let r1 = self.fetch8();
        let r2 = self.fetch8();
        let imm = self.fetch8() as u32;
        let a = self.rreg(r2);
        self.wreg(r1, f(a, imm));
    }

    fn div_rrr(&mut self, op: DivOp) {
        let r1 = self.fetch8();
        let r2 = self.fetch8();
        let r3 = self.fetch8();
        let a = self.rreg(r2);
        let b = self.rreg(r3);
        if let Some(value) = self.divide(op, a, b, r2, r3 as u32) {
            self.wreg(r1, value);
        }
    }

    /// Immediate forms report divisor value 0 on division by zero
    fn div_rri(&mut self, op: DivOp) {
        let r1 = self.fetch8();
        let r2 = self.fetch8();
        let imm = self.fetch32();
        let a = self.rreg(r2);
        if let Some(value) = self.divide(op, a, imm, r2, 0) {
            self.wreg(r1, value);
        }
    }

    /// Checked: faults on a zero divisor (value `divisor_tag`) and on
    /// MIN / -1 (value = dividend register). Unchecked: RISC-V results
    /// (x/0 = all ones, x%0 = x, MIN/-1 = MIN, MIN%-1 = 0).
    fn divide(
        &mut self,
        op: DivOp,
        a: u32,
        b: u32,
        dividend_reg: u8,
        divisor_tag: u32,
    ) -> Option<u32> {
        let signed = matches!(op, DivOp::Sdiv | DivOp::Srem);
        if P::CHECKED {
            if b == 0 {
                let kind = if signed {
                    FaultKind::DivByZeroSigned
                } else {
                    FaultKind::DivByZero
                };
                self.log_fault(kind, divisor_tag);
                return None;
            }
            if signed && a as i32 == i32::MIN && b as i32 == -1 {
                self.log_fault(FaultKind::DivOverflow, dividend_reg as u32);
                return None;
            }
        }

        let value = match op {
            DivOp::Udiv => a.checked_div(b).unwrap_or(u32::MAX),
            DivOp::Urem => a.checked_rem(b).unwrap_or(a),
            DivOp::Sdiv if b == 0 => u32::MAX,
            DivOp::Sdiv => (a as i32).wrapping_div(b as i32) as u32,
            DivOp::Srem if b == 0 => a,
            DivOp::Srem => (a as i32).wrapping_rem(b as i32) as u32,
        };
        Some(value)
    }

    fn load(&mut self, width: Width, addr: u32) -> u32 {
        match width {
            Width::W8 => self.read8(addr) as u32,
            Width::W16 => self.read16(addr) as u32,
            Width::W32 => self.read32(addr),
        }
    }

    fn store(&mut self, width: Width, addr: u32, value: u32) {
        match width {
            Width::W8 => self.write8(addr, value as u8),
            Width::W16 => self.write16(addr, value as u16),
            Width::W32 => self.write32(addr, value),
        }
    }

    /// `ld r1, r2` : r1 := mem[r2 + start]
    fn load_rel(&mut self, width: Width, start: u32) {
        let r1 = self.fetch8();
        let r2 = self.fetch8();
        let addr = self.rreg(r2).wrapping_add(start);
        let value = self.load(width, addr);
        self.wreg(r1, value);
    }

    /// `st r1, r2` : mem[r2 + start] := r1
    fn store_rel(&mut self, width: Width, start: u32) {
        let r1 = self.fetch8();
        let r2 = self.fetch8();
        let value = self.rreg(r1);
        let addr = self.rreg(r2).wrapping_add(start);
        self.store(width, addr, value);
    }

    /// `ldr r1, r2, imm32` : r1 := mem[r2 + imm]
    fn load_off(&mut self, width: Width) {
        let r1 = self.fetch8();
        let r2 = self.fetch8();
        let imm = self.fetch32();
        let addr = self.rreg(r2).wrapping_add(imm);
        let value = self.load(width, addr);
        self.wreg(r1, value);
    }

    /// `str r1, r2, imm32` : mem[r2 + imm] := r1
    fn store_off(&mut self, width: Width) {
        let r1 = self.fetch8();
        let r2 = self.fetch8();
        let imm = self.fetch32();
        let value = self.rreg(r1);
        let addr = self.rreg(r2).wrapping_add(imm);
        self.store(width, addr, value);
    }

    /// Conditional branch: `zjmp r1, imm32` or `Xjmp r1, r2, imm32`.
    /// Taken: pc := base + imm, where base is the opcode byte for a direct
    /// branch and the condition byte under `cjmp`. Not taken: pc stays past the instruction.
    fn branch(&mut self, cond: Condition, base: u32) {
        let r1 = self.fetch8();
        let r2 = match cond {
            Condition::Zero => None,
            _ => Some(self.fetch8()),
        };
        let imm = self.fetch32();
        let a = self.rreg(r1);
        let b = match r2 {
            Some(r2) => self.rreg(r2),
            None => 0,
        };
        if cond.holds(a, b) {
            self.wreg(PC, base.wrapping_add(imm));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::asm::{rel, Assembler, EncodeError};
    use crate::cpu::{Cpu, Step, Yield};
    use crate::endian::{decode16, encode16, encode32};
    use crate::fault::FaultKind;
    use crate::opcode::{Condition, Opcode::*};
    use crate::posture::{Checked, Posture, Unchecked};
    use crate::registers::SP;

    /// Run `asm` (terminated by a hostcall) in a 256-byte image
    fn run_asm<P: Posture>(asm: &Assembler) -> (Cpu<P>, Result<Yield, crate::Fault>) {
        let mut cpu = Cpu::<P>::new(asm.image(256)).unwrap();
        cpu.set_sp(0xc0);
        let result = cpu.run();
        (cpu, result)
    }

    fn reg<P: Posture>(cpu: &mut Cpu<P>, idx: u8) -> u32 {
        cpu.read_register(idx)
    }

    #[test]
    fn test_data_movement() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        asm.emit(Cpuid, &[1])?
            .emit(Movi, &[2, 0xdead_beef])?
            .emit(Mov, &[3, 2])?
            .emit(Movi, &[4, u32::MAX])?
            .emit(Inc, &[4])?
            .emit(Dec, &[5])?
            .emit(Hostcall, &[])?;
        let (mut cpu, result) = run_asm::<Checked>(&asm);
        assert!(result.is_ok());
        assert_eq!(reg(&mut cpu, 1), 1);
        assert_eq!(reg(&mut cpu, 2), 0xdead_beef);
        assert_eq!(reg(&mut cpu, 3), 0xdead_beef);
        assert_eq!(reg(&mut cpu, 4), 0);
        assert_eq!(reg(&mut cpu, 5), u32::MAX);
        Ok(())
    }

    #[test]
    fn test_bitwise() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        asm.emit(Movi, &[1, 0b1100])?
            .emit(Movi, &[2, 0b1010])?
            .emit(Or, &[3, 1, 2])?
            .emit(Xor, &[4, 1, 2])?
            .emit(And, &[5, 1, 2])?
            .emit(Not, &[6, 1])?
            .emit(Ori, &[7, 1, 0xf000_0000])?
            .emit(Xori, &[8, 1, 0xffff_ffff])?
            .emit(Andi, &[9, 1, 0b0100])?
            .emit(Hostcall, &[])?;
        let (mut cpu, _) = run_asm::<Checked>(&asm);
        assert_eq!(reg(&mut cpu, 3), 0b1110);
        assert_eq!(reg(&mut cpu, 4), 0b0110);
        assert_eq!(reg(&mut cpu, 5), 0b1000);
        assert_eq!(reg(&mut cpu, 6), !0b1100);
        assert_eq!(reg(&mut cpu, 7), 0xf000_000c);
        assert_eq!(reg(&mut cpu, 8), !0b1100);
        assert_eq!(reg(&mut cpu, 9), 0b0100);
        Ok(())
    }

    #[test]
    fn test_shifts() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        asm.emit(Movi, &[1, 0x8000_0010])?
            .emit(Movi, &[2, 4])?
            .emit(Sll, &[3, 1, 2])?
            .emit(Srl, &[4, 1, 2])?
            .emit(Sra, &[5, 1, 2])?
            .emit(Slli, &[6, 1, 1])?
            .emit(Srli, &[7, 1, 31])?
            .emit(Srai, &[8, 1, 31])?
            // amounts are taken modulo 32
            .emit(Slli, &[9, 1, 36])?
            .emit(Movi, &[10, 33])?
            .emit(Srl, &[11, 1, 10])?
            .emit(Hostcall, &[])?;
        let (mut cpu, _) = run_asm::<Checked>(&asm);
        assert_eq!(reg(&mut cpu, 3), 0x0000_0100);
        assert_eq!(reg(&mut cpu, 4), 0x0800_0001);
        assert_eq!(reg(&mut cpu, 5), 0xf800_0001);
        assert_eq!(reg(&mut cpu, 6), 0x0000_0020);
        assert_eq!(reg(&mut cpu, 7), 1);
        assert_eq!(reg(&mut cpu, 8), u32::MAX);
        assert_eq!(reg(&mut cpu, 9), 0x0000_0100);
        assert_eq!(reg(&mut cpu, 11), 0x4000_0008);
        Ok(())
    }

    #[test]
    fn test_arithmetic_wraps() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        asm.emit(Movi, &[1, u32::MAX])?
            .emit(Movi, &[2, 2])?
            .emit(Add, &[3, 1, 2])?
            .emit(Sub, &[4, 2, 1])?
            .emit(Mul, &[5, 1, 2])?
            .emit(Addi, &[6, 2, 40])?
            .emit(Subi, &[7, 2, 3])?
            .emit(Muli, &[8, 2, 0x8000_0000])?
            .emit(Hostcall, &[])?;
        let (mut cpu, result) = run_asm::<Checked>(&asm);
        assert!(result.is_ok());
        assert_eq!(reg(&mut cpu, 3), 1);
        assert_eq!(reg(&mut cpu, 4), 3);
        assert_eq!(reg(&mut cpu, 5), 0xffff_fffe);
        assert_eq!(reg(&mut cpu, 6), 42);
        assert_eq!(reg(&mut cpu, 7), u32::MAX);
        assert_eq!(reg(&mut cpu, 8), 0);
        Ok(())
    }

    #[test]
    fn test_division() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        asm.emit(Movi, &[1, (-7i32) as u32])?
            .emit(Movi, &[2, 2])?
            .emit(Udiv, &[3, 1, 2])?
            .emit(Sdiv, &[4, 1, 2])?
            .emit(Urem, &[5, 1, 2])?
            .emit(Srem, &[6, 1, 2])?
            .emit(Udivi, &[7, 2, 2])?
            .emit(Sdivi, &[8, 1, (-1i32) as u32])?
            .emit(Uremi, &[9, 1, 10])?
            .emit(Sremi, &[10, 1, 4])?
            .emit(Hostcall, &[])?;
        let (mut cpu, result) = run_asm::<Checked>(&asm);
        assert!(result.is_ok());
        assert_eq!(reg(&mut cpu, 3), 0x7fff_fffc);
        assert_eq!(reg(&mut cpu, 4) as i32, -3);
        assert_eq!(reg(&mut cpu, 5), 1);
        assert_eq!(reg(&mut cpu, 6) as i32, -1);
        assert_eq!(reg(&mut cpu, 7), 1);
        assert_eq!(reg(&mut cpu, 8), 7);
        assert_eq!(reg(&mut cpu, 9), ((-7i32) as u32) % 10);
        assert_eq!(reg(&mut cpu, 10) as i32, -3);
        Ok(())
    }

    #[test]
    fn test_udiv_by_zero_halts() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        asm.emit(Movi, &[1, 10])?
            .emit(Movi, &[2, 0])?
            .emit(Movi, &[3, 77])?
            .emit(Udiv, &[3, 1, 2])?
            .emit(Movi, &[4, 1])?
            .emit(Hostcall, &[])?;
        let (mut cpu, result) = run_asm::<Checked>(&asm);
        let fault = result.unwrap_err();
        assert_eq!(fault.kind, FaultKind::DivByZero);
        assert_eq!(fault.value, 2);
        assert_eq!(reg(&mut cpu, 3), 77);
        assert_eq!(reg(&mut cpu, 4), 0);
        Ok(())
    }

    #[test]
    fn test_division_faults() -> Result<(), EncodeError> {
        let cases = [
            (Sdiv, [3u32, 1, 2], 0u32, FaultKind::DivByZeroSigned, 2u32),
            (Srem, [3, 1, 2], 0, FaultKind::DivByZeroSigned, 2),
            (Urem, [3, 1, 2], 0, FaultKind::DivByZero, 2),
            (Udivi, [3, 1, 0], 0, FaultKind::DivByZero, 0),
            (Sremi, [3, 1, 0], 0, FaultKind::DivByZeroSigned, 0),
            (Sdiv, [3, 1, 2], u32::MAX, FaultKind::DivOverflow, 1),
            (Srem, [3, 1, 2], u32::MAX, FaultKind::DivOverflow, 1),
            (Sdivi, [3, 1, u32::MAX], 0, FaultKind::DivOverflow, 1),
        ];
        for (op, operands, divisor, kind, value) in cases {
            let mut asm = Assembler::new();
            asm.emit(Movi, &[1, i32::MIN as u32])?
                .emit(Movi, &[2, divisor])?
                .emit(op, &operands)?
                .emit(Hostcall, &[])?;
            let (_, result) = run_asm::<Checked>(&asm);
            let fault = result.unwrap_err();
            assert_eq!((fault.kind, fault.value), (kind, value), "{op:?}");
        }
        Ok(())
    }

    #[test]
    fn test_unchecked_division_results() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        asm.emit(Movi, &[1, i32::MIN as u32])?
            .emit(Movi, &[2, u32::MAX])?
            .emit(Sdiv, &[3, 1, 2])?
            .emit(Srem, &[4, 1, 2])?
            .emit(Udiv, &[5, 1, 0])?
            .emit(Urem, &[6, 1, 0])?
            .emit(Sdivi, &[7, 1, 0])?
            .emit(Sremi, &[8, 1, 0])?
            .emit(Hostcall, &[])?;
        let (mut cpu, result) = run_asm::<Unchecked>(&asm);
        assert!(result.is_ok());
        assert_eq!(reg(&mut cpu, 3), i32::MIN as u32);
        assert_eq!(reg(&mut cpu, 4), 0);
        assert_eq!(reg(&mut cpu, 5), u32::MAX);
        assert_eq!(reg(&mut cpu, 6), i32::MIN as u32);
        assert_eq!(reg(&mut cpu, 7), u32::MAX);
        assert_eq!(reg(&mut cpu, 8), i32::MIN as u32);
        Ok(())
    }

    #[test]
    fn test_pc_relative_load_store() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        let ld = asm.offset();
        asm.emit(Ld32, &[2, 1])?;
        let st = asm.offset();
        asm.emit(St16, &[2, 3])?;
        let ld8 = asm.offset();
        asm.emit(Ld8, &[4, 5])?.emit(Hostcall, &[])?;

        let word = encode32(0x1234_5678);
        let mut image = asm.image(256);
        image[0x80..0x84].copy_from_slice(&word);
        let mut cpu: Cpu = Cpu::new(image).unwrap();
        cpu.write_register(1, rel(ld, 0x80));
        cpu.write_register(3, rel(st, 0x90));
        cpu.write_register(5, rel(ld8, 0x80));
        cpu.run().unwrap();

        assert_eq!(reg(&mut cpu, 2), 0x1234_5678);
        assert_eq!(cpu.memory()[0x90..0x92], encode16(0x5678));
        assert_eq!(reg(&mut cpu, 4), word[0] as u32);
        Ok(())
    }

    #[test]
    fn test_offset_load_store() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        asm.emit(Movi, &[1, 0x10])?
            .emit(Movi, &[2, 0xcafe_babe])?
            .emit(St32r, &[2, 1, 0x70])?
            .emit(Ld16r, &[3, 1, 0x70])?
            .emit(Ld32r, &[4, 1, 0x70])?
            .emit(St8r, &[2, 1, 0x90])?
            .emit(Ld8r, &[5, 1, 0x90])?
            .emit(St16r, &[2, 1, 0x94])?
            .emit(Ld16r, &[6, 1, 0x94])?
            .emit(Hostcall, &[])?;
        let (mut cpu, result) = run_asm::<Checked>(&asm);
        assert!(result.is_ok());
        let word = encode32(0xcafe_babe);
        assert_eq!(reg(&mut cpu, 3), decode16([word[0], word[1]]) as u32);
        assert_eq!(reg(&mut cpu, 4), 0xcafe_babe);
        assert_eq!(reg(&mut cpu, 5), 0xbe);
        assert_eq!(reg(&mut cpu, 6), 0xbabe);
        Ok(())
    }

    #[test]
    fn test_out_of_range_store_faults() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        asm.emit(Movi, &[1, 254])?
            .emit(St32r, &[1, 1, 0])?
            .emit(Hostcall, &[])?;
        let (cpu, result) = run_asm::<Checked>(&asm);
        let fault = result.unwrap_err();
        assert_eq!(fault.kind, FaultKind::MemWrite32);
        assert_eq!(fault.value, 254);
        assert_eq!(fault.pc, Movi.encoded_len() as u32 + St32r.encoded_len() as u32);
        assert_eq!(cpu.memory()[254..], [0, 0]);
        Ok(())
    }

    #[test]
    fn test_unconditional_jumps() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        let jmp = asm.offset();
        asm.emit(Jmp, &[rel(jmp, 0x20)])?;
        asm.pad_to(0x20);
        asm.emit(Movi, &[1, 0x40])?;
        let jmps = asm.offset();
        asm.emit(Jmps, &[rel(jmps, 0x30)])?;
        asm.pad_to(0x30);
        asm.emit(Jmpr, &[1, 0x8])?;
        asm.pad_to(0x48);
        asm.emit(Jmprs, &[1, 0x10])?;
        asm.pad_to(0x50);
        asm.emit(Hostcall, &[])?;

        let (mut cpu, result) = run_asm::<Checked>(&asm);
        assert_eq!(result, Ok(Yield { pc: 0x51 }));
        assert_eq!(reg(&mut cpu, 1), 0x40);
        Ok(())
    }

    #[test]
    fn test_backward_jump_loop() -> Result<(), EncodeError> {
        // count r1 down from 5, accumulating into r2
        let mut asm = Assembler::new();
        asm.emit(Movi, &[1, 5])?;
        let top = asm.offset();
        asm.emit(Add, &[2, 2, 1])?.emit(Dec, &[1])?;
        let z = asm.offset();
        asm.emit(Zjmp, &[1, 0])?;
        let back = asm.offset();
        asm.emit(Jmp, &[rel(back, top)])?;
        let end = asm.offset();
        asm.emit(Hostcall, &[])?;
        asm.patch32(z + 2, rel(z, end));

        let (mut cpu, result) = run_asm::<Checked>(&asm);
        assert!(result.is_ok());
        assert_eq!(reg(&mut cpu, 2), 15);
        Ok(())
    }

    #[test]
    fn test_conditional_branches() -> Result<(), EncodeError> {
        // (opcode, a, b, taken)
        let cases = [
            (Ejmp, 3u32, 3u32, true),
            (Ejmp, 3, 4, false),
            (Nejmp, 3, 4, true),
            (Nejmp, 4, 4, false),
            (Gjmp, u32::MAX, 1, true),
            (Gjmp, 1, 1, false),
            (Gejmp, 1, 1, true),
            (Gejmp, 0, 1, false),
            (Sjmp, 1, u32::MAX, true),
            (Sjmp, 2, 2, false),
            (Sejmp, 2, 2, true),
            (Sejmp, 3, 2, false),
        ];
        for (op, a, b, taken) in cases {
            let mut asm = Assembler::new();
            asm.emit(Movi, &[1, a])?.emit(Movi, &[2, b])?;
            let br = asm.offset();
            asm.emit(op, &[1, 2, rel(br, 0x40)])?;
            let fallthrough = asm.offset();
            asm.emit(Hostcall, &[])?;
            asm.pad_to(0x40);
            asm.emit(Hostcall, &[])?;

            let (_, result) = run_asm::<Checked>(&asm);
            let expected = if taken { 0x41 } else { fallthrough + 1 };
            assert_eq!(result, Ok(Yield { pc: expected }), "{op:?} {a} {b}");
        }
        Ok(())
    }

    #[test]
    fn test_cjmp_matches_direct_branch() -> Result<(), EncodeError> {
        for cond in Condition::ALL {
            let mut asm = Assembler::new();
            asm.emit(Movi, &[1, 0])?.emit(Movi, &[2, 0])?;
            let br = asm.offset();
            // relative to the condition byte
            match cond {
                Condition::Zero => asm.cjmp(cond, &[1, rel(br + 1, 0x40)])?,
                _ => asm.cjmp(cond, &[1, 2, rel(br + 1, 0x40)])?,
            };
            asm.emit(Hostcall, &[])?;
            asm.pad_to(0x40);
            asm.emit(Hostcall, &[])?;

            let (_, result) = run_asm::<Checked>(&asm);
            let taken = cond.holds(0, 0);
            let fallthrough = br + cond.encoded_len() as u32;
            let expected = if taken { 0x41 } else { fallthrough + 1 };
            assert_eq!(result, Ok(Yield { pc: expected }), "{cond:?}");
        }
        Ok(())
    }

    #[test]
    fn test_cjmp_offset_counts_from_condition_byte() -> Result<(), EncodeError> {
        // cjmp z r0, +8 lands on the hostcall at 9, not the nop at 8
        let mut asm = Assembler::new();
        asm.cjmp(Condition::Zero, &[0, 8])?;
        asm.pad_to(9);
        asm.emit(Hostcall, &[])?.emit(Hostcall, &[])?;

        let (_, result) = run_asm::<Checked>(&asm);
        assert_eq!(result, Ok(Yield { pc: 10 }));

        // the direct form with the same offset counts from its opcode byte
        let mut asm = Assembler::new();
        asm.emit(Zjmp, &[0, 8])?;
        asm.pad_to(8);
        asm.emit(Hostcall, &[])?;
        let (_, result) = run_asm::<Checked>(&asm);
        assert_eq!(result, Ok(Yield { pc: 9 }));
        Ok(())
    }

    #[test]
    fn test_short_jump_immediates_zero_extend() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        asm.emit(Jmps, &[0x8000])?;
        asm.pad_to(0x8000);
        asm.emit(Movi, &[1, 0x10])?.emit(Jmprs, &[1, 0x8000])?;
        asm.pad_to(0x8010);
        asm.emit(Hostcall, &[])?;
        asm.pad_to(0x8010 + 0x8000);
        asm.emit(Hostcall, &[])?;

        let mut cpu: Cpu = Cpu::new(asm.image(0x1_0100)).unwrap();
        cpu.set_sp(0x1_0000);
        assert_eq!(cpu.step(), Ok(Step::Continue));
        assert_eq!(cpu.pc(), 0x8000);
        assert_eq!(cpu.run(), Ok(Yield { pc: 0x8011 }));

        // jmprs from a high base
        cpu.write_register(1, 0x8010);
        cpu.set_pc(0x8006);
        assert_eq!(cpu.run(), Ok(Yield { pc: 0x8010 + 0x8000 + 1 }));
        Ok(())
    }

    #[test]
    fn test_cjmp_invalid_condition() {
        let image = vec![Cjmp.code(), 9, 1, 0, 0, 0, 0, 1, 0];
        let mut cpu: Cpu = Cpu::new(image.clone()).unwrap();
        let fault = cpu.run().unwrap_err();
        assert_eq!(fault.kind, FaultKind::InvalidCondition);
        assert_eq!(fault.value, 9);
        assert_eq!(cpu.pc(), 2);

        // unchecked: no branch, operands after the condition byte execute
        let mut cpu: Cpu<Unchecked> = Cpu::new(image).unwrap();
        assert_eq!(cpu.run(), Ok(Yield { pc: 3 }));
    }

    #[test]
    fn test_stack_instructions() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        asm.emit(Movi, &[1, 0x1122_3344])?
            .emit(Push32, &[1])?
            .emit(Push16, &[1])?
            .emit(Push8, &[1])?
            .emit(Pop8, &[2])?
            .emit(Pop16, &[3])?
            .emit(Pop32, &[4])?
            .emit(Hostcall, &[])?;
        let (mut cpu, result) = run_asm::<Checked>(&asm);
        assert!(result.is_ok());
        assert_eq!(reg(&mut cpu, 2), 0x44);
        assert_eq!(reg(&mut cpu, 3), 0x3344);
        assert_eq!(reg(&mut cpu, 4), 0x1122_3344);
        assert_eq!(reg(&mut cpu, SP), 0xc0);
        Ok(())
    }

    #[test]
    fn test_call_ret() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        let call = asm.offset();
        asm.emit(Call, &[rel(call, 0x40)])?;
        let after = asm.offset();
        asm.emit(Hostcall, &[])?;
        asm.pad_to(0x40);
        asm.emit(Movi, &[1, 9])?.emit(Ret, &[])?;

        let mut cpu: Cpu = Cpu::new(asm.image(256)).unwrap();
        cpu.set_sp(0xc0);
        assert_eq!(cpu.step(), Ok(Step::Continue));
        assert_eq!(cpu.pc(), 0x40);
        assert_eq!(cpu.sp(), 0xc4);
        assert_eq!(cpu.memory()[0xc0..0xc4], encode32(after));

        assert_eq!(cpu.run(), Ok(Yield { pc: after + 1 }));
        assert_eq!(call + Call.encoded_len() as u32, after);
        assert_eq!(cpu.sp(), 0xc0);
        assert_eq!(reg(&mut cpu, 1), 9);
        Ok(())
    }

    #[test]
    fn test_callr() -> Result<(), EncodeError> {
        let mut asm = Assembler::new();
        asm.emit(Movi, &[5, 0x30])?.emit(Callr, &[5, 0x10])?;
        let after = asm.offset();
        asm.emit(Hostcall, &[])?;
        asm.pad_to(0x40);
        asm.emit(Ret, &[])?;

        let (cpu, result) = run_asm::<Checked>(&asm);
        assert_eq!(result, Ok(Yield { pc: after + 1 }));
        assert_eq!(cpu.sp(), 0xc0);
        Ok(())
    }

    #[test]
    fn test_register_index_fault() {
        // mov r1, r64
        let image = vec![Mov.code(), 1, 64, 1];
        let mut cpu: Cpu = Cpu::new(image).unwrap();
        let fault = cpu.run().unwrap_err();
        assert_eq!(fault.kind, FaultKind::RegisterRead);
        assert_eq!(fault.value, 64);
        assert_eq!(fault.pc, 3);
        assert_eq!(cpu.read_register(1), 0);
    }
}
