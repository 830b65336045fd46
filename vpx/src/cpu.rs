// cpu.rs - VM instance, access primitives and the fetch-decode-execute loop
//
// One `Cpu` owns one register file and one memory image. Access primitives
// never fail outright: a violation in the checked posture is recorded in the
// fault latch and a recovery value (0, or no write) is produced, so the
// current instruction finishes deterministically and the loop halts after
// it. The instruction semantics live in `isa.rs`.

use crate::fault::{Fault, FaultKind};
use crate::host::{HostContext, HOSTCALL_CODE_REG};
use crate::memory::{InitError, Memory};
use crate::opcode::Opcode;
use crate::posture::{Checked, Posture};
use crate::registers::{RegisterFile, PC, SP};
use std::marker::PhantomData;
use tracing::{debug, trace};

/// Value written by `cpuid`
pub const CPU_ID: u32 = 0b1;

/// Control returned to the host by a hostcall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Yield {
    /// Program counter after the hostcall opcode; execution resumes here
    pub pc: u32,
}

/// Result of executing one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Hostcall(Yield),
}

/// A VPX-2000 CPU
#[derive(Debug, Clone)]
pub struct Cpu<P: Posture = Checked> {
    regs: RegisterFile,
    mem: Memory,
    fault: Option<Fault>,
    _posture: PhantomData<P>,
}

impl<P: Posture> Cpu<P> {
    /// Bind a memory image. Registers start zeroed, so execution begins at
    /// address 0 with the stack pointer at 0.
    pub fn new(image: Vec<u8>) -> Result<Self, InitError> {
        Ok(Self {
            regs: RegisterFile::new(),
            mem: Memory::new(image)?,
            fault: None,
            _posture: PhantomData,
        })
    }

    // =========================================================================
    // Host accessors
    // =========================================================================

    /// The latched fault, if any
    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    /// Host reset of the fault latch
    pub fn clear_fault(&mut self) -> Option<Fault> {
        self.fault.take()
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn memory(&self) -> &[u8] {
        self.mem.as_slice()
    }

    pub fn memory_mut(&mut self) -> &mut [u8] {
        self.mem.as_mut_slice()
    }

    /// Swap in a new image between runs, returning the old one
    pub fn replace_memory(&mut self, image: Vec<u8>) -> Result<Vec<u8>, InitError> {
        let mem = Memory::new(image)?;
        Ok(std::mem::replace(&mut self.mem, mem).into_vec())
    }

    pub fn into_memory(self) -> Vec<u8> {
        self.mem.into_vec()
    }

    /// Register and memory view handed to a hostcall handler
    pub fn host_context(&mut self) -> HostContext<'_> {
        HostContext::new(&mut self.regs, &mut self.mem)
    }

    /// Read register `idx` for the host. Same fault behavior as in-program
    /// reads: out of range (checked) faults and yields 0.
    pub fn read_register(&mut self, idx: u8) -> u32 {
        self.rreg(idx)
    }

    pub fn write_register(&mut self, idx: u8, value: u32) {
        self.wreg(idx, value);
    }

    pub fn pc(&self) -> u32 {
        self.peek(PC)
    }

    pub fn set_pc(&mut self, value: u32) {
        self.wreg(PC, value);
    }

    pub fn sp(&self) -> u32 {
        self.peek(SP)
    }

    pub fn set_sp(&mut self, value: u32) {
        self.wreg(SP, value);
    }

    // =========================================================================
    // Fault latch
    // =========================================================================

    /// Record a fault unless one is already latched
    pub(crate) fn log_fault(&mut self, kind: FaultKind, value: u32) {
        if self.fault.is_some() {
            return;
        }
        let pc = self.peek(PC);
        let fault = Fault { kind, value, pc };
        debug!(%fault, posture = P::NAME, "fault latched");
        self.fault = Some(fault);
    }

    // =========================================================================
    // Registers
    // =========================================================================

    /// Read a register without touching the fault latch: 0 when out of range
    fn peek(&self, idx: u8) -> u32 {
        self.regs.read::<Checked>(idx).unwrap_or(0)
    }

    pub(crate) fn rreg(&mut self, idx: u8) -> u32 {
        match self.regs.read::<P>(idx) {
            Ok(value) => value,
            Err(kind) => {
                self.log_fault(kind, idx as u32);
                0
            }
        }
    }

    pub(crate) fn wreg(&mut self, idx: u8, value: u32) {
        if let Err(kind) = self.regs.write::<P>(idx, value) {
            self.log_fault(kind, idx as u32);
        }
    }

    #[cfg(feature = "isa-64")]
    pub fn read_register_pair(&mut self, idx: u8) -> u64 {
        match self.regs.read_pair::<P>(idx) {
            Ok(value) => value,
            Err(kind) => {
                self.log_fault(kind, idx as u32);
                0
            }
        }
    }

    #[cfg(feature = "isa-64")]
    pub fn write_register_pair(&mut self, idx: u8, value: u64) {
        if let Err(kind) = self.regs.write_pair::<P>(idx, value) {
            self.log_fault(kind, idx as u32);
        }
    }

    // =========================================================================
    // Memory
    // =========================================================================

    pub fn read8(&mut self, addr: u32) -> u8 {
        let result = self.mem.read8::<P>(addr);
        self.recover(result, addr)
    }

    pub fn read16(&mut self, addr: u32) -> u16 {
        let result = self.mem.read16::<P>(addr);
        self.recover(result, addr)
    }

    pub fn read32(&mut self, addr: u32) -> u32 {
        let result = self.mem.read32::<P>(addr);
        self.recover(result, addr)
    }

    pub fn write8(&mut self, addr: u32, value: u8) {
        let result = self.mem.write8::<P>(addr, value);
        self.recover(result, addr)
    }

    pub fn write16(&mut self, addr: u32, value: u16) {
        let result = self.mem.write16::<P>(addr, value);
        self.recover(result, addr)
    }

    pub fn write32(&mut self, addr: u32, value: u32) {
        let result = self.mem.write32::<P>(addr, value);
        self.recover(result, addr)
    }

    #[inline]
    fn recover<T: Default>(&mut self, result: Result<T, FaultKind>, addr: u32) -> T {
        result.unwrap_or_else(|kind| {
            self.log_fault(kind, addr);
            T::default()
        })
    }

    // =========================================================================
    // Stack: push writes then advances, pop retreats then reads
    // =========================================================================

    pub fn push8(&mut self, value: u8) {
        let sp = self.rreg(SP);
        self.write8(sp, value);
        self.wreg(SP, sp.wrapping_add(1));
    }

    pub fn push16(&mut self, value: u16) {
        let sp = self.rreg(SP);
        self.write16(sp, value);
        self.wreg(SP, sp.wrapping_add(2));
    }

    pub fn push32(&mut self, value: u32) {
        let sp = self.rreg(SP);
        self.write32(sp, value);
        self.wreg(SP, sp.wrapping_add(4));
    }

    pub fn pop8(&mut self) -> u8 {
        let sp = self.rreg(SP).wrapping_sub(1);
        self.wreg(SP, sp);
        self.read8(sp)
    }

    pub fn pop16(&mut self) -> u16 {
        let sp = self.rreg(SP).wrapping_sub(2);
        self.wreg(SP, sp);
        self.read16(sp)
    }

    pub fn pop32(&mut self) -> u32 {
        let sp = self.rreg(SP).wrapping_sub(4);
        self.wreg(SP, sp);
        self.read32(sp)
    }

    // =========================================================================
    // Fetch: read at the program counter, then advance it
    // =========================================================================

    pub fn fetch8(&mut self) -> u8 {
        let pc = self.rreg(PC);
        let value = self.read8(pc);
        self.wreg(PC, pc.wrapping_add(1));
        value
    }

    pub fn fetch16(&mut self) -> u16 {
        let pc = self.rreg(PC);
        let value = self.read16(pc);
        self.wreg(PC, pc.wrapping_add(2));
        value
    }

    pub fn fetch32(&mut self) -> u32 {
        let pc = self.rreg(PC);
        let value = self.read32(pc);
        self.wreg(PC, pc.wrapping_add(4));
        value
    }

    // =========================================================================
    // Run-loop
    // =========================================================================

    /// Execute one instruction.
    ///
    /// Returns the latched fault if the instruction faulted (or one was
    /// already latched, in which case nothing executes).
    pub fn step(&mut self) -> Result<Step, Fault> {
        if let Some(fault) = self.fault {
            return Err(fault);
        }

        let start = self.rreg(PC);
        let byte = self.fetch8();

        let step = match Opcode::try_from(byte) {
            Ok(Opcode::Hostcall) => {
                let pc = self.rreg(PC);
                debug!(pc, code = self.peek(HOSTCALL_CODE_REG), "hostcall");
                Step::Hostcall(Yield { pc })
            }
            Ok(op) => {
                trace!(pc = start, op = op.mnemonic(), "exec");
                self.execute(op, start);
                Step::Continue
            }
            Err(byte) => {
                if P::CHECKED {
                    self.log_fault(FaultKind::InvalidOpcode, byte as u32);
                }
                Step::Continue
            }
        };

        match self.fault {
            Some(fault) => Err(fault),
            None => Ok(step),
        }
    }

    /// Drain instructions until a hostcall yields or a fault halts the loop.
    pub fn run(&mut self) -> Result<Yield, Fault> {
        loop {
            if let Step::Hostcall(y) = self.step()? {
                return Ok(y);
            }
        }
    }
}
