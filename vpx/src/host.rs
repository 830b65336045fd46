// host.rs - host boundary: hostcall dispatch and the host run-loop
//
// The core only yields on `hostcall`; what a code means is decided here.
// By convention r61 carries the hostcall code and r60 its argument.
// A handler sees the machine through `HostContext`, which can read and
// write any register or memory byte but cannot resume execution.

use crate::cpu::Cpu;
use crate::fault::Fault;
use crate::memory::Memory;
use crate::posture::{Checked, Posture};
use crate::registers::RegisterFile;
use std::io::Write;
use thiserror::Error;
use tracing::debug;

/// Register holding the hostcall code
pub const HOSTCALL_CODE_REG: u8 = 61;
/// Register holding the hostcall argument
pub const HOSTCALL_ARG_REG: u8 = 60;

/// `exit(r60)`
pub const HOSTCALL_EXIT: u32 = 0;
/// Write `T` to the debug sink
pub const HOSTCALL_DEBUG: u32 = 1;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("fault: {0}")]
    Fault(#[from] Fault),
    #[error("attempt to execute invalid hostcall: {0}")]
    UnknownHostcall(u32),
    #[error("register index {0} out of range")]
    Register(u8),
    #[error("memory access of {width} bytes at 0x{addr:08x} out of range")]
    Memory { addr: u32, width: u8 },
    #[error("host I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// What the run-loop does after a hostcall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Resume,
    Exit(u32),
}

/// Machine state visible to a hostcall handler
pub struct HostContext<'a> {
    regs: &'a mut RegisterFile,
    mem: &'a mut Memory,
}

impl<'a> HostContext<'a> {
    pub(crate) fn new(regs: &'a mut RegisterFile, mem: &'a mut Memory) -> Self {
        Self { regs, mem }
    }

    pub fn read_register(&self, idx: u8) -> Result<u32, HostError> {
        self.regs
            .read::<Checked>(idx)
            .map_err(|_| HostError::Register(idx))
    }

    pub fn write_register(&mut self, idx: u8, value: u32) -> Result<(), HostError> {
        self.regs
            .write::<Checked>(idx, value)
            .map_err(|_| HostError::Register(idx))
    }

    /// The hostcall argument (r60)
    pub fn arg(&self) -> Result<u32, HostError> {
        self.read_register(HOSTCALL_ARG_REG)
    }

    pub fn memory(&self) -> &[u8] {
        self.mem.as_slice()
    }

    pub fn memory_mut(&mut self) -> &mut [u8] {
        self.mem.as_mut_slice()
    }

    pub fn read32(&self, addr: u32) -> Result<u32, HostError> {
        self.mem
            .read32::<Checked>(addr)
            .map_err(|_| HostError::Memory { addr, width: 4 })
    }

    pub fn write32(&mut self, addr: u32, value: u32) -> Result<(), HostError> {
        self.mem
            .write32::<Checked>(addr, value)
            .map_err(|_| HostError::Memory { addr, width: 4 })
    }
}

/// Services hostcalls on behalf of a running program
pub trait HostHandler {
    fn hostcall(&mut self, code: u32, ctx: &mut HostContext<'_>) -> Result<Control, HostError>;
}

/// The standard hostcalls: exit and the debug byte
#[derive(Debug)]
pub struct StdHost<W: Write> {
    out: W,
}

impl<W: Write> StdHost<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> HostHandler for StdHost<W> {
    fn hostcall(&mut self, code: u32, ctx: &mut HostContext<'_>) -> Result<Control, HostError> {
        match code {
            HOSTCALL_EXIT => Ok(Control::Exit(ctx.arg()?)),
            HOSTCALL_DEBUG => {
                self.out.write_all(b"T")?;
                self.out.flush()?;
                Ok(Control::Resume)
            }
            other => Err(HostError::UnknownHostcall(other)),
        }
    }
}

/// Run `cpu` to completion, dispatching every hostcall to `handler`.
///
/// Returns the exit status. A fault, or an error from the handler, ends
/// the loop with the CPU left as it stood.
pub fn drive<P, H>(cpu: &mut Cpu<P>, handler: &mut H) -> Result<u32, HostError>
where
    P: Posture,
    H: HostHandler + ?Sized,
{
    loop {
        let yielded = cpu.run()?;
        let code = cpu.read_register(HOSTCALL_CODE_REG);
        match handler.hostcall(code, &mut cpu.host_context())? {
            Control::Resume => continue,
            Control::Exit(status) => {
                debug!(status, pc = yielded.pc, "exit");
                return Ok(status);
            }
        }
    }
}
