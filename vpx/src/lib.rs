// vpx2 - VPX-2000 virtual CPU
//
// A register-based 32-bit virtual CPU that executes flat byte-encoded
// programs from a caller-supplied memory image and yields to the host on
// `hostcall`.
//
// # Architecture
//
// 1. **Storage** (`registers.rs`, `memory.rs`, `endian.rs`): 64 registers
//    (r62 = PC, r63 = SP) and a byte-addressed image with wire-order access
// 2. **Encoding** (`opcode.rs`): one table of opcode bytes and operand shapes
// 3. **Execution** (`cpu.rs`, `isa.rs`): fetch-decode-execute loop with a
//    first-fault latch, one routine per opcode
// 4. **Host boundary** (`host.rs`): hostcall handlers and the run-loop
// 5. **Tooling** (`asm.rs`, `disasm.rs`): encoder and disassembler over the
//    same table
//
// # Validation posture
//
// `Cpu<Checked>` validates every register index, memory access and
// division, latching a `Fault` and halting after the instruction.
// `Cpu<Unchecked>` compiles those checks away; the program is trusted.

pub mod asm;
pub mod cpu;
pub mod disasm;
pub mod endian;
pub mod fault;
pub mod host;
mod isa;
pub mod memory;
pub mod opcode;
pub mod posture;
pub mod registers;

pub use asm::{Assembler, EncodeError};
pub use cpu::{Cpu, Step, Yield, CPU_ID};
pub use disasm::{DecodeError, Instruction, Operand};
pub use fault::{Fault, FaultKind};
pub use host::{drive, Control, HostContext, HostError, HostHandler, StdHost};
pub use memory::InitError;
pub use opcode::{Condition, OperandKind, Opcode};
pub use posture::{Checked, Posture, Unchecked};
pub use registers::{PC, REGISTER_COUNT, SP};
