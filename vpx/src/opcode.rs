// opcode.rs - opcode table and operand shapes
//
// The `for_each_opcode!` list is the single definition of the encoding:
// byte value, mnemonic and operand shape of every instruction. Dispatch,
// the disassembler and the encoder all read it through `Opcode`, so an
// instruction's length cannot drift between them.
//
// Operands are fetched in list order immediately after the opcode byte.

/// How one operand is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// Register index, 1 byte
    Reg,
    /// 8-bit immediate (shift amounts)
    Imm8,
    /// 16-bit immediate, wire byte order
    Imm16,
    /// 32-bit immediate, wire byte order
    Imm32,
    /// `cjmp` condition code, 1 byte; the selected branch's operands follow
    /// and its offset counts from this byte
    Cond,
}

impl OperandKind {
    /// Encoded size in bytes
    pub fn size(self) -> u8 {
        match self {
            OperandKind::Reg | OperandKind::Imm8 | OperandKind::Cond => 1,
            OperandKind::Imm16 => 2,
            OperandKind::Imm32 => 4,
        }
    }

    /// Largest value the operand can hold
    pub fn max_value(self) -> u32 {
        match self {
            OperandKind::Reg | OperandKind::Imm8 | OperandKind::Cond => u8::MAX as u32,
            OperandKind::Imm16 => u16::MAX as u32,
            OperandKind::Imm32 => u32::MAX,
        }
    }
}

/// Invokes `$callback` with the full opcode list.
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            /// No operation
            Nop = 0, "nop" => [];
            /// Yield to the host
            Hostcall = 1, "hostcall" => [];
            /// r1 := CPU identification word
            Cpuid = 2, "cpuid" => [Reg];
            /// r1 := r2
            Mov = 3, "mov" => [Reg, Reg];
            /// r1 := imm32
            Movi = 4, "movi" => [Reg, Imm32];
            /// r1 := r1 + 1
            Inc = 5, "inc" => [Reg];
            /// r1 := r1 - 1
            Dec = 6, "dec" => [Reg];
            /// r1 := r2 | r3
            Or = 7, "or" => [Reg, Reg, Reg];
            /// r1 := r2 ^ r3
            Xor = 8, "xor" => [Reg, Reg, Reg];
            /// r1 := r2 & r3
            And = 9, "and" => [Reg, Reg, Reg];
            /// r1 := !r2
            Not = 10, "not" => [Reg, Reg];
            Ori = 11, "ori" => [Reg, Reg, Imm32];
            Xori = 12, "xori" => [Reg, Reg, Imm32];
            Andi = 13, "andi" => [Reg, Reg, Imm32];
            /// r1 := r2 << r3
            Sll = 14, "sll" => [Reg, Reg, Reg];
            /// r1 := r2 >> r3 (logical)
            Srl = 15, "srl" => [Reg, Reg, Reg];
            /// r1 := r2 >> r3 (arithmetic)
            Sra = 16, "sra" => [Reg, Reg, Reg];
            Slli = 17, "slli" => [Reg, Reg, Imm8];
            Srli = 18, "srli" => [Reg, Reg, Imm8];
            Srai = 19, "srai" => [Reg, Reg, Imm8];
            Add = 20, "add" => [Reg, Reg, Reg];
            Sub = 21, "sub" => [Reg, Reg, Reg];
            Mul = 22, "mul" => [Reg, Reg, Reg];
            Udiv = 23, "udiv" => [Reg, Reg, Reg];
            Sdiv = 24, "sdiv" => [Reg, Reg, Reg];
            Urem = 25, "urem" => [Reg, Reg, Reg];
            Srem = 26, "srem" => [Reg, Reg, Reg];
            Addi = 27, "addi" => [Reg, Reg, Imm32];
            Subi = 28, "subi" => [Reg, Reg, Imm32];
            Muli = 29, "muli" => [Reg, Reg, Imm32];
            Udivi = 30, "udivi" => [Reg, Reg, Imm32];
            Sdivi = 31, "sdivi" => [Reg, Reg, Imm32];
            Uremi = 32, "uremi" => [Reg, Reg, Imm32];
            Sremi = 33, "sremi" => [Reg, Reg, Imm32];
            /// r1 := mem8[r2 + start]
            Ld8 = 34, "ld8" => [Reg, Reg];
            Ld16 = 35, "ld16" => [Reg, Reg];
            Ld32 = 36, "ld32" => [Reg, Reg];
            /// mem8[r2 + start] := r1
            St8 = 37, "st8" => [Reg, Reg];
            St16 = 38, "st16" => [Reg, Reg];
            St32 = 39, "st32" => [Reg, Reg];
            /// r1 := mem8[r2 + imm32]
            Ld8r = 40, "ld8r" => [Reg, Reg, Imm32];
            Ld16r = 41, "ld16r" => [Reg, Reg, Imm32];
            Ld32r = 42, "ld32r" => [Reg, Reg, Imm32];
            /// mem8[r2 + imm32] := r1
            St8r = 43, "st8r" => [Reg, Reg, Imm32];
            St16r = 44, "st16r" => [Reg, Reg, Imm32];
            St32r = 45, "st32r" => [Reg, Reg, Imm32];
            /// pc := start + imm32
            Jmp = 46, "jmp" => [Imm32];
            /// pc := r1 + imm32
            Jmpr = 47, "jmpr" => [Reg, Imm32];
            /// pc := start + imm16
            Jmps = 48, "jmps" => [Imm16];
            /// pc := r1 + imm16
            Jmprs = 49, "jmprs" => [Reg, Imm16];
            /// if r1 == 0: pc := start + imm32
            Zjmp = 50, "zjmp" => [Reg, Imm32];
            Ejmp = 51, "ejmp" => [Reg, Reg, Imm32];
            Nejmp = 52, "nejmp" => [Reg, Reg, Imm32];
            Gjmp = 53, "gjmp" => [Reg, Reg, Imm32];
            Gejmp = 54, "gejmp" => [Reg, Reg, Imm32];
            Sjmp = 55, "sjmp" => [Reg, Reg, Imm32];
            Sejmp = 56, "sejmp" => [Reg, Reg, Imm32];
            /// Conditional branch selected by a condition byte
            Cjmp = 57, "cjmp" => [Cond];
            Push8 = 58, "push8" => [Reg];
            Push16 = 59, "push16" => [Reg];
            Push32 = 60, "push32" => [Reg];
            Pop8 = 61, "pop8" => [Reg];
            Pop16 = 62, "pop16" => [Reg];
            Pop32 = 63, "pop32" => [Reg];
            /// push return address; pc := start + imm32
            Call = 64, "call" => [Imm32];
            /// push return address; pc := r1 + imm32
            Callr = 65, "callr" => [Reg, Imm32];
            /// pc := pop32
            Ret = 66, "ret" => [];
        }
    };
}

macro_rules! define_opcodes {
    (
        $( $(#[$doc:meta])* $name:ident = $code:literal, $mnemonic:literal => [$($kind:ident),*]; )*
    ) => {
        /// VPX-2000 opcodes
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $code, )*
        }

        impl Opcode {
            /// Every defined opcode, in encoding order
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name),*];

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Operand shapes, in fetch order
            pub fn operands(self) -> &'static [OperandKind] {
                match self {
                    $( Opcode::$name => &[$(OperandKind::$kind),*], )*
                }
            }

            /// Look up an opcode by mnemonic
            pub fn from_mnemonic(text: &str) -> Option<Self> {
                match text {
                    $( $mnemonic => Some(Opcode::$name), )*
                    _ => None,
                }
            }
        }

        impl TryFrom<u8> for Opcode {
            type Error = u8;

            fn try_from(byte: u8) -> Result<Self, u8> {
                match byte {
                    $( $code => Ok(Opcode::$name), )*
                    other => Err(other),
                }
            }
        }
    };
}

for_each_opcode!(define_opcodes);

impl Opcode {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Encoded length in bytes, opcode byte included. For `cjmp` this is
    /// only the fixed prefix; see [`Condition::encoded_len`].
    pub fn encoded_len(self) -> u8 {
        1 + self.operands().iter().map(|k| k.size()).sum::<u8>()
    }

    /// Conditional branch (direct or through `cjmp`)?
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::Zjmp
                | Opcode::Ejmp
                | Opcode::Nejmp
                | Opcode::Gjmp
                | Opcode::Gejmp
                | Opcode::Sjmp
                | Opcode::Sejmp
                | Opcode::Cjmp
        )
    }

    /// Unconditional jump?
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::Jmp | Opcode::Jmpr | Opcode::Jmps | Opcode::Jmprs
        )
    }

    pub fn is_call(self) -> bool {
        matches!(self, Opcode::Call | Opcode::Callr)
    }

    /// Does the target depend on the instruction's own address?
    pub fn is_pc_relative(self) -> bool {
        !matches!(self, Opcode::Jmpr | Opcode::Jmprs | Opcode::Callr)
            && (self.is_branch() || self.is_jump() || self.is_call())
    }

    /// Does this instruction end straight-line execution?
    pub fn is_terminator(self) -> bool {
        self.is_jump() || matches!(self, Opcode::Ret | Opcode::Hostcall)
    }
}

/// `cjmp` condition codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Condition {
    Zero = 0,
    Equal = 1,
    NotEqual = 2,
    Greater = 3,
    GreaterEqual = 4,
    Less = 5,
    LessEqual = 6,
}

impl Condition {
    pub const ALL: [Condition; 7] = [
        Condition::Zero,
        Condition::Equal,
        Condition::NotEqual,
        Condition::Greater,
        Condition::GreaterEqual,
        Condition::Less,
        Condition::LessEqual,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// The branch instruction this condition selects
    pub fn opcode(self) -> Opcode {
        match self {
            Condition::Zero => Opcode::Zjmp,
            Condition::Equal => Opcode::Ejmp,
            Condition::NotEqual => Opcode::Nejmp,
            Condition::Greater => Opcode::Gjmp,
            Condition::GreaterEqual => Opcode::Gejmp,
            Condition::Less => Opcode::Sjmp,
            Condition::LessEqual => Opcode::Sejmp,
        }
    }

    /// Operands following the condition byte
    pub fn operands(self) -> &'static [OperandKind] {
        self.opcode().operands()
    }

    /// Full length of a `cjmp` with this condition
    pub fn encoded_len(self) -> u8 {
        Opcode::Cjmp.encoded_len() + self.opcode().encoded_len() - 1
    }

    /// Evaluate the condition. Comparisons are unsigned.
    pub fn holds(self, a: u32, b: u32) -> bool {
        match self {
            Condition::Zero => a == 0,
            Condition::Equal => a == b,
            Condition::NotEqual => a != b,
            Condition::Greater => a > b,
            Condition::GreaterEqual => a >= b,
            Condition::Less => a < b,
            Condition::LessEqual => a <= b,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Condition::Zero => "z",
            Condition::Equal => "e",
            Condition::NotEqual => "ne",
            Condition::Greater => "g",
            Condition::GreaterEqual => "ge",
            Condition::Less => "s",
            Condition::LessEqual => "se",
        }
    }
}
