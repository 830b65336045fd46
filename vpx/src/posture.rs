// posture.rs - checked / unchecked validation posture
//
// The posture is a type parameter of `Cpu`. Every guard in the core is
// written as `if P::CHECKED && ...`, so the unchecked instantiation carries
// no validation code at all while both share one set of semantics.

mod sealed {
    pub trait Sealed {}
}

/// Validation posture of a CPU instance
pub trait Posture: sealed::Sealed + 'static {
    /// Validate register indices, memory bounds, divisors and opcodes?
    const CHECKED: bool;
    /// Short name for logs
    const NAME: &'static str;
}

/// Every access and every division is validated; the first violation is
/// recorded as a fault and halts the run-loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct Checked;

/// No validation. Out-of-range register or memory access panics through
/// Rust's own bounds checks; unknown opcodes execute as `nop`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unchecked;

impl sealed::Sealed for Checked {}
impl sealed::Sealed for Unchecked {}

impl Posture for Checked {
    const CHECKED: bool = true;
    const NAME: &'static str = "checked";
}

impl Posture for Unchecked {
    const CHECKED: bool = false;
    const NAME: &'static str = "unchecked";
}
