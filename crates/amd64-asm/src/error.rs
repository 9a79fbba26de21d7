//! Error types for encoding and program layout.

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;

use crate::ir::{AddrKind, Op};

/// Encoding or layout error.
///
/// Every variant carries enough context to identify the failing instruction:
/// encoder errors are wrapped in [`AsmError::At`] with the instruction index
/// during layout, and label errors name the offending indices directly.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AsmError {
    /// The `(op, from-kind, to-kind)` triple has no opcode-table entry.
    UnknownCombination {
        /// The mnemonic.
        op: Op,
        /// Kind of the source operand.
        from: AddrKind,
        /// Kind of the destination operand.
        to: AddrKind,
    },

    /// An operand does not have the shape the selected encoding requires.
    BadOperand {
        /// The mnemonic.
        op: Op,
        /// Description of the violated requirement.
        msg: String,
    },

    /// An indirect displacement too large for a 4-byte encoding.
    /// SIB-scaled addressing is not implemented.
    DispTooLarge {
        /// The out-of-range displacement.
        disp: u64,
    },

    /// A label was defined more than once.
    DuplicateLabel {
        /// The duplicated label name.
        label: String,
        /// Instruction index of the first definition.
        first: usize,
        /// Instruction index of the duplicate definition.
        second: usize,
    },

    /// A jump references a label that is never defined.
    UndefinedLabel {
        /// The undefined label name.
        label: String,
    },

    /// A back-patched displacement does not fit the relative width chosen
    /// for the jump.
    BranchOutOfRange {
        /// The target label name.
        label: String,
        /// The actual displacement to the target.
        disp: i64,
        /// Maximum allowed displacement magnitude.
        max: i64,
    },

    /// An error attributed to the instruction at `index`.
    At {
        /// Index of the failing instruction within its program.
        index: usize,
        /// The underlying error.
        source: Box<AsmError>,
    },

    /// The output sink failed after `written` bytes were emitted.
    Sink {
        /// Bytes successfully written before the failure.
        written: usize,
        /// The sink's error message.
        msg: String,
    },
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmError::UnknownCombination { op, from, to } => {
                write!(f, "unknown combination: {} {},{}", op, from, to)
            }
            AsmError::BadOperand { op, msg } => {
                write!(f, "{}: {}", op, msg)
            }
            AsmError::DispTooLarge { disp } => {
                write!(
                    f,
                    "displacement {:#x} requires SIB scaling, which is not supported",
                    disp
                )
            }
            AsmError::DuplicateLabel {
                label,
                first,
                second,
            } => {
                write!(
                    f,
                    "instruction {}: label \"{}\" previously defined at instruction {}",
                    second, label, first
                )
            }
            AsmError::UndefinedLabel { label } => {
                write!(f, "undefined label \"{}\"", label)
            }
            AsmError::BranchOutOfRange { label, disp, max } => {
                write!(
                    f,
                    "branch to \"{}\" out of range (displacement {}, max ±{})",
                    label, disp, max
                )
            }
            AsmError::At { index, source } => {
                write!(f, "instruction {}: {}", index, source)
            }
            AsmError::Sink { written, msg } => {
                write!(f, "write failed after {} bytes: {}", written, msg)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AsmError {}
