//! # amd64-asm — in-memory AMD64 instruction encoder
//!
//! `amd64-asm` turns symbolic AMD64 instructions — an [`Op`] plus up to two
//! [`Addr`] operands — into the exact machine-code bytes they occupy in a
//! flat code segment, resolving intra-program labels to PC-relative
//! displacements along the way.
//!
//! ## Quick Start
//!
//! ```rust
//! use amd64_asm::{Addr, Ins, Op, Program, Register::*};
//!
//! let mut prog = Program::new();
//! prog.push(Ins::new(Op::Addq, Bp.addr(), Bx.addr()));
//! prog.push(Ins::new(Op::Ret, Addr::NONE, Addr::NONE));
//!
//! let code = prog.bytes().unwrap();
//! assert_eq!(code, vec![0x48, 0x01, 0xeb, 0xc3]);
//! ```
//!
//! ## Features
//!
//! - **Pure Rust** — no C/C++ FFI, no LLVM, no system assembler at runtime.
//! - **Structured input** — programs are built as instruction triples, not
//!   parsed from text.
//! - **Labels** — automatic short/long relative forms with two-pass layout
//!   and back-patching.
//! - **`no_std` + `alloc`** — embeddable in JITs, firmware, WASM.
//!
//! Labels are ordinary instructions with the [`Op::Label`] pseudo-op; jumps
//! name them through [`Addr::label`]:
//!
//! ```rust
//! use amd64_asm::{Addr, Ins, Op, Program, Register::*};
//!
//! let mut prog = Program::new();
//! prog.push(Ins::new(Op::Movq, Addr::imm32(7), Bp.addr()));
//! prog.label("loop");
//! prog.push(Ins::new(Op::Addq, Addr::imm32(1), Bp.addr()));
//! prog.push(Ins::new(Op::Cmpq, Bp.addr(), Bx.addr()));
//! prog.push(Ins::new(Op::Jne, Addr::NONE, Addr::label("loop")));
//! prog.push(Ins::new(Op::Ret, Addr::NONE, Addr::NONE));
//!
//! assert!(prog.bytes().is_ok());
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// ── Lint policy ──────────────────────────────────────────────────────────
// An instruction encoder intentionally performs many narrowing /
// sign-changing casts between integer widths (i64→u8, u64→u32, etc.) and
// uses dense hex literals without separators (0xFFD0, 0x0F87).  The lints
// below are expected and acceptable in this context.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::uninlined_format_args,
    clippy::doc_markdown
)]

extern crate alloc;

/// Error types for encoding and layout failures.
pub mod error;
/// Instruction model: registers, operand kinds, addresses, mnemonics.
pub mod ir;
/// Program layout: label resolution, back-patching, byte/text output.
pub mod linker;

pub(crate) mod encoder;
pub(crate) mod optab;

pub use error::AsmError;
pub use ir::{Addr, AddrKind, Ins, Op, Register};
pub use linker::Program;
