//! Opcode table: `(op, from-kind, to-kind)` → encoding recipe.
//!
//! The table is the single source of truth for legal operand combinations.
//! It is expressed as per-family builders (ALU, unary, MOV widths, stack,
//! control flow, scalar SSE) dispatched from [`lookup`]; there is no
//! runtime-mutable state.

use crate::ir::{AddrKind, Op};

/// How the ModR/M byte's `reg` field is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModPolicy {
    /// No ModR/M byte.
    None,
    /// `reg` comes from the register operand.
    Reg,
    /// `reg` is a constant opcode extension (`/0`..`/7`).
    Ext(u8),
}

/// One opcode-table entry.
///
/// `c0` is a legacy prefix (`0x66`, `0xF2`, `0xF3`) when nonzero; `c2` is
/// meaningful only when `c1 == 0x0F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Recipe {
    pub c0: u8,
    pub c1: u8,
    pub c2: u8,
    /// Emit REX.W (64-bit operand size).
    pub rexw: bool,
    /// Fold the register operand into the low 3 bits of `c1`.
    pub add_reg: bool,
    pub modrm: ModPolicy,
}

impl Recipe {
    const EMPTY: Recipe = Recipe {
        c0: 0,
        c1: 0,
        c2: 0,
        rexw: false,
        add_reg: false,
        modrm: ModPolicy::None,
    };

    /// A bare one-byte opcode.
    const fn op(c1: u8) -> Recipe {
        Recipe { c1, ..Recipe::EMPTY }
    }

    /// A two-byte `0F`-escaped opcode.
    const fn esc(c2: u8) -> Recipe {
        Recipe {
            c1: 0x0F,
            c2,
            ..Recipe::EMPTY
        }
    }

    const fn prefix(mut self, c0: u8) -> Recipe {
        self.c0 = c0;
        self
    }

    const fn rexw(mut self) -> Recipe {
        self.rexw = true;
        self
    }

    const fn add_reg(mut self) -> Recipe {
        self.add_reg = true;
        self
    }

    /// ModR/M with `reg` from the register operand.
    const fn reg(mut self) -> Recipe {
        self.modrm = ModPolicy::Reg;
        self
    }

    /// ModR/M with `reg` fixed to the opcode extension `k`.
    const fn ext(mut self, k: u8) -> Recipe {
        self.modrm = ModPolicy::Ext(k);
        self
    }

    const fn w(self, rexw: bool) -> Recipe {
        if rexw {
            self.rexw()
        } else {
            self
        }
    }
}

/// Look up the encoding recipe for an instruction's key.
/// `None` means the combination is not encodable.
pub(crate) fn lookup(op: Op, from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use Op::*;
    match op {
        Label => None,

        Add | Addl => alu(0, false, from, to),
        Addq => alu(0, true, from, to),
        Or | Orl => alu(1, false, from, to),
        Orq => alu(1, true, from, to),
        Adc | Adcl => alu(2, false, from, to),
        Adcq => alu(2, true, from, to),
        Sbb | Sbbl => alu(3, false, from, to),
        Sbbq => alu(3, true, from, to),
        And | Andl => alu(4, false, from, to),
        Andq => alu(4, true, from, to),
        Sub | Subl => alu(5, false, from, to),
        Subq => alu(5, true, from, to),
        Xor | Xorl => alu(6, false, from, to),
        Xorq => alu(6, true, from, to),
        Cmp | Cmpl => alu(7, false, from, to),
        Cmpq => alu(7, true, from, to),

        Imull => imul(false, from, to),
        Imulq => imul(true, from, to),
        Idivl => idiv(false, from, to),
        Idivq => idiv(true, from, to),

        Movb => movb(from, to),
        Movl => movl(from, to),
        Movq => movq(from, to),

        Leal => lea(false, from, to),
        // The unsuffixed form computes a 64-bit address.
        Leaq | Lea => lea(true, from, to),

        Call => call(from, to),
        Ret => ret(from, to),
        Jmp => jump(from, to),
        Je => jcc(0x74, 0x84, from, to),
        Jne => jcc(0x75, 0x85, from, to),
        Jhi => jcc(0x77, 0x87, from, to),
        Pushl | Pushq => push(from, to),
        Popl | Popq => pop(from, to),

        Movss => sse_mov(0xF3, from, to),
        Movsd => sse_mov(0xF2, from, to),
        Addss => sse_arith(0xF3, 0x58, from, to),
        Mulss => sse_arith(0xF3, 0x59, from, to),
        Subss => sse_arith(0xF3, 0x5C, from, to),
        Minss => sse_arith(0xF3, 0x5D, from, to),
        Divss => sse_arith(0xF3, 0x5E, from, to),
        Maxss => sse_arith(0xF3, 0x5F, from, to),
        Addsd => sse_arith(0xF2, 0x58, from, to),
        Mulsd => sse_arith(0xF2, 0x59, from, to),
        Subsd => sse_arith(0xF2, 0x5C, from, to),
        Minsd => sse_arith(0xF2, 0x5D, from, to),
        Divsd => sse_arith(0xF2, 0x5E, from, to),
        Maxsd => sse_arith(0xF2, 0x5F, from, to),
    }
}

/// The eight classic ALU operations share one opcode layout: extension
/// index `k` (ADD=0 .. CMP=7), opcode base `k*8`, immediate forms through
/// the `0x80` group with `reg = k`.
fn alu(ext: u8, rexw: bool, from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    let base = ext << 3;
    let r = if (from, to) == (K::REG, K::REG) {
        Recipe::op(base | 0x01).reg()
    } else if (from, to) == (K::REG, K::IND) {
        if ext == 7 {
            // CMP compares the register against memory; the others
            // read-modify-write the memory destination.
            Recipe::op(0x3B).reg()
        } else {
            Recipe::op(base | 0x01).reg()
        }
    } else if (from, to) == (K::IND, K::REG) {
        Recipe::op(base | 0x03).reg()
    } else if from == K::IMM8 && (to == K::REG || to == K::IND) {
        Recipe::op(0x83).ext(ext)
    } else if from == K::IMM32 && (to == K::REG || to == K::IND) {
        Recipe::op(0x81).ext(ext)
    } else {
        return None;
    };
    Some(r.w(rexw))
}

fn imul(rexw: bool, from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    if (from == K::REG || from == K::IND) && to == K::REG {
        Some(Recipe::esc(0xAF).reg().w(rexw))
    } else {
        None
    }
}

fn idiv(rexw: bool, from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    if from == K::NONE && (to == K::REG || to == K::IND) {
        Some(Recipe::op(0xF7).ext(7).w(rexw))
    } else {
        None
    }
}

fn movb(from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    if from == K::REG && (to == K::REG || to == K::IND) {
        Some(Recipe::op(0x88).reg())
    } else if (from, to) == (K::IND, K::REG) {
        Some(Recipe::op(0x8A).reg())
    } else {
        None
    }
}

fn movl(from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    if (from, to) == (K::IMM32, K::REG) {
        Some(Recipe::op(0xB8).add_reg())
    } else if (from, to) == (K::IMM32, K::IND) {
        Some(Recipe::op(0xC7).ext(0))
    } else if from == K::REG && (to == K::REG || to == K::IND) {
        Some(Recipe::op(0x89).reg())
    } else if (from, to) == (K::IND, K::REG) {
        Some(Recipe::op(0x8B).reg())
    } else {
        None
    }
}

fn movq(from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    let r = if from == K::IMM32 && (to == K::REG || to == K::IND) {
        Recipe::op(0xC7).ext(0)
    } else if (from, to) == (K::IMM64, K::REG) {
        Recipe::op(0xB8).add_reg()
    } else if from == K::REG && (to == K::REG || to == K::IND) {
        Recipe::op(0x89).reg()
    } else if (from, to) == (K::IND, K::REG) {
        Recipe::op(0x8B).reg()
    } else {
        return None;
    };
    Some(r.rexw())
}

fn lea(rexw: bool, from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    if (from, to) == (K::IND, K::REG) {
        Some(Recipe::op(0x8D).reg().w(rexw))
    } else {
        None
    }
}

fn call(from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    if (from, to) == (K::NONE, K::REL32) {
        Some(Recipe::op(0xE8))
    } else if (from, to) == (K::NONE, K::REG) {
        Some(Recipe::op(0xFF).ext(2))
    } else {
        None
    }
}

fn ret(from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    if (from, to) == (K::NONE, K::NONE) {
        Some(Recipe::op(0xC3))
    } else {
        None
    }
}

fn jump(from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    if (from, to) == (K::NONE, K::REL8) {
        Some(Recipe::op(0xEB))
    } else if (from, to) == (K::NONE, K::REL32) {
        Some(Recipe::op(0xE9))
    } else if (from, to) == (K::NONE, K::REG) {
        Some(Recipe::op(0xFF).ext(4))
    } else {
        None
    }
}

fn jcc(short: u8, long: u8, from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    if (from, to) == (K::NONE, K::REL8) {
        Some(Recipe::op(short))
    } else if (from, to) == (K::NONE, K::REL32) {
        Some(Recipe::esc(long))
    } else {
        None
    }
}

/// PUSH takes its operand in the `from` slot.
fn push(from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    if (from, to) == (K::IMM8, K::NONE) {
        Some(Recipe::op(0x6A))
    } else if (from, to) == (K::IMM32, K::NONE) {
        Some(Recipe::op(0x68))
    } else if (from, to) == (K::REG, K::NONE) {
        Some(Recipe::op(0x50).add_reg())
    } else {
        None
    }
}

/// POP takes its operand in the `to` slot.
fn pop(from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    if (from, to) == (K::NONE, K::REG) {
        Some(Recipe::op(0x58).add_reg())
    } else {
        None
    }
}

/// Scalar SSE moves: `0F 10` loads into a register, `0F 11` stores from one.
fn sse_mov(prefix: u8, from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    if (from == K::IND || from == K::XMM) && to == K::XMM {
        Some(Recipe::esc(0x10).prefix(prefix).reg())
    } else if (from, to) == (K::XMM, K::IND) {
        Some(Recipe::esc(0x11).prefix(prefix).reg())
    } else {
        None
    }
}

fn sse_arith(prefix: u8, code: u8, from: AddrKind, to: AddrKind) -> Option<Recipe> {
    use AddrKind as K;
    if (from == K::XMM || from == K::IND) && to == K::XMM {
        Some(Recipe::esc(code).prefix(prefix).reg())
    } else {
        None
    }
}
