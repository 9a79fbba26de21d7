//! Instruction model: registers, operand kinds, addresses, and mnemonics.
//!
//! These types are the structured input to the encoder and layout passes.
//! Addresses are immutable once constructed, with one exception: program
//! layout rewrites `Label` operands in place to their resolved relative form.

use alloc::string::String;
use core::fmt;

use bitflags::bitflags;

/// An AMD64 register.
///
/// The declaration order is load-bearing: within each 16-register bank the
/// low 3 bits of the ordinal are the architectural encoding, and bit 3
/// selects the REX-extended upper half (`R8..R15`, `X8..X15`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Register {
    /// Accumulator.
    Ax,
    /// Counter.
    Cx,
    /// Data.
    Dx,
    /// Base.
    Bx,
    /// Stack pointer.
    Sp,
    /// Frame pointer.
    Bp,
    /// Source index.
    Si,
    /// Destination index.
    Di,
    /// R8–R15 — extended general-purpose registers (require REX).
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    /// X0–X15 — SSE registers, used for scalar floating point.
    X0,
    X1,
    X2,
    X3,
    X4,
    X5,
    X6,
    X7,
    /// X8–X15 require REX.R / REX.B.
    X8,
    X9,
    X10,
    X11,
    X12,
    X13,
    X14,
    X15,
}

const GP_NAMES: [&str; 16] = [
    "AX", "CX", "DX", "BX", "SP", "BP", "SI", "DI", "R8", "R9", "R10", "R11", "R12", "R13", "R14",
    "R15",
];

const XMM_NAMES: [&str; 16] = [
    "X0", "X1", "X2", "X3", "X4", "X5", "X6", "X7", "X8", "X9", "X10", "X11", "X12", "X13", "X14",
    "X15",
];

impl Register {
    /// Every register, in ordinal order. Mostly useful for tests and fuzzing.
    pub const ALL: [Register; 32] = [
        Register::Ax,
        Register::Cx,
        Register::Dx,
        Register::Bx,
        Register::Sp,
        Register::Bp,
        Register::Si,
        Register::Di,
        Register::R8,
        Register::R9,
        Register::R10,
        Register::R11,
        Register::R12,
        Register::R13,
        Register::R14,
        Register::R15,
        Register::X0,
        Register::X1,
        Register::X2,
        Register::X3,
        Register::X4,
        Register::X5,
        Register::X6,
        Register::X7,
        Register::X8,
        Register::X9,
        Register::X10,
        Register::X11,
        Register::X12,
        Register::X13,
        Register::X14,
        Register::X15,
    ];

    /// The register's architectural name.
    pub fn name(self) -> &'static str {
        let i = self as usize;
        if i < 16 {
            GP_NAMES[i]
        } else {
            XMM_NAMES[i - 16]
        }
    }

    /// Whether this is an SSE register.
    pub fn is_xmm(self) -> bool {
        (self as u8) >= 16
    }

    /// The low 3 bits of the architectural register number — what goes in
    /// ModR/M `reg`/`rm` or SIB `base`.
    pub(crate) fn low3(self) -> u8 {
        (self as u8) & 7
    }

    /// Whether the register lives in the REX-extended half of its bank.
    pub(crate) fn is_ext(self) -> bool {
        (self as u8) & 8 != 0
    }

    /// An address naming this register directly (`Reg` or `Xmm` kind).
    pub fn addr(self) -> Addr {
        let kind = if self.is_xmm() {
            AddrKind::XMM
        } else {
            AddrKind::REG
        };
        Addr {
            kind,
            value: Value::Reg(self),
            ..Addr::NONE
        }
    }

    /// An address naming the memory at `[self + disp]`.
    ///
    /// # Panics
    ///
    /// Panics if called on an SSE register: indirect addressing requires a
    /// general-purpose base register.
    pub fn ind(self, disp: u64) -> Addr {
        assert!(
            !self.is_xmm(),
            "indirect addressing requires a general-purpose register, got {}",
            self.name()
        );
        Addr {
            kind: AddrKind::IND,
            value: Value::Reg(self),
            disp,
            ..Addr::NONE
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// The kind of an [`Addr`].
    ///
    /// Kinds are independent bits so that opcode-table keys can be derived
    /// from a `(mnemonic, from-kind, to-kind)` tuple.
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct AddrKind: u16 {
        /// No operand in this slot.
        const NONE  = 0;
        /// General-purpose register.
        const REG   = 1 << 0;
        /// Memory address held in a register, plus displacement.
        const IND   = 1 << 1;
        /// SSE register.
        const XMM   = 1 << 2;
        /// Immediate data, 8 bits.
        const IMM8  = 1 << 3;
        /// Immediate data, 16 bits.
        const IMM16 = 1 << 4;
        /// Immediate data, 32 bits.
        const IMM32 = 1 << 5;
        /// Immediate data, 64 bits.
        const IMM64 = 1 << 6;
        /// Relative address, signed 8 bits.
        const REL8  = 1 << 7;
        /// Relative address, signed 16 bits.
        const REL16 = 1 << 8;
        /// Relative address, signed 32 bits.
        const REL32 = 1 << 9;
        /// Named placeholder resolved during layout; no binary form.
        const LABEL = 1 << 10;
    }
}

impl AddrKind {
    /// The kind's printable name.
    pub fn name(self) -> &'static str {
        if self == AddrKind::NONE {
            "None"
        } else if self == AddrKind::REG {
            "Reg"
        } else if self == AddrKind::IND {
            "Ind"
        } else if self == AddrKind::XMM {
            "Xmm"
        } else if self == AddrKind::IMM8 {
            "Imm8"
        } else if self == AddrKind::IMM16 {
            "Imm16"
        } else if self == AddrKind::IMM32 {
            "Imm32"
        } else if self == AddrKind::IMM64 {
            "Imm64"
        } else if self == AddrKind::REL8 {
            "Rel8"
        } else if self == AddrKind::REL16 {
            "Rel16"
        } else if self == AddrKind::REL32 {
            "Rel32"
        } else if self == AddrKind::LABEL {
            "Label"
        } else {
            "?"
        }
    }
}

impl fmt::Display for AddrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An operand payload, width-tagged to match its address kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
enum Value {
    None,
    Reg(Register),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
}

/// An instruction operand: a register, memory reference, immediate,
/// relative displacement, or label.
///
/// The displacement is meaningful only for `Ind` addresses; the name holds
/// the label for `Label` addresses and annotates resolved `Rel*` operands
/// with their source label.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Addr {
    kind: AddrKind,
    value: Value,
    disp: u64,
    name: String,
}

impl Addr {
    /// The absent operand.
    pub const NONE: Addr = Addr {
        kind: AddrKind::NONE,
        value: Value::None,
        disp: 0,
        name: String::new(),
    };

    /// 8-bit immediate data.
    pub fn imm8(v: u8) -> Addr {
        Addr {
            kind: AddrKind::IMM8,
            value: Value::U8(v),
            ..Addr::NONE
        }
    }

    /// 16-bit immediate data.
    pub fn imm16(v: u16) -> Addr {
        Addr {
            kind: AddrKind::IMM16,
            value: Value::U16(v),
            ..Addr::NONE
        }
    }

    /// 32-bit immediate data.
    pub fn imm32(v: u32) -> Addr {
        Addr {
            kind: AddrKind::IMM32,
            value: Value::U32(v),
            ..Addr::NONE
        }
    }

    /// 64-bit immediate data.
    pub fn imm64(v: u64) -> Addr {
        Addr {
            kind: AddrKind::IMM64,
            value: Value::U64(v),
            ..Addr::NONE
        }
    }

    /// Signed 8-bit PC-relative displacement.
    pub fn rel8(v: i8) -> Addr {
        Addr {
            kind: AddrKind::REL8,
            value: Value::I8(v),
            ..Addr::NONE
        }
    }

    /// Signed 16-bit PC-relative displacement.
    pub fn rel16(v: i16) -> Addr {
        Addr {
            kind: AddrKind::REL16,
            value: Value::I16(v),
            ..Addr::NONE
        }
    }

    /// Signed 32-bit PC-relative displacement.
    pub fn rel32(v: i32) -> Addr {
        Addr {
            kind: AddrKind::REL32,
            value: Value::I32(v),
            ..Addr::NONE
        }
    }

    /// A named label placeholder, resolved during layout.
    pub fn label(name: impl Into<String>) -> Addr {
        Addr {
            name: name.into(),
            kind: AddrKind::LABEL,
            ..Addr::NONE
        }
    }

    /// The operand's kind.
    pub fn kind(&self) -> AddrKind {
        self.kind
    }

    /// The register payload, if any.
    pub fn reg(&self) -> Option<Register> {
        match self.value {
            Value::Reg(r) => Some(r),
            _ => None,
        }
    }

    /// The indirect displacement (zero for non-`Ind` operands).
    pub fn disp(&self) -> u64 {
        self.disp
    }

    /// The label name (empty for unnamed operands).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The payload reinterpreted as unsigned 64-bit; signed payloads are
    /// sign-extended. Panics on non-numeric payloads (contract violation).
    pub(crate) fn value_u64(&self) -> u64 {
        match self.value {
            Value::U8(v) => u64::from(v),
            Value::U16(v) => u64::from(v),
            Value::U32(v) => u64::from(v),
            Value::U64(v) => v,
            Value::I8(v) => v as i64 as u64,
            Value::I16(v) => v as i64 as u64,
            Value::I32(v) => v as i64 as u64,
            Value::None | Value::Reg(_) => unreachable!("operand value is not numeric"),
        }
    }

    /// The payload as a signed 64-bit value. Panics on unsigned or
    /// non-numeric payloads (contract violation).
    pub(crate) fn value_i64(&self) -> i64 {
        match self.value {
            Value::I8(v) => i64::from(v),
            Value::I16(v) => i64::from(v),
            Value::I32(v) => i64::from(v),
            _ => unreachable!("operand value is not a signed integer"),
        }
    }

    /// Rewrite a `Label` operand to a resolved 8-bit relative form,
    /// preserving the label name.
    pub(crate) fn set_rel8(&mut self, v: i8) {
        self.kind = AddrKind::REL8;
        self.value = Value::I8(v);
    }

    /// Rewrite a `Label` operand to a resolved 32-bit relative form,
    /// preserving the label name.
    pub(crate) fn set_rel32(&mut self, v: i32) {
        self.kind = AddrKind::REL32;
        self.value = Value::I32(v);
    }

    /// Render the operand.
    ///
    /// `end` is the end-of-instruction code offset, used to print the
    /// absolute target of a relative operand; when `None` the raw relative
    /// value is printed instead.
    pub fn write_text<W: fmt::Write>(&self, w: &mut W, end: Option<usize>) -> fmt::Result {
        if self.kind == AddrKind::NONE {
            Ok(())
        } else if self.kind == AddrKind::REG || self.kind == AddrKind::XMM {
            w.write_str(self.reg().map_or("?", Register::name))
        } else if self.kind == AddrKind::IND {
            let name = self.reg().map_or("?", Register::name);
            if self.disp != 0 {
                write!(w, "{:x}+({})", self.disp, name)
            } else {
                write!(w, "({})", name)
            }
        } else if self.kind == AddrKind::REL8
            || self.kind == AddrKind::REL16
            || self.kind == AddrKind::REL32
        {
            let v = self.value_i64();
            if let Some(end) = end {
                // We know where we are, print the absolute jump target.
                let target = end as i64 + v;
                if target < 0 {
                    write!(w, "{}:(-{:06x})", self.name, -target)
                } else {
                    write!(w, "{}:({:06x})", self.name, target)
                }
            } else if v < 0 {
                write!(w, "{}:(-{:x})", self.name, -v)
            } else {
                write!(w, "{}:({:x})", self.name, v)
            }
        } else if self.kind == AddrKind::IMM8
            || self.kind == AddrKind::IMM16
            || self.kind == AddrKind::IMM32
            || self.kind == AddrKind::IMM64
        {
            write!(w, "0x{:x}", self.value_u64())
        } else if self.kind == AddrKind::LABEL {
            w.write_str(&self.name)
        } else {
            unreachable!("unknown address kind: {:?}", self.kind)
        }
    }
}

impl Default for Addr {
    fn default() -> Self {
        Addr::NONE
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_text(f, None)
    }
}

/// An AMD64 operation. Mnemonics closely follow the AMD64 manual, with
/// `L`/`Q` suffixes for explicit 32-/64-bit operand widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Op {
    /// Pseudo-op marking a jump target; emits no bytes. The label name is
    /// carried in the `from` operand.
    Label,

    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,

    Addl,
    Orl,
    Adcl,
    Sbbl,
    Andl,
    Subl,
    Xorl,
    Cmpl,

    Addq,
    Orq,
    Adcq,
    Sbbq,
    Andq,
    Subq,
    Xorq,
    Cmpq,

    Imull,
    Imulq,

    Idivl,
    Idivq,

    Movb,
    Movl,
    Movq,

    Leal,
    Leaq,

    Call,
    Ret,
    Jmp,
    /// Jump if equal.
    Je,
    /// Jump if not equal.
    Jne,
    /// Jump if unsigned higher.
    Jhi,
    Pushl,
    Pushq,
    Popl,
    Popq,
    Lea,

    Movss,
    Addss,
    Mulss,
    Subss,
    Minss,
    Divss,
    Maxss,

    Movsd,
    Addsd,
    Mulsd,
    Subsd,
    Minsd,
    Divsd,
    Maxsd,
}

impl Op {
    /// Every operation, in declaration order.
    pub const ALL: [Op; 59] = [
        Op::Label,
        Op::Add,
        Op::Or,
        Op::Adc,
        Op::Sbb,
        Op::And,
        Op::Sub,
        Op::Xor,
        Op::Cmp,
        Op::Addl,
        Op::Orl,
        Op::Adcl,
        Op::Sbbl,
        Op::Andl,
        Op::Subl,
        Op::Xorl,
        Op::Cmpl,
        Op::Addq,
        Op::Orq,
        Op::Adcq,
        Op::Sbbq,
        Op::Andq,
        Op::Subq,
        Op::Xorq,
        Op::Cmpq,
        Op::Imull,
        Op::Imulq,
        Op::Idivl,
        Op::Idivq,
        Op::Movb,
        Op::Movl,
        Op::Movq,
        Op::Leal,
        Op::Leaq,
        Op::Call,
        Op::Ret,
        Op::Jmp,
        Op::Je,
        Op::Jne,
        Op::Jhi,
        Op::Pushl,
        Op::Pushq,
        Op::Popl,
        Op::Popq,
        Op::Lea,
        Op::Movss,
        Op::Addss,
        Op::Mulss,
        Op::Subss,
        Op::Minss,
        Op::Divss,
        Op::Maxss,
        Op::Movsd,
        Op::Addsd,
        Op::Mulsd,
        Op::Subsd,
        Op::Minsd,
        Op::Divsd,
        Op::Maxsd,
    ];

    /// The operation's printable mnemonic.
    pub fn name(self) -> &'static str {
        match self {
            Op::Label => "LABEL",
            Op::Add => "ADD",
            Op::Or => "OR",
            Op::Adc => "ADC",
            Op::Sbb => "SBB",
            Op::And => "AND",
            Op::Sub => "SUB",
            Op::Xor => "XOR",
            Op::Cmp => "CMP",
            Op::Addl => "ADDL",
            Op::Orl => "ORL",
            Op::Adcl => "ADCL",
            Op::Sbbl => "SBBL",
            Op::Andl => "ANDL",
            Op::Subl => "SUBL",
            Op::Xorl => "XORL",
            Op::Cmpl => "CMPL",
            Op::Addq => "ADDQ",
            Op::Orq => "ORQ",
            Op::Adcq => "ADCQ",
            Op::Sbbq => "SBBQ",
            Op::Andq => "ANDQ",
            Op::Subq => "SUBQ",
            Op::Xorq => "XORQ",
            Op::Cmpq => "CMPQ",
            Op::Imull => "IMULL",
            Op::Imulq => "IMULQ",
            Op::Idivl => "IDIVL",
            Op::Idivq => "IDIVQ",
            Op::Movb => "MOVB",
            Op::Movl => "MOVL",
            Op::Movq => "MOVQ",
            Op::Leal => "LEAL",
            Op::Leaq => "LEAQ",
            Op::Call => "CALL",
            Op::Ret => "RET",
            Op::Jmp => "JMP",
            Op::Je => "JE",
            Op::Jne => "JNE",
            Op::Jhi => "JHI",
            Op::Pushl => "PUSHL",
            Op::Pushq => "PUSHQ",
            Op::Popl => "POPL",
            Op::Popq => "POPQ",
            Op::Lea => "LEA",
            Op::Movss => "MOVSS",
            Op::Addss => "ADDSS",
            Op::Mulss => "MULSS",
            Op::Subss => "SUBSS",
            Op::Minss => "MINSS",
            Op::Divss => "DIVSS",
            Op::Maxss => "MAXSS",
            Op::Movsd => "MOVSD",
            Op::Addsd => "ADDSD",
            Op::Mulsd => "MULSD",
            Op::Subsd => "SUBSD",
            Op::Minsd => "MINSD",
            Op::Divsd => "DIVSD",
            Op::Maxsd => "MAXSD",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An AMD64 assembly instruction: an operation plus source and destination
/// operands. The opcode table dictates which operand slots are populated.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ins {
    /// The operation.
    pub op: Op,
    /// Source operand.
    pub from: Addr,
    /// Destination operand.
    pub to: Addr,
}

impl Ins {
    /// Build an instruction. Use [`Addr::NONE`] for absent operand slots.
    pub fn new(op: Op, from: Addr, to: Addr) -> Ins {
        Ins { op, from, to }
    }
}

impl fmt::Display for Ins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {},{}", self.op, self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeSet;
    use alloc::format;
    use alloc::string::ToString;

    fn render(a: &Addr, end: Option<usize>) -> String {
        let mut s = String::new();
        a.write_text(&mut s, end).unwrap();
        s
    }

    #[test]
    fn register_ordinals_carry_the_encoding() {
        for (i, r) in Register::ALL.iter().enumerate() {
            assert_eq!(*r as usize, i);
            assert_eq!(r.low3(), (i as u8) & 7);
            assert_eq!(r.is_ext(), i & 8 != 0);
            assert_eq!(r.is_xmm(), i >= 16);
        }
    }

    #[test]
    fn register_names() {
        assert_eq!(Register::Ax.name(), "AX");
        assert_eq!(Register::Sp.name(), "SP");
        assert_eq!(Register::R13.name(), "R13");
        assert_eq!(Register::X0.name(), "X0");
        assert_eq!(Register::X15.name(), "X15");
    }

    #[test]
    fn addr_constructors_pick_kinds() {
        assert_eq!(Addr::NONE.kind(), AddrKind::NONE);
        assert_eq!(Addr::imm8(0).kind(), AddrKind::IMM8);
        assert_eq!(Addr::imm32(1).kind(), AddrKind::IMM32);
        assert_eq!(Addr::imm64(2).kind(), AddrKind::IMM64);
        assert_eq!(Addr::rel8(-1).kind(), AddrKind::REL8);
        assert_eq!(Addr::rel32(9).kind(), AddrKind::REL32);
        assert_eq!(Addr::label("x").kind(), AddrKind::LABEL);
        assert_eq!(Register::Bp.addr().kind(), AddrKind::REG);
        assert_eq!(Register::X3.addr().kind(), AddrKind::XMM);
        assert_eq!(Register::Sp.ind(8).kind(), AddrKind::IND);
    }

    #[test]
    #[should_panic(expected = "general-purpose register")]
    fn indirect_rejects_sse_registers() {
        let _ = Register::X1.ind(0);
    }

    #[test]
    fn signed_payloads_sign_extend() {
        assert_eq!(Addr::rel8(-0x13).value_u64(), 0xffff_ffff_ffff_ffed);
        assert_eq!(Addr::rel32(-0x113).value_u64(), 0xffff_ffff_ffff_feed);
        assert_eq!(Addr::imm8(0xff).value_u64(), 0xff);
    }

    #[test]
    fn addr_rendering() {
        assert_eq!(render(&Addr::NONE, None), "");
        assert_eq!(render(&Register::Bp.addr(), None), "BP");
        assert_eq!(render(&Register::X0.addr(), None), "X0");
        assert_eq!(render(&Register::Sp.ind(8), None), "8+(SP)");
        assert_eq!(render(&Register::Cx.ind(0), None), "(CX)");
        assert_eq!(render(&Register::Bx.ind(0x1000), None), "1000+(BX)");
        assert_eq!(render(&Addr::imm32(0x9d42), None), "0x9d42");
        assert_eq!(render(&Addr::imm8(0), None), "0x0");
        assert_eq!(render(&Addr::label("loop"), None), "loop");
    }

    #[test]
    fn relative_rendering() {
        // Without an end offset the raw relative value prints.
        assert_eq!(render(&Addr::rel8(0x0a), None), ":(a)");
        assert_eq!(render(&Addr::rel32(-0x113), None), ":(-113)");

        // With an end offset the absolute target prints, six digits wide.
        assert_eq!(render(&Addr::rel8(0x0a), Some(2)), ":(00000c)");
        let mut named = Addr::label("loop");
        named.set_rel8(-12);
        assert_eq!(render(&named, Some(19)), "loop:(000007)");
        assert_eq!(render(&named, None), "loop:(-c)");
    }

    #[test]
    fn label_rewrite_preserves_name() {
        let mut a = Addr::label("target");
        a.set_rel32(0);
        assert_eq!(a.kind(), AddrKind::REL32);
        assert_eq!(a.name(), "target");
        assert_eq!(a.value_i64(), 0);
    }

    #[test]
    fn op_names_are_distinct_and_nonempty() {
        let mut seen = BTreeSet::new();
        for op in Op::ALL {
            let name = op.name();
            assert!(!name.is_empty(), "{:?} has no name", op);
            assert!(seen.insert(name), "duplicate op name {}", name);
        }
        assert_eq!(seen.len(), Op::ALL.len());
    }

    #[test]
    fn addr_kind_names() {
        assert_eq!(AddrKind::NONE.to_string(), "None");
        assert_eq!(AddrKind::IMM64.to_string(), "Imm64");
        assert_eq!(AddrKind::LABEL.to_string(), "Label");
    }

    #[test]
    fn ins_display() {
        let ins = Ins::new(Op::Movq, Addr::imm32(7), Register::Bp.addr());
        assert_eq!(format!("{}", ins), "MOVQ 0x7,BP");
        let ret = Ins::new(Op::Ret, Addr::NONE, Addr::NONE);
        assert_eq!(format!("{}", ret), "RET ,");
    }
}
