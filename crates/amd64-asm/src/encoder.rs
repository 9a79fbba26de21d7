//! Single-instruction encoder.
//!
//! [`EncodedIns`] mirrors the final byte layout field-for-field: optional
//! REX, up to three opcode bytes, optional ModR/M, optional SIB, then
//! displacement and immediate. Its `Debug` output is laid out like the
//! bytes, which is helpful when chasing an encoding bug.

use alloc::string::ToString;
use alloc::vec::Vec;

use crate::error::AsmError;
use crate::ir::{Addr, AddrKind, Ins, Op};
use crate::optab::{self, ModPolicy};

pub(crate) const REX_W: u8 = 0x08;
pub(crate) const REX_R: u8 = 0x04;
pub(crate) const REX_B: u8 = 0x01;

/// A laid-out instruction: the encoder's output, consumed by layout.
///
/// `start`/`end` are the instruction's byte offsets within its program,
/// assigned during layout.
#[derive(Debug, Clone, Default)]
pub(crate) struct EncodedIns {
    pub start: usize,
    pub end: usize,

    /// Marks a label pseudo-op, which emits no bytes.
    label: bool,
    /// REX low nibble; a REX prefix is emitted iff nonzero.
    rex: u8,
    /// Legacy prefix byte, emitted when nonzero.
    c0: u8,
    c1: u8,
    /// Emitted only when `c1 == 0x0F`.
    c2: u8,
    modrm: bool,
    modrm_mod: u8,
    modrm_reg: u8,
    modrm_rm: u8,
    sib: bool,
    sib_scale: u8,
    sib_index: u8,
    sib_base: u8,
    /// Displacement size in bytes (0 when absent).
    disp_len: u8,
    disp: u64,
    /// Immediate size in bytes (0 when absent).
    imm_len: u8,
    imm: u64,
}

impl EncodedIns {
    /// Encode one instruction against the opcode table.
    pub(crate) fn encode(ins: &Ins) -> Result<EncodedIns, AsmError> {
        let mut e = EncodedIns::default();
        if ins.op == Op::Label {
            e.label = true;
            return Ok(e);
        }

        let recipe = optab::lookup(ins.op, ins.from.kind(), ins.to.kind()).ok_or(
            AsmError::UnknownCombination {
                op: ins.op,
                from: ins.from.kind(),
                to: ins.to.kind(),
            },
        )?;

        e.c0 = recipe.c0;
        e.c1 = recipe.c1;
        e.c2 = recipe.c2;
        if recipe.add_reg {
            e.add_reg_to_op(ins)?;
        }
        if recipe.rexw {
            e.rex |= REX_W;
        }
        e.build_modrm(ins, recipe.modrm)?;
        e.set_imm(&ins.from);
        e.set_imm(&ins.to);
        Ok(e)
    }

    /// Fold the register operand into the low 3 bits of the opcode byte.
    /// Only `AX..DI` can be encoded this way.
    fn add_reg_to_op(&mut self, ins: &Ins) -> Result<(), AsmError> {
        let a = if ins.to.kind() == AddrKind::REG {
            &ins.to
        } else {
            &ins.from
        };
        let Some(reg) = a.reg() else {
            return Err(AsmError::BadOperand {
                op: ins.op,
                msg: "operand must be a register".to_string(),
            });
        };
        if reg.is_xmm() {
            return Err(AsmError::BadOperand {
                op: ins.op,
                msg: "SSE registers cannot be folded into the opcode".to_string(),
            });
        }
        if reg.is_ext() {
            return Err(AsmError::BadOperand {
                op: ins.op,
                msg: "R8-R15 cannot be folded into the opcode".to_string(),
            });
        }
        self.c1 += reg.low3();
        Ok(())
    }

    fn build_modrm(&mut self, ins: &Ins, policy: ModPolicy) -> Result<(), AsmError> {
        if policy == ModPolicy::None {
            return Ok(());
        }
        self.modrm = true;

        // r1 is the direct operand, r2 may be the indirect one.
        let (r1, r2) = if ins.from.kind() == AddrKind::IND {
            (&ins.to, &ins.from)
        } else {
            (&ins.from, &ins.to)
        };
        if r1.kind() == AddrKind::IND {
            return Err(AsmError::BadOperand {
                op: ins.op,
                msg: "only one operand can be indirect".to_string(),
            });
        }

        match policy {
            ModPolicy::Reg => {
                if let Some(reg) = r1.reg() {
                    self.modrm_reg = reg.low3();
                    if reg.is_ext() {
                        self.rex |= REX_R;
                    }
                }
            }
            ModPolicy::Ext(k) => self.modrm_reg = k,
            ModPolicy::None => unreachable!(),
        }

        if r2.kind() == AddrKind::IND {
            self.indirect_address(ins.op, r2)
        } else {
            self.direct_address(r2);
            Ok(())
        }
    }

    fn indirect_address(&mut self, op: Op, r2: &Addr) -> Result<(), AsmError> {
        let disp = r2.disp();
        if disp == 0 {
            self.modrm_mod = 0b00;
        } else if disp <= 0xFF {
            self.modrm_mod = 0b01;
            self.disp_len = 1;
            self.disp = disp;
        } else if disp <= 0xFFFF_FFFF {
            self.modrm_mod = 0b10;
            self.disp_len = 4;
            self.disp = disp;
        } else {
            return Err(AsmError::DispTooLarge { disp });
        }

        let Some(reg) = r2.reg() else {
            return Err(AsmError::BadOperand {
                op,
                msg: "indirect operand must carry a register".to_string(),
            });
        };
        if reg.is_ext() {
            self.rex |= REX_B;
        }
        if reg.low3() == 0b100 {
            // rm=100 means "SIB follows"; encode [reg] as a SIB base with
            // no index register.
            self.modrm_rm = 0b100;
            self.sib = true;
            self.sib_scale = 0;
            self.sib_index = 0b100;
            self.sib_base = reg.low3();
        } else {
            self.modrm_rm = reg.low3();
        }
        Ok(())
    }

    fn direct_address(&mut self, r2: &Addr) {
        self.modrm_mod = 0b11;
        if let Some(reg) = r2.reg() {
            self.modrm_rm = reg.low3();
            if reg.is_ext() {
                self.rex |= REX_B;
            }
        }
    }

    fn set_imm(&mut self, a: &Addr) {
        let k = a.kind();
        let len = if k == AddrKind::IMM8 || k == AddrKind::REL8 {
            1
        } else if k == AddrKind::IMM16 || k == AddrKind::REL16 {
            2
        } else if k == AddrKind::IMM32 || k == AddrKind::REL32 {
            4
        } else if k == AddrKind::IMM64 {
            8
        } else {
            return;
        };
        self.imm_len = len;
        self.imm = a.value_u64();
    }

    /// The encoded byte length. Always equal to what [`EncodedIns::emit`]
    /// produces.
    pub(crate) fn len(&self) -> usize {
        if self.label {
            return 0;
        }
        let mut n = 1; // c1
        if self.rex != 0 {
            n += 1;
        }
        if self.c0 != 0 {
            n += 1;
        }
        if self.c1 == 0x0F {
            n += 1;
        }
        if self.modrm {
            n += 1;
        }
        if self.sib {
            n += 1;
        }
        n + self.disp_len as usize + self.imm_len as usize
    }

    /// Serialize in the canonical order:
    /// `[REX] [c0] c1 [c2] [ModR/M] [SIB] [disp] [imm]`,
    /// displacement and immediate little-endian.
    pub(crate) fn emit(&self, out: &mut Vec<u8>) {
        if self.label {
            return;
        }
        if self.rex != 0 {
            out.push(0x48 | self.rex);
        }
        if self.c0 != 0 {
            out.push(self.c0);
        }
        out.push(self.c1);
        if self.c1 == 0x0F {
            out.push(self.c2);
        }
        if self.modrm {
            out.push(self.modrm_mod << 6 | self.modrm_reg << 3 | self.modrm_rm);
        }
        if self.sib {
            out.push(self.sib_scale << 6 | self.sib_index << 3 | self.sib_base);
        }
        push_le(out, self.disp_len, self.disp);
        push_le(out, self.imm_len, self.imm);
    }
}

fn push_le(out: &mut Vec<u8>, len: u8, v: u64) {
    for i in 0..len {
        out.push((v >> (8 * u32::from(i))) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Register::*;

    fn emit(ins: &Ins) -> Vec<u8> {
        let e = EncodedIns::encode(ins).unwrap();
        let mut out = Vec::new();
        e.emit(&mut out);
        assert_eq!(out.len(), e.len(), "len() disagrees with emit() for {}", ins);
        out
    }

    #[test]
    fn label_pseudo_op_emits_nothing() {
        let ins = Ins::new(Op::Label, Addr::label("x"), Addr::NONE);
        let e = EncodedIns::encode(&ins).unwrap();
        assert_eq!(e.len(), 0);
        let mut out = Vec::new();
        e.emit(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn rex_nibble_collects_w_r_b() {
        // ADDQ R9, R10 — REX.W|R|B, reg=R9, rm=R10.
        let bytes = emit(&Ins::new(Op::Addq, R9.addr(), R10.addr()));
        assert_eq!(bytes, [0x4D, 0x01, 0xCA]);
    }

    #[test]
    fn stack_pointer_base_forces_sib() {
        let bytes = emit(&Ins::new(Op::Movq, Sp.ind(8), Bx.addr()));
        assert_eq!(bytes, [0x48, 0x8B, 0x5C, 0x24, 0x08]);
        // R12 shares SP's low bits and also takes the SIB path.
        let bytes = emit(&Ins::new(Op::Movq, R12.ind(0), Ax.addr()));
        assert_eq!(bytes, [0x49, 0x8B, 0x04, 0x24]);
    }

    #[test]
    fn displacement_widths_follow_magnitude() {
        // disp == 0: no displacement byte.
        assert_eq!(emit(&Ins::new(Op::Movq, Bx.ind(0), Cx.addr())).len(), 3);
        // disp <= 0xFF: one byte.
        assert_eq!(
            emit(&Ins::new(Op::Movq, Bx.ind(0xFF), Cx.addr())),
            [0x48, 0x8B, 0x4B, 0xFF]
        );
        // disp <= 0xFFFFFFFF: four bytes.
        assert_eq!(
            emit(&Ins::new(Op::Movq, Bx.ind(0x1000), Cx.addr())),
            [0x48, 0x8B, 0x8B, 0x00, 0x10, 0x00, 0x00]
        );
    }

    #[test]
    fn oversized_displacement_is_rejected() {
        let ins = Ins::new(Op::Movq, Bx.ind(0x1_0000_0000), Cx.addr());
        assert_eq!(
            EncodedIns::encode(&ins).unwrap_err(),
            AsmError::DispTooLarge {
                disp: 0x1_0000_0000
            }
        );
    }

    #[test]
    fn add_reg_rejects_extended_and_sse_registers() {
        let err = EncodedIns::encode(&Ins::new(Op::Pushq, R8.addr(), Addr::NONE)).unwrap_err();
        assert!(matches!(err, AsmError::BadOperand { op: Op::Pushq, .. }));

        let err =
            EncodedIns::encode(&Ins::new(Op::Movq, Addr::imm64(1), R9.addr())).unwrap_err();
        assert!(matches!(err, AsmError::BadOperand { op: Op::Movq, .. }));
    }

    #[test]
    fn unknown_combination_reports_the_key() {
        let err =
            EncodedIns::encode(&Ins::new(Op::Addq, Addr::imm64(1), Bx.addr())).unwrap_err();
        assert_eq!(
            err,
            AsmError::UnknownCombination {
                op: Op::Addq,
                from: AddrKind::IMM64,
                to: AddrKind::REG,
            }
        );
    }

    #[test]
    fn immediates_are_little_endian() {
        assert_eq!(
            emit(&Ins::new(Op::Pushq, Addr::imm32(0x9d42), Addr::NONE)),
            [0x68, 0x42, 0x9D, 0x00, 0x00]
        );
        assert_eq!(
            emit(&Ins::new(Op::Movq, Addr::imm64(0xabcd1234abcd), Bp.addr())),
            [0x48, 0xBD, 0xCD, 0xAB, 0x34, 0x12, 0xCD, 0xAB, 0x00, 0x00]
        );
    }

    #[test]
    fn negative_relatives_sign_extend_then_truncate() {
        assert_eq!(
            emit(&Ins::new(Op::Call, Addr::NONE, Addr::rel32(-0x113))),
            [0xE8, 0xED, 0xFE, 0xFF, 0xFF]
        );
        assert_eq!(
            emit(&Ins::new(Op::Jmp, Addr::NONE, Addr::rel8(-2))),
            [0xEB, 0xFE]
        );
    }

    #[test]
    fn eight_encodable_lengths_stay_consistent() {
        // A spread of shapes; emit() and len() must agree on each.
        let cases = [
            Ins::new(Op::Ret, Addr::NONE, Addr::NONE),
            Ins::new(Op::Popq, Addr::NONE, Ax.addr()),
            Ins::new(Op::Idivl, Addr::NONE, Bx.addr()),
            Ins::new(Op::Idivq, Addr::NONE, Bx.addr()),
            Ins::new(Op::Leaq, Bp.ind(16), Di.addr()),
            Ins::new(Op::Movsd, Sp.ind(8), X0.addr()),
            Ins::new(Op::Addsd, X0.addr(), X1.addr()),
            Ins::new(Op::Imulq, Cx.addr(), Bp.addr()),
        ];
        for ins in &cases {
            let _ = emit(ins);
        }
    }

    #[test]
    fn popq_operand_sits_in_the_to_slot() {
        let err = EncodedIns::encode(&Ins::new(Op::Popq, Ax.addr(), Addr::NONE));
        assert!(err.is_err(), "POPQ takes its register in the to slot");
        assert_eq!(
            emit(&Ins::new(Op::Popq, Addr::NONE, Ax.addr())),
            [0x58]
        );
    }
}
