//! Program layout: label resolution, jump-width selection, offset
//! assignment, back-patching, and the byte/text writers.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use crate::encoder::EncodedIns;
use crate::error::AsmError;
use crate::ir::{Addr, AddrKind, Ins, Op};

/// Jumps whose label sits strictly fewer than this many *instructions* away
/// use the 8-bit relative form; everything farther uses 32 bits.
///
/// The architecture caps an instruction at 15 bytes, so this is an
/// ultra-conservative bound; measuring the actual upper bound of the opcode
/// subset would admit more short jumps.
const SHORT_JUMP_LIMIT: usize = 17;

/// Width of the byte-hex column in [`Program::print_text`] output.
const BYTES_COLUMN: usize = 21;

/// An ordered sequence of instructions, assembled as one flat code block.
///
/// Layout rewrites `Label`-kind jump operands in place to their resolved
/// relative form, which is why the writer operations take `&mut self`.
/// Laying out an already-resolved program again is harmless: the rewritten
/// operands keep their chosen width and value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Program {
    ins: Vec<Ins>,
}

impl Program {
    /// An empty program.
    pub fn new() -> Program {
        Program::default()
    }

    /// Append an instruction.
    pub fn push(&mut self, ins: Ins) {
        self.ins.push(ins);
    }

    /// Append a label pseudo-op, marking a jump target at this position.
    pub fn label(&mut self, name: impl Into<String>) {
        self.ins
            .push(Ins::new(Op::Label, Addr::label(name), Addr::NONE));
    }

    /// Number of instructions (labels included).
    pub fn len(&self) -> usize {
        self.ins.len()
    }

    /// Whether the program has no instructions.
    pub fn is_empty(&self) -> bool {
        self.ins.is_empty()
    }

    /// The instructions, with any resolved label operands visible.
    pub fn instructions(&self) -> &[Ins] {
        &self.ins
    }

    /// Translate instructions into laid-out records and resolve labels.
    fn lay_out(&mut self) -> Result<Vec<EncodedIns>, AsmError> {
        // Catalog the labels.
        let mut labels: BTreeMap<String, usize> = BTreeMap::new();
        for (i, ins) in self.ins.iter().enumerate() {
            if ins.op == Op::Label {
                let name = ins.from.name();
                if let Some(&first) = labels.get(name) {
                    return Err(AsmError::DuplicateLabel {
                        label: name.to_string(),
                        first,
                        second: i,
                    });
                }
                labels.insert(name.to_string(), i);
            }
        }

        // Pick a relative width for every label-targeting operand. Calls
        // always take 32 bits; jumps near their label take 8. Collect the
        // rewritten sites so they can be patched once offsets are known.
        let mut jumps: Vec<usize> = Vec::new();
        for i in 0..self.ins.len() {
            if self.ins[i].to.kind() != AddrKind::LABEL {
                continue;
            }
            let Some(&target) = labels.get(self.ins[i].to.name()) else {
                return Err(AsmError::At {
                    index: i,
                    source: Box::new(AsmError::UndefinedLabel {
                        label: self.ins[i].to.name().to_string(),
                    }),
                });
            };
            jumps.push(i);
            if self.ins[i].op == Op::Call {
                self.ins[i].to.set_rel32(0);
            } else if i.abs_diff(target) < SHORT_JUMP_LIMIT {
                self.ins[i].to.set_rel8(0);
            } else {
                self.ins[i].to.set_rel32(0);
            }
        }

        // Lay out the instructions with placeholder relatives.
        let mut laid: Vec<EncodedIns> = Vec::with_capacity(self.ins.len());
        for (i, ins) in self.ins.iter().enumerate() {
            laid.push(EncodedIns::encode(ins).map_err(|e| AsmError::At {
                index: i,
                source: Box::new(e),
            })?);
        }

        // Assign code-block offsets.
        let mut offset = 0;
        for e in &mut laid {
            e.start = offset;
            offset += e.len();
            e.end = offset;
        }

        // Patch the jump sites now that real offsets are known. The width
        // was fixed above, so re-encoding cannot change a length.
        for &j in &jumps {
            let target = labels[self.ins[j].to.name()];
            let delta = laid[target].start as i64 - laid[j].end as i64;
            match self.ins[j].to.kind() {
                k if k == AddrKind::REL8 => match i8::try_from(delta) {
                    Ok(v) => self.ins[j].to.set_rel8(v),
                    Err(_) => {
                        return Err(AsmError::BranchOutOfRange {
                            label: self.ins[j].to.name().to_string(),
                            disp: delta,
                            max: i64::from(i8::MAX),
                        })
                    }
                },
                k if k == AddrKind::REL32 => match i32::try_from(delta) {
                    Ok(v) => self.ins[j].to.set_rel32(v),
                    Err(_) => {
                        return Err(AsmError::BranchOutOfRange {
                            label: self.ins[j].to.name().to_string(),
                            disp: delta,
                            max: i64::from(i32::MAX),
                        })
                    }
                },
                _ => unreachable!("jump operand has a non-relative kind"),
            }

            let mut patched = EncodedIns::encode(&self.ins[j]).map_err(|e| AsmError::At {
                index: j,
                source: Box::new(e),
            })?;
            patched.start = laid[j].start;
            patched.end = laid[j].end;
            debug_assert_eq!(patched.len(), laid[j].len());
            laid[j] = patched;
        }

        Ok(laid)
    }

    /// Assemble the program and return its machine-code bytes.
    pub fn bytes(&mut self) -> Result<Vec<u8>, AsmError> {
        let laid = self.lay_out()?;
        let mut out = Vec::with_capacity(laid.last().map_or(0, |e| e.end));
        for e in &laid {
            e.emit(&mut out);
        }
        Ok(out)
    }

    /// Assemble the program and stream its bytes to `w`, returning the
    /// total byte count. A sink failure surfaces the count written before
    /// the failure in [`AsmError::Sink`].
    #[cfg(feature = "std")]
    pub fn write_to<W: std::io::Write>(&mut self, w: &mut W) -> Result<usize, AsmError> {
        let laid = self.lay_out()?;
        let mut buf = Vec::new();
        let mut written = 0;
        for e in &laid {
            buf.clear();
            e.emit(&mut buf);
            w.write_all(&buf).map_err(|err| AsmError::Sink {
                written,
                msg: err.to_string(),
            })?;
            written += buf.len();
        }
        Ok(written)
    }

    /// Write a human-readable disassembly of the program to `w`.
    ///
    /// Labels print as `name:` on their own line; instructions print their
    /// start offset, the emitted bytes in hex, and the operation with its
    /// operands, relative targets shown as absolute offsets.
    pub fn print_text<W: fmt::Write>(&mut self, w: &mut W) -> Result<(), AsmError> {
        let laid = self.lay_out()?;
        render_text(&self.ins, &laid, w).map_err(|_| AsmError::Sink {
            written: 0,
            msg: "formatter error".to_string(),
        })
    }
}

impl From<Vec<Ins>> for Program {
    fn from(ins: Vec<Ins>) -> Program {
        Program { ins }
    }
}

impl FromIterator<Ins> for Program {
    fn from_iter<I: IntoIterator<Item = Ins>>(iter: I) -> Program {
        Program {
            ins: iter.into_iter().collect(),
        }
    }
}

fn render_text<W: fmt::Write>(ins: &[Ins], laid: &[EncodedIns], w: &mut W) -> fmt::Result {
    let mut buf = Vec::new();
    for (i, e) in laid.iter().enumerate() {
        if ins[i].op == Op::Label {
            writeln!(w, "{}:", ins[i].from.name())?;
            continue;
        }
        buf.clear();
        e.emit(&mut buf);

        write!(w, "{:06x}  ", e.start)?;
        for b in &buf {
            write!(w, "{:02x}", b)?;
        }
        for _ in buf.len() * 2..BYTES_COLUMN {
            w.write_char(' ')?;
        }
        write!(w, " | ")?;

        let name = ins[i].op.name();
        w.write_str(name)?;
        for _ in name.len()..6 {
            w.write_char(' ')?;
        }
        ins[i].from.write_text(w, Some(e.end))?;
        w.write_char(',')?;
        ins[i].to.write_text(w, Some(e.end))?;
        if i + 1 < ins.len() {
            w.write_char('\n')?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Register::*;
    use alloc::vec;

    fn filler() -> Ins {
        // 4 bytes each: 48 83 c0 01.
        Ins::new(Op::Addq, Addr::imm8(1), Ax.addr())
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let mut prog = Program::new();
        prog.label("x");
        prog.push(Ins::new(Op::Ret, Addr::NONE, Addr::NONE));
        prog.label("x");
        assert_eq!(
            prog.bytes().unwrap_err(),
            AsmError::DuplicateLabel {
                label: "x".into(),
                first: 0,
                second: 2,
            }
        );
    }

    #[test]
    fn undefined_labels_are_rejected() {
        let mut prog = Program::from(vec![Ins::new(Op::Jmp, Addr::NONE, Addr::label("nowhere"))]);
        let err = prog.bytes().unwrap_err();
        assert_eq!(
            err,
            AsmError::At {
                index: 0,
                source: Box::new(AsmError::UndefinedLabel {
                    label: "nowhere".into()
                }),
            }
        );
    }

    #[test]
    fn nearby_jumps_take_the_short_form() {
        let mut prog = Program::new();
        prog.label("loop");
        prog.push(filler());
        prog.push(Ins::new(Op::Jne, Addr::NONE, Addr::label("loop")));
        let code = prog.bytes().unwrap();
        // filler (4) + JNE rel8 (2); delta = 0 - 6.
        assert_eq!(code.len(), 6);
        assert_eq!(&code[4..], [0x75, 0xFA]);
    }

    #[test]
    fn distant_jumps_take_the_long_form() {
        let mut prog = Program::new();
        prog.label("top");
        for _ in 0..SHORT_JUMP_LIMIT {
            prog.push(filler());
        }
        prog.push(Ins::new(Op::Jmp, Addr::NONE, Addr::label("top")));
        let code = prog.bytes().unwrap();
        // 17 fillers (68 bytes) + JMP rel32 (5 bytes); delta = 0 - 73.
        assert_eq!(code.len(), 73);
        assert_eq!(&code[68..], [0xE9, 0xB7, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn calls_always_use_rel32() {
        let mut prog = Program::new();
        prog.push(Ins::new(Op::Call, Addr::NONE, Addr::label("fn")));
        prog.label("fn");
        prog.push(Ins::new(Op::Ret, Addr::NONE, Addr::NONE));
        let code = prog.bytes().unwrap();
        // CALL rel32 (5) + RET; the call lands on the next instruction.
        assert_eq!(code, vec![0xE8, 0x00, 0x00, 0x00, 0x00, 0xC3]);
    }

    #[test]
    fn forward_jumps_patch_positive_deltas() {
        let mut prog = Program::new();
        prog.push(Ins::new(Op::Je, Addr::NONE, Addr::label("skip")));
        prog.push(filler());
        prog.label("skip");
        prog.push(Ins::new(Op::Ret, Addr::NONE, Addr::NONE));
        let code = prog.bytes().unwrap();
        assert_eq!(code, vec![0x74, 0x04, 0x48, 0x83, 0xC0, 0x01, 0xC3]);
    }

    #[test]
    fn relayout_is_idempotent() {
        let mut prog = Program::new();
        prog.label("loop");
        prog.push(filler());
        prog.push(Ins::new(Op::Jne, Addr::NONE, Addr::label("loop")));
        let first = prog.bytes().unwrap();
        let second = prog.bytes().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn encoder_errors_carry_the_instruction_index() {
        let mut prog = Program::new();
        prog.push(Ins::new(Op::Ret, Addr::NONE, Addr::NONE));
        prog.push(Ins::new(Op::Addq, Addr::imm64(1), Bx.addr()));
        let err = prog.bytes().unwrap_err();
        assert!(matches!(err, AsmError::At { index: 1, .. }));
    }

    #[test]
    fn empty_program_is_empty_bytes() {
        let mut prog = Program::new();
        assert!(prog.is_empty());
        assert_eq!(prog.bytes().unwrap(), Vec::<u8>::new());
    }
}
