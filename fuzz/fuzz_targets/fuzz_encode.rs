#![no_main]
use amd64_asm::{Addr, Ins, Op, Program, Register};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Build a pseudo-random program from the raw bytes. Encoding, layout,
    // and text printing must never panic — only return Ok/Err.
    let mut prog = Program::new();
    for chunk in data.chunks_exact(4) {
        let op = Op::ALL[chunk[0] as usize % Op::ALL.len()];
        if op == Op::Label {
            prog.label(format!("l{}", chunk[1] % 8));
            continue;
        }
        let from = operand(chunk[1], chunk[3]);
        let to = operand(chunk[2], chunk[3]);
        prog.push(Ins::new(op, from, to));
    }

    let _ = prog.bytes();
    let mut text = String::new();
    let _ = prog.print_text(&mut text);
});

fn operand(sel: u8, payload: u8) -> Addr {
    let reg = Register::ALL[payload as usize % Register::ALL.len()];
    match sel % 8 {
        0 => Addr::NONE,
        1 => reg.addr(),
        2 => {
            // Indirect addressing requires a general-purpose register.
            let gp = Register::ALL[payload as usize % 16];
            gp.ind(u64::from(payload) << (sel % 40))
        }
        3 => Addr::imm8(payload),
        4 => Addr::imm32(u32::from(payload) << 16),
        5 => Addr::imm64(u64::from(payload) << 40),
        6 => Addr::rel8(payload as i8),
        _ => Addr::label(format!("l{}", payload % 8)),
    }
}
