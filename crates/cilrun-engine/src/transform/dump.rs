//! Transformed-method disassembly
//!
//! Renders a mint stream with resolved branch targets and data-item
//! summaries. Used by the dump configuration options and by tests that
//! assert on the shape of transformed code.

use std::fmt::Write as _;

use crate::imethod::{DataItem, MethodCode};
use crate::mintops::{MintArg, MintOp};

fn read_i32(code: &[u16], pos: usize) -> i32 {
    (code[pos] as u32 | ((code[pos + 1] as u32) << 16)) as i32
}

fn read_i64(code: &[u16], pos: usize) -> i64 {
    (code[pos] as u64
        | ((code[pos + 1] as u64) << 16)
        | ((code[pos + 2] as u64) << 32)
        | ((code[pos + 3] as u64) << 48)) as i64
}

fn item_summary(items: &[DataItem], index: u16) -> String {
    match items.get(index as usize) {
        Some(DataItem::Method(m)) => format!("<method {}>", m.desc.name),
        Some(DataItem::Class(c)) => format!("<class #{}>", c.0),
        Some(DataItem::Field(f)) => format!("<field #{}>", f.0),
        Some(DataItem::Str(_)) => "<string>".to_string(),
        Some(DataItem::Sig(sig)) => format!("<sig {} args>", sig.arg_count()),
        None => format!("<bad item {index}>"),
    }
}

/// Render the mint stream of a transformed method.
pub(crate) fn disassemble(method: &MethodCode) -> String {
    let code = &method.code;
    let mut out = String::new();
    let mut ip = 0usize;
    while ip < code.len() {
        let word = code[ip];
        let Some(op) = MintOp::from_word(word) else {
            let _ = writeln!(out, "IR_{ip:04x}: .bad {word:#06x}");
            break;
        };
        let _ = write!(out, "IR_{ip:04x}: {}", op.name());
        match op.desc().arg {
            MintArg::NoArgs => {}
            MintArg::Short => {
                let _ = write!(out, " {}", code[ip + 1] as i16);
            }
            MintArg::Tok => {
                let _ = write!(out, " {}", item_summary(&method.data_items, code[ip + 1]));
            }
            MintArg::TwoShorts => {
                let _ = write!(out, " {} {}", code[ip + 1], code[ip + 2]);
            }
            MintArg::ThreeShorts => {
                let _ = write!(out, " {} {} {}", code[ip + 1], code[ip + 2], code[ip + 3]);
            }
            MintArg::Int => {
                let _ = write!(out, " {}", read_i32(code, ip + 1));
            }
            MintArg::Long => {
                let _ = write!(out, " {}", read_i64(code, ip + 1));
            }
            MintArg::Double => {
                let _ = write!(out, " {}", f64::from_bits(read_i64(code, ip + 1) as u64));
            }
            MintArg::Branch => {
                let target = ip as i64 + read_i32(code, ip + 1) as i64;
                let _ = write!(out, " IR_{target:04x}");
            }
            MintArg::ShortBranch => {
                let target = ip as i64 + (code[ip + 1] as i16) as i64;
                let _ = write!(out, " IR_{target:04x}");
            }
            MintArg::Switch => {
                let count = read_i32(code, ip + 1) as usize;
                let _ = write!(out, " [{count}]");
                for k in 0..count {
                    let target = ip as i64 + read_i32(code, ip + 3 + 2 * k) as i64;
                    let _ = write!(out, " IR_{target:04x}");
                }
            }
        }
        let _ = writeln!(out);
        ip += op.len_at(code, ip);
    }
    out
}
