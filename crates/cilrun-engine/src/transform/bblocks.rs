//! Basic-block discovery
//!
//! One prescan over the decoded IL marks every block leader: branch
//! targets, fall-throughs after conditional branches and terminators,
//! exception-region starts, and offset 0. Backward-branch targets are
//! the loop headers the transformer instruments with interruption
//! checks; predecessor counts feed sequence-point propagation.

use cilrun_cil::body::{ClauseKind, IlClause};
use cilrun_cil::il::{ExtInstr, Instr};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{EngineError, EngineResult};

/// One block leader.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct Leader {
    /// Some branch from a higher IL offset lands here (loop header).
    pub backward_target: bool,
    /// Number of explicit in-edges recorded by the prescan.
    pub preds: u32,
}

/// Control transfer shape of one instruction.
enum Flow<'a> {
    /// Falls through only.
    Next,
    /// Unconditional transfer to a delta.
    Branch(i32),
    /// Two-way: delta target plus fall-through.
    CondBranch(i32),
    /// Table of deltas plus fall-through.
    Switch(&'a [i32]),
    /// Ends the block with no IL successor.
    Terminal,
}

fn flow_of(instr: &Instr) -> Flow<'_> {
    match instr {
        Instr::br_s(d) => Flow::Branch(*d as i32),
        Instr::br(d) => Flow::Branch(*d),
        Instr::leave_s(d) => Flow::Branch(*d as i32),
        Instr::leave(d) => Flow::Branch(*d),
        Instr::brfalse_s(d)
        | Instr::brtrue_s(d)
        | Instr::beq_s(d)
        | Instr::bge_s(d)
        | Instr::bgt_s(d)
        | Instr::ble_s(d)
        | Instr::blt_s(d)
        | Instr::bne_un_s(d)
        | Instr::bge_un_s(d)
        | Instr::bgt_un_s(d)
        | Instr::ble_un_s(d)
        | Instr::blt_un_s(d) => Flow::CondBranch(*d as i32),
        Instr::brfalse(d)
        | Instr::brtrue(d)
        | Instr::beq(d)
        | Instr::bge(d)
        | Instr::bgt(d)
        | Instr::ble(d)
        | Instr::blt(d)
        | Instr::bne_un(d)
        | Instr::bge_un(d)
        | Instr::bgt_un(d)
        | Instr::ble_un(d)
        | Instr::blt_un(d) => Flow::CondBranch(*d),
        Instr::switch(targets) => Flow::Switch(targets),
        Instr::ret | Instr::throw | Instr::endfinally | Instr::jmp(_) => Flow::Terminal,
        Instr::prefixed(ExtInstr::rethrow) | Instr::prefixed(ExtInstr::endfilter) => {
            Flow::Terminal
        }
        _ => Flow::Next,
    }
}

/// Resolved branch target of a delta-relative transfer.
fn target_of(next_offset: u32, delta: i32) -> i64 {
    next_offset as i64 + delta as i64
}

/// Discover block leaders over the decoded instruction list.
pub(super) fn find_leaders(
    instrs: &[(u32, Instr)],
    clauses: &[IlClause],
) -> EngineResult<FxHashMap<u32, Leader>> {
    let code_len = instrs
        .last()
        .map(|(off, i)| {
            let mut bytes = Vec::new();
            i.encode(&mut bytes);
            *off + bytes.len() as u32
        })
        .unwrap_or(0);

    let starts: FxHashSet<u32> = instrs.iter().map(|(off, _)| *off).collect();
    let mut leaders: FxHashMap<u32, Leader> = FxHashMap::default();

    let mut mark = |offset: i64, from: Option<u32>, source: u32| -> EngineResult<()> {
        if offset < 0 || offset > code_len as i64 {
            return Err(EngineError::Transform(format!(
                "branch from IL_{source:04x} to IL_{offset:04x} leaves the method"
            )));
        }
        let offset = offset as u32;
        if offset < code_len && !starts.contains(&offset) {
            return Err(EngineError::Transform(format!(
                "branch from IL_{source:04x} lands mid-instruction at IL_{offset:04x}"
            )));
        }
        let leader = leaders.entry(offset).or_default();
        if from.is_some() {
            leader.preds += 1;
        }
        if let Some(from) = from {
            if offset <= from {
                leader.backward_target = true;
            }
        }
        Ok(())
    };

    for (i, (offset, instr)) in instrs.iter().enumerate() {
        let next_offset = instrs
            .get(i + 1)
            .map(|(off, _)| *off)
            .unwrap_or(code_len);
        match flow_of(instr) {
            Flow::Next => {}
            Flow::Branch(d) => {
                mark(target_of(next_offset, d), Some(*offset), *offset)?;
                mark(next_offset as i64, None, *offset)?;
            }
            Flow::CondBranch(d) => {
                mark(target_of(next_offset, d), Some(*offset), *offset)?;
                mark(next_offset as i64, Some(*offset), *offset)?;
            }
            Flow::Switch(targets) => {
                for d in targets {
                    mark(target_of(next_offset, *d), Some(*offset), *offset)?;
                }
                mark(next_offset as i64, Some(*offset), *offset)?;
            }
            Flow::Terminal => {
                mark(next_offset as i64, None, *offset)?;
            }
        }
    }

    for clause in clauses {
        leaders.entry(clause.try_offset).or_default();
        leaders.entry(clause.handler_offset).or_default();
        if clause.kind == ClauseKind::Filter {
            leaders.entry(clause.filter_offset).or_default();
        }
    }
    leaders.entry(0).or_default();

    Ok(leaders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cilrun_cil::il::IlReader;

    fn decode(code: &[u8]) -> Vec<(u32, Instr)> {
        let mut reader = IlReader::new(code);
        let mut out = Vec::new();
        while !reader.is_at_end() {
            let off = reader.offset() as u32;
            out.push((off, Instr::read(&mut reader).unwrap()));
        }
        out
    }

    #[test]
    fn backward_branch_marks_loop_header() {
        // 0: nop; 1: br.s -3 (targets 0)
        let instrs = decode(&[0x00, 0x2B, 0xFD]);
        let leaders = find_leaders(&instrs, &[]).unwrap();
        assert!(leaders[&0].backward_target);
    }

    #[test]
    fn conditional_creates_two_leaders() {
        // 0: ldc.i4.0; 1: brtrue.s +1 (targets 4); 3: nop; 4: ret
        let instrs = decode(&[0x16, 0x2D, 0x01, 0x00, 0x2A]);
        let leaders = find_leaders(&instrs, &[]).unwrap();
        assert!(leaders.contains_key(&4));
        assert!(leaders.contains_key(&3));
        assert!(!leaders[&4].backward_target);
        assert_eq!(leaders[&4].preds, 1);
    }

    #[test]
    fn mid_instruction_branch_is_rejected() {
        // 0: br.s +1 lands inside the ldc.i4 at offset 2.
        let instrs = decode(&[0x2B, 0x01, 0x20, 0x01, 0x00, 0x00, 0x00]);
        assert!(find_leaders(&instrs, &[]).is_err());
    }
}
