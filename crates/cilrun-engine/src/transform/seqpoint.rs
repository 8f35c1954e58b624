//! Sequence-point successor computation
//!
//! Step-over needs, for every sequence point, the set of sequence points
//! reachable without crossing another one. The transformer computes this
//! after layout by walking the finished mint stream: instruction lengths
//! come from the opcode table, branch targets from the encoded deltas.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::imethod::SeqPoint;
use crate::mintops::{MintArg, MintOp};

fn read_i32(code: &[u16], pos: usize) -> i32 {
    (code[pos] as u32 | ((code[pos + 1] as u32) << 16)) as i32
}

/// Control-flow successors of the instruction at `ip`.
fn successors(code: &[u16], ip: usize) -> Vec<u32> {
    let op = match MintOp::from_word(code[ip]) {
        Some(op) => op,
        None => return Vec::new(),
    };
    let next = (ip + op.len_at(code, ip)) as u32;
    let branch_target = |delta: i32| (ip as i64 + delta as i64) as u32;
    match op {
        MintOp::Br | MintOp::Leave | MintOp::LeaveCheck => {
            vec![branch_target(read_i32(code, ip + 1))]
        }
        MintOp::BrS => vec![branch_target(code[ip + 1] as i16 as i32)],
        MintOp::Switch => {
            let count = read_i32(code, ip + 1) as usize;
            let mut out = Vec::with_capacity(count + 1);
            for k in 0..count {
                out.push(branch_target(read_i32(code, ip + 3 + 2 * k)));
            }
            out.push(next);
            out
        }
        MintOp::Ret
        | MintOp::RetVoid
        | MintOp::RetVt
        | MintOp::Throw
        | MintOp::ThrowUnsupported
        | MintOp::Rethrow
        | MintOp::EndFinally
        | MintOp::EndFilter => Vec::new(),
        _ => match op.desc().arg {
            MintArg::Branch => {
                vec![branch_target(read_i32(code, ip + 1)), next]
            }
            MintArg::ShortBranch => {
                vec![branch_target(code[ip + 1] as i16 as i32), next]
            }
            _ => vec![next],
        },
    }
}

/// Populate each sequence point's successor set.
pub(super) fn compute_successors(code: &[u16], seq_points: &mut [SeqPoint]) {
    if seq_points.is_empty() {
        return;
    }
    let sp_index: FxHashMap<u32, u32> = seq_points
        .iter()
        .enumerate()
        .map(|(i, sp)| (sp.native_offset, i as u32))
        .collect();

    for i in 0..seq_points.len() {
        let start = seq_points[i].native_offset as usize;
        let mut next_set: FxHashSet<u32> = FxHashSet::default();
        let mut seen: FxHashSet<u32> = FxHashSet::default();
        let mut work: Vec<u32> = successors(code, start);
        while let Some(offset) = work.pop() {
            if offset as usize >= code.len() || !seen.insert(offset) {
                continue;
            }
            if let Some(&sp) = sp_index.get(&offset) {
                next_set.insert(sp);
                continue;
            }
            work.extend(successors(code, offset as usize));
        }
        let mut next: Vec<u32> = next_set.into_iter().collect();
        next.sort_unstable();
        seq_points[i].next = next;
    }
}
