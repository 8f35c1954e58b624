//! Transformer invariants checked over real transformed methods:
//! publication idempotence, offset-map monotonicity, branch validity,
//! clause containment, abstract stack soundness, and debug-info
//! publication.

mod common;

use cilrun_cil::{BodyBuilder, Instr};
use cilrun_engine::{
    HostRuntime, ManagedValue, MethodBuilder, MethodHandle, MethodSignature, MintArg, MintOp,
    TypeDesc,
};
use common::*;

/// The iterative-Fibonacci fixture shared by several property tests.
fn fib_fixture() -> (Fixture, MethodHandle) {
    fixture(|builder, tests| {
        let mut b = BodyBuilder::new();
        let top = b.label();
        let done = b.label();
        b.op(Instr::ldc_i4_0).op(Instr::stloc_0);
        b.op(Instr::ldc_i4_1).op(Instr::stloc_1);
        b.op(Instr::ldc_i4_0).op(Instr::stloc_2);
        b.place(top);
        b.op(Instr::ldloc_2).op(Instr::ldarg_0);
        b.bge(done);
        b.op(Instr::ldloc_0).op(Instr::ldloc_1).op(Instr::add).op(Instr::stloc_3);
        b.op(Instr::ldloc_1).op(Instr::stloc_0);
        b.op(Instr::ldloc_3).op(Instr::stloc_1);
        b.op(Instr::ldloc_2).op(Instr::ldc_i4_1).op(Instr::add).op(Instr::stloc_2);
        b.br(top);
        b.place(done);
        b.op(Instr::ldloc_0).op(Instr::ret);

        builder.define_method(
            MethodBuilder::new(
                tests,
                "Fib",
                MethodSignature {
                    has_this: false,
                    params: vec![TypeDesc::I4],
                    ret: TypeDesc::I4,
                },
            )
            .static_()
            .locals(vec![TypeDesc::I4, TypeDesc::I4, TypeDesc::I4, TypeDesc::I4])
            .seq_points(vec![0, 2])
            .body(b.finish().unwrap()),
        )
    })
}

/// Instruction boundaries of a mint stream.
fn boundaries(code: &[u16]) -> Vec<usize> {
    let mut out = Vec::new();
    let mut ip = 0;
    while ip < code.len() {
        out.push(ip);
        let op = MintOp::from_word(code[ip]).expect("valid opcode");
        ip += op.len_at(code, ip);
    }
    out
}

fn branch_targets(code: &[u16], ip: usize, op: MintOp) -> Vec<i64> {
    let read32 = |pos: usize| (code[pos] as u32 | ((code[pos + 1] as u32) << 16)) as i32 as i64;
    match op.desc().arg {
        MintArg::Branch => vec![ip as i64 + read32(ip + 1)],
        MintArg::ShortBranch => vec![ip as i64 + (code[ip + 1] as i16) as i64],
        MintArg::Switch => {
            let count = read32(ip + 1) as usize;
            (0..count).map(|k| ip as i64 + read32(ip + 3 + 2 * k)).collect()
        }
        _ => Vec::new(),
    }
}

#[test]
fn concurrent_resolution_returns_one_compiled_method() {
    let (fx, fib) = fib_fixture();
    let engine = fx.engine.clone();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            std::thread::spawn(move || engine.prepare_method(fib).unwrap())
        })
        .collect();
    let methods: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for pair in methods.windows(2) {
        assert!(std::sync::Arc::ptr_eq(&pair[0], &pair[1]));
    }
    // The payload is fully visible once published.
    let code = methods[0].code().expect("transformed");
    assert!(!code.code.is_empty());
    assert!(code.alloca_size >= code.args_size + code.locals_size);
}

#[test]
fn offset_map_is_monotone() {
    let (fx, fib) = fib_fixture();
    let cm = fx.engine.prepare_method(fib).unwrap();
    let code = cm.code().unwrap();
    let mut last_native = 0;
    let mut last_il = 0;
    for entry in code.line_numbers.iter() {
        assert!(
            entry.il_offset >= last_il,
            "IL offsets regress at {entry:?}"
        );
        assert!(
            entry.native_offset >= last_native,
            "native offsets regress at {entry:?}"
        );
        last_il = entry.il_offset;
        last_native = entry.native_offset;
    }
}

#[test]
fn branches_land_on_instruction_boundaries() {
    let (fx, fib) = fib_fixture();
    let cm = fx.engine.prepare_method(fib).unwrap();
    let code = &cm.code().unwrap().code;
    let bounds = boundaries(code);
    for &ip in &bounds {
        let op = MintOp::from_word(code[ip]).unwrap();
        for target in branch_targets(code, ip, op) {
            assert!(
                target >= 0 && (target as usize) < code.len(),
                "branch at IR_{ip:04x} leaves the method"
            );
            assert!(
                bounds.contains(&(target as usize)),
                "branch at IR_{ip:04x} lands mid-instruction"
            );
        }
    }
}

#[test]
fn abstract_stack_never_underflows() {
    let (fx, fib) = fib_fixture();
    let cm = fx.engine.prepare_method(fib).unwrap();
    let mcode = cm.code().unwrap();
    let code = &mcode.code;

    // Depth-only abstract interpretation over the control-flow graph.
    let mut depth_at = std::collections::HashMap::new();
    let mut work = vec![(0usize, 0i32)];
    while let Some((ip, depth)) = work.pop() {
        if ip >= code.len() {
            continue;
        }
        if let Some(&seen) = depth_at.get(&ip) {
            assert_eq!(seen, depth, "inconsistent stack depth at IR_{ip:04x}");
            continue;
        }
        depth_at.insert(ip, depth);
        let op = MintOp::from_word(code[ip]).unwrap();
        let desc = op.desc();
        assert!(
            desc.pop >= 0,
            "fib should not contain variable-arity opcodes"
        );
        let after_pop = depth - desc.pop as i32;
        assert!(after_pop >= 0, "stack underflow at IR_{ip:04x}");
        let depth = after_pop + desc.push as i32;
        assert!(
            depth <= mcode.stack_size as i32,
            "stack exceeds the computed maximum after IR_{ip:04x}"
        );
        let next = ip + op.len_at(code, ip);
        match op {
            MintOp::Ret | MintOp::RetVoid | MintOp::RetVt => {}
            MintOp::Br | MintOp::BrS => {
                for t in branch_targets(code, ip, op) {
                    work.push((t as usize, depth));
                }
            }
            _ => {
                for t in branch_targets(code, ip, op) {
                    work.push((t as usize, depth));
                }
                work.push((next, depth));
            }
        }
    }
}

#[test]
fn clause_ranges_are_contained() {
    let (fx, m) = fixture(|builder, tests| {
        let overflow = builder.find_class("System.OverflowException").unwrap();
        let mut b = BodyBuilder::new();
        let try_start = b.here();
        b.op(Instr::ldarg_0).op(Instr::conv_ovf_i4).op(Instr::stloc_0);
        let end = b.label();
        b.leave(end);
        let handler_start = b.here();
        b.op(Instr::pop);
        b.op(Instr::ldc_i4_m1).op(Instr::stloc_0);
        b.leave(end);
        let handler_end = b.here();
        b.place(end);
        b.op(Instr::ldloc_0).op(Instr::ret);
        b.catch_clause(
            try_start,
            handler_start,
            handler_start,
            handler_end,
            HostRuntime::class_token(overflow),
        );
        static_method(
            builder,
            tests,
            "Checked",
            vec![TypeDesc::I8],
            TypeDesc::I4,
            vec![TypeDesc::I4],
            b.finish().unwrap(),
        )
    });
    let cm = fx.engine.prepare_method(m).unwrap();
    let code = cm.code().unwrap();
    assert_eq!(code.clauses.len(), 1);
    for clause in code.clauses.iter() {
        assert!(clause.try_start < clause.try_end);
        assert!(clause.try_end <= clause.handler_start);
        assert!(clause.handler_start < clause.handler_end);
        assert!((clause.handler_end as usize) <= code.code.len());
        // One exception slot per clause, inside the local area.
        assert!(clause.exvar_offset >= code.args_size);
        assert!(clause.exvar_offset < code.args_size + code.locals_size);
    }
    assert_eq!(code.exvar_offsets.len(), code.clauses.len());
}

#[test]
fn sequence_points_are_emitted_with_successors() {
    let (fx, fib) = fib_fixture();
    let cm = fx.engine.prepare_method(fib).unwrap();
    let code = cm.code().unwrap();

    assert!(!code.seq_points.is_empty());
    // The method entry point is always first.
    assert_eq!(code.seq_points[0].native_offset, 0);
    // The loop header carries an interruption check.
    assert!(code
        .code
        .iter()
        .any(|&w| w == MintOp::SdbIntrLoc as u16 || w == MintOp::Safepoint as u16));
    // Entry must reach some other sequence point.
    assert!(!code.seq_points[0].next.is_empty());
    for sp in code.seq_points.iter() {
        for &n in &sp.next {
            assert!((n as usize) < code.seq_points.len());
        }
    }
}

#[test]
fn jit_info_is_published_and_breakpoints_validate() {
    let (fx, fib) = fib_fixture();
    fx.engine.prepare_method(fib).unwrap();
    let info = fx.engine.find_jit_info(fib).expect("published");
    assert!(info.code_len > 0);
    assert_eq!(info.locals.len(), 4);
    assert_eq!(info.params.len(), 1);
    assert!(!info.line_numbers.is_empty());

    // In-range locations accept breakpoints; out-of-range ones do not.
    assert!(fx.engine.set_breakpoint(fib, 0));
    assert!(!fx.engine.set_breakpoint(fib, info.code_len + 100));
    fx.engine.clear_breakpoint(fib, 0);
}

#[test]
fn transformed_method_disassembles() {
    let (fx, fib) = fib_fixture();
    let cm = fx.engine.prepare_method(fib).unwrap();
    let text = cm.code().unwrap().to_string();
    assert!(text.contains("stinarg"));
    assert!(text.contains("ldloc.i4"));
    assert!(text.contains("add.i4"));
    assert!(text.contains("ret"));
    assert!(text.contains("IR_0000"));
}

#[test]
fn transform_is_usable_after_execution_too() {
    // Transformation through the invoke path and through prepare_method
    // must agree on one payload.
    let (fx, fib) = fib_fixture();
    let mut exc = None;
    let result = fx
        .engine
        .runtime_invoke(fib, None, &[ManagedValue::I32(10)], &mut exc)
        .unwrap();
    assert_eq!(result, ManagedValue::I32(55));
    let cm = fx.engine.prepare_method(fib).unwrap();
    let via_registry = fx
        .engine
        .registry()
        .lookup(fib, cilrun_engine::TypeContext::EMPTY)
        .unwrap();
    assert!(std::sync::Arc::ptr_eq(&cm, &via_registry));
}
