//! End-to-end interpreter scenarios: build IL with the assembler, run it
//! through the engine against the reference host, and assert on results
//! and managed exceptions.

mod common;

use cilrun_cil::{BodyBuilder, Instr, MethodBody};
use cilrun_engine::{
    ClassBuilder, HostRuntime, ManagedValue, MetadataProvider, MethodBuilder, MethodSignature,
    ObjectRuntime, RuntimeExceptionKind, TypeDesc,
};
use common::*;

fn simple_ret_body(ops: &[Instr]) -> MethodBody {
    let mut b = BodyBuilder::new();
    for op in ops {
        b.op(op.clone());
    }
    b.finish().unwrap()
}

#[test]
fn fib_10_returns_55() {
    // Iterative Fibonacci over locals a, b, i, t.
    let (fx, fib) = fixture(|builder, tests| {
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

        static_method(
            builder,
            tests,
            "Fib",
            vec![TypeDesc::I4],
            TypeDesc::I4,
            vec![TypeDesc::I4, TypeDesc::I4, TypeDesc::I4, TypeDesc::I4],
            b.finish().unwrap(),
        )
    });
    assert_eq!(invoke_i32(&fx, fib, &[ManagedValue::I32(10)]), 55);
    assert_eq!(invoke_i32(&fx, fib, &[ManagedValue::I32(1)]), 1);
    assert_eq!(invoke_i32(&fx, fib, &[ManagedValue::I32(0)]), 0);
}

#[test]
fn divide_by_zero_traps() {
    let (fx, div) = fixture(|builder, tests| {
        static_method(
            builder,
            tests,
            "Div",
            vec![TypeDesc::I4, TypeDesc::I4],
            TypeDesc::I4,
            vec![],
            simple_ret_body(&[Instr::ldarg_0, Instr::ldarg_1, Instr::div, Instr::ret]),
        )
    });
    assert_eq!(
        invoke_i32(&fx, div, &[ManagedValue::I32(7), ManagedValue::I32(2)]),
        3
    );
    let exc = invoke_expect_exception(&fx, div, &[ManagedValue::I32(1), ManagedValue::I32(0)]);
    assert_eq!(
        class_of(exc),
        fx.host.exception_class(RuntimeExceptionKind::DivideByZero)
    );
    // MININT / -1 overflows.
    let exc = invoke_expect_exception(
        &fx,
        div,
        &[ManagedValue::I32(i32::MIN), ManagedValue::I32(-1)],
    );
    assert_eq!(
        class_of(exc),
        fx.host.exception_class(RuntimeExceptionKind::Overflow)
    );
}

#[test]
fn checked_overflow_is_caught() {
    // try { return checked((int)v); } catch (OverflowException) { return -1; }
    let (fx, m) = fixture(|builder, tests| {
        let overflow_class = builder.find_class("System.OverflowException").unwrap();
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
            HostRuntime::class_token(overflow_class),
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
    assert_eq!(invoke_i32(&fx, m, &[ManagedValue::I64(i64::MAX)]), -1);
    assert_eq!(invoke_i32(&fx, m, &[ManagedValue::I64(12345)]), 12345);
    assert_eq!(
        invoke_i32(&fx, m, &[ManagedValue::I64(i32::MIN as i64)]),
        i32::MIN
    );
}

#[test]
fn covariant_array_store_traps() {
    // string[] aliased as object[]; storing a plain object traps.
    let (fx, m) = fixture(|builder, tests| {
        let string_class = builder.find_class("System.String").unwrap();
        let object_class = builder.find_class("System.Object").unwrap();
        let object_ctor = builder.define_method(
            MethodBuilder::new(
                object_class,
                ".ctor",
                MethodSignature {
                    has_this: true,
                    params: vec![],
                    ret: TypeDesc::Void,
                },
            )
            .body(simple_ret_body(&[Instr::ret])),
        );

        let mut b = BodyBuilder::new();
        b.op(Instr::ldc_i4_1);
        b.op(Instr::newarr(HostRuntime::class_token(string_class)));
        b.op(Instr::stloc_0);
        b.op(Instr::ldloc_0);
        b.op(Instr::ldc_i4_0);
        b.op(Instr::newobj(HostRuntime::method_token(object_ctor)));
        b.op(Instr::stelem_ref);
        b.op(Instr::ldc_i4_0).op(Instr::ret);

        static_method(
            builder,
            tests,
            "CovariantStore",
            vec![],
            TypeDesc::I4,
            vec![TypeDesc::Object(object_class)],
            b.finish().unwrap(),
        )
    });
    let exc = invoke_expect_exception(&fx, m, &[]);
    assert_eq!(
        class_of(exc),
        fx.host
            .exception_class(RuntimeExceptionKind::ArrayTypeMismatch)
    );
}

#[test]
fn finally_runs_on_leave() {
    // try { goto L; } finally { flag = 1; } L: return flag;
    let (fx, m) = fixture(|builder, tests| {
        let mut b = BodyBuilder::new();
        let try_start = b.here();
        let target = b.label();
        b.leave(target);
        let handler_start = b.here();
        b.op(Instr::ldc_i4_1).op(Instr::stloc_0);
        b.op(Instr::endfinally);
        let handler_end = b.here();
        b.place(target);
        b.op(Instr::ldloc_0).op(Instr::ret);
        b.finally_clause(try_start, handler_start, handler_start, handler_end);

        static_method(
            builder,
            tests,
            "FinallyOnLeave",
            vec![],
            TypeDesc::I4,
            vec![TypeDesc::I4],
            b.finish().unwrap(),
        )
    });
    assert_eq!(invoke_i32(&fx, m, &[]), 1);
}

#[test]
fn rethrow_preserves_exception_type() {
    // try { throw new InvalidCastException(); } catch (Exception) { throw; }
    let (fx, m) = fixture(|builder, tests| {
        let ice_class = builder.find_class("System.InvalidCastException").unwrap();
        let exception_class = builder.find_class("System.Exception").unwrap();
        let ice_ctor = builder.define_method(
            MethodBuilder::new(
                ice_class,
                ".ctor",
                MethodSignature {
                    has_this: true,
                    params: vec![],
                    ret: TypeDesc::Void,
                },
            )
            .body(simple_ret_body(&[Instr::ret])),
        );

        let mut b = BodyBuilder::new();
        let try_start = b.here();
        b.op(Instr::newobj(HostRuntime::method_token(ice_ctor)));
        b.op(Instr::throw);
        let handler_start = b.here();
        b.op(Instr::pop);
        b.op(Instr::prefixed(cilrun_cil::ExtInstr::rethrow));
        let handler_end = b.here();
        b.op(Instr::ldc_i4_0).op(Instr::ret);
        b.catch_clause(
            try_start,
            handler_start,
            handler_start,
            handler_end,
            HostRuntime::class_token(exception_class),
        );

        static_method(
            builder,
            tests,
            "Rethrow",
            vec![],
            TypeDesc::I4,
            vec![],
            b.finish().unwrap(),
        )
    });
    let exc = invoke_expect_exception(&fx, m, &[]);
    assert_eq!(
        class_of(exc),
        fx.host.exception_class(RuntimeExceptionKind::InvalidCast)
    );
}

#[test]
fn virtual_dispatch_selects_override() {
    let (fx, m) = fixture(|builder, tests| {
        let (base, _) = builder.define_class(ClassBuilder::new("Base"));
        let get_sig = MethodSignature {
            has_this: true,
            params: vec![],
            ret: TypeDesc::I4,
        };
        let base_get = builder.define_method(
            MethodBuilder::new(base, "Get", get_sig.clone())
                .virtual_new_slot()
                .body(simple_ret_body(&[Instr::ldc_i4_1, Instr::ret])),
        );
        let base_slot = builder.method_slot(base_get).unwrap();
        let (derived, _) = builder.define_class(ClassBuilder::new("Derived").parent(base));
        builder.define_method(
            MethodBuilder::new(derived, "Get", get_sig.clone())
                .overrides(base_slot)
                .body(simple_ret_body(&[Instr::ldc_i4_2, Instr::ret])),
        );
        let base_ctor = builder.define_method(
            MethodBuilder::new(
                base,
                ".ctor",
                MethodSignature {
                    has_this: true,
                    params: vec![],
                    ret: TypeDesc::Void,
                },
            )
            .body(simple_ret_body(&[Instr::ret])),
        );
        let derived_ctor = builder.define_method(
            MethodBuilder::new(
                derived,
                ".ctor",
                MethodSignature {
                    has_this: true,
                    params: vec![],
                    ret: TypeDesc::Void,
                },
            )
            .body(simple_ret_body(&[Instr::ret])),
        );
        let _ = (base_ctor, base_get);

        // return new Derived().Get() + new Base().Get() * 10
        let mut b = BodyBuilder::new();
        b.op(Instr::newobj(HostRuntime::method_token(derived_ctor)));
        b.op(Instr::callvirt(HostRuntime::method_token(base_get)));
        b.op(Instr::newobj(HostRuntime::method_token(base_ctor)));
        b.op(Instr::callvirt(HostRuntime::method_token(base_get)));
        b.op(Instr::ldc_i4_s(10));
        b.op(Instr::mul);
        b.op(Instr::add);
        b.op(Instr::ret);

        static_method(
            builder,
            tests,
            "VirtualDispatch",
            vec![],
            TypeDesc::I4,
            vec![],
            b.finish().unwrap(),
        )
    });
    // Derived.Get() == 2, Base.Get() == 1.
    assert_eq!(invoke_i32(&fx, m, &[]), 12);
}

#[test]
fn callvirt_on_null_receiver_traps() {
    let (fx, m) = fixture(|builder, tests| {
        let (base, _) = builder.define_class(ClassBuilder::new("Thing"));
        let get = builder.define_method(
            MethodBuilder::new(
                base,
                "Get",
                MethodSignature {
                    has_this: true,
                    params: vec![],
                    ret: TypeDesc::I4,
                },
            )
            .virtual_new_slot()
            .body(simple_ret_body(&[Instr::ldc_i4_1, Instr::ret])),
        );
        let mut b = BodyBuilder::new();
        b.op(Instr::ldnull);
        b.op(Instr::callvirt(HostRuntime::method_token(get)));
        b.op(Instr::ret);
        static_method(
            builder,
            tests,
            "NullReceiver",
            vec![],
            TypeDesc::I4,
            vec![],
            b.finish().unwrap(),
        )
    });
    let exc = invoke_expect_exception(&fx, m, &[]);
    assert_eq!(
        class_of(exc),
        fx.host.exception_class(RuntimeExceptionKind::NullReference)
    );
}

#[test]
fn value_type_fields_roundtrip() {
    // struct Point { int x; int y; }  return p.x + p.y after stores.
    let (fx, m) = fixture(|builder, tests| {
        let (point, fields) = builder.define_class(
            ClassBuilder::new("Point")
                .valuetype()
                .field(TypeDesc::I4)
                .field(TypeDesc::I4),
        );
        let fx_token = HostRuntime::field_token(fields[0]);
        let fy_token = HostRuntime::field_token(fields[1]);

        let mut b = BodyBuilder::new();
        b.op(Instr::ldloca_s(0));
        b.op(Instr::prefixed(cilrun_cil::ExtInstr::initobj(
            HostRuntime::class_token(point),
        )));
        b.op(Instr::ldloca_s(0));
        b.op(Instr::ldc_i4_3);
        b.op(Instr::stfld(fx_token));
        b.op(Instr::ldloca_s(0));
        b.op(Instr::ldc_i4_4);
        b.op(Instr::stfld(fy_token));
        b.op(Instr::ldloca_s(0));
        b.op(Instr::ldfld(fx_token));
        b.op(Instr::ldloca_s(0));
        b.op(Instr::ldfld(fy_token));
        b.op(Instr::add);
        b.op(Instr::ret);

        static_method(
            builder,
            tests,
            "PointSum",
            vec![],
            TypeDesc::I4,
            vec![TypeDesc::ValueType(point)],
            b.finish().unwrap(),
        )
    });
    assert_eq!(invoke_i32(&fx, m, &[]), 7);
}

#[test]
fn box_unbox_roundtrip() {
    let (fx, m) = fixture(|builder, tests| {
        let int32 = builder.find_class("System.Int32").unwrap();
        let mut b = BodyBuilder::new();
        b.op(Instr::ldarg_0);
        b.op(Instr::box_val(HostRuntime::class_token(int32)));
        b.op(Instr::unbox_any(HostRuntime::class_token(int32)));
        b.op(Instr::ret);
        static_method(
            builder,
            tests,
            "BoxRoundtrip",
            vec![TypeDesc::I4],
            TypeDesc::I4,
            vec![],
            b.finish().unwrap(),
        )
    });
    assert_eq!(invoke_i32(&fx, m, &[ManagedValue::I32(-1234)]), -1234);
}

#[test]
fn unbox_wrong_class_traps() {
    let (fx, m) = fixture(|builder, tests| {
        let int32 = builder.find_class("System.Int32").unwrap();
        let int64 = builder.find_class("System.Int64").unwrap();
        let mut b = BodyBuilder::new();
        b.op(Instr::ldc_i4_5);
        b.op(Instr::box_val(HostRuntime::class_token(int32)));
        b.op(Instr::unbox(HostRuntime::class_token(int64)));
        b.op(Instr::pop);
        b.op(Instr::ldc_i4_0);
        b.op(Instr::ret);
        static_method(
            builder,
            tests,
            "UnboxWrong",
            vec![],
            TypeDesc::I4,
            vec![],
            b.finish().unwrap(),
        )
    });
    let exc = invoke_expect_exception(&fx, m, &[]);
    assert_eq!(
        class_of(exc),
        fx.host.exception_class(RuntimeExceptionKind::InvalidCast)
    );
}

#[test]
fn string_intrinsics() {
    let (fx, (len_m, chr_m)) = fixture(|builder, tests| {
        let string_class = builder.find_class("System.String").unwrap();
        let get_length = builder.define_method(MethodBuilder::new(
            string_class,
            "get_Length",
            MethodSignature {
                has_this: true,
                params: vec![],
                ret: TypeDesc::I4,
            },
        ));
        let get_chars = builder.define_method(MethodBuilder::new(
            string_class,
            "get_Chars",
            MethodSignature {
                has_this: true,
                params: vec![TypeDesc::I4],
                ret: TypeDesc::Char,
            },
        ));
        let hello = builder.string("hello");

        let mut b = BodyBuilder::new();
        b.op(Instr::ldstr(hello));
        b.op(Instr::call(HostRuntime::method_token(get_length)));
        b.op(Instr::ret);
        let len_m = static_method(
            builder,
            tests,
            "StrLen",
            vec![],
            TypeDesc::I4,
            vec![],
            b.finish().unwrap(),
        );

        let mut b = BodyBuilder::new();
        b.op(Instr::ldstr(hello));
        b.op(Instr::ldarg_0);
        b.op(Instr::call(HostRuntime::method_token(get_chars)));
        b.op(Instr::ret);
        let chr_m = static_method(
            builder,
            tests,
            "StrChr",
            vec![TypeDesc::I4],
            TypeDesc::I4,
            vec![],
            b.finish().unwrap(),
        );
        (len_m, chr_m)
    });
    assert_eq!(invoke_i32(&fx, len_m, &[]), 5);
    assert_eq!(
        invoke_i32(&fx, chr_m, &[ManagedValue::I32(1)]),
        'e' as i32
    );
    let exc = invoke_expect_exception(&fx, chr_m, &[ManagedValue::I32(9)]);
    assert_eq!(
        class_of(exc),
        fx.host
            .exception_class(RuntimeExceptionKind::IndexOutOfRange)
    );
}

#[test]
fn static_fields_hold_state_across_calls() {
    let (fx, (set_m, get_m)) = fixture(|builder, tests| {
        let (_, fields) = builder.define_class(
            ClassBuilder::new("Counter").static_field(TypeDesc::I4),
        );
        let token = HostRuntime::field_token(fields[0]);

        let mut b = BodyBuilder::new();
        b.op(Instr::ldarg_0);
        b.op(Instr::stsfld(token));
        b.op(Instr::ret);
        let set_m = static_method(
            builder,
            tests,
            "Set",
            vec![TypeDesc::I4],
            TypeDesc::Void,
            vec![],
            b.finish().unwrap(),
        );

        let mut b = BodyBuilder::new();
        b.op(Instr::ldsfld(token));
        b.op(Instr::ret);
        let get_m = static_method(
            builder,
            tests,
            "Get",
            vec![],
            TypeDesc::I4,
            vec![],
            b.finish().unwrap(),
        );
        (set_m, get_m)
    });
    let mut exc = None;
    fx.engine
        .runtime_invoke(set_m, None, &[ManagedValue::I32(41)], &mut exc)
        .unwrap();
    assert!(exc.is_none());
    assert_eq!(invoke_i32(&fx, get_m, &[]), 41);
}

#[test]
fn switch_dispatches_and_falls_through() {
    let (fx, m) = fixture(|builder, tests| {
        let mut b = BodyBuilder::new();
        let case0 = b.label();
        let case1 = b.label();
        b.op(Instr::ldarg_0);
        b.switch(&[case0, case1]);
        b.op(Instr::ldc_i4_m1).op(Instr::ret);
        b.place(case0);
        b.op(Instr::ldc_i4_s(100)).op(Instr::ret);
        b.place(case1);
        b.op(Instr::ldc_i4_s(101)).op(Instr::ret);
        static_method(
            builder,
            tests,
            "Switch",
            vec![TypeDesc::I4],
            TypeDesc::I4,
            vec![],
            b.finish().unwrap(),
        )
    });
    assert_eq!(invoke_i32(&fx, m, &[ManagedValue::I32(0)]), 100);
    assert_eq!(invoke_i32(&fx, m, &[ManagedValue::I32(1)]), 101);
    assert_eq!(invoke_i32(&fx, m, &[ManagedValue::I32(7)]), -1);
    assert_eq!(invoke_i32(&fx, m, &[ManagedValue::I32(-1)]), -1);
}

#[test]
fn recursive_calls_cross_frames() {
    // sum(n) = n <= 0 ? 0 : n + sum(n - 1); exercised without the
    // tail-recursion rewrite because the addition follows the call.
    let (fx, m) = fixture(|builder, tests| {
        let mut b = BodyBuilder::new();
        let recurse = b.label();
        b.op(Instr::ldarg_0);
        b.op(Instr::ldc_i4_0);
        b.bgt(recurse);
        b.op(Instr::ldc_i4_0).op(Instr::ret);
        b.place(recurse);
        b.op(Instr::ldarg_0);
        b.op(Instr::ldarg_0);
        b.op(Instr::ldc_i4_1);
        b.op(Instr::sub);
        // The method calls itself; its own handle is the next index the
        // builder hands out inside `static_method`.
        let self_token = HostRuntime::method_token(cilrun_engine::MethodHandle(
            builder.next_method_index() as u32,
        ));
        b.op(Instr::call(self_token));
        b.op(Instr::add);
        b.op(Instr::ret);
        static_method(
            builder,
            tests,
            "Sum",
            vec![TypeDesc::I4],
            TypeDesc::I4,
            vec![],
            b.finish().unwrap(),
        )
    });
    assert_eq!(invoke_i32(&fx, m, &[ManagedValue::I32(100)]), 5050);
}

#[test]
fn tail_recursive_call_reuses_the_frame() {
    // count(n) = n == 0 ? 0 : count(n - 1): the callee is the very next
    // instruction's ret, so the transformer rewrites it into a back
    // branch. A depth far beyond the arena capacity proves the rewrite.
    let (fx, m) = fixture(|builder, tests| {
        let mut b = BodyBuilder::new();
        let recurse = b.label();
        b.op(Instr::ldarg_0);
        b.brtrue(recurse);
        b.op(Instr::ldc_i4_0).op(Instr::ret);
        b.place(recurse);
        b.op(Instr::ldarg_0);
        b.op(Instr::ldc_i4_1);
        b.op(Instr::sub);
        let self_token = HostRuntime::method_token(cilrun_engine::MethodHandle(
            builder.next_method_index() as u32,
        ));
        b.op(Instr::call(self_token));
        b.op(Instr::ret);
        static_method(
            builder,
            tests,
            "Count",
            vec![TypeDesc::I4],
            TypeDesc::I4,
            vec![],
            b.finish().unwrap(),
        )
    });
    assert_eq!(invoke_i32(&fx, m, &[ManagedValue::I32(1_000_000)]), 0);
}

#[test]
fn interrupt_is_delivered_at_safepoints() {
    // An infinite loop only terminates through the loop-header poll.
    let (fx, m) = fixture(|builder, tests| {
        let mut b = BodyBuilder::new();
        let top = b.here();
        b.op(Instr::nop);
        b.br(top);
        static_method(
            builder,
            tests,
            "Spin",
            vec![],
            TypeDesc::Void,
            vec![],
            b.finish().unwrap(),
        )
    });
    let abort = fx
        .host
        .create_exception(RuntimeExceptionKind::InvalidOperation);
    fx.host.interrupt_with(abort);
    let exc = invoke_expect_exception(&fx, m, &[]);
    assert_eq!(exc, abort);
}

#[test]
fn filter_clause_selects_handler() {
    // try { throw; } filter (flag) handler { return 7; }  — with a false
    // filter the exception escapes.
    let (fx, (m, exception_class)) = fixture(|builder, tests| {
        let exception_class = builder.find_class("System.Exception").unwrap();
        let ctor = builder.define_method(
            MethodBuilder::new(
                exception_class,
                ".ctor",
                MethodSignature {
                    has_this: true,
                    params: vec![],
                    ret: TypeDesc::Void,
                },
            )
            .body(simple_ret_body(&[Instr::ret])),
        );
        let mut b = BodyBuilder::new();
        let try_start = b.here();
        b.op(Instr::newobj(HostRuntime::method_token(ctor)));
        b.op(Instr::throw);
        let filter_start = b.here();
        b.op(Instr::pop);
        b.op(Instr::ldarg_0);
        b.op(Instr::prefixed(cilrun_cil::ExtInstr::endfilter));
        let handler_start = b.here();
        b.op(Instr::pop);
        b.op(Instr::ldc_i4_7);
        b.op(Instr::stloc_0);
        let end = b.label();
        b.leave(end);
        let handler_end = b.here();
        b.place(end);
        b.op(Instr::ldloc_0).op(Instr::ret);
        b.filter_clause(try_start, filter_start, filter_start, handler_start, handler_end);
        let m = static_method(
            builder,
            tests,
            "Filtered",
            vec![TypeDesc::I4],
            TypeDesc::I4,
            vec![TypeDesc::I4],
            b.finish().unwrap(),
        );
        (m, exception_class)
    });
    assert_eq!(invoke_i32(&fx, m, &[ManagedValue::I32(1)]), 7);
    let exc = invoke_expect_exception(&fx, m, &[ManagedValue::I32(0)]);
    assert_eq!(class_of(exc), exception_class);
}

#[test]
fn finally_runs_during_exceptional_unwind_across_frames() {
    // Inner method throws; outer wraps the call in try/finally + catch.
    let (fx, (outer, _inner)) = fixture(|builder, tests| {
        let mut b = BodyBuilder::new();
        b.op(Instr::ldc_i4_1);
        b.op(Instr::ldc_i4_0);
        b.op(Instr::div);
        b.op(Instr::ret);
        let inner = static_method(
            builder,
            tests,
            "Thrower",
            vec![],
            TypeDesc::I4,
            vec![],
            b.finish().unwrap(),
        );

        let exception_class = builder.find_class("System.Exception").unwrap();
        let mut b = BodyBuilder::new();
        // locals: flag, result
        let try_start = b.here();
        b.op(Instr::call(HostRuntime::method_token(inner)));
        b.op(Instr::pop);
        let end = b.label();
        b.leave(end);
        let finally_start = b.here();
        b.op(Instr::ldc_i4_1).op(Instr::stloc_0);
        b.op(Instr::endfinally);
        let finally_end = b.here();
        let catch_start = b.here();
        b.op(Instr::pop);
        b.op(Instr::ldc_i4_2).op(Instr::stloc_1);
        b.leave(end);
        let catch_end = b.here();
        b.place(end);
        b.op(Instr::ldloc_0);
        b.op(Instr::ldloc_1);
        b.op(Instr::add);
        b.op(Instr::ret);
        b.finally_clause(try_start, finally_start, finally_start, finally_end);
        b.catch_clause(
            try_start,
            finally_start,
            catch_start,
            catch_end,
            HostRuntime::class_token(exception_class),
        );
        let outer = static_method(
            builder,
            tests,
            "Outer",
            vec![],
            TypeDesc::I4,
            vec![TypeDesc::I4, TypeDesc::I4],
            b.finish().unwrap(),
        );
        (outer, inner)
    });
    // finally sets flag=1, catch sets result=2.
    assert_eq!(invoke_i32(&fx, outer, &[]), 3);
}
