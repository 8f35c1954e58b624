//! Shared fixture helpers for the integration tests: build a host
//! registry, define static methods on a `Tests` class, and invoke them
//! through the engine.

#![allow(dead_code)]

use std::sync::Arc;

use cilrun_engine::{
    ClassBuilder, ClassId, Engine, EngineConfig, HostBuilder, HostRuntime, ManagedValue,
    MethodBuilder, MethodHandle, MethodSignature, ObjRef, TypeDesc,
};

pub struct Fixture {
    pub engine: Arc<Engine>,
    pub host: Arc<HostRuntime>,
}

/// Build a host with a `Tests` class, hand the builder (and the class id)
/// to the setup closure, then bring the engine up.
pub fn fixture<R>(setup: impl FnOnce(&mut HostBuilder, ClassId) -> R) -> (Fixture, R) {
    let mut builder = HostBuilder::new();
    let (tests_class, _) = builder.define_class(ClassBuilder::new("Tests"));
    let result = setup(&mut builder, tests_class);
    let host = builder.finish();
    let engine = Engine::new(host.clone(), host.clone(), EngineConfig::default());
    (Fixture { engine, host }, result)
}

/// Define a static IL method.
pub fn static_method(
    builder: &mut HostBuilder,
    owner: ClassId,
    name: &str,
    params: Vec<TypeDesc>,
    ret: TypeDesc,
    locals: Vec<TypeDesc>,
    body: cilrun_cil::MethodBody,
) -> MethodHandle {
    builder.define_method(
        MethodBuilder::new(
            owner,
            name,
            MethodSignature {
                has_this: false,
                params,
                ret,
            },
        )
        .static_()
        .locals(locals)
        .body(body),
    )
}

/// Invoke and expect a successful i32 result.
pub fn invoke_i32(fx: &Fixture, method: MethodHandle, args: &[ManagedValue]) -> i32 {
    let mut exc = None;
    let result = fx
        .engine
        .runtime_invoke(method, None, args, &mut exc)
        .expect("invoke");
    assert!(exc.is_none(), "unexpected managed exception");
    match result {
        ManagedValue::I32(v) => v,
        other => panic!("expected an i32 result, got {other:?}"),
    }
}

/// Invoke and expect a managed exception; returns the exception object.
pub fn invoke_expect_exception(
    fx: &Fixture,
    method: MethodHandle,
    args: &[ManagedValue],
) -> ObjRef {
    let mut exc = None;
    fx.engine
        .runtime_invoke(method, None, args, &mut exc)
        .expect("invoke");
    exc.expect("expected a managed exception")
}

/// Class of a (non-null) managed object.
pub fn class_of(obj: ObjRef) -> ClassId {
    assert!(!obj.is_null());
    unsafe { obj.class() }
}
