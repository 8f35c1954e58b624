//! Engine facade
//!
//! Owns the collaborator trait objects and every cross-thread registry:
//! the method registry, the debug registry, the function-pointer
//! descriptor table, and the parsed configuration. All public entry
//! points ([`crate::invoke`]) hang off this type.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::EngineConfig;
use crate::debug::DebugRegistry;
use crate::error::EngineResult;
use crate::imethod::{CompiledMethod, MethodRegistry};
use crate::meta::{MetadataProvider, MethodHandle, TypeContext};
use crate::object::ObjectRuntime;

/// The interpreter engine.
pub struct Engine {
    meta: Arc<dyn MetadataProvider>,
    runtime: Arc<dyn ObjectRuntime>,
    registry: MethodRegistry,
    debug: DebugRegistry,
    config: EngineConfig,
    // Function-pointer descriptors: a method pointer is the small integer
    // id of its descriptor, routed back through the dispatcher.
    ftn_methods: DashMap<usize, Arc<CompiledMethod>>,
    ftn_ids: DashMap<usize, usize>,
    next_ftn: AtomicUsize,
}

impl Engine {
    /// Build an engine over the given collaborators.
    pub fn new(
        meta: Arc<dyn MetadataProvider>,
        runtime: Arc<dyn ObjectRuntime>,
        config: EngineConfig,
    ) -> Arc<Engine> {
        Arc::new(Engine {
            meta,
            runtime,
            registry: MethodRegistry::new(),
            debug: DebugRegistry::new(),
            config,
            ftn_methods: DashMap::new(),
            ftn_ids: DashMap::new(),
            next_ftn: AtomicUsize::new(1),
        })
    }

    /// The metadata collaborator.
    #[inline]
    pub fn metadata(&self) -> &dyn MetadataProvider {
        &*self.meta
    }

    /// The object runtime collaborator.
    #[inline]
    pub fn object_runtime(&self) -> &dyn ObjectRuntime {
        &*self.runtime
    }

    /// The method registry.
    #[inline]
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// The debug registry.
    #[inline]
    pub fn debug(&self) -> &DebugRegistry {
        &self.debug
    }

    /// The parsed configuration.
    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve a method handle to its interned compiled form.
    pub fn resolve(
        &self,
        handle: MethodHandle,
        ctx: TypeContext,
    ) -> EngineResult<Arc<CompiledMethod>> {
        self.registry.resolve(&*self.meta, &*self.runtime, handle, ctx)
    }

    /// Intern a function-pointer id for `method`. Stable per method.
    pub(crate) fn ftn_id(&self, method: &Arc<CompiledMethod>) -> usize {
        let key = Arc::as_ptr(method) as usize;
        if let Some(id) = self.ftn_ids.get(&key) {
            return *id;
        }
        let id = self.next_ftn.fetch_add(1, Ordering::Relaxed);
        // First insert wins; a racing thread hands out the same mapping.
        let id = *self.ftn_ids.entry(key).or_insert(id);
        self.ftn_methods.entry(id).or_insert_with(|| method.clone());
        id
    }

    /// Method behind a function-pointer id.
    pub(crate) fn ftn_method(&self, id: usize) -> Option<Arc<CompiledMethod>> {
        self.ftn_methods.get(&id).map(|e| e.clone())
    }
}
