use std::{
    any::TypeId,
    cell::{Cell, RefCell},
    collections::{hash_map::Entry, HashMap, HashSet},
    fmt,
    rc::{Rc, Weak},
};

use crate::{
    descriptor::{Injected, Provide},
    errors::{InitError, ScopeError},
    injector::Injector,
    pending::PendingInit,
    signal::{Signal, SlotKey},
    types::{Instance, InstanceId, TypeInfo},
};

/// Behavior when a resolution finds no binding anywhere in the scope chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    /// Fail with [`ScopeError::NotRegistered`].
    #[default]
    Strict,
    /// Log a warning and leave the slot or result absent.
    Permissive,
    /// Register constructible concrete dependencies on the fly; everything
    /// else fails as in strict mode.
    AutoResolve,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeSettings {
    pub missing: MissingPolicy,
}

type ConstructDyn = dyn Fn(&Rc<Scope>) -> Result<Instance, ScopeError>;
type LateInject = Box<dyn Fn(&Rc<Scope>) -> Result<(), ScopeError>>;

enum Provider {
    /// Constructs, caches and injects on first resolution; covers both
    /// implementation and factory bindings.
    Construct(Rc<ConstructDyn>),
    /// Backed only by a pre-built cached instance.
    Value,
}

struct Binding {
    key: TypeInfo,
    transient: bool,
    provider: Provider,
}

/// A hierarchical registry of bindings and lazily constructed instances.
///
/// Child scopes delegate unresolved lookups to their parent; cleaning up a
/// parent cascades into its children. All access is single-threaded.
pub struct Scope {
    settings: ScopeSettings,
    bindings: RefCell<HashMap<TypeId, Binding>>,
    cache: RefCell<HashMap<TypeId, Instance>>,
    forced: RefCell<HashMap<InstanceId, LateInject>>,
    parent: RefCell<Option<Rc<Scope>>>,
    parent_slot: Cell<Option<SlotKey>>,
    cleanup: Signal<()>,
    injector: Injector,
    pending: PendingInit,
}

/// Weak back-reference to the owning scope, resolvable like any other
/// contract. Every scope registers one for itself.
#[derive(Clone)]
pub struct ScopeHandle {
    scope: Weak<Scope>,
}

impl ScopeHandle {
    pub fn scope(&self) -> Option<Rc<Scope>> {
        self.scope.upgrade()
    }
}

impl Scope {
    pub fn new(settings: ScopeSettings) -> Rc<Scope> {
        Rc::new_cyclic(|weak_self: &Weak<Scope>| {
            let mut bindings = HashMap::new();
            let mut cache = HashMap::new();

            // self handle, so injected objects can reach their owning scope
            let key = TypeInfo::of::<ScopeHandle>();
            let handle = Rc::new(ScopeHandle {
                scope: weak_self.clone(),
            });
            bindings.insert(
                key.type_id,
                Binding {
                    key,
                    transient: false,
                    provider: Provider::Value,
                },
            );
            cache.insert(key.type_id, Instance::new(handle));

            Scope {
                settings,
                bindings: RefCell::new(bindings),
                cache: RefCell::new(cache),
                forced: RefCell::new(HashMap::new()),
                parent: RefCell::new(None),
                parent_slot: Cell::new(None),
                cleanup: Signal::new(),
                injector: Injector::default(),
                pending: PendingInit::default(),
            }
        })
    }

    /// Creates a child scope that delegates unresolved lookups here and is
    /// cleaned up when this scope is.
    pub fn child(self: &Rc<Self>) -> Rc<Scope> {
        let child = Scope::new(self.settings.clone());
        *child.parent.borrow_mut() = Some(self.clone());

        let weak = Rc::downgrade(&child);
        let slot = self.cleanup.connect(move |_| {
            if let Some(child) = weak.upgrade() {
                child.clean_up();
            }
        });
        child.parent_slot.set(Some(slot));

        child
    }

    // ### Registration

    /// Binds a concrete type as its own contract.
    pub fn register<T: Injected>(self: &Rc<Self>) -> Result<(), ScopeError> {
        self.register_as::<T, T>()
    }

    /// Binds contract `C` to implementation `T`.
    pub fn register_as<C: ?Sized + 'static, T: Provide<C>>(
        self: &Rc<Self>,
    ) -> Result<(), ScopeError> {
        self.bind_constructor::<C, T>(false)
    }

    /// Like [`register`](Scope::register), but every resolution constructs a
    /// fresh instance.
    pub fn register_transient<T: Injected>(self: &Rc<Self>) -> Result<(), ScopeError> {
        self.register_transient_as::<T, T>()
    }

    pub fn register_transient_as<C: ?Sized + 'static, T: Provide<C>>(
        self: &Rc<Self>,
    ) -> Result<(), ScopeError> {
        self.bind_constructor::<C, T>(true)
    }

    /// Binds contract `C` to a factory producing `T`. The product is cached
    /// and injected like a constructed instance.
    pub fn register_factory<C: ?Sized + 'static, T: Provide<C>>(
        self: &Rc<Self>,
        factory: impl Fn() -> T + 'static,
    ) -> Result<(), ScopeError> {
        self.bind_factory::<C, T>(factory, false)
    }

    pub fn register_transient_factory<C: ?Sized + 'static, T: Provide<C>>(
        self: &Rc<Self>,
        factory: impl Fn() -> T + 'static,
    ) -> Result<(), ScopeError> {
        self.bind_factory::<C, T>(factory, true)
    }

    /// Installs a pre-built instance under its own type and queues it for a
    /// late injection pass on first resolution.
    pub fn register_instance<T: Injected>(
        self: &Rc<Self>,
        instance: Rc<T>,
    ) -> Result<(), ScopeError> {
        self.install_instance::<T, T>(instance, false)
    }

    /// Installs a pre-built instance under contract `C`.
    pub fn register_instance_as<C: ?Sized + 'static, T: Provide<C>>(
        self: &Rc<Self>,
        instance: Rc<T>,
    ) -> Result<(), ScopeError> {
        self.install_instance::<C, T>(instance, false)
    }

    /// Installs a pre-built instance that must never receive injection.
    pub fn register_instance_uninjected<C: ?Sized + 'static, T: Provide<C>>(
        self: &Rc<Self>,
        instance: Rc<T>,
    ) -> Result<(), ScopeError> {
        self.install_instance::<C, T>(instance, true)
    }

    // ### Resolution

    /// Resolves a handle for contract `C`, constructing it if needed.
    pub fn get<C: ?Sized + 'static>(self: &Rc<Self>) -> Result<Rc<C>, ScopeError> {
        let key = TypeInfo::of::<C>();
        match self.resolve(key)? {
            Some(instance) => Self::downcast(instance),
            None => {
                if self.settings.missing == MissingPolicy::Permissive {
                    tracing::warn!("not registered: {key}");
                }
                Err(ScopeError::NotRegistered(key.type_name))
            }
        }
    }

    /// Like [`get`](Scope::get), but an unbound contract is `Ok(None)`
    /// instead of an error.
    pub fn try_get<C: ?Sized + 'static>(self: &Rc<Self>) -> Result<Option<Rc<C>>, ScopeError> {
        match self.resolve(TypeInfo::of::<C>())? {
            Some(instance) => Self::downcast(instance).map(Some),
            None => Ok(None),
        }
    }

    /// Discovery-by-need: registers `T` if nothing in the scope chain binds
    /// it, then resolves it.
    pub fn ensure<T: Injected>(self: &Rc<Self>) -> Result<Rc<T>, ScopeError> {
        if !self.has::<T>() {
            self.register::<T>()?;
        }
        self.get::<T>()
    }

    /// True if `C` is bound in this scope or any ancestor.
    pub fn has<C: ?Sized + 'static>(&self) -> bool {
        self.has_key(TypeId::of::<C>())
    }

    /// Runs the injection pass on an externally constructed instance.
    pub fn inject<T: Injected>(self: &Rc<Self>, instance: &Rc<T>) -> Result<(), ScopeError> {
        self.injector.inject(self, instance)
    }

    // ### Lifecycle

    /// Subscribes a hook to this scope's teardown. Hooks run exactly once.
    pub fn on_clean_up(&self, hook: impl Fn() + 'static) -> SlotKey {
        self.cleanup.connect(move |_| hook())
    }

    pub fn unsubscribe_clean_up(&self, slot: SlotKey) -> bool {
        self.cleanup.disconnect(slot)
    }

    /// Detaches from the parent, fires all cleanup hooks exactly once and
    /// releases every binding, instance and pending record. Idempotent.
    pub fn clean_up(&self) {
        if let Some(parent) = self.parent.borrow_mut().take() {
            if let Some(slot) = self.parent_slot.take() {
                parent.cleanup.disconnect(slot);
            }
        }

        self.cleanup.emit(&());
        self.cleanup.clear();

        self.bindings.borrow_mut().clear();
        self.cache.borrow_mut().clear();
        self.forced.borrow_mut().clear();
        self.pending.clear();
        self.injector.clear();
    }

    // ### Deferred initialization

    /// Signals that a declared-async instance finished initializing.
    ///
    /// Dependents whose outstanding set becomes empty run their queued
    /// post-init hooks; completion cascades through dependents that are
    /// themselves declared-async.
    pub fn init_done<T: ?Sized + 'static>(&self, instance: &Rc<T>) -> Result<(), InitError> {
        self.init_done_id(InstanceId::of(instance), std::any::type_name::<T>())
    }

    /// True if the instance is still initializing, checking this scope and
    /// then the parent chain.
    pub fn is_initializing<T: ?Sized + 'static>(&self, instance: &Rc<T>) -> bool {
        self.is_initializing_id(InstanceId::of(instance))
    }

    fn init_done_id(&self, id: InstanceId, type_name: &'static str) -> Result<(), InitError> {
        if !self.end_initializing(id) {
            tracing::error!("init_done for an instance of '{type_name}' that is not initializing");
            return Err(InitError::NotInitializing(type_name));
        }

        tracing::debug!("init done: {type_name}");
        self.release_waiters(id);
        Ok(())
    }

    fn end_initializing(&self, id: InstanceId) -> bool {
        if self.pending.end(id) {
            return true;
        }
        let parent = self.parent.borrow().clone();
        parent.is_some_and(|parent| parent.end_initializing(id))
    }

    fn release_waiters(&self, dependency: InstanceId) {
        for record in self.pending.complete_dependency(dependency) {
            tracing::debug!("deferred init complete: {}", record.type_name);
            (record.run_post_init)();

            if record.init_async {
                if self.init_done_id(record.id, record.type_name).is_err() {
                    tracing::warn!(
                        "cascaded completion for '{}' but it was not initializing",
                        record.type_name
                    );
                }
            }
        }

        let parent = self.parent.borrow().clone();
        if let Some(parent) = parent {
            parent.release_waiters(dependency);
        }
    }

    // ### Internals shared with the injector

    pub(crate) fn resolve(self: &Rc<Self>, key: TypeInfo) -> Result<Option<Instance>, ScopeError> {
        let cached = self.cache.borrow().get(&key.type_id).cloned();
        if let Some(instance) = cached {
            // pre-built instances receive one injection pass on first resolve
            let late = self.forced.borrow_mut().remove(&instance.id());
            if let Some(late) = late {
                late(self)?;
            }
            return Ok(Some(instance));
        }

        let constructor = {
            let bindings = self.bindings.borrow();
            bindings.get(&key.type_id).map(|binding| {
                match &binding.provider {
                    Provider::Construct(construct) => Some(construct.clone()),
                    // a value binding without a cached instance cannot be
                    // satisfied locally
                    Provider::Value => None,
                }
            })
        };
        if let Some(Some(construct)) = constructor {
            return construct(self).map(Some);
        }

        let parent = self.parent.borrow().clone();
        match parent {
            Some(parent) => parent.resolve(key),
            None => Ok(None),
        }
    }

    pub(crate) fn missing_policy(&self) -> MissingPolicy {
        self.settings.missing
    }

    pub(crate) fn begin_initializing(&self, id: InstanceId) {
        self.pending.begin(id);
    }

    pub(crate) fn is_initializing_id(&self, id: InstanceId) -> bool {
        if self.pending.is_initializing(id) {
            return true;
        }
        let parent = self.parent.borrow().clone();
        parent.is_some_and(|parent| parent.is_initializing_id(id))
    }

    pub(crate) fn add_pending(
        &self,
        id: InstanceId,
        type_name: &'static str,
        init_async: bool,
        outstanding: HashSet<InstanceId>,
        run_post_init: Box<dyn Fn()>,
    ) {
        self.pending
            .add_record(id, type_name, init_async, outstanding, run_post_init);
    }

    // ### Private plumbing

    fn downcast<C: ?Sized + 'static>(instance: Instance) -> Result<Rc<C>, ScopeError> {
        instance
            .handle_of::<C>()
            .map_err(|cached| ScopeError::WrongHandleType {
                required: std::any::type_name::<C>(),
                cached,
            })
    }

    fn has_key(&self, key: TypeId) -> bool {
        if self.bindings.borrow().contains_key(&key) {
            return true;
        }
        let parent = self.parent.borrow().clone();
        parent.is_some_and(|parent| parent.has_key(key))
    }

    fn bind(&self, key: TypeInfo, transient: bool, provider: Provider) -> Result<(), ScopeError> {
        if matches!(provider, Provider::Value) && !self.cache.borrow().contains_key(&key.type_id) {
            return Err(ScopeError::CannotRegisterAsValue(key.type_name));
        }

        match self.bindings.borrow_mut().entry(key.type_id) {
            Entry::Occupied(_) => Err(ScopeError::AlreadyRegistered(key.type_name)),
            Entry::Vacant(vacant) => {
                vacant.insert(Binding {
                    key,
                    transient,
                    provider,
                });
                Ok(())
            }
        }
    }

    fn bind_constructor<C: ?Sized + 'static, T: Provide<C>>(
        self: &Rc<Self>,
        transient: bool,
    ) -> Result<(), ScopeError> {
        let construct: Rc<ConstructDyn> = Rc::new(move |scope: &Rc<Scope>| {
            finish_construction::<C, T>(scope, Rc::new(T::construct()), transient)
        });
        self.bind(TypeInfo::of::<C>(), transient, Provider::Construct(construct))
    }

    fn bind_factory<C: ?Sized + 'static, T: Provide<C>>(
        self: &Rc<Self>,
        factory: impl Fn() -> T + 'static,
        transient: bool,
    ) -> Result<(), ScopeError> {
        let construct: Rc<ConstructDyn> = Rc::new(move |scope: &Rc<Scope>| {
            finish_construction::<C, T>(scope, Rc::new(factory()), transient)
        });
        self.bind(TypeInfo::of::<C>(), transient, Provider::Construct(construct))
    }

    fn install_instance<C: ?Sized + 'static, T: Provide<C>>(
        self: &Rc<Self>,
        instance: Rc<T>,
        prevent_injection: bool,
    ) -> Result<(), ScopeError> {
        let key = TypeInfo::of::<C>();
        let cached = Instance::new(T::provide(instance.clone()));
        let id = cached.id();

        match self.cache.borrow_mut().entry(key.type_id) {
            Entry::Occupied(_) => return Err(ScopeError::AlreadyRegistered(key.type_name)),
            Entry::Vacant(vacant) => {
                vacant.insert(cached);
            }
        }

        if let Err(err) = self.bind(key, false, Provider::Value) {
            self.cache.borrow_mut().remove(&key.type_id);
            return Err(err);
        }

        if !prevent_injection {
            self.forced.borrow_mut().insert(
                id,
                Box::new(move |scope: &Rc<Scope>| scope.inject(&instance)),
            );
        }

        Ok(())
    }
}

/// Caches (unless transient) and injects a freshly produced concrete
/// instance, returning its contract handle. Caching happens before injection
/// so members of a dependency cycle can resolve each other mid-construction.
fn finish_construction<C: ?Sized + 'static, T: Provide<C>>(
    scope: &Rc<Scope>,
    concrete: Rc<T>,
    transient: bool,
) -> Result<Instance, ScopeError> {
    let handle = T::provide(concrete.clone());
    let instance = if transient {
        Instance::transient(handle)
    } else {
        Instance::new(handle)
    };
    tracing::debug!(
        "constructed {} for {}",
        std::any::type_name::<T>(),
        instance.info()
    );

    if !transient {
        scope
            .cache
            .borrow_mut()
            .insert(TypeInfo::of::<C>().type_id, instance.clone());
    }

    scope.injector.inject(scope, &concrete)?;
    Ok(instance)
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_struct("Scope");
        let cache = self.cache.borrow();
        for binding in self.bindings.borrow().values() {
            let state = if cache.contains_key(&binding.key.type_id) {
                "cached"
            } else if binding.transient {
                "transient"
            } else {
                "bound"
            };
            map.field(binding.key.type_name, &state);
        }
        map.finish()
    }
}
