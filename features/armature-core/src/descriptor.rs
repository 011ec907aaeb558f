use std::{
    any::Any,
    cell::RefCell,
    marker::PhantomData,
    rc::{Rc, Weak},
};

use crate::{
    errors::ScopeError,
    scope::Scope,
    types::{Instance, TypeInfo},
};

/// A type a scope can construct and wire.
///
/// The descriptor is the static counterpart of runtime metadata scanning: it
/// declares the type's injection points and lifecycle hooks once, and the
/// injector memoizes the erased form per type.
pub trait Injected: Any {
    fn construct() -> Self
    where
        Self: Sized;

    fn descriptor() -> Descriptor<Self>
    where
        Self: Sized,
    {
        Descriptor::new()
    }
}

/// Maps a concrete implementation handle to a contract handle.
///
/// Every type provides itself; a one-line impl per (trait, impl) pair
/// performs the unsizing coercion:
///
/// ```ignore
/// impl Provide<dyn Greeter> for ConsoleGreeter {
///     fn provide(this: Rc<Self>) -> Rc<dyn Greeter> {
///         this
///     }
/// }
/// ```
pub trait Provide<C: ?Sized + 'static>: Injected + Sized {
    fn provide(this: Rc<Self>) -> Rc<C>;
}

impl<T: Injected> Provide<T> for T {
    fn provide(this: Rc<Self>) -> Rc<T> {
        this
    }
}

/// An injection slot on an [`Injected`] type, filled by the injector.
///
/// Dependencies cached by a scope are held weakly, since the scope keeps
/// them alive; this is what lets mutually dependent instances hold each
/// other without leaking the pair. Transient dependencies, which no scope
/// retains, are held strongly instead.
pub struct Slot<C: ?Sized + 'static>(RefCell<Option<SlotRef<C>>>);

enum SlotRef<C: ?Sized> {
    Owned(Weak<C>),
    Transient(Rc<C>),
}

impl<C: ?Sized + 'static> Slot<C> {
    pub fn empty() -> Self {
        Slot(RefCell::new(None))
    }

    /// Accesses the injected handle.
    ///
    /// # Panics
    ///
    /// If the slot was never filled (accessed before injection or after a
    /// permissive-mode miss), or if the owning scope already released the
    /// dependency.
    pub fn get(&self) -> Rc<C> {
        self.try_get().expect("slot is empty or its dependency was released")
    }

    pub fn try_get(&self) -> Option<Rc<C>> {
        match &*self.0.borrow() {
            Some(SlotRef::Owned(weak)) => weak.upgrade(),
            Some(SlotRef::Transient(handle)) => Some(handle.clone()),
            None => None,
        }
    }

    pub(crate) fn fill(&self, handle: Rc<C>, owned: bool) {
        *self.0.borrow_mut() = Some(if owned {
            SlotRef::Owned(Rc::downgrade(&handle))
        } else {
            SlotRef::Transient(handle)
        });
    }
}

impl<C: ?Sized + 'static> Default for Slot<C> {
    fn default() -> Self {
        Slot::empty()
    }
}

pub(crate) type AssignFn = Box<dyn Fn(&dyn Any, &Instance) -> Result<(), ScopeError>>;
pub(crate) type AutoFn = fn(&Rc<Scope>) -> Result<Instance, ScopeError>;

pub(crate) struct InjectionPoint {
    pub(crate) name: &'static str,
    pub(crate) dependency: TypeInfo,
    pub(crate) wait: bool,
    pub(crate) auto: Option<AutoFn>,
    assign: AssignFn,
}

impl InjectionPoint {
    pub(crate) fn fill(&self, target: &dyn Any, resolved: &Instance) -> Result<(), ScopeError> {
        (self.assign)(target, resolved)
    }
}

pub(crate) struct Hook {
    pub(crate) name: &'static str,
    call: Box<dyn Fn(&dyn Any)>,
}

impl Hook {
    fn new<T: Any>(name: &'static str, hook: fn(&T)) -> Self {
        Hook {
            name,
            call: Box::new(move |target| {
                if let Some(target) = target.downcast_ref::<T>() {
                    hook(target);
                }
            }),
        }
    }

    pub(crate) fn invoke(&self, target: &dyn Any) {
        (self.call)(target)
    }
}

/// Erased per-type injection metadata, memoized by the injector.
pub(crate) struct InjectionDescriptor {
    pub(crate) type_info: TypeInfo,
    pub(crate) points: Vec<InjectionPoint>,
    pub(crate) post_injection: Vec<Hook>,
    pub(crate) post_init: Vec<Hook>,
    pub(crate) cleanup: Vec<Hook>,
    pub(crate) init_async: bool,
}

/// Builder for a type's injection points and lifecycle hooks.
///
/// Declaration order is resolution and invocation order.
pub struct Descriptor<T: ?Sized> {
    points: Vec<InjectionPoint>,
    post_injection: Vec<Hook>,
    post_init: Vec<Hook>,
    cleanup: Vec<Hook>,
    init_async: bool,
    _owner: PhantomData<fn(&T)>,
}

impl<T: Injected> Descriptor<T> {
    pub fn new() -> Self {
        Descriptor {
            points: Vec::new(),
            post_injection: Vec::new(),
            post_init: Vec::new(),
            cleanup: Vec::new(),
            init_async: false,
            _owner: PhantomData,
        }
    }

    /// Declares an injection point requiring contract `C`.
    pub fn inject<C: ?Sized + 'static>(self, name: &'static str, slot: fn(&T) -> &Slot<C>) -> Self {
        self.point(name, slot, false, None)
    }

    /// Declares an injection point that must wait for its dependency's own
    /// initialization to finish before this type's post-init hooks run.
    pub fn inject_waiting<C: ?Sized + 'static>(
        self,
        name: &'static str,
        slot: fn(&T) -> &Slot<C>,
    ) -> Self {
        self.point(name, slot, true, None)
    }

    /// Declares an injection point on a concrete, constructible type.
    ///
    /// Under [`MissingPolicy::AutoResolve`](crate::scope::MissingPolicy) an
    /// unbound dependency declared this way is registered on the fly.
    pub fn inject_concrete<C: Injected>(self, name: &'static str, slot: fn(&T) -> &Slot<C>) -> Self {
        self.point(name, slot, false, Some(auto_entry::<C>))
    }

    fn point<C: ?Sized + 'static>(
        mut self,
        name: &'static str,
        slot: fn(&T) -> &Slot<C>,
        wait: bool,
        auto: Option<AutoFn>,
    ) -> Self {
        let assign: AssignFn = Box::new(move |target, resolved| {
            let target = match target.downcast_ref::<T>() {
                Some(target) => target,
                // a descriptor is only ever applied to its own type
                None => return Ok(()),
            };
            let handle = resolved
                .handle_of::<C>()
                .map_err(|cached| ScopeError::WrongHandleType {
                    required: std::any::type_name::<C>(),
                    cached,
                })?;
            slot(target).fill(handle, resolved.is_owned());
            Ok(())
        });

        self.points.push(InjectionPoint {
            name,
            dependency: TypeInfo::of::<C>(),
            wait,
            auto,
            assign,
        });
        self
    }

    /// Hook invoked right after all injection points are assigned.
    pub fn post_injection(mut self, name: &'static str, hook: fn(&T)) -> Self {
        self.post_injection.push(Hook::new(name, hook));
        self
    }

    /// Hook invoked once all waited-on dependencies have signaled completion.
    pub fn post_init(mut self, name: &'static str, hook: fn(&T)) -> Self {
        self.post_init.push(Hook::new(name, hook));
        self
    }

    /// Hook invoked when the owning scope cleans up.
    pub fn cleanup(mut self, name: &'static str, hook: fn(&T)) -> Self {
        self.cleanup.push(Hook::new(name, hook));
        self
    }

    /// Marks the type as initializing asynchronously: its readiness is
    /// signaled explicitly through `init_done`, not implied by construction.
    pub fn init_async(mut self) -> Self {
        self.init_async = true;
        self
    }

    pub(crate) fn erase(self) -> InjectionDescriptor {
        InjectionDescriptor {
            type_info: TypeInfo::of::<T>(),
            points: self.points,
            post_injection: self.post_injection,
            post_init: self.post_init,
            cleanup: self.cleanup,
            init_async: self.init_async,
        }
    }
}

impl<T: Injected> Default for Descriptor<T> {
    fn default() -> Self {
        Descriptor::new()
    }
}

/// Registers and constructs an unbound concrete dependency on the fly.
fn auto_entry<C: Injected>(scope: &Rc<Scope>) -> Result<Instance, ScopeError> {
    if !scope.has::<C>() {
        tracing::debug!("auto-registering {}", std::any::type_name::<C>());
        scope.register::<C>()?;
    }

    match scope.resolve(TypeInfo::of::<C>())? {
        Some(instance) => Ok(instance),
        None => Err(ScopeError::NotRegistered(std::any::type_name::<C>())),
    }
}
