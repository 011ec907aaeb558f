use std::{
    any::{Any, TypeId},
    rc::Rc,
};

/// Type name and type id of a contract.
///
/// A contract may be a concrete type or a trait object (`dyn Trait`); either
/// way it is identified by its `TypeId` and carries its name for diagnostics.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Identity of a live instance, taken from the data pointer of its `Rc`.
///
/// Handles to the same allocation compare equal even when one of them is a
/// trait-object handle, which is what the deferred-init bookkeeping and the
/// command pool's retained set key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(*const ());

impl InstanceId {
    pub fn of<T: ?Sized>(handle: &Rc<T>) -> InstanceId {
        InstanceId(Rc::as_ptr(handle).cast::<()>())
    }
}

/// A resolved instance of a contract.
///
/// The erased value is always the strongly typed handle `Rc<C>` for the
/// contract `C` it was registered under; for a trait contract the stored
/// value is the sized `Rc<dyn Trait>` itself.
#[derive(Clone)]
pub struct Instance {
    info: TypeInfo,
    id: InstanceId,
    owned: bool,
    handle: Rc<dyn Any>,
}

impl Instance {
    /// Wraps a handle the scope keeps alive in its cache.
    pub fn new<C: ?Sized + 'static>(handle: Rc<C>) -> Self {
        Instance {
            info: TypeInfo::of::<C>(),
            id: InstanceId::of(&handle),
            owned: true,
            handle: Rc::new(handle),
        }
    }

    /// Wraps a transient handle no scope holds on to.
    pub fn transient<C: ?Sized + 'static>(handle: Rc<C>) -> Self {
        Instance {
            owned: false,
            ..Instance::new(handle)
        }
    }

    /// Whether a scope cache owns this instance. Injection slots hold owned
    /// instances weakly so cyclic graphs do not leak.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub fn info(&self) -> TypeInfo {
        self.info
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Recovers the typed handle, or the name of the actually cached contract
    /// on a mismatch.
    pub fn handle_of<C: ?Sized + 'static>(&self) -> Result<Rc<C>, &'static str> {
        match self.handle.downcast_ref::<Rc<C>>() {
            Some(handle) => Ok(handle.clone()),
            None => Err(self.info.type_name),
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Instance").field(&self.info).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Marker {}
    struct Concrete;
    impl Marker for Concrete {}

    #[test]
    fn handle_roundtrips_through_instance() {
        let instance = Instance::new(Rc::new(42_u32));
        let handle = instance.handle_of::<u32>().unwrap();
        assert_eq!(*handle, 42);
    }

    #[test]
    fn wrong_contract_reports_cached_type_name() {
        let instance = Instance::new(Rc::new(42_u32));
        let err = instance.handle_of::<String>().unwrap_err();
        assert_eq!(err, std::any::type_name::<u32>());
    }

    #[test]
    fn trait_handle_shares_identity_with_concrete() {
        let concrete = Rc::new(Concrete);
        let erased: Rc<dyn Marker> = concrete.clone();
        assert_eq!(InstanceId::of(&concrete), InstanceId::of(&erased));
    }
}
