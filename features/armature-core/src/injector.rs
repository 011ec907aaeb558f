use std::{
    any::{Any, TypeId},
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use crate::{
    descriptor::{Injected, InjectionDescriptor},
    errors::ScopeError,
    scope::{MissingPolicy, Scope},
    types::{InstanceId, TypeInfo},
};

/// Applies injection descriptors to freshly constructed or externally
/// supplied instances. Descriptors are parsed once per concrete type and
/// memoized for the lifetime of the owning scope.
#[derive(Default)]
pub(crate) struct Injector {
    descriptors: RefCell<HashMap<TypeId, Rc<InjectionDescriptor>>>,
}

impl Injector {
    pub(crate) fn inject<T: Injected>(
        &self,
        scope: &Rc<Scope>,
        instance: &Rc<T>,
    ) -> Result<(), ScopeError> {
        let descriptor = self.descriptor_of::<T>();
        let target: Rc<dyn Any> = instance.clone();
        self.apply(scope, descriptor, target, InstanceId::of(instance))
    }

    fn descriptor_of<T: Injected>(&self) -> Rc<InjectionDescriptor> {
        self.descriptors
            .borrow_mut()
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Rc::new(T::descriptor().erase()))
            .clone()
    }

    fn apply(
        &self,
        scope: &Rc<Scope>,
        descriptor: Rc<InjectionDescriptor>,
        target: Rc<dyn Any>,
        id: InstanceId,
    ) -> Result<(), ScopeError> {
        if descriptor.init_async {
            // declared-async instances count as initializing from the moment
            // they exist, so mutually dependent instances observe each other
            scope.begin_initializing(id);
        }

        let outstanding = self.fill_points(scope, &descriptor, &target)?;

        for hook in &descriptor.post_injection {
            tracing::trace!("post-injection {}::{}", descriptor.type_info, hook.name);
            hook.invoke(target.as_ref());
        }

        if outstanding.is_empty() {
            for hook in &descriptor.post_init {
                tracing::trace!("post-init {}::{}", descriptor.type_info, hook.name);
                hook.invoke(target.as_ref());
            }
        } else {
            tracing::debug!(
                "{} defers init on {} dependencies",
                descriptor.type_info,
                outstanding.len()
            );
            let queued = {
                let descriptor = descriptor.clone();
                let target = target.clone();
                Box::new(move || {
                    for hook in &descriptor.post_init {
                        hook.invoke(target.as_ref());
                    }
                })
            };
            scope.add_pending(
                id,
                descriptor.type_info.type_name,
                descriptor.init_async,
                outstanding,
                queued,
            );
        }

        if !descriptor.cleanup.is_empty() {
            let descriptor = descriptor.clone();
            let target = target.clone();
            scope.on_clean_up(move || {
                for hook in &descriptor.cleanup {
                    hook.invoke(target.as_ref());
                }
            });
        }

        Ok(())
    }

    /// Resolves every injection point in declaration order, strictly
    /// sequentially, and reports the still-initializing dependencies of
    /// wait-marked points.
    fn fill_points(
        &self,
        scope: &Rc<Scope>,
        descriptor: &InjectionDescriptor,
        target: &Rc<dyn Any>,
    ) -> Result<HashSet<InstanceId>, ScopeError> {
        let mut outstanding = HashSet::new();

        for point in &descriptor.points {
            let resolved = match scope.resolve(point.dependency)? {
                Some(instance) => Some(instance),
                None => self.auto_resolve(scope, point.dependency, point.auto)?,
            };

            match resolved {
                Some(instance) => {
                    tracing::trace!(
                        "inject {} into {}::{}",
                        instance.info(),
                        descriptor.type_info,
                        point.name
                    );
                    point.fill(target.as_ref(), &instance)?;

                    if point.wait && scope.is_initializing_id(instance.id()) {
                        outstanding.insert(instance.id());
                    }
                }
                None => match scope.missing_policy() {
                    MissingPolicy::Permissive => {
                        tracing::warn!(
                            "not registered: {} (wanted by {}::{})",
                            point.dependency,
                            descriptor.type_info,
                            point.name
                        );
                    }
                    _ => return Err(ScopeError::NotRegistered(point.dependency.type_name)),
                },
            }
        }

        Ok(outstanding)
    }

    fn auto_resolve(
        &self,
        scope: &Rc<Scope>,
        dependency: TypeInfo,
        auto: Option<crate::descriptor::AutoFn>,
    ) -> Result<Option<crate::types::Instance>, ScopeError> {
        if scope.missing_policy() != MissingPolicy::AutoResolve {
            return Ok(None);
        }

        match auto {
            Some(auto) => auto(scope).map(Some),
            // contract dependencies are not constructible on the fly
            None => {
                tracing::debug!("cannot auto-resolve contract {dependency}");
                Ok(None)
            }
        }
    }

    /// Drops all memoized descriptors on scope cleanup.
    pub(crate) fn clear(&self) {
        self.descriptors.borrow_mut().clear();
    }
}
