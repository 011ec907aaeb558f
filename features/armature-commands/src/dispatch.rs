use std::{
    any::{Any, TypeId},
    cell::RefCell,
    collections::HashMap,
    rc::{Rc, Weak},
};

use armature_core::Scope;

use crate::{
    command::Command,
    errors::CommandError,
    pool::{CommandPool, Exec},
};

/// Scope-wide registry of command pools, one per command type.
///
/// Pools are created lazily and torn down with the scope the registry was
/// attached to.
pub struct Commands {
    scope: Weak<Scope>,
    pools: RefCell<HashMap<TypeId, PoolSlot>>,
}

struct PoolSlot {
    pool: Rc<dyn Any>,
    clean_up: Box<dyn Fn()>,
}

impl Commands {
    /// Creates a registry whose pools construct commands in `scope` and are
    /// cleaned up when the scope is.
    pub fn new(scope: &Rc<Scope>) -> Rc<Commands> {
        let commands = Rc::new(Commands {
            scope: Rc::downgrade(scope),
            pools: RefCell::new(HashMap::new()),
        });

        let weak = Rc::downgrade(&commands);
        scope.on_clean_up(move || {
            if let Some(commands) = weak.upgrade() {
                commands.clean_up();
            }
        });

        commands
    }

    /// The pool for command type `T`, created on first use.
    pub fn pool<T: Command>(&self) -> Rc<CommandPool<T>> {
        let mut pools = self.pools.borrow_mut();
        let slot = pools.entry(TypeId::of::<T>()).or_insert_with(|| {
            let pool = Rc::new(CommandPool::<T>::new(self.scope.clone()));
            PoolSlot {
                clean_up: {
                    let pool = pool.clone();
                    Box::new(move || pool.clean_up())
                },
                pool,
            }
        });

        match slot.pool.clone().downcast::<CommandPool<T>>() {
            Ok(pool) => pool,
            Err(_) => unreachable!("pools are keyed by their command type"),
        }
    }

    pub fn execute<T: Command>(&self, param: T::Param) -> Result<Exec<T>, CommandError> {
        self.pool::<T>().execute(param)
    }

    pub fn has<T: Command>(&self) -> bool {
        self.pools.borrow().contains_key(&TypeId::of::<T>())
    }

    /// Cleans up and discards the pool for `T`.
    pub fn remove<T: Command>(&self) -> bool {
        match self.pools.borrow_mut().remove(&TypeId::of::<T>()) {
            Some(slot) => {
                (slot.clean_up)();
                true
            }
            None => false,
        }
    }

    /// Cleans up every pool and discards them all.
    pub fn clean_up(&self) {
        let slots: Vec<PoolSlot> = self.pools.borrow_mut().drain().map(|(_, slot)| slot).collect();
        for slot in &slots {
            (slot.clean_up)();
        }
    }
}

type EventRun = Rc<dyn Fn(&Commands) -> Result<(), CommandError>>;

struct EventSlot {
    command: TypeId,
    run: EventRun,
}

/// Maps string-named events to parameterless commands.
///
/// Each event fires its commands in registration order through the shared
/// [`Commands`] registry, so command instances pool and retain as usual.
pub struct NamedDispatcher {
    commands: Rc<Commands>,
    events: RefCell<HashMap<String, Vec<EventSlot>>>,
}

impl NamedDispatcher {
    pub fn new(commands: Rc<Commands>) -> Self {
        NamedDispatcher {
            commands,
            events: RefCell::new(HashMap::new()),
        }
    }

    /// Registers `T` to fire on `event`. False if it already was registered
    /// for that event.
    pub fn register_event<T: Command<Param = ()>>(&self, event: impl Into<String>) -> bool {
        let event = event.into();
        let mut events = self.events.borrow_mut();
        let slots = events.entry(event).or_default();

        if slots.iter().any(|slot| slot.command == TypeId::of::<T>()) {
            tracing::warn!(
                "command {} already registered for this event",
                std::any::type_name::<T>()
            );
            return false;
        }

        slots.push(EventSlot {
            command: TypeId::of::<T>(),
            run: Rc::new(|commands: &Commands| commands.execute::<T>(()).map(|_| ())),
        });
        true
    }

    /// Removes `T` from `event`. False if it was not registered.
    pub fn unregister_event<T: Command<Param = ()>>(&self, event: &str) -> bool {
        let mut events = self.events.borrow_mut();
        let Some(slots) = events.get_mut(event) else {
            return false;
        };

        let before = slots.len();
        slots.retain(|slot| slot.command != TypeId::of::<T>());
        let removed = slots.len() < before;

        if slots.is_empty() {
            events.remove(event);
        }
        removed
    }

    /// Drops every command registered for `event`.
    pub fn unregister_all(&self, event: &str) -> bool {
        self.events.borrow_mut().remove(event).is_some()
    }

    pub fn has_event(&self, event: &str) -> bool {
        self.events.borrow().contains_key(event)
    }

    /// Fires every command registered for `event` in registration order.
    /// Unknown events are ignored.
    pub fn execute(&self, event: &str) -> Result<(), CommandError> {
        let runs: Vec<EventRun> = match self.events.borrow().get(event) {
            Some(slots) => slots.iter().map(|slot| slot.run.clone()).collect(),
            None => {
                tracing::debug!("no commands registered for event '{event}'");
                return Ok(());
            }
        };

        for run in runs {
            run(&self.commands)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Control;
    use armature_core::{Injected, ScopeSettings};
    use std::cell::Cell;

    thread_local! {
        static LOG: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
    }

    fn taken_log() -> Vec<&'static str> {
        LOG.with(|log| log.borrow_mut().drain(..).collect())
    }

    struct First;

    impl Injected for First {
        fn construct() -> Self {
            First
        }
    }

    impl Command for First {
        type Param = ();

        fn run(&self, _ctl: &Control, _param: ()) {
            LOG.with(|log| log.borrow_mut().push("first"));
        }
    }

    struct Second;

    impl Injected for Second {
        fn construct() -> Self {
            Second
        }
    }

    impl Command for Second {
        type Param = ();

        fn run(&self, _ctl: &Control, _param: ()) {
            LOG.with(|log| log.borrow_mut().push("second"));
        }
    }

    struct Sticky {
        cancelled: Cell<bool>,
    }

    impl Injected for Sticky {
        fn construct() -> Self {
            Sticky {
                cancelled: Cell::new(false),
            }
        }
    }

    impl Command for Sticky {
        type Param = ();

        fn run(&self, ctl: &Control, _param: ()) {
            ctl.retain();
        }

        fn cancel(&self) {
            self.cancelled.set(true);
        }
    }

    fn scope() -> Rc<Scope> {
        Scope::new(ScopeSettings::default())
    }

    #[test]
    fn registry_returns_one_pool_per_command_type() {
        let scope = scope();
        let commands = Commands::new(&scope);

        let a = commands.pool::<First>();
        let b = commands.pool::<First>();
        assert!(Rc::ptr_eq(&a, &b));
        assert!(commands.has::<First>());
        assert!(!commands.has::<Second>());
    }

    #[test]
    fn scope_cleanup_cancels_retained_commands() {
        let scope = scope();
        let commands = Commands::new(&scope);

        let sticky = match commands.execute::<Sticky>(()).unwrap() {
            Exec::Retained(command) => command,
            Exec::Done => panic!("command should have retained itself"),
        };

        scope.clean_up();
        assert!(sticky.cancelled.get());
    }

    #[test]
    fn events_fire_commands_in_registration_order() {
        let scope = scope();
        let dispatcher = NamedDispatcher::new(Commands::new(&scope));

        assert!(dispatcher.register_event::<First>("start"));
        assert!(dispatcher.register_event::<Second>("start"));
        assert!(!dispatcher.register_event::<First>("start"));

        taken_log();
        dispatcher.execute("start").unwrap();
        assert_eq!(taken_log(), vec!["first", "second"]);
    }

    #[test]
    fn unregistered_commands_no_longer_fire() {
        let scope = scope();
        let dispatcher = NamedDispatcher::new(Commands::new(&scope));

        dispatcher.register_event::<First>("start");
        dispatcher.register_event::<Second>("start");
        assert!(dispatcher.unregister_event::<First>("start"));
        assert!(!dispatcher.unregister_event::<First>("start"));

        taken_log();
        dispatcher.execute("start").unwrap();
        assert_eq!(taken_log(), vec!["second"]);

        assert!(dispatcher.unregister_all("start"));
        assert!(!dispatcher.has_event("start"));
    }

    #[test]
    fn unknown_events_are_ignored() {
        let scope = scope();
        let dispatcher = NamedDispatcher::new(Commands::new(&scope));
        dispatcher.execute("nothing-here").unwrap();
    }
}
