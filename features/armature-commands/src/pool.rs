use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::{Rc, Weak},
};

use armature_core::{InstanceId, Scope};

use crate::{
    command::{Command, Control},
    errors::CommandError,
};

/// Outcome of a pool execution.
pub enum Exec<T> {
    /// The command finished inside `run` and went back to the pool.
    Done,
    /// The command retained itself; hand it to
    /// [`CommandPool::finish`] when its work completes.
    Retained(Rc<T>),
}

/// Recycling pool for one command type.
///
/// Commands are constructed and injected through the owning scope on first
/// checkout and reused for later executions, so their injected dependencies
/// are resolved once per pooled instance.
pub struct CommandPool<T: Command> {
    scope: Weak<Scope>,
    idle: RefCell<VecDeque<Rc<T>>>,
    retained: RefCell<HashMap<InstanceId, Rc<T>>>,
}

impl<T: Command> CommandPool<T> {
    pub fn new(scope: Weak<Scope>) -> Self {
        CommandPool {
            scope,
            idle: RefCell::new(VecDeque::new()),
            retained: RefCell::new(HashMap::new()),
        }
    }

    /// Checks out a command, runs it, and either recycles it or parks it in
    /// the retained set if `run` called [`Control::retain`].
    pub fn execute(&self, param: T::Param) -> Result<Exec<T>, CommandError> {
        let command = self.checkout()?;
        let ctl = Control::new();
        command.run(&ctl, param);

        if ctl.is_retained() {
            tracing::trace!("command retained: {}", std::any::type_name::<T>());
            self.retained
                .borrow_mut()
                .insert(InstanceId::of(&command), command.clone());
            Ok(Exec::Retained(command))
        } else {
            self.idle.borrow_mut().push_back(command);
            Ok(Exec::Done)
        }
    }

    /// Returns a retained command to the pool. False if the command was not
    /// retained here, e.g. after a cleanup already cancelled it.
    pub fn finish(&self, command: &Rc<T>) -> bool {
        match self.retained.borrow_mut().remove(&InstanceId::of(command)) {
            Some(command) => {
                self.idle.borrow_mut().push_back(command);
                true
            }
            None => false,
        }
    }

    /// Cancels every retained command once and drops all pooled instances.
    pub fn clean_up(&self) {
        let retained: Vec<Rc<T>> = self
            .retained
            .borrow_mut()
            .drain()
            .map(|(_, command)| command)
            .collect();
        for command in retained {
            tracing::debug!("cancelling retained command: {}", std::any::type_name::<T>());
            command.cancel();
        }

        self.idle.borrow_mut().clear();
    }

    pub fn idle_count(&self) -> usize {
        self.idle.borrow().len()
    }

    pub fn retained_count(&self) -> usize {
        self.retained.borrow().len()
    }

    fn checkout(&self) -> Result<Rc<T>, CommandError> {
        if let Some(command) = self.idle.borrow_mut().pop_front() {
            return Ok(command);
        }

        let scope = self.scope.upgrade().ok_or(CommandError::ScopeGone)?;
        let command = Rc::new(T::construct());
        scope.inject(&command)?;
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armature_core::{Descriptor, Injected, ScopeSettings, Slot};
    use std::cell::Cell;

    fn scope() -> Rc<Scope> {
        Scope::new(ScopeSettings::default())
    }

    thread_local! {
        static BUILT: Cell<u32> = const { Cell::new(0) };
    }

    struct Ping {
        runs: Cell<u32>,
    }

    impl Injected for Ping {
        fn construct() -> Self {
            BUILT.with(|built| built.set(built.get() + 1));
            Ping { runs: Cell::new(0) }
        }
    }

    impl Command for Ping {
        type Param = ();

        fn run(&self, _ctl: &Control, _param: ()) {
            self.runs.set(self.runs.get() + 1);
        }
    }

    struct Download {
        cancelled: Cell<bool>,
    }

    impl Injected for Download {
        fn construct() -> Self {
            Download {
                cancelled: Cell::new(false),
            }
        }
    }

    impl Command for Download {
        type Param = bool;

        fn run(&self, ctl: &Control, keep: bool) {
            if keep {
                ctl.retain();
            }
        }

        fn cancel(&self) {
            self.cancelled.set(true);
        }
    }

    #[test]
    fn finished_commands_are_reused() {
        let scope = scope();
        let pool = CommandPool::<Ping>::new(Rc::downgrade(&scope));

        BUILT.with(|built| built.set(0));
        pool.execute(()).unwrap();
        pool.execute(()).unwrap();

        assert_eq!(BUILT.with(|built| built.get()), 1);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn retained_command_stays_out_until_finished() {
        let scope = scope();
        let pool = CommandPool::<Download>::new(Rc::downgrade(&scope));

        let command = match pool.execute(true).unwrap() {
            Exec::Retained(command) => command,
            Exec::Done => panic!("command should have retained itself"),
        };
        assert_eq!(pool.retained_count(), 1);
        assert_eq!(pool.idle_count(), 0);

        assert!(pool.finish(&command));
        assert!(!pool.finish(&command));
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn clean_up_cancels_retained_commands_once() {
        let scope = scope();
        let pool = CommandPool::<Download>::new(Rc::downgrade(&scope));

        let command = match pool.execute(true).unwrap() {
            Exec::Retained(command) => command,
            Exec::Done => panic!("command should have retained itself"),
        };

        pool.clean_up();
        pool.clean_up();

        assert!(command.cancelled.get());
        assert_eq!(pool.retained_count(), 0);
        assert!(!pool.finish(&command));
    }

    #[test]
    fn pooled_commands_are_injected_by_the_scope() {
        struct Service;

        impl Injected for Service {
            fn construct() -> Self {
                Service
            }
        }

        struct Uses {
            service: Slot<Service>,
        }

        impl Injected for Uses {
            fn construct() -> Self {
                Uses {
                    service: Slot::empty(),
                }
            }

            fn descriptor() -> Descriptor<Self> {
                Descriptor::new().inject("service", |u: &Uses| &u.service)
            }
        }

        impl Command for Uses {
            type Param = ();

            fn run(&self, _ctl: &Control, _param: ()) {
                assert!(self.service.try_get().is_some());
            }
        }

        let scope = scope();
        scope.register::<Service>().unwrap();

        let pool = CommandPool::<Uses>::new(Rc::downgrade(&scope));
        pool.execute(()).unwrap();
    }

    #[test]
    fn dropped_scope_fails_the_next_checkout() {
        let pool = {
            let scope = scope();
            CommandPool::<Ping>::new(Rc::downgrade(&scope))
        };

        assert!(matches!(pool.execute(()), Err(CommandError::ScopeGone)));
    }
}
