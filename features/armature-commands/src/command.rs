use std::cell::Cell;

use armature_core::Injected;

/// A reusable unit of work executed through a [`CommandPool`](crate::CommandPool).
///
/// Commands are constructed and injected by the pool's owning scope, so they
/// can declare injection points like any other [`Injected`] type. A command
/// that finishes within `run` is returned to the pool immediately; one that
/// starts work it must outlive calls [`Control::retain`] and is handed back
/// with [`CommandPool::finish`](crate::CommandPool::finish) once done.
pub trait Command: Injected {
    type Param;

    fn run(&self, ctl: &Control, param: Self::Param);

    /// Called on a still-retained command when its pool is cleaned up.
    fn cancel(&self) {}
}

/// Per-execution controls handed to [`Command::run`].
pub struct Control {
    retained: Cell<bool>,
}

impl Control {
    pub(crate) fn new() -> Self {
        Control {
            retained: Cell::new(false),
        }
    }

    /// Keeps the command checked out after `run` returns.
    pub fn retain(&self) {
        self.retained.set(true);
    }

    pub(crate) fn is_retained(&self) -> bool {
        self.retained.get()
    }
}
