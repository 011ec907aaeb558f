use std::{cell::Cell, cell::RefCell, collections::BTreeMap, rc::Rc};

/// Keyed observer list with deterministic removal.
///
/// Listeners are invoked in connection order. A listener connected while an
/// emit is running is not called during that emit; a listener disconnected
/// while an emit is running is skipped if it has not run yet.
pub struct Signal<T = ()> {
    slots: RefCell<BTreeMap<SlotKey, Callback<T>>>,
    next_key: Cell<u64>,
}

type Callback<T> = Rc<dyn Fn(&T)>;

/// Handle for disconnecting a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey(u64);

impl<T> Signal<T> {
    pub fn new() -> Self {
        Signal {
            slots: RefCell::new(BTreeMap::new()),
            next_key: Cell::new(0),
        }
    }

    pub fn connect(&self, listener: impl Fn(&T) + 'static) -> SlotKey {
        let key = SlotKey(self.next_key.get());
        self.next_key.set(key.0 + 1);
        self.slots.borrow_mut().insert(key, Rc::new(listener));
        key
    }

    /// Removes a listener. Returns false if it was already gone.
    pub fn disconnect(&self, key: SlotKey) -> bool {
        self.slots.borrow_mut().remove(&key).is_some()
    }

    pub fn emit(&self, arg: &T) {
        let snapshot: Vec<(SlotKey, Callback<T>)> = self
            .slots
            .borrow()
            .iter()
            .map(|(key, listener)| (*key, listener.clone()))
            .collect();

        for (key, listener) in snapshot {
            // A listener may disconnect others while the emit runs.
            if self.slots.borrow().contains_key(&key) {
                listener(arg);
            }
        }
    }

    pub fn clear(&self) {
        self.slots.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Signal::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn emits_in_connection_order() {
        let signal = Signal::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            signal.connect(move |arg: &u32| seen.borrow_mut().push((tag, *arg)));
        }

        signal.emit(&7);
        assert_eq!(*seen.borrow(), vec![("a", 7), ("b", 7), ("c", 7)]);
    }

    #[test]
    fn disconnect_is_deterministic() {
        let signal = Signal::new();
        let count = Rc::new(Cell::new(0));

        let c = count.clone();
        let first = signal.connect(move |_: &()| c.set(c.get() + 1));
        let c = count.clone();
        let _second = signal.connect(move |_: &()| c.set(c.get() + 10));

        assert!(signal.disconnect(first));
        assert!(!signal.disconnect(first));

        signal.emit(&());
        assert_eq!(count.get(), 10);
    }

    #[test]
    fn listener_disconnected_mid_emit_is_skipped() {
        let signal = Rc::new(Signal::new());
        let count = Rc::new(Cell::new(0));

        let later = Rc::new(Cell::new(None));
        let sig = signal.clone();
        let slot = later.clone();
        signal.connect(move |_: &()| {
            if let Some(key) = slot.get() {
                sig.disconnect(key);
            }
        });
        let c = count.clone();
        let second = signal.connect(move |_: &()| c.set(c.get() + 1));
        later.set(Some(second));

        signal.emit(&());
        assert_eq!(count.get(), 0);
    }
}
