use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
};

use crate::types::InstanceId;

/// Per-scope bookkeeping for the deferred-initialization protocol.
///
/// A declared-async instance sits in the initializing set from construction
/// until `init_done`. An instance whose injection hit still-initializing
/// dependencies holds a record with the outstanding identities and its queued
/// post-init pass; the reverse index finds all dependents of a completing
/// dependency without scanning.
#[derive(Default)]
pub(crate) struct PendingInit {
    initializing: RefCell<HashSet<InstanceId>>,
    records: RefCell<HashMap<InstanceId, PendingRecord>>,
    waiters: RefCell<HashMap<InstanceId, Vec<InstanceId>>>,
}

struct PendingRecord {
    type_name: &'static str,
    init_async: bool,
    outstanding: HashSet<InstanceId>,
    run_post_init: Box<dyn Fn()>,
}

/// A record whose outstanding set just became empty.
pub(crate) struct ReadyRecord {
    pub(crate) id: InstanceId,
    pub(crate) type_name: &'static str,
    pub(crate) init_async: bool,
    pub(crate) run_post_init: Box<dyn Fn()>,
}

impl PendingInit {
    pub(crate) fn begin(&self, id: InstanceId) {
        self.initializing.borrow_mut().insert(id);
    }

    pub(crate) fn is_initializing(&self, id: InstanceId) -> bool {
        self.initializing.borrow().contains(&id)
    }

    /// Removes the initializing flag. Returns false if it was not set.
    pub(crate) fn end(&self, id: InstanceId) -> bool {
        self.initializing.borrow_mut().remove(&id)
    }

    pub(crate) fn add_record(
        &self,
        id: InstanceId,
        type_name: &'static str,
        init_async: bool,
        outstanding: HashSet<InstanceId>,
        run_post_init: Box<dyn Fn()>,
    ) {
        let mut waiters = self.waiters.borrow_mut();
        for dependency in &outstanding {
            waiters.entry(*dependency).or_default().push(id);
        }

        self.records.borrow_mut().insert(
            id,
            PendingRecord {
                type_name,
                init_async,
                outstanding,
                run_post_init,
            },
        );
    }

    /// Drops `dependency` from every local record waiting on it and drains
    /// the records that became ready. Hooks are not invoked here so no
    /// borrow is held when they run.
    pub(crate) fn complete_dependency(&self, dependency: InstanceId) -> Vec<ReadyRecord> {
        let dependents = match self.waiters.borrow_mut().remove(&dependency) {
            Some(dependents) => dependents,
            None => return Vec::new(),
        };

        let mut ready = Vec::new();
        let mut records = self.records.borrow_mut();

        for dependent in dependents {
            let emptied = match records.get_mut(&dependent) {
                Some(record) => {
                    record.outstanding.remove(&dependency);
                    record.outstanding.is_empty()
                }
                None => false,
            };

            if emptied {
                if let Some(record) = records.remove(&dependent) {
                    ready.push(ReadyRecord {
                        id: dependent,
                        type_name: record.type_name,
                        init_async: record.init_async,
                        run_post_init: record.run_post_init,
                    });
                }
            }
        }

        ready
    }

    pub(crate) fn clear(&self) {
        self.initializing.borrow_mut().clear();
        self.records.borrow_mut().clear();
        self.waiters.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, rc::Rc};

    fn anchors(n: usize) -> Vec<Rc<u8>> {
        (0..n).map(|i| Rc::new(i as u8)).collect()
    }

    #[test]
    fn record_becomes_ready_when_last_dependency_completes() {
        let pending = PendingInit::default();
        let ran = Rc::new(Cell::new(0));

        let anchors = anchors(3);
        let dependent = InstanceId::of(&anchors[0]);
        let dep_a = InstanceId::of(&anchors[1]);
        let dep_b = InstanceId::of(&anchors[2]);

        let counter = ran.clone();
        pending.add_record(
            dependent,
            "dependent",
            false,
            HashSet::from([dep_a, dep_b]),
            Box::new(move || counter.set(counter.get() + 1)),
        );

        assert!(pending.complete_dependency(dep_a).is_empty());

        let ready = pending.complete_dependency(dep_b);
        assert_eq!(ready.len(), 1);
        (ready[0].run_post_init)();
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn completing_unknown_dependency_is_a_no_op() {
        let pending = PendingInit::default();
        let anchor = Rc::new(0_u8);
        assert!(pending
            .complete_dependency(InstanceId::of(&anchor))
            .is_empty());
    }
}
