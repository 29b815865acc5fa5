//! Write-observer seam between persistence and its consumers.
//!
//! A persistence adapter records an [`EntityChange`] for every row it writes
//! inside a unit of work. After a successful commit it hands the batch to its
//! [`ChangeDispatcher`], which calls every registered [`WriteObserver`]
//! synchronously, in registration order, before the commit call returns.
//!
//! Rolled-back units of work dispatch nothing.
//!
//! Observers cannot fail the commit: the data is already durable by the time
//! they run. An observer that cannot do its job logs and returns.

use std::sync::{Arc, RwLock};

use crate::EntityChange;

/// Receives committed entity changes.
pub trait WriteObserver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Called once per committed unit of work with every change it made.
    fn on_commit(&self, changes: &[EntityChange]);
}

impl<O> WriteObserver for Arc<O>
where
    O: WriteObserver + ?Sized,
{
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn on_commit(&self, changes: &[EntityChange]) {
        (**self).on_commit(changes)
    }
}

/// Fan-out of committed changes to registered observers.
#[derive(Default)]
pub struct ChangeDispatcher {
    observers: RwLock<Vec<Arc<dyn WriteObserver>>>,
}

impl ChangeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn WriteObserver>) {
        // A poisoned lock only means another registration panicked; the list is still valid.
        let mut observers = match self.observers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tracing::debug!(observer = observer.name(), "registered write observer");
        observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        match self.observers.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Deliver a committed batch to every observer.
    pub fn dispatch(&self, changes: &[EntityChange]) {
        if changes.is_empty() {
            return;
        }

        let observers: Vec<Arc<dyn WriteObserver>> = match self.observers.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        for observer in observers {
            observer.on_commit(changes);
        }
    }
}

impl core::fmt::Debug for ChangeDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangeDispatcher")
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{ChangeKind, EntityKind};
    use lumberyard_core::ProductId;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<EntityChange>>,
    }

    impl WriteObserver for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn on_commit(&self, changes: &[EntityChange]) {
            self.seen.lock().unwrap().extend_from_slice(changes);
        }
    }

    #[test]
    fn dispatch_reaches_every_observer() {
        let dispatcher = ChangeDispatcher::new();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        dispatcher.register(a.clone());
        dispatcher.register(b.clone());

        let product_id = ProductId::new();
        let change = EntityChange::new(EntityKind::Product, ChangeKind::Created, product_id)
            .for_product(product_id);
        dispatcher.dispatch(&[change.clone()]);

        assert_eq!(a.seen.lock().unwrap().as_slice(), &[change.clone()]);
        assert_eq!(b.seen.lock().unwrap().as_slice(), &[change]);
    }

    #[test]
    fn empty_batches_are_not_delivered() {
        let dispatcher = ChangeDispatcher::new();
        let a = Arc::new(Recorder::default());
        dispatcher.register(a.clone());

        dispatcher.dispatch(&[]);
        assert!(a.seen.lock().unwrap().is_empty());
    }
}
