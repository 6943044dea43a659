use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Listener = Box<dyn FnMut(f64)>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
    // Ids dropped while their listener was checked out by `emit`.
    cancelled: Vec<u64>,
}

#[derive(Clone, Default)]
pub struct ResizeEvents {
    registry: Rc<RefCell<Registry>>,
}

impl ResizeEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` until the returned guard is dropped.
    #[must_use = "dropping the subscription unregisters the listener"]
    pub fn subscribe<F>(&self, listener: F) -> ResizeSubscription
    where
        F: FnMut(f64) + 'static,
    {
        let mut registry = self.registry.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Box::new(listener)));
        ResizeSubscription {
            id,
            registry: Rc::downgrade(&self.registry),
        }
    }

    pub fn emit(&self, container_width: f64) {
        let mut listeners = std::mem::take(&mut self.registry.borrow_mut().listeners);
        for (_, listener) in listeners.iter_mut() {
            listener(container_width);
        }

        let mut registry = self.registry.borrow_mut();
        let cancelled = std::mem::take(&mut registry.cancelled);
        listeners.retain(|(id, _)| !cancelled.contains(id));
        listeners.append(&mut registry.listeners);
        registry.listeners = listeners;
    }

    pub fn listener_count(&self) -> usize {
        self.registry.borrow().listeners.len()
    }
}

pub struct ResizeSubscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl Drop for ResizeSubscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.borrow_mut();
        let before = registry.listeners.len();
        registry.listeners.retain(|(id, _)| *id != self.id);
        if registry.listeners.len() == before {
            registry.cancelled.push(self.id);
        }
    }
}
