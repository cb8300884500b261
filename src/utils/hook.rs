use std::rc::Rc;

crate::utils::ids::id_type!(
    /// Unique hook identifier used to unregister commit/map/destruction hooks
    pub HookId
);

pub(crate) struct Hook<T: ?Sized> {
    pub id: HookId,
    pub cb: Rc<T>,
}

impl<T: ?Sized> std::fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> Clone for Hook<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            cb: self.cb.clone(),
        }
    }
}

impl<T: ?Sized> Hook<T> {
    pub fn new(cb: Rc<T>) -> Self {
        Self { id: HookId::new(), cb }
    }
}

/// An ordered list of hooks, invoked in registration order
pub(crate) struct HookList<T: ?Sized> {
    hooks: Vec<Hook<T>>,
}

impl<T: ?Sized> Default for HookList<T> {
    fn default() -> Self {
        Self { hooks: Vec::new() }
    }
}

impl<T: ?Sized> std::fmt::Debug for HookList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.hooks.iter().map(|h| &h.id)).finish()
    }
}

impl<T: ?Sized> HookList<T> {
    pub fn add(&mut self, cb: Rc<T>) -> HookId {
        let hook = Hook::new(cb);
        let id = hook.id.clone();
        self.hooks.push(hook);
        id
    }

    pub fn remove(&mut self, id: &HookId) -> bool {
        let len = self.hooks.len();
        self.hooks.retain(|hook| &hook.id != id);
        self.hooks.len() != len
    }

    /// Snapshot of the callbacks, so hooks may add or remove hooks while running
    pub fn snapshot(&self) -> Vec<Rc<T>> {
        self.hooks.iter().map(|hook| hook.cb.clone()).collect()
    }
}
