//! Typed per-object storage used by protocol modules

use std::any::Any;

/// A storage able to store several values of different types.
/// It behaves similarly to a `TypeMap`, holding at most one value per type.
///
/// The map is owned by the object it is attached to and is not thread-safe.
#[derive(Default)]
pub struct UserDataMap {
    list: Vec<Box<dyn Any>>,
}

impl std::fmt::Debug for UserDataMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDataMap")
            .field("entries", &self.list.len())
            .finish()
    }
}

impl UserDataMap {
    /// Create a new map
    pub fn new() -> UserDataMap {
        UserDataMap::default()
    }

    /// Attempt to access the wrapped user data of a given type
    ///
    /// Will return `None` if no value of type `T` is stored in this `UserDataMap`
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.list.iter().find_map(|data| data.downcast_ref::<T>())
    }

    /// Mutably access the wrapped user data of a given type
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.list.iter_mut().find_map(|data| data.downcast_mut::<T>())
    }

    /// Insert a value in the map if it was not already present
    ///
    /// Returns `true` if the value was inserted.
    pub fn insert_if_missing<T: 'static, F: FnOnce() -> T>(&mut self, init: F) -> bool {
        if self.get::<T>().is_some() {
            return false;
        }
        self.list.push(Box::new(init()));
        true
    }

    /// Access the user data of a given type, initializing it if required.
    pub fn get_or_insert<T: 'static, F: FnOnce() -> T>(&mut self, init: F) -> &mut T {
        let pos = match self.list.iter().position(|data| data.is::<T>()) {
            Some(pos) => pos,
            None => {
                self.list.push(Box::new(init()));
                self.list.len() - 1
            }
        };
        self.list[pos].downcast_mut::<T>().unwrap()
    }

    /// Remove and return the value of a given type
    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        let pos = self.list.iter().position(|data| data.is::<T>())?;
        self.list.swap_remove(pos).downcast::<T>().ok().map(|b| *b)
    }
}
