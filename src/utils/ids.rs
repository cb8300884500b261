use once_cell::sync::Lazy;
use std::{collections::HashSet, sync::Mutex};

static ID_DATA: Lazy<Mutex<(HashSet<usize>, usize)>> = Lazy::new(|| Mutex::new((HashSet::new(), 0)));

fn next() -> usize {
    let (id_set, counter) = &mut *ID_DATA.lock().unwrap();

    if id_set.len() == usize::MAX {
        panic!("Out of ids");
    }

    while !id_set.insert(*counter) {
        *counter = counter.wrapping_add(1);
    }

    let new_id = *counter;
    *counter = counter.wrapping_add(1);

    new_id
}

fn remove(id: usize) -> bool {
    ID_DATA.lock().unwrap().0.remove(&id)
}

/// Raw id shared by every clone of an id handle, returned to the pool once the last clone is gone.
#[derive(Debug, PartialEq, Eq, Hash)]
pub(crate) struct InnerId(usize);

impl InnerId {
    pub(crate) fn new() -> Self {
        Self(next())
    }

    pub(crate) fn raw(&self) -> usize {
        self.0
    }
}

impl Drop for InnerId {
    fn drop(&mut self) {
        remove(self.0);
    }
}

/// Declares a cheaply clonable, process-unique id type
macro_rules! id_type {
    ($(#[$attr:meta])* $vis:vis $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, PartialEq, Eq, Hash)]
        $vis struct $name(std::rc::Rc<$crate::utils::ids::InnerId>);

        impl $name {
            pub(crate) fn new() -> Self {
                Self(std::rc::Rc::new($crate::utils::ids::InnerId::new()))
            }

            /// Numeric value of this id, unique while any clone of it is alive
            pub fn raw(&self) -> usize {
                self.0.raw()
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0.raw())
            }
        }
    };
}

pub(crate) use id_type;
