//! Tools for handling surface roles
//!
//! In the Wayland protocol, surfaces can have several different roles, which
//! define how they are to be used: toplevel windows, popups, subsurfaces,
//! pointer cursors, layer surfaces, lock surfaces...
//!
//! A surface gets a role at most once. Assigning the role it already has is allowed,
//! assigning any other role is an error. A surface without a role is not displayed at all.
//!
//! ## General mechanism
//!
//! Each role is described by a static value implementing [`SurfaceRole`], whose hooks
//! are invoked by the commit machinery. Roles are identified by their [`SurfaceRole::name`],
//! which must be unique.
//!
//! Most roles are backed by a protocol object (an `xdg_toplevel`, a `wl_subsurface`...),
//! installed with [`Surface::set_role_object`]. While such an object exists, the role is
//! active and its hooks run. Destroying the object unmaps the surface, but the surface
//! keeps its role and may later get a new object for that same role.
//!
//! Roles that are never backed by an object, like the pointer cursor, return `true` from
//! [`SurfaceRole::no_object`] and have their hooks invoked as soon as they are assigned.

use downcast_rs::{impl_downcast, Downcast};
use tracing::{debug, trace};

use super::Surface;

/// Description of a surface role
///
/// All hooks default to doing nothing.
pub trait SurfaceRole: Sync + 'static {
    /// Unique name of the role, like `"xdg_toplevel"`
    fn name(&self) -> &'static str;

    /// Whether this role is never backed by a role object
    fn no_object(&self) -> bool {
        false
    }

    /// Whether buffers whose size is not a multiple of the buffer scale are tolerated
    ///
    /// Such buffers are a protocol error for most roles. Roles returning `true` only log them.
    fn allows_unscaled_buffer(&self) -> bool {
        false
    }

    /// Validate the pending state when the client commits
    ///
    /// May call [`Surface::reject`] to refuse the commit.
    fn client_commit(&self, _surface: &mut Surface) {}

    /// A new state became current
    fn commit(&self, _surface: &mut Surface) {}

    /// The surface got mapped
    fn map(&self, _surface: &mut Surface) {}

    /// The surface got unmapped
    fn unmap(&self, _surface: &mut Surface) {}

    /// The role object is being destroyed, it is still accessible from the surface
    fn destroy(&self, _surface: &mut Surface) {}
}

impl std::fmt::Debug for dyn SurfaceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SurfaceRole").field(&self.name()).finish()
    }
}

/// Protocol object backing the role of a surface
pub trait RoleObject: Downcast {}
impl_downcast!(RoleObject);
impl<T: 'static> RoleObject for T {}

/// An error type signifying that the surface cannot be assigned a role
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleError {
    /// The surface already has another role
    #[error("cannot assign role {requested} to surface, already has role {current}")]
    AlreadyHasRole {
        /// Role of the surface
        current: &'static str,
        /// Role that was requested
        requested: &'static str,
    },
    /// The surface still has an object for its role
    #[error("cannot reassign role {requested} to surface, role object still exists")]
    RoleObjectExists {
        /// Role that was requested
        requested: &'static str,
    },
}

impl Surface {
    /// Assign a role to this surface
    ///
    /// Assigning the role the surface already has is a no-op, as long as no
    /// role object currently exists.
    pub fn set_role(&mut self, role: &'static dyn SurfaceRole) -> Result<(), RoleError> {
        if let Some(current) = self.role {
            if current.name() != role.name() {
                debug!(surface = ?self.id, current = current.name(), requested = role.name(), "Surface already has a role");
                return Err(RoleError::AlreadyHasRole {
                    current: current.name(),
                    requested: role.name(),
                });
            }
        }
        if self.role_object.is_some() {
            debug!(surface = ?self.id, role = role.name(), "Role object still exists");
            return Err(RoleError::RoleObjectExists {
                requested: role.name(),
            });
        }
        if self.role.is_none() {
            trace!(surface = ?self.id, role = role.name(), "Role assigned");
        }
        self.role = Some(role);
        Ok(())
    }

    /// The role of this surface
    pub fn role(&self) -> Option<&'static dyn SurfaceRole> {
        self.role
    }

    /// Whether this surface has the role named `name`
    pub fn has_role(&self, name: &str) -> bool {
        self.role.map_or(false, |role| role.name() == name)
    }

    /// Install the protocol object backing the role of this surface
    ///
    /// # Panics
    ///
    /// If the surface has no role, if its role takes no object, or if an object is already installed.
    pub fn set_role_object<T: 'static>(&mut self, object: T) {
        let role = self
            .role
            .unwrap_or_else(|| panic!("{:?} has no role to attach an object to", self.id));
        assert!(
            !role.no_object(),
            "role {} of {:?} takes no role object",
            role.name(),
            self.id
        );
        assert!(
            self.role_object.is_none(),
            "{:?} already has an object for role {}",
            self.id,
            role.name()
        );
        self.role_object = Some(Box::new(object));
    }

    /// Whether a role object is installed
    pub fn has_role_object(&self) -> bool {
        self.role_object.is_some()
    }

    /// Access the role object, if it is of type `T`
    pub fn role_object<T: 'static>(&self) -> Option<&T> {
        self.role_object.as_ref()?.downcast_ref::<T>()
    }

    /// Mutably access the role object, if it is of type `T`
    pub fn role_object_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.role_object.as_mut()?.downcast_mut::<T>()
    }

    /// Destroy the role object
    ///
    /// The surface is unmapped and the role `destroy` hook runs before the object is dropped.
    /// The surface keeps its role. Returns whether there was an object.
    pub fn destroy_role_object(&mut self) -> bool {
        if self.role_object.is_none() {
            return false;
        }
        self.unmap();
        if let Some(role) = self.role {
            role.destroy(self);
        }
        self.role_object = None;
        trace!(surface = ?self.id, "Role object destroyed");
        true
    }

    /// The role whose hooks currently run
    ///
    /// This is the role of the surface when it has a role object, or when the role takes none.
    pub(crate) fn active_role(&self) -> Option<&'static dyn SurfaceRole> {
        self.role
            .filter(|role| role.no_object() || self.role_object.is_some())
    }

    /// Whether the surface is mapped
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Map the surface
    ///
    /// Does nothing if it is already mapped.
    ///
    /// # Panics
    ///
    /// If the current state has no buffer.
    pub fn map(&mut self) {
        if self.mapped {
            return;
        }
        assert!(self.has_buffer(), "mapping {:?} without a buffer", self.id);
        self.mapped = true;
        trace!(surface = ?self.id, "Surface mapped");
        if let Some(role) = self.active_role() {
            role.map(self);
        }
        let view = super::CommittedSurface::new(self);
        for hook in self.hooks.map.snapshot() {
            hook(&view);
        }
    }

    /// Unmap the surface
    ///
    /// Does nothing if it is not mapped.
    pub fn unmap(&mut self) {
        if !self.mapped {
            return;
        }
        self.mapped = false;
        trace!(surface = ?self.id, "Surface unmapped");
        if let Some(role) = self.active_role() {
            role.unmap(self);
        }
        let view = super::CommittedSurface::new(self);
        for hook in self.hooks.unmap.snapshot() {
            hook(&view);
        }
    }
}
