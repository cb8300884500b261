// The commit engine of a surface
//
// On `wl_surface.commit`, the pending state is first finalized: the attached buffer is
// resolved, derived sizes are computed and the client input is validated. The role and
// the pre-commit hooks then get a chance to validate it as well, and to lock it.
//
// A commit is then either applied right away, or cached (see `cache.rs`) if the pending
// state is locked or older states are still waiting. Applying a state moves it into the
// current state, after which the derived data (buffer damage, opaque and input regions)
// is recomputed, the surface is unmapped if it lost its buffer, and the synced extensions,
// the role and the post-commit hooks are notified, in that order.
//
// Validation failures go through `Surface::reject`, which only records the first error of a
// commit. A rejected commit leaves the pending state as the client built it.

use tracing::{debug, trace, warn};

use crate::utils::{Rectangle, Size};

use super::{
    damage, CommitError, CommitOutcome, CommittedSurface, ErrorTarget, LockToken, Rejection, Surface,
    SurfaceState,
};
use super::state::Committed;

/// wl_surface.error.invalid_size
const INVALID_SIZE: u32 = 2;

enum Incoming {
    Pending,
    Cached(SurfaceState),
}

impl Surface {
    /// Commit the pending state
    ///
    /// # Panics
    ///
    /// If called from a hook running during a commit of the same surface.
    #[profiling::function]
    pub fn commit(&mut self) -> Result<CommitOutcome, CommitError> {
        assert!(!self.handling_commit, "re-entrant commit on {:?}", self.id);
        self.handling_commit = true;
        self.rejection = None;

        self.finalize_pending();
        if self.rejection.is_none() {
            if let Some(role) = self.active_role() {
                role.client_commit(self);
            }
        }
        if self.rejection.is_none() {
            for hook in self.hooks.pre_commit.snapshot() {
                hook(self);
                if self.rejection.is_some() {
                    break;
                }
            }
        }
        self.handling_commit = false;

        if let Some(rejection) = self.rejection.take() {
            return Err(CommitError::Rejected(rejection));
        }

        if self.cache.pending_locks == 0 && self.cache.is_empty() {
            trace!(surface = ?self.id, seq = ?self.pending.seq, "Applying commit");
            self.apply(Incoming::Pending);
            Ok(CommitOutcome::Applied)
        } else {
            let token = self.enqueue()?;
            Ok(CommitOutcome::Cached(token))
        }
    }

    /// Refuse the commit being handled
    ///
    /// Only the first rejection of a commit is kept.
    ///
    /// # Panics
    ///
    /// If no commit of this surface is being handled.
    pub fn reject(&mut self, target: ErrorTarget, code: u32, message: impl Into<String>) {
        assert!(
            self.handling_commit,
            "rejecting outside of a commit of {:?}",
            self.id
        );
        if self.rejection.is_some() {
            return;
        }
        let rejection = Rejection {
            target,
            code,
            message: message.into(),
        };
        debug!(surface = ?self.id, ?rejection, "Commit rejected");
        self.rejection = Some(rejection);
    }

    /// Whether the commit being handled was rejected
    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }

    /// Lock the pending state
    ///
    /// The next commit will be cached until the returned token is passed to [`Surface::unlock`].
    pub fn lock(&mut self) -> LockToken {
        self.cache.pending_locks += 1;
        trace!(surface = ?self.id, seq = ?self.pending.seq, locks = self.cache.pending_locks, "Locking pending state");
        LockToken(self.pending.seq)
    }

    /// Release a lock taken with [`Surface::lock`]
    ///
    /// If this was the last lock of the oldest cached state, it is applied, followed by every
    /// following state that holds no lock.
    ///
    /// # Panics
    ///
    /// If the token does not match a lock held on this surface.
    #[profiling::function]
    pub fn unlock(&mut self, token: LockToken) {
        if token.0 == self.pending.seq {
            assert!(
                self.cache.pending_locks > 0,
                "unlocking {:?} of {:?} which holds no lock",
                token,
                self.id
            );
            self.cache.pending_locks -= 1;
            trace!(surface = ?self.id, seq = ?token.0, "Unlocking pending state");
            return;
        }

        let index = self
            .cache
            .position(token.0)
            .unwrap_or_else(|| panic!("unknown lock token {:?} on {:?}", token, self.id));
        let Some(entry) = self.cache.get_mut(index) else {
            unreachable!()
        };
        assert!(
            entry.lock_count > 0,
            "unlocking {:?} of {:?} which holds no lock",
            token,
            self.id
        );
        entry.lock_count -= 1;
        let remaining = entry.lock_count;
        trace!(surface = ?self.id, seq = ?token.0, remaining, "Unlocking cached state");
        if remaining > 0 || index != 0 {
            return;
        }

        while let Some(state) = self.cache.pop_ready() {
            trace!(surface = ?self.id, seq = ?state.seq, "Applying cached state");
            self.apply(Incoming::Cached(state));
        }
    }

    fn finalize_pending(&mut self) {
        if self.pending.committed.contains(Committed::BUFFER) {
            match self.pending.attachment {
                Some(token) => match self.resolver().resolve(token) {
                    Some(buffer) => {
                        self.pending.buffer_size = buffer.size();
                        self.pending.buffer = Some(buffer);
                    }
                    None => {
                        self.pending.buffer = None;
                        self.reject(ErrorTarget::Buffer(token), 0, "unknown buffer type");
                        return;
                    }
                },
                None => {
                    self.pending.buffer = None;
                    self.pending.buffer_size = Size::default();
                }
            }
        }

        let pending = &self.pending;
        let buffer_size = pending.buffer_size;
        if pending.viewport.src.is_none()
            && (buffer_size.w % pending.scale != 0 || buffer_size.h % pending.scale != 0)
        {
            if self.role.map_or(false, |role| role.allows_unscaled_buffer()) {
                warn!(
                    surface = ?self.id,
                    ?buffer_size,
                    scale = pending.scale,
                    "Client bug: buffer size is not divisible by scale"
                );
            } else {
                let message = format!(
                    "Buffer size ({}x{}) is not divisible by scale ({})",
                    buffer_size.w, buffer_size.h, pending.scale
                );
                self.reject(ErrorTarget::Surface, INVALID_SIZE, message);
                return;
            }
        }

        let pending = &mut self.pending;
        pending.size = match pending.viewport.dst {
            Some(_) if buffer_size.is_empty() => Size::default(),
            Some(dst) => dst,
            None => pending.viewport_src_size().to_i32_trunc(),
        };

        let surface_box = Rectangle::from_size(pending.size);
        pending.surface_damage.intersect_rect(surface_box);
        pending.buffer_damage.intersect_rect(Rectangle::from_size(buffer_size));
    }

    fn apply(&mut self, incoming: Incoming) {
        let mut cached = match incoming {
            Incoming::Pending => None,
            Incoming::Cached(state) => Some(state),
        };

        {
            let Surface {
                pending,
                current,
                synced,
                ..
            } = self;
            let src = match cached.as_mut() {
                Some(state) => state,
                None => pending,
            };
            current.move_from(src, synced);
        }

        self.buffer_damage = damage::buffer_damage(&self.current);

        if self.current.committed.contains(Committed::BUFFER) && self.current.buffer.is_none() {
            self.unmap();
        }

        self.opaque_region = damage::opaque_region(&self.current);
        self.input_region = damage::input_region(&self.current);

        {
            let view = CommittedSurface::new(self);
            for (slot, state) in self.synced.values().zip(self.current.synced.iter()) {
                slot.commit(&view, &**state);
            }
        }

        if let Some(role) = self.active_role() {
            role.commit(self);
        }

        let view = CommittedSurface::new(self);
        for hook in self.hooks.post_commit.snapshot() {
            hook(&view);
        }

        match cached {
            Some(mut state) => self.finish_synced(&mut state),
            None => self.pending.buffer = None,
        }
    }

    fn enqueue(&mut self) -> Result<LockToken, CommitError> {
        self.cache
            .reserve_one()
            .map_err(|_| CommitError::OutOfMemory)?;
        let mut cached = SurfaceState::init(&self.synced).map_err(|_| CommitError::OutOfMemory)?;

        cached.move_from(&mut self.pending, &self.synced);
        self.pending.buffer = None;

        let token = LockToken(cached.seq);
        trace!(
            surface = ?self.id,
            seq = ?cached.seq,
            locks = self.cache.pending_locks,
            queued = self.cache.len() + 1,
            "Caching commit"
        );
        self.cache.push(cached);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::utils::{Logical, Region};
    use crate::wayland::compositor::tests::{attach_new, surface, Fixture};
    use crate::wayland::compositor::SurfaceRole;

    fn seq_log(surface: &mut Surface) -> Rc<RefCell<Vec<u32>>> {
        let log: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
        let hook_log = log.clone();
        surface.add_post_commit_hook(move |s| hook_log.borrow_mut().push(s.current().seq().into()));
        log
    }

    #[test]
    fn immediate_commit() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let commits = seq_log(&mut surface);

        let buffer = attach_new(&fixture, &mut surface, (64, 32));
        let seq = surface.pending().seq();
        assert_eq!(surface.commit().unwrap(), CommitOutcome::Applied);

        assert_eq!(*commits.borrow(), vec![u32::from(seq)]);
        assert_eq!(surface.current().size(), Size::from((64, 32)));
        assert!(surface.current().buffer().is_some());
        assert!(surface.pending().buffer().is_none());
        assert!(surface.pending().committed().is_empty());
        assert_eq!(buffer.release_count(), 0);
        assert_eq!(surface.cached_len(), 0);
    }

    #[test]
    fn single_lock_defers_commit() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let commits = seq_log(&mut surface);

        let token = surface.lock();
        attach_new(&fixture, &mut surface, (10, 10));
        assert_eq!(surface.commit().unwrap(), CommitOutcome::Cached(token));
        assert!(commits.borrow().is_empty());
        assert!(!surface.has_buffer());
        assert_eq!(surface.cached_len(), 1);

        surface.unlock(token);
        assert_eq!(*commits.borrow(), vec![u32::from(token.seq())]);
        assert!(surface.has_buffer());
        assert_eq!(surface.cached_len(), 0);
    }

    #[test]
    fn cached_states_apply_in_commit_order() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let commits = seq_log(&mut surface);

        let first = surface.lock();
        surface.commit().unwrap();
        let second = surface.lock();
        surface.commit().unwrap();
        surface.commit().unwrap();
        assert_eq!(surface.cached_len(), 3);

        surface.unlock(second);
        assert!(commits.borrow().is_empty());

        surface.unlock(first);
        let seqs: Vec<u32> = vec![first.seq().into(), second.seq().into(), second.seq().next().into()];
        assert_eq!(*commits.borrow(), seqs);
        assert_eq!(surface.cached_len(), 0);

        assert_eq!(surface.commit().unwrap(), CommitOutcome::Applied);
    }

    #[test]
    fn multiple_locks_on_one_state() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let a = surface.lock();
        let b = surface.lock();
        assert_eq!(a, b);
        surface.commit().unwrap();

        surface.unlock(a);
        assert_eq!(surface.cached_len(), 1);
        surface.unlock(b);
        assert_eq!(surface.cached_len(), 0);
    }

    #[test]
    fn unlocking_pending_before_commit() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let token = surface.lock();
        surface.unlock(token);
        assert_eq!(surface.commit().unwrap(), CommitOutcome::Applied);
    }

    #[test]
    #[should_panic(expected = "unknown lock token")]
    fn unknown_token_panics() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let token = surface.lock();
        surface.commit().unwrap();
        surface.unlock(token);
        surface.unlock(token);
    }

    #[test]
    fn damage_does_not_leak_into_next_commit() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        attach_new(&fixture, &mut surface, (100, 100));
        surface.damage(Rectangle::from(((0, 0), (10, 10))));
        surface.commit().unwrap();
        assert_eq!(
            *surface.buffer_damage(),
            Region::from(Rectangle::from(((0, 0), (10, 10))))
        );

        surface.commit().unwrap();
        assert!(surface.buffer_damage().is_empty());
        assert!(surface.current().surface_damage().is_empty());
    }

    #[test]
    fn damage_is_clipped_to_surface() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        attach_new(&fixture, &mut surface, (20, 20));
        surface.damage(Rectangle::from(((10, 10), (100, 100))));
        surface.damage_buffer(Rectangle::from(((-5, -5), (10, 10))));
        surface.commit().unwrap();
        assert_eq!(
            *surface.current().surface_damage(),
            Region::<Logical>::from(Rectangle::from(((10, 10), (10, 10))))
        );
        assert_eq!(surface.buffer_damage().area(), 100 + 25);
    }

    #[test]
    fn non_divisible_buffer_is_rejected() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let commits = seq_log(&mut surface);
        attach_new(&fixture, &mut surface, (15, 16));
        surface.set_buffer_scale(2).unwrap();

        match surface.commit() {
            Err(CommitError::Rejected(rejection)) => {
                assert_eq!(rejection.target, ErrorTarget::Surface);
                assert_eq!(rejection.code, INVALID_SIZE);
            }
            other => panic!("unexpected commit result {:?}", other),
        }
        assert!(commits.borrow().is_empty());
        assert!(surface.pending().committed().contains(Committed::BUFFER | Committed::SCALE));

        surface.set_buffer_scale(1).unwrap();
        surface.commit().unwrap();
        assert_eq!(commits.borrow().len(), 1);
        assert_eq!(surface.current().size(), Size::from((15, 16)));
    }

    #[test]
    fn unknown_buffer_is_rejected() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let buffer = fixture.buffers.create((4, 4), false);
        fixture.buffers.remove(buffer.token());
        surface.attach(Some(buffer.token()));

        match surface.commit() {
            Err(CommitError::Rejected(rejection)) => {
                assert_eq!(rejection.target, ErrorTarget::Buffer(buffer.token()));
                assert_eq!(rejection.code, 0);
            }
            other => panic!("unexpected commit result {:?}", other),
        }
        assert!(!surface.has_buffer());
    }

    #[test]
    fn null_attach_unmaps() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let buffer = attach_new(&fixture, &mut surface, (8, 8));
        surface.commit().unwrap();
        surface.map();

        surface.attach(None);
        surface.commit().unwrap();
        assert!(!surface.is_mapped());
        assert_eq!(surface.current().size(), Size::default());
        assert_eq!(buffer.release_count(), 1);
    }

    #[test]
    fn first_rejection_wins() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        surface.add_pre_commit_hook(|s| {
            s.reject(ErrorTarget::Role("test"), 7, "first");
            s.reject(ErrorTarget::Surface, 8, "second");
        });
        let second_hook_ran = Rc::new(RefCell::new(false));
        let ran = second_hook_ran.clone();
        surface.add_pre_commit_hook(move |_| *ran.borrow_mut() = true);

        let Err(CommitError::Rejected(rejection)) = surface.commit() else {
            panic!("commit was not rejected");
        };
        assert_eq!(rejection.code, 7);
        assert_eq!(rejection.message, "first");
        assert!(!*second_hook_ran.borrow());
    }

    #[test]
    #[should_panic(expected = "rejecting outside of a commit")]
    fn reject_outside_commit_panics() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        surface.reject(ErrorTarget::Surface, 0, "nope");
    }

    struct Validating;
    impl SurfaceRole for Validating {
        fn name(&self) -> &'static str {
            "validating"
        }

        fn no_object(&self) -> bool {
            true
        }

        fn client_commit(&self, surface: &mut Surface) {
            if surface.pending().scale() > 1 {
                surface.reject(ErrorTarget::Role("validating"), 1, "no scaling");
            }
        }
    }
    static VALIDATING: Validating = Validating;

    #[test]
    fn role_client_commit_can_reject() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        surface.set_role(&VALIDATING).unwrap();
        surface.set_buffer_scale(2).unwrap();
        assert!(matches!(surface.commit(), Err(CommitError::Rejected(_))));
        surface.set_buffer_scale(1).unwrap();
        assert!(surface.commit().is_ok());
    }

    #[test]
    fn pre_commit_hook_may_lock() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let taken = Rc::new(RefCell::new(Vec::new()));
        let tokens = taken.clone();
        surface.add_pre_commit_hook(move |s| tokens.borrow_mut().push(s.lock()));

        assert!(matches!(surface.commit(), Ok(CommitOutcome::Cached(_))));
        assert!(matches!(surface.commit(), Ok(CommitOutcome::Cached(_))));
        assert_eq!(surface.cached_len(), 2);

        let tokens: Vec<LockToken> = taken.borrow_mut().drain(..).collect();
        for token in tokens {
            surface.unlock(token);
        }
        assert_eq!(surface.cached_len(), 0);
    }
}
