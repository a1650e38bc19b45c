//! Arena allocation for parsed messages.
//!
//! Every [`DynamicMessage`](crate::message::DynamicMessage) borrows its
//! variable-length payloads (string chunks, byte chunks, repeated scalar
//! storage) from an [`Arena`]. The arena is a region allocator: allocation
//! bumps a pointer inside the current block, individual values are never
//! freed, and the whole region is reclaimed at once.
//!
//! ## Fusion
//!
//! Two arenas may be *fused* into one lifetime group. Rust's borrow checker
//! already guarantees that no reference outlives the arena it was allocated
//! from, so the observable contract of fusion is cleanup deferral: block
//! reclamation and every destructor registered with [`Arena::own`] wait
//! until the *last* member of the fused group is dropped. Fusion is
//! idempotent and transitive.
//!
//! Groups are shared through [`LifetimeGroup`] handles, which are `Send` and
//! `Sync`; fusing through a handle is the one arena operation that is safe
//! across threads without external synchronization.

use std::fmt;
use std::sync::{Arc, Mutex};

use bumpalo::Bump;

/// Arena-backed growable vector, re-exported for repeated-field storage.
pub use bumpalo::collections::Vec as ArenaVec;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Payload handed to the lifetime group when an arena drops: its blocks and
/// its pending destructors, kept alive until the group dies.
struct Retired {
    cleanups: Vec<Cleanup>,
    blocks: Bump,
}

struct RootState {
    /// Live arenas in this group
    live: usize,
    /// Payloads of already-dropped members
    retired: Vec<Retired>,
}

enum GroupInner {
    Root(RootState),
    /// Forwarding link to another node; compressed toward the root on lookup
    Link(Arc<GroupNode>),
}

struct GroupNode {
    inner: Mutex<GroupInner>,
}

impl GroupNode {
    fn new_root() -> Arc<Self> {
        Arc::new(GroupNode {
            inner: Mutex::new(GroupInner::Root(RootState {
                live: 1,
                retired: Vec::new(),
            })),
        })
    }
}

/// Walks link nodes to the group root, compressing the path behind it.
fn find_root(start: &Arc<GroupNode>) -> Arc<GroupNode> {
    let mut current = Arc::clone(start);
    loop {
        let next = {
            let guard = current.inner.lock().unwrap_or_else(|e| e.into_inner());
            match &*guard {
                GroupInner::Root(_) => break,
                GroupInner::Link(parent) => Arc::clone(parent),
            }
        };
        current = next;
    }
    // Compression pass: repoint every link on the walked path at the root.
    let root = current;
    let mut current = Arc::clone(start);
    while !Arc::ptr_eq(&current, &root) {
        let next = {
            let mut guard = current.inner.lock().unwrap_or_else(|e| e.into_inner());
            match &mut *guard {
                GroupInner::Root(_) => break,
                GroupInner::Link(parent) => {
                    let next = Arc::clone(parent);
                    *parent = Arc::clone(&root);
                    next
                }
            }
        };
        current = next;
    }
    root
}

fn run_retired(mut retired: Vec<Retired>) {
    // LIFO relative to registration: later members first, and within each
    // member the most recently registered destructor first.
    for mut member in retired.drain(..).rev() {
        for cleanup in member.cleanups.drain(..).rev() {
            cleanup();
        }
        drop(member.blocks);
    }
}

/// A shareable handle to an arena's lifetime group.
///
/// Handles stay valid after the arena itself drops and may be sent across
/// threads; [`LifetimeGroup::fuse`] is the cross-thread fusion entry point.
#[derive(Clone)]
pub struct LifetimeGroup {
    node: Arc<GroupNode>,
}

impl LifetimeGroup {
    /// Fuses this group with another.
    ///
    /// After fusing, cleanup of both groups is deferred until the last
    /// member of the combined group drops. Fusing a group with itself is a
    /// no-op; fusing already-fused groups is a no-op.
    pub fn fuse(&self, other: &LifetimeGroup) {
        loop {
            let a = find_root(&self.node);
            let b = find_root(&other.node);
            if Arc::ptr_eq(&a, &b) {
                return; // already one group
            }

            // Lock in address order so concurrent fuses cannot deadlock.
            let (first, second) = if Arc::as_ptr(&a) < Arc::as_ptr(&b) {
                (&a, &b)
            } else {
                (&b, &a)
            };
            let mut first_guard = first.inner.lock().unwrap_or_else(|e| e.into_inner());
            let mut second_guard = second.inner.lock().unwrap_or_else(|e| e.into_inner());

            // A racing fuse may have demoted either root since the lookup;
            // retry from the top if so.
            let (GroupInner::Root(first_state), GroupInner::Root(second_state)) =
                (&mut *first_guard, &mut *second_guard)
            else {
                continue;
            };

            first_state.live += second_state.live;
            first_state.retired.append(&mut second_state.retired);
            *second_guard = GroupInner::Link(Arc::clone(first));
            tracing::debug!("fused arena lifetime groups");
            return;
        }
    }

    /// Returns true if both handles currently resolve to the same group.
    pub fn same_group(&self, other: &LifetimeGroup) -> bool {
        Arc::ptr_eq(&find_root(&self.node), &find_root(&other.node))
    }
}

impl fmt::Debug for LifetimeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeGroup").finish_non_exhaustive()
    }
}

/// A region allocator with deterministic, group-deferred destruction.
///
/// Values placed in the arena with [`Arena::alloc`] are *not* dropped; the
/// arena is for data whose cleanup is block reclamation. Values that need a
/// destructor are registered with [`Arena::own`], which defers the drop to
/// group destruction in LIFO order.
pub struct Arena {
    bump: Bump,
    cleanups: Mutex<Vec<Cleanup>>,
    group: Arc<GroupNode>,
}

impl Arena {
    /// Creates a new arena. The first block starts small (256 bytes) and
    /// block sizes grow geometrically.
    pub fn new() -> Self {
        Arena {
            bump: Bump::new(),
            cleanups: Mutex::new(Vec::new()),
            group: GroupNode::new_root(),
        }
    }

    /// Creates a new arena whose first block holds at least `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            bump: Bump::with_capacity(capacity),
            cleanups: Mutex::new(Vec::new()),
            group: GroupNode::new_root(),
        }
    }

    /// Allocates a value in the arena.
    ///
    /// The returned pointer is stable until the arena's lifetime group is
    /// destroyed. The value's destructor will not run; use [`Arena::own`]
    /// for values that need one.
    #[inline]
    pub fn alloc<T>(&self, value: T) -> &mut T {
        self.bump.alloc(value)
    }

    /// Copies a string into the arena.
    #[inline]
    pub fn alloc_str(&self, s: &str) -> &str {
        self.bump.alloc_str(s)
    }

    /// Copies a byte slice into the arena.
    #[inline]
    pub fn alloc_bytes(&self, bytes: &[u8]) -> &[u8] {
        self.bump.alloc_slice_copy(bytes)
    }

    /// Copies a slice of `Copy` values into the arena.
    #[inline]
    pub fn alloc_slice_copy<T: Copy>(&self, slice: &[T]) -> &[T] {
        self.bump.alloc_slice_copy(slice)
    }

    /// Creates an arena-backed vector for accumulating repeated elements.
    #[inline]
    pub fn vec<T>(&self) -> ArenaVec<'_, T> {
        ArenaVec::new_in(&self.bump)
    }

    /// Creates an arena-backed vector with room for `capacity` elements.
    #[inline]
    pub fn vec_with_capacity<T>(&self, capacity: usize) -> ArenaVec<'_, T> {
        ArenaVec::with_capacity_in(capacity, &self.bump)
    }

    /// Takes ownership of `value`, running its destructor when this arena's
    /// lifetime group is destroyed. Destructors run in LIFO order relative
    /// to registration.
    pub fn own<T: Send + 'static>(&self, value: T) {
        self.on_group_drop(move || drop(value));
    }

    /// Registers a callback invoked when this arena's lifetime group is
    /// destroyed, in LIFO order relative to registration.
    pub fn on_group_drop(&self, callback: impl FnOnce() + Send + 'static) {
        self.cleanups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(callback));
    }

    /// Fuses this arena's lifetime group with another arena's.
    ///
    /// Idempotent and transitive; see the module docs for the exact
    /// contract.
    pub fn fuse(&self, other: &Arena) {
        self.group().fuse(&other.group());
    }

    /// Returns a shareable handle to this arena's lifetime group.
    pub fn group(&self) -> LifetimeGroup {
        LifetimeGroup {
            node: Arc::clone(&self.group),
        }
    }

    /// Returns the total bytes currently allocated from the global heap by
    /// this arena's own blocks.
    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("allocated_bytes", &self.allocated_bytes())
            .finish_non_exhaustive()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        let cleanups = std::mem::take(
            &mut *self.cleanups.lock().unwrap_or_else(|e| e.into_inner()),
        );
        let blocks = std::mem::take(&mut self.bump);
        let retired = Retired { cleanups, blocks };

        let root = find_root(&self.group);
        let finished = {
            let mut guard = root.inner.lock().unwrap_or_else(|e| e.into_inner());
            let GroupInner::Root(state) = &mut *guard else {
                // A node found as root cannot be demoted while it still has
                // live members, and this arena is one.
                unreachable!("arena group root demoted while member was live");
            };
            state.retired.push(retired);
            state.live -= 1;
            if state.live == 0 {
                Some(std::mem::take(&mut state.retired))
            } else {
                None
            }
        };

        if let Some(retired) = finished {
            run_retired(retired);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_alloc_basics() {
        let arena = Arena::new();
        let s = arena.alloc_str("hello");
        let b = arena.alloc_bytes(b"world");
        let v = arena.alloc(42u64);
        assert_eq!(s, "hello");
        assert_eq!(b, b"world");
        assert_eq!(*v, 42);
        assert!(arena.allocated_bytes() > 0);
    }

    #[test]
    fn test_pointers_stable_across_growth() {
        let arena = Arena::new();
        let first = arena.alloc_str("first");
        // Force several new blocks.
        for i in 0..10_000 {
            let _ = arena.alloc(i as u64);
        }
        assert_eq!(first, "first");
    }

    #[test]
    fn test_own_runs_lifo_at_drop() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let arena = Arena::new();
        for i in 0..3 {
            let order = Arc::clone(&order);
            arena.on_group_drop(move || order.lock().unwrap().push(i));
        }
        drop(arena);
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn test_fuse_defers_cleanup() {
        let counter = Arc::new(AtomicUsize::new(0));
        let a = Arena::new();
        let b = Arena::new();
        a.fuse(&b);

        let c = Arc::clone(&counter);
        a.on_group_drop(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        drop(a);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        drop(b);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fuse_idempotent() {
        let a = Arena::new();
        let b = Arena::new();
        a.fuse(&b);
        a.fuse(&b);
        b.fuse(&a);
        assert!(a.group().same_group(&b.group()));
    }

    #[test]
    fn test_fuse_self_is_noop() {
        let a = Arena::new();
        a.fuse(&a);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        a.on_group_drop(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        drop(a);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fusion_transitive() {
        let counter = Arc::new(AtomicUsize::new(0));
        let a = Arena::new();
        let b = Arena::new();
        let c = Arena::new();
        a.fuse(&b);
        b.fuse(&c);
        assert!(a.group().same_group(&c.group()));

        let n = Arc::clone(&counter);
        c.on_group_drop(move || {
            n.fetch_add(1, Ordering::SeqCst);
        });

        drop(c);
        drop(a);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        drop(b);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cross_thread_fuse_through_group_handles() {
        let a = Arena::new();
        let b = Arena::new();
        let ga = a.group();
        let gb = b.group();
        let handle = std::thread::spawn(move || {
            ga.fuse(&gb);
        });
        handle.join().unwrap();
        assert!(a.group().same_group(&b.group()));
    }

    #[test]
    fn test_owned_value_dropped_with_group() {
        struct Tracker(Arc<AtomicUsize>);
        impl Drop for Tracker {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(AtomicUsize::new(0));
        let arena = Arena::new();
        arena.own(Tracker(Arc::clone(&counter)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        drop(arena);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
