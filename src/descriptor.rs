//! Block descriptor & free-list primitives (arena-indexed intrusive lists).
//!
//! The original source links descriptors through raw `next` pointers
//! embedded in heap-allocated nodes. Per the redesign called for by the
//! allocator's own design notes, descriptors instead live in an arena
//! (`Vec`-backed, free-slot recycling) and are referenced by `Handle`, a
//! plain index. Linkage is `Option<Handle>`, so the sorted-insert and
//! find-fit algorithms below only ever follow forward links, same as the
//! source.

/// A handle into a `DescriptorArena`. Stable for the descriptor's lifetime;
/// reused once the descriptor is removed.
pub type Handle = usize;

/// Out-of-band metadata for one contiguous extent of a heap's backing
/// reservation.
#[derive(Clone, Copy, Debug)]
pub struct Descriptor {
    /// Absolute address of the payload.
    pub start: usize,
    /// Byte count of the payload.
    pub length: usize,
    /// Logical tick of the most recent allocation or free that touched
    /// this extent. A tick, not a wall-clock timestamp, so tests can
    /// assert I4 (monotonicity) without sleeping.
    pub last_used: u64,
    /// Wall-clock twin of `last_used`, kept only so the age-based
    /// reclaim policy variant can compare against `MAX_UNUSED_SECONDS`.
    /// The coin-flip default policy never reads this field.
    pub last_used_at: std::time::Instant,
    next: Option<Handle>,
}

impl Descriptor {
    /// Stamp both time representations together; the two must never
    /// drift apart.
    pub fn touch(&mut self, tick: u64) {
        self.last_used = tick;
        self.last_used_at = std::time::Instant::now();
    }
}

enum Slot {
    Occupied(Descriptor),
    Vacant(Option<Handle>),
}

/// Arena of descriptors for a single heap. Every descriptor reachable from
/// that heap's free or used list lives here; removing a descriptor from
/// both lists frees its slot for reuse.
#[derive(Default)]
pub struct DescriptorArena {
    slots: Vec<Slot>,
    free_head: Option<Handle>,
}

impl DescriptorArena {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
        }
    }

    /// Insert a new descriptor (not yet linked into any list) and return
    /// its handle.
    pub fn insert(&mut self, start: usize, length: usize, last_used: u64) -> Handle {
        let descriptor = Descriptor {
            start,
            length,
            last_used,
            last_used_at: std::time::Instant::now(),
            next: None,
        };
        if let Some(h) = self.free_head {
            match self.slots[h] {
                Slot::Vacant(next_free) => self.free_head = next_free,
                Slot::Occupied(_) => unreachable!("free_head pointed at an occupied slot"),
            }
            self.slots[h] = Slot::Occupied(descriptor);
            h
        } else {
            self.slots.push(Slot::Occupied(descriptor));
            self.slots.len() - 1
        }
    }

    /// Remove a descriptor from the arena (it must not be linked into any
    /// list at this point) and return its final fields.
    pub fn take(&mut self, handle: Handle) -> Descriptor {
        let slot = std::mem::replace(&mut self.slots[handle], Slot::Vacant(self.free_head));
        self.free_head = Some(handle);
        match slot {
            Slot::Occupied(d) => d,
            Slot::Vacant(_) => panic!("double free of descriptor handle {handle}"),
        }
    }

    #[inline]
    pub fn get(&self, handle: Handle) -> &Descriptor {
        match &self.slots[handle] {
            Slot::Occupied(d) => d,
            Slot::Vacant(_) => panic!("use of vacant descriptor handle {handle}"),
        }
    }

    #[inline]
    pub fn get_mut(&mut self, handle: Handle) -> &mut Descriptor {
        match &mut self.slots[handle] {
            Slot::Occupied(d) => d,
            Slot::Vacant(_) => panic!("use of vacant descriptor handle {handle}"),
        }
    }

    #[inline]
    fn next(&self, handle: Handle) -> Option<Handle> {
        self.get(handle).next
    }

    #[inline]
    fn set_next(&mut self, handle: Handle, next: Option<Handle>) {
        self.get_mut(handle).next = next;
    }

    /// Number of descriptors currently occupying the arena (on some list).
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Occupied(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate a list starting at `head` in link order.
    pub fn iter_list(&self, head: Option<Handle>) -> ListIter<'_> {
        ListIter {
            arena: self,
            current: head,
        }
    }
}

pub struct ListIter<'a> {
    arena: &'a DescriptorArena,
    current: Option<Handle>,
}

impl Iterator for ListIter<'_> {
    type Item = Handle;

    fn next(&mut self) -> Option<Handle> {
        let h = self.current?;
        self.current = self.arena.next(h);
        Some(h)
    }
}

/// Insert `node` into the list rooted at `*head`, keyed by descending
/// `length`. Stable across equal lengths: a new node precedes existing
/// nodes of the same length (ties broken by insertion order).
pub fn insert_sorted(arena: &mut DescriptorArena, head: &mut Option<Handle>, node: Handle) {
    let node_length = arena.get(node).length;

    match *head {
        None => {
            arena.set_next(node, None);
            *head = Some(node);
            return;
        }
        Some(h) if arena.get(h).length < node_length => {
            arena.set_next(node, Some(h));
            *head = Some(node);
            return;
        }
        _ => {}
    }

    let mut prev = head.unwrap();
    loop {
        match arena.next(prev) {
            Some(next) if arena.get(next).length >= node_length => {
                prev = next;
            }
            rest => {
                arena.set_next(node, rest);
                arena.set_next(prev, Some(node));
                return;
            }
        }
    }
}

/// Unlink `node` from the list rooted at `*head`. `node` must currently be
/// on this list.
pub fn detach(arena: &mut DescriptorArena, head: &mut Option<Handle>, node: Handle) {
    if *head == Some(node) {
        *head = arena.next(node);
        arena.set_next(node, None);
        return;
    }

    let mut prev = head.expect("detach of node not on this list");
    loop {
        let next = arena.next(prev).expect("detach of node not on this list");
        if next == node {
            arena.set_next(prev, arena.next(node));
            arena.set_next(node, None);
            return;
        }
        prev = next;
    }
}
