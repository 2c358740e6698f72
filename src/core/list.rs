//! Index-linked thread lists
//!
//! Threads live in the scheduler's arena and embed their own link fields,
//! so a list is just a head/tail pair of arena indices. A thread carries
//! two independent link sets: the queue links (ready queue, wait lists,
//! exit waiters) and the registry links. The selector type parameter picks
//! which set a list threads through.

use core::marker::PhantomData;

use crate::thread::tcb::{Links, Thread};

/// Picks the link set a list uses
pub trait LinkSel {
    fn links(t: &Thread) -> &Links;
    fn links_mut(t: &mut Thread) -> &mut Links;
}

/// Ready queue, wait lists and exit waiters
pub struct QueueLinks;

/// Registry of live threads
pub struct RegistryLinks;

impl LinkSel for QueueLinks {
    #[inline(always)]
    fn links(t: &Thread) -> &Links {
        &t.queue
    }

    #[inline(always)]
    fn links_mut(t: &mut Thread) -> &mut Links {
        &mut t.queue
    }
}

impl LinkSel for RegistryLinks {
    #[inline(always)]
    fn links(t: &Thread) -> &Links {
        &t.registry
    }

    #[inline(always)]
    fn links_mut(t: &mut Thread) -> &mut Links {
        &mut t.registry
    }
}

/// Doubly linked list of arena indices
pub struct List<L> {
    head: Option<usize>,
    tail: Option<usize>,
    _sel: PhantomData<fn() -> L>,
}

/// List threaded through the queue links
pub type ThreadList = List<QueueLinks>;

/// List threaded through the registry links
pub type RegistryList = List<RegistryLinks>;

impl<L> Clone for List<L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L> Copy for List<L> {}

impl<L: LinkSel> Default for List<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L> core::fmt::Debug for List<L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("List").field("head", &self.head).field("tail", &self.tail).finish()
    }
}

impl<L: LinkSel> List<L> {
    pub const fn new() -> Self {
        List {
            head: None,
            tail: None,
            _sel: PhantomData,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub fn head(&self) -> Option<usize> {
        self.head
    }

    #[inline]
    pub fn tail(&self) -> Option<usize> {
        self.tail
    }

    /// Append at the tail
    pub fn push_back(&mut self, threads: &mut [Thread], idx: usize) {
        let links = L::links_mut(&mut threads[idx]);
        links.next = None;
        links.prev = self.tail;

        match self.tail {
            Some(tail) => L::links_mut(&mut threads[tail]).next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    /// Prepend at the head
    pub fn push_front(&mut self, threads: &mut [Thread], idx: usize) {
        let links = L::links_mut(&mut threads[idx]);
        links.prev = None;
        links.next = self.head;

        match self.head {
            Some(head) => L::links_mut(&mut threads[head]).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    /// Insert before the first thread of strictly lower priority
    ///
    /// Threads of equal priority keep their insertion order.
    pub fn insert_prio(&mut self, threads: &mut [Thread], idx: usize) {
        let prio = threads[idx].prio;
        let mut cursor = self.head;

        while let Some(cur) = cursor {
            if threads[cur].prio < prio {
                self.insert_before(threads, cur, idx);
                return;
            }
            cursor = L::links(&threads[cur]).next;
        }
        self.push_back(threads, idx);
    }

    fn insert_before(&mut self, threads: &mut [Thread], at: usize, idx: usize) {
        let prev = L::links(&threads[at]).prev;

        let links = L::links_mut(&mut threads[idx]);
        links.prev = prev;
        links.next = Some(at);

        L::links_mut(&mut threads[at]).prev = Some(idx);
        match prev {
            Some(p) => L::links_mut(&mut threads[p]).next = Some(idx),
            None => self.head = Some(idx),
        }
    }

    /// Unlink a thread known to be in this list
    pub fn remove(&mut self, threads: &mut [Thread], idx: usize) {
        let Links { next, prev } = *L::links(&threads[idx]);

        match prev {
            Some(p) => L::links_mut(&mut threads[p]).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => L::links_mut(&mut threads[n]).prev = prev,
            None => self.tail = prev,
        }

        let links = L::links_mut(&mut threads[idx]);
        links.next = None;
        links.prev = None;
    }

    pub fn pop_front(&mut self, threads: &mut [Thread]) -> Option<usize> {
        let head = self.head?;
        self.remove(threads, head);
        Some(head)
    }

    pub fn pop_back(&mut self, threads: &mut [Thread]) -> Option<usize> {
        let tail = self.tail?;
        self.remove(threads, tail);
        Some(tail)
    }

    /// Walk the list from head to tail
    pub fn iter<'a>(&self, threads: &'a [Thread]) -> Iter<'a, L> {
        Iter {
            threads,
            cursor: self.head,
            _sel: PhantomData,
        }
    }

    pub fn contains(&self, threads: &[Thread], idx: usize) -> bool {
        self.iter(threads).any(|i| i == idx)
    }
}

pub struct Iter<'a, L> {
    threads: &'a [Thread],
    cursor: Option<usize>,
    _sel: PhantomData<fn() -> L>,
}

impl<L: LinkSel> Iterator for Iter<'_, L> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let cur = self.cursor?;
        self.cursor = L::links(&self.threads[cur]).next;
        Some(cur)
    }
}
