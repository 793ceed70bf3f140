//! Intrusive doubly-linked slab lists.
//!
//! The links live in the slab headers. [`unlink`] and [`insert_before`] are
//! the only two operations that touch them; [`SlabList`] adds the head
//! pointer and length bookkeeping on top.

use super::slab_node::SlabNode;

/// Detach `node` from whatever list it is in, joining its neighbours.
///
/// The owning list's head is not touched: if `node` was the head, the caller
/// has to move the head to the old `next` itself.
pub(crate) fn unlink(mut node: SlabNode) {
    let prev = node.prev();
    let next = node.next();

    if let Some(mut prev_node) = prev {
        prev_node.set_next(next);
    }
    if let Some(mut next_node) = next {
        next_node.set_prev(prev);
    }

    node.set_prev(None);
    node.set_next(None);
}

/// Link `node` in front of `target`.
///
/// `node` takes over `target`'s old predecessor, which is `None` when
/// `target` is a list head. With no target the node ends up on its own.
pub(crate) fn insert_before(mut node: SlabNode, target: Option<SlabNode>) {
    node.set_next(target);
    node.set_prev(None);

    if let Some(mut target_node) = target {
        let prev = target_node.prev();
        node.set_prev(prev);
        if let Some(mut prev_node) = prev {
            prev_node.set_next(Some(node));
        }
        target_node.set_prev(Some(node));
    }
}

/// Unordered list of slabs sharing one occupancy state.
pub(crate) struct SlabList {
    head: Option<SlabNode>,
    len: usize,
}

impl SlabList {
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub fn head(&self) -> Option<SlabNode> {
        self.head
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn push_front(&mut self, node: SlabNode) {
        insert_before(node, self.head);
        self.head = Some(node);
        self.len += 1;
    }

    /// Remove `node`, which must be a member of this list.
    pub fn remove(&mut self, node: SlabNode) {
        if self.head == Some(node) {
            self.head = node.next();
        }
        unlink(node);
        self.len = self.len.saturating_sub(1);
    }

    pub fn pop_front(&mut self) -> Option<SlabNode> {
        let head = self.head?;
        self.remove(head);
        Some(head)
    }

    pub fn iter(&self) -> SlabListIter {
        SlabListIter { current: self.head }
    }
}

pub(crate) struct SlabListIter {
    current: Option<SlabNode>,
}

impl Iterator for SlabListIter {
    type Item = SlabNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        self.current = node.next();
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::CacheGeometry;
    use alloc::alloc::{alloc, dealloc};
    use alloc::vec::Vec;
    use core::alloc::Layout;

    const PAGE_SIZE: usize = 0x1000;

    struct TestSlabs {
        nodes: Vec<SlabNode>,
        layout: Layout,
    }

    impl TestSlabs {
        fn new(count: usize) -> Self {
            let geometry = CacheGeometry::new(64, PAGE_SIZE).unwrap();
            let layout = Layout::from_size_align(geometry.slab_size, geometry.slab_size).unwrap();
            let nodes = (0..count)
                .map(|_| {
                    let base = unsafe { alloc(layout) } as usize;
                    assert_ne!(base, 0);
                    let mut node = SlabNode::new(base);
                    node.init(&geometry);
                    node
                })
                .collect();
            Self { nodes, layout }
        }
    }

    impl Drop for TestSlabs {
        fn drop(&mut self) {
            for node in &self.nodes {
                unsafe { dealloc(node.addr() as *mut u8, self.layout) };
            }
        }
    }

    fn collect(list: &SlabList) -> Vec<SlabNode> {
        list.iter().collect()
    }

    fn assert_links_consistent(list: &SlabList) {
        let mut prev = None;
        for node in list.iter() {
            assert_eq!(node.prev(), prev);
            prev = Some(node);
        }
        assert_eq!(list.iter().count(), list.len());
    }

    #[test]
    fn test_insert_before_single_node() {
        let slabs = TestSlabs::new(1);
        let a = slabs.nodes[0];
        insert_before(a, None);
        assert!(a.prev().is_none());
        assert!(a.next().is_none());
    }

    #[test]
    fn test_insert_before_head() {
        let slabs = TestSlabs::new(2);
        let (a, b) = (slabs.nodes[0], slabs.nodes[1]);
        insert_before(b, None);
        insert_before(a, Some(b));
        assert_eq!(a.next(), Some(b));
        assert_eq!(a.prev(), None);
        assert_eq!(b.prev(), Some(a));
        assert_eq!(b.next(), None);
    }

    #[test]
    fn test_insert_before_middle_fixes_predecessor() {
        let slabs = TestSlabs::new(3);
        let (a, b, c) = (slabs.nodes[0], slabs.nodes[1], slabs.nodes[2]);
        insert_before(c, None);
        insert_before(a, Some(c));
        insert_before(b, Some(c));
        assert_eq!(a.next(), Some(b));
        assert_eq!(b.prev(), Some(a));
        assert_eq!(b.next(), Some(c));
        assert_eq!(c.prev(), Some(b));
    }

    #[test]
    fn test_unlink_middle_head_tail() {
        let slabs = TestSlabs::new(3);
        let (a, b, c) = (slabs.nodes[0], slabs.nodes[1], slabs.nodes[2]);
        insert_before(c, None);
        insert_before(b, Some(c));
        insert_before(a, Some(b));

        unlink(b);
        assert_eq!(a.next(), Some(c));
        assert_eq!(c.prev(), Some(a));
        assert!(b.prev().is_none() && b.next().is_none());

        unlink(a);
        assert_eq!(c.prev(), None);

        unlink(c);
        assert!(c.prev().is_none() && c.next().is_none());
    }

    #[test]
    fn test_list_push_remove() {
        let slabs = TestSlabs::new(4);
        let mut list = SlabList::new();
        assert!(list.is_empty());

        for &node in &slabs.nodes {
            list.push_front(node);
        }
        assert_eq!(list.len(), 4);
        assert_eq!(list.head(), Some(slabs.nodes[3]));
        assert_links_consistent(&list);

        // Remove head, middle and tail.
        list.remove(slabs.nodes[3]);
        assert_eq!(list.head(), Some(slabs.nodes[2]));
        list.remove(slabs.nodes[1]);
        list.remove(slabs.nodes[0]);
        assert_eq!(collect(&list), [slabs.nodes[2]]);
        assert_links_consistent(&list);

        list.remove(slabs.nodes[2]);
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_move_between_lists() {
        let slabs = TestSlabs::new(3);
        let mut from = SlabList::new();
        let mut to = SlabList::new();
        for &node in &slabs.nodes {
            from.push_front(node);
        }

        from.remove(slabs.nodes[1]);
        to.push_front(slabs.nodes[1]);
        assert_eq!(collect(&from), [slabs.nodes[2], slabs.nodes[0]]);
        assert_eq!(collect(&to), [slabs.nodes[1]]);
        assert_links_consistent(&from);
        assert_links_consistent(&to);

        assert_eq!(from.pop_front(), Some(slabs.nodes[2]));
        assert_eq!(from.pop_front(), Some(slabs.nodes[0]));
        assert_eq!(from.pop_front(), None);
    }
}
