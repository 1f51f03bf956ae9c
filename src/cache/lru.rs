//! LRU List Module
//!
//! Doubly linked recency list stored in an arena and addressed by stable handles.

// == Node Handle ==
/// Stable handle to a node in the [`LruList`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

const HEAD: usize = 0;
const TAIL: usize = 1;

#[derive(Debug)]
struct Node {
    key: String,
    size: usize,
    prev: usize,
    next: usize,
}

// == LRU List ==
/// Tracks recency of evictable entries.
///
/// Slot 0 is the head sentinel and slot 1 the tail sentinel:
/// - After head = Most recently used
/// - Before tail = Least recently used
///
/// Freed slots are recycled, so a [`NodeId`] stays valid until it is removed.
#[derive(Debug)]
pub struct LruList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    len: usize,
}

impl Default for LruList {
    fn default() -> Self {
        Self::new()
    }
}

impl LruList {
    // == Constructor ==
    /// Creates an empty list holding only the two sentinels.
    pub fn new() -> Self {
        let head = Node {
            key: String::new(),
            size: 0,
            prev: HEAD,
            next: TAIL,
        };
        let tail = Node {
            key: String::new(),
            size: 0,
            prev: HEAD,
            next: TAIL,
        };
        Self {
            nodes: vec![head, tail],
            free: Vec::new(),
            len: 0,
        }
    }

    // == Push Front ==
    /// Inserts a new node as the most recently used and returns its handle.
    pub fn push_front(&mut self, key: &str, size: usize) -> NodeId {
        let node = Node {
            key: key.to_string(),
            size,
            prev: HEAD,
            next: HEAD,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.link_front(idx);
        self.len += 1;
        NodeId(idx)
    }

    // == Touch ==
    /// Floats a node to the head of the list.
    pub fn touch(&mut self, id: NodeId) {
        if !self.is_live(id) {
            return;
        }
        self.unlink(id.0);
        self.link_front(id.0);
    }

    // == Remove ==
    /// Unlinks a node and recycles its slot. Returns the stored size.
    pub fn remove(&mut self, id: NodeId) -> Option<usize> {
        if !self.is_live(id) {
            return None;
        }
        self.unlink(id.0);
        let node = &mut self.nodes[id.0];
        node.key.clear();
        node.prev = id.0;
        node.next = id.0;
        self.free.push(id.0);
        self.len -= 1;
        Some(node.size)
    }

    // == Oldest ==
    /// Returns the key of the least recently used node without removing it.
    pub fn oldest(&self) -> Option<&str> {
        let idx = self.nodes[TAIL].prev;
        if idx == HEAD {
            None
        } else {
            Some(self.nodes[idx].key.as_str())
        }
    }

    // == Keys ==
    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len);
        let mut idx = self.nodes[HEAD].next;
        while idx != TAIL {
            keys.push(self.nodes[idx].key.clone());
            idx = self.nodes[idx].next;
        }
        keys
    }

    // == Length ==
    /// Returns the number of linked nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn is_live(&self, id: NodeId) -> bool {
        id.0 > TAIL && id.0 < self.nodes.len() && self.nodes[id.0].next != id.0
    }

    fn link_front(&mut self, idx: usize) {
        let first = self.nodes[HEAD].next;
        self.nodes[idx].prev = HEAD;
        self.nodes[idx].next = first;
        self.nodes[first].prev = idx;
        self.nodes[HEAD].next = idx;
    }

    fn unlink(&mut self, idx: usize) {
        let prev = self.nodes[idx].prev;
        let next = self.nodes[idx].next;
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }
}
