//! Immutable, persistent keyed context.
//!
//! A [`Context`] is a chain of nodes, each either binding a value to a typed
//! key or marking that key as removed. Reads walk the chain outward from the
//! newest node and stop at the first node for the key. Deriving a context
//! pushes one node and shares the rest, so sibling snapshots never observe
//! each other's bindings.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Current-context tracking and future adapters.
pub mod scope;

/// Chains longer than this are rebuilt with only their live bindings.
pub const MAX_CHAIN_DEPTH: usize = 64;

/// A typed slot in a [`Context`].
///
/// Each implementing type is one key; the key type is never instantiated.
pub trait ContextKey: 'static {
    /// Type of the value stored under this key.
    type Value: Clone + Send + Sync + 'static;

    /// Human-readable name used in `Debug` output and logs.
    const NAME: &'static str;
}

enum Slot {
    Bound(Arc<dyn Any + Send + Sync>),
    Removed,
}

struct Node {
    parent: Option<Arc<Node>>,
    key: TypeId,
    name: &'static str,
    slot: Slot,
    depth: usize,
}

/// An immutable keyed context.
///
/// Cloning is cheap and yields the same snapshot. Two contexts compare equal
/// only when they are the same snapshot.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Node>>,
}

impl Context {
    /// The context with no bindings.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Value bound to `K`, if any.
    pub fn get<K: ContextKey>(&self) -> Option<&K::Value> {
        match self.lookup(TypeId::of::<K>())? {
            Slot::Bound(value) => value.downcast_ref::<K::Value>(),
            Slot::Removed => None,
        }
    }

    /// Whether `K` is bound.
    pub fn contains<K: ContextKey>(&self) -> bool {
        self.get::<K>().is_some()
    }

    /// A new context with `value` bound to `K`, replacing any previous binding.
    #[must_use]
    pub fn with<K: ContextKey>(&self, value: K::Value) -> Self {
        self.push(TypeId::of::<K>(), K::NAME, Slot::Bound(Arc::new(value)))
    }

    /// A new context without a binding for `K`.
    ///
    /// When `K` is not bound the same snapshot is returned.
    #[must_use]
    pub fn without<K: ContextKey>(&self) -> Self {
        if !self.contains::<K>() {
            return self.clone();
        }
        self.push(TypeId::of::<K>(), K::NAME, Slot::Removed)
    }

    /// Remove the binding for `K` and hand back its value.
    #[must_use]
    pub fn take<K: ContextKey>(&self) -> (Self, Option<K::Value>) {
        match self.get::<K>().cloned() {
            Some(value) => (self.without::<K>(), Some(value)),
            None => (self.clone(), None),
        }
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.live_nodes().len()
    }

    /// Whether no key is bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the bound keys, newest first.
    pub fn keys(&self) -> Vec<&'static str> {
        self.live_nodes().iter().map(|node| node.name).collect()
    }

    /// Number of nodes in the chain, including shadowed ones.
    pub fn depth(&self) -> usize {
        self.head.as_ref().map_or(0, |node| node.depth)
    }

    fn lookup(&self, key: TypeId) -> Option<&Slot> {
        let mut cursor = self.head.as_deref();
        while let Some(node) = cursor {
            if node.key == key {
                return Some(&node.slot);
            }
            cursor = node.parent.as_deref();
        }
        None
    }

    /// Newest node of every live binding, newest first.
    fn live_nodes(&self) -> Vec<&Node> {
        let mut seen: Vec<TypeId> = Vec::new();
        let mut live = Vec::new();
        let mut cursor = self.head.as_deref();
        while let Some(node) = cursor {
            if !seen.contains(&node.key) {
                seen.push(node.key);
                if let Slot::Bound(_) = node.slot {
                    live.push(node);
                }
            }
            cursor = node.parent.as_deref();
        }
        live
    }

    fn push(&self, key: TypeId, name: &'static str, slot: Slot) -> Self {
        let parent = if self.depth() >= MAX_CHAIN_DEPTH {
            self.compacted().head
        } else {
            self.head.clone()
        };
        let depth = parent.as_ref().map_or(0, |node| node.depth) + 1;
        Self {
            head: Some(Arc::new(Node {
                parent,
                key,
                name,
                slot,
                depth,
            })),
        }
    }

    /// Same bindings on a chain with no shadowed nodes or removal markers.
    fn compacted(&self) -> Self {
        let mut head: Option<Arc<Node>> = None;
        // Rebuild oldest first so the newest binding stays at the front.
        for node in self.live_nodes().into_iter().rev() {
            let Slot::Bound(value) = &node.slot else {
                continue;
            };
            let depth = head.as_ref().map_or(0, |n| n.depth) + 1;
            head = Some(Arc::new(Node {
                parent: head,
                key: node.key,
                name: node.name,
                slot: Slot::Bound(Arc::clone(value)),
                depth,
            }));
        }
        Self { head }
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        match (&self.head, &other.head) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.keys())
            .field("depth", &self.depth())
            .finish()
    }
}
