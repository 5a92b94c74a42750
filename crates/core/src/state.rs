//! Ledger state tree.
//!
//! State is an ordered tree of byte values addressed by path. The voting
//! program keeps its singleton record under `global/` and one subtree per
//! registered account under `local/<address>/`. There is no delete
//! operation: committed records are never removed.

use crate::{Error, Hash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A path is a list of string segments.
pub type Path = Vec<String>;

/// A value is raw bytes.
pub type Value = Vec<u8>;

/// A node in the state tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum Node {
    /// A leaf value.
    Value(Value),
    /// A subtree.
    Tree(BTreeMap<String, Node>),
}

/// The state tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    root: BTreeMap<String, Node>,
}

impl State {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value at a path.
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        if path.is_empty() {
            return None;
        }

        let mut current: &BTreeMap<String, Node> = &self.root;

        for (i, segment) in path.iter().enumerate() {
            match current.get(*segment) {
                Some(Node::Value(v)) if i == path.len() - 1 => return Some(v),
                Some(Node::Tree(subtree)) => current = subtree,
                _ => return None,
            }
        }

        None
    }

    /// Get a value at a path (owned path version).
    pub fn get_path(&self, path: &Path) -> Option<&Value> {
        let refs: Vec<&str> = path.iter().map(|s| s.as_str()).collect();
        self.get(&refs)
    }

    /// Set a value at a path. Creates intermediate trees as needed; a leaf
    /// sitting where a subtree is needed is replaced.
    pub fn set(&mut self, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };

        let mut current = &mut self.root;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Node::Tree(BTreeMap::new()));
            if let Node::Value(_) = entry {
                *entry = Node::Tree(BTreeMap::new());
            }
            current = match entry {
                Node::Tree(subtree) => subtree,
                Node::Value(_) => unreachable!("leaf replaced by a tree above"),
            };
        }

        current.insert(last.to_string(), Node::Value(value));
    }

    /// Set a value at a path (owned path version).
    pub fn set_path(&mut self, path: &Path, value: Value) {
        let refs: Vec<&str> = path.iter().map(|s| s.as_str()).collect();
        self.set(&refs, value);
    }

    /// Names of the direct children under a prefix (subtrees and leaves).
    pub fn children(&self, prefix: &[&str]) -> Vec<&str> {
        let mut current = &self.root;
        for segment in prefix {
            match current.get(*segment) {
                Some(Node::Tree(subtree)) => current = subtree,
                _ => return Vec::new(),
            }
        }
        current.keys().map(|k| k.as_str()).collect()
    }

    /// Content hash of the entire state. Insertion order does not matter.
    pub fn hash(&self) -> Result<Hash, Error> {
        Hash::of_value(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

/// Read access to ledger state by path.
pub trait Store {
    fn get_path(&self, path: &Path) -> Option<&Value>;
}

impl Store for State {
    fn get_path(&self, path: &Path) -> Option<&Value> {
        State::get_path(self, path)
    }
}

/// Pending writes layered over a base store. Reads see the writes first, so a
/// commit can be checked without copying the base.
pub struct Overlay<'a, S: Store + ?Sized> {
    base: &'a S,
    writes: BTreeMap<&'a Path, &'a Value>,
}

impl<'a, S: Store + ?Sized> Overlay<'a, S> {
    /// Later writes to the same path win, matching the order they are applied.
    pub fn new(base: &'a S, writes: impl IntoIterator<Item = (&'a Path, &'a Value)>) -> Self {
        Self {
            base,
            writes: writes.into_iter().collect(),
        }
    }
}

impl<S: Store + ?Sized> Store for Overlay<'_, S> {
    fn get_path(&self, path: &Path) -> Option<&Value> {
        match self.writes.get(path) {
            Some(value) => Some(*value),
            None => self.base.get_path(path),
        }
    }
}
