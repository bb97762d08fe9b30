use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque identity of a source node. Every clone of a node, on any page,
/// carries the same ref, which is how rendered content is mapped back to the
/// source tree.
#[derive(Eq, PartialEq, Hash, Clone, Debug, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ref(Arc<str>);

impl Ref {
    pub fn new<S: AsRef<str>>(value: S) -> Ref {
        Ref(Arc::from(value.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Ref {
    fn from(value: &str) -> Self {
        Ref::new(value)
    }
}

/// Hands out fresh refs for one document. Refs already present in markup are
/// kept as-is, so the allocator only has to avoid reusing its own numbers.
#[derive(Debug, Clone)]
pub struct RefAllocator {
    prefix: &'static str,
    next_id: u64,
}

impl Default for RefAllocator {
    fn default() -> Self {
        RefAllocator::new()
    }
}

impl RefAllocator {
    pub fn new() -> RefAllocator {
        RefAllocator {
            prefix: "ref",
            next_id: 1,
        }
    }

    pub fn gen(&mut self) -> Ref {
        let id = self.next_id;
        self.next_id += 1;
        Ref::new(format!("{}-{}", self.prefix, id))
    }

    /// Make sure a ref read from markup is never generated again
    pub fn observe(&mut self, existing: &Ref) {
        let Some(number) = existing
            .as_str()
            .strip_prefix(self.prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|n| n.parse::<u64>().ok())
        else {
            return;
        };
        if number >= self.next_id {
            self.next_id = number + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_skips_observed_refs() {
        let mut refs = RefAllocator::new();
        assert_eq!(refs.gen().as_str(), "ref-1");
        refs.observe(&Ref::new("ref-10"));
        refs.observe(&Ref::new("custom"));
        assert_eq!(refs.gen().as_str(), "ref-11");
    }
}
