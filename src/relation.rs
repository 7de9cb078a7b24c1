//! Directed ordering edges between operations.

use crate::node::OpHandle;

/// Handle of a [`Relation`] in the graph's relation list.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RelationHandle(pub(crate) u32);

impl RelationHandle {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A directed ordering edge: `from` must complete before `to` starts.
///
/// Relations marked cyclic stay in the graph for diagnostics but are
/// excluded from pending-count bookkeeping and never block scheduling.
#[derive(Debug)]
pub struct Relation {
    /// Prerequisite operation.
    pub from: OpHandle,
    /// Dependent operation.
    pub to: OpHandle,
    /// Human-readable description. Diagnostic only; never affects
    /// scheduling.
    pub description: String,
    /// Edge was identified as part of a cycle by the cycle breaker.
    pub cyclic: bool,
}

impl Relation {
    /// Creates a non-cyclic relation.
    pub fn new(from: OpHandle, to: OpHandle, description: impl Into<String>) -> Self {
        Self {
            from,
            to,
            description: description.into(),
            cyclic: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_relation_is_not_cyclic() {
        let rel = Relation::new(OpHandle(0), OpHandle(1), "Transform -> Geometry");
        assert!(!rel.cyclic);
        assert_eq!(rel.from, OpHandle(0));
        assert_eq!(rel.to, OpHandle(1));
        assert_eq!(rel.description, "Transform -> Geometry");
    }
}
