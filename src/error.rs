//! Error types for the graph APIs.

use thiserror::Error;

use crate::entity::EntityId;
use crate::node::ComponentKind;

/// Errors returned by the tag/query APIs.
///
/// Build-time data problems are deliberately *not* errors: the builder
/// records [`BuildDiagnostic`](crate::builder::BuildDiagnostic)s and
/// keeps going.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The entity is not known to this graph.
    #[error("entity {0} is not part of this graph")]
    UnknownEntity(EntityId),

    /// The entity exists but has no component of the requested kind.
    #[error("entity {entity} has no {kind} component")]
    UnknownComponent {
        /// Entity that was queried.
        entity: EntityId,
        /// Component kind that was requested.
        kind: ComponentKind,
    },
}
