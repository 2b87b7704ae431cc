//! The read seam between stores and the resolver.

use crate::entity::EntityRecord;

/// Read access to stored entities and links.
///
/// Implementations must answer every call from one consistent state; the
/// resolver calls these methods many times per request and assumes they all
/// observe the same snapshot.
pub trait RelationSource {
    /// A stored record, or `None` if absent (never stored or deleted).
    fn record(&self, entity_type: &str, id: i64) -> Option<&EntityRecord>;

    /// All ids of a type in ascending order.
    fn ids(&self, entity_type: &str) -> Vec<i64>;

    /// Join records `(dominant_id, other_id)` of a many-to-many relation,
    /// keyed by the dominant side, in insertion order.
    fn join_records(&self, owner_type: &str, attribute: &str) -> &[(i64, i64)];
}
