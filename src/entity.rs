//! Entity module
//!
//! Contract an event-sourced entity exposes to the event store.

/// An entity whose state is derived from its event history.
///
/// The store only reads from the entity. Rebuilding state from fetched events
/// and clearing staged events after a successful save are the entity's job.
pub trait EventSourcedEntity {
    /// The type of events this entity produces
    type Event;

    /// Opaque identifier grouping all events of this entity
    fn identifier(&self) -> &str;

    /// Version the entity last synchronized with the store
    /// (number of persisted events it has applied, 0 when new)
    fn version(&self) -> i64;

    /// Events produced since `version`, in the order they happened
    fn staged_events(&self) -> &[Self::Event];

    /// Version the entity will be at once its staged events are persisted
    fn pending_version(&self) -> i64 {
        self.version() + self.staged_events().len() as i64
    }
}
