use huddle_protocol::ClientEvent;

/// What a subscription refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Room,
    Project,
    Challenge,
}

/// Insertion-ordered set of declared interests.
///
/// The full set is replayed, in insertion order, every time the connection
/// transitions into Connected; the server treats duplicate joins as
/// idempotent, so no dedup window is kept here.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Vec<(SubscriptionKind, String)>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record interest. Returns the join event to emit now, or None if the
    /// entry was already present.
    pub fn subscribe(&mut self, kind: SubscriptionKind, id: &str) -> Option<ClientEvent> {
        if self.contains(kind, id) {
            return None;
        }
        self.entries.push((kind, id.to_string()));
        Some(join_event(kind, id))
    }

    /// Drop interest. Returns the leave event to emit now, or None if the
    /// entry was not present.
    pub fn unsubscribe(&mut self, kind: SubscriptionKind, id: &str) -> Option<ClientEvent> {
        let pos = self
            .entries
            .iter()
            .position(|(k, entry)| *k == kind && entry == id)?;
        self.entries.remove(pos);
        Some(leave_event(kind, id))
    }

    /// Join events for every entry, in insertion order.
    pub fn replay(&self) -> Vec<ClientEvent> {
        self.entries
            .iter()
            .map(|(kind, id)| join_event(*kind, id))
            .collect()
    }

    pub fn contains(&self, kind: SubscriptionKind, id: &str) -> bool {
        self.entries.iter().any(|(k, entry)| *k == kind && entry == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn join_event(kind: SubscriptionKind, id: &str) -> ClientEvent {
    match kind {
        SubscriptionKind::Room => ClientEvent::JoinSquad(id.to_string()),
        SubscriptionKind::Project => ClientEvent::SubscribeProject(id.to_string()),
        SubscriptionKind::Challenge => ClientEvent::SubscribeChallenge(id.to_string()),
    }
}

fn leave_event(kind: SubscriptionKind, id: &str) -> ClientEvent {
    match kind {
        SubscriptionKind::Room => ClientEvent::LeaveSquad(id.to_string()),
        SubscriptionKind::Project => ClientEvent::UnsubscribeProject(id.to_string()),
        SubscriptionKind::Challenge => ClientEvent::UnsubscribeChallenge(id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use huddle_protocol::ClientEvent;

    use super::{SubscriptionKind, SubscriptionRegistry};

    #[test]
    fn test_subscribe_is_idempotent() {
        let mut registry = SubscriptionRegistry::new();

        assert!(registry.subscribe(SubscriptionKind::Room, "r1").is_some());
        assert!(registry.subscribe(SubscriptionKind::Room, "r1").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_id_different_kind_is_distinct() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(SubscriptionKind::Project, "42");
        registry.subscribe(SubscriptionKind::Challenge, "42");

        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unsubscribe_missing_entry() {
        let mut registry = SubscriptionRegistry::new();

        assert!(registry.unsubscribe(SubscriptionKind::Room, "r1").is_none());
    }

    #[test]
    fn test_replay_preserves_insertion_order() {
        let mut registry = SubscriptionRegistry::new();

        registry.subscribe(SubscriptionKind::Room, "squad-1");
        registry.subscribe(SubscriptionKind::Project, "p1");
        registry.subscribe(SubscriptionKind::Room, "squad-2");
        registry.unsubscribe(SubscriptionKind::Project, "p1");
        registry.subscribe(SubscriptionKind::Challenge, "ch1");

        assert_eq!(
            registry.replay(),
            vec![
                ClientEvent::JoinSquad("squad-1".into()),
                ClientEvent::JoinSquad("squad-2".into()),
                ClientEvent::SubscribeChallenge("ch1".into()),
            ]
        );
    }
}
