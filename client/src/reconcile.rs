use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use huddle_protocol::CounterUpdate;

/// Counter overlay for one entity. Screens lay this over the entity's last
/// REST-fetched snapshot; it is never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchRecord {
    /// Latest value per counter name (`likeCount`, `commentCount`, ...).
    pub counters: HashMap<String, i64>,
    /// Viewer-specific flags (`liked`, `reposted`, ...), touched only when
    /// the acting user is the local viewer.
    pub viewer_flags: HashMap<String, bool>,
    seq: Option<u64>,
}

#[derive(Default)]
struct PatchMap {
    entities: HashMap<String, PatchRecord>,
}

/// Merges server-authoritative counter patches into per-entity overlays.
///
/// Merge rule is last-arrival-wins per (entity, counter). When a patch
/// carries a sequence number, patches at or below the last seen sequence
/// for that entity are rejected; the wire does not promise a sequence, so
/// patches without one always apply.
#[derive(Clone)]
pub struct Reconciler {
    viewer_id: Arc<str>,
    patches: Arc<RwLock<PatchMap>>,
}

impl Reconciler {
    pub fn new(viewer_id: &str) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            patches: Arc::new(RwLock::new(PatchMap::default())),
        }
    }

    /// Apply one inbound patch. Returns false when it was rejected as
    /// stale.
    pub fn apply(&self, update: &CounterUpdate) -> bool {
        let Ok(mut map) = self.patches.write() else {
            return false;
        };
        let record = map.entities.entry(update.entity_id.clone()).or_default();

        if let (Some(incoming), Some(seen)) = (update.seq, record.seq)
            && incoming <= seen
        {
            tracing::debug!(
                entity = %update.entity_id,
                incoming,
                seen,
                "stale counter patch dropped"
            );
            return false;
        }
        if update.seq.is_some() {
            record.seq = update.seq;
        }

        record
            .counters
            .insert(update.update_type.counter_name().to_string(), update.count);

        // The viewer's own flag only moves when the viewer acted. Another
        // user liking the same entity changes the count, not the flag, so
        // an optimistic toggle survives everyone else's traffic.
        if let Some(flag) = update.update_type.viewer_flag_name()
            && update.actor_id.as_str() == &*self.viewer_id
            && let Some(state) = update.actor_state
        {
            record.viewer_flags.insert(flag.to_string(), state);
        }

        true
    }

    /// Current overlay for an entity, if any patch has arrived for it.
    pub fn patch_for(&self, entity_id: &str) -> Option<PatchRecord> {
        self.patches.read().ok()?.entities.get(entity_id).cloned()
    }

    /// Drop the overlay for one entity, e.g. when its screen unmounts.
    pub fn forget(&self, entity_id: &str) {
        if let Ok(mut map) = self.patches.write() {
            map.entities.remove(entity_id);
        }
    }

    /// Drop every overlay.
    pub fn clear(&self) {
        if let Ok(mut map) = self.patches.write() {
            map.entities.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use huddle_protocol::{CounterUpdate, EntityKind, UpdateType};

    use super::Reconciler;

    fn like_update(entity: &str, count: i64, actor: &str, liked: bool) -> CounterUpdate {
        CounterUpdate {
            entity_kind: EntityKind::Project,
            update_type: UpdateType::LikeUpdate,
            entity_id: entity.into(),
            count,
            actor_id: actor.into(),
            actor_state: Some(liked),
            seq: None,
        }
    }

    #[test]
    fn test_last_arrival_wins_in_both_orders() {
        let forward = Reconciler::new("viewer");
        forward.apply(&like_update("p1", 5, "u1", true));
        forward.apply(&like_update("p1", 4, "u2", false));
        assert_eq!(forward.patch_for("p1").unwrap().counters["likeCount"], 4);

        let reversed = Reconciler::new("viewer");
        reversed.apply(&like_update("p1", 4, "u2", false));
        reversed.apply(&like_update("p1", 5, "u1", true));
        assert_eq!(reversed.patch_for("p1").unwrap().counters["likeCount"], 5);
    }

    #[test]
    fn test_viewer_echo_is_idempotent() {
        let reconciler = Reconciler::new("viewer");

        // Optimistic like already showed liked=true, count=5 in the UI;
        // the echo of the viewer's own action must not flicker anything.
        reconciler.apply(&like_update("p1", 5, "viewer", true));
        let first = reconciler.patch_for("p1").unwrap();
        reconciler.apply(&like_update("p1", 5, "viewer", true));
        let second = reconciler.patch_for("p1").unwrap();

        assert_eq!(first, second);
        assert_eq!(second.viewer_flags["liked"], true);
        assert_eq!(second.counters["likeCount"], 5);
    }

    #[test]
    fn test_other_users_do_not_flip_viewer_flag() {
        let reconciler = Reconciler::new("viewer");

        reconciler.apply(&like_update("p1", 5, "viewer", true));
        reconciler.apply(&like_update("p1", 6, "someone-else", true));

        let patch = reconciler.patch_for("p1").unwrap();
        assert_eq!(patch.counters["likeCount"], 6);
        assert_eq!(patch.viewer_flags["liked"], true);
    }

    #[test]
    fn test_comment_updates_have_no_viewer_flag() {
        let reconciler = Reconciler::new("viewer");
        reconciler.apply(&CounterUpdate {
            entity_kind: EntityKind::GeneralPost,
            update_type: UpdateType::NewComment,
            entity_id: "post-1".into(),
            count: 3,
            actor_id: "viewer".into(),
            actor_state: None,
            seq: None,
        });

        let patch = reconciler.patch_for("post-1").unwrap();
        assert_eq!(patch.counters["commentCount"], 3);
        assert!(patch.viewer_flags.is_empty());
    }

    #[test]
    fn test_stale_sequence_rejected() {
        let reconciler = Reconciler::new("viewer");

        let mut newer = like_update("p1", 9, "u1", true);
        newer.seq = Some(7);
        let mut older = like_update("p1", 2, "u2", false);
        older.seq = Some(3);

        assert!(reconciler.apply(&newer));
        assert!(!reconciler.apply(&older));
        assert_eq!(reconciler.patch_for("p1").unwrap().counters["likeCount"], 9);
    }

    #[test]
    fn test_unsequenced_patch_applies_after_sequenced() {
        let reconciler = Reconciler::new("viewer");

        let mut sequenced = like_update("p1", 9, "u1", true);
        sequenced.seq = Some(7);
        reconciler.apply(&sequenced);
        reconciler.apply(&like_update("p1", 10, "u2", true));

        assert_eq!(reconciler.patch_for("p1").unwrap().counters["likeCount"], 10);
    }

    #[test]
    fn test_forget_drops_overlay() {
        let reconciler = Reconciler::new("viewer");
        reconciler.apply(&like_update("p1", 5, "u1", true));
        reconciler.forget("p1");

        assert_eq!(reconciler.patch_for("p1"), None);
    }
}
