//! Participant view projection.
//!
//! The view is a pure function of a registry snapshot, the latest
//! active-speaker list, the local audio id and the slot count. It is
//! re-derived from scratch on every change; nothing is patched in place.

use crate::engine::MediaStream;
use crate::media::RegistrySnapshot;
use common::types::MediaId;
use std::collections::{BTreeMap, HashSet};

/// Coarse state of the participant view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    /// No session yet.
    NotJoined,
    /// Joined, nobody to show.
    WaitingForParticipants,
    /// At least one slot is filled.
    Active,
}

/// One rendered remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFeed {
    pub audio_id: MediaId,
    pub stream: MediaStream,
    pub display_name: String,
}

/// What the view layer renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantView {
    pub phase: ViewPhase,
    /// Slot index to feed. Slot 0 is the main speaker.
    pub slots: BTreeMap<usize, RemoteFeed>,
    /// Set while the signaling channel is down.
    pub degraded: bool,
}

impl ParticipantView {
    #[must_use]
    pub fn not_joined() -> Self {
        Self {
            phase: ViewPhase::NotJoined,
            slots: BTreeMap::new(),
            degraded: false,
        }
    }

    /// Slot 0.
    #[must_use]
    pub fn main_speaker(&self) -> Option<&RemoteFeed> {
        self.slots.get(&0)
    }

    /// Slots after the main speaker, in order.
    pub fn thumbnails(&self) -> impl Iterator<Item = &RemoteFeed> {
        self.slots.range(1..).map(|(_, feed)| feed)
    }

    /// Audio ids in slot order.
    #[must_use]
    pub fn audio_ids(&self) -> Vec<&MediaId> {
        self.slots.values().map(|feed| &feed.audio_id).collect()
    }
}

impl Default for ParticipantView {
    fn default() -> Self {
        Self::not_joined()
    }
}

/// Map speakers onto render slots.
///
/// With an active-speaker list, slots follow its order: the local audio id
/// and ids missing from the registry are skipped, duplicates keep their
/// first position. Without one, the registry's publication order is used.
/// Speakers beyond `slot_count` are dropped.
#[must_use]
pub fn project_slots(
    snapshot: &RegistrySnapshot,
    active_speakers: Option<&[MediaId]>,
    local_audio_id: Option<&MediaId>,
    slot_count: usize,
) -> BTreeMap<usize, RemoteFeed> {
    let ordered: Vec<&MediaId> = match active_speakers {
        Some(speakers) => {
            let mut seen = HashSet::new();
            speakers.iter().filter(|id| seen.insert(*id)).collect()
        }
        None => snapshot
            .in_publication_order()
            .into_iter()
            .map(|entry| &entry.key)
            .collect(),
    };

    ordered
        .into_iter()
        .filter(|id| Some(*id) != local_audio_id)
        .filter_map(|id| snapshot.get(id))
        .take(slot_count)
        .enumerate()
        .map(|(slot, entry)| {
            (
                slot,
                RemoteFeed {
                    audio_id: entry.key.clone(),
                    stream: entry.stream.clone(),
                    display_name: entry.display_name.clone(),
                },
            )
        })
        .collect()
}

/// Build the full view for a joined session.
#[must_use]
pub fn project_view(
    snapshot: &RegistrySnapshot,
    active_speakers: Option<&[MediaId]>,
    local_audio_id: Option<&MediaId>,
    slot_count: usize,
    degraded: bool,
) -> ParticipantView {
    let slots = project_slots(snapshot, active_speakers, local_audio_id, slot_count);
    let phase = if slots.is_empty() {
        ViewPhase::WaitingForParticipants
    } else {
        ViewPhase::Active
    };

    ParticipantView {
        phase,
        slots,
        degraded,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::engine::MediaTrack;
    use crate::media::EntrySummary;
    use common::types::MediaKind;

    fn summary(audio: &str, name: &str, sequence: u64) -> EntrySummary {
        EntrySummary {
            key: MediaId::new(audio),
            sequence,
            display_name: name.to_string(),
            stream: MediaStream::new(
                format!("stream-{audio}"),
                vec![MediaTrack::new(format!("t-{audio}"), MediaKind::Audio)],
            ),
        }
    }

    fn snapshot() -> RegistrySnapshot {
        [
            summary("a1", "Alice", 1),
            summary("a2", "Bob", 2),
            summary("a3", "Carol", 3),
        ]
        .into_iter()
        .collect()
    }

    fn ids(list: &[&str]) -> Vec<MediaId> {
        list.iter().map(|s| MediaId::new(*s)).collect()
    }

    fn slot_ids(slots: &BTreeMap<usize, RemoteFeed>) -> Vec<&str> {
        slots.values().map(|f| f.audio_id.as_str()).collect()
    }

    #[test]
    fn test_active_speakers_drive_slot_order() {
        let speakers = ids(&["a3", "a1"]);
        let slots = project_slots(&snapshot(), Some(&speakers), None, 5);

        assert_eq!(slot_ids(&slots), vec!["a3", "a1"]);
        assert_eq!(slots.get(&0).unwrap().display_name, "Carol");
    }

    #[test]
    fn test_unknown_speakers_skipped() {
        let speakers = ids(&["a9", "a2"]);
        let slots = project_slots(&snapshot(), Some(&speakers), None, 5);

        assert_eq!(slot_ids(&slots), vec!["a2"]);
        assert!(slots.contains_key(&0), "slots are dense after skipping");
    }

    #[test]
    fn test_local_audio_excluded_in_any_position() {
        let local = MediaId::new("a2");
        for order in [["a2", "a1", "a3"], ["a1", "a2", "a3"], ["a1", "a3", "a2"]] {
            let speakers = ids(&order);
            let slots = project_slots(&snapshot(), Some(&speakers), Some(&local), 5);
            assert!(!slot_ids(&slots).contains(&"a2"), "order {order:?}");
            assert_eq!(slots.len(), 2);
        }

        let slots = project_slots(&snapshot(), None, Some(&local), 5);
        assert_eq!(slot_ids(&slots), vec!["a1", "a3"]);
    }

    #[test]
    fn test_speaker_update_drops_slot_without_touching_registry() {
        let registry = snapshot();

        let first = project_slots(&registry, Some(&ids(&["a1", "a2"])), None, 5);
        assert_eq!(slot_ids(&first), vec!["a1", "a2"]);

        let second = project_slots(&registry, Some(&ids(&["a2"])), None, 5);
        assert_eq!(slot_ids(&second), vec!["a2"]);

        assert!(registry.get(&MediaId::new("a1")).is_some());
    }

    #[test]
    fn test_publication_order_before_first_speaker_update() {
        let slots = project_slots(&snapshot(), None, None, 5);
        assert_eq!(slot_ids(&slots), vec!["a1", "a2", "a3"]);
    }

    #[test]
    fn test_extra_speakers_dropped() {
        let slots = project_slots(&snapshot(), Some(&ids(&["a1", "a2", "a3"])), None, 2);
        assert_eq!(slot_ids(&slots), vec!["a1", "a2"]);
    }

    #[test]
    fn test_duplicate_speakers_keep_first_position() {
        let slots = project_slots(&snapshot(), Some(&ids(&["a2", "a1", "a2"])), None, 5);
        assert_eq!(slot_ids(&slots), vec!["a2", "a1"]);
    }

    #[test]
    fn test_empty_registry_waits_for_participants() {
        let view = project_view(&RegistrySnapshot::default(), None, None, 5, false);
        assert_eq!(view.phase, ViewPhase::WaitingForParticipants);
        assert!(view.main_speaker().is_none());

        let speakers = ids(&["a1"]);
        let view = project_view(&RegistrySnapshot::default(), Some(&speakers), None, 5, true);
        assert_eq!(view.phase, ViewPhase::WaitingForParticipants);
        assert!(view.degraded);
    }

    #[test]
    fn test_view_main_and_thumbnails() {
        let view = project_view(&snapshot(), None, None, 5, false);
        assert_eq!(view.phase, ViewPhase::Active);
        assert_eq!(view.main_speaker().unwrap().display_name, "Alice");

        let thumbs: Vec<&str> = view.thumbnails().map(|f| f.display_name.as_str()).collect();
        assert_eq!(thumbs, vec!["Bob", "Carol"]);
    }

    #[test]
    fn test_projection_is_deterministic() {
        let speakers = ids(&["a3", "a2", "a1"]);
        let a = project_view(&snapshot(), Some(&speakers), None, 5, false);
        let b = project_view(&snapshot(), Some(&speakers), None, 5, false);
        assert_eq!(a, b);
    }
}
