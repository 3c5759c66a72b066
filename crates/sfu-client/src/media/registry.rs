//! Consumer registry: remote participants keyed by their audio id.
//!
//! The registry is the session's shared mutable state. Entries are only
//! ever replaced whole, under a write lock held for the single map update,
//! and every replacement is announced on a broadcast channel. Readers get
//! plain-data snapshots; no reference into the map escapes.

use super::consumer::Consumer;
use super::transport::Transport;
use crate::engine::MediaStream;
use crate::observability::metrics;
use common::types::MediaId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Capacity of the registry event broadcast.
const EVENT_CAPACITY: usize = 256;

/// One remote participant's negotiated media.
pub struct ConsumerEntry {
    combined_stream: MediaStream,
    display_name: String,
    transport: Arc<Transport>,
    audio_consumer: Option<Consumer>,
    video_consumer: Option<Consumer>,
    sequence: u64,
}

impl ConsumerEntry {
    /// Assemble an entry from whichever consumers succeeded.
    ///
    /// Returns `None` when neither consumer exists; such a participant is
    /// never published.
    #[must_use]
    pub fn new(
        display_name: String,
        transport: Arc<Transport>,
        audio_consumer: Option<Consumer>,
        video_consumer: Option<Consumer>,
    ) -> Option<Self> {
        if audio_consumer.is_none() && video_consumer.is_none() {
            return None;
        }

        let tracks = [audio_consumer.as_ref(), video_consumer.as_ref()]
            .into_iter()
            .flatten()
            .map(|c| c.track().clone())
            .collect();

        Some(Self {
            combined_stream: MediaStream::combined(tracks),
            display_name,
            transport,
            audio_consumer,
            video_consumer,
            sequence: 0,
        })
    }

    #[must_use]
    pub fn combined_stream(&self) -> &MediaStream {
        &self.combined_stream
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    #[must_use]
    pub fn audio_consumer(&self) -> Option<&Consumer> {
        self.audio_consumer.as_ref()
    }

    #[must_use]
    pub fn video_consumer(&self) -> Option<&Consumer> {
        self.video_consumer.as_ref()
    }

    /// Publication order; later upserts get larger values.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Close both consumers and the transport.
    pub fn close(&self) {
        for consumer in [self.audio_consumer.as_ref(), self.video_consumer.as_ref()]
            .into_iter()
            .flatten()
        {
            consumer.close();
        }
        self.transport.close();
    }

    fn summary(&self, key: &MediaId) -> EntrySummary {
        EntrySummary {
            key: key.clone(),
            sequence: self.sequence,
            display_name: self.display_name.clone(),
            stream: self.combined_stream.clone(),
        }
    }
}

impl std::fmt::Debug for ConsumerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerEntry")
            .field("stream_id", &self.combined_stream.id())
            .field("transport", &self.transport)
            .field("audio_consumer", &self.audio_consumer)
            .field("video_consumer", &self.video_consumer)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// Plain-data view of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub key: MediaId,
    pub sequence: u64,
    pub display_name: String,
    pub stream: MediaStream,
}

/// Plain-data view of the whole registry at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    entries: HashMap<MediaId, EntrySummary>,
}

impl RegistrySnapshot {
    #[must_use]
    pub fn get(&self, key: &MediaId) -> Option<&EntrySummary> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in publication order.
    #[must_use]
    pub fn in_publication_order(&self) -> Vec<&EntrySummary> {
        let mut entries: Vec<&EntrySummary> = self.entries.values().collect();
        entries.sort_by_key(|e| e.sequence);
        entries
    }
}

impl FromIterator<EntrySummary> for RegistrySnapshot {
    fn from_iter<I: IntoIterator<Item = EntrySummary>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|e| (e.key.clone(), e)).collect(),
        }
    }
}

/// Registry change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// An entry was published at `key`. `replaced` is set when it
    /// overwrote an earlier entry.
    Upserted { key: MediaId, replaced: bool },
    /// The entry at `key` was removed.
    Removed { key: MediaId },
}

/// Concurrency-safe map of remote participants.
pub struct ConsumerRegistry {
    entries: RwLock<HashMap<MediaId, Arc<ConsumerEntry>>>,
    in_flight: Mutex<HashSet<MediaId>>,
    next_sequence: AtomicU64,
    events: broadcast::Sender<RegistryEvent>,
}

impl ConsumerRegistry {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            next_sequence: AtomicU64::new(1),
            events,
        }
    }

    /// Subscribe to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Publish `entry` at `key`, replacing any previous entry.
    ///
    /// Returns the replaced entry; the caller owns closing it.
    pub async fn upsert(&self, key: MediaId, mut entry: ConsumerEntry) -> Option<Arc<ConsumerEntry>> {
        // Publication order is insertion order: sequence and event are
        // issued under the write lock.
        let (previous, count) = {
            let mut entries = self.entries.write().await;
            entry.sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
            let previous = entries.insert(key.clone(), Arc::new(entry));

            // No subscribers is fine
            let _ = self.events.send(RegistryEvent::Upserted {
                key: key.clone(),
                replaced: previous.is_some(),
            });
            (previous, entries.len())
        };

        metrics::set_registry_entries(count);
        debug!(
            target: "sfu.consumer",
            audio_id = %key,
            replaced = previous.is_some(),
            entries = count,
            "Registry entry published"
        );

        previous
    }

    /// Remove the entry at `key`. The caller owns closing it.
    pub async fn remove(&self, key: &MediaId) -> Option<Arc<ConsumerEntry>> {
        let (removed, count) = {
            let mut entries = self.entries.write().await;
            let removed = entries.remove(key);
            (removed, entries.len())
        };

        if removed.is_some() {
            metrics::set_registry_entries(count);
            let _ = self.events.send(RegistryEvent::Removed { key: key.clone() });
        }
        removed
    }

    pub async fn get(&self, key: &MediaId) -> Option<Arc<ConsumerEntry>> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &MediaId) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Plain-data snapshot for projection.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.entries
            .read()
            .await
            .iter()
            .map(|(key, entry)| entry.summary(key))
            .collect()
    }

    /// Remove and close every entry.
    pub async fn close_all(&self) {
        let drained: Vec<(MediaId, Arc<ConsumerEntry>)> =
            self.entries.write().await.drain().collect();

        metrics::set_registry_entries(0);
        for (key, entry) in drained {
            entry.close();
            let _ = self.events.send(RegistryEvent::Removed { key });
        }
    }

    /// Mark `key` as being negotiated.
    ///
    /// Returns `None` if a negotiation for `key` is already in flight. The
    /// claim is released when the returned guard drops.
    pub fn try_claim(self: &Arc<Self>, key: &MediaId) -> Option<NegotiationClaim> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());

        inserted.then(|| NegotiationClaim {
            registry: Arc::clone(self),
            key: key.clone(),
        })
    }

    /// Whether a negotiation for `key` is in flight.
    #[must_use]
    pub fn is_in_flight(&self, key: &MediaId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

impl Default for ConsumerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// In-flight marker for one audio id; released on drop.
pub struct NegotiationClaim {
    registry: Arc<ConsumerRegistry>,
    key: MediaId,
}

impl NegotiationClaim {
    #[must_use]
    pub fn key(&self) -> &MediaId {
        &self.key
    }
}

impl Drop for NegotiationClaim {
    fn drop(&mut self) {
        self.registry
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::test_support::{consumer, receive_transport};
    use common::types::MediaKind;

    #[tokio::test]
    async fn test_entry_requires_a_consumer() {
        let transport = receive_transport("a1");
        assert!(ConsumerEntry::new("Alice".to_string(), transport, None, None).is_none());
    }

    #[tokio::test]
    async fn test_entry_combines_tracks() {
        let transport = receive_transport("a1");
        let both = ConsumerEntry::new(
            "Alice".to_string(),
            Arc::clone(&transport),
            Some(consumer(&transport, "a1", MediaKind::Audio).await),
            Some(consumer(&transport, "v1", MediaKind::Video).await),
        )
        .unwrap();
        assert_eq!(both.combined_stream().track_count(), 2);

        let video_only = ConsumerEntry::new(
            "Alice".to_string(),
            Arc::clone(&transport),
            None,
            Some(consumer(&transport, "v1", MediaKind::Video).await),
        )
        .unwrap();
        assert_eq!(video_only.combined_stream().track_count(), 1);
        assert!(video_only.combined_stream().has_kind(MediaKind::Video));
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_notifies() {
        let registry = ConsumerRegistry::new();
        let mut events = registry.subscribe();
        let key = MediaId::new("a1");

        let t1 = receive_transport("a1");
        let first = ConsumerEntry::new(
            "Alice".to_string(),
            Arc::clone(&t1),
            Some(consumer(&t1, "a1", MediaKind::Audio).await),
            None,
        )
        .unwrap();
        assert!(registry.upsert(key.clone(), first).await.is_none());

        let t2 = receive_transport("a1");
        let second = ConsumerEntry::new(
            "Alice B".to_string(),
            Arc::clone(&t2),
            Some(consumer(&t2, "a1", MediaKind::Audio).await),
            None,
        )
        .unwrap();
        let previous = registry.upsert(key.clone(), second).await.unwrap();
        assert_eq!(previous.display_name(), "Alice");

        assert_eq!(registry.len().await, 1);
        let current = registry.get(&key).await.unwrap();
        assert_eq!(current.display_name(), "Alice B");
        assert!(current.sequence() > previous.sequence());

        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::Upserted {
                key: key.clone(),
                replaced: false
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::Upserted {
                key,
                replaced: true
            }
        );
    }

    #[tokio::test]
    async fn test_snapshot_orders_by_publication() {
        let registry = ConsumerRegistry::new();
        for (audio, name) in [("a3", "Carol"), ("a1", "Alice"), ("a2", "Bob")] {
            let t = receive_transport(audio);
            let entry = ConsumerEntry::new(
                name.to_string(),
                Arc::clone(&t),
                Some(consumer(&t, audio, MediaKind::Audio).await),
                None,
            )
            .unwrap();
            registry.upsert(MediaId::new(audio), entry).await;
        }

        let snapshot = registry.snapshot().await;
        let order: Vec<&str> = snapshot
            .in_publication_order()
            .iter()
            .map(|e| e.display_name.as_str())
            .collect();
        assert_eq!(order, vec!["Carol", "Alice", "Bob"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_keep_latest_sequence() {
        let registry = Arc::new(ConsumerRegistry::new());
        let mut events = registry.subscribe();
        let key = MediaId::new("a1");

        let mut entries = Vec::new();
        for i in 0..32 {
            let t = receive_transport("a1");
            let entry = ConsumerEntry::new(
                format!("Alice {i}"),
                Arc::clone(&t),
                Some(consumer(&t, "a1", MediaKind::Audio).await),
                None,
            )
            .unwrap();
            entries.push(entry);
        }

        let mut tasks = tokio::task::JoinSet::new();
        for entry in entries {
            let registry = Arc::clone(&registry);
            let key = key.clone();
            tasks.spawn(async move { registry.upsert(key, entry).await });
        }

        let mut replaced_sequences = Vec::new();
        while let Some(previous) = tasks.join_next().await {
            if let Some(previous) = previous.unwrap() {
                replaced_sequences.push(previous.sequence());
            }
        }

        // The stored entry is the last one written, so it holds the largest
        // sequence and every replaced entry holds a smaller one.
        let current = registry.get(&key).await.unwrap();
        assert_eq!(current.sequence(), 32);
        assert_eq!(replaced_sequences.len(), 31);
        assert!(replaced_sequences.iter().all(|s| *s < current.sequence()));

        // Only the first upsert found the key empty
        let mut fresh = 0;
        for _ in 0..32 {
            if let RegistryEvent::Upserted { replaced: false, .. } = events.recv().await.unwrap() {
                fresh += 1;
            }
        }
        assert_eq!(fresh, 1);
    }

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let registry = Arc::new(ConsumerRegistry::new());
        let key = MediaId::new("a1");

        let claim = registry.try_claim(&key).unwrap();
        assert!(registry.is_in_flight(&key));
        assert!(registry.try_claim(&key).is_none());

        drop(claim);
        assert!(!registry.is_in_flight(&key));
        assert!(registry.try_claim(&key).is_some());
    }

    #[tokio::test]
    async fn test_close_all_closes_transports() {
        let registry = ConsumerRegistry::new();
        let t = receive_transport("a1");
        let entry = ConsumerEntry::new(
            "Alice".to_string(),
            Arc::clone(&t),
            Some(consumer(&t, "a1", MediaKind::Audio).await),
            None,
        )
        .unwrap();
        registry.upsert(MediaId::new("a1"), entry).await;

        registry.close_all().await;

        assert!(registry.is_empty().await);
        assert_eq!(t.state(), crate::media::TransportState::Closed);
    }
}
