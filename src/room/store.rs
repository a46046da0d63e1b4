//! Room replication: the store contract and an in-memory implementation.
//!
//! A [`RoomStore`] is a keyed document store with change notifications. The
//! exchange logic only needs a snapshot read, a partial merge write (plain or
//! conditional on the current version), and a subscription that is told about
//! every new version of a room in revision order.

use crate::error::{Error, Result};
use crate::room::document::{RoomDocument, RoomPatch};
use log::{debug, trace};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked with each validated version of a room.
pub type ChangeListener = Arc<dyn Fn(&RoomDocument) + Send + Sync>;

/// Handle returned by [`RoomStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Alphabet used for generated room ids.
const ROOM_ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Attempts at drawing an unused room id before giving up.
const MAX_ID_ATTEMPTS: usize = 16;

/// Configuration for room creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomConfig {
    /// Number of characters in a generated room id.
    pub id_length: usize,
    /// Optional RNG seed for reproducible room ids.
    pub seed: Option<u64>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        RoomConfig {
            id_length: 6,
            seed: None,
        }
    }
}

/// Shared mutable room state with change subscription.
///
/// Writes are merged field by field with last-writer-wins semantics. Each
/// write is atomic, but the store does not order concurrent conflicting
/// writes; callers that need a check-then-write use [`update`](Self::update).
pub trait RoomStore: Send + Sync {
    /// Latest stored version of a room, `None` if the room does not exist.
    fn snapshot(&self, room_id: &str) -> Result<Option<RoomDocument>>;

    /// Store a new room. Fails if the id is taken.
    fn insert(&self, document: RoomDocument) -> Result<()>;

    /// Read the room and write the patch `apply` derives from it, with no other
    /// write in between. `Ok(None)` from `apply` leaves the room untouched, and
    /// an error from `apply` is returned as is.
    fn update(
        &self,
        room_id: &str,
        apply: &dyn Fn(&RoomDocument) -> Result<Option<RoomPatch>>,
    ) -> Result<RoomDocument>;

    /// Merge a partial update into an existing room and return the new version.
    fn merge_write(&self, room_id: &str, patch: &RoomPatch) -> Result<RoomDocument> {
        self.update(room_id, &|_| Ok(Some(patch.clone())))
    }

    /// Register a listener. It is called at once with the current version and
    /// again after every write to the room. Versions reach a listener in
    /// revision order; a version older than one it already saw is dropped.
    fn subscribe(&self, room_id: &str, on_change: ChangeListener) -> Result<SubscriptionId>;

    /// Remove a listener. Returns `false` if it was not registered.
    fn unsubscribe(&self, subscription: SubscriptionId) -> bool;
}

/// Create a room owned by `creator_id` under a freshly drawn id.
pub fn create_room<S: RoomStore + ?Sized>(
    store: &S,
    creator_id: &str,
    config: &RoomConfig,
) -> Result<RoomDocument> {
    if creator_id.is_empty() {
        return Err(Error::NotPermitted("creator id must not be empty".to_string()));
    }
    if config.id_length == 0 {
        return Err(Error::Relay("room id length must be positive".to_string()));
    }
    let mut rng = match config.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    for _ in 0..MAX_ID_ATTEMPTS {
        let id: String = (0..config.id_length)
            .map(|_| ROOM_ID_ALPHABET[rng.gen_range(0..ROOM_ID_ALPHABET.len())] as char)
            .collect();
        if store.snapshot(&id)?.is_some() {
            continue;
        }
        let document = RoomDocument::new(id, creator_id);
        store.insert(document.clone())?;
        debug!("room {} created by {}", document.id, creator_id);
        return Ok(document);
    }
    Err(Error::Relay(format!(
        "no free room id after {MAX_ID_ATTEMPTS} attempts"
    )))
}

/// Take the joiner seat of an existing room. Joining again as the same user
/// is a no-op. The seat check and the write happen in one store update, so
/// two users racing for the seat cannot both get it.
pub fn join_room<S: RoomStore + ?Sized>(store: &S, room_id: &str, user_id: &str) -> Result<RoomDocument> {
    store.update(room_id, &|document| {
        if document.creator_id == user_id {
            return Err(Error::NotPermitted(format!(
                "{user_id} created room {room_id} and cannot join it as the second participant"
            )));
        }
        match document.joiner_id.as_deref() {
            Some(joiner) if joiner == user_id => Ok(None),
            Some(_) => Err(Error::RoomFull(room_id.to_string())),
            None => {
                debug!("{user_id} joined room {room_id}");
                Ok(Some(RoomPatch::joiner(user_id)))
            }
        }
    })
}

/// A registered listener and the newest revision handed to it.
struct Subscriber {
    id: SubscriptionId,
    on_change: ChangeListener,
    // Reentrant so a listener may write to the room from inside its callback.
    delivered: ReentrantMutex<Cell<Option<u64>>>,
}

impl Subscriber {
    fn deliver(&self, document: &RoomDocument) {
        let delivered = self.delivered.lock();
        if delivered.get().is_some_and(|seen| seen >= document.revision) {
            trace!("room {} revision {} is stale, dropped", document.id, document.revision);
            return;
        }
        delivered.set(Some(document.revision));
        (self.on_change)(document);
    }
}

/// A process-local [`RoomStore`]. Rooms are held as JSON text and decoded,
/// with validation, on every read, just as a remote store would be.
#[derive(Default)]
pub struct MemoryRoomStore {
    rooms: RwLock<HashMap<String, String>>,
    listeners: Mutex<HashMap<String, Vec<Arc<Subscriber>>>>,
    next_subscription: AtomicU64,
}

impl MemoryRoomStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rooms.
    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }

    fn notify(&self, document: &RoomDocument) {
        // Listeners run outside the store locks so they may read or write the store.
        let subscribers: Vec<Arc<Subscriber>> = self
            .listeners
            .lock()
            .get(&document.id)
            .map(|subs| subs.iter().map(Arc::clone).collect())
            .unwrap_or_default();
        trace!(
            "room {} revision {} -> {} listeners",
            document.id,
            document.revision,
            subscribers.len()
        );
        for subscriber in subscribers {
            subscriber.deliver(document);
        }
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&self, room_id: &str, text: &str) {
        self.rooms.write().insert(room_id.to_string(), text.to_string());
    }
}

impl std::fmt::Debug for MemoryRoomStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRoomStore")
            .field("rooms", &self.len())
            .finish()
    }
}

impl RoomStore for MemoryRoomStore {
    fn snapshot(&self, room_id: &str) -> Result<Option<RoomDocument>> {
        self.rooms
            .read()
            .get(room_id)
            .map(String::as_str)
            .map(RoomDocument::from_json)
            .transpose()
    }

    fn insert(&self, document: RoomDocument) -> Result<()> {
        document.validate()?;
        let text = document.to_json()?;
        {
            let mut rooms = self.rooms.write();
            if rooms.contains_key(&document.id) {
                return Err(Error::Relay(format!("room {} already exists", document.id)));
            }
            rooms.insert(document.id.clone(), text);
        }
        self.notify(&document);
        Ok(())
    }

    fn update(
        &self,
        room_id: &str,
        apply: &dyn Fn(&RoomDocument) -> Result<Option<RoomPatch>>,
    ) -> Result<RoomDocument> {
        let merged = {
            let mut rooms = self.rooms.write();
            let current = rooms
                .get(room_id)
                .ok_or_else(|| Error::RoomNotFound(room_id.to_string()))?;
            let current = RoomDocument::from_json(current)?;
            let Some(patch) = apply(&current)? else {
                return Ok(current);
            };
            let merged = current.merge(&patch);
            merged.validate()?;
            rooms.insert(room_id.to_string(), merged.to_json()?);
            merged
        };
        trace!("room {room_id} merged to revision {}", merged.revision);
        self.notify(&merged);
        Ok(merged)
    }

    fn subscribe(&self, room_id: &str, on_change: ChangeListener) -> Result<SubscriptionId> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let subscriber = Arc::new(Subscriber {
            id,
            on_change,
            delivered: ReentrantMutex::new(Cell::new(None)),
        });
        // Registering under the read lock means every later write notifies
        // this subscriber, and every earlier one is in the snapshot.
        let current = {
            let rooms = self.rooms.read();
            let current = rooms
                .get(room_id)
                .map(String::as_str)
                .map(RoomDocument::from_json)
                .transpose()?
                .ok_or_else(|| Error::RoomNotFound(room_id.to_string()))?;
            self.listeners
                .lock()
                .entry(room_id.to_string())
                .or_default()
                .push(Arc::clone(&subscriber));
            current
        };
        subscriber.deliver(&current);
        Ok(id)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        for subs in listeners.values_mut() {
            if let Some(pos) = subs.iter().position(|sub| sub.id == subscription) {
                subs.remove(pos);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::params::lookup_parameter_set;
    use crate::exchange::session::Step;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn seeded() -> RoomConfig {
        RoomConfig {
            seed: Some(8),
            ..RoomConfig::default()
        }
    }

    #[test]
    fn test_create_room_id_shape() {
        let store = MemoryRoomStore::new();
        let doc = create_room(&store, "creator", &seeded()).unwrap();
        assert_eq!(doc.id.len(), 6);
        assert!(doc.id.bytes().all(|b| ROOM_ID_ALPHABET.contains(&b)));
        assert_eq!(store.snapshot(&doc.id).unwrap(), Some(doc));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_create_room_avoids_taken_ids() {
        let store = MemoryRoomStore::new();
        let first = create_room(&store, "a", &seeded()).unwrap();
        // Same seed draws the same first id, which is taken now.
        let second = create_room(&store, "b", &seeded()).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_create_room_requires_creator() {
        let store = MemoryRoomStore::new();
        assert!(matches!(
            create_room(&store, "", &RoomConfig::default()),
            Err(Error::NotPermitted(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_join_rules() {
        let store = MemoryRoomStore::new();
        let doc = create_room(&store, "creator", &seeded()).unwrap();

        let joined = join_room(&store, &doc.id, "joiner").unwrap();
        assert_eq!(joined.joiner_id.as_deref(), Some("joiner"));
        assert_eq!(joined.bob.id.as_deref(), Some("joiner"));
        assert_eq!(join_room(&store, &doc.id, "joiner").unwrap(), joined);

        assert_eq!(
            join_room(&store, &doc.id, "third").unwrap_err(),
            Error::RoomFull(doc.id.clone())
        );
        assert!(matches!(
            join_room(&store, &doc.id, "creator"),
            Err(Error::NotPermitted(_))
        ));
        assert_eq!(
            join_room(&store, "NOPE00", "joiner").unwrap_err(),
            Error::RoomNotFound("NOPE00".to_string())
        );
    }

    #[test]
    fn test_subscribers_see_every_write() {
        let store = MemoryRoomStore::new();
        let doc = create_room(&store, "creator", &seeded()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = store
            .subscribe(&doc.id, Arc::new(move |d: &RoomDocument| sink.lock().push(d.revision)))
            .unwrap();

        join_room(&store, &doc.id, "joiner").unwrap();
        let params = lookup_parameter_set("Toy (Very Fast)").unwrap();
        let latest = store.merge_write(&doc.id, &RoomPatch::params(params)).unwrap();
        assert_eq!(latest.step, Step::ParametersSet);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);

        assert!(store.unsubscribe(subscription));
        assert!(!store.unsubscribe(subscription));
        store.merge_write(&doc.id, &latest.reset_patch()).unwrap();
        assert_eq!(seen.lock().len(), 3);
    }

    #[test]
    fn test_listener_may_write_back() {
        let store = Arc::new(MemoryRoomStore::new());
        let doc = create_room(store.as_ref(), "creator", &seeded()).unwrap();
        let inner = Arc::clone(&store);
        let room_id = doc.id.clone();
        store
            .subscribe(
                &doc.id,
                Arc::new(move |d: &RoomDocument| {
                    if d.has_joiner() && d.params.is_none() {
                        let params = lookup_parameter_set("Toy (Very Fast)").unwrap();
                        inner.merge_write(&room_id, &RoomPatch::params(params)).unwrap();
                    }
                }),
            )
            .unwrap();
        join_room(store.as_ref(), &doc.id, "joiner").unwrap();
        let latest = store.snapshot(&doc.id).unwrap().unwrap();
        assert_eq!(latest.step, Step::ParametersSet);
    }

    #[test]
    fn test_missing_room() {
        let store = MemoryRoomStore::new();
        assert_eq!(store.snapshot("MISSING").unwrap(), None);
        assert!(matches!(
            store.merge_write("MISSING", &RoomPatch::joiner("x")),
            Err(Error::RoomNotFound(_))
        ));
        assert!(matches!(
            store.subscribe("MISSING", Arc::new(|_: &RoomDocument| {})),
            Err(Error::RoomNotFound(_))
        ));
    }

    #[test]
    fn test_corrupt_document_is_rejected_on_read() {
        let store = MemoryRoomStore::new();
        store.insert_raw("BROKEN", r#"{"version":1,"id":"BROKEN"}"#);
        assert!(matches!(store.snapshot("BROKEN"), Err(Error::Codec(_))));
        assert!(store.merge_write("BROKEN", &RoomPatch::joiner("x")).is_err());
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let store = MemoryRoomStore::new();
        let doc = RoomDocument::new("SAME01", "creator");
        store.insert(doc.clone()).unwrap();
        assert!(matches!(store.insert(doc), Err(Error::Relay(_))));
    }

    /// Delegates to a [`MemoryRoomStore`] but answers snapshots slowly.
    struct SlowSnapshots(MemoryRoomStore);

    impl RoomStore for SlowSnapshots {
        fn snapshot(&self, room_id: &str) -> Result<Option<RoomDocument>> {
            thread::sleep(Duration::from_millis(50));
            self.0.snapshot(room_id)
        }

        fn insert(&self, document: RoomDocument) -> Result<()> {
            self.0.insert(document)
        }

        fn update(
            &self,
            room_id: &str,
            apply: &dyn Fn(&RoomDocument) -> Result<Option<RoomPatch>>,
        ) -> Result<RoomDocument> {
            self.0.update(room_id, apply)
        }

        fn subscribe(&self, room_id: &str, on_change: ChangeListener) -> Result<SubscriptionId> {
            self.0.subscribe(room_id, on_change)
        }

        fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
            self.0.unsubscribe(subscription)
        }
    }

    #[test]
    fn test_concurrent_joins_fill_one_seat() {
        let store = Arc::new(SlowSnapshots(MemoryRoomStore::new()));
        let doc = create_room(store.as_ref(), "creator", &seeded()).unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = ["bob", "carol"]
            .into_iter()
            .map(|user| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                let room_id = doc.id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    (user, join_room(store.as_ref(), &room_id, user))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners: Vec<&str> = results
            .iter()
            .filter(|(_, result)| result.is_ok())
            .map(|(user, _)| *user)
            .collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .any(|(_, result)| *result == Err(Error::RoomFull(doc.id.clone()))));

        let stored = store.snapshot(&doc.id).unwrap().unwrap();
        assert_eq!(stored.joiner_id.as_deref(), Some(winners[0]));
        assert_eq!(stored.bob.id.as_deref(), Some(winners[0]));
        assert_eq!(stored.revision, 1);
    }

    #[test]
    fn test_update_without_patch_keeps_revision() {
        let store = MemoryRoomStore::new();
        let doc = create_room(&store, "creator", &seeded()).unwrap();
        let same = store.update(&doc.id, &|_| Ok(None)).unwrap();
        assert_eq!(same, doc);
        let err = store
            .update(&doc.id, &|_| Err(Error::NotPermitted("no".to_string())))
            .unwrap_err();
        assert_eq!(err, Error::NotPermitted("no".to_string()));
        assert_eq!(store.snapshot(&doc.id).unwrap(), Some(doc));
    }

    #[test]
    fn test_slow_listener_ends_on_latest_revision() {
        let store = Arc::new(MemoryRoomStore::new());
        let doc = create_room(store.as_ref(), "creator", &seeded()).unwrap();
        join_room(store.as_ref(), &doc.id, "joiner").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store
            .subscribe(
                &doc.id,
                Arc::new(move |d: &RoomDocument| {
                    if d.revision == 2 {
                        thread::sleep(Duration::from_millis(100));
                    }
                    sink.lock().push(d.revision);
                }),
            )
            .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = ["Toy (Very Fast)", "Simple (Fast)"]
            .into_iter()
            .map(|name| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                let room_id = doc.id.clone();
                thread::spawn(move || {
                    let params = lookup_parameter_set(name).unwrap();
                    barrier.wait();
                    store.merge_write(&room_id, &RoomPatch::params(params)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = store.snapshot(&doc.id).unwrap().unwrap();
        assert_eq!(stored.revision, 3);
        let seen = seen.lock();
        assert_eq!(seen.first(), Some(&1));
        assert_eq!(seen.last(), Some(&stored.revision));
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "out of order: {seen:?}");
    }

    #[test]
    fn test_subscribe_while_writing_ends_on_latest_revision() {
        let store = Arc::new(MemoryRoomStore::new());
        let doc = create_room(store.as_ref(), "creator", &seeded()).unwrap();
        join_room(store.as_ref(), &doc.id, "joiner").unwrap();

        let writer = {
            let store = Arc::clone(&store);
            let room_id = doc.id.clone();
            thread::spawn(move || {
                let names = ["Toy (Very Fast)", "Simple (Fast)"];
                for i in 0..40 {
                    let params = lookup_parameter_set(names[i % 2]).unwrap();
                    store.merge_write(&room_id, &RoomPatch::params(params)).unwrap();
                }
            })
        };

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store
            .subscribe(&doc.id, Arc::new(move |d: &RoomDocument| sink.lock().push(d.revision)))
            .unwrap();
        writer.join().unwrap();

        let stored = store.snapshot(&doc.id).unwrap().unwrap();
        assert_eq!(stored.revision, 41);
        let seen = seen.lock();
        assert_eq!(seen.last(), Some(&stored.revision));
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "out of order: {seen:?}");
    }
}
