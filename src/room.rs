//! Two-participant real-time exchange through a shared room.
//!
//! The room is a rendezvous: the creator (Alice) picks the parameters, each
//! participant draws a private key locally and publishes only its public key,
//! and each then publishes a fingerprint of the secret it derived. The two
//! fingerprints matching is the visible proof of agreement.
//!
//! # Examples
//!
//! ```rust
//! use dhsim::exchange::KeyGenConfig;
//! use dhsim::room::{MemoryRoomStore, Participant, RoomConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryRoomStore::new());
//! let mut alice = Participant::create(Arc::clone(&store), "alice", &RoomConfig::default(), &KeyGenConfig::default()).unwrap();
//! let mut bob = Participant::join(store, alice.room_id(), "bob", &KeyGenConfig::default()).unwrap();
//!
//! alice.select_parameters("Toy (Very Fast)").unwrap();
//! alice.generate_key().unwrap();
//! bob.generate_key().unwrap();
//! alice.exchange().unwrap();
//! bob.exchange().unwrap();
//! assert!(alice.keys_match().unwrap());
//! ```

pub mod document;
pub mod participant;
pub mod store;

pub use document::{secret_fingerprint, PublicPartyState, RoomDocument, RoomPatch, ROOM_SCHEMA_VERSION};
pub use participant::{Participant, Role};
pub use store::{create_room, join_room, ChangeListener, MemoryRoomStore, RoomConfig, RoomStore, SubscriptionId};
