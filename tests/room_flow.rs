//! End-to-end flows: a local session, a shared room, and a narrated attack.

use dhsim::exchange::{
    from_json, lookup_parameter_set, mod_pow, to_pretty_json, ExchangeSession, KeyGenConfig,
    KeyGenerator, Party, Step, Verification,
};
use dhsim::narration::{request_narration, AttackScenario, MitmConfig, MitmNarrator};
use dhsim::room::{
    secret_fingerprint, MemoryRoomStore, Participant, RoomConfig, RoomDocument, RoomStore,
};
use dhsim::Error;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

fn seeded(seed: u64) -> KeyGenConfig {
    KeyGenConfig { seed: Some(seed) }
}

/// Test the local flow from an empty session to a verified shared secret
#[test]
fn test_local_session_flow() {
    let mut keygen = KeyGenerator::new(&seeded(11));
    let params = lookup_parameter_set("Medium (512-bit)").unwrap();

    let session = ExchangeSession::new().set_parameters(params.clone());
    assert!(session.can_generate());
    assert!(!session.can_exchange());

    let session = session
        .generate_private_key(Party::Alice, &mut keygen)
        .unwrap()
        .into_session()
        .generate_private_key(Party::Bob, &mut keygen)
        .unwrap()
        .into_session();
    assert_eq!(session.step(), Step::PrivateKeys);
    assert!(session.can_exchange());

    let done = session.exchange().unwrap().into_session();
    assert_eq!(done.step(), Step::SharedSecrets);
    assert!(done.is_finished());
    assert_eq!(done.verify(), Verification::Match);

    // Each side's secret is the other's public key raised to its own exponent.
    let alice = done.alice();
    let bob = done.bob();
    let expected = mod_pow(
        bob.public_key.as_ref().unwrap(),
        alice.private_key.as_ref().unwrap(),
        &params.p,
    )
    .unwrap();
    assert_eq!(alice.shared_secret.as_ref(), Some(&expected));
    assert_eq!(bob.shared_secret.as_ref(), Some(&expected));

    let fresh = done.reset();
    assert_eq!(fresh.step(), Step::Empty);
    assert!(fresh.parameters().is_none());
}

/// Test the copy-log export of a finished session
#[test]
fn test_copy_log_round_trip() {
    let mut keygen = KeyGenerator::new(&seeded(5));
    let session = ExchangeSession::new()
        .with_identity(Party::Alice, "alice-uid")
        .set_parameters(lookup_parameter_set("Toy (Very Fast)").unwrap())
        .generate_private_key(Party::Alice, &mut keygen)
        .unwrap()
        .into_session()
        .generate_private_key(Party::Bob, &mut keygen)
        .unwrap()
        .into_session()
        .exchange()
        .unwrap()
        .into_session();

    let log = to_pretty_json(&session).unwrap();
    assert!(log.contains("\"p\": \"23\""));
    assert!(log.contains("\"sharedKey\""));
    assert!(log.contains("\"id\": \"alice-uid\""));

    let restored = from_json(&log).unwrap();
    assert_eq!(restored, session);
    assert_eq!(restored.verify(), Verification::Match);
}

/// Test a skipped transition leaves the session untouched
#[test]
fn test_exchange_before_keys_is_skipped() {
    let session = ExchangeSession::new().set_parameters(lookup_parameter_set("Toy (Very Fast)").unwrap());
    let transition = session.exchange().unwrap();
    assert!(!transition.is_applied());
    assert!(transition.unmet().is_some());
    assert_eq!(transition.into_session(), session);
}

/// Test the full two-participant flow as seen by a subscriber
#[test]
fn test_room_flow_with_subscriber() {
    let store = Arc::new(MemoryRoomStore::new());
    let room = RoomConfig {
        seed: Some(21),
        ..RoomConfig::default()
    };
    let mut alice = Participant::create(Arc::clone(&store), "alice-uid", &room, &seeded(1)).unwrap();

    let steps = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&steps);
    let subscription = store
        .subscribe(
            alice.room_id(),
            Arc::new(move |doc: &RoomDocument| sink.lock().push(doc.step)),
        )
        .unwrap();

    let mut bob = Participant::join(Arc::clone(&store), alice.room_id(), "bob-uid", &seeded(2)).unwrap();
    alice.select_parameters("Simple (Fast)").unwrap();
    alice.generate_key().unwrap();
    bob.generate_key().unwrap();
    alice.exchange().unwrap();
    let last = bob.exchange().unwrap();

    assert_eq!(last.step, Step::SharedSecrets);
    assert_eq!(last.keys_match(), Some(true));
    assert!(alice.keys_match().unwrap());
    assert_eq!(
        last.alice.secret_fingerprint.as_deref(),
        Some(secret_fingerprint(alice.shared_secret().unwrap()).as_str())
    );

    // Initial snapshot, join, parameters, two keys, two fingerprints.
    assert_eq!(
        *steps.lock(),
        vec![
            Step::Empty,
            Step::Empty,
            Step::ParametersSet,
            Step::PrivateKeys,
            Step::PublicKeys,
            Step::PublicKeys,
            Step::SharedSecrets,
        ]
    );
    assert!(store.unsubscribe(subscription));
}

/// Test both participants generating keys at the same time
#[test]
fn test_concurrent_key_generation() {
    let store = Arc::new(MemoryRoomStore::new());
    let mut alice = Participant::create(
        Arc::clone(&store),
        "alice-uid",
        &RoomConfig::default(),
        &KeyGenConfig::default(),
    )
    .unwrap();
    let mut bob = Participant::join(Arc::clone(&store), alice.room_id(), "bob-uid", &KeyGenConfig::default()).unwrap();
    alice.select_parameters("Medium (512-bit)").unwrap();
    let room_id = alice.room_id().to_string();

    let handles = [alice, bob]
        .into_iter()
        .map(|mut participant| {
            thread::spawn(move || {
                participant.generate_key().unwrap();
                participant
            })
        })
        .collect::<Vec<_>>();
    let mut participants = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect::<Vec<_>>();

    let doc = store.snapshot(&room_id).unwrap().unwrap();
    assert!(doc.alice.public_key.is_some());
    assert!(doc.bob.public_key.is_some());
    assert_eq!(doc.step, Step::PublicKeys);

    bob = participants.pop().unwrap();
    alice = participants.pop().unwrap();
    alice.exchange().unwrap();
    bob.exchange().unwrap();
    assert!(bob.keys_match().unwrap());
}

/// Test that a third user cannot take a seat
#[test]
fn test_room_is_limited_to_two() {
    let store = Arc::new(MemoryRoomStore::new());
    let alice = Participant::create(
        Arc::clone(&store),
        "alice-uid",
        &RoomConfig::default(),
        &KeyGenConfig::default(),
    )
    .unwrap();
    let _bob = Participant::join(Arc::clone(&store), alice.room_id(), "bob-uid", &KeyGenConfig::default()).unwrap();

    let err = Participant::join(store, alice.room_id(), "carol-uid", &KeyGenConfig::default()).unwrap_err();
    assert_eq!(err, Error::RoomFull(alice.room_id().to_string()));
    assert!(!err.is_retryable());
}

/// Test narrating an attack on a simulated session
#[test]
fn test_narrate_simulated_session() {
    let mut keygen = KeyGenerator::new(&seeded(9));
    let session = ExchangeSession::new()
        .set_parameters(lookup_parameter_set("Toy (Very Fast)").unwrap())
        .generate_private_key(Party::Alice, &mut keygen)
        .unwrap()
        .into_session()
        .generate_private_key(Party::Bob, &mut keygen)
        .unwrap()
        .into_session();

    let scenario = AttackScenario::from_session(&session).unwrap();
    let narrator = MitmNarrator::new(&MitmConfig { seed: Some(4) });
    let narration = request_narration(&narrator, &scenario).unwrap();
    assert!(narration.attack_description.contains("Mallory"));
    assert!(!narration.mitigation_strategies.is_empty());

    let empty = AttackScenario::default();
    assert!(matches!(
        request_narration(&narrator, &empty),
        Err(Error::InvalidScenario(_))
    ));
}
