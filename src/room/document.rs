//! The replicated room record.
//!
//! Only public data travels through the room: the chosen parameters, each
//! side's public key, and a SHA-256 fingerprint of each side's shared secret.
//! Private keys and the secrets themselves stay with their owner (see
//! [`Participant`](crate::room::Participant)).
//!
//! The `step` field is recomputed from the content after every merge instead
//! of being written by clients, so two participants publishing at the same
//! time cannot leave it behind the data.

use crate::error::{Error, Result};
use crate::exchange::codec::{decimal_option, validate_parameters};
use crate::exchange::params::DhParameterSet;
use crate::exchange::session::{Party, Step};
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Version written into every room record.
pub const ROOM_SCHEMA_VERSION: u32 = 1;

/// Hex-encoded SHA-256 of the big-endian bytes of a shared secret.
pub fn secret_fingerprint(secret: &BigUint) -> String {
    hex::encode(Sha256::digest(secret.to_bytes_be()))
}

/// What one side of the exchange discloses to the room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PublicPartyState {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, with = "decimal_option")]
    pub public_key: Option<BigUint>,
    #[serde(default)]
    pub secret_fingerprint: Option<String>,
}

impl PublicPartyState {
    fn identified(id: Option<String>) -> Self {
        PublicPartyState {
            id,
            ..PublicPartyState::default()
        }
    }
}

/// The shared record of one room. Holds public values only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoomDocument {
    pub version: u32,
    pub id: String,
    pub creator_id: String,
    pub joiner_id: Option<String>,
    pub params: Option<DhParameterSet>,
    pub alice: PublicPartyState,
    pub bob: PublicPartyState,
    pub step: Step,
    /// Incremented by every merge write.
    pub revision: u64,
}

impl RoomDocument {
    /// A fresh room owned by `creator_id`, who plays Alice.
    pub fn new(id: impl Into<String>, creator_id: impl Into<String>) -> Self {
        let creator_id = creator_id.into();
        RoomDocument {
            version: ROOM_SCHEMA_VERSION,
            id: id.into(),
            alice: PublicPartyState::identified(Some(creator_id.clone())),
            creator_id,
            joiner_id: None,
            params: None,
            bob: PublicPartyState::default(),
            step: Step::Empty,
            revision: 0,
        }
    }

    /// The public side played by `party`.
    pub fn party(&self, party: Party) -> &PublicPartyState {
        match party {
            Party::Alice => &self.alice,
            Party::Bob => &self.bob,
        }
    }

    pub fn has_joiner(&self) -> bool {
        self.joiner_id.is_some()
    }

    /// `Some(true)` once both fingerprints are published and equal.
    pub fn keys_match(&self) -> Option<bool> {
        match (&self.alice.secret_fingerprint, &self.bob.secret_fingerprint) {
            (Some(a), Some(b)) => Some(a == b),
            _ => None,
        }
    }

    /// The step implied by the document's content.
    pub fn derived_step(&self) -> Step {
        if self.params.is_none() {
            return Step::Empty;
        }
        let sides = [&self.alice, &self.bob];
        let public = sides.iter().filter(|s| s.public_key.is_some()).count();
        let fingerprints = sides.iter().filter(|s| s.secret_fingerprint.is_some()).count();
        match (public, fingerprints) {
            (_, 2) => Step::SharedSecrets,
            (2, _) => Step::PublicKeys,
            (1, _) => Step::PrivateKeys,
            _ => Step::ParametersSet,
        }
    }

    /// Apply a patch: every field present in the patch replaces the stored
    /// one (last writer wins per field). The step is re-derived and the
    /// revision bumped.
    pub fn merge(&self, patch: &RoomPatch) -> RoomDocument {
        let mut next = self.clone();
        if let Some(joiner_id) = &patch.joiner_id {
            next.joiner_id = Some(joiner_id.clone());
        }
        if let Some(params) = &patch.params {
            next.params = params.clone();
        }
        if let Some(alice) = &patch.alice {
            next.alice = alice.clone();
        }
        if let Some(bob) = &patch.bob {
            next.bob = bob.clone();
        }
        next.step = next.derived_step();
        next.revision = self.revision + 1;
        next
    }

    /// The patch that returns this room to step 0 while keeping both participants.
    pub fn reset_patch(&self) -> RoomPatch {
        RoomPatch {
            joiner_id: None,
            params: Some(None),
            alice: Some(PublicPartyState::identified(self.alice.id.clone())),
            bob: Some(PublicPartyState::identified(self.bob.id.clone())),
        }
    }

    /// Reject partially written, stale-schema or inconsistent documents.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidRecord(format!("room {}: {msg}", self.id)));

        if self.version != ROOM_SCHEMA_VERSION {
            return invalid(format!("unsupported schema version {}", self.version));
        }
        if self.id.is_empty() || self.creator_id.is_empty() {
            return invalid("missing room or creator id".to_string());
        }
        if self.alice.id.as_deref() != Some(self.creator_id.as_str()) {
            return invalid("alice is not the creator".to_string());
        }
        if self.bob.id != self.joiner_id {
            return invalid("bob is not the joiner".to_string());
        }

        for (party, side) in [(Party::Alice, &self.alice), (Party::Bob, &self.bob)] {
            if side.secret_fingerprint.is_some() && side.public_key.is_none() {
                return invalid(format!("{party} has a fingerprint but no public key"));
            }
            if let Some(fingerprint) = &side.secret_fingerprint {
                let well_formed = fingerprint.len() == 64
                    && fingerprint.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase());
                if !well_formed {
                    return invalid(format!("{party} has a malformed fingerprint"));
                }
            }
            if let Some(public_key) = &side.public_key {
                let Some(params) = &self.params else {
                    return invalid(format!("{party} has a public key but no parameters"));
                };
                if public_key.is_zero() || *public_key >= params.p {
                    return invalid(format!("{party}'s public key is not in [1, p - 1]"));
                }
            }
        }
        if let Some(params) = &self.params {
            validate_parameters(params)?;
        }

        if self.step != self.derived_step() {
            return invalid(format!(
                "step {:?} does not match content ({:?})",
                self.step,
                self.derived_step()
            ));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and [`validate`](Self::validate) a room record.
    pub fn from_json(text: &str) -> Result<RoomDocument> {
        let document: RoomDocument = serde_json::from_str(text)?;
        document.validate()?;
        Ok(document)
    }
}

/// A partial write. Absent fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomPatch {
    pub joiner_id: Option<String>,
    /// `Some(None)` clears the parameters.
    pub params: Option<Option<DhParameterSet>>,
    pub alice: Option<PublicPartyState>,
    pub bob: Option<PublicPartyState>,
}

impl RoomPatch {
    pub fn joiner(joiner_id: impl Into<String>) -> Self {
        let joiner_id = joiner_id.into();
        RoomPatch {
            bob: Some(PublicPartyState::identified(Some(joiner_id.clone()))),
            joiner_id: Some(joiner_id),
            ..RoomPatch::default()
        }
    }

    pub fn params(params: DhParameterSet) -> Self {
        RoomPatch {
            params: Some(Some(params)),
            ..RoomPatch::default()
        }
    }

    /// Replace one side's public state.
    pub fn side(party: Party, state: PublicPartyState) -> Self {
        match party {
            Party::Alice => RoomPatch {
                alice: Some(state),
                ..RoomPatch::default()
            },
            Party::Bob => RoomPatch {
                bob: Some(state),
                ..RoomPatch::default()
            },
        }
    }
}
