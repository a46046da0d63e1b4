//! One side of a replicated exchange.
//!
//! A [`Participant`] keeps its private key and shared secret in memory and
//! writes only public values to the room. Every action first reads the latest
//! room version, so decisions are never made against a stale local copy.

use crate::error::{Error, Result};
use crate::exchange::keygen::{KeyGenConfig, KeyGenerator};
use crate::exchange::modpow::mod_pow;
use crate::exchange::params::require_parameter_set;
use crate::exchange::session::{Party, Step};
use crate::room::document::{secret_fingerprint, PublicPartyState, RoomDocument, RoomPatch};
use crate::room::store::{create_room, join_room, RoomConfig, RoomStore};
use log::{debug, warn};
use num_bigint::BigUint;
use std::sync::Arc;

/// How a participant entered the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opened the room; plays Alice and controls parameters and reset.
    Creator,
    /// Joined an existing room; plays Bob.
    Joiner,
}

impl Role {
    pub fn party(self) -> Party {
        match self {
            Role::Creator => Party::Alice,
            Role::Joiner => Party::Bob,
        }
    }
}

/// A user seated in a room, holding that side's secrets locally.
pub struct Participant<S: RoomStore> {
    store: Arc<S>,
    room_id: String,
    user_id: String,
    role: Role,
    keygen: KeyGenerator,
    private_key: Option<BigUint>,
    shared_secret: Option<BigUint>,
}

impl<S: RoomStore> std::fmt::Debug for Participant<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets are deliberately left out.
        f.debug_struct("Participant")
            .field("room_id", &self.room_id)
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .field("has_private_key", &self.private_key.is_some())
            .finish()
    }
}

impl<S: RoomStore> Participant<S> {
    /// Open a new room and take the creator seat.
    pub fn create(
        store: Arc<S>,
        user_id: &str,
        room_config: &RoomConfig,
        keygen_config: &KeyGenConfig,
    ) -> Result<Self> {
        let document = create_room(store.as_ref(), user_id, room_config)?;
        Ok(Self::seated(store, document.id, user_id, Role::Creator, keygen_config))
    }

    /// Enter an existing room. The room's creator re-enters as creator;
    /// anyone else takes the joiner seat.
    pub fn join(
        store: Arc<S>,
        room_id: &str,
        user_id: &str,
        keygen_config: &KeyGenConfig,
    ) -> Result<Self> {
        let document = store
            .snapshot(room_id)?
            .ok_or_else(|| Error::RoomNotFound(room_id.to_string()))?;
        let role = if document.creator_id == user_id {
            Role::Creator
        } else {
            join_room(store.as_ref(), room_id, user_id)?;
            Role::Joiner
        };
        Ok(Self::seated(store, room_id.to_string(), user_id, role, keygen_config))
    }

    fn seated(
        store: Arc<S>,
        room_id: String,
        user_id: &str,
        role: Role,
        keygen_config: &KeyGenConfig,
    ) -> Self {
        Participant {
            store,
            room_id,
            user_id: user_id.to_string(),
            role,
            keygen: KeyGenerator::new(keygen_config),
            private_key: None,
            shared_secret: None,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn party(&self) -> Party {
        self.role.party()
    }

    /// Local private key, never replicated.
    pub fn private_key(&self) -> Option<&BigUint> {
        self.private_key.as_ref()
    }

    /// Local shared secret, never replicated.
    pub fn shared_secret(&self) -> Option<&BigUint> {
        self.shared_secret.as_ref()
    }

    /// Fetch the latest room version and drop local secrets the room no
    /// longer backs (after a reset or a parameter change).
    pub fn sync(&mut self) -> Result<RoomDocument> {
        let document = self
            .store
            .snapshot(&self.room_id)?
            .ok_or_else(|| Error::RoomNotFound(self.room_id.clone()))?;
        let side = document.party(self.party());

        let backed = match (&self.private_key, &side.public_key, &document.params) {
            (Some(key), Some(public_key), Some(params)) => {
                mod_pow(&params.g, key, &params.p)? == *public_key
            }
            _ => false,
        };
        if !backed && self.private_key.is_some() {
            debug!("{} dropping local secrets for room {}", self.user_id, self.room_id);
            self.private_key = None;
            self.shared_secret = None;
        }
        if side.secret_fingerprint.is_none() {
            self.shared_secret = None;
        }
        Ok(document)
    }

    fn refuse(&self, reason: String) -> Error {
        warn!("{} ({:?}) in room {}: {reason}", self.user_id, self.role, self.room_id);
        Error::NotPermitted(reason)
    }

    /// Choose the room's parameter set. Creator only, and only before anything else happened.
    pub fn select_parameters(&mut self, name: &str) -> Result<RoomDocument> {
        let document = self.sync()?;
        if self.role != Role::Creator {
            return Err(self.refuse("only the creator selects parameters".to_string()));
        }
        if document.step > Step::Empty {
            return Err(self.refuse(format!(
                "parameters are fixed once the room is at step {:?}",
                document.step
            )));
        }
        let params = require_parameter_set(name)?;
        debug!("room {} uses {}", self.room_id, params.name);
        self.store.merge_write(&self.room_id, &RoomPatch::params(params))
    }

    /// Draw a local private key and publish `g^x mod p`.
    pub fn generate_key(&mut self) -> Result<RoomDocument> {
        let document = self.sync()?;
        let Some(params) = &document.params else {
            return Err(self.refuse("parameters not selected".to_string()));
        };
        if !document.has_joiner() {
            return Err(self.refuse("waiting for a second participant".to_string()));
        }
        let party = self.party();
        if self.private_key.is_some() || document.party(party).public_key.is_some() {
            return Err(Error::PrivateKeyAlreadyGenerated(party));
        }

        let private_key = self.keygen.generate(&params.p)?;
        let public_key = mod_pow(&params.g, &private_key, &params.p)?;
        let side = PublicPartyState {
            id: Some(self.user_id.clone()),
            public_key: Some(public_key),
            secret_fingerprint: None,
        };
        self.private_key = Some(private_key);
        debug!("{party} published a public key in room {}", self.room_id);
        self.store.merge_write(&self.room_id, &RoomPatch::side(party, side))
    }

    /// Derive the shared secret from the peer's public key and publish its fingerprint.
    pub fn exchange(&mut self) -> Result<RoomDocument> {
        let document = self.sync()?;
        let party = self.party();
        let (Some(params), Some(private_key)) = (&document.params, &self.private_key) else {
            return Err(self.refuse("generate a private key first".to_string()));
        };
        let Some(peer_public) = &document.party(party.peer()).public_key else {
            return Err(self.refuse(format!("{} has not published a public key", party.peer())));
        };

        let secret = mod_pow(peer_public, private_key, &params.p)?;
        let side = PublicPartyState {
            secret_fingerprint: Some(secret_fingerprint(&secret)),
            ..document.party(party).clone()
        };
        self.shared_secret = Some(secret);
        debug!("{party} derived a shared secret in room {}", self.room_id);
        self.store.merge_write(&self.room_id, &RoomPatch::side(party, side))
    }

    /// Return the room to step 0, keeping both participants seated. Creator only.
    pub fn reset(&mut self) -> Result<RoomDocument> {
        let document = self.sync()?;
        if self.role != Role::Creator {
            return Err(self.refuse("only the creator resets the room".to_string()));
        }
        self.private_key = None;
        self.shared_secret = None;
        debug!("room {} reset", self.room_id);
        self.store.merge_write(&self.room_id, &document.reset_patch())
    }

    /// Both fingerprints are published and equal.
    pub fn keys_match(&mut self) -> Result<bool> {
        Ok(self.sync()?.keys_match() == Some(true))
    }
}
