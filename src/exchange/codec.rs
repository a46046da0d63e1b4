//! JSON text form of an [`ExchangeSession`].
//!
//! Big integers are always written as decimal strings, so no value ever
//! passes through a float or a fixed-width integer on its way to or from text.
//! Field names follow the simulator's copy-log format (`params`, `privateKey`,
//! `sharedKey`, ...) and every record carries a schema `version`.
//!
//! Decoding validates the record against the state machine's invariants, so a
//! half-written or stale document is rejected instead of being loaded.

use crate::error::{Error, Result};
use crate::exchange::params::DhParameterSet;
use crate::exchange::session::{ExchangeSession, PartyState, Step};
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Version written into every session record.
pub const SCHEMA_VERSION: u32 = 1;

/// Parse a non-empty run of ASCII digits. Signs, exponents, separators and
/// hex prefixes are all rejected.
pub fn parse_decimal(text: &str) -> Result<BigUint> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidRecord(format!(
            "expected a decimal integer, got {text:?}"
        )));
    }
    BigUint::parse_bytes(text.as_bytes(), 10)
        .ok_or_else(|| Error::InvalidRecord(format!("unparseable integer {text:?}")))
}

/// `#[serde(with = "decimal")]` for `BigUint` fields.
pub mod decimal {
    use super::parse_decimal;
    use num_bigint::BigUint;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_decimal(&text).map_err(D::Error::custom)
    }
}

/// `#[serde(with = "decimal_option")]` for `Option<BigUint>` fields; absent is `null`.
pub mod decimal_option {
    use super::parse_decimal;
    use num_bigint::BigUint;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<BigUint>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_str_radix(10)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<BigUint>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| parse_decimal(&text).map_err(D::Error::custom))
            .transpose()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PartyRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, with = "decimal_option")]
    private_key: Option<BigUint>,
    #[serde(default, with = "decimal_option")]
    public_key: Option<BigUint>,
    #[serde(default, with = "decimal_option")]
    shared_key: Option<BigUint>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionRecord {
    version: u32,
    params: Option<DhParameterSet>,
    alice: PartyRecord,
    bob: PartyRecord,
    step: u8,
}

impl From<&PartyState> for PartyRecord {
    fn from(state: &PartyState) -> Self {
        PartyRecord {
            id: state.identity.clone(),
            private_key: state.private_key.clone(),
            public_key: state.public_key.clone(),
            shared_key: state.shared_secret.clone(),
        }
    }
}

impl From<PartyRecord> for PartyState {
    fn from(record: PartyRecord) -> Self {
        PartyState {
            identity: record.id,
            private_key: record.private_key,
            public_key: record.public_key,
            shared_secret: record.shared_key,
        }
    }
}

impl From<&ExchangeSession> for SessionRecord {
    fn from(session: &ExchangeSession) -> Self {
        SessionRecord {
            version: SCHEMA_VERSION,
            params: session.parameters.clone(),
            alice: PartyRecord::from(&session.alice),
            bob: PartyRecord::from(&session.bob),
            step: session.step.as_u8(),
        }
    }
}

impl TryFrom<SessionRecord> for ExchangeSession {
    type Error = Error;

    fn try_from(record: SessionRecord) -> Result<Self> {
        if record.version != SCHEMA_VERSION {
            return Err(Error::InvalidRecord(format!(
                "unsupported schema version {} (expected {SCHEMA_VERSION})",
                record.version
            )));
        }
        let step = Step::from_u8(record.step)
            .ok_or_else(|| Error::InvalidRecord(format!("step {} out of range", record.step)))?;
        let session = ExchangeSession {
            parameters: record.params,
            alice: record.alice.into(),
            bob: record.bob.into(),
            step,
        };
        validate_session(&session)?;
        Ok(session)
    }
}

/// Encode a session as compact JSON.
pub fn to_json(session: &ExchangeSession) -> Result<String> {
    Ok(serde_json::to_string(&SessionRecord::from(session))?)
}

/// Encode a session as indented JSON, for copying the simulation log.
pub fn to_pretty_json(session: &ExchangeSession) -> Result<String> {
    Ok(serde_json::to_string_pretty(&SessionRecord::from(session))?)
}

/// Decode and validate a session record.
pub fn from_json(text: &str) -> Result<ExchangeSession> {
    let record: SessionRecord = serde_json::from_str(text)?;
    ExchangeSession::try_from(record)
}

/// Check that a session could have been produced by the state machine.
pub fn validate_session(session: &ExchangeSession) -> Result<()> {
    let invalid = |msg: String| Err(Error::InvalidRecord(msg));
    let parties = [("alice", &session.alice), ("bob", &session.bob)];

    let Some(params) = &session.parameters else {
        if session.step != Step::Empty {
            return invalid(format!("step {:?} without parameters", session.step));
        }
        if parties.iter().any(|(_, p)| has_keys(p)) {
            return invalid("key material without parameters".to_string());
        }
        return Ok(());
    };

    validate_parameters(params)?;

    for (name, party) in parties {
        if party.public_key.is_some() && party.private_key.is_none() {
            return invalid(format!("{name} has a public key but no private key"));
        }
        if party.shared_secret.is_some() && party.public_key.is_none() {
            return invalid(format!("{name} has a shared secret but no public key"));
        }
        if let Some(key) = &party.private_key {
            if key.is_zero() || *key > &params.p - 2u32 {
                return invalid(format!("{name}'s private key is outside [1, p - 2]"));
            }
        }
        for value in [&party.public_key, &party.shared_secret].into_iter().flatten() {
            if *value >= params.p {
                return invalid(format!("{name} holds a value not reduced modulo p"));
            }
        }
    }

    let count = |pick: fn(&PartyState) -> bool| parties.iter().filter(|(_, p)| pick(p)).count();
    let private = count(|p| p.private_key.is_some());
    let public = count(|p| p.public_key.is_some());
    let shared = count(|p| p.shared_secret.is_some());

    let consistent = match session.step {
        Step::Empty => false,
        Step::ParametersSet => private == 0,
        Step::PrivateKeys => private >= 1 && public == 0 && shared == 0,
        Step::PublicKeys => public == 2 && shared == 0,
        Step::SharedSecrets => shared == 2,
    };
    if !consistent {
        return invalid(format!(
            "step {:?} does not match {private} private, {public} public, {shared} shared keys",
            session.step
        ));
    }
    Ok(())
}

/// A parameter set must have a modulus with a non-empty private key range
/// and a reduced, non-zero generator.
pub(crate) fn validate_parameters(params: &DhParameterSet) -> Result<()> {
    if params.p < BigUint::from(3u32) {
        return Err(Error::InvalidRecord(format!(
            "{}: modulus must be at least 3",
            params.name
        )));
    }
    if params.g.is_zero() || params.g >= params.p {
        return Err(Error::InvalidRecord(format!(
            "{}: generator must lie in [1, p - 1]",
            params.name
        )));
    }
    Ok(())
}

fn has_keys(party: &PartyState) -> bool {
    party.private_key.is_some() || party.public_key.is_some() || party.shared_secret.is_some()
}
