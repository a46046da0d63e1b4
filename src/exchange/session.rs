//! The two-party exchange state machine.
//!
//! An [`ExchangeSession`] moves through five steps:
//!
//! ```text
//! Empty -> ParametersSet -> PrivateKeys -> PublicKeys -> SharedSecrets
//! ```
//!
//! Every transition borrows the current session and hands back a new one, so a
//! caller replicating the session elsewhere always applies transitions to the
//! latest value it holds. Transitions whose preconditions are unmet do not
//! fail; they return [`Transition::Skipped`] carrying the unchanged session and
//! the [`Precondition`] that blocked them.
//!
//! Both parties' secrets live in the same value. That is a simplification for
//! the single-screen simulator; the replicated room in [`crate::room`] keeps
//! each private key with its owner.

use crate::error::{Error, Result};
use crate::exchange::keygen::KeyGenerator;
use crate::exchange::modpow::mod_pow;
use crate::exchange::params::DhParameterSet;
use log::debug;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Alice,
    Bob,
}

impl Party {
    /// The other participant.
    pub fn peer(self) -> Party {
        match self {
            Party::Alice => Party::Bob,
            Party::Bob => Party::Alice,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Alice => write!(f, "Alice"),
            Party::Bob => write!(f, "Bob"),
        }
    }
}

/// Progress of an exchange. Ordered, so `max` never moves a session backwards.
/// Serialized as its numeric code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Step {
    #[default]
    Empty = 0,
    ParametersSet = 1,
    PrivateKeys = 2,
    PublicKeys = 3,
    SharedSecrets = 4,
}

impl Step {
    /// Numeric code of the step, `0` to `4`.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Step for a numeric code, `None` above `4`.
    pub fn from_u8(value: u8) -> Option<Step> {
        match value {
            0 => Some(Step::Empty),
            1 => Some(Step::ParametersSet),
            2 => Some(Step::PrivateKeys),
            3 => Some(Step::PublicKeys),
            4 => Some(Step::SharedSecrets),
            _ => None,
        }
    }
}

impl From<Step> for u8 {
    fn from(step: Step) -> u8 {
        step.as_u8()
    }
}

impl TryFrom<u8> for Step {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Step, String> {
        Step::from_u8(value).ok_or_else(|| format!("step {value} out of range"))
    }
}

/// Key material held for one participant. Filled in the order private, public, shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartyState {
    /// External user reference, if the participant is signed in.
    pub identity: Option<String>,
    pub private_key: Option<BigUint>,
    pub public_key: Option<BigUint>,
    pub shared_secret: Option<BigUint>,
}

impl PartyState {
    fn cleared(&self) -> PartyState {
        PartyState {
            identity: self.identity.clone(),
            ..PartyState::default()
        }
    }
}

/// Why a transition left the session unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// No parameter set has been selected.
    MissingParameters,
    /// At least one party has no private key.
    MissingPrivateKeys,
    /// At least one party has no public key.
    MissingPublicKeys,
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Precondition::MissingParameters => "parameters not selected",
            Precondition::MissingPrivateKeys => "both private keys required",
            Precondition::MissingPublicKeys => "both public keys required",
        };
        f.write_str(text)
    }
}

/// Outcome of a transition that has preconditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied(ExchangeSession),
    Skipped {
        session: ExchangeSession,
        unmet: Precondition,
    },
}

impl Transition {
    /// The transition changed the session.
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    /// The precondition that blocked the transition, if any.
    pub fn unmet(&self) -> Option<Precondition> {
        match self {
            Transition::Applied(_) => None,
            Transition::Skipped { unmet, .. } => Some(*unmet),
        }
    }

    /// The resulting session, changed or not.
    pub fn session(&self) -> &ExchangeSession {
        match self {
            Transition::Applied(session) => session,
            Transition::Skipped { session, .. } => session,
        }
    }

    /// Take the resulting session, changed or not.
    pub fn into_session(self) -> ExchangeSession {
        match self {
            Transition::Applied(session) => session,
            Transition::Skipped { session, .. } => session,
        }
    }

    fn skipped(session: &ExchangeSession, unmet: Precondition) -> Transition {
        debug!("transition skipped at step {:?}: {}", session.step, unmet);
        Transition::Skipped {
            session: session.clone(),
            unmet,
        }
    }
}

/// Result of comparing the two derived shared secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// At least one shared secret has not been computed.
    Pending,
    Match,
    Mismatch,
}

/// The full state of one simulated exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeSession {
    pub(crate) parameters: Option<DhParameterSet>,
    pub(crate) alice: PartyState,
    pub(crate) bob: PartyState,
    pub(crate) step: Step,
}

impl ExchangeSession {
    /// The canonical empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// The selected parameter set, if any.
    pub fn parameters(&self) -> Option<&DhParameterSet> {
        self.parameters.as_ref()
    }

    /// Current step.
    pub fn step(&self) -> Step {
        self.step
    }

    /// Key material of one party.
    pub fn party(&self, party: Party) -> &PartyState {
        match party {
            Party::Alice => &self.alice,
            Party::Bob => &self.bob,
        }
    }

    fn party_mut(&mut self, party: Party) -> &mut PartyState {
        match party {
            Party::Alice => &mut self.alice,
            Party::Bob => &mut self.bob,
        }
    }

    pub fn alice(&self) -> &PartyState {
        &self.alice
    }

    pub fn bob(&self) -> &PartyState {
        &self.bob
    }

    /// Attach an external user reference to a party. Identities survive
    /// parameter changes but not [`reset`](Self::reset).
    pub fn with_identity(mut self, party: Party, identity: impl Into<String>) -> Self {
        self.party_mut(party).identity = Some(identity.into());
        self
    }

    /// Select a parameter set. Always allowed; clears every key, public key and
    /// shared secret of both parties and restarts at step 1. Identities set with
    /// [`with_identity`](Self::with_identity) are kept.
    pub fn set_parameters(&self, parameters: DhParameterSet) -> ExchangeSession {
        debug!("parameters set to {:?}", parameters.name);
        ExchangeSession {
            parameters: Some(parameters),
            alice: self.alice.cleared(),
            bob: self.bob.cleared(),
            step: Step::ParametersSet,
        }
    }

    /// Draw a private key for `party` bounded by the selected modulus.
    ///
    /// # Errors
    /// [`Error::PrivateKeyAlreadyGenerated`] if the party already holds a key.
    pub fn generate_private_key(
        &self,
        party: Party,
        keygen: &mut KeyGenerator,
    ) -> Result<Transition> {
        let Some(params) = &self.parameters else {
            return Ok(Transition::skipped(self, Precondition::MissingParameters));
        };
        if self.party(party).private_key.is_some() {
            return Err(Error::PrivateKeyAlreadyGenerated(party));
        }
        let key = keygen.generate(&params.p)?;
        self.assign_private_key(party, key)
    }

    /// Install a caller-chosen private key for `party`, as when replaying a
    /// known scenario. The key must lie in `[1, p - 2]`.
    pub fn assign_private_key(&self, party: Party, key: BigUint) -> Result<Transition> {
        let Some(params) = &self.parameters else {
            return Ok(Transition::skipped(self, Precondition::MissingParameters));
        };
        if self.party(party).private_key.is_some() {
            return Err(Error::PrivateKeyAlreadyGenerated(party));
        }
        if params.p < BigUint::from(3u32) {
            return Err(Error::InvalidModulus(format!(
                "{} has no private key range",
                params.name
            )));
        }
        if key.is_zero() || key > &params.p - 2u32 {
            return Err(Error::PrivateKeyOutOfRange(format!(
                "{party}'s key must lie in [1, p - 2] for {}",
                params.name
            )));
        }

        let mut next = self.clone();
        next.party_mut(party).private_key = Some(key);
        next.step = next.step.max(Step::PrivateKeys);
        debug!("{party} private key set, step {:?}", next.step);
        Ok(Transition::Applied(next))
    }

    /// Compute `g^x mod p` for both parties.
    pub fn compute_public_keys(&self) -> Result<Transition> {
        let Some(params) = &self.parameters else {
            return Ok(Transition::skipped(self, Precondition::MissingParameters));
        };
        let (Some(a), Some(b)) = (&self.alice.private_key, &self.bob.private_key) else {
            return Ok(Transition::skipped(self, Precondition::MissingPrivateKeys));
        };

        let alice_public = mod_pow(&params.g, a, &params.p)?;
        let bob_public = mod_pow(&params.g, b, &params.p)?;

        let mut next = self.clone();
        next.alice.public_key = Some(alice_public);
        next.bob.public_key = Some(bob_public);
        next.step = next.step.max(Step::PublicKeys);
        debug!("public keys computed for {}", params.name);
        Ok(Transition::Applied(next))
    }

    /// Each party raises the other's public key to its own private key.
    pub fn compute_shared_secrets(&self) -> Result<Transition> {
        let Some(params) = &self.parameters else {
            return Ok(Transition::skipped(self, Precondition::MissingParameters));
        };
        let (Some(a), Some(b)) = (&self.alice.private_key, &self.bob.private_key) else {
            return Ok(Transition::skipped(self, Precondition::MissingPrivateKeys));
        };
        let (Some(alice_public), Some(bob_public)) = (&self.alice.public_key, &self.bob.public_key)
        else {
            return Ok(Transition::skipped(self, Precondition::MissingPublicKeys));
        };

        let alice_secret = mod_pow(bob_public, a, &params.p)?;
        let bob_secret = mod_pow(alice_public, b, &params.p)?;

        let mut next = self.clone();
        next.alice.shared_secret = Some(alice_secret);
        next.bob.shared_secret = Some(bob_secret);
        next.step = Step::SharedSecrets;
        debug!("shared secrets computed for {}", params.name);
        Ok(Transition::Applied(next))
    }

    /// The single "exchange" action: public keys, then shared secrets.
    pub fn exchange(&self) -> Result<Transition> {
        match self.compute_public_keys()? {
            Transition::Applied(with_public) => with_public.compute_shared_secrets(),
            skipped => Ok(skipped),
        }
    }

    /// Back to the canonical empty session.
    pub fn reset(&self) -> ExchangeSession {
        debug!("session reset from step {:?}", self.step);
        ExchangeSession::default()
    }

    /// A parameter set is selected, so private keys may be drawn.
    pub fn can_generate(&self) -> bool {
        self.step >= Step::ParametersSet && self.parameters.is_some()
    }

    /// Both private keys exist.
    pub fn can_exchange(&self) -> bool {
        self.alice.private_key.is_some() && self.bob.private_key.is_some()
    }

    /// Both shared secrets are computed.
    pub fn is_finished(&self) -> bool {
        self.step >= Step::SharedSecrets
    }

    /// Compare the two independently derived shared secrets.
    pub fn verify(&self) -> Verification {
        match (&self.alice.shared_secret, &self.bob.shared_secret) {
            (Some(a), Some(b)) if a == b => Verification::Match,
            (Some(_), Some(_)) => Verification::Mismatch,
            _ => Verification::Pending,
        }
    }
}
