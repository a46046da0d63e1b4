//! Man-in-the-middle attack narration.
//!
//! A scenario (the public parameters, both private keys and what the attacker
//! is assumed to know) is validated, rendered into a prompt for a
//! text-generation service, and the service's structured answer is parsed
//! back into an [`AttackNarration`]. The service itself sits behind the
//! [`Narrator`] trait.
//!
//! [`MitmNarrator`] is a local narrator that needs no service: it actually
//! runs the interception on the scenario's numbers, with Mallory answering
//! each side with a key of her own, and reports the two secrets she ends up
//! sharing.

use crate::error::{Error, Result};
use crate::exchange::codec::parse_decimal;
use crate::exchange::keygen::{KeyGenConfig, KeyGenerator};
use crate::exchange::modpow::mod_pow;
use crate::exchange::session::{ExchangeSession, Party};
use log::{debug, warn};
use num_bigint::BigUint;
use num_traits::Zero;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Attacker knowledge assumed when the scenario does not say otherwise.
pub const DEFAULT_ATTACKER_KNOWLEDGE: &str =
    "The attacker can intercept and modify every message between Alice and Bob.";

/// Input to a narration request. Integers are decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackScenario {
    pub p: String,
    pub g: String,
    pub alice_private_key: String,
    pub bob_private_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attacker_knowledge: Option<String>,
}

impl Default for AttackScenario {
    /// The toy parameters with empty keys, as a starting form.
    fn default() -> Self {
        AttackScenario {
            p: "23".to_string(),
            g: "5".to_string(),
            alice_private_key: String::new(),
            bob_private_key: String::new(),
            attacker_knowledge: Some(DEFAULT_ATTACKER_KNOWLEDGE.to_string()),
        }
    }
}

/// Parsed numbers of a valid scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioValues {
    pub p: BigUint,
    pub g: BigUint,
    pub alice_private_key: BigUint,
    pub bob_private_key: BigUint,
}

impl AttackScenario {
    /// Take the parameters and both private keys of a simulated session.
    pub fn from_session(session: &ExchangeSession) -> Result<Self> {
        let params = session
            .parameters()
            .ok_or_else(|| Error::InvalidScenario("session has no parameters".to_string()))?;
        let key = |party: Party| {
            session
                .party(party)
                .private_key
                .as_ref()
                .map(|k| k.to_str_radix(10))
                .ok_or_else(|| Error::InvalidScenario(format!("{party} has no private key")))
        };
        Ok(AttackScenario {
            p: params.p.to_str_radix(10),
            g: params.g.to_str_radix(10),
            alice_private_key: key(Party::Alice)?,
            bob_private_key: key(Party::Bob)?,
            attacker_knowledge: Some(DEFAULT_ATTACKER_KNOWLEDGE.to_string()),
        })
    }

    /// Check every field and return the parsed numbers.
    pub fn validate(&self) -> Result<ScenarioValues> {
        let field = |name: &str, text: &str| {
            if text.trim().is_empty() {
                return Err(Error::InvalidScenario(format!("{name} is required")));
            }
            parse_decimal(text.trim())
                .map_err(|_| Error::InvalidScenario(format!("{name} must be a decimal integer")))
        };
        let values = ScenarioValues {
            p: field("p", &self.p)?,
            g: field("g", &self.g)?,
            alice_private_key: field("Alice's private key", &self.alice_private_key)?,
            bob_private_key: field("Bob's private key", &self.bob_private_key)?,
        };

        if values.p < BigUint::from(3u32) {
            return Err(Error::InvalidScenario("p must be at least 3".to_string()));
        }
        if values.g.is_zero() || values.g >= values.p {
            return Err(Error::InvalidScenario("g must lie in [1, p - 1]".to_string()));
        }
        let upper = &values.p - 2u32;
        for (name, key) in [("Alice", &values.alice_private_key), ("Bob", &values.bob_private_key)] {
            if key.is_zero() || *key > upper {
                return Err(Error::InvalidScenario(format!(
                    "{name}'s private key must lie in [1, p - 2]"
                )));
            }
        }
        Ok(values)
    }

    fn knowledge(&self) -> &str {
        match self.attacker_knowledge.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text,
            _ => DEFAULT_ATTACKER_KNOWLEDGE,
        }
    }
}

/// Structured answer of a narration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackNarration {
    pub attack_description: String,
    pub mitigation_strategies: String,
}

impl AttackNarration {
    fn check(self) -> Result<Self> {
        if self.attack_description.trim().is_empty() {
            return Err(Error::Narration("empty attack description".to_string()));
        }
        if self.mitigation_strategies.trim().is_empty() {
            return Err(Error::Narration("empty mitigation strategies".to_string()));
        }
        Ok(self)
    }
}

/// Render the text-generation prompt for a scenario.
pub fn render_prompt(scenario: &AttackScenario) -> String {
    format!(
        "You are a cybersecurity expert specialising in man-in-the-middle (MitM) attacks \
         on the Diffie-Hellman key exchange.\n\
         \n\
         Given the Diffie-Hellman parameters below and what the attacker may know, describe \
         how a MitM attack can be carried out and suggest mitigation strategies.\n\
         \n\
         Diffie-Hellman parameters:\n\
         Prime (p): {p}\n\
         Generator (g): {g}\n\
         Alice's private key (a): {a}\n\
         Bob's private key (b): {b}\n\
         Attacker knowledge: {knowledge}\n\
         \n\
         Give a detailed description of the attack, including the steps an attacker takes to \
         intercept and manipulate the key exchange. Then suggest ways to prevent it, such as \
         digital signatures or authenticated key exchange protocols.\n\
         \n\
         Answer as JSON with the string fields \"attackDescription\" and \"mitigationStrategies\".\n",
        p = scenario.p.trim(),
        g = scenario.g.trim(),
        a = scenario.alice_private_key.trim(),
        b = scenario.bob_private_key.trim(),
        knowledge = scenario.knowledge(),
    )
}

/// Parse a service response into a narration; both fields must be non-empty.
pub fn parse_narration(text: &str) -> Result<AttackNarration> {
    let narration: AttackNarration =
        serde_json::from_str(text).map_err(|err| Error::Narration(format!("unusable response: {err}")))?;
    narration.check()
}

/// A text-generation backend.
pub trait Narrator {
    fn narrate(&self, scenario: &AttackScenario) -> Result<AttackNarration>;
}

/// Validate the scenario, ask the narrator, and validate its answer.
/// Narrator failures surface as retryable [`Error::Narration`] values.
pub fn request_narration<N: Narrator + ?Sized>(
    narrator: &N,
    scenario: &AttackScenario,
) -> Result<AttackNarration> {
    scenario.validate()?;
    match narrator.narrate(scenario) {
        Ok(narration) => narration.check(),
        Err(err @ Error::Narration(_)) => {
            warn!("narration failed: {err}");
            Err(err)
        }
        Err(err) => {
            warn!("narration failed: {err}");
            Err(Error::Narration(err.to_string()))
        }
    }
}

/// Every value exchanged during an interception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MitmTranscript {
    /// `g^a`, captured by Mallory on its way to Bob.
    pub alice_public: BigUint,
    /// `g^b`, captured by Mallory on its way to Alice.
    pub bob_public: BigUint,
    /// Mallory's private key used against Alice.
    pub mallory_key_for_alice: BigUint,
    /// Mallory's private key used against Bob.
    pub mallory_key_for_bob: BigUint,
    /// Public key Mallory delivers to Alice in Bob's name.
    pub forged_for_alice: BigUint,
    /// Public key Mallory delivers to Bob in Alice's name.
    pub forged_for_bob: BigUint,
    /// Secret Alice believes she shares with Bob; Mallory holds it too.
    pub alice_secret: BigUint,
    /// Secret Bob believes he shares with Alice; Mallory holds it too.
    pub bob_secret: BigUint,
    /// What Alice and Bob would have shared without interference.
    pub honest_secret: BigUint,
}

/// Run the interception with the given Mallory keys.
pub fn intercept(
    values: &ScenarioValues,
    mallory_key_for_alice: BigUint,
    mallory_key_for_bob: BigUint,
) -> Result<MitmTranscript> {
    let ScenarioValues { p, g, .. } = values;
    let a = &values.alice_private_key;
    let b = &values.bob_private_key;

    let alice_public = mod_pow(g, a, p)?;
    let bob_public = mod_pow(g, b, p)?;
    let forged_for_alice = mod_pow(g, &mallory_key_for_alice, p)?;
    let forged_for_bob = mod_pow(g, &mallory_key_for_bob, p)?;

    let alice_secret = mod_pow(&forged_for_alice, a, p)?;
    let bob_secret = mod_pow(&forged_for_bob, b, p)?;
    let honest_secret = mod_pow(&bob_public, a, p)?;

    // Mallory's side of each link must agree with the victim's.
    debug_assert_eq!(mod_pow(&alice_public, &mallory_key_for_alice, p)?, alice_secret);
    debug_assert_eq!(mod_pow(&bob_public, &mallory_key_for_bob, p)?, bob_secret);

    Ok(MitmTranscript {
        alice_public,
        bob_public,
        mallory_key_for_alice,
        mallory_key_for_bob,
        forged_for_alice,
        forged_for_bob,
        alice_secret,
        bob_secret,
        honest_secret,
    })
}

/// Configuration for [`MitmNarrator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MitmConfig {
    /// Optional RNG seed for Mallory's keys.
    pub seed: Option<u64>,
}

/// Offline narrator that computes a real interception transcript.
#[derive(Debug)]
pub struct MitmNarrator {
    keygen: Mutex<KeyGenerator>,
}

impl MitmNarrator {
    /// Mallory's keys are drawn from `config.seed` when present.
    pub fn new(config: &MitmConfig) -> Self {
        MitmNarrator {
            keygen: Mutex::new(KeyGenerator::new(&KeyGenConfig { seed: config.seed })),
        }
    }

    /// Draw Mallory's two keys and run the interception.
    pub fn transcript(&self, scenario: &AttackScenario) -> Result<MitmTranscript> {
        let values = scenario.validate()?;
        let (m1, m2) = {
            let mut keygen = self.keygen.lock();
            (keygen.generate(&values.p)?, keygen.generate(&values.p)?)
        };
        intercept(&values, m1, m2)
    }
}

impl Narrator for MitmNarrator {
    fn narrate(&self, scenario: &AttackScenario) -> Result<AttackNarration> {
        let t = self.transcript(scenario)?;
        debug!("offline MitM transcript computed for p = {}", scenario.p.trim());

        let attack_description = format!(
            "Assumption: {knowledge}\n\
             1. Alice sends A = g^a mod p = {alice_public}. Mallory captures it and keeps it from Bob.\n\
             2. Bob sends B = g^b mod p = {bob_public}. Mallory captures it and keeps it from Alice.\n\
             3. Mallory picks her own exponents {m1} and {m2} and forwards M1 = {forged_a} to Alice \
             as if it came from Bob, and M2 = {forged_b} to Bob as if it came from Alice.\n\
             4. Alice computes M1^a mod p = {alice_secret}; Mallory computes A^{m1} mod p, the same value.\n\
             5. Bob computes M2^b mod p = {bob_secret}; Mallory computes B^{m2} mod p, the same value.\n\
             6. Mallory now decrypts, reads and re-encrypts every message in both directions. \
             Neither side notices, because each one completed what looks like a normal exchange. \
             The secret they would have shared without interference, {honest}, is never used.",
            knowledge = scenario.knowledge(),
            alice_public = t.alice_public,
            bob_public = t.bob_public,
            m1 = t.mallory_key_for_alice,
            m2 = t.mallory_key_for_bob,
            forged_a = t.forged_for_alice,
            forged_b = t.forged_for_bob,
            alice_secret = t.alice_secret,
            bob_secret = t.bob_secret,
            honest = t.honest_secret,
        );
        let mitigation_strategies = "\
            - Authenticate the public values: sign A and B with long-term keys (as in STS or signed TLS key shares).\n\
            - Use an authenticated key exchange protocol instead of anonymous Diffie-Hellman.\n\
            - Compare a fingerprint of the derived secret over an independent channel before trusting it.\n\
            - Pin or certify each party's long-term identity key so a substituted key is detected."
            .to_string();

        AttackNarration {
            attack_description,
            mitigation_strategies,
        }
        .check()
    }
}
