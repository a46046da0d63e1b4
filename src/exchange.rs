//! Diffie-Hellman key exchange core.
//!
//! DISCLAIMER: this is a teaching simulator. Keys are drawn from a
//! non-cryptographic source and nothing here is constant-time. Absolutely DO
//! NOT use it for real cryptographic or security-sensitive operations.
//!
//! - [`mod_pow`]: square-and-multiply modular exponentiation
//! - [`KeyGenerator`]: private keys in `[1, p - 2]`
//! - [`catalog`]: the built-in `(p, g)` parameter sets
//! - [`ExchangeSession`]: the two-party state machine
//! - [`codec`]: lossless JSON text form of a session
//!
//! # Examples
//!
//! ```rust
//! use dhsim::exchange::{require_parameter_set, ExchangeSession, KeyGenConfig, KeyGenerator, Party, Verification};
//!
//! let mut keygen = KeyGenerator::new(&KeyGenConfig { seed: Some(1) });
//! let session = ExchangeSession::new().set_parameters(require_parameter_set("Toy (Very Fast)").unwrap());
//! let session = session.generate_private_key(Party::Alice, &mut keygen).unwrap().into_session();
//! let session = session.generate_private_key(Party::Bob, &mut keygen).unwrap().into_session();
//! let session = session.exchange().unwrap().into_session();
//! assert_eq!(session.verify(), Verification::Match);
//! ```

pub mod codec;
pub mod keygen;
pub mod modpow;
pub mod params;
pub mod session;

pub use codec::{from_json, to_json, to_pretty_json, validate_session, SCHEMA_VERSION};
pub use keygen::{generate_private_key, KeyGenConfig, KeyGenerator};
pub use modpow::mod_pow;
pub use params::{catalog, lookup_parameter_set, parameter_set_names, require_parameter_set, DhParameterSet};
pub use session::{ExchangeSession, Party, PartyState, Precondition, Step, Transition, Verification};
