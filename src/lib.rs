//! An educational Diffie-Hellman key exchange simulator.
//!
//! - [`exchange`]: modular exponentiation, key generation, the parameter
//!   catalog, the two-party session state machine and its JSON form
//! - [`room`]: a replicated two-participant exchange where private keys stay local
//! - [`narration`]: man-in-the-middle attack scenarios for a text-generation backend
//!
//! Nothing in this crate is fit for protecting real data.

pub mod error;
pub mod exchange;
pub mod narration;
pub mod room;

pub use error::{Error, Result};
pub use exchange::{ExchangeSession, Party, Step, Transition, Verification};
