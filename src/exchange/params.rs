//! Built-in Diffie-Hellman parameter catalog.
//!
//! The entries are fixed and ordered from the smallest to the largest modulus.
//! Values are kept exactly as displayed by the simulator UI, so the `bits`
//! label is informational only: the "Simple" modulus is a 256-bit value that
//! is not prime, and the "Medium" and "Strong" moduli are the 1536-bit and
//! 3072-bit MODP primes of RFC 3526. None of this is validated at runtime.

use crate::error::{Error, Result};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// A named `(p, g)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhParameterSet {
    /// Unique display name, used for lookup.
    pub name: String,
    /// Nominal security level shown next to the name.
    pub bits: u32,
    /// The modulus.
    #[serde(with = "crate::exchange::codec::decimal")]
    pub p: BigUint,
    /// The generator.
    #[serde(with = "crate::exchange::codec::decimal")]
    pub g: BigUint,
}

struct CatalogEntry {
    name: &'static str,
    bits: u32,
    p_hex: &'static str,
    g_hex: &'static str,
}

const CATALOG: [CatalogEntry; 4] = [
    CatalogEntry {
        name: "Toy (Very Fast)",
        bits: 8,
        p_hex: "17",
        g_hex: "5",
    },
    CatalogEntry {
        name: "Simple (Fast)",
        bits: 64,
        p_hex: "B10B8F96A080E01DDE92DE5EAE5D54EC52C99FBCFB06A3C69A6A9DCA52D23B61",
        g_hex: "A4D1CBD5C3FD34126765A442EFB99905F8104DD258AC507FD6406CFF14266D31",
    },
    CatalogEntry {
        name: "Medium (512-bit)",
        bits: 512,
        p_hex: concat!(
            "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74",
            "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437",
            "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
            "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05",
            "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB",
            "9ED529077096966D670C354E4ABC9804F1746C08CA237327FFFFFFFFFFFFFFFF",
        ),
        g_hex: "2",
    },
    CatalogEntry {
        name: "Strong (1024-bit)",
        bits: 1024,
        p_hex: concat!(
            "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74",
            "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437",
            "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
            "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05",
            "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB",
            "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
            "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
            "3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D04507A33",
            "A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7",
            "ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6BF12FFA06D98A0864",
            "D87602733EC86A64521F2B18177B200CBBE117577A615D6C770988C0BAD946E2",
            "08E24FA074E5AB3143DB5BFCE0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF",
        ),
        g_hex: "2",
    },
];

impl CatalogEntry {
    fn to_parameter_set(&self) -> DhParameterSet {
        // The table above is fixed hex text; parsing cannot fail.
        let parse = |hex: &str| BigUint::parse_bytes(hex.as_bytes(), 16).expect("catalog constant is valid hex");
        DhParameterSet {
            name: self.name.to_string(),
            bits: self.bits,
            p: parse(self.p_hex),
            g: parse(self.g_hex),
        }
    }
}

/// Returns every catalog entry in display order.
pub fn catalog() -> Vec<DhParameterSet> {
    CATALOG.iter().map(CatalogEntry::to_parameter_set).collect()
}

/// Names of the catalog entries, in display order.
pub fn parameter_set_names() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|entry| entry.name)
}

/// Exact-match lookup by name. Returns `None` when no entry matches.
pub fn lookup_parameter_set(name: &str) -> Option<DhParameterSet> {
    CATALOG
        .iter()
        .find(|entry| entry.name == name)
        .map(CatalogEntry::to_parameter_set)
}

/// Like [`lookup_parameter_set`], but a missing name is an [`Error::ParameterSetNotFound`].
pub fn require_parameter_set(name: &str) -> Result<DhParameterSet> {
    lookup_parameter_set(name).ok_or_else(|| Error::ParameterSetNotFound(name.to_string()))
}
