//! Immutable credential snapshots.

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A single credential entry, holding whatever material the codec produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credential {
    /// A private key with its certificate chain (leaf first).
    PrivateKey {
        /// Encoded key material
        #[serde(deserialize_with = "material")]
        key: String,
        /// Encoded certificates, leaf first
        #[serde(default)]
        certificate_chain: Vec<String>,
    },
    /// A trusted certificate with no private key.
    TrustedCertificate {
        /// Encoded certificate
        #[serde(deserialize_with = "material")]
        certificate: String,
    },
    /// A symmetric secret key.
    SecretKey {
        /// Encoded key material
        #[serde(deserialize_with = "material")]
        key: String,
    },
}

/// Accept encoded material only as a string, never a coerced number or bool.
fn material<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct MaterialVisitor;

    impl Visitor<'_> for MaterialVisitor {
        type Value = String;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("quoted key material string")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_string<E: de::Error>(self, value: String) -> Result<String, E> {
            Ok(value)
        }
    }

    deserializer.deserialize_str(MaterialVisitor)
}

impl Credential {
    /// Whether this entry holds key material.
    pub fn is_key_entry(&self) -> bool {
        matches!(self, Self::PrivateKey { .. } | Self::SecretKey { .. })
    }

    /// Whether this entry is a trusted certificate.
    pub fn is_certificate_entry(&self) -> bool {
        matches!(self, Self::TrustedCertificate { .. })
    }

    /// Certificates held by this entry; empty for secret keys.
    pub fn certificate_chain(&self) -> &[String] {
        match self {
            Self::PrivateKey {
                certificate_chain, ..
            } => certificate_chain,
            Self::TrustedCertificate { certificate } => std::slice::from_ref(certificate),
            Self::SecretKey { .. } => &[],
        }
    }
}

/// One fully-parsed, immutable view of a credential store.
///
/// Snapshots are never modified after construction; a reload builds a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialSnapshot {
    entries: BTreeMap<String, Credential>,
    loaded_at: DateTime<Utc>,
}

impl CredentialSnapshot {
    /// Create a snapshot from parsed entries.
    pub fn new(entries: BTreeMap<String, Credential>) -> Self {
        Self {
            entries,
            loaded_at: Utc::now(),
        }
    }

    /// Whether an entry exists for `alias`.
    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    /// The entry for `alias`, if any.
    pub fn get(&self, alias: &str) -> Option<&Credential> {
        self.entries.get(alias)
    }

    /// All aliases, in sorted order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// When this snapshot was parsed.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

impl FromIterator<(String, Credential)> for CredentialSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, Credential)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(key: &str) -> Credential {
        Credential::SecretKey {
            key: key.to_string(),
        }
    }

    #[test]
    fn test_material_must_be_a_string() {
        let parsed: Credential =
            serde_json::from_str(r#"{"kind": "secret_key", "key": "0123"}"#).unwrap();
        assert_eq!(parsed, secret("0123"));

        let err = serde_json::from_str::<Credential>(r#"{"kind": "secret_key", "key": 123}"#)
            .unwrap_err();
        assert!(err.to_string().contains("quoted key material"), "{err}");

        assert!(
            serde_json::from_str::<Credential>(
                r#"{"kind": "trusted_certificate", "certificate": true}"#
            )
            .is_err()
        );
    }

    #[test]
    fn test_lookup() {
        let snapshot: CredentialSnapshot = [
            ("default".to_string(), secret("a")),
            ("backup".to_string(), secret("b")),
        ]
        .into_iter()
        .collect();

        assert!(snapshot.contains("default"));
        assert!(!snapshot.contains("test"));
        assert_eq!(snapshot.get("backup"), Some(&secret("b")));
        assert_eq!(snapshot.aliases().collect::<Vec<_>>(), ["backup", "default"]);
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_credential_kinds() {
        let pk = Credential::PrivateKey {
            key: "k".to_string(),
            certificate_chain: vec!["leaf".to_string()],
        };
        let cert = Credential::TrustedCertificate {
            certificate: "root".to_string(),
        };

        assert!(pk.is_key_entry());
        assert!(!pk.is_certificate_entry());
        assert!(cert.is_certificate_entry());
        assert_eq!(cert.certificate_chain(), ["root"]);
        assert!(secret("s").certificate_chain().is_empty());
    }
}
