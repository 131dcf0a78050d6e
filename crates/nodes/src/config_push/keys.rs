use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tracing::warn;

use super::{PushError, Result};

pub const KEY_ALGO_RSA: &str = "ssh-rsa";
pub const KEY_ALGO_ECDSA256: &str = "ecdsa-sha2-nistp256";
pub const KEY_ALGO_ECDSA384: &str = "ecdsa-sha2-nistp384";
pub const KEY_ALGO_ECDSA521: &str = "ecdsa-sha2-nistp521";

/// SR OS holds at most this many keys per algorithm for one user.
const SROS_MAX_KEYS_PER_ALGORITHM: usize = 32;

/// One public key from an `authorized_keys` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub algorithm: String,
    /// Base64 wire encoding of the key, as it appears in `authorized_keys`.
    pub blob: String,
    pub comment: Option<String>,
}

impl PublicKey {
    /// Parse `[options] <algorithm> <base64> [comment]`.
    ///
    /// The algorithm named in the line must match the one encoded in the blob.
    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.split_whitespace().peekable();
        if fields.peek().is_some_and(|f| !looks_like_algorithm(f)) {
            fields.next();
        }

        let (Some(algorithm), Some(blob)) = (fields.next(), fields.next()) else {
            return Err(PushError::InvalidKey(format!("malformed line {line:?}")));
        };
        let comment = fields.collect::<Vec<_>>().join(" ");

        let decoded = STANDARD
            .decode(blob)
            .map_err(|e| PushError::InvalidKey(format!("{algorithm}: {e}")))?;
        let embedded = embedded_algorithm(&decoded)
            .ok_or_else(|| PushError::InvalidKey(format!("{algorithm}: truncated key data")))?;
        if embedded != algorithm {
            return Err(PushError::InvalidKey(format!(
                "line says {algorithm}, key data says {embedded}"
            )));
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            blob: blob.to_string(),
            comment: (!comment.is_empty()).then_some(comment),
        })
    }
}

fn looks_like_algorithm(field: &str) -> bool {
    field.starts_with("ssh-") || field.starts_with("ecdsa-") || field.starts_with("sk-")
}

/// The leading length-prefixed string of an SSH public key blob.
fn embedded_algorithm(blob: &[u8]) -> Option<&str> {
    let len_bytes: [u8; 4] = blob.get(..4)?.try_into().ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    std::str::from_utf8(blob.get(4..4 + len)?).ok()
}

/// Parse every key line, skipping blanks and `#` comments. The first
/// malformed line fails the whole set.
pub fn parse_authorized_keys<S: AsRef<str>>(lines: &[S]) -> Result<Vec<PublicKey>> {
    lines
        .iter()
        .map(AsRef::as_ref)
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(PublicKey::parse)
        .collect()
}

/// Template slots keyed by key algorithm.
pub trait KeySlots {
    /// Slot receiving keys of `algorithm`; `None` when unsupported.
    fn slot(&mut self, algorithm: &str) -> Option<&mut Vec<String>>;
}

/// Sort keys into the slots of `T`. Unsupported algorithms are dropped with a
/// warning; duplicates are kept once.
pub fn classify<T: KeySlots + Default>(keys: &[PublicKey]) -> T {
    let mut slots = T::default();
    for key in keys {
        match slots.slot(&key.algorithm) {
            Some(slot) => {
                if !slot.contains(&key.blob) {
                    slot.push(key.blob.clone());
                }
            }
            None => warn!(
                algorithm = %key.algorithm,
                comment = ?key.comment,
                "Unsupported SSH key algorithm, skipping key"
            ),
        }
    }
    slots
}

/// Keys for the SR OS admin user, split by algorithm family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SrosTemplateData {
    pub ssh_pub_keys_rsa: Vec<String>,
    pub ssh_pub_keys_ecdsa: Vec<String>,
}

impl KeySlots for SrosTemplateData {
    fn slot(&mut self, algorithm: &str) -> Option<&mut Vec<String>> {
        match algorithm {
            KEY_ALGO_RSA => Some(&mut self.ssh_pub_keys_rsa),
            KEY_ALGO_ECDSA256 | KEY_ALGO_ECDSA384 | KEY_ALGO_ECDSA521 => {
                Some(&mut self.ssh_pub_keys_ecdsa)
            }
            _ => None,
        }
    }
}

impl SrosTemplateData {
    pub fn from_keys(keys: &[PublicKey]) -> Self {
        let mut data: Self = classify(keys);
        for (family, slot) in [
            ("rsa", &mut data.ssh_pub_keys_rsa),
            ("ecdsa", &mut data.ssh_pub_keys_ecdsa),
        ] {
            if slot.len() > SROS_MAX_KEYS_PER_ALGORITHM {
                warn!(
                    family,
                    count = slot.len(),
                    "Too many SSH keys, keeping the first {}",
                    SROS_MAX_KEYS_PER_ALGORITHM
                );
                slot.truncate(SROS_MAX_KEYS_PER_ALGORITHM);
            }
        }
        data
    }

    pub fn len(&self) -> usize {
        self.ssh_pub_keys_rsa.len() + self.ssh_pub_keys_ecdsa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
