//! Canonical in-memory key representation and SSH wire encodings.
//!
//! Every container format decodes into an [`SshKey`]; everything handed
//! to the agent (public blobs for list/remove, the private payload for
//! add) is encoded from it.  Integers are held as unsigned big-endian
//! bytes with leading zeros stripped, so re-encoding is canonical and
//! fingerprints are independent of the container a key came from.

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::DecodeError;
use crate::wire::{Reader, Writer};

/// The NIST curves usable with `ecdsa-sha2-*` keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    /// The curve identifier embedded in blobs (`nistp256`, …).
    pub fn curve_name(&self) -> &'static str {
        match self {
            Self::P256 => "nistp256",
            Self::P384 => "nistp384",
            Self::P521 => "nistp521",
        }
    }

    /// The SSH key type (`ecdsa-sha2-nistp256`, …).
    pub fn key_type(&self) -> &'static str {
        match self {
            Self::P256 => "ecdsa-sha2-nistp256",
            Self::P384 => "ecdsa-sha2-nistp384",
            Self::P521 => "ecdsa-sha2-nistp521",
        }
    }

    pub fn from_curve_name(name: &str) -> Option<Self> {
        match name {
            "nistp256" => Some(Self::P256),
            "nistp384" => Some(Self::P384),
            "nistp521" => Some(Self::P521),
            _ => None,
        }
    }

    pub fn from_key_type(name: &str) -> Option<Self> {
        match name {
            "ecdsa-sha2-nistp256" => Some(Self::P256),
            "ecdsa-sha2-nistp384" => Some(Self::P384),
            "ecdsa-sha2-nistp521" => Some(Self::P521),
            _ => None,
        }
    }

    /// Length of an uncompressed SEC1 point for this curve.
    pub fn point_len(&self) -> usize {
        match self {
            Self::P256 => 65,
            Self::P384 => 97,
            Self::P521 => 133,
        }
    }
}

/// `SHA256:`-prefixed digest of a public key's canonical blob.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of an SSH wire-format public key blob.
    ///
    /// Works on any blob, including key types this codec cannot fully
    /// parse — the digest covers the raw bytes.
    pub fn of_blob(blob: &[u8]) -> Self {
        let digest = Sha256::digest(blob);
        Self(format!("SHA256:{}", STANDARD_NO_PAD.encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public half of a key, by algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa { e: Vec<u8>, n: Vec<u8> },
    Dsa { p: Vec<u8>, q: Vec<u8>, g: Vec<u8>, y: Vec<u8> },
    Ecdsa { curve: EcCurve, point: Vec<u8> },
    Ed25519 { key: [u8; 32] },
}

impl PublicKey {
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Rsa { .. } => "ssh-rsa",
            Self::Dsa { .. } => "ssh-dss",
            Self::Ecdsa { curve, .. } => curve.key_type(),
            Self::Ed25519 { .. } => "ssh-ed25519",
        }
    }

    /// Canonical SSH wire-format public key blob.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_str(self.algorithm());
        match self {
            Self::Rsa { e, n } => {
                w.put_mpint(e);
                w.put_mpint(n);
            }
            Self::Dsa { p, q, g, y } => {
                w.put_mpint(p);
                w.put_mpint(q);
                w.put_mpint(g);
                w.put_mpint(y);
            }
            Self::Ecdsa { curve, point } => {
                w.put_str(curve.curve_name());
                w.put_string(point);
            }
            Self::Ed25519 { key } => {
                w.put_string(key);
            }
        }
        w.into_bytes()
    }

    /// Parse an SSH wire-format public key blob.
    pub fn from_blob(blob: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(blob);
        let algorithm = r
            .read_str()
            .map_err(|_| DecodeError::malformed("public key blob header"))?
            .to_string();
        let key = Self::read_body(&mut r, &algorithm)?;
        if !r.is_empty() {
            return Err(DecodeError::malformed("trailing bytes in public key blob"));
        }
        Ok(key)
    }

    /// Read the algorithm-specific body of a public key, the type name
    /// having already been consumed.
    pub(crate) fn read_body(r: &mut Reader<'_>, algorithm: &str) -> Result<Self, DecodeError> {
        let eof = |_| DecodeError::malformed("truncated public key");
        match algorithm {
            "ssh-rsa" => {
                let e = r.read_mpint().map_err(eof)?.to_vec();
                let n = r.read_mpint().map_err(eof)?.to_vec();
                Ok(Self::Rsa { e, n })
            }
            "ssh-dss" => {
                let p = r.read_mpint().map_err(eof)?.to_vec();
                let q = r.read_mpint().map_err(eof)?.to_vec();
                let g = r.read_mpint().map_err(eof)?.to_vec();
                let y = r.read_mpint().map_err(eof)?.to_vec();
                Ok(Self::Dsa { p, q, g, y })
            }
            "ssh-ed25519" => {
                let raw = r.read_string().map_err(eof)?;
                let key: [u8; 32] = raw
                    .try_into()
                    .map_err(|_| DecodeError::malformed("ed25519 public key length"))?;
                Ok(Self::Ed25519 { key })
            }
            name => match EcCurve::from_key_type(name) {
                Some(curve) => {
                    let curve_name = r.read_str().map_err(eof)?;
                    if curve_name != curve.curve_name() {
                        return Err(DecodeError::malformed("ecdsa curve name mismatch"));
                    }
                    let point = r.read_string().map_err(eof)?;
                    if point.len() != curve.point_len() || point.first() != Some(&0x04) {
                        return Err(DecodeError::malformed("ecdsa point encoding"));
                    }
                    Ok(Self::Ecdsa { curve, point: point.to_vec() })
                }
                None => Err(DecodeError::UnsupportedAlgorithm(name.to_string())),
            },
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_blob(&self.to_blob())
    }
}

/// Private half of a key.  Integer fields are zeroized on drop.
pub enum PrivateParts {
    Rsa {
        d: Zeroizing<Vec<u8>>,
        iqmp: Zeroizing<Vec<u8>>,
        p: Zeroizing<Vec<u8>>,
        q: Zeroizing<Vec<u8>>,
    },
    Dsa {
        x: Zeroizing<Vec<u8>>,
    },
    Ecdsa {
        scalar: Zeroizing<Vec<u8>>,
    },
    Ed25519 {
        seed: Zeroizing<[u8; 32]>,
    },
}

impl std::fmt::Debug for PrivateParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Rsa { .. } => "Rsa",
            Self::Dsa { .. } => "Dsa",
            Self::Ecdsa { .. } => "Ecdsa",
            Self::Ed25519 { .. } => "Ed25519",
        };
        write!(f, "PrivateParts::{name}([redacted])")
    }
}

impl PrivateParts {
    fn pairs_with(&self, public: &PublicKey) -> bool {
        matches!(
            (self, public),
            (Self::Rsa { .. }, PublicKey::Rsa { .. })
                | (Self::Dsa { .. }, PublicKey::Dsa { .. })
                | (Self::Ecdsa { .. }, PublicKey::Ecdsa { .. })
                | (Self::Ed25519 { .. }, PublicKey::Ed25519 { .. })
        )
    }
}

/// A fully decoded private key: public material, private material, and
/// the container's comment (possibly empty).
pub struct SshKey {
    public: PublicKey,
    private: PrivateParts,
    comment: String,
}

impl std::fmt::Debug for SshKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshKey")
            .field("algorithm", &self.algorithm())
            .field("fingerprint", &self.fingerprint())
            .field("comment", &self.comment)
            .finish_non_exhaustive()
    }
}

impl SshKey {
    /// Assemble a key from its halves.  Fails when the two halves are
    /// for different algorithms.
    pub fn new(
        public: PublicKey,
        private: PrivateParts,
        comment: String,
    ) -> Result<Self, DecodeError> {
        if !private.pairs_with(&public) {
            return Err(DecodeError::malformed(
                "public and private key algorithms disagree",
            ));
        }
        Ok(Self { public, private, comment })
    }

    pub fn algorithm(&self) -> &'static str {
        self.public.algorithm()
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn public_blob(&self) -> Vec<u8> {
        self.public.to_blob()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.public.fingerprint()
    }

    /// Key-type name plus algorithm-specific fields in the agent
    /// add-identity order.  The caller appends comment and constraints.
    pub fn agent_key_payload(&self) -> Zeroizing<Vec<u8>> {
        let mut w = Writer::new();
        w.put_str(self.algorithm());
        match (&self.public, &self.private) {
            (PublicKey::Rsa { e, n }, PrivateParts::Rsa { d, iqmp, p, q }) => {
                w.put_mpint(n);
                w.put_mpint(e);
                w.put_mpint(d);
                w.put_mpint(iqmp);
                w.put_mpint(p);
                w.put_mpint(q);
            }
            (PublicKey::Dsa { p, q, g, y }, PrivateParts::Dsa { x }) => {
                w.put_mpint(p);
                w.put_mpint(q);
                w.put_mpint(g);
                w.put_mpint(y);
                w.put_mpint(x);
            }
            (PublicKey::Ecdsa { curve, point }, PrivateParts::Ecdsa { scalar }) => {
                w.put_str(curve.curve_name());
                w.put_string(point);
                w.put_mpint(scalar);
            }
            (PublicKey::Ed25519 { key }, PrivateParts::Ed25519 { seed }) => {
                w.put_string(key);
                let mut sk = Zeroizing::new([0u8; 64]);
                sk[..32].copy_from_slice(&seed[..]);
                sk[32..].copy_from_slice(key);
                w.put_string(&sk[..]);
            }
            // new() enforces the pairing
            _ => unreachable!("mismatched key halves"),
        }
        Zeroizing::new(w.into_bytes())
    }

    #[cfg(test)]
    pub(crate) fn private_parts_for_tests(&self) -> &PrivateParts {
        &self.private
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Textbook toy RSA key: p=61, q=53, n=3233, e=17, d=2753, iqmp=38.
    /// Structurally a complete keypair; small enough to verify by hand.
    pub fn rsa_key(comment: &str) -> SshKey {
        SshKey::new(
            PublicKey::Rsa {
                e: vec![0x11],
                n: vec![0x0c, 0xa1],
            },
            PrivateParts::Rsa {
                d: Zeroizing::new(vec![0x0a, 0xc1]),
                iqmp: Zeroizing::new(vec![0x26]),
                p: Zeroizing::new(vec![0x3d]),
                q: Zeroizing::new(vec![0x35]),
            },
            comment.to_string(),
        )
        .unwrap()
    }

    pub fn dsa_key() -> SshKey {
        SshKey::new(
            PublicKey::Dsa {
                p: vec![0x7f, 0xff],
                q: vec![0x3b],
                g: vec![0x02],
                y: vec![0x1e, 0x40],
            },
            PrivateParts::Dsa {
                x: Zeroizing::new(vec![0x17]),
            },
            String::new(),
        )
        .unwrap()
    }

    pub fn ecdsa_key() -> SshKey {
        let mut point = vec![0x04];
        point.extend_from_slice(&[0xab; 64]);
        SshKey::new(
            PublicKey::Ecdsa { curve: EcCurve::P256, point },
            PrivateParts::Ecdsa {
                scalar: Zeroizing::new(vec![0x55; 32]),
            },
            "ecdsa test key".to_string(),
        )
        .unwrap()
    }

    pub fn ed25519_key(comment: &str) -> SshKey {
        SshKey::new(
            PublicKey::Ed25519 { key: [0x42; 32] },
            PrivateParts::Ed25519 {
                seed: Zeroizing::new([0x07; 32]),
            },
            comment.to_string(),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;

    #[test]
    fn public_blob_roundtrip_preserves_fingerprint() {
        let keys = [
            fixtures::rsa_key("a"),
            fixtures::dsa_key(),
            fixtures::ecdsa_key(),
            fixtures::ed25519_key("b"),
        ];
        for key in &keys {
            let blob = key.public_blob();
            let reparsed = PublicKey::from_blob(&blob).unwrap();
            assert_eq!(reparsed.fingerprint(), key.fingerprint());
            assert_eq!(reparsed, *key.public());
        }
    }

    #[test]
    fn fingerprint_has_sha256_prefix_and_no_padding() {
        let fp = fixtures::ed25519_key("x").fingerprint();
        assert!(fp.as_str().starts_with("SHA256:"));
        assert!(!fp.as_str().ends_with('='));
    }

    #[test]
    fn fingerprint_is_format_independent() {
        // A non-canonical blob (sign-padded mpint) of the toy RSA key must
        // land on the same fingerprint once reparsed and re-encoded.
        let mut w = Writer::new();
        w.put_str("ssh-rsa");
        w.put_string(&[0x00, 0x11]); // e with redundant leading zero
        w.put_string(&[0x00, 0x0c, 0xa1]);
        let padded = w.into_bytes();

        let canonical = fixtures::rsa_key("").public_blob();
        assert_ne!(padded, canonical);

        let reparsed = PublicKey::from_blob(&padded).unwrap();
        assert_eq!(reparsed.fingerprint(), Fingerprint::of_blob(&canonical));
    }

    #[test]
    fn rsa_agent_payload_field_order() {
        let key = fixtures::rsa_key("toy");
        let payload = key.agent_key_payload();
        let mut r = Reader::new(&payload);
        assert_eq!(r.read_str().unwrap(), "ssh-rsa");
        assert_eq!(r.read_mpint().unwrap(), [0x0c, 0xa1]); // n
        assert_eq!(r.read_mpint().unwrap(), [0x11]); // e
        assert_eq!(r.read_mpint().unwrap(), [0x0a, 0xc1]); // d
        assert_eq!(r.read_mpint().unwrap(), [0x26]); // iqmp
        assert_eq!(r.read_mpint().unwrap(), [0x3d]); // p
        assert_eq!(r.read_mpint().unwrap(), [0x35]); // q
        assert!(r.is_empty());
    }

    #[test]
    fn ed25519_agent_payload_carries_seed_then_public() {
        let key = fixtures::ed25519_key("");
        let payload = key.agent_key_payload();
        let mut r = Reader::new(&payload);
        assert_eq!(r.read_str().unwrap(), "ssh-ed25519");
        assert_eq!(r.read_string().unwrap(), [0x42; 32]);
        let sk = r.read_string().unwrap();
        assert_eq!(&sk[..32], [0x07; 32]);
        assert_eq!(&sk[32..], [0x42; 32]);
    }

    #[test]
    fn unknown_algorithm_is_unsupported() {
        let mut w = Writer::new();
        w.put_str("sk-ssh-ed25519@openssh.com");
        w.put_string(&[0; 32]);
        let err = PublicKey::from_blob(&w.into_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn mismatched_halves_rejected() {
        let err = SshKey::new(
            PublicKey::Ed25519 { key: [0; 32] },
            PrivateParts::Dsa {
                x: Zeroizing::new(vec![1]),
            },
            String::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::MalformedContainer(_)));
    }
}
