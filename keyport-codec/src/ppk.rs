//! PuTTY private key files (PPK versions 2 and 3).
//!
//! Text container with base64 public/private blobs and a keyed MAC over
//! the whole key.  The MAC is verified before any decrypted field is
//! trusted; a mismatch on an encrypted key means the passphrase is wrong,
//! on an unencrypted key that the file was tampered with.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{
    Cipher, hmac_sha1, hmac_sha256, mac_matches, ppk_v2_cipher_key, ppk_v2_mac_key, ppk_v3_derive,
};
use crate::error::DecodeError;
use crate::key::{PrivateParts, PublicKey, SshKey};
use crate::wire::{Reader, Writer};

pub const HEADER_PREFIX: &str = "PuTTY-User-Key-File-";

struct PpkFile {
    version: u8,
    algorithm: String,
    encryption: String,
    comment: String,
    public_blob: Vec<u8>,
    private_blob: Zeroizing<Vec<u8>>,
    mac: Vec<u8>,
    argon2: Option<Argon2Params>,
}

struct Argon2Params {
    flavour: argon2::Algorithm,
    memory_kib: u32,
    passes: u32,
    parallelism: u32,
    salt: Vec<u8>,
}

/// Decode a PPK container.
pub fn decode(text: &str, passphrase: Option<&str>) -> Result<SshKey, DecodeError> {
    let file = parse_file(text)?;

    let encrypted = match file.encryption.as_str() {
        "none" => false,
        "aes256-cbc" => true,
        other => return Err(DecodeError::UnsupportedCipher(other.to_string())),
    };
    if encrypted && passphrase.is_none() {
        return Err(DecodeError::PassphraseRequired);
    }
    let passphrase = passphrase.unwrap_or("");

    // key material: cipher key + IV + MAC key, per version
    let (cipher_key, iv, mac_key): (Zeroizing<Vec<u8>>, Vec<u8>, Zeroizing<Vec<u8>>) =
        match file.version {
            2 => (
                Zeroizing::new(ppk_v2_cipher_key(passphrase.as_bytes()).to_vec()),
                vec![0u8; 16],
                Zeroizing::new(ppk_v2_mac_key(passphrase.as_bytes()).to_vec()),
            ),
            3 => match &file.argon2 {
                Some(params) => {
                    let (ck, iv, mk) = ppk_v3_derive(
                        params.flavour,
                        params.memory_kib,
                        params.passes,
                        params.parallelism,
                        &params.salt,
                        passphrase.as_bytes(),
                    )
                    .map_err(|e| DecodeError::malformed(e.to_string()))?;
                    (
                        Zeroizing::new(ck.to_vec()),
                        iv.to_vec(),
                        Zeroizing::new(mk.to_vec()),
                    )
                }
                // unencrypted v3 keys MAC with an empty key
                None if !encrypted => {
                    (Zeroizing::new(Vec::new()), Vec::new(), Zeroizing::new(Vec::new()))
                }
                None => return Err(DecodeError::malformed("encrypted PPK v3 without Argon2 headers")),
            },
            v => {
                return Err(DecodeError::malformed(format!(
                    "unsupported PPK version {v}"
                )));
            }
        };

    let mut private = file.private_blob.clone();
    if encrypted {
        Cipher::Aes256Cbc
            .decrypt_in_place(&cipher_key, &iv, &mut private)
            .map_err(|e| DecodeError::malformed(e.to_string()))?;
    }

    // MAC covers the decrypted private blob; verify before parsing it
    let mac_data = mac_payload(
        &file.algorithm,
        &file.encryption,
        &file.comment,
        &file.public_blob,
        &private,
    );
    let computed: Vec<u8> = match file.version {
        2 => hmac_sha1(&mac_key, &mac_data).to_vec(),
        _ => hmac_sha256(&mac_key, &mac_data).to_vec(),
    };
    if !mac_matches(&computed, &file.mac) {
        return if encrypted {
            Err(DecodeError::WrongPassphrase)
        } else {
            Err(DecodeError::malformed("PPK MAC mismatch on unencrypted key"))
        };
    }

    let public = PublicKey::from_blob(&file.public_blob)?;
    if public.algorithm() != file.algorithm {
        return Err(DecodeError::malformed("PPK header and blob algorithms disagree"));
    }
    let private_parts = read_private_blob(&public, &private)?;

    debug!(algorithm = %file.algorithm, version = file.version, encrypted, "decoded PPK key");
    SshKey::new(public, private_parts, file.comment)
}

/// Extract the public key; the public blob is plaintext in every PPK.
pub fn decode_public(text: &str) -> Result<PublicKey, DecodeError> {
    let file = parse_file(text)?;
    PublicKey::from_blob(&file.public_blob)
}

pub(crate) fn mac_payload(
    algorithm: &str,
    encryption: &str,
    comment: &str,
    public_blob: &[u8],
    private_plain: &[u8],
) -> Vec<u8> {
    let mut w = Writer::new();
    w.put_str(algorithm);
    w.put_str(encryption);
    w.put_str(comment);
    w.put_string(public_blob);
    w.put_string(private_plain);
    w.into_bytes()
}

fn parse_file(text: &str) -> Result<PpkFile, DecodeError> {
    let mut lines = text.lines().map(str::trim_end);

    let first = lines
        .next()
        .ok_or_else(|| DecodeError::malformed("empty PPK input"))?;
    let (version, algorithm) = first
        .strip_prefix(HEADER_PREFIX)
        .and_then(|rest| rest.split_once(':'))
        .ok_or_else(|| DecodeError::malformed("missing PPK header line"))?;
    let version: u8 = version
        .parse()
        .map_err(|_| DecodeError::malformed("PPK version is not a number"))?;
    let algorithm = algorithm.trim().to_string();

    let mut encryption = None;
    let mut comment = String::new();
    let mut public_blob = None;
    let mut private_blob = None;
    let mut mac = None;
    let mut kdf_name = None;
    let mut memory_kib = None;
    let mut passes = None;
    let mut parallelism = None;
    let mut salt = None;

    while let Some(line) = lines.next() {
        let Some((name, value)) = line.split_once(':') else {
            return Err(DecodeError::malformed("stray line in PPK file"));
        };
        let value = value.trim();
        match name {
            "Encryption" => encryption = Some(value.to_string()),
            "Comment" => comment = value.to_string(),
            "Public-Lines" => public_blob = Some(read_blob(&mut lines, value)?),
            "Private-Lines" => {
                private_blob = Some(Zeroizing::new(read_blob(&mut lines, value)?))
            }
            "Private-MAC" => {
                mac = Some(
                    hex::decode(value)
                        .map_err(|_| DecodeError::malformed("Private-MAC is not hex"))?,
                )
            }
            "Key-Derivation" => kdf_name = Some(value.to_string()),
            "Argon2-Memory" => memory_kib = Some(parse_u32(value)?),
            "Argon2-Passes" => passes = Some(parse_u32(value)?),
            "Argon2-Parallelism" => parallelism = Some(parse_u32(value)?),
            "Argon2-Salt" => {
                salt = Some(
                    hex::decode(value)
                        .map_err(|_| DecodeError::malformed("Argon2-Salt is not hex"))?,
                )
            }
            _ => {} // headers this codec does not use (e.g. v3 Key-Derivation extras)
        }
    }

    let argon2 = match kdf_name {
        None => None,
        Some(name) => {
            let flavour = match name.as_str() {
                "Argon2id" => argon2::Algorithm::Argon2id,
                "Argon2i" => argon2::Algorithm::Argon2i,
                "Argon2d" => argon2::Algorithm::Argon2d,
                other => return Err(DecodeError::UnsupportedKdf(other.to_string())),
            };
            Some(Argon2Params {
                flavour,
                memory_kib: memory_kib
                    .ok_or_else(|| DecodeError::malformed("missing Argon2-Memory"))?,
                passes: passes.ok_or_else(|| DecodeError::malformed("missing Argon2-Passes"))?,
                parallelism: parallelism
                    .ok_or_else(|| DecodeError::malformed("missing Argon2-Parallelism"))?,
                salt: salt.ok_or_else(|| DecodeError::malformed("missing Argon2-Salt"))?,
            })
        }
    };

    Ok(PpkFile {
        version,
        algorithm,
        encryption: encryption
            .ok_or_else(|| DecodeError::malformed("missing Encryption header"))?,
        comment,
        public_blob: public_blob
            .ok_or_else(|| DecodeError::malformed("missing Public-Lines"))?,
        private_blob: private_blob
            .ok_or_else(|| DecodeError::malformed("missing Private-Lines"))?,
        mac: mac.ok_or_else(|| DecodeError::malformed("missing Private-MAC"))?,
        argon2,
    })
}

fn parse_u32(value: &str) -> Result<u32, DecodeError> {
    value
        .parse()
        .map_err(|_| DecodeError::malformed("Argon2 parameter is not a number"))
}

fn read_blob<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    count: &str,
) -> Result<Vec<u8>, DecodeError> {
    let count: usize = count
        .parse()
        .map_err(|_| DecodeError::malformed("blob line count is not a number"))?;
    let mut b64 = String::new();
    for _ in 0..count {
        let line = lines
            .next()
            .ok_or_else(|| DecodeError::malformed("truncated blob lines"))?;
        b64.push_str(line.trim());
    }
    BASE64_STANDARD
        .decode(&b64)
        .map_err(|_| DecodeError::malformed("blob is not base64"))
}

/// Algorithm-specific private fields.  PPK stores only the private half
/// here; the public half comes from the public blob.
fn read_private_blob(public: &PublicKey, blob: &[u8]) -> Result<PrivateParts, DecodeError> {
    let mut r = Reader::new(blob);
    let eof = |_| DecodeError::malformed("truncated PPK private blob");
    // remaining bytes after the fields are random block padding, covered
    // by the MAC and ignored here
    match public {
        PublicKey::Rsa { .. } => {
            let d = Zeroizing::new(r.read_mpint().map_err(eof)?.to_vec());
            let p = Zeroizing::new(r.read_mpint().map_err(eof)?.to_vec());
            let q = Zeroizing::new(r.read_mpint().map_err(eof)?.to_vec());
            let iqmp = Zeroizing::new(r.read_mpint().map_err(eof)?.to_vec());
            Ok(PrivateParts::Rsa { d, iqmp, p, q })
        }
        PublicKey::Dsa { .. } => {
            let x = Zeroizing::new(r.read_mpint().map_err(eof)?.to_vec());
            Ok(PrivateParts::Dsa { x })
        }
        PublicKey::Ecdsa { .. } => {
            let scalar = Zeroizing::new(r.read_mpint().map_err(eof)?.to_vec());
            Ok(PrivateParts::Ecdsa { scalar })
        }
        PublicKey::Ed25519 { .. } => {
            // PPK stores the seed as a little-endian integer re-encoded as
            // a big-endian mpint; undo both steps
            let be = r.read_mpint().map_err(eof)?;
            if be.len() > 32 {
                return Err(DecodeError::malformed("ed25519 private integer too large"));
            }
            let mut seed = Zeroizing::new([0u8; 32]);
            for (i, &b) in be.iter().rev().enumerate() {
                seed[i] = b;
            }
            Ok(PrivateParts::Ed25519 { seed })
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Forward-direction PPK writers for fixtures.

    use super::*;
    use crate::key::SshKey;
    use crate::openssh::test_support::encrypt_in_place;

    fn write_private_fields(key: &SshKey) -> Vec<u8> {
        let mut w = Writer::new();
        match key.private_parts_for_tests() {
            PrivateParts::Rsa { d, iqmp, p, q } => {
                w.put_mpint(d);
                w.put_mpint(p);
                w.put_mpint(q);
                w.put_mpint(iqmp);
            }
            PrivateParts::Dsa { x } => w.put_mpint(x),
            PrivateParts::Ecdsa { scalar } => w.put_mpint(scalar),
            PrivateParts::Ed25519 { seed } => {
                // big-endian mpint of the little-endian seed integer
                let be: Vec<u8> = seed.iter().rev().copied().collect();
                w.put_mpint(&be);
            }
        }
        w.into_bytes()
    }

    fn emit_blob(out: &mut String, header: &str, blob: &[u8]) {
        let b64 = BASE64_STANDARD.encode(blob);
        let lines: Vec<&[u8]> = b64.as_bytes().chunks(64).collect();
        out.push_str(&format!("{header}: {}\n", lines.len()));
        for line in lines {
            out.push_str(std::str::from_utf8(line).unwrap());
            out.push('\n');
        }
    }

    pub fn build_v2(key: &SshKey, passphrase: Option<&str>) -> String {
        let algorithm = key.algorithm();
        let encryption = if passphrase.is_some() { "aes256-cbc" } else { "none" };
        let public_blob = key.public_blob();

        let mut private = write_private_fields(key);
        if passphrase.is_some() {
            let mut pad = 0xa5u8;
            while private.len() % 16 != 0 {
                private.push(pad);
                pad = pad.wrapping_add(1);
            }
        }

        let mac_key = ppk_v2_mac_key(passphrase.unwrap_or("").as_bytes());
        let mac_data = mac_payload(algorithm, encryption, key.comment(), &public_blob, &private);
        let mac = hmac_sha1(&mac_key[..], &mac_data);

        let mut enc_private = private.clone();
        if let Some(pw) = passphrase {
            let cipher_key = ppk_v2_cipher_key(pw.as_bytes());
            encrypt_in_place(Cipher::Aes256Cbc, &cipher_key[..], &[0u8; 16], &mut enc_private);
        }

        let mut out = format!("{HEADER_PREFIX}2: {algorithm}\n");
        out.push_str(&format!("Encryption: {encryption}\n"));
        out.push_str(&format!("Comment: {}\n", key.comment()));
        emit_blob(&mut out, "Public-Lines", &public_blob);
        emit_blob(&mut out, "Private-Lines", &enc_private);
        out.push_str(&format!("Private-MAC: {}\n", hex::encode(mac)));
        out
    }

    pub fn build_v3_encrypted(key: &SshKey, passphrase: &str) -> String {
        let algorithm = key.algorithm();
        let public_blob = key.public_blob();
        let salt = [0x3cu8; 16];
        let (memory_kib, passes, parallelism) = (64, 2, 1);

        let mut private = write_private_fields(key);
        let mut pad = 0x11u8;
        while private.len() % 16 != 0 {
            private.push(pad);
            pad = pad.wrapping_add(1);
        }

        let (ck, iv, mk) = ppk_v3_derive(
            argon2::Algorithm::Argon2id,
            memory_kib,
            passes,
            parallelism,
            &salt,
            passphrase.as_bytes(),
        )
        .unwrap();
        let mac_data = mac_payload(algorithm, "aes256-cbc", key.comment(), &public_blob, &private);
        let mac = hmac_sha256(&mk[..], &mac_data);

        let mut enc_private = private.clone();
        encrypt_in_place(Cipher::Aes256Cbc, &ck[..], &iv, &mut enc_private);

        let mut out = format!("{HEADER_PREFIX}3: {algorithm}\n");
        out.push_str("Encryption: aes256-cbc\n");
        out.push_str(&format!("Comment: {}\n", key.comment()));
        emit_blob(&mut out, "Public-Lines", &public_blob);
        out.push_str("Key-Derivation: Argon2id\n");
        out.push_str(&format!("Argon2-Memory: {memory_kib}\n"));
        out.push_str(&format!("Argon2-Passes: {passes}\n"));
        out.push_str(&format!("Argon2-Parallelism: {parallelism}\n"));
        out.push_str(&format!("Argon2-Salt: {}\n", hex::encode(salt)));
        emit_blob(&mut out, "Private-Lines", &enc_private);
        out.push_str(&format!("Private-MAC: {}\n", hex::encode(mac)));
        out
    }
}
