//! Container ciphers and key-derivation functions.
//!
//! Implements the symmetric decryption and KDF algorithms named by the
//! three supported key container formats, built on the RustCrypto
//! primitive crates.  Nothing here interprets container structure — the
//! format modules own that.

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockSizeUser, KeyIvInit};
use ctr::cipher::StreamCipher;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroizing;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type TdesCbcDec = cbc::Decryptor<des::TdesEde3>;
type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;
type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("ciphertext length {0} is not a multiple of the cipher block size")]
    BlockLength(usize),

    #[error("block padding invalid after decryption")]
    Unpad,

    #[error("key derivation failed: {0}")]
    Kdf(String),
}

/// A symmetric cipher named by a key container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    Aes128Cbc,
    Aes256Cbc,
    Aes128Ctr,
    Aes256Ctr,
    TripleDesCbc,
}

impl Cipher {
    /// Resolve an OpenSSH-v1 / PPK cipher name (`aes256-ctr`, …).
    pub fn from_ssh_name(name: &str) -> Option<Self> {
        match name {
            "aes128-cbc" => Some(Self::Aes128Cbc),
            "aes256-cbc" => Some(Self::Aes256Cbc),
            "aes128-ctr" => Some(Self::Aes128Ctr),
            "aes256-ctr" => Some(Self::Aes256Ctr),
            "3des-cbc" => Some(Self::TripleDesCbc),
            _ => None,
        }
    }

    /// Resolve a legacy PEM `DEK-Info` cipher name (`AES-128-CBC`, …).
    pub fn from_dek_info_name(name: &str) -> Option<Self> {
        match name {
            "AES-128-CBC" => Some(Self::Aes128Cbc),
            "AES-256-CBC" => Some(Self::Aes256Cbc),
            "DES-EDE3-CBC" => Some(Self::TripleDesCbc),
            _ => None,
        }
    }

    pub fn key_len(&self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes128Ctr => 16,
            Self::Aes256Cbc | Self::Aes256Ctr => 32,
            Self::TripleDesCbc => 24,
        }
    }

    pub fn iv_len(&self) -> usize {
        match self {
            Self::TripleDesCbc => 8,
            _ => 16,
        }
    }

    pub fn block_len(&self) -> usize {
        match self {
            Self::TripleDesCbc => 8,
            _ => 16,
        }
    }

    /// Decrypt in place without padding (OpenSSH-v1 private sections and
    /// PPK private blobs pad to the block size themselves).
    pub fn decrypt_in_place(
        &self,
        key: &[u8],
        iv: &[u8],
        data: &mut [u8],
    ) -> Result<(), CryptoError> {
        match self {
            Self::Aes128Ctr => {
                let mut cipher = Aes128Ctr::new_from_slices(key, iv)
                    .map_err(|e| CryptoError::Kdf(format!("cipher init: {e}")))?;
                cipher.apply_keystream(data);
                Ok(())
            }
            Self::Aes256Ctr => {
                let mut cipher = Aes256Ctr::new_from_slices(key, iv)
                    .map_err(|e| CryptoError::Kdf(format!("cipher init: {e}")))?;
                cipher.apply_keystream(data);
                Ok(())
            }
            Self::Aes128Cbc => cbc_no_padding::<Aes128CbcDec>(key, iv, data),
            Self::Aes256Cbc => cbc_no_padding::<Aes256CbcDec>(key, iv, data),
            Self::TripleDesCbc => cbc_no_padding::<TdesCbcDec>(key, iv, data),
        }
    }

    /// Decrypt with PKCS#7 padding (legacy PEM bodies).
    pub fn decrypt_pkcs7(
        &self,
        key: &[u8],
        iv: &[u8],
        data: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if data.is_empty() || data.len() % self.block_len() != 0 {
            return Err(CryptoError::BlockLength(data.len()));
        }
        let mut buf = Zeroizing::new(data.to_vec());
        let plain_len = match self {
            Self::Aes128Cbc => cbc_pkcs7::<Aes128CbcDec>(key, iv, &mut buf)?,
            Self::Aes256Cbc => cbc_pkcs7::<Aes256CbcDec>(key, iv, &mut buf)?,
            Self::TripleDesCbc => cbc_pkcs7::<TdesCbcDec>(key, iv, &mut buf)?,
            Self::Aes128Ctr | Self::Aes256Ctr => {
                self.decrypt_in_place(key, iv, &mut buf)?;
                buf.len()
            }
        };
        buf.truncate(plain_len);
        Ok(buf)
    }
}

fn cbc_no_padding<D>(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<(), CryptoError>
where
    D: BlockDecryptMut + BlockSizeUser + KeyIvInit,
{
    if data.len() % D::block_size() != 0 {
        return Err(CryptoError::BlockLength(data.len()));
    }
    let cipher =
        D::new_from_slices(key, iv).map_err(|e| CryptoError::Kdf(format!("cipher init: {e}")))?;
    cipher
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|_| CryptoError::Unpad)?;
    Ok(())
}

fn cbc_pkcs7<D>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<usize, CryptoError>
where
    D: BlockDecryptMut + KeyIvInit,
{
    let cipher =
        D::new_from_slices(key, iv).map_err(|e| CryptoError::Kdf(format!("cipher init: {e}")))?;
    let plain = cipher
        .decrypt_padded_mut::<Pkcs7>(buf)
        .map_err(|_| CryptoError::Unpad)?;
    Ok(plain.len())
}

/// OpenSSL's legacy `EVP_BytesToKey` with MD5 and one iteration, as used
/// by encrypted PEM bodies: `D_1 = MD5(pass ‖ salt)`,
/// `D_n = MD5(D_{n-1} ‖ pass ‖ salt)`, concatenated until `key_len` bytes
/// are available.  `salt` is the first 8 bytes of the DEK-Info IV.
pub fn openssl_bytes_to_key(
    passphrase: &[u8],
    salt: &[u8],
    key_len: usize,
) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(Vec::with_capacity(key_len));
    let mut prev: Option<[u8; 16]> = None;
    while key.len() < key_len {
        let mut md5 = Md5::new();
        if let Some(block) = prev {
            md5.update(block);
        }
        md5.update(passphrase);
        md5.update(salt);
        let digest: [u8; 16] = md5.finalize().into();
        key.extend_from_slice(&digest);
        prev = Some(digest);
    }
    key.truncate(key_len);
    key
}

/// The `bcrypt` KDF from the OpenSSH-v1 container format.
pub fn bcrypt_kdf(
    passphrase: &[u8],
    salt: &[u8],
    rounds: u32,
    out_len: usize,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let mut out = Zeroizing::new(vec![0u8; out_len]);
    bcrypt_pbkdf::bcrypt_pbkdf(passphrase, salt, rounds, &mut out)
        .map_err(|e| CryptoError::Kdf(format!("bcrypt: {e}")))?;
    Ok(out)
}

/// PPK v2 cipher key: the first 32 bytes of
/// `SHA1(be32(0) ‖ pass) ‖ SHA1(be32(1) ‖ pass)`.  The IV is all zeros.
pub fn ppk_v2_cipher_key(passphrase: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    for (i, chunk) in key.chunks_mut(20).enumerate() {
        let mut sha = Sha1::new();
        sha.update((i as u32).to_be_bytes());
        sha.update(passphrase);
        let digest = sha.finalize();
        chunk.copy_from_slice(&digest[..chunk.len()]);
    }
    key
}

/// PPK v2 MAC key: `SHA1("putty-private-key-file-mac-key" ‖ pass)`.
/// The passphrase is empty (but the magic string still hashed) for
/// unencrypted keys.
pub fn ppk_v2_mac_key(passphrase: &[u8]) -> Zeroizing<[u8; 20]> {
    let mut sha = Sha1::new();
    sha.update(b"putty-private-key-file-mac-key");
    sha.update(passphrase);
    Zeroizing::new(sha.finalize().into())
}

/// PPK v3 key material: Argon2 over the passphrase yielding
/// 32-byte cipher key ‖ 16-byte IV ‖ 32-byte MAC key.
#[allow(clippy::type_complexity)]
pub fn ppk_v3_derive(
    flavour: argon2::Algorithm,
    memory_kib: u32,
    passes: u32,
    parallelism: u32,
    salt: &[u8],
    passphrase: &[u8],
) -> Result<(Zeroizing<[u8; 32]>, [u8; 16], Zeroizing<[u8; 32]>), CryptoError> {
    let params = argon2::Params::new(memory_kib, passes, parallelism, Some(80))
        .map_err(|e| CryptoError::Kdf(format!("argon2 params: {e}")))?;
    let argon = argon2::Argon2::new(flavour, argon2::Version::V0x13, params);

    let mut out = Zeroizing::new([0u8; 80]);
    argon
        .hash_password_into(passphrase, salt, &mut *out)
        .map_err(|e| CryptoError::Kdf(format!("argon2: {e}")))?;

    let mut cipher_key = Zeroizing::new([0u8; 32]);
    cipher_key.copy_from_slice(&out[..32]);
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&out[32..48]);
    let mut mac_key = Zeroizing::new([0u8; 32]);
    mac_key.copy_from_slice(&out[48..]);
    Ok((cipher_key, iv, mac_key))
}

pub fn hmac_sha1(key: &[u8], data: &[u8]) -> [u8; 20] {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC key should be valid");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC key should be valid");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Constant-time comparison of a computed MAC against the stored one.
pub fn mac_matches(computed: &[u8], expected: &[u8]) -> bool {
    if computed.len() != expected.len() {
        return false;
    }
    let mut diff = 0u8;
    for (a, b) in computed.iter().zip(expected) {
        diff |= a ^ b;
    }
    diff == 0
}
