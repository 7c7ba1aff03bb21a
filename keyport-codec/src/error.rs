//! Error types for the key container codec.

/// Why a key container could not be decoded.
///
/// All variants are terminal for the key in question — nothing here is
/// retried.  The caller decides whether a [`WrongPassphrase`] or
/// [`PassphraseRequired`] result warrants re-prompting the user.
///
/// [`WrongPassphrase`]: DecodeError::WrongPassphrase
/// [`PassphraseRequired`]: DecodeError::PassphraseRequired
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The container bytes do not form a valid instance of the detected
    /// format.
    #[error("malformed key container: {0}")]
    MalformedContainer(String),

    /// Decryption succeeded mechanically but the integrity check
    /// (checkint pair, MAC, or inner structure of an encrypted payload)
    /// failed — the passphrase is wrong.
    #[error("wrong passphrase for encrypted key")]
    WrongPassphrase,

    /// The container is encrypted and no passphrase was supplied.
    #[error("key container is encrypted and requires a passphrase")]
    PassphraseRequired,

    /// The key algorithm is not one this codec handles.
    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The container names a cipher this codec cannot decrypt.
    #[error("unsupported container cipher: {0}")]
    UnsupportedCipher(String),

    /// The container names a key-derivation function this codec cannot run.
    #[error("unsupported key derivation function: {0}")]
    UnsupportedKdf(String),
}

impl DecodeError {
    pub(crate) fn malformed(what: impl Into<String>) -> Self {
        Self::MalformedContainer(what.into())
    }
}
