use std::collections::HashMap;
use std::sync::RwLock;

use cdl_types::{Digest, SignatureValue};

/// Signing seam between the ledger and the issuer authority.
///
/// The ledger only needs deterministic signing and a boolean verify over a
/// document's content digest. The default [`KeyedDigestSigner`] is a
/// symmetric keyed hash and is not non-repudiable; deployments that need
/// real signatures plug in [`Ed25519Keyring`] or their own PKI here.
pub trait DocumentSigner: Send + Sync {
    /// Scheme tag stored alongside each signature.
    fn algorithm(&self) -> &str;

    fn sign(&self, digest: &Digest, signer_id: &str) -> Result<SignatureValue, SignatureError>;

    fn verify(&self, digest: &Digest, signer_id: &str, signature: &SignatureValue) -> bool;
}

/// HMAC-style signer: a keyed BLAKE3 digest with the key derived from the
/// signer id (and an optional deployment secret).
#[derive(Clone, Default)]
pub struct KeyedDigestSigner {
    secret: Option<[u8; 32]>,
}

impl KeyedDigestSigner {
    pub const ALGORITHM: &'static str = "blake3-keyed";
    const KEY_CONTEXT: &'static str = "cdl signer key v1";

    pub fn new() -> Self {
        Self::default()
    }

    /// Mix a deployment-wide secret into every derived key.
    pub fn with_secret(secret: [u8; 32]) -> Self {
        Self {
            secret: Some(secret),
        }
    }

    fn key_for(&self, signer_id: &str) -> [u8; 32] {
        let mut material = Vec::with_capacity(32 + signer_id.len());
        if let Some(secret) = &self.secret {
            material.extend_from_slice(secret);
        }
        material.extend_from_slice(signer_id.as_bytes());
        blake3::derive_key(Self::KEY_CONTEXT, &material)
    }

    fn mac(&self, digest: &Digest, signer_id: &str) -> blake3::Hash {
        blake3::keyed_hash(&self.key_for(signer_id), digest.as_bytes())
    }
}

impl DocumentSigner for KeyedDigestSigner {
    fn algorithm(&self) -> &str {
        Self::ALGORITHM
    }

    fn sign(&self, digest: &Digest, signer_id: &str) -> Result<SignatureValue, SignatureError> {
        Ok(SignatureValue::new(
            self.mac(digest, signer_id).as_bytes().to_vec(),
        ))
    }

    fn verify(&self, digest: &Digest, signer_id: &str, signature: &SignatureValue) -> bool {
        let Ok(bytes) = <[u8; 32]>::try_from(signature.as_bytes()) else {
            return false;
        };
        // blake3::Hash equality is constant-time
        self.mac(digest, signer_id) == blake3::Hash::from(bytes)
    }
}

impl std::fmt::Debug for KeyedDigestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secret = if self.secret.is_some() { "<redacted>" } else { "none" };
        write!(f, "KeyedDigestSigner(secret: {secret})")
    }
}

/// Ed25519 signing key (private).
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Ed25519 verifying key (public).
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from raw 32-byte secret.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> SignatureValue {
        use ed25519_dalek::Signer;
        SignatureValue::new(self.0.sign(message).to_bytes().to_vec())
    }
}

impl VerifyingKey {
    pub fn verify(&self, message: &[u8], signature: &SignatureValue) -> Result<(), SignatureError> {
        use ed25519_dalek::Verifier;
        let bytes: [u8; 64] = signature
            .as_bytes()
            .try_into()
            .map_err(|_| SignatureError::InvalidSignature)?;
        self.0
            .verify(message, &ed25519_dalek::Signature::from_bytes(&bytes))
            .map_err(|_| SignatureError::InvalidSignature)
    }

    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, SignatureError> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self(key))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", hex::encode(self.0.to_bytes()))
    }
}

/// Asymmetric signer holding one Ed25519 key per enrolled signer.
#[derive(Default)]
pub struct Ed25519Keyring {
    keys: RwLock<HashMap<String, SigningKey>>,
}

impl Ed25519Keyring {
    pub const ALGORITHM: &'static str = "ed25519";

    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing key for a signer, replacing any previous one.
    pub fn insert(&self, signer_id: impl Into<String>, key: SigningKey) -> Result<(), SignatureError> {
        self.keys
            .write()
            .map_err(|_| SignatureError::KeyringPoisoned)?
            .insert(signer_id.into(), key);
        Ok(())
    }

    /// Generate and register a fresh key, returning its public half.
    pub fn enroll(&self, signer_id: impl Into<String>) -> Result<VerifyingKey, SignatureError> {
        let key = SigningKey::generate();
        let public = key.verifying_key();
        self.insert(signer_id, key)?;
        Ok(public)
    }

    pub fn verifying_key(&self, signer_id: &str) -> Option<VerifyingKey> {
        self.keys
            .read()
            .ok()?
            .get(signer_id)
            .map(SigningKey::verifying_key)
    }
}

impl DocumentSigner for Ed25519Keyring {
    fn algorithm(&self) -> &str {
        Self::ALGORITHM
    }

    fn sign(&self, digest: &Digest, signer_id: &str) -> Result<SignatureValue, SignatureError> {
        let keys = self.keys.read().map_err(|_| SignatureError::KeyringPoisoned)?;
        let key = keys
            .get(signer_id)
            .ok_or_else(|| SignatureError::UnknownSigner(signer_id.to_string()))?;
        Ok(key.sign(digest.as_bytes()))
    }

    fn verify(&self, digest: &Digest, signer_id: &str, signature: &SignatureValue) -> bool {
        self.verifying_key(signer_id)
            .is_some_and(|key| key.verify(digest.as_bytes(), signature).is_ok())
    }
}

impl std::fmt::Debug for Ed25519Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.keys.read().map(|k| k.len()).unwrap_or(0);
        write!(f, "Ed25519Keyring({count} signers)")
    }
}

/// Errors from signing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid key")]
    InvalidKey,

    #[error("no signing key enrolled for '{0}'")]
    UnknownSigner(String),

    #[error("keyring lock poisoned")]
    KeyringPoisoned,
}
