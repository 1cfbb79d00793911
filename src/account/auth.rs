//! Admin token hashing and at-rest sealing of passphrases

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use sha2::Sha256;

use crate::error::VaultError;

const VAULT_SALT: &[u8] = b"rust_intake.passphrase_vault.v1";
const KDF_ROUNDS: u32 = 100_000;
const NONCE_LEN: usize = 12;

/// Hash an admin token using Argon2id (PHC string output)
pub fn hash_token(token: &str) -> Result<String, VaultError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(token.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| VaultError::HashFailed)
}

/// Verify a token against a PHC hash
pub fn verify_token(token: &str, token_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(token_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(token.as_bytes(), &parsed)
        .is_ok()
}

/// Derive an encryption key from a secret and salt
pub fn derive_encryption_key(secret: &str, salt: &[u8]) -> [u8; 32] {
    use hmac::Hmac;
    use pbkdf2::pbkdf2;

    let mut key = [0u8; 32]; // 256-bit key
    pbkdf2::<Hmac<Sha256>>(secret.as_bytes(), salt, KDF_ROUNDS, &mut key);
    key
}

/// Seals owner and operator passphrases before they touch the store.
/// The key is derived once, at construction.
pub struct PassphraseVault {
    cipher: Aes256Gcm,
}

impl PassphraseVault {
    pub fn new(secret: &str) -> Result<Self, VaultError> {
        if secret.is_empty() {
            return Err(VaultError::InvalidKey);
        }
        let key = derive_encryption_key(secret, VAULT_SALT);
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| VaultError::InvalidKey)?;
        Ok(Self { cipher })
    }

    /// AES-256-GCM, random nonce prepended to the ciphertext
    pub fn seal(&self, plaintext: &str) -> Result<Vec<u8>, VaultError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::EncryptionFailed)?;

        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<String, VaultError> {
        if sealed.len() < NONCE_LEN {
            return Err(VaultError::DecryptionFailed);
        }
        let nonce = Nonce::from_slice(&sealed[..NONCE_LEN]);
        let plaintext = self
            .cipher
            .decrypt(nonce, &sealed[NONCE_LEN..])
            .map_err(|_| VaultError::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed)
    }
}
