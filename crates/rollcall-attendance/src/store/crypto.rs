//! Embedding-at-rest encryption.
//!
//! Stored vectors are AES-256-GCM blobs: 12-byte random nonce followed
//! by ciphertext+tag. The key is the SHA-256 of the key file contents,
//! so the file can hold any operator-supplied secret material.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use rollcall_core::Embedding;
use sha2::{Digest, Sha256};
use std::path::Path;

use super::StoreError;

const NONCE_LEN: usize = 12;

pub struct EmbeddingCipher {
    cipher: Aes256Gcm,
}

impl EmbeddingCipher {
    /// Derive the cipher from raw key material.
    pub fn from_key_material(material: &[u8]) -> Self {
        let key_bytes = Sha256::digest(material);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        Self { cipher }
    }

    /// Load key material from a file, generating a fresh 32-byte secret
    /// on first use.
    pub fn from_key_file(path: &Path) -> Result<Self, StoreError> {
        let material = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let mut secret = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut secret);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StoreError::Crypto(format!("create key dir: {e}")))?;
                }
                std::fs::write(path, secret)
                    .map_err(|e| StoreError::Crypto(format!("write key file: {e}")))?;
                tracing::info!(path = %path.display(), "generated new embedding key");
                secret.to_vec()
            }
            Err(err) => return Err(StoreError::Crypto(format!("read key file: {err}"))),
        };
        Ok(Self::from_key_material(&material))
    }

    /// Encrypt an embedding vector into a nonce-prefixed blob.
    pub fn encrypt(&self, embedding: &Embedding) -> Result<Vec<u8>, StoreError> {
        let mut plaintext = Vec::with_capacity(embedding.values.len() * 4);
        for v in &embedding.values {
            plaintext.extend_from_slice(&v.to_le_bytes());
        }

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| StoreError::Crypto("encryption failed".into()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a stored blob back into the embedding vector.
    pub fn decrypt(&self, blob: &[u8], model_version: Option<String>) -> Result<Embedding, StoreError> {
        if blob.len() <= NONCE_LEN {
            return Err(StoreError::Crypto("blob too short".into()));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StoreError::Crypto("decryption failed (wrong key or tampered blob)".into()))?;

        if plaintext.len() % 4 != 0 {
            return Err(StoreError::Crypto("decrypted vector has odd length".into()));
        }

        let values = plaintext
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Embedding {
            values,
            model_version,
        })
    }
}
