use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: wrong passphrase or corrupt ciphertext")]
    DecryptionFailed,

    #[error("Empty passphrase")]
    EmptyPassphrase,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("Cannot hash empty input")]
    EmptyInput,

    #[error("Invalid content id: {0}")]
    InvalidContentId(String),
}
