//! Chave compartilhada e cifragem AES-128 em blocos de 16 bytes.
//!
//! Modo ECB: cada bloco é cifrado de forma independente, sem vetor de
//! encadeamento. Blocos em claro iguais geram blocos cifrados iguais; o
//! formato do fio depende disso, então o modo não muda sem mudar o receptor.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::record::{BLOCK_LEN, is_valid_len};

/// Tamanho da chave AES-128.
pub const KEY_LEN: usize = 16;

/// Erros de carga da chave.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Chave hex inválida: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Chave deve ter {KEY_LEN} bytes, recebido {0}")]
    Length(usize),

    #[error("Erro ao ler arquivo de chave {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Erros de cifragem.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("Comprimento de payload inválido: {0} (esperado 16, 32 ou 48)")]
    InvalidLength(usize),
}

// ──────────────────────────────────────────────
// Chave
// ──────────────────────────────────────────────

/// Chave de 128 bits compartilhada entre dispositivo e receptor.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceKey([u8; KEY_LEN]);

impl DeviceKey {
    pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let array: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| KeyError::Length(bytes.len()))?;
        Ok(Self(array))
    }

    /// Chave em 32 dígitos hex (espaços nas pontas são ignorados).
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(text.trim())?;
        Self::from_slice(&bytes)
    }

    /// Arquivo binário de exatamente 16 bytes.
    pub fn from_file(path: &Path) -> Result<Self, KeyError> {
        let bytes = std::fs::read(path).map_err(|source| KeyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

// Nunca imprimir o material da chave em logs.
impl fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceKey(..)")
    }
}

// ──────────────────────────────────────────────
// Framer
// ──────────────────────────────────────────────

/// Cifra payloads de 16/32/48 bytes bloco a bloco.
pub struct BlockFramer {
    cipher: Aes128,
}

impl BlockFramer {
    /// Expande a chave uma única vez.
    pub fn new(key: &DeviceKey) -> Self {
        Self {
            cipher: Aes128::new(GenericArray::from_slice(key.as_bytes())),
        }
    }

    pub fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, CipherError> {
        check_len(plain.len())?;
        let mut out = plain.to_vec();
        for block in out.chunks_exact_mut(BLOCK_LEN) {
            self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(out)
    }

    pub fn decrypt(&self, encrypted: &[u8]) -> Result<Vec<u8>, CipherError> {
        check_len(encrypted.len())?;
        let mut out = encrypted.to_vec();
        for block in out.chunks_exact_mut(BLOCK_LEN) {
            self.cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(out)
    }
}

fn check_len(len: usize) -> Result<(), CipherError> {
    if is_valid_len(len) {
        Ok(())
    } else {
        Err(CipherError::InvalidLength(len))
    }
}
