//! Tag de integridade com chave.
//!
//! `tag = (Σ palavras do registro, exceto o próprio tag) × (Σ palavras da chave)`,
//! tudo em aritmética u32 com wraparound e palavras little-endian.
//!
//! Não é um MAC: qualquer um que saiba somar inverte o valor. Serve apenas
//! como verificação fraca dependente da chave, que o receptor precisa
//! reproduzir bit a bit.

use crate::cipher::DeviceKey;

/// Tamanho do campo de tag no início do registro.
pub const TAG_LEN: usize = 4;

/// Soma das palavras da chave, calculada uma vez por carga de chave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySum(u32);

impl KeySum {
    pub fn new(key: &DeviceKey) -> Self {
        Self(sum_words(key.as_bytes()))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

fn sum_words(bytes: &[u8]) -> u32 {
    bytes
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .fold(0u32, u32::wrapping_add)
}

/// Calcula o tag sobre as palavras nos offsets 4, 8, … `len - 4`.
///
/// Uma palavra parcial no final é ignorada; os receptores existentes
/// dependem exatamente desse limite de iteração.
pub fn compute_tag(payload: &[u8], key_sum: KeySum) -> u32 {
    let body = payload.get(TAG_LEN..).unwrap_or(&[]);
    sum_words(body).wrapping_mul(key_sum.0)
}

/// Recalcula o tag sobre o conteúdo atual e grava nos bytes 0..4.
pub fn stamp(payload: &mut [u8], key_sum: KeySum) -> u32 {
    let tag = compute_tag(payload, key_sum);
    if let Some(field) = payload.get_mut(..TAG_LEN) {
        field.copy_from_slice(&tag.to_le_bytes());
    }
    tag
}

/// Confere o tag gravado contra o conteúdo.
pub fn verify(payload: &[u8], key_sum: KeySum) -> bool {
    match payload.get(..TAG_LEN) {
        Some(field) => {
            let stored = u32::from_le_bytes([field[0], field[1], field[2], field[3]]);
            stored == compute_tag(payload, key_sum)
        }
        None => false,
    }
}
