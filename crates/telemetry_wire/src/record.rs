//! Registro de telemetria – layout fixo transmitido em 16, 32 ou 48 bytes.
//!
//! ```text
//! 0      4           6        10      13      16       20          32       36          48
//! ┌──────┬───────────┬────────┬───────┬───────┬────────┬───────────┬────────┬───────────┐
//! │ tag  │ device_id │ time1  │ slot1 │ slot2 │ time2  │ slots 3–6 │ time3  │ slots 7–10│
//! └──────┴───────────┴────────┴───────┴───────┴────────┴───────────┴────────┴───────────┘
//! ```
//!
//! Cada slot ocupa 3 bytes: valor primário (u16) + byte de extensão (u8).
//! Todos os campos são little-endian. A serialização é feita campo a campo
//! via serde + bincode (fixint, sem padding), na ordem de declaração.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Número máximo de slots de sensor num registro.
pub const MAX_SLOTS: usize = 10;

/// Tamanho do bloco AES; todo payload é múltiplo dele.
pub const BLOCK_LEN: usize = 16;

/// Tamanho do registro completo (10 slots).
pub const MAX_RECORD_LEN: usize = 48;

/// Comprimentos de payload aceitos no fio.
pub const VALID_LENGTHS: [usize; 3] = [16, 32, 48];

/// Erros de codificação do registro.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Comprimento de registro inválido: {0} (esperado 16, 32 ou 48)")]
    InvalidLength(usize),

    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Erro de deserialização: {0}")]
    Deserialize(String),
}

/// `true` se `len` é um dos comprimentos de payload do protocolo.
pub fn is_valid_len(len: usize) -> bool {
    VALID_LENGTHS.contains(&len)
}

/// Comprimento transmitido para uma quantidade de slots populados.
pub fn payload_len(populated_slots: usize) -> usize {
    if populated_slots > 6 {
        48
    } else if populated_slots > 2 {
        32
    } else {
        16
    }
}

// ──────────────────────────────────────────────
// Leituras e slots
// ──────────────────────────────────────────────

/// Uma leitura de sensor, já na unidade inteira transmitida.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// Magnitude sem sinal de até 24 bits (CO₂ ppm×100, luminosidade…).
    /// A extensão carrega os bits 16–23.
    Unsigned(u32),
    /// Valor com sinal de 16 bits (temperaturas externas).
    /// A extensão replica o sinal: `0xFF` ou `0x00`.
    Signed(i16),
    /// Inteiro vindo da linha de comando; extensão = `value >> 16`.
    Raw(i32),
}

impl Reading {
    /// Converte a leitura no par (primário, extensão).
    pub fn slot(self) -> Slot {
        match self {
            Reading::Unsigned(v) => Slot {
                value: v as u16,
                ext: (v >> 16) as u8,
            },
            Reading::Signed(v) => Slot {
                value: v as u16,
                ext: if v < 0 { 0xFF } else { 0x00 },
            },
            Reading::Raw(v) => Slot {
                value: v as u16,
                ext: (v >> 16) as u8,
            },
        }
    }
}

/// Um slot de sensor no fio (3 bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub value: u16,
    pub ext: u8,
}

// ──────────────────────────────────────────────
// Colaboradores: provedor de leituras e relógio
// ──────────────────────────────────────────────

/// Fonte das últimas leituras, por índice de slot (0-based).
pub trait ReadingProvider {
    /// Última leitura do slot, ou `None` se o slot não está populado.
    fn reading(&mut self, slot: usize) -> Option<Reading>;
}

impl ReadingProvider for Vec<Reading> {
    fn reading(&mut self, slot: usize) -> Option<Reading> {
        self.get(slot).copied()
    }
}

impl ReadingProvider for [Option<Reading>] {
    fn reading(&mut self, slot: usize) -> Option<Reading> {
        self.get(slot).copied().flatten()
    }
}

/// Relógio de parede em segundos Unix (32 bits, como no fio).
pub trait Clock {
    fn unix_now(&self) -> u32;
}

/// Relógio do sistema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_now(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    }
}

/// Como os três campos de tempo são amostrados.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicy {
    /// Uma única amostra replicada em time1/time2/time3.
    #[default]
    Shared,
    /// Cada campo amostrado de forma independente; podem divergir.
    PerField,
}

// ──────────────────────────────────────────────
// Registro
// ──────────────────────────────────────────────

/// Registro completo (forma de 48 bytes). A ordem dos campos é o layout do fio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Tag de integridade; sempre recalculado sobre os bytes serializados.
    pub tag: u32,
    pub device_id: u16,
    pub time1: u32,
    /// Slots 1–2
    pub head: [Slot; 2],
    pub time2: u32,
    /// Slots 3–6
    pub middle: [Slot; 4],
    pub time3: u32,
    /// Slots 7–10
    pub tail: [Slot; 4],
}

impl TelemetryRecord {
    /// Registro do caminho do emulador: valores inteiros brutos e um único
    /// timestamp replicado.
    pub fn from_values(device_id: u16, values: &[i32], now: u32) -> Self {
        let mut record = Self {
            device_id,
            time1: now,
            time2: now,
            time3: now,
            ..Default::default()
        };
        for (index, &value) in values.iter().take(MAX_SLOTS).enumerate() {
            record.set_slot(index, Reading::Raw(value));
        }
        record
    }

    /// Slot pelo índice 0-based.
    pub fn slot(&self, index: usize) -> Option<Slot> {
        match index {
            0..=1 => self.head.get(index).copied(),
            2..=5 => self.middle.get(index - 2).copied(),
            6..=9 => self.tail.get(index - 6).copied(),
            _ => None,
        }
    }

    /// Grava uma leitura no slot; índices fora de 0..10 são ignorados.
    pub fn set_slot(&mut self, index: usize, reading: Reading) {
        let slot = match index {
            0..=1 => self.head.get_mut(index),
            2..=5 => self.middle.get_mut(index - 2),
            6..=9 => self.tail.get_mut(index - 6),
            _ => None,
        };
        if let Some(slot) = slot {
            *slot = reading.slot();
        }
    }

    fn stamp_times<C: Clock + ?Sized>(&mut self, clock: &C, policy: TimestampPolicy) {
        match policy {
            TimestampPolicy::Shared => {
                let now = clock.unix_now();
                self.time1 = now;
                self.time2 = now;
                self.time3 = now;
            }
            TimestampPolicy::PerField => {
                self.time1 = clock.unix_now();
                self.time2 = clock.unix_now();
                self.time3 = clock.unix_now();
            }
        }
    }

    /// Serializa o registro e trunca no comprimento transmitido.
    ///
    /// Os bytes do tag saem como estão no struct; quem transmite deve
    /// carimbar o tag sobre o buffer resultante (ver [`crate::tag::stamp`]).
    pub fn to_bytes(&self, len: usize) -> Result<Vec<u8>, RecordError> {
        if !is_valid_len(len) {
            return Err(RecordError::InvalidLength(len));
        }
        let mut bytes =
            bincode::serialize(self).map_err(|e| RecordError::Serialize(e.to_string()))?;
        debug_assert_eq!(bytes.len(), MAX_RECORD_LEN);
        bytes.truncate(len);
        Ok(bytes)
    }

    /// Reconstrói um registro a partir de um payload em claro.
    /// Campos além do comprimento recebido ficam zerados.
    pub fn from_bytes(data: &[u8]) -> Result<Self, RecordError> {
        if !is_valid_len(data.len()) {
            return Err(RecordError::InvalidLength(data.len()));
        }
        let mut full = [0u8; MAX_RECORD_LEN];
        full[..data.len()].copy_from_slice(data);
        bincode::deserialize(&full).map_err(|e| RecordError::Deserialize(e.to_string()))
    }
}

/// Monta o registro de um ciclo a partir do provedor de leituras.
///
/// Lê no máximo `active_slot_count` slots (limitado a [`MAX_SLOTS`]); slots
/// sem leitura ficam zerados. `device_id` não é validado aqui. O tag fica
/// zerado até a serialização.
pub fn build_record<P, C>(
    provider: &mut P,
    device_id: u16,
    active_slot_count: usize,
    clock: &C,
    policy: TimestampPolicy,
) -> TelemetryRecord
where
    P: ReadingProvider + ?Sized,
    C: Clock + ?Sized,
{
    let mut record = TelemetryRecord {
        device_id,
        ..Default::default()
    };
    record.stamp_times(clock, policy);
    for index in 0..active_slot_count.min(MAX_SLOTS) {
        if let Some(reading) = provider.reading(index) {
            record.set_slot(index, reading);
        }
    }
    record
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FixedClock(u32);

    impl Clock for FixedClock {
        fn unix_now(&self) -> u32 {
            self.0
        }
    }

    /// Relógio que avança 1s a cada leitura.
    struct TickingClock(Cell<u32>);

    impl Clock for TickingClock {
        fn unix_now(&self) -> u32 {
            let now = self.0.get();
            self.0.set(now + 1);
            now
        }
    }

    #[test]
    fn full_record_is_48_bytes() {
        let bytes = TelemetryRecord::default().to_bytes(48).unwrap();
        assert_eq!(bytes.len(), 48);
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn payload_len_thresholds() {
        assert_eq!(payload_len(0), 16);
        assert_eq!(payload_len(2), 16);
        assert_eq!(payload_len(3), 32);
        assert_eq!(payload_len(6), 32);
        assert_eq!(payload_len(7), 48);
        assert_eq!(payload_len(10), 48);
    }

    #[test]
    fn field_offsets_match_wire_layout() {
        let values: Vec<i32> = (1..=10).map(|i| i * 0x0101).collect();
        let record = TelemetryRecord::from_values(0xBEEF, &values, 0x1122_3344);
        let bytes = record.to_bytes(48).unwrap();

        assert_eq!(&bytes[4..6], &0xBEEFu16.to_le_bytes());
        for time_offset in [6, 16, 32] {
            assert_eq!(&bytes[time_offset..time_offset + 4], &0x1122_3344u32.to_le_bytes());
        }
        let slot_offsets = [10, 13, 20, 23, 26, 29, 36, 39, 42, 45];
        for (i, &offset) in slot_offsets.iter().enumerate() {
            let expected = values[i] as u16;
            assert_eq!(&bytes[offset..offset + 2], &expected.to_le_bytes(), "slot {}", i + 1);
            assert_eq!(bytes[offset + 2], 0, "extensão do slot {}", i + 1);
        }
    }

    #[test]
    fn signed_reading_replicates_sign() {
        assert_eq!(Reading::Signed(-1000).slot(), Slot { value: 0xFC18, ext: 0xFF });
        assert_eq!(Reading::Signed(1000).slot(), Slot { value: 1000, ext: 0x00 });
    }

    #[test]
    fn unsigned_reading_carries_bits_16_to_23() {
        // CO₂ 812.34 ppm ×100
        let slot = Reading::Unsigned(81_234).slot();
        assert_eq!(slot.value, (81_234u32 & 0xFFFF) as u16);
        assert_eq!(slot.ext, 0x01);
    }

    #[test]
    fn raw_reading_uses_arithmetic_shift() {
        assert_eq!(Reading::Raw(-1000).slot(), Slot { value: 0xFC18, ext: 0xFF });
        assert_eq!(Reading::Raw(0x12_3456).slot(), Slot { value: 0x3456, ext: 0x12 });
    }

    #[test]
    fn build_record_caps_at_active_slots() {
        let mut provider: Vec<Reading> = (0..10).map(|i| Reading::Unsigned(i + 1)).collect();
        let record = build_record(&mut provider, 7, 3, &FixedClock(100), TimestampPolicy::Shared);
        assert_eq!(record.slot(2).unwrap().value, 3);
        assert_eq!(record.slot(3).unwrap(), Slot::default());
        assert_eq!(record.slot(9).unwrap(), Slot::default());
    }

    #[test]
    fn build_record_ignores_counts_above_ten() {
        let mut provider: Vec<Reading> = (0..12).map(|i| Reading::Unsigned(i + 1)).collect();
        let record = build_record(&mut provider, 1, 12, &FixedClock(1), TimestampPolicy::Shared);
        assert_eq!(record.slot(9).unwrap().value, 10);
        assert_eq!(record.slot(10), None);
    }

    #[test]
    fn missing_readings_stay_zero() {
        let mut provider = [Some(Reading::Signed(-5)), None, Some(Reading::Unsigned(9))];
        let record = build_record(&mut provider[..], 2, 3, &FixedClock(1), TimestampPolicy::Shared);
        assert_eq!(record.slot(0).unwrap(), Slot { value: 0xFFFB, ext: 0xFF });
        assert_eq!(record.slot(1).unwrap(), Slot::default());
        assert_eq!(record.slot(2).unwrap().value, 9);
    }

    #[test]
    fn shared_policy_samples_clock_once() {
        let clock = TickingClock(Cell::new(500));
        let record = build_record(&mut Vec::<Reading>::new(), 1, 0, &clock, TimestampPolicy::Shared);
        assert_eq!((record.time1, record.time2, record.time3), (500, 500, 500));
        assert_eq!(clock.0.get(), 501);
    }

    #[test]
    fn per_field_policy_resamples() {
        let clock = TickingClock(Cell::new(500));
        let record = build_record(&mut Vec::<Reading>::new(), 1, 0, &clock, TimestampPolicy::PerField);
        assert_eq!((record.time1, record.time2, record.time3), (500, 501, 502));
    }

    #[test]
    fn from_bytes_zero_fills_short_payloads() {
        let record = TelemetryRecord::from_values(5, &[100, 200, 300], 42);
        let bytes = record.to_bytes(16).unwrap();
        let decoded = TelemetryRecord::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.device_id, 5);
        assert_eq!(decoded.time1, 42);
        assert_eq!(decoded.slot(1).unwrap().value, 200);
        // slot 3 e time2 não couberam em 16 bytes
        assert_eq!(decoded.slot(2).unwrap(), Slot::default());
        assert_eq!(decoded.time2, 0);
    }

    #[test]
    fn rejects_invalid_lengths() {
        let record = TelemetryRecord::default();
        assert!(matches!(record.to_bytes(20), Err(RecordError::InvalidLength(20))));
        assert!(matches!(
            TelemetryRecord::from_bytes(&[0u8; 12]),
            Err(RecordError::InvalidLength(12))
        ));
    }

    #[test]
    fn extra_values_beyond_ten_are_dropped() {
        let values: Vec<i32> = (1..=11).collect();
        let record = TelemetryRecord::from_values(1, &values, 0);
        assert_eq!(record.slot(9).unwrap().value, 10);
    }
}
