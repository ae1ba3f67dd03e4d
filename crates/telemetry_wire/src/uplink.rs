//! Ciclo de envio do dispositivo.
//!
//! Um ciclo:
//! 1. monta o registro a partir do provedor de leituras
//! 2. carimba o tag e cifra
//! 3. drena a fila de reenvio (para na primeira falha)
//! 4. envia o ciphertext novo; se falhar, enfileira
//!
//! A ordem de drenagem é FIFO e entradas que falham continuam na cabeça da
//! fila, então um destino fora do ar custa no máximo uma tentativa por ciclo.

use tracing::{debug, error, info, warn};

use crate::cipher::{BlockFramer, CipherError, DeviceKey};
use crate::queue::RetryQueue;
use crate::record::{
    Clock, MAX_SLOTS, ReadingProvider, RecordError, TelemetryRecord, TimestampPolicy, build_record,
    payload_len,
};
use crate::tag::{self, KeySum};
use crate::transport::Transport;

/// Forma do registro de um dispositivo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    pub device_id: u16,
    /// Slots ativos na build (1–10). Define o comprimento transmitido.
    pub slot_count: usize,
    pub timestamps: TimestampPolicy,
}

impl DeviceProfile {
    pub fn payload_len(&self) -> usize {
        payload_len(self.slot_count.min(MAX_SLOTS))
    }
}

/// Falha ao codificar o registro de um ciclo.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Serializa, carimba o tag e cifra um registro.
pub fn seal(
    record: &TelemetryRecord,
    len: usize,
    key_sum: KeySum,
    framer: &BlockFramer,
) -> Result<Vec<u8>, EncodeError> {
    let mut plain = record.to_bytes(len)?;
    tag::stamp(&mut plain, key_sum);
    Ok(framer.encrypt(&plain)?)
}

/// Resultado de um ciclo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Entradas da fila reenviadas com sucesso.
    pub resent: usize,
    /// O ciphertext novo saiu neste ciclo.
    pub delivered: bool,
    /// O ciphertext novo foi para a fila.
    pub queued: bool,
    /// Enfileirar descartou a entrada mais antiga.
    pub evicted: bool,
    /// Entradas pendentes ao fim do ciclo.
    pub backlog: usize,
}

/// Estado de envio do dispositivo: chave carregada, transporte e fila.
pub struct Uplink<T: Transport> {
    profile: DeviceProfile,
    framer: BlockFramer,
    key_sum: KeySum,
    transport: T,
    queue: RetryQueue,
}

impl<T: Transport> Uplink<T> {
    pub fn new(profile: DeviceProfile, key: &DeviceKey, transport: T, retry_capacity: usize) -> Self {
        Self {
            profile,
            framer: BlockFramer::new(key),
            key_sum: KeySum::new(key),
            transport,
            queue: RetryQueue::new(retry_capacity),
        }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn queue(&self) -> &RetryQueue {
        &self.queue
    }

    /// Monta, carimba e cifra o registro do ciclo atual.
    pub fn encode<P, C>(&self, provider: &mut P, clock: &C) -> Result<Vec<u8>, EncodeError>
    where
        P: ReadingProvider + ?Sized,
        C: Clock + ?Sized,
    {
        let record = build_record(
            provider,
            self.profile.device_id,
            self.profile.slot_count,
            clock,
            self.profile.timestamps,
        );
        seal(&record, self.profile.payload_len(), self.key_sum, &self.framer)
    }

    /// Drena a fila e envia o ciphertext novo.
    pub fn deliver(&mut self, ciphertext: &[u8]) -> CycleReport {
        let mut report = CycleReport::default();

        while let Some(pending) = self.queue.peek() {
            match self.transport.send(pending) {
                Ok(_) => {
                    self.queue.pop();
                    report.resent += 1;
                }
                Err(e) => {
                    debug!("Reenvio interrompido: {e}");
                    break;
                }
            }
        }
        if report.resent > 0 {
            info!("{} registro(s) pendente(s) reenviado(s)", report.resent);
        }

        match self.transport.send(ciphertext) {
            Ok(sent) => {
                debug!("Registro de {sent} bytes enviado para {}", self.transport.destination());
                report.delivered = true;
            }
            Err(e) => {
                warn!("Falha no envio para {}: {e}", self.transport.destination());
                report.queued = true;
                report.evicted = self.queue.push(ciphertext);
                if report.evicted {
                    warn!(
                        "Fila de reenvio cheia ({}), registro mais antigo descartado",
                        self.queue.capacity()
                    );
                }
            }
        }

        report.backlog = self.queue.len();
        report
    }

    /// Um ciclo completo. Erros de codificação não tocam na fila.
    pub fn run_cycle<P, C>(&mut self, provider: &mut P, clock: &C) -> Result<CycleReport, EncodeError>
    where
        P: ReadingProvider + ?Sized,
        C: Clock + ?Sized,
    {
        let ciphertext = self.encode(provider, clock).inspect_err(|e| {
            error!("Falha ao codificar registro: {e}");
        })?;
        Ok(self.deliver(&ciphertext))
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Reading;
    use crate::transport::{TransportError, TransportKind};
    use std::collections::VecDeque;
    use std::io;
    use std::net::SocketAddr;

    struct FixedClock(u32);

    impl Clock for FixedClock {
        fn unix_now(&self) -> u32 {
            self.0
        }
    }

    /// Transporte falso: cada envio consome o próximo resultado do roteiro
    /// (sucesso quando o roteiro acaba) e registra o payload aceito.
    #[derive(Default)]
    struct FakeTransport {
        script: VecDeque<bool>,
        accepted: Vec<Vec<u8>>,
        attempts: usize,
    }

    impl FakeTransport {
        fn scripted(results: &[bool]) -> Self {
            Self {
                script: results.iter().copied().collect(),
                ..Default::default()
            }
        }
    }

    impl Transport for FakeTransport {
        fn send(&mut self, payload: &[u8]) -> Result<usize, TransportError> {
            self.attempts += 1;
            if self.script.pop_front().unwrap_or(true) {
                self.accepted.push(payload.to_vec());
                Ok(payload.len())
            } else {
                Err(TransportError::Send(io::Error::from(io::ErrorKind::ConnectionRefused)))
            }
        }

        fn kind(&self) -> TransportKind {
            TransportKind::Datagram
        }

        fn destination(&self) -> SocketAddr {
            "127.0.0.1:5005".parse().unwrap()
        }
    }

    fn sequential_key() -> DeviceKey {
        DeviceKey::from_hex("000102030405060708090a0b0c0d0e0f").unwrap()
    }

    fn profile(slot_count: usize) -> DeviceProfile {
        DeviceProfile {
            device_id: 5,
            slot_count,
            timestamps: TimestampPolicy::Shared,
        }
    }

    fn uplink(results: &[bool], capacity: usize) -> Uplink<FakeTransport> {
        Uplink::new(profile(2), &sequential_key(), FakeTransport::scripted(results), capacity)
    }

    #[test]
    fn two_values_produce_one_tagged_block() {
        let key = sequential_key();
        let up = Uplink::new(profile(2), &key, FakeTransport::default(), 4);
        let mut readings = vec![Reading::Unsigned(100), Reading::Unsigned(200)];

        let encrypted = up.encode(&mut readings, &FixedClock(1_700_000_000)).unwrap();
        assert_eq!(encrypted.len(), 16);

        let plain = BlockFramer::new(&key).decrypt(&encrypted).unwrap();
        assert_eq!(&plain[4..6], &5u16.to_le_bytes());
        assert_eq!(&plain[6..10], &1_700_000_000u32.to_le_bytes());
        assert_eq!(&plain[10..12], &100u16.to_le_bytes());
        assert_eq!(plain[12], 0);
        assert_eq!(&plain[13..15], &200u16.to_le_bytes());
        assert_eq!(plain[15], 0);
        assert!(tag::verify(&plain, KeySum::new(&key)));
        assert_eq!(&plain[..4], &3_178_356_800u32.to_le_bytes());
    }

    #[test]
    fn payload_length_follows_slot_count() {
        assert_eq!(profile(1).payload_len(), 16);
        assert_eq!(profile(4).payload_len(), 32);
        assert_eq!(profile(10).payload_len(), 48);
        assert_eq!(profile(15).payload_len(), 48);
    }

    #[test]
    fn successful_cycle_leaves_queue_empty() {
        let mut up = uplink(&[], 4);
        let report = up.run_cycle(&mut vec![Reading::Unsigned(1)], &FixedClock(10)).unwrap();
        assert_eq!(
            report,
            CycleReport {
                delivered: true,
                ..Default::default()
            }
        );
        assert!(up.queue().is_empty());
        assert_eq!(up.transport().accepted.len(), 1);
    }

    #[test]
    fn failed_send_queues_exact_ciphertext() {
        let mut up = uplink(&[false], 4);
        let report = up.deliver(&[7u8; 16]);
        assert!(report.queued && !report.delivered && !report.evicted);
        assert_eq!(report.backlog, 1);
        assert_eq!(up.queue().peek(), Some(&[7u8; 16][..]));
    }

    #[test]
    fn backlog_drains_before_new_record() {
        // ciclo 1 falha; ciclo 2 reenvia o pendente e depois o novo
        let mut up = uplink(&[false], 4);
        up.deliver(&[1u8; 16]);
        let report = up.deliver(&[2u8; 16]);

        assert_eq!(report.resent, 1);
        assert!(report.delivered);
        assert_eq!(report.backlog, 0);
        assert_eq!(up.transport().accepted, vec![vec![1u8; 16], vec![2u8; 16]]);
    }

    #[test]
    fn drain_stops_at_first_failure() {
        let mut up = uplink(&[false, false, false, false], 4);
        up.deliver(&[1u8; 16]);
        up.deliver(&[2u8; 16]);
        // o reenvio da cabeça falha; o resto da fila nem é tentado
        let attempts_before = up.transport().attempts;
        let report = up.deliver(&[3u8; 16]);

        assert_eq!(report.resent, 0);
        assert!(report.delivered);
        assert_eq!(up.transport().attempts - attempts_before, 2);
        assert_eq!(up.queue().len(), 2);
        assert_eq!(up.queue().peek(), Some(&[1u8; 16][..]));
    }

    #[test]
    fn full_queue_reports_eviction() {
        let mut up = uplink(&[false; 8], 2);
        assert!(!up.deliver(&[1u8; 16]).evicted);
        assert!(!up.deliver(&[2u8; 16]).evicted);

        let report = up.deliver(&[3u8; 16]);
        assert!(report.queued && report.evicted);
        assert_eq!(report.backlog, 2);
        assert_eq!(up.queue().peek(), Some(&[2u8; 16][..]));
    }

    #[test]
    fn ten_slot_profile_fills_three_blocks() {
        let up = Uplink::new(profile(10), &sequential_key(), FakeTransport::default(), 1);
        let mut readings: Vec<Reading> = (0..10).map(Reading::Unsigned).collect();
        let encrypted = up.encode(&mut readings, &FixedClock(0)).unwrap();
        assert_eq!(encrypted.len(), 48);
    }
}
