//! # Telemetry Wire
//!
//! Caminho de envio dos nós de sensores: registro binário de tamanho fixo,
//! tag de integridade com chave, cifragem AES-128 em blocos, transporte
//! UDP/TCP e fila circular de reenvio.
//!
//! ## Módulos
//! - [`record`] – Layout do registro (16/32/48 bytes) e montagem a partir das leituras
//! - [`tag`] – Tag de integridade somatório × soma da chave
//! - [`cipher`] – Chave do dispositivo e framer AES-128 bloco a bloco
//! - [`transport`] – Envio datagram (UDP) e stream (TCP não-bloqueante)
//! - [`queue`] – Fila circular de ciphertexts pendentes
//! - [`uplink`] – Ciclo de envio: montar, cifrar, drenar, enviar, enfileirar
//! - [`config`] – Configuração do nó via TOML

pub mod record;
pub mod tag;
pub mod cipher;
pub mod transport;
pub mod queue;
pub mod uplink;
pub mod config;

// Re-exports convenientes
pub use record::{Reading, ReadingProvider, Clock, SystemClock, TelemetryRecord, TimestampPolicy};
pub use cipher::{BlockFramer, DeviceKey};
pub use tag::KeySum;
pub use transport::{Transport, TransportError, TransportKind};
pub use queue::RetryQueue;
pub use uplink::{CycleReport, DeviceProfile, Uplink};
pub use config::AppConfig;
