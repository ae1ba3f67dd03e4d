//! Entrega do ciphertext pela rede.
//!
//! Duas estratégias, escolhidas uma vez na construção:
//! - [`DatagramSender`] – um datagrama UDP por tentativa, sem confirmação
//! - [`StreamSender`] – conexão TCP não-bloqueante e um único `send`
//!
//! Cada chamada a [`Transport::send`] faz no máximo uma tentativa. Repetir
//! envios é papel da [`crate::queue::RetryQueue`].

mod datagram;
#[cfg(unix)]
mod posix;
mod stream;

pub use datagram::DatagramSender;
#[cfg(unix)]
pub use posix::PosixStream;
pub use stream::{ConnectStatus, Readiness, StreamBackend, StreamSender};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Estratégia de entrega.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// UDP, sem conexão nem confirmação.
    #[default]
    Datagram,
    /// TCP, conexão por envio.
    Stream,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Datagram => f.write_str("datagram"),
            TransportKind::Stream => f.write_str("stream"),
        }
    }
}

/// Nome de transporte não reconhecido.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Transporte desconhecido: {0:?} (use datagram|stream)")]
pub struct UnknownTransport(pub String);

impl FromStr for TransportKind {
    type Err = UnknownTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "datagram" | "udp" => Ok(TransportKind::Datagram),
            "stream" | "tcp" => Ok(TransportKind::Stream),
            _ => Err(UnknownTransport(s.to_string())),
        }
    }
}

/// Falhas de uma tentativa de envio. Todas são transitórias para o ciclo.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Falha ao criar socket: {0}")]
    Socket(#[source] io::Error),

    #[error("Falha ao colocar socket em modo não-bloqueante: {0}")]
    NonBlocking(#[source] io::Error),

    #[error("Conexão rejeitada: {0}")]
    Connect(#[source] io::Error),

    #[error("Erro esperando socket ficar gravável: {0}")]
    Wait(#[source] io::Error),

    #[error("Timeout de conexão após {0:?}")]
    TimedOut(Duration),

    #[error("Falha ao consultar erro pendente do socket: {0}")]
    PendingErrorQuery(#[source] io::Error),

    #[error("Erro de conexão pendente: {0}")]
    PendingError(#[source] io::Error),

    #[error("Erro ao enviar: {0}")]
    Send(#[source] io::Error),

    #[error("Transporte {0} indisponível nesta plataforma")]
    Unsupported(TransportKind),
}

/// Uma estratégia de entrega configurada para um destino.
pub trait Transport {
    /// Uma única tentativa de envio. Retorna os bytes aceitos pela pilha local.
    fn send(&mut self, payload: &[u8]) -> Result<usize, TransportError>;

    fn kind(&self) -> TransportKind;

    fn destination(&self) -> SocketAddr;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, payload: &[u8]) -> Result<usize, TransportError> {
        (**self).send(payload)
    }

    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    fn destination(&self) -> SocketAddr {
        (**self).destination()
    }
}

/// Constrói o transporte da build. `connect_timeout` só vale para stream;
/// `None` espera indefinidamente pela conexão.
///
/// Stream depende do backend POSIX; fora de unix retorna
/// [`TransportError::Unsupported`].
pub fn build_transport(
    kind: TransportKind,
    dest: SocketAddr,
    connect_timeout: Option<Duration>,
) -> Result<Box<dyn Transport>, TransportError> {
    match kind {
        TransportKind::Datagram => Ok(Box::new(DatagramSender::new(dest))),
        TransportKind::Stream => stream_transport(dest, connect_timeout),
    }
}

#[cfg(unix)]
fn stream_transport(
    dest: SocketAddr,
    connect_timeout: Option<Duration>,
) -> Result<Box<dyn Transport>, TransportError> {
    Ok(Box::new(StreamSender::new(PosixStream, dest, connect_timeout)))
}

#[cfg(not(unix))]
fn stream_transport(
    _dest: SocketAddr,
    _connect_timeout: Option<Duration>,
) -> Result<Box<dyn Transport>, TransportError> {
    Err(TransportError::Unsupported(TransportKind::Stream))
}
