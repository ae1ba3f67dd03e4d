//! Estratégia stream: conexão TCP não-bloqueante, uma conexão por envio.
//!
//! Sequência de uma tentativa:
//!
//! ```text
//! open → non-blocking → connect ─┬─ conectado ──────────────────────────────┐
//!                                └─ em andamento → espera gravável           │
//!                                                  → erro pendente == 0? ────┴→ send
//! ```
//!
//! Qualquer falha encerra a tentativa. O socket é sempre fechado (shutdown +
//! close) ao sair, em todos os caminhos.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

use super::{Transport, TransportError, TransportKind};

/// Resultado imediato de um `connect` não-bloqueante.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    Connected,
    InProgress,
}

/// Resultado da espera por escrita.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Writable,
    TimedOut,
}

/// Primitivas de socket usadas pela estratégia stream.
///
/// A implementação de produção é [`super::PosixStream`]; os testes usam um
/// backend roteirizado.
pub trait StreamBackend {
    type Socket;

    fn open(&mut self, dest: &SocketAddr) -> io::Result<Self::Socket>;

    fn set_nonblocking(&mut self, sock: &Self::Socket) -> io::Result<()>;

    fn connect(&mut self, sock: &Self::Socket, dest: &SocketAddr) -> io::Result<ConnectStatus>;

    /// Bloqueia até o socket ficar gravável. `None` = sem timeout.
    fn wait_writable(
        &mut self,
        sock: &Self::Socket,
        timeout: Option<Duration>,
    ) -> io::Result<Readiness>;

    /// Erro assíncrono registrado pela pilha após o connect (`SO_ERROR`).
    fn take_error(&mut self, sock: &Self::Socket) -> io::Result<Option<io::Error>>;

    fn send(&mut self, sock: &Self::Socket, payload: &[u8]) -> io::Result<usize>;

    /// Shutdown + close. Chamado exatamente uma vez por socket aberto.
    fn close(&mut self, sock: &mut Self::Socket);
}

/// Envio por TCP com connect não-bloqueante.
pub struct StreamSender<B: StreamBackend> {
    backend: B,
    dest: SocketAddr,
    connect_timeout: Option<Duration>,
}

impl<B: StreamBackend> StreamSender<B> {
    pub fn new(backend: B, dest: SocketAddr, connect_timeout: Option<Duration>) -> Self {
        Self {
            backend,
            dest,
            connect_timeout,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// Socket aberto; fecha ao sair do escopo.
struct OpenSocket<'a, B: StreamBackend> {
    backend: &'a mut B,
    sock: B::Socket,
}

impl<B: StreamBackend> OpenSocket<'_, B> {
    fn deliver(
        &mut self,
        dest: SocketAddr,
        timeout: Option<Duration>,
        payload: &[u8],
    ) -> Result<usize, TransportError> {
        let Self { backend, sock } = self;

        backend
            .set_nonblocking(sock)
            .map_err(TransportError::NonBlocking)?;

        match backend.connect(sock, &dest).map_err(TransportError::Connect)? {
            ConnectStatus::Connected => debug!("Conectado a {dest}"),
            ConnectStatus::InProgress => {
                debug!("Conexão com {dest} em andamento");
                match backend
                    .wait_writable(sock, timeout)
                    .map_err(TransportError::Wait)?
                {
                    Readiness::Writable => {}
                    Readiness::TimedOut => {
                        return Err(TransportError::TimedOut(timeout.unwrap_or_default()));
                    }
                }
                if let Some(err) = backend
                    .take_error(sock)
                    .map_err(TransportError::PendingErrorQuery)?
                {
                    return Err(TransportError::PendingError(err));
                }
            }
        }

        let sent = backend.send(sock, payload).map_err(TransportError::Send)?;
        debug!("→ {sent} bytes TCP para {dest}");
        Ok(sent)
    }
}

impl<B: StreamBackend> Drop for OpenSocket<'_, B> {
    fn drop(&mut self) {
        self.backend.close(&mut self.sock);
    }
}

impl<B: StreamBackend> Transport for StreamSender<B> {
    fn send(&mut self, payload: &[u8]) -> Result<usize, TransportError> {
        let dest = self.dest;
        let timeout = self.connect_timeout;
        let sock = self.backend.open(&dest).map_err(TransportError::Socket)?;
        let mut open = OpenSocket {
            backend: &mut self.backend,
            sock,
        };
        open.deliver(dest, timeout, payload)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    fn destination(&self) -> SocketAddr {
        self.dest
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
