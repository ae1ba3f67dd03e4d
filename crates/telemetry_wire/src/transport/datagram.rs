//! Estratégia datagrama: socket UDP novo a cada tentativa.

use std::net::{SocketAddr, UdpSocket};
use tracing::debug;

use super::{Transport, TransportError, TransportKind};

/// Envia um datagrama por chamada. Sucesso significa apenas que a pilha
/// local aceitou o pacote; não há confirmação de entrega.
#[derive(Debug, Clone)]
pub struct DatagramSender {
    dest: SocketAddr,
}

impl DatagramSender {
    pub fn new(dest: SocketAddr) -> Self {
        Self { dest }
    }
}

impl Transport for DatagramSender {
    fn send(&mut self, payload: &[u8]) -> Result<usize, TransportError> {
        let bind_addr = if self.dest.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let sock = UdpSocket::bind(bind_addr).map_err(TransportError::Socket)?;

        if let SocketAddr::V4(v4) = self.dest {
            if v4.ip().is_broadcast() {
                sock.set_broadcast(true).map_err(TransportError::Socket)?;
            }
        }

        let sent = sock
            .send_to(payload, self.dest)
            .map_err(TransportError::Send)?;
        debug!("→ {sent} bytes UDP para {}", self.dest);
        // socket fechado ao sair do escopo
        Ok(sent)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Datagram
    }

    fn destination(&self) -> SocketAddr {
        self.dest
    }
}
