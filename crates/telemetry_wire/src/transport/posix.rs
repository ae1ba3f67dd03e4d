//! Backend POSIX da estratégia stream (`socket`/`fcntl`/`connect`/`poll`/
//! `getsockopt(SO_ERROR)`), via libc.

use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::time::Duration;

use super::stream::{ConnectStatus, Readiness, StreamBackend};

/// Backend de produção.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixStream;

fn check(rc: libc::c_int) -> io::Result<libc::c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

fn sockaddr(dest: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    // SAFETY: sockaddr_storage é POD; zeros é um valor válido.
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let len = match dest {
        SocketAddr::V4(v4) => {
            // SAFETY: sockaddr_storage tem tamanho e alinhamento para sockaddr_in.
            let sin = unsafe { &mut *(&mut storage as *mut _ as *mut libc::sockaddr_in) };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr = libc::in_addr {
                s_addr: u32::from_ne_bytes(v4.ip().octets()),
            };
            mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            // SAFETY: idem, para sockaddr_in6.
            let sin6 = unsafe { &mut *(&mut storage as *mut _ as *mut libc::sockaddr_in6) };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_flowinfo = v6.flowinfo();
            sin6.sin6_addr.s6_addr = v6.ip().octets();
            sin6.sin6_scope_id = v6.scope_id();
            mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}

/// Socket stream que não vaza para processos filhos.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn open_cloexec(domain: libc::c_int) -> io::Result<RawFd> {
    // SAFETY: chamada sem ponteiros; o fd retornado passa a ser nosso.
    check(unsafe { libc::socket(domain, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) })
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn open_cloexec(domain: libc::c_int) -> io::Result<RawFd> {
    // SAFETY: chamada sem ponteiros; o fd retornado passa a ser nosso.
    let fd = check(unsafe { libc::socket(domain, libc::SOCK_STREAM, 0) })?;
    // SAFETY: fd recém-aberto; fechado aqui se o fcntl falhar.
    if let Err(e) = check(unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) }) {
        unsafe { libc::close(fd) };
        return Err(e);
    }
    Ok(fd)
}

impl StreamBackend for PosixStream {
    type Socket = RawFd;

    fn open(&mut self, dest: &SocketAddr) -> io::Result<RawFd> {
        let domain = if dest.is_ipv4() { libc::AF_INET } else { libc::AF_INET6 };
        open_cloexec(domain)
    }

    fn set_nonblocking(&mut self, fd: &RawFd) -> io::Result<()> {
        // SAFETY: fd aberto por `open`.
        let flags = check(unsafe { libc::fcntl(*fd, libc::F_GETFL) })?;
        check(unsafe { libc::fcntl(*fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
        Ok(())
    }

    fn connect(&mut self, fd: &RawFd, dest: &SocketAddr) -> io::Result<ConnectStatus> {
        let (storage, len) = sockaddr(dest);
        // SAFETY: storage vive até o fim da chamada e len cobre o endereço.
        let rc = unsafe {
            libc::connect(*fd, &storage as *const _ as *const libc::sockaddr, len)
        };
        if rc == 0 {
            return Ok(ConnectStatus::Connected);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINPROGRESS) {
            Ok(ConnectStatus::InProgress)
        } else {
            Err(err)
        }
    }

    fn wait_writable(&mut self, fd: &RawFd, timeout: Option<Duration>) -> io::Result<Readiness> {
        let mut pfd = libc::pollfd {
            fd: *fd,
            events: libc::POLLOUT,
            revents: 0,
        };
        let timeout_ms = match timeout {
            None => -1,
            Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        };
        // SAFETY: um único pollfd válido durante a chamada.
        let ready = check(unsafe { libc::poll(&mut pfd, 1, timeout_ms) })?;
        if ready == 0 {
            Ok(Readiness::TimedOut)
        } else {
            Ok(Readiness::Writable)
        }
    }

    fn take_error(&mut self, fd: &RawFd) -> io::Result<Option<io::Error>> {
        let mut code: libc::c_int = 0;
        let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
        // SAFETY: code/len apontam para buffers do tamanho declarado.
        check(unsafe {
            libc::getsockopt(
                *fd,
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut code as *mut _ as *mut libc::c_void,
                &mut len,
            )
        })?;
        Ok((code != 0).then(|| io::Error::from_raw_os_error(code)))
    }

    fn send(&mut self, fd: &RawFd, payload: &[u8]) -> io::Result<usize> {
        // SAFETY: payload é válido para leitura em todo o seu comprimento.
        let sent = unsafe {
            libc::send(*fd, payload.as_ptr() as *const libc::c_void, payload.len(), 0)
        };
        if sent < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(sent as usize)
        }
    }

    fn close(&mut self, fd: &mut RawFd) {
        if *fd < 0 {
            return;
        }
        // SAFETY: fd aberto por `open` e fechado só aqui; marcado como -1 em seguida.
        unsafe {
            libc::shutdown(*fd, libc::SHUT_RDWR);
            libc::close(*fd);
        }
        *fd = -1;
    }
}
