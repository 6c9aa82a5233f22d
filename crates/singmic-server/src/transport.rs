//! Datagram transport used by the session engine.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use anyhow::{Context, Result};

/// Minimal datagram socket surface the engine needs.
///
/// `recv_from` never blocks: `Ok(None)` means nothing is waiting.
pub trait Transport {
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;
    fn send_to(&mut self, datagram: &[u8], addr: SocketAddr) -> io::Result<()>;
}

/// Non-blocking UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    sock: UdpSocket,
}

impl UdpTransport {
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let sock = UdpSocket::bind(addr).with_context(|| format!("bind udp {addr}"))?;
        sock.set_nonblocking(true)
            .context("set udp socket non-blocking")?;
        Ok(Self { sock })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.sock.local_addr().context("udp local addr")
    }
}

impl Transport for UdpTransport {
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.sock.recv_from(buf) {
            Ok(r) => Ok(Some(r)),
            Err(e) if is_no_data(e.kind()) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn send_to(&mut self, datagram: &[u8], addr: SocketAddr) -> io::Result<()> {
        let n = self.sock.send_to(datagram, addr)?;
        if n != datagram.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send ({n} of {} bytes)", datagram.len()),
            ));
        }
        Ok(())
    }
}

fn is_no_data(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_socket_reports_no_data() {
        let mut t = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut buf = [0u8; 64];
        assert!(t.recv_from(&mut buf).unwrap().is_none());
    }

    #[test]
    fn loopback_send_and_receive() {
        let mut a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut b = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let b_addr = b.local_addr().unwrap();
        a.send_to(b"ping", b_addr).unwrap();

        let mut buf = [0u8; 64];
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            if let Some((n, from)) = b.recv_from(&mut buf).unwrap() {
                assert_eq!(&buf[..n], b"ping");
                assert_eq!(from, a.local_addr().unwrap());
                break;
            }
            assert!(std::time::Instant::now() < deadline, "datagram never arrived");
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }
}
