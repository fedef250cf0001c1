//! `std::io::{Read, Write}` adapter over a connected `UdpSocket`, so the
//! OpenSSL DTLS layer (which wants a stream-like transport) can drive a
//! datagram socket the same way `openssl`'s TCP-oriented `SslStream` would.

use std::io::{self, Read, Write};
use std::net::UdpSocket;
use std::time::Duration;

pub struct UdpIo {
    socket: UdpSocket,
}

impl UdpIo {
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket.set_read_timeout(timeout)
    }

    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self { socket: self.socket.try_clone()? })
    }
}

impl Read for UdpIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // The socket is connect()ed, so recv() only ever returns datagrams
        // from the server; each read call yields at most one DTLS record.
        self.socket.recv(buf)
    }
}

impl Write for UdpIo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
