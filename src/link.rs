use std::{
    cell::RefCell,
    collections::VecDeque,
    io::ErrorKind,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    rc::Rc,
    time::Duration,
};

use crate::result::{FerryError, FerryResult};

/// The sender's view of the transport: a point-to-point, connected channel.
pub trait DatagramLink {
    fn send(&mut self, buf: &[u8]) -> FerryResult<()>;
    fn recv(&mut self, buf: &mut [u8]) -> FerryResult<usize>;
}

/// The receiver's view: an unconnected socket fielding datagrams from
/// whichever peer happens to send one, replying to that peer's address.
pub trait AddressedDatagramLink {
    fn recv_from(&mut self, buf: &mut [u8]) -> FerryResult<(usize, SocketAddr)>;
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> FerryResult<()>;
}

fn translate_recv_error(err: std::io::Error) -> FerryError {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => FerryError::RecvTimeout,
        _ => FerryError::Io(err),
    }
}

pub struct UdpLink {
    socket: UdpSocket,
}

impl UdpLink {
    pub fn connect(
        local: impl ToSocketAddrs,
        remote: impl ToSocketAddrs,
        timeout: Duration,
    ) -> FerryResult<Self> {
        let socket = UdpSocket::bind(local).map_err(FerryError::Io)?;
        socket.connect(remote).map_err(FerryError::Io)?;
        socket
            .set_read_timeout(Some(timeout))
            .map_err(FerryError::Io)?;
        Ok(Self { socket })
    }
}

impl DatagramLink for UdpLink {
    fn send(&mut self, buf: &[u8]) -> FerryResult<()> {
        self.socket.send(buf).map_err(FerryError::SendFailed)?;
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> FerryResult<usize> {
        self.socket.recv(buf).map_err(translate_recv_error)
    }
}

pub struct UdpServerLink {
    socket: UdpSocket,
}

impl UdpServerLink {
    pub fn bind(local: impl ToSocketAddrs, timeout: Duration) -> FerryResult<Self> {
        let socket = UdpSocket::bind(local).map_err(FerryError::Io)?;
        socket
            .set_read_timeout(Some(timeout))
            .map_err(FerryError::Io)?;
        Ok(Self { socket })
    }
}

impl AddressedDatagramLink for UdpServerLink {
    fn recv_from(&mut self, buf: &mut [u8]) -> FerryResult<(usize, SocketAddr)> {
        self.socket.recv_from(buf).map_err(translate_recv_error)
    }

    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> FerryResult<()> {
        self.socket
            .send_to(buf, addr)
            .map_err(FerryError::SendFailed)?;
        Ok(())
    }
}

type Queue = Rc<RefCell<VecDeque<Vec<u8>>>>;

/// A paired in-memory substitute for `UdpLink`, letting tests drive a
/// sender and receiver against each other (and drop or reorder datagrams
/// between them) without touching a real socket.
pub struct InMemoryLink {
    outbox: Queue,
    inbox: Queue,
}

impl InMemoryLink {
    pub fn pair() -> (Self, Self) {
        let a_to_b = Rc::new(RefCell::new(VecDeque::new()));
        let b_to_a = Rc::new(RefCell::new(VecDeque::new()));
        (
            Self {
                outbox: a_to_b.clone(),
                inbox: b_to_a.clone(),
            },
            Self {
                outbox: b_to_a,
                inbox: a_to_b,
            },
        )
    }
}

impl DatagramLink for InMemoryLink {
    fn send(&mut self, buf: &[u8]) -> FerryResult<()> {
        self.outbox.borrow_mut().push_back(buf.to_vec());
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> FerryResult<usize> {
        match self.inbox.borrow_mut().pop_front() {
            Some(datagram) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok(n)
            }
            None => Err(FerryError::RecvTimeout),
        }
    }
}

/// The address every `InMemoryLink` datagram is reported as arriving from.
/// There is only ever one peer on the other end of a paired queue, so the
/// value is a placeholder rather than anything load-bearing.
fn in_memory_peer() -> SocketAddr {
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 0)
}

impl AddressedDatagramLink for InMemoryLink {
    fn recv_from(&mut self, buf: &mut [u8]) -> FerryResult<(usize, SocketAddr)> {
        let n = self.recv(buf)?;
        Ok((n, in_memory_peer()))
    }

    fn send_to(&mut self, buf: &[u8], _addr: SocketAddr) -> FerryResult<()> {
        self.send(buf)
    }
}
