use super::{Datagram, ProbeTransport};
use crate::address::AddressFamily;
use crate::codec::DecodeError;
use crate::error::{PingError, PingResult};
use async_trait::async_trait;
use pnet::packet::ipv4::Ipv4Packet;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
#[cfg(any(target_os = "linux", target_os = "android"))]
use std::os::unix::io::AsRawFd;
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tracing::debug;

const RECV_BUFFER_SIZE: usize = 65536;
const IPV4_MIN_HEADER_LEN: usize = 20;

// Length, source and TTL / hop limit of one datagram.
type Received = (usize, IpAddr, Option<u8>);

/// Raw ICMP / ICMPv6 socket driven by the tokio reactor.
pub struct RawTransport {
    family: AddressFamily,
    socket: Option<AsyncFd<Socket>>,
    buffer: Vec<u8>,
}

impl RawTransport {
    /// Opens a raw socket for `family`. Must be called from within a tokio runtime.
    pub fn open(family: AddressFamily) -> PingResult<Self> {
        let (domain, protocol) = match family {
            AddressFamily::V4 => (Domain::IPV4, Protocol::ICMPV4),
            AddressFamily::V6 => (Domain::IPV6, Protocol::ICMPV6),
        };
        let socket = Socket::new(domain, Type::RAW, Some(protocol))
            .map_err(|e| PingError::from_open(family, e))?;
        socket.set_nonblocking(true)?;

        if family == AddressFamily::V6 {
            if let Err(e) = enable_hop_limit_reporting(&socket) {
                debug!(error = %e, "Hop limit of replies will not be reported");
            }
        }

        let socket = AsyncFd::new(socket)?;
        debug!(%family, "Opened raw socket");
        Ok(Self {
            family,
            socket: Some(socket),
            buffer: vec![0; RECV_BUFFER_SIZE],
        })
    }
}

#[async_trait]
impl ProbeTransport for RawTransport {
    fn family(&self) -> AddressFamily {
        self.family
    }

    fn set_time_to_live(&mut self, hops: u8) -> PingResult<()> {
        let socket = self.socket.as_ref().ok_or(PingError::Closed)?.get_ref();
        match self.family {
            AddressFamily::V4 => socket.set_ttl(hops as u32)?,
            AddressFamily::V6 => socket.set_unicast_hops_v6(hops as u32)?,
        }
        Ok(())
    }

    async fn send(&mut self, packet: &[u8], destination: IpAddr) -> PingResult<usize> {
        if !self.family.matches(&destination) {
            return Err(PingError::Transport(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not an {} address", destination, self.family),
            )));
        }
        let socket = self.socket.as_ref().ok_or(PingError::Closed)?;
        let addr = SockAddr::from(SocketAddr::new(destination, 0));

        let written = loop {
            let mut guard = socket.writable().await?;
            match guard.try_io(|inner| inner.get_ref().send_to(packet, &addr)) {
                Ok(result) => break result?,
                Err(_would_block) => continue,
            }
        };
        if written != packet.len() {
            return Err(PingError::PartialWrite {
                written,
                expected: packet.len(),
            });
        }
        Ok(written)
    }

    async fn receive(&mut self, timeout: Duration) -> PingResult<Datagram> {
        let Self {
            family,
            socket,
            buffer,
        } = self;
        let socket = socket.as_ref().ok_or(PingError::Closed)?;
        let family = *family;

        let read = read_datagram(socket, family, buffer);
        let (len, source, hop_limit) = match tokio::time::timeout(timeout, read).await {
            Ok(result) => result?,
            Err(_) => return Err(PingError::Timeout(timeout)),
        };

        match family {
            AddressFamily::V4 => strip_ipv4_header(&buffer[..len], source),
            AddressFamily::V6 => Ok(Datagram {
                bytes: buffer[..len].to_vec(),
                source,
                ttl: hop_limit,
            }),
        }
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!(family = %self.family, "Closed raw socket");
        }
    }
}

impl Drop for RawTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn read_datagram(
    socket: &AsyncFd<Socket>,
    family: AddressFamily,
    buf: &mut [u8],
) -> io::Result<Received> {
    loop {
        let mut guard = socket.readable().await?;
        match guard.try_io(|inner| recv(inner.get_ref(), family, &mut *buf)) {
            Ok(result) => return result,
            Err(_would_block) => continue,
        }
    }
}

// Raw IPv4 sockets deliver the IP header along with the ICMP message.
fn strip_ipv4_header(packet: &[u8], source: IpAddr) -> PingResult<Datagram> {
    let ip = Ipv4Packet::new(packet).ok_or(DecodeError::TooShort {
        expected: IPV4_MIN_HEADER_LEN,
        actual: packet.len(),
    })?;
    let header_len = ip.get_header_length() as usize * 4;
    if header_len < IPV4_MIN_HEADER_LEN || header_len > packet.len() {
        return Err(DecodeError::TooShort {
            expected: header_len.max(IPV4_MIN_HEADER_LEN),
            actual: packet.len(),
        }
        .into());
    }
    Ok(Datagram {
        bytes: packet[header_len..].to_vec(),
        source,
        ttl: Some(ip.get_ttl()),
    })
}

fn recv(
    socket: &Socket,
    family: AddressFamily,
    buf: &mut [u8],
) -> io::Result<Received> {
    match family {
        AddressFamily::V4 => recv_plain(socket, buf),
        AddressFamily::V6 => recv_with_hop_limit(socket, buf),
    }
}

fn recv_plain(socket: &Socket, buf: &mut [u8]) -> io::Result<Received> {
    // SAFETY: recv_from only ever writes initialized bytes into the buffer.
    let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
    let (len, addr) = socket.recv_from(uninit)?;
    let source = addr.as_socket().map(|a| a.ip()).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "datagram from a non-IP address")
    })?;
    Ok((len, source, None))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn enable_hop_limit_reporting(socket: &Socket) -> io::Result<()> {
    let one: libc::c_int = 1;
    let result = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IPV6,
            libc::IPV6_RECVHOPLIMIT,
            &one as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn enable_hop_limit_reporting(_socket: &Socket) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "IPV6_RECVHOPLIMIT not wired on this platform",
    ))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn recv_with_hop_limit(socket: &Socket, buf: &mut [u8]) -> io::Result<Received> {
    let mut source: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
    // u64 storage keeps the control buffer aligned for cmsghdr.
    let mut control = [0u64; 8];
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr() as *mut libc::c_void,
        iov_len: buf.len(),
    };
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_name = &mut source as *mut _ as *mut libc::c_void;
    msg.msg_namelen = std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = std::mem::size_of_val(&control) as _;

    let len = unsafe { libc::recvmsg(socket.as_raw_fd(), &mut msg, 0) };
    if len < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut hop_limit = None;
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::IPPROTO_IPV6 && (*cmsg).cmsg_type == libc::IPV6_HOPLIMIT
            {
                let value = std::ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const libc::c_int);
                hop_limit = u8::try_from(value).ok();
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }
    if hop_limit.is_none() {
        debug!("Reply carried no hop limit");
    }

    let source = std::net::Ipv6Addr::from(source.sin6_addr.s6_addr);
    Ok((len as usize, IpAddr::V6(source), hop_limit))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn recv_with_hop_limit(socket: &Socket, buf: &mut [u8]) -> io::Result<Received> {
    recv_plain(socket, buf)
}
