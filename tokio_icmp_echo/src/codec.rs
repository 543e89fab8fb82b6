//! ICMP / ICMPv6 Echo Request encoding and reply decoding.
//!
//! Buffers handled here start at the ICMP header: the IPv4 header a raw
//! socket hands back is stripped by the transport before decoding.

use crate::address::AddressFamily;
use pnet::packet::icmp::{self, IcmpCode, IcmpPacket, IcmpTypes};
use pnet::packet::icmpv6::{self, Icmpv6Code, Icmpv6Packet, Icmpv6Types};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::Packet;
use thiserror::Error;

/// Type, code, checksum, identifier and sequence number.
pub const HEADER_LEN: usize = 8;

const IPV4_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Payload of {size} bytes does not fit in one datagram (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Message too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Bad checksum: computed {computed:#06x}, found {found:#06x}")]
    Checksum { computed: u16, found: u16 },
}

/// Largest payload an Echo Request of this family can carry without fragmentation
/// of the length fields.
pub fn max_payload(family: AddressFamily) -> usize {
    match family {
        AddressFamily::V4 => u16::MAX as usize - IPV4_HEADER_LEN - HEADER_LEN,
        AddressFamily::V6 => u16::MAX as usize - HEADER_LEN,
    }
}

/// Deterministic filler bytes for the request payload.
pub fn payload_pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// Whether `ty` is an ICMP error message, as opposed to an informational one.
pub fn is_error_type(family: AddressFamily, ty: u8) -> bool {
    match family {
        AddressFamily::V4 => matches!(ty, 3 | 4 | 5 | 11 | 12),
        AddressFamily::V6 => ty < 128,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoId {
    pub identifier: u16,
    pub sequence: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoRequest {
    family: AddressFamily,
    id: EchoId,
    payload: Vec<u8>,
}

impl EchoRequest {
    pub fn new(
        family: AddressFamily,
        identifier: u16,
        sequence: u16,
        payload_size: usize,
    ) -> Result<Self, EncodeError> {
        let max = max_payload(family);
        if payload_size > max {
            return Err(EncodeError::PayloadTooLarge {
                size: payload_size,
                max,
            });
        }
        Ok(Self {
            family,
            id: EchoId {
                identifier,
                sequence,
            },
            payload: payload_pattern(payload_size),
        })
    }

    pub fn id(&self) -> EchoId {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.wire_len()];
        match self.family {
            AddressFamily::V4 => {
                // Buffer is sized above, so the view always fits.
                let view = icmp::echo_request::MutableEchoRequestPacket::new(&mut buf);
                if let Some(mut packet) = view {
                    packet.set_icmp_type(IcmpTypes::EchoRequest);
                    packet.set_icmp_code(IcmpCode::new(0));
                    packet.set_identifier(self.id.identifier);
                    packet.set_sequence_number(self.id.sequence);
                    packet.set_payload(&self.payload);
                    let csum = pnet::util::checksum(packet.packet(), 1);
                    packet.set_checksum(csum);
                }
            }
            AddressFamily::V6 => {
                // The checksum covers a pseudo-header only the kernel knows: left at zero.
                if let Some(mut packet) =
                    icmpv6::echo_request::MutableEchoRequestPacket::new(&mut buf)
                {
                    packet.set_icmpv6_type(Icmpv6Types::EchoRequest);
                    packet.set_icmpv6_code(Icmpv6Code::new(0));
                    packet.set_identifier(self.id.identifier);
                    packet.set_sequence_number(self.id.sequence);
                    packet.set_payload(&self.payload);
                }
            }
        }
        buf
    }
}

/// Builds the wire form of an Echo Request.
pub fn encode(
    family: AddressFamily,
    identifier: u16,
    sequence: u16,
    payload_size: usize,
) -> Result<Vec<u8>, EncodeError> {
    Ok(EchoRequest::new(family, identifier, sequence, payload_size)?.to_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    EchoReply,
    /// Our own request, seen when a raw IPv4 socket loops it back.
    EchoRequest,
    TimeExceeded,
    Other(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoReply {
    pub kind: ReplyKind,
    pub ty: u8,
    pub code: u8,
    /// For echo messages, the header fields. For ICMP errors, the fields of the
    /// quoted Echo Request when the quote is one.
    pub echo: Option<EchoId>,
    /// Bytes following the 8 byte header.
    pub payload_len: usize,
}

/// Parses an ICMP message of the given family.
pub fn decode(bytes: &[u8], family: AddressFamily) -> Result<EchoReply, DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::TooShort {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    }
    match family {
        AddressFamily::V4 => decode_v4(bytes),
        AddressFamily::V6 => decode_v6(bytes),
    }
}

fn header_id(bytes: &[u8]) -> EchoId {
    EchoId {
        identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
        sequence: u16::from_be_bytes([bytes[6], bytes[7]]),
    }
}

fn decode_v4(bytes: &[u8]) -> Result<EchoReply, DecodeError> {
    let packet = IcmpPacket::new(bytes).ok_or(DecodeError::TooShort {
        expected: HEADER_LEN,
        actual: bytes.len(),
    })?;
    let computed = pnet::util::checksum(bytes, 1);
    let found = packet.get_checksum();
    if computed != found {
        return Err(DecodeError::Checksum { computed, found });
    }

    let ty = packet.get_icmp_type();
    let code = packet.get_icmp_code().0;
    let payload_len = bytes.len() - HEADER_LEN;
    let (kind, echo) = match ty {
        IcmpTypes::EchoReply => (ReplyKind::EchoReply, Some(header_id(bytes))),
        IcmpTypes::EchoRequest => (ReplyKind::EchoRequest, Some(header_id(bytes))),
        IcmpTypes::TimeExceeded => (ReplyKind::TimeExceeded, quoted_v4(&bytes[HEADER_LEN..])),
        IcmpTypes::DestinationUnreachable
        | IcmpTypes::SourceQuench
        | IcmpTypes::RedirectMessage
        | IcmpTypes::ParameterProblem => (ReplyKind::Other(ty.0), quoted_v4(&bytes[HEADER_LEN..])),
        _ => (ReplyKind::Other(ty.0), None),
    };
    Ok(EchoReply {
        kind,
        ty: ty.0,
        code,
        echo,
        payload_len,
    })
}

fn decode_v6(bytes: &[u8]) -> Result<EchoReply, DecodeError> {
    // Checksum already verified by the kernel against the pseudo-header.
    let packet = Icmpv6Packet::new(bytes).ok_or(DecodeError::TooShort {
        expected: HEADER_LEN,
        actual: bytes.len(),
    })?;
    let ty = packet.get_icmpv6_type();
    let code = packet.get_icmpv6_code().0;
    let payload_len = bytes.len() - HEADER_LEN;
    let (kind, echo) = match ty {
        Icmpv6Types::EchoReply => (ReplyKind::EchoReply, Some(header_id(bytes))),
        Icmpv6Types::EchoRequest => (ReplyKind::EchoRequest, Some(header_id(bytes))),
        Icmpv6Types::TimeExceeded => (ReplyKind::TimeExceeded, quoted_v6(&bytes[HEADER_LEN..])),
        // Error messages occupy types 0-127.
        t if t.0 < 128 => (ReplyKind::Other(t.0), quoted_v6(&bytes[HEADER_LEN..])),
        t => (ReplyKind::Other(t.0), None),
    };
    Ok(EchoReply {
        kind,
        ty: ty.0,
        code,
        echo,
        payload_len,
    })
}

fn quoted_v4(quote: &[u8]) -> Option<EchoId> {
    let ip = Ipv4Packet::new(quote)?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return None;
    }
    let ihl = ip.get_header_length() as usize * 4;
    if ihl < IPV4_HEADER_LEN || quote.len() < ihl + HEADER_LEN {
        return None;
    }
    let echo = icmp::echo_request::EchoRequestPacket::new(&quote[ihl..])?;
    if echo.get_icmp_type() != IcmpTypes::EchoRequest {
        return None;
    }
    Some(EchoId {
        identifier: echo.get_identifier(),
        sequence: echo.get_sequence_number(),
    })
}

fn quoted_v6(quote: &[u8]) -> Option<EchoId> {
    let ip = Ipv6Packet::new(quote)?;
    if ip.get_next_header() != IpNextHeaderProtocols::Icmpv6 {
        return None;
    }
    if quote.len() < IPV6_HEADER_LEN + HEADER_LEN {
        return None;
    }
    let echo = icmpv6::echo_request::EchoRequestPacket::new(&quote[IPV6_HEADER_LEN..])?;
    if echo.get_icmpv6_type() != Icmpv6Types::EchoRequest {
        return None;
    }
    Some(EchoId {
        identifier: echo.get_identifier(),
        sequence: echo.get_sequence_number(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Turns an encoded request into the reply a peer would send back.
    fn as_reply_v4(mut request: Vec<u8>) -> Vec<u8> {
        request[0] = 0;
        request[2] = 0;
        request[3] = 0;
        let csum = pnet::util::checksum(&request, 1);
        request[2..4].copy_from_slice(&csum.to_be_bytes());
        request
    }

    fn ipv4_header(payload_len: usize) -> Vec<u8> {
        let mut header = vec![0u8; IPV4_HEADER_LEN];
        header[0] = 0x45;
        header[2..4].copy_from_slice(&((IPV4_HEADER_LEN + payload_len) as u16).to_be_bytes());
        header[8] = 1;
        header[9] = 1;
        header[12..16].copy_from_slice(&[192, 0, 2, 1]);
        header[16..20].copy_from_slice(&[198, 51, 100, 9]);
        header
    }

    #[test]
    fn encode_v4_layout() {
        let bytes = encode(AddressFamily::V4, 0xABCD, 7, 56).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 56);
        assert_eq!(bytes[0], 8);
        assert_eq!(bytes[1], 0);
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 0xABCD);
        assert_eq!(u16::from_be_bytes([bytes[6], bytes[7]]), 7);
        assert_eq!(&bytes[HEADER_LEN..], &payload_pattern(56)[..]);
        let mut zeroed = bytes.clone();
        zeroed[2] = 0;
        zeroed[3] = 0;
        let csum = pnet::util::checksum(&zeroed, 1);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), csum);
    }

    #[test]
    fn encode_v6_layout() {
        let bytes = encode(AddressFamily::V6, 1, 2, 3).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 3);
        assert_eq!(bytes[0], 128);
        assert_eq!(bytes[1], 0);
        assert_eq!(&bytes[2..4], &[0, 0]);
        assert_eq!(&bytes[4..8], &[0, 1, 0, 2]);
    }

    #[test]
    fn encode_sizes() {
        for size in [0usize, 1, 55, 56, 1000] {
            for family in [AddressFamily::V4, AddressFamily::V6] {
                assert_eq!(encode(family, 1, 1, size).unwrap().len(), HEADER_LEN + size);
            }
        }
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let max = max_payload(AddressFamily::V4);
        assert!(encode(AddressFamily::V4, 1, 1, max).is_ok());
        assert_eq!(
            encode(AddressFamily::V4, 1, 1, max + 1),
            Err(EncodeError::PayloadTooLarge { size: max + 1, max })
        );
    }

    #[test]
    fn encoded_request_decodes() {
        let bytes = encode(AddressFamily::V4, 4242, 31, 17).unwrap();
        let reply = decode(&bytes, AddressFamily::V4).unwrap();
        assert_eq!(reply.kind, ReplyKind::EchoRequest);
        assert_eq!(
            reply.echo,
            Some(EchoId {
                identifier: 4242,
                sequence: 31
            })
        );
        assert_eq!(reply.payload_len, 17);

        let bytes = encode(AddressFamily::V6, 4242, 31, 0).unwrap();
        let reply = decode(&bytes, AddressFamily::V6).unwrap();
        assert_eq!(reply.kind, ReplyKind::EchoRequest);
        assert_eq!(reply.echo.map(|e| e.sequence), Some(31));
    }

    #[test]
    fn decode_echo_reply_v4() {
        let bytes = as_reply_v4(encode(AddressFamily::V4, 99, 1000, 56).unwrap());
        let reply = decode(&bytes, AddressFamily::V4).unwrap();
        assert_eq!(reply.kind, ReplyKind::EchoReply);
        assert_eq!(reply.ty, 0);
        assert_eq!(reply.code, 0);
        assert_eq!(
            reply.echo,
            Some(EchoId {
                identifier: 99,
                sequence: 1000
            })
        );
        assert_eq!(reply.payload_len, 56);
    }

    #[test]
    fn decode_echo_reply_v6() {
        let mut bytes = encode(AddressFamily::V6, 5, 6, 8).unwrap();
        bytes[0] = 129;
        let reply = decode(&bytes, AddressFamily::V6).unwrap();
        assert_eq!(reply.kind, ReplyKind::EchoReply);
        assert_eq!(
            reply.echo,
            Some(EchoId {
                identifier: 5,
                sequence: 6
            })
        );
    }

    #[test]
    fn decode_too_short() {
        assert_eq!(
            decode(&[0, 0, 0], AddressFamily::V4),
            Err(DecodeError::TooShort {
                expected: HEADER_LEN,
                actual: 3
            })
        );
        assert!(decode(&[], AddressFamily::V6).is_err());
    }

    #[test]
    fn decode_bad_checksum() {
        let mut bytes = as_reply_v4(encode(AddressFamily::V4, 1, 2, 4).unwrap());
        bytes[9] ^= 0xFF;
        assert!(matches!(
            decode(&bytes, AddressFamily::V4),
            Err(DecodeError::Checksum { .. })
        ));
    }

    #[test]
    fn decode_time_exceeded_v4() {
        let request = encode(AddressFamily::V4, 777, 12, 56).unwrap();
        let mut quote = ipv4_header(request.len());
        quote.extend_from_slice(&request[..HEADER_LEN]);

        let mut bytes = vec![11, 0, 0, 0, 0, 0, 0, 0];
        bytes.extend_from_slice(&quote);
        let csum = pnet::util::checksum(&bytes, 1);
        bytes[2..4].copy_from_slice(&csum.to_be_bytes());

        let reply = decode(&bytes, AddressFamily::V4).unwrap();
        assert_eq!(reply.kind, ReplyKind::TimeExceeded);
        assert_eq!(
            reply.echo,
            Some(EchoId {
                identifier: 777,
                sequence: 12
            })
        );
    }

    #[test]
    fn decode_time_exceeded_v6() {
        let request = encode(AddressFamily::V6, 300, 4, 0).unwrap();
        let mut ip = vec![0u8; IPV6_HEADER_LEN];
        ip[0] = 0x60;
        ip[4..6].copy_from_slice(&(request.len() as u16).to_be_bytes());
        ip[6] = 58;
        ip[7] = 1;

        let mut bytes = vec![3, 0, 0, 0, 0, 0, 0, 0];
        bytes.extend_from_slice(&ip);
        bytes.extend_from_slice(&request);

        let reply = decode(&bytes, AddressFamily::V6).unwrap();
        assert_eq!(reply.kind, ReplyKind::TimeExceeded);
        assert_eq!(reply.echo.map(|e| e.identifier), Some(300));
    }

    #[test]
    fn decode_other_types() {
        // Destination unreachable quoting a UDP datagram.
        let mut quote = ipv4_header(8);
        quote[9] = 17;
        quote.extend_from_slice(&[0u8; 8]);
        let mut bytes = vec![3, 3, 0, 0, 0, 0, 0, 0];
        bytes.extend_from_slice(&quote);
        let csum = pnet::util::checksum(&bytes, 1);
        bytes[2..4].copy_from_slice(&csum.to_be_bytes());

        let reply = decode(&bytes, AddressFamily::V4).unwrap();
        assert_eq!(reply.kind, ReplyKind::Other(3));
        assert_eq!(reply.code, 3);
        assert_eq!(reply.echo, None);

        assert!(is_error_type(AddressFamily::V4, 3));
        assert!(!is_error_type(AddressFamily::V4, 13));
        assert!(is_error_type(AddressFamily::V6, 1));
        assert!(!is_error_type(AddressFamily::V6, 135));

        // Router advertisement carries no quote.
        let reply = decode(&[134, 0, 0, 0, 64, 0, 0, 0], AddressFamily::V6).unwrap();
        assert_eq!(reply.kind, ReplyKind::Other(134));
        assert_eq!(reply.echo, None);
    }
}
