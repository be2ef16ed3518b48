//! UDP IP discovery, used to learn our public address as seen by a voice server.
//!
//! The request is a fixed 74-byte datagram:
//!
//! | bytes   | field                                   |
//! |---------|-----------------------------------------|
//! | `0..2`  | type, `0x0001` (big-endian)             |
//! | `2..4`  | length excluding type and length, `70`  |
//! | `4..8`  | SSRC (big-endian)                       |
//! | `8..74` | zero                                    |
//!
//! The response echoes this layout with type `0x0002`, a NUL-terminated ASCII address
//! from offset 8, and the port in its final two bytes. The port is **little-endian**,
//! unlike every other field.

use crate::{
    constants::{IP_DISCOVERY_HEADER_LEN, IP_DISCOVERY_LEN, IP_DISCOVERY_REQUEST, IP_DISCOVERY_RESPONSE},
    error::{ProtocolViolation, Result},
};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    str::FromStr,
};
use tokio::net::UdpSocket;
use tracing::{debug, instrument};

/// Our public address and port, as observed by the voice server.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DiscoveredAddress {
    /// Public IP address.
    pub address: IpAddr,
    /// Public UDP port.
    pub port: u16,
}

impl DiscoveredAddress {
    /// Returns this address as a [`SocketAddr`].
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl fmt::Display for DiscoveredAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.socket_addr().fmt(f)
    }
}

/// Builds an IP discovery request for `ssrc`.
#[must_use]
pub fn build_request(ssrc: u32) -> [u8; IP_DISCOVERY_LEN] {
    let mut bytes = [0; IP_DISCOVERY_LEN];

    BigEndian::write_u16(&mut bytes[0..2], IP_DISCOVERY_REQUEST);
    BigEndian::write_u16(&mut bytes[2..4], (IP_DISCOVERY_LEN - 4) as u16);
    BigEndian::write_u32(&mut bytes[4..8], ssrc);

    bytes
}

/// Parses an IP discovery response.
pub fn parse_response(bytes: &[u8]) -> Result<DiscoveredAddress> {
    if bytes.len() < IP_DISCOVERY_LEN {
        return Err(ProtocolViolation::ShortDiscovery.into());
    }

    if bytes.len() > IP_DISCOVERY_LEN {
        return Err(ProtocolViolation::IllegalDiscoveryResponse.into());
    }

    if BigEndian::read_u16(&bytes[0..2]) != IP_DISCOVERY_RESPONSE {
        return Err(ProtocolViolation::IllegalDiscoveryResponse.into());
    }

    let (body, port) = bytes.split_at(bytes.len() - 2);
    let address = &body[IP_DISCOVERY_HEADER_LEN..];
    let address = match address.iter().position(|&b| b == 0) {
        Some(end) => &address[..end],
        None => address,
    };

    let address = std::str::from_utf8(address)
        .ok()
        .and_then(|s| IpAddr::from_str(s).ok())
        .ok_or(ProtocolViolation::IllegalIp)?;

    Ok(DiscoveredAddress {
        address,
        port: LittleEndian::read_u16(port),
    })
}

/// Runs one discovery exchange over a socket already connected to the voice server.
///
/// There is no retry and no timeout: a lost datagram leaves this pending until the
/// caller gives up on it.
#[instrument(skip(udp))]
pub async fn discover(udp: &UdpSocket, ssrc: u32) -> Result<DiscoveredAddress> {
    udp.send(&build_request(ssrc)).await?;

    let mut bytes = [0; IP_DISCOVERY_LEN];
    let len = udp.recv(&mut bytes).await?;

    let out = parse_response(&bytes[..len])?;
    debug!("Discovered public address {out}.");

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn response(address: &str, port: u16) -> [u8; IP_DISCOVERY_LEN] {
        let mut bytes = [0; IP_DISCOVERY_LEN];
        BigEndian::write_u16(&mut bytes[0..2], IP_DISCOVERY_RESPONSE);
        BigEndian::write_u16(&mut bytes[2..4], 70);
        bytes[8..8 + address.len()].copy_from_slice(address.as_bytes());
        LittleEndian::write_u16(&mut bytes[72..74], port);
        bytes
    }

    #[test]
    fn request_layout() {
        let req = build_request(0x0102_0304);

        assert_eq!(req.len(), 74);
        assert_eq!(&req[..8], &[0x00, 0x01, 0x00, 0x46, 0x01, 0x02, 0x03, 0x04]);
        assert!(req[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn port_is_little_endian() {
        let parsed = parse_response(&response("203.0.113.5", 50000)).unwrap();

        assert_eq!(parsed.address, IpAddr::from([203, 0, 113, 5]));
        assert_eq!(parsed.port, 50000);
        // 50000 = 0xC350, stored low byte first.
        assert_eq!(&response("203.0.113.5", 50000)[72..], &[0x50, 0xC3]);
    }

    #[test]
    fn short_responses_are_rejected() {
        assert!(matches!(
            parse_response(&[0, 2, 0, 70, 0, 0, 0, 1, 0]),
            Err(Error::Protocol(ProtocolViolation::ShortDiscovery))
        ));
    }

    #[test]
    fn truncated_responses_are_rejected() {
        let bytes = response("203.0.113.5", 50000);

        assert!(matches!(
            parse_response(&bytes[..IP_DISCOVERY_LEN - 1]),
            Err(Error::Protocol(ProtocolViolation::ShortDiscovery))
        ));
    }

    #[test]
    fn request_type_is_not_a_response() {
        let mut bytes = response("203.0.113.5", 50000);
        bytes[1] = 0x1;

        assert!(matches!(
            parse_response(&bytes),
            Err(Error::Protocol(ProtocolViolation::IllegalDiscoveryResponse))
        ));
    }

    #[test]
    fn garbage_addresses_are_rejected() {
        assert!(matches!(
            parse_response(&response("not-an-ip", 1)),
            Err(Error::Protocol(ProtocolViolation::IllegalIp))
        ));
    }

    #[tokio::test]
    async fn exchange_over_loopback() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let peer = tokio::spawn(async move {
            let mut buf = [0; 128];
            let (len, from) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(len, IP_DISCOVERY_LEN);
            assert_eq!(BigEndian::read_u32(&buf[4..8]), 42);

            server
                .send_to(&response("198.51.100.7", 40_123), from)
                .await
                .unwrap();
        });

        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        udp.connect(server_addr).await.unwrap();

        let found = discover(&udp, 42).await.unwrap();
        peer.await.unwrap();

        assert_eq!(found.socket_addr(), "198.51.100.7:40123".parse().unwrap());
    }
}
