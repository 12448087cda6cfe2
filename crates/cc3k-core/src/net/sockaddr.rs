use core::net::Ipv4Addr;

/// IPv4 address family.
pub const AF_INET: u16 = 2;

/// Raw `sockaddr` in the chip's layout.
///
/// Bytes 0-1 hold the family (little-endian), bytes 2-3 the port
/// (big-endian), bytes 4-7 the address octets; the rest is zero.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SockAddr([u8; 16]);

impl SockAddr {
    pub fn inet(ip: Ipv4Addr, port: u16) -> Self {
        let mut raw = [0u8; 16];
        raw[..2].copy_from_slice(&AF_INET.to_le_bytes());
        raw[2..4].copy_from_slice(&port.to_be_bytes());
        raw[4..8].copy_from_slice(&ip.octets());
        Self(raw)
    }

    /// Wildcard address for listening sockets.
    pub fn any(port: u16) -> Self {
        Self::inet(Ipv4Addr::UNSPECIFIED, port)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn family(&self) -> u16 {
        u16::from_le_bytes([self.0[0], self.0[1]])
    }

    pub fn port(&self) -> u16 {
        u16::from_be_bytes([self.0[2], self.0[3]])
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.0[4], self.0[5], self.0[6], self.0[7])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inet_address_places_port_before_octets() {
        let addr = SockAddr::inet(Ipv4Addr::new(192, 168, 1, 20), 0x1F90);
        assert_eq!(
            addr.as_bytes(),
            &[2, 0, 0x1F, 0x90, 192, 168, 1, 20, 0, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(addr.family(), AF_INET);
        assert_eq!(addr.port(), 8080);
        assert_eq!(addr.ip(), Ipv4Addr::new(192, 168, 1, 20));
    }

    #[test]
    fn wildcard_address_has_zero_ip() {
        let addr = SockAddr::any(80);
        assert_eq!(&addr.as_bytes()[..8], &[2, 0, 0, 80, 0, 0, 0, 0]);
    }
}
