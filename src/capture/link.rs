//! Just enough link, network and transport layer parsing to evaluate filters.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use pcap_file::DataLink;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86dd;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88a8;

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// What a filter can see of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketInfo {
    /// Length of the frame on the wire.
    pub len: usize,
    /// Network layer, if the frame carries IP.
    pub ip: Option<IpInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpInfo {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub transport: Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transport {
    /// IP protocol number (or IPv6 next header).
    pub protocol: u8,
    /// Source and destination port. `None` for non-first fragments, truncated
    /// headers or protocols without ports.
    pub ports: Option<(u16, u16)>,
}

impl PacketInfo {
    pub fn parse(datalink: DataLink, data: &[u8], orig_len: usize) -> PacketInfo {
        let ip = network_layer(datalink, data).and_then(parse_ip);
        PacketInfo { len: orig_len, ip }
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self.ip, Some(IpInfo { src: IpAddr::V4(_), .. }))
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self.ip, Some(IpInfo { src: IpAddr::V6(_), .. }))
    }

    pub fn protocol(&self) -> Option<u8> {
        self.ip.map(|ip| ip.transport.protocol)
    }

    pub fn ports(&self) -> Option<(u16, u16)> {
        self.ip.and_then(|ip| ip.transport.ports)
    }
}

fn network_layer(datalink: DataLink, data: &[u8]) -> Option<&[u8]> {
    match datalink {
        DataLink::ETHERNET => ethernet(data),
        DataLink::LINUX_SLL => {
            if data.len() < 16 {
                return None;
            }
            let proto = u16::from_be_bytes([data[14], data[15]]);
            is_ip_ethertype(proto).then(|| &data[16..])
        }
        DataLink::RAW | DataLink::IPV4 | DataLink::IPV6 => Some(data),
        // The 4 byte family is in host order for NULL. We go by the IP version instead.
        DataLink::NULL | DataLink::LOOP => data.get(4..),
        _ => None,
    }
}

fn ethernet(data: &[u8]) -> Option<&[u8]> {
    let mut pos = 12;
    loop {
        let ethertype = u16::from_be_bytes([*data.get(pos)?, *data.get(pos + 1)?]);
        pos += 2;
        match ethertype {
            ETHERTYPE_VLAN | ETHERTYPE_QINQ => pos += 2,
            t if is_ip_ethertype(t) => return data.get(pos..),
            _ => return None,
        }
    }
}

fn is_ip_ethertype(t: u16) -> bool {
    t == ETHERTYPE_IPV4 || t == ETHERTYPE_IPV6
}

fn parse_ip(buf: &[u8]) -> Option<IpInfo> {
    match buf.first()? >> 4 {
        4 => ipv4(buf),
        6 => ipv6(buf),
        _ => None,
    }
}

fn ipv4(buf: &[u8]) -> Option<IpInfo> {
    let ihl = (buf[0] & 0x0f) as usize * 4;
    if ihl < 20 || buf.len() < 20 {
        return None;
    }

    let fragment_offset = u16::from_be_bytes([buf[6], buf[7]]) & 0x1fff;
    let protocol = buf[9];
    let src = Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]);
    let dst = Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]);

    let ports = if fragment_offset == 0 {
        buf.get(ihl..).and_then(|l4| ports(protocol, l4))
    } else {
        None
    };

    Some(IpInfo {
        src: src.into(),
        dst: dst.into(),
        transport: Transport { protocol, ports },
    })
}

// Extension headers are not followed.
fn ipv6(buf: &[u8]) -> Option<IpInfo> {
    if buf.len() < 40 {
        return None;
    }

    let protocol = buf[6];
    let mut src = [0; 16];
    src.copy_from_slice(&buf[8..24]);
    let mut dst = [0; 16];
    dst.copy_from_slice(&buf[24..40]);

    Some(IpInfo {
        src: Ipv6Addr::from(src).into(),
        dst: Ipv6Addr::from(dst).into(),
        transport: Transport {
            protocol,
            ports: ports(protocol, &buf[40..]),
        },
    })
}

fn ports(protocol: u8, l4: &[u8]) -> Option<(u16, u16)> {
    if protocol != IPPROTO_UDP && protocol != IPPROTO_TCP {
        return None;
    }
    if l4.len() < 4 {
        return None;
    }
    Some((
        u16::from_be_bytes([l4[0], l4[1]]),
        u16::from_be_bytes([l4[2], l4[3]]),
    ))
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// IPv4 + UDP without options or checksums.
    pub fn ipv4_udp(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
        let total = 20 + 8 + payload.len();
        let mut v = vec![0x45, 0, 0, 0, 0, 0, 0x40, 0, 64, IPPROTO_UDP, 0, 0];
        v[2..4].copy_from_slice(&(total as u16).to_be_bytes());
        v.extend_from_slice(&src);
        v.extend_from_slice(&dst);
        v.extend_from_slice(&sport.to_be_bytes());
        v.extend_from_slice(&dport.to_be_bytes());
        v.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        v.extend_from_slice(&[0, 0]);
        v.extend_from_slice(payload);
        v
    }

    fn ethernet_frame(ethertypes: &[u16], ip: &[u8]) -> Vec<u8> {
        let mut v = vec![0; 12];
        for (i, t) in ethertypes.iter().enumerate() {
            v.extend_from_slice(&t.to_be_bytes());
            if i + 1 < ethertypes.len() {
                // VLAN tag control information.
                v.extend_from_slice(&[0x00, 0x64]);
            }
        }
        v.extend_from_slice(ip);
        v
    }

    #[test]
    fn ethernet_ipv4_udp() {
        let ip = ipv4_udp([192, 168, 1, 1], [192, 168, 1, 2], 1234, 5678, b"abc");
        let frame = ethernet_frame(&[ETHERTYPE_IPV4], &ip);
        let info = PacketInfo::parse(DataLink::ETHERNET, &frame, frame.len());

        assert!(info.is_ipv4());
        assert_eq!(info.len, 14 + 28 + 3);
        assert_eq!(info.protocol(), Some(IPPROTO_UDP));
        assert_eq!(info.ports(), Some((1234, 5678)));
        let ip = info.ip.unwrap();
        assert_eq!(ip.src, IpAddr::from([192, 168, 1, 1]));
        assert_eq!(ip.dst, IpAddr::from([192, 168, 1, 2]));
    }

    #[test]
    fn ethernet_vlan() {
        let ip = ipv4_udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, b"");
        let frame = ethernet_frame(&[ETHERTYPE_QINQ, ETHERTYPE_VLAN, ETHERTYPE_IPV4], &ip);
        let info = PacketInfo::parse(DataLink::ETHERNET, &frame, frame.len());
        assert_eq!(info.ports(), Some((1, 2)));
    }

    #[test]
    fn ethernet_not_ip() {
        let frame = ethernet_frame(&[0x0806], &[0; 28]);
        let info = PacketInfo::parse(DataLink::ETHERNET, &frame, frame.len());
        assert_eq!(info.ip, None);
    }

    #[test]
    fn linux_sll() {
        let ip = ipv4_udp([10, 0, 0, 1], [10, 0, 0, 2], 3, 4, b"");
        let mut frame = vec![0; 14];
        frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        frame.extend_from_slice(&ip);
        let info = PacketInfo::parse(DataLink::LINUX_SLL, &frame, frame.len());
        assert_eq!(info.ports(), Some((3, 4)));
    }

    #[test]
    fn null_loopback() {
        let ip = ipv4_udp([127, 0, 0, 1], [127, 0, 0, 1], 5, 6, b"");
        let mut frame = vec![2, 0, 0, 0];
        frame.extend_from_slice(&ip);
        let info = PacketInfo::parse(DataLink::NULL, &frame, frame.len());
        assert_eq!(info.ports(), Some((5, 6)));
    }

    #[test]
    fn ipv6_udp() {
        let mut ip = vec![0x60, 0, 0, 0, 0, 12, IPPROTO_UDP, 64];
        ip.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        ip.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        ip.extend_from_slice(&[0x13, 0x88, 0x17, 0x70, 0, 12, 0, 0, 1, 2, 3, 4]);
        let info = PacketInfo::parse(DataLink::RAW, &ip, ip.len());

        assert!(info.is_ipv6());
        assert_eq!(info.ports(), Some((5000, 6000)));
    }

    #[test]
    fn fragment_has_no_ports() {
        let mut ip = ipv4_udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, b"abcd");
        // Fragment offset 8 (64 bytes).
        ip[6] = 0x00;
        ip[7] = 0x08;
        let info = PacketInfo::parse(DataLink::RAW, &ip, ip.len());
        assert_eq!(info.protocol(), Some(IPPROTO_UDP));
        assert_eq!(info.ports(), None);
    }

    #[test]
    fn truncated() {
        let ip = ipv4_udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, b"");
        let info = PacketInfo::parse(DataLink::RAW, &ip[..22], 100);
        assert!(info.is_ipv4());
        assert_eq!(info.ports(), None);
        assert_eq!(info.len, 100);

        let info = PacketInfo::parse(DataLink::RAW, &ip[..10], 100);
        assert_eq!(info.ip, None);
    }
}
