use std::net::IpAddr;

use ipnet::IpNet;

/// Address helpers for the emulated network's address space

/// Check if an address belongs to the emulated network's address space
pub fn is_in_space(address: &IpAddr, space: &IpNet) -> bool {
    space.contains(address)
}

/// Split a tcpdump `-nn` endpoint token into address and port.
///
/// tcpdump prints endpoints as `10.0.0.1.5001` / `fe80::1.546` (address,
/// dot, numeric port) or as a bare address when the protocol has no ports
/// (ICMP, ICMPv6). The trailing `:` after the destination must already be
/// stripped.
pub fn parse_endpoint(endpoint: &str) -> Option<(IpAddr, Option<u16>)> {
    if let Ok(address) = endpoint.parse::<IpAddr>() {
        return Some((address, None));
    }
    let (address, port) = endpoint.rsplit_once('.')?;
    let port = port.parse::<u16>().ok()?;
    let address = address.parse::<IpAddr>().ok()?;
    Some((address, Some(port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        let h1: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(parse_endpoint("10.0.0.1.5001"), Some((h1, Some(5001))));
        assert_eq!(parse_endpoint("10.0.0.1"), Some((h1, None)));

        let link_local: IpAddr = "fe80::1".parse().unwrap();
        assert_eq!(parse_endpoint("fe80::1.546"), Some((link_local, Some(546))));
        assert_eq!(parse_endpoint("fe80::1"), Some((link_local, None)));
        assert_eq!(
            parse_endpoint("ff02::1:2.547"),
            Some(("ff02::1:2".parse().unwrap(), Some(547)))
        );

        assert_eq!(parse_endpoint("10.0.0.1.http"), None);
        assert_eq!(parse_endpoint("h1"), None);
    }

    #[test]
    fn test_is_in_space() {
        let space: IpNet = "10.0.0.0/24".parse().unwrap();
        assert!(is_in_space(&"10.0.0.6".parse().unwrap(), &space));
        assert!(!is_in_space(&"10.0.1.6".parse().unwrap(), &space));
        assert!(!is_in_space(&"::1".parse().unwrap(), &space));
    }
}
