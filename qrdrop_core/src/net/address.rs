use crate::config::ShareConfig;
use crate::error::{Result, ShareError};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

/// Routed but never contacted: connecting a UDP socket sends no packet.
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

/// Local IPv4 address the OS would use for outbound LAN/internet traffic.
pub async fn local_ipv4() -> Result<Ipv4Addr> {
    let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0)))
        .await
        .map_err(|e| ShareError::NetworkUnavailable(e.to_string()))?;
    socket
        .connect(ROUTE_PROBE_ADDR)
        .await
        .map_err(|e| ShareError::NetworkUnavailable(format!("no route: {}", e)))?;

    match socket
        .local_addr()
        .map_err(|e| ShareError::NetworkUnavailable(e.to_string()))?
        .ip()
    {
        IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
        other => Err(ShareError::NetworkUnavailable(format!(
            "routing selected unusable address {}",
            other
        ))),
    }
}

/// All non-loopback IPv4 interface addresses, sorted. Empty when none.
pub fn all_local_ipv4_addresses() -> Vec<Ipv4Addr> {
    let mut ips: Vec<Ipv4Addr> = match local_ip_address::list_afinet_netifas() {
        Ok(netifas) => netifas
            .into_iter()
            .filter_map(|(_name, ip)| match ip {
                IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
                _ => None,
            })
            .collect(),
        Err(e) => {
            tracing::debug!("Cannot list network interfaces: {}", e);
            Vec::new()
        }
    };
    ips.sort();
    ips.dedup();
    ips
}

/// Pick the address most likely reachable from the LAN:
/// 192.168/16 first, then 10/8, then 172.16/12, then anything else.
pub fn pick_lan_address(candidates: &[Ipv4Addr]) -> Option<Ipv4Addr> {
    let rank = |ip: &Ipv4Addr| match ip.octets() {
        [192, 168, ..] => 0,
        [10, ..] => 1,
        [172, b, ..] if (16..=31).contains(&b) => 2,
        _ => 3,
    };

    candidates
        .iter()
        .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
        .min_by_key(|ip| rank(ip))
        .copied()
}

/// Host to embed in the download URL.
///
/// Uses the configured override, then the routed address, then the best
/// interface address.
pub async fn resolve_advertise_host(config: &ShareConfig) -> Result<String> {
    if let Some(host) = config.advertise_host.as_deref().map(str::trim) {
        if !host.is_empty() {
            return Ok(host.to_string());
        }
    }

    match local_ipv4().await {
        Ok(ip) => Ok(ip.to_string()),
        Err(route_err) => {
            tracing::debug!("Routing probe failed ({}), scanning interfaces", route_err);
            pick_lan_address(&all_local_ipv4_addresses())
                .map(|ip| ip.to_string())
                .ok_or(route_err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_prefers_home_lan() {
        let candidates = [
            Ipv4Addr::new(172, 17, 0, 1),
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::new(192, 168, 1, 20),
        ];
        assert_eq!(
            pick_lan_address(&candidates),
            Some(Ipv4Addr::new(192, 168, 1, 20))
        );
    }

    #[test]
    fn test_pick_ranking_without_home_lan() {
        let candidates = [Ipv4Addr::new(172, 17, 0, 1), Ipv4Addr::new(10, 0, 0, 5)];
        assert_eq!(pick_lan_address(&candidates), Some(Ipv4Addr::new(10, 0, 0, 5)));

        // CGNAT space ranks below every private block
        let candidates = [Ipv4Addr::new(100, 64, 0, 2), Ipv4Addr::new(172, 20, 0, 3)];
        assert_eq!(
            pick_lan_address(&candidates),
            Some(Ipv4Addr::new(172, 20, 0, 3))
        );
    }

    #[test]
    fn test_pick_ignores_loopback() {
        assert_eq!(pick_lan_address(&[Ipv4Addr::LOCALHOST]), None);
        assert_eq!(pick_lan_address(&[]), None);
    }

    #[test]
    fn test_all_addresses_exclude_loopback() {
        let ips = all_local_ipv4_addresses();
        assert!(ips.iter().all(|ip| !ip.is_loopback()));
        assert!(ips.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_override_wins() {
        let config = ShareConfig {
            advertise_host: Some("photobooth.local".to_string()),
            ..Default::default()
        };
        assert_eq!(
            resolve_advertise_host(&config).await.unwrap(),
            "photobooth.local"
        );
    }
}
