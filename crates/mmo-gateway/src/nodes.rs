//! Static server-node bootstrap list for the gateway tier.
//!
//! A production deployment would learn nodes from heartbeats published by
//! each `mmo-server` instance; this reads a flat env-var encoded roster to
//! keep the gateway binary self-contained for the bootstrap/demo case,
//! mirroring `Config::load`'s own env-first style in `mmo-core`.

use mmo_core::balancer::{GlobalLoadBalancer, Health, ServerNode};
use std::time::Instant;

/// One `;`-separated entry per node, fields `:`-separated:
/// `id:region:datacenter:hostname:port:lat:lon:weight:priority:max_connections`.
const NODES_ENV: &str = "GATEWAY_NODES";

fn parse_node(entry: &str) -> Option<ServerNode> {
    let mut fields = entry.split(':');
    let id = fields.next()?.to_string();
    let region = fields.next()?.to_string();
    let datacenter = fields.next()?.to_string();
    let hostname = fields.next()?.to_string();
    let port: u16 = fields.next()?.parse().ok()?;
    let lat: f64 = fields.next()?.parse().ok()?;
    let lon: f64 = fields.next()?.parse().ok()?;
    let weight: u32 = fields.next()?.parse().ok()?;
    let priority: u32 = fields.next()?.parse().ok()?;
    let max_connections: u32 = fields.next()?.parse().ok()?;

    Some(ServerNode {
        id,
        region,
        datacenter,
        hostname,
        port,
        lat,
        lon,
        weight,
        priority,
        health: Health::Healthy,
        active_connections: 0,
        max_connections,
        cpu_percent: 0.0,
        mem_percent: 0.0,
        avg_response_time_ms: 0.0,
        last_heartbeat: Instant::now(),
    })
}

/// Populates `balancer` from `GATEWAY_NODES`, falling back to a single
/// localhost node so the gateway is usable without configuration during
/// local development.
pub fn load_into(balancer: &GlobalLoadBalancer) {
    let raw = std::env::var(NODES_ENV).unwrap_or_default();
    let mut loaded = 0usize;
    for entry in raw.split(';').filter(|s| !s.trim().is_empty()) {
        match parse_node(entry) {
            Some(node) => {
                balancer.register_node(node);
                loaded += 1;
            }
            None => log::warn!("skipping malformed {NODES_ENV} entry: {entry}"),
        }
    }

    if loaded == 0 {
        log::info!("{NODES_ENV} unset or empty, registering a default localhost node");
        balancer.register_node(ServerNode {
            id: "local-0".to_string(),
            region: "local".to_string(),
            datacenter: "dev".to_string(),
            hostname: "127.0.0.1".to_string(),
            port: 8081,
            lat: 0.0,
            lon: 0.0,
            weight: 10,
            priority: 1,
            health: Health::Healthy,
            active_connections: 0,
            max_connections: 5000,
            cpu_percent: 0.0,
            mem_percent: 0.0,
            avg_response_time_ms: 10.0,
            last_heartbeat: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_entry() {
        let node = parse_node("a:us:dc1:host.example.com:9000:1.0:2.0:10:1:100").unwrap();
        assert_eq!(node.id, "a");
        assert_eq!(node.port, 9000);
        assert_eq!(node.max_connections, 100);
    }

    #[test]
    fn rejects_truncated_entry() {
        assert!(parse_node("a:us:dc1").is_none());
    }
}
