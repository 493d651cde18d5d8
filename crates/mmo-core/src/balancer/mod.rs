//! Module K: global load balancer, ported from
//! `network/global_load_balancer.h` — seven routing strategies over a
//! registry of `ServerNode`s, sticky session affinity, a scaling advisor,
//! and a periodic health-check sweep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::error::RoutingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancingStrategy {
    RoundRobin,
    LeastConnections,
    WeightedRoundRobin,
    Geographic,
    LeastResponseTime,
    ResourceBased,
    Intelligent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct ServerNode {
    pub id: String,
    pub region: String,
    pub datacenter: String,
    pub hostname: String,
    pub port: u16,
    pub lat: f64,
    pub lon: f64,
    pub weight: u32,
    pub priority: u32,
    pub health: Health,
    pub active_connections: u32,
    pub max_connections: u32,
    pub cpu_percent: f32,
    pub mem_percent: f32,
    pub avg_response_time_ms: f32,
    pub last_heartbeat: Instant,
}

/// Why a particular node was chosen, carried back to the caller per the
/// data model's "routing reason" field rather than discarded once routing
/// completes.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingReason {
    StickySession,
    Strategy(LoadBalancingStrategy),
    Fallback,
}

impl std::fmt::Display for RoutingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutingReason::StickySession => write!(f, "Sticky session"),
            RoutingReason::Strategy(s) => write!(f, "{s:?}"),
            RoutingReason::Fallback => write!(f, "Fallback"),
        }
    }
}

/// Load-balancer output per the data model: the chosen node plus enough to
/// connect to it and explain the decision.
#[derive(Debug, Clone)]
pub struct Route {
    pub node_id: String,
    pub hostname: String,
    pub port: u16,
    pub estimated_latency_ms: f32,
    pub strategy: LoadBalancingStrategy,
    pub reason: RoutingReason,
}

impl ServerNode {
    /// `max(conn/maxConn, (cpu+mem)/200, users/capacity)`, matching
    /// `global_load_balancer.h`'s `CalculateLoadScore` exactly — the three
    /// terms are deliberately not averaged so the worst-loaded dimension
    /// dominates routing decisions.
    pub fn load_score(&self) -> f64 {
        let conn_ratio = self.active_connections as f64 / self.max_connections.max(1) as f64;
        let resource_ratio = (self.cpu_percent + self.mem_percent) as f64 / 200.0;
        conn_ratio.max(resource_ratio)
    }

    pub fn is_routable(&self) -> bool {
        self.health == Health::Healthy && self.active_connections < self.max_connections
    }
}

pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const FAILOVER_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_ACCEPTABLE_LATENCY_MS: f32 = 500.0;
pub const SESSION_AFFINITY_DURATION: Duration = Duration::from_secs(30 * 60);
pub const LOAD_THRESHOLD_SCALE_UP: f64 = 0.8;
pub const LOAD_THRESHOLD_SCALE_DOWN: f64 = 0.3;
pub const MAX_SERVERS_PER_REGION: u32 = 10;
pub const MIN_SERVERS_PER_REGION: u32 = 2;
const STALE_HEARTBEAT: Duration = Duration::from_secs(5 * 60);

struct StickyEntry {
    node_id: String,
    expires_at: Instant,
}

#[derive(Debug, Clone, Copy)]
pub enum ScalingAdvice {
    ScaleUp,
    ScaleDown,
    Hold,
}

pub struct GlobalLoadBalancer {
    nodes: RwLock<HashMap<String, ServerNode>>,
    sticky: RwLock<HashMap<u64, StickyEntry>>,
    round_robin_cursor: RwLock<usize>,
}

impl Default for GlobalLoadBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalLoadBalancer {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            sticky: RwLock::new(HashMap::new()),
            round_robin_cursor: RwLock::new(0),
        }
    }

    pub fn register_node(&self, node: ServerNode) {
        self.nodes.write().insert(node.id.clone(), node);
    }

    pub fn remove_node(&self, id: &str) {
        self.nodes.write().remove(id);
    }

    /// Mirrors `RouteClient`: sticky session first, then strategy-driven
    /// selection among healthy candidates (region-preferred, with all other
    /// healthy nodes kept as fallback).
    pub fn route_client(
        &self,
        player_id: u64,
        preferred_region: Option<&str>,
        strategy: LoadBalancingStrategy,
        client_lat: f64,
        client_lon: f64,
    ) -> Result<Route, RoutingError> {
        if let Some(sticky) = self.sticky_node(player_id) {
            return Ok(sticky);
        }

        let nodes = self.nodes.read();
        let routable: Vec<&ServerNode> = nodes.values().filter(|n| n.is_routable()).collect();
        let regional: Vec<&ServerNode> = routable
            .iter()
            .copied()
            .filter(|n| preferred_region.is_none_or(|r| n.region == r))
            .collect();

        let (candidates, reason) = if !regional.is_empty() {
            (regional, RoutingReason::Strategy(strategy))
        } else if !routable.is_empty() {
            (routable, RoutingReason::Fallback)
        } else {
            return Err(RoutingError::NoHealthyServer);
        };

        let chosen = match strategy {
            LoadBalancingStrategy::RoundRobin => self.select_round_robin(&candidates),
            LoadBalancingStrategy::LeastConnections => Self::select_least_connections(&candidates),
            LoadBalancingStrategy::WeightedRoundRobin => Self::select_weighted(&candidates),
            LoadBalancingStrategy::Geographic => {
                Self::select_geographic(&candidates, client_lat, client_lon)
            }
            LoadBalancingStrategy::LeastResponseTime => Self::select_least_response_time(&candidates),
            LoadBalancingStrategy::ResourceBased => Self::select_resource_based(&candidates),
            LoadBalancingStrategy::Intelligent => {
                Self::select_intelligent(&candidates, client_lat, client_lon)
            }
        };

        let route = Route {
            node_id: chosen.id.clone(),
            hostname: chosen.hostname.clone(),
            port: chosen.port,
            estimated_latency_ms: chosen.avg_response_time_ms,
            strategy,
            reason,
        };
        drop(nodes);
        self.bind_sticky(player_id, route.node_id.clone());
        Ok(route)
    }

    fn sticky_node(&self, player_id: u64) -> Option<Route> {
        let sticky = self.sticky.read();
        let entry = sticky.get(&player_id)?;
        if entry.expires_at > Instant::now() {
            let nodes = self.nodes.read();
            let node = nodes.get(&entry.node_id)?;
            if node.is_routable() {
                return Some(Route {
                    node_id: node.id.clone(),
                    hostname: node.hostname.clone(),
                    port: node.port,
                    estimated_latency_ms: node.avg_response_time_ms,
                    strategy: LoadBalancingStrategy::RoundRobin,
                    reason: RoutingReason::StickySession,
                });
            }
        }
        None
    }

    fn bind_sticky(&self, player_id: u64, node_id: String) {
        self.sticky.write().insert(
            player_id,
            StickyEntry {
                node_id,
                expires_at: Instant::now() + SESSION_AFFINITY_DURATION,
            },
        );
    }

    fn select_round_robin<'a>(&self, candidates: &[&'a ServerNode]) -> &'a ServerNode {
        let mut cursor = self.round_robin_cursor.write();
        *cursor = (*cursor + 1) % candidates.len();
        candidates[*cursor]
    }

    fn select_least_connections<'a>(candidates: &[&'a ServerNode]) -> &'a ServerNode {
        candidates
            .iter()
            .min_by_key(|n| n.active_connections)
            .expect("candidates non-empty")
    }

    fn select_weighted<'a>(candidates: &[&'a ServerNode]) -> &'a ServerNode {
        candidates
            .iter()
            .max_by_key(|n| n.weight.saturating_sub(n.active_connections))
            .expect("candidates non-empty")
    }

    fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let (lat1, lon1, lat2, lon2) = (
            lat1.to_radians(),
            lon1.to_radians(),
            lat2.to_radians(),
            lon2.to_radians(),
        );
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }

    fn select_geographic<'a>(candidates: &[&'a ServerNode], lat: f64, lon: f64) -> &'a ServerNode {
        candidates
            .iter()
            .min_by(|a, b| {
                Self::haversine_km(lat, lon, a.lat, a.lon)
                    .total_cmp(&Self::haversine_km(lat, lon, b.lat, b.lon))
            })
            .expect("candidates non-empty")
    }

    fn select_least_response_time<'a>(candidates: &[&'a ServerNode]) -> &'a ServerNode {
        candidates
            .iter()
            .min_by(|a, b| a.avg_response_time_ms.total_cmp(&b.avg_response_time_ms))
            .expect("candidates non-empty")
    }

    fn select_resource_based<'a>(candidates: &[&'a ServerNode]) -> &'a ServerNode {
        candidates
            .iter()
            .min_by(|a, b| a.load_score().total_cmp(&b.load_score()))
            .expect("candidates non-empty")
    }

    /// `(load_score*0.4) + (latency_score*0.3) + (geographic_score*0.3)`,
    /// per `SelectIntelligent`'s composite formula.
    fn select_intelligent<'a>(candidates: &[&'a ServerNode], lat: f64, lon: f64) -> &'a ServerNode {
        let max_distance = candidates
            .iter()
            .map(|n| Self::haversine_km(lat, lon, n.lat, n.lon))
            .fold(0.0_f64, f64::max)
            .max(1.0);

        candidates
            .iter()
            .min_by(|a, b| {
                let score_a = Self::intelligent_score(a, lat, lon, max_distance);
                let score_b = Self::intelligent_score(b, lat, lon, max_distance);
                score_a.total_cmp(&score_b)
            })
            .expect("candidates non-empty")
    }

    fn intelligent_score(node: &ServerNode, lat: f64, lon: f64, max_distance: f64) -> f64 {
        let load_score = node.load_score();
        let latency_score = (node.avg_response_time_ms as f64 / MAX_ACCEPTABLE_LATENCY_MS as f64).min(1.0);
        let geographic_score = Self::haversine_km(lat, lon, node.lat, node.lon) / max_distance;
        load_score * 0.4 + latency_score * 0.3 + geographic_score * 0.3
    }

    /// Scale-up past `LOAD_THRESHOLD_SCALE_UP` average load, scale-down
    /// below `LOAD_THRESHOLD_SCALE_DOWN`, subject to the per-region floor
    /// and ceiling.
    pub fn analyze_scaling_needs(&self, region: &str) -> ScalingAdvice {
        let nodes = self.nodes.read();
        let regional: Vec<&ServerNode> = nodes.values().filter(|n| n.region == region).collect();
        if regional.is_empty() {
            return ScalingAdvice::Hold;
        }
        let avg_load: f64 = regional.iter().map(|n| n.load_score()).sum::<f64>() / regional.len() as f64;
        let count = regional.len() as u32;

        if avg_load >= LOAD_THRESHOLD_SCALE_UP && count < MAX_SERVERS_PER_REGION {
            ScalingAdvice::ScaleUp
        } else if avg_load <= LOAD_THRESHOLD_SCALE_DOWN && count > MIN_SERVERS_PER_REGION {
            ScalingAdvice::ScaleDown
        } else {
            ScalingAdvice::Hold
        }
    }

    /// Marks nodes unhealthy whose heartbeat has gone stale past the
    /// 5-minute window `PerformHealthChecks` uses.
    pub fn run_health_sweep(&self) {
        let mut nodes = self.nodes.write();
        let now = Instant::now();
        for node in nodes.values_mut() {
            if now.duration_since(node.last_heartbeat) > STALE_HEARTBEAT {
                node.health = Health::Unhealthy;
            }
        }
    }

    pub fn record_heartbeat(&self, id: &str, cpu_percent: f32, mem_percent: f32, active_connections: u32) {
        if let Some(node) = self.nodes.write().get_mut(id) {
            node.last_heartbeat = Instant::now();
            node.cpu_percent = cpu_percent;
            node.mem_percent = mem_percent;
            node.active_connections = active_connections;
            node.health = Health::Healthy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, region: &str, conns: u32, max_conns: u32) -> ServerNode {
        ServerNode {
            id: id.to_string(),
            region: region.to_string(),
            datacenter: "dc1".to_string(),
            hostname: format!("{id}.example.com"),
            port: 7000,
            lat: 0.0,
            lon: 0.0,
            weight: 10,
            priority: 1,
            health: Health::Healthy,
            active_connections: conns,
            max_connections: max_conns,
            cpu_percent: 10.0,
            mem_percent: 10.0,
            avg_response_time_ms: 50.0,
            last_heartbeat: Instant::now(),
        }
    }

    #[test]
    fn least_connections_picks_emptiest_node() {
        let lb = GlobalLoadBalancer::new();
        lb.register_node(node("a", "us", 80, 100));
        lb.register_node(node("b", "us", 10, 100));

        let chosen = lb
            .route_client(1, Some("us"), LoadBalancingStrategy::LeastConnections, 0.0, 0.0)
            .unwrap();
        assert_eq!(chosen.node_id, "b");
    }

    #[test]
    fn sticky_session_keeps_routing_to_same_node() {
        let lb = GlobalLoadBalancer::new();
        lb.register_node(node("a", "us", 10, 100));
        lb.register_node(node("b", "us", 90, 100));

        let first = lb
            .route_client(42, Some("us"), LoadBalancingStrategy::LeastConnections, 0.0, 0.0)
            .unwrap();
        let second = lb
            .route_client(42, Some("us"), LoadBalancingStrategy::LeastConnections, 0.0, 0.0)
            .unwrap();
        assert_eq!(first.node_id, second.node_id);
        assert_eq!(second.reason, RoutingReason::StickySession);
    }

    #[test]
    fn no_healthy_server_is_an_error() {
        let lb = GlobalLoadBalancer::new();
        assert!(matches!(
            lb.route_client(1, None, LoadBalancingStrategy::RoundRobin, 0.0, 0.0),
            Err(RoutingError::NoHealthyServer)
        ));
    }

    #[test]
    fn scaling_advisor_flags_scale_up_under_heavy_load() {
        let lb = GlobalLoadBalancer::new();
        lb.register_node(node("a", "us", 95, 100));
        lb.register_node(node("b", "us", 95, 100));
        assert!(matches!(
            lb.analyze_scaling_needs("us"),
            ScalingAdvice::ScaleUp
        ));
    }

    #[test]
    fn health_sweep_marks_stale_node_unhealthy() {
        let lb = GlobalLoadBalancer::new();
        let mut stale = node("a", "us", 0, 100);
        stale.last_heartbeat = Instant::now() - Duration::from_secs(10 * 60);
        lb.register_node(stale);
        lb.run_health_sweep();
        assert!(matches!(
            lb.route_client(1, Some("us"), LoadBalancingStrategy::RoundRobin, 0.0, 0.0),
            Err(RoutingError::NoHealthyServer)
        ));
    }
}
