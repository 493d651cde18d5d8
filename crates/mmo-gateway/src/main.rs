//! Edge routing tier: Module K (global load balancer) fronted by Module L
//! (security gate), exactly the "new connections from the edge first
//! traverse K, then L, before entering B" ordering spec.md's system
//! overview describes. A client dials this process first, receives a
//! `RouteResponseMsg` naming the `mmo-server` node to connect to, then opens
//! its real session there — this process never proxies game traffic itself.

mod nodes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use mmo_core::balancer::{GlobalLoadBalancer, LoadBalancingStrategy};
use mmo_core::codec::{self, Envelope, MessageType, RouteRequestMsg, RouteResponseMsg};
use mmo_core::security::SecurityGate;

#[derive(Parser, Debug)]
#[command(name = "mmo-gateway", about = "Edge load-balancing/routing tier")]
struct Args {
    #[arg(long, env = "GATEWAY_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "GATEWAY_PORT", default_value_t = 9000)]
    port: u16,

    #[arg(long, env = "GATEWAY_THREADS")]
    threads: Option<usize>,
}

struct GatewayState {
    balancer: GlobalLoadBalancer,
    security: SecurityGate,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let worker_threads = args
        .threads
        .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let balancer = GlobalLoadBalancer::new();
    nodes::load_into(&balancer);
    let state = Arc::new(GatewayState {
        balancer,
        security: SecurityGate::default(),
    });

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    log::info!("mmo-gateway listening on {addr}");

    let health_state = state.clone();
    let health_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            health_state.balancer.run_health_sweep();
            for region in ["us", "eu", "local"] {
                match health_state.balancer.analyze_scaling_needs(region) {
                    mmo_core::balancer::ScalingAdvice::ScaleUp => {
                        log::info!("scaling advisor: region {region} should scale up")
                    }
                    mmo_core::balancer::ScalingAdvice::ScaleDown => {
                        log::info!("scaling advisor: region {region} should scale down")
                    }
                    mmo_core::balancer::ScalingAdvice::Hold => {}
                }
            }
        }
    });

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::warn!("accept failed: {e}");
                        continue;
                    }
                };
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_routing_request(state, stream, peer_addr).await {
                        log::debug!("routing request from {peer_addr} failed: {e}");
                    }
                });
            }
            _ = wait_for_shutdown_signal() => {
                log::info!("mmo-gateway shutdown signal received");
                let _ = shutdown_tx.send(true);
                break;
            }
        }
    }

    let _ = shutdown_rx.changed().await;
    health_task.abort();
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Reads exactly one framed `RouteRequestMsg`, answers with a
/// `RouteResponseMsg`, and closes the connection — this tier hands off to
/// (L) and then (K) per request rather than holding a long-lived session.
async fn handle_routing_request(
    state: Arc<GatewayState>,
    mut stream: TcpStream,
    peer_addr: SocketAddr,
) -> anyhow::Result<()> {
    let ip = peer_addr.ip().to_string();
    if !state.security.allow(&ip, "api") {
        let response = deny_response("rate limited");
        send_response(&mut stream, response).await?;
        return Ok(());
    }

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let body_len = u32::from_be_bytes(len_buf) as usize;
    if !state.security.check_packet_size(body_len) {
        let response = deny_response("oversize request");
        send_response(&mut stream, response).await?;
        return Ok(());
    }

    let mut body = vec![0u8; body_len];
    stream.read_exact(&mut body).await?;
    let envelope = Envelope::decode(&body)?;
    if envelope.message_type != MessageType::RouteRequest {
        let response = deny_response("expected RouteRequest");
        send_response(&mut stream, response).await?;
        return Ok(());
    }

    let request: RouteRequestMsg = codec::decode_payload(&envelope.payload)?;
    let preferred_region = request
        .preferred_region
        .as_ref()
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned());

    let response = match state.balancer.route_client(
        request.player_id,
        preferred_region.as_deref(),
        LoadBalancingStrategy::Intelligent,
        request.client_lat,
        request.client_lon,
    ) {
        Ok(route) => RouteResponseMsg {
            accepted: true,
            hostname: route.hostname.into_bytes(),
            port: route.port,
            estimated_latency_ms: route.estimated_latency_ms,
            reason: route.reason.to_string().into_bytes(),
        },
        Err(e) => deny_response(&e.to_string()),
    };

    send_response(&mut stream, response).await
}

fn deny_response(reason: &str) -> RouteResponseMsg {
    RouteResponseMsg {
        accepted: false,
        hostname: Vec::new(),
        port: 0,
        estimated_latency_ms: 0.0,
        reason: reason.as_bytes().to_vec(),
    }
}

async fn send_response(stream: &mut TcpStream, response: RouteResponseMsg) -> anyhow::Result<()> {
    let payload = codec::encode_payload(&response);
    let frame = Envelope::new(MessageType::RouteResponse, payload).encode()?;
    stream.write_all(&frame).await?;
    Ok(())
}
