//! Async bootstrap: TLS accept loop, per-session read/dispatch/write tasks,
//! and the fixed-tick world loop, generalizing the teacher's single-threaded
//! `GameServer::run`/`tick_once` (`crates/server/src/server.rs`) into the
//! tokio-task-per-session shape `mmo_core::session` is built around, with
//! the accept-loop skeleton grounded on `valence_network::connect::do_accept_loop`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use uuid::Uuid;

use mmo_core::auth::{AuthSubsystem, InMemoryVerifier, JwtTokenIssuer};
use mmo_core::codec::{
    self, ChatMessageMsg, Envelope, EntityRemoveMsg, EntitySpawnMsg, HeartbeatRequest,
    HeartbeatResponse, HitClaim, HitResult, InputCommand, LoginRequest, LoginResponse,
    MapChangeMsg, MapTransitionBeginMsg, MapTransitionCompleteMsg, MessageType,
    QuantizedEntityState, WorldSnapshotMsg,
};
use mmo_core::dispatch::Dispatcher;
use mmo_core::entity::{Entity, EntityType};
use mmo_core::error::{ServerError, WorldError};
use mmo_core::lagcomp::rewind::{FavorTheShooterSettings, HitRegistration};
use mmo_core::lagcomp::snapshot::{EntitySnapshotState, SnapshotRing, WorldSnapshot};
use mmo_core::security::SecurityGate;
use mmo_core::session::{Session, SessionId, SessionRegistry, SessionState};
use mmo_core::world::map::{BoundaryConnection, MapConfig, MapKind, SpatialBackend};
use mmo_core::world::transition::MapTransitionHandler;
use mmo_core::world::WorldManager;
use mmo_core::Config;

const MAX_FRAME_QUEUE: usize = 256;
const MAX_QUEUE_BYTES: usize = 4 * 1024 * 1024;
const SNAPSHOT_RING_CAPACITY: usize = mmo_core::lagcomp::snapshot::MAX_SNAPSHOTS;
/// Maximum distance a `HitClaim` ray is allowed to travel before hitting.
const MAX_HIT_RANGE: f32 = 100.0;
/// Ticks since last damage an entity is considered "in combat" for, blocking
/// an explicit map transition request.
const COMBAT_TIMEOUT_TICKS: u32 = 300;

/// Every long-lived collaborator the connection and tick tasks share,
/// playing the role the teacher's `GameServer` struct plays as a single
/// owner of state — split here into `Arc`-shared pieces since each
/// session is its own task rather than a method called from one loop.
struct GameState {
    config: Config,
    registry: SessionRegistry,
    auth: AuthSubsystem<InMemoryVerifier, JwtTokenIssuer>,
    security: Arc<SecurityGate>,
    world: WorldManager,
    snapshots: Mutex<SnapshotRing>,
    lag_settings: FavorTheShooterSettings,
    /// Which instance/entity a session is currently possessing, so input
    /// and hit traffic can be routed without re-deriving it per packet.
    possession: DashMap<SessionId, (u64, u32)>,
    /// Last `InputCommand::sequence` processed for each session, echoed back
    /// in its own `WorldSnapshotMsg` so the client can trim its replay buffer.
    last_input_sequence: DashMap<SessionId, u32>,
    /// In-flight explicit (loading-screen) map transitions, keyed by entity
    /// inside the handler itself.
    transitions: Mutex<MapTransitionHandler>,
    tick: std::sync::atomic::AtomicU32,
}

impl GameState {
    fn new(config: Config) -> Self {
        let security = Arc::new(SecurityGate::new(config.rate_limit.clone(), 20));
        let auth = AuthSubsystem::new(
            InMemoryVerifier::default(),
            JwtTokenIssuer::new(config.jwt_secret.clone(), 3600),
            security.clone(),
        );
        let world = WorldManager::new(vec![MapConfig {
            map_id: 1,
            name: "Field".into(),
            kind: MapKind::Overworld,
            max_players: config.max_connections as u32,
            level_band: (1, 60),
            backend: SpatialBackend::Grid { cell_size_cm: 500 },
            is_instanced: false,
            spawn_points: vec![glam::Vec3::ZERO],
            connections: Vec::<BoundaryConnection>::new(),
        }]);

        Self {
            config,
            registry: SessionRegistry::new(),
            auth,
            security,
            world,
            snapshots: Mutex::new(SnapshotRing::new(SNAPSHOT_RING_CAPACITY)),
            lag_settings: FavorTheShooterSettings::default(),
            possession: DashMap::new(),
            last_input_sequence: DashMap::new(),
            transitions: Mutex::new(MapTransitionHandler::new()),
            tick: std::sync::atomic::AtomicU32::new(0),
        }
    }
}

/// Placeholder for the account -> player id lookup a real deployment backs
/// with a database; `CredentialVerifier` is the seam that owns real account
/// storage, this just derives a stable id for the bootstrap in-memory verifier.
fn derive_player_id(account: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    account.hash(&mut hasher);
    hasher.finish()
}

fn load_tls_acceptor(cert_path: &str, key_path: &str) -> anyhow::Result<TlsAcceptor> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cert_file = std::fs::File::open(cert_path)
        .map_err(|e| anyhow::anyhow!("opening TLS cert {cert_path}: {e}"))?;
    let key_file = std::fs::File::open(key_path)
        .map_err(|e| anyhow::anyhow!("opening TLS key {key_path}: {e}"))?;

    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_file))?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {key_path}"))?;

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}

/// Entry point called from `main`: binds, accepts connections until shutdown,
/// and runs the fixed-tick world loop alongside it, mirroring the teacher's
/// `GameServer::run` (network pump + tick loop) but as two cooperating tasks.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let acceptor = load_tls_acceptor(&config.tls.cert_path, &config.tls.key_path)?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    log::info!("mmo-server listening on {addr}");

    let state = Arc::new(GameState::new(config));
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let tick_state = state.clone();
    let mut tick_shutdown = shutdown_rx.clone();
    let tick_task = tokio::spawn(async move {
        run_tick_loop(tick_state, &mut tick_shutdown).await;
    });

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
                if let Err(e) = stream.set_nodelay(true) {
                    log::warn!("failed to set TCP_NODELAY for {peer_addr}: {e}");
                }
                let acceptor = acceptor.clone();
                let state = state.clone();
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => handle_connection(state, tls_stream, peer_addr).await,
                        Err(e) => log::warn!("TLS handshake with {peer_addr} failed: {e}"),
                    }
                });
            }
            _ = wait_for_shutdown_signal() => {
                log::info!("shutdown signal received, draining connections");
                let _ = shutdown_tx.send(true);
                break;
            }
        }
    }

    let _ = shutdown_rx.changed().await;
    tick_task.await.ok();
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

async fn handle_connection(
    state: Arc<GameState>,
    stream: tokio_rustls::server::TlsStream<TcpStream>,
    peer_addr: SocketAddr,
) {
    let session_id = Uuid::new_v4();
    let (queue, mut outbound_rx) = mmo_core::session::SendQueue::new(MAX_FRAME_QUEUE, MAX_QUEUE_BYTES);
    state.registry.insert(Session::new(session_id, queue.clone()));
    let close_signal = state
        .registry
        .get(session_id)
        .map(|s| s.close_signal.clone())
        .expect("session was just inserted");

    let (mut reader, mut writer) = tokio::io::split(stream);

    let write_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let len = frame.len();
            if writer.write_all(&frame).await.is_err() {
                break;
            }
            queue.mark_sent(len);
        }
        let _ = writer.shutdown().await;
    });

    if let Err(e) = read_loop(&state, session_id, peer_addr, &mut reader, &close_signal).await {
        log::debug!("session {session_id} ({peer_addr}) ended: {e}");
    }

    if let Some((instance_id, entity_id)) = state.possession.remove(&session_id).map(|(_, v)| v) {
        state.world.with_instance_mut(instance_id, |i| {
            i.despawn_entity(entity_id);
        });
    }
    state.last_input_sequence.remove(&session_id);
    state.registry.remove(session_id);
    write_task.abort();
}

async fn read_loop(
    state: &Arc<GameState>,
    session_id: SessionId,
    peer_addr: SocketAddr,
    reader: &mut (impl tokio::io::AsyncRead + Unpin),
    close_signal: &tokio::sync::Notify,
) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(state.clone());
    let mut buf = Vec::with_capacity(4096);
    let mut scratch = [0u8; 4096];

    loop {
        let n = tokio::select! {
            result = reader.read(&mut scratch) => result?,
            _ = close_signal.notified() => {
                anyhow::bail!("session closed by server ({})", peer_addr);
            }
        };
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&scratch[..n]);

        while let Some(body_len) = codec::try_read_frame_len(&buf)? {
            let frame_end = 4 + body_len;
            let envelope = Envelope::decode(&buf[4..frame_end])?;
            buf.drain(..frame_end);

            state.registry.touch(session_id);
            let authenticated = state
                .registry
                .get(session_id)
                .map(|s| s.state == SessionState::Authenticated)
                .unwrap_or(false);

            if !authenticated {
                if !handle_preauth(state, session_id, peer_addr, &envelope)? {
                    return Ok(());
                }
                continue;
            }

            if let Err(e) = dispatcher.dispatch(session_id, &envelope) {
                log::warn!("handler error for session {session_id}: {e}");
            }
        }
    }
}

/// Handles the handshake/login traffic a session sends before it's
/// authenticated; returns `Ok(false)` when the connection should close.
fn handle_preauth(
    state: &Arc<GameState>,
    session_id: SessionId,
    peer_addr: SocketAddr,
    envelope: &Envelope,
) -> anyhow::Result<bool> {
    match envelope.message_type {
        MessageType::Hello => {
            let _ = state.registry.transition(session_id, SessionState::Handshake);
            Ok(true)
        }
        MessageType::LoginRequest => {
            let _ = state.registry.transition(session_id, SessionState::Handshake);
            let request: LoginRequest = codec::decode_payload(&envelope.payload)?;
            let account = String::from_utf8_lossy(&request.account).into_owned();
            let credential = String::from_utf8_lossy(&request.credential).into_owned();
            let player_id = derive_player_id(&account);

            let response = match state.auth.login(
                &peer_addr.ip().to_string(),
                &account,
                &credential,
                player_id,
                &session_id.to_string(),
            ) {
                Ok(token) => {
                    let _ = state.registry.transition(session_id, SessionState::Connected);
                    let _ = state
                        .registry
                        .transition(session_id, SessionState::Authenticated);
                    state.registry.bind_player(session_id, player_id);
                    state.registry.bind_token(session_id, token);

                    let instance_id = state.world.join_or_create_instance(1).unwrap_or(0);
                    let spawn_at = state
                        .world
                        .map(1)
                        .map(|m| m.nearest_spawn_point(glam::Vec3::ZERO))
                        .unwrap_or(glam::Vec3::ZERO);
                    // Masked below the NPC id floor (`Instance::next_npc_id`
                    // starts at `u32::MAX / 2`) so player and spawned-NPC
                    // entity ids never collide.
                    let entity_id = (player_id as u32) & 0x7FFF_FFFF;
                    state.world.with_instance_mut(instance_id, |i| {
                        i.spawn_entity(Entity::new(entity_id, EntityType::Player, spawn_at));
                    });
                    state
                        .possession
                        .insert(session_id, (instance_id, entity_id));

                    LoginResponse {
                        accepted: true,
                        player_id,
                        udp_cookie: 0,
                    }
                }
                Err(_) => LoginResponse {
                    accepted: false,
                    player_id: 0,
                    udp_cookie: 0,
                },
            };

            let accepted = response.accepted;
            let payload = codec::encode_payload(&response);
            let frame = Envelope::new(MessageType::LoginResponse, payload).encode()?;
            state.registry.send_frame(session_id, frame).ok();
            Ok(accepted)
        }
        other => {
            log::debug!("dropping {other:?} from unauthenticated session {session_id}");
            Ok(false)
        }
    }
}

fn build_dispatcher(state: Arc<GameState>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();

    let heartbeat_state = state.clone();
    dispatcher.register(
        MessageType::Heartbeat,
        Box::new(move |session_id: SessionId, envelope: &Envelope| {
            handle_heartbeat(&heartbeat_state, session_id, envelope)
        }),
    );

    let logout_state = state.clone();
    dispatcher.register(
        MessageType::Logout,
        Box::new(move |session_id: SessionId, _envelope: &Envelope| {
            handle_logout(&logout_state, session_id)
        }),
    );

    let transition_state = state.clone();
    dispatcher.register(
        MessageType::MapTransitionBegin,
        Box::new(move |session_id: SessionId, envelope: &Envelope| {
            handle_map_transition_begin(&transition_state, session_id, envelope)
        }),
    );

    let input_state = state.clone();
    dispatcher.register(
        MessageType::InputCommand,
        Box::new(move |session_id: SessionId, envelope: &Envelope| {
            handle_input_command(&input_state, session_id, envelope)
        }),
    );

    let hit_state = state.clone();
    dispatcher.register(
        MessageType::HitClaim,
        Box::new(move |session_id: SessionId, envelope: &Envelope| {
            handle_hit_claim(&hit_state, session_id, envelope)
        }),
    );

    let chat_state = state.clone();
    dispatcher.register(
        MessageType::ChatMessage,
        Box::new(move |session_id: SessionId, envelope: &Envelope| {
            handle_chat_message(&chat_state, session_id, envelope)
        }),
    );

    dispatcher
}

/// Decodes the client's local clock, echoes the server's, and records the
/// one-way latency estimate on the session so hit validation can read it.
fn handle_heartbeat(
    state: &Arc<GameState>,
    session_id: SessionId,
    envelope: &Envelope,
) -> Result<(), ServerError> {
    let request: HeartbeatRequest =
        codec::decode_payload(&envelope.payload).map_err(ServerError::Framing)?;
    let server_time_ms = state.tick.load(std::sync::atomic::Ordering::Relaxed) as u64
        * state.config.simulation.tick_period_ms();
    let latency_ms = server_time_ms.saturating_sub(request.client_time_ms) as u32;
    state.registry.record_latency(session_id, latency_ms);

    let response = HeartbeatResponse {
        server_time_ms,
        latency_ms,
    };
    let payload = codec::encode_payload(&response);
    if let Ok(frame) = Envelope::new(MessageType::HeartbeatResponse, payload).encode() {
        state.registry.send_frame(session_id, frame).ok();
    }
    Ok(())
}

/// Requires `Authenticated`, invalidates the issued token with the auth
/// subsystem, and wakes the session's read loop so it can tear down.
fn handle_logout(state: &Arc<GameState>, session_id: SessionId) -> Result<(), ServerError> {
    let authenticated = state
        .registry
        .get(session_id)
        .map(|s| s.state == SessionState::Authenticated)
        .unwrap_or(false);
    if !authenticated {
        return Ok(());
    }

    if let Some(token) = state.registry.take_token(session_id) {
        state.auth.logout(&token);
    }
    let _ = state
        .registry
        .transition(session_id, SessionState::Disconnecting);
    state.registry.notify_close(session_id);
    Ok(())
}

/// Drives the explicit (loading-screen) map transition state machine for
/// this session's possessed entity, enforcing the preconditions the
/// seamless boundary-crossing path doesn't need: not already mid-transition,
/// not in combat, and the destination map's level band.
fn handle_map_transition_begin(
    state: &Arc<GameState>,
    session_id: SessionId,
    envelope: &Envelope,
) -> Result<(), ServerError> {
    let request: MapTransitionBeginMsg =
        codec::decode_payload(&envelope.payload).map_err(ServerError::Framing)?;
    let Some((source_instance, entity_id)) =
        state.possession.get(&session_id).map(|e| *e.value())
    else {
        return Ok(());
    };

    let send_result = |accepted: bool, map_id: u32| {
        let payload = codec::encode_payload(&MapTransitionCompleteMsg { map_id, accepted });
        if let Ok(frame) = Envelope::new(MessageType::MapTransitionComplete, payload).encode() {
            state.registry.send_frame(session_id, frame).ok();
        }
    };

    let target_map = match state.world.map(request.target_map) {
        Some(m) => m,
        None => {
            send_result(false, request.target_map);
            return Ok(());
        }
    };

    let current_tick = state.tick.load(std::sync::atomic::Ordering::Relaxed);
    let precondition_failure = state.world.with_instance(source_instance, |instance| {
        instance.entities.get(&entity_id).and_then(|entity| {
            if entity.in_combat(current_tick, COMBAT_TIMEOUT_TICKS) {
                Some(WorldError::InCombat)
            } else if !target_map.accepts_level(entity.level) {
                Some(WorldError::LevelBand)
            } else {
                None
            }
        })
    });
    if let Some(Some(reason)) = precondition_failure {
        log::debug!("map transition for entity {entity_id} rejected: {reason}");
        send_result(false, request.target_map);
        return Ok(());
    }

    let mut transitions = state.transitions.lock();
    if transitions.is_in_transition(entity_id) {
        send_result(false, request.target_map);
        return Ok(());
    }

    let dest_instance = match state.world.join_or_create_instance(request.target_map) {
        Ok(id) => id,
        Err(_) => {
            send_result(false, request.target_map);
            return Ok(());
        }
    };

    if transitions
        .initiate_transition(entity_id, request.target_map, dest_instance, false)
        .is_err()
    {
        send_result(false, request.target_map);
        return Ok(());
    }

    // No async save/load I/O exists yet, so every phase is driven to
    // completion within this one handler invocation rather than across ticks.
    let mut result = None;
    for _ in 0..5 {
        match transitions.advance(entity_id) {
            Ok(Some(r)) => {
                result = Some(r);
                break;
            }
            Ok(None) => continue,
            Err(_) => {
                send_result(false, request.target_map);
                return Ok(());
            }
        }
    }
    drop(transitions);

    let Some(result) = result else {
        send_result(false, request.target_map);
        return Ok(());
    };

    let spawn_at = target_map.nearest_spawn_point(glam::Vec3::ZERO);
    if state
        .world
        .transfer_entity(source_instance, dest_instance, entity_id, spawn_at)
        .is_none()
    {
        send_result(false, request.target_map);
        return Ok(());
    }

    let remove_payload = codec::encode_payload(&EntityRemoveMsg { entity_id });
    if let Ok(frame) = Envelope::new(MessageType::EntityRemove, remove_payload).encode() {
        state
            .registry
            .broadcast(&frame, |s| s.state == SessionState::Authenticated);
    }
    let spawn_payload = codec::encode_payload(&EntitySpawnMsg {
        entity_id,
        entity_type: EntityType::Player as u8,
        position: spawn_at.into(),
    });
    if let Ok(frame) = Envelope::new(MessageType::EntitySpawn, spawn_payload).encode() {
        state
            .registry
            .broadcast(&frame, |s| s.state == SessionState::Authenticated);
    }

    state
        .possession
        .insert(session_id, (dest_instance, entity_id));
    send_result(true, result.destination_map);
    Ok(())
}

fn handle_input_command(
    state: &Arc<GameState>,
    session_id: SessionId,
    envelope: &Envelope,
) -> Result<(), ServerError> {
    let command: InputCommand = codec::decode_payload(&envelope.payload)
        .map_err(ServerError::Framing)?;
    let Some((instance_id, entity_id)) = state.possession.get(&session_id).map(|e| *e.value())
    else {
        return Ok(());
    };

    let validator = mmo_core::prediction::server::InputValidator {
        max_speed: 6.0,
        max_commands_per_tick: 1,
    };
    let dt = 1.0 / state.config.simulation.tick_rate_hz as f32;
    let Ok(displacement) = validator.validate(&command, dt) else {
        return Ok(());
    };

    state.world.with_instance_mut(instance_id, |instance| {
        if let Some(entity) = instance.entities.get(&entity_id) {
            let new_position = entity.position + displacement;
            instance.move_entity(entity_id, new_position);
        }
    });
    state
        .last_input_sequence
        .insert(session_id, command.sequence);
    Ok(())
}

fn handle_hit_claim(
    state: &Arc<GameState>,
    session_id: SessionId,
    envelope: &Envelope,
) -> Result<(), ServerError> {
    let claim: HitClaim = codec::decode_payload(&envelope.payload).map_err(ServerError::Framing)?;
    if !state.security.allow(&session_id.to_string(), "game_action") {
        return Ok(());
    }

    let Some((instance_id, shooter_id)) = state.possession.get(&session_id).map(|e| *e.value())
    else {
        return Ok(());
    };
    let now_ms = state.tick.load(std::sync::atomic::Ordering::Relaxed) as u64
        * state.config.simulation.tick_period_ms();
    let claimed_latency_ms = state.registry.latency_ms(session_id) as u64;
    let ring = state.snapshots.lock();
    let registration = HitRegistration {
        ring: &ring,
        settings: state.lag_settings,
    };
    let result = registration.validate_hit(
        claim.client_tick as u64 * state.config.simulation.tick_period_ms(),
        now_ms,
        claimed_latency_ms,
        shooter_id,
        claim.target_entity_id,
        glam::Vec3::from(claim.origin),
        glam::Vec3::from(claim.direction),
        MAX_HIT_RANGE,
        20,
    );
    drop(ring);

    if result.is_valid {
        let current_tick = state.tick.load(std::sync::atomic::Ordering::Relaxed);
        state.world.with_instance_mut(instance_id, |instance| {
            if let Some(victim) = instance.entities.get_mut(&result.victim_id) {
                victim.health -= result.damage;
                victim.is_alive = victim.health > 0;
                victim.last_damage_tick = Some(current_tick);
            }
        });
    }

    let response = HitResult {
        accepted: result.is_valid,
        damage: result.damage,
        confidence: result.confidence,
    };
    let payload = codec::encode_payload(&response);
    if let Ok(frame) = Envelope::new(MessageType::HitResult, payload).encode() {
        state.registry.send_frame(session_id, frame).ok();
    }
    Ok(())
}

/// Relays a chat line to every other authenticated session, gated by the
/// `chat` rate-limit category so a flooding client is throttled rather than
/// silently broadcast-bombing everyone else.
fn handle_chat_message(
    state: &Arc<GameState>,
    session_id: SessionId,
    envelope: &Envelope,
) -> Result<(), ServerError> {
    let chat: ChatMessageMsg = codec::decode_payload(&envelope.payload).map_err(ServerError::Framing)?;
    if !state.security.allow(&session_id.to_string(), "chat") {
        return Ok(());
    }

    let payload = codec::encode_payload(&chat);
    if let Ok(frame) = Envelope::new(MessageType::ChatMessage, payload).encode() {
        state
            .registry
            .broadcast(&frame, |s| s.state == SessionState::Authenticated);
    }
    Ok(())
}

/// Performs the Transferring/Completing phases of a seamless map transition
/// (spec's §4.G boundary-crossing path, which skips Preparing/Saving/Loading
/// since there is no loading screen): moves the entity between instances and
/// notifies the source instance's observers it left, the destination's
/// observers it arrived, and the owning client which map it is now on.
fn handle_boundary_crossing(
    state: &Arc<GameState>,
    source_instance: u64,
    entity_id: mmo_core::entity::EntityId,
    connection: BoundaryConnection,
) {
    let Some(target_map) = state.world.map(connection.target_map) else {
        return;
    };
    let spawn_at = target_map.nearest_spawn_point(connection.point);
    let Ok(dest_instance) = state.world.join_or_create_instance(connection.target_map) else {
        return;
    };

    if state
        .world
        .transfer_entity(source_instance, dest_instance, entity_id, spawn_at)
        .is_none()
    {
        return;
    }

    let remove_payload = codec::encode_payload(&EntityRemoveMsg { entity_id });
    if let Ok(frame) = Envelope::new(MessageType::EntityRemove, remove_payload).encode() {
        state
            .registry
            .broadcast(&frame, |s| s.state == SessionState::Authenticated);
    }

    let spawn_payload = codec::encode_payload(&EntitySpawnMsg {
        entity_id,
        entity_type: EntityType::Player as u8,
        position: spawn_at.into(),
    });
    if let Ok(frame) = Envelope::new(MessageType::EntitySpawn, spawn_payload).encode() {
        state
            .registry
            .broadcast(&frame, |s| s.state == SessionState::Authenticated);
    }

    let owner = state
        .possession
        .iter()
        .find(|e| e.value().1 == entity_id)
        .map(|e| *e.key());
    if let Some(session_id) = owner {
        state.possession.insert(session_id, (dest_instance, entity_id));
        let change_payload = codec::encode_payload(&MapChangeMsg {
            map_id: connection.target_map,
        });
        if let Ok(frame) = Envelope::new(MessageType::MapChange, change_payload).encode() {
            state.registry.send_frame(session_id, frame).ok();
        }
    }
}

async fn run_tick_loop(state: Arc<GameState>, shutdown: &mut tokio::sync::watch::Receiver<bool>) {
    let period = Duration::from_millis(state.config.simulation.tick_period_ms());
    let mut next_tick = Instant::now() + period;

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(next_tick.into()) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
        next_tick += period;

        for idle_id in state.registry.idle_sessions(state.config.session.idle_timeout_secs) {
            log::debug!("session {idle_id} timed out after idle period");
            let _ = state.registry.transition(idle_id, SessionState::Disconnecting);
            state.registry.notify_close(idle_id);
        }

        let tick = state
            .tick
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;

        let dt_secs = period.as_secs_f32();
        state.world.tick_spawns(dt_secs);
        state.world.retire_expired();

        for (instance_id, entity_id, connection) in state.world.detect_boundary_crossings() {
            log::debug!(
                "entity {entity_id} in instance {instance_id} crossed into map {}",
                connection.target_map
            );
            handle_boundary_crossing(&state, instance_id, entity_id, connection);
        }

        let entities = state.world.all_entities();
        let captured_at_ms = tick as u64 * state.config.simulation.tick_period_ms();

        let mut snapshot_entities = std::collections::HashMap::with_capacity(entities.len());
        for (_, entity) in &entities {
            snapshot_entities.insert(
                entity.id,
                EntitySnapshotState {
                    entity_id: entity.id,
                    position: entity.position,
                    velocity: entity.velocity,
                    orientation: entity.orientation,
                    health: entity.health,
                    is_alive: entity.is_alive,
                    hitbox_half_extents: entity.hitbox.half_extents,
                },
            );
        }
        state.snapshots.lock().push(WorldSnapshot {
            tick,
            captured_at_ms,
            entities: snapshot_entities,
        });

        let quantized: Vec<QuantizedEntityState> =
            entities.iter().map(|(_, e)| e.to_quantized()).collect();

        for session_id in state.registry.authenticated_session_ids() {
            let last_ack_sequence = state
                .last_input_sequence
                .get(&session_id)
                .map(|e| *e.value())
                .unwrap_or(0);
            let snapshot_msg = WorldSnapshotMsg {
                server_tick: tick,
                server_time_ms: captured_at_ms,
                last_ack_sequence,
                entities: quantized.clone(),
            };
            let payload = codec::encode_payload(&snapshot_msg);
            if let Ok(frame) = Envelope::new(MessageType::WorldSnapshot, payload).encode() {
                state.registry.send_frame(session_id, frame).ok();
            }
        }
    }
}
