//! World state and the authoritative match task

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::util::time::server_millis;
use crate::ws::protocol::{
    ClientMsg, ConnId, HelloData, MatchMode, ScoreEntry, ServerMsg, ADMIN_ID, ADMIN_REQUEST,
};

use super::clock::{pick_elimination, MatchPhase, MatchState};
use super::command::AdminCommand;
use super::powerup::PowerupSpawner;
use super::registry::{close, send, ClientTx, ConnectionRegistry, Role, SessionKey};
use super::snapshot::broadcast_peer_state;
use super::wind::WindState;

/// Events forwarded from connection tasks to the match task
#[derive(Debug)]
pub enum WorldEvent {
    Connect { session: SessionKey, tx: ClientTx },
    Message { session: SessionKey, text: String },
    Disconnect { session: SessionKey },
}

/// The single shared world. Only the match task touches it, so every
/// handler and every tick runs to completion without interleaving.
pub struct World {
    config: GameConfig,
    registry: ConnectionRegistry,
    state: MatchState,
    wind: WindState,
    powerups: PowerupSpawner,
    rng: ChaCha8Rng,
}

impl World {
    pub fn new(config: GameConfig, mut rng: ChaCha8Rng, now: u64) -> Self {
        let seed = new_seed(&mut rng);
        let wind = WindState::new(now, &mut rng);
        let powerups = PowerupSpawner::new(config.powerup_kinds.clone(), now, &mut rng);
        Self {
            config,
            registry: ConnectionRegistry::new(),
            state: MatchState::new(seed),
            wind,
            powerups,
            rng,
        }
    }

    pub fn handle_event(&mut self, event: WorldEvent, now: u64) {
        match event {
            WorldEvent::Connect { session, tx } => {
                self.connect(session, tx);
            }
            WorldEvent::Message { session, text } => self.handle_message(session, &text, now),
            WorldEvent::Disconnect { session } => self.disconnect(session),
        }
    }

    /// Register a new Player and greet it
    pub fn connect(&mut self, session: SessionKey, tx: ClientTx) -> ConnId {
        let id = self.registry.register(session, tx.clone());

        send(
            &tx,
            &ServerMsg::Hello {
                id,
                seed: self.state.seed,
                waiting: self.state.waiting(),
                data: HelloData {
                    wind: self.wind.speed,
                    mode: self.state.mode,
                },
            },
        );
        let joined = ServerMsg::Connected { id };
        for conn in self
            .registry
            .connections()
            .filter(|c| c.id != id && !c.is_admin())
        {
            send(&conn.tx, &joined);
        }

        info!(conn_id = id, session = %session, "Client connected");
        id
    }

    /// Tear down a connection whose socket closed
    pub fn disconnect(&mut self, session: SessionKey) {
        let Some(id) = self.registry.id_for_session(&session) else {
            debug!(session = %session, "Disconnect for unknown session");
            return;
        };
        let Some(conn) = self.registry.remove(id) else {
            return;
        };

        match conn.role {
            Role::Player(_) => {
                self.broadcast_except(id, &ServerMsg::Disconnected { id });
                info!(conn_id = id, "Client disconnected");
            }
            Role::Admin => info!("Admin disconnected"),
            Role::Spectator => info!(conn_id = id, "Spectator disconnected"),
        }
    }

    pub fn handle_message(&mut self, session: SessionKey, text: &str, now: u64) {
        let Some(id) = self.registry.id_for_session(&session) else {
            debug!(session = %session, "Message from unknown session");
            return;
        };

        if id == ADMIN_ID {
            if text == ADMIN_REQUEST {
                debug!("Admin repeated its role request");
            } else {
                self.handle_command(text, now);
            }
            return;
        }

        match ClientMsg::parse(text) {
            Ok(msg) => self.handle_client_msg(id, msg),
            Err(e) => warn!(conn_id = id, error = %e, "Dropping malformed message"),
        }
    }

    fn handle_client_msg(&mut self, id: ConnId, msg: ClientMsg) {
        match msg {
            ClientMsg::RequestAdmin => match self.registry.promote(id) {
                Some(_) => {
                    self.broadcast_except(ADMIN_ID, &ServerMsg::Disconnected { id });
                    info!(conn_id = id, "Client promoted to admin");
                }
                None => warn!(conn_id = id, "Admin role refused"),
            },
            ClientMsg::RequestSpectator => {
                if self.registry.promote_spectator(id) {
                    self.broadcast_except(id, &ServerMsg::Disconnected { id });
                    info!(conn_id = id, "Client became a spectator");
                }
            }
            ClientMsg::PowerupTaken { powerup_id } => {
                if !self.is_active_player(id) {
                    debug!(conn_id = id, powerup_id, "Ignoring pickup from inactive player");
                    return;
                }
                if self.powerups.remove(powerup_id) {
                    debug!(conn_id = id, powerup_id, "Powerup picked up");
                }
            }
            ClientMsg::Relay { target, payload } => {
                if !self.is_active_player(id) {
                    debug!(conn_id = id, target, "Ignoring relay from inactive player");
                    return;
                }
                match self.registry.get(target) {
                    Some(conn) => send(&conn.tx, &Value::Object(payload)),
                    None => debug!(conn_id = id, target, "Relay target is gone"),
                }
            }
            ClientMsg::State(update) => {
                if let Some(player) = self.registry.player_mut(id) {
                    player.apply_update(update);
                }
            }
        }
    }

    /// Players still in the match. Eliminated players only keep name/score.
    fn is_active_player(&self, id: ConnId) -> bool {
        self.registry
            .get(id)
            .and_then(|conn| conn.player())
            .is_some_and(|player| !player.eliminated)
    }

    fn handle_command(&mut self, text: &str, now: u64) {
        info!(command = text, "Admin command");
        self.broadcast_non_admin(&ServerMsg::AdminCommand {
            command: text.to_string(),
        });

        match AdminCommand::parse(text) {
            AdminCommand::Start { minutes } => {
                let total = AdminCommand::match_length(minutes, self.config.default_match_ms);
                let players = self.registry.player_count();
                if !self.state.start(now, total, players) {
                    warn!("Match already running, start ignored");
                }
            }
            AdminCommand::Elimination => self.state.mode = MatchMode::Elimination,
            AdminCommand::Infinite => self.state.mode = MatchMode::Infinite,
            AdminCommand::Stop => self.end_match(now),
            AdminCommand::Kick { id } => self.kick(id),
            AdminCommand::Unknown => debug!(command = text, "Unrecognized admin command"),
        }
    }

    /// Close a connection on the admin's request
    fn kick(&mut self, id: ConnId) {
        if id == ADMIN_ID {
            warn!("Refusing to kick the admin");
            return;
        }
        let Some(conn) = self.registry.remove(id) else {
            debug!(conn_id = id, "Kick target not connected");
            return;
        };

        close(&conn.tx);
        self.broadcast_except(id, &ServerMsg::Disconnected { id });
        info!(conn_id = id, "Client kicked");
    }

    /// One fixed-rate world update
    pub fn tick(&mut self, now: u64) {
        if let Some(speed) = self.wind.tick(now, &mut self.rng) {
            self.broadcast(&ServerMsg::Wind { speed });
        }

        self.powerups.tick(now, self.wind.speed, &mut self.rng);

        if let Some(seconds) = self.state.poll_timer(now) {
            self.broadcast(&ServerMsg::Time { seconds });
        }

        if self.state.phase == MatchPhase::Ended {
            self.end_match(now);
        } else if self.state.elimination_due(now) {
            self.eliminate_lowest();
        }

        let views = self.powerups.views();
        broadcast_peer_state(&mut self.registry, &views);
    }

    fn eliminate_lowest(&mut self) {
        let Some(id) = pick_elimination(self.registry.players(), &mut self.rng) else {
            return;
        };
        let Some(player) = self.registry.player_mut(id) else {
            return;
        };
        player.eliminated = true;
        let score = player.score;

        if let Some(conn) = self.registry.get(id) {
            send(&conn.tx, &ServerMsg::Eliminated);
        }
        self.broadcast_except(id, &ServerMsg::Disconnected { id });
        self.state.eliminated_count += 1;

        info!(
            conn_id = id,
            score,
            eliminated = self.state.eliminated_count,
            "Player eliminated"
        );
    }

    /// Broadcast the scoreboard and reset the world for the next match
    fn end_match(&mut self, now: u64) {
        let data: Vec<ScoreEntry> = self
            .registry
            .players()
            .map(|p| ScoreEntry {
                id: p.id,
                name: p.name.clone(),
                score: p.score,
            })
            .collect();
        info!(players = data.len(), "Match ended");
        self.broadcast(&ServerMsg::End { data });

        self.restart(now);
    }

    fn restart(&mut self, now: u64) {
        for conn in self.registry.remove_players() {
            close(&conn.tx);
        }
        self.powerups.reset(now, &mut self.rng);
        self.state.reset(new_seed(&mut self.rng));
        info!(seed = self.state.seed, "World reset, waiting for next match");
    }

    fn broadcast(&self, msg: &ServerMsg) {
        for conn in self.registry.connections() {
            send(&conn.tx, msg);
        }
    }

    fn broadcast_except(&self, skip: ConnId, msg: &ServerMsg) {
        for conn in self.registry.connections().filter(|c| c.id != skip) {
            send(&conn.tx, msg);
        }
    }

    fn broadcast_non_admin(&self, msg: &ServerMsg) {
        for conn in self.registry.connections().filter(|c| !c.is_admin()) {
            send(&conn.tx, msg);
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    #[cfg(test)]
    pub fn powerups(&self) -> &PowerupSpawner {
        &self.powerups
    }
}

/// Seeds go to browsers as JSON numbers, keep them exact in an f64
fn new_seed(rng: &mut ChaCha8Rng) -> u64 {
    rng.gen::<u32>() as u64
}

/// Live counters readable outside the match task
#[derive(Debug, Default)]
pub struct MatchStats {
    pub connections: AtomicUsize,
    pub players: AtomicUsize,
    pub waiting: AtomicBool,
}

/// Handle to the running match
#[derive(Clone)]
pub struct MatchHandle {
    pub events_tx: mpsc::Sender<WorldEvent>,
    pub stats: Arc<MatchStats>,
}

impl MatchHandle {
    pub fn connections(&self) -> usize {
        self.stats.connections.load(Ordering::Relaxed)
    }

    pub fn players(&self) -> usize {
        self.stats.players.load(Ordering::Relaxed)
    }

    pub fn waiting(&self) -> bool {
        self.stats.waiting.load(Ordering::Relaxed)
    }
}

/// The authoritative game match
pub struct GameMatch {
    world: World,
    tick: std::time::Duration,
    events_rx: mpsc::Receiver<WorldEvent>,
    stats: Arc<MatchStats>,
}

impl GameMatch {
    /// Create the match task and its handle
    pub fn new(config: GameConfig) -> (Self, MatchHandle) {
        let (events_tx, events_rx) = mpsc::channel(1024);
        let stats = Arc::new(MatchStats::default());
        stats.waiting.store(true, Ordering::Relaxed);

        let handle = MatchHandle {
            events_tx,
            stats: stats.clone(),
        };

        let tick = config.tick;
        let game_match = Self {
            world: World::new(config, ChaCha8Rng::from_entropy(), server_millis()),
            tick,
            events_rx,
            stats,
        };

        (game_match, handle)
    }

    /// Run the tick loop until every handle is dropped
    pub async fn run(mut self) {
        info!(tick_ms = self.tick.as_millis() as u64, "Match task started");

        let mut tick_interval = interval(self.tick);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    self.world.tick(server_millis());
                }
                event = self.events_rx.recv() => match event {
                    Some(event) => self.world.handle_event(event, server_millis()),
                    None => break,
                },
            }
            self.publish_stats();
        }

        info!("Match task stopped");
    }

    fn publish_stats(&self) {
        let registry = self.world.registry();
        self.stats
            .connections
            .store(registry.connection_count(), Ordering::Relaxed);
        self.stats
            .players
            .store(registry.player_count(), Ordering::Relaxed);
        self.stats
            .waiting
            .store(self.world.state().waiting(), Ordering::Relaxed);
    }
}
