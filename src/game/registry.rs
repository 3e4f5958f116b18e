//! Connection registry: wire ids, roles and per-player state

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ws::protocol::{ConnId, ADMIN_ID};

/// Stable key of one WebSocket session. Unlike the wire id it never changes,
/// so the transport task can keep tagging events with it across role changes.
pub type SessionKey = Uuid;

/// Frames queued for a connection's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    /// Close the socket. The writer stops after sending it.
    Close,
}

/// Frames a connection may have queued before new ones are dropped.
/// About three seconds of `cl` frames at the default tick.
pub const OUTBOUND_QUEUE: usize = 256;

/// Transport handle of a connection
pub type ClientTx = mpsc::Sender<Outbound>;

/// Serialize `msg` and queue it on `tx` without waiting.
///
/// A closed receiver means the socket is already gone and its disconnect
/// event is on its way. A full queue means the client stopped reading;
/// the frame is dropped rather than buffered.
pub fn send<T: Serialize + ?Sized>(tx: &ClientTx, msg: &T) {
    match serde_json::to_string(msg) {
        Ok(json) => match tx.try_send(Outbound::Text(json)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("Outbound queue full, dropping frame"),
            Err(TrySendError::Closed(_)) => debug!("Dropping frame for closed connection"),
        },
        Err(e) => debug!(error = %e, "Failed to serialize outbound frame"),
    }
}

/// Ask the writer task to close the socket.
///
/// If the queue is full the request is dropped; the writer still closes
/// once every sender for the connection is gone.
pub fn close(tx: &ClientTx) {
    if let Err(TrySendError::Full(_)) = tx.try_send(Outbound::Close) {
        warn!("Outbound queue full, closing when drained");
    }
}

/// Server-side state of one player
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: ConnId,
    pub name: String,
    pub score: i64,
    pub eliminated: bool,
    /// Snapshot peers are currently being sent
    pub last_applied: Option<Value>,
    /// Everything the client has reported so far, merged key by key
    pub last_received: Map<String, Value>,
    /// Recipients that already got `last_applied`
    pub sent_counter: usize,
    /// No `cl` frame has been sent to this player yet
    pub first_frame: bool,
    pending: bool,
}

impl PlayerState {
    pub fn new(id: ConnId) -> Self {
        Self {
            id,
            name: String::new(),
            score: 0,
            eliminated: false,
            last_applied: None,
            last_received: Map::new(),
            sent_counter: 0,
            first_frame: true,
            pending: false,
        }
    }

    /// Merge a state message. Null values are ignored. Once eliminated only
    /// `name` and `score` are still taken from the message.
    pub fn apply_update(&mut self, update: Map<String, Value>) {
        if let Some(name) = update.get("name").and_then(Value::as_str) {
            self.name = name.to_string();
        }
        if let Some(score) = update.get("score").and_then(Value::as_f64) {
            self.score = score as i64;
        }

        if self.eliminated {
            return;
        }

        for (key, value) in update {
            if !value.is_null() {
                self.last_received.insert(key, value);
            }
        }
        self.pending = true;
    }

    /// Publish the latest merged data for this tick. Returns true when peers
    /// have something new to receive.
    pub fn refresh(&mut self) -> bool {
        if !self.pending {
            return false;
        }
        self.pending = false;
        self.last_applied = Some(Value::Object(self.last_received.clone()));
        self.sent_counter = 0;
        true
    }

    /// Data peers may see: present, and already carrying this player's own id
    /// rather than a placeholder from before the client got its `hi`.
    pub fn visible_data(&self) -> Option<&Value> {
        if self.eliminated {
            return None;
        }
        let data = self.last_applied.as_ref()?;
        (data.get("id").and_then(Value::as_i64) == Some(self.id)).then_some(data)
    }
}

/// Role of a connection. Only players carry game state.
#[derive(Debug, Clone)]
pub enum Role {
    Player(PlayerState),
    Admin,
    Spectator,
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnId,
    pub session: SessionKey,
    pub tx: ClientTx,
    pub role: Role,
}

impl Connection {
    pub fn player(&self) -> Option<&PlayerState> {
        match &self.role {
            Role::Player(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    #[cfg(test)]
    pub fn is_spectator(&self) -> bool {
        matches!(self.role, Role::Spectator)
    }
}

/// Every live connection, keyed by wire id
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<ConnId, Connection>,
    sessions: HashMap<SessionKey, ConnId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new Player connection under the lowest free non-negative id
    pub fn register(&mut self, session: SessionKey, tx: ClientTx) -> ConnId {
        let id = (0..ConnId::MAX)
            .find(|id| !self.connections.contains_key(id))
            .unwrap_or(ConnId::MAX);

        self.connections.insert(
            id,
            Connection {
                id,
                session,
                tx,
                role: Role::Player(PlayerState::new(id)),
            },
        );
        self.sessions.insert(session, id);
        id
    }

    /// Turn a Player into the Admin. Its player state is discarded and it
    /// moves to the reserved id. No-op (None) for unknown ids, non-players,
    /// or when an Admin already exists.
    pub fn promote(&mut self, id: ConnId) -> Option<ConnId> {
        if self.has_admin() {
            return None;
        }
        let conn = self.take_player(id)?;
        self.insert(Connection {
            id: ADMIN_ID,
            session: conn.session,
            tx: conn.tx,
            role: Role::Admin,
        });
        Some(ADMIN_ID)
    }

    /// Turn a Player into a Spectator, keeping its id
    pub fn promote_spectator(&mut self, id: ConnId) -> bool {
        let Some(conn) = self.take_player(id) else {
            return false;
        };
        self.insert(Connection {
            id,
            session: conn.session,
            tx: conn.tx,
            role: Role::Spectator,
        });
        true
    }

    fn take_player(&mut self, id: ConnId) -> Option<Connection> {
        if self.connections.get(&id)?.player().is_none() {
            return None;
        }
        self.remove(id)
    }

    fn insert(&mut self, conn: Connection) {
        self.sessions.insert(conn.session, conn.id);
        self.connections.insert(conn.id, conn);
    }

    pub fn remove(&mut self, id: ConnId) -> Option<Connection> {
        let conn = self.connections.remove(&id)?;
        self.sessions.remove(&conn.session);
        Some(conn)
    }

    /// Remove every Player connection, keeping the Admin and Spectators
    pub fn remove_players(&mut self) -> Vec<Connection> {
        let ids: Vec<ConnId> = self.players().map(|p| p.id).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn id_for_session(&self, session: &SessionKey) -> Option<ConnId> {
        self.sessions.get(session).copied()
    }

    pub fn get(&self, id: ConnId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn player_mut(&mut self, id: ConnId) -> Option<&mut PlayerState> {
        match &mut self.connections.get_mut(&id)?.role {
            Role::Player(state) => Some(state),
            _ => None,
        }
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.connections.values().filter_map(Connection::player)
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut PlayerState> {
        self.connections.values_mut().filter_map(|c| match &mut c.role {
            Role::Player(state) => Some(state),
            _ => None,
        })
    }

    pub fn player_count(&self) -> usize {
        self.players().count()
    }

    pub fn has_admin(&self) -> bool {
        self.connections.contains_key(&ADMIN_ID)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
