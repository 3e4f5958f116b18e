//! Per-tick peer state broadcast with per-recipient deduplication

use std::collections::HashMap;

use serde_json::Value;

use crate::ws::protocol::{ClientsFrame, ConnId, PowerupView};

use super::registry::{send, ConnectionRegistry, Role};

/// Build and send one `cl` frame to every connection.
///
/// Players get a delta: peers whose latest data every other player has
/// already received are left out, except on the recipient's first frame
/// which always carries the full picture. Spectators and the Admin always
/// get the full picture. Eliminated peers and peers still reporting a
/// placeholder id are never included.
pub fn broadcast_peer_state(registry: &mut ConnectionRegistry, powerups: &[PowerupView]) {
    for player in registry.players_mut() {
        player.refresh();
    }

    let recipients = registry.player_count();
    let saturated = recipients.saturating_sub(1);
    let mut delivered: HashMap<ConnId, usize> = HashMap::new();

    let visible: Vec<(ConnId, usize, &Value)> = registry
        .players()
        .filter_map(|p| p.visible_data().map(|data| (p.id, p.sent_counter, data)))
        .collect();

    for conn in registry.connections() {
        let players: Vec<&Value> = match &conn.role {
            Role::Admin | Role::Spectator => visible.iter().map(|(_, _, data)| *data).collect(),
            Role::Player(me) => visible
                .iter()
                .filter(|(id, sent, _)| *id != me.id && (me.first_frame || *sent < saturated))
                .map(|(id, _, data)| {
                    *delivered.entry(*id).or_default() += 1;
                    *data
                })
                .collect(),
        };
        send(&conn.tx, &ClientsFrame::new(players, powerups));
    }

    for player in registry.players_mut() {
        if let Some(count) = delivered.get(&player.id) {
            player.sent_counter = (player.sent_counter + count).min(saturated);
        }
        player.first_frame = false;
    }
}
