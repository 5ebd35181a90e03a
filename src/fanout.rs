//! Response fan-out: turns response-queue messages into per-room
//! broadcasts.
//!
//! ## Architecture
//!
//! - **[`RoomHub`]** — a broadcast hub managing named rooms. A *game room*
//!   contains every subscriber of one game; a *player room* contains
//!   exactly one recipient, named by their opaque player id. Front-ends
//!   subscribe their transport sessions to rooms and forward the events.
//!
//! - **[`ResponseFanout`]** — the consumer of the response queue. It is
//!   stateless with respect to game rules: every envelope it handles is
//!   self-describing. Per event it decides the destination room, derives
//!   the viewer color for sync snapshots, and maintains the side-index
//!   sets of waiting and playing games in the store.
//!
//! ## Routing
//!
//! | Response    | Destination                                             |
//! |-------------|---------------------------------------------------------|
//! | `sync-cnf`  | player room, with derived `color` (w / b / o)           |
//! | `move-cnf`  | game room on success; player room on failure            |
//! | `game-cnf`  | player room; registers the game in the waiting index    |
//! | `join-cnf`  | player room; moves the game waiting → playing           |
//! | `error-ind` | logged, never fatal                                     |

use crate::store::Store;
use crate::types::GameResult;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Broadcast buffer per room; slow subscribers lose oldest events first.
const ROOM_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// Room hub
// ---------------------------------------------------------------------------

/// One event delivered to a room.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    /// Event name ("sync-cnf", "move-cnf", ...).
    pub event: String,
    /// Self-describing JSON payload.
    pub data: Value,
}

/// Central broadcast hub: maps room names to broadcast channels.
///
/// Rooms are created on first use and live for the hub's lifetime; sending
/// into a room nobody subscribed to just drops the event.
#[derive(Default)]
pub struct RoomHub {
    rooms: Mutex<HashMap<String, broadcast::Sender<RoomEvent>>>,
}

/// The room name carrying events for everyone watching a game.
pub fn game_room(game_id: i64) -> String {
    format!("game:{game_id}")
}

/// The room name addressing a single player. String ids are used verbatim;
/// other id shapes use their JSON encoding.
pub fn player_room(player_id: &Value) -> String {
    match player_id {
        Value::String(s) => format!("player:{s}"),
        other => format!("player:{other}"),
    }
}

impl RoomHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, room: &str) -> broadcast::Sender<RoomEvent> {
        let mut rooms = self.rooms.lock().unwrap();
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_BUFFER).0)
            .clone()
    }

    /// Subscribes to a room, receiving every event emitted after this call.
    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<RoomEvent> {
        self.sender(room).subscribe()
    }

    /// Emits an event into a room. Events into empty rooms are dropped.
    pub fn emit(&self, room: &str, event: &str, data: Value) {
        let sender = self.sender(room);
        let _ = sender.send(RoomEvent { event: event.to_string(), data });
        log::debug!("emitted {event} to {room}");
    }
}

// ---------------------------------------------------------------------------
// Fan-out loop
// ---------------------------------------------------------------------------

/// Consumer of the response queue, emitting room events until the manager
/// announces shutdown with an `exit-cnf`.
pub struct ResponseFanout {
    store: Arc<dyn Store>,
    hub: Arc<RoomHub>,
    out_queue: String,
    /// Prefix of the side-index set keys (`<base>:waiting`, `<base>:playing`).
    index_base: String,
}

impl ResponseFanout {
    /// Creates a fan-out over `out_queue`, maintaining side indices under
    /// `index_base`.
    pub fn new(
        store: Arc<dyn Store>,
        hub: Arc<RoomHub>,
        out_queue: impl Into<String>,
        index_base: impl Into<String>,
    ) -> Self {
        Self { store, hub, out_queue: out_queue.into(), index_base: index_base.into() }
    }

    fn waiting_index(&self) -> String {
        format!("{}:waiting", self.index_base)
    }

    fn playing_index(&self) -> String {
        format!("{}:playing", self.index_base)
    }

    /// Blocks on the response queue and dispatches every message. Returns
    /// once an `exit-cnf` arrives; malformed messages are logged and
    /// skipped.
    pub async fn run(self) -> GameResult<()> {
        loop {
            let raw = self.store.blpop(&self.out_queue).await?;
            match serde_json::from_str::<(i64, Value, String, Value)>(&raw) {
                Ok((game_id, player_id, cmd, data)) => {
                    self.dispatch(game_id, &player_id, &cmd, data).await?;
                }
                Err(_) => {
                    // The only two-element envelope is the manager's
                    // shutdown announcement.
                    if let Ok((cmd, worker)) = serde_json::from_str::<(String, String)>(&raw)
                        && cmd == "exit-cnf"
                    {
                        log::info!("fan-out stopping: {worker} exited");
                        return Ok(());
                    }
                    log::warn!("fan-out skipping unparseable response {raw:?}");
                }
            }
        }
    }

    async fn dispatch(
        &self,
        game_id: i64,
        player_id: &Value,
        cmd: &str,
        data: Value,
    ) -> GameResult<()> {
        match cmd {
            "sync-cnf" => self.on_sync(player_id, data),
            "move-cnf" => self.on_move(game_id, player_id, data).await?,
            "game-cnf" => self.on_game(game_id, player_id, data).await?,
            "join-cnf" => self.on_join(game_id, player_id, data).await?,
            "error-ind" => {
                // Never collapse on a manager-side fault.
                log::error!("error-ind for game {game_id}: {data}");
            }
            other => log::warn!("fan-out ignoring unknown response {other:?}"),
        }
        Ok(())
    }

    /// Sync snapshots go to the requester only, tagged with their color:
    /// "w" or "b" for the seated players, "o" for observers.
    fn on_sync(&self, player_id: &Value, data: Value) {
        let room = player_room(player_id);
        if data.is_null() {
            self.hub.emit(&room, "sync-cnf", json!({"result": "fail"}));
            return;
        }
        let color = if data["white"] == *player_id {
            "w"
        } else if data["black"] == *player_id {
            "b"
        } else {
            "o"
        };
        self.hub.emit(&room, "sync-cnf", json!({"color": color, "board": data["board"]}));
    }

    /// Successful moves broadcast to the whole game room; failures go back
    /// to the initiator alone, so observers never see them.
    async fn on_move(&self, game_id: i64, player_id: &Value, data: Value) -> GameResult<()> {
        if data.is_null() {
            self.hub.emit(
                &player_room(player_id),
                "move-cnf",
                json!({"result": "fail", "reason": "illegal move"}),
            );
            return Ok(());
        }

        // A terminal state retires the game from the active index.
        if data["state"] != json!("playing") {
            self.store.srem(&self.playing_index(), &game_id.to_string()).await?;
        }

        self.hub.emit(
            &game_room(game_id),
            "move-cnf",
            json!({"result": "success", "move": data["move"]}),
        );
        Ok(())
    }

    async fn on_game(&self, game_id: i64, player_id: &Value, data: Value) -> GameResult<()> {
        let room = player_room(player_id);
        if data.is_null() {
            self.hub.emit(&room, "game-cnf", json!({"result": "fail"}));
            return Ok(());
        }
        if data["state"] == json!("waiting") {
            self.store.sadd(&self.waiting_index(), &game_id.to_string()).await?;
        }
        self.hub.emit(&room, "game-cnf", json!({"result": "success", "game": data}));
        Ok(())
    }

    async fn on_join(&self, game_id: i64, player_id: &Value, data: Value) -> GameResult<()> {
        let room = player_room(player_id);
        if data.is_null() {
            self.hub.emit(&room, "join-cnf", json!({"result": "fail"}));
            return Ok(());
        }
        if data["state"] == json!("playing") {
            let id = game_id.to_string();
            self.store.srem(&self.waiting_index(), &id).await?;
            self.store.sadd(&self.playing_index(), &id).await?;
        }
        self.hub.emit(&room, "join-cnf", json!({"result": "success", "game": data}));
        Ok(())
    }
}
