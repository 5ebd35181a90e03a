//! The game manager: a queue-driven command loop multiplexing many games.
//!
//! Clients push JSON arrays `[game_id, player_id, cmd, data]` onto the
//! request queue; responses come back on the response queue in the same
//! envelope (`exit-cnf` alone is `[cmd, worker_name]`). The manager owns no
//! game state of its own; everything lives in the store, so any number of
//! managers can serve disjoint request queues.
//!
//! ## Commands
//!
//! | Command    | Data                     | Response                          |
//! |------------|--------------------------|-----------------------------------|
//! | `game-req` | `{cd, nfen?, exp?}`      | `game-cnf {state, store_key}`     |
//! | `join-req` | `{}`                     | `join-cnf {state, store_key}`     |
//! | `move-req` | `{from, to, promote?}`   | `move-cnf {state, move}` or null  |
//! | `sync-req` | `{}`                     | `sync-cnf {board, white, black}`  |
//! | `exit-req` | —                        | `exit-cnf` and loop shutdown      |
//!
//! Unknown commands and handler faults produce an `error-ind`; nothing but
//! `exit-req` ever stops the loop.
//!
//! ## Ordering
//!
//! Commands are dispatched to a pool of worker tasks by hashing the game
//! id, so all commands for one game are handled by one worker in
//! request-queue order, and its responses are pushed in that same order.
//! There is no ordering across games.

use crate::board::BoardStore;
use crate::game;
use crate::store::{Store, StoreResult};
use crate::types::{GameError, GameResult, PieceKind};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Idle TTL applied to both queues after every push (1 hour).
const QUEUE_TTL_MS: u64 = 3_600_000;

/// Default idle TTL for game records created without an explicit `exp`.
const DEFAULT_GAME_TTL_MS: u64 = 3_600_000;

/// Mailbox depth per worker.
const WORKER_QUEUE_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Request envelope
// ---------------------------------------------------------------------------

/// One parsed request envelope. The player id is deliberately opaque:
/// front-ends use strings, tests use integers, and the manager only ever
/// compares and echoes it.
#[derive(Debug, Clone)]
struct Request {
    game_id: i64,
    player_id: Value,
    cmd: String,
    data: Value,
}

fn parse_request(raw: &str) -> Result<Request, String> {
    serde_json::from_str::<(i64, Value, String, Value)>(raw)
        .map(|(game_id, player_id, cmd, data)| Request { game_id, player_id, cmd, data })
        .map_err(|e| e.to_string())
}

/// Payload of a `game-req`.
#[derive(Debug, Deserialize)]
struct GameReq {
    cd: u64,
    #[serde(default)]
    nfen: Option<String>,
    #[serde(default)]
    exp: Option<u64>,
}

// ---------------------------------------------------------------------------
// Client-side helpers
// ---------------------------------------------------------------------------

/// Pushes a request envelope onto a request queue and refreshes the
/// queue's idle TTL, as front-ends do.
pub async fn push_request(
    store: &dyn Store,
    queue: &str,
    game_id: i64,
    player_id: &Value,
    cmd: &str,
    data: &Value,
) -> StoreResult<()> {
    let msg = json!([game_id, player_id, cmd, data]).to_string();
    store.rpush(queue, &msg).await?;
    store.pexpire(queue, QUEUE_TTL_MS).await
}

/// Pushes an `exit-req` to the *head* of a request queue, preempting any
/// queued commands.
pub async fn push_exit(store: &dyn Store, queue: &str) -> StoreResult<()> {
    store.lpush(queue, &json!([-1, -1, "exit-req", Value::Null]).to_string()).await
}

/// Allocates the next game id from the shared counter under `key_base`.
pub async fn next_game_id(store: &dyn Store, key_base: &str) -> StoreResult<i64> {
    store.incr(&format!("{key_base}:games:game_id")).await
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// A manager instance: one request-queue consumer plus its worker pool.
pub struct GameManager {
    store: Arc<dyn Store>,
    name: String,
    in_queue: String,
    out_queue: String,
    workers: usize,
}

impl GameManager {
    /// Creates a manager with a fresh unique key base (`manager:<uuid>`).
    pub fn new(
        store: Arc<dyn Store>,
        in_queue: impl Into<String>,
        out_queue: impl Into<String>,
        workers: usize,
    ) -> Self {
        Self {
            store,
            name: format!("manager:{}", Uuid::new_v4()),
            in_queue: in_queue.into(),
            out_queue: out_queue.into(),
            workers: workers.max(1),
        }
    }

    /// The key base game records are stored under.
    pub fn key_base(&self) -> &str {
        &self.name
    }

    /// The store key for a game id under this manager.
    pub fn game_key(&self, game_id: i64) -> String {
        format!("{}:games:{}", self.name, game_id)
    }

    /// Runs the command loop until an `exit-req` arrives. Every request is
    /// routed to the worker owning its game id; unparseable envelopes are
    /// answered with an `error-ind` right here.
    pub async fn run(self) -> GameResult<()> {
        let mut senders = Vec::with_capacity(self.workers);
        let mut handles = Vec::with_capacity(self.workers);
        for i in 0..self.workers {
            let (tx, rx) = mpsc::channel::<Request>(WORKER_QUEUE_DEPTH);
            let worker = Worker {
                name: format!("{}:worker-{i}", self.name),
                store: self.store.clone(),
                key_base: self.name.clone(),
                out_queue: self.out_queue.clone(),
            };
            handles.push(tokio::spawn(worker.run(rx)));
            senders.push(tx);
        }
        log::info!(
            "{} serving {} -> {} with {} workers",
            self.name,
            self.in_queue,
            self.out_queue,
            self.workers
        );

        loop {
            let raw = self.store.blpop(&self.in_queue).await?;
            let req = match parse_request(&raw) {
                Ok(req) => req,
                Err(reason) => {
                    log::warn!("{}: unparseable request {raw:?}: {reason}", self.name);
                    self.push_raw(json!([
                        -1,
                        -1,
                        "error-ind",
                        {"reason": "exception", "exc": reason}
                    ]))
                    .await?;
                    continue;
                }
            };

            if req.cmd == "exit-req" {
                log::info!("{}: exit-req received, draining workers", self.name);
                drop(senders);
                for handle in handles {
                    let _ = handle.await;
                }
                self.push_raw(json!(["exit-cnf", self.name])).await?;
                return Ok(());
            }

            let slot = req.game_id.rem_euclid(self.workers as i64) as usize;
            if senders[slot].send(req).await.is_err() {
                log::error!("{}: worker {slot} is gone, dropping request", self.name);
            }
        }
    }

    async fn push_raw(&self, msg: Value) -> GameResult<()> {
        self.store.rpush(&self.out_queue, &msg.to_string()).await?;
        self.store.pexpire(&self.out_queue, QUEUE_TTL_MS).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// One worker task. All commands for a given game id land on the same
/// worker, which makes per-game serialization a structural property rather
/// than a locking problem.
struct Worker {
    name: String,
    store: Arc<dyn Store>,
    key_base: String,
    out_queue: String,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<Request>) {
        while let Some(req) = rx.recv().await {
            log::debug!("{}: [{}, {}] handling {}", self.name, req.game_id, req.player_id, req.cmd);
            if let Err(err) = self.handle(&req).await {
                // One bad request must not take the worker down.
                log::error!("{}: {} failed: {err}", self.name, req.cmd);
                let fault = json!([
                    req.game_id,
                    req.player_id,
                    "error-ind",
                    {"reason": "exception", "exc": err.to_string()}
                ]);
                if let Err(push_err) = self.push_raw(fault).await {
                    log::error!("{}: could not push error-ind: {push_err}", self.name);
                }
            }
        }
    }

    fn game_key(&self, game_id: i64) -> String {
        format!("{}:games:{}", self.key_base, game_id)
    }

    async fn handle(&self, req: &Request) -> GameResult<()> {
        match req.cmd.as_str() {
            "game-req" => self.handle_game_req(req).await,
            "join-req" => self.handle_join_req(req).await,
            "move-req" => self.handle_move_req(req).await,
            "sync-req" => self.handle_sync_req(req).await,
            other => {
                log::warn!("{}: unknown command {other:?}", self.name);
                self.push_raw(json!([
                    -1,
                    -1,
                    "error-ind",
                    {"command": other, "reason": "Unknown command"}
                ]))
                .await
            }
        }
    }

    /// Creates a game at this key, seating the requester as white. An
    /// already-existing key or an unplayable nFEN answers with null.
    async fn handle_game_req(&self, req: &Request) -> GameResult<()> {
        let params: GameReq = match serde_json::from_value(req.data.clone()) {
            Ok(params) => params,
            Err(e) => {
                self.push_raw(json!([
                    req.game_id,
                    req.player_id,
                    "error-ind",
                    {"reason": "exception", "exc": e.to_string()}
                ]))
                .await?;
                return Ok(());
            }
        };

        let key = self.game_key(req.game_id);
        if self.store.exists(&key).await? {
            return self.respond(req, "game-cnf", Value::Null).await;
        }

        let created = game::create_from_nfen(
            self.store.clone(),
            &key,
            params.cd,
            params.nfen.as_deref(),
            Some(params.exp.unwrap_or(DEFAULT_GAME_TTL_MS)),
        )
        .await;
        let board = match created {
            Ok(board) => board,
            Err(GameError::BadBoardSetup(reason)) => {
                log::warn!("{}: game {} rejected: {reason}", self.name, req.game_id);
                return self.respond(req, "game-cnf", Value::Null).await;
            }
            Err(e) => return Err(e),
        };
        board.set_white(&req.player_id).await?;
        let state = board.state().await?;
        log::info!("{}: game {} created ({state})", self.name, req.game_id);
        self.respond(req, "game-cnf", json!({"state": state, "store_key": key})).await
    }

    /// Seats the requester as black if the seat is free; either way the
    /// response reports the game's current state. Unknown games answer
    /// with null.
    async fn handle_join_req(&self, req: &Request) -> GameResult<()> {
        let key = self.game_key(req.game_id);
        if !self.store.exists(&key).await? {
            return self.respond(req, "join-cnf", Value::Null).await;
        }

        let board = BoardStore::attach(self.store.clone(), key.as_str());
        if board.black().await?.is_none() {
            board.set_black(&req.player_id).await?;
            log::info!("{}: game {} joined by {}", self.name, req.game_id, req.player_id);
        }
        let state = board.state().await?;
        self.respond(req, "join-cnf", json!({"state": state, "store_key": key})).await
    }

    /// Runs the move applier. Every illegal, mistimed, or malformed move
    /// answers with null; clients cannot tell those apart.
    async fn handle_move_req(&self, req: &Request) -> GameResult<()> {
        let coords = req
            .data
            .get("from")
            .and_then(Value::as_str)
            .zip(req.data.get("to").and_then(Value::as_str));
        let Some((from, to)) = coords else {
            return self.respond(req, "move-cnf", Value::Null).await;
        };

        let promote = match req.data.get("promote") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => {
                let mut chars = s.chars();
                match (chars.next().and_then(PieceKind::from_san), chars.next()) {
                    (Some(kind), None) => Some(kind),
                    _ => return self.respond(req, "move-cnf", Value::Null).await,
                }
            }
            Some(_) => return self.respond(req, "move-cnf", Value::Null).await,
        };

        let key = self.game_key(req.game_id);
        if !self.store.exists(&key).await? {
            return self.respond(req, "move-cnf", Value::Null).await;
        }

        let board = BoardStore::attach(self.store.clone(), key.as_str());
        let data = match game::apply_move(&board, &req.player_id, from, to, promote).await? {
            Some((mv, state)) => json!({
                "state": state,
                "move": {
                    "from": mv.from.notation(),
                    "to": mv.to.notation(),
                    "promote": mv.promote.map(|k| k.san().to_string()),
                    "time": mv.time,
                },
            }),
            None => Value::Null,
        };
        self.respond(req, "move-cnf", data).await
    }

    /// Serializes the game snapshot. Unknown games answer with null.
    async fn handle_sync_req(&self, req: &Request) -> GameResult<()> {
        let key = self.game_key(req.game_id);
        if !self.store.exists(&key).await? {
            return self.respond(req, "sync-cnf", Value::Null).await;
        }

        let board = BoardStore::attach(self.store.clone(), key.as_str());
        let snap = game::snapshot(&board).await?;
        let data = json!({
            "white": snap.white.clone(),
            "black": snap.black.clone(),
            "board": snap,
        });
        self.respond(req, "sync-cnf", data).await
    }

    async fn respond(&self, req: &Request, cmd: &str, data: Value) -> GameResult<()> {
        self.push_raw(json!([req.game_id, req.player_id, cmd, data])).await
    }

    async fn push_raw(&self, msg: Value) -> GameResult<()> {
        self.store.rpush(&self.out_queue, &msg.to_string()).await?;
        self.store.pexpire(&self.out_queue, QUEUE_TTL_MS).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    const IN_Q: &str = "req";
    const OUT_Q: &str = "cnf";

    fn start() -> (Arc<dyn Store>, JoinHandle<GameResult<()>>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let manager = GameManager::new(store.clone(), IN_Q, OUT_Q, 4);
        let handle = tokio::spawn(manager.run());
        (store, handle)
    }

    async fn send(store: &Arc<dyn Store>, game_id: i64, player: Value, cmd: &str, data: Value) {
        push_request(store.as_ref(), IN_Q, game_id, &player, cmd, &data).await.unwrap();
    }

    async fn recv(store: &Arc<dyn Store>) -> (i64, Value, String, Value) {
        let raw = timeout(Duration::from_secs(5), store.blpop(OUT_Q))
            .await
            .expect("response within 5s")
            .unwrap();
        serde_json::from_str(&raw).expect("four-element response envelope")
    }

    async fn shutdown(store: &Arc<dyn Store>, handle: JoinHandle<GameResult<()>>) {
        push_exit(store.as_ref(), IN_Q).await.unwrap();
        handle.await.unwrap().unwrap();
        let raw = store.blpop(OUT_Q).await.unwrap();
        let msg: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(msg[0], json!("exit-cnf"));
    }

    #[tokio::test]
    async fn create_then_join_transitions_to_playing() {
        let (store, handle) = start();

        send(&store, 1, json!("pA"), "game-req", json!({"cd": 1000})).await;
        let (gid, pid, cmd, data) = recv(&store).await;
        assert_eq!((gid, pid.clone(), cmd.as_str()), (1, json!("pA"), "game-cnf"));
        assert_eq!(data["state"], json!("waiting"));
        assert!(data["store_key"].as_str().unwrap().ends_with(":games:1"));

        send(&store, 1, json!("pB"), "join-req", json!({})).await;
        let (gid, pid, cmd, data) = recv(&store).await;
        assert_eq!((gid, pid, cmd.as_str()), (1, json!("pB"), "join-cnf"));
        assert_eq!(data["state"], json!("playing"));

        // Re-creating an existing game is refused with a null payload.
        send(&store, 1, json!("pC"), "game-req", json!({"cd": 1000})).await;
        let (_, _, cmd, data) = recv(&store).await;
        assert_eq!(cmd, "game-cnf");
        assert_eq!(data, Value::Null);

        // Joining a game that does not exist is refused the same way.
        send(&store, 2, json!("pC"), "join-req", json!({})).await;
        let (gid, _, cmd, data) = recv(&store).await;
        assert_eq!((gid, cmd.as_str()), (2, "join-cnf"));
        assert_eq!(data, Value::Null);

        shutdown(&store, handle).await;
    }

    #[tokio::test]
    async fn legal_move_is_confirmed_and_visible_in_sync() {
        let (store, handle) = start();

        send(&store, 1, json!("pA"), "game-req", json!({"cd": 1000})).await;
        send(&store, 1, json!("pB"), "join-req", json!({})).await;
        recv(&store).await;
        recv(&store).await;

        send(&store, 1, json!("pA"), "move-req", json!({"from": "e2", "to": "e4"})).await;
        let (gid, pid, cmd, data) = recv(&store).await;
        assert_eq!((gid, pid, cmd.as_str()), (1, json!("pA"), "move-cnf"));
        assert_eq!(data["state"], json!("playing"));
        assert_eq!(data["move"]["from"], json!("e2"));
        assert_eq!(data["move"]["to"], json!("e4"));
        assert_eq!(data["move"]["promote"], Value::Null);
        let move_time = data["move"]["time"].as_u64().expect("stamped time");

        send(&store, 1, json!("pA"), "sync-req", json!({})).await;
        let (_, _, cmd, data) = recv(&store).await;
        assert_eq!(cmd, "sync-cnf");
        assert_eq!(data["board"]["times"]["e4"], json!(move_time));
        assert!(data["board"]["times"].get("e2").is_none());
        assert_eq!(data["board"]["state"], json!("playing"));
        assert_eq!(data["board"]["history"], Value::Null);
        assert_eq!(data["white"], json!("pA"));
        assert_eq!(data["black"], json!("pB"));

        shutdown(&store, handle).await;
    }

    #[tokio::test]
    async fn moves_by_the_wrong_player_fail() {
        let (store, handle) = start();

        send(&store, 1, json!("pA"), "game-req", json!({"cd": 1000})).await;
        send(&store, 1, json!("pB"), "join-req", json!({})).await;
        recv(&store).await;
        recv(&store).await;

        send(&store, 1, json!("pA"), "move-req", json!({"from": "e2", "to": "e4"})).await;
        recv(&store).await;

        // pB does not own the pawn that just moved to e4.
        send(&store, 1, json!("pB"), "move-req", json!({"from": "e4", "to": "e5"})).await;
        let (_, pid, cmd, data) = recv(&store).await;
        assert_eq!((pid, cmd.as_str()), (json!("pB"), "move-cnf"));
        assert_eq!(data, Value::Null);

        shutdown(&store, handle).await;
    }

    #[tokio::test]
    async fn cooldown_violations_fail_until_the_cooldown_passes() {
        let (store, handle) = start();

        send(&store, 1, json!("pA"), "game-req", json!({"cd": 1000})).await;
        send(&store, 1, json!("pB"), "join-req", json!({})).await;
        recv(&store).await;
        recv(&store).await;

        send(&store, 1, json!("pA"), "move-req", json!({"from": "e2", "to": "e4"})).await;
        let (_, _, _, data) = recv(&store).await;
        assert!(data.is_object());

        // Within the 1000 ms cooldown the same pawn may not move again.
        send(&store, 1, json!("pA"), "move-req", json!({"from": "e4", "to": "e5"})).await;
        let (_, _, _, data) = recv(&store).await;
        assert_eq!(data, Value::Null);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        send(&store, 1, json!("pA"), "move-req", json!({"from": "e4", "to": "e5"})).await;
        let (_, _, cmd, data) = recv(&store).await;
        assert_eq!(cmd, "move-cnf");
        assert_eq!(data["move"]["to"], json!("e5"));

        shutdown(&store, handle).await;
    }

    #[tokio::test]
    async fn king_capture_board_reports_the_win() {
        let (store, handle) = start();

        let nfen = "r3k2r/pbppqppp/1pn2n2/4p3/1bB5/2NPPN2/PPPBQPPP/R6R KQkq 8";
        send(&store, 1, json!("pA"), "game-req", json!({"cd": 1000, "nfen": nfen})).await;
        let (_, _, cmd, data) = recv(&store).await;
        assert_eq!(cmd, "game-cnf");
        assert_eq!(data["state"], json!("b_wins"));

        send(&store, 1, json!("pA"), "sync-req", json!({})).await;
        let (_, _, cmd, data) = recv(&store).await;
        assert_eq!(cmd, "sync-cnf");
        assert_eq!(data["board"]["state"], json!("b_wins"));

        shutdown(&store, handle).await;
    }

    #[tokio::test]
    async fn unplayable_nfen_answers_null() {
        let (store, handle) = start();

        send(
            &store,
            1,
            json!("pA"),
            "game-req",
            json!({"cd": 1000, "nfen": "8/8/8/8/8/8/8/8 - 1"}),
        )
        .await;
        let (_, _, cmd, data) = recv(&store).await;
        assert_eq!(cmd, "game-cnf");
        assert_eq!(data, Value::Null);

        shutdown(&store, handle).await;
    }

    #[tokio::test]
    async fn unknown_commands_do_not_kill_the_manager() {
        let (store, handle) = start();

        send(&store, 1, json!("pA"), "game-req", json!({"cd": 1000})).await;
        recv(&store).await;

        send(&store, 1, json!("pA"), "frobnicate", json!({})).await;
        let (_, _, cmd, data) = recv(&store).await;
        assert_eq!(cmd, "error-ind");
        assert_eq!(data["command"], json!("frobnicate"));
        assert_eq!(data["reason"], json!("Unknown command"));

        // The manager is still alive and serving.
        send(&store, 1, json!("pA"), "sync-req", json!({})).await;
        let (_, _, cmd, data) = recv(&store).await;
        assert_eq!(cmd, "sync-cnf");
        assert_eq!(data["board"]["state"], json!("waiting"));

        shutdown(&store, handle).await;
    }

    #[tokio::test]
    async fn malformed_envelopes_answer_error_ind() {
        let (store, handle) = start();

        for raw in [
            r#"["game-req", 0, {"cd": 1000}]"#,
            r#"["game-req", 1]"#,
            r#"["game-req"]"#,
            r#"["game-req", 1, 0, {"cd": 1000}]"#,
            "not json at all",
        ] {
            store.rpush(IN_Q, raw).await.unwrap();
            let (gid, _, cmd, _) = recv(&store).await;
            assert_eq!((gid, cmd.as_str()), (-1, "error-ind"), "for {raw:?}");
        }

        // A well-formed envelope whose data is missing `cd` also faults.
        send(&store, 1, json!("pA"), "game-req", json!({})).await;
        let (_, _, cmd, data) = recv(&store).await;
        assert_eq!(cmd, "error-ind");
        assert_eq!(data["reason"], json!("exception"));

        shutdown(&store, handle).await;
    }

    #[tokio::test]
    async fn garbage_move_coordinates_answer_null() {
        let (store, handle) = start();

        send(&store, 1, json!("pA"), "game-req", json!({"cd": 1000})).await;
        send(&store, 1, json!("pB"), "join-req", json!({})).await;
        recv(&store).await;
        recv(&store).await;

        let garbage = [
            json!({"from": null, "to": "e4"}),
            json!({"from": "e2", "to": -1}),
            json!({"from": "a", "to": "e2"}),
            json!({"from": "e2e4", "to": "44"}),
            json!({"from": "e2", "to": "e4", "promote": "x"}),
            json!({"to": "e4"}),
            json!({}),
        ];
        for data in garbage {
            send(&store, 1, json!("pA"), "move-req", data.clone()).await;
            let (_, _, cmd, payload) = recv(&store).await;
            assert_eq!(cmd, "move-cnf", "for {data}");
            assert_eq!(payload, Value::Null, "for {data}");
        }

        // Moves against a game that does not exist get the same answer.
        send(&store, 9, json!("pA"), "move-req", json!({"from": "e2", "to": "e4"})).await;
        let (gid, _, cmd, payload) = recv(&store).await;
        assert_eq!((gid, cmd.as_str()), (9, "move-cnf"));
        assert_eq!(payload, Value::Null);

        // Sync against an unknown game reports null rather than an error.
        send(&store, 9, json!("pA"), "sync-req", json!({})).await;
        let (_, _, cmd, payload) = recv(&store).await;
        assert_eq!(cmd, "sync-cnf");
        assert_eq!(payload, Value::Null);

        shutdown(&store, handle).await;
    }

    #[tokio::test]
    async fn responses_for_one_game_keep_request_order() {
        let (store, handle) = start();

        send(&store, 1, json!("pA"), "game-req", json!({"cd": 0})).await;
        send(&store, 1, json!("pB"), "join-req", json!({})).await;
        send(&store, 1, json!("pA"), "move-req", json!({"from": "e2", "to": "e4"})).await;
        for _ in 0..5 {
            send(&store, 1, json!("pA"), "sync-req", json!({})).await;
        }
        send(&store, 1, json!("pA"), "move-req", json!({"from": "d2", "to": "d4"})).await;

        let mut cmds = Vec::new();
        for _ in 0..9 {
            let (gid, _, cmd, _) = recv(&store).await;
            assert_eq!(gid, 1);
            cmds.push(cmd);
        }
        assert_eq!(
            cmds,
            vec![
                "game-cnf", "join-cnf", "move-cnf", "sync-cnf", "sync-cnf", "sync-cnf",
                "sync-cnf", "sync-cnf", "move-cnf"
            ]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
        );

        shutdown(&store, handle).await;
    }

    #[tokio::test]
    async fn game_ids_come_from_a_shared_counter() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        assert_eq!(next_game_id(store.as_ref(), "kfc").await.unwrap(), 1);
        assert_eq!(next_game_id(store.as_ref(), "kfc").await.unwrap(), 2);
        assert_eq!(next_game_id(store.as_ref(), "other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn exit_req_stops_the_loop_cleanly() {
        let (store, handle) = start();
        push_exit(store.as_ref(), IN_Q).await.unwrap();
        handle.await.unwrap().unwrap();

        let raw = store.blpop(OUT_Q).await.unwrap();
        let msg: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(msg.as_array().map(Vec::len), Some(2));
        assert_eq!(msg[0], json!("exit-cnf"));
        assert!(msg[1].as_str().unwrap().starts_with("manager:"));
    }
}
