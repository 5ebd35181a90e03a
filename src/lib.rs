//! # Kung-Fu Chess — game core
//!
//! Kung-Fu Chess is a real-time chess variant: both players move
//! simultaneously with no turns, and each piece is locked for a per-piece
//! cooldown after it moves. This crate is the authoritative game core:
//!
//! - **Game engine** — 0x88 board representation, pseudo-legal move
//!   generation, cooldown-aware move application, castling, promotion,
//!   and win-by-king-capture detection.
//!
//! - **Game manager** — a queue-driven command loop serving many games
//!   concurrently out of a shared key-value store. Clients push
//!   `[game_id, player_id, cmd, data]` JSON envelopes onto a request
//!   queue; workers apply them and push confirmations onto a response
//!   queue.
//!
//! - **Response fan-out** — consumes the response queue and broadcasts
//!   events to per-game and per-player rooms for front-ends to forward.
//!
//! Game records, queues, and side indices all live in the store, so any
//! number of manager processes can run side by side; commands for a single
//! game are always serialized through one worker.
//!
//! ## Module map
//!
//! | Module    | Responsibility                                         |
//! |-----------|--------------------------------------------------------|
//! | [`types`]   | Squares, pieces, moves, states, errors               |
//! | [`store`]   | Key-value backends: in-memory and Redis              |
//! | [`board`]   | Materialized board + persistent game record          |
//! | [`movegen`] | Pseudo-legal move enumeration                        |
//! | [`game`]    | nFEN creation, the move applier, sync snapshots      |
//! | [`manager`] | The request-queue command loop                       |
//! | [`fanout`]  | Response fan-out into broadcast rooms                |

pub mod board;
pub mod fanout;
pub mod game;
pub mod manager;
pub mod movegen;
pub mod store;
pub mod types;
