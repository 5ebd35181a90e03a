//! Game-level operations: creating games from nFEN, applying moves with
//! cooldown semantics, and serializing sync snapshots.
//!
//! This is the deterministic authority over a single game. A move request
//! either matches a generated pseudo-legal move, clears its piece's
//! cooldown, and mutates the store, or it silently fails: every kind of
//! illegal, mistimed, or malformed request collapses to `None`, so clients
//! cannot distinguish a parse error from an illegal move. Only store
//! faults surface as errors.

use crate::board::{Board, BoardStore};
use crate::movegen;
use crate::store::{Store, now_ms};
use crate::types::{
    CastleSide, CastlingRights, Color, GameError, GameResult, GameState, Move, Piece, PieceKind,
    Square,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// nFEN of the standard starting position.
pub const STARTING_NFEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR KQkq 1";

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

/// Creates a new game record at `key` from an nFEN (the starting position
/// when `None`), with per-piece cooldown `cd` in milliseconds and an
/// optional idle TTL.
///
/// Fails with [`GameError::BadBoardSetup`] when the nFEN is malformed or
/// describes a board with zero kings, more than two kings, or two kings of
/// one color. A single-king board is a legal, already-won game: its state
/// is the corresponding win state rather than `waiting`.
pub async fn create_from_nfen(
    store: Arc<dyn Store>,
    key: &str,
    cd: u64,
    nfen: Option<&str>,
    exp: Option<u64>,
) -> GameResult<BoardStore> {
    let nfen = nfen.unwrap_or(STARTING_NFEN);
    let mut parts = nfen.split_whitespace();
    let (layout, castles, move_number) = match (parts.next(), parts.next(), parts.next(), parts.next())
    {
        (Some(layout), Some(castles), Some(move_number), None) => (layout, castles, move_number),
        _ => {
            return Err(GameError::BadBoardSetup(
                "nFEN must have exactly three fields".into(),
            ));
        }
    };

    let parsed = Board::from_fen(layout)?;
    check_kings(&parsed)?;

    let move_number: u64 = move_number
        .parse()
        .map_err(|_| GameError::BadBoardSetup(format!("bad move counter {move_number:?}")))?;

    let board = BoardStore::attach(store, key);
    board.set_state(GameState::Waiting).await?;
    for (sq, piece) in parsed.pieces() {
        board.put(sq, Some(piece)).await?;
    }
    board.set_castles(CastlingRights::from_nfen(castles)).await?;
    board.init_meta(cd, now_ms(), move_number, exp).await?;

    // A board that is already missing a king was won before it started.
    if let Some(winner) = board.winner().await? {
        board.set_state(GameState::win(winner)).await?;
    }

    Ok(board)
}

/// Validates the king population of a freshly parsed board.
fn check_kings(board: &Board) -> GameResult<()> {
    let mut white = 0;
    let mut black = 0;
    for (_, piece) in board.pieces() {
        if piece.kind == PieceKind::King {
            match piece.color {
                Color::White => white += 1,
                Color::Black => black += 1,
            }
        }
    }
    if white > 1 || black > 1 {
        return Err(GameError::BadBoardSetup("two kings of one color".into()));
    }
    if white + black == 0 {
        return Err(GameError::BadBoardSetup("board has no kings".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Move application
// ---------------------------------------------------------------------------

/// Squares whose involvement in any move (as origin or destination)
/// permanently disables one castling right: the king's home square plus the
/// relevant rook's home square.
fn castle_disabling_squares(color: Color, side: CastleSide) -> [Square; 2] {
    let rank = match color {
        Color::White => 1,
        Color::Black => 8,
    };
    let rook_file = match side {
        CastleSide::King => 8,
        CastleSide::Queen => 1,
    };
    [
        Square::from_file_rank(5, rank).expect("king square in range"),
        Square::from_file_rank(rook_file, rank).expect("rook square in range"),
    ]
}

/// Attempts the move `from`→`to` (algebraic notation) on behalf of
/// `player`. Returns the stamped move and the resulting game state, or
/// `None` for anything illegal: bad notation, game not in play, a piece
/// the player does not own, no matching generated move, or a cooldown
/// violation.
pub async fn apply_move(
    board: &BoardStore,
    player: &Value,
    from: &str,
    to: &str,
    promote: Option<PieceKind>,
) -> GameResult<Option<(Move, GameState)>> {
    // Parse failures must be indistinguishable from illegal moves.
    let (Ok(from_sq), Ok(to_sq)) = (Square::from_notation(from), Square::from_notation(to)) else {
        return Ok(None);
    };

    let record = board.load().await?;
    if record.state != GameState::Playing {
        return Ok(None);
    }

    let Some(piece) = record.board.get(from_sq) else {
        return Ok(None);
    };
    let owner = match piece.color {
        Color::White => record.white.as_ref(),
        Color::Black => record.black.as_ref(),
    };
    if owner != Some(player) {
        return Ok(None);
    }

    let Some(mut mv) = movegen::moves(&record.board, &record.castles, from_sq)
        .into_iter()
        .find(|m| m.to == to_sq && m.promote == promote)
    else {
        return Ok(None);
    };

    // Cooldown check, in time relative to the game start.
    let rel_now = now_ms().saturating_sub(record.start_time);
    if let Some(last) = piece.last_move
        && record.cd > rel_now.saturating_sub(last)
    {
        return Ok(None);
    }

    board.move_piece(from_sq, to_sq, rel_now).await?;

    // Castling hops the rook over the king; its cooldown starts now too.
    if mv.kingside_castle {
        board.move_piece(to_sq.right(), to_sq.left(), rel_now).await?;
    }
    if mv.queenside_castle {
        board.move_piece(to_sq.left().left(), to_sq.right(), rel_now).await?;
    }

    if let Some(target) = mv.promote {
        let promoted = Piece { kind: target, color: piece.color, last_move: Some(rel_now) };
        board.put(to_sq, Some(promoted)).await?;
    }

    // Touching a king or rook home square revokes the matching right, for
    // either color (capturing a home rook counts).
    for color in [Color::White, Color::Black] {
        for side in [CastleSide::King, CastleSide::Queen] {
            let squares = castle_disabling_squares(color, side);
            if squares.contains(&from_sq) || squares.contains(&to_sq) {
                board.disable_castle(color, side).await?;
            }
        }
    }

    let state = match board.winner().await? {
        Some(winner) => {
            let won = GameState::win(winner);
            board.set_state(won).await?;
            won
        }
        None => GameState::Playing,
    };

    mv.time = Some(rel_now);
    Ok(Some((mv, state)))
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The board part of a `sync-cnf` payload.
///
/// `times` only lists pieces that have moved; `history` is reserved and
/// always null.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub cd: u64,
    pub history: Option<Value>,
    pub white: Value,
    pub black: Value,
    pub state: GameState,
    pub current_time: u64,
    pub start_time: u64,
    pub nfen: String,
    pub times: HashMap<String, u64>,
}

/// Serializes the game into its sync snapshot.
pub async fn snapshot(board: &BoardStore) -> GameResult<Snapshot> {
    let record = board.load().await?;
    Ok(Snapshot {
        cd: record.cd,
        history: None,
        white: record.white.clone().unwrap_or(Value::Null),
        black: record.black.clone().unwrap_or(Value::Null),
        state: record.state,
        current_time: now_ms(),
        start_time: record.start_time,
        nfen: record.nfen(),
        times: record.board.times(),
    })
}
