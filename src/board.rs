//! Board state, both materialized and store-backed.
//!
//! [`Board`] is a plain 0x88 piece array used by the move generator and for
//! rendering; it is always materialized fresh from the store for the
//! duration of a single command and never cached across commands.
//!
//! [`BoardStore`] is the persistent game record: one hash per game holding
//! the occupied squares (field = algebraic notation, value = encoded
//! piece), the king locators, the players, lifecycle state, castling
//! rights, counters, and timing fields. Every read and write refreshes the
//! record's idle TTL so abandoned games self-collect.

use crate::store::Store;
use crate::types::{
    CastleSide, CastlingRights, Color, GameError, GameResult, GameState, Piece, PieceKind, Square,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

// Hash field names for everything that is not a square. None of these parse
// as algebraic notation, so they can never collide with a square field.
const F_WHITE: &str = "white";
const F_BLACK: &str = "black";
const F_STATE: &str = "state";
const F_CASTLES: &str = "castles";
const F_MOVE_NUMBER: &str = "move_number";
const F_START_TIME: &str = "start_time";
const F_CD: &str = "cd";
const F_LAST_MOVE: &str = "last_move";
const F_EXP: &str = "exp";

/// King locator field for a color.
fn king_field(color: Color) -> &'static str {
    match color {
        Color::White => "king:w",
        Color::Black => "king:b",
    }
}

// ---------------------------------------------------------------------------
// Materialized board
// ---------------------------------------------------------------------------

/// A materialized 8x8 board in the 0x88 layout (128 slots, half of them
/// off-board guard slots).
#[derive(Clone)]
pub struct Board {
    squares: [Option<Piece>; 128],
}

impl Default for Board {
    fn default() -> Self {
        Self { squares: [None; 128] }
    }
}

impl Board {
    /// Returns the piece on a square; `None` for empty or invalid squares.
    pub fn get(&self, sq: Square) -> Option<Piece> {
        if !sq.valid() {
            return None;
        }
        self.squares[sq.index() as usize]
    }

    /// Places (or clears) a piece on a valid square.
    pub fn set(&mut self, sq: Square, piece: Option<Piece>) {
        if sq.valid() {
            self.squares[sq.index() as usize] = piece;
        }
    }

    /// Rebuilds a board from the square fields of a game record. Fields
    /// that are not algebraic notation are skipped.
    pub fn from_record(record: &HashMap<String, String>) -> GameResult<Board> {
        let mut board = Board::default();
        for (field, value) in record {
            let Ok(sq) = Square::from_notation(field) else {
                continue;
            };
            board.set(sq, Some(Piece::from_field(value)?));
        }
        Ok(board)
    }

    /// Parses the board field of an nFEN: 8 ranks top to bottom, separated
    /// by `/`, with digits for runs of empty squares.
    pub fn from_fen(fen: &str) -> GameResult<Board> {
        let mut board = Board::default();
        let ranks: Vec<&str> = fen.split('/').collect();
        if ranks.len() != 8 {
            return Err(GameError::BadBoardSetup(format!(
                "expected 8 ranks, got {}",
                ranks.len()
            )));
        }
        for (row, rank_text) in ranks.iter().enumerate() {
            let rank = 8 - row as u8;
            let mut file = 1u8;
            for c in rank_text.chars() {
                if let Some(run) = c.to_digit(10) {
                    if !(1..=8).contains(&run) {
                        return Err(GameError::BadBoardSetup(format!("bad empty run {c:?}")));
                    }
                    file += run as u8;
                } else {
                    let piece = Piece::from_fen_char(c)
                        .ok_or_else(|| GameError::BadBoardSetup(format!("bad piece {c:?}")))?;
                    let sq = Square::from_file_rank(file, rank)
                        .map_err(|_| GameError::BadBoardSetup(format!("rank {rank} overflows")))?;
                    board.set(sq, Some(piece));
                    file += 1;
                }
            }
            if file != 9 {
                return Err(GameError::BadBoardSetup(format!(
                    "rank {rank} covers {} files",
                    file - 1
                )));
            }
        }
        Ok(board)
    }

    /// Iterates all occupied squares, rank 1 to rank 8.
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        (0..128i16)
            .map(Square::from_index)
            .filter(|sq| sq.valid())
            .filter_map(|sq| self.get(sq).map(|p| (sq, p)))
    }

    /// Finds the king square for a color.
    pub fn king(&self, color: Color) -> Option<Square> {
        self.pieces()
            .find(|(_, p)| p.kind == PieceKind::King && p.color == color)
            .map(|(sq, _)| sq)
    }

    /// Renders the board part of an nFEN (ranks top to bottom, digits for
    /// runs of empty squares).
    pub fn fen(&self) -> String {
        let mut fen = String::new();
        for rank in (1..=8u8).rev() {
            let mut empty = 0;
            for file in 1..=8u8 {
                let sq = Square::from_file_rank(file, rank).expect("file and rank in range");
                match self.get(sq) {
                    Some(piece) => {
                        if empty > 0 {
                            fen.push_str(&empty.to_string());
                            empty = 0;
                        }
                        fen.push(piece.fen_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                fen.push_str(&empty.to_string());
            }
            if rank > 1 {
                fen.push('/');
            }
        }
        fen
    }

    /// Renders an ASCII diagram, rank 8 at the top, `.` for empty squares.
    pub fn ascii(&self) -> String {
        let mut out = String::new();
        for rank in (1..=8u8).rev() {
            for file in 1..=8u8 {
                let sq = Square::from_file_rank(file, rank).expect("file and rank in range");
                out.push(self.get(sq).map_or('.', Piece::fen_char));
            }
            out.push('\n');
        }
        out
    }

    /// Relative move times of every piece that has moved, keyed by
    /// algebraic square.
    pub fn times(&self) -> HashMap<String, u64> {
        self.pieces()
            .filter_map(|(sq, p)| p.last_move.map(|t| (sq.notation(), t)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Store-backed game record
// ---------------------------------------------------------------------------

/// A command-scoped view of a whole game record, materialized with a single
/// store round-trip by [`BoardStore::load`].
pub struct GameRecord {
    pub board: Board,
    pub state: GameState,
    pub castles: CastlingRights,
    pub white: Option<Value>,
    pub black: Option<Value>,
    pub cd: u64,
    pub start_time: u64,
    pub move_number: u64,
    pub last_move: Option<u64>,
}

impl GameRecord {
    /// Renders the full nFEN of the record.
    pub fn nfen(&self) -> String {
        format!("{} {} {}", self.board.fen(), self.castles.to_nfen(), self.move_number)
    }
}

/// Persistent representation of one game, keyed by a store key.
///
/// All mutation of shared game state goes through this type. It holds no
/// game state of its own; each accessor reads the store so that external
/// actors may mutate a game between commands without corrupting anything.
/// Concurrent safety relies on the manager routing all commands for one
/// game through a single worker.
#[derive(Clone)]
pub struct BoardStore {
    store: Arc<dyn Store>,
    key: String,
}

impl BoardStore {
    /// Attaches to a game record. The key is not required to exist yet;
    /// the manager checks existence before handing out a board.
    pub fn attach(store: Arc<dyn Store>, key: impl Into<String>) -> Self {
        Self { store, key: key.into() }
    }

    /// The store key this record lives under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Refreshes the record's idle TTL, if one is configured. Called after
    /// every public read or write.
    async fn touch(&self) -> GameResult<()> {
        if let Some(raw) = self.store.hget(&self.key, F_EXP).await?
            && let Ok(ttl) = raw.parse::<u64>()
        {
            self.store.pexpire(&self.key, ttl).await?;
        }
        Ok(())
    }

    async fn get_u64(&self, field: &str) -> GameResult<Option<u64>> {
        let value = match self.store.hget(&self.key, field).await? {
            None => None,
            Some(raw) => Some(
                raw.parse::<u64>()
                    .map_err(|_| GameError::CorruptRecord(format!("field {field} = {raw:?}")))?,
            ),
        };
        self.touch().await?;
        Ok(value)
    }

    async fn set_u64(&self, field: &str, value: u64) -> GameResult<()> {
        self.store.hset(&self.key, field, &value.to_string()).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pieces
    // -----------------------------------------------------------------------

    /// Returns the piece on a square; `None` for empty or invalid squares.
    pub async fn get(&self, sq: Square) -> GameResult<Option<Piece>> {
        if !sq.valid() {
            return Ok(None);
        }
        let piece = match self.store.hget(&self.key, &sq.notation()).await? {
            Some(raw) => Some(Piece::from_field(&raw)?),
            None => None,
        };
        self.touch().await?;
        Ok(piece)
    }

    /// Places (or clears) a piece, maintaining the king locators.
    ///
    /// Fails with [`GameError::DuplicateKing`] when placing a king whose
    /// color already has a king elsewhere on the board.
    pub async fn put(&self, sq: Square, piece: Option<Piece>) -> GameResult<()> {
        let notation = sq.notation();

        // Overwriting a king clears that color's locator.
        if let Some(raw) = self.store.hget(&self.key, &notation).await? {
            let old = Piece::from_field(&raw)?;
            if old.kind == PieceKind::King {
                self.store.hdel(&self.key, king_field(old.color)).await?;
            }
        }

        match piece {
            Some(piece) => {
                if piece.kind == PieceKind::King {
                    if let Some(existing) = self.store.hget(&self.key, king_field(piece.color)).await?
                        && existing != notation
                    {
                        return Err(GameError::DuplicateKing(piece.color));
                    }
                    self.store.hset(&self.key, king_field(piece.color), &notation).await?;
                }
                self.store.hset(&self.key, &notation, &piece.to_field()).await?;
            }
            None => self.store.hdel(&self.key, &notation).await?,
        }
        self.touch().await?;
        Ok(())
    }

    /// Moves the piece at `from` to `to`, deleting anything at `to`,
    /// stamping the moved piece's last-move time, bumping the half-move
    /// counter, and updating the board's last-move field. Returns the
    /// moved piece, or `None` if `from` was empty.
    pub async fn move_piece(
        &self,
        from: Square,
        to: Square,
        new_time: u64,
    ) -> GameResult<Option<Piece>> {
        let Some(piece) = self.get(from).await? else {
            return Ok(None);
        };

        // A captured king disappears from its locator.
        if let Some(victim) = self.get(to).await?
            && victim.kind == PieceKind::King
        {
            self.store.hdel(&self.key, king_field(victim.color)).await?;
        }

        let moved = Piece { last_move: Some(new_time), ..piece };
        self.store.hdel(&self.key, &from.notation()).await?;
        self.store.hset(&self.key, &to.notation(), &moved.to_field()).await?;
        if moved.kind == PieceKind::King {
            self.store.hset(&self.key, king_field(moved.color), &to.notation()).await?;
        }

        self.set_u64(F_LAST_MOVE, new_time).await?;
        let n = self.get_u64(F_MOVE_NUMBER).await?.unwrap_or(0);
        self.set_u64(F_MOVE_NUMBER, n + 1).await?;

        self.touch().await?;
        Ok(Some(moved))
    }

    // -----------------------------------------------------------------------
    // Players & lifecycle
    // -----------------------------------------------------------------------

    async fn player(&self, field: &str) -> GameResult<Option<Value>> {
        let player = match self.store.hget(&self.key, field).await? {
            None => None,
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|_| GameError::CorruptRecord(format!("field {field} = {raw:?}")))?,
            ),
        };
        self.touch().await?;
        Ok(player)
    }

    async fn seat(&self, color: Color, id: &Value) -> GameResult<()> {
        let (own, other) = match color {
            Color::White => (F_WHITE, F_BLACK),
            Color::Black => (F_BLACK, F_WHITE),
        };
        if self.store.hget(&self.key, own).await?.is_some() {
            return Err(GameError::PlayerAlreadySet(color));
        }
        self.store.hset(&self.key, own, &id.to_string()).await?;

        // Both seats taken: the game starts, unless the board was already won.
        if self.store.hget(&self.key, other).await?.is_some()
            && self.state().await? == GameState::Waiting
        {
            self.set_state(GameState::Playing).await?;
        }
        self.touch().await?;
        Ok(())
    }

    /// Seats the white player. Fails with [`GameError::PlayerAlreadySet`]
    /// if white is taken.
    pub async fn set_white(&self, id: &Value) -> GameResult<()> {
        self.seat(Color::White, id).await
    }

    /// Seats the black player. Fails with [`GameError::PlayerAlreadySet`]
    /// if black is taken.
    pub async fn set_black(&self, id: &Value) -> GameResult<()> {
        self.seat(Color::Black, id).await
    }

    /// The white player's opaque id, if seated.
    pub async fn white(&self) -> GameResult<Option<Value>> {
        self.player(F_WHITE).await
    }

    /// The black player's opaque id, if seated.
    pub async fn black(&self) -> GameResult<Option<Value>> {
        self.player(F_BLACK).await
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> GameResult<GameState> {
        let raw = self
            .store
            .hget(&self.key, F_STATE)
            .await?
            .ok_or_else(|| GameError::CorruptRecord("missing state".into()))?;
        let state = GameState::from_str(&raw)
            .ok_or_else(|| GameError::CorruptRecord(format!("state {raw:?}")))?;
        self.touch().await?;
        Ok(state)
    }

    /// Overwrites the lifecycle state.
    pub async fn set_state(&self, state: GameState) -> GameResult<()> {
        self.store.hset(&self.key, F_STATE, state.as_str()).await?;
        self.touch().await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Castling
    // -----------------------------------------------------------------------

    /// Remaining castling rights.
    pub async fn castles(&self) -> GameResult<CastlingRights> {
        let raw = self.store.hget(&self.key, F_CASTLES).await?.unwrap_or_default();
        self.touch().await?;
        Ok(CastlingRights::from_nfen(&raw))
    }

    /// Overwrites the castling rights.
    pub async fn set_castles(&self, rights: CastlingRights) -> GameResult<()> {
        self.store.hset(&self.key, F_CASTLES, &rights.to_nfen()).await?;
        self.touch().await?;
        Ok(())
    }

    /// Whether `color` may still castle on `side`.
    pub async fn can_castle(&self, color: Color, side: CastleSide) -> GameResult<bool> {
        Ok(self.castles().await?.can(color, side))
    }

    /// Permanently disables one castling right.
    pub async fn disable_castle(&self, color: Color, side: CastleSide) -> GameResult<()> {
        let mut rights = self.castles().await?;
        if rights.can(color, side) {
            rights.disable(color, side);
            self.set_castles(rights).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Timing, counters, kings
    // -----------------------------------------------------------------------

    /// Wall-clock creation time in epoch milliseconds.
    pub async fn start_time(&self) -> GameResult<u64> {
        self.get_u64(F_START_TIME)
            .await?
            .ok_or_else(|| GameError::CorruptRecord("missing start_time".into()))
    }

    /// Per-piece cooldown in milliseconds.
    pub async fn cd(&self) -> GameResult<u64> {
        self.get_u64(F_CD)
            .await?
            .ok_or_else(|| GameError::CorruptRecord("missing cd".into()))
    }

    /// Half-move counter.
    pub async fn move_number(&self) -> GameResult<u64> {
        Ok(self.get_u64(F_MOVE_NUMBER).await?.unwrap_or(0))
    }

    /// Most recent relative move time on this board, if any piece moved.
    pub async fn last_move(&self) -> GameResult<Option<u64>> {
        self.get_u64(F_LAST_MOVE).await
    }

    /// The square of `color`'s king, or `None` once it has been captured.
    pub async fn king(&self, color: Color) -> GameResult<Option<Square>> {
        let king = match self.store.hget(&self.key, king_field(color)).await? {
            None => None,
            Some(raw) => Some(
                Square::from_notation(&raw)
                    .map_err(|_| GameError::CorruptRecord(format!("king locator {raw:?}")))?,
            ),
        };
        self.touch().await?;
        Ok(king)
    }

    /// Both king locators, white first.
    pub async fn kings(&self) -> GameResult<(Option<Square>, Option<Square>)> {
        Ok((self.king(Color::White).await?, self.king(Color::Black).await?))
    }

    /// The winner, if a king is missing.
    pub async fn winner(&self) -> GameResult<Option<Color>> {
        let (white_king, black_king) = self.kings().await?;
        if white_king.is_none() {
            Ok(Some(Color::Black))
        } else if black_king.is_none() {
            Ok(Some(Color::White))
        } else {
            Ok(None)
        }
    }

    // -----------------------------------------------------------------------
    // Whole-record access
    // -----------------------------------------------------------------------

    /// Materializes the whole record with a single store round-trip.
    ///
    /// The returned view is valid for the current command only; workers
    /// reload on every command.
    pub async fn load(&self) -> GameResult<GameRecord> {
        let record = self.store.hgetall(&self.key).await?;
        self.touch().await?;

        let parse_u64 = |field: &str| -> GameResult<Option<u64>> {
            match record.get(field) {
                None => Ok(None),
                Some(raw) => raw
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| GameError::CorruptRecord(format!("field {field} = {raw:?}"))),
            }
        };
        let parse_player = |field: &str| -> GameResult<Option<Value>> {
            match record.get(field) {
                None => Ok(None),
                Some(raw) => serde_json::from_str(raw)
                    .map(Some)
                    .map_err(|_| GameError::CorruptRecord(format!("field {field} = {raw:?}"))),
            }
        };

        let state_raw = record
            .get(F_STATE)
            .ok_or_else(|| GameError::CorruptRecord("missing state".into()))?;
        let state = GameState::from_str(state_raw)
            .ok_or_else(|| GameError::CorruptRecord(format!("state {state_raw:?}")))?;

        Ok(GameRecord {
            board: Board::from_record(&record)?,
            state,
            castles: CastlingRights::from_nfen(record.get(F_CASTLES).map_or("", String::as_str)),
            white: parse_player(F_WHITE)?,
            black: parse_player(F_BLACK)?,
            cd: parse_u64(F_CD)?.ok_or_else(|| GameError::CorruptRecord("missing cd".into()))?,
            start_time: parse_u64(F_START_TIME)?
                .ok_or_else(|| GameError::CorruptRecord("missing start_time".into()))?,
            move_number: parse_u64(F_MOVE_NUMBER)?.unwrap_or(0),
            last_move: parse_u64(F_LAST_MOVE)?,
        })
    }

    /// Writes the creation-time scalar fields of a fresh record.
    pub(crate) async fn init_meta(
        &self,
        cd: u64,
        start_time: u64,
        move_number: u64,
        exp: Option<u64>,
    ) -> GameResult<()> {
        self.set_u64(F_CD, cd).await?;
        self.set_u64(F_START_TIME, start_time).await?;
        self.set_u64(F_MOVE_NUMBER, move_number).await?;
        if let Some(ttl) = exp {
            self.set_u64(F_EXP, ttl).await?;
            self.store.pexpire(&self.key, ttl).await?;
        }
        Ok(())
    }

    /// The full nFEN of the record.
    pub async fn nfen(&self) -> GameResult<String> {
        Ok(self.load().await?.nfen())
    }

    /// The board part of the nFEN.
    pub async fn fen(&self) -> GameResult<String> {
        Ok(self.load().await?.board.fen())
    }

    /// ASCII diagram of the board.
    pub async fn ascii(&self) -> GameResult<String> {
        Ok(self.load().await?.board.ascii())
    }

    /// All pieces, optionally filtered by color and kind.
    pub async fn pieces(
        &self,
        color: Option<Color>,
        kind: Option<PieceKind>,
    ) -> GameResult<Vec<(Square, Piece)>> {
        let record = self.load().await?;
        Ok(record
            .board
            .pieces()
            .filter(|(_, p)| color.is_none_or(|c| p.color == c))
            .filter(|(_, p)| kind.is_none_or(|k| p.kind == k))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn sq(s: &str) -> Square {
        Square::from_notation(s).unwrap()
    }

    async fn fresh() -> BoardStore {
        let board = BoardStore::attach(Arc::new(MemoryStore::new()), "test:games:1");
        board.set_state(GameState::Waiting).await.unwrap();
        board.init_meta(1000, 0, 0, None).await.unwrap();
        board
    }

    #[tokio::test]
    async fn put_and_get_round_trip() {
        let board = fresh().await;
        assert_eq!(board.get(sq("e4")).await.unwrap(), None);

        let pawn = Piece::new(PieceKind::Pawn, Color::White);
        board.put(sq("e4"), Some(pawn)).await.unwrap();
        assert_eq!(board.get(sq("e4")).await.unwrap(), Some(pawn));

        board.put(sq("e4"), None).await.unwrap();
        assert_eq!(board.get(sq("e4")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_king_is_rejected() {
        let board = fresh().await;
        board.put(sq("e1"), Some(Piece::new(PieceKind::King, Color::White))).await.unwrap();
        let second = board.put(sq("d4"), Some(Piece::new(PieceKind::King, Color::White))).await;
        assert!(matches!(second, Err(GameError::DuplicateKing(Color::White))));

        // A king of the other color is fine.
        board.put(sq("e8"), Some(Piece::new(PieceKind::King, Color::Black))).await.unwrap();
        assert_eq!(board.king(Color::White).await.unwrap(), Some(sq("e1")));
        assert_eq!(board.king(Color::Black).await.unwrap(), Some(sq("e8")));
    }

    #[tokio::test]
    async fn moving_a_king_tracks_its_locator() {
        let board = fresh().await;
        board.put(sq("e1"), Some(Piece::new(PieceKind::King, Color::White))).await.unwrap();
        board.move_piece(sq("e1"), sq("e2"), 5).await.unwrap();
        assert_eq!(board.king(Color::White).await.unwrap(), Some(sq("e2")));
    }

    #[tokio::test]
    async fn capturing_a_king_clears_its_locator() {
        let board = fresh().await;
        board.put(sq("e1"), Some(Piece::new(PieceKind::King, Color::White))).await.unwrap();
        board.put(sq("e2"), Some(Piece::new(PieceKind::Rook, Color::Black))).await.unwrap();

        let moved = board.move_piece(sq("e2"), sq("e1"), 10).await.unwrap().unwrap();
        assert_eq!(moved.kind, PieceKind::Rook);
        assert_eq!(moved.last_move, Some(10));
        assert_eq!(board.king(Color::White).await.unwrap(), None);
        assert_eq!(board.winner().await.unwrap(), Some(Color::Black));
    }

    #[tokio::test]
    async fn move_piece_updates_counters_and_times() {
        let board = fresh().await;
        board.put(sq("e2"), Some(Piece::new(PieceKind::Pawn, Color::White))).await.unwrap();

        assert_eq!(board.move_number().await.unwrap(), 0);
        assert_eq!(board.last_move().await.unwrap(), None);
        assert!(board.move_piece(sq("d5"), sq("d6"), 1).await.unwrap().is_none());
        assert_eq!(board.move_number().await.unwrap(), 0);

        board.move_piece(sq("e2"), sq("e4"), 1500).await.unwrap();
        assert_eq!(board.move_number().await.unwrap(), 1);
        assert_eq!(board.last_move().await.unwrap(), Some(1500));
        assert_eq!(board.get(sq("e2")).await.unwrap(), None);
        assert_eq!(board.get(sq("e4")).await.unwrap().unwrap().last_move, Some(1500));
    }

    #[tokio::test]
    async fn seating_players_starts_the_game() {
        let board = fresh().await;
        assert_eq!(board.white().await.unwrap(), None);

        board.set_white(&json!("alice")).await.unwrap();
        assert_eq!(board.state().await.unwrap(), GameState::Waiting);
        assert_eq!(board.white().await.unwrap(), Some(json!("alice")));

        board.set_black(&json!(7)).await.unwrap();
        assert_eq!(board.state().await.unwrap(), GameState::Playing);
        assert_eq!(board.black().await.unwrap(), Some(json!(7)));

        assert!(matches!(
            board.set_white(&json!("mallory")).await,
            Err(GameError::PlayerAlreadySet(Color::White))
        ));
    }

    #[tokio::test]
    async fn castle_rights_only_shrink() {
        let board = fresh().await;
        board.set_castles(CastlingRights::default()).await.unwrap();
        assert!(board.can_castle(Color::White, CastleSide::King).await.unwrap());

        board.disable_castle(Color::White, CastleSide::King).await.unwrap();
        assert!(!board.can_castle(Color::White, CastleSide::King).await.unwrap());
        assert!(board.can_castle(Color::Black, CastleSide::King).await.unwrap());
        assert_eq!(board.castles().await.unwrap().to_nfen(), "Qkq");

        // Disabling twice is a no-op.
        board.disable_castle(Color::White, CastleSide::King).await.unwrap();
        assert_eq!(board.castles().await.unwrap().to_nfen(), "Qkq");
    }

    #[test]
    fn board_fen_counts_empty_runs() {
        let mut board = Board::default();
        board.set(sq("a1"), Some(Piece::new(PieceKind::Rook, Color::White)));
        board.set(sq("h1"), Some(Piece::new(PieceKind::Rook, Color::White)));
        board.set(sq("d5"), Some(Piece::new(PieceKind::Queen, Color::Black)));
        assert_eq!(board.fen(), "8/8/8/3q4/8/8/8/R6R");
    }

    #[test]
    fn board_ascii_matches_layout() {
        let mut board = Board::default();
        board.set(sq("a1"), Some(Piece::new(PieceKind::Rook, Color::White)));
        board.set(sq("e8"), Some(Piece::new(PieceKind::King, Color::Black)));
        let art = board.ascii();
        let lines: Vec<&str> = art.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "....k...");
        assert_eq!(lines[7], "R.......");
    }
}
