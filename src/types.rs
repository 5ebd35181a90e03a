//! Core types for the Kung-Fu Chess game core.
//!
//! This module defines the fundamental data structures used throughout the
//! engine and the game manager: 0x88 square arithmetic, timed pieces, move
//! metadata, game lifecycle states, castling rights, and the error taxonomy.
//!
//! Kung-Fu Chess has no turns; instead every piece carries the relative
//! timestamp of its last move so that the per-piece cooldown can be enforced
//! at move time. All timestamps are milliseconds relative to the game's
//! `start_time`; only "now" is ever absolute.

use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the engine and the board store.
///
/// The manager loop maps these onto the wire protocol: `BadBoardSetup`
/// becomes a null `game-cnf` payload, coordinate failures are coerced to
/// null move results inside the applier, and everything else surfaces as an
/// `error-ind` without stopping the loop.
#[derive(Debug, Error)]
pub enum GameError {
    /// Malformed algebraic notation or file/rank outside 1..=8.
    #[error("square file and rank must be between 1 and 8")]
    BadCoordinate,

    /// An nFEN that does not describe a playable board.
    #[error("invalid board setup: {0}")]
    BadBoardSetup(String),

    /// The store would end up holding two kings of one color.
    #[error("board already has a {0} king")]
    DuplicateKing(Color),

    /// Attempt to assign a color that already has a player.
    #[error("{0} player is already assigned")]
    PlayerAlreadySet(Color),

    /// A persisted game field failed to decode.
    #[error("corrupt game record: {0}")]
    CorruptRecord(String),

    /// Fault in the backing key-value store.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for engine operations.
pub type GameResult<T> = Result<T, GameError>;

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// The side a piece or player belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// Returns the opposite color.
    pub fn opponent(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Returns the rank (1..=8) pawns of this color start on.
    pub fn pawn_start_rank(self) -> u8 {
        match self {
            Color::White => 2,
            Color::Black => 7,
        }
    }

    /// Returns the rank (1..=8) pawns of this color promote on.
    pub fn promotion_rank(self) -> u8 {
        match self {
            Color::White => 8,
            Color::Black => 1,
        }
    }

    /// Returns the forward offset for pawns of this color.
    pub fn pawn_direction(self) -> i16 {
        match self {
            Color::White => Square::UP,
            Color::Black => Square::DOWN,
        }
    }

    /// Single-letter tag used in wire payloads ("w" / "b").
    pub fn letter(self) -> char {
        match self {
            Color::White => 'w',
            Color::Black => 'b',
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

// ---------------------------------------------------------------------------
// Square (0x88 layout)
// ---------------------------------------------------------------------------

/// A board square in the 0x88 index layout.
///
/// The low nibble of the index is the file (0–7), the high nibble the rank
/// (0–7). Any index with a 0x88 bit set is off the board, which makes
/// off-board detection during ray walks a single bitwise test. Offset
/// arithmetic is deliberately unchecked: the result may be an invalid
/// square, and callers test `valid()` explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Square(i16);

impl Square {
    /// Offset one rank towards the 8th rank.
    pub const UP: i16 = 16;
    /// Offset one rank towards the 1st rank.
    pub const DOWN: i16 = -16;
    /// Offset one file towards the a-file.
    pub const LEFT: i16 = -1;
    /// Offset one file towards the h-file.
    pub const RIGHT: i16 = 1;

    /// Creates a square from 1-based file and rank.
    /// Fails with [`GameError::BadCoordinate`] outside 1..=8.
    pub fn from_file_rank(file: u8, rank: u8) -> GameResult<Square> {
        if !(1..=8).contains(&file) || !(1..=8).contains(&rank) {
            return Err(GameError::BadCoordinate);
        }
        Ok(Square((i16::from(rank) - 1) << 4 | (i16::from(file) - 1)))
    }

    /// Parses two-character algebraic notation ("a1".."h8"), case-insensitive.
    pub fn from_notation(s: &str) -> GameResult<Square> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(GameError::BadCoordinate);
        }
        let file = bytes[0].to_ascii_lowercase().wrapping_sub(b'a').wrapping_add(1);
        let rank = bytes[1].wrapping_sub(b'0');
        Square::from_file_rank(file, rank)
    }

    /// Creates a square from a raw 0x88 index.
    pub fn from_index(index: i16) -> Square {
        Square(index)
    }

    /// Returns the raw 0x88 index.
    pub fn index(self) -> i16 {
        self.0
    }

    /// Returns the square at the given additive offset. The result may be
    /// off the board; check `valid()`.
    pub fn offset(self, off: i16) -> Square {
        Square(self.0 + off)
    }

    /// One rank up.
    pub fn up(self) -> Square {
        self.offset(Square::UP)
    }

    /// One rank down.
    pub fn down(self) -> Square {
        self.offset(Square::DOWN)
    }

    /// One file left.
    pub fn left(self) -> Square {
        self.offset(Square::LEFT)
    }

    /// One file right.
    pub fn right(self) -> Square {
        self.offset(Square::RIGHT)
    }

    /// Returns the 1-based rank. Only meaningful for valid squares.
    pub fn rank(self) -> u8 {
        (((self.0 >> 4) & 0x7) + 1) as u8
    }

    /// Returns the 1-based file. Only meaningful for valid squares.
    pub fn file(self) -> u8 {
        ((self.0 & 0x7) + 1) as u8
    }

    /// True iff the square lies on the 8x8 board (the 0x88 test).
    pub fn valid(self) -> bool {
        (0..=0xff).contains(&self.0) && self.0 & 0x88 == 0
    }

    /// Returns the algebraic notation, or an empty string for an invalid
    /// square.
    pub fn notation(self) -> String {
        if !self.valid() {
            return String::new();
        }
        format!("{}{}", (b'a' + self.file() - 1) as char, self.rank())
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.notation())
    }
}

// ---------------------------------------------------------------------------
// Piece
// ---------------------------------------------------------------------------

/// A piece type. Offset vectors and sliding behavior are selected by table
/// lookup in the move generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    King,
    Queen,
    Rook,
    Bishop,
    Knight,
    Pawn,
}

impl PieceKind {
    /// Lowercase SAN letter for the piece type.
    pub fn san(self) -> char {
        match self {
            PieceKind::King => 'k',
            PieceKind::Queen => 'q',
            PieceKind::Rook => 'r',
            PieceKind::Bishop => 'b',
            PieceKind::Knight => 'n',
            PieceKind::Pawn => 'p',
        }
    }

    /// Parses a SAN letter (either case) into a piece type.
    pub fn from_san(c: char) -> Option<PieceKind> {
        match c.to_ascii_lowercase() {
            'k' => Some(PieceKind::King),
            'q' => Some(PieceKind::Queen),
            'r' => Some(PieceKind::Rook),
            'b' => Some(PieceKind::Bishop),
            'n' => Some(PieceKind::Knight),
            'p' => Some(PieceKind::Pawn),
            _ => None,
        }
    }
}

/// A piece on the board: type, color, and the relative time of its last
/// move (`None` until it first moves).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: Color,
    pub last_move: Option<u64>,
}

impl Piece {
    /// Creates a piece that has not moved yet.
    pub fn new(kind: PieceKind, color: Color) -> Self {
        Self { kind, color, last_move: None }
    }

    /// FEN character: uppercase for white, lowercase for black.
    pub fn fen_char(self) -> char {
        match self.color {
            Color::White => self.kind.san().to_ascii_uppercase(),
            Color::Black => self.kind.san(),
        }
    }

    /// Parses a FEN character. Returns `None` for non-piece characters.
    pub fn from_fen_char(c: char) -> Option<Self> {
        let kind = PieceKind::from_san(c)?;
        let color = if c.is_ascii_uppercase() { Color::White } else { Color::Black };
        Some(Piece::new(kind, color))
    }

    /// Encodes the piece as a store hash field value: the FEN character,
    /// followed by `:<relative ms>` once the piece has moved.
    pub fn to_field(self) -> String {
        match self.last_move {
            Some(t) => format!("{}:{}", self.fen_char(), t),
            None => self.fen_char().to_string(),
        }
    }

    /// Decodes a store hash field value written by [`Piece::to_field`].
    pub fn from_field(raw: &str) -> GameResult<Self> {
        let (sym, time) = match raw.split_once(':') {
            Some((sym, time)) => (sym, Some(time)),
            None => (raw, None),
        };
        let mut chars = sym.chars();
        let c = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => return Err(GameError::CorruptRecord(format!("piece field {raw:?}"))),
        };
        let mut piece = Piece::from_fen_char(c)
            .ok_or_else(|| GameError::CorruptRecord(format!("piece field {raw:?}")))?;
        if let Some(time) = time {
            let t = time
                .parse::<u64>()
                .map_err(|_| GameError::CorruptRecord(format!("piece field {raw:?}")))?;
            piece.last_move = Some(t);
        }
        Ok(piece)
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fen_char())
    }
}

// ---------------------------------------------------------------------------
// Game state
// ---------------------------------------------------------------------------

/// Lifecycle state of a game.
///
/// `Waiting` until both players are seated, `Playing` while both kings are
/// on the board, and a win state once a king has been captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "playing")]
    Playing,
    #[serde(rename = "w_wins")]
    WhiteWins,
    #[serde(rename = "b_wins")]
    BlackWins,
}

impl GameState {
    /// Wire tag for the state.
    pub fn as_str(self) -> &'static str {
        match self {
            GameState::Waiting => "waiting",
            GameState::Playing => "playing",
            GameState::WhiteWins => "w_wins",
            GameState::BlackWins => "b_wins",
        }
    }

    /// Parses a wire tag.
    pub fn from_str(s: &str) -> Option<GameState> {
        match s {
            "waiting" => Some(GameState::Waiting),
            "playing" => Some(GameState::Playing),
            "w_wins" => Some(GameState::WhiteWins),
            "b_wins" => Some(GameState::BlackWins),
            _ => None,
        }
    }

    /// The win state for the given color.
    pub fn win(color: Color) -> GameState {
        match color {
            Color::White => GameState::WhiteWins,
            Color::Black => GameState::BlackWins,
        }
    }

    /// Returns the winner, if this is a terminal state.
    pub fn winner(self) -> Option<Color> {
        match self {
            GameState::WhiteWins => Some(Color::White),
            GameState::BlackWins => Some(Color::Black),
            _ => None,
        }
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Castling rights
// ---------------------------------------------------------------------------

/// Which wing a castle happens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastleSide {
    King,
    Queen,
}

/// Remaining castling rights for both sides, serialized as a subset of
/// "KQkq" (or "-" when empty). Rights only ever get disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastlingRights {
    pub white_kingside: bool,
    pub white_queenside: bool,
    pub black_kingside: bool,
    pub black_queenside: bool,
}

impl Default for CastlingRights {
    fn default() -> Self {
        Self {
            white_kingside: true,
            white_queenside: true,
            black_kingside: true,
            black_queenside: true,
        }
    }
}

impl CastlingRights {
    /// Parses an nFEN castles field. Letters enable the matching right;
    /// everything else (including "-") is ignored.
    pub fn from_nfen(s: &str) -> Self {
        Self {
            white_kingside: s.contains('K'),
            white_queenside: s.contains('Q'),
            black_kingside: s.contains('k'),
            black_queenside: s.contains('q'),
        }
    }

    /// Renders the nFEN castles field.
    pub fn to_nfen(self) -> String {
        let mut s = String::new();
        if self.white_kingside {
            s.push('K');
        }
        if self.white_queenside {
            s.push('Q');
        }
        if self.black_kingside {
            s.push('k');
        }
        if self.black_queenside {
            s.push('q');
        }
        if s.is_empty() {
            s.push('-');
        }
        s
    }

    /// Whether the given color may still castle on the given wing.
    pub fn can(self, color: Color, side: CastleSide) -> bool {
        match (color, side) {
            (Color::White, CastleSide::King) => self.white_kingside,
            (Color::White, CastleSide::Queen) => self.white_queenside,
            (Color::Black, CastleSide::King) => self.black_kingside,
            (Color::Black, CastleSide::Queen) => self.black_queenside,
        }
    }

    /// Permanently disables one right.
    pub fn disable(&mut self, color: Color, side: CastleSide) {
        match (color, side) {
            (Color::White, CastleSide::King) => self.white_kingside = false,
            (Color::White, CastleSide::Queen) => self.white_queenside = false,
            (Color::Black, CastleSide::King) => self.black_kingside = false,
            (Color::Black, CastleSide::Queen) => self.black_queenside = false,
        }
    }
}

// ---------------------------------------------------------------------------
// Move
// ---------------------------------------------------------------------------

/// An intended transition between two squares, annotated with sparse
/// metadata. The metadata vocabulary is closed: capture, promotion, the two
/// castle flags, and the applied time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    /// Type of the piece this move captures, if any.
    pub captured: Option<PieceKind>,
    /// Promotion target for a pawn reaching the last rank.
    pub promote: Option<PieceKind>,
    pub kingside_castle: bool,
    pub queenside_castle: bool,
    /// Relative time stamped by the applier once the move is made.
    pub time: Option<u64>,
}

impl Move {
    /// A plain move with no metadata.
    pub fn quiet(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            captured: None,
            promote: None,
            kingside_castle: false,
            queenside_castle: false,
            time: None,
        }
    }

    /// A capture of the given piece type.
    pub fn capture(from: Square, to: Square, victim: PieceKind) -> Self {
        Self { captured: Some(victim), ..Self::quiet(from, to) }
    }

    /// A castle candidate on the given wing.
    pub fn castle(from: Square, to: Square, side: CastleSide) -> Self {
        let mut mv = Self::quiet(from, to);
        match side {
            CastleSide::King => mv.kingside_castle = true,
            CastleSide::Queen => mv.queenside_castle = true,
        }
        mv
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(promo) = self.promote {
            write!(f, "={}", promo.san())?;
        }
        Ok(())
    }
}
