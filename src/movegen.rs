//! Pseudo-legal move generation for Kung-Fu Chess.
//!
//! Moves are generated from a single square against a materialized
//! [`Board`]. "Pseudo-legal" here means the move satisfies geometry and
//! occupancy only; cooldowns are enforced by the applier at move time, so
//! callers can enumerate movement patterns independent of timing. There is
//! no check detection in Kung-Fu Chess, and en passant is deliberately not
//! supported.
//!
//! Castling keeps the original game's relaxed rule: a castle candidate is
//! emitted whenever the matching right survives, with no test of the
//! squares between king and rook and no test for attacks. Rights are
//! revoked by the applier when the relevant squares are touched.

use crate::board::Board;
use crate::types::{CastleSide, CastlingRights, Color, Move, PieceKind, Square};

// ---------------------------------------------------------------------------
// Offset tables
// ---------------------------------------------------------------------------

const ADJACENT: [i16; 8] = [
    Square::UP + Square::LEFT,
    Square::UP,
    Square::UP + Square::RIGHT,
    Square::LEFT,
    Square::RIGHT,
    Square::DOWN + Square::LEFT,
    Square::DOWN,
    Square::DOWN + Square::RIGHT,
];

const ORTHOGONAL: [i16; 4] = [Square::UP, Square::DOWN, Square::LEFT, Square::RIGHT];

const DIAGONAL: [i16; 4] = [
    Square::UP + Square::LEFT,
    Square::UP + Square::RIGHT,
    Square::DOWN + Square::LEFT,
    Square::DOWN + Square::RIGHT,
];

const KNIGHT_JUMPS: [i16; 8] = [
    2 * Square::UP + Square::LEFT,
    2 * Square::UP + Square::RIGHT,
    Square::UP + 2 * Square::LEFT,
    Square::UP + 2 * Square::RIGHT,
    Square::DOWN + 2 * Square::LEFT,
    Square::DOWN + 2 * Square::RIGHT,
    2 * Square::DOWN + Square::LEFT,
    2 * Square::DOWN + Square::RIGHT,
];

/// Offset vectors and sliding flag per piece type. Pawns are handled
/// separately and never reach this table.
fn offset_table(kind: PieceKind) -> (&'static [i16], bool) {
    match kind {
        PieceKind::King => (&ADJACENT, false),
        PieceKind::Queen => (&ADJACENT, true),
        PieceKind::Rook => (&ORTHOGONAL, true),
        PieceKind::Bishop => (&DIAGONAL, true),
        PieceKind::Knight => (&KNIGHT_JUMPS, false),
        PieceKind::Pawn => (&[], false),
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Returns all pseudo-legal moves for the piece on `from`. An empty or
/// invalid square yields the empty list.
pub fn moves(board: &Board, castles: &CastlingRights, from: Square) -> Vec<Move> {
    let Some(piece) = board.get(from) else {
        return Vec::new();
    };

    let mut moves = Vec::new();
    match piece.kind {
        PieceKind::Pawn => pawn_moves(board, from, piece.color, &mut moves),
        kind => {
            let (offsets, slides) = offset_table(kind);
            walk(board, from, piece.color, offsets, slides, &mut moves);
        }
    }

    if piece.kind == PieceKind::King {
        castle_moves(castles, from, piece.color, &mut moves);
    }

    moves
}

/// Walks each offset ray from `from`: empty squares are emitted (and the
/// walk continues if the piece slides), an enemy piece is emitted as a
/// capture and stops the ray, a friendly piece or the board edge stops the
/// ray silently.
fn walk(
    board: &Board,
    from: Square,
    color: Color,
    offsets: &[i16],
    slides: bool,
    moves: &mut Vec<Move>,
) {
    for &off in offsets {
        let mut to = from.offset(off);
        while to.valid() {
            match board.get(to) {
                None => moves.push(Move::quiet(from, to)),
                Some(other) => {
                    if other.color != color {
                        moves.push(Move::capture(from, to, other.kind));
                    }
                    break;
                }
            }
            if !slides {
                break;
            }
            to = to.offset(off);
        }
    }
}

/// Pawn moves: forward one, forward two off the start rank (both squares
/// empty), and diagonal captures strictly onto enemy pieces. A move onto
/// the promotion rank expands into the four promotion choices.
fn pawn_moves(board: &Board, from: Square, color: Color, moves: &mut Vec<Move>) {
    let dir = color.pawn_direction();

    let one = from.offset(dir);
    if one.valid() && board.get(one).is_none() {
        push_pawn_moves(from, one, color, None, moves);

        if from.rank() == color.pawn_start_rank() {
            let two = one.offset(dir);
            if two.valid() && board.get(two).is_none() {
                push_pawn_moves(from, two, color, None, moves);
            }
        }
    }

    for side in [Square::LEFT, Square::RIGHT] {
        let target = from.offset(dir + side);
        if target.valid()
            && let Some(victim) = board.get(target)
            && victim.color == color.opponent()
        {
            push_pawn_moves(from, target, color, Some(victim.kind), moves);
        }
    }
}

/// Emits a single pawn candidate, expanded to all four promotion targets
/// when the destination is the promotion rank.
fn push_pawn_moves(
    from: Square,
    to: Square,
    color: Color,
    captured: Option<PieceKind>,
    moves: &mut Vec<Move>,
) {
    let base = match captured {
        Some(victim) => Move::capture(from, to, victim),
        None => Move::quiet(from, to),
    };
    if to.rank() == color.promotion_rank() {
        for target in [PieceKind::Queen, PieceKind::Rook, PieceKind::Bishop, PieceKind::Knight] {
            moves.push(Move { promote: Some(target), ..base });
        }
    } else {
        moves.push(base);
    }
}

/// Castle candidates: two squares towards the rook, gated only on the
/// surviving right for that wing.
fn castle_moves(castles: &CastlingRights, from: Square, color: Color, moves: &mut Vec<Move>) {
    if castles.can(color, CastleSide::King) {
        moves.push(Move::castle(from, from.right().right(), CastleSide::King));
    }
    if castles.can(color, CastleSide::Queen) {
        moves.push(Move::castle(from, from.left().left(), CastleSide::Queen));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::STARTING_NFEN;

    fn sq(s: &str) -> Square {
        Square::from_notation(s).unwrap()
    }

    fn starting_board() -> Board {
        let fen = STARTING_NFEN.split(' ').next().unwrap();
        Board::from_fen(fen).unwrap()
    }

    fn no_castles() -> CastlingRights {
        CastlingRights::from_nfen("-")
    }

    fn targets(board: &Board, castles: &CastlingRights, from: &str) -> Vec<String> {
        let mut out: Vec<String> =
            moves(board, castles, sq(from)).iter().map(|m| m.to.notation()).collect();
        out.sort();
        out
    }

    #[test]
    fn starting_position_moves() {
        let board = starting_board();
        let castles = no_castles();

        assert_eq!(targets(&board, &castles, "e2"), vec!["e3", "e4"]);
        assert_eq!(targets(&board, &castles, "g1"), vec!["f3", "h3"]);
        assert_eq!(targets(&board, &castles, "b8"), vec!["a6", "c6"]);
        // The rook is boxed in.
        assert!(targets(&board, &castles, "h8").is_empty());
        // Empty squares yield nothing.
        assert!(targets(&board, &castles, "e5").is_empty());
    }

    #[test]
    fn king_moves_in_open_position() {
        let board = Board::from_fen("3b4/NP6/rp2k1B1/2R3P1/3K4/2B2Q2/P1P3P1/4r3").unwrap();
        let moves = targets(&board, &no_castles(), "e6");
        assert_eq!(moves, vec!["d5", "d6", "d7", "e5", "e7", "f5", "f6", "f7"]);
        assert!(moves.len() <= 8);
    }

    #[test]
    fn sliding_rays_stop_at_first_occupant() {
        let board = Board::from_fen("3b4/NP6/rp2k1B1/2R3P1/3K4/2B2Q2/P1P3P1/4r3").unwrap();
        let rook_moves = moves(&board, &no_castles(), sq("a6"));

        let mut to: Vec<String> = rook_moves.iter().map(|m| m.to.notation()).collect();
        to.sort();
        // Up captures the knight on a7 (inclusive stop); down runs to the
        // pawn on a2 (capture) and no further; b6 blocks sideways.
        assert_eq!(to, vec!["a2", "a3", "a4", "a5", "a7"]);
        assert_eq!(rook_moves.iter().filter(|m| m.captured.is_some()).count(), 2);
    }

    #[test]
    fn pawn_promotion_expands_to_four_moves() {
        let board = Board::from_fen("3b4/NP6/rp2k1B1/2R3P1/3K4/2B2Q2/P1P3P1/4r3").unwrap();
        let promos = moves(&board, &no_castles(), sq("b7"));
        assert_eq!(promos.len(), 4);
        assert!(promos.iter().all(|m| m.to == sq("b8")));

        let mut kinds: Vec<PieceKind> = promos.iter().filter_map(|m| m.promote).collect();
        kinds.sort_by_key(|k| k.san());
        assert_eq!(
            kinds,
            vec![PieceKind::Bishop, PieceKind::Knight, PieceKind::Queen, PieceKind::Rook]
        );
    }

    #[test]
    fn pawn_single_advance_is_one_move() {
        let board = starting_board();
        let forward: Vec<Move> = moves(&board, &no_castles(), sq("e2"))
            .into_iter()
            .filter(|m| m.to == sq("e3"))
            .collect();
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].promote, None);
    }

    #[test]
    fn pawn_double_advance_requires_clear_path() {
        // A blocker in front of the pawn removes both advances.
        let board = Board::from_fen("4k3/8/8/8/8/4n3/4P3/4K3").unwrap();
        assert!(targets(&board, &no_castles(), "e2").is_empty());

        // A blocker on the fourth rank leaves only the single step.
        let board = Board::from_fen("4k3/8/8/8/4n3/8/4P3/4K3").unwrap();
        assert_eq!(targets(&board, &no_castles(), "e2"), vec!["e3"]);
    }

    #[test]
    fn pawn_captures_only_enemy_pieces() {
        let board = Board::from_fen("4k3/8/8/8/8/3p1P2/4P3/4K3").unwrap();
        // d3 is an enemy pawn (capture); f3 is friendly (no capture).
        assert_eq!(targets(&board, &no_castles(), "e2"), vec!["d3", "e3", "e4"]);
        let capture: Vec<Move> = moves(&board, &no_castles(), sq("e2"))
            .into_iter()
            .filter(|m| m.to == sq("d3"))
            .collect();
        assert_eq!(capture[0].captured, Some(PieceKind::Pawn));
    }

    #[test]
    fn pawn_never_captures_onto_an_empty_diagonal() {
        let board = Board::from_fen("4k3/8/8/8/8/8/4P3/4K3").unwrap();
        assert_eq!(targets(&board, &no_castles(), "e2"), vec!["e3", "e4"]);
    }

    #[test]
    fn castle_candidates_follow_rights() {
        let board = Board::from_fen("r3k2r/pbppqppp/1pn2n2/4p3/1bB5/2NPPN2/PPPBQPPP/R3K2R").unwrap();
        let all = CastlingRights::default();

        assert_eq!(targets(&board, &all, "e1"), vec!["c1", "d1", "f1", "g1"]);
        assert_eq!(targets(&board, &all, "e8"), vec!["c8", "d8", "f8", "g8"]);

        let castle_count = moves(&board, &all, sq("e1"))
            .iter()
            .filter(|m| m.kingside_castle || m.queenside_castle)
            .count();
        assert_eq!(castle_count, 2);

        // With rights gone the candidates vanish.
        assert_eq!(targets(&board, &no_castles(), "e1"), vec!["d1", "f1"]);
    }

    #[test]
    fn knight_has_at_most_eight_targets() {
        let board = Board::from_fen("4k3/8/8/8/3N4/8/8/4K3").unwrap();
        assert_eq!(moves(&board, &no_castles(), sq("d4")).len(), 8);

        // Cornered, most jumps fall off the board.
        let board = Board::from_fen("4k3/8/8/8/8/8/8/N3K3").unwrap();
        assert_eq!(targets(&board, &no_castles(), "a1"), vec!["b3", "c2"]);
    }
}
