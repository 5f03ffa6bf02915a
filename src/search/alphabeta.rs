use std::time::Instant;

use once_cell::sync::Lazy;

use crate::board::position::{Color, Move, MoveKind, PieceType, Position};
use crate::eval::evaluate::evaluate;
use crate::movegen::moves::{
    is_pseudo_legal, legal_moves, pseudo_legal_captures, pseudo_legal_moves, MoveList,
};
use crate::search::see::see;
use crate::search::transposition::{
    TranspositionTable, BOUND_EXACT, BOUND_LOWER, BOUND_UPPER,
};

pub const MAX_DEPTH: usize = 64;
pub const MATE: i32 = 30_000;
pub const MATE_THRESHOLD: i32 = 29_000;
pub const MAX_VALUE: i32 = 32_000;

const DRAW_SCORE: i32 = 0;
const NODE_POLL_MASK: u64 = 2047;
const NULL_MOVE_REDUCTION: i32 = 2;
const MAX_HISTORY: i32 = 10_000;

const QUEEN_PROMO_SCORE: i32 = 20_000;
const MINOR_PROMO_SCORE: i32 = 13_000;
const CAPTURE_SCORE: i32 = 16_000;

#[inline(always)]
pub fn is_mate_score(score: i32) -> bool {
    score.abs() > MATE_THRESHOLD
}

/// Late-move reduction by depth and move number:
/// 1 + ln(depth) * ln(moves) / 3, truncated.
static REDUCTIONS: Lazy<[[i32; MAX_DEPTH]; MAX_DEPTH]> = Lazy::new(|| {
    let mut table = [[0i32; MAX_DEPTH]; MAX_DEPTH];
    for depth in 1..MAX_DEPTH {
        for moves in 1..MAX_DEPTH {
            table[depth][moves] =
                (1.0 + (depth as f64).ln() * (moves as f64).ln() / 3.0) as i32;
        }
    }
    table
});

pub fn init_reductions() {
    Lazy::force(&REDUCTIONS);
}

#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub best_move: Move,
    pub score: i32,
    pub depth: u32,
    pub nodes: u64,
    pub elapsed_ms: u64,
    pub pv: Vec<Move>,
    pub hashfull: u32,
}

/// Per-search state. Leases the engine-owned transposition table for
/// the duration of one search; everything else is rebuilt per `go`.
pub struct SearchContext<'a> {
    tt: &'a mut TranspositionTable,
    pub stop: bool,
    pub deadline: Option<Instant>,
    pub nodes: u64,
    pub start: Instant,
    generation: u8,
    killers: [[Move; 2]; MAX_DEPTH],
    history: Box<[[[i32; 64]; 64]; 2]>,
    pub root_moves: MoveList,
}

impl<'a> SearchContext<'a> {
    pub fn new(
        tt: &'a mut TranspositionTable,
        generation: u8,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            tt,
            stop: false,
            deadline,
            nodes: 0,
            start: Instant::now(),
            generation: generation & 0x3F,
            killers: [[Move::NULL; 2]; MAX_DEPTH],
            history: Box::new([[[0; 64]; 64]; 2]),
            root_moves: MoveList::new(),
        }
    }

    #[inline(always)]
    fn time_up(&self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    #[inline(always)]
    fn is_killer(&self, ply: i32, mv: Move) -> bool {
        let ply = ply as usize;
        ply < MAX_DEPTH && (self.killers[ply][0] == mv || self.killers[ply][1] == mv)
    }

    fn store_killer(&mut self, ply: i32, mv: Move) {
        let ply = ply as usize;
        if ply < MAX_DEPTH && self.killers[ply][0] != mv {
            self.killers[ply][1] = self.killers[ply][0];
            self.killers[ply][0] = mv;
        }
    }

    #[inline(always)]
    fn history_score(&self, color: Color, mv: Move) -> i32 {
        self.history[color as usize][mv.from() as usize][mv.to() as usize]
    }

    /// Saturating update: repeated bonuses level off at ±MAX_HISTORY.
    fn update_history(&mut self, color: Color, mv: Move, bonus: i32) {
        let clamped = bonus.clamp(-MAX_HISTORY, MAX_HISTORY);
        let slot =
            &mut self.history[color as usize][mv.from() as usize][mv.to() as usize];
        *slot += clamped - *slot * clamped.abs() / MAX_HISTORY;
    }

    pub fn history_decay(&mut self) {
        for color in self.history.iter_mut() {
            for from in color.iter_mut() {
                for slot in from.iter_mut() {
                    *slot /= 2;
                }
            }
        }
    }

    fn score_move(&self, pos: &Position, mv: Move) -> i32 {
        let base = match mv.promotion() {
            PieceType::Queen => QUEEN_PROMO_SCORE,
            PieceType::None => 0,
            _ => MINOR_PROMO_SCORE,
        };

        if mv.kind() == MoveKind::Capture {
            // losing captures drop below winning ones but stay well
            // above the quiet range
            return CAPTURE_SCORE + see(pos, mv.from(), mv.to(), pos.side_to_move) + base;
        }
        if base > 0 {
            return base;
        }

        self.history_score(pos.side_to_move, mv)
    }

    fn score_moves(&self, pos: &Position, moves: &mut MoveList) {
        for i in 0..moves.len() {
            moves[i].score = self.score_move(pos, moves[i].mv);
        }
    }

    pub fn search(
        &mut self,
        pos: &mut Position,
        mut alpha: i32,
        beta: i32,
        depth: i32,
        ply: i32,
        allow_null: bool,
    ) -> i32 {
        self.nodes += 1;

        if self.stop {
            return 0;
        }
        if self.nodes & NODE_POLL_MASK == 0 && self.time_up() {
            self.stop = true;
            return 0;
        }

        if pos.is_draw() {
            return DRAW_SCORE;
        }

        if depth <= 0 {
            return self.quiescence(pos, alpha, beta);
        }

        let in_check = pos.is_check(pos.side_to_move);

        if allow_null
            && depth >= 3
            && !in_check
            && pos.has_non_pawn_material(pos.side_to_move)
            && pos.make_null_move()
        {
            let score = -self.search(
                pos,
                -beta,
                -beta + 1,
                depth - 1 - NULL_MOVE_REDUCTION,
                ply + 1,
                false,
            );
            pos.undo_null_move();

            if self.stop {
                return 0;
            }
            if score >= beta {
                return score;
            }
        }

        let mut flag = BOUND_UPPER;
        let mut best_score = -MAX_VALUE;
        let mut best_move = Move::NULL;
        let mut legal_seen: usize = 0;
        let mut tt_move = Move::NULL;

        if let Some(data) = self.tt.probe(pos.zobrist_key, ply) {
            // a mate bound from an older search measures a different
            // path length; never cut on it
            let stale_mate = is_mate_score(data.score) && data.age != self.generation;
            if data.depth as i32 >= depth && !stale_mate {
                match data.bound {
                    BOUND_EXACT => return data.score,
                    BOUND_LOWER if data.score >= beta => return data.score,
                    BOUND_UPPER if data.score <= alpha => return data.score,
                    _ => {}
                }
            }

            if is_pseudo_legal(pos, data.best) {
                tt_move = data.best;
                let mover = pos.side_to_move;
                pos.make_move(tt_move);
                if pos.is_check(mover) {
                    pos.undo_move(tt_move);
                } else {
                    let score = -self.search(pos, -beta, -alpha, depth - 1, ply + 1, true);
                    pos.undo_move(tt_move);
                    if self.stop {
                        return 0;
                    }
                    if score >= beta {
                        self.tt.store(
                            pos.zobrist_key,
                            self.generation,
                            depth,
                            tt_move,
                            score,
                            BOUND_LOWER,
                            ply,
                        );
                        return score;
                    }
                    legal_seen = 1;
                    best_score = score;
                    best_move = tt_move;
                    if score > alpha {
                        alpha = score;
                        flag = BOUND_EXACT;
                    }
                }
            }
        }

        let mut moves = MoveList::new();
        pseudo_legal_moves(pos, &mut moves);
        self.score_moves(pos, &mut moves);

        if (ply as usize) < MAX_DEPTH {
            for slot in 0..2 {
                let killer = self.killers[ply as usize][slot];
                if killer != Move::NULL {
                    moves.set_score(killer, MATE / 2 - slot as i32);
                }
            }
        }

        moves.sort_descending();

        for i in 0..moves.len() {
            let mv = moves[i].mv;
            if mv == tt_move {
                continue;
            }

            let mover = pos.side_to_move;
            if !pos.make_move(mv) {
                continue;
            }
            if pos.is_check(mover) {
                pos.undo_move(mv);
                continue;
            }

            let mut score;
            if legal_seen == 0 {
                score = -self.search(pos, -beta, -alpha, depth - 1, ply + 1, true);
            } else {
                let mut reduction = 0;
                let can_reduce = depth >= 3
                    && legal_seen >= 4
                    && !in_check
                    && !mv.is_tactical()
                    && !self.is_killer(ply, mv);
                if can_reduce {
                    reduction = REDUCTIONS[depth.min(63) as usize][legal_seen.min(63)];
                    if self.history_score(mover, mv) < 0 {
                        reduction += 1;
                    }
                }

                score =
                    -self.search(pos, -alpha - 1, -alpha, depth - 1 - reduction, ply + 1, true);
                if score > alpha && reduction > 0 {
                    score = -self.search(pos, -alpha - 1, -alpha, depth - 1, ply + 1, true);
                }
                if score > alpha && score < beta {
                    score = -self.search(pos, -beta, -alpha, depth - 1, ply + 1, true);
                }
            }

            pos.undo_move(mv);
            legal_seen += 1;

            if score > alpha {
                alpha = score;
                flag = BOUND_EXACT;
            }
            if score > best_score {
                best_score = score;
                best_move = mv;
            }

            if score >= beta {
                if !mv.is_capture() {
                    self.store_killer(ply, mv);
                    self.update_history(mover, mv, depth * depth);
                    // earlier quiet tries failed to cut: punish them
                    for j in 0..i {
                        let quiet = moves[j].mv;
                        if quiet.is_capture()
                            || quiet == tt_move
                            || self.is_killer(ply, quiet)
                        {
                            continue;
                        }
                        self.update_history(mover, quiet, -depth * depth);
                    }
                }
                flag = BOUND_LOWER;
                break;
            }
        }

        if legal_seen == 0 {
            return if in_check { -MATE + ply } else { DRAW_SCORE };
        }

        if self.stop {
            return 0;
        }

        self.tt.store(
            pos.zobrist_key,
            self.generation,
            depth,
            best_move,
            best_score,
            flag,
            ply,
        );

        best_score
    }

    pub fn quiescence(&mut self, pos: &mut Position, mut alpha: i32, beta: i32) -> i32 {
        self.nodes += 1;

        if self.stop {
            return 0;
        }
        if self.nodes & NODE_POLL_MASK == 0 && self.time_up() {
            self.stop = true;
            return 0;
        }

        let stand_pat = pos.side_to_move.sign() * evaluate(pos);
        let mut best = stand_pat;
        if best >= beta {
            return best;
        }
        if best > alpha {
            alpha = best;
        }

        let mut moves = MoveList::new();
        pseudo_legal_captures(pos, &mut moves);
        self.score_moves(pos, &mut moves);

        while let Some(scored) = moves.take_best() {
            let mv = scored.mv;
            if see(pos, mv.from(), mv.to(), pos.side_to_move) < 0 {
                continue;
            }

            let mover = pos.side_to_move;
            if !pos.make_move(mv) {
                continue;
            }
            if pos.is_check(mover) {
                pos.undo_move(mv);
                continue;
            }

            let score = -self.quiescence(pos, -beta, -alpha);
            pos.undo_move(mv);

            if score >= beta {
                return score;
            }
            if score > best {
                best = score;
            }
            if score > alpha {
                alpha = score;
            }
        }

        best
    }

    /// One full-width pass over the persistent root list. Every root
    /// move's score is overwritten; the caller sorts afterwards.
    pub fn search_root(&mut self, pos: &mut Position, depth: i32) -> i32 {
        self.nodes += 1;

        let mut alpha = -MATE;
        let beta = MATE;

        if let Some(data) = self.tt.probe(pos.zobrist_key, 0) {
            self.root_moves.move_to_front(data.best);
        }

        let mut best_score = -MAX_VALUE;
        let mut best_move = Move::NULL;

        for i in 0..self.root_moves.len() {
            let mv = self.root_moves[i].mv;
            if !pos.make_move(mv) {
                continue;
            }

            let mut score;
            if i == 0 {
                score = -self.search(pos, -MATE, MATE, depth - 1, 1, true);
            } else {
                score = -self.search(pos, -alpha - 1, -alpha, depth - 1, 1, true);
                if score > alpha && score < beta {
                    score = -self.search(pos, -MATE, MATE, depth - 1, 1, true);
                }
            }

            pos.undo_move(mv);

            if self.stop {
                return 0;
            }

            self.root_moves[i].score = score;
            if score > best_score {
                best_score = score;
                best_move = mv;
                if score > alpha {
                    alpha = score;
                }
            }
        }

        if !self.stop {
            self.tt.store(
                pos.zobrist_key,
                self.generation,
                depth,
                best_move,
                best_score,
                BOUND_EXACT,
                0,
            );
        }

        best_score
    }

    /// Walks the table from the position after the last move in
    /// `line`, appending best moves while they stay sane. Bounded by
    /// `depth` so cyclic entries cannot loop forever.
    fn collect_pv(&self, pos: &mut Position, line: &mut Vec<Move>, depth: i32) {
        let mv = match line.last() {
            Some(&mv) => mv,
            None => return,
        };

        if !pos.make_move(mv) {
            return;
        }

        if !pos.is_draw() {
            if let Some(data) = self.tt.probe(pos.zobrist_key, 0) {
                if depth > 0 && is_pseudo_legal(pos, data.best) {
                    line.push(data.best);
                    self.collect_pv(pos, line, depth - 1);
                }
            }
        }

        pos.undo_move(mv);
    }

    /// Depth-by-depth driver. `on_iteration` receives every completed
    /// iteration (the UCI layer prints them); the returned result is
    /// the last completed iteration when the search was stopped.
    pub fn iterative_deepening(
        &mut self,
        pos: &mut Position,
        max_depth: u32,
        mut on_iteration: impl FnMut(&SearchResult),
    ) -> SearchResult {
        self.root_moves.clear();
        legal_moves(pos, &mut self.root_moves);

        let mut last = SearchResult::default();
        if self.root_moves.is_empty() {
            return last;
        }

        for depth in 1..=max_depth.min(MAX_DEPTH as u32) {
            self.search_root(pos, depth as i32);

            if self.stop {
                break;
            }

            self.root_moves.sort_descending();
            let best = self.root_moves[0];

            let mut pv = vec![best.mv];
            self.collect_pv(pos, &mut pv, depth as i32);

            let result = SearchResult {
                best_move: best.mv,
                score: best.score,
                depth,
                nodes: self.nodes,
                elapsed_ms: self.start.elapsed().as_millis() as u64,
                pv,
                hashfull: self.tt.hashfull(),
            };
            on_iteration(&result);
            last = result;

            if is_mate_score(best.score) {
                break;
            }

            self.history_decay();
        }

        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(tt: &mut TranspositionTable) -> SearchContext<'_> {
        crate::init();
        SearchContext::new(tt, 1, None)
    }

    fn best_move_at(fen: &str, depth: u32) -> (Move, i32) {
        let mut tt = TranspositionTable::new(8);
        let mut ctx = context(&mut tt);
        let mut pos = Position::new();
        assert!(pos.load_fen(fen));
        let result = ctx.iterative_deepening(&mut pos, depth, |_| {});
        (result.best_move, result.score)
    }

    #[test]
    fn test_mate_in_one_score() {
        // back-rank mate: Ra8#
        let (mv, score) = best_move_at("6k1/5ppp/8/8/8/8/8/R3K3 w - - 0 1", 3);
        assert_eq!(score, MATE - 1);
        assert_eq!(mv.to_uci(), "a1a8");
    }

    #[test]
    fn test_stalemate_is_zero() {
        let mut tt = TranspositionTable::new(1);
        let mut ctx = context(&mut tt);
        let mut pos = Position::new();
        // black to move, no moves, not in check
        pos.load_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        let result = ctx.iterative_deepening(&mut pos, 4, |_| {});
        assert_eq!(result.best_move, Move::NULL);
        assert_eq!(result.score, 0);
    }

    #[test]
    fn test_hanging_queen_gets_taken() {
        let (mv, score) = best_move_at("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1", 4);
        assert_eq!(mv.to_uci(), "e4d5");
        assert!(score > 700);
    }

    #[test]
    fn test_search_determinism() {
        let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3";
        let (mv_a, score_a) = best_move_at(fen, 5);
        let (mv_b, score_b) = best_move_at(fen, 5);
        assert_eq!(mv_a, mv_b);
        assert_eq!(score_a, score_b);
    }

    #[test]
    fn test_position_restored_after_search() {
        let mut tt = TranspositionTable::new(4);
        let mut ctx = context(&mut tt);
        let mut pos = Position::new();
        pos.load_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
        let fen = pos.dump_fen();
        let key = pos.zobrist_key;

        ctx.iterative_deepening(&mut pos, 4, |_| {});

        assert_eq!(pos.dump_fen(), fen);
        assert_eq!(pos.zobrist_key, key);
        assert_eq!(pos.zobrist_key, pos.recompute_key());
    }

    #[test]
    fn test_quiescence_stand_pat_bounds() {
        let mut tt = TranspositionTable::new(1);
        let mut ctx = context(&mut tt);
        let mut pos = Position::new();
        // quiet equal position: quiescence returns the static eval
        pos.load_fen("4k3/pppp4/8/8/8/8/PPPP4/4K3 w - - 0 1");
        let score = ctx.quiescence(&mut pos, -MAX_VALUE, MAX_VALUE);
        assert_eq!(score, pos.side_to_move.sign() * evaluate(&pos));
    }

    #[test]
    fn test_iteration_callback_reports_progress() {
        let mut tt = TranspositionTable::new(4);
        let mut ctx = context(&mut tt);
        let mut pos = Position::startpos();

        let mut depths = Vec::new();
        ctx.iterative_deepening(&mut pos, 4, |r| {
            depths.push(r.depth);
            assert!(!r.pv.is_empty());
            assert_eq!(r.pv[0], r.best_move);
        });
        assert_eq!(depths, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_root_scores_fill_move_list() {
        let mut tt = TranspositionTable::new(4);
        let mut ctx = context(&mut tt);
        let mut pos = Position::startpos();
        ctx.iterative_deepening(&mut pos, 3, |_| {});

        assert_eq!(ctx.root_moves.len(), 20);
        // sorted descending after the last completed iteration
        for i in 1..ctx.root_moves.len() {
            assert!(ctx.root_moves[i - 1].score >= ctx.root_moves[i].score);
        }
    }
}
