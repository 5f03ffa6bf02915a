use ferrum::board::position::{Move, Position};
use ferrum::search::alphabeta::{SearchContext, SearchResult, MATE};
use ferrum::search::transposition::TranspositionTable;

fn search(fen: &str, depth: u32) -> SearchResult {
    ferrum::init();
    let mut pos = Position::new();
    assert!(pos.load_fen(fen), "bad fen: {fen}");
    let mut tt = TranspositionTable::new(8);
    let mut ctx = SearchContext::new(&mut tt, 1, None);
    ctx.iterative_deepening(&mut pos, depth, |_| {})
}

#[test]
fn mate_in_one_scores_mate_minus_one() {
    let result = search("6k1/5ppp/8/8/8/8/8/R3K3 w - - 0 1", 4);
    assert_eq!(result.score, MATE - 1);
    assert_eq!(result.best_move.to_uci(), "a1a8");
}

#[test]
fn mated_side_sees_negative_mate() {
    // black's only move is h6, after which Qg7 mates
    let result = search("7k/7p/5KQ1/8/8/8/8/8 b - - 0 1", 4);
    assert_eq!(result.best_move.to_uci(), "h7h6");
    assert_eq!(result.score, -(MATE - 2));
}

#[test]
fn stalemate_returns_zero_without_searching() {
    let result = search("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", 4);
    assert_eq!(result.best_move, Move::NULL);
    assert_eq!(result.score, 0);
}

#[test]
fn supported_queen_mate_found() {
    // Qg7 next to the king is mate, the queen being defended by Kf6
    let result = search("6k1/8/5KQ1/8/8/8/8/8 w - - 0 1", 6);
    assert_eq!(result.score, MATE - 1);
}

#[test]
fn winning_capture_preferred() {
    let result = search("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1", 4);
    assert_eq!(result.best_move.to_uci(), "e4d5");
    assert!(result.score > 700);
}

#[test]
fn search_is_deterministic_with_fresh_table() {
    let fen = "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4";
    let a = search(fen, 5);
    let b = search(fen, 5);
    assert_eq!(a.best_move, b.best_move);
    assert_eq!(a.score, b.score);
    assert_eq!(a.nodes, b.nodes);
}

#[test]
fn deeper_iterations_report_monotonic_depth() {
    ferrum::init();
    let mut pos = Position::startpos();
    let mut tt = TranspositionTable::new(8);
    let mut ctx = SearchContext::new(&mut tt, 1, None);

    let mut last_depth = 0;
    let result = ctx.iterative_deepening(&mut pos, 5, |r| {
        assert_eq!(r.depth, last_depth + 1);
        last_depth = r.depth;
        assert!(r.nodes > 0);
        assert_eq!(r.pv.first(), Some(&r.best_move));
    });
    assert_eq!(result.depth, 5);
    assert_ne!(result.best_move, Move::NULL);
}

#[test]
fn fifty_move_rule_reaches_draw_score() {
    // quiet rook endgame with the counter one ply from the limit
    let result = search("4k3/8/8/8/8/8/r7/4K2R w - - 99 80", 3);
    assert_eq!(result.score, 0);
}

#[test]
fn repetition_avoided_when_winning() {
    ferrum::init();
    let mut pos = Position::new();
    pos.load_fen("4k3/8/8/8/8/8/4Q3/4K3 w - - 0 1");
    // shuffle in a twofold repetition, then search: the winning side
    // must not choose a repeating line
    assert!(pos.play_move("e2d2"));
    assert!(pos.play_move("e8f8"));
    assert!(pos.play_move("d2e2"));
    assert!(pos.play_move("f8e8"));

    let mut tt = TranspositionTable::new(8);
    let mut ctx = SearchContext::new(&mut tt, 1, None);
    let result = ctx.iterative_deepening(&mut pos, 5, |_| {});
    assert!(result.score > 500, "score {}", result.score);
}

#[test]
fn search_repeats_exactly_across_runs_on_same_context() {
    // two searches of the same position from one engine lifetime may
    // differ through table reuse, but each must restore the position
    ferrum::init();
    let mut pos = Position::new();
    pos.load_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
    let fen = pos.dump_fen();

    let mut tt = TranspositionTable::new(8);
    let mut ctx = SearchContext::new(&mut tt, 1, None);
    ctx.iterative_deepening(&mut pos, 4, |_| {});
    assert_eq!(pos.dump_fen(), fen);

    let mut ctx = SearchContext::new(&mut tt, 2, None);
    ctx.iterative_deepening(&mut pos, 4, |_| {});
    assert_eq!(pos.dump_fen(), fen);
    assert_eq!(pos.zobrist_key, pos.recompute_key());
}
