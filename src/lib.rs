pub mod board {
    pub mod bitboard;
    pub mod position;
    pub mod zobrist;
}

pub mod movegen {
    pub mod attacks;
    pub mod moves;
    pub mod perft;
}

pub mod eval {
    pub mod evaluate;
    pub mod pst;
}

pub mod search {
    pub mod alphabeta;
    pub mod see;
    pub mod time_management;
    pub mod transposition;
}

pub mod uci {
    pub mod protocol;
}

/// Forces every lazily built table (attacks, zobrist keys, reductions)
/// before the first `Position` is constructed.
pub fn init() {
    board::zobrist::init_zobrist();
    movegen::attacks::init_attack_tables();
    search::alphabeta::init_reductions();
}
