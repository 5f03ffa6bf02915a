use once_cell::sync::Lazy;

pub const NO_EP_FILE: u8 = 8;

/// One random 64-bit key per board feature. Keys are XOR-ed into the
/// position hash incrementally on every make/undo.
pub struct ZobristKeys {
    pub pieces: [[[u64; 64]; 6]; 2],
    pub side: u64,
    pub castling: [u64; 16],
    pub en_passant: [u64; 9],
}

struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

static ZOBRIST: Lazy<ZobristKeys> = Lazy::new(|| {
    let mut rng = SplitMix64::new(1337);

    let mut keys = ZobristKeys {
        pieces: [[[0; 64]; 6]; 2],
        side: 0,
        castling: [0; 16],
        en_passant: [0; 9],
    };

    for square in 0..64 {
        for piece in 0..6 {
            keys.pieces[0][piece][square] = rng.next();
            keys.pieces[1][piece][square] = rng.next();
        }
    }

    keys.side = rng.next();
    for rights in 0..16 {
        keys.castling[rights] = rng.next();
    }
    for file in 0..8 {
        keys.en_passant[file] = rng.next();
    }
    // the no-ep slot hashes to nothing, so clearing ep is a plain XOR
    keys.en_passant[NO_EP_FILE as usize] = 0;

    keys
});

pub fn init_zobrist() {
    Lazy::force(&ZOBRIST);
}

#[inline(always)]
pub fn piece_key(color: usize, piece: usize, square: u8) -> u64 {
    ZOBRIST.pieces[color][piece][square as usize]
}

#[inline(always)]
pub fn side_key() -> u64 {
    ZOBRIST.side
}

#[inline(always)]
pub fn castle_key(rights: u8) -> u64 {
    ZOBRIST.castling[rights as usize]
}

#[inline(always)]
pub fn ep_key(file: u8) -> u64 {
    ZOBRIST.en_passant[file as usize]
}
