use std::io::{self, BufRead, Write};
use std::time::Instant;

use anyhow::{Context, Result};
use rand::Rng;

use crate::board::position::{Move, Position};
use crate::movegen::moves::{legal_moves, MoveList};
use crate::movegen::perft::perft_divide;
use crate::search::alphabeta::{is_mate_score, SearchContext, SearchResult, MATE, MAX_DEPTH};
use crate::search::time_management::TimeManager;
use crate::search::transposition::TranspositionTable;

const ENGINE_NAME: &str = "Ferrum";
const ENGINE_AUTHOR: &str = "themre";

const DEFAULT_HASH_MB: usize = 16;
const MIN_HASH_MB: usize = 1;
const MAX_HASH_MB: usize = 128;
const MAX_MULTI_PV: usize = 256;

/// Root moves within this many centipawns of the best are candidates
/// for MultiPV sampling.
const SAMPLE_WINDOW: i32 = 20;

pub struct UciEngine {
    position: Position,
    table: TranspositionTable,
    generation: u8,
    top_k: usize,
    debug: bool,
}

impl UciEngine {
    pub fn new() -> Self {
        Self {
            position: Position::startpos(),
            table: TranspositionTable::new(DEFAULT_HASH_MB),
            generation: 0,
            top_k: 1,
            debug: false,
        }
    }

    /// Synchronous command loop: one command per line, the search runs
    /// inline on this thread. Returns on `quit` or EOF.
    pub fn run(&mut self) -> Result<()> {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = line.context("reading UCI input")?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !self.handle_command(trimmed) {
                break;
            }
            io::stdout().flush().ok();
        }
        Ok(())
    }

    /// False means quit.
    fn handle_command(&mut self, command: &str) -> bool {
        let parts: Vec<&str> = command.split_whitespace().collect();

        match parts[0] {
            "uci" => self.cmd_uci(),
            "isready" => println!("readyok"),
            "ucinewgame" => self.cmd_ucinewgame(),
            "position" => self.cmd_position(&parts),
            "go" => self.cmd_go(&parts),
            "setoption" => self.cmd_setoption(&parts),
            "stop" => {} // the inline search has already returned
            "debug" => self.debug = parts.get(1) != Some(&"off"),
            "show" => self.cmd_show(),
            "quit" => return false,
            _ => self.log(&format!("unknown command: {}", parts[0])),
        }

        true
    }

    fn log(&self, message: &str) {
        if self.debug {
            println!("info string {}", message);
        }
    }

    fn cmd_uci(&self) {
        println!("id name {}", ENGINE_NAME);
        println!("id author {}", ENGINE_AUTHOR);
        println!(
            "option name Hash type spin default {} min {} max {}",
            DEFAULT_HASH_MB, MIN_HASH_MB, MAX_HASH_MB
        );
        println!(
            "option name MultiPV type spin default 1 min 1 max {}",
            MAX_MULTI_PV
        );
        println!("uciok");
    }

    fn cmd_ucinewgame(&mut self) {
        self.position.load_startpos();
        self.table.clear();
    }

    fn cmd_position(&mut self, parts: &[&str]) {
        if parts.len() < 2 {
            return;
        }

        let mut moves_idx = None;
        match parts[1] {
            "startpos" => {
                self.position.load_startpos();
                moves_idx = parts.iter().position(|&p| p == "moves").map(|i| i + 1);
            }
            "fen" => {
                let end = parts
                    .iter()
                    .position(|&p| p == "moves")
                    .unwrap_or(parts.len());
                let fen = parts[2..end].join(" ");
                // parse into a scratch board so a bad FEN cannot
                // clobber the current game
                let mut parsed = Position::new();
                if !parsed.load_fen(&fen) {
                    self.log(&format!("invalid fen: {}", fen));
                    return;
                }
                self.position = parsed;
                if end < parts.len() {
                    moves_idx = Some(end + 1);
                }
            }
            _ => {
                self.log("invalid position command");
                return;
            }
        }

        if let Some(idx) = moves_idx {
            for &move_str in &parts[idx..] {
                if !self.position.play_move(move_str) {
                    // UCI leaves this undefined; skip the tail
                    self.log(&format!("illegal move: {}", move_str));
                    break;
                }
            }
        }
    }

    fn cmd_setoption(&mut self, parts: &[&str]) {
        let name_start = match parts.iter().position(|&p| p == "name") {
            Some(i) => i + 1,
            None => return,
        };
        let value_start = parts.iter().position(|&p| p == "value");
        let name_end = value_start.unwrap_or(parts.len());
        let name = parts[name_start..name_end].join(" ");
        let value = value_start
            .map(|i| parts[i + 1..].join(" "))
            .unwrap_or_default();

        match name.as_str() {
            "Hash" => {
                if let Ok(mb) = value.parse::<usize>() {
                    let mb = mb.clamp(MIN_HASH_MB, MAX_HASH_MB);
                    self.table.setsize(mb);
                    self.log(&format!("hash table resized to {} MB", mb));
                }
            }
            "MultiPV" => {
                if let Ok(k) = value.parse::<usize>() {
                    self.top_k = k.clamp(1, MAX_MULTI_PV);
                }
            }
            _ => self.log(&format!("unknown option: {}", name)),
        }
    }

    fn cmd_show(&self) {
        self.position.print();
        println!("fen: {}", self.position.dump_fen());
        println!("key: {:016X}", self.position.zobrist_key);
    }

    fn cmd_go(&mut self, parts: &[&str]) {
        let mut depth: Option<u32> = None;
        let mut movetime: Option<u64> = None;
        let mut wtime: Option<u64> = None;
        let mut btime: Option<u64> = None;
        let mut winc: u64 = 0;
        let mut binc: u64 = 0;

        let mut i = 1;
        while i < parts.len() {
            let value = parts.get(i + 1).and_then(|v| v.parse::<u64>().ok());
            match parts[i] {
                "perft" => {
                    if let Some(n) = value {
                        self.cmd_perft(n as u32);
                    }
                    return;
                }
                "depth" => {
                    depth = value.map(|v| (v as u32).min(MAX_DEPTH as u32));
                    i += 1;
                }
                "movetime" => {
                    movetime = value;
                    i += 1;
                }
                "wtime" => {
                    wtime = value;
                    i += 1;
                }
                "btime" => {
                    btime = value;
                    i += 1;
                }
                "winc" => {
                    winc = value.unwrap_or(0);
                    i += 1;
                }
                "binc" => {
                    binc = value.unwrap_or(0);
                    i += 1;
                }
                "infinite" => {}
                _ => {}
            }
            i += 1;
        }

        let time_manager = if let Some(ms) = movetime {
            TimeManager::from_movetime(ms)
        } else if wtime.is_some() || btime.is_some() {
            TimeManager::from_clock(
                wtime.unwrap_or(0),
                btime.unwrap_or(0),
                winc,
                binc,
                self.position.side_to_move,
            )
        } else {
            TimeManager::infinite()
        };

        // a bare depth limit searches without a clock
        let max_depth = depth.unwrap_or(MAX_DEPTH as u32);
        self.think(max_depth, time_manager);
    }

    fn cmd_perft(&mut self, depth: u32) {
        if depth == 0 {
            return;
        }
        let start = Instant::now();
        let divide = perft_divide(&mut self.position, depth);
        let total: u64 = divide.iter().map(|(_, n)| n).sum();
        for (mv, nodes) in divide {
            println!("{}: {}", mv.to_uci(), nodes);
        }
        println!();
        println!("nodes searched: {}", total);
        self.log(&format!("perft took {} ms", start.elapsed().as_millis()));
    }

    fn think(&mut self, max_depth: u32, time_manager: TimeManager) {
        let mut root = MoveList::new();
        legal_moves(&mut self.position, &mut root);
        if root.is_empty() {
            println!("bestmove 0000");
            return;
        }

        self.generation = (self.generation + 1) & 0x3F;
        let deadline = time_manager.deadline(Instant::now());
        let mut ctx = SearchContext::new(&mut self.table, self.generation, deadline);

        let result =
            ctx.iterative_deepening(&mut self.position, max_depth, |iteration| {
                print_info(iteration);
                io::stdout().flush().ok();
            });

        let best = if result.best_move == Move::NULL {
            // stopped before depth 1 completed: any legal move beats
            // forfeiting
            ctx.root_moves[0].mv
        } else if self.top_k > 1 {
            choose_move(&ctx.root_moves, self.top_k)
        } else {
            result.best_move
        };

        println!("bestmove {}", best.to_uci());
    }
}

impl Default for UciEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn print_info(result: &SearchResult) {
    let score = if is_mate_score(result.score) {
        // signed full moves to mate, rounded up
        let mate_in = (MATE - result.score.abs() + 1) / 2;
        format!("mate {}", if result.score > 0 { mate_in } else { -mate_in })
    } else {
        format!("cp {}", result.score)
    };

    let nps = if result.elapsed_ms > 0 {
        result.nodes * 1000 / result.elapsed_ms
    } else {
        0
    };

    let pv: Vec<String> = result.pv.iter().map(|mv| mv.to_uci()).collect();

    println!(
        "info depth {} score {} time {} nodes {} nps {} pv {} hashfull {}",
        result.depth,
        score,
        result.elapsed_ms,
        result.nodes,
        nps,
        pv.join(" "),
        result.hashfull
    );
}

/// Samples uniformly among the top `k` root moves that sit within the
/// candidate window of the best score; forced mates are never diluted.
fn choose_move(root: &MoveList, k: usize) -> Move {
    let best = root[0];
    if k <= 1 || is_mate_score(best.score) {
        return best.mv;
    }

    let mut candidates = 1;
    while candidates < root.len().min(k)
        && root[candidates].score >= best.score - SAMPLE_WINDOW
    {
        candidates += 1;
    }

    if candidates <= 1 {
        best.mv
    } else {
        root[rand::thread_rng().gen_range(0..candidates)].mv
    }
}

pub fn run_uci() -> Result<()> {
    let mut engine = UciEngine::new();
    engine.run()
}
