use criterion::{black_box, criterion_group, criterion_main, Criterion, SamplingMode};

use ferrum::board::position::Position;
use ferrum::eval::evaluate::evaluate;
use ferrum::search::alphabeta::SearchContext;
use ferrum::search::transposition::TranspositionTable;

const MIDDLEGAME: &str = "r1bq1rk1/pp2bppp/2n1pn2/3p4/2PP4/2N1PN2/PP2BPPP/R1BQ1RK1 w - - 0 9";

fn search_benchmark(c: &mut Criterion) {
    ferrum::init();

    let mut group = c.benchmark_group("search");
    group.sampling_mode(SamplingMode::Flat).sample_size(10);

    group.bench_function("middlegame_depth5", |b| {
        let mut pos = Position::new();
        pos.load_fen(MIDDLEGAME);
        b.iter(|| {
            let mut tt = TranspositionTable::new(16);
            let mut ctx = SearchContext::new(&mut tt, 1, None);
            black_box(ctx.iterative_deepening(&mut pos, 5, |_| {}))
        });
    });

    group.finish();
}

fn eval_benchmark(c: &mut Criterion) {
    ferrum::init();

    let mut pos = Position::new();
    pos.load_fen(MIDDLEGAME);

    c.bench_function("evaluate", |b| {
        b.iter(|| black_box(evaluate(black_box(&pos))));
    });
}

criterion_group!(benches, search_benchmark, eval_benchmark);
criterion_main!(benches);
