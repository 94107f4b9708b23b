use criterion::{Criterion, black_box, criterion_group, criterion_main};

use alder::{Session, bootstrap_environment, expand_environment_with_modules, parse_module};

const SAMPLE_MODULE: &str = "
module Sample exposing (..)


sumTo limit =
    sumHelper limit 0


sumHelper remaining acc =
    if remaining == 0 then
        acc

    else
        sumHelper (remaining - 1) (acc + remaining)
";

fn bench_module_compilation(c: &mut Criterion) {
    let environment = bootstrap_environment().unwrap();
    let file = parse_module(SAMPLE_MODULE.trim_start()).unwrap();
    c.bench_function("compile_module", |b| {
        b.iter(|| {
            let expansion =
                expand_environment_with_modules(black_box(&environment), &[file.clone()]).unwrap();
            black_box(expansion.added.len())
        });
    });
}

fn bench_submission(c: &mut Criterion) {
    let mut session = Session::new().unwrap();
    c.bench_function("submit_expression", |b| {
        b.iter(|| {
            let text = session.submit(black_box("(1 + 2) * 3 - 4")).unwrap();
            black_box(text)
        });
    });
}

criterion_group!(benches, bench_module_compilation, bench_submission);
criterion_main!(benches);
