use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flowdeck_parser::parse;

fn parse_simple_check(c: &mut Criterion) {
    let source = "Q1 == 4";

    c.bench_function("parse_simple_check", |b| b.iter(|| parse(black_box(source))));
}

fn parse_compound_check(c: &mut Criterion) {
    let source = r#"
        (Q1.value >= 10 && Q1.value <= 20)
            || (lower(Q2.answer) === 'photosynthesis' && len(Q3.selected) > 1)
            || max(Q4, Q5, Q6) % 2 == 0
    "#;

    c.bench_function("parse_compound_check", |b| b.iter(|| parse(black_box(source))));
}

criterion_group!(benches, parse_simple_check, parse_compound_check);
criterion_main!(benches);
