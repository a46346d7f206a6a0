use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flowdeck_editor::{ContentBlock, ContentKind, GridBox, StepDocument};
use flowdeck_evaluator::{render_step, Registry, RenderContext, ResponseCheck, ResponseRecord};
use serde_json::json;

fn quiz_step() -> StepDocument {
    let mut doc = StepDocument::new();
    for i in 0..12u32 {
        let id = format!("box-{i}");
        let block = if i % 2 == 0 {
            ContentBlock::new(format!("Q{i}"), ContentKind::Text).with_body(json!("<p>Read <b>this</b></p>"))
        } else {
            ContentBlock::new(format!("Q{i}"), ContentKind::MultipleChoice).with_body(json!(["a", "b", "c", "d"]))
        };
        doc = doc
            .with_box(GridBox::new(id.clone(), 0, i * 2, 12, 2))
            .with_block(id, block)
            .with_formatting(format!("Q{i}"), "fontSize", json!(16));
    }
    doc
}

fn render_quiz_step(c: &mut Criterion) {
    let view = quiz_step();
    let registry = Registry::standard();
    let responses = ResponseRecord::new();

    c.bench_function("render_quiz_step", |b| {
        b.iter(|| render_step(black_box(&view), &registry, &RenderContext::preview(&responses)))
    });
}

fn grade_compound_check(c: &mut Criterion) {
    let check = ResponseCheck::compile(
        "(Q1.value >= 10 && Q1.value <= 20) || (lower(Q2) === 'photosynthesis' && len(Q3.selected) > 1)",
    )
    .unwrap();
    let responses: ResponseRecord = serde_json::from_value(json!({
        "Q1": { "value": 4 },
        "Q2": "Photosynthesis",
        "Q3": { "selected": ["a", "c"] }
    }))
    .unwrap();

    c.bench_function("grade_compound_check", |b| b.iter(|| check.check(black_box(&responses))));
}

criterion_group!(benches, render_quiz_step, grade_compound_check);
criterion_main!(benches);
