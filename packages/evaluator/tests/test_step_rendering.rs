//! Rendering effective views produced by an edit session

use flowdeck_editor::{ContentBlock, ContentKind, EditIntent, EditSession, ExperimentGroup, ExperimentRecord, GridBox, StepDocument};
use flowdeck_evaluator::{render_step, EditorInput, Registry, RenderContext, ResponseRecord, VNode};
use serde_json::json;

fn session() -> EditSession {
    let base = StepDocument::new()
        .with_box(GridBox::new("a", 0, 0, 12, 2))
        .with_block("a", ContentBlock::new("Q1", ContentKind::Text).with_body(json!("<p>Original</p>")));

    EditSession::new("flow", "step")
        .with_base(base)
        .with_experiment(
            ExperimentRecord::new("exp")
                .with_group(ExperimentGroup::new("A", 0.5))
                .with_group(ExperimentGroup::new("B", 0.5)),
        )
}

fn first_block(tree: &VNode) -> &VNode {
    &tree.children()[0].children()[0]
}

#[test]
fn test_group_formatting_only_renders_in_that_group() {
    let registry = Registry::standard();
    let responses = ResponseRecord::new();
    let ctx = RenderContext::preview(&responses);
    let mut session = session();

    session.set_active_experiment_group(Some("B")).unwrap();
    session.apply_edit(EditIntent::set_formatting("Q1", "fontSize", json!(18)));
    let in_b = render_step(&session.effective_view(), &registry, &ctx);
    assert_eq!(first_block(&in_b).style("font-size"), Some("18px"));

    session.set_active_experiment_group(Some("A")).unwrap();
    let in_a = render_step(&session.effective_view(), &registry, &ctx);
    assert_eq!(first_block(&in_a).style("font-size"), None);

    session.set_active_experiment_group(Some("All")).unwrap();
    let in_all = render_step(&session.effective_view(), &registry, &ctx);
    assert_eq!(first_block(&in_all).style("font-size"), None);
    assert_eq!(in_all.text_content(), "Original");
}

#[test]
fn test_editor_input_round_trips_through_session() {
    let registry = Registry::standard();
    let mut session = session();
    session.set_active_experiment_group(Some("A")).unwrap();

    let view = session.effective_view();
    let block = view.block("a").unwrap();
    let content_type = registry.get(block.kind).unwrap();

    let intent = content_type
        .edit(&"a".to_string(), block, EditorInput::SetBody { body: json!("<p>Variant</p>") })
        .unwrap();
    session.apply_edit(intent);

    let responses = ResponseRecord::new();
    let tree = render_step(&session.effective_view(), &registry, &RenderContext::preview(&responses));
    assert_eq!(tree.text_content(), "Variant");
}

#[test]
fn test_rendering_is_deterministic() {
    let registry = Registry::standard();
    let responses = ResponseRecord::new();
    let view = session().effective_view();

    let first = render_step(&view, &registry, &RenderContext::edit(&responses));
    let second = render_step(&view, &registry, &RenderContext::edit(&responses));
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
