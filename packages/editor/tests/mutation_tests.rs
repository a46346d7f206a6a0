//! Routing properties checked directly against overlays

use flowdeck_editor::{
    apply_edit, resolve, resolve_layers, ChangeOp, ContentBlock, ContentKind, EditIntent, GridBox, LayerMutation,
    LayerTarget, OpKind, Overlay, Prop, StepDocument,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn partial(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn parent() -> StepDocument {
    StepDocument::new()
        .with_box(GridBox::new("a", 0, 0, 6, 2))
        .with_box(GridBox::new("b", 6, 0, 6, 2))
        .with_block("a", ContentBlock::new("Q1", ContentKind::MultipleChoice))
        .with_formatting("Q1", "color", json!("black"))
}

fn route(overlay: &mut Overlay, parent: &StepDocument, intent: EditIntent) -> LayerMutation {
    apply_edit(&intent, LayerTarget::Overlay { overlay, parent })
}

#[test]
fn test_resolution_through_empty_layer_is_identity() {
    let base = Arc::new(parent());
    let overlay = Overlay::from_ops(vec![
        ChangeOp::content(OpKind::Add, "b", partial(json!({ "name": "Q2", "kind": "Image" }))),
        ChangeOp::formatting("Q1", "color", None),
    ]);

    let once = resolve(&base, &overlay);
    let twice = resolve(&resolve(&base, &Overlay::new()), &overlay);
    assert_eq!(*once, *twice);
}

#[test]
fn test_add_then_remove_leaves_no_record() {
    let parent = parent();
    let mut overlay = Overlay::new();

    route(
        &mut overlay,
        &parent,
        EditIntent::edit_content("b", partial(json!({ "name": "Q2" }))),
    );
    route(&mut overlay, &parent, EditIntent::remove_content("b"));

    assert_eq!(overlay.count_for(Prop::LayoutContent, "b"), 0);
}

#[test]
fn test_remove_of_inherited_block_is_one_tombstone() {
    let parent = parent();
    let before = parent.clone();
    let mut overlay = Overlay::new();

    route(&mut overlay, &parent, EditIntent::remove_content("a"));
    route(&mut overlay, &parent, EditIntent::remove_content("a"));

    assert_eq!(overlay.count_for(Prop::LayoutContent, "a"), 1);
    assert!(overlay.ops()[0].is_tombstone());
    assert_eq!(parent, before);
}

#[test]
fn test_formatting_coalesces_to_latest_value() {
    let parent = parent();
    let mut overlay = Overlay::new();

    route(&mut overlay, &parent, EditIntent::set_formatting("Q1", "fontSize", json!(10)));
    route(&mut overlay, &parent, EditIntent::set_formatting("Q1", "fontSize", json!(12)));

    assert_eq!(overlay.len(), 1);
    assert_eq!(
        overlay.ops()[0],
        ChangeOp::formatting("Q1", "fontSize", Some(json!(12)))
    );
}

#[test]
fn test_identical_rich_text_produces_no_record() {
    let parent = StepDocument::new()
        .with_box(GridBox::new("a", 0, 0, 6, 2))
        .with_block(
            "a",
            ContentBlock::new("Intro", ContentKind::Text).with_body(json!({ "ops": [{ "insert": "Hello\n" }] })),
        );
    let mut overlay = Overlay::new();

    for _ in 0..3 {
        let result = route(
            &mut overlay,
            &parent,
            EditIntent::edit_content("a", partial(json!({ "body": { "ops": [{ "insert": "Hello\n" }] } }))),
        );
        assert!(result.is_noop());
    }
    assert!(overlay.is_empty());
}

#[test]
fn test_precedence_over_three_layers() {
    let base = Arc::new(
        StepDocument::new()
            .with_box(GridBox::new("a", 0, 0, 6, 2))
            .with_block("a", ContentBlock::new("X", ContentKind::Text)),
    );

    let mut experiment = Overlay::new();
    route(
        &mut experiment,
        &base,
        EditIntent::edit_content("a", partial(json!({ "name": "X1" }))),
    );

    let experiment_view = resolve(&base, &experiment);
    let mut event = Overlay::new();
    route(
        &mut event,
        &experiment_view,
        EditIntent::edit_content("a", partial(json!({ "name": "X2" }))),
    );

    let name = |view: Arc<StepDocument>| view.block("a").unwrap().name.clone();
    assert_eq!(name(resolve_layers(&base, [Some(&experiment), Some(&event)])), "X2");
    assert_eq!(name(resolve_layers(&base, [Some(&experiment)])), "X1");
    assert_eq!(name(resolve_layers(&base, [None])), "X");
}

#[test]
fn test_event_classifies_against_fresh_parent() {
    let base = Arc::new(parent());
    let mut experiment = Overlay::new();
    route(
        &mut experiment,
        &base,
        EditIntent::edit_content("b", partial(json!({ "name": "Q2" }))),
    );

    // "b" only exists because of the experiment layer: the event must edit, not add
    let parent_view = resolve(&base, &experiment);
    let mut event = Overlay::new();
    let result = route(
        &mut event,
        &parent_view,
        EditIntent::edit_content("b", partial(json!({ "body": "<p>later</p>" }))),
    );

    assert_eq!(
        result,
        LayerMutation::Appended {
            prop: Prop::LayoutContent,
            op: OpKind::Edit
        }
    );
}

#[test]
fn test_formatting_remove_of_inherited_property_tombstones() {
    let parent = parent();
    let mut overlay = Overlay::new();

    let result = route(&mut overlay, &parent, EditIntent::clear_formatting("Q1", "color"));

    assert_eq!(
        result,
        LayerMutation::Tombstoned {
            prop: Prop::ContentFormatting,
            replaced: false
        }
    );
    let view = resolve(&Arc::new(parent), &overlay);
    assert!(view.formatting("Q1").is_none());
}

#[test]
fn test_layout_written_as_single_checkpoint() {
    let parent = parent();
    let mut overlay = Overlay::new();

    for w in 1..=4 {
        route(
            &mut overlay,
            &parent,
            EditIntent::replace_layout(vec![GridBox::new("a", 0, 0, w, 2), GridBox::new("b", 6, 0, 6, 2)]),
        );
    }

    assert_eq!(overlay.len(), 1);
    assert_eq!(overlay.ops()[0].op, OpKind::Change);
    assert!(overlay.ops()[0].value.is_string());
}
