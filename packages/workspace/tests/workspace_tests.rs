use anyhow::Result;
use flowdeck_common::{logging, Config};
use flowdeck_editor::{
    ContentBlock, ContentKind, EditIntent, EventTrigger, GridBox, LayerMutation, OpKind, StepDocument,
};
use flowdeck_evaluator::{CheckOutcome, EditorInput, RenderMode, ResponseRecord};
use flowdeck_workspace::{DocPath, Fields, MemoryStore, Workspace};
use serde_json::{json, Value};
use std::sync::Arc;

fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap_or_default()
}

/// Flow `f` with step `s1` (box `a` holding text block Q1, box `b` empty) and an A/B experiment
fn quiz_store() -> Result<MemoryStore> {
    let base = StepDocument::new()
        .with_box(GridBox::new("a", 0, 0, 12, 2))
        .with_box(GridBox::new("b", 0, 2, 12, 2))
        .with_block("a", ContentBlock::new("Q1", ContentKind::Text).with_body(json!("<p>Pick one</p>")));

    Ok(MemoryStore::new()
        .with_doc(
            &DocPath::step("f", "s1"),
            fields(json!({
                "layout": serde_json::to_string(&base.layout)?,
                "layoutContent": serde_json::to_string(&base.layout_content)?,
            })),
        )
        .with_doc(&DocPath::flow("f"), fields(json!({ "experiment": "exp" })))
        .with_doc(
            &DocPath::experiment("exp"),
            fields(json!({ "groups": [
                { "name": "A", "weight": 0.5 },
                { "name": "B", "weight": 0.5 }
            ] })),
        ))
}

async fn open(store: &Arc<MemoryStore>) -> Result<Workspace> {
    logging::init(&Config::default());
    Ok(Workspace::open(store.clone(), Config::default(), "f", "s1").await?)
}

#[tokio::test]
async fn test_group_formatting_scenario() -> Result<()> {
    let store = Arc::new(quiz_store()?);
    let mut workspace = open(&store).await?;

    workspace.set_active_experiment_group(Some("B"))?;
    workspace.apply_edit(EditIntent::set_formatting("Q1", "fontSize", json!(18)));
    assert_eq!(
        workspace.effective_view().formatting_value("Q1", "fontSize"),
        Some(&json!(18))
    );

    workspace.set_active_experiment_group(Some("A"))?;
    assert_eq!(workspace.effective_view().formatting("Q1"), None);

    workspace.set_active_experiment_group(Some("All"))?;
    let responses = ResponseRecord::new();
    let tree = workspace.render(RenderMode::Preview, &responses);
    let block = &tree.children()[0].children()[0];
    assert_eq!(block.style("font-size"), None);

    workspace.flush().await?;

    let experiment = store.doc(&DocPath::experiment("exp")).unwrap();
    let b_changes = &experiment["groups"][1]["steps"]["s1"];
    assert_eq!(b_changes.as_array().map(Vec::len), Some(1));
    assert_eq!(b_changes[0]["value"], json!({ "property": "fontSize", "value": 18 }));
    assert!(experiment["groups"][0]["steps"].as_object().unwrap().is_empty());

    let step = store.doc(&DocPath::step("f", "s1")).unwrap();
    assert!(!step.contains_key("contentFormatting"));
    Ok(())
}

#[tokio::test]
async fn test_event_overlay_adds_content_without_touching_base() -> Result<()> {
    let store = Arc::new(quiz_store()?);
    let mut workspace = open(&store).await?;

    workspace.define_event("clicked", EventTrigger::click("a"));
    workspace.set_active_event(Some("clicked"));
    workspace.apply_edit(EditIntent::replace_layout(vec![
        GridBox::new("a", 0, 0, 12, 2),
        GridBox::new("reveal", 0, 2, 12, 2),
    ]));
    let added = workspace.add_block("reveal", ContentKind::Text);
    assert!(matches!(added, LayerMutation::Appended { op: OpKind::Add, .. }));
    workspace.flush().await?;

    let events = &store.doc(&DocPath::step("f", "s1")).unwrap()["events"];
    assert_eq!(events["clicked"]["trigger"]["source"], "a");
    assert_eq!(events["clicked"]["changes"].as_array().map(Vec::len), Some(2));
    assert!(!workspace.session().base().has_box("reveal"));

    workspace.set_active_event(None);
    assert!(workspace.effective_view().block("reveal").is_none());
    Ok(())
}

#[tokio::test]
async fn test_event_record_is_deleted_when_rolled_back() -> Result<()> {
    let store = Arc::new(quiz_store()?);
    let mut workspace = open(&store).await?;

    workspace.define_event("clicked", EventTrigger::click("a"));
    workspace.set_active_event(Some("clicked"));
    workspace.add_block("b", ContentKind::Button);
    workspace.flush().await?;
    assert_eq!(
        store.doc(&DocPath::step("f", "s1")).unwrap()["events"]["clicked"]["changes"][0]["op"],
        "add"
    );

    let rolled_back = workspace.apply_edit(EditIntent::remove_content("b"));
    assert!(matches!(rolled_back, LayerMutation::RolledBack { .. }));
    assert!(workspace.active_layer().is_base());
    workspace.flush().await?;

    assert_eq!(store.doc(&DocPath::step("f", "s1")).unwrap()["events"], json!({}));
    assert!(workspace.effective_view().block("b").is_none());
    Ok(())
}

#[tokio::test]
async fn test_authoring_input_and_grading() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let mut workspace = open(&store).await?;

    workspace.apply_edit(EditIntent::replace_layout(vec![GridBox::new("n", 0, 0, 6, 2)]));
    workspace.add_block("n", ContentKind::NumberInput);
    let renamed = workspace.input("n", EditorInput::Rename { name: "Age".into() });
    assert!(!renamed.is_noop());

    let rejected = workspace.input(
        "n",
        EditorInput::SetProperty {
            key: "min".into(),
            value: json!("zero"),
        },
    );
    assert!(rejected.is_noop());

    workspace.set_response_check(Some("Age >= 18".into()));

    let mut responses = ResponseRecord::new();
    responses.insert("Age".into(), json!(21));
    assert_eq!(workspace.grade(&responses), CheckOutcome::Correct);

    responses.insert("Age".into(), json!(12));
    assert!(!workspace.grade(&responses).is_correct());

    assert!(!workspace.grade(&ResponseRecord::new()).is_correct());

    workspace.flush().await?;
    let step = store.doc(&DocPath::step("f", "s1")).unwrap();
    assert_eq!(step["responseCheck"], "Age >= 18");
    assert!(step["layoutContent"].as_str().unwrap().contains("\"Age\""));
    Ok(())
}

#[tokio::test]
async fn test_removing_selected_group_persists_and_returns_to_base() -> Result<()> {
    let store = Arc::new(quiz_store()?);
    let mut workspace = open(&store).await?;

    workspace.set_active_experiment_group(Some("B"))?;
    workspace.apply_edit(EditIntent::set_formatting("Q1", "color", json!("red")));
    workspace.remove_experiment_group("B")?;

    assert!(workspace.active_layer().is_base());
    workspace.flush().await?;

    let groups = &store.doc(&DocPath::experiment("exp")).unwrap()["groups"];
    assert_eq!(groups.as_array().map(Vec::len), Some(1));
    assert_eq!(groups[0]["name"], "A");
    Ok(())
}

#[tokio::test]
async fn test_subscribers_follow_context_switches() -> Result<()> {
    let store = Arc::new(quiz_store()?);
    let mut workspace = open(&store).await?;
    let mut views = workspace.subscribe();

    workspace.set_active_experiment_group(Some("A"))?;
    workspace.apply_edit(EditIntent::edit_content("a", fields(json!({ "name": "Q1a" }))));
    assert!(views.has_changed()?);
    assert_eq!(views.borrow_and_update().block("a").unwrap().name, "Q1a");

    workspace.set_active_experiment_group(None)?;
    assert_eq!(views.borrow_and_update().block("a").unwrap().name, "Q1");
    Ok(())
}

#[tokio::test]
async fn test_rename_input_keeps_block_names_unique() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let mut workspace = open(&store).await?;

    workspace.apply_edit(EditIntent::replace_layout(vec![
        GridBox::new("a", 0, 0, 6, 2),
        GridBox::new("b", 6, 0, 6, 2),
    ]));
    workspace.add_block("a", ContentKind::Text);
    workspace.add_block("b", ContentKind::NumberInput);
    let taken = workspace.effective_view().block("a").unwrap().name.clone();

    let renamed = workspace.input("b", EditorInput::Rename { name: taken.clone() });
    assert!(!renamed.is_noop());

    let view = workspace.effective_view();
    assert_eq!(view.block("a").unwrap().name, taken);
    assert_eq!(view.block("b").unwrap().name, format!("{taken}_1"));
    Ok(())
}
