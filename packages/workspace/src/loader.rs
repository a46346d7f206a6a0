//! Builds an [`EditSession`] from stored documents.
//!
//! Missing documents load as empty ones. A field that fails to parse is
//! logged and replaced by its default; the rest of the step still loads.

use crate::store::{DocPath, DocumentStore, Fields, StoreError};
use flowdeck_common::Config;
use flowdeck_editor::document::{parse_layout, parse_layout_content};
use flowdeck_editor::{EditSession, EventRecord, ExperimentGroup, ExperimentRecord, StepDocument};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Read one step, its flow's experiment, and the step's events
#[instrument(skip(store, config))]
pub async fn load_session(
    store: &dyn DocumentStore,
    config: &Config,
    flow_id: &str,
    step_id: &str,
) -> Result<EditSession, StoreError> {
    let step_path = DocPath::step(flow_id, step_id);
    let step = match store.read(&step_path).await? {
        Some(fields) => fields,
        None => {
            info!(path = %step_path, "Step not found; starting from an empty document");
            Fields::new()
        }
    };

    let mut base = StepDocument::new();
    if let Some(value) = step.get("layout") {
        base.layout = parse_or_default("layout", parse_layout(value));
    }
    if let Some(value) = step.get("layoutContent") {
        base.layout_content = parse_or_default("layoutContent", parse_layout_content(value));
    }
    base.content_formatting = field_or_default(&step, "contentFormatting");

    let events: BTreeMap<String, EventRecord> = field_or_default(&step, "events");
    let response_check = step
        .get("responseCheck")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    let mut session = EditSession::new(flow_id, step_id)
        .with_name_separator(config.name_suffix_separator.clone())
        .with_base(base)
        .with_events(events)
        .with_response_check(response_check);

    if let Some(experiment) = load_experiment(store, flow_id).await? {
        session = session.with_experiment(experiment);
    }

    debug!(
        boxes = session.base().layout.len(),
        events = session.events().len(),
        experiment = session.experiment().is_some(),
        "Loaded step"
    );
    Ok(session)
}

/// Follow the flow's `experiment` reference, if any
async fn load_experiment(store: &dyn DocumentStore, flow_id: &str) -> Result<Option<ExperimentRecord>, StoreError> {
    let Some(flow) = store.read(&DocPath::flow(flow_id)).await? else {
        return Ok(None);
    };
    let Some(experiment_id) = flow.get("experiment").and_then(Value::as_str) else {
        return Ok(None);
    };

    let path = DocPath::experiment(experiment_id);
    let Some(fields) = store.read(&path).await? else {
        warn!(path = %path, "Flow references a missing experiment");
        return Ok(None);
    };

    let groups: Vec<ExperimentGroup> = field_or_default(&fields, "groups");
    Ok(Some(ExperimentRecord {
        id: experiment_id.to_string(),
        groups,
    }))
}

fn field_or_default<T: DeserializeOwned + Default>(fields: &Fields, name: &str) -> T {
    match fields.get(name) {
        None | Some(Value::Null) => T::default(),
        Some(value) => parse_or_default(name, serde_json::from_value(value.clone())),
    }
}

fn parse_or_default<T: Default>(field: &str, parsed: Result<T, serde_json::Error>) -> T {
    parsed.unwrap_or_else(|e| {
        warn!(field, error = %e, "Malformed stored field; using default");
        T::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_missing_step_loads_empty() {
        let store = MemoryStore::new();
        let session = load_session(&store, &Config::default(), "f", "s").await.unwrap();

        assert_eq!(**session.base(), StepDocument::new());
        assert!(session.experiment().is_none());
        assert_eq!(session.response_check(), None);
    }

    #[tokio::test]
    async fn test_loads_serialized_fields() {
        let store = MemoryStore::new()
            .with_doc(
                &DocPath::step("f", "s"),
                fields(json!({
                    "layout": "[{\"id\":\"a\",\"x\":0,\"y\":0,\"w\":6,\"h\":2}]",
                    "layoutContent": "{\"a\":{\"name\":\"Q1\",\"kind\":\"Text\"}}",
                    "contentFormatting": { "Q1": { "fontSize": 12 } },
                    "responseCheck": "Q1 == \"yes\"",
                    "events": { "clicked": { "trigger": { "kind": "click", "source": "a" }, "changes": [] } }
                })),
            )
            .with_doc(&DocPath::flow("f"), fields(json!({ "experiment": "exp" })))
            .with_doc(
                &DocPath::experiment("exp"),
                fields(json!({ "groups": [{ "name": "A", "weight": 0.5 }] })),
            );

        let session = load_session(&store, &Config::default(), "f", "s").await.unwrap();

        assert_eq!(session.base().layout.len(), 1);
        assert_eq!(session.base().block("a").unwrap().name, "Q1");
        assert_eq!(session.base().formatting_value("Q1", "fontSize"), Some(&json!(12)));
        assert_eq!(session.response_check(), Some("Q1 == \"yes\""));
        assert!(session.events().contains_key("clicked"));
        assert_eq!(session.experiment().unwrap().id, "exp");
        assert!(session.experiment().unwrap().group("A").is_some());
    }

    #[tokio::test]
    async fn test_malformed_field_falls_back_to_default() {
        let store = MemoryStore::new().with_doc(
            &DocPath::step("f", "s"),
            fields(json!({
                "layout": "not a layout",
                "contentFormatting": { "Q1": { "fontSize": 12 } }
            })),
        );

        let session = load_session(&store, &Config::default(), "f", "s").await.unwrap();
        assert!(session.base().layout.is_empty());
        assert_eq!(session.base().content_formatting.len(), 1);
    }

    #[tokio::test]
    async fn test_dangling_experiment_reference_is_ignored() {
        let store = MemoryStore::new().with_doc(&DocPath::flow("f"), fields(json!({ "experiment": "gone" })));
        let session = load_session(&store, &Config::default(), "f", "s").await.unwrap();
        assert!(session.experiment().is_none());
    }
}
