//! Debounced query-string sync for embedded widgets.
//!
//! Every property change produces a new candidate query string. The
//! candidate is committed only after a quiet period with no further updates,
//! and only when it differs from the last committed string.

use flowdeck_editor::ContentBlock;
use flowdeck_evaluator::{encode_query, ContentType};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

#[derive(Debug)]
enum Command {
    Update(String),
    Cancel,
}

/// Handle to one widget's debouncer task; dropping it stops the task
#[derive(Debug)]
pub struct QuerySync {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl QuerySync {
    /// Spawn a debouncer; committed query strings arrive on the returned receiver
    pub fn spawn(quiet: Duration, committed: Option<String>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (commit_tx, commit_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(quiet, committed, command_rx, commit_tx));
        (Self { commands, task }, commit_rx)
    }

    /// Offer new widget parameters
    pub fn update(&self, params: &[(String, String)]) {
        let _ = self.commands.send(Command::Update(encode_query(params)));
    }

    pub fn update_from_block(&self, content_type: &dyn ContentType, block: &ContentBlock) {
        self.update(&content_type.query_params(block));
    }

    /// Forget the uncommitted candidate
    pub fn cancel(&self) {
        let _ = self.commands.send(Command::Cancel);
    }
}

impl Drop for QuerySync {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    quiet: Duration,
    mut committed: Option<String>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    commits: mpsc::UnboundedSender<String>,
) {
    let mut candidate: Option<String> = None;
    let timer = sleep(quiet);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Update(query)) => {
                    trace!(query = %query, "Query candidate");
                    candidate = Some(query);
                    timer.as_mut().reset(Instant::now() + quiet);
                }
                Some(Command::Cancel) => {
                    candidate = None;
                }
                None => break,
            },
            () = &mut timer, if candidate.is_some() => {
                let Some(query) = candidate.take() else {
                    continue;
                };
                if committed.as_ref() == Some(&query) {
                    continue;
                }
                debug!(query = %query, "Committing widget query");
                committed = Some(query.clone());
                if commits.send(query).is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_commits_after_quiet_period() {
        let (sync, mut commits) = QuerySync::spawn(Duration::from_secs(5), None);

        sync.update(&params(&[("level", "1")]));
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(commits.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(commits.recv().await.as_deref(), Some("level=1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_query_is_not_recommitted() {
        let (sync, mut commits) = QuerySync::spawn(Duration::from_secs(5), Some("level=1".into()));

        sync.update(&params(&[("level", "1")]));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(commits.try_recv().is_err());
    }
}
