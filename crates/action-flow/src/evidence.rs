//! Failure evidence: what the page looked like when a step failed.

use async_trait::async_trait;
use cdp_adapter::PageDriver;
use replay_core_types::SessionId;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Snapshot taken right after a step failed. Every part is optional since
/// the page may be half gone by then.
#[derive(Debug, Clone, Default)]
pub struct StepEvidence {
    pub failure: String,
    pub url: Option<String>,
    pub markup: Option<String>,
    pub screenshot: Option<Vec<u8>>,
    pub console: Vec<String>,
}

impl StepEvidence {
    /// Reads whatever the page still offers; individual read errors are dropped.
    pub async fn collect(page: &dyn PageDriver, failure: &str) -> Self {
        let url = page.current_url().await.ok();
        let markup = page.page_markup().await.ok();
        let screenshot = match page.screenshot().await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                debug!(target: "action-flow", error = %err, "screenshot unavailable");
                None
            }
        };
        let console = page.console_transcript().await.unwrap_or_default();
        Self {
            failure: failure.to_string(),
            url,
            markup,
            screenshot,
            console,
        }
    }
}

/// Evidence sink trait
#[async_trait]
pub trait EvidenceSink: Send + Sync {
    /// Stores evidence for a failed step. Best effort; returns where it went.
    async fn record(
        &self,
        session: &SessionId,
        step_index: usize,
        evidence: &StepEvidence,
    ) -> Option<PathBuf>;
}

/// Sink that keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvidenceSink;

#[async_trait]
impl EvidenceSink for NoopEvidenceSink {
    async fn record(&self, _: &SessionId, _: usize, _: &StepEvidence) -> Option<PathBuf> {
        None
    }
}

/// Writes `<root>/<session>/step-<n>/{failure.txt,url.txt,page.html,screenshot.png,console.log}`.
#[derive(Debug, Clone)]
pub struct FsEvidenceSink {
    root: PathBuf,
}

impl FsEvidenceSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn step_dir(&self, session: &SessionId, step_index: usize) -> PathBuf {
        self.root
            .join(sanitize(&session.0))
            .join(format!("step-{step_index}"))
    }
}

#[async_trait]
impl EvidenceSink for FsEvidenceSink {
    async fn record(
        &self,
        session: &SessionId,
        step_index: usize,
        evidence: &StepEvidence,
    ) -> Option<PathBuf> {
        let dir = self.step_dir(session, step_index);
        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            warn!(target: "action-flow", dir = %dir.display(), error = %err, "evidence directory not created");
            return None;
        }

        write_part(&dir, "failure.txt", evidence.failure.as_bytes()).await;
        if let Some(url) = &evidence.url {
            write_part(&dir, "url.txt", url.as_bytes()).await;
        }
        if let Some(markup) = &evidence.markup {
            write_part(&dir, "page.html", markup.as_bytes()).await;
        }
        if let Some(png) = &evidence.screenshot {
            write_part(&dir, "screenshot.png", png).await;
        }
        if !evidence.console.is_empty() {
            let mut transcript = evidence.console.join("\n");
            transcript.push('\n');
            write_part(&dir, "console.log", transcript.as_bytes()).await;
        }
        Some(dir)
    }
}

async fn write_part(dir: &Path, name: &str, bytes: &[u8]) {
    if let Err(err) = tokio::fs::write(dir.join(name), bytes).await {
        warn!(target: "action-flow", file = name, error = %err, "evidence file not written");
    }
}

/// Keeps session ids from escaping the evidence root.
fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "session".to_string()
    } else {
        cleaned
    }
}
