use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use replay_core_types::Session;
use tracing::info;

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Recorded session file (JSON)
    pub session: PathBuf,
}

pub async fn cmd_validate(args: ValidateArgs) -> Result<bool> {
    let session = Session::load_from_path(&args.session)
        .with_context(|| format!("Invalid session {}", args.session.display()))?;

    println!("Session:        {}", session.session_id);
    println!("Schema version: {}", session.schema_version);
    if let Some(browser) = &session.browser {
        println!("Browser:        {browser}");
    }
    println!("Steps:          {}", session.len());
    for (kind, count) in step_counts(&session) {
        println!("  {kind:<14} {count}");
    }
    info!(session = %args.session.display(), "Session is valid");
    Ok(true)
}

fn step_counts(session: &Session) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for step in session.steps() {
        *counts.entry(step.action.kind().as_str()).or_insert(0) += 1;
    }
    counts
}
