use std::path::PathBuf;
use std::sync::Arc;

use action_flow::ReplayEngine;
use action_locator::{LocatorHealer, NoopHealer, OpenAiHealer};
use anyhow::{Context, Result};
use capture_tap::{CaptureReport, CaptureSession, NetworkFeed};
use cdp_adapter::{CdpPage, CdpTransport, PageDriver, WsTransport};
use clap::Args;
use healreplay::config::{AppConfig, HealerSettings};
use replay_core_types::{JsonObjectRepository, SecretBox, Session};
use tracing::{info, warn};

#[derive(Args, Clone, Debug)]
pub struct ReplayArgs {
    /// Recorded session file (JSON)
    pub session: PathBuf,

    /// Object repository to resolve named element references against
    #[arg(long, value_name = "FILE")]
    pub objects: Option<PathBuf>,

    /// Record page activity while replaying
    #[arg(long)]
    pub capture: bool,

    /// Write a capture report here (implies --capture)
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Store failure evidence under this directory
    #[arg(long, value_name = "DIR")]
    pub evidence_dir: Option<PathBuf>,

    /// Replay without calling the healing model
    #[arg(long)]
    pub no_healer: bool,
}

pub async fn cmd_replay(args: ReplayArgs, config: &AppConfig) -> Result<bool> {
    let session = Session::load_from_path(&args.session)
        .with_context(|| format!("Failed to load session {}", args.session.display()))?;
    info!(
        session = %args.session.display(),
        steps = session.len(),
        "Session loaded"
    );

    let transport = Arc::new(
        WsTransport::connect(config.cdp.clone())
            .await
            .context("Failed to connect to the browser")?,
    );
    info!(endpoint = transport.endpoint(), "Connected to browser");
    let transport_handle: Arc<dyn CdpTransport> = transport.clone();

    let outcome = replay_attached(&args, config, &session, transport_handle.clone()).await;
    transport_handle.close().await;
    let result = outcome?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.success {
        info!(steps = result.steps_completed, "Replay succeeded");
    } else {
        warn!(
            failed_step = ?result.failed_step,
            reason = result.failure_reason.as_deref().unwrap_or("unknown"),
            "Replay failed"
        );
    }
    Ok(result.success)
}

async fn replay_attached(
    args: &ReplayArgs,
    config: &AppConfig,
    session: &Session,
    transport: Arc<dyn CdpTransport>,
) -> Result<replay_core_types::PlaybackResult> {
    let page = Arc::new(
        CdpPage::attach(transport, config.cdp.clone())
            .await
            .context("Failed to attach to a page")?,
    );

    let mut options = config.replay.clone();
    if let Some(dir) = &args.evidence_dir {
        options.evidence_dir = Some(dir.clone());
    }

    let healer = build_healer(&config.healer, args.no_healer);
    let driver: Arc<dyn PageDriver> = page.clone();
    let mut engine = ReplayEngine::new(driver.clone(), healer, options);

    if let Some(path) = &args.objects {
        let repository = JsonObjectRepository::load(path)
            .with_context(|| format!("Failed to load object repository {}", path.display()))?;
        engine = engine.with_repository(Arc::new(repository));
    }
    if let Some(key) = &config.secret_key {
        let secrets = SecretBox::from_base64_key(key).context("Invalid secret key")?;
        engine = engine.with_secrets(secrets);
    }

    let capture = if args.capture || args.report.is_some() {
        let capture = Arc::new(
            CaptureSession::for_page(driver, config.capture.clone())
                .with_network_feed(NetworkFeed::for_page(&page)),
        );
        capture.start().await.context("Failed to start page capture")?;
        engine = engine.with_capture(capture.clone());
        Some(capture)
    } else {
        None
    };

    let result = engine.replay(session).await;

    if let Some(capture) = capture {
        capture.stop().await;
        info!(captures = capture.len(), "Capture stopped");
        if let Some(path) = &args.report {
            tokio::fs::write(path, capture.report())
                .await
                .with_context(|| format!("Failed to write report {}", path.display()))?;
            info!(report = %path.display(), "Capture report written");
        }
    }
    Ok(result)
}

fn build_healer(settings: &HealerSettings, disabled: bool) -> Arc<dyn LocatorHealer> {
    if disabled || !settings.enabled {
        return Arc::new(NoopHealer);
    }
    match OpenAiHealer::new(settings.openai.clone()) {
        Ok(healer) => {
            info!(model = %settings.openai.model, "Locator healing enabled");
            Arc::new(healer)
        }
        Err(err) => {
            warn!(error = %err, "Healer unavailable, continuing without healing");
            Arc::new(NoopHealer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_healer_is_noop() {
        let settings = HealerSettings::default();
        assert_eq!(build_healer(&settings, false).name(), "noop");
    }

    #[test]
    fn missing_api_key_falls_back_to_noop() {
        let mut settings = HealerSettings::default();
        settings.enabled = true;
        settings.openai.api_key = None;
        assert_eq!(build_healer(&settings, false).name(), "noop");
    }
}
