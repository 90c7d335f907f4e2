use anyhow::{bail, Context, Result};
use clap::Args;
use healreplay::config::{AppConfig, ENV_SECRET_KEY};
use replay_core_types::SecretBox;

#[derive(Args, Clone, Debug)]
pub struct EncryptArgs {
    /// Value to seal for a secret text-input step
    #[arg(required_unless_present = "generate_key")]
    pub value: Option<String>,

    /// Print a fresh base64 key instead
    #[arg(long, conflicts_with = "value")]
    pub generate_key: bool,
}

pub fn cmd_encrypt(args: EncryptArgs, config: &AppConfig) -> Result<bool> {
    if args.generate_key {
        println!("{}", SecretBox::generate_key());
        return Ok(true);
    }
    let Some(value) = args.value else {
        bail!("nothing to encrypt");
    };
    let Some(key) = config.secret_key.as_deref() else {
        bail!("no secret key configured; set {ENV_SECRET_KEY} or secret_key in the config file");
    };
    let sealed = SecretBox::from_base64_key(key)
        .context("Invalid secret key")?
        .seal(&value)
        .context("Failed to seal value")?;
    println!("{sealed}");
    Ok(true)
}
