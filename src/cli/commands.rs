use clap::Subcommand;

use super::encrypt::EncryptArgs;
use super::replay::ReplayArgs;
use super::validate::ValidateArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Replay a recorded session against a running browser
    Replay(ReplayArgs),

    /// Check a session file's schema and version without replaying it
    Validate(ValidateArgs),

    /// Seal a value for use as a secret text input
    Encrypt(EncryptArgs),
}
