//! Command-line interface definitions for git-timestamps
//!
//! Defines all CLI commands, subcommands, and arguments using clap.

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "git-timestamps",
    author,
    version,
    about = "RFC 3161 trusted timestamps for git commits",
    long_about = "Appends a trusted-timestamp commit after every ordinary commit and \
                  validates the resulting tamper-evident ancestry, sealing certificate \
                  chains and CRLs into the repository for long-term validation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Post-commit hook body: append a timestamp commit sealing HEAD
    #[command(name = "post-commit")]
    PostCommit,

    /// Walk a ref's ancestry and verify every timestamp commit
    Validate(ValidateArgs),

    /// Install the root of a TSA's certificate chain into the trust store
    Trust(TrustArgs),

    /// Write the post-commit hook script into the repository's hooks directory
    Install(InstallArgs),
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Commit ref whose ancestry to validate
    #[arg(value_name = "REF", default_value = "HEAD")]
    pub rev: String,

    /// Emit one JSON report on stdout instead of per-commit lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TrustArgs {
    /// TSA URL whose chain root should become a trust anchor
    #[arg(value_name = "TSA_URL")]
    pub tsa_url: String,

    /// Install without the interactive confirmation
    #[arg(long = "yes", short = 'y')]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Overwrite an existing post-commit hook
    #[arg(long)]
    pub force: bool,
}
