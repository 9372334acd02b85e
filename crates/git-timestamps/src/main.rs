//! CLI host for the commit-timestamps library: the post-commit hook
//! body, the ancestry validator, and the trust-anchor installer.

mod cli;

use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use commit_timestamps::chain::assemble_chain;
use commit_timestamps::config::Config;
use commit_timestamps::crypto::hash::HashAlgorithm;
use commit_timestamps::fetcher::{request_token, HttpClient};
use commit_timestamps::parser::certificate::{parse_der_certificate, subject_str};
use commit_timestamps::types::verdict::TokenStatus;
use commit_timestamps::{HookOutcome, Orchestrator, Repository, TrustStore, Validator};

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: cli::Cli) -> Result<ExitCode> {
    match cli.command {
        cli::Commands::PostCommit => handle_post_commit(),
        cli::Commands::Validate(args) => handle_validate(args),
        cli::Commands::Trust(args) => handle_trust(args),
        cli::Commands::Install(args) => handle_install(args),
    }
}

fn handle_post_commit() -> Result<ExitCode> {
    let repo = Repository::discover().context("not inside a git repository")?;
    let orchestrator = Orchestrator::new(&repo)?;

    let report = orchestrator
        .run_post_commit()
        .context("timestamping failed; the commit was rewound")?;

    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
    if let HookOutcome::Committed {
        commit,
        digest,
        tokens,
    } = report.outcome
    {
        println!(
            "Timestamp commit {} seals digest {} with {} token(s)",
            &commit[..commit.len().min(12)],
            digest,
            tokens
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_validate(args: cli::ValidateArgs) -> Result<ExitCode> {
    let repo = Repository::discover().context("not inside a git repository")?;
    let validator = Validator::new(&repo)?;
    let report = validator.validate(&args.rev)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for commit in &report.commits {
            let sealed = commit.timestamps_commit.as_deref().unwrap_or("<none>");
            if commit.ok {
                let at = commit
                    .effective_time
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                println!(
                    "Commit {}, which timestamps commit {} at {}, contains {} valid timestamp tokens.",
                    commit.commit,
                    sealed,
                    at,
                    commit.valid_count()
                );
            } else {
                println!(
                    "Commit {}, which timestamps commit {}, contains no valid timestamp tokens.",
                    commit.commit, sealed
                );
            }
            if let Some(detail) = &commit.detail {
                eprintln!("warning: commit {}: {}", commit.commit, detail);
            }
            for token in &commit.tokens {
                if token.status != TokenStatus::Valid {
                    eprintln!(
                        "warning: commit {}: token from {} {}: {}",
                        commit.commit,
                        token.tsa_url,
                        match token.status {
                            TokenStatus::Skipped => "skipped",
                            _ => "invalid",
                        },
                        token.detail.as_deref().unwrap_or("no detail")
                    );
                }
            }
        }
    }

    Ok(if report.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn handle_trust(args: cli::TrustArgs) -> Result<ExitCode> {
    let repo = Repository::discover().context("not inside a git repository")?;
    let config = Config::load(&repo)?;
    let http = HttpClient::new(config.http_timeout)?;
    let mut trust = TrustStore::open(&repo.trust_store_dir())?;

    // Any digest serves; the throwaway token only exists to carry the
    // TSA's certificate set.
    let probe = HashAlgorithm::Sha256.hash(b"git-timestamps trust probe");
    let token = request_token(&http, &args.tsa_url, &probe, HashAlgorithm::Sha256, true)
        .with_context(|| format!("failed to obtain a token from {}", args.tsa_url))?;
    let chain = assemble_chain(&http, &args.tsa_url, &token, &trust)
        .with_context(|| format!("failed to build the chain for {}", args.tsa_url))?;

    let root = parse_der_certificate(chain.root())?;
    println!("TSA:   {}", args.tsa_url);
    println!("Root:  {}", subject_str(&root));
    println!(
        "Trust is granted for timestamp validation only, scoped to {}",
        trust.dir().display()
    );

    if !args.yes && !confirm("Install this root as a trust anchor? [y/N] ")? {
        println!("Not installed.");
        return Ok(ExitCode::FAILURE);
    }

    let path = trust.install(chain.root())?;
    println!("Installed {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn handle_install(args: cli::InstallArgs) -> Result<ExitCode> {
    let repo = Repository::discover().context("not inside a git repository")?;
    let hook_path = repo.git_dir().join("hooks").join("post-commit");

    let script = "#!/bin/sh\nexec git-timestamps post-commit\n";
    if hook_path.exists() {
        let existing = fs::read_to_string(&hook_path).unwrap_or_default();
        if existing != script && !args.force {
            bail!(
                "{} already exists; pass --force to overwrite",
                hook_path.display()
            );
        }
    }
    if let Some(dir) = hook_path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&hook_path, script)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&hook_path, fs::Permissions::from_mode(0o755))?;
    }
    println!("Installed {}", hook_path.display());
    println!("Configure at least timestamping.tsa0.url to activate it.");
    Ok(ExitCode::SUCCESS)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
