//! Implementation of the `research-swarm verify` command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::sync::Arc;

use crate::cli::output::progress::{create_spinner, ProgressBarExt};
use crate::cli::output::{output, truncate, CommandOutput};
use crate::cli::service;
use crate::domain::models::{ConfidenceLevel, Config};
use crate::services::{EventBus, VerificationOutcome};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Claim to test
    pub claim: String,

    /// Override the configured number of execution attempts
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Print the final verification program
    #[arg(long)]
    pub show_code: bool,
}

#[derive(Debug, Serialize)]
pub struct VerifyOutput {
    pub claim: String,
    pub level: ConfidenceLevel,
    #[serde(flatten)]
    pub outcome: VerificationOutcome,
    #[serde(skip)]
    show_code: bool,
}

impl CommandOutput for VerifyOutput {
    fn to_human(&self) -> String {
        let verdict = if self.outcome.verified { "VERIFIED" } else { "NOT VERIFIED" };
        let mut lines = vec![
            format!("{verdict}: {}", self.claim),
            format!(
                "  Confidence: {:.2} ({})  Attempts: {}",
                self.outcome.confidence, self.level, self.outcome.attempts
            ),
            format!("  Evidence: {}", truncate(&self.outcome.evidence, 200)),
        ];
        if self.show_code && !self.outcome.code.is_empty() {
            lines.push(format!("\n{}", self.outcome.code));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: VerifyArgs, config: &Config, json_mode: bool) -> Result<()> {
    let mut config = config.clone();
    if let Some(max_attempts) = args.max_attempts {
        config.verification.max_attempts = max_attempts.max(1);
    }

    let generator = service::text_generator(&config)?;
    let sandbox = service::sandbox(&config).await;
    let verifier = service::verifier(&config, generator, sandbox, Arc::new(EventBus::default()));

    let spinner = create_spinner(format!("Verifying: {}", truncate(&args.claim, 60)), json_mode);
    let outcome = verifier.verify_claim(&args.claim).await;
    if outcome.verified {
        spinner.finish_success(format!("verified after {} attempt(s)", outcome.attempts));
    } else {
        spinner.finish_warning(format!("not verified after {} attempt(s)", outcome.attempts));
    }

    output(
        &VerifyOutput {
            claim: args.claim,
            level: outcome.confidence_level(),
            outcome,
            show_code: args.show_code,
        },
        json_mode,
    );
    Ok(())
}
