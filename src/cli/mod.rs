//! Command-line interface.

pub mod commands;
pub mod output;
pub mod service;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{
    config::ConfigArgs, detect::DetectArgs, exec::ExecArgs, layers::LayersArgs, plan::PlanArgs,
    run::RunArgs, verify::VerifyArgs,
};

#[derive(Parser, Debug)]
#[command(name = "research-swarm", version, about = "Layered research task execution with sandboxed claim verification")]
pub struct Cli {
    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file; defaults to .research-swarm/config.yaml
    #[arg(long, global = true, env = "RESEARCH_SWARM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level regardless of configuration
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show which execution sandbox would be used
    Detect(DetectArgs),
    /// Run a program or shell command in the sandbox
    Exec(ExecArgs),
    /// Print the execution layers of a plan file
    Layers(LayersArgs),
    /// Turn a research outline into a plan file
    Plan(PlanArgs),
    /// Verify a claim by generating and executing code
    Verify(VerifyArgs),
    /// Execute a plan end to end
    Run(RunArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

/// Report a failed command and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": chain,
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["research-swarm", "layers", "plan.yaml", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Layers(_)));
    }

    #[test]
    fn test_exec_requires_file_or_shell() {
        assert!(Cli::try_parse_from(["research-swarm", "exec"]).is_err());
        assert!(Cli::try_parse_from(["research-swarm", "exec", "--shell", "echo hi"]).is_ok());
        assert!(Cli::try_parse_from(["research-swarm", "exec", "a.py", "--shell", "ls"]).is_err());
    }
}
