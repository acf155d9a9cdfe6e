//! Implementation of the `research-swarm config` command.

use anyhow::Result;
use clap::Args;

use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ConfigArgs {}

pub fn execute(_args: ConfigArgs, config: &Config, json_mode: bool) -> Result<()> {
    let rendered = if json_mode {
        serde_json::to_string_pretty(config)?
    } else {
        serde_yaml::to_string(config)?
    };
    println!("{rendered}");
    Ok(())
}
