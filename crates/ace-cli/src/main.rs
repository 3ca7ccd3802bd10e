//! Operator CLI for the access control engine.

use std::path::PathBuf;
use std::sync::Arc;

use ace::attribute::{Attribute, AttributeValue};
use ace::engine::in_memory_evaluator;
use ace::pip::StaticPip;
use ace::request::Request;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

#[derive(Parser)]
#[command(name = "ace", about = "Evaluate requests and drive reloads against an ACE policy tree")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a single request against a policy document.
    Evaluate {
        /// Path to the policy document (XML).
        #[arg(long)]
        policy: PathBuf,
        /// Path to a JSON request fixture: `{"subject":..,"resource":..,"function":..,
        /// "attributes":{"id":{"values":["v"]}}}`.
        #[arg(long)]
        request: PathBuf,
    },
    /// Reload a policy document and report whether it was accepted.
    Reload {
        /// Path to the policy document (XML).
        #[arg(long)]
        policy: PathBuf,
    },
}

#[derive(serde::Deserialize)]
struct RequestFixture {
    subject: String,
    resource: String,
    function: String,
    #[serde(default)]
    attributes: std::collections::BTreeMap<String, Vec<String>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("ace=info,warn").init();
    let cli = Cli::parse();

    match cli.command {
        Command::Evaluate { policy, request } => evaluate(&policy, &request).await,
        Command::Reload { policy } => reload(&policy).await,
    }
}

async fn evaluate(policy_path: &std::path::Path, request_path: &std::path::Path) -> Result<()> {
    let fixture_text = std::fs::read_to_string(request_path)
        .with_context(|| format!("reading request fixture {}", request_path.display()))?;
    let fixture: RequestFixture =
        serde_json::from_str(&fixture_text).context("parsing request fixture")?;

    let mut pip = StaticPip::new();
    for (id, values) in fixture.attributes {
        pip.insert(Attribute::new(
            id,
            values.into_iter().map(AttributeValue::String).collect(),
        ));
    }

    let evaluator = in_memory_evaluator(policy_path, Arc::new(pip))
        .with_context(|| format!("loading policy {}", policy_path.display()))?;

    let request = Request::new(fixture.subject, fixture.resource, fixture.function);
    let outcome = evaluator.evaluate_with_audit(&request).await;

    println!(
        "{} {}",
        "result:".bold(),
        outcome.result.to_string().cyan()
    );
    println!("cache hit: {}", outcome.cache_hit);
    println!("evaluation time: {:.3}ms", outcome.evaluation_time_ms);
    for step in &outcome.trace {
        println!("  node[{}] {} -> {:?}", step.node_id, step.node_name, step.effect);
    }
    Ok(())
}

async fn reload(policy_path: &std::path::Path) -> Result<()> {
    let evaluator = in_memory_evaluator(policy_path, Arc::new(StaticPip::new()))
        .with_context(|| format!("loading initial policy {}", policy_path.display()))?;

    match evaluator.update_policy(policy_path).await {
        Ok(()) => {
            println!("{}", "reload OK".green());
            Ok(())
        }
        Err(e) => {
            println!("{} {e}", "reload FAILED:".red());
            Err(e.into())
        }
    }
}
