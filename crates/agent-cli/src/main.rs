//! Command-line demo for agent-rs
//!
//! An "orchestrator" agent hands finance questions to a "reports" agent,
//! which answers with figures from a `burn_rate` tool. The scripted backend
//! makes the run deterministic; with the `anthropic` feature the same agents
//! can run against the live API.

use agent_core::{Error, ToolOutput};
use agent_llm::tools::schema;
use agent_llm::{LLMProvider, Message, ScriptedProvider, ScriptedTurn};
use agent_runtime::{Agent, RunOptions, RunResult, Runner, StreamChunk};
use agent_tools::FnTool;
use agent_utils::{Config, LogFormat};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, ValueEnum};
use futures::StreamExt;
use serde_json::{Value, json};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const MONTHLY_BURN: u64 = 120_000;

#[derive(Parser, Debug)]
#[command(name = "agent-cli")]
#[command(about = "Multi-agent delegation demo for agent-rs", long_about = None)]
struct Args {
    /// Question for the orchestrator
    #[arg(short, long, default_value = "What was our burn rate in H1 2024?")]
    question: String,

    /// Print output as it is produced
    #[arg(short, long)]
    stream: bool,

    /// Override the configured step ceiling
    #[arg(long)]
    max_steps: Option<usize>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Model backend
    #[arg(long, value_enum, default_value_t = Backend::Scripted)]
    provider: Backend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Deterministic replay of the demo conversation
    Scripted,
    /// Anthropic Messages API (needs ANTHROPIC_API_KEY)
    #[cfg(feature = "anthropic")]
    Anthropic,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env_with(|key| std::env::var(key).ok())?;
    if args.json_logs {
        config.log_format = LogFormat::Json;
    }
    agent_utils::init_tracing_with(&config);

    info!(app = %config.app_name, environment = %config.environment, "Starting agent-cli");

    let mut options = RunOptions::from_settings(&config.runner);
    if let Some(max_steps) = args.max_steps {
        options = options.max_steps(max_steps);
    }

    let runner = Runner::builder()
        .provider(provider(args.provider)?)
        .agent(orchestrator()?)
        .agent(reports()?)
        .build()?;

    let messages = vec![Message::user(args.question.clone())];
    let result = if args.stream {
        stream_run(&runner, messages, options).await?
    } else {
        let result = runner.run(messages, options).await?;
        if let Some(output) = &result.final_output {
            println!("{output}");
        }
        result
    };

    print_summary(&result);
    Ok(())
}

fn provider(backend: Backend) -> anyhow::Result<Arc<dyn LLMProvider>> {
    match backend {
        Backend::Scripted => Ok(Arc::new(ScriptedProvider::new(demo_script()))),
        #[cfg(feature = "anthropic")]
        Backend::Anthropic => Ok(Arc::new(
            agent_llm::providers::AnthropicProvider::from_env()?,
        )),
    }
}

async fn stream_run(
    runner: &Runner,
    messages: Vec<Message>,
    options: RunOptions,
) -> anyhow::Result<RunResult> {
    let mut stream = runner.run_stream(messages, options);
    let mut stdout = std::io::stdout();

    while let Some(chunk) = stream.next().await {
        match chunk {
            StreamChunk::TextDelta { text, .. } => {
                print!("{text}");
                stdout.flush()?;
            }
            StreamChunk::ToolCallStart { agent, name, .. } => {
                println!("\n[{agent}] calling {name}");
            }
            StreamChunk::ToolCallResult {
                agent,
                name,
                content,
                is_error,
                ..
            } => {
                let marker = if is_error { "failed" } else { "returned" };
                println!("[{agent}] {name} {marker}: {content}");
            }
            StreamChunk::AgentStatus(status) => {
                tracing::debug!(status = ?status.status, agent = %status.agent, "Status");
            }
            StreamChunk::Handoff { from, to } => println!("--- {from} -> {to} ---"),
            StreamChunk::FinalMessage { .. } => println!(),
            StreamChunk::Error { message } => eprintln!("\nrun ended: {message}"),
        }
    }

    Ok(stream.finish().await?)
}

fn print_summary(result: &RunResult) {
    println!();
    println!("agents: {}", result.agent_trace.join(" -> "));
    println!(
        "outcome: {:?}, steps: {}, model calls: {}, tokens: {}",
        result.outcome,
        result.steps,
        result.model_calls,
        result.usage.total()
    );
}

// =========== Demo agents ===========

fn orchestrator() -> agent_core::Result<Agent> {
    Agent::builder("orchestrator")
        .instructions(
            "You triage questions. Hand anything about spending, burn rate or \
             runway to the reports agent.",
        )
        .handoff_with("reports", "Transfer finance and reporting questions.")
        .build()
}

fn reports() -> agent_core::Result<Agent> {
    Agent::builder("reports")
        .dynamic_instructions(|ctx| {
            let reason = ctx
                .metadata(agent_core::context::keys::HANDOFF_PAYLOAD)
                .and_then(|payload| payload.get("reason"))
                .and_then(Value::as_str)
                .unwrap_or("no reason given");
            format!(
                "You answer finance questions using the burn_rate tool. \
                 You were handed this conversation because: {reason}"
            )
        })
        .tool(burn_rate_tool())
        .build()
}

fn burn_rate_tool() -> FnTool {
    FnTool::new(
        "burn_rate",
        "Average monthly cash burn between two dates",
        schema::object(
            json!({
                "from": schema::string("Start date, YYYY-MM-DD"),
                "to": schema::string("End date, YYYY-MM-DD"),
                "currency": schema::string("ISO currency code"),
            }),
            &["from", "to", "currency"],
        ),
        |params, _ctx| async move { burn_rate(&params).map(ToolOutput::Continue) },
    )
}

/// Figures for the requested range
fn burn_rate(params: &Value) -> agent_core::Result<Value> {
    let field = |name: &str| {
        params[name]
            .as_str()
            .ok_or_else(|| Error::Validation(format!("'{name}' must be a string")))
    };
    let from = parse_date(field("from")?)?;
    let to = parse_date(field("to")?)?;
    let currency = field("currency")?;

    if to < from {
        return Err(Error::Validation("'to' is before 'from'".to_string()));
    }
    let months = (month_index(to) - month_index(from) + 1).unsigned_abs();

    Ok(json!({
        "currency": currency,
        "months": months,
        "monthly_burn": MONTHLY_BURN,
        "total_burn": MONTHLY_BURN * months,
    }))
}

fn parse_date(date: &str) -> agent_core::Result<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| Error::Validation(format!("'{date}' is not a YYYY-MM-DD date: {e}")))
}

/// Months since year zero
fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn demo_script() -> Vec<ScriptedTurn> {
    vec![
        ScriptedTurn::ToolCalls {
            text: Some("This is a reporting question, passing it on.".to_string()),
            calls: vec![(
                "transfer_to_reports".to_string(),
                json!({"reason": "burn rate question"}),
            )],
        },
        ScriptedTurn::tool_call(
            "burn_rate",
            json!({"from": "2024-01-01", "to": "2024-06-30", "currency": "USD"}),
        ),
        ScriptedTurn::text(
            "Between January and June 2024 the average burn was 120,000 USD per month, \
             720,000 USD in total.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burn_rate_over_half_year() {
        let figures =
            burn_rate(&json!({"from": "2024-01-01", "to": "2024-06-30", "currency": "USD"}))
                .unwrap();
        assert_eq!(figures["months"], 6);
        assert_eq!(figures["total_burn"], 720_000);
        assert_eq!(figures["currency"], "USD");
    }

    #[test]
    fn test_burn_rate_rejects_bad_input() {
        let reversed = burn_rate(&json!({"from": "2024-06-01", "to": "2024-01-01", "currency": "USD"}));
        assert!(matches!(reversed, Err(Error::Validation(_))));

        let malformed = burn_rate(&json!({"from": "2024-13-01", "to": "2024-12-01", "currency": "USD"}));
        assert!(matches!(malformed, Err(Error::Validation(_))));

        let missing = burn_rate(&json!({"from": "2024-01-01", "to": "2024-02-01"}));
        assert!(matches!(missing, Err(Error::Validation(_))));
    }

    #[test]
    fn test_burn_rate_rejects_impossible_dates() {
        for (from, to) in [
            ("2024-02-30", "2024-06-30"),
            ("2024-02-99", "2024-06-xx"),
            ("2024-01-01", "2023-02-29"),
        ] {
            let result = burn_rate(&json!({"from": from, "to": to, "currency": "USD"}));
            assert!(
                matches!(result, Err(Error::Validation(_))),
                "{from}..{to} should be rejected"
            );
        }

        // 2024 is a leap year.
        let leap = burn_rate(&json!({"from": "2024-02-29", "to": "2024-03-01", "currency": "USD"}))
            .unwrap();
        assert_eq!(leap["months"], 2);
    }

    #[test]
    fn test_demo_run_delegates_to_reports() {
        let runner = Runner::builder()
            .provider(provider(Backend::Scripted).unwrap())
            .agent(orchestrator().unwrap())
            .agent(reports().unwrap())
            .build()
            .unwrap();

        let result = tokio_test::block_on(
            runner.run(vec![Message::user("Burn rate?")], RunOptions::default()),
        )
        .unwrap();

        assert_eq!(result.agent_trace, vec!["orchestrator", "reports"]);
        assert_eq!(result.steps, 2);
        assert!(result.final_output.unwrap().contains("720,000 USD"));
    }
}
