//! Email assistant evaluation CLI
//!
//! The `email-eval` command runs the evaluation suites against an assistant
//! graph, either a deployed LangGraph-compatible server or an in-process
//! scripted graph.
//!
//! ## Commands
//!
//! - `tool-calls`: check that every expected tool call is issued
//! - `criteria`: grade transcripts against response criteria with an LLM judge
//! - `all`: run both suites
//! - `dataset`: show the dataset rows
//! - `tools`: list the assistant's tools

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

use email_eval_core::reporting::{render_summary_md, write_results_json, ResultsArtifact};
use email_eval_core::telemetry::init_tracing;
use email_eval_core::{
    AgentGraph, AgentVariant, AssistantRunner, CriteriaGrader, EmailDataset, EvalOrchestrator,
    EvalSink, GraderConfig, JsonlSink, MultiSink, OpenAiCompatClient, RemoteGraph,
    RemoteGraphConfig, ScriptedGraph, SuiteReport, ToolRegistry, TracingSink,
};

#[derive(Parser)]
#[command(name = "email-eval")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluate an LLM email assistant against a scripted email dataset", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Assistant implementation under test
    #[arg(
        long,
        global = true,
        env = "EMAIL_EVAL_AGENT_MODULE",
        default_value = "email_assistant"
    )]
    agent_module: String,

    /// Column-oriented dataset file (bundled dataset when omitted)
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct GraphArgs {
    /// LangGraph-compatible server URL
    #[arg(long, env = "LANGGRAPH_URL")]
    server_url: Option<String>,

    /// Assistant id on the server (defaults to the agent module name)
    #[arg(long, env = "LANGGRAPH_ASSISTANT_ID")]
    assistant_id: Option<String>,

    /// Replay planned tool calls from a JSON file instead of calling a server
    #[arg(long)]
    scripted: Option<PathBuf>,

    /// Replay each row's expected tool calls (offline smoke run)
    #[arg(long)]
    replay_expected: bool,
}

#[derive(Args, Debug, Clone, Default)]
struct OutputArgs {
    /// Write the results artifact (JSON) to this path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write a markdown summary to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Append per-case inputs/outputs as JSON lines to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the assistant issues every expected tool call
    ToolCalls {
        #[command(flatten)]
        graph: GraphArgs,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Grade transcripts against the response criteria with an LLM judge
    Criteria {
        #[command(flatten)]
        graph: GraphArgs,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Run the tool-call and criteria suites
    All {
        #[command(flatten)]
        graph: GraphArgs,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show the dataset rows
    Dataset,

    /// List the assistant's tools
    Tools,
}

#[derive(Debug, Clone, Copy)]
struct Suites {
    tool_calls: bool,
    criteria: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Missing .env is fine; values in it take precedence over the shell.
    dotenvy::dotenv_override().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let variant: AgentVariant = cli
        .agent_module
        .parse()
        .context("Invalid --agent-module")?;
    let dataset = load_dataset(cli.dataset.as_deref())?;

    match cli.command {
        Commands::ToolCalls { graph, output } => {
            let suites = Suites {
                tool_calls: true,
                criteria: false,
            };
            Ok(exit_code(cmd_run(variant, &dataset, &graph, &output, suites).await?))
        }
        Commands::Criteria { graph, output } => {
            let suites = Suites {
                tool_calls: false,
                criteria: true,
            };
            Ok(exit_code(cmd_run(variant, &dataset, &graph, &output, suites).await?))
        }
        Commands::All { graph, output } => {
            let suites = Suites {
                tool_calls: true,
                criteria: true,
            };
            Ok(exit_code(cmd_run(variant, &dataset, &graph, &output, suites).await?))
        }
        Commands::Dataset => {
            cmd_dataset(&dataset);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Tools => {
            cmd_tools();
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(passed: bool) -> ExitCode {
    if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn load_dataset(path: Option<&Path>) -> Result<EmailDataset> {
    match path {
        Some(path) => EmailDataset::load(path)
            .with_context(|| format!("Failed to load dataset {:?}", path)),
        None => EmailDataset::builtin().context("Bundled dataset is invalid"),
    }
}

fn build_graph(
    variant: AgentVariant,
    dataset: &EmailDataset,
    args: &GraphArgs,
) -> Result<Arc<dyn AgentGraph>> {
    let name = variant.module_name();
    if args.replay_expected {
        info!("replaying expected tool calls in-process");
        return Ok(Arc::new(ScriptedGraph::from_dataset(name, dataset)));
    }
    if let Some(path) = &args.scripted {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scripted plans {:?}", path))?;
        let graph = ScriptedGraph::from_json(name, &raw)
            .with_context(|| format!("Invalid scripted plans {:?}", path))?;
        return Ok(Arc::new(graph));
    }

    let mut config = RemoteGraphConfig::from_env();
    if let Some(url) = &args.server_url {
        config.url = url.clone();
    }
    config.assistant_id = args
        .assistant_id
        .clone()
        .unwrap_or_else(|| name.to_string());
    info!(url = %config.url, assistant_id = %config.assistant_id, "using remote graph");
    let graph = RemoteGraph::new(config).context("Failed to build remote graph client")?;
    Ok(Arc::new(graph))
}

fn build_sink(output: &OutputArgs) -> Result<Arc<dyn EvalSink>> {
    let tracing_sink: Arc<dyn EvalSink> = Arc::new(TracingSink);
    let mut sink = MultiSink::new(vec![tracing_sink]);
    if let Some(path) = &output.log_file {
        let file: Arc<dyn EvalSink> = Arc::new(
            JsonlSink::open(path).with_context(|| format!("Failed to open log file {:?}", path))?,
        );
        sink.push(file);
    }
    Ok(Arc::new(sink))
}

async fn cmd_run(
    variant: AgentVariant,
    dataset: &EmailDataset,
    graph_args: &GraphArgs,
    output: &OutputArgs,
    suites: Suites,
) -> Result<bool> {
    let graph = build_graph(variant, dataset, graph_args)?;
    let runner = AssistantRunner::new(variant, graph);
    let mut orchestrator = EvalOrchestrator::new(runner, build_sink(output)?);

    if suites.criteria {
        let config = GraderConfig::from_env();
        let client =
            OpenAiCompatClient::new(config).context("Failed to configure the grading model")?;
        orchestrator = orchestrator.with_grader(CriteriaGrader::new(Arc::new(client)));
    }

    println!(
        "Evaluating {} on {} emails ({} requiring responses)",
        variant,
        dataset.len(),
        dataset.response_cases().len()
    );

    let mut reports = Vec::new();
    if suites.tool_calls {
        let report = orchestrator
            .run_tool_call_suite(dataset)
            .await
            .context("Tool-call suite aborted")?;
        print_report(&report);
        reports.push(report);
    }
    if suites.criteria {
        let report = orchestrator
            .run_criteria_suite(dataset)
            .await
            .context("Criteria suite aborted")?;
        print_report(&report);
        reports.push(report);
    }

    let artifact = ResultsArtifact::from_reports(variant.module_name(), dataset.digest(), &reports);
    if let Some(path) = &output.output {
        write_results_json(path, &artifact)?;
        println!("Results written to {:?}", path);
    }
    if let Some(path) = &output.summary {
        let md: Vec<String> = reports.iter().map(render_summary_md).collect();
        std::fs::write(path, md.join("\n"))
            .with_context(|| format!("write {:?}", path))?;
        println!("Summary written to {:?}", path);
    }

    Ok(artifact.overall_pass())
}

fn print_report(report: &SuiteReport) {
    println!();
    println!("{}", report.test);
    for case in &report.cases {
        let verdict = if case.passed { "PASS" } else { "FAIL" };
        println!("  {} {}", verdict, case.case);
        if !case.missing_calls.is_empty() {
            println!("       missing: {}", case.missing_calls.join(", "));
        }
        if !case.extra_calls.is_empty() {
            println!("       extra:   {}", case.extra_calls.join(", "));
        }
        if let Some(grade) = &case.grade {
            println!("       grade:   {}", grade.justification);
        }
        if let Some(error) = &case.error {
            println!("       error:   {}", error);
        }
    }
    println!(
        "  {}/{} passed ({:.1}%)",
        report.passed_count(),
        report.total(),
        report.pass_rate() * 100.0
    );
}

fn cmd_dataset(dataset: &EmailDataset) {
    println!("Dataset digest: {}", dataset.digest());
    for row in dataset.rows() {
        println!(
            "{:>3}  {:<16} {:<8} {}",
            row.index,
            row.name,
            row.expected_triage.as_str(),
            row.email_input.subject
        );
        if !row.expected_tool_calls.is_empty() {
            println!("     expects: {}", row.expected_tool_calls.join(", "));
        }
    }
}

fn cmd_tools() {
    for tool in ToolRegistry::default_tools().get_tools() {
        let spec = tool.spec();
        println!("{:<28} {}", spec.name, spec.description);
        println!(
            "{:<28} requires: {}",
            "",
            spec.input_schema.required_fields.join(", ")
        );
    }
}
