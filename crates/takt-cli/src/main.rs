//! takt CLI - Job-Shop Scheduling Engine
//!
//! Command-line interface for validating and solving scheduling
//! problems. Input is a JSON solve request (problem + objective policy +
//! engine parameters); output is a text summary or the full JSON
//! solution.
//!
//! Exit code is 0 when the solver returns an optimal or feasible
//! schedule (or a `check` passes), 1 otherwise.

use std::fs;
use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use takt_core::SchedulingProblem;
use takt_solver::{SolveRequest, SolveResult};

#[derive(Parser)]
#[command(name = "takt")]
#[command(author, version, about = "Job-shop scheduling engine", long_about = None)]
struct Cli {
    /// Log level (debug, info, warning, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a problem file without solving
    Check {
        /// Input file path (solve request or bare problem JSON)
        #[arg(value_name = "FILE")]
        file: std::path::PathBuf,
    },

    /// Solve a scheduling problem
    Solve {
        /// Input file path (solve request JSON)
        #[arg(value_name = "FILE")]
        file: std::path::PathBuf,

        /// Solver time limit in seconds (overrides the request)
        #[arg(short, long, value_name = "SECONDS", default_value = "30")]
        time_limit: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },
}

fn init_logging(level: &str) {
    // accept the original's "warning" spelling for the warn level
    let level = match level {
        "warning" => "warn",
        other => other,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "takt_cli={level},takt_core={level},takt_solver={level}"
        ))
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let outcome = match cli.command {
        Commands::Check { file } => check(&file),
        Commands::Solve {
            file,
            time_limit,
            format,
            output,
        } => solve(&file, time_limit, &format, output.as_deref()),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

/// Parse and validate a problem; report issues without solving.
fn check(file: &std::path::Path) -> Result<bool> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;

    let mut problem = parse_problem(&content)
        .with_context(|| format!("cannot parse {}", file.display()))?;
    problem.reindex();

    problem.check_entities()?;
    let issues = problem.validate();
    if issues.is_empty() {
        println!(
            "OK: {} task(s), {} machine(s), {} operator(s)",
            problem.total_task_count(),
            problem.machines.len(),
            problem.operators.len()
        );
        return Ok(true);
    }
    for issue in &issues {
        println!("issue: {issue}");
    }
    Ok(false)
}

/// A check input may be a full solve request or a bare problem.
fn parse_problem(content: &str) -> Result<SchedulingProblem> {
    if let Ok(request) = serde_json::from_str::<SolveRequest>(content) {
        return Ok(request.problem);
    }
    Ok(serde_json::from_str::<SchedulingProblem>(content)?)
}

fn solve(
    file: &std::path::Path,
    time_limit: u64,
    format: &str,
    output: Option<&std::path::Path>,
) -> Result<bool> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let mut request: SolveRequest = serde_json::from_str(&content)
        .with_context(|| format!("cannot parse {}", file.display()))?;
    request.parameters.max_time_seconds = time_limit as f64;

    let result = request.solve()?;
    let succeeded = result.solution.status.has_solution();

    let rendered = match format {
        "json" => serde_json::to_string_pretty(&result)?,
        _ => render_text(&result),
    };

    match output {
        Some(path) => {
            let mut file = fs::File::create(path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            file.write_all(rendered.as_bytes())?;
            tracing::info!(path = %path.display(), "solution written");
        }
        None => println!("{rendered}"),
    }

    Ok(succeeded)
}

fn render_text(result: &SolveResult) -> String {
    let solution = &result.solution;
    let mut out = String::new();

    out.push_str(&format!("Status:   {}\n", solution.status));
    out.push_str(&format!(
        "Makespan: {} units ({:.1} hours)\n",
        solution.makespan, solution.makespan_hours
    ));
    out.push_str(&format!(
        "Lateness: {} minutes\n",
        solution.total_lateness_minutes
    ));
    if solution.setup_time_metrics.num_setups > 0 {
        out.push_str(&format!(
            "Setups:   {} ({} minutes total)\n",
            solution.setup_time_metrics.num_setups,
            solution.setup_time_metrics.total_setup_minutes
        ));
    }
    out.push_str(&format!(
        "Solved in {:.2}s\n",
        solution.solver_stats.solve_time
    ));

    if !solution.schedule.is_empty() {
        out.push('\n');
        out.push_str(&format!(
            "{:<12} {:<20} {:<14} {:>6} {:>6}  operators\n",
            "job", "task", "machine", "start", "end"
        ));
        for task in &solution.schedule {
            out.push_str(&format!(
                "{:<12} {:<20} {:<14} {:>6} {:>6}  {}\n",
                task.job_id,
                task.task_id,
                task.machine_id.as_deref().unwrap_or("-"),
                task.start_tu,
                task.end_tu,
                if task.operator_ids.is_empty() {
                    "-".to_string()
                } else {
                    task.operator_ids.join(",")
                }
            ));
        }
    }

    if let Some(pareto) = &result.pareto {
        out.push('\n');
        out.push_str(&format!(
            "Pareto frontier: {} solution(s)\n",
            pareto.frontier.len()
        ));
        for range in &pareto.analysis.ranges {
            out.push_str(&format!(
                "  {}: [{:.1}, {:.1}]\n",
                range.kind.label(),
                range.min,
                range.max
            ));
        }
    }

    out
}
