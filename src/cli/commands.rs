// ABOUTME: Command implementations for the taskseq CLI
// ABOUTME: Handles execution of run, validate, convert, and detect commands

use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::{ExecutionContext, ExecutionStatus, LogReporter, TaskSequenceEngine};
use crate::model::{TaskSequence, TaskSequenceVariable};
use crate::parser::{Format, ParserRegistry, SequenceValidator};
use crate::steps::StepRegistry;
use crate::variables::store::fold_case;

pub struct RunOptions {
    pub parallel: bool,
    pub max_parallelism: usize,
    pub variables: IndexMap<String, String>,
    pub format: Option<Format>,
    pub output: Option<PathBuf>,
}

/// Execute a task sequence. Fails when the run does not finish `Completed`.
pub async fn run_sequence(
    path: PathBuf,
    options: RunOptions,
    cancel: CancellationToken,
) -> Result<ExecutionStatus> {
    info!("Loading task sequence: {}", path.display());

    let mut sequence = load_sequence(&path, options.format).await?;
    apply_variables(&mut sequence, &options.variables);
    info!(
        "Loaded task sequence '{}' ({} step(s))",
        sequence.name,
        sequence.step_count()
    );

    let engine =
        TaskSequenceEngine::new(StepRegistry::with_defaults()).with_reporter(Arc::new(LogReporter));

    let context = if options.parallel {
        engine
            .execute_parallel(&sequence, options.max_parallelism, cancel)
            .await
    } else {
        engine.execute(&sequence, cancel).await
    };

    match options.output {
        Some(ref output) => {
            let json = serde_json::to_string_pretty(&context)
                .context("Failed to serialize execution context")?;
            tokio::fs::write(output, json)
                .await
                .with_context(|| format!("Failed to write output file {}", output.display()))?;
            info!("Execution context written to: {}", output.display());
        }
        None => print_summary(&context),
    }

    match context.status {
        ExecutionStatus::Completed => Ok(context.status),
        status => Err(anyhow::anyhow!(
            "Task sequence '{}' finished with status: {}",
            context.task_sequence_name,
            status
        )),
    }
}

/// Parse and validate a task sequence without executing it.
pub async fn validate_sequence(path: PathBuf, format: Option<Format>) -> Result<()> {
    info!("Validating task sequence: {}", path.display());

    let sequence = load_sequence(&path, format).await?;
    let registry = StepRegistry::with_defaults();
    let report = SequenceValidator::new()
        .with_step_registry(&registry)
        .validate(&sequence);

    for warning in &report.warnings {
        warn!("{}", warning);
        println!("  warning: {}", warning);
    }
    for error in &report.errors {
        println!("  error: {}", error);
    }

    if !report.is_valid {
        return Err(anyhow::anyhow!(
            "Task sequence '{}' has {} validation error(s)",
            sequence.name,
            report.errors.len()
        ));
    }

    println!("✓ Task sequence '{}' is valid", sequence.name);
    println!("  Steps: {}", sequence.step_count());
    println!("  Variables: {}", sequence.variables.len());
    Ok(())
}

/// Re-serialize a task sequence in another format.
pub async fn convert_sequence(
    path: PathBuf,
    to: Format,
    format: Option<Format>,
    output: Option<PathBuf>,
) -> Result<()> {
    let sequence = load_sequence(&path, format).await?;
    let text = ParserRegistry::with_defaults()
        .serialize(&sequence, to)
        .with_context(|| format!("Failed to serialize as {}", to))?;

    match output {
        Some(output) => {
            tokio::fs::write(&output, text)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Converted {} to {} at {}", path.display(), to, output.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

/// Report which codec claims a document.
pub async fn detect_format(path: PathBuf) -> Result<Format> {
    let content = read_document(&path).await?;
    let registry = ParserRegistry::with_defaults();
    let parser = registry.detect(&content).ok_or_else(|| {
        anyhow::anyhow!("No parser recognized {} as a task sequence", path.display())
    })?;

    println!("{}", parser.format());
    Ok(parser.format())
}

async fn read_document(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn load_sequence(path: &Path, format: Option<Format>) -> Result<TaskSequence> {
    let content = read_document(path).await?;
    let registry = ParserRegistry::with_defaults();
    let sequence = match format {
        Some(format) => registry.parse_as(&content, format),
        None => registry.parse(&content),
    };
    sequence.with_context(|| format!("Failed to parse task sequence {}", path.display()))
}

/// Overrides declared variables (matched case-insensitively) and appends new ones.
pub fn apply_variables(sequence: &mut TaskSequence, variables: &IndexMap<String, String>) {
    for (name, value) in variables {
        let folded = fold_case(name);
        match sequence
            .variables
            .iter_mut()
            .find(|variable| fold_case(&variable.name) == folded)
        {
            Some(variable) => variable.value = value.clone(),
            None => sequence
                .variables
                .push(TaskSequenceVariable::new(name.clone(), value.clone())),
        }
    }
}

fn print_summary(context: &ExecutionContext) {
    println!(
        "Task sequence '{}' finished with status: {}",
        context.task_sequence_name, context.status
    );

    for result in &context.step_results {
        let duration = result
            .duration()
            .map(|d| format!(" ({:.2}s)", d.as_secs_f64()))
            .unwrap_or_default();
        println!("  Step '{}': {}{}", result.step_name, result.status, duration);
        if let Some(ref error) = result.error_message {
            println!("    Error: {}", error);
        }
    }

    let summary = context.summary();
    println!(
        "  {} completed, {} failed, {} cancelled",
        summary.completed_steps, summary.failed_steps, summary.cancelled_steps
    );
}
