// Copyright 2026 The Model Factory Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use modelfactory_engine::parser::parse;
use modelfactory_engine::{
    CompiledSystem, Derivatives, Draft, ExpressionCheck, MergeMode, MergeOptions, Model, Scope,
    check_expression, generate_schema, merge, print_eqn, validate_model,
};

/// Check expressions, validate models, and merge drafts of model changes.
#[derive(Parser)]
#[command(name = "modelfactory", version)]
struct Cli {
    /// path to write output to instead of stdout
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// indent JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a single expression, resolving names against a model
    CheckExpr {
        expr: String,
        /// model JSON whose states and parameters are in scope
        #[arg(long)]
        model: Option<PathBuf>,
        /// state the expression is an equation for
        #[arg(long)]
        governs: Option<String>,
    },

    /// Validate a model document
    Validate {
        #[arg(long)]
        model: PathBuf,
    },

    /// Merge a draft onto a base model
    Merge {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        draft: PathBuf,
        /// merge in commit mode
        #[arg(long)]
        commit: bool,
        /// return the effective model even when it fails validation
        #[arg(long)]
        partial: bool,
    },

    /// Evaluate every equation at the model's initial values
    Eval {
        #[arg(long)]
        model: PathBuf,
        /// apply this scenario's overrides
        #[arg(long)]
        scenario: Option<String>,
    },

    /// Print the JSON schema of change operations
    Schema,
}

#[derive(Serialize)]
struct ExpressionOutput {
    #[serde(flatten)]
    check: ExpressionCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    normalized: Option<String>,
}

#[derive(Serialize)]
struct EvalOutput<'a> {
    scenario: Option<&'a str>,
    states: BTreeMap<String, f64>,
    parameters: BTreeMap<String, f64>,
    #[serde(flatten)]
    derivatives: Derivatives,
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("modelfactory=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

struct Output {
    path: Option<PathBuf>,
    pretty: bool,
}

impl Output {
    fn write<T: Serialize>(&self, value: &T) -> Result<()> {
        let mut writer: Box<dyn Write> = match self.path {
            Some(ref path) => Box::new(BufWriter::new(
                File::create(path).with_context(|| format!("creating {}", path.display()))?,
            )),
            None => Box::new(io::stdout().lock()),
        };
        if self.pretty {
            serde_json::to_writer_pretty(&mut writer, value)?;
        } else {
            serde_json::to_writer(&mut writer, value)?;
        }
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn status(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn check_expr(
    out: &Output,
    expr: &str,
    model: Option<&Path>,
    governs: Option<&str>,
) -> Result<ExitCode> {
    let mut scope = match model {
        Some(path) => Scope::from_model(&read_json(path)?),
        None => Scope::default(),
    };
    if let Some(symbol) = governs {
        if !scope.has_state(symbol) {
            bail!("--governs {symbol}: no such state");
        }
        scope = scope.governing(symbol);
    }

    let check = check_expression(expr, &scope);
    let normalized = if check.valid {
        parse(expr).ok().flatten().map(|ast| print_eqn(&ast))
    } else {
        None
    };
    let valid = check.valid;
    out.write(&ExpressionOutput { check, normalized })?;
    Ok(status(valid))
}

fn validate(out: &Output, model: &Path) -> Result<ExitCode> {
    let model: Model = read_json(model)?;
    let report = validate_model(&model);
    info!(
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "validated model"
    );
    out.write(&report)?;
    Ok(status(report.valid))
}

fn merge_draft(
    out: &Output,
    model: &Path,
    draft: &Path,
    commit: bool,
    partial: bool,
) -> Result<ExitCode> {
    let base: Model = read_json(model)?;
    let draft: Draft = read_json(draft)?;
    let options = MergeOptions {
        mode: if commit {
            MergeMode::Commit
        } else {
            MergeMode::Preview
        },
        partial_apply: partial,
    };
    debug!(draft = %draft.id, changes = draft.changes.len(), "merging draft");

    let result = merge(&base, &draft, &options);
    out.write(&result)?;
    Ok(status(result.report.valid))
}

fn eval(out: &Output, model: &Path, scenario: Option<&str>) -> Result<ExitCode> {
    let model: Model = read_json(model)?;
    let system = CompiledSystem::new(&model)?;
    let states = model.initial_values(scenario)?;
    let parameters = model.parameter_values(scenario)?;
    let derivatives = system.derivatives(&states, &parameters)?;
    out.write(&EvalOutput {
        scenario,
        states,
        parameters,
        derivatives,
    })?;
    Ok(ExitCode::SUCCESS)
}

fn run(cli: Cli) -> Result<ExitCode> {
    let out = Output {
        path: cli.output,
        pretty: cli.pretty,
    };
    match cli.command {
        Command::CheckExpr {
            expr,
            model,
            governs,
        } => check_expr(&out, &expr, model.as_deref(), governs.as_deref()),
        Command::Validate { model } => validate(&out, &model),
        Command::Merge {
            model,
            draft,
            commit,
            partial,
        } => merge_draft(&out, &model, &draft, commit, partial),
        Command::Eval { model, scenario } => eval(&out, &model, scenario.as_deref()),
        Command::Schema => {
            out.write(&generate_schema())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}
