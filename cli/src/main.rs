use std::{
    collections::BTreeMap,
    fs,
    io::Write as _,
    path::{Path, PathBuf},
};

use clap::{ArgAction, Args, Parser, Subcommand};
use miette::{Context as _, Diagnostic, GraphicalReportHandler, IntoDiagnostic as _, Result};
use sharr_assertions::{check_all, parse_assertions_named};
use sharr_composer::{NO, YES, compose};
use sharr_config::{SolutionConfig, load_solution_config, parameter_values_from_env};
use sharr_document::Document;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, prelude::*};

#[derive(Parser)]
#[command(name = "sharr")]
#[command(version)]
#[command(about = "Compose and check the SHARR member account stack")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv, -vvvv).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compose the member stack and print its template.
    Synth(SynthArgs),
    /// Check a template against an assertion file.
    Check(CheckArgs),
    /// Evaluate conditions for deployment-time parameter values.
    Plan(PlanArgs),
}

#[derive(Args)]
struct StackArgs {
    /// Solution config (JSON5). Defaults apply when omitted.
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override a toggle default (e.g. `CreateAuditBucket=yes`).
    #[arg(long = "toggle", value_name = "NAME=yes|no", value_parser = parse_toggle)]
    toggles: Vec<(String, bool)>,
}

#[derive(Args)]
struct SynthArgs {
    #[command(flatten)]
    stack: StackArgs,

    /// Write the template here instead of stdout.
    #[arg(long = "out", value_name = "FILE")]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct CheckArgs {
    /// Assertion file (JSON5).
    #[arg(value_name = "ASSERTIONS")]
    assertions: PathBuf,

    /// Check this template instead of a freshly composed member stack.
    #[arg(long = "template", value_name = "FILE", conflicts_with_all = ["config", "toggles"])]
    template: Option<PathBuf>,

    #[command(flatten)]
    stack: StackArgs,
}

#[derive(Args)]
struct PlanArgs {
    #[command(flatten)]
    stack: StackArgs,

    /// Deployment-time parameter value; wins over `SHARR_PARAM_<NAME>`.
    #[arg(
        short = 'p',
        long = "parameter",
        value_name = "NAME=VALUE",
        value_parser = parse_assignment
    )]
    parameters: Vec<(String, String)>,
}

fn main() -> Result<()> {
    miette::set_panic_hook();
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let env = std::env::vars().collect::<BTreeMap<_, _>>();
    match cli.command {
        Command::Synth(args) => synth(args, &env),
        Command::Check(args) => check(args, &env),
        Command::Plan(args) => plan(args, &env),
    }
}

fn init_tracing(verbose: u8) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().into_diagnostic()?
    } else {
        let level = match verbose {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("error,sharr={level},sharr_={level}"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer().with_writer(std::io::stderr))
        .with(ErrorLayer::default())
        .init();

    Ok(())
}

fn parse_assignment(raw: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    if name.is_empty() {
        return Err(format!("missing name in `{raw}`"));
    }
    Ok((name.to_string(), value.to_string()))
}

fn parse_toggle(raw: &str) -> std::result::Result<(String, bool), String> {
    let (name, value) = parse_assignment(raw)?;
    match value.as_str() {
        YES => Ok((name, true)),
        NO => Ok((name, false)),
        other => Err(format!("toggle `{name}` must be `{YES}` or `{NO}`, got `{other}`")),
    }
}

fn load_solution(config: Option<&Path>, env: &BTreeMap<String, String>) -> Result<SolutionConfig> {
    tracing::debug!(config = ?config, "loading solution config");
    load_solution_config(config, env).wrap_err("failed to load solution config")
}

fn compose_member_stack(stack: &StackArgs, env: &BTreeMap<String, String>) -> Result<Document> {
    let solution = load_solution(stack.config.as_deref(), env)?;
    let toggles = stack.toggles.iter().cloned().collect::<BTreeMap<_, _>>();
    let doc = compose(&solution, &toggles, &[]).wrap_err("composition failed")?;
    Ok(doc)
}

fn synth(args: SynthArgs, env: &BTreeMap<String, String>) -> Result<()> {
    let doc = compose_member_stack(&args.stack, env)?;
    let mut rendered = serde_json::to_string_pretty(&doc).into_diagnostic()?;
    rendered.push('\n');

    match args.out {
        Some(path) => {
            fs::write(&path, rendered)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote template");
        }
        None => {
            std::io::stdout()
                .write_all(rendered.as_bytes())
                .into_diagnostic()?;
        }
    }
    Ok(())
}

fn read_template(path: &Path) -> Result<Document> {
    let source = fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&source)
        .into_diagnostic()
        .wrap_err_with(|| format!("{} is not JSON", path.display()))?;
    let doc = Document::from_json(&json)
        .wrap_err_with(|| format!("invalid template {}", path.display()))?;
    Ok(doc)
}

fn check(args: CheckArgs, env: &BTreeMap<String, String>) -> Result<()> {
    let source = fs::read_to_string(&args.assertions)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", args.assertions.display()))?;
    let name = args.assertions.display().to_string();
    let assertions = parse_assertions_named(&name, source.into())
        .wrap_err_with(|| format!("invalid assertion file {name}"))?;

    let doc = match &args.template {
        Some(path) => read_template(path)?,
        None => compose_member_stack(&args.stack, env)?,
    };

    let report = check_all(&doc, &assertions);
    let handler = GraphicalReportHandler::new();
    for failure in &report.failures {
        render_report(&handler, failure)?;
    }
    eprintln!(
        "{} of {} assertions passed",
        report.passed(),
        report.checked
    );

    if report.is_success() {
        Ok(())
    } else {
        Err(miette::miette!(
            "{} assertion(s) failed",
            report.failures.len()
        ))
    }
}

fn render_report(handler: &GraphicalReportHandler, diagnostic: &dyn Diagnostic) -> Result<()> {
    let mut out = String::new();
    handler
        .render_report(&mut out, diagnostic)
        .map_err(|_| miette::miette!("failed to render diagnostics"))?;
    eprint!("{out}");
    Ok(())
}

fn plan(args: PlanArgs, env: &BTreeMap<String, String>) -> Result<()> {
    let doc = compose_member_stack(&args.stack, env)?;

    let mut values = parameter_values_from_env(env);
    values.extend(args.parameters);
    let bindings = doc
        .bind(&values)
        .wrap_err("invalid deployment parameters")?;

    let mut out = String::new();
    out.push_str("parameters:\n");
    for (name, value) in bindings.iter() {
        out.push_str(&format!("  {name} = {value}\n"));
    }

    out.push_str("conditions:\n");
    for name in doc.conditions().keys() {
        let holds = doc
            .condition_holds(name.as_str(), &bindings)
            .wrap_err_with(|| format!("cannot evaluate condition `{name}`"))?;
        out.push_str(&format!("  {name} = {holds}\n"));
    }

    let active = doc.active_resources(&bindings)?;
    out.push_str("resources:\n");
    for resource in &active {
        out.push_str(&format!(
            "  {} ({})\n",
            resource.logical_id, resource.resource_type
        ));
    }

    out.push_str("nested stacks:\n");
    for resource in active
        .iter()
        .filter(|r| r.resource_type == "AWS::CloudFormation::Stack")
    {
        let Some(url) = resource.property("TemplateURL") else {
            continue;
        };
        let url = doc
            .resolve_string(url, &bindings)
            .wrap_err_with(|| format!("cannot resolve TemplateURL of `{}`", resource.logical_id))?;
        out.push_str(&format!("  {} {url}\n", resource.logical_id));
    }
    tracing::info!(
        active = active.len(),
        total = doc.resources().len(),
        "planned deployment"
    );

    std::io::stdout()
        .write_all(out.as_bytes())
        .into_diagnostic()?;
    Ok(())
}
