//! vacuum CLI - OpenAPI and AsyncAPI linter
//!
//! Lints a single document against a rule set and prints the results.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::{debug, info};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use vacuum::changes::{generate_change_violations, ChangeFilter, ChangeViolationOptions, DocumentChanges};
use vacuum::config::{ColorMode, Config, OutputFormat};
use vacuum::doctor::{DoctorDocument, NodeDoctor};
use vacuum::functions::FunctionRegistry;
use vacuum::index::HttpFetcher;
use vacuum::model::reports::{create_report_statistics, VacuumReport};
use vacuum::model::{Rule, RuleFunction, RuleResultSet, Severity};
use vacuum::motor::{apply_rules_to_rule_set, load_ignore_file, synthetic_rules, RuleSetExecution};
use vacuum::output::{formatter_for, LintReport};
use vacuum::rulesets::{create_rule_set_from_data, DefaultRuleSetLoader, RuleSet, RuleSets};
use vacuum::scripting::register_functions;
use vacuum::spec_info::SpecInfo;

#[derive(Parser)]
#[command(
    name = "vacuum",
    version,
    about = "OpenAPI linter",
    long_about = "A fast linter for OpenAPI and AsyncAPI documents, compatible with Spectral rule sets."
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint a document
    Lint(LintArgs),
    /// Render a saved vacuum report again
    Report {
        /// Report file (plain or gzipped JSON)
        report: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,

        /// Rule set used to re-attach rule details
        #[arg(short, long)]
        ruleset: Option<PathBuf>,
    },
    /// List registered functions
    Functions {
        /// Directory of JavaScript functions
        #[arg(long)]
        functions: Option<PathBuf>,
    },
    /// List compiled rules
    Rules {
        /// Rule set file
        #[arg(short, long)]
        ruleset: Option<PathBuf>,

        /// Directory of JavaScript functions
        #[arg(long)]
        functions: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct LintArgs {
    /// Document to lint
    spec: PathBuf,

    /// Rule set file
    #[arg(short, long)]
    ruleset: Option<PathBuf>,

    /// Directory of JavaScript functions
    #[arg(long)]
    functions: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Skip remote references and double the workers
    #[arg(long)]
    turbo: bool,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Deadline for the whole run in milliseconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Diff report; only results in changed regions are kept
    #[arg(long)]
    changes: Option<PathBuf>,

    /// Report changes themselves as violations (use with --changes)
    #[arg(long, requires = "changes")]
    changes_as_violations: bool,

    /// Only breaking changes become violations
    #[arg(long, requires = "changes")]
    breaking_only: bool,

    /// Ignore file (rule id -> JSONPaths)
    #[arg(long)]
    ignore_file: Option<PathBuf>,

    /// Write a gzipped vacuum report
    #[arg(long)]
    report: Option<PathBuf>,

    /// Exit non-zero on warnings
    #[arg(long)]
    fail_on_warn: bool,

    /// Show how-to-fix text and documentation links
    #[arg(short, long)]
    details: bool,

    /// Skip circular reference results
    #[arg(long)]
    skip_circular_references: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Spectral,
    Junit,
    Report,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
            Format::Spectral => OutputFormat::Spectral,
            Format::Junit => OutputFormat::Junit,
            Format::Report => OutputFormat::Report,
        }
    }
}

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }

    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load_default().context("failed to load default config")?,
    };
    if config.output.color == ColorMode::Never {
        colored::control::set_override(false);
    } else if config.output.color == ColorMode::Always {
        colored::control::set_override(true);
    }

    match &cli.command {
        Commands::Lint(args) => lint(args, config),
        Commands::Report {
            report,
            format,
            ruleset,
        } => replay(report, (*format).into(), ruleset.as_deref(), &config),
        Commands::Functions { functions } => {
            let registry = build_registry(functions.as_deref().or(config.rules.functions.as_deref()))?;
            let mut functions: Vec<_> = registry.iter().collect();
            functions.sort_by(|a, b| a.0.cmp(b.0));
            for (name, function) in functions {
                println!("  {} ({})", name.cyan(), function.category());
                let description = function.schema().description;
                if !description.is_empty() {
                    println!("      {}", description);
                }
            }
            Ok(0)
        }
        Commands::Rules { ruleset, functions } => {
            let mut config = config;
            if let Some(path) = ruleset {
                config.rules.ruleset = Some(path.clone());
            }
            let registry = build_registry(functions.as_deref().or(config.rules.functions.as_deref()))?;
            let rule_set = build_rule_set(&config, &registry)?;
            println!("{} rules\n", rule_set.rules.len());
            for rule in rule_set.sorted_rules() {
                print_rule(rule);
            }
            Ok(0)
        }
    }
}

/// Helper function to print a rule in a consistent format
fn print_rule(rule: &Rule) {
    let severity = match rule.severity {
        Severity::Error => "error".red(),
        Severity::Warn => "warn".yellow(),
        Severity::Info => "info".blue(),
        Severity::Hint => "hint".dimmed(),
    };
    let category = rule.category.as_ref().map(|c| c.id.as_str()).unwrap_or("-");
    println!("    {} [{}] ({})", rule.id.cyan(), severity, category);
    if !rule.description.is_empty() {
        println!("        {}", rule.description);
    }
}

fn build_registry(functions: Option<&Path>) -> Result<FunctionRegistry> {
    let mut registry = FunctionRegistry::builtin();
    if let Some(dir) = functions {
        let names = register_functions(&mut registry, dir)
            .with_context(|| format!("failed to load functions from {}", dir.display()))?;
        info!("loaded {} custom functions", names.len());
    }
    Ok(registry)
}

fn build_rule_set(config: &Config, registry: &FunctionRegistry) -> Result<RuleSet> {
    let mut rule_set = match &config.rules.ruleset {
        Some(path) => {
            let data = std::fs::read(path).with_context(|| format!("failed to read rule set {}", path.display()))?;
            let supplied = create_rule_set_from_data(&data)
                .with_context(|| format!("failed to parse rule set {}", path.display()))?;
            let sets = RuleSets::new().with_loader(Arc::new(DefaultRuleSetLoader::for_file(path)));
            let rule_set = sets
                .generate_rule_set_from_supplied(&supplied)
                .with_context(|| format!("failed to build rule set {}", path.display()))?;
            rule_set.validate(registry).context("rule set is not valid")?;
            rule_set
        }
        None => config.base_rule_set(&RuleSets::new()),
    };
    config.apply_rule_overrides(&mut rule_set);
    Ok(rule_set)
}

fn merge_cli(config: &mut Config, args: &LintArgs) {
    let mut cli = Config::new();
    cli.engine.jobs = args.jobs.unwrap_or(0);
    cli.engine.timeout_ms = args.timeout.unwrap_or(0);
    cli.engine.turbo = args.turbo;
    cli.engine.skip_circular_references = args.skip_circular_references;
    if let Some(format) = args.format {
        cli.output.format = format.into();
    }
    cli.output.details = args.details;
    cli.rules.ruleset = args.ruleset.clone();
    cli.rules.functions = args.functions.clone();
    cli.rules.ignore_file = args.ignore_file.clone();
    cli.filter.changes_file = args.changes.clone();
    cli.filter.breaking_only = args.breaking_only;
    cli.filter.changes_as_violations = args.changes_as_violations;
    config.merge(cli);
}

fn lint(args: &LintArgs, mut config: Config) -> Result<i32> {
    merge_cli(&mut config, args);
    let started = Instant::now();

    let registry = build_registry(config.rules.functions.as_deref())?;
    let rule_set = build_rule_set(&config, &registry)?;
    debug!("linting with {} rules", rule_set.rules.len());

    let spec = std::fs::read(&args.spec).with_context(|| format!("failed to read {}", args.spec.display()))?;
    let file_name = args.spec.display().to_string();
    let base_path = args.spec.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut execution = RuleSetExecution::new(rule_set, spec)
        .with_file_name(file_name.clone())
        .with_base_path(base_path)
        .with_functions(registry);
    execution = config.to_execution_options().apply(execution);
    if !config.engine.turbo {
        let fetcher = HttpFetcher::new().map_err(anyhow::Error::msg).context("failed to create HTTP client")?;
        execution = execution.with_remote_fetcher(Arc::new(fetcher));
    }
    if let Some(path) = &config.rules.ignore_file {
        let ignored = load_ignore_file(path).with_context(|| format!("failed to load ignore file {}", path.display()))?;
        execution = execution.with_ignored_items(ignored);
    }

    let outcome = apply_rules_to_rule_set(&execution);
    let mut results = outcome.results;

    if let Some(path) = &config.filter.changes_file {
        let changes = DocumentChanges::load(path).with_context(|| format!("failed to load changes {}", path.display()))?;
        let doctor = outcome
            .spec_info
            .clone()
            .and_then(|mut info| info.ensure_root().ok())
            .map(|root| Arc::new(NodeDoctor::new(&root)) as Arc<dyn DoctorDocument>);
        let filter = ChangeFilter::new(Some(&changes), doctor);
        let (kept, stats) = filter.filter_results_with_stats(results);
        info!(
            "change filter dropped {} of {} results ({}%)",
            stats.results_dropped,
            stats.total_results_before,
            stats.dropped_percentage()
        );
        results = kept;

        if config.filter.changes_as_violations {
            let options = ChangeViolationOptions {
                warn_on_changes: !config.filter.breaking_only,
                error_on_breaking: true,
            };
            results.extend(generate_change_violations(&changes, options));
        }
    }

    let result_set = RuleResultSet::new(results);
    let spec_info = outcome.spec_info.clone().map(|info| info.with_file_name(file_name.clone()));
    let statistics = match (&outcome.index, &spec_info) {
        (Some(index), Some(info)) => Some(create_report_statistics(index, info, &result_set)),
        _ => None,
    };

    let report = LintReport {
        file: &file_name,
        results: &result_set,
        errors: &outcome.errors,
        spec_info: spec_info.as_ref(),
        statistics: statistics.as_ref(),
        duration: started.elapsed(),
        fail_on_warn: args.fail_on_warn,
    };
    let colored = !matches!(config.output.color, ColorMode::Never);
    let formatter = formatter_for(config.output.format, colored, config.output.details);
    print!("{}", formatter.format(&report).context("failed to render results")?);

    if let Some(path) = &args.report {
        let report = VacuumReport::new(spec_info.clone().unwrap_or_default(), statistics, result_set.clone());
        report
            .write_gzip(path)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        info!("report written to {}", path.display());
    }

    if outcome.cancelled {
        bail!("lint run did not finish before the deadline");
    }
    Ok(result_set.exit_code(args.fail_on_warn))
}

fn replay(path: &Path, format: OutputFormat, ruleset: Option<&Path>, config: &Config) -> Result<i32> {
    let mut config = config.clone();
    if let Some(ruleset) = ruleset {
        config.rules.ruleset = Some(ruleset.to_path_buf());
    }
    let registry = build_registry(config.rules.functions.as_deref())?;
    let rule_set = match build_rule_set(&config, &registry) {
        Ok(rule_set) => rule_set,
        Err(e) if ruleset.is_none() => {
            debug!("replaying without rule details: {:#}", e);
            RuleSet::default()
        }
        Err(e) => return Err(e),
    };
    let mut rules: HashMap<String, Arc<Rule>> = rule_set
        .rules
        .into_iter()
        .map(|(id, rule)| (id, Arc::new(rule)))
        .collect();
    for rule in synthetic_rules() {
        rules.entry(rule.id.clone()).or_insert_with(|| Arc::new(rule));
    }

    let report = VacuumReport::load_file(path, &rules).with_context(|| format!("failed to load report {}", path.display()))?;
    let file = report
        .spec_info
        .file_name
        .clone()
        .unwrap_or_else(|| path.display().to_string());
    let spec_info: SpecInfo = report.spec_info.clone();
    let lint_report = LintReport {
        file: &file,
        results: &report.result_set,
        errors: &[],
        spec_info: Some(&spec_info),
        statistics: report.statistics.as_ref(),
        duration: std::time::Duration::ZERO,
        fail_on_warn: false,
    };
    let colored = !matches!(config.output.color, ColorMode::Never);
    let formatter = formatter_for(format, colored, config.output.details);
    print!("{}", formatter.format(&lint_report).context("failed to render report")?);
    Ok(report.result_set.exit_code(false))
}
