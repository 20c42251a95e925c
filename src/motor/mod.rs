//! Rule execution
//!
//! Applies a compiled rule set to a document. The document is sniffed,
//! indexed and resolved once. Every rule's `given` paths are matched against
//! it and each (rule, action, node) triple becomes a job for a worker pool.
//! Jobs report over a bounded channel to a single collector, which fills in
//! rule metadata, drops duplicates, applies inline ignores and keeps per-rule
//! timings.

pub mod ignore;

pub use ignore::{
    filter_ignored_results, is_ignored, load_ignore_file, parse_ignored_items, IgnoreError,
    IgnoredItems, InlineIgnores, IGNORE_KEY,
};

use crate::doctor::{DoctorDocument, NodeDoctor};
use crate::functions::FunctionRegistry;
use crate::index::{FileReader, IndexConfig, RemoteFetcher, RemoteSources, SpecIndex};
use crate::jsonpath::JsonPathCache;
use crate::model::category::{CATEGORY_SCHEMAS, CATEGORY_VALIDATION};
use crate::model::{
    validate_options, Rule, RuleAction, RuleFunction, RuleFunctionContext, RuleFunctionResult,
    RuleResultSet, Severity,
};
use crate::node::{end_node, parse_document, Node, NodeRef};
use crate::resolver::Resolver;
use crate::rulesets::RuleSet;
use crate::spec_info::{extract_spec_info, FileType, SpecInfo, SpecInfoError};
use dashmap::DashMap;
use log::{debug, warn};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_RULE_TIMEOUT: Duration = Duration::from_secs(5);

pub const RESOLVING_REFERENCES: &str = "resolving-references";
pub const CIRCULAR_REFERENCES: &str = "circular-references";
pub const BUILD_INDEX: &str = "build-index";

const CIRCULAR_REFERENCES_FIX: &str = "Circular references are created by schemas that reference back to themselves somewhere \
in the chain. The link could be very deep, or it could be super shallow. Sometimes it's hard to know what is looping \
without resolving the references. This model is looping, remove the looping link in the chain. This can also appear with missing \
references, or references that cannot be located or resolved correctly.";

static PATHS: Lazy<JsonPathCache> = Lazy::new(JsonPathCache::new);

/// A rule that could not run, as opposed to a violation it found
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{rule_id}: {message}")]
pub struct ExecutionError {
    pub rule_id: String,
    pub message: String,
}

impl ExecutionError {
    pub fn new(rule_id: &str, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            message: message.into(),
        }
    }
}

/// Shared flag that stops an execution from dispatching more jobs
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-rule timing statistics
#[derive(Debug, Clone, Default)]
pub struct RuleTiming {
    pub rule_id: String,
    pub total_time: Duration,
    /// Function invocations
    pub evaluation_count: usize,
    /// Results produced
    pub match_count: usize,
}

impl RuleTiming {
    pub fn new(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            ..Default::default()
        }
    }

    pub fn avg_time(&self) -> Duration {
        if self.evaluation_count > 0 {
            self.total_time / self.evaluation_count as u32
        } else {
            Duration::ZERO
        }
    }
}

/// How to apply a rule set to a spec
#[derive(Clone)]
pub struct RuleSetExecution {
    pub rule_set: Arc<RuleSet>,
    pub spec: Arc<[u8]>,
    pub spec_file_name: Option<String>,
    /// Directory relative file references resolve against. Defaults to the
    /// spec file's directory.
    pub base_path: Option<PathBuf>,
    pub functions: Arc<FunctionRegistry>,
    /// Worker count, 0 for one per CPU
    pub jobs: usize,
    /// No remote lookups, twice the workers, no per-invocation logging
    pub turbo: bool,
    pub silent: bool,
    pub skip_circular_references: bool,
    /// Lint documents that are not recognised as OpenAPI or AsyncAPI
    pub skip_document_check: bool,
    /// Deadline for the whole execution
    pub timeout: Option<Duration>,
    pub rule_timeout: Duration,
    pub remote_fetcher: Option<Arc<dyn RemoteFetcher>>,
    pub file_reader: Option<Arc<dyn FileReader>>,
    pub remote_sources: Option<Arc<RemoteSources>>,
    pub ignored_items: Option<Arc<IgnoredItems>>,
    pub cancellation: CancellationToken,
}

impl RuleSetExecution {
    pub fn new(rule_set: RuleSet, spec: impl AsRef<[u8]>) -> Self {
        Self {
            rule_set: Arc::new(rule_set),
            spec: Arc::from(spec.as_ref()),
            spec_file_name: None,
            base_path: None,
            functions: Arc::new(FunctionRegistry::builtin()),
            jobs: 0,
            turbo: false,
            silent: false,
            skip_circular_references: false,
            skip_document_check: false,
            timeout: None,
            rule_timeout: DEFAULT_RULE_TIMEOUT,
            remote_fetcher: None,
            file_reader: None,
            remote_sources: None,
            ignored_items: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.spec_file_name = Some(name.into());
        self
    }

    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = Arc::new(functions);
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn turbo(mut self) -> Self {
        self.turbo = true;
        self.silent = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn skip_circular_references(mut self) -> Self {
        self.skip_circular_references = true;
        self
    }

    pub fn skip_document_check(mut self) -> Self {
        self.skip_document_check = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_rule_timeout(mut self, timeout: Duration) -> Self {
        self.rule_timeout = timeout;
        self
    }

    pub fn with_remote_fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.remote_fetcher = Some(fetcher);
        self
    }

    pub fn with_file_reader(mut self, reader: Arc<dyn FileReader>) -> Self {
        self.file_reader = Some(reader);
        self
    }

    pub fn with_remote_sources(mut self, sources: Arc<RemoteSources>) -> Self {
        self.remote_sources = Some(sources);
        self
    }

    pub fn with_ignored_items(mut self, ignored: IgnoredItems) -> Self {
        self.ignored_items = Some(Arc::new(ignored));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    fn workers(&self) -> usize {
        let base = if self.jobs > 0 { self.jobs } else { num_cpus::get() };
        if self.turbo {
            base * 2
        } else {
            base
        }
    }

    fn index_config(&self) -> IndexConfig {
        let mut config = IndexConfig::default();
        let base = self.base_path.clone().or_else(|| {
            self.spec_file_name
                .as_deref()
                .and_then(|name| Path::new(name).parent())
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(Path::to_path_buf)
        });
        if let Some(base) = base {
            config = config.with_base_path(base);
        }
        if let Some(fetcher) = &self.remote_fetcher {
            config = config.with_remote_fetcher(Arc::clone(fetcher));
        }
        if let Some(reader) = &self.file_reader {
            config = config.with_file_reader(Arc::clone(reader));
        }
        if let Some(sources) = &self.remote_sources {
            config = config.with_remote_sources(Arc::clone(sources));
        }
        config.skip_circular_references = self.skip_circular_references;
        if self.turbo {
            config = config.turbo();
        }
        config
    }
}

/// What an execution produced
#[derive(Default)]
pub struct RuleSetExecutionResult {
    /// Sorted by line, then rule id
    pub results: Vec<RuleFunctionResult>,
    /// Results silenced by `x-lint-ignore` or an ignore file
    pub ignored_results: Vec<RuleFunctionResult>,
    pub index: Option<Arc<SpecIndex>>,
    pub spec_info: Option<SpecInfo>,
    pub errors: Vec<ExecutionError>,
    /// Stopped early by the deadline or the cancellation token
    pub cancelled: bool,
    pub rule_timings: HashMap<String, RuleTiming>,
    pub duration: Duration,
}

impl std::fmt::Debug for RuleSetExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSetExecutionResult")
            .field("results", &self.results.len())
            .field("ignored_results", &self.ignored_results.len())
            .field("errors", &self.errors)
            .field("cancelled", &self.cancelled)
            .field("duration", &self.duration)
            .finish()
    }
}

impl RuleSetExecutionResult {
    /// A result set over a copy of the results
    pub fn result_set(&self) -> RuleResultSet {
        RuleResultSet::new(self.results.clone())
    }

    pub fn into_result_set(self) -> RuleResultSet {
        RuleResultSet::new(self.results)
    }

    /// Timings, slowest first
    pub fn sorted_timings(&self) -> Vec<&RuleTiming> {
        let mut timings: Vec<_> = self.rule_timings.values().collect();
        timings.sort_by(|a, b| b.total_time.cmp(&a.total_time).then_with(|| a.rule_id.cmp(&b.rule_id)));
        timings
    }
}

fn synthetic_rule(id: &str, name: &str, description: &str, category: &str, severity: Severity, fix: &str) -> Rule {
    Rule::new(id)
        .with_name(name)
        .with_description(description)
        .with_given("$")
        .with_then(RuleAction::new("blank"))
        .with_category(category)
        .with_severity(severity)
        .with_how_to_fix(fix)
        .recommended()
}

/// Reported for every reference that cannot be located or stitched in
pub fn resolving_references_rule() -> Rule {
    synthetic_rule(
        RESOLVING_REFERENCES,
        "Check references can be resolved correctly",
        "$ref values must be resolvable and locatable within a local or remote document.",
        CATEGORY_SCHEMAS,
        Severity::Error,
        &format!(
            "Ensure that all $ref values are resolvable and locatable within a local or remote document. {}",
            CIRCULAR_REFERENCES_FIX
        ),
    )
}

pub fn circular_references_rule() -> Rule {
    synthetic_rule(
        CIRCULAR_REFERENCES,
        "Circular References",
        "Circular reference detected",
        CATEGORY_SCHEMAS,
        Severity::Warn,
        CIRCULAR_REFERENCES_FIX,
    )
    .with_message("Circular reference detected")
    .unresolved()
}

pub fn build_index_rule() -> Rule {
    synthetic_rule(
        BUILD_INDEX,
        "Check that an index can be created from the document",
        "vacuum must be able to index the document, if it cannot then it cannot be linted",
        CATEGORY_VALIDATION,
        Severity::Error,
        "An index is required to use vacuum. If an index cannot be created then the file cannot be read, or the \
         OpenAPI version is not supported. Check your version of OpenAPI to start and if that looks correct, check \
         the syntax of the document.",
    )
    .unresolved()
}

/// The rules behind synthetic results, for re-attaching by id
pub fn synthetic_rules() -> Vec<Rule> {
    vec![resolving_references_rule(), circular_references_rule(), build_index_rule()]
}

fn first_line_node() -> NodeRef {
    Node::string("").with_position(1, 1).into_ref()
}

fn synthetic_result(rule: &Arc<Rule>, message: String, start: Option<&NodeRef>, path: String) -> RuleFunctionResult {
    let result = RuleFunctionResult::new(message).with_path(path).with_rule(rule);
    match start {
        Some(node) => result.with_node(node),
        None => {
            let node = first_line_node();
            result.with_nodes(&node, &node)
        }
    }
}

/// Parse failure of the whole document
fn build_index_result() -> RuleFunctionResult {
    let rule = Arc::new(build_index_rule());
    let start = Node::string("").with_position(1, 1).into_ref();
    let end = Node::string("").with_position(1, 2).into_ref();
    RuleFunctionResult::new(
        "unable to parse the document, no index was created, check the syntax or version of the document.",
    )
    .with_path("$")
    .with_rule(&rule)
    .with_nodes(&start, &end)
}

/// Results for references the index or resolver could not handle
fn reference_results(index: &SpecIndex, resolver: &Resolver<'_>, skip_circular: bool) -> Vec<RuleFunctionResult> {
    let resolving = Arc::new(resolving_references_rule());
    let circular = Arc::new(circular_references_rule());
    let mut results = Vec::new();

    for error in index.ref_errors() {
        let mut result = synthetic_result(&resolving, error.message.clone(), error.node.as_ref(), error.path.clone());
        if let Some(key) = &error.key_node {
            result.end_node = Some(end_node(key));
        }
        results.push(result);
    }
    for error in resolver.errors().iter().filter(|e| !e.circular) {
        results.push(synthetic_result(&resolving, error.message.clone(), error.node.as_ref(), error.path.clone()));
    }

    if !skip_circular {
        let mut seen = HashSet::new();
        for found in index.circular_references().iter().chain(resolver.circular_references()) {
            if !seen.insert(found.start.definition.clone()) {
                continue;
            }
            results.push(synthetic_result(
                &circular,
                format!("circular reference detected from {}", found.start.definition),
                found.parent_node.as_ref(),
                found.generate_journey_path(),
            ));
        }
    }
    results
}

/// Sniff the spec. Unknown document types are still linted when the
/// document check is skipped.
fn sniff(execution: &RuleSetExecution) -> Result<SpecInfo, SpecInfoError> {
    let info = match extract_spec_info(&execution.spec) {
        Ok(info) => info,
        Err(SpecInfoError::Parse(message)) => return Err(SpecInfoError::Parse(message)),
        Err(error) if execution.skip_document_check => {
            debug!("document check skipped: {}", error);
            let text = String::from_utf8_lossy(&execution.spec).to_string();
            let trimmed = text.trim();
            let file_type = if trimmed.starts_with('{') && trimmed.ends_with('}') {
                FileType::Json
            } else {
                FileType::Yaml
            };
            let root = parse_document(&text)?;
            SpecInfo {
                file_type,
                spec: Arc::from(text.as_str()),
                root_node: Some(root),
                ..SpecInfo::default()
            }
        }
        Err(error) => return Err(error),
    };
    Ok(match &execution.spec_file_name {
        Some(name) => info.with_file_name(name.clone()),
        None => info,
    })
}

/// One function invocation
struct Job {
    rule: usize,
    function: Arc<dyn RuleFunction>,
    context: Arc<RuleFunctionContext>,
    node: NodeRef,
    path: String,
}

struct JobOutcome {
    rule: usize,
    elapsed: Duration,
    results: Result<Vec<RuleFunctionResult>, String>,
}

/// Everything jobs share
struct Documents {
    index: Arc<SpecIndex>,
    resolved: NodeRef,
    unresolved: NodeRef,
    info: Arc<SpecInfo>,
    doctor: Arc<dyn DoctorDocument>,
    schema_path_cache: Arc<DashMap<String, Vec<String>>>,
}

/// Expand the rule set into jobs. Rules that cannot run are reported and
/// skipped.
fn plan(
    execution: &RuleSetExecution,
    rules: &[Arc<Rule>],
    documents: &Documents,
) -> (Vec<Job>, Vec<ExecutionError>) {
    let mut jobs = Vec::new();
    let mut errors = Vec::new();
    let format = documents.info.format();

    'rules: for (position, rule) in rules.iter().enumerate() {
        if !rule.matches_format(format) {
            debug!("rule '{}' does not apply to this document format", rule.id);
            continue;
        }

        let mut paths = Vec::new();
        for given in rule.given.paths() {
            match PATHS.get_or_compile(given) {
                Ok(path) => paths.push(path),
                Err(e) => {
                    errors.push(ExecutionError::new(&rule.id, e.to_string()));
                    continue 'rules;
                }
            }
        }

        let document = if rule.resolved {
            &documents.resolved
        } else {
            &documents.unresolved
        };
        let matches: Vec<_> = paths
            .iter()
            .flat_map(|path| path.query(document))
            .filter(|m| !ignore::is_ignore_key_path(&m.path))
            .collect();
        if matches.is_empty() {
            continue;
        }

        for action in rule.then.actions() {
            let Some(function) = execution.functions.find(&action.function) else {
                errors.push(ExecutionError::new(
                    &rule.id,
                    format!("unknown function '{}'", action.function),
                ));
                continue;
            };
            let options = action.options();
            if let Err(problems) = validate_options(&function.schema(), &options, action) {
                errors.push(ExecutionError::new(
                    &rule.id,
                    format!("invalid options for function '{}': {}", action.function, problems.join("; ")),
                ));
                continue;
            }

            let mut context = RuleFunctionContext::new(Arc::clone(rule))
                .with_action(action.clone())
                .with_index(Arc::clone(&documents.index))
                .with_document(Arc::clone(document))
                .with_spec_info(Arc::clone(&documents.info))
                .with_doctor(Arc::clone(&documents.doctor));
            context.schema_path_cache = Arc::clone(&documents.schema_path_cache);
            context.silent = execution.silent;
            let context = Arc::new(context);

            for found in &matches {
                jobs.push(Job {
                    rule: position,
                    function: Arc::clone(&function),
                    context: Arc::clone(&context),
                    node: Arc::clone(&found.node),
                    path: found.path.clone(),
                });
            }
        }
    }
    (jobs, errors)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_job(job: &Job) -> JobOutcome {
    let context = (*job.context).clone().with_given(&job.path);
    if !context.silent {
        debug!("running '{}' at {}", context.rule.id, job.path);
    }
    let nodes = [Arc::clone(&job.node)];
    let started = Instant::now();
    let results = catch_unwind(AssertUnwindSafe(|| job.function.run_rule(&nodes, &context)))
        .map_err(|payload| panic_message(payload.as_ref()));
    JobOutcome {
        rule: job.rule,
        elapsed: started.elapsed(),
        results,
    }
}

/// The single owner of everything produced by the workers
struct Collector<'a> {
    rules: &'a [Arc<Rule>],
    timed_out: &'a [AtomicBool],
    rule_timeout: Duration,
    spent: Vec<Duration>,
    results: Vec<RuleFunctionResult>,
    errors: Vec<ExecutionError>,
    timings: HashMap<String, RuleTiming>,
}

impl<'a> Collector<'a> {
    fn new(
        rules: &'a [Arc<Rule>],
        timed_out: &'a [AtomicBool],
        rule_timeout: Duration,
    ) -> Self {
        Self {
            rules,
            timed_out,
            rule_timeout,
            spent: vec![Duration::ZERO; rules.len()],
            results: Vec::new(),
            errors: Vec::new(),
            timings: HashMap::new(),
        }
    }

    fn drain(mut self, outcomes: Receiver<JobOutcome>) -> Self {
        for outcome in outcomes {
            self.accept_outcome(outcome);
        }
        self
    }

    fn accept_outcome(&mut self, outcome: JobOutcome) {
        let rules = self.rules;
        let rule = &rules[outcome.rule];
        if self.timed_out[outcome.rule].load(Ordering::SeqCst) {
            return;
        }
        self.spent[outcome.rule] += outcome.elapsed;
        let timing = self
            .timings
            .entry(rule.id.clone())
            .or_insert_with(|| RuleTiming::new(&rule.id));
        timing.total_time += outcome.elapsed;
        timing.evaluation_count += 1;

        if !self.rule_timeout.is_zero() && self.spent[outcome.rule] > self.rule_timeout {
            self.timed_out[outcome.rule].store(true, Ordering::SeqCst);
            warn!("rule '{}' timed out, skipping it", rule.id);
            self.errors.push(ExecutionError::new(
                &rule.id,
                format!("rule '{}' timed out after {}ms", rule.id, self.rule_timeout.as_millis()),
            ));
            return;
        }

        match outcome.results {
            Ok(results) => {
                timing.match_count += results.len();
                let rule = Arc::clone(rule);
                for result in results {
                    self.accept(result, &rule);
                }
            }
            Err(message) => {
                self.errors.push(ExecutionError::new(
                    &rule.id,
                    format!("rule function panicked: {}", message),
                ));
            }
        }
    }

    /// Fill in the rule and keep the result. Duplicates are dropped once
    /// everything is sorted.
    fn accept(&mut self, mut result: RuleFunctionResult, rule: &Arc<Rule>) {
        if result.rule.is_none() {
            result.rule = Some(Arc::clone(rule));
            result.rule_severity = rule.severity;
        }
        if result.rule_id.is_empty() {
            result.rule_id = result.effective_rule_id().to_string();
        }
        self.results.push(result);
    }
}

fn same_location(a: &RuleFunctionResult, b: &RuleFunctionResult) -> bool {
    a.start_line() == b.start_line()
        && a.start_column() == b.start_column()
        && a.effective_rule_id() == b.effective_rule_id()
        && a.path == b.path
}

/// Sort, then keep the first of every run of results sharing rule, path,
/// line and column. The survivor is the same whatever order the workers
/// finished in.
fn sort_and_dedup(results: &mut Vec<RuleFunctionResult>) {
    sort_results(results);
    results.dedup_by(|later, earlier| same_location(later, earlier));
}

/// Line, then rule id; the rest makes the order total
fn sort_results(results: &mut [RuleFunctionResult]) {
    results.sort_by(|a, b| {
        a.start_line()
            .cmp(&b.start_line())
            .then_with(|| a.effective_rule_id().cmp(b.effective_rule_id()))
            .then_with(|| a.start_column().cmp(&b.start_column()))
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.message.cmp(&b.message))
    });
}

/// Apply `execution.rule_set` to `execution.spec`
pub fn apply_rules_to_rule_set(execution: &RuleSetExecution) -> RuleSetExecutionResult {
    let started = Instant::now();
    let deadline = execution.timeout.map(|t| started + t);
    let mut outcome = RuleSetExecutionResult::default();

    let info = match sniff(execution) {
        Ok(info) => info,
        Err(error) => {
            if matches!(error, SpecInfoError::Parse(_)) {
                outcome.results.push(build_index_result());
            }
            outcome.errors.push(ExecutionError::new(BUILD_INDEX, error.to_string()));
            outcome.duration = started.elapsed();
            return outcome;
        }
    };
    let Some(unresolved) = info.root_node.clone() else {
        outcome.results.push(build_index_result());
        outcome.duration = started.elapsed();
        return outcome;
    };

    let index = Arc::new(SpecIndex::new(&unresolved, execution.index_config()));
    let mut resolver = Resolver::new(&index);
    let resolved = resolver.resolve();
    let reference_results = reference_results(&index, &resolver, execution.skip_circular_references);
    drop(resolver);
    debug!(
        "indexed and resolved document in {}ms",
        started.elapsed().as_millis()
    );

    let documents = Documents {
        index: Arc::clone(&index),
        doctor: Arc::new(NodeDoctor::new(&resolved)),
        resolved,
        unresolved: Arc::clone(&unresolved),
        info: Arc::new(info),
        schema_path_cache: Arc::new(DashMap::new()),
    };
    let inline = InlineIgnores::collect(&unresolved);

    let rules: Vec<Arc<Rule>> = execution
        .rule_set
        .rules
        .iter()
        .map(|(id, rule)| {
            let mut rule = rule.clone();
            if rule.id.is_empty() {
                rule.id = id.clone();
            }
            Arc::new(rule)
        })
        .collect();
    let (jobs, plan_errors) = plan(execution, &rules, &documents);
    let workers = execution.workers().max(1);
    debug!("running {} jobs for {} rules on {} workers", jobs.len(), rules.len(), workers);

    let timed_out: Vec<AtomicBool> = rules.iter().map(|_| AtomicBool::new(false)).collect();
    let expired = AtomicBool::new(false);
    let pool = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!("unable to build worker pool, using the global pool: {}", e);
            None
        }
    };

    let (sender, receiver) = sync_channel::<JobOutcome>(workers * 2);
    let mut collector = Collector::new(&rules, &timed_out, execution.rule_timeout);
    for result in reference_results {
        let rule = result.rule.clone().unwrap_or_else(|| Arc::new(resolving_references_rule()));
        collector.accept(result, &rule);
    }

    let collector = thread::scope(|scope| {
        let (jobs, timed_out, expired, pool) = (&jobs, &timed_out, &expired, &pool);
        let cancellation = &execution.cancellation;
        scope.spawn(move || {
            let dispatch = move || {
                jobs.par_iter().for_each_with(sender, |sender, job| {
                    if cancellation.is_cancelled() || expired.load(Ordering::SeqCst) {
                        return;
                    }
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        expired.store(true, Ordering::SeqCst);
                        return;
                    }
                    if timed_out[job.rule].load(Ordering::SeqCst) {
                        return;
                    }
                    // the collector only stops once every sender is gone
                    let _ = sender.send(run_job(job));
                });
            };
            match pool {
                Some(pool) => pool.install(dispatch),
                None => dispatch(),
            }
        });
        collector.drain(receiver)
    });

    let mut errors = plan_errors;
    errors.extend(collector.errors);
    let mut collected = collector.results;
    sort_and_dedup(&mut collected);
    let (mut ignored, mut results): (Vec<_>, Vec<_>) = collected
        .into_iter()
        .partition(|r| inline.ignores(&r.rule_id, &r.path));
    if let Some(items) = &execution.ignored_items {
        let (dropped, kept): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| is_ignored(r, items));
        results = kept;
        ignored.extend(dropped);
    }
    sort_results(&mut results);
    sort_results(&mut ignored);

    outcome.results = results;
    outcome.ignored_results = ignored;
    outcome.errors = errors;
    outcome.rule_timings = collector.timings;
    outcome.cancelled = execution.cancellation.is_cancelled() || expired.load(Ordering::SeqCst);
    outcome.spec_info = Some((*documents.info).clone());
    outcome.index = Some(index);
    outcome.duration = started.elapsed();
    debug!(
        "applied {} rules in {}ms: {} results, {} errors",
        rules.len(),
        outcome.duration.as_millis(),
        outcome.results.len(),
        outcome.errors.len()
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FunctionSchema, RuleFunction};
    use crate::rulesets::{create_rule_set_from_rule_map, RuleSets};
    use indexmap::IndexMap;
    use serde_json::json;
    use pretty_assertions::assert_eq;

    const SPEC: &str = "openapi: 3.0.1
info:
  title: pets
  version: 1.0.0
paths:
  /pets:
    get:
      operationId: listPets
      responses:
        '200':
          description: ok
          content:
            application/json:
              schema:
                $ref: '#/components/schemas/Pet'
components:
  schemas:
    Pet:
      type: object
      properties:
        name:
          type: string
";

    fn rule_set(rules: Vec<Rule>) -> RuleSet {
        let map: IndexMap<String, Rule> = rules.into_iter().map(|r| (r.id.clone(), r)).collect();
        create_rule_set_from_rule_map(map)
    }

    fn info_description() -> Rule {
        Rule::new("info-description")
            .with_description("Info section is missing a description")
            .with_given("$.info")
            .with_then(RuleAction::new("truthy").with_field("description"))
            .with_severity(Severity::Error)
            .with_category("info")
    }

    fn run(rules: Vec<Rule>, spec: &str) -> RuleSetExecutionResult {
        apply_rules_to_rule_set(&RuleSetExecution::new(rule_set(rules), spec).with_jobs(2))
    }

    struct Panics;

    impl RuleFunction for Panics {
        fn run_rule(&self, _: &[NodeRef], _: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
            panic!("boom")
        }

        fn schema(&self) -> FunctionSchema {
            FunctionSchema::new("panics")
        }
    }

    struct Slow;

    impl RuleFunction for Slow {
        fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
            thread::sleep(Duration::from_millis(30));
            nodes
                .iter()
                .map(|n| RuleFunctionResult::new("slow").with_node(n).with_path(context.given.clone()))
                .collect()
        }

        fn schema(&self) -> FunctionSchema {
            FunctionSchema::new("slow")
        }
    }

    /// Reports `message` from its options after sleeping `sleep` ms
    struct Tagged;

    impl RuleFunction for Tagged {
        fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
            let sleep = context.options.get("sleep").and_then(|v| v.as_u64()).unwrap_or(0);
            thread::sleep(Duration::from_millis(sleep));
            let message = context.options.get("message").and_then(|v| v.as_str()).unwrap_or_default();
            nodes
                .iter()
                .map(|n| RuleFunctionResult::new(message).with_node(n).with_path(context.given.clone()))
                .collect()
        }

        fn schema(&self) -> FunctionSchema {
            FunctionSchema::new("tagged")
        }
    }

    #[test]
    fn test_applies_rules() {
        let outcome = run(vec![info_description()], SPEC);
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.results.len(), 1);
        let result = &outcome.results[0];
        assert_eq!(result.rule_id, "info-description");
        assert_eq!(result.path, "$.info.description");
        assert_eq!(result.severity(), Severity::Error);
        // a block mapping starts at its first key
        assert_eq!(result.start_line(), 3);
        assert_eq!(outcome.rule_timings["info-description"].evaluation_count, 1);
        assert!(outcome.index.is_some());
        assert_eq!(outcome.spec_info.as_ref().unwrap().version, "3.0.1");
    }

    #[test]
    fn test_overlapping_givens_are_deduplicated() {
        let rule = info_description().with_givens(&["$.info", "$['info']"]);
        let outcome = run(vec![rule], SPEC);
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn test_duplicate_survivor_ignores_finish_order() {
        let mut functions = FunctionRegistry::builtin();
        functions.register("tagged", Arc::new(Tagged));
        for (first_sleep, second_sleep) in [(40, 0), (0, 40), (20, 5)] {
            let rule = Rule::new("twice").with_given("$.info").with_then(vec![
                RuleAction::new("tagged").with_options(json!({ "message": "first", "sleep": first_sleep })),
                RuleAction::new("tagged").with_options(json!({ "message": "second", "sleep": second_sleep })),
            ]);
            let execution = RuleSetExecution::new(rule_set(vec![rule]), SPEC)
                .with_functions(functions.clone())
                .with_jobs(4);
            let outcome = apply_rules_to_rule_set(&execution);
            assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
            let messages: Vec<&str> = outcome.results.iter().map(|r| r.message.as_str()).collect();
            assert_eq!(messages, vec!["first"]);
        }
    }

    #[test]
    fn test_format_gate() {
        let rule = info_description().with_formats(&[crate::spec_info::Format::Oas2]);
        assert!(run(vec![rule], SPEC).results.is_empty());
    }

    #[test]
    fn test_unknown_function_and_missing_field() {
        let unknown = Rule::new("unknown")
            .with_given("$.info")
            .with_then(RuleAction::new("nope"));
        let needs_field = Rule::new("needs-field")
            .with_given("$.info")
            .with_then(RuleAction::new("defined"));
        let outcome = run(vec![unknown, needs_field, info_description()], SPEC);
        assert_eq!(outcome.results.len(), 1);
        let ids: Vec<&str> = outcome.errors.iter().map(|e| e.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["unknown", "needs-field"]);
        assert_eq!(outcome.errors[0].message, "unknown function 'nope'");
        assert!(outcome.errors[1].message.contains("requires a 'field' value"));
    }

    #[test]
    fn test_bad_given_is_reported() {
        let rule = info_description().with_given("info[");
        let outcome = run(vec![rule], SPEC);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].rule_id, "info-description");
    }

    #[test]
    fn test_panics_become_errors() {
        let mut functions = FunctionRegistry::builtin();
        functions.register("panics", Arc::new(Panics));
        let rule = Rule::new("explodes").with_given("$").with_then(RuleAction::new("panics"));
        let execution = RuleSetExecution::new(rule_set(vec![rule, info_description()]), SPEC).with_functions(functions);
        let outcome = apply_rules_to_rule_set(&execution);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].message, "rule function panicked: boom");
    }

    #[test]
    fn test_rule_timeout() {
        let mut functions = FunctionRegistry::builtin();
        functions.register("slow", Arc::new(Slow));
        let rule = Rule::new("slow-rule").with_given("$.info").with_then(RuleAction::new("slow"));
        let execution = RuleSetExecution::new(rule_set(vec![rule]), SPEC)
            .with_functions(functions)
            .with_rule_timeout(Duration::from_millis(10));
        let outcome = apply_rules_to_rule_set(&execution);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].message, "rule 'slow-rule' timed out after 10ms");
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let execution = RuleSetExecution::new(rule_set(vec![info_description()]), SPEC).with_cancellation(token);
        let outcome = apply_rules_to_rule_set(&execution);
        assert!(outcome.cancelled);
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn test_inline_ignore() {
        let spec = SPEC.replace("  title: pets\n", "  title: pets\n  x-lint-ignore: info-description\n");
        let outcome = run(vec![info_description()], &spec);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.ignored_results.len(), 1);
    }

    #[test]
    fn test_ignore_file() {
        let mut ignored = IgnoredItems::new();
        ignored.insert("info-description".to_string(), vec!["$.info.description".to_string()]);
        let execution = RuleSetExecution::new(rule_set(vec![info_description()]), SPEC).with_ignored_items(ignored);
        let outcome = apply_rules_to_rule_set(&execution);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.ignored_results.len(), 1);
    }

    #[test]
    fn test_reference_problems() {
        let spec = "openapi: 3.0.1
info:
  title: loops
  version: 1.0.0
paths: {}
components:
  schemas:
    A:
      type: object
      properties:
        b:
          $ref: '#/components/schemas/B'
    B:
      type: object
      properties:
        a:
          $ref: '#/components/schemas/A'
        c:
          $ref: '#/components/schemas/Missing'
";
        let outcome = run(Vec::new(), spec);
        let ids: Vec<&str> = outcome.results.iter().map(|r| r.rule_id.as_str()).collect();
        assert!(ids.contains(&CIRCULAR_REFERENCES), "{:?}", ids);
        assert!(ids.contains(&RESOLVING_REFERENCES), "{:?}", ids);
        let circular = outcome.results.iter().find(|r| r.rule_id == CIRCULAR_REFERENCES).unwrap();
        assert!(circular.message.starts_with("circular reference detected from #/components/schemas/"));

        let skipped = apply_rules_to_rule_set(&RuleSetExecution::new(rule_set(Vec::new()), spec).skip_circular_references());
        assert!(skipped.results.iter().all(|r| r.rule_id != CIRCULAR_REFERENCES));
    }

    #[test]
    fn test_unparseable_document() {
        let outcome = run(vec![info_description()], "openapi: [3.0\ninfo: {");
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].rule_id, BUILD_INDEX);
        assert_eq!(outcome.errors.len(), 1);

        let outcome = run(vec![info_description()], "title: not a spec\n");
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.errors[0].message, "spec type not supported by vacuum, sorry");
    }

    #[test]
    fn test_skip_document_check() {
        let rule = Rule::new("title").with_given("$").with_then(RuleAction::new("truthy").with_field("summary"));
        let execution = RuleSetExecution::new(rule_set(vec![rule]), "title: fragment\n").skip_document_check();
        let outcome = apply_rules_to_rule_set(&execution);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].path, "$.summary");
    }

    #[test]
    fn test_recommended_rules_are_deterministic() {
        let sets = RuleSets::new();
        let rules = sets.generate_openapi_recommended_rule_set();
        let first = apply_rules_to_rule_set(&RuleSetExecution::new(rules.clone(), SPEC).with_jobs(4));
        let second = apply_rules_to_rule_set(&RuleSetExecution::new(rules, SPEC).with_jobs(1));
        let render = |r: &RuleSetExecutionResult| {
            r.results
                .iter()
                .map(|x| format!("{}|{}|{}|{}", x.start_line(), x.rule_id, x.path, x.message))
                .collect::<Vec<_>>()
        };
        assert!(!first.results.is_empty());
        assert_eq!(render(&first), render(&second));
        assert!(first.results.windows(2).all(|w| w[0].start_line() <= w[1].start_line()));
    }
}
