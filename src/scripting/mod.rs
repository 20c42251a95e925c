//! Custom rule functions written in JavaScript
//!
//! A script defines `runRule(input, context)` and, optionally, `getSchema()`.
//! `runRule` returns `[{message, path?}]` or a promise of it. Scripts see
//! only the JSON projection of the matched node and a plain context object;
//! there is no filesystem, network or process access.
//!
//! Interpreters are not `Send`, so each worker thread keeps its own runtime
//! per function and reuses it across invocations.

pub mod event_loop;

use crate::functions::FunctionRegistry;
use crate::model::function::FUNCTION_CATEGORY_CUSTOM;
use crate::model::{FunctionSchema, Rule, RuleAction, RuleFunction, RuleFunctionContext, RuleFunctionResult};
use crate::node::{Node, NodeRef};
use boa_engine::{js_string, Context, JsResult, JsString, JsValue, NativeFunction, Script, Source};
use event_loop::{EventLoop, Outcome};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default budget for one invocation, timers included
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Loop iterations a single script loop may run before it is stopped
const LOOP_ITERATION_LIMIT: u64 = 10_000_000;

const CORE_FUNCTIONS: &[&str] = &[
    "truthy",
    "falsy",
    "defined",
    "undefined",
    "pattern",
    "casing",
    "alphabetical",
    "enumeration",
    "length",
    "xor",
    "blank",
];

static CORE: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::builtin);

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static RUNTIMES: RefCell<HashMap<usize, Context>> = RefCell::new(HashMap::new());
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("unable to read script: {0}")]
    Io(#[from] std::io::Error),

    #[error("syntax error in '{name}': {message}")]
    Syntax { name: String, message: String },

    #[error("{0}")]
    Runtime(String),

    #[error("'runRule' is not defined as a JavaScript function in '{0}'")]
    MissingRunRule(String),

    #[error("promise did not resolve within timeout")]
    Timeout,
}

/// Parse `source` and report syntax errors without running it
pub fn check_script(name: &str, source: &str) -> Result<(), ScriptError> {
    let mut context = Context::default();
    Script::parse(Source::from_bytes(source), None, &mut context)
        .map(|_| ())
        .map_err(|e| ScriptError::Syntax {
            name: name.to_string(),
            message: e.to_string(),
        })
}

/// Bridge from scripts to the built-in core functions.
/// Arguments are a function name, then the input and context as JSON text.
fn call_core(_this: &JsValue, args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    let text = |i: usize| {
        args.get(i)
            .and_then(JsValue::as_string)
            .map(JsString::to_std_string_escaped)
            .unwrap_or_default()
    };
    let name = text(0);
    let input: Value = serde_json::from_str(&text(1)).unwrap_or(Value::Null);
    let context: Value = serde_json::from_str(&text(2)).unwrap_or(Value::Null);
    let results = run_core_function(&name, &input, &context);
    Ok(JsValue::from(JsString::from(results.to_string().as_str())))
}

/// Run a core function against a JSON value, answering in the shape scripts
/// return: `[{message, path}]`
fn run_core_function(name: &str, input: &Value, context: &Value) -> Value {
    let Some(function) = CORE_FUNCTIONS
        .contains(&name)
        .then(|| CORE.find(name))
        .flatten()
    else {
        return json!([{ "message": format!("unknown core function '{}'", name) }]);
    };

    let action = match context.get("ruleAction").filter(|a| !a.is_null()) {
        Some(action) => match serde_json::from_value::<RuleAction>(action.clone()) {
            Ok(action) => action,
            Err(e) => return json!([{ "message": format!("invalid ruleAction for '{}': {}", name, e) }]),
        },
        None => RuleAction::default(),
    };
    let mut action = RuleAction {
        function: name.to_string(),
        ..action
    };
    if let Some(options) = context.get("options").filter(|o| !o.is_null()) {
        action.function_options = Some(options.clone());
    }
    let given = context.get("given").and_then(Value::as_str).unwrap_or("$");
    let rule_id = context
        .pointer("/rule/id")
        .and_then(Value::as_str)
        .unwrap_or(name);

    let rule = Arc::new(Rule::new(rule_id).with_given(given).with_then(action.clone()));
    let function_context = RuleFunctionContext::new(Arc::clone(&rule))
        .with_action(action)
        .with_given(given);
    let node = Node::from_json(input);
    let results = function.run_rule(&[node], &function_context);
    Value::Array(
        results
            .into_iter()
            .map(|r| json!({ "message": r.message, "path": r.path }))
            .collect(),
    )
}

fn new_runtime(name: &str, source: &str) -> Result<Context, ScriptError> {
    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(LOOP_ITERATION_LIMIT);
    context
        .register_global_callable(js_string!("__vacuum_core"), 3, NativeFunction::from_fn_ptr(call_core))
        .map_err(|e| ScriptError::Runtime(e.to_string()))?;
    event_loop::install(&mut context)?;
    event_loop::eval(&mut context, source).map_err(|e| match e {
        ScriptError::Runtime(message) => ScriptError::Syntax {
            name: name.to_string(),
            message,
        },
        other => other,
    })?;
    let defined = event_loop::eval(&mut context, "typeof runRule === 'function'")?;
    if defined.as_boolean() != Some(true) {
        return Err(ScriptError::MissingRunRule(name.to_string()));
    }
    Ok(context)
}

/// One entry of the array `runRule` returns
#[derive(Debug, Deserialize)]
struct ScriptResult {
    #[serde(default)]
    message: String,
    #[serde(default)]
    path: Option<String>,
}

/// A rule function backed by a script
pub struct JavaScriptFunction {
    id: usize,
    name: String,
    source: Arc<str>,
    schema: FunctionSchema,
    timeout: Duration,
}

impl std::fmt::Debug for JavaScriptFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JavaScriptFunction")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish()
    }
}

impl JavaScriptFunction {
    /// Compile `source`, check it defines `runRule` and read its schema.
    /// The function is named by `getSchema().name`, falling back to `name`.
    pub fn new(name: &str, source: &str) -> Result<Self, ScriptError> {
        check_script(name, source)?;
        let mut runtime = new_runtime(name, source)?;
        let schema = read_schema(&mut runtime, name);
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let function = Self {
            id,
            name: schema.name.clone(),
            source: Arc::from(source),
            schema,
            timeout: DEFAULT_SCRIPT_TIMEOUT,
        };
        RUNTIMES.with(|runtimes| runtimes.borrow_mut().insert(id, runtime));
        Ok(function)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run against one JSON input on this thread's runtime
    fn invoke(&self, input: &Value, context: &Value) -> Result<Outcome, ScriptError> {
        RUNTIMES.with(|runtimes| {
            let mut runtimes = runtimes.borrow_mut();
            if !runtimes.contains_key(&self.id) {
                debug!(target: event_loop::LOG_TARGET, "starting runtime for '{}'", self.name);
                runtimes.insert(self.id, new_runtime(&self.name, &self.source)?);
            }
            match runtimes.get_mut(&self.id) {
                Some(runtime) => EventLoop::new(self.timeout).invoke(runtime, input, context),
                None => Err(ScriptError::Runtime(format!("no runtime for '{}'", self.name))),
            }
        })
    }

    fn failure(&self, message: String, node: &NodeRef, context: &RuleFunctionContext) -> RuleFunctionResult {
        RuleFunctionResult::new(format!("Unable to execute JavaScript function: '{}': {}", self.name, message))
            .with_node(node)
            .with_path(context.given.clone())
            .with_rule(&context.rule)
    }
}

impl Drop for JavaScriptFunction {
    fn drop(&mut self) {
        let id = self.id;
        // the thread-local may already be gone during thread teardown
        let _ = RUNTIMES.try_with(|runtimes| {
            if let Ok(mut runtimes) = runtimes.try_borrow_mut() {
                runtimes.remove(&id);
            }
        });
    }
}

/// The plain object scripts receive as `context`
fn script_context(context: &RuleFunctionContext) -> Value {
    json!({
        "rule": {
            "id": context.rule.id,
            "description": context.rule.description,
            "message": context.rule.message,
            "severity": context.rule.severity.to_string(),
        },
        "ruleAction": serde_json::to_value(&context.rule_action).unwrap_or(Value::Null),
        "given": context.given,
        "options": context.options,
    })
}

fn read_schema(runtime: &mut Context, name: &str) -> FunctionSchema {
    let fallback = FunctionSchema::new(name);
    let text = match event_loop::eval(
        runtime,
        "typeof getSchema === 'function' ? JSON.stringify(getSchema()) : ''",
    ) {
        Ok(value) => value
            .as_string()
            .map(JsString::to_std_string_escaped)
            .unwrap_or_default(),
        Err(e) => {
            warn!("getSchema failed in '{}': {}", name, e);
            return fallback;
        }
    };
    if text.is_empty() {
        return fallback;
    }
    let mut value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(_) => return fallback,
    };
    if let Some(object) = value.as_object_mut() {
        let named = object.get("name").and_then(Value::as_str).is_some_and(|n| !n.is_empty());
        if !named {
            object.insert("name".to_string(), Value::String(name.to_string()));
        }
    }
    serde_json::from_value(value).unwrap_or(fallback)
}

impl RuleFunction for JavaScriptFunction {
    fn run_rule(&self, nodes: &[NodeRef], context: &RuleFunctionContext) -> Vec<RuleFunctionResult> {
        let rule_context = script_context(context);
        let mut results = Vec::new();
        for node in nodes {
            let outcome = match self.invoke(&node.to_json(), &rule_context) {
                Ok(outcome) => outcome,
                Err(e) => {
                    results.push(self.failure(e.to_string(), node, context));
                    continue;
                }
            };
            let value = match outcome {
                Outcome::Value(value) => value,
                Outcome::Rejected(error) => {
                    results.push(self.failure(format!("promise rejected: {}", error), node, context));
                    continue;
                }
                Outcome::Thrown(error) => {
                    results.push(self.failure(error, node, context));
                    continue;
                }
                Outcome::Pending => {
                    results.push(self.failure(ScriptError::Timeout.to_string(), node, context));
                    continue;
                }
            };
            if value.is_null() {
                continue;
            }
            match serde_json::from_value::<Vec<ScriptResult>>(value) {
                Ok(found) => results.extend(found.into_iter().map(|r| {
                    RuleFunctionResult::new(r.message)
                        .with_node(node)
                        .with_path(r.path.unwrap_or_else(|| context.given.clone()))
                        .with_rule(&context.rule)
                })),
                Err(e) => results.push(
                    RuleFunctionResult::new(format!(
                        "Unable to decode results from JavaScript function: '{}': {}",
                        self.name, e
                    ))
                    .with_node(node)
                    .with_path(context.given.clone())
                    .with_rule(&context.rule),
                ),
            }
        }
        results
    }

    fn schema(&self) -> FunctionSchema {
        self.schema.clone()
    }

    fn category(&self) -> &str {
        FUNCTION_CATEGORY_CUSTOM
    }
}

/// Load every `*.js` file in `dir`. Scripts that fail to compile are logged
/// and skipped.
pub fn load_functions(dir: &Path) -> Result<Vec<Arc<JavaScriptFunction>>, ScriptError> {
    if !dir.is_dir() {
        return Err(ScriptError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        )));
    }
    let pattern = format!("{}/*.js", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut paths: Vec<_> = glob::glob(&pattern)
        .map_err(|e| ScriptError::Runtime(e.to_string()))?
        .flatten()
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut functions = Vec::new();
    for path in paths {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("").to_string();
        let source = std::fs::read_to_string(&path)?;
        match JavaScriptFunction::new(&stem, &source) {
            Ok(function) => {
                info!("loaded custom function '{}' from {}", function.name(), path.display());
                functions.push(Arc::new(function));
            }
            Err(e) => warn!("failed to load function '{}': {}", stem, e),
        }
    }
    Ok(functions)
}

/// Load `dir` into `registry`, returning the registered names
pub fn register_functions(registry: &mut FunctionRegistry, dir: &Path) -> Result<Vec<String>, ScriptError> {
    let mut names = Vec::new();
    for function in load_functions(dir)? {
        let name = function.name().to_string();
        if registry.contains(&name) {
            warn!("custom function '{}' replaces a built-in function", name);
        }
        registry.register(&name, function);
        names.push(name);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rule;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn context() -> RuleFunctionContext {
        let rule = Rule::new("custom-rule")
            .with_given("$.info")
            .with_then(RuleAction::new("custom"));
        RuleFunctionContext::new(Arc::new(rule))
    }

    fn run(source: &str, input: Value) -> Vec<RuleFunctionResult> {
        let function = JavaScriptFunction::new("custom", source).unwrap();
        function.run_rule(&[Node::from_json(&input)], &context())
    }

    #[test]
    fn test_sync_rule() {
        let source = r#"function runRule(input) {
            if (!input.description) return [{ message: "missing" }];
            return [];
        }"#;
        let results = run(source, json!({"title": "X", "description": ""}));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "missing");
        assert_eq!(results[0].path, "$.info");
        assert_eq!(results[0].rule_id, "custom-rule");
        assert!(run(source, json!({"title": "X", "description": "pets"})).is_empty());
    }

    #[test]
    fn test_async_promise_all() {
        let source = r#"async function runRule(input) {
            const parts = await Promise.all([Promise.resolve("a"), Promise.resolve("b"), Promise.resolve("c")]);
            return [{ message: parts.join("-") }];
        }"#;
        let results = run(source, json!("anything"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "a-b-c");
    }

    #[test]
    fn test_rejection() {
        let results = run("async function runRule(i) { throw new Error('boom'); }", json!(null));
        assert_eq!(results.len(), 1);
        assert!(results[0].message.contains("promise rejected"));
        assert!(results[0].message.contains("boom"));

        let results = run("function runRule(i) { return Promise.reject('plain words'); }", json!(null));
        assert_eq!(
            results[0].message,
            "Unable to execute JavaScript function: 'custom': promise rejected: plain words"
        );
    }

    #[test]
    fn test_thrown_error() {
        let results = run("function runRule(i) { throw new Error('kaput'); }", json!(null));
        assert_eq!(results[0].message, "Unable to execute JavaScript function: 'custom': kaput");
    }

    #[test]
    fn test_timer_and_path() {
        let source = r#"function runRule(input, context) {
            return new Promise((resolve) => setTimeout(() => resolve([{ message: context.given, path: "$.info.title" }]), 5));
        }"#;
        let results = run(source, json!({}));
        assert_eq!(results[0].message, "$.info");
        assert_eq!(results[0].path, "$.info.title");
    }

    #[test]
    fn test_unresolved_promise() {
        let function = JavaScriptFunction::new("hangs", "function runRule() { return new Promise(() => {}); }")
            .unwrap()
            .with_timeout(Duration::from_millis(20));
        let results = function.run_rule(&[Node::from_json(&json!(1))], &context());
        assert!(results[0].message.ends_with("promise did not resolve within timeout"));
    }

    #[test]
    fn test_core_functions() {
        let source = r#"function runRule(input) {
            return vacuum_truthy(input, { ruleAction: { field: "description" }, given: "$.info" });
        }"#;
        let results = run(source, json!({"title": "X"}));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.info.description");
    }

    #[test]
    fn test_core_function_reads_rule_action() {
        let input = json!({"title": "X"});
        let context = json!({ "ruleAction": { "field": "description" }, "given": "$.info" });
        let results = run_core_function("truthy", &input, &context);
        assert_eq!(results.as_array().map(Vec::len), Some(1));
        assert_eq!(results[0]["path"], "$.info.description");

        let broken = run_core_function("truthy", &input, &json!({ "ruleAction": { "field": 7 } }));
        let message = broken[0]["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("invalid ruleAction for 'truthy'"), "{}", message);
    }

    #[test]
    fn test_schema() {
        let source = r#"
            function getSchema() {
                return { name: "checkTitle", description: "titles", properties: [{ name: "max", description: "longest" }] };
            }
            function runRule(input) { return []; }
        "#;
        let function = JavaScriptFunction::new("file-name", source).unwrap();
        assert_eq!(function.name(), "checkTitle");
        let schema = function.schema();
        assert_eq!(schema.description, "titles");
        assert_eq!(schema.properties[0].name, "max");
        assert_eq!(function.category(), FUNCTION_CATEGORY_CUSTOM);

        let unnamed = JavaScriptFunction::new("fallback", "function runRule() { return []; }").unwrap();
        assert_eq!(unnamed.name(), "fallback");
    }

    #[test]
    fn test_invalid_scripts() {
        assert!(matches!(
            check_script("broken", "function runRule( {"),
            Err(ScriptError::Syntax { .. })
        ));
        assert!(check_script("fine", "function runRule() { return []; }").is_ok());
        assert!(matches!(
            JavaScriptFunction::new("nothing", "const x = 1;"),
            Err(ScriptError::MissingRunRule(_))
        ));
    }

    #[test]
    fn test_runtime_per_thread() {
        let function = Arc::new(
            JavaScriptFunction::new("counter", "let calls = 0; function runRule() { calls++; return [{ message: String(calls) }]; }")
                .unwrap(),
        );
        let node = Node::from_json(&json!(null));
        let ctx = context();
        assert_eq!(function.run_rule(&[Arc::clone(&node)], &ctx)[0].message, "1");
        assert_eq!(function.run_rule(&[Arc::clone(&node)], &ctx)[0].message, "2");

        let shared = Arc::clone(&function);
        let other = std::thread::spawn(move || {
            let node = Node::from_json(&json!(null));
            shared.run_rule(&[node], &context())[0].message.clone()
        })
        .join()
        .unwrap();
        assert_eq!(other, "1");
    }

    #[test]
    fn test_load_functions() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.js"), "function runRule() { return []; }").unwrap();
        fs::write(dir.path().join("bad.js"), "function runRule( {").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut registry = FunctionRegistry::builtin();
        let names = register_functions(&mut registry, dir.path()).unwrap();
        assert_eq!(names, vec!["good".to_string()]);
        assert!(registry.contains("good"));
        assert!(registry.contains("truthy"));
        assert!(load_functions(&dir.path().join("missing")).is_err());
    }
}
