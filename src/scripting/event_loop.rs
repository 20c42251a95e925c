//! A single-threaded event loop for script runtimes
//!
//! Promise jobs are micro-tasks and run through the engine's job queue.
//! Timers are macro-tasks kept in a queue inside the runtime. The host
//! advances the clock, fires one due timer at a time and drains micro-tasks
//! after each one, until nothing is scheduled or the deadline passes.

use super::ScriptError;
use boa_engine::{Context, JsValue, Source};
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::thread;
use std::time::{Duration, Instant};

pub const LOG_TARGET: &str = "vacuum::scripting";

/// Installed before any user script
const PRELUDE: &str = r#"
(function (global) {
  const timers = [];
  let nextId = 1;
  let sequence = 0;
  const loop = { now: 0, logs: [], state: { settled: false }, context: {} };

  const format = (value) => {
    if (typeof value === 'string') return value;
    try {
      const json = JSON.stringify(value);
      return json === undefined ? String(value) : json;
    } catch (e) {
      return String(value);
    }
  };
  const write = (level) => (...args) => { loop.logs.push([level, args.map(format).join(' ')]); };
  global.console = {
    log: write('info'),
    info: write('info'),
    warn: write('warn'),
    error: write('error'),
    debug: write('debug'),
  };

  const schedule = (fn, ms, args, repeat) => {
    if (typeof fn !== 'function') throw new TypeError('timer callback must be a function');
    const delay = Math.max(0, Math.floor(Number(ms) || 0));
    const id = nextId++;
    timers.push({ id, due: loop.now + delay, order: sequence++, fn, args, delay, repeat });
    return id;
  };
  const clear = (id) => {
    const at = timers.findIndex((t) => t.id === id);
    if (at >= 0) timers.splice(at, 1);
  };
  global.setTimeout = (fn, ms, ...args) => schedule(fn, ms, args, false);
  global.setInterval = (fn, ms, ...args) => schedule(fn, ms, args, true);
  global.clearTimeout = clear;
  global.clearInterval = clear;

  loop.nextDue = () => {
    if (timers.length === 0) return -1;
    return timers.reduce((due, t) => Math.min(due, t.due), Infinity);
  };
  loop.fire = () => {
    let next = -1;
    for (let i = 0; i < timers.length; i++) {
      const t = timers[i];
      if (t.due > loop.now) continue;
      if (next < 0 || t.due < timers[next].due || (t.due === timers[next].due && t.order < timers[next].order)) next = i;
    }
    if (next < 0) return;
    const timer = timers[next];
    timers.splice(next, 1);
    if (timer.repeat) {
      timers.push({ ...timer, due: loop.now + Math.max(1, timer.delay), order: sequence++ });
    }
    try {
      timer.fn(...timer.args);
    } catch (e) {
      loop.logs.push(['error', 'timer callback failed: ' + loop.describe(e)]);
    }
  };
  loop.drainLogs = () => JSON.stringify(loop.logs.splice(0, loop.logs.length));
  loop.reset = () => {
    timers.length = 0;
    loop.now = 0;
  };

  loop.describe = (e) => {
    if (e === undefined || e === null) return 'unknown error';
    if (typeof e === 'object' && e.message !== undefined && e.message !== null) return String(e.message);
    const text = String(e);
    if (text !== '' && text !== '[object Object]') return text;
    return format(e);
  };
  loop.invoke = (input, context) => {
    loop.state = { settled: false };
    loop.context = context;
    try {
      const out = runRule(input, context);
      if (out !== null && typeof out === 'object' && typeof out.then === 'function') {
        out.then(
          (value) => { loop.state = { settled: true, value }; },
          (error) => { loop.state = { settled: true, rejected: true, error: loop.describe(error) }; }
        );
      } else {
        loop.state = { settled: true, value: out };
      }
    } catch (e) {
      loop.state = { settled: true, thrown: true, error: loop.describe(e) };
    }
  };
  loop.outcome = () => JSON.stringify(loop.state);

  for (const name of ['truthy', 'falsy', 'defined', 'undefined', 'pattern', 'casing',
                      'alphabetical', 'enumeration', 'length', 'xor', 'blank']) {
    global['vacuum_' + name] = (input, context) => JSON.parse(
      __vacuum_core(name, JSON.stringify(input === undefined ? null : input),
                    JSON.stringify(context === undefined ? loop.context : context)));
  }

  global.__vacuum_loop = loop;
})(globalThis);
"#;

/// How an invocation ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Returned or resolved; `Null` when nothing was returned
    Value(Value),
    Rejected(String),
    Thrown(String),
    /// The promise was still pending when the loop stopped
    Pending,
}

#[derive(Deserialize)]
struct State {
    #[serde(default)]
    settled: bool,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    rejected: bool,
    #[serde(default)]
    thrown: bool,
    #[serde(default)]
    error: String,
}

pub(crate) fn eval(context: &mut Context, code: &str) -> Result<JsValue, ScriptError> {
    context
        .eval(Source::from_bytes(code))
        .map_err(|e| ScriptError::Runtime(e.to_string()))
}

fn eval_string(context: &mut Context, code: &str) -> Result<String, ScriptError> {
    let value = eval(context, code)?;
    value
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .ok_or_else(|| ScriptError::Runtime(format!("'{}' did not produce a string", code)))
}

/// Install timers, console and the core function shims
pub fn install(context: &mut Context) -> Result<(), ScriptError> {
    eval(context, PRELUDE).map(|_| ())
}

/// Drives one invocation to completion
pub struct EventLoop {
    started: Instant,
    deadline: Instant,
}

impl EventLoop {
    pub fn new(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + timeout,
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_millis() as f64
    }

    /// Call `runRule(input, context)` and run the loop until it settles
    pub fn invoke(
        &self,
        runtime: &mut Context,
        input: &Value,
        rule_context: &Value,
    ) -> Result<Outcome, ScriptError> {
        eval(runtime, "__vacuum_loop.reset();")?;
        let input = serde_json::to_string(&input.to_string()).map_err(|e| ScriptError::Runtime(e.to_string()))?;
        let rule_context =
            serde_json::to_string(&rule_context.to_string()).map_err(|e| ScriptError::Runtime(e.to_string()))?;
        eval(
            runtime,
            &format!("__vacuum_loop.invoke(JSON.parse({}), JSON.parse({}));", input, rule_context),
        )?;
        self.run(runtime)?;
        self.outcome(runtime)
    }

    /// Drain micro-tasks and fire timers until none are left or time is up
    pub fn run(&self, runtime: &mut Context) -> Result<(), ScriptError> {
        loop {
            runtime.run_jobs();
            self.drain_logs(runtime)?;

            let next = eval(runtime, "__vacuum_loop.nextDue()")?
                .as_number()
                .unwrap_or(-1.0);
            if next < 0.0 {
                return Ok(());
            }
            let now = Instant::now();
            if now >= self.deadline {
                debug!(target: LOG_TARGET, "event loop stopped at deadline with timers pending");
                return Ok(());
            }
            let wait = next - self.elapsed_ms();
            if wait > 0.0 {
                let wait = Duration::from_millis(wait.ceil() as u64);
                thread::sleep(wait.min(self.deadline - now));
            }
            eval(
                runtime,
                &format!("__vacuum_loop.now = {}; __vacuum_loop.fire();", self.elapsed_ms().max(next)),
            )?;
        }
    }

    fn outcome(&self, runtime: &mut Context) -> Result<Outcome, ScriptError> {
        let text = eval_string(runtime, "__vacuum_loop.outcome()")?;
        let state: State = serde_json::from_str(&text).map_err(|e| ScriptError::Runtime(e.to_string()))?;
        Ok(if !state.settled {
            Outcome::Pending
        } else if state.rejected {
            Outcome::Rejected(state.error)
        } else if state.thrown {
            Outcome::Thrown(state.error)
        } else {
            Outcome::Value(state.value.unwrap_or(Value::Null))
        })
    }

    /// Route buffered console output to the log facade
    fn drain_logs(&self, runtime: &mut Context) -> Result<(), ScriptError> {
        let text = eval_string(runtime, "__vacuum_loop.drainLogs()")?;
        let lines: Vec<(String, String)> = serde_json::from_str(&text).unwrap_or_default();
        for (level, line) in lines {
            match level.as_str() {
                "error" => error!(target: LOG_TARGET, "{}", line),
                "warn" => warn!(target: LOG_TARGET, "{}", line),
                "debug" => debug!(target: LOG_TARGET, "{}", line),
                _ => info!(target: LOG_TARGET, "{}", line),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn runtime(script: &str) -> Context {
        let mut context = Context::default();
        install(&mut context).unwrap();
        eval(&mut context, script).unwrap();
        context
    }

    #[test]
    fn test_sync_value() {
        let mut rt = runtime("function runRule(input) { return [{ message: input.name }]; }");
        let outcome = EventLoop::new(Duration::from_secs(1))
            .invoke(&mut rt, &json!({"name": "pets"}), &json!({}))
            .unwrap();
        assert_eq!(outcome, Outcome::Value(json!([{"message": "pets"}])));
    }

    #[test]
    fn test_timers_fire_in_order() {
        let mut rt = runtime(
            "function runRule() {
               const seen = [];
               return new Promise((resolve) => {
                 setTimeout(() => seen.push('b'), 5);
                 setTimeout(() => seen.push('a'), 0);
                 setTimeout(() => resolve([{ message: seen.join(',') }]), 10);
               });
             }",
        );
        let outcome = EventLoop::new(Duration::from_secs(2))
            .invoke(&mut rt, &json!(null), &json!({}))
            .unwrap();
        assert_eq!(outcome, Outcome::Value(json!([{"message": "a,b"}])));
    }

    #[test]
    fn test_interval_cleared() {
        let mut rt = runtime(
            "function runRule() {
               return new Promise((resolve) => {
                 let ticks = 0;
                 const id = setInterval(() => {
                   ticks++;
                   if (ticks === 3) { clearInterval(id); resolve([{ message: String(ticks) }]); }
                 }, 1);
               });
             }",
        );
        let outcome = EventLoop::new(Duration::from_secs(2))
            .invoke(&mut rt, &json!(null), &json!({}))
            .unwrap();
        assert_eq!(outcome, Outcome::Value(json!([{"message": "3"}])));
    }

    #[test]
    fn test_rejections_and_throws() {
        let mut rt = runtime("async function runRule(input) { if (input) throw new Error('boom'); return Promise.reject('nope'); }");
        let event_loop = EventLoop::new(Duration::from_secs(1));
        assert_eq!(
            event_loop.invoke(&mut rt, &json!(true), &json!({})).unwrap(),
            Outcome::Rejected("boom".to_string())
        );
        assert_eq!(
            event_loop.invoke(&mut rt, &json!(false), &json!({})).unwrap(),
            Outcome::Rejected("nope".to_string())
        );

        let mut rt = runtime("function runRule() { throw new TypeError('bad input'); }");
        assert_eq!(
            event_loop.invoke(&mut rt, &json!(null), &json!({})).unwrap(),
            Outcome::Thrown("bad input".to_string())
        );
    }

    #[test]
    fn test_pending_at_deadline() {
        let mut rt = runtime("function runRule() { return new Promise(() => {}); }");
        let outcome = EventLoop::new(Duration::from_millis(50))
            .invoke(&mut rt, &json!(null), &json!({}))
            .unwrap();
        assert_eq!(outcome, Outcome::Pending);
    }
}
