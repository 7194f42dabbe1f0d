//! Catalogue of the built-in task definitions.
//!
//! Names, argument layouts and the pure `add` body live here so that clients
//! can build invocations and callers can run `add` directly without a broker.
//! The `run_violin` body needs a process runtime and lives in the worker.

use crate::{Invocation, Result, TaskFailure};
use serde_json::{Number, Value};
use std::path::{Path, PathBuf};

pub const ADD: &str = "add";
pub const RUN_VIOLIN: &str = "run_violin";

/// Parameter lists, in positional order
pub const ADD_PARAMS: &[&str] = &["x", "y"];
pub const RUN_VIOLIN_PARAMS: &[&str] = &["path"];

/// Interpreter, script and output file used by `run_violin`
pub const VIOLIN_COMMAND: &str = "Rscript";
pub const VIOLIN_SCRIPT: &str = "run_violin_plot.R";
pub const VIOLIN_OUTPUT: &str = "violin_plot.pdf";

/// Invocation of `add(x, y)`
pub fn add_invocation(x: impl Into<Value>, y: impl Into<Value>) -> Result<Invocation> {
    Invocation::new(ADD, &[x.into(), y.into()])
}

/// Invocation of `run_violin(path)`
pub fn run_violin_invocation(path: impl AsRef<Path>) -> Result<Invocation> {
    let path = path.as_ref().to_string_lossy().into_owned();
    Invocation::new(RUN_VIOLIN, &[path])
}

/// Sum of two JSON numbers.
///
/// Integer operands produce an integer unless the sum overflows, in which
/// case (and whenever either operand is a float) the sum is a float.
pub fn add(x: &Value, y: &Value) -> std::result::Result<Value, TaskFailure> {
    let (a, b) = match (x, y) {
        (Value::Number(a), Value::Number(b)) => (a, b),
        _ => {
            return Err(TaskFailure::argument(format!(
                "add expects two numbers, got {} and {}",
                json_type(x),
                json_type(y)
            )))
        }
    };

    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Value::from(sum));
        }
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Value::from(sum));
        }
    }

    let sum = a.as_f64().unwrap_or(f64::NAN) + b.as_f64().unwrap_or(f64::NAN);
    Number::from_f64(sum)
        .map(Value::Number)
        .ok_or_else(|| TaskFailure::argument("sum is not a finite number"))
}

/// Decode the `(x, y)` tuple of an `add` invocation
pub fn decode_add_args(args: &[u8]) -> std::result::Result<(Value, Value), TaskFailure> {
    let values = decode_positional(args, ADD, ADD_PARAMS.len())?;
    let mut values = values.into_iter();
    match (values.next(), values.next()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(TaskFailure::argument("add takes exactly 2 arguments")),
    }
}

/// Decode the `(path,)` tuple of a `run_violin` invocation
pub fn decode_violin_args(args: &[u8]) -> std::result::Result<PathBuf, TaskFailure> {
    let values = decode_positional(args, RUN_VIOLIN, RUN_VIOLIN_PARAMS.len())?;
    match values.into_iter().next() {
        Some(Value::String(path)) if !path.is_empty() => Ok(PathBuf::from(path)),
        Some(other) => Err(TaskFailure::argument(format!(
            "run_violin expects a non-empty path string, got {}",
            json_type(&other)
        ))),
        None => Err(TaskFailure::argument("run_violin takes exactly 1 argument")),
    }
}

/// Expected output file for a `run_violin` call on `dir`
pub fn violin_output_path(dir: &Path) -> PathBuf {
    dir.join(VIOLIN_OUTPUT)
}

fn decode_positional(
    args: &[u8],
    task: &str,
    arity: usize,
) -> std::result::Result<Vec<Value>, TaskFailure> {
    let value: Value = serde_json::from_slice(args)
        .map_err(|e| TaskFailure::argument(format!("{} arguments are not valid JSON: {}", task, e)))?;

    match value {
        Value::Array(values) if values.len() == arity => Ok(values),
        Value::Array(values) => Err(TaskFailure::argument(format!(
            "{} takes exactly {} argument(s), got {}",
            task,
            arity,
            values.len()
        ))),
        other => Err(TaskFailure::argument(format!(
            "{} arguments must be a JSON array, got {}",
            task,
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
