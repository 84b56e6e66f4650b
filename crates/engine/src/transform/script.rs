//! Declarative order transform scripts.
//!
//! A script is a YAML list of steps run against three documents: `order`
//! (the import payload, writable), `remote` (the storefront record,
//! read-only), and, inside `each_item`, `item` (the current line item,
//! writable). Paths are dot-separated and start with one of those roots;
//! numeric segments index arrays.
//!
//! ```yaml
//! - set: { path: order.options.shipping_method, value: express }
//! - copy: { from: remote.shipping_address.company, to: order.options.customer }
//! - remove: order.options.note
//! - log: Routed to express
//! - when:
//!     condition: { path: remote.status, op: "=", value: on-hold }
//!     then:
//!       - skip_order: true
//! - each_item:
//!     when: { path: item.product, op: missing }
//!     then:
//!       - skip: true
//! ```
//!
//! Steps never perform I/O and the only iteration is over line items, so a
//! script always terminates.

use regex::RegexBuilder;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Script parse or execution failure.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("step {index}: {message}")]
    Step { index: usize, message: String },
}

/// What a script produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutput {
    /// The rewritten order document.
    pub order: JsonValue,
    /// Whether the whole order should be skipped.
    pub skip_order: bool,
    /// Lines written by `log` steps.
    pub log: Vec<String>,
}

/// A transformation of the import payload.
pub trait TransformScript: Send + Sync {
    /// Run against `order` with the storefront record as context.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError` if the script fails.
    fn run(&self, order: JsonValue, remote: &JsonValue) -> Result<ScriptOutput, ScriptError>;
}

// =============================================================================
// Step Model
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
struct SetArgs {
    path: String,
    #[serde(default)]
    value: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
struct CopyArgs {
    from: String,
    to: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Condition {
    path: String,
    #[serde(default = "default_op")]
    op: String,
    #[serde(default)]
    value: JsonValue,
}

fn default_op() -> String {
    "=".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct WhenArgs {
    condition: Condition,
    #[serde(default)]
    then: Vec<RawStep>,
    #[serde(default, rename = "else")]
    otherwise: Vec<RawStep>,
}

#[derive(Debug, Clone, Deserialize)]
struct EachItemArgs {
    #[serde(default)]
    when: Option<Condition>,
    #[serde(default)]
    then: Vec<RawStep>,
}

/// One step as written; exactly one field must be set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    set: Option<SetArgs>,
    copy: Option<CopyArgs>,
    remove: Option<String>,
    skip_order: Option<bool>,
    skip: Option<bool>,
    log: Option<String>,
    when: Option<WhenArgs>,
    each_item: Option<EachItemArgs>,
}

#[derive(Debug, Clone)]
enum Step {
    Set(SetArgs),
    Copy(CopyArgs),
    Remove(String),
    SkipOrder(bool),
    SkipItem(bool),
    Log(String),
    When(Condition, Vec<Step>, Vec<Step>),
    EachItem(Option<Condition>, Vec<Step>),
}

fn convert(steps: Vec<RawStep>) -> Result<Vec<Step>, String> {
    steps.into_iter().map(Step::try_from).collect()
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let mut steps = Vec::with_capacity(1);
        if let Some(args) = raw.set {
            steps.push(Self::Set(args));
        }
        if let Some(args) = raw.copy {
            steps.push(Self::Copy(args));
        }
        if let Some(path) = raw.remove {
            steps.push(Self::Remove(path));
        }
        if let Some(flag) = raw.skip_order {
            steps.push(Self::SkipOrder(flag));
        }
        if let Some(flag) = raw.skip {
            steps.push(Self::SkipItem(flag));
        }
        if let Some(message) = raw.log {
            steps.push(Self::Log(message));
        }
        if let Some(args) = raw.when {
            steps.push(Self::When(
                args.condition,
                convert(args.then)?,
                convert(args.otherwise)?,
            ));
        }
        if let Some(args) = raw.each_item {
            steps.push(Self::EachItem(args.when, convert(args.then)?));
        }

        match (steps.pop(), steps.is_empty()) {
            (Some(step), true) => Ok(step),
            (None, _) => Err("empty step".to_string()),
            (Some(_), false) => Err("a step must contain exactly one action".to_string()),
        }
    }
}

// =============================================================================
// Script
// =============================================================================

/// A parsed YAML transform script.
#[derive(Debug, Clone)]
pub struct YamlScript {
    steps: Vec<Step>,
}

impl YamlScript {
    /// Parse a script.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError::Parse` for invalid YAML and `ScriptError::Step`
    /// for a malformed step.
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        let raw: Vec<RawStep> = serde_yaml::from_str(source)?;
        let steps = raw
            .into_iter()
            .enumerate()
            .map(|(index, step)| {
                Step::try_from(step).map_err(|message| ScriptError::Step { index, message })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { steps })
    }
}

impl TransformScript for YamlScript {
    fn run(&self, order: JsonValue, remote: &JsonValue) -> Result<ScriptOutput, ScriptError> {
        let mut run = Run {
            order,
            remote,
            skip_order: false,
            log: Vec::new(),
        };
        for (index, step) in self.steps.iter().enumerate() {
            run.exec(step, None)
                .map_err(|message| ScriptError::Step { index, message })?;
        }
        Ok(ScriptOutput {
            order: run.order,
            skip_order: run.skip_order,
            log: run.log,
        })
    }
}

struct Run<'a> {
    order: JsonValue,
    remote: &'a JsonValue,
    skip_order: bool,
    log: Vec<String>,
}

enum Root<'p> {
    Order(Vec<&'p str>),
    Remote(Vec<&'p str>),
    Item(Vec<&'p str>),
}

fn root(path: &str) -> Result<Root<'_>, String> {
    let mut segments = path.split('.');
    let head = segments.next().unwrap_or_default();
    let rest: Vec<&str> = segments.collect();
    match head {
        "order" => Ok(Root::Order(rest)),
        "remote" => Ok(Root::Remote(rest)),
        "item" => Ok(Root::Item(rest)),
        other => Err(format!("unknown path root '{other}' in '{path}'")),
    }
}

impl Run<'_> {
    fn exec(&mut self, step: &Step, mut item: Option<&mut JsonValue>) -> Result<(), String> {
        match step {
            Step::Set(args) => self.write(&args.path, Some(args.value.clone()), item),
            Step::Copy(args) => {
                let value = self.read(&args.from, item.as_deref())?.cloned();
                self.write(&args.to, Some(value.unwrap_or(JsonValue::Null)), item)
            }
            Step::Remove(path) => self.write(path, None, item),
            Step::SkipOrder(flag) => {
                self.skip_order = *flag;
                Ok(())
            }
            Step::SkipItem(flag) => {
                let item = item.ok_or("'skip' is only valid inside each_item")?;
                set_path(item, &["skip"], Some(JsonValue::Bool(*flag)))
            }
            Step::Log(message) => {
                self.log.push(message.clone());
                Ok(())
            }
            Step::When(condition, then, otherwise) => {
                let branch = if self.test(condition, item.as_deref())? {
                    then
                } else {
                    otherwise
                };
                for step in branch {
                    self.exec(step, item.as_deref_mut())?;
                }
                Ok(())
            }
            Step::EachItem(condition, steps) => {
                if item.is_some() {
                    return Err("each_item cannot be nested".to_string());
                }
                let mut items = match self.order.get_mut("items") {
                    Some(JsonValue::Array(items)) => std::mem::take(items),
                    _ => return Err("order.items is not a list".to_string()),
                };
                let result = items.iter_mut().try_for_each(|current| {
                    if let Some(condition) = condition
                        && !self.test(condition, Some(&*current))?
                    {
                        return Ok(());
                    }
                    steps
                        .iter()
                        .try_for_each(|step| self.exec(step, Some(&mut *current)))
                });
                if let Some(slot) = self.order.get_mut("items") {
                    *slot = JsonValue::Array(items);
                }
                result
            }
        }
    }

    fn read<'v>(
        &'v self,
        path: &str,
        item: Option<&'v JsonValue>,
    ) -> Result<Option<&'v JsonValue>, String> {
        Ok(match root(path)? {
            Root::Order(rest) => get_path(&self.order, &rest),
            Root::Remote(rest) => get_path(self.remote, &rest),
            Root::Item(rest) => {
                let item = item.ok_or("'item' paths are only valid inside each_item")?;
                get_path(item, &rest)
            }
        })
    }

    fn write(
        &mut self,
        path: &str,
        value: Option<JsonValue>,
        item: Option<&mut JsonValue>,
    ) -> Result<(), String> {
        match root(path)? {
            Root::Order(rest) => {
                if rest.is_empty() {
                    return Err("cannot replace the whole order".to_string());
                }
                set_path(&mut self.order, &rest, value)
            }
            Root::Remote(_) => Err(format!("'{path}' is read-only")),
            Root::Item(rest) => {
                let item = item.ok_or("'item' paths are only valid inside each_item")?;
                if rest.is_empty() {
                    return Err("cannot replace the whole item".to_string());
                }
                set_path(item, &rest, value)
            }
        }
    }

    fn test(&self, condition: &Condition, item: Option<&JsonValue>) -> Result<bool, String> {
        let actual = self.read(&condition.path, item)?;
        let present = actual.is_some_and(|v| !v.is_null());
        match condition.op.as_str() {
            "exists" => Ok(present),
            "missing" => Ok(!present),
            "=" => Ok(loosely_equal(actual, &condition.value)),
            "!=" => Ok(!loosely_equal(actual, &condition.value)),
            "=~" => {
                let pattern = scalar_text(&condition.value);
                let re = RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| format!("invalid pattern '{pattern}': {e}"))?;
                Ok(actual.is_some_and(|v| re.is_match(&scalar_text(v))))
            }
            other => Err(format!("unknown operator '{other}'")),
        }
    }
}

fn scalar_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

static NULL: JsonValue = JsonValue::Null;

fn loosely_equal(actual: Option<&JsonValue>, expected: &JsonValue) -> bool {
    let actual = actual.unwrap_or(&NULL);
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (JsonValue::String(_) | JsonValue::Number(_), JsonValue::String(_) | JsonValue::Number(_)) => {
            scalar_text(actual) == scalar_text(expected)
        }
        _ => false,
    }
}

fn get_path<'v>(mut value: &'v JsonValue, segments: &[&str]) -> Option<&'v JsonValue> {
    for segment in segments {
        value = match value {
            JsonValue::Object(map) => map.get(*segment)?,
            JsonValue::Array(list) => list.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Write (or with `None`, remove) the value at `segments`, creating objects
/// along the way.
fn set_path(target: &mut JsonValue, segments: &[&str], value: Option<JsonValue>) -> Result<(), String> {
    let Some((last, parents)) = segments.split_last() else {
        return Err("empty path".to_string());
    };

    let mut current = target;
    for segment in parents {
        if current.is_null() {
            *current = JsonValue::Object(Map::new());
        }
        current = match current {
            JsonValue::Object(map) => map
                .entry((*segment).to_string())
                .or_insert_with(|| JsonValue::Object(Map::new())),
            JsonValue::Array(list) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| list.get_mut(index))
                .ok_or_else(|| format!("no element '{segment}'"))?,
            _ => return Err(format!("cannot descend into '{segment}'")),
        };
    }

    match (current, value) {
        (JsonValue::Object(map), Some(value)) => {
            map.insert((*last).to_string(), value);
            Ok(())
        }
        (JsonValue::Object(map), None) => {
            map.remove(*last);
            Ok(())
        }
        (JsonValue::Array(list), value) => {
            let index = last
                .parse::<usize>()
                .map_err(|_| format!("'{last}' is not a list index"))?;
            if index >= list.len() {
                return Err(format!("index {index} out of range"));
            }
            match value {
                Some(value) => {
                    if let Some(slot) = list.get_mut(index) {
                        *slot = value;
                    }
                }
                None => {
                    list.remove(index);
                }
            }
            Ok(())
        }
        _ => Err(format!("cannot set '{last}' on a scalar")),
    }
}
