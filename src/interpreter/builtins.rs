//! Restricted builtin function set available to sandboxed code, plus the
//! handful of object methods (`.append`, `.get`, `.upper`, ...) exposed as
//! attributes on list/dict/str values.

use super::value::{Scope, Value};
use crate::tools::Tool;
use crate::Error;
use std::collections::HashMap;
use std::sync::Arc;

const BUILTIN_NAMES: &[&str] = &[
    "len", "range", "print", "str", "int", "float", "bool", "list", "tuple", "dict", "sum", "min",
    "max", "sorted", "enumerate", "abs", "round", "zip", "reversed", "any", "all", "type", "think",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

pub async fn call_builtin(name: &str, args: Vec<Value>) -> crate::Result<Value> {
    match name {
        "len" => {
            let v = one(&args, "len")?;
            Ok(Value::Int(length_of(v)? as i64))
        }
        "range" => range(&args),
        "print" => {
            let rendered: Vec<String> = args.iter().map(Value::to_display_string).collect();
            tracing::info!(output = %rendered.join(" "), "sandbox print");
            Ok(Value::None)
        }
        "str" => Ok(Value::Str(
            args.first().map(Value::to_display_string).unwrap_or_default(),
        )),
        "int" => {
            let v = one(&args, "int")?;
            Ok(Value::Int(to_int(v)?))
        }
        "float" => {
            let v = one(&args, "float")?;
            Ok(Value::Float(to_float(v)?))
        }
        "bool" => Ok(Value::Bool(one(&args, "bool")?.is_truthy())),
        "list" => match args.first() {
            None => Ok(Value::list(Vec::new())),
            Some(Value::List(items)) => Ok(Value::list(items.lock().unwrap().clone())),
            Some(Value::Tuple(items)) => Ok(Value::list(items.as_ref().clone())),
            Some(Value::Str(s)) => Ok(Value::list(
                s.chars().map(|c| Value::Str(c.to_string())).collect(),
            )),
            Some(Value::Dict(entries)) => Ok(Value::list(
                entries
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|(k, _)| Value::Str(k.clone()))
                    .collect(),
            )),
            Some(other) => Err(Error::interpreter(
                format!("'{}' object is not iterable", other.type_name()),
                0,
            )),
        },
        "tuple" => match args.first() {
            None => Ok(Value::tuple(Vec::new())),
            Some(Value::List(items)) => Ok(Value::tuple(items.lock().unwrap().clone())),
            Some(Value::Tuple(items)) => Ok(Value::Tuple(items.clone())),
            Some(Value::Str(s)) => Ok(Value::tuple(
                s.chars().map(|c| Value::Str(c.to_string())).collect(),
            )),
            Some(other) => Err(Error::interpreter(
                format!("'{}' object is not iterable", other.type_name()),
                0,
            )),
        },
        "dict" => Ok(Value::dict(Vec::new())),
        "sum" => {
            let v = one(&args, "sum")?;
            let items = expect_list(v)?;
            let mut total = 0.0;
            let mut all_int = true;
            for item in &items {
                total += to_float(item)?;
                if !matches!(item, Value::Int(_)) {
                    all_int = false;
                }
            }
            Ok(if all_int {
                Value::Int(total as i64)
            } else {
                Value::Float(total)
            })
        }
        "min" | "max" => minmax(name, &args),
        "sorted" => {
            let v = one(&args, "sorted")?;
            let mut items = expect_list(v)?;
            items.sort_by(|a, b| {
                to_float(a)
                    .ok()
                    .zip(to_float(b).ok())
                    .and_then(|(x, y)| x.partial_cmp(&y))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(Value::list(items))
        }
        "enumerate" => {
            let v = one(&args, "enumerate")?;
            let items = expect_list(v)?;
            Ok(Value::list(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| Value::list(vec![Value::Int(i as i64), v]))
                    .collect(),
            ))
        }
        "abs" => match one(&args, "abs")? {
            Value::Int(i) => Ok(Value::Int(i.abs())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(type_error("abs", other)),
        },
        "round" => {
            let v = to_float(one(&args, "round")?)?;
            Ok(Value::Int(v.round() as i64))
        }
        "zip" => {
            if args.len() != 2 {
                return Err(Error::interpreter("zip() requires exactly two iterables", 0));
            }
            let a = expect_list(&args[0])?;
            let b = expect_list(&args[1])?;
            Ok(Value::list(
                a.into_iter()
                    .zip(b)
                    .map(|(x, y)| Value::list(vec![x, y]))
                    .collect(),
            ))
        }
        "reversed" => {
            let mut items = expect_list(one(&args, "reversed")?)?;
            items.reverse();
            Ok(Value::list(items))
        }
        "any" => {
            let items = expect_list(one(&args, "any")?)?;
            Ok(Value::Bool(items.iter().any(Value::is_truthy)))
        }
        "all" => {
            let items = expect_list(one(&args, "all")?)?;
            Ok(Value::Bool(items.iter().all(Value::is_truthy)))
        }
        "type" => Ok(Value::Str(one(&args, "type")?.type_name().to_string())),
        // Lets the model narrate its reasoning inline without it becoming part
        // of the value the surrounding expression evaluates to.
        "think" => {
            if let Some(thought) = args.first() {
                tracing::debug!(thought = %thought.to_display_string(), "agent thought");
            }
            Ok(Value::None)
        }
        other => Err(Error::interpreter(format!("'{other}' is not a known builtin"), 0)),
    }
}

fn one<'a>(args: &'a [Value], name: &str) -> crate::Result<&'a Value> {
    args.first()
        .ok_or_else(|| Error::interpreter(format!("{name}() missing required argument"), 0))
}

fn length_of(v: &Value) -> crate::Result<usize> {
    match v {
        Value::Str(s) => Ok(s.chars().count()),
        Value::List(items) => Ok(items.lock().unwrap().len()),
        Value::Tuple(items) => Ok(items.len()),
        Value::Dict(entries) => Ok(entries.lock().unwrap().len()),
        other => Err(type_error_raw("object of this type has no len()", other)),
    }
}

fn expect_list(v: &Value) -> crate::Result<Vec<Value>> {
    match v {
        Value::List(items) => Ok(items.lock().unwrap().clone()),
        Value::Tuple(items) => Ok(items.as_ref().clone()),
        other => Err(type_error("iterate over", other)),
    }
}

fn to_int(v: &Value) -> crate::Result<i64> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Float(f) => Ok(*f as i64),
        Value::Bool(b) => Ok(*b as i64),
        Value::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::interpreter(format!("invalid literal for int(): '{s}'"), 0)),
        other => Err(type_error("convert to int", other)),
    }
}

fn to_float(v: &Value) -> crate::Result<f64> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::interpreter(format!("invalid literal for float(): '{s}'"), 0)),
        other => Err(type_error("convert to float", other)),
    }
}

fn minmax(which: &str, args: &[Value]) -> crate::Result<Value> {
    let items: Vec<Value> = if args.len() == 1 {
        expect_list(&args[0])?
    } else {
        args.to_vec()
    };
    if items.is_empty() {
        return Err(Error::interpreter(format!("{which}() arg is an empty sequence"), 0));
    }
    let mut best = items[0].clone();
    let mut best_f = to_float(&best)?;
    for item in &items[1..] {
        let f = to_float(item)?;
        let better = if which == "min" { f < best_f } else { f > best_f };
        if better {
            best = item.clone();
            best_f = f;
        }
    }
    Ok(best)
}

fn range(args: &[Value]) -> crate::Result<Value> {
    let (start, stop, step) = match args.len() {
        1 => (0, to_int(&args[0])?, 1),
        2 => (to_int(&args[0])?, to_int(&args[1])?, 1),
        3 => (to_int(&args[0])?, to_int(&args[1])?, to_int(&args[2])?),
        _ => return Err(Error::interpreter("range() requires 1 to 3 arguments", 0)),
    };
    if step == 0 {
        return Err(Error::interpreter("range() arg 3 must not be zero", 0));
    }
    let mut out = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < stop {
            out.push(Value::Int(i));
            i += step;
        }
    } else {
        while i > stop {
            out.push(Value::Int(i));
            i += step;
        }
    }
    Ok(Value::list(out))
}

fn type_error(action: &str, v: &Value) -> Error {
    Error::interpreter(format!("cannot {action} '{}'", v.type_name()), 0)
}

fn type_error_raw(msg: &str, v: &Value) -> Error {
    Error::interpreter(format!("'{}' {msg}", v.type_name()), 0)
}

/// Dispatches a `receiver.method(args)` call for the builtin value types.
/// Mutating methods (`list.append`, `list.sort`, `list.pop`) act on the
/// shared `Arc<Mutex<..>>` in place rather than returning a copy.
pub fn call_method(receiver: &Value, method: &str, args: Vec<Value>) -> crate::Result<Value> {
    match (receiver, method) {
        (Value::Str(s), "upper") => Ok(Value::Str(s.to_uppercase())),
        (Value::Str(s), "lower") => Ok(Value::Str(s.to_lowercase())),
        (Value::Str(s), "strip") => Ok(Value::Str(s.trim().to_string())),
        (Value::Str(s), "split") => Ok(Value::list(
            s.split_whitespace().map(|p| Value::Str(p.to_string())).collect(),
        )),
        (Value::Str(s), "startswith") => {
            let needle = args.first().map(Value::to_display_string).unwrap_or_default();
            Ok(Value::Bool(s.starts_with(&needle)))
        }
        (Value::Str(s), "endswith") => {
            let needle = args.first().map(Value::to_display_string).unwrap_or_default();
            Ok(Value::Bool(s.ends_with(&needle)))
        }
        (Value::Str(s), "join") => {
            let items = expect_list(one(&args, "join")?)?;
            let rendered: Vec<String> = items.iter().map(Value::to_display_string).collect();
            Ok(Value::Str(rendered.join(s)))
        }
        (Value::Str(s), "replace") => {
            let from = args.first().map(Value::to_display_string).unwrap_or_default();
            let to = args.get(1).map(Value::to_display_string).unwrap_or_default();
            Ok(Value::Str(s.replace(&from, &to)))
        }
        (Value::List(items), "append") => {
            items.lock().unwrap().push(one(&args, "append")?.clone());
            Ok(Value::None)
        }
        (Value::List(items), "pop") => {
            let mut guard = items.lock().unwrap();
            let index = match args.first() {
                Some(v) => to_int(v)?,
                None => guard.len() as i64 - 1,
            };
            if index < 0 || index as usize >= guard.len() {
                return Err(Error::interpreter("pop index out of range", 0));
            }
            Ok(guard.remove(index as usize))
        }
        (Value::List(items), "sort") => {
            let mut guard = items.lock().unwrap();
            guard.sort_by(|a, b| {
                to_float(a)
                    .ok()
                    .zip(to_float(b).ok())
                    .and_then(|(x, y)| x.partial_cmp(&y))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(Value::None)
        }
        (Value::List(items), "count") => {
            let needle = one(&args, "count")?;
            let guard = items.lock().unwrap();
            Ok(Value::Int(
                guard.iter().filter(|v| super::eval::values_equal(v, needle)).count() as i64,
            ))
        }
        (Value::Dict(entries), "get") => {
            let key = one(&args, "get")?.to_display_string();
            let guard = entries.lock().unwrap();
            Ok(guard
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .or_else(|| args.get(1).cloned())
                .unwrap_or(Value::None))
        }
        (Value::Dict(entries), "keys") => Ok(Value::list(
            entries.lock().unwrap().iter().map(|(k, _)| Value::Str(k.clone())).collect(),
        )),
        (Value::Dict(entries), "values") => Ok(Value::list(
            entries.lock().unwrap().iter().map(|(_, v)| v.clone()).collect(),
        )),
        (Value::Dict(entries), "items") => Ok(Value::list(
            entries
                .lock()
                .unwrap()
                .iter()
                .map(|(k, v)| Value::list(vec![Value::Str(k.clone()), v.clone()]))
                .collect(),
        )),
        _ => Err(Error::interpreter(
            format!("'{}' object has no attribute '{method}'", receiver.type_name()),
            0,
        )),
    }
}

/// Builds a `NameError`-equivalent message, with a best-effort "did you
/// mean" suggestion drawn from in-scope variables, registered tools, and
/// known builtins, matching the class of typo the original's fuzzy matcher
/// catches (transposition, single substitution).
pub fn name_error_with_hint(
    name: &str,
    tools: &HashMap<String, Arc<Tool>>,
    scopes: &[Scope],
) -> String {
    let mut candidates: Vec<&str> = BUILTIN_NAMES.to_vec();
    candidates.extend(tools.keys().map(String::as_str));
    for scope in scopes {
        candidates.extend(scope.keys().map(String::as_str));
    }
    let closest = candidates
        .into_iter()
        .map(|c| (edit_distance(name, c), c))
        .filter(|(d, _)| *d <= 2)
        .min_by_key(|(d, _)| *d);

    match closest {
        Some((_, suggestion)) => {
            format!("name '{name}' is not defined. Did you mean: '{suggestion}'?")
        }
        None => format!("name '{name}' is not defined"),
    }
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut row = vec![i; b.len() + 1];
        for j in 1..=b.len() {
            row[j] = if a[i - 1] == b[j - 1] {
                prev[j - 1]
            } else {
                1 + prev[j - 1].min(prev[j]).min(row[j - 1])
            };
        }
        prev = row;
    }
    prev[b.len()]
}
