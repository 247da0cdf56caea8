//! Runtime values for the sandboxed code evaluator.

use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::ast::FunctionDef;

/// A runtime value in the restricted language.
///
/// Lists and dicts are `Arc<Mutex<..>>` rather than `Rc<RefCell<..>>` so that
/// evaluation — which awaits tool calls mid-expression — stays `Send`, the
/// same discipline the rest of the crate holds async handlers to.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Arc<Mutex<Vec<Value>>>),
    /// Immutable, unlike `List` — reassignment through a subscript is rejected.
    Tuple(Arc<Vec<Value>>),
    /// Order-preserving string-keyed map; linear scan is fine at sandbox scale.
    Dict(Arc<Mutex<Vec<(String, Value)>>>),
    Function(Arc<FunctionDef>),
    /// A host-provided callable (a registered tool or a builtin).
    Native(Arc<str>),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(Mutex::new(items)))
    }

    pub fn dict(entries: Vec<(String, Value)>) -> Self {
        Value::Dict(Arc::new(Mutex::new(entries)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Arc::new(items))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.lock().unwrap().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(entries) => !entries.lock().unwrap().is_empty(),
            Value::Function(_) | Value::Native(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Native(_) => "builtin_function",
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(items) => {
                let rendered: Vec<String> = items
                    .lock()
                    .unwrap()
                    .iter()
                    .map(Value::to_repr_string)
                    .collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Tuple(items) => {
                let rendered: Vec<String> = items.iter().map(Value::to_repr_string).collect();
                if items.len() == 1 {
                    format!("({},)", rendered[0])
                } else {
                    format!("({})", rendered.join(", "))
                }
            }
            Value::Dict(entries) => {
                let rendered: Vec<String> = entries
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|(k, v)| format!("'{}': {}", k, v.to_repr_string()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            Value::Function(f) => format!("<function {}>", f.name),
            Value::Native(name) => format!("<built-in function {name}>"),
        }
    }

    fn to_repr_string(&self) -> String {
        match self {
            Value::Str(s) => format!("'{s}'"),
            other => other.to_display_string(),
        }
    }

    /// Converts to a JSON value for crossing the tool/provider boundary.
    pub fn to_json(&self) -> Json {
        match self {
            Value::None => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.clone()),
            Value::List(items) => {
                Json::Array(items.lock().unwrap().iter().map(Value::to_json).collect())
            }
            Value::Tuple(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Dict(entries) => {
                let mut map = serde_json::Map::new();
                for (k, v) in entries.lock().unwrap().iter() {
                    map.insert(k.clone(), v.to_json());
                }
                Json::Object(map)
            }
            Value::Function(f) => Json::String(format!("<function {}>", f.name)),
            Value::Native(name) => Json::String(format!("<built-in function {name}>")),
        }
    }

    pub fn from_json(json: Json) -> Self {
        match json {
            Json::Null => Value::None,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Json::String(s) => Value::Str(s),
            Json::Array(items) => Value::list(items.into_iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::dict(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

/// One lexical scope: a flat name -> value map. Function calls push a new
/// scope; loops and conditionals do not (Python-style scoping, not block
/// scoping).
pub type Scope = HashMap<String, Value>;
