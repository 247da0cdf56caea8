//! Tree-walking evaluator for the restricted grammar.
//!
//! Every evaluation entry point is `async` because expressions can call
//! tools, which are themselves async; the `Scope` stack and operation
//! budget are threaded through an `&mut Evaluator` rather than globals so a
//! single process can run many sandboxes concurrently.

use super::ast::{BinaryOp, BoolOp, CompareOp, Expr, FStringPart, Stmt, Target, UnaryOp};
use super::builtins;
use super::value::{Scope, Value};
use crate::hooks::{Hooks, PreToolUseEvent};
use crate::state::State;
use crate::tools::Tool;
use crate::Error;
use std::collections::HashMap;
use std::sync::Arc;

/// Caps runaway loops independent of the operation budget, since a `while
/// True: pass` body can spin without ever touching the interpreter's more
/// expensive operations.
const MAX_WHILE_ITERATIONS: u64 = 100_000;

/// What a block of top-level code produced.
pub enum Outcome {
    /// The block ran to completion without calling `final_answer(...)`.
    Completed(Value),
    /// `final_answer(...)` was called.
    FinalAnswer(Value),
}

enum Flow {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
    FinalAnswer(Value),
}

pub struct Evaluator<'a> {
    pub scopes: Vec<Scope>,
    pub tools: &'a HashMap<String, Arc<Tool>>,
    pub authorized_imports: &'a [String],
    pub operations: u64,
    pub max_operations: u64,
    hooks: Option<&'a Hooks>,
    history: &'a [serde_json::Value],
    tool_call_counter: u64,
    state: Option<&'a State>,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        globals: Scope,
        tools: &'a HashMap<String, Arc<Tool>>,
        authorized_imports: &'a [String],
        max_operations: u64,
        hooks: Option<&'a Hooks>,
        history: &'a [serde_json::Value],
        state: Option<&'a State>,
    ) -> Self {
        Self {
            scopes: vec![globals],
            tools,
            authorized_imports,
            operations: 0,
            max_operations,
            hooks,
            history,
            tool_call_counter: 0,
            state,
        }
    }

    pub fn into_globals(mut self) -> Scope {
        self.scopes.remove(0)
    }

    fn tick(&mut self, line: usize) -> crate::Result<()> {
        self.operations += 1;
        if self.operations > self.max_operations {
            return Err(Error::interpreter(
                format!("operation budget of {} exceeded", self.max_operations),
                line,
            ));
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        self.scopes.iter().rev().find_map(|s| s.get(name).cloned())
    }

    fn assign(&mut self, name: &str, value: Value) {
        self.scopes
            .last_mut()
            .expect("at least one scope")
            .insert(name.to_string(), value);
    }

    pub async fn run_block(&mut self, body: &[Stmt]) -> crate::Result<Outcome> {
        match self.exec_block(body).await? {
            Flow::FinalAnswer(v) => Ok(Outcome::FinalAnswer(v)),
            Flow::Return(v) | Flow::Normal(v) => Ok(Outcome::Completed(v)),
            Flow::Break | Flow::Continue => Ok(Outcome::Completed(Value::None)),
        }
    }

    async fn exec_block(&mut self, body: &[Stmt]) -> crate::Result<Flow> {
        let mut last = Value::None;
        for stmt in body {
            match self.exec_stmt(stmt).await? {
                Flow::Normal(v) => last = v,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal(last))
    }

    fn exec_stmt<'b>(
        &'b mut self,
        stmt: &'b Stmt,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = crate::Result<Flow>> + Send + 'b>>
    {
        Box::pin(async move {
            self.tick(0)?;
            match stmt {
                Stmt::Expr(expr) => Ok(Flow::Normal(self.eval_expr(expr).await?)),
                Stmt::Assign { target, value } => {
                    let v = self.eval_expr(value).await?;
                    self.assign_target(target, v).await?;
                    Ok(Flow::Normal(Value::None))
                }
                Stmt::AugAssign { target, op, value } => {
                    let current = self.eval_target(target).await?;
                    let rhs = self.eval_expr(value).await?;
                    let combined = apply_binary(*op, &current, &rhs)?;
                    self.assign_target(target, combined).await?;
                    Ok(Flow::Normal(Value::None))
                }
                Stmt::If { test, body, orelse } => {
                    if self.eval_expr(test).await?.is_truthy() {
                        self.exec_block(body).await
                    } else {
                        self.exec_block(orelse).await
                    }
                }
                Stmt::For { target, iter, body } => {
                    let iterable = self.eval_expr(iter).await?;
                    let items = iterate_values(&iterable)?;
                    for item in items {
                        self.assign(target, item);
                        match self.exec_block(body).await? {
                            Flow::Break => break,
                            Flow::Continue | Flow::Normal(_) => continue,
                            other => return Ok(other),
                        }
                    }
                    Ok(Flow::Normal(Value::None))
                }
                Stmt::While { test, body } => {
                    let mut iterations = 0u64;
                    while self.eval_expr(test).await?.is_truthy() {
                        iterations += 1;
                        if iterations > MAX_WHILE_ITERATIONS {
                            return Err(Error::interpreter(
                                "while loop exceeded the maximum iteration count",
                                0,
                            ));
                        }
                        match self.exec_block(body).await? {
                            Flow::Break => break,
                            Flow::Continue | Flow::Normal(_) => continue,
                            other => return Ok(other),
                        }
                    }
                    Ok(Flow::Normal(Value::None))
                }
                Stmt::FunctionDef(def) => {
                    self.assign(&def.name, Value::Function(def.clone()));
                    Ok(Flow::Normal(Value::None))
                }
                Stmt::Return(expr) => {
                    let v = match expr {
                        Some(e) => self.eval_expr(e).await?,
                        None => Value::None,
                    };
                    Ok(Flow::Return(v))
                }
                Stmt::Break => Ok(Flow::Break),
                Stmt::Continue => Ok(Flow::Continue),
                Stmt::Pass => Ok(Flow::Normal(Value::None)),
                Stmt::Raise(expr) => {
                    let message = match expr {
                        Some(e) => self.format_raised(e).await?,
                        None => "exception raised".to_string(),
                    };
                    Err(Error::interpreter(message, 0))
                }
                Stmt::Assert { test, message } => {
                    if self.eval_expr(test).await?.is_truthy() {
                        Ok(Flow::Normal(Value::None))
                    } else {
                        let msg = match message {
                            Some(e) => self.eval_expr(e).await?.to_display_string(),
                            None => "assertion failed".to_string(),
                        };
                        Err(Error::interpreter(msg, 0))
                    }
                }
                Stmt::Import { module, alias } => {
                    self.check_import(module)?;
                    let bound = alias.clone().unwrap_or_else(|| module.clone());
                    self.assign(&bound, Value::Native(Arc::from(module.as_str())));
                    Ok(Flow::Normal(Value::None))
                }
                Stmt::ImportFrom { module, names } => {
                    self.check_import(module)?;
                    for (name, alias) in names {
                        let bound = alias.clone().unwrap_or_else(|| name.clone());
                        self.assign(&bound, Value::Native(Arc::from(format!("{module}.{name}").as_str())));
                    }
                    Ok(Flow::Normal(Value::None))
                }
                Stmt::FinalAnswer(expr) => {
                    let v = self.eval_expr(expr).await?;
                    Ok(Flow::FinalAnswer(v))
                }
                Stmt::Try { body, handlers, orelse, finalbody } => {
                    let body_result = self.exec_block(body).await;
                    let outcome: crate::Result<Flow> = match body_result {
                        Ok(Flow::Normal(v)) => {
                            if orelse.is_empty() {
                                Ok(Flow::Normal(v))
                            } else {
                                self.exec_block(orelse).await
                            }
                        }
                        Ok(other) => Ok(other),
                        Err(e) => {
                            let mut matched = None;
                            for handler in handlers {
                                if error_matches(&e, &handler.exc_type) {
                                    if let Some(name) = &handler.binding {
                                        self.assign(name, Value::Str(e.to_string()));
                                    }
                                    matched = Some(self.exec_block(&handler.body).await);
                                    break;
                                }
                            }
                            matched.unwrap_or(Err(e))
                        }
                    };
                    if finalbody.is_empty() {
                        outcome
                    } else {
                        match self.exec_block(finalbody).await? {
                            Flow::Normal(_) => outcome,
                            other => Ok(other),
                        }
                    }
                }
                Stmt::With { context, binding, body } => {
                    let value = self.eval_expr(context).await?;
                    if let Some(name) = binding {
                        self.assign(name, value);
                    }
                    self.exec_block(body).await
                }
            }
        })
    }

    /// Renders a `raise`d expression to the message carried by the resulting
    /// error. `raise SomeError("reason")` calls a name with no real class
    /// behind it (the sandbox models no exception hierarchy), so an
    /// undefined call-style name is treated as a synthetic exception
    /// constructor and rendered as `"SomeError: reason"` rather than failing
    /// with a name error; this is the string `except SomeError:` matches
    /// against by substring.
    async fn format_raised(&mut self, expr: &Expr) -> crate::Result<String> {
        if let Expr::Call { func, args, .. } = expr {
            if let Expr::Name(name) = func.as_ref() {
                if self.lookup(name).is_none()
                    && !self.tools.contains_key(name.as_str())
                    && !builtins::is_builtin(name)
                {
                    let mut rendered = Vec::with_capacity(args.len());
                    for a in args {
                        rendered.push(self.eval_expr(a).await?.to_display_string());
                    }
                    return Ok(format!("{name}: {}", rendered.join(", ")));
                }
            }
        }
        Ok(self.eval_expr(expr).await?.to_display_string())
    }

    fn check_import(&self, module: &str) -> crate::Result<()> {
        const ALWAYS_BANNED: &[&str] = &["os", "sys", "subprocess", "socket", "importlib", "ctypes", "io"];
        let root = module.split('.').next().unwrap_or(module);
        if ALWAYS_BANNED.contains(&root) {
            return Err(Error::interpreter(
                format!("import of '{module}' is not permitted"),
                0,
            ));
        }
        if !self.authorized_imports.iter().any(|m| m == root || m == "*") {
            return Err(Error::interpreter(
                format!("'{module}' is not in the authorized imports list"),
                0,
            ));
        }
        Ok(())
    }

    async fn assign_target(&mut self, target: &Target, value: Value) -> crate::Result<()> {
        match target {
            Target::Name(name) => {
                self.assign(name, value);
                Ok(())
            }
            Target::Subscript { value: container, index } => {
                let container_val = self.eval_expr(container).await?;
                let index_val = self.eval_expr(index).await?;
                match &container_val {
                    Value::List(items) => {
                        let i = expect_index(&index_val)?;
                        let mut guard = items.lock().unwrap();
                        let len = guard.len();
                        if i < 0 || i as usize >= len {
                            return Err(Error::interpreter("list index out of range", 0));
                        }
                        guard[i as usize] = value;
                        Ok(())
                    }
                    Value::Dict(entries) => {
                        let key = index_val.to_display_string();
                        let mut guard = entries.lock().unwrap();
                        if let Some(entry) = guard.iter_mut().find(|(k, _)| *k == key) {
                            entry.1 = value;
                        } else {
                            guard.push((key, value));
                        }
                        Ok(())
                    }
                    other => Err(Error::interpreter(
                        format!("'{}' object does not support item assignment", other.type_name()),
                        0,
                    )),
                }
            }
            Target::Tuple(targets) => {
                let items = match &value {
                    Value::List(items) => items.lock().unwrap().clone(),
                    Value::Tuple(items) => items.as_ref().clone(),
                    other => {
                        return Err(Error::interpreter(
                            format!("cannot unpack non-sequence value '{}'", other.type_name()),
                            0,
                        ))
                    }
                };
                if items.len() != targets.len() {
                    return Err(Error::interpreter(
                        format!(
                            "expected {} values to unpack, found {}",
                            targets.len(),
                            items.len()
                        ),
                        0,
                    ));
                }
                for (t, v) in targets.iter().zip(items.into_iter()) {
                    Box::pin(self.assign_target(t, v)).await?;
                }
                Ok(())
            }
        }
    }

    async fn eval_target(&mut self, target: &Target) -> crate::Result<Value> {
        match target {
            Target::Name(name) => self
                .lookup(name)
                .ok_or_else(|| Error::interpreter(format!("name '{name}' is not defined"), 0)),
            Target::Subscript { value, index } => {
                let expr = Expr::Subscript {
                    value: Box::new(value.clone()),
                    index: Box::new(index.clone()),
                };
                self.eval_expr(&expr).await
            }
            Target::Tuple(_) => Err(Error::interpreter("invalid augmented-assignment target", 0)),
        }
    }

    fn eval_expr<'b>(
        &'b mut self,
        expr: &'b Expr,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = crate::Result<Value>> + Send + 'b>>
    {
        Box::pin(async move {
            self.tick(0)?;
            match expr {
                Expr::None => Ok(Value::None),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Int(i) => Ok(Value::Int(*i)),
                Expr::Float(f) => Ok(Value::Float(*f)),
                Expr::Str(s) => Ok(Value::Str(s.clone())),
                Expr::FString(parts) => {
                    let mut out = String::new();
                    for part in parts {
                        match part {
                            FStringPart::Literal(s) => out.push_str(s),
                            FStringPart::Expr(e) => {
                                out.push_str(&self.eval_expr(e).await?.to_display_string())
                            }
                        }
                    }
                    Ok(Value::Str(out))
                }
                Expr::Name(name) => self.eval_name(name),
                Expr::List(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval_expr(item).await?);
                    }
                    Ok(Value::list(values))
                }
                Expr::Dict(entries) => {
                    let mut out = Vec::with_capacity(entries.len());
                    for (k, v) in entries {
                        let key = self.eval_expr(k).await?.to_display_string();
                        let value = self.eval_expr(v).await?;
                        out.push((key, value));
                    }
                    Ok(Value::dict(out))
                }
                Expr::UnaryOp { op, operand } => {
                    let v = self.eval_expr(operand).await?;
                    apply_unary(*op, &v)
                }
                Expr::BinaryOp { op, left, right } => {
                    let l = self.eval_expr(left).await?;
                    let r = self.eval_expr(right).await?;
                    apply_binary(*op, &l, &r)
                }
                Expr::BoolOp { op, values } => {
                    match op {
                        BoolOp::And => {
                            let mut last = Value::Bool(true);
                            for v in values {
                                last = self.eval_expr(v).await?;
                                if !last.is_truthy() {
                                    return Ok(last);
                                }
                            }
                            Ok(last)
                        }
                        BoolOp::Or => {
                            let mut last = Value::Bool(false);
                            for v in values {
                                last = self.eval_expr(v).await?;
                                if last.is_truthy() {
                                    return Ok(last);
                                }
                            }
                            Ok(last)
                        }
                    }
                }
                Expr::Compare { left, ops, comparators } => {
                    let mut current = self.eval_expr(left).await?;
                    for (op, comp_expr) in ops.iter().zip(comparators.iter()) {
                        let comp = self.eval_expr(comp_expr).await?;
                        if !apply_compare(*op, &current, &comp)? {
                            return Ok(Value::Bool(false));
                        }
                        current = comp;
                    }
                    Ok(Value::Bool(true))
                }
                Expr::Attribute { value, attr } => {
                    if attr.starts_with("__") {
                        return Err(Error::interpreter(
                            format!("access to dunder attribute '{attr}' is not permitted"),
                            0,
                        ));
                    }
                    // Bare attribute access (no call parens) only makes sense for
                    // zero-argument methods like `.keys`/`.upper`; route through
                    // the same dispatcher a call would use, with no arguments.
                    let v = self.eval_expr(value).await?;
                    builtins::call_method(&v, attr, Vec::new())
                }
                Expr::Subscript { value, index } => {
                    let v = self.eval_expr(value).await?;
                    let idx = self.eval_expr(index).await?;
                    match &v {
                        Value::List(items) => {
                            let i = expect_index(&idx)?;
                            let guard = items.lock().unwrap();
                            let len = guard.len() as i64;
                            let resolved = if i < 0 { i + len } else { i };
                            guard
                                .get(resolved as usize)
                                .cloned()
                                .ok_or_else(|| Error::interpreter("list index out of range", 0))
                        }
                        Value::Dict(entries) => {
                            let key = idx.to_display_string();
                            entries
                                .lock()
                                .unwrap()
                                .iter()
                                .find(|(k, _)| *k == key)
                                .map(|(_, v)| v.clone())
                                .ok_or_else(|| Error::interpreter(format!("key '{key}' not found"), 0))
                        }
                        Value::Str(s) => {
                            let i = expect_index(&idx)?;
                            let chars: Vec<char> = s.chars().collect();
                            let len = chars.len() as i64;
                            let resolved = if i < 0 { i + len } else { i };
                            chars
                                .get(resolved as usize)
                                .map(|c| Value::Str(c.to_string()))
                                .ok_or_else(|| Error::interpreter("string index out of range", 0))
                        }
                        Value::Tuple(items) => {
                            let i = expect_index(&idx)?;
                            let len = items.len() as i64;
                            let resolved = if i < 0 { i + len } else { i };
                            items
                                .get(resolved as usize)
                                .cloned()
                                .ok_or_else(|| Error::interpreter("tuple index out of range", 0))
                        }
                        other => Err(Error::interpreter(
                            format!("'{}' object is not subscriptable", other.type_name()),
                            0,
                        )),
                    }
                }
                Expr::ListComp { element, target, iter, condition } => {
                    let iterable = self.eval_expr(iter).await?;
                    let items = iterate_values(&iterable)?;
                    let mut out = Vec::new();
                    for item in items {
                        self.assign(target, item);
                        if let Some(cond) = condition {
                            if !self.eval_expr(cond).await?.is_truthy() {
                                continue;
                            }
                        }
                        out.push(self.eval_expr(element).await?);
                    }
                    Ok(Value::list(out))
                }
                Expr::DictComp { key, value, target, iter, condition } => {
                    let iterable = self.eval_expr(iter).await?;
                    let items = iterate_values(&iterable)?;
                    let mut out = Vec::new();
                    for item in items {
                        self.assign(target, item);
                        if let Some(cond) = condition {
                            if !self.eval_expr(cond).await?.is_truthy() {
                                continue;
                            }
                        }
                        let k = self.eval_expr(key).await?.to_display_string();
                        let v = self.eval_expr(value).await?;
                        out.push((k, v));
                    }
                    Ok(Value::dict(out))
                }
                Expr::Tuple(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval_expr(item).await?);
                    }
                    Ok(Value::tuple(values))
                }
                Expr::Set(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval_expr(item).await?);
                    }
                    Ok(Value::list(values))
                }
                Expr::SetComp { element, target, iter, condition } => {
                    let iterable = self.eval_expr(iter).await?;
                    let items = iterate_values(&iterable)?;
                    let mut out = Vec::new();
                    for item in items {
                        self.assign(target, item);
                        if let Some(cond) = condition {
                            if !self.eval_expr(cond).await?.is_truthy() {
                                continue;
                            }
                        }
                        out.push(self.eval_expr(element).await?);
                    }
                    Ok(Value::list(out))
                }
                Expr::IfExp { test, body, orelse } => {
                    if self.eval_expr(test).await?.is_truthy() {
                        self.eval_expr(body).await
                    } else {
                        self.eval_expr(orelse).await
                    }
                }
                Expr::Await(inner) => self.eval_expr(inner).await,
                Expr::Call { func, args, kwargs } => self.eval_call(func, args, kwargs).await,
            }
        })
    }

    fn eval_name(&self, name: &str) -> crate::Result<Value> {
        if let Some(v) = self.lookup(name) {
            return Ok(v);
        }
        if builtins::is_builtin(name) || self.tools.contains_key(name) {
            return Ok(Value::Native(Arc::from(name)));
        }
        Err(Error::interpreter(
            builtins::name_error_with_hint(name, self.tools, &self.scopes),
            0,
        ))
    }

    async fn eval_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> crate::Result<Value> {
        let mut arg_values = Vec::with_capacity(args.len());
        for a in args {
            arg_values.push(self.eval_expr(a).await?);
        }
        let mut kwarg_values = Vec::with_capacity(kwargs.len());
        for (k, v) in kwargs {
            kwarg_values.push((k.clone(), self.eval_expr(v).await?));
        }

        if let Expr::Attribute { value, attr } = func {
            if attr == "parallel" && matches!(value.as_ref(), Expr::Name(n) if n == "multi_tool_use")
            {
                let config = arg_values
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::interpreter("parallel() requires a config argument", 0))?;
                return super::multi_tool_use::parallel(&config, self.tools).await;
            }
            let receiver = self.eval_expr(value).await?;
            return builtins::call_method(&receiver, attr, arg_values);
        }

        let Expr::Name(name) = func else {
            let callee = self.eval_expr(func).await?;
            return self.call_value(&callee, arg_values, kwarg_values).await;
        };

        if let Some(tool) = self.tools.get(name.as_str()).cloned() {
            return self.call_tool(&tool, arg_values, kwarg_values).await;
        }

        // A bound name can be a user function, or (e.g. after `from
        // multi_tool_use import parallel`) a `Value::Native` alias for a tool
        // or synthetic entry point — dispatch either through `call_value`
        // rather than only special-casing `Function` here.
        if let Some(value) = self.lookup(name) {
            if let Value::Function(def) = &value {
                return self.call_user_function(def, arg_values, kwarg_values).await;
            }
            return self.call_value(&value, arg_values, kwarg_values).await;
        }

        if builtins::is_builtin(name) {
            return builtins::call_builtin(name, arg_values).await;
        }

        Err(Error::interpreter(
            builtins::name_error_with_hint(name, self.tools, &self.scopes),
            0,
        ))
    }

    async fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> crate::Result<Value> {
        match callee {
            Value::Function(def) => self.call_user_function(def, args, kwargs).await,
            Value::Native(name) => {
                if name.as_ref() == super::multi_tool_use::NAME {
                    let config = args.into_iter().next().ok_or_else(|| {
                        Error::interpreter("parallel() requires a config argument", 0)
                    })?;
                    return super::multi_tool_use::parallel(&config, self.tools).await;
                }
                if let Some(tool) = self.tools.get(name.as_ref()).cloned() {
                    self.call_tool(&tool, args, kwargs).await
                } else {
                    builtins::call_builtin(name, args).await
                }
            }
            other => Err(Error::interpreter(
                format!("'{}' object is not callable", other.type_name()),
                0,
            )),
        }
    }

    async fn call_tool(
        &mut self,
        tool: &Tool,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> crate::Result<Value> {
        let mut input = serde_json::Map::new();
        for (i, v) in args.into_iter().enumerate() {
            input.insert(format!("arg{i}"), v.to_json());
        }
        for (k, v) in kwargs {
            input.insert(k, v.to_json());
        }
        let mut arguments = serde_json::Value::Object(input);

        // Tools marked `needs_state` at registration get a read-only snapshot
        // of the run's shared namespace under a reserved key rather than a
        // live handle, so the sandbox never hands out mutable access to
        // state a concurrently-running evaluator might also touch.
        if tool.needs_state() {
            if let (Some(state), serde_json::Value::Object(map)) =
                (self.state, &mut arguments)
            {
                map.insert(
                    "__state__".to_string(),
                    serde_json::json!({
                        "variables": state.variables(),
                        "step_count": state.step_count,
                        "error_count": state.error_count,
                        "final_answer": state.final_answer,
                    }),
                );
            }
        }

        self.tool_call_counter += 1;
        let tool_use_id = format!("call_{}", self.tool_call_counter);

        if let Some(hooks) = self.hooks {
            let event = PreToolUseEvent::new(
                tool.name().to_string(),
                arguments.clone(),
                tool_use_id.clone(),
                self.history.to_vec(),
            );
            if let Some(decision) = hooks.execute_pre_tool_use(event).await {
                if !decision.continue_execution {
                    return Err(Error::tool_invocation(
                        tool.name().to_string(),
                        decision
                            .reason
                            .unwrap_or_else(|| "blocked by pre_tool_use hook".to_string()),
                    ));
                }
                if let Some(modified) = decision.modified_input {
                    arguments = modified;
                }
            }
        }

        let result = tool
            .execute(arguments.clone())
            .await
            .map_err(|e| Error::tool_invocation(tool.name().to_string(), e.to_string()))?;

        if let Some(hooks) = self.hooks {
            let event = crate::hooks::PostToolUseEvent::new(
                tool.name().to_string(),
                arguments,
                tool_use_id,
                result.clone(),
                self.history.to_vec(),
            );
            hooks.execute_post_tool_use(event).await;
        }

        Ok(Value::from_json(result))
    }

    async fn call_user_function(
        &mut self,
        def: &Arc<super::ast::FunctionDef>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> crate::Result<Value> {
        let mut scope = Scope::new();
        for (default_name, default_expr) in &def.defaults {
            let v = self.eval_expr(default_expr).await?;
            scope.insert(default_name.clone(), v);
        }
        for (i, value) in args.into_iter().enumerate() {
            if let Some(name) = def.params.get(i) {
                scope.insert(name.clone(), value);
            }
        }
        for (k, v) in kwargs {
            scope.insert(k, v);
        }
        self.scopes.push(scope);
        let result = self.exec_block(&def.body).await;
        self.scopes.pop();
        match result? {
            Flow::Return(v) | Flow::Normal(v) => Ok(v),
            Flow::FinalAnswer(v) => Ok(v),
            Flow::Break | Flow::Continue => Ok(Value::None),
        }
    }
}

/// Materializes the iteration sequence for `for`, list/dict/set
/// comprehensions: lists and tuples yield their elements, strings yield
/// one-character strings, dicts yield their keys.
fn iterate_values(v: &Value) -> crate::Result<Vec<Value>> {
    match v {
        Value::List(items) => Ok(items.lock().unwrap().clone()),
        Value::Tuple(items) => Ok(items.as_ref().clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Dict(entries) => Ok(entries
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| Value::Str(k.clone()))
            .collect()),
        other => Err(Error::interpreter(
            format!("'{}' object is not iterable", other.type_name()),
            0,
        )),
    }
}

/// Whether a raised error matches an `except [exc_type]:` clause. There's no
/// real exception class hierarchy in the sandbox, so `exc_type` is matched
/// against the error's display text by substring; `None` (a bare `except:`)
/// matches anything.
fn error_matches(err: &crate::Error, exc_type: &Option<String>) -> bool {
    match exc_type {
        None => true,
        Some(pattern) => err.to_string().contains(pattern.as_str()),
    }
}

fn expect_index(value: &Value) -> crate::Result<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(Error::interpreter(
            format!("list indices must be integers, not '{}'", other.type_name()),
            0,
        )),
    }
}

fn apply_unary(op: UnaryOp, v: &Value) -> crate::Result<Value> {
    match (op, v) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(-i)),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Int(i)) => Ok(Value::Int(*i)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        _ => Err(Error::interpreter(
            format!("bad operand type for unary operator: '{}'", v.type_name()),
            0,
        )),
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> crate::Result<Value> {
    use Value::{Float, Int, Str};
    match (left, right) {
        (Str(a), Str(b)) if op == BinaryOp::Add => Ok(Str(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) if op == BinaryOp::Add => {
            let mut combined = a.lock().unwrap().clone();
            combined.extend(b.lock().unwrap().clone());
            Ok(Value::list(combined))
        }
        (Str(a), Int(n)) if op == BinaryOp::Mul => Ok(Str(a.repeat((*n).max(0) as usize))),
        (Int(a), Int(b)) => numeric_int(op, *a, *b),
        (Float(a), Float(b)) => numeric_float(op, *a, *b),
        (Int(a), Float(b)) => numeric_float(op, *a as f64, *b),
        (Float(a), Int(b)) => numeric_float(op, *a, *b as f64),
        _ => Err(Error::interpreter(
            format!(
                "unsupported operand type(s) for {:?}: '{}' and '{}'",
                op,
                left.type_name(),
                right.type_name()
            ),
            0,
        )),
    }
}

fn numeric_int(op: BinaryOp, a: i64, b: i64) -> crate::Result<Value> {
    Ok(match op {
        BinaryOp::Add => Value::Int(a + b),
        BinaryOp::Sub => Value::Int(a - b),
        BinaryOp::Mul => Value::Int(a * b),
        BinaryOp::Div => Value::Float(a as f64 / b as f64),
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(Error::interpreter("division by zero", 0));
            }
            Value::Int(a.div_euclid(b))
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(Error::interpreter("division by zero", 0));
            }
            Value::Int(a.rem_euclid(b))
        }
        BinaryOp::Pow => Value::Int(a.pow(b.max(0) as u32)),
    })
}

fn numeric_float(op: BinaryOp, a: f64, b: f64) -> crate::Result<Value> {
    Ok(match op {
        BinaryOp::Add => Value::Float(a + b),
        BinaryOp::Sub => Value::Float(a - b),
        BinaryOp::Mul => Value::Float(a * b),
        BinaryOp::Div => Value::Float(a / b),
        BinaryOp::FloorDiv => Value::Float((a / b).floor()),
        BinaryOp::Mod => Value::Float(a % b),
        BinaryOp::Pow => Value::Float(a.powf(b)),
    })
}

fn apply_compare(op: CompareOp, left: &Value, right: &Value) -> crate::Result<bool> {
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::NotEq => Ok(!values_equal(left, right)),
        CompareOp::In => Ok(contains(right, left)?),
        CompareOp::NotIn => Ok(!contains(right, left)?),
        CompareOp::Lt | CompareOp::LtE | CompareOp::Gt | CompareOp::GtE => {
            let ordering = numeric_cmp(left, right)?;
            Ok(match op {
                CompareOp::Lt => ordering == std::cmp::Ordering::Less,
                CompareOp::LtE => ordering != std::cmp::Ordering::Greater,
                CompareOp::Gt => ordering == std::cmp::Ordering::Greater,
                CompareOp::GtE => ordering != std::cmp::Ordering::Less,
                _ => unreachable!(),
            })
        }
    }
}

pub(super) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            let a = a.lock().unwrap();
            let b = b.lock().unwrap();
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        _ => false,
    }
}

fn numeric_cmp(left: &Value, right: &Value) -> crate::Result<std::cmp::Ordering> {
    let as_f64 = |v: &Value| match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    };
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => match (as_f64(left), as_f64(right)) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| Error::interpreter("cannot compare NaN", 0)),
            _ => Err(Error::interpreter(
                format!(
                    "'<' not supported between instances of '{}' and '{}'",
                    left.type_name(),
                    right.type_name()
                ),
                0,
            )),
        },
    }
}

fn contains(container: &Value, needle: &Value) -> crate::Result<bool> {
    match container {
        Value::List(items) => Ok(items.lock().unwrap().iter().any(|v| values_equal(v, needle))),
        Value::Tuple(items) => Ok(items.iter().any(|v| values_equal(v, needle))),
        Value::Str(s) => match needle {
            Value::Str(n) => Ok(s.contains(n.as_str())),
            _ => Err(Error::interpreter("'in <string>' requires string as left operand", 0)),
        },
        Value::Dict(entries) => {
            let key = needle.to_display_string();
            Ok(entries.lock().unwrap().iter().any(|(k, _)| *k == key))
        }
        other => Err(Error::interpreter(
            format!("argument of type '{}' is not iterable", other.type_name()),
            0,
        )),
    }
}
