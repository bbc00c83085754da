//! Tree-walking interpreter.
//!
//! Executes a parsed module against a fresh global scope. Every statement,
//! loop iteration and call consumes one step; bulk operations (building a
//! large list, sorting) consume steps in proportion to their size. The
//! wall-clock deadline is checked as steps are spent, so runaway loops end
//! with a ceiling error instead of hanging the host.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::{Duration, Instant};

use drill_core::{ExecutionLimits, Helper};

use crate::ast::{
    Arg, BinOp, Block, CmpOp, Comprehension, Expr, ExprKind, FStringSegment, FunctionDef,
    ImportName, Stmt, StmtKind, Target, UnaryOp,
};
use crate::builtins;
use crate::error::{ScriptError, ScriptResult};
use crate::format;
use crate::modules;
use crate::parser::parse_program;
use crate::value::{
    position_of, BoundMethod, Dict, ExceptionValue, Function, HashKey, Set, TableValue, Value,
};

/// Cap on captured `print` output.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// How many steps pass between wall-clock checks.
const CLOCK_CHECK_INTERVAL: u64 = 1024;

pub(crate) type Env = Rc<RefCell<Scope>>;

/// One variable scope: the module, a function call or a comprehension.
#[derive(Default)]
pub struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<Env>,
    globals: HashSet<String>,
    nonlocals: HashSet<String>,
    captured: bool,
}

impl Scope {
    fn child_of(parent: &Env) -> Env {
        Rc::new(RefCell::new(Scope {
            parent: Some(parent.clone()),
            ..Default::default()
        }))
    }
}

/// Control flow out of a statement.
#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Lazily produced iteration items.
pub(crate) enum ValueIter {
    Range { next: i64, remaining: usize, step: i64 },
    Items(std::vec::IntoIter<Value>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Range {
                next,
                remaining,
                step,
            } => {
                if *remaining == 0 {
                    return None;
                }
                let value = *next;
                *remaining -= 1;
                *next = next.wrapping_add(*step);
                Some(Value::Int(value))
            }
            ValueIter::Items(items) => items.next(),
        }
    }
}

pub struct Interpreter {
    max_steps: u64,
    max_call_depth: usize,
    max_collection_len: usize,
    timeout_ms: u64,
    deadline: Instant,
    steps: u64,
    depth: usize,
    globals: Env,
    helpers: Vec<Helper>,
    /// Scopes referenced by closures; cleared on drop to break `Rc` cycles.
    captured: Vec<Env>,
    /// Exceptions currently being handled, for bare `raise`.
    handling: Vec<ScriptError>,
    output: String,
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        for scope in self.captured.drain(..) {
            scope.borrow_mut().vars.clear();
        }
        self.globals.borrow_mut().vars.clear();
    }
}

impl Interpreter {
    pub fn new(limits: &ExecutionLimits, helpers: &[Helper]) -> Self {
        Self {
            max_steps: limits.max_steps,
            max_call_depth: limits.max_call_depth,
            max_collection_len: limits.max_collection_len,
            timeout_ms: limits.timeout_ms,
            deadline: Instant::now() + Duration::from_millis(limits.timeout_ms),
            steps: 0,
            depth: 0,
            globals: Rc::new(RefCell::new(Scope::default())),
            helpers: helpers.to_vec(),
            captured: Vec::new(),
            handling: Vec::new(),
            output: String::new(),
        }
    }

    /// Bind a module-level name before the program runs.
    pub fn bind(&mut self, name: &str, value: Value) {
        self.globals.borrow_mut().vars.insert(name.to_string(), value);
    }

    /// Look up a module-level name after the program ran.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().vars.get(name).cloned()
    }

    /// Parse and execute `source` at module level.
    pub fn run(&mut self, source: &str) -> ScriptResult<()> {
        let program = parse_program(source)?;
        let globals = self.globals.clone();
        match self.exec_block(&program, &globals)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(ScriptError::Syntax("'return' outside function".into())),
            Flow::Break | Flow::Continue => {
                Err(ScriptError::Syntax("'break' or 'continue' outside loop".into()))
            }
        }
    }

    /// Captured `print` output.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    // ── Ceilings ──────────────────────────────────────────────

    /// Spend one step.
    pub(crate) fn tick(&mut self) -> ScriptResult<()> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(ScriptError::StepBudget(self.max_steps));
        }
        if self.steps % CLOCK_CHECK_INTERVAL == 0 && Instant::now() >= self.deadline {
            return Err(ScriptError::Timeout(self.timeout_ms));
        }
        Ok(())
    }

    /// Spend steps for a bulk operation over `units` elements and check the clock.
    pub(crate) fn charge(&mut self, units: usize) -> ScriptResult<()> {
        self.steps = self.steps.saturating_add(1 + units as u64 / 16);
        if self.steps > self.max_steps {
            return Err(ScriptError::StepBudget(self.max_steps));
        }
        if Instant::now() >= self.deadline {
            return Err(ScriptError::Timeout(self.timeout_ms));
        }
        Ok(())
    }

    /// Reject collections above the configured size.
    pub(crate) fn check_len(&self, len: usize) -> ScriptResult<()> {
        if len > self.max_collection_len {
            return Err(ScriptError::Memory(format!(
                "collection size {len} exceeds the limit of {} elements",
                self.max_collection_len
            )));
        }
        Ok(())
    }

    pub(crate) fn print(&mut self, text: &str) {
        if self.output.len() + text.len() <= MAX_OUTPUT_BYTES {
            self.output.push_str(text);
        }
    }

    // ── Names ─────────────────────────────────────────────────

    fn lookup(&self, name: &str, env: &Env) -> ScriptResult<Value> {
        let mut current = Some(env.clone());
        while let Some(scope) = current {
            let scope = scope.borrow();
            if let Some(value) = scope.vars.get(name) {
                return Ok(value.clone());
            }
            current = scope.parent.clone();
        }
        builtins::lookup(name)
            .ok_or_else(|| ScriptError::Name(format!("name '{name}' is not defined")))
    }

    fn assign_name(&mut self, name: &str, value: Value, env: &Env) -> ScriptResult<()> {
        let (is_global, is_nonlocal) = {
            let scope = env.borrow();
            (scope.globals.contains(name), scope.nonlocals.contains(name))
        };
        if is_global {
            self.globals.borrow_mut().vars.insert(name.to_string(), value);
            return Ok(());
        }
        if is_nonlocal {
            let mut current = env.borrow().parent.clone();
            while let Some(scope) = current {
                if Rc::ptr_eq(&scope, &self.globals) {
                    break;
                }
                if scope.borrow().vars.contains_key(name) {
                    scope.borrow_mut().vars.insert(name.to_string(), value);
                    return Ok(());
                }
                current = scope.borrow().parent.clone();
            }
            return Err(ScriptError::Syntax(format!(
                "no binding for nonlocal '{name}' found"
            )));
        }
        env.borrow_mut().vars.insert(name.to_string(), value);
        Ok(())
    }

    fn delete_name(&mut self, name: &str, env: &Env) -> ScriptResult<()> {
        let target = if env.borrow().globals.contains(name) {
            self.globals.clone()
        } else {
            env.clone()
        };
        let removed = target.borrow_mut().vars.remove(name);
        removed
            .map(|_| ())
            .ok_or_else(|| ScriptError::Name(format!("name '{name}' is not defined")))
    }

    fn assign(&mut self, target: &Target, value: Value, env: &Env) -> ScriptResult<()> {
        match target {
            Target::Name(name) => self.assign_name(name, value, env),
            Target::Subscript { value: obj, index } => {
                let container = self.eval(obj, env)?;
                if let ExprKind::Slice { lower, upper, step } = &index.kind {
                    let bounds = self.slice_bounds(lower, upper, step, env)?;
                    return self.set_slice(&container, bounds, value);
                }
                let key = self.eval(index, env)?;
                self.set_item(&container, key, value)
            }
            Target::Tuple(targets) => {
                let items: Vec<Value> = self.iterate(&value)?.collect();
                if items.len() != targets.len() {
                    return Err(ScriptError::Value(if items.len() > targets.len() {
                        format!("too many values to unpack (expected {})", targets.len())
                    } else {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        )
                    }));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, env)?;
                }
                Ok(())
            }
        }
    }

    // ── Statements ────────────────────────────────────────────

    pub(crate) fn exec_block(&mut self, block: &Block, env: &Env) -> ScriptResult<Flow> {
        for stmt in block {
            match self.exec_stmt(stmt, env).map_err(|e| e.at(stmt.line))? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> ScriptResult<Flow> {
        self.tick()?;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, env)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, env)?;
                for target in targets {
                    self.assign(target, value.clone(), env)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                self.exec_aug_assign(target, *op, value, env)?;
            }
            StmtKind::AnnAssign { target, value } => {
                if let Some(value) = value {
                    let value = self.eval(value, env)?;
                    self.assign(target, value, env)?;
                }
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    if self.eval(test, env)?.truthy() {
                        return self.exec_block(body, env);
                    }
                }
                if let Some(body) = orelse {
                    return self.exec_block(body, env);
                }
            }
            StmtKind::While { test, body, orelse } => {
                loop {
                    self.tick()?;
                    if !self.eval(test, env)?.truthy() {
                        if let Some(orelse) = orelse {
                            return self.exec_block(orelse, env);
                        }
                        break;
                    }
                    match self.exec_block(body, env)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iterable = self.eval(iter, env)?;
                let mut broke = false;
                for item in self.iterate(&iterable)? {
                    self.tick()?;
                    self.assign(target, item, env)?;
                    match self.exec_block(body, env)? {
                        Flow::Break => {
                            broke = true;
                            break;
                        }
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                if !broke {
                    if let Some(orelse) = orelse {
                        return self.exec_block(orelse, env);
                    }
                }
            }
            StmtKind::FunctionDef(def) => {
                let function = self.make_function(def, env)?;
                self.assign_name(&def.name, function, env)?;
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Import(names) => {
                for ImportName { name, alias } in names {
                    let module = self.import(name)?;
                    self.assign_name(alias.as_deref().unwrap_or(name), module, env)?;
                }
            }
            StmtKind::ImportFrom { module, names } => {
                let Value::Module(module) = self.import(module)? else {
                    return Err(ScriptError::Import(format!("'{module}' is not a module")));
                };
                for import in names {
                    let value = modules::attr(module, &import.name).ok_or_else(|| {
                        ScriptError::Import(format!(
                            "cannot import name '{}' from '{module}'",
                            import.name
                        ))
                    })?;
                    self.assign_name(import.bound_name(), value, env)?;
                }
            }
            StmtKind::Global(names) => {
                if !Rc::ptr_eq(env, &self.globals) {
                    env.borrow_mut().globals.extend(names.iter().cloned());
                }
            }
            StmtKind::Nonlocal(names) => {
                if Rc::ptr_eq(env, &self.globals) {
                    return Err(ScriptError::Syntax(
                        "nonlocal declaration not allowed at module level".into(),
                    ));
                }
                env.borrow_mut().nonlocals.extend(names.iter().cloned());
            }
            StmtKind::Assert { test, message } => {
                if !self.eval(test, env)?.truthy() {
                    let message = match message {
                        Some(expr) => self.eval(expr, env)?.to_str(),
                        None => String::new(),
                    };
                    return Err(ScriptError::Assertion(message));
                }
            }
            StmtKind::Del(targets) => {
                for target in targets {
                    self.delete(target, env)?;
                }
            }
            StmtKind::Raise(value) => return Err(self.raise(value.as_ref(), env)?),
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finally,
            } => return self.exec_try(body, handlers, orelse.as_ref(), finally.as_ref(), env),
        }
        Ok(Flow::Normal)
    }

    fn exec_aug_assign(
        &mut self,
        target: &Target,
        op: BinOp,
        value: &Expr,
        env: &Env,
    ) -> ScriptResult<()> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name, env)?;
                let rhs = self.eval(value, env)?;
                let updated = self.augmented(op, current, &rhs)?;
                self.assign_name(name, updated, env)
            }
            Target::Subscript { value: obj, index } => {
                let container = self.eval(obj, env)?;
                let key = self.eval(index, env)?;
                let current = self.get_item(&container, &key)?;
                let rhs = self.eval(value, env)?;
                let updated = self.augmented(op, current, &rhs)?;
                self.set_item(&container, key, updated)
            }
            Target::Tuple(_) => Err(ScriptError::Syntax(
                "illegal expression for augmented assignment".into(),
            )),
        }
    }

    /// `+=` on a list extends it in place; everything else rebinds.
    fn augmented(&mut self, op: BinOp, current: Value, rhs: &Value) -> ScriptResult<Value> {
        if let (BinOp::Add, Value::List(items)) = (op, &current) {
            let extra: Vec<Value> = self.iterate(rhs)?.collect();
            let len = items.borrow().len() + extra.len();
            self.check_len(len)?;
            self.charge(extra.len())?;
            items.borrow_mut().extend(extra);
            return Ok(current);
        }
        self.binary(op, &current, rhs)
    }

    fn delete(&mut self, target: &Target, env: &Env) -> ScriptResult<()> {
        match target {
            Target::Name(name) => self.delete_name(name, env),
            Target::Tuple(targets) => {
                for t in targets {
                    self.delete(t, env)?;
                }
                Ok(())
            }
            Target::Subscript { value, index } => {
                let container = self.eval(value, env)?;
                if let ExprKind::Slice { lower, upper, step } = &index.kind {
                    let bounds = self.slice_bounds(lower, upper, step, env)?;
                    let Value::List(items) = &container else {
                        return Err(ScriptError::Type(format!(
                            "'{}' object does not support item deletion",
                            container.type_name()
                        )));
                    };
                    let len = items.borrow().len();
                    let mut doomed = slice_indices(len, bounds)?;
                    doomed.sort_unstable();
                    let mut items = items.borrow_mut();
                    for i in doomed.into_iter().rev() {
                        items.remove(i);
                    }
                    return Ok(());
                }
                let key = self.eval(index, env)?;
                match &container {
                    Value::List(items) => {
                        let len = items.borrow().len();
                        let i = normalize_index(&key, len, "list")?;
                        items.borrow_mut().remove(i);
                        Ok(())
                    }
                    Value::Dict(d) => {
                        let hash = HashKey::of(&key)?;
                        d.borrow_mut()
                            .remove(&hash)
                            .map(|_| ())
                            .ok_or_else(|| ScriptError::Key(key.repr()))
                    }
                    other => Err(ScriptError::Type(format!(
                        "'{}' object does not support item deletion",
                        other.type_name()
                    ))),
                }
            }
        }
    }

    fn raise(&mut self, value: Option<&Expr>, env: &Env) -> ScriptResult<ScriptError> {
        let Some(expr) = value else {
            return Ok(self.handling.last().cloned().unwrap_or_else(|| {
                ScriptError::Runtime("No active exception to reraise".into())
            }));
        };
        match self.eval(expr, env)? {
            Value::ExceptionType(kind) => Ok(ScriptError::from_kind(&kind, String::new())),
            Value::Exception(e) => Ok(ScriptError::from_kind(&e.kind, e.message.clone())),
            other => Err(ScriptError::Type(format!(
                "exceptions must derive from BaseException, not {}",
                other.type_name()
            ))),
        }
    }

    fn exec_try(
        &mut self,
        body: &Block,
        handlers: &[crate::ast::ExceptHandler],
        orelse: Option<&Block>,
        finally: Option<&Block>,
        env: &Env,
    ) -> ScriptResult<Flow> {
        let mut result = self.exec_block(body, env);

        if let Err(error) = &result {
            if !error.is_ceiling() {
                let kind = error.kind().to_string();
                if let Some(handler) = handlers
                    .iter()
                    .find(|h| h.kinds.is_empty() || h.kinds.iter().any(|k| catches(k, &kind)))
                {
                    let error = error.clone();
                    if let Some(name) = &handler.name {
                        let exception = Value::Exception(Rc::new(ExceptionValue {
                            kind: Rc::from(kind.as_str()),
                            message: error.message(),
                        }));
                        self.assign_name(name, exception, env)?;
                    }
                    self.handling.push(error);
                    result = self
                        .exec_block(&handler.body, env)
                        .map_err(|e| e.at(handler.line));
                    self.handling.pop();
                }
            }
        } else if let (Ok(Flow::Normal), Some(orelse)) = (&result, orelse) {
            result = self.exec_block(orelse, env);
        }

        if let Some(finally) = finally {
            if result.as_ref().is_err_and(|e| e.is_ceiling()) {
                return result;
            }
            match self.exec_block(finally, env)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        result
    }

    fn import(&mut self, name: &str) -> ScriptResult<Value> {
        if name == "typing" {
            return Ok(Value::Module("typing"));
        }
        let Some(helper) = Helper::from_module(name) else {
            return Err(ScriptError::Import(format!(
                "module '{name}' is not available in this exercise"
            )));
        };
        if !self.helpers.contains(&helper) {
            return Err(ScriptError::Import(format!(
                "module '{name}' is not available in this exercise"
            )));
        }
        Ok(Value::Module(helper.module_name()))
    }

    fn make_function(&mut self, def: &Rc<FunctionDef>, env: &Env) -> ScriptResult<Value> {
        let mut defaults = Vec::with_capacity(def.params.len());
        for param in &def.params {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr, env)?),
                None => None,
            });
        }
        let newly_captured = !env.borrow().captured;
        if newly_captured && !Rc::ptr_eq(env, &self.globals) {
            env.borrow_mut().captured = true;
            self.captured.push(env.clone());
        }
        Ok(Value::Function(Rc::new(Function {
            def: def.clone(),
            defaults,
            env: env.clone(),
        })))
    }

    // ── Calls ─────────────────────────────────────────────────

    /// Call any callable value.
    pub fn call(
        &mut self,
        func: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> ScriptResult<Value> {
        match func {
            Value::Function(f) => self.call_function(f, args, kwargs),
            Value::Native(native) => builtins::call_native(self, *native, args, kwargs),
            Value::Method(method) => {
                builtins::call_method(self, &method.receiver, &method.name, args, kwargs)
            }
            Value::ExceptionType(kind) => {
                let message = match args.as_slice() {
                    [] => String::new(),
                    [one] => one.to_str(),
                    many => Value::tuple(many.to_vec()).repr(),
                };
                Ok(Value::Exception(Rc::new(ExceptionValue {
                    kind: kind.clone(),
                    message,
                })))
            }
            other => Err(ScriptError::Type(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> ScriptResult<Value> {
        if self.depth >= self.max_call_depth {
            return Err(ScriptError::Recursion(self.max_call_depth));
        }
        self.tick()?;

        let def = &function.def;
        let scope = Scope::child_of(&function.env);
        self.bind_params(function, args, kwargs, &scope)?;

        self.depth += 1;
        let flow = self.exec_block(&def.body, &scope);
        self.depth -= 1;

        match flow? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    fn bind_params(
        &mut self,
        function: &Function,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
        scope: &Env,
    ) -> ScriptResult<()> {
        let def = &function.def;
        let name = &def.name;
        let fixed: Vec<_> = def.params.iter().filter(|p| !p.variadic).collect();
        let variadic = def.params.iter().find(|p| p.variadic);

        let mut slots: Vec<Option<Value>> = vec![None; fixed.len()];
        let mut extra = Vec::new();
        for (i, arg) in args.into_iter().enumerate() {
            if i < fixed.len() {
                slots[i] = Some(arg);
            } else {
                extra.push(arg);
            }
        }
        if !extra.is_empty() && variadic.is_none() {
            return Err(ScriptError::Type(format!(
                "{name}() takes {} positional argument{} but {} were given",
                fixed.len(),
                if fixed.len() == 1 { "" } else { "s" },
                fixed.len() + extra.len()
            )));
        }

        for (key, value) in kwargs {
            let Some(i) = fixed.iter().position(|p| p.name == key) else {
                return Err(ScriptError::Type(format!(
                    "{name}() got an unexpected keyword argument '{key}'"
                )));
            };
            if slots[i].is_some() {
                return Err(ScriptError::Type(format!(
                    "{name}() got multiple values for argument '{key}'"
                )));
            }
            slots[i] = Some(value);
        }

        let mut vars = HashMap::with_capacity(def.params.len());
        let mut missing = Vec::new();
        let mut fixed_index = 0;
        for (param, default) in def.params.iter().zip(&function.defaults) {
            if param.variadic {
                vars.insert(param.name.clone(), Value::tuple(std::mem::take(&mut extra)));
                continue;
            }
            let value = slots[fixed_index].take().or_else(|| default.clone());
            fixed_index += 1;
            match value {
                Some(v) => {
                    vars.insert(param.name.clone(), v);
                }
                None => missing.push(format!("'{}'", param.name)),
            }
        }
        if !missing.is_empty() {
            return Err(ScriptError::Type(format!(
                "{name}() missing {} required positional argument{}: {}",
                missing.len(),
                if missing.len() == 1 { "" } else { "s" },
                missing.join(" and ")
            )));
        }
        scope.borrow_mut().vars = vars;
        Ok(())
    }

    fn eval_args(
        &mut self,
        args: &[Arg],
        env: &Env,
    ) -> ScriptResult<(Vec<Value>, Vec<(String, Value)>)> {
        let mut positional = Vec::with_capacity(args.len());
        let mut keywords = Vec::new();
        for arg in args {
            match arg {
                Arg::Positional(expr) => positional.push(self.eval(expr, env)?),
                Arg::Star(expr) => {
                    let value = self.eval(expr, env)?;
                    positional.extend(self.iterate(&value)?);
                }
                Arg::Keyword(name, expr) => keywords.push((name.clone(), self.eval(expr, env)?)),
            }
        }
        Ok((positional, keywords))
    }

    // ── Expressions ───────────────────────────────────────────

    pub(crate) fn eval(&mut self, expr: &Expr, env: &Env) -> ScriptResult<Value> {
        match &expr.kind {
            ExprKind::Int(i) => Ok(Value::Int(*i)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::None => Ok(Value::None),
            ExprKind::FString(segments) => self.eval_fstring(segments, env),
            ExprKind::Name(name) => self.lookup(name, env),

            ExprKind::List(items) => {
                let values = self.eval_all(items, env)?;
                Ok(Value::list(values))
            }
            ExprKind::Tuple(items) => {
                let values = self.eval_all(items, env)?;
                Ok(Value::tuple(values))
            }
            ExprKind::Set(items) => {
                let values = self.eval_all(items, env)?;
                let mut set = Set::default();
                for v in values {
                    set.insert(HashKey::of(&v)?, v);
                }
                Ok(Value::set(set))
            }
            ExprKind::Dict(entries) => {
                let mut dict = Dict::default();
                for (k, v) in entries {
                    let key = self.eval(k, env)?;
                    let value = self.eval(v, env)?;
                    dict.insert(HashKey::of(&key)?, key, value);
                }
                Ok(Value::dict(dict))
            }

            ExprKind::ListComp { element, clauses } | ExprKind::Generator { element, clauses } => {
                let mut out = Vec::new();
                let scope = Scope::child_of(env);
                self.comprehend(clauses, &scope, &mut |interp, scope| {
                    let value = interp.eval(element, scope)?;
                    out.push(value);
                    interp.check_len(out.len())
                })?;
                Ok(Value::list(out))
            }
            ExprKind::SetComp { element, clauses } => {
                let mut set = Set::default();
                let scope = Scope::child_of(env);
                self.comprehend(clauses, &scope, &mut |interp, scope| {
                    let value = interp.eval(element, scope)?;
                    set.insert(HashKey::of(&value)?, value);
                    interp.check_len(set.len())
                })?;
                Ok(Value::set(set))
            }
            ExprKind::DictComp {
                key,
                value,
                clauses,
            } => {
                let mut dict = Dict::default();
                let scope = Scope::child_of(env);
                self.comprehend(clauses, &scope, &mut |interp, scope| {
                    let k = interp.eval(key, scope)?;
                    let v = interp.eval(value, scope)?;
                    dict.insert(HashKey::of(&k)?, k, v);
                    interp.check_len(dict.len())
                })?;
                Ok(Value::dict(dict))
            }

            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand, env)?;
                unary(*op, &value)
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.eval(left, env)?;
                let r = self.eval(right, env)?;
                self.binary(*op, &l, &r)
            }
            ExprKind::Logical { and, left, right } => {
                let l = self.eval(left, env)?;
                if l.truthy() != *and {
                    Ok(l)
                } else {
                    self.eval(right, env)
                }
            }
            ExprKind::Compare { left, rest } => {
                let mut l = self.eval(left, env)?;
                for (op, right) in rest {
                    let r = self.eval(right, env)?;
                    if !self.compare(*op, &l, &r)? {
                        return Ok(Value::Bool(false));
                    }
                    l = r;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(body, env)
                } else {
                    self.eval(orelse, env)
                }
            }
            ExprKind::Call { func, args } => {
                let callee = self.eval(func, env)?;
                let (positional, keywords) = self.eval_args(args, env)?;
                self.call(&callee, positional, keywords)
            }
            ExprKind::Attribute { value, attr } => {
                let receiver = self.eval(value, env)?;
                self.get_attr(receiver, attr)
            }
            ExprKind::Subscript { value, index } => {
                let container = self.eval(value, env)?;
                if let ExprKind::Slice { lower, upper, step } = &index.kind {
                    let bounds = self.slice_bounds(lower, upper, step, env)?;
                    return self.get_slice(&container, bounds);
                }
                let key = self.eval(index, env)?;
                self.get_item(&container, &key)
            }
            ExprKind::Slice { .. } => Err(ScriptError::Syntax(
                "slice syntax is only valid inside brackets".into(),
            )),
            ExprKind::Lambda(def) => self.make_function(def, env),
        }
    }

    fn eval_all(&mut self, items: &[Expr], env: &Env) -> ScriptResult<Vec<Value>> {
        self.check_len(items.len())?;
        items.iter().map(|e| self.eval(e, env)).collect()
    }

    fn eval_fstring(&mut self, segments: &[FStringSegment], env: &Env) -> ScriptResult<Value> {
        let mut out = String::new();
        for segment in segments {
            match segment {
                FStringSegment::Text(text) => out.push_str(text),
                FStringSegment::Expr { expr, spec, repr } => {
                    let value = self.eval(expr, env)?;
                    let text = if *repr {
                        value.repr()
                    } else {
                        match spec {
                            Some(spec) => format::format_spec(&value, spec)?,
                            None => value.to_str(),
                        }
                    };
                    out.push_str(&text);
                }
            }
        }
        self.check_len(out.len())?;
        Ok(Value::str(out))
    }

    /// Run nested comprehension clauses, calling `emit` for each innermost
    /// binding that passes every condition.
    fn comprehend(
        &mut self,
        clauses: &[Comprehension],
        scope: &Env,
        emit: &mut dyn FnMut(&mut Interpreter, &Env) -> ScriptResult<()>,
    ) -> ScriptResult<()> {
        let Some((clause, rest)) = clauses.split_first() else {
            return emit(self, scope);
        };
        let iterable = self.eval(&clause.iter, scope)?;
        'items: for item in self.iterate(&iterable)? {
            self.tick()?;
            self.assign(&clause.target, item, scope)?;
            for condition in &clause.conditions {
                if !self.eval(condition, scope)?.truthy() {
                    continue 'items;
                }
            }
            self.comprehend(rest, scope, emit)?;
        }
        Ok(())
    }

    // ── Iteration ─────────────────────────────────────────────

    /// Iterate a value. Containers are snapshotted first, so mutating a list
    /// while looping over it does not affect the loop.
    pub(crate) fn iterate(&mut self, value: &Value) -> ScriptResult<ValueIter> {
        let items = match value {
            Value::Range(r) => {
                return Ok(ValueIter::Range {
                    next: r.start,
                    remaining: r.len(),
                    step: r.step,
                })
            }
            Value::List(items) => items.borrow().to_vec(),
            Value::Tuple(items) => items.to_vec(),
            Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
            Value::Dict(d) => d.borrow().keys(),
            Value::Set(s) => s.borrow().values(),
            Value::Table(t) => t.rows.iter().map(|row| t.row_dict(row)).collect(),
            other => {
                return Err(ScriptError::Type(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )))
            }
        };
        self.charge(items.len())?;
        Ok(ValueIter::Items(items.into_iter()))
    }

    /// Collect an iterable into a vector, enforcing the size ceiling.
    pub(crate) fn collect(&mut self, value: &Value) -> ScriptResult<Vec<Value>> {
        if let Value::Range(r) = value {
            self.check_len(r.len())?;
        }
        Ok(self.iterate(value)?.collect())
    }

    // ── Attributes ────────────────────────────────────────────

    fn get_attr(&mut self, receiver: Value, attr: &str) -> ScriptResult<Value> {
        match &receiver {
            Value::Module(module) => modules::attr(module, attr).ok_or_else(|| {
                ScriptError::Attribute(format!("module '{module}' has no attribute '{attr}'"))
            }),
            Value::Table(t) if attr == "columns" => Ok(Value::list(
                t.columns.iter().map(|c| Value::Str(c.clone())).collect(),
            )),
            Value::Table(t) if attr == "rows" => Ok(Value::list(
                t.rows.iter().map(|row| Value::list(row.clone())).collect(),
            )),
            Value::Exception(e) if attr == "args" => {
                Ok(Value::tuple(vec![Value::str(e.message.as_str())]))
            }
            _ if builtins::has_method(&receiver, attr) => {
                Ok(Value::Method(Rc::new(BoundMethod {
                    receiver,
                    name: attr.to_string(),
                })))
            }
            other => Err(ScriptError::Attribute(format!(
                "'{}' object has no attribute '{attr}'",
                other.type_name()
            ))),
        }
    }

    // ── Subscripts ────────────────────────────────────────────

    pub(crate) fn get_item(&mut self, container: &Value, key: &Value) -> ScriptResult<Value> {
        match container {
            Value::List(items) => {
                let items = items.borrow();
                let i = normalize_index(key, items.len(), "list")?;
                Ok(items[i].clone())
            }
            Value::Tuple(items) => {
                let i = normalize_index(key, items.len(), "tuple")?;
                Ok(items[i].clone())
            }
            Value::Str(s) => {
                let len = s.chars().count();
                let i = normalize_index(key, len, "string")?;
                let c = if s.is_ascii() {
                    s[i..i + 1].to_string()
                } else {
                    s.chars().nth(i).map(String::from).unwrap_or_default()
                };
                Ok(Value::str(c))
            }
            Value::Range(r) => {
                let i = normalize_index(key, r.len(), "range object")?;
                r.get(i)
                    .map(Value::Int)
                    .ok_or_else(|| ScriptError::Index("range object index out of range".into()))
            }
            Value::Dict(d) => {
                let hash = HashKey::of(key)?;
                if let Some(value) = d.borrow().get(&hash) {
                    return Ok(value.clone());
                }
                let factory = d.borrow().default.clone();
                match factory {
                    Some(factory) => {
                        let value = self.call(&factory, Vec::new(), Vec::new())?;
                        d.borrow_mut().insert(hash, key.clone(), value.clone());
                        Ok(value)
                    }
                    None => Err(ScriptError::Key(key.repr())),
                }
            }
            Value::Table(t) => match key {
                Value::Str(name) => {
                    let index = t.column_index(name).ok_or_else(|| {
                        ScriptError::Key(format!("{} is not a column", key.repr()))
                    })?;
                    Ok(Value::list(t.rows.iter().map(|row| row[index].clone()).collect()))
                }
                _ => {
                    let i = normalize_index(key, t.rows.len(), "table row")?;
                    Ok(t.row_dict(&t.rows[i]))
                }
            },
            other => Err(ScriptError::Type(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    fn set_item(&mut self, container: &Value, key: Value, value: Value) -> ScriptResult<()> {
        match container {
            Value::List(items) => {
                let len = items.borrow().len();
                let i = normalize_index(&key, len, "list assignment")?;
                items.borrow_mut()[i] = value;
                Ok(())
            }
            Value::Dict(d) => {
                let hash = HashKey::of(&key)?;
                let len = d.borrow().len() + 1;
                self.check_len(len)?;
                d.borrow_mut().insert(hash, key, value);
                Ok(())
            }
            other => Err(ScriptError::Type(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    fn slice_bounds(
        &mut self,
        lower: &Option<Box<Expr>>,
        upper: &Option<Box<Expr>>,
        step: &Option<Box<Expr>>,
        env: &Env,
    ) -> ScriptResult<SliceBounds> {
        let bound = |interp: &mut Interpreter, e: &Option<Box<Expr>>| -> ScriptResult<Option<i64>> {
            match e {
                None => Ok(None),
                Some(expr) => match interp.eval(expr, env)? {
                    Value::None => Ok(None),
                    v => v.as_int().map(Some).ok_or_else(|| {
                        ScriptError::Type(
                            "slice indices must be integers or None".to_string(),
                        )
                    }),
                },
            }
        };
        let lower = bound(self, lower)?;
        let upper = bound(self, upper)?;
        let step = bound(self, step)?;
        Ok(SliceBounds { lower, upper, step })
    }

    fn get_slice(&mut self, container: &Value, bounds: SliceBounds) -> ScriptResult<Value> {
        match container {
            Value::List(items) => {
                let items = items.borrow();
                let picked = slice_indices(items.len(), bounds)?;
                Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
            }
            Value::Tuple(items) => {
                let picked = slice_indices(items.len(), bounds)?;
                Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let picked = slice_indices(chars.len(), bounds)?;
                Ok(Value::str(picked.into_iter().map(|i| chars[i]).collect::<String>()))
            }
            Value::Range(r) => {
                let picked = slice_indices(r.len(), bounds)?;
                self.check_len(picked.len())?;
                Ok(Value::list(
                    picked.into_iter().filter_map(|i| r.get(i)).map(Value::Int).collect(),
                ))
            }
            other => Err(ScriptError::Type(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    fn set_slice(&mut self, container: &Value, bounds: SliceBounds, value: Value) -> ScriptResult<()> {
        let Value::List(items) = container else {
            return Err(ScriptError::Type(format!(
                "'{}' object does not support slice assignment",
                container.type_name()
            )));
        };
        let replacement = self.collect(&value)?;
        let len = items.borrow().len();
        if bounds.step.is_some_and(|s| s != 1) {
            let picked = slice_indices(len, bounds)?;
            if picked.len() != replacement.len() {
                return Err(ScriptError::Value(format!(
                    "attempt to assign sequence of size {} to extended slice of size {}",
                    replacement.len(),
                    picked.len()
                )));
            }
            let mut items = items.borrow_mut();
            for (i, v) in picked.into_iter().zip(replacement) {
                items[i] = v;
            }
            return Ok(());
        }
        let start = clamp_bound(bounds.lower, len, 0);
        let stop = clamp_bound(bounds.upper, len, len).max(start);
        self.check_len(len - (stop - start) + replacement.len())?;
        items.borrow_mut().splice(start..stop, replacement);
        Ok(())
    }

    // ── Operators ─────────────────────────────────────────────

    pub(crate) fn binary(&mut self, op: BinOp, l: &Value, r: &Value) -> ScriptResult<Value> {
        if let (Some(a), Some(b)) = (l.as_int(), r.as_int()) {
            return int_binary(op, a, b);
        }
        if let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) {
            return float_binary(op, a, b);
        }
        match (op, l, r) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => {
                self.check_len(a.len() + b.len())?;
                Ok(Value::str(format!("{a}{b}")))
            }
            (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s))
                if n.as_int().is_some() =>
            {
                let times = n.as_int().unwrap_or(0).max(0) as usize;
                self.check_len(s.len().saturating_mul(times))?;
                self.charge(s.len().saturating_mul(times))?;
                Ok(Value::str(s.repeat(times)))
            }
            (BinOp::Mod, Value::Str(template), args) => {
                Ok(Value::str(format::percent_format(template, args)?))
            }
            (BinOp::Add, Value::List(a), Value::List(b)) => {
                let mut out = a.borrow().to_vec();
                out.extend(b.borrow().iter().cloned());
                self.check_len(out.len())?;
                self.charge(out.len())?;
                Ok(Value::list(out))
            }
            (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
                let mut out = a.to_vec();
                out.extend(b.iter().cloned());
                self.check_len(out.len())?;
                Ok(Value::tuple(out))
            }
            (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items))
                if n.as_int().is_some() =>
            {
                let times = n.as_int().unwrap_or(0).max(0) as usize;
                let items = items.borrow();
                let total = items.len().saturating_mul(times);
                self.check_len(total)?;
                self.charge(total)?;
                let mut out = Vec::with_capacity(total);
                for _ in 0..times {
                    out.extend(items.iter().cloned());
                }
                Ok(Value::list(out))
            }
            (BinOp::Mul, Value::Tuple(items), n) | (BinOp::Mul, n, Value::Tuple(items))
                if n.as_int().is_some() =>
            {
                let times = n.as_int().unwrap_or(0).max(0) as usize;
                let total = items.len().saturating_mul(times);
                self.check_len(total)?;
                let mut out = Vec::with_capacity(total);
                for _ in 0..times {
                    out.extend(items.iter().cloned());
                }
                Ok(Value::tuple(out))
            }
            (
                BinOp::BitAnd | BinOp::BitOr | BinOp::Sub | BinOp::BitXor,
                Value::Set(a),
                Value::Set(b),
            ) => {
                let (a, b) = (a.borrow(), b.borrow());
                let mut out = Set::default();
                match op {
                    BinOp::BitAnd => {
                        for (k, v) in a.iter().filter(|(k, _)| b.contains(k)) {
                            out.insert(k.clone(), v.clone());
                        }
                    }
                    BinOp::BitOr => {
                        for (k, v) in a.iter().chain(b.iter()) {
                            out.insert(k.clone(), v.clone());
                        }
                    }
                    BinOp::Sub => {
                        for (k, v) in a.iter().filter(|(k, _)| !b.contains(k)) {
                            out.insert(k.clone(), v.clone());
                        }
                    }
                    _ => {
                        for (k, v) in a.iter().filter(|(k, _)| !b.contains(k)) {
                            out.insert(k.clone(), v.clone());
                        }
                        for (k, v) in b.iter().filter(|(k, _)| !a.contains(k)) {
                            out.insert(k.clone(), v.clone());
                        }
                    }
                }
                self.check_len(out.len())?;
                Ok(Value::set(out))
            }
            (BinOp::BitOr, Value::Dict(a), Value::Dict(b)) => {
                let mut out = a.borrow().clone();
                out.default = None;
                for (k, v) in b.borrow().entries() {
                    out.insert(HashKey::of(k)?, k.clone(), v.clone());
                }
                self.check_len(out.len())?;
                Ok(Value::dict(out))
            }
            _ => Err(ScriptError::Type(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.symbol(),
                l.type_name(),
                r.type_name()
            ))),
        }
    }

    pub(crate) fn compare(&mut self, op: CmpOp, l: &Value, r: &Value) -> ScriptResult<bool> {
        use std::cmp::Ordering::{Equal, Greater, Less};
        Ok(match op {
            CmpOp::Eq => l.py_eq(r)?,
            CmpOp::NotEq => !l.py_eq(r)?,
            CmpOp::Is => l.py_is(r),
            CmpOp::IsNot => !l.py_is(r),
            CmpOp::In => self.contains(r, l)?,
            CmpOp::NotIn => !self.contains(r, l)?,
            CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
                let ordering = l.py_cmp(r).map_err(|e| match e {
                    ScriptError::Type(_) => ScriptError::Type(format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        op.symbol(),
                        l.type_name(),
                        r.type_name()
                    )),
                    other => other,
                })?;
                match (op, ordering) {
                    (_, None) => false,
                    (CmpOp::Lt, Some(o)) => o == Less,
                    (CmpOp::Le, Some(o)) => o == Less || o == Equal,
                    (CmpOp::Gt, Some(o)) => o == Greater,
                    (_, Some(o)) => o == Greater || o == Equal,
                }
            }
        })
    }

    pub(crate) fn contains(&mut self, container: &Value, item: &Value) -> ScriptResult<bool> {
        match container {
            Value::List(items) => Ok(position_of(&items.borrow(), item)?.is_some()),
            Value::Tuple(items) => Ok(position_of(items, item)?.is_some()),
            Value::Str(s) => match item {
                Value::Str(needle) => Ok(s.contains(&**needle)),
                other => Err(ScriptError::Type(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ))),
            },
            Value::Dict(d) => Ok(d.borrow().contains(&HashKey::of(item)?)),
            Value::Set(s) => Ok(s.borrow().contains(&HashKey::of(item)?)),
            Value::Range(r) => Ok(match item {
                Value::Float(f) if f.fract() == 0.0 => r.contains(*f as i64),
                other => other.as_int().is_some_and(|n| r.contains(n)),
            }),
            Value::Table(t) => Ok(match item {
                Value::Str(name) => t.column_index(name).is_some(),
                _ => false,
            }),
            other => Err(ScriptError::Type(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Build a table value, validating shape and cell types.
    pub(crate) fn make_table(&mut self, columns: Vec<Rc<str>>, rows: Vec<Vec<Value>>) -> ScriptResult<Value> {
        for (r, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ScriptError::Value(format!(
                    "row {r} has {} cells but the table has {} columns",
                    row.len(),
                    columns.len()
                )));
            }
            if let Some(cell) = row.iter().find(|c| {
                !matches!(
                    c,
                    Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
                )
            }) {
                return Err(ScriptError::Type(format!(
                    "table cells must be scalars, got {} in row {r}",
                    cell.type_name()
                )));
            }
        }
        self.check_len(rows.len())?;
        Ok(Value::Table(Rc::new(TableValue { columns, rows })))
    }
}

/// Exception classes an `except` clause name catches.
fn catches(handler: &str, kind: &str) -> bool {
    match handler {
        "Exception" | "BaseException" => true,
        "LookupError" => matches!(kind, "KeyError" | "IndexError" | "LookupError"),
        "ArithmeticError" => matches!(
            kind,
            "ZeroDivisionError" | "OverflowError" | "ArithmeticError"
        ),
        other => other == kind,
    }
}

fn unary(op: UnaryOp, value: &Value) -> ScriptResult<Value> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, v) if v.as_int().is_some() => v
            .as_int()
            .and_then(i64::checked_neg)
            .map(Value::Int)
            .ok_or_else(|| ScriptError::Overflow("integer result does not fit in 64 bits".into())),
        (UnaryOp::Pos, v) if v.as_int().is_some() => Ok(Value::Int(v.as_int().unwrap_or(0))),
        (UnaryOp::Invert, v) if v.as_int().is_some() => Ok(Value::Int(!v.as_int().unwrap_or(0))),
        (op, v) => Err(ScriptError::Type(format!(
            "bad operand type for unary {}: '{}'",
            match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::Invert => "~",
                UnaryOp::Not => "not",
            },
            v.type_name()
        ))),
    }
}

fn overflow() -> ScriptError {
    ScriptError::Overflow("integer result does not fit in 64 bits".into())
}

fn int_binary(op: BinOp, a: i64, b: i64) -> ScriptResult<Value> {
    let zero = || ScriptError::ZeroDivision("integer division or modulo by zero".into());
    let result = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => {
            if b == 0 {
                return Err(ScriptError::ZeroDivision("division by zero".into()));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(zero());
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero());
            }
            let r = a.checked_rem(b).unwrap_or(0);
            if r != 0 && ((r < 0) != (b < 0)) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(ScriptError::ZeroDivision(
                        "0.0 cannot be raised to a negative power".into(),
                    ));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl => {
            if b < 0 {
                return Err(ScriptError::Value("negative shift count".into()));
            }
            if b >= 64 {
                if a == 0 {
                    0
                } else {
                    return Err(overflow());
                }
            } else {
                let shifted = a << b;
                if shifted >> b != a {
                    return Err(overflow());
                }
                shifted
            }
        }
        BinOp::Shr => {
            if b < 0 {
                return Err(ScriptError::Value("negative shift count".into()));
            }
            if b >= 64 {
                if a < 0 {
                    -1
                } else {
                    0
                }
            } else {
                a >> b
            }
        }
    };
    Ok(Value::Int(result))
}

fn float_binary(op: BinOp, a: f64, b: f64) -> ScriptResult<Value> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(ScriptError::ZeroDivision("float division by zero".into()));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(ScriptError::ZeroDivision("float floor division by zero".into()));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(ScriptError::ZeroDivision("float modulo".into()));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(ScriptError::ZeroDivision(
                    "0.0 cannot be raised to a negative power".into(),
                ));
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(ScriptError::Value(
                    "negative number cannot be raised to a fractional power".into(),
                ));
            }
            let result = a.powf(b);
            if result.is_infinite() && a.is_finite() && b.is_finite() {
                return Err(ScriptError::Overflow("numerical result out of range".into()));
            }
            result
        }
        _ => {
            return Err(ScriptError::Type(format!(
                "unsupported operand type(s) for {}: 'float' and 'float'",
                op.symbol()
            )))
        }
    };
    Ok(Value::Float(result))
}

/// Slice parameters as written; `None` means omitted.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SliceBounds {
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
}

fn clamp_bound(bound: Option<i64>, len: usize, default: usize) -> usize {
    match bound {
        None => default,
        Some(b) if b < 0 => (len as i64 + b).max(0) as usize,
        Some(b) => (b as usize).min(len),
    }
}

/// Indices selected by a slice, following Python's `slice.indices`.
fn slice_indices(len: usize, bounds: SliceBounds) -> ScriptResult<Vec<usize>> {
    let step = bounds.step.unwrap_or(1);
    if step == 0 {
        return Err(ScriptError::Value("slice step cannot be zero".into()));
    }
    let len_i = len as i64;
    let mut out = Vec::new();
    if step > 0 {
        let start = clamp_bound(bounds.lower, len, 0) as i64;
        let stop = clamp_bound(bounds.upper, len, len) as i64;
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            i += step;
        }
    } else {
        let adjust = |b: i64| if b < 0 { b + len_i } else { b };
        let start = match bounds.lower {
            None => len_i - 1,
            Some(b) => adjust(b).clamp(-1, len_i - 1),
        };
        let stop = match bounds.upper {
            None => -1,
            Some(b) => adjust(b).clamp(-1, len_i - 1),
        };
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            i += step;
        }
    }
    Ok(out)
}

/// Resolve a possibly negative index against `len`.
pub(crate) fn normalize_index(key: &Value, len: usize, what: &str) -> ScriptResult<usize> {
    let Some(i) = key.as_int() else {
        return Err(ScriptError::Type(format!(
            "{} indices must be integers, not {}",
            what.trim_end_matches(" assignment"),
            key.type_name()
        )));
    };
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(ScriptError::Index(format!("{what} index out of range")));
    }
    Ok(resolved as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Interpreter {
        let mut interp = Interpreter::new(&ExecutionLimits::default(), &[]);
        interp.run(source).expect("program runs");
        interp
    }

    fn global(source: &str, name: &str) -> String {
        run(source).global(name).map(|v| v.repr()).unwrap_or_default()
    }

    #[test]
    fn test_arithmetic_follows_python() {
        assert_eq!(global("x = 7 // -2", "x"), "-4");
        assert_eq!(global("x = -7 % 3", "x"), "2");
        assert_eq!(global("x = 1 / 2", "x"), "0.5");
        assert_eq!(global("x = 2 ** 10", "x"), "1024");
        assert_eq!(global("x = 2 ** -1", "x"), "0.5");
    }

    #[test]
    fn test_slices() {
        assert_eq!(global("x = [1, 2, 3, 4, 5][1:4]", "x"), "[2, 3, 4]");
        assert_eq!(global("x = [1, 2, 3][::-1]", "x"), "[3, 2, 1]");
        assert_eq!(global("x = 'hello'[-3:]", "x"), "'llo'");
        assert_eq!(global("a = [1, 2, 3, 4]\na[1:3] = [9]\nx = a", "x"), "[1, 9, 4]");
    }

    #[test]
    fn test_closures_and_nonlocal() {
        let source = "def counter():\n    n = 0\n    def inc():\n        nonlocal n\n        n += 1\n        return n\n    return inc\nc = counter()\nc()\nx = c()\n";
        assert_eq!(global(source, "x"), "2");
    }

    #[test]
    fn test_comprehension_scope_does_not_leak() {
        let interp = run("xs = [i * i for i in range(4)]\n");
        assert!(interp.global("i").is_none());
        assert_eq!(interp.global("xs").map(|v| v.repr()), Some("[0, 1, 4, 9]".into()));
    }

    #[test]
    fn test_try_except_catches_and_binds() {
        let source = "try:\n    {}['k']\nexcept KeyError as e:\n    x = 'caught'\n";
        assert_eq!(global(source, "x"), "'caught'");
    }

    #[test]
    fn test_step_budget_is_enforced() {
        let limits = ExecutionLimits {
            max_steps: 1_000,
            ..Default::default()
        };
        let mut interp = Interpreter::new(&limits, &[]);
        let err = interp.run("while True:\n    pass\n").unwrap_err();
        assert!(matches!(err.root(), ScriptError::StepBudget(1_000)));
        assert!(err.to_string().starts_with("line "));
    }

    #[test]
    fn test_recursion_limit() {
        on_interpreter_stack(|| {
            let mut interp = Interpreter::new(&ExecutionLimits::default(), &[]);
            let err = interp.run("def f(n):\n    return f(n + 1)\nf(0)\n").unwrap_err();
            assert!(matches!(err.root(), ScriptError::Recursion(200)));
        });
    }

    /// Debug builds use large frames; give recursion tests the interpreter's stack.
    fn on_interpreter_stack(f: impl FnOnce() + Send + 'static) {
        std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(f)
            .expect("spawn")
            .join()
            .expect("test thread panicked");
    }

    #[test]
    fn test_collection_limit() {
        let limits = ExecutionLimits {
            max_collection_len: 100,
            ..Default::default()
        };
        let mut interp = Interpreter::new(&limits, &[]);
        let err = interp.run("x = [0] * 1000\n").unwrap_err();
        assert!(err.to_string().contains("MemoryError"));
    }

    #[test]
    fn test_errors_carry_innermost_line() {
        let mut interp = Interpreter::new(&ExecutionLimits::default(), &[]);
        let err = interp
            .run("def f():\n    return undefined_name\n\nf()\n")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "line 2: NameError: name 'undefined_name' is not defined"
        );
    }

    #[test]
    fn test_undeclared_import_fails() {
        let mut interp = Interpreter::new(&ExecutionLimits::default(), &[Helper::Math]);
        assert!(interp.run("import math\n").is_ok());
        let err = interp.run("import os\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "line 1: ImportError: module 'os' is not available in this exercise"
        );
    }

    #[test]
    fn test_integer_overflow_is_reported() {
        let mut interp = Interpreter::new(&ExecutionLimits::default(), &[]);
        let err = interp.run("x = 2 ** 63\n").unwrap_err();
        assert!(err.to_string().contains("OverflowError"));
    }
}
