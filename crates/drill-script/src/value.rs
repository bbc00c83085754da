//! Runtime values of the interpreter.
//!
//! Lists, dicts and sets are shared mutable references, as in Python: two
//! names bound to the same list see each other's appends. Tuples and strings
//! are immutable and cheaply cloned.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use drill_core::Value as CoreValue;

use crate::ast::FunctionDef;
use crate::error::{ScriptError, ScriptResult};
use crate::interpreter::Env;

/// How deep comparison and hashing descend into nested containers before
/// giving up with a `RecursionError`.
pub const MAX_VALUE_NESTING: usize = 1_000;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Items>>),
    Tuple(Rc<Items>),
    Dict(Rc<RefCell<Dict>>),
    Set(Rc<RefCell<Set>>),
    Range(Range),
    Table(Rc<TableValue>),
    Function(Rc<Function>),
    /// A builtin or helper-module function, dispatched by name.
    Native(Native),
    /// A method looked up on a receiver, e.g. `nums.append`.
    Method(Rc<BoundMethod>),
    Module(&'static str),
    /// An exception class such as `ValueError`; calling it builds an instance.
    ExceptionType(Rc<str>),
    Exception(Rc<ExceptionValue>),
}

/// Elements of a list or tuple.
///
/// Dropping releases nested containers with an explicit work list, so a
/// list nested a million levels deep is freed without recursion.
#[derive(Default, Clone)]
pub struct Items(Vec<Value>);

impl Items {
    pub fn new(items: Vec<Value>) -> Self {
        Self(items)
    }
}

impl Deref for Items {
    type Target = Vec<Value>;

    fn deref(&self) -> &Vec<Value> {
        &self.0
    }
}

impl DerefMut for Items {
    fn deref_mut(&mut self) -> &mut Vec<Value> {
        &mut self.0
    }
}

impl Drop for Items {
    fn drop(&mut self) {
        release(std::mem::take(&mut self.0));
    }
}

/// Drop `pending` and everything only it keeps alive, iteratively.
fn release(mut pending: Vec<Value>) {
    while let Some(value) = pending.pop() {
        match value {
            Value::List(cell) => {
                if let Ok(cell) = Rc::try_unwrap(cell) {
                    pending.append(&mut cell.into_inner().0);
                }
            }
            Value::Tuple(items) => {
                if let Ok(mut items) = Rc::try_unwrap(items) {
                    pending.append(&mut items.0);
                }
            }
            Value::Dict(dict) => {
                if let Ok(dict) = Rc::try_unwrap(dict) {
                    dict.into_inner().drain_into(&mut pending);
                }
            }
            Value::Set(set) => {
                if let Ok(set) = Rc::try_unwrap(set) {
                    set.into_inner().drain_into(&mut pending);
                }
            }
            Value::Method(method) => {
                if let Ok(method) = Rc::try_unwrap(method) {
                    pending.push(method.receiver);
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn new(start: i64, stop: i64, step: i64) -> ScriptResult<Range> {
        if step == 0 {
            return Err(ScriptError::Value("range() arg 3 must not be zero".into()));
        }
        Ok(Range { start, stop, step })
    }

    pub fn len(&self) -> usize {
        let span = if self.step > 0 {
            (self.stop as i128 - self.start as i128 + self.step as i128 - 1) / self.step as i128
        } else {
            (self.start as i128 - self.stop as i128 - self.step as i128 - 1) / (-(self.step as i128))
        };
        span.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<i64> {
        if i >= self.len() {
            return None;
        }
        Some(self.start + self.step * i as i64)
    }

    pub fn contains(&self, n: i64) -> bool {
        let in_bounds = if self.step > 0 {
            n >= self.start && n < self.stop
        } else {
            n <= self.start && n > self.stop
        };
        in_bounds && (n - self.start) % self.step == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Native {
    /// `None` for builtins, the module name for helper functions.
    pub module: Option<&'static str>,
    pub name: &'static str,
}

impl Native {
    pub const fn builtin(name: &'static str) -> Self {
        Self { module: None, name }
    }

    pub const fn in_module(module: &'static str, name: &'static str) -> Self {
        Self {
            module: Some(module),
            name,
        }
    }
}

pub struct Function {
    pub def: Rc<FunctionDef>,
    /// Evaluated default values, aligned with `def.params`.
    pub defaults: Vec<Option<Value>>,
    pub env: Env,
}

pub struct BoundMethod {
    pub receiver: Value,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ExceptionValue {
    pub kind: Rc<str>,
    pub message: String,
}

/// A rectangular table of scalar cells.
#[derive(Debug, Clone)]
pub struct TableValue {
    pub columns: Vec<Rc<str>>,
    pub rows: Vec<Vec<Value>>,
}

impl TableValue {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| &**c == name)
    }

    /// One row as a fresh `{column: value}` dict.
    pub fn row_dict(&self, row: &[Value]) -> Value {
        let mut dict = Dict::default();
        for (column, cell) in self.columns.iter().zip(row) {
            dict.insert_str(column.clone(), cell.clone());
        }
        Value::Dict(Rc::new(RefCell::new(dict)))
    }
}

// ── Hashing ──────────────────────────────────────────────────

/// Normalised hashable form of a value. `True == 1 == 1.0` share one key.
#[derive(Debug, Clone)]
pub enum HashKey {
    None,
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
}

impl HashKey {
    pub fn of(value: &Value) -> ScriptResult<HashKey> {
        HashKey::of_at(value, 0)
    }

    fn of_at(value: &Value, depth: usize) -> ScriptResult<HashKey> {
        if depth > MAX_VALUE_NESTING {
            return Err(ScriptError::Nesting("while hashing"));
        }
        Ok(match value {
            Value::None => HashKey::None,
            Value::Bool(b) => HashKey::Int(*b as i64),
            Value::Int(i) => HashKey::Int(*i),
            Value::Float(f) => float_key(*f),
            Value::Str(s) => HashKey::Str(s.clone()),
            Value::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(|item| HashKey::of_at(item, depth + 1))
                    .collect::<ScriptResult<Vec<_>>>()?,
            ),
            other => {
                return Err(ScriptError::Type(format!(
                    "unhashable type: '{}'",
                    other.type_name()
                )))
            }
        })
    }

    fn rank(&self) -> u8 {
        match self {
            HashKey::None => 0,
            HashKey::Int(_) | HashKey::Float(_) => 1,
            HashKey::Str(_) => 2,
            HashKey::Tuple(_) => 3,
        }
    }
}

fn float_key(f: f64) -> HashKey {
    if f.fract() == 0.0 && f.abs() < 9.2e18 {
        HashKey::Int(f as i64)
    } else {
        HashKey::Float(f)
    }
}

impl PartialEq for HashKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HashKey {}

impl PartialOrd for HashKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HashKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (HashKey::Int(a), HashKey::Int(b)) => a.cmp(b),
            (HashKey::Float(a), HashKey::Float(b)) => a.total_cmp(b),
            (HashKey::Int(a), HashKey::Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (HashKey::Float(a), HashKey::Int(b)) => a.total_cmp(&(*b as f64)).then(Ordering::Greater),
            (HashKey::Str(a), HashKey::Str(b)) => a.cmp(b),
            (HashKey::Tuple(a), HashKey::Tuple(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl Hash for HashKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            HashKey::None => 0u8.hash(state),
            HashKey::Int(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            HashKey::Float(f) => {
                2u8.hash(state);
                f.to_bits().hash(state);
            }
            HashKey::Str(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            HashKey::Tuple(items) => {
                4u8.hash(state);
                items.hash(state);
            }
        }
    }
}

// ── Dict and set ─────────────────────────────────────────────

/// Insertion-ordered dictionary.
#[derive(Default, Clone)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
    index: HashMap<HashKey, usize>,
    /// Factory for missing keys (`defaultdict`, `Counter`).
    pub default: Option<Value>,
}

impl Dict {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &HashKey) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains(&self, key: &HashKey) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or overwrite, keeping the original position of an existing key.
    pub fn insert(&mut self, hash: HashKey, key: Value, value: Value) {
        match self.index.get(&hash) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(hash, self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn insert_str(&mut self, key: Rc<str>, value: Value) {
        self.insert(HashKey::Str(key.clone()), Value::Str(key), value);
    }

    pub fn remove(&mut self, hash: &HashKey) -> Option<(Value, Value)> {
        let i = self.index.remove(hash)?;
        let removed = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    pub fn pop_last(&mut self) -> Option<(Value, Value)> {
        let (key, _) = self.entries.last()?;
        let hash = HashKey::of(key).ok()?;
        self.remove(&hash)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    fn drain_into(&mut self, pending: &mut Vec<Value>) {
        self.index.clear();
        for (key, value) in self.entries.drain(..) {
            pending.push(key);
            pending.push(value);
        }
        pending.extend(self.default.take());
    }
}

impl Drop for Dict {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.drain_into(&mut pending);
        release(pending);
    }
}

/// Set with a deterministic iteration order (sorted by key).
#[derive(Default, Clone)]
pub struct Set {
    items: BTreeMap<HashKey, Value>,
}

impl Set {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, key: &HashKey) -> bool {
        self.items.contains_key(key)
    }

    pub fn insert(&mut self, key: HashKey, value: Value) -> bool {
        if self.items.contains_key(&key) {
            return false;
        }
        self.items.insert(key, value);
        true
    }

    pub fn remove(&mut self, key: &HashKey) -> bool {
        self.items.remove(key).is_some()
    }

    pub fn pop_first(&mut self) -> Option<Value> {
        self.items.pop_first().map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HashKey, &Value)> {
        self.items.iter()
    }

    pub fn values(&self) -> Vec<Value> {
        self.items.values().cloned().collect()
    }

    fn drain_into(&mut self, pending: &mut Vec<Value>) {
        pending.extend(std::mem::take(&mut self.items).into_values());
    }
}

impl Drop for Set {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.drain_into(&mut pending);
        release(pending);
    }
}

// ── Constructors and inspection ──────────────────────────────

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Value {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(Items(items))))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(Items(items)))
    }

    pub fn dict(dict: Dict) -> Value {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn set(set: Set) -> Value {
        Value::Set(Rc::new(RefCell::new(set)))
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
            Value::Set(_) => "set",
            Value::Range(_) => "range",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Native(_) | Value::Method(_) => "builtin_function_or_method",
            Value::Module(_) => "module",
            Value::ExceptionType(_) => "type",
            Value::Exception(_) => "exception",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Set(s) => !s.borrow().is_empty(),
            Value::Range(r) => !r.is_empty(),
            Value::Table(t) => !t.rows.is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Native(_) | Value::Method(_) | Value::ExceptionType(_)
        )
    }

    /// Numeric view; bools count as ints.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(*b as i64 as f64),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn is_number(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_))
    }

    /// Python `==`. Fails with `RecursionError` on containers nested deeper
    /// than [`MAX_VALUE_NESTING`], including self-referencing lists.
    pub fn py_eq(&self, other: &Value) -> ScriptResult<bool> {
        self.eq_at(other, 0)
    }

    fn eq_at(&self, other: &Value, depth: usize) -> ScriptResult<bool> {
        if depth > MAX_VALUE_NESTING {
            return Err(ScriptError::Nesting("in comparison"));
        }
        Ok(match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => {
                match (a.as_int(), b.as_int()) {
                    (Some(x), Some(y)) => x == y,
                    _ => a.as_f64() == b.as_f64(),
                }
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || seq_eq(&a.borrow(), &b.borrow(), depth)?
            }
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b) || seq_eq(a, b, depth)?,
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (k, v) in a.entries() {
                    let Some(w) = b.get(&HashKey::of(k)?) else {
                        return Ok(false);
                    };
                    if !v.eq_at(w, depth + 1)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Value::Set(a), Value::Set(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().all(|(k, _)| b.contains(k))
            }
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => {
                if a.columns != b.columns || a.rows.len() != b.rows.len() {
                    return Ok(false);
                }
                for (x, y) in a.rows.iter().zip(&b.rows) {
                    if !seq_eq(x, y, depth)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => a == b,
            (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
            _ => false,
        })
    }

    /// Python `is`.
    pub fn py_is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => a == b,
            _ => false,
        }
    }

    /// Python ordering (`<`). `Ok(None)` when a NaN is involved.
    pub fn py_cmp(&self, other: &Value) -> ScriptResult<Option<Ordering>> {
        self.cmp_at(other, 0)
    }

    fn cmp_at(&self, other: &Value, depth: usize) -> ScriptResult<Option<Ordering>> {
        if depth > MAX_VALUE_NESTING {
            return Err(ScriptError::Nesting("in comparison"));
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Some(a.cmp(b))),
            (a, b) if a.is_number() && b.is_number() => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => Ok(Some(x.cmp(&y))),
                _ => Ok(a.as_f64().zip(b.as_f64()).and_then(|(x, y)| x.partial_cmp(&y))),
            },
            (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
            (Value::List(a), Value::List(b)) => seq_cmp(&a.borrow(), &b.borrow(), depth),
            (Value::Tuple(a), Value::Tuple(b)) => seq_cmp(a, b, depth),
            (Value::Set(a), Value::Set(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                let a_in_b = a.iter().all(|(k, _)| b.contains(k));
                let b_in_a = b.iter().all(|(k, _)| a.contains(k));
                Ok(match (a_in_b, b_in_a) {
                    (true, true) => Some(Ordering::Equal),
                    (true, false) => Some(Ordering::Less),
                    (false, true) => Some(Ordering::Greater),
                    (false, false) => None,
                })
            }
            (a, b) => Err(ScriptError::Type(format!(
                "'<' not supported between instances of '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    /// `str(value)`.
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Exception(e) => e.message.clone(),
            other => other.repr(),
        }
    }

    /// `repr(value)`.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, 0);
        out
    }

    fn write_repr(&self, out: &mut String, depth: usize) {
        if depth > 32 {
            out.push_str("...");
            return;
        }
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&float_repr(*f)),
            Value::Str(s) => out.push_str(&str_repr(s)),
            Value::List(items) => {
                out.push('[');
                write_items(out, &items.borrow(), depth);
                out.push(']');
            }
            Value::Tuple(items) => {
                out.push('(');
                write_items(out, items, depth);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::Dict(d) => {
                out.push('{');
                for (i, (k, v)) in d.borrow().entries().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.write_repr(out, depth + 1);
                    out.push_str(": ");
                    v.write_repr(out, depth + 1);
                }
                out.push('}');
            }
            Value::Set(s) => {
                let s = s.borrow();
                if s.is_empty() {
                    out.push_str("set()");
                } else {
                    out.push('{');
                    write_items(out, &s.values(), depth);
                    out.push('}');
                }
            }
            Value::Range(r) => {
                if r.step == 1 {
                    out.push_str(&format!("range({}, {})", r.start, r.stop));
                } else {
                    out.push_str(&format!("range({}, {}, {})", r.start, r.stop, r.step));
                }
            }
            Value::Table(t) => {
                let columns: Vec<&str> = t.columns.iter().map(|c| &**c).collect();
                out.push_str(&format!(
                    "table(columns=[{}], rows={})",
                    columns.join(", "),
                    t.rows.len()
                ));
            }
            Value::Function(f) => out.push_str(&format!("<function {}>", f.def.name)),
            Value::Native(n) => match n.module {
                Some(m) => out.push_str(&format!("<built-in function {m}.{}>", n.name)),
                None => out.push_str(&format!("<built-in function {}>", n.name)),
            },
            Value::Method(m) => out.push_str(&format!(
                "<built-in method {} of {} object>",
                m.name,
                m.receiver.type_name()
            )),
            Value::Module(name) => out.push_str(&format!("<module '{name}'>")),
            Value::ExceptionType(kind) => out.push_str(&format!("<class '{kind}'>")),
            Value::Exception(e) => out.push_str(&format!("{}({})", e.kind, str_repr(&e.message))),
        }
    }
}

fn write_items(out: &mut String, items: &[Value], depth: usize) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, depth + 1);
    }
}

fn seq_eq(a: &[Value], b: &[Value], depth: usize) -> ScriptResult<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b) {
        if !x.eq_at(y, depth + 1)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn seq_cmp(a: &[Value], b: &[Value], depth: usize) -> ScriptResult<Option<Ordering>> {
    for (x, y) in a.iter().zip(b) {
        if x.eq_at(y, depth + 1)? {
            continue;
        }
        return x.cmp_at(y, depth + 1);
    }
    Ok(Some(a.len().cmp(&b.len())))
}

/// Index of the first element equal to `needle`.
pub fn position_of(items: &[Value], needle: &Value) -> ScriptResult<Option<usize>> {
    for (i, item) in items.iter().enumerate() {
        if item.py_eq(needle)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// Python's `repr` of a float: shortest round-trip digits, scientific
/// notation outside `[1e-4, 1e16)`.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{f:e}");
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(d) => ('-', d),
            None => ('+', exponent),
        };
        return format!("{mantissa}e{sign}{digits:0>2}");
    }
    if f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.def.name)
    }
}

// ── Conversion to and from core values ───────────────────────

/// Copy a fixture value into fresh interpreter values.
pub fn from_core(value: &CoreValue) -> Value {
    match value {
        CoreValue::Null => Value::None,
        CoreValue::Bool(b) => Value::Bool(*b),
        CoreValue::Int(i) => Value::Int(*i),
        CoreValue::Float(f) => Value::Float(*f),
        CoreValue::Str(s) => Value::str(s.as_str()),
        CoreValue::List(items) => Value::list(items.iter().map(from_core).collect()),
        CoreValue::Map(entries) => {
            let mut dict = Dict::default();
            for (k, v) in entries {
                let key = from_core(k);
                match HashKey::of(&key) {
                    Ok(hash) => dict.insert(hash, key, from_core(v)),
                    Err(_) => continue,
                }
            }
            Value::dict(dict)
        }
        CoreValue::Table(table) => Value::Table(Rc::new(TableValue {
            columns: table.columns.iter().map(|c| Rc::from(c.as_str())).collect(),
            rows: table
                .rows
                .iter()
                .map(|row| row.iter().map(from_core).collect())
                .collect(),
        })),
    }
}

/// Convert a result back into a language-neutral value.
///
/// Tuples and ranges become lists; sets become lists in their (sorted)
/// iteration order.
pub fn to_core(value: &Value) -> Result<CoreValue, String> {
    to_core_at(value, 0)
}

fn to_core_at(value: &Value, depth: usize) -> Result<CoreValue, String> {
    if depth > 64 {
        return Err("result is nested too deeply to convert".into());
    }
    let list = |items: &[Value]| -> Result<CoreValue, String> {
        items
            .iter()
            .map(|v| to_core_at(v, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(CoreValue::List)
    };
    Ok(match value {
        Value::None => CoreValue::Null,
        Value::Bool(b) => CoreValue::Bool(*b),
        Value::Int(i) => CoreValue::Int(*i),
        Value::Float(f) => CoreValue::Float(*f),
        Value::Str(s) => CoreValue::Str(s.to_string()),
        Value::List(items) => list(&items.borrow())?,
        Value::Tuple(items) => list(items)?,
        Value::Set(s) => list(&s.borrow().values())?,
        Value::Range(r) => CoreValue::List(
            (0..r.len())
                .filter_map(|i| r.get(i))
                .map(CoreValue::Int)
                .collect(),
        ),
        Value::Dict(d) => CoreValue::Map(
            d.borrow()
                .entries()
                .iter()
                .map(|(k, v)| Ok((to_core_at(k, depth + 1)?, to_core_at(v, depth + 1)?)))
                .collect::<Result<Vec<_>, String>>()?,
        ),
        Value::Table(t) => CoreValue::Table(drill_core::Table::new(
            t.columns.iter().map(|c| c.to_string()).collect(),
            t.rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|v| to_core_at(v, depth + 1))
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()?,
        )),
        other => {
            return Err(format!(
                "the result is a {}, which is not a value that can be graded",
                other.type_name()
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_keys_unify() {
        let a = HashKey::of(&Value::Int(1)).expect("hash");
        let b = HashKey::of(&Value::Float(1.0)).expect("hash");
        let c = HashKey::of(&Value::Bool(true)).expect("hash");
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_lists_are_unhashable() {
        let err = HashKey::of(&Value::list(vec![])).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: unhashable type: 'list'");
    }

    #[test]
    fn test_dict_keeps_insertion_order_after_removal() {
        let mut d = Dict::default();
        for (i, k) in ["a", "b", "c"].iter().enumerate() {
            d.insert_str(Rc::from(*k), Value::Int(i as i64));
        }
        d.remove(&HashKey::Str(Rc::from("a")));
        assert_eq!(Value::dict(d.clone()).repr(), "{'b': 1, 'c': 2}");
        assert_eq!(d.get(&HashKey::Str(Rc::from("c"))).map(|v| v.repr()), Some("2".into()));
    }

    #[test]
    fn test_float_repr_matches_python() {
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(2.0), "2.0");
        assert_eq!(float_repr(1e-15), "1e-15");
        assert_eq!(float_repr(1.5e-7), "1.5e-07");
        assert_eq!(float_repr(1e16), "1e+16");
    }

    #[test]
    fn test_range_len_and_membership() {
        let r = Range {
            start: 10,
            stop: 0,
            step: -3,
        };
        assert_eq!(r.len(), 4);
        assert!(r.contains(4));
        assert!(!r.contains(5));
    }

    #[test]
    fn test_tuple_ordering_is_lexicographic() {
        let a = Value::tuple(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::tuple(vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(a.py_cmp(&b).expect("cmp"), Some(Ordering::Less));
        assert!(Value::Int(1).py_cmp(&Value::str("a")).is_err());
    }

    /// Debug builds use large frames; give nesting tests the interpreter's stack.
    fn on_interpreter_stack(f: impl FnOnce() + Send + 'static) {
        std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(f)
            .expect("spawn")
            .join()
            .expect("test thread panicked");
    }

    #[test]
    fn test_self_referencing_lists_compare_with_recursion_error() {
        on_interpreter_stack(|| {
            let a = Value::list(vec![]);
            let b = Value::list(vec![]);
            for v in [&a, &b] {
                if let Value::List(items) = v {
                    items.borrow_mut().push(v.clone());
                }
            }
            assert_eq!(a.py_eq(&a), Ok(true));
            let err = a.py_eq(&b).unwrap_err();
            assert_eq!(
                err.to_string(),
                "RecursionError: maximum recursion depth exceeded in comparison"
            );
            assert!(err.is_ceiling());
            assert!(a.py_cmp(&b).is_err());

            // Break the cycles so the test does not leak.
            for v in [&a, &b] {
                if let Value::List(items) = v {
                    items.borrow_mut().clear();
                }
            }
        });
    }

    #[test]
    fn test_moderately_nested_values_still_compare() {
        on_interpreter_stack(|| {
            let nest = |tuple: bool| {
                let mut v = Value::Int(1);
                for _ in 0..500 {
                    v = if tuple {
                        Value::tuple(vec![v])
                    } else {
                        Value::list(vec![v])
                    };
                }
                v
            };
            assert_eq!(nest(false).py_eq(&nest(false)), Ok(true));
            assert_eq!(nest(true).py_eq(&nest(true)), Ok(true));
            assert_eq!(nest(true).py_cmp(&nest(true)), Ok(Some(Ordering::Equal)));
            assert!(HashKey::of(&nest(true)).is_ok());
        });
    }

    #[test]
    fn test_hashing_deeply_nested_tuple_is_a_recursion_error() {
        on_interpreter_stack(|| {
            let mut t = Value::tuple(vec![]);
            for _ in 0..MAX_VALUE_NESTING + 10 {
                t = Value::tuple(vec![t]);
            }
            let err = HashKey::of(&t).unwrap_err();
            assert!(matches!(err, ScriptError::Nesting("while hashing")));
        });
    }

    #[test]
    fn test_dropping_deeply_nested_containers_does_not_recurse() {
        let mut list = Value::list(vec![]);
        let mut tuple = Value::tuple(vec![]);
        for i in 0..1_000_000 {
            list = Value::list(vec![list]);
            tuple = Value::tuple(vec![Value::Int(i), tuple]);
        }
        drop(list);
        drop(tuple);

        let mut dict = Value::dict(Dict::default());
        for _ in 0..200_000 {
            let mut d = Dict::default();
            d.insert_str(Rc::from("next"), dict);
            dict = Value::dict(d);
        }
        drop(dict);
    }

    #[test]
    fn test_core_round_trip_turns_sets_into_sorted_lists() {
        let mut s = Set::default();
        for n in [3, 1, 2] {
            s.insert(HashKey::Int(n), Value::Int(n));
        }
        assert_eq!(to_core(&Value::set(s)), Ok(CoreValue::int_list(&[1, 2, 3])));
    }
}
