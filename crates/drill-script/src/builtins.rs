//! Builtin functions and the methods of builtin types.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::ast::BinOp;
use crate::error::{ScriptError, ScriptResult};
use crate::format;
use crate::interpreter::Interpreter;
use crate::modules;
use crate::value::{position_of, Dict, HashKey, Items, Native, Range, Set, Value};

const BUILTINS: &[&str] = &[
    "print", "len", "range", "enumerate", "zip", "min", "max", "sum", "abs", "sorted",
    "reversed", "list", "dict", "set", "tuple", "str", "int", "float", "bool", "round", "any",
    "all", "map", "filter", "divmod", "pow", "ord", "chr", "repr",
];

const EXCEPTIONS: &[&str] = &[
    "Exception",
    "BaseException",
    "ValueError",
    "TypeError",
    "KeyError",
    "IndexError",
    "ZeroDivisionError",
    "RuntimeError",
    "AssertionError",
    "ArithmeticError",
    "LookupError",
    "NotImplementedError",
    "StopIteration",
];

/// Resolve a name that is not bound in any scope.
pub fn lookup(name: &str) -> Option<Value> {
    if let Some(builtin) = BUILTINS.iter().find(|b| **b == name) {
        return Some(Value::Native(Native::builtin(*builtin)));
    }
    EXCEPTIONS
        .iter()
        .find(|e| **e == name)
        .map(|e| Value::ExceptionType(Rc::from(*e)))
}

// ── Argument helpers ─────────────────────────────────────────

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> ScriptResult<()> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        format!("exactly {min}")
    } else if args.len() < min {
        format!("at least {min}")
    } else {
        format!("at most {max}")
    };
    Err(ScriptError::Type(format!(
        "{name}() takes {expected} argument{} ({} given)",
        if min == max && min == 1 { "" } else { "s" },
        args.len()
    )))
}

fn no_kwargs(name: &str, kwargs: &[(String, Value)]) -> ScriptResult<()> {
    match kwargs.first() {
        None => Ok(()),
        Some((key, _)) => Err(ScriptError::Type(format!(
            "{name}() got an unexpected keyword argument '{key}'"
        ))),
    }
}

/// Split out the keyword arguments named in `allowed`.
fn take_kwargs(
    name: &str,
    kwargs: Vec<(String, Value)>,
    allowed: &[&str],
) -> ScriptResult<Vec<Option<Value>>> {
    let mut out = vec![None; allowed.len()];
    for (key, value) in kwargs {
        let Some(i) = allowed.iter().position(|a| *a == key) else {
            return Err(ScriptError::Type(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            )));
        };
        out[i] = Some(value);
    }
    Ok(out)
}

fn int_arg(name: &str, value: &Value) -> ScriptResult<i64> {
    value.as_int().ok_or_else(|| {
        ScriptError::Type(format!(
            "{name}() expected an integer, got '{}'",
            value.type_name()
        ))
    })
}

pub(crate) fn number_arg(name: &str, value: &Value) -> ScriptResult<f64> {
    value.as_f64().ok_or_else(|| {
        ScriptError::Type(format!(
            "{name}() argument must be a number, not '{}'",
            value.type_name()
        ))
    })
}

fn str_arg<'a>(name: &str, value: &'a Value) -> ScriptResult<&'a str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::Type(format!(
            "{name}() argument must be str, not {}",
            other.type_name()
        ))),
    }
}

// ── Sorting ──────────────────────────────────────────────────

fn less(a: &Value, b: &Value) -> ScriptResult<bool> {
    Ok(a.py_cmp(b)? == Some(Ordering::Less))
}

/// Stable merge sort with a fallible comparison. `reverse` keeps equal
/// elements in their original order, as Python does.
pub(crate) fn sort_values(
    interp: &mut Interpreter,
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> ScriptResult<Vec<Value>> {
    let n = items.len();
    let log = (usize::BITS - n.leading_zeros()) as usize;
    interp.charge(n.saturating_mul(log.max(1)))?;
    let mut keyed = Vec::with_capacity(n);
    for item in items {
        let k = match key {
            Some(Value::None) | None => item.clone(),
            Some(f) => interp.call(f, vec![item.clone()], Vec::new())?,
        };
        keyed.push((k, item));
    }
    let precedes = |a: &Value, b: &Value| if reverse { less(b, a) } else { less(a, b) };
    Ok(merge_sort(keyed, &precedes)?
        .into_iter()
        .map(|(_, v)| v)
        .collect())
}

fn merge_sort(
    mut items: Vec<(Value, Value)>,
    precedes: &dyn Fn(&Value, &Value) -> ScriptResult<bool>,
) -> ScriptResult<Vec<(Value, Value)>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, precedes)?;
    let right = merge_sort(right, precedes)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut l = left.into_iter().peekable();
    let mut r = right.into_iter().peekable();
    loop {
        let take_right = match (l.peek(), r.peek()) {
            (Some(a), Some(b)) => precedes(&b.0, &a.0)?,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        out.extend(if take_right { r.next() } else { l.next() });
    }
    Ok(out)
}

/// `min`/`max` over positional args or a single iterable.
fn extremum(
    interp: &mut Interpreter,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    want: Ordering,
) -> ScriptResult<Value> {
    let [key, default] = <[Option<Value>; 2]>::try_from(take_kwargs(name, kwargs, &["key", "default"])?)
        .unwrap_or([None, None]);
    let candidates = match args.len() {
        0 => return Err(ScriptError::Type(format!("{name} expected at least 1 argument, got 0"))),
        1 => interp.collect(&args[0])?,
        _ => args,
    };
    let mut best: Option<(Value, Value)> = None;
    for item in candidates {
        let k = match &key {
            Some(f) if !matches!(f, Value::None) => interp.call(f, vec![item.clone()], Vec::new())?,
            _ => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_key, _)) => k.py_cmp(best_key)? == Some(want),
        };
        if replace {
            best = Some((k, item));
        }
    }
    match (best, default) {
        (Some((_, item)), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(ScriptError::Value(format!("{name}() arg is an empty sequence"))),
    }
}

// ── Builtin functions ────────────────────────────────────────

pub fn call_native(
    interp: &mut Interpreter,
    native: Native,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> ScriptResult<Value> {
    interp.tick()?;
    if let Some(module) = native.module {
        return modules::call(interp, module, native.name, args, kwargs);
    }
    let name = native.name;
    match name {
        "print" => {
            let [sep, end] = <[Option<Value>; 2]>::try_from(take_kwargs(name, kwargs, &["sep", "end"])?)
                .unwrap_or([None, None]);
            let sep = sep.map(|s| s.to_str()).unwrap_or_else(|| " ".into());
            let end = end.map(|s| s.to_str()).unwrap_or_else(|| "\n".into());
            let line = args.iter().map(Value::to_str).collect::<Vec<_>>().join(&sep);
            interp.print(&line);
            interp.print(&end);
            Ok(Value::None)
        }
        "min" => extremum(interp, name, args, kwargs, Ordering::Less),
        "max" => extremum(interp, name, args, kwargs, Ordering::Greater),
        "sorted" => {
            arity(name, &args, 1, 1)?;
            let [key, reverse] = <[Option<Value>; 2]>::try_from(take_kwargs(name, kwargs, &["key", "reverse"])?)
                .unwrap_or([None, None]);
            let items = interp.collect(&args[0])?;
            let reverse = reverse.is_some_and(|r| r.truthy());
            Ok(Value::list(sort_values(interp, items, key.as_ref(), reverse)?))
        }
        "enumerate" => {
            let [start] = <[Option<Value>; 1]>::try_from(take_kwargs(name, kwargs, &["start"])?)
                .unwrap_or([None]);
            arity(name, &args, 1, 2)?;
            let start = match args.get(1).or(start.as_ref()) {
                Some(v) => int_arg(name, v)?,
                None => 0,
            };
            let items = interp.collect(&args[0])?;
            Ok(Value::list(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| Value::tuple(vec![Value::Int(start + i as i64), v]))
                    .collect(),
            ))
        }
        _ => {
            no_kwargs(name, &kwargs)?;
            call_positional(interp, name, args)
        }
    }
}

fn call_positional(interp: &mut Interpreter, name: &str, args: Vec<Value>) -> ScriptResult<Value> {
    match name {
        "len" => {
            arity(name, &args, 1, 1)?;
            let n = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.borrow().len(),
                Value::Tuple(items) => items.len(),
                Value::Dict(d) => d.borrow().len(),
                Value::Set(s) => s.borrow().len(),
                Value::Range(r) => r.len(),
                Value::Table(t) => t.rows.len(),
                other => {
                    return Err(ScriptError::Type(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(n as i64))
        }
        "range" => {
            arity(name, &args, 1, 3)?;
            let ints = args
                .iter()
                .map(|a| {
                    a.as_int().ok_or_else(|| {
                        ScriptError::Type(format!(
                            "'{}' object cannot be interpreted as an integer",
                            a.type_name()
                        ))
                    })
                })
                .collect::<ScriptResult<Vec<_>>>()?;
            let range = match ints.as_slice() {
                [stop] => Range::new(0, *stop, 1)?,
                [start, stop] => Range::new(*start, *stop, 1)?,
                [start, stop, step] => Range::new(*start, *stop, *step)?,
                _ => return Err(ScriptError::Type("range expected at most 3 arguments".into())),
            };
            Ok(Value::Range(range))
        }
        "zip" => {
            let mut columns = Vec::with_capacity(args.len());
            for arg in &args {
                columns.push(interp.collect(arg)?);
            }
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            Ok(Value::list(
                (0..len)
                    .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                    .collect(),
            ))
        }
        "sum" => {
            arity(name, &args, 1, 2)?;
            let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
            if matches!(total, Value::Str(_)) {
                return Err(ScriptError::Type(
                    "sum() can't sum strings [use ''.join(seq) instead]".into(),
                ));
            }
            for item in interp.collect(&args[0])? {
                total = interp.binary(BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        "abs" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                v => v
                    .as_int()
                    .ok_or_else(|| {
                        ScriptError::Type(format!(
                            "bad operand type for abs(): '{}'",
                            v.type_name()
                        ))
                    })?
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| ScriptError::Overflow("integer result does not fit in 64 bits".into())),
            }
        }
        "reversed" => {
            arity(name, &args, 1, 1)?;
            if matches!(args[0], Value::Set(_) | Value::Dict(_)) {
                return Err(ScriptError::Type(format!(
                    "'{}' object is not reversible",
                    args[0].type_name()
                )));
            }
            let mut items = interp.collect(&args[0])?;
            items.reverse();
            Ok(Value::list(items))
        }
        "list" => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                Some(v) => Ok(Value::list(interp.collect(v)?)),
                None => Ok(Value::list(Vec::new())),
            }
        }
        "tuple" => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                Some(Value::Tuple(t)) => Ok(Value::Tuple(t.clone())),
                Some(v) => Ok(Value::tuple(interp.collect(v)?)),
                None => Ok(Value::tuple(Vec::new())),
            }
        }
        "set" => {
            arity(name, &args, 0, 1)?;
            let mut set = Set::default();
            if let Some(v) = args.first() {
                for item in interp.collect(v)? {
                    set.insert(HashKey::of(&item)?, item);
                }
            }
            Ok(Value::set(set))
        }
        "dict" => {
            arity(name, &args, 0, 1)?;
            let mut dict = Dict::default();
            match args.first() {
                Some(Value::Dict(d)) => {
                    dict = d.borrow().clone();
                    dict.default = None;
                }
                Some(v) => {
                    for pair in interp.collect(v)? {
                        let (k, v) = pair_of(interp, &pair)?;
                        dict.insert(HashKey::of(&k)?, k, v);
                    }
                }
                None => {}
            }
            Ok(Value::dict(dict))
        }
        "str" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::str(args.first().map(Value::to_str).unwrap_or_default()))
        }
        "repr" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::str(args[0].repr()))
        }
        "bool" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
        }
        "int" => {
            arity(name, &args, 0, 2)?;
            to_int(&args)
        }
        "float" => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => parse_float(s).map(Value::Float),
                Some(v) => Ok(Value::Float(number_arg(name, v)?)),
            }
        }
        "round" => {
            arity(name, &args, 1, 2)?;
            round(&args)
        }
        "any" | "all" => {
            arity(name, &args, 1, 1)?;
            let items = interp.collect(&args[0])?;
            Ok(Value::Bool(if name == "any" {
                items.iter().any(Value::truthy)
            } else {
                items.iter().all(Value::truthy)
            }))
        }
        "map" => {
            arity(name, &args, 2, usize::MAX)?;
            let mut columns = Vec::with_capacity(args.len() - 1);
            for arg in &args[1..] {
                columns.push(interp.collect(arg)?);
            }
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                let call_args = columns.iter().map(|c| c[i].clone()).collect();
                out.push(interp.call(&args[0], call_args, Vec::new())?);
            }
            Ok(Value::list(out))
        }
        "filter" => {
            arity(name, &args, 2, 2)?;
            let mut out = Vec::new();
            for item in interp.collect(&args[1])? {
                let keep = match &args[0] {
                    Value::None => item.truthy(),
                    f => interp.call(f, vec![item.clone()], Vec::new())?.truthy(),
                };
                if keep {
                    out.push(item);
                }
            }
            Ok(Value::list(out))
        }
        "divmod" => {
            arity(name, &args, 2, 2)?;
            let q = interp.binary(BinOp::FloorDiv, &args[0], &args[1])?;
            let r = interp.binary(BinOp::Mod, &args[0], &args[1])?;
            Ok(Value::tuple(vec![q, r]))
        }
        "pow" => {
            arity(name, &args, 2, 3)?;
            match args.get(2) {
                None => interp.binary(BinOp::Pow, &args[0], &args[1]),
                Some(m) => {
                    let (base, exp, m) = (int_arg(name, &args[0])?, int_arg(name, &args[1])?, int_arg(name, m)?);
                    if m == 0 {
                        return Err(ScriptError::Value("pow() 3rd argument cannot be 0".into()));
                    }
                    if exp < 0 {
                        return Err(ScriptError::Value(
                            "pow() 2nd argument cannot be negative when 3rd argument specified".into(),
                        ));
                    }
                    Ok(Value::Int(mod_pow(base, exp, m)))
                }
            }
        }
        "ord" => {
            arity(name, &args, 1, 1)?;
            let s = str_arg(name, &args[0])?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Int(c as i64)),
                _ => Err(ScriptError::Type(format!(
                    "ord() expected a character, but string of length {} found",
                    s.chars().count()
                ))),
            }
        }
        "chr" => {
            arity(name, &args, 1, 1)?;
            let code = int_arg(name, &args[0])?;
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(|c| Value::str(c.to_string()))
                .ok_or_else(|| ScriptError::Value("chr() arg not in range(0x110000)".into()))
        }
        other => Err(ScriptError::Name(format!("name '{other}' is not defined"))),
    }
}

fn pair_of(interp: &mut Interpreter, pair: &Value) -> ScriptResult<(Value, Value)> {
    let items = interp.collect(pair)?;
    match <[Value; 2]>::try_from(items) {
        Ok([k, v]) => Ok((k, v)),
        Err(items) => Err(ScriptError::Value(format!(
            "dictionary update sequence element has length {}; 2 is required",
            items.len()
        ))),
    }
}

fn mod_pow(base: i64, mut exp: i64, m: i64) -> i64 {
    let m = m as i128;
    let mut result: i128 = 1;
    let mut b = (base as i128).rem_euclid(m);
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * b % m;
        }
        b = b * b % m;
        exp >>= 1;
    }
    let r = result.rem_euclid(m);
    (if m < 0 && r != 0 { r + m } else { r }) as i64
}

fn to_int(args: &[Value]) -> ScriptResult<Value> {
    let Some(value) = args.first() else {
        return Ok(Value::Int(0));
    };
    if let Some(base) = args.get(1) {
        let base = int_arg("int", base)?;
        let s = str_arg("int", value)?;
        if !(2..=36).contains(&base) {
            return Err(ScriptError::Value("int() base must be >= 2 and <= 36, or 0".into()));
        }
        return i64::from_str_radix(&s.trim().replace('_', ""), base as u32)
            .map(Value::Int)
            .map_err(|_| {
                ScriptError::Value(format!(
                    "invalid literal for int() with base {base}: {}",
                    value.repr()
                ))
            });
    }
    match value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Float(f) => {
            if !f.is_finite() {
                return Err(if f.is_nan() {
                    ScriptError::Value("cannot convert float NaN to integer".into())
                } else {
                    ScriptError::Overflow("cannot convert float infinity to integer".into())
                });
            }
            let t = f.trunc();
            if t.abs() >= 9.2e18 {
                return Err(ScriptError::Overflow("integer result does not fit in 64 bits".into()));
            }
            Ok(Value::Int(t as i64))
        }
        Value::Str(s) => s.trim().replace('_', "").parse::<i64>().map(Value::Int).map_err(|_| {
            ScriptError::Value(format!(
                "invalid literal for int() with base 10: {}",
                value.repr()
            ))
        }),
        other => Err(ScriptError::Type(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn parse_float(s: &str) -> ScriptResult<f64> {
    let t = s.trim().to_ascii_lowercase();
    match t.as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => Ok(f64::INFINITY),
        "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
        "nan" | "+nan" | "-nan" => Ok(f64::NAN),
        _ => t.replace('_', "").parse::<f64>().map_err(|_| {
            ScriptError::Value(format!("could not convert string to float: {}", Value::str(s).repr()))
        }),
    }
}

fn round(args: &[Value]) -> ScriptResult<Value> {
    let digits = match args.get(1) {
        None | Some(Value::None) => None,
        Some(v) => Some(int_arg("round", v)?),
    };
    match (&args[0], digits) {
        (Value::Float(f), None) => {
            let r = f.round_ties_even();
            if !r.is_finite() || r.abs() >= 9.2e18 {
                return Err(ScriptError::Overflow("cannot convert float to integer".into()));
            }
            Ok(Value::Int(r as i64))
        }
        (Value::Float(f), Some(n)) => {
            if !f.is_finite() || *f == 0.0 || n > 308 {
                return Ok(Value::Float(*f));
            }
            // Every finite float rounds to zero at this many places.
            if n < -308 {
                return Ok(Value::Float(0.0 * *f));
            }
            let rounded = if n >= 0 {
                let scale = 10f64.powi(n as i32);
                let scaled = f * scale;
                if !scaled.is_finite() {
                    return Ok(Value::Float(*f));
                }
                scaled.round_ties_even() / scale
            } else {
                let scale = 10f64.powi(-n as i32);
                (f / scale).round_ties_even() * scale
            };
            if !rounded.is_finite() {
                return Err(ScriptError::Overflow(
                    "rounded value too large to represent".into(),
                ));
            }
            Ok(Value::Float(rounded))
        }
        (v, None) if v.as_int().is_some() => Ok(Value::Int(v.as_int().unwrap_or(0))),
        (v, Some(n)) if v.as_int().is_some() => {
            let i = v.as_int().unwrap_or(0);
            if n >= 0 {
                return Ok(Value::Int(i));
            }
            let scale = 10i64.checked_pow((-n) as u32).unwrap_or(i64::MAX);
            let rounded = ((i as f64) / scale as f64).round_ties_even() as i64;
            Ok(Value::Int(rounded.saturating_mul(scale)))
        }
        (v, _) => Err(ScriptError::Type(format!(
            "type {} doesn't define __round__ method",
            v.type_name()
        ))),
    }
}

// ── Methods ──────────────────────────────────────────────────

const LIST_METHODS: &[&str] = &[
    "append", "extend", "pop", "insert", "remove", "index", "count", "sort", "reverse", "copy",
    "clear", "popleft", "appendleft",
];
const DICT_METHODS: &[&str] = &[
    "get", "keys", "values", "items", "setdefault", "pop", "popitem", "update", "copy", "clear",
];
const SET_METHODS: &[&str] = &[
    "add", "remove", "discard", "pop", "union", "intersection", "difference", "issubset",
    "issuperset", "update", "copy", "clear",
];
const STR_METHODS: &[&str] = &[
    "lower", "upper", "strip", "lstrip", "rstrip", "split", "join", "replace", "startswith",
    "endswith", "find", "count", "isdigit", "isalpha", "isalnum", "format", "index", "title",
    "splitlines",
];
const TUPLE_METHODS: &[&str] = &["index", "count"];

pub fn has_method(receiver: &Value, name: &str) -> bool {
    let table = match receiver {
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Set(_) => SET_METHODS,
        Value::Str(_) => STR_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        _ => return false,
    };
    table.contains(&name)
}

pub fn call_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> ScriptResult<Value> {
    interp.tick()?;
    let qualified = format!("{}.{name}", receiver.type_name());
    match receiver {
        Value::List(items) if name == "sort" => {
            arity(&qualified, &args, 0, 0)?;
            let [key, reverse] = <[Option<Value>; 2]>::try_from(take_kwargs(&qualified, kwargs, &["key", "reverse"])?)
                .unwrap_or([None, None]);
            let snapshot = items.borrow().to_vec();
            let sorted = sort_values(interp, snapshot, key.as_ref(), reverse.is_some_and(|r| r.truthy()))?;
            **items.borrow_mut() = sorted;
            Ok(Value::None)
        }
        Value::Str(s) if name == "format" => Ok(Value::str(brace_format(s, &args, &kwargs)?)),
        _ => {
            no_kwargs(&qualified, &kwargs)?;
            match receiver {
                Value::List(items) => list_method(interp, items, &qualified, name, args),
                Value::Dict(d) => dict_method(interp, d, &qualified, name, args),
                Value::Set(s) => set_method(interp, s, &qualified, name, args),
                Value::Str(s) => str_method(interp, s, &qualified, name, args),
                Value::Tuple(items) => seq_method(items, &qualified, name, &args),
                other => Err(ScriptError::Attribute(format!(
                    "'{}' object has no attribute '{name}'",
                    other.type_name()
                ))),
            }
        }
    }
}

fn seq_method(items: &[Value], qualified: &str, name: &str, args: &[Value]) -> ScriptResult<Value> {
    arity(qualified, args, 1, 1)?;
    match name {
        "count" => {
            let mut count = 0;
            for item in items {
                if item.py_eq(&args[0])? {
                    count += 1;
                }
            }
            Ok(Value::Int(count))
        }
        _ => position_of(items, &args[0])?
            .map(|i| Value::Int(i as i64))
            .ok_or_else(|| ScriptError::Value(format!("{} is not in list", args[0].repr()))),
    }
}

fn list_method(
    interp: &mut Interpreter,
    items: &std::cell::RefCell<Items>,
    qualified: &str,
    name: &str,
    args: Vec<Value>,
) -> ScriptResult<Value> {
    match name {
        "append" | "appendleft" => {
            arity(qualified, &args, 1, 1)?;
            let len = items.borrow().len() + 1;
            interp.check_len(len)?;
            let value = args.into_iter().next().unwrap_or(Value::None);
            if name == "append" {
                items.borrow_mut().push(value);
            } else {
                items.borrow_mut().insert(0, value);
            }
            Ok(Value::None)
        }
        "extend" => {
            arity(qualified, &args, 1, 1)?;
            let extra = interp.collect(&args[0])?;
            let len = items.borrow().len() + extra.len();
            interp.check_len(len)?;
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            arity(qualified, &args, 2, 2)?;
            let len = items.borrow().len() as i64;
            let i = int_arg(qualified, &args[0])?;
            let i = if i < 0 { (i + len).max(0) } else { i.min(len) } as usize;
            interp.check_len(len as usize + 1)?;
            items.borrow_mut().insert(i, args[1].clone());
            Ok(Value::None)
        }
        "pop" | "popleft" => {
            arity(qualified, &args, 0, if name == "pop" { 1 } else { 0 })?;
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(ScriptError::Index(format!(
                    "pop from an empty {}",
                    if name == "pop" { "list" } else { "deque" }
                )));
            }
            let i = match (name, args.first()) {
                ("popleft", _) => 0,
                (_, None) => items.len() - 1,
                (_, Some(index)) => {
                    crate::interpreter::normalize_index(index, items.len(), "pop")?
                }
            };
            Ok(items.remove(i))
        }
        "remove" => {
            arity(qualified, &args, 1, 1)?;
            let position = position_of(&items.borrow(), &args[0])?;
            match position {
                Some(i) => {
                    items.borrow_mut().remove(i);
                    Ok(Value::None)
                }
                None => Err(ScriptError::Value("list.remove(x): x not in list".into())),
            }
        }
        "index" | "count" => seq_method(&items.borrow(), qualified, name, &args),
        "reverse" => {
            arity(qualified, &args, 0, 0)?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "copy" => {
            arity(qualified, &args, 0, 0)?;
            Ok(Value::list(items.borrow().to_vec()))
        }
        "clear" => {
            arity(qualified, &args, 0, 0)?;
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        other => Err(ScriptError::Attribute(format!(
            "'list' object has no attribute '{other}'"
        ))),
    }
}

fn dict_method(
    interp: &mut Interpreter,
    dict: &std::cell::RefCell<Dict>,
    qualified: &str,
    name: &str,
    args: Vec<Value>,
) -> ScriptResult<Value> {
    match name {
        "get" => {
            arity(qualified, &args, 1, 2)?;
            let hash = HashKey::of(&args[0])?;
            let found = dict.borrow().get(&hash).cloned();
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" | "values" | "items" => {
            arity(qualified, &args, 0, 0)?;
            let dict = dict.borrow();
            Ok(Value::list(match name {
                "keys" => dict.keys(),
                "values" => dict.values(),
                _ => dict
                    .entries()
                    .iter()
                    .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                    .collect(),
            }))
        }
        "setdefault" => {
            arity(qualified, &args, 1, 2)?;
            let hash = HashKey::of(&args[0])?;
            if let Some(existing) = dict.borrow().get(&hash) {
                return Ok(existing.clone());
            }
            let value = args.get(1).cloned().unwrap_or(Value::None);
            interp.check_len(dict.borrow().len() + 1)?;
            dict.borrow_mut().insert(hash, args[0].clone(), value.clone());
            Ok(value)
        }
        "pop" => {
            arity(qualified, &args, 1, 2)?;
            let hash = HashKey::of(&args[0])?;
            let removed = dict.borrow_mut().remove(&hash);
            match (removed, args.get(1)) {
                (Some((_, v)), _) => Ok(v),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(ScriptError::Key(args[0].repr())),
            }
        }
        "popitem" => {
            arity(qualified, &args, 0, 0)?;
            let popped = dict.borrow_mut().pop_last();
            popped
                .map(|(k, v)| Value::tuple(vec![k, v]))
                .ok_or_else(|| ScriptError::Key("'popitem(): dictionary is empty'".into()))
        }
        "update" => {
            arity(qualified, &args, 1, 1)?;
            let pairs: Vec<(Value, Value)> = match &args[0] {
                Value::Dict(other) => other.borrow().entries().to_vec(),
                other => {
                    let mut pairs = Vec::new();
                    for pair in interp.collect(other)? {
                        pairs.push(pair_of(interp, &pair)?);
                    }
                    pairs
                }
            };
            interp.check_len(dict.borrow().len() + pairs.len())?;
            let mut dict = dict.borrow_mut();
            for (k, v) in pairs {
                dict.insert(HashKey::of(&k)?, k, v);
            }
            Ok(Value::None)
        }
        "copy" => {
            arity(qualified, &args, 0, 0)?;
            Ok(Value::dict(dict.borrow().clone()))
        }
        "clear" => {
            arity(qualified, &args, 0, 0)?;
            dict.borrow_mut().clear();
            Ok(Value::None)
        }
        other => Err(ScriptError::Attribute(format!(
            "'dict' object has no attribute '{other}'"
        ))),
    }
}

fn set_method(
    interp: &mut Interpreter,
    set: &std::cell::RefCell<Set>,
    qualified: &str,
    name: &str,
    args: Vec<Value>,
) -> ScriptResult<Value> {
    match name {
        "add" => {
            arity(qualified, &args, 1, 1)?;
            let hash = HashKey::of(&args[0])?;
            interp.check_len(set.borrow().len() + 1)?;
            set.borrow_mut().insert(hash, args[0].clone());
            Ok(Value::None)
        }
        "remove" | "discard" => {
            arity(qualified, &args, 1, 1)?;
            let hash = HashKey::of(&args[0])?;
            let removed = set.borrow_mut().remove(&hash);
            if !removed && name == "remove" {
                return Err(ScriptError::Key(args[0].repr()));
            }
            Ok(Value::None)
        }
        "pop" => {
            arity(qualified, &args, 0, 0)?;
            let popped = set.borrow_mut().pop_first();
            popped.ok_or_else(|| ScriptError::Key("'pop from an empty set'".into()))
        }
        "union" | "intersection" | "difference" | "update" => {
            let mut out = set.borrow().clone();
            for arg in &args {
                let mut other = Set::default();
                for item in interp.collect(arg)? {
                    other.insert(HashKey::of(&item)?, item);
                }
                match name {
                    "intersection" => {
                        let mut kept = Set::default();
                        for (k, v) in out.iter().filter(|(k, _)| other.contains(k)) {
                            kept.insert(k.clone(), v.clone());
                        }
                        out = kept;
                    }
                    "difference" => {
                        for (k, _) in other.iter() {
                            out.remove(k);
                        }
                    }
                    _ => {
                        for (k, v) in other.iter() {
                            out.insert(k.clone(), v.clone());
                        }
                    }
                }
            }
            interp.check_len(out.len())?;
            if name == "update" {
                *set.borrow_mut() = out;
                Ok(Value::None)
            } else {
                Ok(Value::set(out))
            }
        }
        "issubset" | "issuperset" => {
            arity(qualified, &args, 1, 1)?;
            let mut other = Set::default();
            for item in interp.collect(&args[0])? {
                other.insert(HashKey::of(&item)?, item);
            }
            let set = set.borrow();
            Ok(Value::Bool(if name == "issubset" {
                set.iter().all(|(k, _)| other.contains(k))
            } else {
                other.iter().all(|(k, _)| set.contains(k))
            }))
        }
        "copy" => {
            arity(qualified, &args, 0, 0)?;
            Ok(Value::set(set.borrow().clone()))
        }
        "clear" => {
            arity(qualified, &args, 0, 0)?;
            set.borrow_mut().clear();
            Ok(Value::None)
        }
        other => Err(ScriptError::Attribute(format!(
            "'set' object has no attribute '{other}'"
        ))),
    }
}

fn str_method(
    interp: &mut Interpreter,
    s: &Rc<str>,
    qualified: &str,
    name: &str,
    args: Vec<Value>,
) -> ScriptResult<Value> {
    let strip_set = |args: &[Value]| -> ScriptResult<Option<Vec<char>>> {
        match args.first() {
            None | Some(Value::None) => Ok(None),
            Some(v) => Ok(Some(str_arg(qualified, v)?.chars().collect())),
        }
    };
    match name {
        "lower" => Ok(Value::str(s.to_lowercase())),
        "upper" => Ok(Value::str(s.to_uppercase())),
        "title" => {
            let mut out = String::with_capacity(s.len());
            let mut at_word_start = true;
            for c in s.chars() {
                if c.is_alphabetic() {
                    if at_word_start {
                        out.extend(c.to_uppercase());
                    } else {
                        out.extend(c.to_lowercase());
                    }
                    at_word_start = false;
                } else {
                    out.push(c);
                    at_word_start = true;
                }
            }
            Ok(Value::str(out))
        }
        "strip" | "lstrip" | "rstrip" => {
            arity(qualified, &args, 0, 1)?;
            let chars = strip_set(&args)?;
            let matches = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(matches),
                "lstrip" => s.trim_start_matches(matches),
                _ => s.trim_end_matches(matches),
            };
            Ok(Value::str(out))
        }
        "split" => {
            arity(qualified, &args, 0, 2)?;
            let max = match args.get(1) {
                Some(v) => int_arg(qualified, v)?,
                None => -1,
            };
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::None) => {
                    if max < 0 {
                        s.split_whitespace().map(Value::str).collect()
                    } else {
                        let mut parts = Vec::new();
                        let mut rest = s.trim_start();
                        while !rest.is_empty() && (parts.len() as i64) < max {
                            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                            parts.push(Value::str(&rest[..end]));
                            rest = rest[end..].trim_start();
                        }
                        if !rest.is_empty() {
                            parts.push(Value::str(rest));
                        }
                        parts
                    }
                }
                Some(sep) => {
                    let sep = str_arg(qualified, sep)?;
                    if sep.is_empty() {
                        return Err(ScriptError::Value("empty separator".into()));
                    }
                    if max < 0 {
                        s.split(sep).map(Value::str).collect()
                    } else {
                        s.splitn(max as usize + 1, sep).map(Value::str).collect()
                    }
                }
            };
            interp.check_len(parts.len())?;
            Ok(Value::list(parts))
        }
        "splitlines" => Ok(Value::list(s.lines().map(Value::str).collect())),
        "join" => {
            arity(qualified, &args, 1, 1)?;
            let items = interp.collect(&args[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(p) => parts.push(p.to_string()),
                    other => {
                        return Err(ScriptError::Type(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )))
                    }
                }
            }
            let joined = parts.join(&**s);
            interp.check_len(joined.len())?;
            Ok(Value::str(joined))
        }
        "replace" => {
            arity(qualified, &args, 2, 3)?;
            let (old, new) = (str_arg(qualified, &args[0])?, str_arg(qualified, &args[1])?);
            let out = match args.get(2) {
                Some(count) if int_arg(qualified, count)? >= 0 => {
                    s.replacen(old, new, int_arg(qualified, count)? as usize)
                }
                _ => s.replace(old, new),
            };
            interp.check_len(out.len())?;
            Ok(Value::str(out))
        }
        "startswith" | "endswith" => {
            arity(qualified, &args, 1, 1)?;
            let candidates: Vec<Value> = match &args[0] {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            let mut hit = false;
            for candidate in &candidates {
                let affix = str_arg(qualified, candidate)?;
                hit |= if name == "startswith" {
                    s.starts_with(affix)
                } else {
                    s.ends_with(affix)
                };
            }
            Ok(Value::Bool(hit))
        }
        "find" | "index" => {
            arity(qualified, &args, 1, 1)?;
            let needle = str_arg(qualified, &args[0])?;
            match s.find(needle) {
                Some(byte) => Ok(Value::Int(s[..byte].chars().count() as i64)),
                None if name == "find" => Ok(Value::Int(-1)),
                None => Err(ScriptError::Value("substring not found".into())),
            }
        }
        "count" => {
            arity(qualified, &args, 1, 1)?;
            let needle = str_arg(qualified, &args[0])?;
            let n = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Ok(Value::Int(n as i64))
        }
        "isdigit" => Ok(Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))),
        "isalpha" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic))),
        "isalnum" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphanumeric))),
        other => Err(ScriptError::Attribute(format!(
            "'str' object has no attribute '{other}'"
        ))),
    }
}

/// `str.format`: `{}`, `{0}`, `{name}` fields with optional `:spec`.
fn brace_format(template: &str, args: &[Value], kwargs: &[(String, Value)]) -> ScriptResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto = 0;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(ScriptError::Value(
                    "Single '}' encountered in format string".into(),
                ))
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => {
                            return Err(ScriptError::Value(
                                "Single '{' encountered in format string".into(),
                            ))
                        }
                    }
                }
                let (field_name, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let value = if field_name.is_empty() {
                    let v = args.get(auto);
                    auto += 1;
                    v
                } else if let Ok(i) = field_name.parse::<usize>() {
                    args.get(i)
                } else {
                    kwargs.iter().find(|(k, _)| k == field_name).map(|(_, v)| v)
                };
                let value = value.ok_or_else(|| {
                    if field_name.is_empty() || field_name.parse::<usize>().is_ok() {
                        ScriptError::Index(
                            "Replacement index out of range for positional args tuple".into(),
                        )
                    } else {
                        ScriptError::Key(format!("'{field_name}'"))
                    }
                })?;
                out.push_str(&format::format_spec(value, spec)?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::ExecutionLimits;

    fn eval(source: &str) -> String {
        let mut interp = Interpreter::new(&ExecutionLimits::default(), &[]);
        interp.run(&format!("x = {source}\n")).expect("program runs");
        interp.global("x").map(|v| v.repr()).unwrap_or_default()
    }

    #[test]
    fn test_sorted_is_stable_and_supports_reverse() {
        assert_eq!(
            eval("sorted([(1, 'b'), (0, 'z'), (1, 'a')], key=lambda p: p[0], reverse=True)"),
            "[(1, 'b'), (1, 'a'), (0, 'z')]"
        );
        assert_eq!(eval("sorted({'b': 1, 'a': 2})"), "['a', 'b']");
    }

    #[test]
    fn test_sorting_mixed_types_is_a_type_error() {
        let mut interp = Interpreter::new(&ExecutionLimits::default(), &[]);
        let err = interp.run("sorted([1, 'a'])\n").unwrap_err();
        assert!(err.to_string().contains("TypeError"));
    }

    #[test]
    fn test_min_max_with_key_and_default() {
        assert_eq!(eval("max(['aa', 'b', 'ccc'], key=len)"), "'ccc'");
        assert_eq!(eval("min([], default=-1)"), "-1");
        assert_eq!(eval("max(3, 7, 5)"), "7");
    }

    #[test]
    fn test_round_is_bankers() {
        assert_eq!(eval("round(2.5)"), "2");
        assert_eq!(eval("round(3.14159, 2)"), "3.14");
    }

    #[test]
    fn test_round_with_extreme_ndigits() {
        assert_eq!(eval("round(1e308, -400)"), "0.0");
        assert_eq!(eval("round(-1e308, -400)"), "-0.0");
        assert_eq!(eval("round(123.456, -1)"), "120.0");
        assert_eq!(eval("round(-0.5, 400)"), "-0.5");
        assert_eq!(eval("round(float('inf'), -400)"), "inf");
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(eval("' a b '.split()"), "['a', 'b']");
        assert_eq!(eval("'-'.join(['x', 'y'])"), "'x-y'");
        assert_eq!(eval("'{} and {name}'.format(1, name='two')"), "'1 and two'");
        assert_eq!(eval("'banana'.count('an')"), "2");
    }

    #[test]
    fn test_dict_and_set_methods() {
        assert_eq!(eval("{'a': 1}.get('b', 0)"), "0");
        assert_eq!(eval("{1, 2, 3}.intersection([2, 3, 4])"), "{2, 3}");
        assert_eq!(eval("list({'a': 1, 'b': 2}.items())"), "[('a', 1), ('b', 2)]");
    }

    #[test]
    fn test_int_conversion_errors() {
        let mut interp = Interpreter::new(&ExecutionLimits::default(), &[]);
        let err = interp.run("int('abc')\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "line 1: ValueError: invalid literal for int() with base 10: 'abc'"
        );
    }
}
