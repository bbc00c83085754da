//! Helper modules an exercise can whitelist: `math`, `collections`,
//! `heapq` and `table`. `typing` is always importable and binds every name
//! to `None`, so annotations resolve.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::builtins::{number_arg, sort_values};
use crate::error::{ScriptError, ScriptResult};
use crate::interpreter::Interpreter;
use crate::value::{Dict, HashKey, Items, Native, Value};

const MATH_FUNCTIONS: &[&str] = &[
    "sqrt", "log", "log2", "log10", "exp", "floor", "ceil", "fabs", "pow", "isclose", "trunc",
    "gcd", "isqrt", "factorial",
];
const COLLECTIONS_FUNCTIONS: &[&str] = &["deque", "Counter", "defaultdict", "OrderedDict"];
const HEAPQ_FUNCTIONS: &[&str] = &["heappush", "heappop", "heapify", "nsmallest", "nlargest"];
const TABLE_FUNCTIONS: &[&str] = &["table"];
const TYPING_NAMES: &[&str] = &["List", "Dict", "Set", "Tuple", "Optional", "Any", "Union"];

/// Look up `module.name`.
pub fn attr(module: &'static str, name: &str) -> Option<Value> {
    let functions = match module {
        "math" => {
            let constant = match name {
                "pi" => Some(std::f64::consts::PI),
                "e" => Some(std::f64::consts::E),
                "tau" => Some(std::f64::consts::TAU),
                "inf" => Some(f64::INFINITY),
                "nan" => Some(f64::NAN),
                _ => None,
            };
            if let Some(c) = constant {
                return Some(Value::Float(c));
            }
            MATH_FUNCTIONS
        }
        "collections" => COLLECTIONS_FUNCTIONS,
        "heapq" => HEAPQ_FUNCTIONS,
        "table" => TABLE_FUNCTIONS,
        "typing" => {
            return TYPING_NAMES.contains(&name).then_some(Value::None);
        }
        _ => return None,
    };
    functions
        .iter()
        .find(|f| **f == name)
        .map(|f| Value::Native(Native::in_module(module, *f)))
}

pub fn call(
    interp: &mut Interpreter,
    module: &str,
    name: &'static str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> ScriptResult<Value> {
    match module {
        "math" => math(name, &args, &kwargs),
        "collections" => collections(interp, name, args, kwargs),
        "heapq" => heapq(interp, name, args, kwargs),
        "table" => table(interp, args, kwargs),
        other => Err(ScriptError::Attribute(format!(
            "module '{other}' has no attribute '{name}'"
        ))),
    }
}

fn expect_args(qualified: &str, args: &[Value], n: usize) -> ScriptResult<()> {
    if args.len() == n {
        Ok(())
    } else {
        Err(ScriptError::Type(format!(
            "{qualified}() takes exactly {n} argument{} ({} given)",
            if n == 1 { "" } else { "s" },
            args.len()
        )))
    }
}

fn domain_error() -> ScriptError {
    ScriptError::Value("math domain error".into())
}

// ── math ─────────────────────────────────────────────────────

fn math(name: &str, args: &[Value], kwargs: &[(String, Value)]) -> ScriptResult<Value> {
    let qualified = format!("math.{name}");
    if name != "isclose" {
        if let Some((key, _)) = kwargs.first() {
            return Err(ScriptError::Type(format!(
                "{qualified}() got an unexpected keyword argument '{key}'"
            )));
        }
    }
    let float = |i: usize| number_arg(&qualified, &args[i]);
    match name {
        "sqrt" => {
            expect_args(&qualified, args, 1)?;
            let x = float(0)?;
            if x < 0.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(x.sqrt()))
        }
        "log" => {
            if args.is_empty() || args.len() > 2 {
                return Err(ScriptError::Type(format!(
                    "log expected 1 or 2 arguments, got {}",
                    args.len()
                )));
            }
            let x = float(0)?;
            if x <= 0.0 {
                return Err(domain_error());
            }
            match args.get(1) {
                None => Ok(Value::Float(x.ln())),
                Some(_) => {
                    let base = float(1)?;
                    if base <= 0.0 || base == 1.0 {
                        return Err(if base == 1.0 {
                            ScriptError::ZeroDivision("float division by zero".into())
                        } else {
                            domain_error()
                        });
                    }
                    Ok(Value::Float(x.ln() / base.ln()))
                }
            }
        }
        "log2" | "log10" => {
            expect_args(&qualified, args, 1)?;
            let x = float(0)?;
            if x <= 0.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(if name == "log2" { x.log2() } else { x.log10() }))
        }
        "exp" => {
            expect_args(&qualified, args, 1)?;
            let result = float(0)?.exp();
            if result.is_infinite() {
                return Err(ScriptError::Overflow("math range error".into()));
            }
            Ok(Value::Float(result))
        }
        "floor" | "ceil" | "trunc" => {
            expect_args(&qualified, args, 1)?;
            if let Some(i) = args[0].as_int() {
                return Ok(Value::Int(i));
            }
            let x = float(0)?;
            let rounded = match name {
                "floor" => x.floor(),
                "ceil" => x.ceil(),
                _ => x.trunc(),
            };
            if !rounded.is_finite() || rounded.abs() >= 9.2e18 {
                return Err(ScriptError::Overflow(
                    "cannot convert float infinity to integer".into(),
                ));
            }
            Ok(Value::Int(rounded as i64))
        }
        "fabs" => {
            expect_args(&qualified, args, 1)?;
            Ok(Value::Float(float(0)?.abs()))
        }
        "pow" => {
            expect_args(&qualified, args, 2)?;
            let (x, y) = (float(0)?, float(1)?);
            if x < 0.0 && y.fract() != 0.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(x.powf(y)))
        }
        "isclose" => {
            expect_args(&qualified, args, 2)?;
            let (a, b) = (float(0)?, float(1)?);
            let mut rel_tol = 1e-9;
            let mut abs_tol = 0.0;
            for (key, value) in kwargs {
                match key.as_str() {
                    "rel_tol" => rel_tol = number_arg(&qualified, value)?,
                    "abs_tol" => abs_tol = number_arg(&qualified, value)?,
                    other => {
                        return Err(ScriptError::Type(format!(
                            "{qualified}() got an unexpected keyword argument '{other}'"
                        )))
                    }
                }
            }
            let close = a == b || (a - b).abs() <= f64::max(rel_tol * f64::max(a.abs(), b.abs()), abs_tol);
            Ok(Value::Bool(close))
        }
        "gcd" => {
            let mut acc: i64 = 0;
            for arg in args {
                let mut b = arg
                    .as_int()
                    .ok_or_else(|| {
                        ScriptError::Type(format!(
                            "'{}' object cannot be interpreted as an integer",
                            arg.type_name()
                        ))
                    })?
                    .unsigned_abs();
                let mut a = acc.unsigned_abs();
                while b != 0 {
                    (a, b) = (b, a % b);
                }
                acc = i64::try_from(a)
                    .map_err(|_| ScriptError::Overflow("integer result does not fit in 64 bits".into()))?;
            }
            Ok(Value::Int(acc))
        }
        "isqrt" => {
            expect_args(&qualified, args, 1)?;
            let n = args[0].as_int().ok_or_else(|| {
                ScriptError::Type("isqrt() argument must be an integer".into())
            })?;
            if n < 0 {
                return Err(ScriptError::Value("isqrt() argument must be nonnegative".into()));
            }
            let mut r = (n as f64).sqrt() as i64;
            while r.checked_mul(r).map_or(true, |sq| sq > n) {
                r -= 1;
            }
            while (r + 1).checked_mul(r + 1).is_some_and(|sq| sq <= n) {
                r += 1;
            }
            Ok(Value::Int(r))
        }
        "factorial" => {
            expect_args(&qualified, args, 1)?;
            let n = args[0].as_int().ok_or_else(|| {
                ScriptError::Type("factorial() only accepts integral values".into())
            })?;
            if n < 0 {
                return Err(ScriptError::Value(
                    "factorial() not defined for negative values".into(),
                ));
            }
            (1..=n)
                .try_fold(1i64, i64::checked_mul)
                .map(Value::Int)
                .ok_or_else(|| ScriptError::Overflow("integer result does not fit in 64 bits".into()))
        }
        other => Err(ScriptError::Attribute(format!(
            "module 'math' has no attribute '{other}'"
        ))),
    }
}

// ── collections ──────────────────────────────────────────────

fn collections(
    interp: &mut Interpreter,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> ScriptResult<Value> {
    if let Some((key, _)) = kwargs.first() {
        return Err(ScriptError::Type(format!(
            "{name}() got an unexpected keyword argument '{key}'"
        )));
    }
    if args.len() > 1 {
        return Err(ScriptError::Type(format!(
            "{name}() takes at most 1 argument ({} given)",
            args.len()
        )));
    }
    match name {
        // A deque is a list; `popleft` and `appendleft` are list methods here.
        "deque" => match args.first() {
            Some(items) => Ok(Value::list(interp.collect(items)?)),
            None => Ok(Value::list(Vec::new())),
        },
        "Counter" => {
            let mut counts = Dict::default();
            if let Some(items) = args.first() {
                for item in interp.collect(items)? {
                    let hash = HashKey::of(&item)?;
                    let current = counts.get(&hash).and_then(Value::as_int).unwrap_or(0);
                    counts.insert(hash, item, Value::Int(current + 1));
                }
            }
            counts.default = Some(Value::Native(Native::builtin("int")));
            Ok(Value::dict(counts))
        }
        "defaultdict" => {
            let mut dict = Dict::default();
            match args.first() {
                None | Some(Value::None) => {}
                Some(factory) if factory.is_callable() => dict.default = Some(factory.clone()),
                Some(other) => {
                    return Err(ScriptError::Type(format!(
                        "first argument must be callable or None, not {}",
                        other.type_name()
                    )))
                }
            }
            Ok(Value::dict(dict))
        }
        "OrderedDict" => match args.first() {
            Some(Value::Dict(d)) => {
                let mut copy = d.borrow().clone();
                copy.default = None;
                Ok(Value::dict(copy))
            }
            Some(other) => Err(ScriptError::Type(format!(
                "OrderedDict() expects a dict, got {}",
                other.type_name()
            ))),
            None => Ok(Value::dict(Dict::default())),
        },
        other => Err(ScriptError::Attribute(format!(
            "module 'collections' has no attribute '{other}'"
        ))),
    }
}

// ── heapq ────────────────────────────────────────────────────

fn heap_list(qualified: &str, value: &Value) -> ScriptResult<Rc<std::cell::RefCell<Items>>> {
    match value {
        Value::List(items) => Ok(items.clone()),
        other => Err(ScriptError::Type(format!(
            "{qualified}() argument 1 must be list, not {}",
            other.type_name()
        ))),
    }
}

fn heap_less(a: &Value, b: &Value) -> ScriptResult<bool> {
    Ok(a.py_cmp(b)? == Some(Ordering::Less))
}

fn sift_up(heap: &mut [Value], mut i: usize) -> ScriptResult<()> {
    while i > 0 {
        let parent = (i - 1) / 2;
        if !heap_less(&heap[i], &heap[parent])? {
            break;
        }
        heap.swap(i, parent);
        i = parent;
    }
    Ok(())
}

fn sift_down(heap: &mut [Value], mut i: usize) -> ScriptResult<()> {
    let n = heap.len();
    loop {
        let (left, right) = (2 * i + 1, 2 * i + 2);
        let mut smallest = i;
        if left < n && heap_less(&heap[left], &heap[smallest])? {
            smallest = left;
        }
        if right < n && heap_less(&heap[right], &heap[smallest])? {
            smallest = right;
        }
        if smallest == i {
            return Ok(());
        }
        heap.swap(i, smallest);
        i = smallest;
    }
}

fn heapq(
    interp: &mut Interpreter,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> ScriptResult<Value> {
    let qualified = format!("heapq.{name}");
    match name {
        "heappush" => {
            expect_args(&qualified, &args, 2)?;
            let heap = heap_list(&qualified, &args[0])?;
            let len = heap.borrow().len() + 1;
            interp.check_len(len)?;
            interp.charge(len.ilog2() as usize)?;
            let mut heap = heap.borrow_mut();
            heap.push(args[1].clone());
            let last = heap.len() - 1;
            sift_up(&mut heap, last)?;
            Ok(Value::None)
        }
        "heappop" => {
            expect_args(&qualified, &args, 1)?;
            let heap = heap_list(&qualified, &args[0])?;
            let mut heap = heap.borrow_mut();
            if heap.is_empty() {
                return Err(ScriptError::Index("index out of range".into()));
            }
            interp.charge(heap.len().ilog2() as usize)?;
            let top = heap.swap_remove(0);
            sift_down(&mut heap, 0)?;
            Ok(top)
        }
        "heapify" => {
            expect_args(&qualified, &args, 1)?;
            let heap = heap_list(&qualified, &args[0])?;
            let mut heap = heap.borrow_mut();
            interp.charge(heap.len())?;
            for i in (0..heap.len() / 2).rev() {
                sift_down(&mut heap, i)?;
            }
            Ok(Value::None)
        }
        "nsmallest" | "nlargest" => {
            expect_args(&qualified, &args, 2)?;
            let mut key = None;
            for (k, v) in kwargs {
                if k != "key" {
                    return Err(ScriptError::Type(format!(
                        "{qualified}() got an unexpected keyword argument '{k}'"
                    )));
                }
                key = Some(v);
            }
            let n = args[0].as_int().ok_or_else(|| {
                ScriptError::Type(format!(
                    "'{}' object cannot be interpreted as an integer",
                    args[0].type_name()
                ))
            })?;
            let items = interp.collect(&args[1])?;
            let mut sorted = sort_values(interp, items, key.as_ref(), name == "nlargest")?;
            sorted.truncate(n.max(0) as usize);
            Ok(Value::list(sorted))
        }
        other => Err(ScriptError::Attribute(format!(
            "module 'heapq' has no attribute '{other}'"
        ))),
    }
}

// ── table ────────────────────────────────────────────────────

/// `table(columns, rows)`: rows are sequences in column order or dicts
/// keyed by column name.
fn table(
    interp: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> ScriptResult<Value> {
    if let Some((key, _)) = kwargs.first() {
        return Err(ScriptError::Type(format!(
            "table() got an unexpected keyword argument '{key}'"
        )));
    }
    expect_args("table", &args, 2)?;
    let mut columns: Vec<Rc<str>> = Vec::new();
    for column in interp.collect(&args[0])? {
        match column {
            Value::Str(name) => {
                if columns.contains(&name) {
                    return Err(ScriptError::Value(format!("duplicate column '{name}'")));
                }
                columns.push(name);
            }
            other => {
                return Err(ScriptError::Type(format!(
                    "column names must be str, not {}",
                    other.type_name()
                )))
            }
        }
    }
    let mut rows = Vec::new();
    for row in interp.collect(&args[1])? {
        let cells = match &row {
            Value::Dict(d) => {
                let d = d.borrow();
                columns
                    .iter()
                    .map(|c| {
                        d.get(&HashKey::Str(c.clone()))
                            .cloned()
                            .ok_or_else(|| ScriptError::Key(format!("'{c}'")))
                    })
                    .collect::<ScriptResult<Vec<_>>>()?
            }
            other => interp.collect(other)?,
        };
        rows.push(cells);
    }
    interp.make_table(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::{ExecutionLimits, Helper};

    fn run_with(helpers: &[Helper], source: &str, name: &str) -> String {
        let mut interp = Interpreter::new(&ExecutionLimits::default(), helpers);
        interp.run(source).expect("program runs");
        interp.global(name).map(|v| v.repr()).unwrap_or_default()
    }

    #[test]
    fn test_math_ceil_returns_int() {
        assert_eq!(run_with(&[Helper::Math], "import math\nx = math.ceil(2.1)\n", "x"), "3");
        assert_eq!(
            run_with(&[Helper::Math], "import math\nx = math.log(8, 2)\n", "x"),
            "3.0"
        );
    }

    #[test]
    fn test_math_domain_error() {
        let mut interp = Interpreter::new(&ExecutionLimits::default(), &[Helper::Math]);
        let err = interp.run("import math\nmath.sqrt(-1)\n").unwrap_err();
        assert_eq!(err.to_string(), "line 2: ValueError: math domain error");
    }

    #[test]
    fn test_heap_orders_tuples() {
        let source = "import heapq\nh = [(3, 'c'), (1, 'a'), (2, 'b')]\nheapq.heapify(h)\nheapq.heappush(h, (0, 'z'))\nx = [heapq.heappop(h)[1] for _ in range(4)]\n";
        assert_eq!(run_with(&[Helper::Heapq], source, "x"), "['z', 'a', 'b', 'c']");
    }

    #[test]
    fn test_counter_and_defaultdict() {
        let source = "from collections import Counter, defaultdict\nc = Counter('abca')\nd = defaultdict(list)\nd['k'].append(1)\nx = (c['a'], c['q'], d['k'])\n";
        assert_eq!(run_with(&[Helper::Collections], source, "x"), "(2, 0, [1])");
    }

    #[test]
    fn test_deque_popleft() {
        let source = "import collections\nq = collections.deque([1, 2])\nq.append(3)\nx = q.popleft()\n";
        assert_eq!(run_with(&[Helper::Collections], source, "x"), "1");
    }

    #[test]
    fn test_table_from_rows_and_dicts() {
        let source = "from table import table\nt = table(['a', 'b'], [[1, 'x'], {'a': 2, 'b': 'y'}])\nx = [r['b'] for r in t]\n";
        assert_eq!(run_with(&[Helper::Table], source, "x"), "['x', 'y']");
    }

    #[test]
    fn test_table_rejects_ragged_rows() {
        let mut interp = Interpreter::new(&ExecutionLimits::default(), &[Helper::Table]);
        let err = interp
            .run("from table import table\ntable(['a'], [[1, 2]])\n")
            .unwrap_err();
        assert!(err.to_string().contains("row 0 has 2 cells"));
    }

    #[test]
    fn test_typing_is_always_available() {
        assert_eq!(
            run_with(&[], "from typing import List\ndef f(x: List[int]) -> int:\n    return len(x)\ny = f([1])\n", "y"),
            "1"
        );
    }
}
