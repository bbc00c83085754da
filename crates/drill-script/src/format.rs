//! String formatting: format specs (`f"{x:.2f}"`, `str.format`) and
//! printf-style `%` interpolation.

use crate::error::{ScriptError, ScriptResult};
use crate::value::{float_repr, Value};

#[derive(Debug, Default)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    grouping: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> ScriptResult<Spec> {
    let invalid = || ScriptError::Value(format!("Invalid format specifier '{spec}'"));
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;

    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = Some(chars[0]);
        out.align = Some(chars[1]);
        i = 2;
    } else if chars.first().is_some_and(|&c| is_align(c)) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c) = chars.get(i) {
        if matches!(c, '+' | '-' | ' ') {
            out.sign = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'0') {
        out.zero = true;
        i += 1;
    }
    let start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i > start {
        out.width = chars[start..i]
            .iter()
            .collect::<String>()
            .parse()
            .map_err(|_| invalid())?;
    }
    if chars.get(i) == Some(&',') {
        out.grouping = true;
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i == start {
            return Err(ScriptError::Value("Format specifier missing precision".into()));
        }
        out.precision = Some(
            chars[start..i]
                .iter()
                .collect::<String>()
                .parse()
                .map_err(|_| invalid())?,
        );
    }
    if let Some(&c) = chars.get(i) {
        out.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(invalid());
    }
    Ok(out)
}

/// Apply a format spec such as `>8`, `.3f` or `,d` to a value.
pub fn format_spec(value: &Value, spec: &str) -> ScriptResult<String> {
    if spec.is_empty() {
        return Ok(value.to_str());
    }
    let spec = parse_spec(spec)?;
    let unknown = |kind: char| {
        ScriptError::Value(format!(
            "Unknown format code '{kind}' for object of type '{}'",
            value.type_name()
        ))
    };

    let (body, numeric) = match (spec.kind, value) {
        (None | Some('s'), Value::Str(s)) => {
            let s: String = match spec.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.to_string(),
            };
            (s, false)
        }
        (Some(kind), Value::Str(_)) => return Err(unknown(kind)),
        (Some('d'), v) if v.as_int().is_some() => {
            (int_body(v.as_int().unwrap_or(0), spec.grouping), true)
        }
        (Some('x' | 'X' | 'o' | 'b'), v) if v.as_int().is_some() => {
            let n = v.as_int().unwrap_or(0);
            let digits = match spec.kind {
                Some('x') => format!("{:x}", n.unsigned_abs()),
                Some('X') => format!("{:X}", n.unsigned_abs()),
                Some('o') => format!("{:o}", n.unsigned_abs()),
                _ => format!("{:b}", n.unsigned_abs()),
            };
            (if n < 0 { format!("-{digits}") } else { digits }, true)
        }
        (Some(kind @ ('f' | 'F' | 'e' | 'E' | 'g' | 'G' | '%')), v) if v.as_f64().is_some() => {
            (float_body(v.as_f64().unwrap_or(0.0), kind, spec.precision, spec.grouping), true)
        }
        (None, Value::Float(f)) => match spec.precision {
            Some(p) => (float_body(*f, 'g', Some(p), spec.grouping), true),
            None => (float_repr(*f), true),
        },
        (None, v) if v.as_int().is_some() => {
            (int_body(v.as_int().unwrap_or(0), spec.grouping), true)
        }
        (Some(kind), Value::Int(_) | Value::Float(_) | Value::Bool(_)) => {
            return Err(unknown(kind))
        }
        (None, v) => (v.to_str(), false),
        (Some(kind), _) => return Err(unknown(kind)),
    };

    let body = if numeric {
        match (spec.sign, body.starts_with('-')) {
            (Some('+'), false) => format!("+{body}"),
            (Some(' '), false) => format!(" {body}"),
            _ => body,
        }
    } else {
        body
    };
    Ok(pad(body, &spec, numeric))
}

fn pad(body: String, spec: &Spec, numeric: bool) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body;
    }
    let missing = spec.width - len;
    if spec.zero && numeric && spec.align.is_none() {
        let (sign, digits) = match body.chars().next() {
            Some(c @ ('-' | '+' | ' ')) => (c.to_string(), body[1..].to_string()),
            _ => (String::new(), body),
        };
        return format!("{sign}{}{digits}", "0".repeat(missing));
    }
    let fill = spec.fill.unwrap_or(' ').to_string();
    let align = spec.align.unwrap_or(if numeric { '>' } else { '<' });
    match align {
        '<' => format!("{body}{}", fill.repeat(missing)),
        '^' => {
            let left = missing / 2;
            format!("{}{body}{}", fill.repeat(left), fill.repeat(missing - left))
        }
        _ => format!("{}{body}", fill.repeat(missing)),
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn int_body(n: i64, grouping: bool) -> String {
    let digits = n.unsigned_abs().to_string();
    let digits = if grouping {
        group_thousands(&digits)
    } else {
        digits
    };
    if n < 0 {
        format!("-{digits}")
    } else {
        digits
    }
}

fn float_body(f: f64, kind: char, precision: Option<usize>, grouping: bool) -> String {
    let p = precision.unwrap_or(6);
    let text = match kind {
        'f' | 'F' => format!("{f:.p$}"),
        '%' => format!("{:.p$}%", f * 100.0),
        'e' | 'E' => {
            let formatted = format!("{f:.p$e}");
            let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exponent),
            };
            let out = format!("{mantissa}e{sign}{digits:0>2}");
            if kind == 'E' {
                out.to_uppercase()
            } else {
                out
            }
        }
        _ => general(f, p.max(1)),
    };
    if grouping && matches!(kind, 'f' | 'F') {
        let (sign, rest) = match text.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", text.as_str()),
        };
        let (int_part, frac) = rest.split_once('.').map_or((rest, None), |(a, b)| (a, Some(b)));
        let grouped = group_thousands(int_part);
        return match frac {
            Some(frac) => format!("{sign}{grouped}.{frac}"),
            None => format!("{sign}{grouped}"),
        };
    }
    text
}

/// `%g` formatting: `p` significant digits, trailing zeros dropped.
fn general(f: f64, p: usize) -> String {
    if f == 0.0 || !f.is_finite() {
        return if f.is_finite() { "0".into() } else { float_repr(f) };
    }
    let exponent = f.abs().log10().floor() as i32;
    if exponent < -4 || exponent >= p as i32 {
        let formatted = format!("{f:.prec$e}", prec = p - 1);
        let (mantissa, exp) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let mantissa = trim_zeros(mantissa);
        let (sign, digits) = match exp.strip_prefix('-') {
            Some(d) => ('-', d),
            None => ('+', exp),
        };
        format!("{mantissa}e{sign}{digits:0>2}")
    } else {
        let decimals = (p as i32 - 1 - exponent).max(0) as usize;
        trim_zeros(&format!("{f:.decimals$}")).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// `template % args`.
pub fn percent_format(template: &str, args: &Value) -> ScriptResult<String> {
    let values: Vec<Value> = match args {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    let mut values = values.into_iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = String::new();
        let kind = loop {
            match chars.next() {
                Some(c) if c.is_ascii_alphabetic() || c == '%' => break c,
                Some(c) => spec.push(c),
                None => {
                    return Err(ScriptError::Value("incomplete format".into()));
                }
            }
        };
        if kind == '%' {
            out.push('%');
            continue;
        }
        let value = values.next().ok_or_else(|| {
            ScriptError::Type("not enough arguments for format string".into())
        })?;
        let rendered = match kind {
            's' => format_spec(&Value::str(value.to_str()), &spec)?,
            'r' => format_spec(&Value::str(value.repr()), &spec)?,
            'i' | 'u' => format_spec(&value, &format!("{spec}d"))?,
            other => format_spec(&value, &format!("{spec}{other}"))?,
        };
        out.push_str(&rendered);
    }
    if values.next().is_some() {
        return Err(ScriptError::Type(
            "not all arguments converted during string formatting".into(),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_precision_and_grouping() {
        assert_eq!(format_spec(&Value::Float(3.14159), ".2f").expect("fmt"), "3.14");
        assert_eq!(format_spec(&Value::Int(1234567), ",").expect("fmt"), "1,234,567");
        assert_eq!(format_spec(&Value::Float(0.25), ".0%").expect("fmt"), "25%");
    }

    #[test]
    fn test_alignment_and_fill() {
        assert_eq!(format_spec(&Value::str("ab"), ">4").expect("fmt"), "  ab");
        assert_eq!(format_spec(&Value::str("ab"), "*^6").expect("fmt"), "**ab**");
        assert_eq!(format_spec(&Value::Int(-7), "04").expect("fmt"), "-007");
    }

    #[test]
    fn test_general_format_drops_trailing_zeros() {
        assert_eq!(format_spec(&Value::Float(2.5), "g").expect("fmt"), "2.5");
        assert_eq!(format_spec(&Value::Float(1e-7), "g").expect("fmt"), "1e-07");
    }

    #[test]
    fn test_percent_interpolation() {
        let args = Value::tuple(vec![Value::str("x"), Value::Float(1.5)]);
        assert_eq!(percent_format("%s=%.1f", &args).expect("fmt"), "x=1.5");
        assert!(percent_format("%s %s", &Value::Int(1)).is_err());
    }

    #[test]
    fn test_string_rejects_numeric_code() {
        let err = format_spec(&Value::str("a"), "d").unwrap_err();
        assert!(err.to_string().contains("Unknown format code 'd'"));
    }
}
