// ── Value transforms ──
//
// Declarative expressions from the mapping table, parsed once at load
// time into a closed instruction tree. Nothing here executes code; the
// grammar only knows the step kinds below.

use std::fmt;

use thiserror::Error;

/// Placeholder for the raw simulator value in full-expression form.
const PLACEHOLDER: &str = "$";

/// More places than an f64 carries would overflow the rounding factor.
pub const MAX_ROUND_PLACES: u32 = 15;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid transform '{expression}': {reason}")]
pub struct TransformError {
    pub expression: String,
    pub reason: String,
}

/// Comparison used by [`Transform::Conditional`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Ge => value >= threshold,
            Self::Lt => value < threshold,
            Self::Le => value <= threshold,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

/// A parsed value transform.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Transform {
    #[default]
    Identity,
    /// Truncate toward zero.
    CastInt,
    /// `1.0` when equal, else `0.0`.
    Equals(f64),
    BitAnd(i64),
    /// Round to N decimal places.
    Round(u32),
    Scale(f64),
    Divide(f64),
    Conditional {
        cmp: Comparison,
        threshold: f64,
        then: f64,
        otherwise: f64,
    },
    /// Steps applied left to right.
    Chain(Vec<Transform>),
}

impl Transform {
    /// Apply to a raw value. Pure: same input, same output.
    pub fn apply(&self, raw: f64) -> f64 {
        match self {
            Self::Identity => raw,
            Self::CastInt => raw.trunc(),
            Self::Equals(v) => {
                if (raw - v).abs() < f64::EPSILON {
                    1.0
                } else {
                    0.0
                }
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            Self::BitAnd(mask) => ((raw.trunc() as i64) & mask) as f64,
            Self::Round(places) => {
                let places = (*places).min(MAX_ROUND_PLACES);
                let factor = 10f64.powi(i32::try_from(places).unwrap_or(0));
                (raw * factor).round() / factor
            }
            Self::Scale(factor) => raw * factor,
            Self::Divide(divisor) => raw / divisor,
            Self::Conditional {
                cmp,
                threshold,
                then,
                otherwise,
            } => {
                if cmp.holds(raw, *threshold) {
                    *then
                } else {
                    *otherwise
                }
            }
            Self::Chain(steps) => steps.iter().fold(raw, |value, step| step.apply(value)),
        }
    }

    /// Apply an optional transform; `None` passes the raw value through.
    pub fn apply_opt(transform: Option<&Self>, raw: f64) -> f64 {
        transform.map_or(raw, |t| t.apply(raw))
    }

    /// Parse the textual form used in mapping tables.
    ///
    /// Suffix forms (`== 0`, `& 0x04`) apply to the integer-cast raw value;
    /// `* f` and `/ d` scale it. Full expressions use `$` for the raw
    /// value, e.g. `round($ * 100, 1)` or `$ > 0.5 ? 255 : 0`.
    pub fn parse(text: &str) -> Result<Self, TransformError> {
        let steps = parse_steps(text.trim()).map_err(|reason| TransformError {
            expression: text.to_owned(),
            reason,
        })?;
        Ok(match steps.len() {
            0 => Self::Identity,
            1 => steps.into_iter().next().unwrap_or_default(),
            _ => Self::Chain(steps),
        })
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "$"),
            Self::CastInt => write!(f, "int"),
            Self::Equals(v) => write!(f, "== {v}"),
            Self::BitAnd(mask) => write!(f, "& {mask:#x}"),
            Self::Round(n) => write!(f, "round {n}"),
            Self::Scale(factor) => write!(f, "* {factor}"),
            Self::Divide(divisor) => write!(f, "/ {divisor}"),
            Self::Conditional {
                cmp,
                threshold,
                then,
                otherwise,
            } => write!(f, "{} {threshold} ? {then} : {otherwise}", cmp.symbol()),
            Self::Chain(steps) => {
                for (i, step) in steps.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{step}")?;
                }
                Ok(())
            }
        }
    }
}

// ── Parser ───────────────────────────────────────────────────────────

fn parse_steps(s: &str) -> Result<Vec<Transform>, String> {
    let s = s.trim();
    if s.is_empty() || s == PLACEHOLDER {
        return Ok(Vec::new());
    }

    // Ternary binds loosest.
    if let Some(q) = find_top_level(s, "?") {
        let (cond, rest) = (&s[..q], &s[q + 1..]);
        let colon = find_top_level(rest, ":").ok_or("conditional without ':'")?;
        let then = parse_number(&rest[..colon])?;
        let otherwise = parse_number(&rest[colon + 1..])?;
        let (lhs, cmp, threshold) =
            split_comparison(cond)?.ok_or("conditional needs a comparison before '?'")?;
        let mut steps = parse_operand(lhs)?;
        steps.push(Transform::Conditional {
            cmp,
            threshold,
            then,
            otherwise,
        });
        return Ok(steps);
    }

    // Bare comparison yields 1 / 0.
    if let Some((lhs, cmp, threshold)) = split_comparison(s)? {
        let mut steps = parse_operand(lhs)?;
        steps.push(Transform::Conditional {
            cmp,
            threshold,
            then: 1.0,
            otherwise: 0.0,
        });
        return Ok(steps);
    }

    if let Some(pos) = find_equality(s) {
        let value = parse_number(&s[pos + 2..])?;
        let mut steps = parse_suffix_lhs(&s[..pos])?;
        steps.push(Transform::Equals(value));
        return Ok(steps);
    }

    if let Some(pos) = find_top_level(s, "&") {
        let mask = parse_mask(&s[pos + 1..])?;
        let mut steps = parse_suffix_lhs(&s[..pos])?;
        steps.push(Transform::BitAnd(mask));
        return Ok(steps);
    }

    if let Some((pos, op)) = find_last_of(s, &['*', '/']) {
        let operand = parse_number(&s[pos + 1..])?;
        let mut steps = parse_operand(&s[..pos])?;
        if op == '*' {
            steps.push(Transform::Scale(operand));
        } else {
            if operand == 0.0 {
                return Err("division by zero".into());
            }
            steps.push(Transform::Divide(operand));
        }
        return Ok(steps);
    }

    parse_call(s)
}

/// Left-hand side of a suffix operator: empty means "integer-cast raw".
fn parse_suffix_lhs(lhs: &str) -> Result<Vec<Transform>, String> {
    if lhs.trim().is_empty() {
        Ok(vec![Transform::CastInt])
    } else {
        parse_steps(lhs)
    }
}

/// Left-hand side of a scaling operator or comparison: empty means raw.
fn parse_operand(lhs: &str) -> Result<Vec<Transform>, String> {
    parse_steps(lhs)
}

fn parse_call(s: &str) -> Result<Vec<Transform>, String> {
    if let Some(inner) = strip_call(s, "int") {
        let mut steps = parse_steps(inner)?;
        steps.push(Transform::CastInt);
        return Ok(steps);
    }
    if let Some(inner) = strip_call(s, "round") {
        let comma = find_top_level(inner, ",").ok_or("round() needs two arguments")?;
        let places = inner[comma + 1..]
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid decimal places '{}'", inner[comma + 1..].trim()))?;
        if places > MAX_ROUND_PLACES {
            return Err(format!(
                "round() to {places} places, at most {MAX_ROUND_PLACES} are supported"
            ));
        }
        let mut steps = parse_steps(&inner[..comma])?;
        steps.push(Transform::Round(places));
        return Ok(steps);
    }
    if let Some(inner) = strip_call(s, "") {
        return parse_steps(inner);
    }
    Err(format!("unexpected token '{s}'"))
}

/// `name(inner)` where the closing paren ends the string.
fn strip_call<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    let rest = s.strip_prefix(name)?.trim_start();
    let body = rest.strip_prefix('(')?.strip_suffix(')')?;
    // Reject `(a) * (b)`-style strings whose first paren closes early.
    let mut depth = 0i32;
    for c in body.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    (depth == 0).then_some(body)
}

/// Split `lhs CMP threshold` at the rightmost top-level comparison.
fn split_comparison(s: &str) -> Result<Option<(&str, Comparison, f64)>, String> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut found = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b'>' | b'<' if depth == 0 => {
                let wide = bytes.get(i + 1) == Some(&b'=');
                let cmp = match (bytes[i], wide) {
                    (b'>', true) => Comparison::Ge,
                    (b'>', false) => Comparison::Gt,
                    (_, true) => Comparison::Le,
                    (_, false) => Comparison::Lt,
                };
                let width = if wide { 2 } else { 1 };
                found = Some((i, width, cmp));
                i += width;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    match found {
        Some((pos, width, cmp)) => {
            let threshold = parse_number(&s[pos + width..])?;
            Ok(Some((&s[..pos], cmp, threshold)))
        }
        None => Ok(None),
    }
}

/// Rightmost top-level `==`.
fn find_equality(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut found = None;
    for i in 0..bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b'=' if depth == 0 && bytes.get(i + 1) == Some(&b'=') => {
                let prev = i.checked_sub(1).map(|p| bytes[p]);
                if !matches!(prev, Some(b'=' | b'<' | b'>' | b'!')) {
                    found = Some(i);
                }
            }
            _ => {}
        }
    }
    found
}

fn find_top_level(s: &str, needle: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ if depth == 0 && s[i..].starts_with(needle) => return Some(i),
            _ => {}
        }
    }
    None
}

fn find_last_of(s: &str, ops: &[char]) -> Option<(usize, char)> {
    let mut depth = 0i32;
    let mut found = None;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            c if depth == 0 && ops.contains(&c) => found = Some((i, c)),
            _ => {}
        }
    }
    found
}

fn parse_number(s: &str) -> Result<f64, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        #[allow(clippy::cast_precision_loss)]
        return i64::from_str_radix(hex, 16)
            .map(|v| v as f64)
            .map_err(|_| format!("invalid number '{s}'"));
    }
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("invalid number '{s}'"))
}

fn parse_mask(s: &str) -> Result<i64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => s.parse::<i64>(),
    };
    parsed.map_err(|_| format!("invalid bit mask '{s}'"))
}

// ── Tests ────────────────────────────────────────────────────────────
