use core::cmp::Ordering;
use std::fmt::{self, Display};

use super::value::Value;

/// Binary operators the local engine can evaluate on concrete operands.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    In,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "//" => BinOp::FloorDiv,
            "%" => BinOp::Mod,
            "**" => BinOp::Pow,
            "==" | "===" => BinOp::Eq,
            "!=" | "!==" => BinOp::Ne,
            "<" => BinOp::Lt,
            ">" => BinOp::Gt,
            "<=" => BinOp::Le,
            ">=" => BinOp::Ge,
            "and" | "&&" => BinOp::And,
            "or" | "||" => BinOp::Or,
            "in" => BinOp::In,
            "&" => BinOp::BitAnd,
            "|" => BinOp::BitOr,
            "^" => BinOp::BitXor,
            "<<" => BinOp::Shl,
            ">>" => BinOp::Shr,
            _ => return None,
        })
    }

    /// `None` means uncomputable: zero divisor, overflow, or unsupported operand types.
    pub fn eval(&self, l: &Value, r: &Value) -> Option<Value> {
        match self {
            BinOp::Add => add(l, r),
            BinOp::Sub => arith(l, r, i64::checked_sub, |a, b| a - b),
            BinOp::Mul => mul(l, r),
            BinOp::Div => {
                let (a, b) = (num(l)?.as_f64(), num(r)?.as_f64());
                (b != 0.0).then(|| Value::Float(a / b))
            }
            BinOp::FloorDiv => match (num(l)?, num(r)?) {
                (Num::Int(_), Num::Int(0)) => None,
                (Num::Int(a), Num::Int(b)) => {
                    let q = a.checked_div(b)?;
                    Some(Value::Int(if (a % b != 0) && ((a < 0) != (b < 0)) { q - 1 } else { q }))
                }
                (a, b) => {
                    let b = b.as_f64();
                    (b != 0.0).then(|| Value::Float((a.as_f64() / b).floor()))
                }
            },
            BinOp::Mod => match (num(l)?, num(r)?) {
                (Num::Int(_), Num::Int(0)) => None,
                (Num::Int(a), Num::Int(b)) => {
                    let rem = a.checked_rem(b)?;
                    Some(Value::Int(if rem != 0 && ((rem < 0) != (b < 0)) { rem + b } else { rem }))
                }
                (a, b) => {
                    let (a, b) = (a.as_f64(), b.as_f64());
                    (b != 0.0).then(|| Value::Float(a - b * (a / b).floor()))
                }
            },
            BinOp::Pow => match (num(l)?, num(r)?) {
                (Num::Int(a), Num::Int(b)) if b >= 0 => a.checked_pow(u32::try_from(b).ok()?).map(Value::Int),
                (a, b) => {
                    let out = a.as_f64().powf(b.as_f64());
                    out.is_finite().then_some(Value::Float(out))
                }
            },
            BinOp::Eq => Some(Value::Bool(loose_eq(l, r))),
            BinOp::Ne => Some(Value::Bool(!loose_eq(l, r))),
            BinOp::Lt => compare(l, r).map(|o| Value::Bool(o == Some(Ordering::Less))),
            BinOp::Gt => compare(l, r).map(|o| Value::Bool(o == Some(Ordering::Greater))),
            BinOp::Le => compare(l, r).map(|o| Value::Bool(matches!(o, Some(Ordering::Less | Ordering::Equal)))),
            BinOp::Ge => compare(l, r).map(|o| Value::Bool(matches!(o, Some(Ordering::Greater | Ordering::Equal)))),
            BinOp::And => Some(if l.truthy()? { r.clone() } else { l.clone() }),
            BinOp::Or => Some(if l.truthy()? { l.clone() } else { r.clone() }),
            BinOp::In => contains(r, l).map(Value::Bool),
            BinOp::BitAnd => bitwise(l, r, |a, b| a & b),
            BinOp::BitOr => bitwise(l, r, |a, b| a | b),
            BinOp::BitXor => bitwise(l, r, |a, b| a ^ b),
            BinOp::Shl => shift(l, r, |a, s| a.checked_shl(s).filter(|v| v >> s == a)),
            BinOp::Shr => shift(l, r, |a, s| Some(a >> s)),
        }
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::In => "in",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "-" => UnaryOp::Neg,
            "+" => UnaryOp::Pos,
            "not" | "!" => UnaryOp::Not,
            "~" => UnaryOp::BitNot,
            _ => return None,
        })
    }

    pub fn eval(&self, val: &Value) -> Option<Value> {
        match self {
            UnaryOp::Neg => match num(val)? {
                Num::Int(i) => i.checked_neg().map(Value::Int),
                Num::Float(x) => Some(Value::Float(-x)),
            },
            UnaryOp::Pos => match num(val)? {
                Num::Int(i) => Some(Value::Int(i)),
                Num::Float(x) => Some(Value::Float(x)),
            },
            UnaryOp::Not => val.truthy().map(|b| Value::Bool(!b)),
            UnaryOp::BitNot => val.as_int().map(|i| Value::Int(!i)),
        }
    }
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Not => "not",
            UnaryOp::BitNot => "~",
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(x) => x,
        }
    }
}

fn num(v: &Value) -> Option<Num> {
    match v {
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Bool(b) => Some(Num::Int(*b as i64)),
        Value::Float(x) => Some(Num::Float(*x)),
        _ => None,
    }
}

fn arith(l: &Value, r: &Value, int: fn(i64, i64) -> Option<i64>, float: fn(f64, f64) -> f64) -> Option<Value> {
    match (num(l)?, num(r)?) {
        (Num::Int(a), Num::Int(b)) => int(a, b).map(Value::Int),
        (a, b) => Some(Value::Float(float(a.as_f64(), b.as_f64()))),
    }
}

fn add(l: &Value, r: &Value) -> Option<Value> {
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => Some(Value::Str(format!("{}{}", a, b))),
        (Value::List(a), Value::List(b)) => Some(Value::List(a.iter().chain(b).cloned().collect())),
        _ => arith(l, r, i64::checked_add, |a, b| a + b),
    }
}

/// Upper bound on sequence repetition results.
const MAX_REPEAT_LEN: usize = 1 << 20;

fn mul(l: &Value, r: &Value) -> Option<Value> {
    let repeat_count = |n: i64, unit: usize| -> Option<usize> {
        let n = usize::try_from(n.max(0)).ok()?;
        (n.saturating_mul(unit) <= MAX_REPEAT_LEN).then_some(n)
    };
    match (l, r) {
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
            Some(Value::Str(s.repeat(repeat_count(*n, s.len())?)))
        }
        (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
            let times = repeat_count(*n, items.len())?;
            Some(Value::List(items.iter().cloned().cycle().take(items.len() * times).collect()))
        }
        _ => arith(l, r, i64::checked_mul, |a, b| a * b),
    }
}

/// Equality across numeric types (`1 == 1.0`, `True == 1`); symbolic never equals concrete.
pub fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Symbolic(a), Value::Symbolic(b)) => a.name == b.name,
        (Value::Symbolic(_), _) | (_, Value::Symbolic(_)) => false,
        (Value::List(a), Value::List(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y)),
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| loose_eq(v, w)))
        }
        _ => match (num(l), num(r)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
            (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
            _ => l == r,
        },
    }
}

/// Outer `None`: not comparable. Inner `None`: comparable but unordered (NaN).
fn compare(l: &Value, r: &Value) -> Option<Option<Ordering>> {
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => Some(Some(a.cmp(b))),
        _ => match (num(l)?, num(r)?) {
            (Num::Int(a), Num::Int(b)) => Some(Some(a.cmp(&b))),
            (a, b) => Some(a.as_f64().partial_cmp(&b.as_f64())),
        },
    }
}

fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match haystack {
        Value::Str(s) => needle.as_str().map(|n| s.contains(n)),
        Value::List(items) => Some(items.iter().any(|item| loose_eq(item, needle))),
        Value::Map(map) => needle.field_key().map(|k| map.contains_key(&k)),
        _ => None,
    }
}

fn bitwise(l: &Value, r: &Value, f: fn(i64, i64) -> i64) -> Option<Value> {
    match (l, r) {
        (Value::Bool(a), Value::Bool(b)) => Some(Value::Bool(f(*a as i64, *b as i64) != 0)),
        _ => Some(Value::Int(f(l.as_int()?, r.as_int()?))),
    }
}

fn shift(l: &Value, r: &Value, f: fn(i64, u32) -> Option<i64>) -> Option<Value> {
    let amount = u32::try_from(r.as_int()?).ok().filter(|s| *s < 64)?;
    f(l.as_int()?, amount).map(Value::Int)
}
