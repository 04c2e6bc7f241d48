use once_cell::sync::Lazy;

use super::engine::Draft;
use super::ops::BinOp;
use super::state::ARR_ADDR_PREFIX;
use super::value::Value;
use crate::util::{FastHashMap, fast_hash_map_with_capacity, index_key};

/// `None` means the call cannot be computed locally.
pub type BuiltinFn = fn(&[Value], &mut Draft<'_>) -> Option<Value>;

/// Upper bound on the length of a list produced by `range`.
const MAX_RANGE_LEN: u64 = 1 << 16;

/// Immutable table of builtin functions, shared by every engine.
pub struct Builtins {
    functions: FastHashMap<&'static str, BuiltinFn>,
}

pub static BUILTINS: Lazy<Builtins> = Lazy::new(Builtins::standard);

impl Builtins {
    pub fn standard() -> Self {
        let mut functions: FastHashMap<&'static str, BuiltinFn> = fast_hash_map_with_capacity(16);
        functions.insert("len", Self::len);
        functions.insert("range", Self::range);
        functions.insert("print", Self::print);
        functions.insert("int", Self::int);
        functions.insert("float", Self::float);
        functions.insert("str", Self::str);
        functions.insert("bool", Self::bool);
        functions.insert("abs", Self::abs);
        functions.insert("max", Self::max);
        functions.insert("min", Self::min);
        functions.insert("arrayOf", Self::array_of);
        functions.insert("intArrayOf", Self::array_of);
        functions.insert("Array", Self::array_of);
        Self { functions }
    }

    pub fn get(&self, name: &str) -> Option<BuiltinFn> {
        self.functions.get(name).copied()
    }

    /// Builtins that accept symbolic arguments and decide their own fate.
    pub fn tolerates_symbolic(name: &str) -> bool {
        matches!(name, "print" | "len" | "arrayOf" | "intArrayOf" | "Array")
    }

    fn len(args: &[Value], draft: &mut Draft<'_>) -> Option<Value> {
        let val = args.first()?;
        if let Some(obj) = val.heap_addr().and_then(|addr| draft.state.heap.get(addr)) {
            let len = match obj.fields.get("length") {
                Some(Value::Int(n)) => *n,
                Some(_) => return None,
                None => obj.fields.len() as i64,
            };
            return Some(Value::Int(len));
        }
        match val {
            Value::Str(s) => Some(Value::Int(s.chars().count() as i64)),
            Value::List(items) => Some(Value::Int(items.len() as i64)),
            Value::Map(map) => Some(Value::Int(map.len() as i64)),
            _ => None,
        }
    }

    fn range(args: &[Value], _draft: &mut Draft<'_>) -> Option<Value> {
        let ints: Vec<i64> = args.iter().map(Value::as_int).collect::<Option<_>>()?;
        let (start, stop, step) = match ints.as_slice() {
            [stop] => (0, *stop, 1),
            [start, stop] => (*start, *stop, 1),
            [start, stop, step] if *step != 0 => (*start, *stop, *step),
            _ => return None,
        };
        let span = stop.checked_sub(start)?;
        let count = if span != 0 && (span > 0) == (step > 0) {
            span.unsigned_abs().div_ceil(step.unsigned_abs())
        } else {
            0
        };
        if count > MAX_RANGE_LEN {
            return None;
        }
        let count = count as i64;
        Some(Value::List((0..count).map(|i| Value::Int(start + i * step)).collect()))
    }

    fn print(_args: &[Value], _draft: &mut Draft<'_>) -> Option<Value> {
        Some(Value::Null)
    }

    fn int(args: &[Value], _draft: &mut Draft<'_>) -> Option<Value> {
        match args.first() {
            None => Some(Value::Int(0)),
            Some(Value::Int(i)) => Some(Value::Int(*i)),
            Some(Value::Bool(b)) => Some(Value::Int(*b as i64)),
            Some(Value::Float(x)) if x.is_finite() && x.abs() < i64::MAX as f64 => Some(Value::Int(x.trunc() as i64)),
            Some(Value::Str(s)) => s.trim().parse().ok().map(Value::Int),
            _ => None,
        }
    }

    fn float(args: &[Value], _draft: &mut Draft<'_>) -> Option<Value> {
        match args.first() {
            None => Some(Value::Float(0.0)),
            Some(Value::Int(i)) => Some(Value::Float(*i as f64)),
            Some(Value::Bool(b)) => Some(Value::Float(*b as i64 as f64)),
            Some(Value::Float(x)) => Some(Value::Float(*x)),
            Some(Value::Str(s)) => s.trim().parse().ok().map(Value::Float),
            _ => None,
        }
    }

    fn str(args: &[Value], _draft: &mut Draft<'_>) -> Option<Value> {
        match args.first() {
            None => Some(Value::str("")),
            Some(v) => Some(Value::Str(v.to_string())),
        }
    }

    fn bool(args: &[Value], _draft: &mut Draft<'_>) -> Option<Value> {
        match args.first() {
            None => Some(Value::Bool(false)),
            Some(v) => v.truthy().map(Value::Bool),
        }
    }

    fn abs(args: &[Value], _draft: &mut Draft<'_>) -> Option<Value> {
        match args.first()? {
            Value::Int(i) => i.checked_abs().map(Value::Int),
            Value::Bool(b) => Some(Value::Int(*b as i64)),
            Value::Float(x) => Some(Value::Float(x.abs())),
            _ => None,
        }
    }

    fn max(args: &[Value], _draft: &mut Draft<'_>) -> Option<Value> {
        extreme(args, BinOp::Gt)
    }

    fn min(args: &[Value], _draft: &mut Draft<'_>) -> Option<Value> {
        extreme(args, BinOp::Lt)
    }

    fn array_of(args: &[Value], draft: &mut Draft<'_>) -> Option<Value> {
        let addr = draft.allocate(ARR_ADDR_PREFIX, Some("array".to_string()));
        for (i, val) in args.iter().enumerate() {
            draft.delta.write_heap(&addr, index_key(i as i64), val.clone());
        }
        draft.delta.write_heap(&addr, "length", Value::Int(args.len() as i64));
        Some(Value::Str(addr))
    }
}

/// `max`/`min` over the arguments, or over the items of a single list argument.
fn extreme(args: &[Value], better: BinOp) -> Option<Value> {
    let items = match args {
        [Value::List(items)] => items.as_slice(),
        _ => args,
    };
    let mut best = items.first()?;
    for item in &items[1..] {
        match better.eval(item, best)? {
            Value::Bool(true) => best = item,
            Value::Bool(false) => {}
            _ => return None,
        }
    }
    Some(best.clone())
}
