// File: src/value.rs
//
// The tagged-union Value type and the heap object variants it can point at.
// Values are small and Copy; heap data (strings, functions, closures,
// upvalues, natives) lives in the arena owned by `memory::Heap` and is
// referenced here by a small integer handle.

use std::fmt;

use crate::bytecode::Chunk;

/// A handle into `Heap`'s object arena. Two handles compare equal iff they
/// name the same slot, which is exactly what the interning invariant needs:
/// byte-equal strings are always the same `ObjRef`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(pub u32);

impl ObjRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A native function exposed to scripts. `argc` is `args.len()`.
pub type NativeFn = fn(args: &[Value]) -> Value;

#[derive(Debug, Clone)]
pub struct ObjString {
    pub hash: u32,
    pub chars: Box<str>,
}

impl ObjString {
    pub fn as_str(&self) -> &str {
        &self.chars
    }
}

#[derive(Debug, Clone)]
pub struct ObjFunction {
    pub arity: u8,
    pub upvalue_count: u8,
    pub chunk: Chunk,
    pub name: Option<ObjRef>,
}

impl ObjFunction {
    pub fn new() -> Self {
        ObjFunction { arity: 0, upvalue_count: 0, chunk: Chunk::new(), name: None }
    }
}

#[derive(Debug, Clone)]
pub struct ObjNative {
    pub name: ObjRef,
    pub function: NativeFn,
}

#[derive(Debug, Clone)]
pub struct ObjClosure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

/// See §3 of SPEC_FULL.md: an open upvalue names a stack slot by index; a
/// closed one owns its value directly. There is no raw pointer anywhere.
#[derive(Debug, Clone)]
pub enum UpvalueState {
    Open(usize),
    Closed(Value),
}

#[derive(Debug, Clone)]
pub struct ObjUpvalue {
    pub state: UpvalueState,
}

/// The heap object variants. Lives behind an `ObjRef` in `Heap`.
#[derive(Debug, Clone)]
pub enum Obj {
    String(ObjString),
    Function(ObjFunction),
    Native(ObjNative),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
}

impl Obj {
    pub fn type_name(&self) -> &'static str {
        match self {
            Obj::String(_) => "string",
            Obj::Function(_) => "function",
            Obj::Native(_) => "native function",
            Obj::Closure(_) => "function",
            Obj::Upvalue(_) => "upvalue",
        }
    }

    pub fn as_string(&self) -> Option<&ObjString> {
        match self {
            Obj::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&ObjFunction> {
        match self {
            Obj::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut ObjFunction> {
        match self {
            Obj::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<&ObjClosure> {
        match self {
            Obj::Closure(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_native(&self) -> Option<&ObjNative> {
        match self {
            Obj::Native(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_upvalue(&self) -> Option<&ObjUpvalue> {
        match self {
            Obj::Upvalue(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_upvalue_mut(&mut self) -> Option<&mut ObjUpvalue> {
        match self {
            Obj::Upvalue(u) => Some(u),
            _ => None,
        }
    }
}

/// The dynamically-typed value every stack slot, constant, local, global
/// and upvalue holds. `Empty` is never observable from script code: it is
/// the hash-table "never used" marker (see `table.rs`).
#[derive(Debug, Clone, Copy)]
pub enum Value {
    Bool(bool),
    Nil,
    Number(f64),
    Object(ObjRef),
    Empty,
}

impl Value {
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjRef> {
        match self {
            Value::Object(r) => Some(*r),
            _ => None,
        }
    }
}

/// Object identity after interning makes this reference equality for
/// strings, and structural equality for the other two variants that carry
/// data. See the Equality clause in SPEC_FULL.md §4.4.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Empty, Value::Empty) => true,
            _ => false,
        }
    }
}

/// Formats a value the way the VM's `print` statement would, given access
/// to the heap to resolve object contents. Plain `Display` can't do this
/// (it has no heap), so formatting lives on `Heap` instead; this stub only
/// covers the variants that need no heap lookup, used by debug output.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Nil => write!(f, "nah"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Object(r) => write!(f, "<object {}>", r.0),
            Value::Empty => write!(f, "<empty>"),
        }
    }
}

/// `%g`-style formatting, matching `printf("%g", ...)` in
/// `original_source/src/value.c`: 6 significant digits, trailing zeros
/// trimmed, switching to exponential notation once the decimal exponent
/// falls outside `[-4, precision)`.
pub fn format_number(n: f64) -> String {
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if n.is_nan() {
        return "nan".to_string();
    }
    format_g(n, 6)
}

fn format_g(n: f64, precision: usize) -> String {
    let sci = format!("{:.*e}", precision - 1, n);
    let (mantissa, exponent) = sci.split_once('e').expect("LowerExp always contains 'e'");
    let exponent: i32 = exponent.parse().expect("LowerExp exponent is a plain integer");

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { "-" } else { "+" };
        format!("{}e{sign}{:02}", trim_trailing_zeros(mantissa), exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_trailing_zeros(&format!("{n:.decimals$}"))
    }
}

/// Drops trailing fractional zeros (and a bare trailing `.`), the way `%g`
/// does in the absence of the `#` flag. No-op on strings with no `.`.
fn trim_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_print_without_a_decimal_point() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(123456.0), "123456");
    }

    #[test]
    fn fractions_round_to_six_significant_digits() {
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
    }

    #[test]
    fn large_magnitudes_switch_to_exponential_notation() {
        assert_eq!(format_number(1e20), "1e+20");
        assert_eq!(format_number(1234567.0), "1.23457e+06");
    }

    #[test]
    fn small_magnitudes_switch_to_exponential_notation() {
        assert_eq!(format_number(0.0000001234), "1.234e-07");
    }

    #[test]
    fn infinities_and_nan_print_as_words() {
        assert_eq!(format_number(f64::INFINITY), "inf");
        assert_eq!(format_number(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_number(f64::NAN), "nan");
    }
}
