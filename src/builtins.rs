// File: src/builtins.rs
//
// Native functions registered with the VM. Per SPEC_FULL.md §10.4, the only
// one the CLI wires up is `clock`, matching the reference implementation's
// sole native function; there is no filesystem, network, or process access
// surface here by design.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::value::Value;

/// Seconds since the Unix epoch, as a float. Argument count is ignored the
/// same way the reference implementation's native call sites do — arity
/// checking for natives is left to the caller's convention, not enforced
/// by the VM itself.
pub fn clock(_args: &[Value]) -> Value {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    Value::Number(elapsed.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_returns_a_nonnegative_number() {
        match clock(&[]) {
            Value::Number(n) => assert!(n > 0.0),
            other => panic!("expected a number, got {other:?}"),
        }
    }
}
