// Integration tests exercising the public `nah::vm::Vm` surface end to end,
// the way a caller embedding the interpreter would: source text in, output
// and `InterpretResult` out.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use nah::vm::{InterpretResult, Vm};

#[derive(Clone)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn run(source: &str) -> (InterpretResult, String) {
    let buffer = Rc::new(RefCell::new(Vec::new()));
    let mut vm = Vm::with_output(Box::new(SharedBuffer(buffer.clone())));
    let result = vm.interpret(source);
    let text = String::from_utf8(buffer.borrow().clone()).unwrap();
    (result, text)
}

#[test]
fn prints_arithmetic_and_strings() {
    let (result, output) = run(r#"print 1 + 2 * 3; print "hello" + " world";"#);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "7\nhello world\n");
}

#[test]
fn nah_is_the_nil_literal() {
    let (result, output) = run("var x; print x;");
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "nah\n");
}

#[test]
fn closures_capture_outer_locals() {
    let source = r#"
        fun makeCounter() {
            var count = 0;
            fun increment() {
                count = count + 1;
                return count;
            }
            return increment;
        }
        var counter = makeCounter();
        print counter();
        print counter();
        print counter();
    "#;
    let (result, output) = run(source);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "1\n2\n3\n");
}

#[test]
fn recursive_function_runs_to_completion() {
    let source = r#"
        fun fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        print fib(10);
    "#;
    let (result, output) = run(source);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "55\n");
}

#[test]
fn undefined_variable_is_a_runtime_error_with_exit_code_semantics() {
    let (result, _) = run("print missingVariable;");
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn adding_number_and_string_reports_the_exact_type_error() {
    let (result, _) = run(r#"print 1 + "a";"#);
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn top_level_return_is_a_compile_error() {
    let (result, _) = run("return 1;");
    assert_eq!(result, InterpretResult::CompileError);
}

#[test]
fn unterminated_string_is_a_compile_error() {
    let (result, _) = run("print \"abc;");
    assert_eq!(result, InterpretResult::CompileError);
}

#[test]
fn more_than_255_parameters_is_a_compile_error() {
    let params: Vec<String> = (0..256).map(|i| format!("a{i}")).collect();
    let source = format!("fun f({}) {{ return 0; }}", params.join(", "));
    let (result, _) = run(&source);
    assert_eq!(result, InterpretResult::CompileError);
}

#[test]
fn chunk_with_more_than_256_constants_still_runs_via_const_long() {
    let mut source = String::new();
    for i in 0..300 {
        source.push_str(&format!("var v{i} = {i};\n"));
    }
    source.push_str("print v299;\n");
    let (result, output) = run(&source);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "299\n");
}

#[test]
fn deep_recursion_overflows_the_call_frame_stack() {
    let source = r#"
        fun recurse(n) {
            return recurse(n + 1);
        }
        print recurse(0);
    "#;
    let (result, _) = run(source);
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn calling_a_non_callable_value_is_a_runtime_error() {
    let (result, _) = run("var x = 1; x();");
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn while_and_for_loops_execute() {
    let source = r#"
        var i = 0;
        var sum = 0;
        while (i < 5) {
            sum = sum + i;
            i = i + 1;
        }
        print sum;

        for (var j = 0; j < 3; j = j + 1) {
            print j;
        }
    "#;
    let (result, output) = run(source);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "10\n0\n1\n2\n");
}

#[test]
fn clock_native_is_not_registered_unless_the_caller_defines_it() {
    let (result, _) = run("print clock();");
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn registering_clock_makes_it_callable() {
    let buffer = Rc::new(RefCell::new(Vec::new()));
    let mut vm = Vm::with_output(Box::new(SharedBuffer(buffer.clone())));
    vm.define_native("clock", nah::builtins::clock);
    let result = vm.interpret("print clock() >= 0;");
    assert_eq!(result, InterpretResult::Ok);
    let text = String::from_utf8(buffer.borrow().clone()).unwrap();
    assert_eq!(text, "true\n");
}

#[test]
fn with_std_natives_registers_clock_the_same_way_the_repl_does() {
    let mut vm = Vm::with_std_natives();
    let result = vm.interpret("print clock() >= 0;");
    assert_eq!(result, InterpretResult::Ok);
}
