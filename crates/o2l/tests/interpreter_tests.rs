use std::{cell::RefCell, rc::Rc};

use o2l::{CollectPrint, ErrorKind, Runner, Session, Value};
use pretty_assertions::assert_eq;

fn eval(source: &str) -> Value {
    Session::new().eval(source).unwrap()
}

fn eval_err(source: &str) -> o2l::RunError {
    Session::new().eval(source).unwrap_err()
}

fn eval_text(source: &str) -> String {
    let Value::Text(text) = eval(source) else {
        panic!("expected Text from {source:?}");
    };
    text.to_string()
}

fn eval_int(source: &str) -> i64 {
    let Value::Int(value) = eval(source) else {
        panic!("expected Int from {source:?}");
    };
    value
}

// --- scenario tests ---

#[test]
fn text_upper() {
    assert_eq!(eval_text(r#""Hello".upper()"#), "HELLO");
}

#[test]
fn strip_then_length() {
    assert_eq!(eval_int(r#""  abc  ".strip().length()"#), 3);
}

#[test]
fn list_index_of_present_and_absent() {
    assert_eq!(eval_int("[10, 20, 30].indexOf(20)"), 1);
    assert_eq!(eval_int("[10, 20, 30].indexOf(99)"), -1);
}

#[test]
fn map_keys_size() {
    assert_eq!(eval_int(r#"{"a": 1, "b": 2}.keys().size()"#), 2);
}

#[test]
fn repeat_iterator_collects_counters() {
    let source = r"
        it: RepeatIterator = utils.repeat(3)
        collected: List<Int> = []
        while (it.hasNext()) {
            collected.add(it.next())
        }
        collected
    ";
    let Value::List(list) = eval(source) else { panic!("expected list") };
    let rendered: Vec<i64> = list.values().iter().map(|v| v.as_int().unwrap()).collect();
    assert_eq!(rendered, [0, 1, 2]);
}

#[test]
fn print_formats_directives() {
    let collect = Rc::new(RefCell::new(CollectPrint::new()));
    let mut session = Session::with_writer(collect.clone());
    session.eval(r#"io.print("%s=%d", "x", 5)"#).unwrap();
    session.eval(r#"io.print("%.2f", 3.14159)"#).unwrap();
    assert_eq!(collect.borrow().output(), "x=5\n3.14\n");
}

#[test]
fn print_long_and_object_directives() {
    let collect = Rc::new(RefCell::new(CollectPrint::new()));
    let mut session = Session::with_writer(collect.clone());
    session.eval("Enum Color { RED, GREEN }").unwrap();
    session.eval(r#"io.print("%l", 42L)"#).unwrap();
    session.eval(r#"io.print("%l", 7)"#).unwrap();
    session.eval(r#"io.print("%o", Color)"#).unwrap();
    session.eval("io.print()").unwrap();
    assert_eq!(
        collect.borrow().output(),
        "42\n7\nenum Color { RED = 0, GREEN = 1 }\n\n"
    );
}

#[test]
fn long_arithmetic_stays_long() {
    assert!(matches!(eval("10L * 10L"), Value::Long(100)));
    assert_eq!(
        eval_text("(123456789012345678901L + 1L).toString()"),
        "123456789012345678902"
    );
}

#[test]
fn try_catch_finally_yields_code_and_runs_finally_once() {
    let source = r#"
        finallyRuns: List<Int> = []
        code: Text = ""
        try {
            throw new Error("boom", "E1")
        } catch (e) {
            code = e.getCode()
        } finally {
            finallyRuns.add(1)
        }
        code + "/" + finallyRuns.size().toString()
    "#;
    assert_eq!(eval_text(source), "E1/1");
}

#[test]
fn split_size() {
    assert_eq!(eval_int(r#""1,2,3".split(",").size()"#), 3);
}

// --- universal properties ---

#[test]
fn primitive_conversion_round_trips() {
    assert_eq!(eval_int("42.toLong().toInt()"), 42);
    assert!(matches!(eval("true.toInt().toBool()"), Value::Bool(true)));
    assert_eq!(eval_text("7.toString()"), "7");
    assert_eq!(eval_int(r#""42".toInt()"#), 42);
    assert!(matches!(eval("3.5.toFloat().toDouble()"), Value::Double(_)));
}

#[test]
fn iterator_exhaustion_is_an_evaluation_error() {
    let source = r"
        xs: List<Int> = [1, 2]
        it: ListIterator = xs.iterator()
        it.next()
        it.next()
        it.next()
    ";
    let err = eval_err(source);
    assert_eq!(err.kind(), ErrorKind::Evaluation);
    assert!(err.message().contains("hasNext() is false"), "{}", err.message());
}

#[test]
fn iterator_reset_returns_to_first_element() {
    let source = r"
        xs: List<Int> = [5, 6]
        it: ListIterator = xs.iterator()
        it.next()
        it.reset()
        it.next()
    ";
    assert_eq!(eval_int(source), 5);
}

#[test]
fn scope_depth_is_balanced_after_normal_and_failing_evaluation() {
    let mut session = Session::new();
    let before = session.scope_depth();

    session
        .eval("x: Int = 1\nif (x == 1) { y: Int = 2\nwhile (y > 0) { y = y - 1 } }")
        .unwrap();
    assert_eq!(session.scope_depth(), before);
    assert_eq!(session.frame_depth(), 0);

    session.eval("boom: Int = [1].get(9)").unwrap_err();
    assert_eq!(session.scope_depth(), before);
    assert_eq!(session.frame_depth(), 0);

    session
        .eval("try { throw new Error(\"x\") } finally { z: Int = 0 }")
        .unwrap_err();
    assert_eq!(session.scope_depth(), before);
    assert_eq!(session.frame_depth(), 0);
}

#[test]
fn protected_methods_reject_external_calls_but_allow_internal() {
    let mut session = Session::new();
    session
        .eval(
            r"
Object Vault {
    method secret(): Int {
        return 42
    }

    @external method open(): Int {
        return this.secret()
    }
}
",
        )
        .unwrap();
    session.eval("v: Vault = new Vault()").unwrap();

    let err = session.eval("v.secret()").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessViolation);
    assert!(err.message().contains("protected method 'secret'"), "{}", err.message());

    let Value::Int(opened) = session.eval("v.open()").unwrap() else {
        panic!("expected Int");
    };
    assert_eq!(opened, 42);
}

#[test]
fn finally_runs_on_return_and_overrides() {
    let mut session = Session::new();
    session
        .eval(
            r"
Object Probe {
    property hits: Int

    constructor() {
        this.hits = 0
    }

    @external method hit(): Int {
        this.hits = this.hits + 1
        return this.hits
    }

    @external method count(): Int {
        return this.hits
    }

    @external method earlyReturn(): Int {
        try {
            return 1
        } finally {
            this.hit()
        }
    }

    @external method overridden(): Int {
        try {
            return 1
        } finally {
            return 2
        }
    }
}
",
        )
        .unwrap();
    session.eval("p: Probe = new Probe()").unwrap();

    assert_eq!(session.eval("p.earlyReturn()").unwrap().as_int(), Some(1));
    assert_eq!(session.eval("p.count()").unwrap().as_int(), Some(1));
    assert_eq!(session.eval("p.overridden()").unwrap().as_int(), Some(2));
}

#[test]
fn finally_runs_when_no_catch_exists_and_rethrows() {
    let mut session = Session::new();
    session.eval("ran: List<Int> = []").unwrap();
    let err = session
        .eval("try { throw new Error(\"boom\", \"E9\") } finally { ran.add(1) }")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserException);
    assert_eq!(session.eval("ran.size()").unwrap().as_int(), Some(1));
}

#[test]
fn system_errors_are_wrapped_with_system_error_code() {
    let source = r#"
        code: Text = ""
        try {
            x: Int = 1 / 0
        } catch (e) {
            code = e.getCode()
        }
        code
    "#;
    assert_eq!(eval_text(source), "SYSTEM_ERROR");
}

#[test]
fn caught_system_error_preserves_message() {
    let source = r#"
        message: Text = ""
        try {
            x: Int = 1 / 0
        } catch (e) {
            message = e.getMessage()
        }
        message
    "#;
    assert_eq!(eval_text(source), "Division by zero");
}

#[test]
fn unknown_method_messages_are_stable_per_receiver() {
    let cases = [
        (r#""x".frob()"#, "Unknown method 'frob' on Text type"),
        ("[1].frob()", "Unknown method 'frob' on List type"),
        (r#"{"a": 1}.frob()"#, "Unknown method 'frob' on Map type"),
        ("(1, 2).frob()", "Unknown method 'frob' on Set type"),
        ("42.frob()", "Unknown method 'frob' on Int type"),
        ("42L.frob()", "Unknown method 'frob' on Long type"),
        ("true.frob()", "Unknown method 'frob' on Bool type"),
        ("3.0.frob()", "Unknown method 'frob' on Double type"),
        ("3.0f.frob()", "Unknown method 'frob' on Float type"),
        ("[1].iterator().frob()", "Unknown method 'frob' on ListIterator type"),
        ("utils.repeat(1).frob()", "Unknown method 'frob' on RepeatIterator type"),
    ];
    for (source, expected) in cases {
        let err = eval_err(source);
        assert_eq!(err.message(), expected);
    }
}

#[test]
fn list_element_type_is_enforced_at_declaration() {
    let err = eval_err(r#"xs: List<Int> = ["a"]"#);
    assert_eq!(err.kind(), ErrorKind::Evaluation);
    assert_eq!(err.message(), "Type mismatch in xs: expected Int but found Text");

    assert_eq!(eval_int("xs: List<Int> = [1, 2, 3]\nxs.size()"), 3);

    let err = eval_err("xs: List<Int> = 5");
    assert!(err.message().contains("assigned non-List value"), "{}", err.message());
}

#[test]
fn scalar_declarations_check_types_with_implicit_widening() {
    assert!(matches!(eval("x: Long = 1"), Value::Int(1)));
    assert!(matches!(eval("x: Double = 1.5f"), Value::Float(_)));
    let err = eval_err(r#"x: Int = "no""#);
    assert_eq!(err.message(), "Type mismatch: x declared as Int but assigned Text");
}

// --- language semantics ---

#[test]
fn constants_cannot_be_reassigned() {
    let err = eval_err("const PI: Double = 3.14\nPI = 3.0");
    assert_eq!(err.kind(), ErrorKind::Evaluation);
    assert_eq!(err.message(), "Cannot reassign constant 'PI'");
}

#[test]
fn undefined_variables_are_unresolved_references() {
    let err = eval_err("ghost");
    assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
    assert_eq!(err.message(), "Undefined variable 'ghost'");

    let err = eval_err("ghost = 1");
    assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
}

#[test]
fn enums_expose_member_values() {
    let mut session = Session::new();
    session.eval("Enum Color { RED, GREEN = 5, BLUE }").unwrap();
    assert_eq!(session.eval("Color.RED").unwrap().as_int(), Some(0));
    assert_eq!(session.eval("Color.GREEN").unwrap().as_int(), Some(5));
    assert_eq!(session.eval("Color.BLUE").unwrap().as_int(), Some(6));
    let err = session.eval("Color.MAUVE").unwrap_err();
    assert_eq!(err.message(), "Enum 'Color' has no member 'MAUVE'");
}

#[test]
fn records_construct_access_and_compare_structurally() {
    let mut session = Session::new();
    session.eval("Record Point { x: Int, y: Int }").unwrap();
    assert_eq!(
        session.eval("p: Point = Point(x: 1, y: 2)\np.x").unwrap().as_int(),
        Some(1)
    );
    assert!(matches!(
        session.eval("Point(x: 1, y: 2) == Point(x: 1, y: 2)").unwrap(),
        Value::Bool(true)
    ));
    assert!(matches!(
        session.eval("Point(x: 1, y: 2) == Point(x: 1, y: 3)").unwrap(),
        Value::Bool(false)
    ));
    let err = session.eval("Point(x: 1)").unwrap_err();
    assert!(err.message().contains("missing field 'y'"), "{}", err.message());
}

#[test]
fn maps_and_sets_compare_by_reference() {
    let mut session = Session::new();
    session
        .eval("m1: Map<Text, Int> = {\"a\": 1}\nm2: Map<Text, Int> = {\"a\": 1}")
        .unwrap();
    assert!(matches!(session.eval("m1 == m2").unwrap(), Value::Bool(false)));
    assert!(matches!(session.eval("m1 == m1").unwrap(), Value::Bool(true)));
}

#[test]
fn set_elements_follow_string_form_order() {
    let source = r#"
        s: Set<Int> = (10, 2, 1)
        out: Text = ""
        it: SetIterator = s.iterator()
        while (it.hasNext()) {
            out = out + it.next().toString() + ","
        }
        out
    "#;
    assert_eq!(eval_text(source), "1,10,2,");
}

#[test]
fn objects_with_constructor_properties_and_this() {
    let mut session = Session::new();
    session
        .eval(
            r#"
Object Greeter {
    property message: Text

    constructor(greeting: Text) {
        this.message = greeting
    }

    @external method greet(name: Text): Text {
        return this.message + ", " + name + "!"
    }
}
"#,
        )
        .unwrap();
    assert_eq!(
        session
            .eval("g: Greeter = new Greeter(\"Hello\")\ng.greet(\"World\")")
            .unwrap()
            .as_text()
            .map(str::to_owned),
        Some("Hello, World!".to_owned())
    );
}

#[test]
fn external_property_access_is_a_violation() {
    let mut session = Session::new();
    session
        .eval(
            r"
Object Box {
    property value: Int

    constructor() {
        this.value = 1
    }
}
",
        )
        .unwrap();
    session.eval("b: Box = new Box()").unwrap();

    let err = session.eval("b.value").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessViolation);

    let err = session.eval("b.value = 9").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessViolation);
}

#[test]
fn two_instances_do_not_share_properties() {
    let mut session = Session::new();
    session
        .eval(
            r"
Object Counter {
    property n: Int

    constructor() {
        this.n = 0
    }

    @external method bump(): Int {
        this.n = this.n + 1
        return this.n
    }
}
",
        )
        .unwrap();
    session.eval("a: Counter = new Counter()\nb: Counter = new Counter()").unwrap();
    session.eval("a.bump()\na.bump()").unwrap();
    assert_eq!(session.eval("b.bump()").unwrap().as_int(), Some(1));
    assert_eq!(session.eval("a.bump()").unwrap().as_int(), Some(3));
}

#[test]
fn arithmetic_and_comparisons() {
    assert_eq!(eval_int("2 + 3 * 4"), 14);
    assert_eq!(eval_int("(2 + 3) * 4"), 20);
    assert_eq!(eval_int("7 % 3"), 1);
    assert!(matches!(eval("1 < 2 && 2 < 3"), Value::Bool(true)));
    assert!(matches!(eval("!(1 == 2)"), Value::Bool(true)));
    assert_eq!(eval_text(r#""foo" + "bar""#), "foobar");

    let err = eval_err("1 + 1L");
    assert!(err.message().contains("Cannot apply operator"), "{}", err.message());

    let err = eval_err("1 / 0");
    assert_eq!(err.message(), "Division by zero");
}

#[test]
fn result_object_builds_envelopes() {
    assert!(matches!(eval("Result.success(5).isSuccess()"), Value::Bool(true)));
    assert_eq!(eval_int("Result.success(5).getResult()"), 5);
    let source = r#"
        r: Result<Int, Error> = Result.error(new Error("nope", "E2"))
        r.getError().getCode()
    "#;
    assert_eq!(eval_text(source), "E2");
}

// --- whole-program runs ---

#[test]
fn runner_executes_main_and_reports_exit_value() {
    let source = r#"
import system.io

Object Main {
    method main(): Int {
        io.print("Hello, %s!", "O2L")
        return 7
    }
}
"#;
    let runner = Runner::new(source, "main.obq").unwrap();
    let (result, output) = runner.run_collect(vec![]);
    assert_eq!(result.unwrap().as_int(), Some(7));
    assert_eq!(output, "Hello, O2L!\n");
}

#[test]
fn program_args_are_visible_through_os() {
    let source = r"
Object Main {
    method main(): Int {
        return os.argc()
    }
}
";
    let runner = Runner::new(source, "main.obq").unwrap();
    let result = runner.run(vec!["a".into(), "b".into()]).unwrap();
    assert_eq!(result.as_int(), Some(2));
}

#[test]
fn uncaught_exceptions_render_a_trace() {
    let source = r#"
Object Main {
    method explode(): Int {
        throw new Error("kaboom", "E7")
    }

    method main(): Int {
        return this.explode()
    }
}
"#;
    let runner = Runner::new(source, "main.obq").unwrap();
    let err = runner.run(vec![]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserException);

    let rendered = err.render_uncaught();
    let mut lines = rendered.lines();
    assert_eq!(lines.next(), Some("Uncaught exception:"));
    assert_eq!(lines.next(), Some("E7: kaboom"));
    let frames: Vec<&str> = lines.collect();
    assert!(frames[0].contains("Main.explode"), "{frames:?}");
    assert!(frames[1].contains("Main.main"), "{frames:?}");
}

#[test]
fn missing_main_is_reported() {
    let runner = Runner::new("Object Helper { }", "x.obq").unwrap();
    let err = runner.run(vec![]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
    assert!(err.message().contains("Main"));
}

#[test]
fn deep_recursion_fails_instead_of_overflowing() {
    // The interpreter's depth cap fires long before the host stack would,
    // but the tree-walker still needs headroom for 1024 nested frames.
    let handle = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(|| {
            let source = r"
Object Main {
    method spin(n: Int): Int {
        return this.spin(n + 1)
    }

    method main(): Int {
        return this.spin(0)
    }
}
";
            let runner = Runner::new(source, "main.obq").unwrap();
            runner.run(vec![]).unwrap_err().message().to_owned()
        })
        .unwrap();
    let message = handle.join().unwrap();
    assert!(message.contains("Maximum call depth"), "{message}");
}

#[test]
fn method_call_on_char_is_a_type_mismatch() {
    let err = eval_err("'a'.upper()");
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    assert_eq!(err.message(), "Cannot call method 'upper' on non-object type");
}

#[test]
fn catch_that_throws_still_runs_finally() {
    let mut session = Session::new();
    session.eval("ran: List<Int> = []").unwrap();
    let err = session
        .eval(
            r#"
try {
    throw new Error("first", "E1")
} catch (e) {
    throw new Error("second", "E2")
} finally {
    ran.add(1)
}
"#,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserException);
    assert!(err.message().contains("E2"), "{}", err.message());
    assert_eq!(session.eval("ran.size()").unwrap().as_int(), Some(1));
}

#[test]
fn thrown_values_can_be_arbitrary() {
    let source = r#"
        caught: Text = ""
        try {
            throw "just text"
        } catch (e) {
            caught = e
        }
        caught
    "#;
    assert_eq!(eval_text(source), "just text");
}
