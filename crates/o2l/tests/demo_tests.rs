//! Runs the demo programs shipped in `demos/` end-to-end and checks
//! their printed output.

use o2l::Runner;
use pretty_assertions::assert_eq;

fn run_demo(name: &str) -> (i64, String) {
    let path = format!("{}/../../demos/{name}", env!("CARGO_MANIFEST_DIR"));
    let source = std::fs::read_to_string(&path).unwrap();
    let runner = Runner::new(&source, name).unwrap();
    let (result, output) = runner.run_collect(vec![]);
    let exit = result.unwrap().as_int().unwrap_or(0);
    (exit, output)
}

#[test]
fn hello_demo() {
    let (exit, output) = run_demo("hello.obq");
    assert_eq!(exit, 0);
    assert_eq!(output, "Hello, World!\n");
}

#[test]
fn collections_demo() {
    let (exit, output) = run_demo("collections.obq");
    assert_eq!(exit, 0);
    assert_eq!(
        output,
        "alice scored 90\n\
         bob scored 82\n\
         carol scored 97\n\
         tracked: 2\n\
         tick 0\n\
         tick 1\n\
         tick 2\n"
    );
}

#[test]
fn errors_demo() {
    let (exit, output) = run_demo("errors.obq");
    assert_eq!(exit, 0);
    assert_eq!(
        output,
        "ok: 8080\n\
         checked 8080\n\
         failed: port out of range: 99999\n\
         checked 99999\n\
         failed: Cannot convert 'not-a-port' to Int\n\
         checked not-a-port\n"
    );
}
