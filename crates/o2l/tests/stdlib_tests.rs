use o2l::{ErrorKind, Session, Value};
use pretty_assertions::assert_eq;

fn eval(session: &mut Session, source: &str) -> Value {
    session.eval(source).unwrap()
}

fn eval_text(session: &mut Session, source: &str) -> String {
    let Value::Text(text) = eval(session, source) else {
        panic!("expected Text from {source:?}");
    };
    text.to_string()
}

// --- fs ---

#[test]
fn fs_round_trips_text_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("hello.txt");
    let path_text = path.to_string_lossy().into_owned();
    let mut session = Session::new();

    assert!(matches!(
        eval(&mut session, &format!(r#"fs.writeText("{path_text}", "hi there")"#)),
        Value::Bool(true)
    ));
    assert_eq!(
        eval_text(&mut session, &format!(r#"fs.readText("{path_text}")"#)),
        "hi there"
    );
    assert!(matches!(
        eval(&mut session, &format!(r#"fs.exists("{path_text}")"#)),
        Value::Bool(true)
    ));
    assert!(matches!(
        eval(&mut session, &format!(r#"fs.isFile("{path_text}")"#)),
        Value::Bool(true)
    ));

    let parent = path.parent().unwrap().to_string_lossy().into_owned();
    let listed = eval(&mut session, &format!(r#"fs.listFiles("{parent}")"#));
    let Value::List(list) = listed else { panic!("expected list") };
    assert_eq!(list.size(), 1);

    assert!(matches!(
        eval(&mut session, &format!(r#"fs.deleteFile("{path_text}")"#)),
        Value::Bool(true)
    ));
    assert!(matches!(
        eval(&mut session, &format!(r#"fs.exists("{path_text}")"#)),
        Value::Bool(false)
    ));
}

#[test]
fn fs_read_of_missing_file_is_an_evaluation_error() {
    let mut session = Session::new();
    let err = session.eval(r#"fs.readText("/definitely/not/here.txt")"#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Evaluation);
    assert!(err.message().contains("does not exist"));
}

#[test]
fn fs_path_helpers() {
    let mut session = Session::new();
    assert_eq!(eval_text(&mut session, r#"fs.basename("/a/b/c.txt")"#), "c.txt");
    assert_eq!(eval_text(&mut session, r#"fs.dirname("/a/b/c.txt")"#), "/a/b");
    assert_eq!(eval_text(&mut session, r#"fs.dirname("c.txt")"#), ".");
    assert_eq!(eval_text(&mut session, r#"fs.extname("archive.tar.gz")"#), ".gz");
    assert_eq!(eval_text(&mut session, r#"fs.extname("README")"#), "");
    assert_eq!(eval_text(&mut session, r#"fs.join("a", "b", "c.txt")"#), "a/b/c.txt");
    assert_eq!(eval_text(&mut session, r#"fs.normalize("a/b/../c/./d")"#), "a/c/d");
    assert_eq!(eval_text(&mut session, r#"fs.relative("/a/b/c", "/a/d")"#), "../../d");
    assert!(matches!(
        eval(&mut session, r#"fs.isAbsolute("/tmp")"#),
        Value::Bool(true)
    ));
    assert!(matches!(
        eval(&mut session, r#"fs.isAbsolute("tmp")"#),
        Value::Bool(false)
    ));
    assert_eq!(
        eval_text(&mut session, r#"fs.changeExtension("doc.txt", "md")"#),
        "doc.md"
    );
    assert_eq!(eval_text(&mut session, r#"fs.getParent("/a/b")"#), "/a");

    let Value::List(parts) = eval(&mut session, r#"fs.splitPath("a/b/c")"#) else {
        panic!("expected list");
    };
    assert_eq!(parts.size(), 3);
}

// --- json ---

fn json_session() -> Session {
    let mut session = Session::new();
    session.eval("import json").unwrap();
    session
}

#[test]
fn json_parse_and_path_access() {
    let mut session = json_session();
    assert_eq!(
        eval(&mut session, r#"json.get("{\"a\": {\"b\": [10, 20, 30]}}", "a.b.1")"#).as_int(),
        Some(20)
    );
    assert_eq!(
        eval_text(&mut session, r#"json.getType("{\"a\": 1}")"#),
        "object"
    );
    assert!(matches!(
        eval(&mut session, r#"json.hasKey("{\"a\": 1}", "a")"#),
        Value::Bool(true)
    ));
    assert!(matches!(
        eval(&mut session, r#"json.isValid("{nope")"#),
        Value::Bool(false)
    ));

    let err = session.eval(r#"json.get("{}", "missing.path")"#).unwrap_err();
    assert!(err.message().contains("Path not found"), "{}", err.message());
}

#[test]
fn json_parse_to_map_and_list() {
    let mut session = json_session();
    let Value::Map(map) = eval(&mut session, r#"json.parseToMap("{\"x\": 1, \"y\": true}")"#) else {
        panic!("expected map");
    };
    assert_eq!(map.size(), 2);

    let Value::List(list) = eval(&mut session, r#"json.parseToList("[1, \"two\", 3.5]")"#) else {
        panic!("expected list");
    };
    assert_eq!(list.size(), 3);

    let err = session.eval(r#"json.parseToList("{}")"#).unwrap_err();
    assert!(err.message().contains("JSON array"));
}

#[test]
fn json_set_remove_merge() {
    let mut session = json_session();
    assert_eq!(
        eval_text(&mut session, r#"json.set("{\"a\": 1}", "b.c", 2)"#),
        r#"{"a":1,"b":{"c":2}}"#
    );
    assert_eq!(
        eval_text(&mut session, r#"json.remove("{\"a\": 1, \"b\": 2}", "a")"#),
        r#"{"b":2}"#
    );
    assert_eq!(
        eval_text(
            &mut session,
            r#"json.merge("{\"a\": {\"x\": 1}}", "{\"a\": {\"y\": 2}}")"#
        ),
        r#"{"a":{"x":1,"y":2}}"#
    );
}

#[test]
fn json_array_operations() {
    let mut session = json_session();
    assert_eq!(eval_text(&mut session, r#"json.push("[1, 2]", 3)"#), "[1,2,3]");
    assert_eq!(eval_text(&mut session, r#"json.pop("[1, 2]")"#), "[1]");
    assert_eq!(eval_text(&mut session, r#"json.slice("[1, 2, 3, 4]", 1, 3)"#), "[2,3]");
    assert_eq!(eval(&mut session, r#"json.indexOf("[5, 6, 7]", 6)"#).as_int(), Some(1));
    assert_eq!(eval(&mut session, r#"json.indexOf("[5, 6, 7]", 9)"#).as_int(), Some(-1));
    assert_eq!(eval(&mut session, r#"json.size("[5, 6, 7]")"#).as_int(), Some(3));
}

#[test]
fn json_stringify_pretty_minify_equals() {
    let mut session = json_session();
    assert_eq!(
        eval_text(&mut session, r#"json.stringify({"a": 1, "b": "two"})"#),
        r#"{"a":1,"b":"two"}"#
    );
    assert_eq!(
        eval_text(&mut session, r#"json.minify("{ \"a\" : 1 }")"#),
        r#"{"a":1}"#
    );
    let pretty = eval_text(&mut session, r#"json.prettyPrint("{\"a\":1}")"#);
    assert!(pretty.contains('\n'));
    assert!(matches!(
        eval(&mut session, r#"json.equals("{\"a\":1}", "{ \"a\" : 1 }")"#),
        Value::Bool(true)
    ));
    assert_eq!(eval_text(&mut session, r#"json.clone("{ \"a\" : 1 }")"#), r#"{"a":1}"#);
}

// --- os ---

#[test]
fn os_environment_and_identity() {
    let mut session = Session::new();
    assert_eq!(
        eval_text(&mut session, r#"os.getEnv("O2L_SURELY_UNSET_VARIABLE")"#),
        ""
    );
    assert_eq!(eval(&mut session, "os.argc()").as_int(), Some(0));
    let os_name = eval_text(&mut session, "os.getOSName()");
    assert!(!os_name.is_empty());
    let pid = eval(&mut session, "os.getProcessId()").as_int().unwrap();
    assert!(pid > 0);
    let cpus = eval(&mut session, "os.getCPUCount()").as_int().unwrap();
    assert!(cpus >= 1);
}

#[cfg(unix)]
#[test]
fn os_execute_returns_exit_codes_and_output() {
    let mut session = Session::new();
    assert_eq!(eval(&mut session, r#"os.execute("exit 3")"#).as_int(), Some(3));

    let Value::Map(result) = eval(&mut session, r#"os.executeWithOutput("echo out")"#) else {
        panic!("expected map");
    };
    assert_eq!(
        result.get(&Value::text("exitCode")).unwrap().as_int(),
        Some(0)
    );
    let stdout = result.get(&Value::text("stdout")).unwrap();
    assert_eq!(stdout.as_text(), Some("out\n"));
    assert!(matches!(
        result.get(&Value::text("success")).unwrap(),
        Value::Bool(true)
    ));
}

#[cfg(unix)]
#[test]
fn os_execute_with_timeout_flags_slow_commands() {
    let mut session = Session::new();
    let Value::Map(result) = eval(&mut session, r#"os.executeWithTimeout("sleep 5", 0)"#) else {
        panic!("expected map");
    };
    assert!(matches!(
        result.get(&Value::text("timedOut")).unwrap(),
        Value::Bool(true)
    ));
}

// --- http.client (offline surface) ---

fn client_session() -> Session {
    let mut session = Session::new();
    session.eval("import http.client").unwrap();
    session
}

#[test]
fn http_client_url_helpers() {
    let mut session = client_session();
    assert_eq!(
        eval_text(&mut session, r#"client.urlEncode("a b&c")"#),
        "a%20b%26c"
    );
    assert_eq!(
        eval_text(&mut session, r#"client.urlDecode("a%20b%26c")"#),
        "a b&c"
    );
    assert_eq!(
        eval_text(
            &mut session,
            r#"client.buildUrl("http://x.test/api", {"q": "a b", "n": "1"})"#
        ),
        "http://x.test/api?n=1&q=a%20b"
    );

    let Value::Map(parsed) =
        eval(&mut session, r#"client.parseUrl("https://example.com:8443/v1/items?q=1")"#)
    else {
        panic!("expected map");
    };
    assert_eq!(parsed.get(&Value::text("host")).unwrap().as_text(), Some("example.com"));
    assert_eq!(parsed.get(&Value::text("port")).unwrap().as_int(), Some(8443));
}

#[test]
fn http_client_failure_yields_response_object_not_error() {
    let mut session = client_session();
    // Reserved TLD: the transport fails without touching the network
    // stack's happy path, and the failure is captured in the response.
    let source = r#"
        r: HttpResponse = client.get("http://o2l.invalid/x")
        r.isSuccess()
    "#;
    assert!(matches!(eval(&mut session, source), Value::Bool(false)));
    assert_eq!(eval(&mut session, "r.getStatus()").as_int(), Some(0));
    let error = eval_text(&mut session, "r.getError()");
    assert!(!error.is_empty());
}

// --- http.server (registration surface) ---

#[test]
fn http_server_validates_handlers() {
    let mut session = Session::new();
    session.eval("import http.server").unwrap();
    session
        .eval(
            r#"
Object Handler {
    @external method handle(req: HttpRequest, res: HttpResponse): Int {
        res.setBody("ok")
        return 0
    }
}
"#,
        )
        .unwrap();
    session
        .eval(r#"s: HttpServer = server.createServer("127.0.0.1", 18080)"#)
        .unwrap();
    session.eval(r#"s.get("/items/:id", new Handler())"#).unwrap();
    assert!(matches!(
        session.eval("s.isRunning()").unwrap(),
        Value::Bool(false)
    ));

    let err = session.eval(r#"s.get("/other", 42)"#).unwrap_err();
    assert!(err.message().contains("handler must be an object"));

    let err = session
        .eval(r#"bad: HttpServer = server.createServer("127.0.0.1", 99999)"#)
        .unwrap_err();
    assert!(err.message().contains("Invalid port"));
}

// --- ffi gating ---

#[test]
fn ffi_import_requires_enable_flag() {
    let mut session = Session::new();
    let err = session.eval("import ffi").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Evaluation);
    assert!(err.message().contains("FFI is disabled"));
}

#[test]
fn ffi_surface_with_flag_enabled() {
    let mut session = Session::new();
    session.context_mut().set_ffi_enabled(true);
    session.eval("import ffi").unwrap();

    let null_render = eval(&mut session, "ffi.nullPtr()");
    assert_eq!(o2l::value_to_string(&null_render), "Ptr<Void>(null)");

    let source = r#"
        r: Result<Library, Error> = ffi.load("/no/such/library.so")
        r.isSuccess()
    "#;
    assert!(matches!(eval(&mut session, source), Value::Bool(false)));
    assert_eq!(
        eval_text(&mut session, "r.getError().getCode()"),
        "FFI_ERROR"
    );

    let err = session.eval(r#"ffi.setPolicy("everything")"#).unwrap_err();
    assert!(err.message().contains("Unknown FFI policy"));
}

#[test]
fn unknown_module_import_fails() {
    let mut session = Session::new();
    let err = session.eval("import nonsense.module").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
    assert!(err.message().contains("Unknown module"));
}
