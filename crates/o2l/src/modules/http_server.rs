use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    path::{Path, PathBuf},
    rc::Rc,
    time::Duration,
};

use log::{debug, info, warn};
use tiny_http::{Header, Response, Server};

use crate::{
    context::Context,
    exception::{EvalResult, Flow},
    modules::{int_arg, require_arity, text_arg},
    object::ObjectInstance,
    value::Value,
};

/// The `http.server` host object.
///
/// Requests are served on the interpreter thread: `listen()` blocks and
/// dispatches route handlers through the normal method-call path, so user
/// code never runs concurrently with itself.
pub(crate) fn create_http_server_object() -> Rc<ObjectInstance> {
    let server_module = Rc::new(ObjectInstance::new("server"));

    server_module.add_native("createServer", true, |args, _ctx| {
        require_arity("server.createServer()", args, 2)?;
        let host = text_arg("server.createServer()", args, 0)?;
        let port = int_arg("server.createServer()", args, 1)?;
        if !(0..=65535).contains(&port) {
            return Err(Flow::eval(format!("Invalid port: {port}")));
        }
        Ok(create_server_object(host, port as u16))
    });

    server_module
}

struct Route {
    method: String,
    pattern: String,
    handler: Rc<ObjectInstance>,
}

#[derive(Default)]
struct ServerState {
    routes: Vec<Route>,
    middleware: Vec<Rc<ObjectInstance>>,
    static_mounts: Vec<(String, PathBuf)>,
}

struct ResponseState {
    status: i64,
    headers: BTreeMap<String, String>,
    body: String,
    sent: bool,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: String::new(),
            sent: false,
        }
    }
}

fn create_server_object(host: &str, port: u16) -> Value {
    let object = Rc::new(ObjectInstance::new("HttpServer"));
    let state = Rc::new(RefCell::new(ServerState::default()));
    let listener: Rc<RefCell<Option<Server>>> = Rc::new(RefCell::new(None));
    let running = Rc::new(Cell::new(false));
    let address = format!("{host}:{port}");

    for verb in ["get", "post", "put", "delete", "patch", "head", "options"] {
        let state = Rc::clone(&state);
        object.add_native(verb, true, move |args, _ctx| {
            let what = format!("HttpServer.{verb}()");
            require_arity(&what, args, 2)?;
            let pattern = text_arg(&what, args, 0)?;
            let Some(Value::Object(handler)) = args.get(1) else {
                return Err(Flow::eval(format!("{what} handler must be an object")));
            };
            if !handler.has_method("handle") {
                return Err(Flow::eval(format!(
                    "{what} handler must expose an external handle(request, response) method"
                )));
            }
            state.borrow_mut().routes.push(Route {
                method: verb.to_ascii_uppercase(),
                pattern: pattern.to_owned(),
                handler: Rc::clone(handler),
            });
            Ok(Value::void())
        });
    }

    {
        let state = Rc::clone(&state);
        object.add_native("use", true, move |args, _ctx| {
            require_arity("HttpServer.use()", args, 1)?;
            let Some(Value::Object(middleware)) = args.first() else {
                return Err(Flow::eval("HttpServer.use() middleware must be an object"));
            };
            state.borrow_mut().middleware.push(Rc::clone(middleware));
            Ok(Value::void())
        });
    }

    {
        let state = Rc::clone(&state);
        object.add_native("static", true, move |args, _ctx| {
            require_arity("HttpServer.static()", args, 2)?;
            let prefix = text_arg("HttpServer.static()", args, 0)?;
            let dir = text_arg("HttpServer.static()", args, 1)?;
            state
                .borrow_mut()
                .static_mounts
                .push((prefix.to_owned(), PathBuf::from(dir)));
            Ok(Value::void())
        });
    }

    {
        let running = Rc::clone(&running);
        object.add_native("isRunning", true, move |args, _ctx| {
            require_arity("HttpServer.isRunning()", args, 0)?;
            Ok(Value::Bool(running.get()))
        });
    }

    {
        let running = Rc::clone(&running);
        let listener = Rc::clone(&listener);
        object.add_native("stop", true, move |args, _ctx| {
            require_arity("HttpServer.stop()", args, 0)?;
            running.set(false);
            listener.borrow_mut().take();
            Ok(Value::void())
        });
    }

    {
        let state = Rc::clone(&state);
        let running = Rc::clone(&running);
        let listener = Rc::clone(&listener);
        let address = address.clone();
        object.add_native("listen", true, move |args, ctx| {
            require_arity("HttpServer.listen()", args, 0)?;
            bind(&listener, &address)?;
            running.set(true);
            info!("http server listening on {address}");
            while running.get() {
                serve_one(&state, &listener, ctx, Duration::from_millis(200))?;
            }
            Ok(Value::void())
        });
    }

    {
        let state = Rc::clone(&state);
        let listener = Rc::clone(&listener);
        object.add_native("handleOne", true, move |args, ctx| {
            require_arity("HttpServer.handleOne()", args, 0)?;
            bind(&listener, &address)?;
            serve_one(&state, &listener, ctx, Duration::from_secs(30))
                .map(Value::Bool)
        });
    }

    Value::Object(object)
}

fn bind(listener: &Rc<RefCell<Option<Server>>>, address: &str) -> EvalResult<()> {
    if listener.borrow().is_some() {
        return Ok(());
    }
    let server = Server::http(address)
        .map_err(|e| Flow::system(format!("Cannot bind {address}: {e}")))?;
    *listener.borrow_mut() = Some(server);
    Ok(())
}

/// Waits up to `timeout` for one request and dispatches it. Returns
/// whether a request was served.
fn serve_one(
    state: &Rc<RefCell<ServerState>>,
    listener: &Rc<RefCell<Option<Server>>>,
    ctx: &mut Context,
    timeout: Duration,
) -> EvalResult<bool> {
    // The listener borrow must end before handlers run: a handler may
    // call stop(), which takes the listener slot.
    let request = {
        let guard = listener.borrow();
        let Some(server) = guard.as_ref() else {
            return Ok(false);
        };
        match server.recv_timeout(timeout) {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(false),
            Err(e) => return Err(Flow::system(format!("Failed to receive request: {e}"))),
        }
    };

    let method = request.method().to_string().to_ascii_uppercase();
    let url = request.url().to_owned();
    let (path, query_string) = match url.split_once('?') {
        Some((path, query)) => (path.to_owned(), query.to_owned()),
        None => (url, String::new()),
    };
    debug!("http request {method} {path}");

    let mut headers = BTreeMap::new();
    for header in request.headers() {
        headers.insert(
            header.field.as_str().as_str().to_ascii_lowercase(),
            header.value.as_str().to_owned(),
        );
    }
    let mut body = String::new();
    let mut request = request;
    {
        use std::io::Read as _;
        let _ = request.as_reader().read_to_string(&mut body);
    }

    let response_state = Rc::new(RefCell::new(ResponseState::default()));

    // Static mounts are checked before routes.
    let static_hit = {
        let state = state.borrow();
        state
            .static_mounts
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(prefix, dir)| (prefix.clone(), dir.clone()))
    };
    if let Some((prefix, dir)) = static_hit {
        serve_static(&path, &prefix, &dir, &response_state);
    } else {
        let matched = {
            let state = state.borrow();
            state
                .routes
                .iter()
                .find_map(|route| {
                    if route.method != method {
                        return None;
                    }
                    match_pattern(&route.pattern, &path)
                        .map(|params| (Rc::clone(&route.handler), params))
                })
        };

        match matched {
            None => {
                let mut response = response_state.borrow_mut();
                response.status = 404;
                response.body = "Not Found".to_owned();
            }
            Some((handler, params)) => {
                let request_value =
                    build_request_object(&method, &path, &query_string, &params, &headers, &body);
                let response_value = build_response_object(&response_state);
                let middleware = state.borrow().middleware.clone();

                let mut proceed = true;
                for mw in middleware {
                    match mw.call_method(
                        "handle",
                        &[request_value.clone(), response_value.clone()],
                        ctx,
                        true,
                    ) {
                        Ok(Value::Bool(false)) => {
                            proceed = false;
                            break;
                        }
                        Ok(_) => {}
                        Err(flow) => {
                            internal_error(&response_state, &flow);
                            proceed = false;
                            break;
                        }
                    }
                }

                if proceed {
                    if let Err(flow) = handler.call_method(
                        "handle",
                        &[request_value, response_value],
                        ctx,
                        true,
                    ) {
                        internal_error(&response_state, &flow);
                    }
                }
            }
        }
    }

    let response = {
        let state = response_state.borrow();
        let mut response = Response::from_string(state.body.clone())
            .with_status_code(state.status as u16);
        for (name, value) in &state.headers {
            if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                response = response.with_header(header);
            }
        }
        response
    };
    if let Err(e) = request.respond(response) {
        warn!("failed to send response: {e}");
    }
    Ok(true)
}

fn internal_error(response_state: &Rc<RefCell<ResponseState>>, flow: &Flow) {
    let message = match flow.as_error() {
        Some(err) => err.to_string(),
        None => "handler returned early".to_owned(),
    };
    warn!("handler failed: {message}");
    let mut response = response_state.borrow_mut();
    response.status = 500;
    response.body = format!("Internal Server Error: {message}");
}

/// Matches `/users/:id` style patterns, capturing `:name` segments.
fn match_pattern(pattern: &str, path: &str) -> Option<BTreeMap<String, String>> {
    let pattern_segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if pattern_segments.len() != path_segments.len() {
        return None;
    }
    let mut params = BTreeMap::new();
    for (pattern_segment, path_segment) in pattern_segments.iter().zip(&path_segments) {
        if let Some(name) = pattern_segment.strip_prefix(':') {
            params.insert(name.to_owned(), (*path_segment).to_owned());
        } else if pattern_segment != path_segment {
            return None;
        }
    }
    Some(params)
}

fn serve_static(path: &str, prefix: &str, dir: &Path, response_state: &Rc<RefCell<ResponseState>>) {
    let relative = path.strip_prefix(prefix).unwrap_or(path).trim_start_matches('/');
    let mut response = response_state.borrow_mut();
    // Reject traversal out of the mount directory.
    if relative.split('/').any(|segment| segment == "..") {
        response.status = 403;
        response.body = "Forbidden".to_owned();
        return;
    }
    let full = dir.join(relative);
    match std::fs::read_to_string(&full) {
        Ok(content) => {
            response.status = 200;
            response
                .headers
                .insert("Content-Type".to_owned(), content_type(&full).to_owned());
            response.body = content;
        }
        Err(_) => {
            response.status = 404;
            response.body = "Not Found".to_owned();
        }
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

fn build_request_object(
    method: &str,
    path: &str,
    query_string: &str,
    params: &BTreeMap<String, String>,
    headers: &BTreeMap<String, String>,
    body: &str,
) -> Value {
    let object = Rc::new(ObjectInstance::new("HttpRequest"));

    {
        let method = method.to_owned();
        object.add_native("getMethod", true, move |args, _ctx| {
            require_arity("HttpRequest.getMethod()", args, 0)?;
            Ok(Value::text(method.as_str()))
        });
    }
    {
        let path = path.to_owned();
        object.add_native("getPath", true, move |args, _ctx| {
            require_arity("HttpRequest.getPath()", args, 0)?;
            Ok(Value::text(path.as_str()))
        });
    }
    {
        let params = params.clone();
        object.add_native("getParam", true, move |args, _ctx| {
            require_arity("HttpRequest.getParam()", args, 1)?;
            let name = text_arg("HttpRequest.getParam()", args, 0)?;
            Ok(Value::text(params.get(name).map(String::as_str).unwrap_or_default()))
        });
    }
    {
        let query: BTreeMap<String, String> = query_string
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_owned(), v.to_owned()),
                None => (pair.to_owned(), String::new()),
            })
            .collect();
        object.add_native("getQuery", true, move |args, _ctx| {
            require_arity("HttpRequest.getQuery()", args, 1)?;
            let name = text_arg("HttpRequest.getQuery()", args, 0)?;
            Ok(Value::text(query.get(name).map(String::as_str).unwrap_or_default()))
        });
    }
    {
        let headers = headers.clone();
        object.add_native("getHeader", true, move |args, _ctx| {
            require_arity("HttpRequest.getHeader()", args, 1)?;
            let name = text_arg("HttpRequest.getHeader()", args, 0)?.to_ascii_lowercase();
            Ok(Value::text(headers.get(&name).map(String::as_str).unwrap_or_default()))
        });
    }
    {
        let body = body.to_owned();
        object.add_native("getBody", true, move |args, _ctx| {
            require_arity("HttpRequest.getBody()", args, 0)?;
            Ok(Value::text(body.as_str()))
        });
    }

    Value::Object(object)
}

fn build_response_object(state: &Rc<RefCell<ResponseState>>) -> Value {
    let object = Rc::new(ObjectInstance::new("HttpResponse"));

    {
        let state = Rc::clone(state);
        object.add_native("setStatus", true, move |args, _ctx| {
            require_arity("HttpResponse.setStatus()", args, 1)?;
            let status = int_arg("HttpResponse.setStatus()", args, 0)?;
            if !(100..=599).contains(&status) {
                return Err(Flow::eval(format!("Invalid status code: {status}")));
            }
            state.borrow_mut().status = status;
            Ok(Value::void())
        });
    }
    {
        let state = Rc::clone(state);
        object.add_native("setHeader", true, move |args, _ctx| {
            require_arity("HttpResponse.setHeader()", args, 2)?;
            let name = text_arg("HttpResponse.setHeader()", args, 0)?;
            let value = text_arg("HttpResponse.setHeader()", args, 1)?;
            state.borrow_mut().headers.insert(name.to_owned(), value.to_owned());
            Ok(Value::void())
        });
    }
    {
        let state = Rc::clone(state);
        object.add_native("setBody", true, move |args, _ctx| {
            require_arity("HttpResponse.setBody()", args, 1)?;
            let body = text_arg("HttpResponse.setBody()", args, 0)?;
            state.borrow_mut().body = body.to_owned();
            Ok(Value::void())
        });
    }
    {
        let state = Rc::clone(state);
        object.add_native("send", true, move |args, _ctx| {
            if args.len() > 1 {
                return Err(Flow::eval("HttpResponse.send() takes an optional body argument"));
            }
            let mut response = state.borrow_mut();
            if let Some(body) = args.first() {
                let Value::Text(body) = body else {
                    return Err(Flow::eval("HttpResponse.send() body must be a Text"));
                };
                response.body = body.to_string();
            }
            response.sent = true;
            Ok(Value::void())
        });
    }
    {
        let state = Rc::clone(state);
        object.add_native("sendJson", true, move |args, _ctx| {
            require_arity("HttpResponse.sendJson()", args, 1)?;
            let body = text_arg("HttpResponse.sendJson()", args, 0)?;
            serde_json::from_str::<serde_json::Value>(body)
                .map_err(|e| Flow::eval(format!("sendJson() requires valid JSON: {e}")))?;
            let mut response = state.borrow_mut();
            response
                .headers
                .insert("Content-Type".to_owned(), "application/json".to_owned());
            response.body = body.to_owned();
            response.sent = true;
            Ok(Value::void())
        });
    }

    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matching_captures_params() {
        let params = match_pattern("/users/:id/posts/:post", "/users/7/posts/42").unwrap();
        assert_eq!(params["id"], "7");
        assert_eq!(params["post"], "42");
        assert!(match_pattern("/users/:id", "/users").is_none());
        assert!(match_pattern("/users/:id", "/orders/7").is_none());
    }
}
