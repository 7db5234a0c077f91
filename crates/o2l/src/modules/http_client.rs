use std::{cell::RefCell, collections::BTreeMap, io::Read as _, rc::Rc, time::Duration};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::debug;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::{
    exception::{EvalResult, Flow},
    modules::{int_arg, require_arity, text_arg},
    object::ObjectInstance,
    types::MapInstance,
    value::{value_to_string, Value},
};

const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

/// The `http.client` host object, backed by `ureq`.
pub(crate) fn create_http_client_object() -> Rc<ObjectInstance> {
    let client = Rc::new(ObjectInstance::new("client"));

    for verb in ["get", "delete", "head", "options"] {
        client.add_native(verb, true, move |args, _ctx| {
            let what = format!("client.{verb}()");
            if args.is_empty() || args.len() > 2 {
                return Err(Flow::eval(format!("{what} requires a URL and optional headers Map")));
            }
            let url = text_arg(&what, args, 0)?;
            let headers = optional_headers(&what, args.get(1))?;
            Ok(perform(verb, url, None, &headers, None))
        });
    }

    for verb in ["post", "put", "patch"] {
        client.add_native(verb, true, move |args, _ctx| {
            let what = format!("client.{verb}()");
            if args.is_empty() || args.len() > 3 {
                return Err(Flow::eval(format!(
                    "{what} requires a URL, optional body, and optional headers Map"
                )));
            }
            let url = text_arg(&what, args, 0)?;
            let body = match args.get(1) {
                None => None,
                Some(Value::Text(s)) => Some(s.to_string()),
                Some(other) => Some(value_to_string(other)),
            };
            let headers = optional_headers(&what, args.get(2))?;
            Ok(perform(verb, url, body, &headers, None))
        });
    }

    client.add_native("request", true, |args, _ctx| {
        if args.len() < 2 || args.len() > 4 {
            return Err(Flow::eval(
                "client.request() requires a method, URL, optional body and headers",
            ));
        }
        let method = text_arg("client.request()", args, 0)?.to_ascii_lowercase();
        let url = text_arg("client.request()", args, 1)?;
        let body = match args.get(2) {
            None => None,
            Some(Value::Text(s)) => Some(s.to_string()),
            Some(other) => Some(value_to_string(other)),
        };
        let headers = optional_headers("client.request()", args.get(3))?;
        Ok(perform(&method, url, body, &headers, None))
    });

    client.add_native("createRequest", true, |args, _ctx| {
        require_arity("client.createRequest()", args, 2)?;
        let method = text_arg("client.createRequest()", args, 0)?;
        let url = text_arg("client.createRequest()", args, 1)?;
        Ok(create_request_object(method, url))
    });

    client.add_native("urlEncode", true, |args, _ctx| {
        require_arity("client.urlEncode()", args, 1)?;
        Ok(Value::text(url_encode(text_arg("client.urlEncode()", args, 0)?)))
    });

    client.add_native("urlDecode", true, |args, _ctx| {
        require_arity("client.urlDecode()", args, 1)?;
        Ok(Value::text(url_decode(text_arg("client.urlDecode()", args, 0)?)))
    });

    client.add_native("buildUrl", true, |args, _ctx| {
        require_arity("client.buildUrl()", args, 2)?;
        let base = text_arg("client.buildUrl()", args, 0)?;
        let Some(Value::Map(params)) = args.get(1) else {
            return Err(Flow::eval("client.buildUrl() second argument must be a Map"));
        };
        let mut url = base.to_owned();
        let mut separator = if base.contains('?') { '&' } else { '?' };
        for key in params.keys() {
            let value = params.get(&key)?;
            url.push(separator);
            url.push_str(&url_encode(&value_to_string(&key)));
            url.push('=');
            url.push_str(&url_encode(&value_to_string(&value)));
            separator = '&';
        }
        Ok(Value::text(url))
    });

    client.add_native("parseUrl", true, |args, _ctx| {
        require_arity("client.parseUrl()", args, 1)?;
        parse_url(text_arg("client.parseUrl()", args, 0)?)
    });

    client.add_native("uploadFile", true, |args, _ctx| {
        if args.len() < 2 || args.len() > 3 {
            return Err(Flow::eval(
                "client.uploadFile() requires a URL, file path and optional headers Map",
            ));
        }
        let url = text_arg("client.uploadFile()", args, 0)?;
        let path = text_arg("client.uploadFile()", args, 1)?;
        let headers = optional_headers("client.uploadFile()", args.get(2))?;
        let body = std::fs::read_to_string(path)
            .map_err(|e| Flow::system(format!("Cannot read upload file: {e}")))?;
        Ok(perform("post", url, Some(body), &headers, None))
    });

    client.add_native("downloadFile", true, |args, _ctx| {
        require_arity("client.downloadFile()", args, 2)?;
        let url = text_arg("client.downloadFile()", args, 0)?;
        let dest = text_arg("client.downloadFile()", args, 1)?;
        match ureq::get(url).call() {
            Ok(response) => {
                let mut bytes = Vec::new();
                response
                    .into_reader()
                    .take(MAX_BODY_BYTES)
                    .read_to_end(&mut bytes)
                    .map_err(|e| Flow::system(format!("Download failed: {e}")))?;
                std::fs::write(dest, bytes)
                    .map_err(|e| Flow::system(format!("Cannot write download: {e}")))?;
                Ok(Value::Bool(true))
            }
            Err(e) => {
                debug!("downloadFile({url}) failed: {e}");
                Ok(Value::Bool(false))
            }
        }
    });

    client
}

fn optional_headers(what: &str, arg: Option<&Value>) -> EvalResult<BTreeMap<String, String>> {
    let mut headers = BTreeMap::new();
    match arg {
        None => {}
        Some(Value::Map(map)) => {
            for key in map.keys() {
                let value = map.get(&key)?;
                headers.insert(value_to_string(&key), value_to_string(&value));
            }
        }
        Some(_) => return Err(Flow::eval(format!("{what} headers argument must be a Map"))),
    }
    Ok(headers)
}

/// Performs an HTTP request and always yields an HttpResponse object;
/// transport failures produce a response with `isSuccess() == false` and
/// an error message rather than raising.
fn perform(
    method: &str,
    url: &str,
    body: Option<String>,
    headers: &BTreeMap<String, String>,
    timeout: Option<Duration>,
) -> Value {
    debug!("http {method} {url}");
    let mut request = ureq::request(&method.to_ascii_uppercase(), url);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }
    for (name, value) in headers {
        request = request.set(name, value);
    }

    let outcome = match body {
        Some(body) => request.send_string(&body),
        None => request.call(),
    };

    match outcome {
        Ok(response) => response_object(response, None),
        Err(ureq::Error::Status(_, response)) => response_object(response, None),
        Err(ureq::Error::Transport(transport)) => failed_response_object(&transport.to_string()),
    }
}

fn response_object(response: ureq::Response, error_message: Option<String>) -> Value {
    let status = i64::from(response.status());
    let status_message = response.status_text().to_owned();
    let mut headers = BTreeMap::new();
    for name in response.headers_names() {
        if let Some(value) = response.header(&name) {
            headers.insert(name.clone(), value.to_owned());
        }
    }
    let body = response
        .into_string()
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
    build_response_object(status, &status_message, &body, &headers, error_message)
}

fn failed_response_object(error: &str) -> Value {
    build_response_object(0, "", "", &BTreeMap::new(), Some(error.to_owned()))
}

/// An HttpResponse object whose getters close over the captured response
/// data; there is no mutable state to leak.
fn build_response_object(
    status: i64,
    status_message: &str,
    body: &str,
    headers: &BTreeMap<String, String>,
    error_message: Option<String>,
) -> Value {
    let object = Rc::new(ObjectInstance::new("HttpResponse"));
    let success = (200..300).contains(&status);

    object.add_native("getStatus", true, move |args, _ctx| {
        require_arity("HttpResponse.getStatus()", args, 0)?;
        Ok(Value::Int(status))
    });
    {
        let status_message = status_message.to_owned();
        object.add_native("getStatusMessage", true, move |args, _ctx| {
            require_arity("HttpResponse.getStatusMessage()", args, 0)?;
            Ok(Value::text(status_message.as_str()))
        });
    }
    {
        let body = body.to_owned();
        object.add_native("getBody", true, move |args, _ctx| {
            require_arity("HttpResponse.getBody()", args, 0)?;
            Ok(Value::text(body.as_str()))
        });
    }
    {
        let body = body.to_owned();
        object.add_native("getJson", true, move |args, _ctx| {
            require_arity("HttpResponse.getJson()", args, 0)?;
            let parsed: serde_json::Value = serde_json::from_str(&body)
                .map_err(|e| Flow::eval(format!("Response body is not valid JSON: {e}")))?;
            Ok(crate::modules::json::json_to_value(&parsed))
        });
    }
    {
        let headers = headers.clone();
        object.add_native("getHeader", true, move |args, _ctx| {
            require_arity("HttpResponse.getHeader()", args, 1)?;
            let name = text_arg("HttpResponse.getHeader()", args, 0)?.to_ascii_lowercase();
            let value = headers
                .iter()
                .find(|(k, _)| k.to_ascii_lowercase() == name)
                .map(|(_, v)| v.as_str())
                .unwrap_or_default();
            Ok(Value::text(value))
        });
    }
    {
        let headers = headers.clone();
        object.add_native("getHeaders", true, move |args, _ctx| {
            require_arity("HttpResponse.getHeaders()", args, 0)?;
            let map = MapInstance::new("Text", "Text");
            for (name, value) in &headers {
                map.put(Value::text(name.as_str()), Value::text(value.as_str()));
            }
            Ok(Value::Map(Rc::new(map)))
        });
    }
    object.add_native("isSuccess", true, move |args, _ctx| {
        require_arity("HttpResponse.isSuccess()", args, 0)?;
        Ok(Value::Bool(success))
    });
    {
        let error_message = error_message.unwrap_or_default();
        object.add_native("getError", true, move |args, _ctx| {
            require_arity("HttpResponse.getError()", args, 0)?;
            Ok(Value::text(error_message.as_str()))
        });
    }

    Value::Object(object)
}

#[derive(Default)]
struct RequestState {
    method: String,
    url: String,
    headers: BTreeMap<String, String>,
    query: Vec<(String, String)>,
    body: Option<String>,
    timeout: Option<Duration>,
}

/// A stateful request object: setters accumulate into shared state, and
/// `send()` performs the call.
fn create_request_object(method: &str, url: &str) -> Value {
    let state = Rc::new(RefCell::new(RequestState {
        method: method.to_ascii_lowercase(),
        url: url.to_owned(),
        ..RequestState::default()
    }));
    let object = Rc::new(ObjectInstance::new("HttpRequest"));

    {
        let state = Rc::clone(&state);
        object.add_native("setHeader", true, move |args, _ctx| {
            require_arity("HttpRequest.setHeader()", args, 2)?;
            let name = text_arg("HttpRequest.setHeader()", args, 0)?;
            let value = text_arg("HttpRequest.setHeader()", args, 1)?;
            state.borrow_mut().headers.insert(name.to_owned(), value.to_owned());
            Ok(Value::void())
        });
    }
    {
        let state = Rc::clone(&state);
        object.add_native("setHeaders", true, move |args, _ctx| {
            require_arity("HttpRequest.setHeaders()", args, 1)?;
            let headers = optional_headers("HttpRequest.setHeaders()", args.first())?;
            state.borrow_mut().headers.extend(headers);
            Ok(Value::void())
        });
    }
    {
        let state = Rc::clone(&state);
        object.add_native("setQueryParam", true, move |args, _ctx| {
            require_arity("HttpRequest.setQueryParam()", args, 2)?;
            let name = text_arg("HttpRequest.setQueryParam()", args, 0)?;
            let value = text_arg("HttpRequest.setQueryParam()", args, 1)?;
            state.borrow_mut().query.push((name.to_owned(), value.to_owned()));
            Ok(Value::void())
        });
    }
    {
        let state = Rc::clone(&state);
        object.add_native("setQueryParams", true, move |args, _ctx| {
            require_arity("HttpRequest.setQueryParams()", args, 1)?;
            let Some(Value::Map(map)) = args.first() else {
                return Err(Flow::eval("HttpRequest.setQueryParams() argument must be a Map"));
            };
            let mut state = state.borrow_mut();
            for key in map.keys() {
                let value = map.get(&key)?;
                state.query.push((value_to_string(&key), value_to_string(&value)));
            }
            Ok(Value::void())
        });
    }
    {
        let state = Rc::clone(&state);
        object.add_native("setBasicAuth", true, move |args, _ctx| {
            require_arity("HttpRequest.setBasicAuth()", args, 2)?;
            let user = text_arg("HttpRequest.setBasicAuth()", args, 0)?;
            let password = text_arg("HttpRequest.setBasicAuth()", args, 1)?;
            state
                .borrow_mut()
                .headers
                .insert("Authorization".to_owned(), basic_auth_header(user, password));
            Ok(Value::void())
        });
    }
    {
        let state = Rc::clone(&state);
        object.add_native("setBearerToken", true, move |args, _ctx| {
            require_arity("HttpRequest.setBearerToken()", args, 1)?;
            let token = text_arg("HttpRequest.setBearerToken()", args, 0)?;
            state
                .borrow_mut()
                .headers
                .insert("Authorization".to_owned(), format!("Bearer {token}"));
            Ok(Value::void())
        });
    }
    {
        let state = Rc::clone(&state);
        object.add_native("setApiKey", true, move |args, _ctx| {
            require_arity("HttpRequest.setApiKey()", args, 1)?;
            let key = text_arg("HttpRequest.setApiKey()", args, 0)?;
            state.borrow_mut().headers.insert("X-API-Key".to_owned(), key.to_owned());
            Ok(Value::void())
        });
    }
    {
        let state = Rc::clone(&state);
        object.add_native("setTimeout", true, move |args, _ctx| {
            require_arity("HttpRequest.setTimeout()", args, 1)?;
            let seconds = int_arg("HttpRequest.setTimeout()", args, 0)?;
            if seconds < 0 {
                return Err(Flow::eval("HttpRequest.setTimeout() cannot be negative"));
            }
            state.borrow_mut().timeout = Some(Duration::from_secs(seconds as u64));
            Ok(Value::void())
        });
    }
    {
        let state = Rc::clone(&state);
        object.add_native("setBody", true, move |args, _ctx| {
            require_arity("HttpRequest.setBody()", args, 1)?;
            let body = text_arg("HttpRequest.setBody()", args, 0)?;
            state.borrow_mut().body = Some(body.to_owned());
            Ok(Value::void())
        });
    }
    {
        let state = Rc::clone(&state);
        object.add_native("setJsonBody", true, move |args, _ctx| {
            require_arity("HttpRequest.setJsonBody()", args, 1)?;
            let body = text_arg("HttpRequest.setJsonBody()", args, 0)?;
            serde_json::from_str::<serde_json::Value>(body)
                .map_err(|e| Flow::eval(format!("setJsonBody() requires valid JSON: {e}")))?;
            let mut state = state.borrow_mut();
            state.body = Some(body.to_owned());
            state
                .headers
                .insert("Content-Type".to_owned(), "application/json".to_owned());
            Ok(Value::void())
        });
    }
    {
        let state = Rc::clone(&state);
        object.add_native("send", true, move |args, _ctx| {
            require_arity("HttpRequest.send()", args, 0)?;
            let state = state.borrow();
            let mut url = state.url.clone();
            let mut separator = if url.contains('?') { '&' } else { '?' };
            for (name, value) in &state.query {
                url.push(separator);
                url.push_str(&url_encode(name));
                url.push('=');
                url.push_str(&url_encode(value));
                separator = '&';
            }
            Ok(perform(
                &state.method,
                &url,
                state.body.clone(),
                &state.headers,
                state.timeout,
            ))
        });
    }

    Value::Object(object)
}

// --- URL helpers ---

/// RFC 3986 unreserved characters stay literal; everything else is
/// percent-encoded.
const URL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn url_encode(input: &str) -> String {
    utf8_percent_encode(input, URL_ENCODE_SET).to_string()
}

fn url_decode(input: &str) -> String {
    // Form-style '+' decodes as a space.
    let spaced = input.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

fn basic_auth_header(user: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{user}:{password}")))
}

fn parse_url(url: &str) -> EvalResult<Value> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| Flow::eval(format!("Invalid URL: {url}")))?;
    let (authority, path_and_query) = match rest.find('/') {
        Some(slash) => (&rest[..slash], &rest[slash..]),
        None => (rest, ""),
    };
    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, query),
        None => (path_and_query, ""),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            (host, port.parse::<i64>().unwrap_or(0))
        }
        _ => (authority, default_port(scheme)),
    };

    let map = MapInstance::new("Text", "Value");
    map.put(Value::text("scheme"), Value::text(scheme));
    map.put(Value::text("host"), Value::text(host));
    map.put(Value::text("port"), Value::Int(port));
    map.put(Value::text("path"), Value::text(if path.is_empty() { "/" } else { path }));
    map.put(Value::text("query"), Value::text(query));
    Ok(Value::Map(Rc::new(map)))
}

fn default_port(scheme: &str) -> i64 {
    match scheme {
        "https" => 443,
        "http" => 80,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_encode_round_trip() {
        let encoded = url_encode("a b&c=d");
        assert_eq!(encoded, "a%20b%26c%3Dd");
        assert_eq!(url_decode(&encoded), "a b&c=d");
        assert_eq!(url_decode("a+b"), "a b");
    }

    #[test]
    fn basic_auth_header_encodes_credentials() {
        assert_eq!(basic_auth_header("user", "pass"), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn parse_url_components() {
        let Value::Map(map) = parse_url("https://example.com:8443/a/b?x=1").unwrap() else {
            panic!("expected map");
        };
        assert_eq!(value_to_string(&map.get(&Value::text("scheme")).unwrap()), "https");
        assert_eq!(value_to_string(&map.get(&Value::text("host")).unwrap()), "example.com");
        assert_eq!(value_to_string(&map.get(&Value::text("port")).unwrap()), "8443");
        assert_eq!(value_to_string(&map.get(&Value::text("path")).unwrap()), "/a/b");
        assert_eq!(value_to_string(&map.get(&Value::text("query")).unwrap()), "x=1");
    }
}
