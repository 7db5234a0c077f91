use std::rc::Rc;

use crate::{
    exception::{EvalResult, Flow},
    types::{
        list::{require_no_args, ListInstance},
        map::MapInstance,
    },
    value::Value,
};

// Text methods operate byte-wise (Latin-1 semantics): case mapping and the
// character predicates consider ASCII only, and indices are byte offsets.

fn is_space_byte(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C)
}

fn trim_parse_ws(text: &str) -> &str {
    text.trim_matches([' ', '\t', '\n', '\r'])
}

/// Stringification used by `join`, `format` and `formatMap` arguments.
/// Non-primitive elements collapse to `[object]`.
fn format_arg_string(value: &Value) -> String {
    match value {
        Value::Text(s) => s.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Bool(v) => if *v { "true" } else { "false" }.to_owned(),
        _ => "[object]".to_owned(),
    }
}

fn replace_all(haystack: &str, placeholder: &str, replacement: &str) -> String {
    if placeholder.is_empty() {
        return haystack.to_owned();
    }
    haystack.replace(placeholder, replacement)
}

fn text_list(parts: Vec<String>) -> Value {
    Value::List(Rc::new(ListInstance::from_values(
        "Text",
        parts.into_iter().map(Value::from).collect(),
    )))
}

fn one_text_arg<'a>(what: &str, args: &'a [Value]) -> EvalResult<&'a str> {
    match args {
        [Value::Text(s)] => Ok(s),
        _ => Err(Flow::eval(format!("{what} requires exactly one Text argument"))),
    }
}

fn one_int_arg(what: &str, args: &[Value]) -> EvalResult<i64> {
    match args {
        [Value::Int(i)] => Ok(*i),
        _ => Err(Flow::eval(format!("{what} requires exactly one Int argument"))),
    }
}

pub(crate) fn call_text_method(text: &str, name: &str, args: &[Value]) -> EvalResult<Value> {
    match name {
        // --- case ---
        "capitalize" => {
            require_no_args("Text.capitalize()", args)?;
            let mut bytes = text.as_bytes().to_vec();
            if let Some(first) = bytes.first_mut() {
                *first = first.to_ascii_uppercase();
            }
            for b in bytes.iter_mut().skip(1) {
                *b = b.to_ascii_lowercase();
            }
            Ok(Value::text(String::from_utf8_lossy(&bytes).into_owned()))
        }
        "caseFold" | "lower" => {
            require_no_args("Text.lower()", args)?;
            Ok(Value::text(text.to_ascii_lowercase()))
        }
        "upper" => {
            require_no_args("Text.upper()", args)?;
            Ok(Value::text(text.to_ascii_uppercase()))
        }
        "swapCase" => {
            require_no_args("Text.swapCase()", args)?;
            let swapped: String = text
                .chars()
                .map(|c| {
                    if c.is_ascii_lowercase() {
                        c.to_ascii_uppercase()
                    } else if c.is_ascii_uppercase() {
                        c.to_ascii_lowercase()
                    } else {
                        c
                    }
                })
                .collect();
            Ok(Value::text(swapped))
        }
        "title" => {
            require_no_args("Text.title()", args)?;
            let mut out = String::with_capacity(text.len());
            let mut word_start = true;
            for c in text.chars() {
                if c.is_ascii_alphabetic() {
                    if word_start {
                        out.push(c.to_ascii_uppercase());
                        word_start = false;
                    } else {
                        out.push(c.to_ascii_lowercase());
                    }
                } else {
                    out.push(c);
                    word_start = true;
                }
            }
            Ok(Value::text(out))
        }

        // --- metrics ---
        "length" => {
            require_no_args("Text.length()", args)?;
            Ok(Value::Int(text.len() as i64))
        }
        "count" => {
            let sub = one_text_arg("Text.count()", args)?;
            if sub.is_empty() {
                return Ok(Value::Int(0));
            }
            let mut count = 0i64;
            let mut pos = 0;
            while let Some(found) = text[pos..].find(sub) {
                count += 1;
                pos += found + sub.len();
            }
            Ok(Value::Int(count))
        }

        // --- predicates ---
        "isAlnum" => {
            require_no_args("Text.isAlnum()", args)?;
            Ok(Value::Bool(
                !text.is_empty() && text.bytes().all(|b| b.is_ascii_alphanumeric()),
            ))
        }
        "isAlpha" => {
            require_no_args("Text.isAlpha()", args)?;
            Ok(Value::Bool(
                !text.is_empty() && text.bytes().all(|b| b.is_ascii_alphabetic()),
            ))
        }
        "isAscii" => {
            require_no_args("Text.isAscii()", args)?;
            Ok(Value::Bool(text.bytes().all(|b| b <= 127)))
        }
        "isDecimal" | "isDigit" => {
            require_no_args("Text.isDigit()", args)?;
            Ok(Value::Bool(
                !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()),
            ))
        }
        "isIdentifier" => {
            require_no_args("Text.isIdentifier()", args)?;
            let bytes = text.as_bytes();
            let valid = match bytes.first() {
                None => false,
                Some(&first) => {
                    (first.is_ascii_alphabetic() || first == b'_')
                        && bytes[1..].iter().all(|&b| b.is_ascii_alphanumeric() || b == b'_')
                }
            };
            Ok(Value::Bool(valid))
        }
        "isLower" => {
            require_no_args("Text.isLower()", args)?;
            let mut has_cased = false;
            for b in text.bytes() {
                if b.is_ascii_alphabetic() {
                    has_cased = true;
                    if !b.is_ascii_lowercase() {
                        return Ok(Value::Bool(false));
                    }
                }
            }
            Ok(Value::Bool(has_cased))
        }
        "isNumeric" => {
            require_no_args("Text.isNumeric()", args)?;
            Ok(Value::Bool(
                !text.is_empty()
                    && text
                        .bytes()
                        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'+' | b'-')),
            ))
        }
        "isPrintable" => {
            require_no_args("Text.isPrintable()", args)?;
            Ok(Value::Bool(text.bytes().all(|b| (0x20..=0x7E).contains(&b))))
        }
        "isSpace" => {
            require_no_args("Text.isSpace()", args)?;
            Ok(Value::Bool(!text.is_empty() && text.bytes().all(is_space_byte)))
        }
        "isTitle" => {
            require_no_args("Text.isTitle()", args)?;
            let mut word_start = true;
            let mut has_title_case = false;
            for b in text.bytes() {
                if b.is_ascii_alphabetic() {
                    if word_start {
                        if !b.is_ascii_uppercase() {
                            return Ok(Value::Bool(false));
                        }
                        has_title_case = true;
                        word_start = false;
                    } else if !b.is_ascii_lowercase() {
                        return Ok(Value::Bool(false));
                    }
                } else {
                    word_start = true;
                }
            }
            Ok(Value::Bool(has_title_case))
        }
        "isUpper" => {
            require_no_args("Text.isUpper()", args)?;
            let mut has_cased = false;
            for b in text.bytes() {
                if b.is_ascii_alphabetic() {
                    has_cased = true;
                    if !b.is_ascii_uppercase() {
                        return Ok(Value::Bool(false));
                    }
                }
            }
            Ok(Value::Bool(has_cased))
        }

        // --- search ---
        "startswith" => {
            let prefix = one_text_arg("Text.startswith()", args)?;
            Ok(Value::Bool(text.starts_with(prefix)))
        }
        "endswith" => {
            let suffix = one_text_arg("Text.endswith()", args)?;
            Ok(Value::Bool(text.ends_with(suffix)))
        }
        "find" => {
            let sub = one_text_arg("Text.find()", args)?;
            Ok(Value::Int(text.find(sub).map_or(-1, |p| p as i64)))
        }
        "rfind" => {
            let sub = one_text_arg("Text.rfind()", args)?;
            Ok(Value::Int(text.rfind(sub).map_or(-1, |p| p as i64)))
        }
        "index" => {
            let sub = one_text_arg("Text.index()", args)?;
            match text.find(sub) {
                Some(p) => Ok(Value::Int(p as i64)),
                None => Err(Flow::eval("Text.index(): substring not found")),
            }
        }
        "rindex" => {
            let sub = one_text_arg("Text.rindex()", args)?;
            match text.rfind(sub) {
                Some(p) => Ok(Value::Int(p as i64)),
                None => Err(Flow::eval("Text.rindex(): substring not found")),
            }
        }

        // --- edit ---
        "strip" => {
            require_no_args("Text.strip()", args)?;
            Ok(Value::text(text.trim_matches(|c: char| c.is_ascii() && is_space_byte(c as u8))))
        }
        "lstrip" => {
            require_no_args("Text.lstrip()", args)?;
            Ok(Value::text(
                text.trim_start_matches(|c: char| c.is_ascii() && is_space_byte(c as u8)),
            ))
        }
        "rstrip" => {
            require_no_args("Text.rstrip()", args)?;
            Ok(Value::text(
                text.trim_end_matches(|c: char| c.is_ascii() && is_space_byte(c as u8)),
            ))
        }
        "replace" => match args {
            [Value::Text(old), Value::Text(new)] => {
                if old.is_empty() {
                    Ok(Value::text(text))
                } else {
                    Ok(Value::text(text.replace(old.as_ref(), new)))
                }
            }
            _ => Err(Flow::eval("Text.replace() requires exactly two Text arguments")),
        },
        "split" => {
            let delim = one_text_arg("Text.split()", args)?;
            let parts: Vec<String> = if delim.is_empty() {
                text.split_whitespace().map(str::to_owned).collect()
            } else {
                text.split(delim).map(str::to_owned).collect()
            };
            Ok(text_list(parts))
        }
        "rsplit" => {
            // Splitting all occurrences from the right yields the same parts
            // as split; kept as a distinct method for compatibility.
            let delim = one_text_arg("Text.rsplit()", args)?;
            let parts: Vec<String> = if delim.is_empty() {
                text.split_whitespace().map(str::to_owned).collect()
            } else {
                text.split(delim).map(str::to_owned).collect()
            };
            Ok(text_list(parts))
        }
        "splitlines" => {
            require_no_args("Text.splitlines()", args)?;
            Ok(text_list(text.lines().map(str::to_owned).collect()))
        }
        "center" => {
            let width = one_int_arg("Text.center()", args)?;
            let width = usize::try_from(width).unwrap_or(0);
            if width <= text.len() {
                return Ok(Value::text(text));
            }
            let padding = width - text.len();
            let left = padding / 2;
            let right = padding - left;
            Ok(Value::text(format!(
                "{}{}{}",
                " ".repeat(left),
                text,
                " ".repeat(right)
            )))
        }
        "ljust" => {
            let width = one_int_arg("Text.ljust()", args)?;
            let width = usize::try_from(width).unwrap_or(0);
            if width <= text.len() {
                return Ok(Value::text(text));
            }
            Ok(Value::text(format!("{}{}", text, " ".repeat(width - text.len()))))
        }
        "rjust" => {
            let width = one_int_arg("Text.rjust()", args)?;
            let width = usize::try_from(width).unwrap_or(0);
            if width <= text.len() {
                return Ok(Value::text(text));
            }
            Ok(Value::text(format!("{}{}", " ".repeat(width - text.len()), text)))
        }
        "zfill" => {
            let width = one_int_arg("Text.zfill()", args)?;
            let width = usize::try_from(width).unwrap_or(0);
            if width <= text.len() {
                return Ok(Value::text(text));
            }
            let (sign, digits) = match text.as_bytes().first() {
                Some(b'+' | b'-') => text.split_at(1),
                _ => ("", text),
            };
            let padding = width - text.len();
            Ok(Value::text(format!("{sign}{}{digits}", "0".repeat(padding))))
        }
        "join" => match args {
            [Value::List(list)] => {
                let joined = list
                    .values()
                    .iter()
                    .map(format_arg_string)
                    .collect::<Vec<_>>()
                    .join(text);
                Ok(Value::text(joined))
            }
            _ => Err(Flow::eval("Text.join() requires exactly one List argument")),
        },
        "partition" => {
            let sep = one_text_arg("Text.partition()", args)?;
            let parts = match text.find(sep) {
                Some(pos) => vec![
                    text[..pos].to_owned(),
                    sep.to_owned(),
                    text[pos + sep.len()..].to_owned(),
                ],
                None => vec![text.to_owned(), String::new(), String::new()],
            };
            Ok(text_list(parts))
        }
        "rpartition" => {
            let sep = one_text_arg("Text.rpartition()", args)?;
            let parts = match text.rfind(sep) {
                Some(pos) => vec![
                    text[..pos].to_owned(),
                    sep.to_owned(),
                    text[pos + sep.len()..].to_owned(),
                ],
                None => vec![String::new(), String::new(), text.to_owned()],
            };
            Ok(text_list(parts))
        }

        // --- templating ---
        "format" => {
            let mut result = text.to_owned();
            for (i, arg) in args.iter().enumerate() {
                let placeholder = format!("{{{i}}}");
                result = replace_all(&result, &placeholder, &format_arg_string(arg));
            }
            Ok(Value::text(result))
        }
        "formatMap" => match args {
            [Value::Map(map)] => {
                let mut result = text.to_owned();
                for key in map.keys() {
                    if let Value::Text(key_text) = &key {
                        let placeholder = format!("{{{key_text}}}");
                        let replacement = format_arg_string(&map.get(&key)?);
                        result = replace_all(&result, &placeholder, &replacement);
                    }
                }
                Ok(Value::text(result))
            }
            _ => Err(Flow::eval("Text.formatMap() requires exactly one Map argument")),
        },
        "makeTrans" => match args {
            [Value::Text(from), Value::Text(to)] => {
                let table = MapInstance::new("Text", "Text");
                for (f, t) in from.chars().zip(to.chars()) {
                    table.put(Value::text(f.to_string()), Value::text(t.to_string()));
                }
                Ok(Value::Map(Rc::new(table)))
            }
            _ => Err(Flow::eval("Text.makeTrans() requires exactly two Text arguments")),
        },
        "translate" => match args {
            [Value::Map(table)] => {
                let mut result = String::with_capacity(text.len());
                for c in text.chars() {
                    let key = Value::text(c.to_string());
                    if table.contains(&key) {
                        match table.get(&key)? {
                            Value::Text(replacement) if !replacement.is_empty() => {
                                result.push_str(&replacement);
                            }
                            _ => result.push(c),
                        }
                    } else {
                        result.push(c);
                    }
                }
                Ok(Value::text(result))
            }
            _ => Err(Flow::eval("Text.translate() requires exactly one Map argument")),
        },

        // --- parse ---
        "toInt" => {
            require_no_args("Text.toInt()", args)?;
            trim_parse_ws(text)
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| Flow::eval(format!("Cannot convert '{text}' to Int")))
        }
        "toLong" => {
            require_no_args("Text.toLong()", args)?;
            trim_parse_ws(text)
                .parse::<i128>()
                .map(Value::Long)
                .map_err(|_| Flow::eval(format!("Cannot convert '{text}' to Long")))
        }
        "toDouble" => {
            require_no_args("Text.toDouble()", args)?;
            let trimmed = trim_parse_ws(text);
            if trimmed.is_empty() {
                return Err(Flow::eval(format!("Cannot convert '{text}' to Double")));
            }
            trimmed
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| Flow::eval(format!("Cannot convert '{text}' to Double")))
        }
        "toFloat" => {
            require_no_args("Text.toFloat()", args)?;
            let trimmed = trim_parse_ws(text);
            if trimmed.is_empty() {
                return Err(Flow::eval(format!("Cannot convert '{text}' to Float")));
            }
            trimmed
                .parse::<f32>()
                .map(Value::Float)
                .map_err(|_| Flow::eval(format!("Cannot convert '{text}' to Float")))
        }
        "toBool" => {
            require_no_args("Text.toBool()", args)?;
            let lowered = trim_parse_ws(text).to_ascii_lowercase();
            match lowered.as_str() {
                "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "off" | "" => Ok(Value::Bool(false)),
                _ => Err(Flow::eval(format!(
                    "Cannot convert '{text}' to Bool. Expected: true/false, 1/0, yes/no, on/off"
                ))),
            }
        }

        _ => Err(Flow::eval(format!("Unknown method '{name}' on Text type"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(text: &str, name: &str, args: &[Value]) -> Value {
        call_text_method(text, name, args).unwrap()
    }

    #[test]
    fn case_methods() {
        assert_eq!(call("Hello", "upper", &[]).as_text().unwrap(), "HELLO");
        assert_eq!(call("Hello", "lower", &[]).as_text().unwrap(), "hello");
        assert_eq!(call("hELLO", "swapCase", &[]).as_text().unwrap(), "Hello");
        assert_eq!(call("hello world", "title", &[]).as_text().unwrap(), "Hello World");
        assert_eq!(call("hELLO wORLD", "capitalize", &[]).as_text().unwrap(), "Hello world");
    }

    #[test]
    fn strip_and_length() {
        let stripped = call("  abc  ", "strip", &[]);
        assert_eq!(stripped.as_text().unwrap(), "abc");
        assert!(matches!(call("abc", "length", &[]), Value::Int(3)));
    }

    #[test]
    fn count_is_non_overlapping_and_empty_sub_is_zero() {
        assert!(matches!(call("aaaa", "count", &[Value::text("aa")]), Value::Int(2)));
        assert!(matches!(call("abc", "count", &[Value::text("")]), Value::Int(0)));
    }

    #[test]
    fn find_family() {
        assert!(matches!(call("hello", "find", &[Value::text("ll")]), Value::Int(2)));
        assert!(matches!(call("hello", "find", &[Value::text("x")]), Value::Int(-1)));
        assert!(call_text_method("hello", "index", &[Value::text("x")]).is_err());
        assert!(matches!(call("abab", "rfind", &[Value::text("ab")]), Value::Int(2)));
    }

    #[test]
    fn split_join_round() {
        let parts = call("1,2,3", "split", &[Value::text(",")]);
        let Value::List(list) = &parts else { panic!("expected list") };
        assert_eq!(list.size(), 3);
        let joined = call("-", "join", &[parts.clone()]);
        assert_eq!(joined.as_text().unwrap(), "1-2-3");
    }

    #[test]
    fn split_with_empty_delimiter_tokenizes_whitespace() {
        let parts = call("  a  b\tc ", "split", &[Value::text("")]);
        let Value::List(list) = parts else { panic!("expected list") };
        assert_eq!(list.size(), 3);
    }

    #[test]
    fn zfill_preserves_sign() {
        assert_eq!(call("-42", "zfill", &[Value::Int(5)]).as_text().unwrap(), "-0042");
        assert_eq!(call("42", "zfill", &[Value::Int(4)]).as_text().unwrap(), "0042");
    }

    #[test]
    fn partition_returns_three_parts() {
        let parts = call("a=b", "partition", &[Value::text("=")]);
        let Value::List(list) = parts else { panic!("expected list") };
        let rendered: Vec<_> = list
            .values()
            .iter()
            .map(|v| v.as_text().unwrap().to_owned())
            .collect();
        assert_eq!(rendered, ["a", "=", "b"]);
    }

    #[test]
    fn predicates() {
        assert!(matches!(call("abc123", "isAlnum", &[]), Value::Bool(true)));
        assert!(matches!(call("", "isAlnum", &[]), Value::Bool(false)));
        assert!(matches!(call("", "isAscii", &[]), Value::Bool(true)));
        assert!(matches!(call("_name1", "isIdentifier", &[]), Value::Bool(true)));
        assert!(matches!(call("1name", "isIdentifier", &[]), Value::Bool(false)));
        assert!(matches!(call("abc", "isLower", &[]), Value::Bool(true)));
        assert!(matches!(call("123", "isLower", &[]), Value::Bool(false)));
        assert!(matches!(call("Hello World", "isTitle", &[]), Value::Bool(true)));
        assert!(matches!(call("-3.14", "isNumeric", &[]), Value::Bool(true)));
    }

    #[test]
    fn format_substitutes_positionally() {
        let out = call("{0} is {1}", "format", &[Value::text("x"), Value::Int(5)]);
        assert_eq!(out.as_text().unwrap(), "x is 5");
    }

    #[test]
    fn translate_via_make_trans() {
        let table = call("abc", "makeTrans", &[Value::text("abc"), Value::text("xyz")]);
        let out = call_text_method("aabbc", "translate", &[table]).unwrap();
        assert_eq!(out.as_text().unwrap(), "xxyyz");
    }

    #[test]
    fn numeric_parses() {
        assert!(matches!(call(" 42 ", "toInt", &[]), Value::Int(42)));
        assert!(matches!(call("42", "toLong", &[]), Value::Long(42)));
        assert!(call_text_method("", "toInt", &[]).is_err());
        assert!(call_text_method("4x2", "toInt", &[]).is_err());
        assert!(matches!(call("yes", "toBool", &[]), Value::Bool(true)));
        assert!(matches!(call("OFF", "toBool", &[]), Value::Bool(false)));
        assert!(call_text_method("maybe", "toBool", &[]).is_err());
    }
}
