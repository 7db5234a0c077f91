use std::io::{self, Write as _};

use crate::value::{value_to_object_string, value_to_string, Value};

/// Trait for handling output from the `io.print` host method.
///
/// Implement this to capture or redirect interpreter output. The default
/// implementation [`StdPrint`] writes to stdout.
pub trait PrintWriter {
    /// Writes one already-formatted line, without the trailing newline.
    fn write_line(&mut self, line: &str);
}

/// Default `PrintWriter` that writes to stdout, flushing per line.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write_line(&mut self, line: &str) {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        let _ = lock.write_all(line.as_bytes());
        let _ = lock.write_all(b"\n");
        let _ = lock.flush();
    }
}

/// A `PrintWriter` that collects all output into a string, one line per
/// `write_line` call. Used by tests and embedders.
#[derive(Debug, Default)]
pub struct CollectPrint(String);

impl CollectPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn output(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectPrint {
    fn write_line(&mut self, line: &str) {
        self.0.push_str(line);
        self.0.push('\n');
    }
}

/// Applies the `io.print` format directives to `format`, consuming
/// arguments left to right.
///
/// Supported directives: `%%`, `%s`, `%d`, `%l`, `%f` with optional
/// `.N` precision, `%o`. Unknown specifiers pass through unchanged, as do
/// trailing directives once the arguments run out.
#[must_use]
pub fn format_directives(format: &str, args: &[Value]) -> String {
    let bytes = format.as_bytes();
    let mut result = String::with_capacity(format.len());
    let mut arg_index = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' || i + 1 >= bytes.len() {
            result.push(bytes[i] as char);
            i += 1;
            continue;
        }
        if bytes[i + 1] == b'%' {
            result.push('%');
            i += 2;
            continue;
        }
        if arg_index >= args.len() {
            // No more arguments: the directive passes through literally.
            result.push(bytes[i] as char);
            i += 1;
            continue;
        }

        let directive_start = i;
        i += 1;

        // Optional precision, e.g. the `.2` in `%.2f`.
        let mut precision: Option<usize> = None;
        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            let digits_start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > digits_start {
                precision = format[digits_start..i].parse().ok();
            }
        }

        let Some(&spec) = bytes.get(i) else {
            // Incomplete specifier at end of string.
            result.push_str(&format[directive_start..]);
            break;
        };

        let arg = &args[arg_index];
        let replacement = match spec {
            b's' => value_to_string(arg),
            b'd' => match arg {
                Value::Int(v) => v.to_string(),
                Value::Long(v) => v.to_string(),
                _ => "[non-integer]".to_owned(),
            },
            b'l' => match arg {
                Value::Long(v) => v.to_string(),
                Value::Int(v) => i128::from(*v).to_string(),
                _ => "[non-long]".to_owned(),
            },
            b'f' => {
                let numeric = match arg {
                    Value::Float(v) => Some(f64::from(*v)),
                    Value::Double(v) => Some(*v),
                    Value::Int(v) => Some(*v as f64),
                    _ => None,
                };
                match numeric {
                    Some(v) => match precision {
                        Some(p) => format!("{v:.p$}"),
                        None => v.to_string(),
                    },
                    None => "[non-numeric]".to_owned(),
                }
            }
            b'o' => value_to_object_string(arg),
            _ => {
                // Unknown specifier: keep the whole directive as-is and do
                // not consume the argument.
                result.push_str(&format[directive_start..=i]);
                i += 1;
                continue;
            }
        };

        result.push_str(&replacement);
        arg_index += 1;
        i += 1;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_directives() {
        let out = format_directives("%s=%d", &[Value::text("x"), Value::Int(5)]);
        assert_eq!(out, "x=5");
    }

    #[test]
    fn fixed_precision_float() {
        let out = format_directives("%.2f", &[Value::Double(3.14159)]);
        assert_eq!(out, "3.14");
    }

    #[test]
    fn percent_escape_and_unknown_specifier() {
        assert_eq!(format_directives("100%%", &[]), "100%");
        let out = format_directives("%q", &[Value::Int(1)]);
        assert_eq!(out, "%q");
    }

    #[test]
    fn trailing_directives_pass_through_without_args() {
        assert_eq!(format_directives("a=%d b=%d", &[Value::Int(1)]), "a=1 b=%d");
    }

    #[test]
    fn integer_directive_rejects_non_integers() {
        let out = format_directives("%d", &[Value::text("nope")]);
        assert_eq!(out, "[non-integer]");
    }
}
