use std::process::ExitCode;

use o2l::{LaunchError, Runner, Value};

const USAGE: &str = "\
Usage: o2l [run] <file.obq> [args...]

Options:
  --ffi        enable the ffi module (also: O2L_FFI=1)
  -h, --help   show this help
";

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let mut ffi_enabled = std::env::var("O2L_FFI").is_ok_and(|v| v == "1");
    let mut script: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            "--ffi" => ffi_enabled = true,
            "run" if script.is_none() => {}
            _ => {
                script = Some(arg);
                break;
            }
        }
    }

    let Some(path) = script else {
        eprint!("{USAGE}");
        return ExitCode::from(2);
    };
    let program_args: Vec<String> = args.collect();

    let source = match std::fs::read_to_string(&path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}", LaunchError::Io { path, source: e });
            return ExitCode::from(2);
        }
    };

    let runner = match Runner::new(&source, &path) {
        Ok(runner) => runner.with_ffi(ffi_enabled),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    match runner.run(program_args) {
        Ok(Value::Int(code)) => ExitCode::from((code & 0xFF) as u8),
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_uncaught());
            ExitCode::FAILURE
        }
    }
}
