use std::{
    env,
    process::{Command, Stdio},
    rc::Rc,
    time::{Duration, Instant},
};

use crate::{
    exception::{EvalResult, Flow},
    modules::{int_arg, require_arity, text_arg},
    object::ObjectInstance,
    types::{ListInstance, MapInstance},
    value::Value,
};

/// The `os` host object: environment, process args, system introspection
/// and command execution.
pub(crate) fn create_os_object() -> Rc<ObjectInstance> {
    let os = Rc::new(ObjectInstance::new("os"));

    os.add_native("getEnv", true, |args, _ctx| {
        if args.is_empty() {
            return Err(Flow::eval(
                "getEnv() requires one argument: the environment variable name",
            ));
        }
        let name = text_arg("getEnv()", args, 0)?;
        Ok(Value::text(env::var(name).unwrap_or_default()))
    });

    os.add_native("args", true, |args, ctx| {
        require_arity("args()", args, 0)?;
        Ok(ctx
            .lookup("__program_args__")
            .unwrap_or_else(|| Value::List(Rc::new(ListInstance::new("Text")))))
    });

    os.add_native("argc", true, |args, ctx| {
        require_arity("argc()", args, 0)?;
        match ctx.lookup("__program_args__") {
            Some(Value::List(list)) => Ok(Value::Int(list.size() as i64)),
            _ => Ok(Value::Int(0)),
        }
    });

    os.add_native("getOSName", true, |args, _ctx| {
        require_arity("getOSName()", args, 0)?;
        Ok(Value::text(env::consts::OS))
    });

    os.add_native("getOSVersion", true, |args, _ctx| {
        require_arity("getOSVersion()", args, 0)?;
        Ok(Value::text(read_proc_line("/proc/sys/kernel/osrelease").unwrap_or_else(|| "unknown".to_owned())))
    });

    os.add_native("getArchitecture", true, |args, _ctx| {
        require_arity("getArchitecture()", args, 0)?;
        Ok(Value::text(env::consts::ARCH))
    });

    os.add_native("getHostname", true, |args, _ctx| {
        require_arity("getHostname()", args, 0)?;
        let hostname = env::var("HOSTNAME")
            .ok()
            .or_else(|| read_proc_line("/etc/hostname"))
            .unwrap_or_else(|| "unknown".to_owned());
        Ok(Value::text(hostname))
    });

    os.add_native("getUsername", true, |args, _ctx| {
        require_arity("getUsername()", args, 0)?;
        let user = env::var("USER")
            .or_else(|_| env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_owned());
        Ok(Value::text(user))
    });

    os.add_native("getCurrentDir", true, |args, _ctx| {
        require_arity("getCurrentDir()", args, 0)?;
        let dir = env::current_dir()
            .map_err(|e| Flow::system(format!("Cannot determine current directory: {e}")))?;
        Ok(Value::text(dir.to_string_lossy().into_owned()))
    });

    os.add_native("getProcessId", true, |args, _ctx| {
        require_arity("getProcessId()", args, 0)?;
        Ok(Value::Int(i64::from(std::process::id())))
    });

    os.add_native("getParentProcessId", true, |args, _ctx| {
        require_arity("getParentProcessId()", args, 0)?;
        Ok(Value::Int(parent_process_id()))
    });

    os.add_native("getUptime", true, |args, _ctx| {
        require_arity("getUptime()", args, 0)?;
        Ok(Value::Double(system_uptime_seconds()))
    });

    os.add_native("getTotalMemory", true, |args, _ctx| {
        require_arity("getTotalMemory()", args, 0)?;
        Ok(Value::Long(meminfo_bytes("MemTotal:")))
    });

    os.add_native("getAvailableMemory", true, |args, _ctx| {
        require_arity("getAvailableMemory()", args, 0)?;
        Ok(Value::Long(meminfo_bytes("MemAvailable:")))
    });

    os.add_native("getUsedMemory", true, |args, _ctx| {
        require_arity("getUsedMemory()", args, 0)?;
        let total = meminfo_bytes("MemTotal:");
        let available = meminfo_bytes("MemAvailable:");
        Ok(Value::Long((total - available).max(0)))
    });

    os.add_native("getMemoryUsage", true, |args, _ctx| {
        require_arity("getMemoryUsage()", args, 0)?;
        let total = meminfo_bytes("MemTotal:");
        if total == 0 {
            return Ok(Value::Double(0.0));
        }
        let used = (total - meminfo_bytes("MemAvailable:")).max(0);
        Ok(Value::Double(used as f64 / total as f64 * 100.0))
    });

    os.add_native("getCPUCount", true, |args, _ctx| {
        require_arity("getCPUCount()", args, 0)?;
        let count = std::thread::available_parallelism().map_or(1, |n| n.get());
        Ok(Value::Int(count as i64))
    });

    os.add_native("getCPUModel", true, |args, _ctx| {
        require_arity("getCPUModel()", args, 0)?;
        Ok(Value::text(cpu_model()))
    });

    os.add_native("getCPUUsage", true, |args, _ctx| {
        require_arity("getCPUUsage()", args, 0)?;
        // Instantaneous usage needs two samples; a single blocking probe
        // is not worth the latency, so report the 1-minute load instead.
        Ok(Value::Double(load_average().first().copied().unwrap_or(0.0)))
    });

    os.add_native("getLoadAverage", true, |args, _ctx| {
        require_arity("getLoadAverage()", args, 0)?;
        let values = load_average().into_iter().map(Value::Double).collect();
        Ok(Value::List(Rc::new(ListInstance::from_values("Double", values))))
    });

    os.add_native("execute", true, |args, _ctx| {
        require_arity("execute()", args, 1)?;
        let command = text_arg("execute()", args, 0)?;
        let status = shell(command)
            .status()
            .map_err(|e| Flow::system(format!("Failed to execute command: {e}")))?;
        Ok(Value::Int(i64::from(status.code().unwrap_or(-1))))
    });

    os.add_native("executeWithOutput", true, |args, _ctx| {
        require_arity("executeWithOutput()", args, 1)?;
        let command = text_arg("executeWithOutput()", args, 0)?;
        let output = shell(command)
            .output()
            .map_err(|e| Flow::system(format!("Failed to execute command: {e}")))?;
        let result = execution_map(
            output.status.code().unwrap_or(-1),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        );
        Ok(result)
    });

    os.add_native("executeWithTimeout", true, |args, _ctx| {
        require_arity("executeWithTimeout()", args, 2)?;
        let command = text_arg("executeWithTimeout()", args, 0)?;
        let seconds = int_arg("executeWithTimeout()", args, 1)?;
        if seconds < 0 {
            return Err(Flow::eval("executeWithTimeout() timeout cannot be negative"));
        }
        execute_with_timeout(command, Duration::from_secs(seconds as u64))
    });

    os.add_native("executeAsync", true, |args, _ctx| {
        require_arity("executeAsync()", args, 1)?;
        let command = text_arg("executeAsync()", args, 0)?;
        let child = shell(command)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Flow::system(format!("Failed to spawn command: {e}")))?;
        Ok(Value::Int(i64::from(child.id())))
    });

    os
}

fn shell(command: &str) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C");
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c");
        c
    };
    cmd.arg(command);
    cmd
}

fn execution_map(exit_code: i32, stdout: &str, stderr: &str) -> Value {
    let map = MapInstance::new("Text", "Value");
    map.put(Value::text("exitCode"), Value::Int(i64::from(exit_code)));
    map.put(Value::text("stdout"), Value::text(stdout));
    map.put(Value::text("stderr"), Value::text(stderr));
    map.put(Value::text("success"), Value::Bool(exit_code == 0));
    Value::Map(Rc::new(map))
}

fn execute_with_timeout(command: &str, timeout: Duration) -> EvalResult<Value> {
    let mut child = shell(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Flow::system(format!("Failed to spawn command: {e}")))?;

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code().unwrap_or(-1),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    timed_out = true;
                    break -1;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return Err(Flow::system(format!("Failed to wait for command: {e}"))),
        }
    };

    let mut stdout = String::new();
    let mut stderr = String::new();
    if !timed_out {
        use std::io::Read as _;
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_string(&mut stdout);
        }
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr);
        }
    }

    let result = execution_map(exit_code, &stdout, &stderr);
    if let Value::Map(map) = &result {
        map.put(Value::text("timedOut"), Value::Bool(timed_out));
    }
    Ok(result)
}

// --- /proc probes with portable fallbacks ---

fn read_proc_line(path: &str) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

fn parent_process_id() -> i64 {
    let Some(status) = std::fs::read_to_string("/proc/self/status").ok() else {
        return 0;
    };
    status
        .lines()
        .find_map(|line| line.strip_prefix("PPid:"))
        .and_then(|rest| rest.trim().parse().ok())
        .unwrap_or(0)
}

fn system_uptime_seconds() -> f64 {
    read_proc_line("/proc/uptime")
        .and_then(|line| line.split_whitespace().next().map(str::to_owned))
        .and_then(|first| first.parse().ok())
        .unwrap_or(0.0)
}

fn meminfo_bytes(key: &str) -> i128 {
    let Some(meminfo) = std::fs::read_to_string("/proc/meminfo").ok() else {
        return 0;
    };
    meminfo
        .lines()
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.trim().split_whitespace().next().map(str::to_owned))
        .and_then(|kb| kb.parse::<i128>().ok())
        .map_or(0, |kb| kb * 1024)
}

fn cpu_model() -> String {
    std::fs::read_to_string("/proc/cpuinfo")
        .ok()
        .and_then(|info| {
            info.lines()
                .find(|line| line.starts_with("model name"))
                .and_then(|line| line.split(':').nth(1))
                .map(|model| model.trim().to_owned())
        })
        .unwrap_or_else(|| "unknown".to_owned())
}

fn load_average() -> Vec<f64> {
    read_proc_line("/proc/loadavg")
        .map(|line| {
            line.split_whitespace()
                .take(3)
                .filter_map(|v| v.parse().ok())
                .collect()
        })
        .unwrap_or_else(|| vec![0.0, 0.0, 0.0])
}
