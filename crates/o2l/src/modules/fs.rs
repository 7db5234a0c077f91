use std::{
    fs,
    path::{Component, Path, PathBuf},
    rc::Rc,
};

use crate::{
    exception::Flow,
    modules::{require_arity, text_arg},
    object::ObjectInstance,
    types::ListInstance,
    value::Value,
};

/// The `fs` host object: text file I/O, directory operations and the
/// path helper suite.
pub(crate) fn create_fs_object() -> Rc<ObjectInstance> {
    let fs_object = Rc::new(ObjectInstance::new("fs"));

    fs_object.add_native("readText", true, |args, _ctx| {
        require_arity("readText()", args, 1)?;
        let path = text_arg("readText()", args, 0)?;
        if !Path::new(path).exists() {
            return Err(Flow::eval(format!("File does not exist: {path}")));
        }
        if !Path::new(path).is_file() {
            return Err(Flow::eval(format!("Path is not a regular file: {path}")));
        }
        fs::read_to_string(path)
            .map(Value::from)
            .map_err(|e| Flow::system(format!("Error reading file: {e}")))
    });

    fs_object.add_native("writeText", true, |args, _ctx| {
        require_arity("writeText()", args, 2)?;
        let path = text_arg("writeText()", args, 0)?;
        let content = text_arg("writeText()", args, 1)?;
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| Flow::system(format!("Error creating parent directory: {e}")))?;
            }
        }
        fs::write(path, content)
            .map_err(|e| Flow::system(format!("Error writing file: {e}")))?;
        Ok(Value::Bool(true))
    });

    fs_object.add_native("exists", true, |args, _ctx| {
        require_arity("exists()", args, 1)?;
        Ok(Value::Bool(Path::new(text_arg("exists()", args, 0)?).exists()))
    });

    fs_object.add_native("isFile", true, |args, _ctx| {
        require_arity("isFile()", args, 1)?;
        Ok(Value::Bool(Path::new(text_arg("isFile()", args, 0)?).is_file()))
    });

    fs_object.add_native("isDirectory", true, |args, _ctx| {
        require_arity("isDirectory()", args, 1)?;
        Ok(Value::Bool(Path::new(text_arg("isDirectory()", args, 0)?).is_dir()))
    });

    fs_object.add_native("listFiles", true, |args, _ctx| {
        require_arity("listFiles()", args, 1)?;
        let path = text_arg("listFiles()", args, 0)?;
        if !Path::new(path).exists() {
            return Err(Flow::eval(format!("Directory does not exist: {path}")));
        }
        if !Path::new(path).is_dir() {
            return Err(Flow::eval(format!("Path is not a directory: {path}")));
        }
        let mut names = Vec::new();
        let entries =
            fs::read_dir(path).map_err(|e| Flow::system(format!("Error listing directory: {e}")))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| Flow::system(format!("Error listing directory: {e}")))?;
            names.push(Value::text(entry.file_name().to_string_lossy().into_owned()));
        }
        Ok(Value::List(Rc::new(ListInstance::from_values("Text", names))))
    });

    fs_object.add_native("createDirectory", true, |args, _ctx| {
        require_arity("createDirectory()", args, 1)?;
        let path = text_arg("createDirectory()", args, 0)?;
        fs::create_dir_all(path)
            .map_err(|e| Flow::system(format!("Error creating directory: {e}")))?;
        Ok(Value::Bool(Path::new(path).exists()))
    });

    fs_object.add_native("deleteFile", true, |args, _ctx| {
        require_arity("deleteFile()", args, 1)?;
        let path = text_arg("deleteFile()", args, 0)?;
        if !Path::new(path).exists() {
            return Err(Flow::eval(format!("File does not exist: {path}")));
        }
        let removed = if Path::new(path).is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        removed.map_err(|e| Flow::system(format!("Error deleting file: {e}")))?;
        Ok(Value::Bool(true))
    });

    // --- path helpers (purely lexical unless noted) ---

    fs_object.add_native("basename", true, |args, _ctx| {
        require_arity("basename()", args, 1)?;
        let path = text_arg("basename()", args, 0)?;
        Ok(Value::text(
            Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        ))
    });

    fs_object.add_native("dirname", true, |args, _ctx| {
        require_arity("dirname()", args, 1)?;
        let path = text_arg("dirname()", args, 0)?;
        let parent = Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Value::text(if parent.is_empty() { ".".to_owned() } else { parent }))
    });

    fs_object.add_native("extname", true, |args, _ctx| {
        require_arity("extname()", args, 1)?;
        let path = text_arg("extname()", args, 0)?;
        let ext = Path::new(path)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        Ok(Value::text(ext))
    });

    fs_object.add_native("join", true, |args, _ctx| {
        if args.is_empty() {
            return Err(Flow::eval("join() requires at least one argument"));
        }
        let mut joined = PathBuf::new();
        for (i, _) in args.iter().enumerate() {
            joined.push(text_arg("join()", args, i)?);
        }
        Ok(Value::text(joined.to_string_lossy().into_owned()))
    });

    fs_object.add_native("normalize", true, |args, _ctx| {
        require_arity("normalize()", args, 1)?;
        let path = text_arg("normalize()", args, 0)?;
        Ok(Value::text(normalize_path(Path::new(path))))
    });

    fs_object.add_native("resolve", true, |args, _ctx| {
        require_arity("resolve()", args, 1)?;
        let path = text_arg("resolve()", args, 0)?;
        let absolute = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            std::env::current_dir()
                .map_err(|e| Flow::system(format!("Cannot determine current directory: {e}")))?
                .join(path)
        };
        Ok(Value::text(normalize_path(&absolute)))
    });

    fs_object.add_native("relative", true, |args, _ctx| {
        require_arity("relative()", args, 2)?;
        let from = text_arg("relative()", args, 0)?;
        let to = text_arg("relative()", args, 1)?;
        Ok(Value::text(relative_path(from, to)))
    });

    fs_object.add_native("isAbsolute", true, |args, _ctx| {
        require_arity("isAbsolute()", args, 1)?;
        Ok(Value::Bool(Path::new(text_arg("isAbsolute()", args, 0)?).is_absolute()))
    });

    fs_object.add_native("splitPath", true, |args, _ctx| {
        require_arity("splitPath()", args, 1)?;
        let path = text_arg("splitPath()", args, 0)?;
        let parts: Vec<Value> = Path::new(path)
            .components()
            .map(|c| Value::text(c.as_os_str().to_string_lossy().into_owned()))
            .collect();
        Ok(Value::List(Rc::new(ListInstance::from_values("Text", parts))))
    });

    fs_object.add_native("getParent", true, |args, _ctx| {
        require_arity("getParent()", args, 1)?;
        let path = text_arg("getParent()", args, 0)?;
        Ok(Value::text(
            Path::new(path)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        ))
    });

    fs_object.add_native("changeExtension", true, |args, _ctx| {
        require_arity("changeExtension()", args, 2)?;
        let path = text_arg("changeExtension()", args, 0)?;
        let ext = text_arg("changeExtension()", args, 1)?;
        let mut buf = PathBuf::from(path);
        buf.set_extension(ext.trim_start_matches('.'));
        Ok(Value::text(buf.to_string_lossy().into_owned()))
    });

    fs_object
}

/// Lexically resolves `.` and `..` components without touching the
/// filesystem.
fn normalize_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut prefix = String::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix = p.as_os_str().to_string_lossy().into_owned(),
            Component::RootDir => prefix.push_str("/"),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.last().is_some_and(|p| p != "..") {
                    parts.pop();
                } else if prefix.is_empty() {
                    parts.push("..".to_owned());
                }
            }
            Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
        }
    }
    let joined = parts.join("/");
    let result = format!("{prefix}{joined}");
    if result.is_empty() {
        ".".to_owned()
    } else {
        result
    }
}

/// Lexical relative path from `from` to `to`.
fn relative_path(from: &str, to: &str) -> String {
    let from_norm = normalize_path(Path::new(from));
    let to_norm = normalize_path(Path::new(to));
    let from_parts: Vec<&str> = from_norm.split('/').filter(|p| !p.is_empty()).collect();
    let to_parts: Vec<&str> = to_norm.split('/').filter(|p| !p.is_empty()).collect();

    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in common..from_parts.len() {
        parts.push("..".to_owned());
    }
    for part in &to_parts[common..] {
        parts.push((*part).to_owned());
    }
    if parts.is_empty() {
        ".".to_owned()
    } else {
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_resolves_dots() {
        assert_eq!(normalize_path(Path::new("a/b/../c/./d")), "a/c/d");
        assert_eq!(normalize_path(Path::new("/a/../../b")), "/b");
        assert_eq!(normalize_path(Path::new("./")), ".");
    }

    #[test]
    fn relative_walks_up_and_down() {
        assert_eq!(relative_path("/a/b/c", "/a/d"), "../../d");
        assert_eq!(relative_path("/a/b", "/a/b"), ".");
    }
}
