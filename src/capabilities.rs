// パス: src/capabilities.rs
// 役割: ホストモジュール（fs / path / os / util）を遅延生成してキャッシュする表
// 意図: 未束縛の大域名と `require` の双方から同じモジュール実体を返す
// 関連ファイル: src/evaluator.rs, src/primitives.rs, lib/node.d.ts
//! ケイパビリティ表
//!
//! モジュール名 → 提供関数。初回参照時に一度だけ生成し、以後は同じオブジェクトを返す。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::evaluator::Interpreter;
use crate::primitives::format_values;
use crate::runtime::{inspect, to_display_string, JsObject, NativeFn, ObjKind, ObjRef, Unwind, Value};

/// モジュールオブジェクトを生成する関数。
pub type Provider = fn(&mut Interpreter) -> Value;

const PROVIDERS: &[(&str, Provider)] = &[
    ("fs", fs_module),
    ("path", path_module),
    ("os", os_module),
    ("util", util_module),
];

#[derive(Default)]
pub struct CapabilityTable {
    cache: HashMap<String, Value>,
}

impl CapabilityTable {
    pub fn provider(&self, name: &str) -> Option<Provider> {
        PROVIDERS.iter().find(|(n, _)| *n == name).map(|(_, p)| *p)
    }

    pub fn cached(&self, name: &str) -> Option<Value> {
        self.cache.get(name).cloned()
    }

    pub fn store(&mut self, name: &str, v: Value) {
        self.cache.insert(name.to_string(), v);
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.provider(name).is_some()
    }

    /// 提供可能なモジュール名の一覧。
    pub fn names() -> impl Iterator<Item = &'static str> {
        PROVIDERS.iter().map(|(n, _)| *n)
    }
}

/// Node と同じ表記のプラットフォーム名。
pub fn node_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

type Native = Result<Value, Unwind>;

fn module_object(interp: &Interpreter, methods: &[(&'static str, NativeFn)]) -> ObjRef {
    let obj = JsObject::new(Some(Rc::clone(&interp.realm.object_proto)), ObjKind::Ordinary);
    for (name, f) in methods {
        let v = interp.native_fn(*name, *f);
        obj.borrow_mut().props.set(*name, v);
    }
    obj
}

fn arg_string(args: &[Value], i: usize) -> String {
    args.get(i).map(to_display_string).unwrap_or_default()
}

// ---- fs ----

fn fs_module(interp: &mut Interpreter) -> Value {
    Value::Object(module_object(
        interp,
        &[
            ("readFileSync", fs_read_file_sync),
            ("writeFileSync", fs_write_file_sync),
            ("existsSync", fs_exists_sync),
            ("readdirSync", fs_readdir_sync),
        ],
    ))
}

fn io_error(interp: &Interpreter, e: &std::io::Error, op: &str, path: &str) -> Unwind {
    let code = match e.kind() {
        std::io::ErrorKind::NotFound => "ENOENT: no such file or directory",
        std::io::ErrorKind::PermissionDenied => "EACCES: permission denied",
        _ => "EIO: i/o error",
    };
    interp.throw_error("Error", &format!("{}, {} '{}'", code, op, path))
}

fn fs_read_file_sync(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let path = arg_string(args, 0);
    std::fs::read_to_string(&path)
        .map(Value::str)
        .map_err(|e| io_error(interp, &e, "open", &path))
}

fn fs_write_file_sync(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let path = arg_string(args, 0);
    let data = arg_string(args, 1);
    std::fs::write(&path, data)
        .map(|_| Value::Undefined)
        .map_err(|e| io_error(interp, &e, "open", &path))
}

fn fs_exists_sync(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    Ok(Value::Bool(Path::new(&arg_string(args, 0)).exists()))
}

fn fs_readdir_sync(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let path = arg_string(args, 0);
    let entries = std::fs::read_dir(&path).map_err(|e| io_error(interp, &e, "scandir", &path))?;
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(interp.new_array(names.into_iter().map(Value::str).collect()))
}

// ---- path ----

fn path_module(interp: &mut Interpreter) -> Value {
    let obj = module_object(
        interp,
        &[
            ("join", path_join),
            ("resolve", path_resolve),
            ("basename", path_basename),
            ("dirname", path_dirname),
            ("extname", path_extname),
        ],
    );
    obj.borrow_mut()
        .props
        .set("sep", Value::str(std::path::MAIN_SEPARATOR.to_string()));
    Value::Object(obj)
}

/// `.` と `..` を畳んだ正規形（POSIX 形式）。
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(p) if *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".into(),
        (false, false) => joined,
    }
}

fn path_join(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let joined: Vec<String> = args
        .iter()
        .map(to_display_string)
        .filter(|s| !s.is_empty())
        .collect();
    Ok(Value::str(normalize(&joined.join("/"))))
}

fn path_resolve(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let mut current = std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("/"))
        .to_string_lossy()
        .into_owned();
    for a in args {
        let seg = to_display_string(a);
        if seg.is_empty() {
            continue;
        }
        if seg.starts_with('/') {
            current = seg;
        } else {
            current = format!("{}/{}", current, seg);
        }
    }
    Ok(Value::str(normalize(&current)))
}

fn path_basename(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let path = arg_string(args, 0);
    let base = path.trim_end_matches('/').rsplit('/').next().unwrap_or("").to_string();
    let ext = arg_string(args, 1);
    let base = match base.strip_suffix(ext.as_str()) {
        Some(stripped) if !ext.is_empty() && !stripped.is_empty() => stripped.to_string(),
        _ => base,
    };
    Ok(Value::str(base))
}

fn path_dirname(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let path = arg_string(args, 0);
    let trimmed = path.trim_end_matches('/');
    let dir = match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(i) => trimmed[..i].to_string(),
        None if path.starts_with('/') => "/".to_string(),
        None => ".".to_string(),
    };
    Ok(Value::str(dir))
}

fn path_extname(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let path = arg_string(args, 0);
    let base = path.rsplit('/').next().unwrap_or("");
    let ext = match base.rfind('.') {
        Some(i) if i > 0 => &base[i..],
        _ => "",
    };
    Ok(Value::str(ext))
}

// ---- os ----

fn os_module(interp: &mut Interpreter) -> Value {
    let obj = module_object(
        interp,
        &[
            ("platform", os_platform),
            ("homedir", os_homedir),
            ("tmpdir", os_tmpdir),
        ],
    );
    obj.borrow_mut().props.set("EOL", Value::str("\n"));
    Value::Object(obj)
}

fn os_platform(_interp: &mut Interpreter, _this: Value, _args: &[Value]) -> Native {
    Ok(Value::str(node_platform()))
}

fn os_homedir(_interp: &mut Interpreter, _this: Value, _args: &[Value]) -> Native {
    Ok(Value::str(std::env::var("HOME").unwrap_or_default()))
}

fn os_tmpdir(_interp: &mut Interpreter, _this: Value, _args: &[Value]) -> Native {
    let tmp = std::env::temp_dir();
    Ok(Value::str(tmp.to_string_lossy().trim_end_matches('/')))
}

// ---- util ----

fn util_module(interp: &mut Interpreter) -> Value {
    Value::Object(module_object(
        interp,
        &[("inspect", util_inspect), ("format", util_format)],
    ))
}

fn util_inspect(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    Ok(Value::str(inspect(args.first().unwrap_or(&Value::Undefined))))
}

fn util_format(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    Ok(Value::str(format_values(args)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// パスの正規化。
    fn normalize_paths() {
        assert_eq!(normalize("a/./b/../c"), "a/c");
        assert_eq!(normalize("/x/../../y"), "/y");
        assert_eq!(normalize("../a"), "../a");
        assert_eq!(normalize(""), ".");
    }

    #[test]
    /// 未束縛の大域名はケイパビリティから補われ、同一オブジェクトが返る。
    fn global_lookup_binds_module() {
        let mut interp = Interpreter::new();
        let v = interp
            .run("path.join('a', 'b') + ':' + (require('path') === path) + ':' + path.extname('x.ts');")
            .unwrap();
        assert_eq!(inspect(&v), "'a/b:true:.ts'");
        assert!(interp.global().has_own("path"));
    }

    #[test]
    /// 同名の大域代入はケイパビリティを覆い隠す。
    fn assignment_shadows_capability() {
        let mut interp = Interpreter::new();
        let v = interp.run("os = 3; os + 1;").unwrap();
        assert_eq!(inspect(&v), "4");
    }

    #[test]
    /// fs は実ファイルを読み書きする。
    fn fs_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("note.txt");
        let path = file.to_string_lossy().replace('\\', "/");
        let mut interp = Interpreter::new();
        let src = format!(
            "var fs = require('fs'); fs.writeFileSync('{0}', 'hi'); [fs.existsSync('{0}'), fs.readFileSync('{0}', 'utf8')];",
            path
        );
        assert_eq!(inspect(&interp.run(&src).unwrap()), "[ true, 'hi' ]");
        let err = interp.run("require('fs').readFileSync('/no/such/file');").unwrap_err();
        assert!(err.to_string().contains("ENOENT"));
    }
}
