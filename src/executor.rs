// パス: src/executor.rs
// 役割: 事前コンパイルモード（.ts 群を一時ディレクトリへ出力し、子プロセスで実行）と `--exec` の実行
// 意図: 対話モードと同じ検査器・変換器・評価器でファイル単位の実行を提供する
// 関連ファイル: src/bin/tsun.rs, src/config.rs, src/codegen/mod.rs, src/evaluator.rs
//! 事前コンパイル実行
//!
//! 1. 全ての `.ts` を解析し、組み込み宣言ファイルと一緒に型検査する。
//! 2. 診断が 1 件でもあれば `<file> (<line>,<col>): <message>` を並べて中止する。
//! 3. `.d.ts` 以外を `.js` へ変換して `tempdir/<out>` へ書き出す。
//! 4. 自身を `--exec <entry.js>` で起動し、その終了コードを返す。

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::ast::Program;
use crate::checker::{check_units, SourceUnit};
use crate::codegen::emit_program;
use crate::config::CompilerOptions;
use crate::evaluator::Interpreter;
use crate::parser::parse_program;
use crate::runtime::{describe_thrown, RuntimeFailure};
use crate::session::{builtin_typings, parse_ambient, typings_in};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("cannot create temporary directory: {0}")]
    TempDir(#[source] std::io::Error),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}", .0.join("\n"))]
    Diagnostics(Vec<String>),
    #[error("cannot start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    /// 利用者へ見せる行。
    pub fn lines(&self) -> Vec<String> {
        match self {
            RunError::Diagnostics(lines) => lines.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// 1 回分のコンパイル結果。
#[derive(Debug)]
pub struct Compiled {
    /// 出力先のルート（`tempdir` か `tempdir/<out>`）。
    pub out_dir: PathBuf,
    /// 入力 `.ts` と出力 `.js` の対応（`.d.ts` は含まない）。
    pub outputs: Vec<(String, PathBuf)>,
}

impl Compiled {
    /// 入力パスを出力パスへ写す。対応が無ければそのまま返す。
    pub fn map_arg(&self, arg: &str) -> String {
        self.outputs
            .iter()
            .find(|(src, _)| src == arg)
            .map(|(_, js)| js.to_string_lossy().into_owned())
            .unwrap_or_else(|| arg.to_string())
    }
}

/// `foo/bar.ts` → `<out_dir>/foo/bar.js`。絶対パスはファイル名だけを使う。
pub fn output_path(out_dir: &Path, source: &str) -> PathBuf {
    let rel = Path::new(source);
    let rel = if rel.is_absolute() {
        rel.file_name().map(PathBuf::from).unwrap_or_default()
    } else {
        rel.components()
            .filter(|c| matches!(c, std::path::Component::Normal(_)))
            .collect()
    };
    out_dir.join(rel).with_extension("js")
}

fn read_source(path: &str) -> Result<String, RunError> {
    std::fs::read_to_string(path).map_err(|source| RunError::Io {
        path: PathBuf::from(path),
        source,
    })
}

fn format_diag(file: &str, line: Option<usize>, col: Option<usize>, msg: &str) -> String {
    format!("{} ({},{}): {}", file, line.unwrap_or(1), col.unwrap_or(1), msg)
}

/// `sources` を検査・変換して `out_dir` へ書き出す。
pub fn compile_into(
    sources: &[String],
    out_dir: &Path,
    options: &CompilerOptions,
    autoref: bool,
) -> Result<Compiled, RunError> {
    let mut typings = builtin_typings();
    if autoref {
        typings.extend(typings_in(Path::new("typings")));
    }
    let mut ambient: Vec<(String, Program)> = Vec::new();
    let mut diags = Vec::new();
    for file in &typings {
        match parse_ambient(file) {
            Ok(p) => ambient.push((file.name.clone(), p)),
            Err(e) => diags.push(format_diag(&file.name, e.0.line, e.0.col, &e.0.msg)),
        }
    }

    let mut programs: Vec<(String, Program)> = Vec::new();
    for src in sources {
        let text = read_source(src)?;
        log::info!("parsing {}", src);
        match parse_program(&text) {
            Ok(p) => programs.push((src.clone(), p)),
            Err(e) => diags.push(format_diag(src, e.0.line, e.0.col, &e.0.msg)),
        }
    }
    if !diags.is_empty() {
        return Err(RunError::Diagnostics(diags));
    }

    let units: Vec<SourceUnit<'_>> = ambient
        .iter()
        .chain(programs.iter())
        .map(|(file, program)| SourceUnit { file, program })
        .collect();
    let checked = check_units(&units, options.check_options());
    for (file, _) in &programs {
        for d in checked.diagnostics_for(file) {
            let e = &d.error.0;
            diags.push(format_diag(file, e.line, e.col, &e.msg));
        }
    }
    if options.no_emit_on_error && !diags.is_empty() {
        return Err(RunError::Diagnostics(diags));
    }

    let emit = options.emit_options();
    let mut outputs = Vec::new();
    for (file, program) in &programs {
        if file.ends_with(".d.ts") {
            continue;
        }
        let js = emit_program(program, &emit).map_err(|e| {
            let span = e.span();
            RunError::Diagnostics(vec![format_diag(file, Some(span.line), Some(span.col), &e.to_string())])
        })?;
        let target = output_path(out_dir, file);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|source| RunError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&target, js).map_err(|source| RunError::Io {
            path: target.clone(),
            source,
        })?;
        log::info!("emitted {} -> {}", file, target.display());
        outputs.push((file.clone(), target));
    }
    Ok(Compiled {
        out_dir: out_dir.to_path_buf(),
        outputs,
    })
}

/// カレントディレクトリの `node_modules` と `typings` を一時ルートへリンクする。
#[cfg(unix)]
fn link_shared_dirs(root: &Path) {
    for name in ["node_modules", "typings"] {
        let src = Path::new(name);
        if !src.is_dir() {
            continue;
        }
        let Ok(abs) = src.canonicalize() else { continue };
        if let Err(e) = std::os::unix::fs::symlink(&abs, root.join(name)) {
            log::warn!("cannot link {}: {}", name, e);
        }
    }
}

#[cfg(not(unix))]
fn link_shared_dirs(_root: &Path) {}

/// 事前コンパイルして子プロセスで実行し、その終了コードを返す。
pub fn compile_and_run(
    entry: &str,
    sources: &[String],
    args: &[String],
    out: Option<&Path>,
    options: &CompilerOptions,
    autoref: bool,
) -> Result<i32, RunError> {
    let tmp = tempfile::Builder::new()
        .prefix("tsrun")
        .tempdir()
        .map_err(RunError::TempDir)?;
    link_shared_dirs(tmp.path());
    let out_dir = match out {
        Some(o) => tmp.path().join(o),
        None => tmp.path().to_path_buf(),
    };
    let compiled = compile_into(sources, &out_dir, options, autoref)?;
    let script = output_path(&out_dir, entry);
    let mapped: Vec<String> = args.iter().map(|a| compiled.map_arg(a)).collect();

    let program = std::env::current_exe().map_err(|source| RunError::Spawn {
        program: PathBuf::from("tsun"),
        source,
    })?;
    log::info!("running {} {:?}", script.display(), mapped);
    let status = Command::new(&program)
        .arg("--exec")
        .arg(&script)
        .args(&mapped)
        .status()
        .map_err(|source| RunError::Spawn {
            program: program.clone(),
            source,
        })?;
    Ok(status.code().unwrap_or(1))
}

/// 出力済みスクリプトをモジュールとして実行する（`--exec`）。戻り値は終了コード。
pub fn exec_script(script: &Path, args: &[String]) -> i32 {
    let mut interp = Interpreter::new();
    let mut argv = vec!["tsun".to_string(), script.to_string_lossy().into_owned()];
    argv.extend(args.iter().cloned());
    interp.set_argv(argv);
    match interp.run_module(script) {
        Ok(_) => 0,
        Err(RuntimeFailure::Exit(code)) => code,
        Err(RuntimeFailure::Throw(v)) => {
            eprintln!("{}", describe_thrown(&v));
            1
        }
        Err(e @ RuntimeFailure::Syntax(_)) => {
            eprintln!("{}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 出力先は相対構造を保ち、拡張子だけ変わる。
    fn output_paths_mirror_sources() {
        let out = Path::new("/tmp/tsrun1/out");
        assert_eq!(output_path(out, "main.ts"), PathBuf::from("/tmp/tsrun1/out/main.js"));
        assert_eq!(output_path(out, "./lib/util.ts"), PathBuf::from("/tmp/tsrun1/out/lib/util.js"));
        assert_eq!(output_path(out, "/abs/x.ts"), PathBuf::from("/tmp/tsrun1/out/x.js"));
    }

    #[test]
    /// 診断の書式は `<file> (<line>,<col>): <message>`。
    fn diagnostic_format() {
        assert_eq!(format_diag("a.ts", Some(3), Some(7), "oops"), "a.ts (3,7): oops");
        let err = RunError::Diagnostics(vec!["x".into(), "y".into()]);
        assert_eq!(err.to_string(), "x\ny");
        assert_eq!(err.lines().len(), 2);
    }
}
