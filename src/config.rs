// パス: src/config.rs
// 役割: コマンドライン引数・tsconfig.json・強制上書きを合成して実行設定を作る
// 意図: 対話モードと事前コンパイルモードが同じ解決済みオプションを使うようにする
// 関連ファイル: src/bin/tsun.rs, src/executor.rs, src/session/mod.rs
//! 設定
//!
//! - `CliOptions`: clap の derive で定義した引数。
//! - `ProjectConfig`: カレントディレクトリの `tsconfig.json`（`compilerOptions` のみ読む）。
//! - `CompilerOptions`: 上の 2 つに強制上書き（ES5・CommonJS・LF）を適用した結果。

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use crate::checker::CheckOptions;
use crate::codegen::EmitOptions;
use crate::repl::ReplOptions;
use crate::session::Heuristic;

pub use crate::session::SessionConfig;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "tsun")]
#[command(about = "TSUN: a TypeScript Upgraded Node (REPL and runner)", long_about = None)]
pub struct CliOptions {
    /// Run code even if it has type errors
    #[arg(short, long)]
    pub force: bool,

    /// Print the emitted script before running it
    #[arg(short, long)]
    pub verbose: bool,

    /// Output directory for compiled files (ahead-of-time mode)
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Tsundere prompts
    #[arg(long)]
    pub dere: bool,

    /// Reference every ./typings/*.d.ts automatically
    #[arg(short = 'a', long)]
    pub autoref: bool,

    /// How new output is detected after each input (diff, linecount)
    #[arg(
        long,
        value_name = "MODE",
        value_enum,
        ignore_case = true,
        default_value_t = Heuristic::Diff
    )]
    pub heuristic: Heuristic,

    /// Emit helper definitions such as __extends into the output
    #[arg(long)]
    pub emit_helpers: bool,

    /// Run an emitted script file
    #[arg(long, hide = true, value_name = "FILE")]
    pub exec: Option<PathBuf>,

    /// Source files followed by arguments for the program
    #[arg(value_name = "FILES", trailing_var_arg = true, allow_hyphen_values = true)]
    pub files: Vec<String>,
}

/// 起動モード。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Interactive,
    /// `--exec file.js args...`
    Exec { script: PathBuf, args: Vec<String> },
    /// 最初の `.ts` を入口として、全 `.ts` を事前コンパイルして実行する。
    Compile {
        entry: String,
        sources: Vec<String>,
        args: Vec<String>,
    },
}

impl CliOptions {
    pub fn mode(&self) -> Mode {
        if let Some(script) = &self.exec {
            return Mode::Exec {
                script: script.clone(),
                args: self.files.clone(),
            };
        }
        let sources: Vec<String> = self
            .files
            .iter()
            .filter(|f| f.ends_with(".ts"))
            .cloned()
            .collect();
        let Some(entry) = sources.iter().find(|f| !f.ends_with(".d.ts")).cloned() else {
            return Mode::Interactive;
        };
        let mut args = self.files.clone();
        if let Some(i) = args.iter().position(|f| *f == entry) {
            args.remove(i);
        }
        Mode::Compile {
            entry,
            sources,
            args,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: invalid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// `tsconfig.json` の内容。未知のキーは無視する。
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub compiler_options: RawCompilerOptions,
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawCompilerOptions {
    pub target: Option<String>,
    pub module: Option<String>,
    pub no_implicit_any: Option<bool>,
    pub no_implicit_returns: Option<bool>,
    pub no_emit_helpers: Option<bool>,
    pub new_line: Option<String>,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `dir/tsconfig.json` を読む。無い・壊れている場合は既定値へ黙って戻る。
    pub fn load_or_default(dir: &Path) -> Self {
        let path = dir.join("tsconfig.json");
        match Self::load(&path) {
            Ok(cfg) => {
                log::debug!("loaded {}", path.display());
                cfg
            }
            Err(e) => {
                log::debug!("using default compiler options: {}", e);
                Self::default()
            }
        }
    }
}

/// 強制上書きを適用済みのコンパイラ設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    pub target: String,
    pub module: String,
    pub new_line: String,
    pub no_implicit_any: bool,
    pub no_implicit_returns: bool,
    pub no_emit_helpers: bool,
    pub no_emit_on_error: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self::resolve(&ProjectConfig::default(), false)
    }
}

impl CompilerOptions {
    pub fn resolve(project: &ProjectConfig, emit_helpers: bool) -> Self {
        let raw = &project.compiler_options;
        let forced = [
            ("target", raw.target.as_deref(), "es5"),
            ("module", raw.module.as_deref(), "commonjs"),
            ("newLine", raw.new_line.as_deref(), "lf"),
        ];
        for (key, given, value) in forced {
            if let Some(given) = given.filter(|g| !g.eq_ignore_ascii_case(value)) {
                log::debug!("compilerOptions.{} = {} overridden with {}", key, given, value);
            }
        }
        Self {
            target: "es5".into(),
            module: "commonjs".into(),
            new_line: "lf".into(),
            no_implicit_any: raw.no_implicit_any.unwrap_or(false),
            no_implicit_returns: raw.no_implicit_returns.unwrap_or(false),
            no_emit_helpers: !emit_helpers,
            no_emit_on_error: true,
        }
    }

    pub fn check_options(&self) -> CheckOptions {
        CheckOptions {
            no_implicit_any: self.no_implicit_any,
            no_implicit_returns: self.no_implicit_returns,
        }
    }

    pub fn emit_options(&self) -> EmitOptions {
        EmitOptions {
            emit_helpers: !self.no_emit_helpers,
            all_helpers: false,
        }
    }
}

/// 対話セッションの設定を組み立てる。
pub fn session_config(cli: &CliOptions, compiler: &CompilerOptions) -> SessionConfig {
    SessionConfig {
        heuristic: cli.heuristic,
        emit_helpers: !compiler.no_emit_helpers,
        auto_reference_typings: cli.autoref,
        typings_dir: PathBuf::from("typings"),
        check: compiler.check_options(),
    }
}

/// 対話モードの設定を組み立てる。
pub fn repl_options(cli: &CliOptions, compiler: &CompilerOptions) -> ReplOptions {
    ReplOptions {
        force: cli.force,
        verbose: cli.verbose,
        dere: cli.dere,
        session: session_config(cli, compiler),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliOptions {
        let mut full = vec!["tsun"];
        full.extend_from_slice(args);
        CliOptions::try_parse_from(full).unwrap()
    }

    #[test]
    /// 位置引数の有無と拡張子で起動モードが決まる。
    fn modes_from_positionals() {
        assert_eq!(cli(&[]).mode(), Mode::Interactive);
        assert_eq!(cli(&["notes.txt"]).mode(), Mode::Interactive);
        assert_eq!(
            cli(&["-v", "main.ts", "lib.ts", "--port", "80"]).mode(),
            Mode::Compile {
                entry: "main.ts".into(),
                sources: vec!["main.ts".into(), "lib.ts".into()],
                args: vec!["lib.ts".into(), "--port".into(), "80".into()],
            }
        );
        assert_eq!(
            cli(&["--exec", "out/main.js", "a"]).mode(),
            Mode::Exec {
                script: PathBuf::from("out/main.js"),
                args: vec!["a".into()],
            }
        );
    }

    #[test]
    /// フラグの解釈。
    fn flags_parse() {
        let o = cli(&["-f", "--dere", "-a", "--heuristic", "linecount", "--emit-helpers", "-o", "build"]);
        assert!(o.force && o.dere && o.autoref && o.emit_helpers);
        assert_eq!(o.heuristic, Heuristic::LineCount);
        assert_eq!(o.out, Some(PathBuf::from("build")));
        assert!(CliOptions::try_parse_from(["tsun", "--heuristic", "guess"]).is_err());
        assert_eq!(cli(&["--heuristic", "Line-Count"]).heuristic, Heuristic::LineCount);
        assert_eq!(cli(&[]).heuristic, Heuristic::Diff);
        let repl = repl_options(&o, &CompilerOptions::resolve(&ProjectConfig::default(), o.emit_helpers));
        assert!(repl.force && repl.dere && !repl.verbose);
        assert!(repl.session.emit_helpers && repl.session.auto_reference_typings);
    }

    #[test]
    /// tsconfig.json の値は強制上書きの後に残るものだけ効く。
    fn tsconfig_with_forced_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tsconfig.json"),
            r#"{ "compilerOptions": { "target": "es2017", "module": "amd", "noImplicitAny": true, "noEmitHelpers": false }, "include": ["src"] }"#,
        )
        .unwrap();
        let project = ProjectConfig::load_or_default(dir.path());
        assert_eq!(project.compiler_options.no_implicit_any, Some(true));
        let opts = CompilerOptions::resolve(&project, false);
        assert_eq!(opts.target, "es5");
        assert_eq!(opts.module, "commonjs");
        assert!(opts.no_implicit_any);
        assert!(opts.no_emit_helpers);
        assert!(CompilerOptions::resolve(&project, true).emit_options().emit_helpers);
    }

    #[test]
    /// 壊れた tsconfig.json は既定値へ戻る。
    fn broken_tsconfig_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tsconfig.json"), "{ not json").unwrap();
        assert!(matches!(
            ProjectConfig::load(&dir.path().join("tsconfig.json")),
            Err(ConfigError::Json { .. })
        ));
        assert_eq!(ProjectConfig::load_or_default(dir.path()), ProjectConfig::default());
        assert_eq!(CompilerOptions::default().check_options(), CheckOptions::default());
    }
}
