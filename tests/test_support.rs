// パス: tests/test_support.rs
// 役割: 結合テスト共通のヘルパ（構文解析・型検査・出力・評価・台本つき REPL）
// 意図: 各テストファイルの準備コードを 1 か所にまとめる
// 関連ファイル: tests/repl_flow.rs, tests/session.rs, tests/checker.rs
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;

use tsun::ast::Program;
use tsun::checker::{check_units, CheckOptions, SourceUnit};
use tsun::codegen::{emit_program, EmitOptions};
use tsun::evaluator::Interpreter;
use tsun::lexer::{lex, TokenKind};
use tsun::repl::{run_repl_with, Completer, ReadResult, ReplIo, ReplLineSource, ReplOptions};
use tsun::runtime::{capture_output, inspect};
use tsun::session::builtin_typings;

/// 文字列をプログラムとして解析（失敗時は panic）
pub fn parse_program(src: &str) -> Program {
    tsun::parse_program(src).expect("parse program")
}

/// 字句解析してトークン種別だけを返す（EOF を含む）
pub fn lex_kinds(src: &str) -> Vec<TokenKind> {
    lex(src)
        .expect("lex")
        .into_iter()
        .map(|t| t.kind)
        .collect()
}

/// 組み込みの宣言ファイルと一緒に `main.ts` として検査し、診断コードを返す
pub fn check_codes(src: &str, options: CheckOptions) -> Vec<&'static str> {
    let typings = builtin_typings();
    let ambient: Vec<(String, Program)> = typings
        .iter()
        .map(|f| (f.name.clone(), parse_program(&f.text)))
        .collect();
    let main = parse_program(src);
    let mut units: Vec<SourceUnit<'_>> = ambient
        .iter()
        .map(|(file, program)| SourceUnit { file, program })
        .collect();
    units.push(SourceUnit {
        file: "main.ts",
        program: &main,
    });
    let checked = check_units(&units, options);
    checked
        .diagnostics_for("main.ts")
        .into_iter()
        .map(|d| d.error.0.code)
        .collect()
}

/// 補助関数なしで ES5 相当へ出力する
pub fn emit(src: &str) -> String {
    emit_program(&parse_program(src), &EmitOptions::default()).expect("emit")
}

/// 新しい評価器でスクリプトを実行し、結果を表示形式で返す
pub fn eval_inspect(js: &str) -> String {
    let mut interp = Interpreter::new();
    inspect(&interp.run(js).expect("run"))
}

/// 台本の 1 手。
#[derive(Clone, Debug)]
pub enum ScriptEvent {
    Line(&'static str),
    /// 補完を要求して結果を記録する（行入力は消費しない）。
    Complete(&'static str),
    Interrupt,
    Eof,
}

/// 台本どおりに行を返す行入力。読んだプロンプトと履歴を記録する。
pub struct ScriptedLines {
    events: VecDeque<ScriptEvent>,
    pub prompts: Vec<String>,
    pub history: Vec<String>,
    pub completions: Vec<(Vec<String>, String)>,
    pub saved: bool,
}

impl ScriptedLines {
    pub fn new(events: Vec<ScriptEvent>) -> Self {
        Self {
            events: events.into(),
            prompts: Vec::new(),
            history: Vec::new(),
            completions: Vec::new(),
            saved: false,
        }
    }
}

impl ReplLineSource for ScriptedLines {
    fn read_line(&mut self, prompt: &str, complete: &mut Completer<'_>) -> io::Result<ReadResult> {
        self.prompts.push(prompt.to_string());
        loop {
            match self.events.pop_front() {
                Some(ScriptEvent::Complete(line)) => self.completions.push(complete(line)),
                Some(ScriptEvent::Line(line)) => return Ok(ReadResult::Line(line.to_string())),
                Some(ScriptEvent::Interrupt) => return Ok(ReadResult::Interrupted),
                Some(ScriptEvent::Eof) | None => return Ok(ReadResult::Eof),
            }
        }
    }

    fn add_history(&mut self, entry: &str) {
        self.history.push(entry.to_string());
    }

    fn save_history(&mut self) -> io::Result<()> {
        self.saved = true;
        Ok(())
    }
}

/// パス → 内容の表で `:load` を満たす。
#[derive(Default)]
pub struct MapIo(pub HashMap<String, String>);

impl MapIo {
    pub fn with(files: &[(&str, &str)]) -> Self {
        Self(
            files
                .iter()
                .map(|(p, t)| (p.to_string(), t.to_string()))
                .collect(),
        )
    }
}

impl ReplIo for MapIo {
    fn read_to_string(&self, path: &str) -> Result<String, String> {
        self.0
            .get(path)
            .cloned()
            .ok_or_else(|| format!("cannot read {}", path))
    }
}

/// 1 回の REPL 実行の記録。
#[derive(Debug)]
pub struct Transcript {
    pub stdout: String,
    pub stderr: String,
    /// `console.log` などスクリプトからの出力。
    pub console: Vec<String>,
    pub prompts: Vec<String>,
    pub history: Vec<String>,
    pub completions: Vec<(Vec<String>, String)>,
    pub exit: i32,
}

impl Transcript {
    /// 起動時のあいさつを除いた標準出力の行。
    pub fn out_lines(&self) -> Vec<&str> {
        self.stdout.lines().skip_while(|l| !l.is_empty()).skip(1).collect()
    }

    pub fn err_lines(&self) -> Vec<&str> {
        self.stderr.lines().collect()
    }
}

pub fn run_script(options: ReplOptions, events: Vec<ScriptEvent>) -> Transcript {
    run_script_with_io(options, events, &MapIo::default())
}

/// 色を切って台本つきで REPL を回す
pub fn run_script_with_io(options: ReplOptions, events: Vec<ScriptEvent>, io: &MapIo) -> Transcript {
    colored::control::set_override(false);
    let mut lines = ScriptedLines::new(events);
    let mut out = Vec::new();
    let mut err = Vec::new();
    let (result, console) =
        capture_output(|| run_repl_with(options, &mut lines, io, &mut out, &mut err));
    let exit = result.expect("repl io");
    assert!(lines.saved, "history must be saved on exit");
    Transcript {
        stdout: String::from_utf8(out).expect("utf8 stdout"),
        stderr: String::from_utf8(err).expect("utf8 stderr"),
        console,
        prompts: lines.prompts,
        history: lines.history,
        completions: lines.completions,
        exit,
    }
}

/// 行だけの台本を組む（末尾に EOF）
pub fn lines(src: &[&'static str]) -> Vec<ScriptEvent> {
    let mut events: Vec<ScriptEvent> = src.iter().map(|l| ScriptEvent::Line(*l)).collect();
    events.push(ScriptEvent::Eof);
    events
}
