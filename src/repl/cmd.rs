// パス: src/repl/cmd.rs
// 役割: REPL のメインループ、メタコマンド解釈、確定手順（構文 → 型 → 確定 → 出力差分 → 実行）
// 意図: 入力・セッション・評価器・表示を 1 つの状態オブジェクトで束ねる
// 関連ファイル: src/session/mod.rs, src/evaluator.rs, src/repl/assembler.rs, src/repl/printer.rs
//! TSUN REPL のコマンド処理と状態遷移。
//!
//! 1 行読むごとに `ReplState::handle_line` が `Step` を返し、ループがそれを表示・実行する。
//! 状態の変更はすべて 2 つの行入力の間で完結する。

use std::io::{self, Write};

use crate::evaluator::Interpreter;
use crate::runtime::{describe_thrown, RuntimeFailure, Value};
use crate::session::{needs_pager, Diagnostic, IncrementalSession, SessionConfig};

use super::assembler::{Feed, InputAssembler};
use super::line_editor::{Completer, LineEditor, ReadResult};
use super::loader::read_sources;
use super::printer::{
    banner, code_text, error_text, help_lines, info_text, page, urusai, warning_text, write_value,
    Prompts,
};

/// REPL の起動設定。
#[derive(Clone, Debug, Default)]
pub struct ReplOptions {
    /// 型エラーがあっても警告だけ出して実行する。
    pub force: bool,
    /// 実行する出力スクリプトを表示する。
    pub verbose: bool,
    pub dere: bool,
    pub session: SessionConfig,
}

/// 対話セッションを開始し、終了コードを返す。
///
/// # Examples
/// ```no_run
/// let code = tsun::repl::run_repl(tsun::repl::ReplOptions::default());
/// std::process::exit(code);
/// ```
pub fn run_repl(options: ReplOptions) -> i32 {
    let mut editor = LineEditor::new();
    let fs = FsIo;
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    match run_repl_with(options, &mut editor, &fs, &mut stdout, &mut stderr) {
        Ok(code) => code,
        Err(err) => {
            let _ = writeln!(stderr, "REPL 実行中にエラーが発生しました: {}", err);
            1
        }
    }
}

/// 行入力の供給源。端末エディタとテスト用の台本が実装する。
pub trait ReplLineSource {
    fn read_line(&mut self, prompt: &str, complete: &mut Completer<'_>) -> io::Result<ReadResult>;
    fn add_history(&mut self, entry: &str);
    fn save_history(&mut self) -> io::Result<()>;
}

impl ReplLineSource for LineEditor {
    fn read_line(&mut self, prompt: &str, complete: &mut Completer<'_>) -> io::Result<ReadResult> {
        LineEditor::read_line(self, prompt, complete)
    }

    fn add_history(&mut self, entry: &str) {
        LineEditor::add_history(self, entry);
    }

    fn save_history(&mut self) -> io::Result<()> {
        LineEditor::save_history(self)
    }
}

/// REPL に必要な最小限のファイル読み込み抽象。
pub trait ReplIo {
    fn read_to_string(&self, path: &str) -> Result<String, String>;
}

/// 実際のファイルシステムを読む標準実装。
pub struct FsIo;

impl ReplIo for FsIo {
    fn read_to_string(&self, path: &str) -> Result<String, String> {
        std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path, e))
    }
}

/// 入出力を差し替えられるメインループ。戻り値は終了コード（`process.exit` の値か 0）。
pub fn run_repl_with<S, I, W, E>(
    options: ReplOptions,
    editor: &mut S,
    file_io: &I,
    out: &mut W,
    err: &mut E,
) -> io::Result<i32>
where
    S: ReplLineSource,
    I: ReplIo,
    W: Write,
    E: Write,
{
    for line in banner(options.dere) {
        writeln!(out, "{}", line)?;
    }
    let mut state = ReplState::new(options);

    let code = loop {
        let prompt = state.prompt();
        let read = {
            let mut complete = |line: &str| state.complete(line);
            editor.read_line(&prompt, &mut complete)
        };
        match read {
            Ok(ReadResult::Line(line)) => {
                if !state.in_paste() {
                    editor.add_history(&line);
                }
                let step = state.handle_line(&line, file_io);
                if let Some(code) = perform(&mut state, step, out, err)? {
                    break code;
                }
            }
            Ok(ReadResult::Eof) => {
                if state.in_paste() {
                    let step = state.finish_paste();
                    if let Some(code) = perform(&mut state, step, out, err)? {
                        break code;
                    }
                    continue;
                }
                writeln!(out)?;
                break 0;
            }
            Ok(ReadResult::Interrupted) => state.interrupt(),
            Err(e) => {
                writeln!(err, "入力エラー: {}", e)?;
                break 1;
            }
        }
    };

    if let Err(e) = editor.save_history() {
        writeln!(err, "ヒストリーの保存に失敗しました: {}", e)?;
    }
    Ok(code)
}

fn perform<W: Write, E: Write>(
    state: &mut ReplState,
    step: Step,
    out: &mut W,
    err: &mut E,
) -> io::Result<Option<i32>> {
    match step {
        Step::Show(msgs) => {
            dispatch_messages(msgs, out, err)?;
            Ok(None)
        }
        Step::Run { before, js } => {
            dispatch_messages(before, out, err)?;
            out.flush()?;
            let (msgs, exit) = state.execute(&js);
            dispatch_messages(msgs, out, err)?;
            Ok(exit)
        }
    }
}

fn dispatch_messages<W: Write, E: Write>(
    msgs: Vec<ReplMsg>,
    out: &mut W,
    err: &mut E,
) -> io::Result<()> {
    for msg in msgs {
        match msg {
            ReplMsg::Out(s) => writeln!(out, "{}", s)?,
            ReplMsg::Err(s) => writeln!(err, "{}", s)?,
            ReplMsg::Value(v) => write_value(out, &v)?,
            ReplMsg::Page(s) => {
                if !page(&s) {
                    writeln!(out, "{}", s)?;
                }
            }
        }
    }
    Ok(())
}

/// 利用者へ返す応答。
#[derive(Debug)]
pub(crate) enum ReplMsg {
    Out(String),
    Err(String),
    Value(Value),
    /// 長いテキスト。`$PAGER` があればそちらへ流す。
    Page(String),
}

/// 1 行を処理した結果。
#[derive(Debug)]
pub(crate) enum Step {
    Show(Vec<ReplMsg>),
    /// 出力スクリプトを実行する。`before` は実行前に表示する。
    Run { before: Vec<ReplMsg>, js: String },
}

impl Step {
    fn prepend(self, mut msgs: Vec<ReplMsg>) -> Step {
        match self {
            Step::Show(rest) => {
                msgs.extend(rest);
                Step::Show(msgs)
            }
            Step::Run { before, js } => {
                msgs.extend(before);
                Step::Run { before: msgs, js }
            }
        }
    }
}

/// 記号の問い合わせの種類。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Query {
    Type,
    Detail,
    Doc,
    Source,
}

impl Query {
    fn command(self) -> &'static str {
        match self {
            Query::Type => ":type",
            Query::Detail => ":detail",
            Query::Doc => ":doc",
            Query::Source => ":source",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ReplCommand {
    Query(Query, Option<String>),
    Clear,
    Print,
    Help,
    Paste,
    Load(Vec<String>),
    Baka,
    /// メタコマンドでない入力（未知の `:xyz` も含む）。
    Code,
}

/// 行頭の語でメタコマンドを判別する。`:baka` は `dere` のときだけ。
pub(crate) fn parse_repl_command(line: &str, dere: bool) -> ReplCommand {
    let trimmed = line.trim();
    if !trimmed.starts_with(':') {
        return ReplCommand::Code;
    }
    let mut words = trimmed.split_whitespace();
    let head = words.next().unwrap_or_default();
    let rest: Vec<String> = words.map(str::to_string).collect();
    let name = rest.first().cloned();
    match head {
        ":type" => ReplCommand::Query(Query::Type, name),
        ":detail" => ReplCommand::Query(Query::Detail, name),
        ":doc" => ReplCommand::Query(Query::Doc, name),
        ":source" => ReplCommand::Query(Query::Source, name),
        ":clear" => ReplCommand::Clear,
        ":print" => ReplCommand::Print,
        ":help" => ReplCommand::Help,
        ":paste" => ReplCommand::Paste,
        ":load" => ReplCommand::Load(rest),
        ":baka" if dere => ReplCommand::Baka,
        _ => ReplCommand::Code,
    }
}

/// REPL の状態一式。バッファと版番号はセッションが、保留中の入力はアセンブラが持つ。
pub(crate) struct ReplState {
    options: ReplOptions,
    session: IncrementalSession,
    interp: Interpreter,
    assembler: InputAssembler,
    prompts: Prompts,
    prompt: String,
    paste: Option<String>,
}

impl ReplState {
    pub(crate) fn new(options: ReplOptions) -> Self {
        let session = IncrementalSession::new(options.session.clone());
        let prompts = Prompts::standard();
        Self {
            prompt: prompts.default.clone(),
            prompts,
            session,
            interp: Interpreter::new(),
            assembler: InputAssembler::new(),
            paste: None,
            options,
        }
    }

    pub(crate) fn prompt(&self) -> String {
        if self.paste.is_some() {
            String::new()
        } else {
            self.prompt.clone()
        }
    }

    pub(crate) fn in_paste(&self) -> bool {
        self.paste.is_some()
    }

    pub(crate) fn complete(&mut self, line: &str) -> (Vec<String>, String) {
        self.session.completions_at(self.assembler.pending(), line)
    }

    /// Ctrl-C。保留中の入力と貼り付けモードを捨てる。
    pub(crate) fn interrupt(&mut self) {
        self.assembler.clear();
        self.paste = None;
        self.prompt = self.prompts.default.clone();
    }

    pub(crate) fn handle_line<I: ReplIo>(&mut self, line: &str, io: &I) -> Step {
        if let Some(buf) = self.paste.as_mut() {
            buf.push_str(line);
            buf.push('\n');
            return Step::Show(Vec::new());
        }
        match parse_repl_command(line, self.options.dere) {
            ReplCommand::Query(kind, None) => Step::Show(vec![ReplMsg::Out(error_text(&format!(
                "{} command need names!",
                kind.command()
            )))]),
            ReplCommand::Query(kind, Some(name)) => Step::Show(self.query(kind, &name)),
            ReplCommand::Clear => {
                self.session.reset();
                self.interp = Interpreter::new();
                self.interrupt();
                log::debug!("repl cleared at version {}", self.session.version());
                Step::Show(Vec::new())
            }
            ReplCommand::Print => Step::Show(vec![ReplMsg::Out(
                self.session.print().trim_end().to_string(),
            )]),
            ReplCommand::Help => Step::Show(
                help_lines(self.options.dere)
                    .into_iter()
                    .map(ReplMsg::Out)
                    .collect(),
            ),
            ReplCommand::Paste if self.assembler.is_empty() => {
                self.paste = Some(String::new());
                Step::Show(vec![
                    ReplMsg::Out(info_text("// entering paste mode, press ctrl-d to evaluate")),
                    ReplMsg::Out(String::new()),
                ])
            }
            ReplCommand::Load(paths) if paths.is_empty() => Step::Show(vec![ReplMsg::Out(
                error_text(":load command need file names!"),
            )]),
            ReplCommand::Load(paths) => match read_sources(io, &paths) {
                Ok(text) => self.evaluate(&text),
                Err(e) => Step::Show(vec![ReplMsg::Err(error_text(&e))]),
            },
            ReplCommand::Baka => {
                self.prompts = Prompts::dere();
                self.prompt = self.prompts.default.clone();
                Step::Show(Vec::new())
            }
            ReplCommand::Paste | ReplCommand::Code => self.feed_code(line),
        }
    }

    /// 貼り付けモードを抜け、集めた行をまとめて評価する。
    pub(crate) fn finish_paste(&mut self) -> Step {
        let text = self.paste.take().unwrap_or_default();
        let notice = vec![ReplMsg::Out(info_text("evaluating..."))];
        if text.trim().is_empty() {
            return Step::Show(notice);
        }
        self.evaluate(&text).prepend(notice)
    }

    fn query(&self, kind: Query, name: &str) -> Vec<ReplMsg> {
        let not_found = || vec![ReplMsg::Out(warning_text(&format!("identifier {} not found", name)))];
        match kind {
            Query::Type | Query::Detail => match self.session.type_info(name, kind == Query::Detail) {
                Some(lines) => vec![ReplMsg::Out(info_text(&lines.join("\n")))],
                None => not_found(),
            },
            Query::Doc => match self.session.doc_info(name) {
                Some(doc) => vec![ReplMsg::Out(info_text(&doc))],
                None => not_found(),
            },
            Query::Source => match self.session.source_info(name) {
                Some(src) if needs_pager(&src) => vec![ReplMsg::Page(src)],
                Some(src) => vec![ReplMsg::Out(src)],
                None => not_found(),
            },
        }
    }

    fn feed_code(&mut self, line: &str) -> Step {
        match self.assembler.feed(line) {
            Feed::Empty => Step::Show(Vec::new()),
            Feed::Abandoned => {
                self.prompt = self.prompts.default.clone();
                Step::Show(vec![ReplMsg::Out(warning_text(
                    "You typed two blank lines! start new command",
                ))])
            }
            Feed::More(depth) => {
                self.prompt = self.prompts.continuation(depth);
                Step::Show(Vec::new())
            }
            Feed::Ready => {
                let text = self.assembler.pending().to_string();
                let syntax = self.session.syntax_errors(&text);
                if syntax.iter().any(|d| d.incomplete) {
                    self.prompt = self.prompts.continuation(self.assembler.depth());
                    return Step::Show(Vec::new());
                }
                self.evaluate_checked(&text, syntax)
            }
        }
    }

    /// 貼り付け・`:load` の一括評価。途切れた構文も通常の構文エラーとして扱う。
    fn evaluate(&mut self, text: &str) -> Step {
        let syntax = self.session.syntax_errors(text);
        self.evaluate_checked(text, syntax)
    }

    fn evaluate_checked(&mut self, text: &str, syntax: Vec<Diagnostic>) -> Step {
        self.assembler.clear();
        self.prompt = self.prompts.default.clone();
        if !syntax.is_empty() {
            return Step::Show(self.report(&syntax));
        }

        let mut before = Vec::new();
        let semantic = self.session.semantic_errors(text);
        if !semantic.is_empty() {
            if !self.options.force {
                return Step::Show(self.report(&semantic));
            }
            before.extend(semantic.iter().map(|d| ReplMsg::Err(warning_text(&d.message()))));
        }
        let emit = self.session.emit_errors(text);
        if !emit.is_empty() {
            before.extend(self.report(&emit));
            return Step::Show(before);
        }

        self.session.commit(text);
        match self.session.emit_delta() {
            Ok(js) => {
                if self.options.verbose && !js.is_empty() {
                    before.push(ReplMsg::Out(code_text(&js)));
                }
                Step::Run { before, js }
            }
            Err(d) => {
                before.extend(self.report(std::slice::from_ref(&d)));
                Step::Show(before)
            }
        }
    }

    fn report(&self, diags: &[Diagnostic]) -> Vec<ReplMsg> {
        let joined = diags
            .iter()
            .map(Diagnostic::message)
            .collect::<Vec<_>>()
            .join("\n");
        let mut msgs = vec![ReplMsg::Err(error_text(&joined))];
        if !self.prompts.is_standard() {
            msgs.extend(urusai(&self.prompts).into_iter().map(ReplMsg::Out));
        }
        msgs
    }

    /// 出力スクリプトを実行する。`process.exit` なら終了コードを返す。
    pub(crate) fn execute(&mut self, js: &str) -> (Vec<ReplMsg>, Option<i32>) {
        match self.interp.run(js) {
            Ok(v) => (vec![ReplMsg::Value(v)], None),
            Err(RuntimeFailure::Throw(v)) => (vec![ReplMsg::Out(describe_thrown(&v))], None),
            Err(RuntimeFailure::Exit(code)) => (Vec::new(), Some(code)),
            Err(e @ RuntimeFailure::Syntax(_)) => {
                (vec![ReplMsg::Err(error_text(&e.to_string()))], None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::inspect;

    struct NoopIo;
    impl ReplIo for NoopIo {
        fn read_to_string(&self, path: &str) -> Result<String, String> {
            Err(format!("cannot read {}", path))
        }
    }

    fn state(force: bool, dere: bool) -> ReplState {
        colored::control::set_override(false);
        ReplState::new(ReplOptions {
            force,
            dere,
            ..ReplOptions::default()
        })
    }

    fn texts(step: Step) -> Vec<String> {
        let msgs = match step {
            Step::Show(m) => m,
            Step::Run { before, .. } => before,
        };
        msgs.into_iter()
            .map(|m| match m {
                ReplMsg::Out(s) | ReplMsg::Err(s) | ReplMsg::Page(s) => s,
                ReplMsg::Value(v) => inspect(&v),
            })
            .collect()
    }

    fn run_js(state: &mut ReplState, line: &str) -> Option<String> {
        match state.handle_line(line, &NoopIo) {
            Step::Run { js, .. } => Some(js),
            Step::Show(_) => None,
        }
    }

    #[test]
    /// 行頭の語だけでメタコマンドを判別し、未知のものはコード扱い。
    fn parse_repl_command_variants() {
        assert_eq!(
            parse_repl_command(":type foo", false),
            ReplCommand::Query(Query::Type, Some("foo".into()))
        );
        assert_eq!(parse_repl_command(":detail", false), ReplCommand::Query(Query::Detail, None));
        assert_eq!(
            parse_repl_command(":load a.ts b.ts", false),
            ReplCommand::Load(vec!["a.ts".into(), "b.ts".into()])
        );
        assert_eq!(parse_repl_command("  :clear ", false), ReplCommand::Clear);
        assert_eq!(parse_repl_command(":baka", false), ReplCommand::Code);
        assert_eq!(parse_repl_command(":baka", true), ReplCommand::Baka);
        assert_eq!(parse_repl_command(":xyz", false), ReplCommand::Code);
        assert_eq!(parse_repl_command("1 + 1", false), ReplCommand::Code);
    }

    #[test]
    /// 名前の無い問い合わせは専用の文言で断る。
    fn queries_need_names() {
        let mut s = state(false, false);
        assert_eq!(texts(s.handle_line(":doc", &NoopIo)), vec![":doc command need names!"]);
        assert_eq!(texts(s.handle_line(":source ", &NoopIo)), vec![":source command need names!"]);
        assert_eq!(
            texts(s.handle_line(":type foo123", &NoopIo)),
            vec!["identifier foo123 not found"]
        );
    }

    #[test]
    /// 型エラーは既定で拒否し、--force なら警告して実行する。
    fn force_downgrades_type_errors() {
        let mut strict = state(false, false);
        assert!(run_js(&mut strict, "let s: string = 1;").is_none());
        assert!(!strict.session.print().contains("let s"));

        let mut forced = state(true, false);
        let js = run_js(&mut forced, "let s: string = 1;").unwrap();
        assert_eq!(js, "var s = 1;");
        assert!(forced.session.print().contains("let s: string = 1;"));
    }

    #[test]
    /// 閉じていない入力は継続プロンプトになり、閉じたところで 1 文として実行される。
    fn continuation_then_commit() {
        let mut s = state(false, false);
        assert!(run_js(&mut s, "function f() {").is_none());
        assert_eq!(s.prompt(), "..");
        let js = run_js(&mut s, "}").unwrap();
        assert!(js.starts_with("function f() {"));
        assert_eq!(s.prompt(), "> ");
        let (msgs, exit) = s.execute(&js);
        assert!(exit.is_none());
        assert!(matches!(msgs.as_slice(), [ReplMsg::Value(Value::Undefined)]));
    }

    #[test]
    /// `:baka` の後はプロンプトが変わり、エラー時に一言添える。
    fn baka_switches_prompts() {
        let mut s = state(false, true);
        assert!(texts(s.handle_line(":baka", &NoopIo)).is_empty());
        assert_eq!(s.prompt(), "ξ(ﾟ⊿ﾟ)ξ> ");
        let out = texts(s.handle_line("let = ;", &NoopIo));
        assert!(out.iter().any(|l| l.contains("URUSAI URUSAI URUSAI")));
    }

    #[test]
    /// 貼り付けモードは EOF までの行をまとめて評価する。
    fn paste_mode_collects_until_eof() {
        let mut s = state(false, false);
        let notice = texts(s.handle_line(":paste", &NoopIo));
        assert!(notice[0].contains("entering paste mode"));
        assert_eq!(s.prompt(), "");
        s.handle_line("function g() {", &NoopIo);
        s.handle_line("  return 2;", &NoopIo);
        s.handle_line("}", &NoopIo);
        match s.finish_paste() {
            Step::Run { before, js } => {
                assert!(matches!(&before[0], ReplMsg::Out(t) if t == "evaluating..."));
                assert!(js.contains("return 2;"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!s.in_paste());
    }

    #[test]
    /// 保留中の入力があるときの `:paste` はコードとして扱う。
    fn paste_requires_empty_pending() {
        let mut s = state(false, false);
        s.handle_line("let o = {", &NoopIo);
        s.handle_line(":paste", &NoopIo);
        assert!(!s.in_paste());
        assert!(s.assembler.pending().ends_with(":paste"));
    }
}
