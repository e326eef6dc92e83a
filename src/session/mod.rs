// パス: src/session/mod.rs
// 役割: 追記専用の仮想ソースを検査・確定し、新しく加わった出力だけを取り出す増分セッション
// 意図: 補完や失敗した入力のような投機的操作が、受理済みの履歴を汚さないようにする
// 関連ファイル: src/session/snapshot.rs, src/session/declarations.rs, src/session/delta.rs, src/repl/cmd.rs
//! 増分コンパイルセッション
//!
//! - 仮想ファイル `TSUN.repl.generated.ts` の内容は、宣言ファイルを参照する前置きと確定済みの文。
//! - `syntax_errors` / `semantic_errors` は複製上で検査するだけで、バッファは変えない。
//! - `commit` は検査が通った同じ手番で呼ぶ。間に他の操作は挟まらない。
//! - `emit_delta` はバッファ全体を出力し、前回までに返した行を除いた差分を返す。

pub mod declarations;
pub mod delta;
pub mod snapshot;

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

use crate::ast::{Program, Stmt};
use crate::checker::{check_units, CheckOptions, Checked, SourceUnit};
use crate::codegen::{emit_program, EmitError, EmitOptions};
use crate::errors::{ErrorInfo, ParseError};
use crate::lexer::{is_ident_rest, is_ident_start, keyword_names, lex, TokenKind};
use crate::parser::{parse_expr, parse_program};

pub use declarations::{needs_pager, DeclKind, DeclarationIndex, DeclarationSite, PAGER_THRESHOLD};
pub use delta::{EmitCursor, Heuristic};
pub use snapshot::{Snapshot, SnapshotStore};

/// REPL バッファを表す仮想ファイル名。
pub const REPL_FILE: &str = "TSUN.repl.generated.ts";

/// 組み込みの宣言ファイル。
pub const LIB_CORE_NAME: &str = "lib.core.d.ts";
pub const LIB_NODE_NAME: &str = "node.d.ts";
const LIB_CORE: &str = include_str!("../../lib/lib.core.d.ts");
const LIB_NODE: &str = include_str!("../../lib/node.d.ts");

/// 組み込み宣言ファイルの構文木。プロセス内で一度だけ解析する。
static BUILTIN_PROGRAMS: Lazy<Vec<(&'static str, Option<Program>)>> = Lazy::new(|| {
    [(LIB_CORE_NAME, LIB_CORE), (LIB_NODE_NAME, LIB_NODE)]
        .iter()
        .map(|(name, text)| (*name, parse_program(text).ok()))
        .collect()
});

pub(crate) fn parse_ambient(file: &AmbientFile) -> Result<Program, ParseError> {
    let builtin = [LIB_CORE, LIB_NODE].contains(&file.text.as_str());
    if builtin {
        let cached = BUILTIN_PROGRAMS
            .iter()
            .find(|(name, _)| *name == file.name)
            .and_then(|(_, p)| p.clone());
        if let Some(program) = cached {
            return Ok(program);
        }
    }
    parse_program(&file.text)
}

/// 補完候補に出すメタコマンド名。
pub const META_COMMANDS: &[&str] = &[
    ":type", ":detail", ":doc", ":source", ":clear", ":print", ":help", ":paste", ":load",
];

/// 宣言ファイル 1 つ分。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AmbientFile {
    pub name: String,
    pub text: String,
}

/// 組み込みの宣言ファイルを登録順に返す。
pub fn builtin_typings() -> Vec<AmbientFile> {
    vec![
        AmbientFile {
            name: LIB_CORE_NAME.into(),
            text: LIB_CORE.into(),
        },
        AmbientFile {
            name: LIB_NODE_NAME.into(),
            text: LIB_NODE.into(),
        },
    ]
}

/// ディレクトリ内の `*.d.ts` を名前順に読む。読めないものは飛ばす。
pub fn typings_in(dir: &Path) -> Vec<AmbientFile> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        log::debug!("no typings directory at {}", dir.display());
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.to_string_lossy().ends_with(".d.ts"))
        .collect();
    paths.sort();
    paths
        .into_iter()
        .filter_map(|p| match std::fs::read_to_string(&p) {
            Ok(text) => Some(AmbientFile {
                name: p.to_string_lossy().replace('\\', "/"),
                text,
            }),
            Err(e) => {
                log::warn!("skipping typings file {}: {}", p.display(), e);
                None
            }
        })
        .collect()
}

/// セッションの設定。差分の取り方・補助関数の出力・型定義の自動参照を切り替える。
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub heuristic: Heuristic,
    pub emit_helpers: bool,
    pub auto_reference_typings: bool,
    /// `auto_reference_typings` のときに読むディレクトリ。
    pub typings_dir: PathBuf,
    pub check: CheckOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heuristic: Heuristic::Diff,
            emit_helpers: false,
            auto_reference_typings: false,
            typings_dir: PathBuf::from("typings"),
            check: CheckOptions::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    Syntax,
    Semantic,
    Emit,
}

/// 利用者へ見せる診断。行番号は候補テキストの先頭を 1 行目とする。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub info: ErrorInfo,
    /// 入力末尾で途切れた構文エラー（続きの行で解消しうる）。
    pub incomplete: bool,
}

impl Diagnostic {
    fn syntax(err: &ParseError, base_lines: usize) -> Self {
        Self {
            kind: DiagnosticKind::Syntax,
            info: rebase(err.0.clone(), base_lines),
            incomplete: err.is_incomplete(),
        }
    }

    fn emit(err: &EmitError) -> Self {
        let span = err.span();
        Self {
            kind: DiagnosticKind::Emit,
            info: ErrorInfo::at(
                err.code(),
                err.to_string(),
                Some(span.pos),
                Some(span.line),
                Some(span.col),
            ),
            incomplete: false,
        }
    }

    pub fn message(&self) -> String {
        self.info.headline()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info.headline())
    }
}

fn rebase(mut info: ErrorInfo, base_lines: usize) -> ErrorInfo {
    info.line = info.line.map(|l| l.saturating_sub(base_lines).max(1));
    info
}

struct ParsedAmbient {
    file: AmbientFile,
    program: Program,
}

pub struct IncrementalSession {
    config: SessionConfig,
    ambient: Vec<ParsedAmbient>,
    store: SnapshotStore,
    index: DeclarationIndex,
    cursor: EmitCursor,
}

impl IncrementalSession {
    /// 組み込みの宣言ファイル（と設定に応じて `typings/*.d.ts`）を参照するセッション。
    pub fn new(config: SessionConfig) -> Self {
        let mut files = builtin_typings();
        if config.auto_reference_typings {
            files.extend(typings_in(&config.typings_dir));
        }
        Self::with_ambient(config, files)
    }

    /// 宣言ファイルを明示してセッションを作る。構文エラーのあるものは読み飛ばす。
    pub fn with_ambient(config: SessionConfig, files: Vec<AmbientFile>) -> Self {
        let mut ambient = Vec::new();
        for file in files {
            match parse_ambient(&file) {
                Ok(program) => ambient.push(ParsedAmbient { file, program }),
                Err(e) => log::warn!("ignoring declaration file {}: {}", file.name, e),
            }
        }
        let preamble: String = ambient
            .iter()
            .map(|a| format!("/// <reference path=\"{}\" />\n", a.file.name))
            .collect();
        let cursor = EmitCursor::new(config.heuristic);
        let mut session = Self {
            config,
            ambient,
            store: SnapshotStore::new(preamble),
            index: DeclarationIndex::default(),
            cursor,
        };
        session.build_ambient_index();
        session
    }

    fn build_ambient_index(&mut self) {
        let units: Vec<SourceUnit<'_>> = self
            .ambient
            .iter()
            .map(|a| SourceUnit {
                file: &a.file.name,
                program: &a.program,
            })
            .collect();
        let checked = check_units(&units, self.config.check);
        for a in &self.ambient {
            self.index
                .add_ambient(&a.file.name, &a.file.text, &a.program, &checked);
        }
    }

    /// 補助関数は最初の出力から常に先頭に置き、出力の前方を追記で変えない。
    fn emit_options(&self) -> EmitOptions {
        EmitOptions {
            emit_helpers: self.config.emit_helpers,
            all_helpers: true,
        }
    }

    pub fn version(&self) -> u64 {
        self.store.version()
    }

    pub fn current_text(&self) -> &str {
        self.store.current_text()
    }

    pub fn ambient_names(&self) -> Vec<&str> {
        self.ambient.iter().map(|a| a.file.name.as_str()).collect()
    }

    fn base_lines(&self) -> usize {
        self.store.current_text().lines().count()
    }

    fn check_text(&self, program: &Program) -> Checked {
        let mut units: Vec<SourceUnit<'_>> = self
            .ambient
            .iter()
            .map(|a| SourceUnit {
                file: &a.file.name,
                program: &a.program,
            })
            .collect();
        units.push(SourceUnit {
            file: REPL_FILE,
            program,
        });
        check_units(&units, self.config.check)
    }

    /// 候補を連結したときの構文エラー。バッファは変えない。
    pub fn syntax_errors(&mut self, candidate: &str) -> Vec<Diagnostic> {
        let base_lines = self.base_lines();
        let scratch = self.store.probe(&terminated(candidate));
        match parse_program(scratch.text()) {
            Ok(_) => Vec::new(),
            Err(e) => vec![Diagnostic::syntax(&e, base_lines)],
        }
    }

    /// 候補を連結したときの型エラー。候補に掛からない以前の文の診断は含めない。
    pub fn semantic_errors(&mut self, candidate: &str) -> Vec<Diagnostic> {
        let base_len = self.store.current_text().len();
        let base_lines = self.base_lines();
        let scratch = self.store.probe(&terminated(candidate));
        let program = match parse_program(scratch.text()) {
            Ok(p) => p,
            Err(e) => return vec![Diagnostic::syntax(&e, base_lines)],
        };
        let checked = self.check_text(&program);
        let diags: Vec<Diagnostic> = checked
            .diagnostics_for(REPL_FILE)
            .into_iter()
            .filter(|d| d.error.0.pos.map_or(true, |p| p >= base_len || d.end > base_len))
            .map(|d| Diagnostic {
                kind: DiagnosticKind::Semantic,
                info: rebase(d.error.0.clone(), base_lines),
                incomplete: false,
            })
            .collect();
        log::debug!(
            "semantic probe at version {}: {} diagnostic(s)",
            scratch.version(),
            diags.len()
        );
        diags
    }

    /// 候補を連結したバッファが出力できるか。出力できない構文が残っていれば診断を返す。
    pub fn emit_errors(&mut self, candidate: &str) -> Vec<Diagnostic> {
        let base_lines = self.base_lines();
        let scratch = self.store.probe(&terminated(candidate));
        let program = match parse_program(scratch.text()) {
            Ok(p) => p,
            Err(e) => return vec![Diagnostic::syntax(&e, base_lines)],
        };
        match emit_program(&program, &self.emit_options()) {
            Ok(_) => Vec::new(),
            Err(e) => {
                let mut d = Diagnostic::emit(&e);
                d.info = rebase(d.info, base_lines);
                vec![d]
            }
        }
    }

    /// 候補を恒久的に追記し、バッファ側の宣言索引を作り直す。
    /// 末尾の文は `;` で閉じ、次の入力と自動セミコロン挿入で繋がらないようにする。
    pub fn commit(&mut self, candidate: &str) {
        self.store.commit(&terminated(candidate));
        self.rebuild_buffer_index();
    }

    fn rebuild_buffer_index(&mut self) {
        let text = self.store.current_text().to_string();
        match parse_program(&text) {
            Ok(program) => {
                let checked = self.check_text(&program);
                self.index.rebuild_buffer(REPL_FILE, &text, &program, &checked);
            }
            Err(e) => log::debug!("buffer no longer parses; index kept: {}", e),
        }
    }

    /// バッファ全体を出力し、まだ返していない行だけを `\n` 区切りで返す。
    pub fn emit_delta(&mut self) -> Result<String, Diagnostic> {
        let program = parse_program(self.store.current_text())
            .map_err(|e| Diagnostic::syntax(&e, 0))?;
        let output =
            emit_program(&program, &self.emit_options()).map_err(|e| Diagnostic::emit(&e))?;
        let added = self.cursor.advance(&output);
        log::debug!("emit delta: {} new line(s)", added.len());
        Ok(added.join("\n"))
    }

    /// 補完候補と、置き換え対象の語。
    pub fn completions_at(&mut self, pending: &str, line: &str) -> (Vec<String>, String) {
        if line.starts_with(':') {
            let mut names: Vec<String> = META_COMMANDS
                .iter()
                .filter(|c| c.contains(line))
                .map(|c| c.to_string())
                .collect();
            names.sort();
            return (names, line.to_string());
        }
        let word = trailing_word(line);
        let before = &line[..line.len() - word.len()];
        let scratch = self.store.probe(&format!("{}\n{}", pending, line));
        log::debug!("completion probe at version {}", scratch.version());

        let mut checked = self.checked_for_completion(pending);
        let mut names: Vec<String> = match before.strip_suffix('.') {
            Some(receiver_src) => {
                let receiver = receiver_text(receiver_src);
                match parse_expr(receiver) {
                    Ok(expr) if !receiver.is_empty() => {
                        let ty = checked.expression_type(&expr);
                        checked.member_names(&ty)
                    }
                    _ => Vec::new(),
                }
            }
            None => {
                let mut names = checked.global_names();
                names.extend(declared_names(pending));
                names.extend(keyword_names().map(str::to_string));
                names
            }
        };
        names.retain(|n| n.starts_with(word));
        names.sort();
        names.dedup();
        (names, word.to_string())
    }

    /// 確定済みバッファ（解析できれば保留中の入力も含む）を検査した環境。
    fn checked_for_completion(&self, pending: &str) -> Checked {
        let with_pending = snapshot::join(self.store.current_text(), pending);
        let program = parse_program(&with_pending)
            .or_else(|_| parse_program(self.store.current_text()))
            .unwrap_or(Program { stmts: Vec::new() });
        self.check_text(&program)
    }

    /// `:type` / `:detail` の表示行。見つからなければ `None`。
    pub fn type_info(&self, name: &str, detailed: bool) -> Option<Vec<String>> {
        let site = self.index.lookup(name)?;
        let mut lines = vec![format!("declaration in: {}", site.file)];
        lines.extend(site.signature.iter().cloned());
        if detailed {
            lines.extend(site.members.iter().map(|m| format!("    {}", m)));
        }
        Some(lines)
    }

    pub fn doc_info(&self, name: &str) -> Option<String> {
        let site = self.index.lookup(name)?;
        Some(
            site.doc
                .clone()
                .unwrap_or_else(|| format!("no documentation for {}", name)),
        )
    }

    pub fn source_info(&self, name: &str) -> Option<String> {
        self.index.lookup(name).map(|s| s.source.clone())
    }

    /// 受理済みバッファの全文（`:print`）。
    pub fn print(&self) -> &str {
        self.store.current_text()
    }

    /// `:clear`。前置きだけに戻し、出力カーソルとバッファ側の宣言を捨てる。
    pub fn reset(&mut self) {
        self.store.reset();
        self.cursor.reset();
        self.index.clear_buffer();
    }
}

/// 末尾の文が `;` で終わっていなければ、最後の字句の直後に `;` を補う。
/// 単独で解析できない候補や、ブロックで終わる宣言・制御文はそのまま返す。
fn terminated(candidate: &str) -> Cow<'_, str> {
    let Ok(program) = parse_program(candidate) else {
        return Cow::Borrowed(candidate);
    };
    let Some(last_stmt) = program.stmts.last() else {
        return Cow::Borrowed(candidate);
    };
    let Ok(tokens) = lex(candidate) else {
        return Cow::Borrowed(candidate);
    };
    let Some(last) = tokens.iter().rev().find(|t| t.kind != TokenKind::EOF) else {
        return Cow::Borrowed(candidate);
    };
    let closed = match last.kind {
        TokenKind::SEMI => true,
        TokenKind::RBRACE => ends_with_block(last_stmt),
        _ => false,
    };
    if closed {
        return Cow::Borrowed(candidate);
    }
    let mut text = String::with_capacity(candidate.len() + 1);
    text.push_str(&candidate[..last.end]);
    text.push(';');
    text.push_str(&candidate[last.end..]);
    Cow::Owned(text)
}

/// 文がブロック `{ ... }` で終わり、後ろに `;` を要らないか。
fn ends_with_block(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Function { .. }
        | Stmt::Class { .. }
        | Stmt::Interface { .. }
        | Stmt::Module { .. }
        | Stmt::Block { .. }
        | Stmt::Switch { .. }
        | Stmt::Try { .. }
        | Stmt::Empty { .. } => true,
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => ends_with_block(else_branch.as_deref().unwrap_or(then_branch)),
        Stmt::While { body, .. }
        | Stmt::For { body, .. }
        | Stmt::ForOf { body, .. }
        | Stmt::ForIn { body, .. } => ends_with_block(body),
        _ => false,
    }
}

/// 行末の識別子の断片。
fn trailing_word(line: &str) -> &str {
    let start = line
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_ident_rest(*c))
        .last()
        .map_or(line.len(), |(i, _)| i);
    let word = &line[start..];
    // 数字で始まる断片は識別子ではない
    match word.char_indices().find(|(_, c)| is_ident_start(*c)) {
        Some((i, _)) => &word[i..],
        None => &line[line.len()..],
    }
}

/// `.` の直前にある受け手の式（識別子・メンバ連鎖・括弧の組・文字列リテラル）。
fn receiver_text(src: &str) -> &str {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut depth = 0usize;
    let mut start = src.len();
    let mut k = chars.len();
    while k > 0 {
        let (i, c) = chars[k - 1];
        match c {
            ')' | ']' => depth += 1,
            '(' | '[' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            '"' | '\'' if depth == 0 && k == chars.len() => {
                match chars[..k - 1].iter().rposition(|(_, q)| *q == c) {
                    Some(open) => {
                        start = chars[open].0;
                        k = open;
                        continue;
                    }
                    None => break,
                }
            }
            _ if depth > 0 => {}
            c if is_ident_rest(c) || c == '.' => {}
            _ => break,
        }
        start = i;
        k -= 1;
    }
    src[start..].trim()
}

/// 保留中のテキストで宣言された名前。途中までの入力でも字句単位で拾う。
fn declared_names(pending: &str) -> Vec<String> {
    let Ok(tokens) = lex(pending) else {
        return Vec::new();
    };
    tokens
        .windows(2)
        .filter(|w| {
            matches!(
                w[0].kind,
                TokenKind::VAR | TokenKind::LET | TokenKind::CONST | TokenKind::FUNCTION | TokenKind::CLASS
            ) && w[1].kind == TokenKind::IDENT
        })
        .map(|w| w[1].value.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> IncrementalSession {
        IncrementalSession::new(SessionConfig::default())
    }

    #[test]
    /// 行末の語と受け手の式の切り出し。
    fn word_and_receiver_extraction() {
        assert_eq!(trailing_word("console.lo"), "lo");
        assert_eq!(trailing_word("x + "), "");
        assert_eq!(trailing_word("a1"), "a1");
        assert_eq!(trailing_word("12"), "");
        assert_eq!(receiver_text("let n = foo.bar"), "foo.bar");
        assert_eq!(receiver_text("f(g(1), [2])"), "f(g(1), [2])");
        assert_eq!(receiver_text("x + 'abc'"), "'abc'");
        assert_eq!(receiver_text("(a"), "a");
    }

    #[test]
    /// 検査はバッファを変えず、版番号だけを進める。
    fn probes_leave_buffer_untouched() {
        let mut s = session();
        let text = s.current_text().to_string();
        let v0 = s.version();
        assert!(s.syntax_errors("let x: number = 1;").is_empty());
        let errs = s.semantic_errors("let y: string = 1;");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, DiagnosticKind::Semantic);
        assert_eq!(s.current_text(), text);
        assert_eq!(s.version(), v0 + 2);
    }

    #[test]
    /// 入力末尾で途切れた構文は継続扱いの診断になる。
    fn incomplete_syntax_is_flagged() {
        let mut s = session();
        let errs = s.syntax_errors("function f() {");
        assert_eq!(errs.len(), 1);
        assert!(errs[0].incomplete);
        let errs = s.syntax_errors("let = 3;");
        assert!(!errs[0].incomplete);
    }

    #[test]
    /// 確定後の差分は新しい文の出力だけで、2 回目は空。
    fn emit_delta_returns_only_new_lines() {
        let mut s = session();
        s.commit("let a: number = 1;");
        assert_eq!(s.emit_delta().unwrap(), "var a = 1;");
        assert_eq!(s.emit_delta().unwrap(), "");
        s.commit("interface P { x: number }");
        assert_eq!(s.emit_delta().unwrap(), "");
        s.commit("a + 1;");
        assert_eq!(s.emit_delta().unwrap(), "a + 1;");
    }

    #[test]
    /// 出力できない構文は確定前に見つかり、バッファは変わらない。
    fn emit_probe_catches_unsupported_constructs() {
        let mut s = session();
        let text = s.current_text().to_string();
        let errs = s.emit_errors("super.foo;");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, DiagnosticKind::Emit);
        assert_eq!(errs[0].info.line, Some(1));
        assert!(s.emit_errors("let fine = 1;").is_empty());
        assert_eq!(s.current_text(), text);
    }

    #[test]
    /// 以前の文の型エラーは --force で確定済みでも再報告しない。
    fn diagnostics_only_cover_candidate() {
        let mut s = session();
        s.commit("let bad: string = 1;");
        assert!(s.semantic_errors("let ok = 2;").is_empty());
    }

    #[test]
    /// 末尾の文だけを `;` で閉じ、ブロックで終わる文や閉じ済みの文は変えない。
    fn trailing_statement_is_terminated() {
        struct Case {
            src: &'static str,
            want: &'static str,
        }
        let cases = [
            Case { src: "inc()", want: "inc();" },
            Case { src: "let x = 1 // one", want: "let x = 1; // one" },
            Case { src: "let f = function () {}", want: "let f = function () {};" },
            Case { src: "if (ok) n = 1", want: "if (ok) n = 1;" },
            Case { src: "do { n++ } while (n < 3)", want: "do { n++ } while (n < 3);" },
            Case { src: "a;\nb", want: "a;\nb;" },
            Case { src: "a + 1;", want: "a + 1;" },
            Case { src: "function f() {}", want: "function f() {}" },
            Case { src: "if (ok) { n = 1 }", want: "if (ok) { n = 1 }" },
            Case { src: "interface P { x: number }", want: "interface P { x: number }" },
            Case { src: "let = ", want: "let = " },
            Case { src: "// only a comment", want: "// only a comment" },
        ];
        for case in &cases {
            assert_eq!(terminated(case.src), case.want, "{}", case.src);
        }
    }

    #[test]
    /// 以前の文から候補へ跨る診断は候補の診断として報告する。
    fn diagnostics_reaching_into_candidate_are_kept() {
        let mut s = session();
        s.store.commit("let x = 1");
        let errs = s.semantic_errors("(2 + 3)");
        assert_eq!(errs.len(), 1, "{:?}", errs);
        assert_eq!(errs[0].info.code, "TYP2349");
    }

    #[test]
    /// 補完は大域名・保留中の宣言・キーワード・メンバ名から選ぶ。
    fn completion_sources() {
        let mut s = session();
        s.commit("let counter = 1;");
        let (names, word) = s.completions_at("", "cou");
        assert_eq!(word, "cou");
        assert_eq!(names, vec!["counter".to_string()]);

        let (names, _) = s.completions_at("function helper() {", "hel");
        assert_eq!(names, vec!["helper".to_string()]);

        let (names, word) = s.completions_at("", "console.l");
        assert_eq!(word, "l");
        assert_eq!(names, vec!["log".to_string()]);

        let (names, _) = s.completions_at("", "'abc'.toU");
        assert_eq!(names, vec!["toUpperCase".to_string()]);

        let (names, _) = s.completions_at("", "whi");
        assert!(names.contains(&"while".to_string()));

        let (names, word) = s.completions_at("", ":d");
        assert_eq!(word, ":d");
        assert_eq!(names, vec![":detail".to_string(), ":doc".to_string()]);
        assert!(s.current_text().ends_with("let counter = 1;\n"));
    }

    #[test]
    /// 記号の問い合わせは宣言ファイルを先に探す。
    fn symbol_queries() {
        let mut s = session();
        s.commit("/** 足し算 */\nfunction add(a: number, b: number) { return a + b; }");
        let v = s.version();
        let info = s.type_info("add", false).unwrap();
        assert_eq!(info[0], format!("declaration in: {}", REPL_FILE));
        assert_eq!(info[1], "function add(a: number, b: number): number");
        assert_eq!(s.doc_info("add").as_deref(), Some("足し算"));
        assert!(s.source_info("add").unwrap().contains("return a + b;"));

        let console = s.type_info("console", false).unwrap();
        assert_eq!(console[0], format!("declaration in: {}", LIB_CORE_NAME));
        let detail = s.type_info("Console", true).unwrap();
        assert!(detail.iter().any(|l| l.starts_with("    log(")));

        assert!(s.type_info("foo123", false).is_none());
        assert_eq!(s.version(), v);
    }

    #[test]
    /// 初期化で前置きへ戻り、出力カーソルもやり直す。
    fn reset_restores_preamble() {
        let mut s = session();
        let preamble = s.current_text().to_string();
        assert!(preamble.contains(&format!("/// <reference path=\"{}\" />", LIB_NODE_NAME)));
        s.commit("let a = 1;");
        s.emit_delta().unwrap();
        s.reset();
        assert_eq!(s.print(), preamble);
        assert!(s.type_info("a", false).is_none());
        s.commit("let a = 2;");
        assert_eq!(s.emit_delta().unwrap(), "var a = 2;");
    }

    #[test]
    /// typings ディレクトリの宣言ファイルを自動で参照する。
    fn auto_reference_typings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("extra.d.ts"), "declare var extraValue: number;").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let config = SessionConfig {
            auto_reference_typings: true,
            typings_dir: dir.path().to_path_buf(),
            ..SessionConfig::default()
        };
        let mut s = IncrementalSession::new(config);
        assert_eq!(s.ambient_names().len(), 3);
        assert!(s.semantic_errors("extraValue + 1;").is_empty());
        assert!(s.current_text().contains("extra.d.ts"));
    }
}
