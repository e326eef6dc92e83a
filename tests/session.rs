// パス: tests/session.rs
// 役割: 追記専用バッファ・版番号・出力差分・記号問い合わせの結合テスト
// 意図: 検査が失敗してもバッファが変わらないこと、差分が重複しないことを公開 API から確かめる
// 関連ファイル: src/session/mod.rs, src/session/snapshot.rs, src/session/delta.rs
use tsun::session::{
    AmbientFile, DiagnosticKind, Heuristic, IncrementalSession, SessionConfig, LIB_CORE_NAME,
    LIB_NODE_NAME, REPL_FILE,
};

fn session() -> IncrementalSession {
    IncrementalSession::new(SessionConfig::default())
}

fn session_with(heuristic: Heuristic) -> IncrementalSession {
    IncrementalSession::new(SessionConfig {
        heuristic,
        ..SessionConfig::default()
    })
}

#[test]
/// 失敗した検査は構文・型・出力のどれでもバッファを変えない。
fn failed_probes_leave_text_unchanged() {
    let mut s = session();
    s.commit("let base = 1;");
    let before = s.current_text().to_string();
    struct Case {
        src: &'static str,
        kind: DiagnosticKind,
    }
    let cases = [
        Case { src: "let = 1;", kind: DiagnosticKind::Syntax },
        Case { src: "let n: number = 'x';", kind: DiagnosticKind::Semantic },
        Case { src: "undefinedName + 1;", kind: DiagnosticKind::Semantic },
        Case { src: "super.x;", kind: DiagnosticKind::Emit },
    ];
    for case in &cases {
        let errs = match case.kind {
            DiagnosticKind::Syntax => s.syntax_errors(case.src),
            DiagnosticKind::Semantic => s.semantic_errors(case.src),
            DiagnosticKind::Emit => s.emit_errors(case.src),
        };
        assert!(!errs.is_empty(), "{} should fail", case.src);
        assert!(errs.iter().all(|d| d.kind == case.kind), "{}: {:?}", case.src, errs);
        assert_eq!(s.current_text(), before, "{} changed the buffer", case.src);
    }
}

#[test]
/// 版番号は検査でも確定でも単調に増える。
fn version_is_monotonic() {
    let mut s = session();
    let mut last = s.version();
    let mut step = |v: u64| {
        assert!(v > last, "{} !> {}", v, last);
        last = v;
    };
    s.syntax_errors("1;");
    step(s.version());
    s.semantic_errors("1;");
    step(s.version());
    s.commit("1;");
    step(s.version());
    s.reset();
    step(s.version());
}

#[test]
/// 問い合わせは版番号を進めない。
fn queries_do_not_bump_version() {
    let mut s = session();
    s.commit("let a = 1;");
    let v = s.version();
    assert!(s.type_info("foo123", false).is_none());
    assert_eq!(s.doc_info("a").as_deref(), Some("no documentation for a"));
    assert!(s.source_info("a").is_some());
    assert_eq!(s.print(), s.current_text());
    assert_eq!(s.version(), v);
}

#[test]
/// 確定は末尾への追記で、各候補は改行で終わる。
fn commits_append_in_order() {
    let mut s = session();
    let preamble = s.current_text().to_string();
    s.commit("let a = 1;");
    s.commit("let b = a + 1;");
    assert_eq!(s.current_text(), format!("{}let a = 1;\nlet b = a + 1;\n", preamble));
}

#[test]
/// どちらの差分方式でも、差分は新しい出力だけで再取得すると空になる。
fn delta_is_idempotent_for_both_heuristics() {
    for heuristic in [Heuristic::Diff, Heuristic::LineCount] {
        let mut s = session_with(heuristic);
        s.commit("function sq(n: number) { return n * n; }");
        assert_eq!(
            s.emit_delta().unwrap(),
            "function sq(n) {\n    return n * n;\n}",
            "{:?}",
            heuristic
        );
        assert_eq!(s.emit_delta().unwrap(), "", "{:?}", heuristic);
        s.commit("let r = sq(3);");
        assert_eq!(s.emit_delta().unwrap(), "var r = sq(3);", "{:?}", heuristic);
        assert_eq!(s.emit_delta().unwrap(), "", "{:?}", heuristic);
    }
}

#[test]
/// 型だけの宣言は出力差分を生まない。
fn type_only_declarations_emit_nothing() {
    let mut s = session();
    s.commit("interface Point { x: number; y: number }");
    assert_eq!(s.emit_delta().unwrap(), "");
    s.commit("type Label = string | Point;");
    assert_eq!(s.emit_delta().unwrap(), "");
    s.commit("let p: Point = { x: 1, y: 2 };");
    assert_eq!(s.emit_delta().unwrap(), "var p = { x: 1, y: 2 };");
}

#[test]
/// 診断の行番号は候補の先頭を 1 行目として数える。
fn diagnostics_are_relative_to_candidate() {
    let mut s = session();
    s.commit("let a = 1;\nlet b = 2;\nlet c = 3;");
    let errs = s.semantic_errors("let ok = 1;\nlet bad: string = 2;");
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].info.line, Some(2));
    assert!(errs[0].message().starts_with("[TYP2322]"));
}

#[test]
/// 確定済みの宣言と重複する let は再宣言エラー。
fn redeclaration_across_entries() {
    let mut s = session();
    s.commit("let once = 1;");
    let errs = s.semantic_errors("let once = 2;");
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].info.code, "TYP2451");
    assert!(s.semantic_errors("var many = 1;").is_empty());
}

#[test]
/// 宣言ファイルは組み込みの 2 つが登録順に並ぶ。
fn builtin_ambient_files() {
    let s = session();
    assert_eq!(s.ambient_names(), vec![LIB_CORE_NAME, LIB_NODE_NAME]);
    let text = s.current_text();
    assert!(text.starts_with(&format!("/// <reference path=\"{}\" />\n", LIB_CORE_NAME)));
}

#[test]
/// 明示した宣言ファイルの記号も問い合わせられ、構文エラーのものは無視される。
fn explicit_ambient_files() {
    let files = vec![
        AmbientFile {
            name: "shapes.d.ts".into(),
            text: "/** 円 */\ndeclare class Circle { radius: number; area(): number; }".into(),
        },
        AmbientFile {
            name: "broken.d.ts".into(),
            text: "declare var = ;".into(),
        },
    ];
    let mut s = IncrementalSession::with_ambient(SessionConfig::default(), files);
    assert_eq!(s.ambient_names(), vec!["shapes.d.ts"]);
    let info = s.type_info("Circle", false).unwrap();
    assert_eq!(info[0], "declaration in: shapes.d.ts");
    assert_eq!(s.doc_info("Circle").as_deref(), Some("円"));
    assert!(s.semantic_errors("new Circle().area() + 1;").is_empty());
}

#[test]
/// バッファの宣言が見つかり、再確定した名前は最初の宣言を返す。
fn lookup_prefers_first_declaration() {
    let mut s = session();
    s.commit("var dup = 1;");
    s.commit("var dup = 2;");
    let src = s.source_info("dup").unwrap();
    assert!(src.contains("dup = 1"), "{}", src);
    let info = s.type_info("dup", false).unwrap();
    assert_eq!(info[0], format!("declaration in: {}", REPL_FILE));
}

#[test]
/// 補完候補は前置きの宣言とバッファの名前を合わせて返し、バッファを変えない。
fn completions_do_not_commit() {
    let mut s = session();
    s.commit("let alpha = 1;");
    let before = s.current_text().to_string();
    let (names, word) = s.completions_at("let alphabet = 2;\n", "alp");
    assert_eq!(word, "alp");
    assert!(names.contains(&"alpha".to_string()));
    assert!(names.contains(&"alphabet".to_string()));
    assert_eq!(s.current_text(), before);
}

#[test]
/// セミコロンの無い候補は閉じてから確定し、次の入力の差分に前の文が混ざらない。
fn unterminated_commits_do_not_merge() {
    let mut s = session();
    let preamble = s.current_text().to_string();
    s.commit("let x = 1");
    assert_eq!(s.emit_delta().unwrap(), "var x = 1;");
    assert!(s.syntax_errors("(2 + 3)").is_empty());
    assert!(s.semantic_errors("(2 + 3)").is_empty());
    s.commit("(2 + 3)");
    assert_eq!(s.current_text(), format!("{}let x = 1;\n(2 + 3);\n", preamble));
    assert_eq!(s.emit_delta().unwrap(), "(2 + 3);");
}

#[test]
/// 補助関数つきの行数方式でも、継承の追加で以前の行が差分に戻らない。
fn line_count_with_helpers_keeps_prefix_stable() {
    let mut s = IncrementalSession::new(SessionConfig {
        heuristic: Heuristic::LineCount,
        emit_helpers: true,
        ..SessionConfig::default()
    });
    s.commit("let count = 0;");
    let first = s.emit_delta().unwrap();
    assert!(first.contains("var __extends"), "{}", first);
    assert!(first.ends_with("var count = 0;"), "{}", first);
    s.commit("count++;");
    assert_eq!(s.emit_delta().unwrap(), "count++;");
    s.commit("class A {}\nclass B extends A {}");
    let delta = s.emit_delta().unwrap();
    assert!(delta.starts_with("var A"), "{}", delta);
    assert!(!delta.contains("var count"), "{}", delta);
    assert!(!delta.contains("count++"), "{}", delta);
    assert!(!delta.contains("__extends = "), "{}", delta);
}
