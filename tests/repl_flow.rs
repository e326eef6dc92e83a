// パス: tests/repl_flow.rs
// 役割: 台本つきの行入力で REPL を端から端まで動かす結合テスト
// 意図: プロンプト遷移・確定手順・メタコマンド・終了コードを外から観測する
// 関連ファイル: tests/test_support.rs, src/repl/cmd.rs
#[path = "test_support.rs"]
mod support;

use support::{lines, run_script, run_script_with_io, MapIo, ScriptEvent};
use tsun::repl::ReplOptions;

fn options() -> ReplOptions {
    ReplOptions::default()
}

#[test]
/// 式を 1 行入力すると値が表示され、プロンプトは既定のまま。
fn expression_prints_value() {
    let t = run_script(options(), lines(&["1 + 1"]));
    assert_eq!(t.out_lines(), vec!["2", ""]);
    assert_eq!(t.prompts, vec!["> ", "> "]);
    assert_eq!(t.exit, 0);
    assert!(t.stderr.is_empty(), "{}", t.stderr);
}

#[test]
/// 開いた波括弧は継続プロンプトになり、閉じたところで実行される。
fn open_brace_continues() {
    let t = run_script(options(), lines(&["function f() {", "}"]));
    assert_eq!(t.prompts, vec!["> ", "..", "> "]);
    assert_eq!(t.out_lines(), vec!["undefined", ""]);
}

#[test]
/// 括弧は閉じていても文が途中なら続きを待つ。
fn incomplete_statement_waits_for_more() {
    let t = run_script(options(), lines(&["let x =", "5;", "x"]));
    assert_eq!(t.prompts, vec!["> ", "..", "> ", "> "]);
    assert_eq!(t.out_lines(), vec!["undefined", "5", ""]);
}

#[test]
/// 入れ子の深さだけ継続プロンプトが伸びる。
fn nested_blocks_deepen_prompt() {
    let t = run_script(
        options(),
        lines(&["function g(n: number) {", "  if (n > 0) {", "    return n;", "  }", "  return 0;", "}", "g(3)"]),
    );
    assert_eq!(t.prompts[..7], ["> ", "..", "....", "....", "..", "..", "> "]);
    assert_eq!(t.out_lines(), vec!["undefined", "3", ""]);
}

#[test]
/// 型エラーの入力は実行も確定もされない。
fn type_errors_are_rejected() {
    let t = run_script(options(), lines(&["let s: string = 1;", "s"]));
    assert_eq!(t.out_lines(), vec![""]);
    let err = t.err_lines();
    assert_eq!(err.len(), 2, "{:?}", err);
    assert!(err[0].starts_with("[TYP2322]"), "{}", err[0]);
    assert!(err[1].starts_with("[TYP2304]"), "{}", err[1]);
}

#[test]
/// --force では型エラーを警告にして実行する。
fn force_runs_despite_type_errors() {
    let opts = ReplOptions {
        force: true,
        ..options()
    };
    let t = run_script(opts, lines(&["let s: string = 1;", "s"]));
    assert!(t.stderr.contains("[TYP2322]"));
    assert_eq!(t.out_lines(), vec!["undefined", "1", ""]);
}

#[test]
/// 構文エラーは報告だけで、続く入力は普通に評価される。
fn syntax_errors_are_reported() {
    let t = run_script(options(), lines(&["let = 3;", "2 * 4"]));
    assert!(t.stderr.contains("[SYN"), "{}", t.stderr);
    assert_eq!(t.out_lines(), vec!["8", ""]);
}

#[test]
/// 例外で中断しても、それまでの束縛は残る。
fn throw_keeps_earlier_bindings() {
    let t = run_script(
        options(),
        lines(&["let kept = 1;", "throw new Error('boom');", "kept + 1"]),
    );
    assert_eq!(t.out_lines(), vec!["undefined", "Error: boom", "2", ""]);
    assert_eq!(t.exit, 0);
}

#[test]
/// console.log はスクリプトの出力として流れ、式の値は undefined。
fn console_output_is_forwarded() {
    let t = run_script(options(), lines(&["console.log('hi', 1 + 2)"]));
    assert_eq!(t.console, vec!["hi 3"]);
    assert_eq!(t.out_lines(), vec!["undefined", ""]);
}

#[test]
/// process.exit は REPL をその終了コードで終える。
fn process_exit_ends_session() {
    let t = run_script(options(), lines(&["process.exit(4)", "1 + 1"]));
    assert_eq!(t.exit, 4);
    assert_eq!(t.prompts.len(), 1);
    assert!(!t.out_lines().contains(&"2"));
}

#[test]
/// :clear で前置きだけのバッファに戻り、以前の名前は消える。
fn clear_resets_buffer() {
    let t = run_script(
        options(),
        lines(&["let a = 1;", ":clear", ":type a", ":print", "a"]),
    );
    let out = t.out_lines();
    assert!(out.contains(&"identifier a not found"));
    assert!(out.iter().any(|l| l.starts_with("/// <reference path=")));
    assert!(!t.stdout.contains("let a = 1;"));
    assert!(t.stderr.contains("[TYP2304]"));
}

#[test]
/// 問い合わせは名前が無ければ断り、未知の名前なら見つからない旨を返す。
fn queries_report_missing_names() {
    let t = run_script(options(), lines(&[":type", ":type foo123", ":doc foo123"]));
    assert_eq!(
        t.out_lines(),
        vec![
            ":type command need names!",
            "identifier foo123 not found",
            "identifier foo123 not found",
            "",
        ]
    );
}

#[test]
/// :type は宣言場所と型を表示する。
fn type_query_shows_declaration() {
    let t = run_script(
        options(),
        lines(&["function add(a: number, b: number) { return a + b; }", ":type add"]),
    );
    let out = t.out_lines();
    assert!(out.contains(&"declaration in: TSUN.repl.generated.ts"), "{:?}", out);
    assert!(out.contains(&"function add(a: number, b: number): number"));
}

#[test]
/// :print は確定済みの入力をそのまま見せる。
fn print_shows_committed_code() {
    let t = run_script(options(), lines(&["let p = 1;", "let q = p + 1;", ":print"]));
    let out = t.out_lines();
    let tail: Vec<&str> = out.iter().rev().skip(1).take(2).rev().copied().collect();
    assert_eq!(tail, vec!["let p = 1;", "let q = p + 1;"]);
}

#[test]
/// :load は複数ファイルを 1 つの入力として評価する。
fn load_evaluates_files() {
    let io = MapIo::with(&[
        ("lib.ts", "function twice(n: number) { return n * 2; }"),
        ("use.ts", "let answer = twice(21);"),
    ]);
    let t = run_script_with_io(options(), lines(&[":load lib.ts use.ts", "answer"]), &io);
    assert_eq!(t.out_lines(), vec!["undefined", "42", ""]);
}

#[test]
/// :load は引数が無いときと読めないときに失敗を伝える。
fn load_failures_are_reported() {
    let t = run_script(options(), lines(&[":load", ":load nope.ts"]));
    assert_eq!(t.out_lines(), vec![":load command need file names!", ""]);
    assert!(t.stderr.contains("cannot read nope.ts"));
}

#[test]
/// 貼り付けモードは EOF で評価し、貼り付けた行は履歴に残さない。
fn paste_mode_round_trip() {
    let events = vec![
        ScriptEvent::Line(":paste"),
        ScriptEvent::Line("let x = 1"),
        ScriptEvent::Line("x + 1"),
        ScriptEvent::Eof,
        ScriptEvent::Line("x * 10"),
        ScriptEvent::Eof,
    ];
    let t = run_script(options(), events);
    let out = t.out_lines();
    assert!(out[0].contains("entering paste mode"));
    assert!(out.contains(&"evaluating..."));
    assert!(out.contains(&"2"));
    assert!(out.contains(&"10"));
    assert_eq!(t.prompts, vec!["> ", "", "", "", "> ", "> "]);
    assert_eq!(t.history, vec![":paste", "x * 10"]);
}

#[test]
/// Ctrl-C は保留中の入力を捨てて既定のプロンプトへ戻す。
fn interrupt_discards_pending_input() {
    let events = vec![
        ScriptEvent::Line("function g() {"),
        ScriptEvent::Interrupt,
        ScriptEvent::Line("1"),
        ScriptEvent::Eof,
    ];
    let t = run_script(options(), events);
    assert_eq!(t.prompts, vec!["> ", "..", "> ", "> "]);
    assert_eq!(t.out_lines(), vec!["1", ""]);
}

#[test]
/// 空行 2 つで組み立て中の入力を捨てる。
fn two_blank_lines_abandon_input() {
    let t = run_script(options(), lines(&["let o = {", "", "", "o"]));
    assert_eq!(t.prompts[..4], ["> ", "..", "..", "> "]);
    assert!(t.out_lines().contains(&"You typed two blank lines! start new command"));
    assert!(t.stderr.contains("[TYP2304]"));
}

#[test]
/// Tab 補完は確定済みの名前を返す。
fn completion_sees_committed_names() {
    let events = vec![
        ScriptEvent::Line("let counter = 1;"),
        ScriptEvent::Complete("cou"),
        ScriptEvent::Complete("console.l"),
        ScriptEvent::Eof,
    ];
    let t = run_script(options(), events);
    assert_eq!(t.completions[0], (vec!["counter".to_string()], "cou".to_string()));
    assert_eq!(t.completions[1], (vec!["log".to_string()], "l".to_string()));
}

#[test]
/// --verbose では実行する出力スクリプトを先に表示する。
fn verbose_echoes_emitted_script() {
    let opts = ReplOptions {
        verbose: true,
        ..options()
    };
    let t = run_script(opts, lines(&["let v: number = 2;", "interface I { a: number }"]));
    assert_eq!(t.out_lines(), vec!["var v = 2;", "undefined", "undefined", ""]);
}

#[test]
/// --dere の :baka でプロンプトが変わり、エラーに一言添えられる。
fn dere_prompts_and_scolding() {
    let opts = ReplOptions {
        dere: true,
        ..options()
    };
    let t = run_script(opts, lines(&[":baka", "let = ;"]));
    assert_eq!(t.prompts[1], "ξ(ﾟ⊿ﾟ)ξ> ");
    assert!(t.stdout.contains("URUSAI URUSAI URUSAI"));
    assert!(t.stdout.starts_with("TSUN I'm- I'm not making this repl"));
}

#[test]
/// :help はコマンド一覧を表示する。
fn help_lists_commands() {
    let t = run_script(options(), lines(&[":help"]));
    for cmd in [":type", ":detail", ":doc", ":source", ":clear", ":print", ":paste", ":load"] {
        assert!(t.stdout.contains(cmd), "missing {cmd}");
    }
    assert!(!t.stdout.contains(":baka"));
}

#[test]
/// セミコロンの無い入力は次の行と繋がらず、前の文が再実行されない。
fn unterminated_lines_stay_separate() {
    let t = run_script(
        options(),
        lines(&[
            "let calls = 0;",
            "function inc() { calls++; return ['xy']; }",
            "inc()",
            "[0].length",
            "calls",
        ]),
    );
    assert_eq!(t.out_lines(), vec!["undefined", "undefined", "[ 'xy' ]", "1", "1", ""]);
    assert!(t.stderr.is_empty(), "{}", t.stderr);

    let t = run_script(options(), lines(&["5 % 3", "-5 % 3"]));
    assert_eq!(t.out_lines(), vec!["2", "-2", ""]);

    let t = run_script(options(), lines(&["let x = 1", "(2 + 3)"]));
    assert_eq!(t.out_lines(), vec!["undefined", "5", ""]);
    assert!(t.stderr.is_empty(), "{}", t.stderr);
}
