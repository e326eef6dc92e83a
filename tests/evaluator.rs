// パス: tests/evaluator.rs
// 役割: 評価器の結合テスト（値の表示・組み込み関数・ホストモジュール・モジュール読み込み）
// 意図: REPL が表示する値の形式と、出力スクリプトが頼る実行時の振る舞いを固定する
// 関連ファイル: src/evaluator.rs, src/runtime.rs, src/primitives.rs, src/capabilities.rs
#[path = "test_support.rs"]
mod support;

use support::eval_inspect;
use tsun::evaluator::Interpreter;
use tsun::runtime::{capture_output, describe_thrown, RuntimeFailure};

struct Case {
    js: &'static str,
    shown: &'static str,
}

#[test]
/// 値は対話環境向けの形式で表示される。
fn inspect_table() {
    let cases = [
        Case { js: "'a\\'b';", shown: "'a\\'b'" },
        Case { js: "[1, 'x', [true]];", shown: "[ 1, 'x', [ true ] ]" },
        Case { js: "({ a: 1, 'b-c': null });", shown: "{ a: 1, 'b-c': null }" },
        Case { js: "[];", shown: "[]" },
        Case { js: "function named() {} named;", shown: "[Function: named]" },
        Case { js: "(function () {});", shown: "[Function (anonymous)]" },
        Case { js: "var o = {}; o.self = o; o;", shown: "{ self: [Circular] }" },
        Case { js: "new RangeError('r');", shown: "[RangeError: r]" },
        Case { js: "({ a: { b: { c: { d: 1 } } } });", shown: "{ a: { b: { c: [Object] } } }" },
        Case { js: "0.1 + 0.2;", shown: "0.30000000000000004" },
        Case { js: "1 / 0;", shown: "Infinity" },
        Case { js: "void 0;", shown: "undefined" },
    ];
    for case in &cases {
        assert_eq!(eval_inspect(case.js), case.shown, "{}", case.js);
    }
}

#[test]
/// 組み込みの配列・文字列・Math・JSON。
fn builtins_table() {
    let cases = [
        Case { js: "[3, 1, 2].sort().join('-');", shown: "'1-2-3'" },
        Case { js: "[1, 2, 3, 4].filter(function (n) { return n % 2 === 0; }).length;", shown: "2" },
        Case { js: "[1, 2, 3].reduce(function (a, b) { return a + b; }, 10);", shown: "16" },
        Case { js: "'Hello'.toUpperCase() + 'x'.charCodeAt(0);", shown: "'HELLO120'" },
        Case { js: "'a,b,c'.split(',').length;", shown: "3" },
        Case { js: "Math.max(1, 7, 3) + Math.floor(2.7);", shown: "9" },
        Case { js: "JSON.stringify({ a: [1, 'x'] });", shown: "'{\"a\":[1,\"x\"]}'" },
        Case { js: "JSON.parse('{\"k\": 2}').k;", shown: "2" },
        Case { js: "parseInt('42px') + parseFloat('0.5');", shown: "42.5" },
        Case { js: "Object.keys({ x: 1, y: 2 }).join();", shown: "'x,y'" },
        Case { js: "typeof null + typeof [] + typeof 'a';", shown: "'objectobjectstring'" },
    ];
    for case in &cases {
        assert_eq!(eval_inspect(case.js), case.shown, "{}", case.js);
    }
}

#[test]
/// console.log は値を空白区切りで 1 行にまとめる。
fn console_log_formats_arguments() {
    let (result, lines) = capture_output(|| {
        let mut interp = Interpreter::new();
        interp.run("console.log('a', 1, [2], { k: 'v' }); console.log();")
    });
    assert!(result.is_ok());
    assert_eq!(lines, vec!["a 1 [ 2 ] { k: 'v' }", ""]);
}

#[test]
/// 捕捉されない例外の説明。
fn thrown_values_are_described() {
    let mut interp = Interpreter::new();
    let Err(RuntimeFailure::Throw(v)) = interp.run("throw new TypeError('bad');") else {
        panic!("throw expected");
    };
    assert_eq!(describe_thrown(&v), "TypeError: bad");
    let Err(RuntimeFailure::Throw(v)) = interp.run("throw 42;") else {
        panic!("throw expected");
    };
    assert_eq!(describe_thrown(&v), "Uncaught 42");
    let Err(RuntimeFailure::Throw(v)) = interp.run("notDefined;") else {
        panic!("throw expected");
    };
    assert!(describe_thrown(&v).starts_with("ReferenceError"));
}

#[test]
/// process.exit は終了コードつきの中断になる。
fn process_exit_unwinds() {
    let mut interp = Interpreter::new();
    let result = interp.run("var before = 1; process.exit(7); var after = 2;");
    assert!(matches!(result, Err(RuntimeFailure::Exit(7))));
    assert_eq!(inspect_of(&mut interp, "before;"), "1");
}

#[test]
/// process.argv は渡した引数を返す。
fn argv_is_visible() {
    let mut interp = Interpreter::new();
    interp.set_argv(vec!["tsun".into(), "main.js".into(), "x".into()]);
    assert_eq!(inspect_of(&mut interp, "process.argv.slice(2);"), "[ 'x' ]");
}

#[test]
/// ホストモジュールは大域名でも require でも同じ実体。
fn host_modules() {
    let mut interp = Interpreter::new();
    assert_eq!(inspect_of(&mut interp, "path.join('a', 'b', '../c');"), "'a/c'");
    assert_eq!(inspect_of(&mut interp, "require('path') === path;"), "true");
    assert_eq!(inspect_of(&mut interp, "path.extname('x.ts');"), "'.ts'");
    let err = interp.run("require('nope');").unwrap_err();
    assert!(err.to_string().contains("Cannot find module 'nope'"));
}

#[test]
/// 相対 require はファイルをモジュールとして読み込み、結果をキャッシュする。
fn relative_modules_are_cached() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("counter.js"),
        "var n = 0; exports.next = function () { n += 1; return n; };",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("main.js"),
        "var a = require('./counter'); var b = require('./counter.js');\n\
         module.exports = [a.next(), b.next(), a === b];",
    )
    .unwrap();
    let mut interp = Interpreter::new();
    let exported = interp.run_module(&dir.path().join("main.js")).unwrap();
    assert_eq!(tsun::runtime::inspect(&exported), "[ 1, 2, true ]");
}

fn inspect_of(interp: &mut Interpreter, js: &str) -> String {
    tsun::runtime::inspect(&interp.run(js).expect("run"))
}
