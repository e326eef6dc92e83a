// パス: tests/checker.rs
// 役割: 型検査器の結合テスト（診断コードの表・正常系・オプション）
// 意図: 組み込みの宣言ファイルと一緒に検査したときの振る舞いを固定する
// 関連ファイル: src/checker/mod.rs, lib/lib.core.d.ts, lib/node.d.ts
#[path = "test_support.rs"]
mod support;

use support::check_codes;
use tsun::checker::CheckOptions;

struct Case {
    src: &'static str,
    codes: &'static [&'static str],
    note: &'static str,
}

fn run_cases(cases: &[Case], options: CheckOptions) {
    for case in cases {
        let got = check_codes(case.src, options);
        assert_eq!(got, case.codes, "{}: {}", case.note, case.src);
    }
}

#[test]
/// 代表的な誤りが対応する診断コードで報告される。
fn error_codes_table() {
    let cases = [
        Case { src: "let s: string = 1;", codes: &["TYP2322"], note: "代入不可" },
        Case { src: "missing + 1;", codes: &["TYP2304"], note: "未定義の名前" },
        Case {
            src: "function f(a: number) { return a; }\nf(1, 2);",
            codes: &["TYP2554"],
            note: "引数の個数",
        },
        Case {
            src: "function f(a: number) { return a; }\nf('x');",
            codes: &["TYP2345"],
            note: "引数の型",
        },
        Case { src: "let o = { a: 1 };\no.b;", codes: &["TYP2339"], note: "無いプロパティ" },
        Case { src: "let s = 'a';\ns.nope;", codes: &["TYP2339"], note: "文字列に無いメンバ" },
        Case {
            src: "let o: { [k: number]: string } = {};\no.foo;",
            codes: &["TYP2339"],
            note: "数値添字は名前に当てはまらない",
        },
        Case {
            src: "let o: { [k: string]: number } = {};\nlet n: number = o.foo;",
            codes: &[],
            note: "文字列添字は任意の名前に当てはまる",
        },
        Case { src: "const c = 1;\nc = 2;", codes: &["TYP2588"], note: "const への代入" },
        Case { src: "let x = 1;\nlet x = 2;", codes: &["TYP2451"], note: "let の再宣言" },
        Case { src: "return 1;", codes: &["TYP1108"], note: "関数外の return" },
        Case { src: "break;", codes: &["TYP1105"], note: "反復文外の break" },
        Case { src: "let n = 1;\nn();", codes: &["TYP2349"], note: "呼び出せない値" },
        Case {
            src: "class A { private secret = 1; }\nnew A().secret;",
            codes: &["TYP2341"],
            note: "private メンバ",
        },
        Case {
            src: "interface P { x: number }\nlet p: P = { x: 1, y: 2 };",
            codes: &["TYP2353"],
            note: "余分なプロパティ",
        },
        Case { src: "for (const ch of 5) {}", codes: &["TYP2461"], note: "反復できない値" },
        Case { src: "import * as m from 'nope';", codes: &["TYP2307"], note: "未知のモジュール" },
        Case {
            src: "import { nothing } from 'fs';",
            codes: &["TYP2305"],
            note: "公開されていない名前",
        },
    ];
    run_cases(&cases, CheckOptions::default());
}

#[test]
/// 宣言ファイルの API を使う正しいプログラムは診断なし。
fn well_typed_programs() {
    let cases = [
        Case {
            src: "let xs = [1, 2, 3].map(x => x * 2);\nlet first: number = xs[0];",
            codes: &[],
            note: "文脈からの引数型",
        },
        Case {
            src: "class Counter { private n = 0; inc(): number { return ++this.n; } }\nnew Counter().inc() + 1;",
            codes: &[],
            note: "クラスとメソッド",
        },
        Case {
            src: "interface Named { name: string }\nfunction greet(p: Named) { return 'hi ' + p.name; }\ngreet({ name: 'x' });",
            codes: &[],
            note: "構造的な型",
        },
        Case {
            src: "console.log(process.argv.length, fs.existsSync('x'));",
            codes: &[],
            note: "ホスト API",
        },
        Case {
            src: "import * as p from 'path';\nlet j: string = p.join('a', 'b');",
            codes: &[],
            note: "名前空間 import",
        },
        Case {
            src: "function id<T>(v: T): T { return v; }\nlet s: string = id('a');",
            codes: &[],
            note: "型引数の推論",
        },
        Case {
            src: "var v = 1;\nvar v = 2;",
            codes: &[],
            note: "同じ型の var 再宣言",
        },
    ];
    run_cases(&cases, CheckOptions::default());
}

#[test]
/// noImplicitAny は注釈の無い引数を報告する。
fn no_implicit_any_toggle() {
    let src = "function f(a) { return a; }";
    assert!(check_codes(src, CheckOptions::default()).is_empty());
    let strict = CheckOptions {
        no_implicit_any: true,
        ..CheckOptions::default()
    };
    assert_eq!(check_codes(src, strict), vec!["TYP7006"]);
    // 文脈で型が決まる引数は対象外
    assert!(check_codes("[1].map(x => x);", strict).is_empty());
}

#[test]
/// noImplicitReturns は一部の経路だけ値を返す関数を報告する。
fn no_implicit_returns_toggle() {
    let src = "function g(b: boolean) { if (b) { return 1; } }";
    assert!(check_codes(src, CheckOptions::default()).is_empty());
    let strict = CheckOptions {
        no_implicit_returns: true,
        ..CheckOptions::default()
    };
    assert_eq!(check_codes(src, strict), vec!["TYP7030"]);
    assert!(check_codes("function h(b: boolean) { if (b) { return 1; } return 2; }", strict).is_empty());
}

#[test]
/// 戻り値型を宣言したのに値を返さない経路があれば報告する。
fn declared_return_type_requires_return() {
    assert_eq!(
        check_codes("function k(b: boolean): number { if (b) { return 1; } }", CheckOptions::default()),
        vec!["TYP2366"]
    );
    assert!(check_codes("function v(): void {}", CheckOptions::default()).is_empty());
}
