// パス: tests/emit.rs
// 役割: 出力器の結合テスト（下位変換したスクリプトを評価器で実行して結果を比べる）
// 意図: 文字列の一致だけでなく、変換後も意味が保たれていることを確かめる
// 関連ファイル: src/codegen/es5.rs, src/intrinsics.rs, src/evaluator.rs
#[path = "test_support.rs"]
mod support;

use support::{emit, eval_inspect, parse_program};
use tsun::codegen::{emit_program, EmitOptions};
use tsun::evaluator::Interpreter;
use tsun::runtime::inspect;

struct Case {
    src: &'static str,
    value: &'static str,
    note: &'static str,
}

#[test]
/// 下位変換したプログラムを実行すると元の意味どおりの値になる。
fn lowered_programs_keep_meaning() {
    let cases = [
        Case {
            src: "class A { constructor(public x: number) {} get() { return this.x; } }\n\
                  class B extends A { y = 2; constructor() { super(1); } get() { return super.get() + this.y; } }\n\
                  new B().get();",
            value: "3",
            note: "派生クラスと super 呼び出し",
        },
        Case {
            src: "let total = 0;\nfor (const n of [1, 2, 3]) { total += n; }\ntotal;",
            value: "6",
            note: "for-of",
        },
        Case {
            src: "function f(a = 10, b?: number) { return a + (b || 0); }\nf() + f(1, 2);",
            value: "13",
            note: "既定値引数",
        },
        Case {
            src: "function count(first: string, ...rest: number[]) { return first + rest.length; }\ncount('n', 4, 5, 6);",
            value: "'n3'",
            note: "残余引数",
        },
        Case {
            src: "const base = { a: 1 };\nconst o = { ...base, b: 2 };\no.a + o.b;",
            value: "3",
            note: "オブジェクトスプレッド",
        },
        Case {
            src: "const who = 'ts';\n`hi ${who}, ${1 + 1}!`;",
            value: "'hi ts, 2!'",
            note: "テンプレート文字列",
        },
        Case {
            src: "class C { v = 5; get() { return [1].map(() => this.v)[0]; } }\nnew C().get();",
            value: "5",
            note: "アロー関数の this 捕捉",
        },
        Case { src: "2 ** 10;", value: "1024", note: "べき乗" },
        Case {
            src: "class S { static made = 0; static make() { S.made++; return new S(); } }\nS.make(); S.make(); S.made;",
            value: "2",
            note: "static メンバ",
        },
    ];
    for case in &cases {
        let js = emit(case.src);
        let mut interp = Interpreter::new();
        let got = interp
            .run(&js)
            .map(|v| inspect(&v))
            .unwrap_or_else(|e| panic!("{}: {}\n{}", case.note, e, js));
        assert_eq!(got, case.value, "{}\n{}", case.note, js);
    }
}

#[test]
/// 補助関数つきの出力は、ネイティブの補助関数を持つ評価器でもそのまま動く。
fn helpers_are_compatible_with_runtime() {
    let program = parse_program("class A { hi() { return 'a'; } }\nclass B extends A {}\nnew B().hi();");
    let js = emit_program(&program, &EmitOptions { emit_helpers: true, ..EmitOptions::default() }).expect("emit");
    assert!(js.starts_with("var __extends"));
    assert_eq!(eval_inspect(&js), "'a'");
}

#[test]
/// 型だけの構文は出力から消え、値の構文だけが残る。
fn erasure_leaves_only_values() {
    let js = emit(
        "interface I { a: number }\n\
         type T = string | number;\n\
         declare var host: any;\n\
         declare function ext(): void;\n\
         let v: T = 1;\n\
         let w = v as number;\n",
    );
    assert_eq!(js, "var v = 1;\nvar w = v;\n");
}

#[test]
/// 派生クラスの外の super は出力できない。
fn super_outside_class_is_an_emit_error() {
    let program = parse_program("super.x;");
    let err = emit_program(&program, &EmitOptions::default()).unwrap_err();
    assert_eq!(err.code(), "EMT001");
    assert_eq!(err.span().line, 1);
}
