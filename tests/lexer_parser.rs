// パス: tests/lexer_parser.rs
// 役割: 字句解析と構文解析の結合テスト
// 意図: 継続入力の判定に使う「途中で終わった」エラーと、代表的な構文の木の形を固定する
// 関連ファイル: src/lexer.rs, src/parser/mod.rs, src/parser/program.rs
#[path = "test_support.rs"]
mod support;

use support::{lex_kinds, parse_program};
use tsun::ast::{BinaryOp, Expr, Stmt, TypeExpr};
use tsun::lexer::{keyword_names, TokenKind};
use tsun::{parse_expr, parse_type_text};

#[test]
/// コメントは読み飛ばされ、`/` は除算の演算子になる。
fn comments_and_division() {
    assert_eq!(
        lex_kinds("a /* c */ / b // tail"),
        vec![TokenKind::IDENT, TokenKind::SLASH, TokenKind::IDENT, TokenKind::EOF]
    );
}

#[test]
/// キーワード一覧には宣言に使う語が含まれる。
fn keyword_table() {
    let names: Vec<&str> = keyword_names().collect();
    for kw in ["let", "const", "function", "class", "while", "return"] {
        assert!(names.contains(&kw), "missing {kw}");
    }
}

#[test]
/// 入力末尾で途切れたものだけが継続扱いになる。
fn incomplete_inputs() {
    struct Case {
        src: &'static str,
        incomplete: bool,
    }
    let cases = [
        Case { src: "function f() {", incomplete: true },
        Case { src: "let x =", incomplete: true },
        Case { src: "f(1,", incomplete: true },
        Case { src: "`open ${", incomplete: true },
        Case { src: "/* never closed", incomplete: true },
        Case { src: "let = 1;", incomplete: false },
        Case { src: "1 +* 2;", incomplete: false },
        Case { src: "'unterminated", incomplete: false },
    ];
    for case in &cases {
        let err = tsun::parse_program(case.src).unwrap_err();
        assert_eq!(err.is_incomplete(), case.incomplete, "{}: {}", case.src, err);
    }
}

#[test]
/// 構文エラーには行と列が付く。
fn parse_errors_carry_positions() {
    let err = tsun::parse_program("let a = 1;\nlet = 2;").unwrap_err();
    assert_eq!(err.0.line, Some(2));
    assert!(err.0.col.is_some());
    assert!(err.0.code.starts_with("SYN"));
}

#[test]
/// 演算子の優先順位と結合性。
fn operator_precedence() {
    let Expr::Binary { op, right, .. } = parse_expr("1 + 2 * 3").unwrap() else {
        panic!("binary expected");
    };
    assert_eq!(op, BinaryOp::Add);
    assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));

    let Expr::Binary { op, left, .. } = parse_expr("10 - 4 - 3").unwrap() else {
        panic!("binary expected");
    };
    assert_eq!(op, BinaryOp::Sub);
    assert!(matches!(*left, Expr::Binary { op: BinaryOp::Sub, .. }));

    let Expr::Binary { op, right, .. } = parse_expr("2 ** 3 ** 2").unwrap() else {
        panic!("binary expected");
    };
    assert_eq!(op, BinaryOp::Pow);
    assert!(matches!(*right, Expr::Binary { op: BinaryOp::Pow, .. }));
}

#[test]
/// 型注釈の表示は入力を正規化した形になる。
fn type_text_round_trip() {
    let cases = [
        ("number[]", "number[]"),
        ("string|number", "string | number"),
        ("Array<string>", "Array<string>"),
        ("(string | number)[]", "(string | number)[]"),
        ("(a: number, b?: string) => void", "(a: number, b?: string) => void"),
        ("{ x: number; readonly y?: string }", "{ x: number; readonly y?: string; }"),
    ];
    for (src, shown) in cases {
        let ty = parse_type_text(src).unwrap();
        assert_eq!(ty.to_string(), shown, "{src}");
    }
    assert!(matches!(parse_type_text("'a' | 'b'").unwrap(), TypeExpr::Union(items) if items.len() == 2));
}

#[test]
/// 型だけの宣言と値の宣言が混在したプログラム。
fn mixed_declarations() {
    let prog = parse_program(
        "interface P { x: number }\n\
         type Id = string;\n\
         declare module \"m\" { export function f(): void; }\n\
         while (true) { break; }\n\
         let p: P = { x: 1 };\n",
    );
    assert!(matches!(prog.stmts[0], Stmt::Interface { .. }));
    assert!(matches!(prog.stmts[1], Stmt::TypeAlias { .. }));
    assert!(matches!(prog.stmts[2], Stmt::Module { .. }));
    assert!(matches!(prog.stmts[3], Stmt::While { .. }));
    assert!(matches!(prog.stmts[4], Stmt::Var { .. }));
    assert_eq!(prog.stmts.len(), 5);
}

#[test]
/// `return` の直後の改行で文が終わる。
fn asi_with_return_and_newline() {
    let prog = parse_program("function f() {\n  return\n  1\n}");
    let Stmt::Function { func, .. } = &prog.stmts[0] else {
        panic!("function expected");
    };
    let body = func.body.as_ref().unwrap();
    assert_eq!(body.len(), 2);
    assert!(matches!(body[0], Stmt::Return { value: None, .. }));
}
