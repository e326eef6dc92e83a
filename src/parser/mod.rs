// パス: src/parser/mod.rs
// 役割: トークン列から AST を生成する再帰下降パーサのエントリポイント
// 意図: 型付きソースと出力スクリプトを同じパーサで解析できるようにする
// 関連ファイル: src/parser/program.rs, src/parser/expr.rs, src/parser/types.rs
//! 構文解析モジュール
//!
//! - 文・式・型注釈を再帰下降で解析する。式の優先順位は
//!   代入 < 条件 < `||` < `&&` < ビット演算 < 等価 < 関係 < シフト < 加減 < 乗除 < `**` の順。
//! - 自動セミコロン挿入は「`;` / `}` / EOF / 直前の改行」のいずれかで文を閉じる簡易規則。
//! - 入力末尾で失敗した場合は `SYN000` を返し、REPL 側で継続入力として扱えるようにする。

use crate::ast::{Expr, Program, Span, TypeExpr};
use crate::errors::{ParseError, SYNTAX_INCOMPLETE};
use crate::lexer::{lex, Token, TokenKind};

mod expr;
mod program;
mod types;

pub struct Parser {
    ts: Vec<Token>,
    i: usize,
}

impl Parser {
    /// トークン列から新しいパーサインスタンスを構築する。
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { ts: tokens, i: 0 }
    }

    pub(super) fn peek(&self) -> &Token {
        let last = self.ts.len().saturating_sub(1);
        &self.ts[self.i.min(last)]
    }

    pub(super) fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.ts.get(self.i + offset)
    }

    pub(super) fn peek_kind(&self, offset: usize) -> Option<TokenKind> {
        self.peek_at(offset).map(|t| t.kind.clone())
    }

    pub(super) fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    /// 文脈キーワード（`IDENT` として字句化された綴り）に一致するか。
    pub(super) fn at_word(&self, word: &str) -> bool {
        let t = self.peek();
        t.kind == TokenKind::IDENT && t.value == word
    }

    pub(super) fn pop_any(&mut self) -> Token {
        let t = self.peek().clone();
        if t.kind != TokenKind::EOF {
            self.i += 1;
        }
        t
    }

    pub(super) fn pop(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let t = self.peek().clone();
        if t.kind != kind {
            return Err(self.unexpected(&t, &format!("{:?}", kind)));
        }
        self.i += 1;
        Ok(t)
    }

    pub(super) fn accept(&mut self, kind: TokenKind) -> Option<Token> {
        if self.peek().kind == kind {
            let t = self.pop_any();
            Some(t)
        } else {
            None
        }
    }

    pub(super) fn accept_word(&mut self, word: &str) -> bool {
        if self.at_word(word) {
            self.pop_any();
            true
        } else {
            false
        }
    }

    /// 識別子を読む。予約語でもプロパティ名として使える位置では `allow_keyword` を立てる。
    pub(super) fn pop_ident(&mut self, allow_keyword: bool) -> Result<Token, ParseError> {
        let t = self.peek().clone();
        let ok = t.kind == TokenKind::IDENT || (allow_keyword && is_keyword_kind(&t.kind));
        if !ok {
            return Err(self.unexpected(&t, "識別子"));
        }
        self.i += 1;
        Ok(t)
    }

    /// 直前に消費したトークンの終端オフセット。
    pub(super) fn prev_end(&self) -> usize {
        if self.i == 0 {
            0
        } else {
            self.ts[self.i - 1].end
        }
    }

    pub(super) fn span_from(&self, start: &Token) -> Span {
        Span::new(start.pos, self.prev_end().max(start.pos), start.line, start.col)
    }

    /// 文末を確認する。`;` が無くても `}`・EOF・改行の直前なら文を閉じる。
    pub(super) fn consume_semi(&mut self) -> Result<(), ParseError> {
        if self.accept(TokenKind::SEMI).is_some() {
            return Ok(());
        }
        let t = self.peek();
        if matches!(t.kind, TokenKind::RBRACE | TokenKind::EOF) || t.newline_before {
            return Ok(());
        }
        let t = t.clone();
        Err(self.unexpected(&t, "';'"))
    }

    /// 期待外れのトークンに対する構文エラー。EOF なら継続入力扱いのコードにする。
    pub(super) fn unexpected(&self, t: &Token, expected: &str) -> ParseError {
        if t.kind == TokenKind::EOF {
            return ParseError::at(
                SYNTAX_INCOMPLETE,
                format!("入力が途中で終わっています（{} を期待）", expected),
                Some(t.pos),
                Some(t.line),
                Some(t.col),
            );
        }
        ParseError::at(
            "SYN001",
            format!("{} を期待しましたが {:?} ({})", expected, t.kind, t.value),
            Some(t.pos),
            Some(t.line),
            Some(t.col),
        )
    }

    pub(super) fn error_at(&self, t: &Token, code: &'static str, msg: impl Into<String>) -> ParseError {
        ParseError::at(code, msg, Some(t.pos), Some(t.line), Some(t.col))
    }

    /// 投機的に解析し、失敗したら位置を巻き戻す。
    pub(super) fn try_parse<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Option<T> {
        let save = self.i;
        match f(self) {
            Ok(v) => Some(v),
            Err(_) => {
                self.i = save;
                None
            }
        }
    }

    /// `>>` / `>>>` を型引数の閉じ括弧として 1 文字ずつ分割して消費する。
    pub(super) fn pop_type_close(&mut self) -> Result<(), ParseError> {
        let t = self.peek().clone();
        match t.kind {
            TokenKind::GT => {
                self.i += 1;
                Ok(())
            }
            TokenKind::SHR | TokenKind::USHR | TokenKind::GE => {
                let rest = &t.value[1..];
                let kind = match rest {
                    ">" => TokenKind::GT,
                    ">>" => TokenKind::SHR,
                    _ => TokenKind::EQUAL,
                };
                let tail = Token {
                    kind,
                    value: rest.to_string(),
                    pos: t.pos + 1,
                    end: t.end,
                    line: t.line,
                    col: t.col + 1,
                    newline_before: false,
                };
                self.ts[self.i] = Token {
                    kind: TokenKind::GT,
                    value: ">".into(),
                    end: t.pos + 1,
                    ..t
                };
                self.ts.insert(self.i + 1, tail);
                self.i += 1;
                Ok(())
            }
            _ => Err(self.unexpected(&t, "'>'")),
        }
    }
}

pub(super) fn is_keyword_kind(kind: &TokenKind) -> bool {
    crate::lexer::KEYWORDS.iter().any(|(_, k)| k == kind)
}

/// 引用符付き文字列リテラルのエスケープを展開する。
pub(super) fn decode_string(quoted: &str) -> Result<String, ParseError> {
    let bytes = quoted.as_bytes();
    let ok = quoted.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[quoted.len() - 1] == bytes[0];
    if !ok {
        return Err(ParseError::new("SYN201", "文字列リテラルが不正", None));
    }
    decode_escapes(&quoted[1..quoted.len() - 1])
}

/// テンプレート断片や文字列本体のエスケープを展開する。
pub(super) fn decode_escapes(s: &str) -> Result<String, ParseError> {
    let mut out = String::new();
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(e) = chars.next() else {
            return Err(ParseError::new("SYN202", "末尾のバックスラッシュ", None));
        };
        match e {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            '\n' => {}
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                out.push(decode_code_point(&hex)?);
            }
            'u' => {
                let hex: String = if chars.peek() == Some(&'{') {
                    chars.next();
                    chars.by_ref().take_while(|c| *c != '}').collect()
                } else {
                    chars.by_ref().take(4).collect()
                };
                out.push(decode_code_point(&hex)?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn decode_code_point(hex: &str) -> Result<char, ParseError> {
    u32::from_str_radix(hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| ParseError::new("SYN203", format!("不正なエスケープ: {}", hex), None))
}

/// 数値リテラルを f64 へ変換する。
pub(super) fn decode_number(text: &str) -> Result<f64, ParseError> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok().map(|v| v as f64)
    } else {
        text.parse::<f64>().ok()
    };
    parsed.ok_or_else(|| ParseError::new("SYN006", format!("数値リテラルが不正: {}", text), None))
}

pub fn parse_program(src: &str) -> Result<Program, ParseError> {
    let ts = lex(src)?;
    Parser::new(ts).parse_program()
}

pub fn parse_expr(src: &str) -> Result<Expr, ParseError> {
    let ts = lex(src)?;
    let mut p = Parser::new(ts);
    let e = p.parse_expr()?;
    p.accept(TokenKind::SEMI);
    if p.peek().kind != TokenKind::EOF {
        let t = p.peek().clone();
        return Err(p.error_at(&t, "SYN090", "余分なトークンが残っています"));
    }
    Ok(e)
}

/// 型注釈のみを解析する（宣言ファイルの検証や補完で使う）。
pub fn parse_type_text(src: &str) -> Result<TypeExpr, ParseError> {
    let ts = lex(src)?;
    let mut p = Parser::new(ts);
    let ty = p.parse_type()?;
    if p.peek().kind != TokenKind::EOF {
        let t = p.peek().clone();
        return Err(p.error_at(&t, "SYN090", "余分なトークンが残っています"));
    }
    Ok(ty)
}

#[cfg(test)]
mod tests {
    use super::{decode_number, decode_string, parse_program};

    #[test]
    /// 文字列リテラルの基本的なエスケープをテストする。
    fn decode_string_basic_escapes() {
        assert_eq!(decode_string("\"a\\n\"").unwrap(), "a\n");
        assert_eq!(decode_string("'\\t\"'").unwrap(), "\t\"");
        assert_eq!(decode_string("\"\\\\\"").unwrap(), "\\");
        assert_eq!(decode_string("'\\x41\\u0042\\u{43}'").unwrap(), "ABC");
    }

    #[test]
    /// 16 進・指数表記の数値を変換できる。
    fn decode_numbers() {
        assert_eq!(decode_number("0xff").unwrap(), 255.0);
        assert_eq!(decode_number("1.5e2").unwrap(), 150.0);
        assert!(decode_number("1..2").is_err());
    }

    #[test]
    /// 入力途中で終わったものは継続入力扱いのエラーになる。
    fn eof_is_incomplete() {
        for src in ["function f() {", "let x = ", "foo(1,", "class A { m() { return 1 }"] {
            let err = parse_program(src).unwrap_err();
            assert!(err.is_incomplete(), "{src}: {err}");
        }
        let err = parse_program("let = 1").unwrap_err();
        assert!(!err.is_incomplete());
    }
}
