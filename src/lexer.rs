// パス: src/lexer.rs
// 役割: UTF-8 対応の字句解析器とトークン定義を提供する
// 意図: 型付きソースと出力スクリプトの両方で共有する位置付きトークンを生成する
// 関連ファイル: src/parser/mod.rs, src/errors.rs, tests/lexer_parser.rs
//! 字句解析モジュール
//!
//! - ソースをトークン列へ変換する。予約語は専用の種別、文脈キーワード
//!   (`type`, `interface`, `declare` など) は `IDENT` として返す。
//! - テンプレートリテラルは `${` の入れ子をスタックで追跡し、
//!   `TEMPLATE` / `TEMPLATE_HEAD` / `TEMPLATE_MIDDLE` / `TEMPLATE_TAIL` に分割する。
//! - すべてのトークンに行・列・バイト位置と「直前に改行があったか」を記録する
//!   (自動セミコロン挿入に利用)。

use crate::errors::{ErrorInfo, LexerError};

#[derive(Debug, Clone, PartialEq, Eq)]
/// 生成されたトークンとその位置情報を保持するレコード。
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub pos: usize,
    pub end: usize,
    pub line: usize,
    pub col: usize,
    pub newline_before: bool,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, PartialEq, Eq)]
/// 字句解析で識別されるトークンの分類。
pub enum TokenKind {
    EOF,
    // リテラル・識別子
    IDENT,
    NUMBER,
    STRING,
    TEMPLATE,
    TEMPLATE_HEAD,
    TEMPLATE_MIDDLE,
    TEMPLATE_TAIL,
    // 区切り記号
    LBRACE,
    RBRACE,
    LPAREN,
    RPAREN,
    LBRACK,
    RBRACK,
    SEMI,
    COMMA,
    DOT,
    ELLIPSIS,
    COLON,
    QMARK,
    ARROW,
    // 演算子
    EQUAL,
    EQ,
    EQEQ,
    NE,
    NEEQ,
    LT,
    GT,
    LE,
    GE,
    PLUS,
    MINUS,
    STAR,
    SLASH,
    PERCENT,
    DBLSTAR,
    BANG,
    TILDE,
    AMP,
    BAR,
    CARET,
    AMPAMP,
    BARBAR,
    PLUSPLUS,
    MINUSMINUS,
    PLUSEQ,
    MINUSEQ,
    STAREQ,
    SLASHEQ,
    PERCENTEQ,
    SHL,
    SHR,
    USHR,
    AT,
    // 予約語
    BREAK,
    CASE,
    CATCH,
    CLASS,
    CONST,
    CONTINUE,
    DEFAULT,
    DELETE,
    DO,
    ELSE,
    EXPORT,
    EXTENDS,
    FALSE,
    FINALLY,
    FOR,
    FUNCTION,
    IF,
    IMPORT,
    IN,
    INSTANCEOF,
    LET,
    NEW,
    NULL,
    RETURN,
    SUPER,
    SWITCH,
    THIS,
    THROW,
    TRUE,
    TRY,
    TYPEOF,
    VAR,
    VOID,
    WHILE,
}

/// 予約語の綴りと種別の対応表。補完候補の生成にも使う。
pub const KEYWORDS: &[(&str, TokenKind)] = &[
    ("break", TokenKind::BREAK),
    ("case", TokenKind::CASE),
    ("catch", TokenKind::CATCH),
    ("class", TokenKind::CLASS),
    ("const", TokenKind::CONST),
    ("continue", TokenKind::CONTINUE),
    ("default", TokenKind::DEFAULT),
    ("delete", TokenKind::DELETE),
    ("do", TokenKind::DO),
    ("else", TokenKind::ELSE),
    ("export", TokenKind::EXPORT),
    ("extends", TokenKind::EXTENDS),
    ("false", TokenKind::FALSE),
    ("finally", TokenKind::FINALLY),
    ("for", TokenKind::FOR),
    ("function", TokenKind::FUNCTION),
    ("if", TokenKind::IF),
    ("import", TokenKind::IMPORT),
    ("in", TokenKind::IN),
    ("instanceof", TokenKind::INSTANCEOF),
    ("let", TokenKind::LET),
    ("new", TokenKind::NEW),
    ("null", TokenKind::NULL),
    ("return", TokenKind::RETURN),
    ("super", TokenKind::SUPER),
    ("switch", TokenKind::SWITCH),
    ("this", TokenKind::THIS),
    ("throw", TokenKind::THROW),
    ("true", TokenKind::TRUE),
    ("try", TokenKind::TRY),
    ("typeof", TokenKind::TYPEOF),
    ("var", TokenKind::VAR),
    ("void", TokenKind::VOID),
    ("while", TokenKind::WHILE),
];

/// 入力末尾で閉じていない構造を表すエラーコード。継続入力の判定に使う。
pub const INCOMPLETE_CODES: &[&str] = &["LEX001", "LEX004"];

/// バイト位置から行・列を引くための行頭オフセット表。
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn build(src: &str) -> Self {
        let breaks = src.match_indices('\n').map(|(at, _)| at + 1);
        Self {
            line_starts: std::iter::once(0).chain(breaks).collect(),
        }
    }

    /// 1 始まりの (行, 列)。列は文字数で数える。
    fn position(&self, src: &str, offset: usize) -> (usize, usize) {
        let offset = offset.min(src.len());
        let row = self.line_starts.partition_point(|&s| s <= offset).max(1) - 1;
        let line_start = self.line_starts[row];
        (row + 1, src[line_start..offset].chars().count() + 1)
    }

    /// 行の本文。改行は含めない。
    fn text<'s>(&self, src: &'s str, line: usize) -> &'s str {
        let Some(&from) = line.checked_sub(1).and_then(|row| self.line_starts.get(row)) else {
            return "";
        };
        let to = self.line_starts.get(line).map_or(src.len(), |&next| next - 1);
        &src[from..to]
    }
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | '\u{feff}')
}

pub fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

pub fn is_ident_rest(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

/// 長いものから順に並べた記号表。
const PUNCTUATORS: &[(&str, TokenKind)] = &[
    (">>>", TokenKind::USHR),
    ("===", TokenKind::EQEQ),
    ("!==", TokenKind::NEEQ),
    ("...", TokenKind::ELLIPSIS),
    ("=>", TokenKind::ARROW),
    ("==", TokenKind::EQ),
    ("!=", TokenKind::NE),
    ("<=", TokenKind::LE),
    (">=", TokenKind::GE),
    ("**", TokenKind::DBLSTAR),
    ("&&", TokenKind::AMPAMP),
    ("||", TokenKind::BARBAR),
    ("++", TokenKind::PLUSPLUS),
    ("--", TokenKind::MINUSMINUS),
    ("+=", TokenKind::PLUSEQ),
    ("-=", TokenKind::MINUSEQ),
    ("*=", TokenKind::STAREQ),
    ("/=", TokenKind::SLASHEQ),
    ("%=", TokenKind::PERCENTEQ),
    ("<<", TokenKind::SHL),
    (">>", TokenKind::SHR),
    ("{", TokenKind::LBRACE),
    ("}", TokenKind::RBRACE),
    ("(", TokenKind::LPAREN),
    (")", TokenKind::RPAREN),
    ("[", TokenKind::LBRACK),
    ("]", TokenKind::RBRACK),
    (";", TokenKind::SEMI),
    (",", TokenKind::COMMA),
    (".", TokenKind::DOT),
    (":", TokenKind::COLON),
    ("?", TokenKind::QMARK),
    ("=", TokenKind::EQUAL),
    ("<", TokenKind::LT),
    (">", TokenKind::GT),
    ("+", TokenKind::PLUS),
    ("-", TokenKind::MINUS),
    ("*", TokenKind::STAR),
    ("/", TokenKind::SLASH),
    ("%", TokenKind::PERCENT),
    ("!", TokenKind::BANG),
    ("~", TokenKind::TILDE),
    ("&", TokenKind::AMP),
    ("|", TokenKind::BAR),
    ("^", TokenKind::CARET),
    ("@", TokenKind::AT),
];

/// 開いている `{` が通常のブロックか、テンプレートの置換か。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Brace {
    Block,
    Substitution,
}

struct Scanner<'s> {
    src: &'s str,
    at: usize,
    lines: LineIndex,
    out: Vec<Token>,
    braces: Vec<Brace>,
    /// 直前のトークン以降に改行を読んだか。
    pending_newline: bool,
}

impl<'s> Scanner<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            at: 0,
            lines: LineIndex::build(src),
            out: Vec::new(),
            braces: Vec::new(),
            pending_newline: false,
        }
    }

    fn rest(&self) -> &'s str {
        &self.src[self.at..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.at += c.len_utf8();
        Some(c)
    }

    /// 条件を満たす間読み進め、読んだ文字数を返す。
    fn bump_while(&mut self, pred: impl Fn(char) -> bool) -> usize {
        let mut n = 0;
        while self.peek().is_some_and(&pred) {
            self.bump();
            n += 1;
        }
        n
    }

    fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        loop {
            self.skip_trivia()?;
            if self.at >= self.src.len() {
                break;
            }
            self.next_token()?;
        }
        self.pending_newline = true;
        self.emit(TokenKind::EOF, self.src.len());
        Ok(self.out)
    }

    /// 空白とコメントを読み飛ばす。
    fn skip_trivia(&mut self) -> Result<(), LexerError> {
        loop {
            let rest = self.rest();
            if rest.starts_with("//") {
                let len = rest.find('\n').unwrap_or(rest.len());
                self.at += len;
            } else if rest.starts_with("/*") {
                let start = self.at;
                let Some(close) = rest[2..].find("*/") else {
                    return Err(self.error("LEX001", "ブロックコメントが閉じていません", start));
                };
                let body = &rest[..close + 4];
                self.pending_newline |= body.contains('\n');
                self.at += body.len();
            } else if self.peek().is_some_and(is_blank) {
                let blank = self.bump_while(|c| c != '\n' && is_blank(c));
                if self.peek() == Some('\n') {
                    self.bump();
                    self.pending_newline = true;
                } else if blank == 0 {
                    break;
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    fn next_token(&mut self) -> Result<(), LexerError> {
        let start = self.at;
        let Some(c) = self.peek() else {
            return Ok(());
        };
        match c {
            '`' => {
                self.bump();
                self.template_part(start, true)
            }
            '}' if self.braces.last() == Some(&Brace::Substitution) => {
                self.braces.pop();
                self.bump();
                self.template_part(start, false)
            }
            '\'' | '"' => self.string(c),
            '.' if self.peek_nth(1).is_some_and(|d| d.is_ascii_digit()) => self.number(),
            _ if c.is_ascii_digit() => self.number(),
            _ if is_ident_start(c) => {
                self.word();
                Ok(())
            }
            _ => {
                if self.punctuator() {
                    Ok(())
                } else {
                    Err(self.error("LEX090", format!("字句解析に失敗: {:?}", c), start))
                }
            }
        }
    }

    fn punctuator(&mut self) -> bool {
        let start = self.at;
        let Some((text, kind)) = PUNCTUATORS.iter().find(|(p, _)| self.rest().starts_with(p)) else {
            return false;
        };
        match kind {
            TokenKind::LBRACE => self.braces.push(Brace::Block),
            TokenKind::RBRACE => {
                self.braces.pop();
            }
            _ => {}
        }
        self.at += text.len();
        self.emit(kind.clone(), start);
        true
    }

    /// テンプレートの 1 区間。`head` は区間がバッククォートで始まったかどうか。
    fn template_part(&mut self, start: usize, head: bool) -> Result<(), LexerError> {
        loop {
            match self.bump() {
                None => {
                    return Err(self.error("LEX004", "テンプレートリテラルが閉じていません", start));
                }
                Some('\\') => {
                    self.bump();
                }
                Some('`') => {
                    let kind = if head { TokenKind::TEMPLATE } else { TokenKind::TEMPLATE_TAIL };
                    self.emit(kind, start);
                    return Ok(());
                }
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    self.braces.push(Brace::Substitution);
                    let kind = if head { TokenKind::TEMPLATE_HEAD } else { TokenKind::TEMPLATE_MIDDLE };
                    self.emit(kind, start);
                    return Ok(());
                }
                Some(_) => {}
            }
        }
    }

    /// 文字列リテラル。改行を含む前に閉じなければエラー。
    fn string(&mut self, quote: char) -> Result<(), LexerError> {
        let start = self.at;
        self.bump();
        loop {
            match self.bump() {
                Some(c) if c == quote => break,
                Some('\\') => {
                    self.bump();
                }
                None | Some('\n') => {
                    return Err(self.error("LEX003", "文字列リテラルが閉じていません", start));
                }
                Some(_) => {}
            }
        }
        self.emit(TokenKind::STRING, start);
        Ok(())
    }

    fn number(&mut self) -> Result<(), LexerError> {
        let start = self.at;
        let rest = self.rest();
        if rest.starts_with("0x") || rest.starts_with("0X") {
            self.at += 2;
            if self.bump_while(|c| c.is_ascii_hexdigit()) == 0 {
                return Err(self.error("LEX010", "16進数の桁がありません", start));
            }
            self.emit(TokenKind::NUMBER, start);
            return Ok(());
        }

        self.bump_while(|c| c.is_ascii_digit());
        // `1.toString` の `.` はメンバアクセス
        if self.peek() == Some('.') && !self.peek_nth(1).is_some_and(is_ident_start) {
            self.bump();
            self.bump_while(|c| c.is_ascii_digit());
        }
        self.exponent();
        if self.peek().is_some_and(is_ident_start) {
            return Err(self.error("LEX011", "数値リテラルの直後に識別子は置けません", start));
        }
        self.emit(TokenKind::NUMBER, start);
        Ok(())
    }

    /// 指数部。`e` の後に数字が続くときだけ読む。
    fn exponent(&mut self) {
        let bytes = self.rest().as_bytes();
        if !matches!(bytes.first(), Some(b'e' | b'E')) {
            return;
        }
        let sign = usize::from(matches!(bytes.get(1), Some(b'+' | b'-')));
        let digits = bytes[1 + sign..].iter().take_while(|b| b.is_ascii_digit()).count();
        if digits > 0 {
            self.at += 1 + sign + digits;
        }
    }

    fn word(&mut self) {
        let start = self.at;
        self.bump();
        self.bump_while(is_ident_rest);
        let text = &self.src[start..self.at];
        let kind = KEYWORDS
            .iter()
            .find_map(|(kw, kind)| (*kw == text).then(|| kind.clone()))
            .unwrap_or(TokenKind::IDENT);
        self.emit(kind, start);
    }

    /// `start` から現在位置までを 1 トークンとして積む。
    fn emit(&mut self, kind: TokenKind, start: usize) {
        let (line, col) = self.lines.position(self.src, start);
        self.out.push(Token {
            kind,
            value: self.src[start..self.at].to_string(),
            pos: start,
            end: self.at,
            line,
            col,
            newline_before: std::mem::take(&mut self.pending_newline),
        });
    }

    fn error(&self, code: &'static str, message: impl Into<String>, pos: usize) -> LexerError {
        let (line, col) = self.lines.position(self.src, pos);
        let text = self.lines.text(self.src, line);
        LexerError(ErrorInfo::at(code, message, Some(pos), Some(line), Some(col)).with_snippet(text))
    }
}

/// ソース全体をトークン列にする。末尾には必ず `EOF` が付く。
pub fn lex(src: &str) -> Result<Vec<Token>, LexerError> {
    Scanner::new(src).tokenize()
}

/// 予約語の綴りを返す。補完で利用する。
pub fn keyword_names() -> impl Iterator<Item = &'static str> {
    KEYWORDS.iter().map(|(kw, _)| *kw)
}

#[cfg(test)]
mod tests {
    use super::{lex, TokenKind};

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    /// 最長一致で演算子が切り出されることを確認する。
    fn longest_match_operators() {
        assert_eq!(
            kinds("a === b !== c >>> 1"),
            vec![
                TokenKind::IDENT,
                TokenKind::EQEQ,
                TokenKind::IDENT,
                TokenKind::NEEQ,
                TokenKind::IDENT,
                TokenKind::USHR,
                TokenKind::NUMBER,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    /// テンプレート置換の中のブロックが正しく閉じられるか検証する。
    fn template_with_nested_braces() {
        let ks = kinds("`a${ {x: 1}.x }b${y}c`");
        assert_eq!(ks[0], TokenKind::TEMPLATE_HEAD);
        assert!(ks.contains(&TokenKind::TEMPLATE_MIDDLE));
        assert_eq!(ks[ks.len() - 2], TokenKind::TEMPLATE_TAIL);
    }

    #[test]
    /// 改行の有無がトークンに記録されることを確認する。
    fn newline_flag_is_recorded() {
        let toks = lex("a\nb c").unwrap();
        assert!(!toks[0].newline_before);
        assert!(toks[1].newline_before);
        assert!(!toks[2].newline_before);
    }

    #[test]
    /// 閉じていないテンプレートは継続入力扱いのコードになる。
    fn unterminated_template_is_incomplete() {
        let err = lex("`abc").unwrap_err();
        assert_eq!(err.0.code, "LEX004");
        assert!(err.is_incomplete());
        let err = lex("'abc").unwrap_err();
        assert!(!err.is_incomplete());
    }
}
