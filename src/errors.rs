// パス: src/errors.rs
// 役割: 字句・構文・型検査の各段階で共有する診断情報と、段階ごとのエラー型
// 意図: コード・本文・位置を 1 つの形にまとめ、REPL とコンパイラで同じ表示を使う
// 関連ファイル: src/lexer.rs, src/parser/mod.rs, src/checker/mod.rs, src/session/mod.rs
//! 診断の共通表現。
//!
//! 表示は `[CODE] 本文 @line=L,col=C @pos=P` の 1 行に、あればスニペットとキャレットを続ける。
//! コード接頭辞は `LEX` 字句, `SYN` 構文, `TYP` 型検査, `EMT` 出力。

use std::fmt::{self, Display, Formatter};

use crate::lexer::INCOMPLETE_CODES;

/// 入力末尾で構文が途切れたことを表す構文エラーコード。
pub const SYNTAX_INCOMPLETE: &str = "SYN000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub msg: String,
    /// バイトオフセット。
    pub pos: Option<usize>,
    /// 1 始まり。
    pub line: Option<usize>,
    /// 1 始まり。
    pub col: Option<usize>,
    pub snippet: Option<String>,
}

impl ErrorInfo {
    pub fn new(code: &'static str, msg: impl Into<String>, pos: Option<usize>) -> Self {
        Self::at(code, msg, pos, None, None)
    }

    pub fn at(
        code: &'static str,
        msg: impl Into<String>,
        pos: Option<usize>,
        line: Option<usize>,
        col: Option<usize>,
    ) -> Self {
        let msg = msg.into();
        Self { code, msg, pos, line, col, snippet: None }
    }

    pub fn with_snippet(self, snippet: impl Into<String>) -> Self {
        Self { snippet: Some(snippet.into()), ..self }
    }

    /// 位置を省いた 1 行表示。REPL の仮想ファイル上の位置は利用者に見せない。
    pub fn headline(&self) -> String {
        format!("[{}] {}", self.code, self.msg)
    }

    fn location(&self) -> String {
        let mut out = String::new();
        if let (Some(line), Some(col)) = (self.line, self.col) {
            out.push_str(&format!(" @line={},col={}", line, col));
        }
        if let Some(pos) = self.pos {
            out.push_str(&format!(" @pos={}", pos));
        }
        out
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.headline(), self.location())?;
        match (&self.snippet, self.col) {
            (Some(text), Some(col)) => {
                let pad = col.saturating_sub(1);
                write!(f, "\n{}\n{:pad$}^", text, "", pad = pad)
            }
            _ => Ok(()),
        }
    }
}

impl std::error::Error for ErrorInfo {}

/// 段階ごとのエラー型。中身は共通の `ErrorInfo` で、表示もそれに委ねる。
macro_rules! phase_error {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, thiserror::Error)]
        #[error(transparent)]
        pub struct $name(pub ErrorInfo);

        impl $name {
            pub fn new(code: &'static str, msg: impl Into<String>, pos: Option<usize>) -> Self {
                Self(ErrorInfo::new(code, msg, pos))
            }

            pub fn at(
                code: &'static str,
                msg: impl Into<String>,
                pos: Option<usize>,
                line: Option<usize>,
                col: Option<usize>,
            ) -> Self {
                Self(ErrorInfo::at(code, msg, pos, line, col))
            }
        }
    };
}

phase_error!(
    /// 字句解析の失敗。
    LexerError
);
phase_error!(
    /// 構文解析の失敗。字句エラーもこの型に包んで返す。
    ParseError
);
phase_error!(TypeError);

impl LexerError {
    /// 閉じていないコメントやテンプレートなど、続きの入力で解消しうるか。
    pub fn is_incomplete(&self) -> bool {
        INCOMPLETE_CODES.contains(&self.0.code)
    }
}

impl ParseError {
    /// 入力末尾に達したことによる失敗かどうか。
    pub fn is_incomplete(&self) -> bool {
        self.0.code == SYNTAX_INCOMPLETE || INCOMPLETE_CODES.contains(&self.0.code)
    }
}

impl From<LexerError> for ParseError {
    fn from(LexerError(info): LexerError) -> Self {
        ParseError(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 位置とスニペットがあればキャレットを列に合わせて出す。
    fn display_with_position_and_caret() {
        let info = ErrorInfo::at("SYN001", "unexpected", Some(4), Some(1), Some(5))
            .with_snippet("let = 1");
        assert_eq!(info.to_string(), "[SYN001] unexpected @line=1,col=5 @pos=4\nlet = 1\n    ^");
        assert_eq!(info.headline(), "[SYN001] unexpected");
    }

    #[test]
    /// 位置の一部しか無いときの表示。
    fn display_partial_location() {
        assert_eq!(ErrorInfo::new("TYP2304", "x", Some(3)).to_string(), "[TYP2304] x @pos=3");
        assert_eq!(ErrorInfo::new("TYP2304", "x", None).to_string(), "[TYP2304] x");
        let first_col = ErrorInfo::at("LEX002", "bad", None, Some(2), Some(1)).with_snippet("#");
        assert_eq!(first_col.to_string(), "[LEX002] bad @line=2,col=1\n#\n^");
    }

    #[test]
    /// 入力途中扱いになるエラーコードを判定できる。
    fn incomplete_codes() {
        assert!(ParseError::new(SYNTAX_INCOMPLETE, "eof", None).is_incomplete());
        assert!(ParseError::new("LEX001", "comment", None).is_incomplete());
        assert!(!ParseError::new("SYN001", "bad", None).is_incomplete());
        let lexed: ParseError = LexerError::new("LEX001", "comment", Some(0)).into();
        assert_eq!(lexed.0.code, "LEX001");
    }
}
