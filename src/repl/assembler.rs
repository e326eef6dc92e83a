// パス: src/repl/assembler.rs
// 役割: 複数行にわたる入力を 1 文の候補へ組み立て、括弧の釣り合いから継続の深さを求める
// 意図: 閉じていない入力を検査器へ渡す前に、安価な字句走査で継続を判定する
// 関連ファイル: src/repl/cmd.rs, src/session/mod.rs
//! 入力アセンブラ
//!
//! 文字列・コメントの中身は数えない。テンプレートリテラルは `${ ... }` の入れ子も追う。

/// 1 行を渡した結果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feed {
    /// 保留中の入力が無い状態での空行。
    Empty,
    /// 括弧が釣り合った。`pending()` を検査に回せる。
    Ready,
    /// 閉じていない。値は継続プロンプトの深さ。
    More(usize),
    /// 空行が 2 回続いたので保留中の入力を捨てた。
    Abandoned,
}

/// 保留中の入力（PendingStatement）。
#[derive(Debug, Default)]
pub struct InputAssembler {
    pending: String,
    blank_run: usize,
}

impl InputAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, line: &str) -> Feed {
        if line.trim().is_empty() {
            if self.pending.is_empty() {
                return Feed::Empty;
            }
            self.blank_run += 1;
            if self.blank_run >= 2 {
                self.clear();
                return Feed::Abandoned;
            }
        } else {
            self.blank_run = 0;
        }
        if !self.pending.is_empty() {
            self.pending.push('\n');
        }
        self.pending.push_str(line);
        let balance = scan(&self.pending);
        if balance.is_balanced() {
            Feed::Ready
        } else {
            Feed::More(balance.depth())
        }
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// 現在の継続の深さ（最小 1）。
    pub fn depth(&self) -> usize {
        scan(&self.pending).depth()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.blank_run = 0;
    }
}

/// 走査結果。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Balance {
    pub opened: usize,
    pub closed: usize,
    /// 末尾でテンプレートリテラルかブロックコメントの中にいる。
    pub open_literal: bool,
}

impl Balance {
    pub fn is_balanced(&self) -> bool {
        self.opened <= self.closed && !self.open_literal
    }

    pub fn depth(&self) -> usize {
        self.opened.saturating_sub(self.closed).max(1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Frame {
    Template,
    /// `${` の中。値は内側で開いている `{` の数。
    Subst(usize),
}

/// `{}` `()` `[]` の開閉を数える。
pub fn scan(text: &str) -> Balance {
    let mut b = Balance::default();
    let mut frames: Vec<Frame> = Vec::new();
    let mut quote: Option<char> = None;
    let mut line_comment = false;
    let mut block_comment = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if line_comment {
            if c == '\n' {
                line_comment = false;
            }
            continue;
        }
        if block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                block_comment = false;
            }
            continue;
        }
        if let Some(q) = quote {
            match c {
                '\\' => {
                    chars.next();
                }
                '\n' => quote = None,
                _ if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        if frames.last() == Some(&Frame::Template) {
            match c {
                '\\' => {
                    chars.next();
                }
                '`' => {
                    frames.pop();
                }
                '$' if chars.peek() == Some(&'{') => {
                    chars.next();
                    frames.push(Frame::Subst(0));
                }
                _ => {}
            }
            continue;
        }
        match c {
            '/' if chars.peek() == Some(&'/') => {
                chars.next();
                line_comment = true;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                block_comment = true;
            }
            '\'' | '"' => quote = Some(c),
            '`' => frames.push(Frame::Template),
            '{' => {
                if let Some(Frame::Subst(n)) = frames.last_mut() {
                    *n += 1;
                }
                b.opened += 1;
            }
            '}' => match frames.last_mut() {
                Some(Frame::Subst(0)) => {
                    frames.pop();
                }
                Some(Frame::Subst(n)) => {
                    *n -= 1;
                    b.closed += 1;
                }
                _ => b.closed += 1,
            },
            '(' | '[' => b.opened += 1,
            ')' | ']' => b.closed += 1,
            _ => {}
        }
    }
    b.open_literal = block_comment || !frames.is_empty();
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 文字列・コメント内の括弧は数えない。
    fn brackets_inside_literals_are_ignored() {
        assert!(scan("let s = '{';").is_balanced());
        assert!(scan("let s = \"(\\\"\";").is_balanced());
        assert!(scan("f(1) // {").is_balanced());
        assert!(scan("/* ( */ x").is_balanced());
        assert!(!scan("/* (").is_balanced());
    }

    #[test]
    /// テンプレートリテラルは置換部の入れ子まで追う。
    fn template_literals_nest() {
        assert!(scan("`a ${ {x: 1}.x } b`").is_balanced());
        assert!(!scan("`a ${ b").is_balanced());
        assert!(!scan("`multi\nline").is_balanced());
        assert!(scan("`${`${1}`}`").is_balanced());
    }

    #[test]
    /// 継続の深さは未対応の開き括弧の数で、最小 1。
    fn depth_counts_unmatched_openers() {
        assert_eq!(scan("function f() {").depth(), 1);
        assert_eq!(scan("if (a) { foo(").depth(), 2);
        assert_eq!(scan("}").depth(), 1);
        assert_eq!(scan("`x").depth(), 1);
    }

    #[test]
    /// 行を積み上げ、閉じた時点で検査へ回す。
    fn feeding_lines_until_balanced() {
        let mut a = InputAssembler::new();
        assert_eq!(a.feed(""), Feed::Empty);
        assert_eq!(a.feed("function f() {"), Feed::More(1));
        assert_eq!(a.feed("  if (x) {"), Feed::More(2));
        assert_eq!(a.feed("  }"), Feed::More(1));
        assert_eq!(a.feed("}"), Feed::Ready);
        assert_eq!(a.pending(), "function f() {\n  if (x) {\n  }\n}");
        a.clear();
        assert!(a.is_empty());
    }

    #[test]
    /// 空行が 2 回続くと保留中の入力を捨てる。
    fn two_blank_lines_abandon() {
        let mut a = InputAssembler::new();
        assert_eq!(a.feed("let o = {"), Feed::More(1));
        assert_eq!(a.feed(""), Feed::More(1));
        assert_eq!(a.feed("   "), Feed::Abandoned);
        assert!(a.is_empty());
        assert_eq!(a.feed("let o = {"), Feed::More(1));
        assert_eq!(a.feed(""), Feed::More(1));
        assert_eq!(a.feed("a: 1"), Feed::More(1));
        assert_eq!(a.feed(""), Feed::More(1));
        assert_eq!(a.feed("}"), Feed::Ready);
    }
}
