// パス: src/repl/printer.rs
// 役割: バナー・ヘルプ・プロンプト・色付きメッセージ・ページャ表示
// 意図: 対話時の表示形式を一箇所にまとめる
// 関連ファイル: src/repl/cmd.rs, src/runtime.rs
//! REPL の表示まわり。色は `colored` に任せ、端末でなければ自動で無色になる。

use std::io::{self, Write};
use std::process::{Command, Stdio};

use colored::Colorize;

use crate::runtime::{inspect, Value};

/// 通常時と継続時のプロンプト。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompts {
    pub default: String,
    pub more: String,
}

impl Prompts {
    pub fn standard() -> Self {
        Self {
            default: "> ".into(),
            more: "..".into(),
        }
    }

    /// `:baka` で切り替わるプロンプト。
    pub fn dere() -> Self {
        Self {
            default: "ξ(ﾟ⊿ﾟ)ξ> ".into(),
            more: "ζ(///*ζ) ".into(),
        }
    }

    pub fn is_standard(&self) -> bool {
        *self == Self::standard()
    }

    /// 深さの数だけ継続プロンプトを並べる。
    pub fn continuation(&self, depth: usize) -> String {
        self.more.repeat(depth.max(1))
    }
}

/// 起動時のあいさつ。
pub(crate) fn banner(dere: bool) -> Vec<String> {
    if dere {
        vec![
            format!(
                "{} I'm- I'm not making this repl because I like you or anything!",
                "TSUN".magenta()
            ),
            format!("don'... don't type {}, okay? Idiot!", ":help".magenta().bold()),
            String::new(),
        ]
    } else {
        vec![
            format!("{} : TypeScript Upgraded Node", "TSUN".blue()),
            "type in TypeScript expression to evaluate".to_string(),
            format!("type {} for commands in repl", ":help".blue().bold()),
            String::new(),
        ]
    }
}

const HELP_TEXT: &str = "
tsun repl commands
:type symbol       print the type of an identifier
:detail symbol     print details of identifier
:doc symbol        print the documentation of identifier
:source symbol     print source of identifier
:clear             clear all the code
:print             print code input so far
:help              print this manual
:paste             enter paste mode
:load file...      evaluate files as one input";

/// ヘルプ本文。`--dere` のときだけ `:baka` を載せる。
pub(crate) fn help_lines(dere: bool) -> Vec<String> {
    let mut lines: Vec<String> = HELP_TEXT.lines().map(|l| l.blue().to_string()).collect();
    if dere {
        lines.push(
            ":baka              Who would like some pervert like you, baka~"
                .blue()
                .to_string(),
        );
    }
    lines
}

pub(crate) fn error_text(s: &str) -> String {
    s.bold().red().to_string()
}

pub(crate) fn warning_text(s: &str) -> String {
    s.yellow().to_string()
}

pub(crate) fn info_text(s: &str) -> String {
    s.cyan().to_string()
}

pub(crate) fn code_text(s: &str) -> String {
    s.green().to_string()
}

/// `:baka` のプロンプト中にエラーを出した後の一言。
pub(crate) fn urusai(prompts: &Prompts) -> Vec<String> {
    vec![
        String::new(),
        format!("{} {}", prompts.default, "URUSAI URUSAI URUSAI".magenta()),
        String::new(),
    ]
}

/// 値出力を任意のライターへ書き出す。
pub(crate) fn write_value<W: Write>(out: &mut W, v: &Value) -> io::Result<()> {
    writeln!(out, "{}", inspect(v))
}

/// `$PAGER` へテキストを流す。ページャが無い・起動できないときは `false`。
pub(crate) fn page(text: &str) -> bool {
    let Some(pager) = std::env::var_os("PAGER").filter(|p| !p.is_empty()) else {
        return false;
    };
    let mut cmd = if cfg!(unix) {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&pager);
        c
    } else {
        Command::new(&pager)
    };
    let child = cmd.stdin(Stdio::piped()).spawn();
    let mut child = match child {
        Ok(c) => c,
        Err(e) => {
            log::warn!("cannot start pager {:?}: {}", pager, e);
            return false;
        }
    };
    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(text.as_bytes()) {
            log::debug!("pager closed early: {}", e);
        }
    }
    child.wait().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 継続プロンプトは深さの数だけ繰り返す。
    fn continuation_prompt_repeats() {
        let p = Prompts::standard();
        assert_eq!(p.continuation(1), "..");
        assert_eq!(p.continuation(3), "......");
        assert_eq!(p.continuation(0), "..");
        assert!(p.is_standard());
        assert!(!Prompts::dere().is_standard());
    }

    #[test]
    /// `:baka` は `--dere` のときだけヘルプに載る。
    fn help_mentions_baka_only_for_dere() {
        colored::control::set_override(false);
        let plain = help_lines(false);
        assert!(plain.iter().any(|l| l.starts_with(":paste")));
        assert!(!plain.iter().any(|l| l.starts_with(":baka")));
        assert!(help_lines(true).iter().any(|l| l.starts_with(":baka")));
    }

    #[test]
    /// 値は inspect 形式で 1 行に書く。
    fn values_render_with_inspect() {
        let mut buf = Vec::new();
        write_value(&mut buf, &Value::str("hi")).unwrap();
        write_value(&mut buf, &Value::Undefined).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "'hi'\nundefined\n");
    }
}
