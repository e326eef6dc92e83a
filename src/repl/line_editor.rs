// パス: src/repl/line_editor.rs
// 役割: 履歴・カーソル移動・行の削除・Tab 補完を備えた端末ラインエディタ
// 意図: 外部の行編集ライブラリに頼らず、readline 相当のキー操作で対話入力を扱う
// 関連ファイル: src/repl/cmd.rs, src/session/mod.rs
//! 端末の行入力。
//!
//! キー入力は `decode_key` で `Key` に直し、`LineBuffer::apply` が編集結果と再描画の要否を返す。
//! 標準入力が端末でないとき（パイプやテスト）は行単位の読み取りに切り替える。

use std::collections::VecDeque;
use std::env;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;

/// 1 回の行入力の結果。
pub enum ReadResult {
    Line(String),
    /// Ctrl-D（空行）または入力の終端。
    Eof,
    /// Ctrl-C。
    Interrupted,
}

/// 補完関数。カーソルより左の入力を受け取り、候補と置き換え対象の語を返す。
pub type Completer<'a> = dyn FnMut(&str) -> (Vec<String>, String) + 'a;

const HISTORY_LIMIT: usize = 1000;
const HISTORY_ENV: &str = "TSUN_HISTORY_FILE";

pub struct LineEditor {
    history: History,
}

impl LineEditor {
    pub fn new() -> Self {
        Self {
            history: History::open(history_path(), HISTORY_LIMIT),
        }
    }

    /// プロンプトを出して 1 行読む。
    pub fn read_line(&mut self, prompt: &str, complete: &mut Completer<'_>) -> io::Result<ReadResult> {
        #[cfg(unix)]
        {
            if let Ok(guard) = RawTerminal::enter() {
                let result = self.read_line_raw(prompt, complete);
                drop(guard);
                return result;
            }
        }
        let _ = complete;
        read_plain_line(prompt)
    }

    pub fn add_history(&mut self, entry: &str) {
        self.history.push(entry);
    }

    pub fn save_history(&self) -> io::Result<()> {
        self.history.save()
    }

    #[cfg(unix)]
    fn read_line_raw(&mut self, prompt: &str, complete: &mut Completer<'_>) -> io::Result<ReadResult> {
        let mut stdout = io::stdout();
        write!(stdout, "{}", prompt)?;
        stdout.flush()?;

        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut line = LineBuffer::new(&self.history);
        loop {
            let mut first = [0u8; 1];
            if input.read(&mut first)? == 0 {
                return Ok(ReadResult::Eof);
            }
            let key = decode_key(first[0], &mut input)?;
            match key {
                Key::Enter => {
                    write!(stdout, "\r\n")?;
                    stdout.flush()?;
                    return Ok(ReadResult::Line(line.text()));
                }
                Key::CtrlC => {
                    write!(stdout, "^C\r\n")?;
                    stdout.flush()?;
                    return Ok(ReadResult::Interrupted);
                }
                Key::CtrlD if line.is_empty() => {
                    write!(stdout, "\r\n")?;
                    stdout.flush()?;
                    return Ok(ReadResult::Eof);
                }
                Key::Tab => {
                    let (candidates, word) = complete(&line.before_cursor());
                    match line.complete(&candidates, &word) {
                        Completion::Applied => {}
                        Completion::Ambiguous => write!(stdout, "\r\n{}\r\n", candidates.join("  "))?,
                        Completion::Nothing => write!(stdout, "\x07")?,
                    }
                    redraw(&mut stdout, prompt, &line)?;
                }
                other => {
                    if line.apply(other) == Redraw::Yes {
                        redraw(&mut stdout, prompt, &line)?;
                    }
                }
            }
        }
    }
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

/// 端末でない入力向けの行読み取り。
fn read_plain_line(prompt: &str) -> io::Result<ReadResult> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", prompt)?;
    stdout.flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(ReadResult::Eof);
    }
    let trimmed = line.trim_end_matches(&['\n', '\r'][..]).len();
    line.truncate(trimmed);
    Ok(ReadResult::Line(line))
}

/// 編集キー。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Enter,
    Tab,
    CtrlC,
    CtrlD,
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
    Up,
    Down,
    /// Ctrl-U: カーソルより左を消す。
    KillToStart,
    /// Ctrl-K: カーソルより右を消す。
    KillToEnd,
    /// Ctrl-W: 直前の語を消す。
    KillWord,
    Char(char),
    Unknown,
}

/// 先頭バイトと、必要なら後続バイトを読んでキーを判別する。
fn decode_key<R: Read>(first: u8, input: &mut R) -> io::Result<Key> {
    let key = match first {
        b'\r' | b'\n' => Key::Enter,
        b'\t' => Key::Tab,
        0x01 => Key::Home,
        0x03 => Key::CtrlC,
        0x04 => Key::CtrlD,
        0x05 => Key::End,
        0x0b => Key::KillToEnd,
        0x15 => Key::KillToStart,
        0x17 => Key::KillWord,
        0x08 | 0x7f => Key::Backspace,
        0x1b => decode_escape(input),
        _ => match decode_utf8(first, input)? {
            Some(ch) if !ch.is_control() => Key::Char(ch),
            _ => Key::Unknown,
        },
    };
    Ok(key)
}

/// `ESC [ x` と `ESC [ n ~` の形のシーケンス。途中で読めなければ無視する。
fn decode_escape<R: Read>(input: &mut R) -> Key {
    let mut next = || {
        let mut b = [0u8; 1];
        input.read_exact(&mut b).ok().map(|_| b[0])
    };
    if next() != Some(b'[') {
        return Key::Unknown;
    }
    match next() {
        Some(b'A') => Key::Up,
        Some(b'B') => Key::Down,
        Some(b'C') => Key::Right,
        Some(b'D') => Key::Left,
        Some(b'H') => Key::Home,
        Some(b'F') => Key::End,
        Some(digit @ b'1'..=b'8') => match (digit, next()) {
            (b'3', Some(b'~')) => Key::Delete,
            (b'1' | b'7', Some(b'~')) => Key::Home,
            (b'4' | b'8', Some(b'~')) => Key::End,
            _ => Key::Unknown,
        },
        _ => Key::Unknown,
    }
}

/// UTF-8 の 1 文字。不正な先頭バイトは `None`。
fn decode_utf8<R: Read>(first: u8, input: &mut R) -> io::Result<Option<char>> {
    let width = match first.leading_ones() {
        0 => 1,
        2 => 2,
        3 => 3,
        4 => 4,
        _ => return Ok(None),
    };
    let mut bytes = [first, 0, 0, 0];
    input.read_exact(&mut bytes[1..width])?;
    Ok(std::str::from_utf8(&bytes[..width])
        .ok()
        .and_then(|s| s.chars().next()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Redraw {
    Yes,
    No,
}

/// Tab 補完の結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    /// 語を書き換えた（候補が 1 つ、または共通接頭辞が伸びた）。
    Applied,
    /// 候補が複数あり、一覧を見せる必要がある。
    Ambiguous,
    Nothing,
}

/// 編集中の 1 行。履歴を辿る間は編集前の入力を退避しておく。
struct LineBuffer<'h> {
    chars: Vec<char>,
    cursor: usize,
    history: &'h History,
    /// 履歴上の位置。`history.len()` なら編集中の行。
    recall: usize,
    draft: Vec<char>,
}

impl<'h> LineBuffer<'h> {
    fn new(history: &'h History) -> Self {
        Self {
            chars: Vec::new(),
            cursor: 0,
            history,
            recall: history.len(),
            draft: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    fn text(&self) -> String {
        self.chars.iter().collect()
    }

    fn before_cursor(&self) -> String {
        self.chars[..self.cursor].iter().collect()
    }

    /// 編集キーを 1 つ適用する。
    fn apply(&mut self, key: Key) -> Redraw {
        let changed = match key {
            Key::Char(ch) => {
                self.chars.insert(self.cursor, ch);
                self.cursor += 1;
                self.edited();
                true
            }
            Key::Backspace if self.cursor > 0 => {
                self.cursor -= 1;
                self.chars.remove(self.cursor);
                self.edited();
                true
            }
            Key::Delete | Key::CtrlD if self.cursor < self.chars.len() => {
                self.chars.remove(self.cursor);
                self.edited();
                true
            }
            Key::Left if self.cursor > 0 => {
                self.cursor -= 1;
                true
            }
            Key::Right if self.cursor < self.chars.len() => {
                self.cursor += 1;
                true
            }
            Key::Home if self.cursor > 0 => {
                self.cursor = 0;
                true
            }
            Key::End if self.cursor < self.chars.len() => {
                self.cursor = self.chars.len();
                true
            }
            Key::KillToStart if self.cursor > 0 => {
                self.chars.drain(..self.cursor);
                self.cursor = 0;
                self.edited();
                true
            }
            Key::KillToEnd if self.cursor < self.chars.len() => {
                self.chars.truncate(self.cursor);
                self.edited();
                true
            }
            Key::KillWord if self.cursor > 0 => {
                let mut start = self.cursor;
                while start > 0 && self.chars[start - 1].is_whitespace() {
                    start -= 1;
                }
                while start > 0 && !self.chars[start - 1].is_whitespace() {
                    start -= 1;
                }
                self.chars.drain(start..self.cursor);
                self.cursor = start;
                self.edited();
                true
            }
            Key::Up => self.recall_older(),
            Key::Down => self.recall_newer(),
            _ => false,
        };
        if changed {
            Redraw::Yes
        } else {
            Redraw::No
        }
    }

    /// カーソル直前の `word` を候補で置き換える。
    fn complete(&mut self, candidates: &[String], word: &str) -> Completion {
        let Some(prefix) = common_prefix(candidates) else {
            return Completion::Nothing;
        };
        if !self.before_cursor().ends_with(word) {
            return Completion::Nothing;
        }
        let word_len = word.chars().count();
        let grew = prefix.chars().count() > word_len;
        if !grew && candidates.len() > 1 {
            return Completion::Ambiguous;
        }
        let start = self.cursor - word_len;
        self.chars.splice(start..self.cursor, prefix.chars());
        self.cursor = start + prefix.chars().count();
        self.edited();
        Completion::Applied
    }

    fn recall_older(&mut self) -> bool {
        if self.recall == 0 {
            return false;
        }
        if self.recall == self.history.len() {
            self.draft = self.chars.clone();
        }
        self.recall -= 1;
        self.load(self.history.get(self.recall).unwrap_or_default().chars().collect());
        true
    }

    fn recall_newer(&mut self) -> bool {
        if self.recall >= self.history.len() {
            return false;
        }
        self.recall += 1;
        let next = match self.history.get(self.recall) {
            Some(entry) => entry.chars().collect(),
            None => std::mem::take(&mut self.draft),
        };
        self.load(next);
        true
    }

    fn load(&mut self, chars: Vec<char>) {
        self.chars = chars;
        self.cursor = self.chars.len();
    }

    /// 手で編集したら履歴の位置を編集中の行へ戻す。
    fn edited(&mut self) {
        self.recall = self.history.len();
        self.draft.clear();
    }
}

/// 候補全体の共通接頭辞。候補が空なら `None`。
fn common_prefix(candidates: &[String]) -> Option<String> {
    let (first, rest) = candidates.split_first()?;
    let mut prefix: &str = first;
    for c in rest {
        let shared = prefix
            .char_indices()
            .zip(c.chars())
            .find(|((_, a), b)| a != b)
            .map_or_else(|| prefix.len().min(c.len()), |((i, _), _)| i);
        prefix = &prefix[..shared];
    }
    Some(prefix.to_string())
}

/// 行全体を描き直し、カーソルを所定の位置へ戻す。
fn redraw<W: Write>(out: &mut W, prompt: &str, line: &LineBuffer<'_>) -> io::Result<()> {
    write!(out, "\r{}{}\x1b[K", prompt, line.text())?;
    let back = line.chars.len() - line.cursor;
    if back > 0 {
        write!(out, "\x1b[{}D", back)?;
    }
    out.flush()
}

/// 入力履歴。複数行の入力は 1 行にまとめて保持する。
struct History {
    entries: VecDeque<String>,
    limit: usize,
    path: Option<PathBuf>,
}

impl History {
    fn open(path: Option<PathBuf>, limit: usize) -> Self {
        let mut history = Self {
            entries: VecDeque::new(),
            limit,
            path,
        };
        let saved = history
            .path
            .as_ref()
            .and_then(|p| fs::read_to_string(p).ok())
            .unwrap_or_default();
        for line in saved.lines() {
            history.push(line);
        }
        history
    }

    /// 空の入力と直前と同じ入力は積まない。
    fn push(&mut self, entry: &str) {
        let flat = entry.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.is_empty() || self.entries.back() == Some(&flat) {
            return;
        }
        if self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(flat);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, idx: usize) -> Option<&str> {
        self.entries.get(idx).map(String::as_str)
    }

    fn save(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(entry);
            text.push('\n');
        }
        fs::write(path, text)?;
        log::debug!("{} history entries saved to {}", self.entries.len(), path.display());
        Ok(())
    }
}

/// 履歴ファイルの場所。`TSUN_HISTORY_FILE` があればそれを使う。
fn history_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(HISTORY_ENV) {
        return Some(PathBuf::from(path));
    }
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".tsun_repl_history"))
}

#[cfg(unix)]
use termios_ffi::RawTerminal;

/// 標準入力を raw モードへ切り替える最小限の termios 呼び出し。
#[cfg(unix)]
mod termios_ffi {
    use std::io;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    const NCCS: usize = 32;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const NCCS: usize = 20;

    const STDIN: i32 = 0;
    const TCSANOW: i32 = 0;

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct Termios {
        c_iflag: u32,
        c_oflag: u32,
        c_cflag: u32,
        c_lflag: u32,
        c_line: u8,
        c_cc: [u8; NCCS],
        c_ispeed: u32,
        c_ospeed: u32,
    }

    extern "C" {
        fn tcgetattr(fd: i32, termios: *mut Termios) -> i32;
        fn tcsetattr(fd: i32, optional_actions: i32, termios: *const Termios) -> i32;
        fn cfmakeraw(termios: *mut Termios);
    }

    /// 生存中は raw モード。破棄で元の端末設定へ戻す。
    pub(super) struct RawTerminal {
        saved: Termios,
    }

    impl RawTerminal {
        pub(super) fn enter() -> io::Result<Self> {
            let mut saved = Termios {
                c_iflag: 0,
                c_oflag: 0,
                c_cflag: 0,
                c_lflag: 0,
                c_line: 0,
                c_cc: [0; NCCS],
                c_ispeed: 0,
                c_ospeed: 0,
            };
            // SAFETY: `saved` は十分な大きさを持つ有効な書き込み先。
            if unsafe { tcgetattr(STDIN, &mut saved) } != 0 {
                return Err(io::Error::last_os_error());
            }
            let mut raw = saved;
            // SAFETY: `raw` は直前に tcgetattr で初期化済み。
            unsafe { cfmakeraw(&mut raw) };
            // 出力側の改行変換は残す
            raw.c_oflag = saved.c_oflag;
            // SAFETY: 有効な termios を渡している。
            if unsafe { tcsetattr(STDIN, TCSANOW, &raw) } != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(Self { saved })
        }
    }

    impl Drop for RawTerminal {
        fn drop(&mut self) {
            // SAFETY: enter で取得した設定をそのまま戻す。
            unsafe {
                tcsetattr(STDIN, TCSANOW, &self.saved);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Mutex, OnceLock};

    fn history(entries: &[&str]) -> History {
        let mut h = History::open(None, 10);
        for e in entries {
            h.push(e);
        }
        h
    }

    fn typed<'h>(h: &'h History, text: &str) -> LineBuffer<'h> {
        let mut line = LineBuffer::new(h);
        for ch in text.chars() {
            line.apply(Key::Char(ch));
        }
        line
    }

    fn keys(bytes: &[u8]) -> Vec<Key> {
        let mut input = Cursor::new(bytes.to_vec());
        let mut out = Vec::new();
        let mut first = [0u8; 1];
        while input.read(&mut first).unwrap() == 1 {
            out.push(decode_key(first[0], &mut input).unwrap());
        }
        out
    }

    #[test]
    /// 制御文字とエスケープシーケンスをキーへ写す。
    fn decodes_keys() {
        assert_eq!(keys(b"\t\x03\x04\x7f"), vec![Key::Tab, Key::CtrlC, Key::CtrlD, Key::Backspace]);
        assert_eq!(keys(b"\x1b[A\x1b[D\x1b[3~\x1b[H"), vec![Key::Up, Key::Left, Key::Delete, Key::Home]);
        assert_eq!(keys(b"\x01\x05\x0b\x15\x17"), vec![
            Key::Home,
            Key::End,
            Key::KillToEnd,
            Key::KillToStart,
            Key::KillWord,
        ]);
        assert_eq!(keys(b"\x1b[Z"), vec![Key::Unknown]);
        assert_eq!(keys(b"\x1b"), vec![Key::Unknown]);
        assert_eq!(keys("aあ".as_bytes()), vec![Key::Char('a'), Key::Char('あ')]);
        assert_eq!(keys(&[0x80]), vec![Key::Unknown]);
    }

    #[test]
    /// 行内の移動と削除。
    fn editing_keys() {
        let h = history(&[]);
        let mut line = typed(&h, "let ab = 1");
        assert_eq!(line.apply(Key::Home), Redraw::Yes);
        assert_eq!(line.apply(Key::Home), Redraw::No);
        line.apply(Key::Delete);
        assert_eq!(line.text(), "et ab = 1");
        line.apply(Key::End);
        line.apply(Key::KillWord);
        assert_eq!(line.text(), "et ab = ");
        line.apply(Key::Left);
        line.apply(Key::Left);
        line.apply(Key::KillToEnd);
        assert_eq!(line.text(), "et ab ");
        line.apply(Key::KillToStart);
        assert!(line.is_empty());
        assert_eq!(line.apply(Key::Backspace), Redraw::No);
    }

    #[test]
    /// 履歴を遡っても、戻れば編集中の入力が復元される。
    fn history_recall_keeps_draft() {
        let h = history(&["first", "second"]);
        let mut line = typed(&h, "tmp");
        line.apply(Key::Up);
        assert_eq!(line.text(), "second");
        line.apply(Key::Up);
        assert_eq!(line.apply(Key::Up), Redraw::No);
        assert_eq!(line.text(), "first");
        line.apply(Key::Down);
        line.apply(Key::Down);
        assert_eq!(line.text(), "tmp");
        assert_eq!(line.apply(Key::Down), Redraw::No);
    }

    #[test]
    /// 空行と連続する重複は積まず、複数行は 1 行にし、上限を超えたら古いものから捨てる。
    fn history_push_rules() {
        let mut h = History::open(None, 3);
        for e in ["a", " a ", "   ", "function f() {\n  return 1;\n}", "b", "c"] {
            h.push(e);
        }
        let got: Vec<&str> = (0..h.len()).filter_map(|i| h.get(i)).collect();
        assert_eq!(got, vec!["function f() { return 1; }", "b", "c"]);
    }

    fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        let _guard = GUARD.get_or_init(|| Mutex::new(())).lock().unwrap();
        f()
    }

    #[test]
    /// 保存した履歴を環境変数の場所から読み直せる。
    fn history_persists_via_env_path() {
        with_env_lock(|| {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested").join("history.txt");
            let mut h = History::open(Some(path.clone()), 10);
            h.push("let a = 1;");
            h.push(":type a");
            h.save().unwrap();

            env::set_var(HISTORY_ENV, &path);
            let resolved = history_path();
            env::remove_var(HISTORY_ENV);
            assert_eq!(resolved.as_ref(), Some(&path));

            let loaded = History::open(resolved, 10);
            assert_eq!(loaded.get(0), Some("let a = 1;"));
            assert_eq!(loaded.get(1), Some(":type a"));
        });
    }

    #[test]
    /// 共通接頭辞の計算。
    fn common_prefix_of_candidates() {
        let c = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(common_prefix(&c(&["toFixed", "toString"])).as_deref(), Some("to"));
        assert_eq!(common_prefix(&c(&["log", "logger"])).as_deref(), Some("log"));
        assert_eq!(common_prefix(&c(&["a", "b"])).as_deref(), Some(""));
        assert_eq!(common_prefix(&[]), None);
    }

    #[test]
    /// 候補が 1 つなら語を置き換え、複数で伸びなければ一覧表示を求める。
    fn completion_rewrites_word_before_cursor() {
        let h = history(&[]);
        let mut line = typed(&h, "'abc'.le");
        assert_eq!(line.complete(&["length".into()], "le"), Completion::Applied);
        assert_eq!(line.before_cursor(), "'abc'.length");

        let mut line = typed(&h, "Math.");
        let many = vec!["abs".to_string(), "acos".to_string()];
        assert_eq!(line.complete(&many, ""), Completion::Applied);
        assert_eq!(line.text(), "Math.a");
        assert_eq!(line.complete(&many, "a"), Completion::Ambiguous);
        assert_eq!(line.complete(&[], "a"), Completion::Nothing);
        assert_eq!(line.complete(&["zz".into()], "q"), Completion::Nothing);
    }

    #[test]
    /// 再描画の後、カーソルを入力の途中へ戻す。
    fn redraw_repositions_cursor() {
        let h = history(&[]);
        let mut line = typed(&h, "abc");
        line.apply(Key::Left);
        line.apply(Key::Left);
        let mut out: Vec<u8> = Vec::new();
        redraw(&mut out, "> ", &line).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\r> abc\x1b[K\x1b[2D");
    }
}
