// パス: src/session/snapshot.rs
// 役割: 受理済みバッファ（前置きの参照行 + 確定した文）と版番号を保持する
// 意図: 投機的な問い合わせは複製上で行い、確定した履歴だけを残す
// 関連ファイル: src/session/mod.rs, src/session/delta.rs
//! スナップショットストア
//!
//! - バッファは追記専用。`reset` だけが前置きへ戻す。
//! - 版番号は追記の試行（検査のための複製作成を含む）ごとに増え、減ることはない。

use std::rc::Rc;

/// ある時点のバッファ内容。不変で、複製は参照カウントの増加だけで済む。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    text: Rc<str>,
    version: u64,
}

impl Snapshot {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug)]
pub struct SnapshotStore {
    preamble: Rc<str>,
    current: Snapshot,
}

impl SnapshotStore {
    /// 前置き（参照行）だけを持つストアを作る。
    pub fn new(preamble: impl Into<String>) -> Self {
        let preamble: Rc<str> = Rc::from(preamble.into());
        Self {
            current: Snapshot {
                text: Rc::clone(&preamble),
                version: 0,
            },
            preamble,
        }
    }

    pub fn current_text(&self) -> &str {
        self.current.text()
    }

    pub fn version(&self) -> u64 {
        self.current.version
    }

    pub fn snapshot(&self) -> Snapshot {
        self.current.clone()
    }

    /// 候補を連結した作業用スナップショットを返す。ストアの内容は変わらず、版番号だけ進む。
    pub fn probe(&mut self, candidate: &str) -> Snapshot {
        self.bump();
        Snapshot {
            text: Rc::from(join(self.current.text(), candidate)),
            version: self.current.version,
        }
    }

    /// 候補を恒久的に追記する。
    pub fn commit(&mut self, candidate: &str) {
        let text = join(self.current.text(), candidate);
        self.current = Snapshot {
            text: Rc::from(text),
            version: self.current.version + 1,
        };
        log::debug!("snapshot committed: version {}", self.current.version);
    }

    /// 前置きだけの状態へ戻す。
    pub fn reset(&mut self) {
        self.current = Snapshot {
            text: Rc::clone(&self.preamble),
            version: self.current.version + 1,
        };
        log::debug!("snapshot reset: version {}", self.current.version);
    }

    fn bump(&mut self) {
        self.current.version += 1;
        log::debug!("snapshot probe: version {}", self.current.version);
    }
}

/// バッファ末尾へ候補を 1 行以上として連結する。
pub(crate) fn join(base: &str, candidate: &str) -> String {
    let mut text = String::with_capacity(base.len() + candidate.len() + 2);
    text.push_str(base);
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(candidate);
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 投機的な連結はストアの内容を変えず、版番号だけを進める。
    fn probe_is_copy_on_write() {
        let mut store = SnapshotStore::new("/// <reference path=\"lib.core.d.ts\" />\n");
        let before = store.current_text().to_string();
        let scratch = store.probe("let x = 1;");
        assert_eq!(store.current_text(), before);
        assert!(scratch.text().ends_with("let x = 1;\n"));
        assert_eq!(store.version(), 1);
        assert_eq!(scratch.version(), 1);
    }

    #[test]
    /// 追記と初期化で版番号が単調に増える。
    fn commit_and_reset_are_monotonic() {
        let mut store = SnapshotStore::new("");
        store.commit("let a = 1;");
        store.commit("let b = 2;");
        assert_eq!(store.current_text(), "let a = 1;\nlet b = 2;\n");
        let v = store.version();
        store.reset();
        assert_eq!(store.current_text(), "");
        assert!(store.version() > v);
    }

    #[test]
    /// 古いスナップショットは追記後も当時の内容を保つ。
    fn snapshots_are_immutable() {
        let mut store = SnapshotStore::new("");
        store.commit("1;");
        let old = store.snapshot();
        store.commit("2;");
        assert_eq!(old.text(), "1;\n");
        assert_eq!(store.current_text(), "1;\n2;\n");
    }
}
