// パス: src/repl/mod.rs
// 役割: REPL モジュールのファサード
// 意図: 対話の入口と、テストで差し替える入出力の抽象だけを公開する
// 関連ファイル: src/repl/cmd.rs, src/bin/tsun.rs
//! TSUN の対話環境。
//!
//! - `cmd`: メインループ・メタコマンド・確定手順
//! - `assembler`: 複数行入力の組み立て
//! - `line_editor`: 端末の行編集と Tab 補完
//! - `loader`: `:load` のファイル読み込み
//! - `printer`: 表示

pub mod assembler;
pub mod cmd;
mod line_editor;
mod loader;
mod printer;

pub use cmd::{run_repl, run_repl_with, FsIo, ReplIo, ReplLineSource, ReplOptions};
pub use line_editor::{Completer, ReadResult};
pub use printer::Prompts;
