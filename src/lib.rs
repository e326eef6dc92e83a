// パス: src/lib.rs
// 役割: クレートのルート。各段（字句・構文・型検査・出力・評価・セッション・REPL）を束ねる
// 意図: バイナリと結合テストが同じ公開 API を使うようにする
// 関連ファイル: src/bin/tsun.rs, src/session/mod.rs, src/repl/mod.rs
//! tsun ルートモジュール
//!
//! 型付きの TypeScript 部分集合を ES5 相当のスクリプトへ変換し、その場で実行する。
//!
//! 流れ:
//! - `lexer` → `parser` で構文木を作る。
//! - `checker` が宣言ファイルと一緒に型を検査する。
//! - `codegen` が型を消したスクリプトを出力し、`evaluator` が実行する。
//! - `session` が追記専用のバッファと出力差分を管理し、`repl` が対話を担う。
//! - `executor` はファイルを事前にまとめてコンパイルして実行する。
#![allow(unexpected_cfgs)]
#![cfg_attr(coverage, feature(coverage_attribute))]

pub mod ast;
pub mod capabilities;
pub mod checker;
pub mod codegen;
pub mod config;
pub mod errors;
pub mod evaluator;
pub mod executor;
pub(crate) mod intrinsics;
pub mod lexer;
pub mod parser;
pub(crate) mod primitives;
pub mod repl;
pub mod runtime;
pub mod session;
pub mod typesys;

pub use crate::errors::*;
pub use crate::parser::{parse_expr, parse_program, parse_type_text};
