// パス: src/codegen/mod.rs
// 役割: 出力スクリプト生成のエラー型と設定を定義し、下位変換器を束ねる
// 意図: セッション層と事前コンパイル実行器が同じ入口から出力を得られるようにする
// 関連ファイル: src/codegen/es5.rs, src/session/mod.rs, src/executor.rs

pub mod es5;

use thiserror::Error;

use crate::ast::{Program, Span};

/// 出力生成で発生しうるエラー種別。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmitError {
    #[error("出力未対応の構文です: {message}")]
    Unsupported {
        code: &'static str,
        message: String,
        span: Span,
    },
}

impl EmitError {
    pub fn unsupported(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self::Unsupported {
            code,
            message: message.into(),
            span,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            EmitError::Unsupported { code, .. } => code,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            EmitError::Unsupported { span, .. } => *span,
        }
    }
}

/// 出力生成の結果を表す型。
pub type EmitResult<T> = Result<T, EmitError>;

/// 出力の設定。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmitOptions {
    /// `__extends` などの補助関数定義を出力へ含める。
    pub emit_helpers: bool,
    /// `emit_helpers` のとき、使われていない補助関数も常に先頭へ置く。
    /// 追記で出力の先頭行が変わらないので、行数による差分でも既存の行がずれない。
    pub all_helpers: bool,
}

/// プログラム全体を ES5 相当のスクリプトへ変換する。
pub fn emit_program(program: &Program, options: &EmitOptions) -> EmitResult<String> {
    es5::Emitter::new(*options).emit(program)
}
