//! # Fukurow SH CLI Library
//!
//! SH 分類エンジンのコマンドラインインターフェース
//! 関数型構文のオントロジーを分類し、階層を出力

pub mod commands;

pub use commands::*;
