//! SH 帰結ベース分類エンジン
//!
//! このクレートは記述論理オントロジーの分類を提供します:
//! - 概念・ロールのインターン化 (term model)
//! - 節 (clause) の解消・包含演算
//! - 構造的正規化による単項/二項規則データベース
//! - コンテキストグラフ上の飽和 (saturation) アルゴリズム
//! - 関数型構文ローダーと階層フォーマッター
//!
//! 既知の制限: 推移性は存在量化に対してのみ展開されます。推移的ロール上の
//! 全称制約 (`Trans(r)` と `∀r.D`) はロール連鎖に沿って伝播されないため、
//! 二段以上先の後続で起きる矛盾は検出されません。

pub mod model;
pub mod clause;
pub mod hierarchy;
pub mod ontology;
pub mod context;
pub mod saturation;
pub mod reasoner;
pub mod config;
pub mod loader;
pub mod formatter;

pub use model::{Concept, ConceptId, Literal, Role, RoleId, TermFactory};
pub use clause::Clause;
pub use hierarchy::RoleHierarchy;
pub use ontology::Ontology;
pub use saturation::{Saturation, SaturationStats};
pub use reasoner::{Classification, ClassificationReport, GoalOutcome, ShReasoner};
pub use config::ReasonerConfig;
pub use loader::{read_goals, AxiomLoader, FunctionalSyntaxLoader, LoadReport};
pub use formatter::{write_goal_report, HierarchyFormatter};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShError {
    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ShError>;
