//! 冪等アクションレジャー
//!
//! 副作用を伴うアクションを重複排除しつつ永続化し、取り消し（undo）用に
//! 「直近の取り消し可能アクション」を引けるようにする。
//! 永続化の実装は `crate::db::ledger::SqliteLedger`。

pub mod types;

pub use crate::db::ledger::SqliteLedger;
pub use types::{LastReversibleFilter, LedgerEntry, NewAction, RecordOutcome};
