//! Transaction lifecycle state machine

use std::fmt;

use serde::Serialize;

/// Transaction state of an accessor.
///
/// ```text
/// Before --begin--> Active --commit/rollback--> After
/// ```
///
/// `After` is terminal. Readers start in `After` since they never open a
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TxnState {
   /// No transaction started yet.
   Before,
   /// Transaction open.
   Active,
   /// Transaction committed or rolled back, or never needed.
   After,
}

impl fmt::Display for TxnState {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let name = match self {
         TxnState::Before => "Before",
         TxnState::Active => "Active",
         TxnState::After => "After",
      };
      f.write_str(name)
   }
}

/// Transaction lifecycle operation, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnOp {
   Begin,
   Commit,
   Rollback,
}

impl fmt::Display for TxnOp {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let name = match self {
         TxnOp::Begin => "begin",
         TxnOp::Commit => "commit",
         TxnOp::Rollback => "rollback",
      };
      f.write_str(name)
   }
}

/// An illegal lifecycle call. Accessors panic with this rather than return it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {op} transaction: current transaction state is {state}")]
pub struct TxnMisuse {
   pub op: TxnOp,
   pub state: TxnState,
}

/// What a rollback call has to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RollbackAction {
   Perform,
   Skip,
}

impl TxnState {
   pub(crate) fn check_begin(self) -> Result<(), TxnMisuse> {
      match self {
         TxnState::Before => Ok(()),
         state => Err(TxnMisuse {
            op: TxnOp::Begin,
            state,
         }),
      }
   }

   pub(crate) fn check_commit(self) -> Result<(), TxnMisuse> {
      match self {
         TxnState::Active => Ok(()),
         state => Err(TxnMisuse {
            op: TxnOp::Commit,
            state,
         }),
      }
   }

   /// Rollback after the transaction concluded is a no-op so it can sit in
   /// cleanup paths that also run after a commit.
   pub(crate) fn check_rollback(self) -> Result<RollbackAction, TxnMisuse> {
      match self {
         TxnState::Active => Ok(RollbackAction::Perform),
         TxnState::After => Ok(RollbackAction::Skip),
         TxnState::Before => Err(TxnMisuse {
            op: TxnOp::Rollback,
            state: TxnState::Before,
         }),
      }
   }
}
