//! Operations fed to the transaction manager by the driver.

use serde::{Deserialize, Serialize};

use crate::types::{LockType, Timestamp, TransactionId, Value, VariableId};

/// What an operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Start a read-write transaction.
    Begin,
    /// Start a read-only transaction.
    BeginReadOnly,
    /// Read a variable.
    Read {
        /// Variable to read.
        variable: VariableId,
    },
    /// Write a variable.
    Write {
        /// Variable to write.
        variable: VariableId,
        /// Value to write.
        value: Value,
    },
    /// Commit (`end`) the transaction, aborting it if validation fails.
    Commit,
}

/// An operation issued by a transaction at a given logical time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Issuing transaction.
    pub transaction: TransactionId,
    /// What to do.
    pub kind: OperationKind,
    /// Logical time the operation arrived.
    pub arrival: Timestamp,
}

impl Operation {
    /// `begin(T)`.
    pub fn begin(transaction: TransactionId, arrival: Timestamp) -> Self {
        Self {
            transaction,
            kind: OperationKind::Begin,
            arrival,
        }
    }

    /// `beginRO(T)`.
    pub fn begin_read_only(transaction: TransactionId, arrival: Timestamp) -> Self {
        Self {
            transaction,
            kind: OperationKind::BeginReadOnly,
            arrival,
        }
    }

    /// `R(T, x)`.
    pub fn read(transaction: TransactionId, variable: VariableId, arrival: Timestamp) -> Self {
        Self {
            transaction,
            kind: OperationKind::Read { variable },
            arrival,
        }
    }

    /// `W(T, x, v)`.
    pub fn write(
        transaction: TransactionId,
        variable: VariableId,
        value: Value,
        arrival: Timestamp,
    ) -> Self {
        Self {
            transaction,
            kind: OperationKind::Write { variable, value },
            arrival,
        }
    }

    /// `end(T)`.
    pub fn commit(transaction: TransactionId, arrival: Timestamp) -> Self {
        Self {
            transaction,
            kind: OperationKind::Commit,
            arrival,
        }
    }

    /// Variable touched by a read or write.
    pub fn variable(&self) -> Option<VariableId> {
        match self.kind {
            OperationKind::Read { variable } | OperationKind::Write { variable, .. } => {
                Some(variable)
            }
            OperationKind::Begin | OperationKind::BeginReadOnly | OperationKind::Commit => None,
        }
    }

    /// Lock a read or write needs.
    pub fn lock_type(&self) -> Option<LockType> {
        match self.kind {
            OperationKind::Read { .. } => Some(LockType::Read),
            OperationKind::Write { .. } => Some(LockType::Write),
            OperationKind::Begin | OperationKind::BeginReadOnly | OperationKind::Commit => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            OperationKind::Begin => write!(f, "begin({})", self.transaction),
            OperationKind::BeginReadOnly => write!(f, "beginRO({})", self.transaction),
            OperationKind::Read { variable } => write!(f, "R({}, {})", self.transaction, variable),
            OperationKind::Write { variable, value } => {
                write!(f, "W({}, {}, {})", self.transaction, variable, value)
            }
            OperationKind::Commit => write!(f, "end({})", self.transaction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_and_accessors() {
        let t = TransactionId::new(1);
        let x = VariableId::new(3);
        let now = Timestamp::new(4);

        let read = Operation::read(t, x, now);
        assert_eq!(read.variable(), Some(x));
        assert_eq!(read.lock_type(), Some(LockType::Read));

        let write = Operation::write(t, x, 7, now);
        assert_eq!(write.lock_type(), Some(LockType::Write));

        let commit = Operation::commit(t, now);
        assert_eq!(commit.variable(), None);
        assert_eq!(commit.lock_type(), None);
    }

    #[test]
    fn test_display_matches_script_syntax() {
        let t = TransactionId::new(2);
        let now = Timestamp::new(0);
        assert_eq!(Operation::begin_read_only(t, now).to_string(), "beginRO(T2)");
        assert_eq!(
            Operation::write(t, VariableId::new(6), 8, now).to_string(),
            "W(T2, x6, 8)"
        );
        assert_eq!(Operation::commit(t, now).to_string(), "end(T2)");
    }

    #[test]
    fn test_operation_serde_roundtrip() {
        let op = Operation::write(TransactionId::new(1), VariableId::new(2), 42, Timestamp::new(9));
        let json = serde_json::to_string(&op).expect("serialize");
        let decoded: Operation = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(op, decoded);
    }
}
