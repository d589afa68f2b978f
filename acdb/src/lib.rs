//! # acdb: Available-Copies Replicated Database
//!
//! This crate is the core of a discrete-event simulator for a replicated,
//! partitioned database. Transactions run under multiversion two-phase
//! locking with available-copies replication. Sites fail and recover, and a
//! wait-for graph detects deadlocks.
//!
//! Nothing here does I/O or keeps real time. A driver (see the `acdb-sim`
//! crate) advances a logical clock, feeds [`Operation`]s into the
//! [`TransactionManager`] and renders the [`Event`]s it drains back out.
//!
//! ## Data Layout
//!
//! | Variable | Hosted at | Initial value |
//! |---|---|---|
//! | even id (replicated) | every site | `10 * id` |
//! | odd id (non-replicated) | site `1 + id % sites` | `10 * id` |
//!
//! ## Rules in Brief
//!
//! 1. **Read-write transactions** read one up, readable copy under a READ
//!    lock and write every up copy under WRITE locks (all or nothing).
//! 2. **Read-only transactions** take no locks. They read the latest
//!    version committed before they began, from a site that has not failed
//!    since that version was committed.
//! 3. **Commit** is refused if any site the transaction accessed failed
//!    after the first access or is down. The transaction then aborts.
//! 4. **Recovery** makes non-replicated copies readable at once. A
//!    replicated copy stays unreadable until a later commit writes it.
//! 5. **Deadlocks** are broken by aborting the youngest transaction on a
//!    wait-for cycle.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  TransactionManager                      │
//! │   admission, FIFO fairness, retry sweep, commit rules    │
//! │   WaitForGraph: cycle detection, victim selection        │
//! └───────────┬──────────────────────────────────────────────┘
//!             │ acquire / commit / abort / fail / recover
//!             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Site (one per id)                     │
//! │  ┌────────────────────┐      ┌─────────────────────────┐ │
//! │  │    LockManager     │      │      DataManager        │ │
//! │  │ READ/WRITE table   │      │ versioned commit history│ │
//! │  └────────────────────┘      └─────────────────────────┘ │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Crate Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Ids, `Timestamp`, `LockType`, statuses, `TransactionError` |
//! | [`config`] | `DatabaseConfig`: site and variable layout |
//! | [`data_manager`] | Per-site multiversion storage |
//! | [`lock_manager`] | Per-site lock table |
//! | [`site`] | A site: status plus its data and lock managers |
//! | [`transaction`] | Per-transaction locks, accessed sites and buffered values |
//! | [`operation`] | Operations issued by the driver |
//! | [`event`] | Events reported back to the driver |
//! | [`wait_for`] | Wait-for graph and cycle detection |
//! | [`manager`] | The `TransactionManager` |

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod data_manager;
pub mod event;
pub mod lock_manager;
pub mod manager;
pub mod operation;
pub mod site;
pub mod transaction;
pub mod types;
pub mod wait_for;

// Re-export key types at crate root for convenience
pub use config::{ConfigError, DatabaseConfig};
pub use data_manager::{DataCopy, DataManager, Version};
pub use event::{AbortReason, BlockReason, Event};
pub use lock_manager::LockManager;
pub use manager::{RequestOutcome, SiteDump, TransactionManager};
pub use operation::{Operation, OperationKind};
pub use site::Site;
pub use transaction::Transaction;
pub use types::{
    LockType, SiteId, SiteStatus, Timestamp, TransactionError, TransactionId, TransactionKind,
    TransactionStatus, Value, VariableId,
};
pub use wait_for::WaitForGraph;
