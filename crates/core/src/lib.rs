//! ezpoll-core: ledger state machine for two-option elections.
//!
//! - `Ledger`: serializes signed transactions and commits them atomically
//! - `VotingProgram`: create, register, vote and close rules
//! - `Election` / `Participant`: read-only views of global and local state

mod error;
mod hash;
mod state;
mod transaction;
pub mod config;
pub mod ledger;
pub mod program;
pub mod schema;

pub use config::{ClosePolicy, ElectionConfig};
pub use error::{Error, ErrorKind};
pub use hash::Hash;
pub use ledger::{Ledger, Receipt};
pub use program::{Call, Mutation, Program, VotingProgram};
pub use schema::{Election, OPTION_COUNT, Participant};
pub use state::{Overlay, Path, State, Store, Value};
pub use transaction::{Address, OnCompletion, Transaction, option_arg};

/// Re-export for convenience
pub use ed25519_dalek::{SigningKey, VerifyingKey};
