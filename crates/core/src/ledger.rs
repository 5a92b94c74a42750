//! The ledger: serializes transactions against a hosted program and keeps
//! the append-only history of everything it committed.

use crate::schema::{self, Election, Participant, Transition};
use crate::{
    Address, Call, ElectionConfig, Error, Hash, Program, State, Transaction, VotingProgram,
};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Proof of a committed transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub id: Hash,
    /// Round in which the transaction was committed (first commit is 1).
    pub round: u64,
}

pub struct Ledger {
    /// Committed state.
    state: State,

    /// Committed transactions, in order.
    history: Vec<Transaction>,

    /// Ids in `history`, for replay checks.
    committed: BTreeSet<Hash>,

    program: Box<dyn Program>,

    round: u64,

    /// Current ledger time. Only moves forward.
    timestamp: u64,
}

impl Ledger {
    /// Create an empty ledger hosting `program`.
    pub fn new(program: Box<dyn Program>) -> Self {
        Self {
            state: State::new(),
            history: Vec::new(),
            committed: BTreeSet::new(),
            program,
            round: 0,
            timestamp: 0,
        }
    }

    /// Create an empty ledger hosting a [`VotingProgram`] with `config`.
    pub fn with_config(config: ElectionConfig) -> Result<Self, Error> {
        Ok(Self::new(Box::new(VotingProgram::new(config)?)))
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn history(&self) -> &[Transaction] {
        &self.history
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Hash of the whole committed state. Walks every record.
    pub fn state_hash(&self) -> Result<Hash, Error> {
        self.state.hash()
    }

    /// Move ledger time forward. Going backwards is `ClockSkew`.
    pub fn advance(&mut self, timestamp: u64) -> Result<(), Error> {
        if timestamp < self.timestamp {
            return Err(Error::ClockSkew {
                current: self.timestamp,
                requested: timestamp,
            });
        }
        self.timestamp = timestamp;
        Ok(())
    }

    /// Read the election record.
    pub fn election(&self) -> Result<Election, Error> {
        Election::load(&self.state)
    }

    /// Read one account's local state.
    pub fn participant(&self, account: &Address) -> Result<Participant, Error> {
        Participant::load(&self.state, account)
    }

    /// All registered accounts with their local state.
    pub fn participants(&self) -> Result<Vec<(Address, Participant)>, Error> {
        Participant::accounts(&self.state)?
            .into_iter()
            .map(|account| Ok((account, Participant::load(&self.state, &account)?)))
            .collect()
    }

    /// Submit a transaction. Either every write it makes is committed and
    /// the transaction is appended to history, or nothing changes. The cost
    /// depends on the records the transaction touches, not on how many
    /// accounts are registered.
    pub fn submit(&mut self, mut tx: Transaction) -> Result<Receipt, Error> {
        tx.refresh_id()?;

        match self.try_commit(&tx) {
            Ok(receipt) => {
                debug!("Committed {} from {} in round {}", tx.id, tx.sender, receipt.round);
                self.history.push(tx);
                Ok(receipt)
            }
            Err(e) => {
                warn!(
                    "Rejected {} ({:?} {:?}) from {}: {}",
                    tx.id, tx.on_completion, tx.operation, tx.sender, e
                );
                Err(e)
            }
        }
    }

    fn try_commit(&mut self, tx: &Transaction) -> Result<Receipt, Error> {
        tx.verify_signature()?;

        if self.committed.contains(&tx.id) {
            return Err(Error::Replayed(tx.id));
        }

        let call = Call {
            sender: tx.sender,
            on_completion: tx.on_completion,
            operation: &tx.operation,
            args: &tx.args,
            now: self.timestamp,
        };
        let mutations = self.program.execute(&call, &self.state)?;

        // Checked against the committed state before anything is written.
        let transition = schema::check_transition(&self.state, &mutations)?;

        for mutation in mutations {
            self.state.set_path(&mutation.path, mutation.value);
        }
        debug_assert!(
            schema::audit(&self.state).is_ok(),
            "commit {} broke a ledger invariant",
            tx.id
        );
        self.round += 1;
        self.committed.insert(tx.id);

        match transition {
            Transition::Created => info!("Election created by {} at {}", tx.sender, self.timestamp),
            Transition::Closed => info!("Election closed by {} at {}", tx.sender, self.timestamp),
            Transition::Updated => {}
        }

        Ok(Receipt {
            id: tx.id,
            round: self.round,
        })
    }
}
