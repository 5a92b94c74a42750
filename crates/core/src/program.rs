//! The voting program: validates a call against current state and returns
//! the writes it would make. It never touches state directly; the ledger
//! applies the writes only if the whole call succeeds.

use crate::schema::{
    self, Election, Participant, KEY_CHOICE, KEY_CREATED_AT, KEY_CREATOR, KEY_DEADLINE, KEY_OPEN,
    KEY_VOTED, OPTION_COUNT,
};
use crate::{Address, ElectionConfig, Error, OnCompletion, Path, State, Value};

/// A single write produced by a program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mutation {
    pub path: Path,
    pub value: Value,
}

/// An inbound call, as seen by a program.
#[derive(Clone, Copy, Debug)]
pub struct Call<'a> {
    pub sender: Address,
    pub on_completion: OnCompletion,
    pub operation: &'a str,
    pub args: &'a [Vec<u8>],
    /// Ledger timestamp at which the call executes.
    pub now: u64,
}

/// Application logic hosted by the ledger.
pub trait Program: Send + Sync {
    /// Validate `call` against `state` and return the writes to commit.
    /// Any error means nothing is written.
    fn execute(&self, call: &Call<'_>, state: &State) -> Result<Vec<Mutation>, Error>;
}

/// Write set for one call. Local writes always target the caller's own
/// record; there is no way to address another account.
struct Writes {
    sender: Address,
    mutations: Vec<Mutation>,
}

impl Writes {
    fn new(sender: Address) -> Self {
        Self {
            sender,
            mutations: Vec::new(),
        }
    }

    fn global(&mut self, key: &str, value: Value) {
        self.push(schema::global_path(key), value);
    }

    fn tally(&mut self, option: u64, count: u64) {
        self.push(schema::tally_path(option), schema::encode_uint(count));
    }

    fn local(&mut self, key: &str, value: Value) {
        let path = schema::local_path(&self.sender, key);
        self.push(path, value);
    }

    fn push(&mut self, path: Path, value: Value) {
        self.mutations.push(Mutation { path, value });
    }
}

/// Two-option election with one ballot per registered account.
#[derive(Clone, Debug, Default)]
pub struct VotingProgram {
    config: ElectionConfig,
}

impl VotingProgram {
    pub fn new(config: ElectionConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    fn create(&self, call: &Call<'_>, state: &State, writes: &mut Writes) -> Result<(), Error> {
        if Election::exists(state) {
            return Err(Error::AlreadyExists("election already created".into()));
        }
        expect_no_args(call)?;

        writes.global(KEY_CREATOR, call.sender.as_bytes().to_vec());
        writes.global(KEY_OPEN, schema::encode_bool(true));
        for option in 0..OPTION_COUNT as u64 {
            writes.tally(option, 0);
        }
        writes.global(KEY_CREATED_AT, schema::encode_uint(call.now));
        if let Some(deadline) = self.config.deadline {
            writes.global(KEY_DEADLINE, schema::encode_uint(deadline));
        }
        Ok(())
    }

    fn register(&self, call: &Call<'_>, state: &State, writes: &mut Writes) -> Result<(), Error> {
        if !Election::exists(state) {
            return Err(Error::NotFound("election has not been created".into()));
        }
        if Participant::is_registered(state, &call.sender) {
            return Err(Error::AlreadyExists(format!(
                "account {} is already registered",
                call.sender
            )));
        }

        writes.local(KEY_VOTED, schema::encode_bool(false));
        Ok(())
    }

    fn cast_ballot(
        &self,
        call: &Call<'_>,
        state: &State,
        writes: &mut Writes,
    ) -> Result<(), Error> {
        let election = Election::load(state)?;
        if !election.is_open {
            return Err(Error::InvalidState("election is closed".into()));
        }
        if election.deadline_passed(call.now) {
            return Err(Error::InvalidState(format!(
                "voting ended at {}",
                election.deadline.unwrap_or_default()
            )));
        }

        let [arg] = call.args else {
            return Err(Error::MalformedInput(format!(
                "vote takes exactly one argument, got {}",
                call.args.len()
            )));
        };
        let option = schema::decode_option(arg)?;

        let participant = Participant::load(state, &call.sender)?;
        if participant.has_voted {
            return Err(Error::AlreadyDone(format!("account {} already voted", call.sender)));
        }

        let count = election.tally[option as usize]
            .checked_add(1)
            .ok_or_else(|| Error::Corrupted(format!("tally for option {option} overflowed")))?;

        writes.tally(option, count);
        writes.local(KEY_VOTED, schema::encode_bool(true));
        writes.local(KEY_CHOICE, schema::encode_uint(option));
        Ok(())
    }

    fn close(&self, call: &Call<'_>, state: &State, writes: &mut Writes) -> Result<(), Error> {
        let election = Election::load(state)?;
        let policy = self.config.close_policy;

        if policy.requires_creator() && call.sender != election.creator {
            return Err(Error::Unauthorized(format!(
                "only the creator may close, not {}",
                call.sender
            )));
        }
        if !election.is_open {
            return Err(Error::InvalidState("election is already closed".into()));
        }
        if policy.requires_deadline() && !election.deadline_passed(call.now) {
            return Err(Error::InvalidState(match election.deadline {
                Some(end) => format!("cannot close before {end}"),
                None => "no deadline recorded".to_string(),
            }));
        }
        expect_no_args(call)?;

        writes.global(KEY_OPEN, schema::encode_bool(false));
        Ok(())
    }
}

impl Program for VotingProgram {
    fn execute(&self, call: &Call<'_>, state: &State) -> Result<Vec<Mutation>, Error> {
        let mut writes = Writes::new(call.sender);

        match call.on_completion {
            // Deny-list first: these paths fail whatever the current state.
            OnCompletion::CloseOut
            | OnCompletion::ClearState
            | OnCompletion::UpdateApplication
            | OnCompletion::DeleteApplication => {
                return Err(Error::ForbiddenExit(format!(
                    "{:?} is disabled for this application",
                    call.on_completion
                )));
            }
            OnCompletion::OptIn => self.register(call, state, &mut writes)?,
            OnCompletion::NoOp => match call.operation {
                "create" => self.create(call, state, &mut writes)?,
                _ if !Election::exists(state) => {
                    return Err(Error::NotFound("election has not been created".into()));
                }
                "vote" => self.cast_ballot(call, state, &mut writes)?,
                "close" => self.close(call, state, &mut writes)?,
                other => {
                    return Err(Error::MalformedInput(format!("unknown operation {other:?}")));
                }
            },
        }

        Ok(writes.mutations)
    }
}

fn expect_no_args(call: &Call<'_>) -> Result<(), Error> {
    if call.args.is_empty() {
        Ok(())
    } else {
        Err(Error::MalformedInput(format!(
            "{} takes no arguments, got {}",
            call.operation,
            call.args.len()
        )))
    }
}
