//! Storage layout for the voting program.
//!
//! ```text
//! /global/creator            32-byte address
//! /global/open               uint (1 = open, 0 = closed)
//! /global/tally/<option>     uint
//! /global/created_at         uint (ledger timestamp)
//! /global/deadline           uint, only when the deployment has one
//! /local/<address>/voted     uint (0 or 1)
//! /local/<address>/choice    uint, only once voted
//! ```
//!
//! Uints are 8-byte big-endian. Reads go through the typed [`Election`] and
//! [`Participant`] views; a value of the wrong shape is `Error::Corrupted`.

use crate::{Address, Error, Mutation, Overlay, Path, State, Store};
use serde::Serialize;
use std::collections::BTreeSet;

/// Number of ballot options. Valid option indices are `0..OPTION_COUNT`.
pub const OPTION_COUNT: usize = 2;

pub const GLOBAL: &str = "global";
pub const LOCAL: &str = "local";

pub const KEY_CREATOR: &str = "creator";
pub const KEY_OPEN: &str = "open";
pub const KEY_TALLY: &str = "tally";
pub const KEY_CREATED_AT: &str = "created_at";
pub const KEY_DEADLINE: &str = "deadline";
pub const KEY_VOTED: &str = "voted";
pub const KEY_CHOICE: &str = "choice";

/// Path of a global key, e.g. `["global", "open"]`.
pub fn global_path(key: &str) -> Path {
    vec![GLOBAL.to_string(), key.to_string()]
}

pub fn tally_path(option: u64) -> Path {
    vec![GLOBAL.to_string(), KEY_TALLY.to_string(), option.to_string()]
}

/// Path of a key in one account's local state.
pub fn local_path(account: &Address, key: &str) -> Path {
    vec![LOCAL.to_string(), account.to_hex(), key.to_string()]
}

pub fn encode_uint(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn encode_bool(value: bool) -> Vec<u8> {
    encode_uint(u64::from(value))
}

fn read_uint<S: Store + ?Sized>(state: &S, path: &Path) -> Result<Option<u64>, Error> {
    let Some(bytes) = state.get_path(path) else {
        return Ok(None);
    };
    let raw: [u8; 8] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::Corrupted(format!("/{} is not a uint", path.join("/"))))?;
    Ok(Some(u64::from_be_bytes(raw)))
}

fn require_uint<S: Store + ?Sized>(state: &S, path: &Path) -> Result<u64, Error> {
    read_uint(state, path)?
        .ok_or_else(|| Error::Corrupted(format!("/{} is missing", path.join("/"))))
}

fn read_bool<S: Store + ?Sized>(state: &S, path: &Path) -> Result<bool, Error> {
    match require_uint(state, path)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::Corrupted(format!(
            "/{} holds {other}, expected 0 or 1",
            path.join("/")
        ))),
    }
}

/// Decode a ballot option argument: 1 to 8 big-endian bytes naming an
/// index below [`OPTION_COUNT`].
pub fn decode_option(arg: &[u8]) -> Result<u64, Error> {
    if arg.is_empty() || arg.len() > 8 {
        return Err(Error::MalformedInput(format!(
            "option must be 1 to 8 bytes, got {}",
            arg.len()
        )));
    }
    let value = arg.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    if value >= OPTION_COUNT as u64 {
        return Err(Error::MalformedInput(format!(
            "option {value} out of range 0..{OPTION_COUNT}"
        )));
    }
    Ok(value)
}

/// Read-only view of the global election record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Election {
    pub creator: Address,
    pub is_open: bool,
    pub tally: [u64; OPTION_COUNT],
    pub created_at: u64,
    pub deadline: Option<u64>,
}

impl Election {
    /// Whether an election record has been created.
    pub fn exists<S: Store + ?Sized>(state: &S) -> bool {
        state.get_path(&global_path(KEY_CREATOR)).is_some()
    }

    pub fn load<S: Store + ?Sized>(state: &S) -> Result<Self, Error> {
        let creator_bytes = state
            .get_path(&global_path(KEY_CREATOR))
            .ok_or_else(|| Error::NotFound("election has not been created".into()))?;
        let creator = <[u8; 32]>::try_from(creator_bytes.as_slice())
            .map(Address)
            .map_err(|_| Error::Corrupted("/global/creator is not an address".into()))?;

        let mut tally = [0u64; OPTION_COUNT];
        for (option, count) in (0u64..).zip(tally.iter_mut()) {
            *count = require_uint(state, &tally_path(option))?;
        }

        Ok(Self {
            creator,
            is_open: read_bool(state, &global_path(KEY_OPEN))?,
            tally,
            created_at: require_uint(state, &global_path(KEY_CREATED_AT))?,
            deadline: read_uint(state, &global_path(KEY_DEADLINE))?,
        })
    }

    pub fn total_votes(&self) -> u64 {
        self.tally.iter().sum()
    }

    /// True once ledger time has moved past the deadline. Always false
    /// without a deadline.
    pub fn deadline_passed(&self, now: u64) -> bool {
        self.deadline.is_some_and(|end| now > end)
    }
}

/// Read-only view of one participant's local state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub has_voted: bool,
    /// Present exactly when `has_voted` is true.
    pub choice: Option<u64>,
}

impl Participant {
    pub fn is_registered<S: Store + ?Sized>(state: &S, account: &Address) -> bool {
        state.get_path(&local_path(account, KEY_VOTED)).is_some()
    }

    pub fn load<S: Store + ?Sized>(state: &S, account: &Address) -> Result<Self, Error> {
        if !Self::is_registered(state, account) {
            return Err(Error::NotFound(format!("account {account} is not registered")));
        }

        let has_voted = read_bool(state, &local_path(account, KEY_VOTED))?;
        let choice = read_uint(state, &local_path(account, KEY_CHOICE))?;

        match (has_voted, choice) {
            (true, Some(c)) if c < OPTION_COUNT as u64 => {}
            (false, None) => {}
            _ => {
                return Err(Error::Corrupted(format!(
                    "account {account}: voted={has_voted} with choice {choice:?}"
                )));
            }
        }

        Ok(Self { has_voted, choice })
    }

    /// All registered accounts, in address order.
    pub fn accounts(state: &State) -> Result<Vec<Address>, Error> {
        state
            .children(&[LOCAL])
            .into_iter()
            .map(|hex| {
                Address::from_hex(hex)
                    .ok_or_else(|| Error::Corrupted(format!("/local/{hex} is not an address")))
            })
            .collect()
    }
}

/// What a commit did to the election.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Created,
    Closed,
    Updated,
}

/// Check the writes of one commit against the state they will be applied to.
///
/// Only the election record and the accounts the writes touch are read, so
/// the cost does not grow with the number of participants. Given a state that
/// satisfies [`audit`], the state after the writes satisfies it too:
/// - nothing is written before the election exists;
/// - creator, creation time and deadline never change, and a closed election
///   stays closed;
/// - a recorded choice never changes;
/// - each tally grows by exactly the ballots this commit records for it.
pub fn check_transition<S: Store + ?Sized>(
    before: &S,
    mutations: &[Mutation],
) -> Result<Transition, Error> {
    let after = Overlay::new(before, mutations.iter().map(|m| (&m.path, &m.value)));

    if !Election::exists(&after) {
        if mutations.is_empty() {
            return Ok(Transition::Updated);
        }
        return Err(Error::Corrupted("state written before the election was created".into()));
    }

    let old = if Election::exists(before) {
        Some(Election::load(before)?)
    } else {
        None
    };
    let new = Election::load(&after)?;

    if let Some(old) = &old {
        let unchanged = (old.creator, old.created_at, old.deadline)
            == (new.creator, new.created_at, new.deadline);
        if !unchanged {
            return Err(Error::Corrupted("election record rewritten".into()));
        }
        if !old.is_open && new.is_open {
            return Err(Error::Corrupted("closed election reopened".into()));
        }
    }

    let mut added = [0u64; OPTION_COUNT];
    for account in touched_accounts(mutations)? {
        let was = if Participant::is_registered(before, &account) {
            Participant::load(before, &account)?.choice
        } else {
            None
        };
        let now = Participant::load(&after, &account)?.choice;

        match (was, now) {
            (None, Some(choice)) => added[choice as usize] += 1,
            (was, now) if was == now => {}
            _ => {
                return Err(Error::Corrupted(format!(
                    "account {account}: ballot changed from {was:?} to {now:?}"
                )));
            }
        }
    }

    let old_tally = old.as_ref().map_or([0; OPTION_COUNT], |e| e.tally);
    for option in 0..OPTION_COUNT {
        if old_tally[option].checked_add(added[option]) != Some(new.tally[option]) {
            return Err(Error::Corrupted(format!(
                "tally for option {option} went from {} to {} with {} new ballots",
                old_tally[option], new.tally[option], added[option]
            )));
        }
    }

    Ok(match old {
        None => Transition::Created,
        Some(old) if old.is_open && !new.is_open => Transition::Closed,
        Some(_) => Transition::Updated,
    })
}

/// Accounts whose local record a write set touches. Every local write must
/// address `local/<address>/<key>`.
fn touched_accounts(mutations: &[Mutation]) -> Result<BTreeSet<Address>, Error> {
    let mut accounts = BTreeSet::new();
    for mutation in mutations {
        match mutation.path.as_slice() {
            [root, ..] if root != LOCAL => {}
            [_, account, _key] => {
                let address = Address::from_hex(account).ok_or_else(|| {
                    Error::Corrupted(format!("/local/{account} is not an address"))
                })?;
                accounts.insert(address);
            }
            _ => {
                return Err(Error::Corrupted(format!(
                    "malformed local path /{}",
                    mutation.path.join("/")
                )));
            }
        }
    }
    Ok(accounts)
}

/// Check the ledger-wide invariants over the whole state:
/// - no local records exist before the election does;
/// - every local record decodes and `choice` is present exactly when voted;
/// - each `tally[option]` equals the number of participants who chose it,
///   so `sum(tally)` equals the number of participants who voted.
///
/// This walks every account. Commits use [`check_transition`] instead.
pub fn audit(state: &State) -> Result<(), Error> {
    let accounts = Participant::accounts(state)?;

    if !Election::exists(state) {
        if !state.is_empty() {
            return Err(Error::Corrupted("state written before the election was created".into()));
        }
        return Ok(());
    }

    let election = Election::load(state)?;

    let mut counted = [0u64; OPTION_COUNT];
    for account in &accounts {
        let participant = Participant::load(state, account)?;
        if let Some(choice) = participant.choice {
            // load() guarantees choice < OPTION_COUNT
            counted[choice as usize] += 1;
        }
    }

    if counted != election.tally {
        return Err(Error::Corrupted(format!(
            "tally {:?} does not match recorded ballots {:?}",
            election.tally, counted
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use std::cell::Cell;

    fn addr(byte: u8) -> Address {
        Address([byte; 32])
    }

    fn put(state: &mut State, path: Path, value: Vec<u8>) {
        state.set_path(&path, value);
    }

    fn created(creator: Address) -> State {
        let mut state = State::new();
        put(&mut state, global_path(KEY_CREATOR), creator.0.to_vec());
        put(&mut state, global_path(KEY_OPEN), encode_bool(true));
        put(&mut state, tally_path(0), encode_uint(0));
        put(&mut state, tally_path(1), encode_uint(0));
        put(&mut state, global_path(KEY_CREATED_AT), encode_uint(100));
        state
    }

    #[test]
    fn decode_option_accepts_short_and_canonical_forms() {
        assert_eq!(decode_option(&[0]).unwrap(), 0);
        assert_eq!(decode_option(&[1]).unwrap(), 1);
        assert_eq!(decode_option(&encode_uint(1)).unwrap(), 1);
        assert_eq!(decode_option(&[0, 0, 1]).unwrap(), 1);
    }

    #[test]
    fn decode_option_rejects_bad_encodings() {
        assert!(matches!(decode_option(&[]), Err(Error::MalformedInput(_))));
        assert!(matches!(decode_option(&[0; 9]), Err(Error::MalformedInput(_))));
        assert!(matches!(decode_option(&encode_uint(2)), Err(Error::MalformedInput(_))));
        assert!(matches!(decode_option(&[0xff; 8]), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn election_missing_is_not_found() {
        let state = State::new();
        assert!(!Election::exists(&state));
        assert!(matches!(Election::load(&state), Err(Error::NotFound(_))));
    }

    #[test]
    fn election_loads() {
        let state = created(addr(1));
        let election = Election::load(&state).unwrap();

        assert_eq!(election.creator, addr(1));
        assert!(election.is_open);
        assert_eq!(election.tally, [0, 0]);
        assert_eq!(election.created_at, 100);
        assert_eq!(election.deadline, None);
        assert!(!election.deadline_passed(u64::MAX));
    }

    #[test]
    fn deadline_is_inclusive() {
        let mut state = created(addr(1));
        put(&mut state, global_path(KEY_DEADLINE), encode_uint(500));
        let election = Election::load(&state).unwrap();

        assert!(!election.deadline_passed(500));
        assert!(election.deadline_passed(501));
    }

    #[test]
    fn malformed_global_is_corrupted() {
        let mut state = created(addr(1));
        put(&mut state, global_path(KEY_OPEN), encode_uint(7));
        assert!(matches!(Election::load(&state), Err(Error::Corrupted(_))));

        let mut state = created(addr(1));
        put(&mut state, tally_path(1), vec![1, 2, 3]);
        assert!(matches!(Election::load(&state), Err(Error::Corrupted(_))));
    }

    #[test]
    fn participant_views() {
        let mut state = created(addr(1));
        let bob = addr(2);
        assert!(matches!(Participant::load(&state, &bob), Err(Error::NotFound(_))));

        put(&mut state, local_path(&bob, KEY_VOTED), encode_bool(false));
        assert_eq!(
            Participant::load(&state, &bob).unwrap(),
            Participant { has_voted: false, choice: None }
        );

        put(&mut state, local_path(&bob, KEY_VOTED), encode_bool(true));
        assert!(matches!(Participant::load(&state, &bob), Err(Error::Corrupted(_))));

        put(&mut state, local_path(&bob, KEY_CHOICE), encode_uint(1));
        assert_eq!(
            Participant::load(&state, &bob).unwrap(),
            Participant { has_voted: true, choice: Some(1) }
        );
        assert_eq!(Participant::accounts(&state).unwrap(), vec![bob]);
    }

    #[test]
    fn audit_accepts_consistent_state() {
        let mut state = created(addr(1));
        let bob = addr(2);
        let carol = addr(3);
        put(&mut state, local_path(&bob, KEY_VOTED), encode_bool(true));
        put(&mut state, local_path(&bob, KEY_CHOICE), encode_uint(1));
        put(&mut state, local_path(&carol, KEY_VOTED), encode_bool(false));
        put(&mut state, tally_path(1), encode_uint(1));

        assert!(audit(&state).is_ok());
        assert!(audit(&State::new()).is_ok());
    }

    #[test]
    fn audit_catches_tally_drift() {
        let mut state = created(addr(1));
        put(&mut state, tally_path(0), encode_uint(1));
        assert!(matches!(audit(&state), Err(Error::Corrupted(_))));
    }

    #[test]
    fn audit_catches_ballot_on_wrong_option() {
        let mut state = created(addr(1));
        let bob = addr(2);
        put(&mut state, local_path(&bob, KEY_VOTED), encode_bool(true));
        put(&mut state, local_path(&bob, KEY_CHOICE), encode_uint(0));
        put(&mut state, tally_path(1), encode_uint(1));
        assert!(matches!(audit(&state), Err(Error::Corrupted(_))));
    }

    #[test]
    fn audit_catches_local_state_before_creation() {
        let mut state = State::new();
        put(&mut state, local_path(&addr(2), KEY_VOTED), encode_bool(false));
        assert!(matches!(audit(&state), Err(Error::Corrupted(_))));
    }

    fn write(path: Path, value: Vec<u8>) -> Mutation {
        Mutation { path, value }
    }

    fn ballot(account: &Address, option: u64, tally: u64) -> Vec<Mutation> {
        vec![
            write(tally_path(option), encode_uint(tally)),
            write(local_path(account, KEY_VOTED), encode_bool(true)),
            write(local_path(account, KEY_CHOICE), encode_uint(option)),
        ]
    }

    fn registered(voters: u8) -> State {
        let mut state = created(addr(1));
        for byte in 0..voters {
            put(&mut state, local_path(&addr(byte), KEY_VOTED), encode_bool(false));
        }
        state
    }

    /// Counts reads so tests can see how much state a check looks at.
    struct CountingStore<'a> {
        inner: &'a State,
        reads: Cell<usize>,
    }

    impl Store for CountingStore<'_> {
        fn get_path(&self, path: &Path) -> Option<&Value> {
            self.reads.set(self.reads.get() + 1);
            self.inner.get_path(path)
        }
    }

    #[test]
    fn transition_reports_create_and_close() {
        let creation = vec![
            write(global_path(KEY_CREATOR), addr(1).0.to_vec()),
            write(global_path(KEY_OPEN), encode_bool(true)),
            write(tally_path(0), encode_uint(0)),
            write(tally_path(1), encode_uint(0)),
            write(global_path(KEY_CREATED_AT), encode_uint(0)),
        ];
        assert_eq!(check_transition(&State::new(), &creation).unwrap(), Transition::Created);

        let state = created(addr(1));
        let close = vec![write(global_path(KEY_OPEN), encode_bool(false))];
        assert_eq!(check_transition(&state, &close).unwrap(), Transition::Closed);
    }

    #[test]
    fn transition_accepts_ballot() {
        let state = registered(3);
        let writes = ballot(&addr(2), 1, 1);
        assert_eq!(check_transition(&state, &writes).unwrap(), Transition::Updated);
    }

    #[test]
    fn transition_rejects_tally_without_ballot() {
        let state = registered(3);
        let writes = vec![write(tally_path(0), encode_uint(5))];
        assert!(matches!(check_transition(&state, &writes), Err(Error::Corrupted(_))));
    }

    #[test]
    fn transition_rejects_ballot_without_tally() {
        let state = registered(3);
        let mut writes = ballot(&addr(2), 0, 1);
        writes.remove(0);
        assert!(matches!(check_transition(&state, &writes), Err(Error::Corrupted(_))));
    }

    #[test]
    fn transition_rejects_changed_ballot() {
        let mut state = registered(3);
        for m in ballot(&addr(2), 0, 1) {
            state.set_path(&m.path, m.value);
        }
        let writes = vec![
            write(tally_path(0), encode_uint(0)),
            write(tally_path(1), encode_uint(1)),
            write(local_path(&addr(2), KEY_CHOICE), encode_uint(1)),
        ];
        assert!(matches!(check_transition(&state, &writes), Err(Error::Corrupted(_))));
    }

    #[test]
    fn transition_rejects_rewrites_and_reopening() {
        let state = created(addr(1));
        let takeover = vec![write(global_path(KEY_CREATOR), addr(9).0.to_vec())];
        assert!(matches!(check_transition(&state, &takeover), Err(Error::Corrupted(_))));

        let mut closed = created(addr(1));
        put(&mut closed, global_path(KEY_OPEN), encode_bool(false));
        let reopen = vec![write(global_path(KEY_OPEN), encode_bool(true))];
        assert!(matches!(check_transition(&closed, &reopen), Err(Error::Corrupted(_))));
    }

    #[test]
    fn transition_rejects_writes_before_creation() {
        let writes = vec![write(local_path(&addr(2), KEY_VOTED), encode_bool(false))];
        assert!(matches!(check_transition(&State::new(), &writes), Err(Error::Corrupted(_))));
        assert_eq!(check_transition(&State::new(), &[]).unwrap(), Transition::Updated);
    }

    #[test]
    fn transition_rejects_malformed_local_path() {
        let state = created(addr(1));
        let path = vec![LOCAL.into(), "not-an-address".into(), KEY_VOTED.into()];
        let writes = vec![write(path, vec![0])];
        assert!(matches!(check_transition(&state, &writes), Err(Error::Corrupted(_))));

        let writes = vec![write(vec![LOCAL.into()], vec![0])];
        assert!(matches!(check_transition(&state, &writes), Err(Error::Corrupted(_))));
    }

    #[test]
    fn transition_cost_does_not_grow_with_electorate() {
        let reads_for = |voters: u8| {
            let state = registered(voters);
            let store = CountingStore {
                inner: &state,
                reads: Cell::new(0),
            };
            check_transition(&store, &ballot(&addr(0), 0, 1)).unwrap();
            store.reads.get()
        };

        assert_eq!(reads_for(2), reads_for(200));
    }
}
