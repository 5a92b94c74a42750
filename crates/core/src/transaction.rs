//! Signed transactions submitted to the ledger.
//!
//! ```text
//! Transaction {
//!   id            : Hash          // BLAKE3 of the signable content
//!   sender        : Address       // Ed25519 public key of the caller
//!   on_completion : OnCompletion  // which application path is requested
//!   operation     : String        // "create" | "vote" | "close" for NoOp calls
//!   args          : List<Bytes>
//!   nonce         : u64           // distinguishes otherwise identical calls
//!   signature     : Signature
//! }
//! ```

use crate::{Error, Hash};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An account address: the raw 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).ok()
    }
}

impl From<&VerifyingKey> for Address {
    fn from(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl From<&SigningKey> for Address {
    fn from(key: &SigningKey) -> Self {
        Self::from(&key.verifying_key())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Which application path a transaction requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnCompletion {
    /// Plain call, dispatched on the operation name.
    NoOp,
    /// Register the sender as a participant.
    OptIn,
    /// Leave the application, wiping local state.
    CloseOut,
    /// Forcibly clear local state.
    ClearState,
    /// Replace the program definition.
    UpdateApplication,
    /// Delete the application.
    DeleteApplication,
}

/// A signed request against the voting program.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    /// Content hash (computed, not part of the signed content).
    #[serde(skip)]
    pub id: Hash,

    pub sender: Address,

    pub on_completion: OnCompletion,

    /// Operation name for `NoOp` calls; empty otherwise.
    pub operation: String,

    pub args: Vec<Vec<u8>>,

    pub nonce: u64,

    /// Ed25519 signature over the signable content.
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Build and sign a transaction.
    pub fn new(
        signing_key: &SigningKey,
        on_completion: OnCompletion,
        operation: impl Into<String>,
        args: Vec<Vec<u8>>,
        nonce: u64,
    ) -> Result<Self, Error> {
        let mut tx = Self {
            id: Hash::ZERO,
            sender: Address::from(signing_key),
            on_completion,
            operation: operation.into(),
            args,
            nonce,
            signature: Vec::new(),
        };

        let content = tx.signable_content()?;
        tx.signature = signing_key.sign(&content).to_bytes().to_vec();
        tx.id = Hash::of(&content);

        Ok(tx)
    }

    /// `NoOp` call with the given operation name.
    pub fn call(
        signing_key: &SigningKey,
        operation: &str,
        args: Vec<Vec<u8>>,
        nonce: u64,
    ) -> Result<Self, Error> {
        Self::new(signing_key, OnCompletion::NoOp, operation, args, nonce)
    }

    pub fn create(signing_key: &SigningKey, nonce: u64) -> Result<Self, Error> {
        Self::call(signing_key, "create", Vec::new(), nonce)
    }

    pub fn opt_in(signing_key: &SigningKey, nonce: u64) -> Result<Self, Error> {
        Self::new(signing_key, OnCompletion::OptIn, "", Vec::new(), nonce)
    }

    pub fn vote(signing_key: &SigningKey, option: u64, nonce: u64) -> Result<Self, Error> {
        Self::call(signing_key, "vote", vec![option_arg(option)], nonce)
    }

    pub fn close(signing_key: &SigningKey, nonce: u64) -> Result<Self, Error> {
        Self::call(signing_key, "close", Vec::new(), nonce)
    }

    /// Bytes covered by the signature and the id: everything except
    /// `id` and `signature`.
    fn signable_content(&self) -> Result<Vec<u8>, Error> {
        let signable = SignableTransaction {
            sender: &self.sender,
            on_completion: self.on_completion,
            operation: &self.operation,
            args: &self.args,
            nonce: self.nonce,
        };

        let mut buf = Vec::new();
        ciborium::into_writer(&signable, &mut buf)?;
        Ok(buf)
    }

    pub fn compute_id(&self) -> Result<Hash, Error> {
        Ok(Hash::of(&self.signable_content()?))
    }

    /// Recompute the id from content, ignoring whatever the submitter put there.
    pub fn refresh_id(&mut self) -> Result<(), Error> {
        self.id = self.compute_id()?;
        Ok(())
    }

    /// Verify the signature against the sender address.
    pub fn verify_signature(&self) -> Result<(), Error> {
        let invalid = || Error::InvalidSignature(self.sender.to_hex());

        let public_key = self.sender.verifying_key().ok_or_else(invalid)?;
        let sig_bytes: [u8; 64] = self.signature.as_slice().try_into().map_err(|_| invalid())?;
        let signature = Signature::from_bytes(&sig_bytes);

        // Strict verification refuses small-order keys, which anyone can sign for.
        let content = self.signable_content()?;
        public_key
            .verify_strict(&content, &signature)
            .map_err(|_| invalid())
    }
}

#[derive(Serialize)]
struct SignableTransaction<'a> {
    sender: &'a Address,
    on_completion: OnCompletion,
    operation: &'a str,
    args: &'a Vec<Vec<u8>>,
    nonce: u64,
}

/// Canonical uint argument encoding (8 bytes, big-endian).
pub fn option_arg(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}
