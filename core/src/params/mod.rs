//! Parameter Builder
//!
//! Assembles a spend in four checked steps. Each step consumes the builder
//! and returns it in the next state, so a step can neither be skipped nor
//! repeated.
//!
//! ```text
//! Unconfigured ──select_inputs──► InputsSelected ──compute_amounts──► AmountsComputed
//!                                                                          │
//!        TransactionParameters ◄──finalize── OutputsPacked ◄──pack_outputs─┘
//! ```

mod integrity;
mod selection;
mod verifier;
mod witness;

use rand::seq::SliceRandom;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tessera_config::{RelayerRuntime, RpcRuntime};
use tessera_privacy::field::{self, Fr};
use tessera_privacy::{
    Account, Address, AssetSlot, AssetTriple, Commitment, EncryptionMode, LookupTables,
    MerklePath, MerkleTree, Note, NoteError, Nullifier, Recipient, encrypt_note, external_amount,
    pack_slots,
};

use crate::error::ParameterError;
use crate::prover::ProofOutput;
use crate::rpc::{EnvelopeAccounts, TransactionEnvelope};

pub use integrity::{IntegrityInputs, integrity_hash};
pub use selection::{MERGE_CAP, merge_all, merge_commitments, select_spend};
pub use verifier::VerifierConfig;
pub use witness::{InputWitness, NoteWitness, ProverWitness, PublicInputs};

type Result<T> = std::result::Result<T, ParameterError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Public funds enter the pool
    Shield,
    /// Shielded funds leave the pool
    Unshield,
    /// Value stays shielded; only the relayer fee leaves
    Transfer,
}

/// Relayer that pays for and lands spends in exchange for a fee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Relayer {
    pub address: Address,
    pub fee_recipient: Address,
    pub fee: u64,
    /// Charged when an unshield has to create the token recipient account
    pub high_fee: u64,
}

impl Relayer {
    pub fn from_config(cfg: &RelayerRuntime) -> Self {
        Self {
            address: cfg.recipient,
            fee_recipient: cfg.fee_recipient,
            fee: cfg.fee,
            high_fee: cfg.high_fee,
        }
    }
}

/// Ledger accounts every spend touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolAccounts {
    pub merkle_tree: Address,
    pub native_pool: Address,
    pub token_pool: Address,
}

impl PoolAccounts {
    pub fn from_config(cfg: &RpcRuntime) -> Self {
        Self {
            merkle_tree: cfg.merkle_tree,
            native_pool: cfg.native_pool,
            token_pool: cfg.token_pool,
        }
    }
}

/// Public accounts of a spend. Which ones must be set depends on the action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxAccounts {
    pub sender_native: Option<Address>,
    pub sender_token: Option<Address>,
    pub recipient_native: Option<Address>,
    pub recipient_token: Option<Address>,
    pub relayer: Option<Relayer>,
    pub recipient_token_exists: bool,
    pub pool: PoolAccounts,
}

impl TxAccounts {
    pub fn shield(sender_native: Address, sender_token: Option<Address>) -> Self {
        Self {
            sender_native: Some(sender_native),
            sender_token,
            ..Self::default()
        }
    }

    pub fn unshield(
        relayer: Relayer,
        recipient_native: Address,
        recipient_token: Option<Address>,
        recipient_token_exists: bool,
    ) -> Self {
        Self {
            recipient_native: Some(recipient_native),
            recipient_token,
            relayer: Some(relayer),
            recipient_token_exists,
            ..Self::default()
        }
    }

    pub fn transfer(relayer: Relayer) -> Self {
        Self {
            relayer: Some(relayer),
            ..Self::default()
        }
    }

    pub fn with_pool(mut self, pool: PoolAccounts) -> Self {
        self.pool = pool;
        self
    }

    /// Relayer fee for `action`; shields carry none.
    pub fn relayer_fee(&self, action: Action) -> u64 {
        let Some(relayer) = self.relayer else {
            return 0;
        };
        let creates_token_account =
            action == Action::Unshield && self.recipient_token.is_some() && !self.recipient_token_exists;
        if creates_token_account {
            relayer.high_fee
        } else {
            relayer.fee
        }
    }

    /// Account that signs and pays for the ledger transaction.
    fn payer(&self, action: Action) -> Address {
        match (action, self.relayer) {
            (Action::Shield, _) | (_, None) => self.sender_native.unwrap_or_default(),
            (_, Some(relayer)) => relayer.address,
        }
    }
}

/// An output note and how its ciphertext is addressed.
#[derive(Debug, Clone)]
pub struct Output {
    pub note: Note,
    pub encryption: EncryptionMode,
}

impl Output {
    pub fn to_self(note: Note) -> Self {
        Self {
            note,
            encryption: EncryptionMode::Symmetric,
        }
    }

    pub fn to_recipient(note: Note, recipient: &Recipient) -> Self {
        Self {
            note,
            encryption: EncryptionMode::Asymmetric {
                recipient: recipient.encryption_key,
            },
        }
    }
}

// ============================================================================
// Builder states
// ============================================================================

pub struct Unconfigured;

pub struct InputsSelected {
    inputs: Vec<Note>,
}

pub struct AmountsComputed {
    inputs: Vec<Note>,
    outputs: Vec<Output>,
    action: Action,
    accounts: TxAccounts,
    triple: AssetTriple,
    public_amount_native: Fr,
    public_amount_token: Fr,
    fee: u64,
}

pub struct OutputsPacked {
    amounts: AmountsComputed,
    encrypted_outputs: Vec<u8>,
    integrity_hash: Fr,
}

pub struct ParameterBuilder<'a, S> {
    account: &'a Account,
    tables: &'a LookupTables,
    verifier: VerifierConfig,
    shuffle: bool,
    message: Option<Vec<u8>>,
    state: S,
}

impl<'a, S> ParameterBuilder<'a, S> {
    fn advance<T>(self, state: T) -> ParameterBuilder<'a, T> {
        ParameterBuilder {
            account: self.account,
            tables: self.tables,
            verifier: self.verifier,
            shuffle: self.shuffle,
            message: self.message,
            state,
        }
    }

    fn zero_note<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Note {
        Note::zero(self.account.public_key(), rng).with_index(0)
    }
}

impl<'a> ParameterBuilder<'a, Unconfigured> {
    pub fn new(account: &'a Account, tables: &'a LookupTables, verifier: VerifierConfig) -> Self {
        Self {
            account,
            tables,
            verifier,
            shuffle: true,
            message: None,
            state: Unconfigured,
        }
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Message attached to storage transactions.
    pub fn message(mut self, message: Vec<u8>) -> Self {
        self.message = Some(message);
        self
    }

    /// Take the chosen notes and pad with zero notes up to the verifier's
    /// input arity.
    pub fn select_inputs<R: RngCore + CryptoRng>(
        self,
        mut inputs: Vec<Note>,
        rng: &mut R,
    ) -> Result<ParameterBuilder<'a, InputsSelected>> {
        let capacity = self.verifier.inputs();
        if inputs.len() > capacity {
            return Err(ParameterError::TooManyCommitments {
                count: inputs.len(),
                capacity,
            });
        }
        while inputs.len() < capacity {
            inputs.push(self.zero_note(rng));
        }
        Ok(self.advance(InputsSelected { inputs }))
    }
}

impl<'a> ParameterBuilder<'a, InputsSelected> {
    pub fn inputs(&self) -> &[Note] {
        &self.state.inputs
    }

    /// Pad outputs, derive the asset triple and public amounts, and validate
    /// the accounts for `action`.
    pub fn compute_amounts<R: RngCore + CryptoRng>(
        mut self,
        mut outputs: Vec<Output>,
        action: Action,
        accounts: TxAccounts,
        rng: &mut R,
    ) -> Result<ParameterBuilder<'a, AmountsComputed>> {
        let capacity = self.verifier.outputs();
        if outputs.len() > capacity {
            return Err(ParameterError::TooManyOutputs {
                count: outputs.len(),
                capacity,
            });
        }
        let has_recipient = outputs.iter().any(|o| !o.note.is_zero());
        while outputs.len() < capacity {
            outputs.push(Output::to_self(self.zero_note(rng)));
        }

        self.check_verifier_fields(&outputs)?;

        let inputs = std::mem::take(&mut self.state.inputs);
        let output_notes: Vec<Note> = outputs.iter().map(|o| o.note.clone()).collect();
        let triple = AssetTriple::from_notes(inputs.iter().chain(&output_notes))?;
        let public_amount_native = external_amount(AssetSlot::Native, &triple, &inputs, &output_notes);
        let public_amount_token = external_amount(AssetSlot::Token, &triple, &inputs, &output_notes);
        let fee = accounts.relayer_fee(action);

        validate(
            action,
            &accounts,
            &public_amount_native,
            &public_amount_token,
            fee,
            has_recipient,
        )?;

        debug!(?action, fee, token = ?triple.token(), "public amounts computed");
        let state = AmountsComputed {
            inputs,
            outputs,
            action,
            accounts,
            triple,
            public_amount_native,
            public_amount_token,
            fee,
        };
        Ok(self.advance(state))
    }

    fn check_verifier_fields(&self, outputs: &[Output]) -> Result<()> {
        let carries_app_data = self
            .state
            .inputs
            .iter()
            .chain(outputs.iter().map(|o| &o.note))
            .any(Note::is_app_note);
        if carries_app_data && !self.verifier.supports_app_data() {
            return Err(ParameterError::UnexpectedField { field: "app_data" });
        }
        match (self.verifier.requires_message(), self.message.is_some()) {
            (true, false) => Err(ParameterError::Undefined { field: "message" }),
            (false, true) => Err(ParameterError::UnexpectedField { field: "message" }),
            _ => Ok(()),
        }
    }
}

impl<'a> ParameterBuilder<'a, AmountsComputed> {
    pub fn public_amount_native(&self) -> Fr {
        self.state.public_amount_native
    }

    pub fn public_amount_token(&self) -> Fr {
        self.state.public_amount_token
    }

    /// Shuffle (when enabled), encrypt and pack outputs, then bind them with
    /// the integrity hash.
    pub fn pack_outputs<R: RngCore + CryptoRng>(
        mut self,
        rng: &mut R,
    ) -> Result<ParameterBuilder<'a, OutputsPacked>> {
        if self.shuffle {
            self.state.inputs.shuffle(rng);
            self.state.outputs.shuffle(rng);
        }

        let encrypted = self
            .state
            .outputs
            .iter()
            .map(|o| encrypt_note(&o.note, o.encryption, self.account, self.tables, rng))
            .collect::<std::result::Result<Vec<_>, NoteError>>()?;
        let encrypted_outputs = pack_slots(&encrypted)?;

        let accounts = &self.state.accounts;
        let action = self.state.action;
        let integrity_hash = integrity_hash(&IntegrityInputs {
            recipient_token: accounts.recipient_token.unwrap_or_default(),
            fee_recipient: accounts
                .relayer
                .map(|r| r.fee_recipient)
                .unwrap_or_default(),
            payer: accounts.payer(action),
            fee: self.state.fee,
            encrypted_outputs: &encrypted_outputs,
            message: self.message.as_deref(),
        });

        Ok(ParameterBuilder {
            account: self.account,
            tables: self.tables,
            verifier: self.verifier,
            shuffle: self.shuffle,
            message: self.message,
            state: OutputsPacked {
                amounts: self.state,
                encrypted_outputs,
                integrity_hash,
            },
        })
    }
}

impl<'a> ParameterBuilder<'a, OutputsPacked> {
    /// Derive nullifiers and merkle paths against `tree` and freeze the result.
    pub fn finalize(self, tree: &MerkleTree) -> Result<TransactionParameters> {
        let OutputsPacked {
            amounts,
            encrypted_outputs,
            integrity_hash,
        } = self.state;

        let mut nullifiers = Vec::with_capacity(amounts.inputs.len());
        let mut paths = Vec::with_capacity(amounts.inputs.len());
        for note in &amounts.inputs {
            nullifiers.push(note.nullifier(self.account)?);
            paths.push(merkle_path(note, tree)?);
        }
        let leaves: Vec<Commitment> = amounts.outputs.iter().map(|o| o.note.commitment()).collect();

        let root = tree.root();
        let public = PublicInputs {
            root: field::from_le_bytes(&root),
            public_amount_token: amounts.public_amount_token,
            integrity_hash,
            public_amount_fee: amounts.public_amount_native,
            mint_circuit: amounts.triple.circuit()[AssetSlot::Token.index()],
            nullifiers: nullifiers.iter().map(Nullifier::to_field).collect(),
            leaves: leaves.iter().map(Commitment::to_field).collect(),
        };

        Ok(TransactionParameters {
            action: amounts.action,
            verifier: self.verifier,
            inputs: amounts.inputs,
            outputs: amounts.outputs.into_iter().map(|o| o.note).collect(),
            triple: amounts.triple,
            accounts: amounts.accounts,
            fee: amounts.fee,
            root,
            nullifiers,
            leaves,
            merkle_paths: paths,
            encrypted_outputs,
            message: self.message,
            public,
            private_key: self.account.spending_key()?.as_field(),
        })
    }
}

fn merkle_path(note: &Note, tree: &MerkleTree) -> Result<MerklePath> {
    if note.is_zero() {
        return Ok(MerklePath::empty());
    }
    let commitment = note.commitment();
    let index = note.index().ok_or(NoteError::IndexNotProvided)?;
    if tree.get(index) != Some(commitment) {
        return Err(ParameterError::MissingMerklePath(commitment));
    }
    tree.path(index)
        .ok_or(ParameterError::MissingMerklePath(commitment))
}

fn require(value: Option<impl Sized>, field: &'static str) -> Result<()> {
    match value {
        Some(_) => Ok(()),
        None => Err(ParameterError::Undefined { field }),
    }
}

fn forbid(value: Option<impl Sized>, field: &'static str) -> Result<()> {
    match value {
        Some(_) => Err(ParameterError::UnexpectedField { field }),
        None => Ok(()),
    }
}

/// Magnitude of a non-positive public amount.
fn outflow(amount: &Fr, field: &'static str) -> Result<u64> {
    match field::to_signed(amount) {
        Some(v) if v <= 0 => u64::try_from(-v).map_err(|_| ParameterError::PublicAmountNotU64 { field }),
        _ => Err(ParameterError::PublicAmountNotU64 { field }),
    }
}

fn validate(
    action: Action,
    accounts: &TxAccounts,
    native: &Fr,
    token: &Fr,
    fee: u64,
    has_recipient: bool,
) -> Result<()> {
    let token_moves = *token != Fr::from(0u64);
    match action {
        Action::Shield => {
            require(accounts.sender_native, "sender_native")?;
            if token_moves {
                require(accounts.sender_token, "sender_token")?;
            }
            forbid(accounts.relayer, "relayer")?;
            forbid(accounts.recipient_native, "recipient_native")?;
            forbid(accounts.recipient_token, "recipient_token")?;
            if !field::fits_u64(native) {
                return Err(ParameterError::PublicAmountNotU64 { field: "native" });
            }
            if !field::fits_u64(token) {
                return Err(ParameterError::PublicAmountNotU64 { field: "token" });
            }
        }
        Action::Unshield => {
            require(accounts.relayer, "relayer")?;
            require(accounts.recipient_native, "recipient_native")?;
            if token_moves {
                require(accounts.recipient_token, "recipient_token")?;
            }
            forbid(accounts.sender_native, "sender_native")?;
            forbid(accounts.sender_token, "sender_token")?;
            if outflow(native, "native")? < fee {
                return Err(ParameterError::FeeMismatch { field: "native" });
            }
            outflow(token, "token")?;
        }
        Action::Transfer => {
            require(accounts.relayer, "relayer")?;
            if !has_recipient {
                return Err(ParameterError::Undefined { field: "recipient" });
            }
            forbid(accounts.sender_native, "sender_native")?;
            forbid(accounts.sender_token, "sender_token")?;
            forbid(accounts.recipient_native, "recipient_native")?;
            forbid(accounts.recipient_token, "recipient_token")?;
            if token_moves {
                return Err(ParameterError::PublicAmountNotZero { field: "token" });
            }
            if *native != -Fr::from(fee) {
                return Err(ParameterError::FeeMismatch { field: "native" });
            }
        }
    }
    Ok(())
}

// ============================================================================
// Finalized parameters
// ============================================================================

/// A fully assembled spend. Read-only; consumed once by the prover and the
/// submission that follows.
#[derive(Clone)]
pub struct TransactionParameters {
    action: Action,
    verifier: VerifierConfig,
    inputs: Vec<Note>,
    outputs: Vec<Note>,
    triple: AssetTriple,
    accounts: TxAccounts,
    fee: u64,
    root: [u8; 32],
    nullifiers: Vec<Nullifier>,
    leaves: Vec<Commitment>,
    merkle_paths: Vec<MerklePath>,
    encrypted_outputs: Vec<u8>,
    message: Option<Vec<u8>>,
    public: PublicInputs,
    private_key: Fr,
}

impl TransactionParameters {
    pub fn action(&self) -> Action {
        self.action
    }

    pub fn verifier(&self) -> VerifierConfig {
        self.verifier
    }

    pub fn inputs(&self) -> &[Note] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Note] {
        &self.outputs
    }

    pub fn triple(&self) -> &AssetTriple {
        &self.triple
    }

    pub fn accounts(&self) -> &TxAccounts {
        &self.accounts
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn root(&self) -> &[u8; 32] {
        &self.root
    }

    pub fn nullifiers(&self) -> &[Nullifier] {
        &self.nullifiers
    }

    pub fn leaves(&self) -> &[Commitment] {
        &self.leaves
    }

    pub fn merkle_paths(&self) -> &[MerklePath] {
        &self.merkle_paths
    }

    pub fn encrypted_outputs(&self) -> &[u8] {
        &self.encrypted_outputs
    }

    pub fn public_inputs(&self) -> &PublicInputs {
        &self.public
    }

    pub fn witness(&self) -> ProverWitness {
        ProverWitness {
            verifier: self.verifier,
            public: self.public.clone(),
            private_key: self.private_key,
            asset_keys: *self.triple.circuit(),
            inputs: self
                .inputs
                .iter()
                .zip(&self.merkle_paths)
                .map(|(note, path)| InputWitness {
                    note: NoteWitness::from(note),
                    leaf_index: path.position,
                    path_elements: path.to_field_elements(),
                })
                .collect(),
            outputs: self.outputs.iter().map(NoteWitness::from).collect(),
        }
    }

    /// Wire form handed to the relayer alongside a proof.
    pub fn envelope(&self, proof: &ProofOutput, recency_token: String) -> TransactionEnvelope {
        let relayer = self.accounts.relayer;
        TransactionEnvelope {
            verifier: self.verifier.program_id().0,
            action: self.action,
            proof: proof.proof_bytes.clone(),
            public_inputs: proof.public_signals.iter().map(hex::encode).collect(),
            nullifiers: self.nullifiers.clone(),
            leaves: self.leaves.clone(),
            encrypted_outputs: self.encrypted_outputs.clone(),
            relayer_fee: self.fee,
            accounts: EnvelopeAccounts {
                sender_native: self.accounts.sender_native,
                sender_token: self.accounts.sender_token,
                recipient_native: self.accounts.recipient_native,
                recipient_token: self.accounts.recipient_token,
                relayer: relayer.map(|r| r.address),
                relayer_fee_recipient: relayer.map(|r| r.fee_recipient),
                merkle_tree: self.accounts.pool.merkle_tree,
                native_pool: self.accounts.pool.native_pool,
                token_pool: self.accounts.pool.token_pool,
            },
            message: self.message.as_ref().map(hex::encode),
            recency_token,
        }
    }
}

impl std::fmt::Debug for TransactionParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionParameters")
            .field("action", &self.action)
            .field("verifier", &self.verifier)
            .field("fee", &self.fee)
            .field("nullifiers", &self.nullifiers)
            .field("leaves", &self.leaves)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use tessera_privacy::{AssetId, DecryptionMode, decrypt_note, pair_slots};

    fn relayer() -> Relayer {
        Relayer {
            address: Address([1u8; 32]),
            fee_recipient: Address([2u8; 32]),
            fee: 10,
            high_fee: 50,
        }
    }

    fn funded(account: &Account, amounts: &[u64]) -> (MerkleTree, Vec<Note>) {
        let mut tree = MerkleTree::new();
        let notes = amounts
            .iter()
            .map(|a| {
                let note = Note::builder(account.public_key())
                    .native(*a)
                    .build(&mut OsRng)
                    .unwrap();
                let index = tree.insert(&note.commitment()).unwrap();
                note.with_index(index)
            })
            .collect();
        (tree, notes)
    }

    fn change(account: &Account, amount: u64) -> Output {
        Output::to_self(
            Note::builder(account.public_key())
                .native(amount)
                .build(&mut OsRng)
                .unwrap(),
        )
    }

    #[test]
    fn test_shield_builds_and_pads() {
        let account = Account::random(&mut OsRng);
        let tables = LookupTables::default();
        let tree = MerkleTree::new();

        let params = ParameterBuilder::new(&account, &tables, VerifierConfig::TwoInTwoOut)
            .select_inputs(vec![], &mut OsRng)
            .unwrap()
            .compute_amounts(
                vec![change(&account, 100)],
                Action::Shield,
                TxAccounts::shield(Address([3u8; 32]), None),
                &mut OsRng,
            )
            .unwrap()
            .pack_outputs(&mut OsRng)
            .unwrap()
            .finalize(&tree)
            .unwrap();

        assert_eq!(params.inputs().len(), 2, "inputs padded to arity");
        assert_eq!(params.outputs().len(), 2, "outputs padded to arity");
        assert_eq!(params.public_inputs().public_amount_fee, Fr::from(100u64));
        assert_eq!(params.public_inputs().public_amount_token, Fr::from(0u64));
        assert_eq!(params.fee(), 0, "shields carry no relayer fee");
        assert_eq!(params.encrypted_outputs().len(), 2 * tessera_privacy::SLOT_SIZE);
    }

    #[test]
    fn test_public_input_order() {
        let account = Account::random(&mut OsRng);
        let tables = LookupTables::default();
        let (tree, notes) = funded(&account, &[60]);

        let params = ParameterBuilder::new(&account, &tables, VerifierConfig::TwoInTwoOut)
            .select_inputs(notes, &mut OsRng)
            .unwrap()
            .compute_amounts(
                vec![change(&account, 50)],
                Action::Transfer,
                TxAccounts::transfer(relayer()),
                &mut OsRng,
            )
            .unwrap()
            .pack_outputs(&mut OsRng)
            .unwrap()
            .finalize(&tree)
            .unwrap();

        let public = params.public_inputs();
        let ordered = public.ordered();
        assert_eq!(ordered.len(), 5 + 2 + 2);
        assert_eq!(ordered[0], field::from_le_bytes(&tree.root()), "root first");
        assert_eq!(ordered[3], -Fr::from(10u64), "fee slot carries the relayer fee");
        assert_eq!(ordered[5], params.nullifiers()[0].to_field());
        assert_eq!(ordered[7], params.leaves()[0].to_field());

        let be = public.to_be_bytes();
        let mut le = field::to_le_bytes(&ordered[2]);
        le.reverse();
        assert_eq!(be[2], le, "big-endian encoding is the reversed little-endian one");
    }

    #[test]
    fn test_packed_outputs_decrypt_in_leaf_order() {
        let account = Account::random(&mut OsRng);
        let tables = LookupTables::default();
        let (tree, notes) = funded(&account, &[60]);

        let params = ParameterBuilder::new(&account, &tables, VerifierConfig::TwoInTwoOut)
            .select_inputs(notes, &mut OsRng)
            .unwrap()
            .compute_amounts(
                vec![change(&account, 50)],
                Action::Transfer,
                TxAccounts::transfer(relayer()),
                &mut OsRng,
            )
            .unwrap()
            .pack_outputs(&mut OsRng)
            .unwrap()
            .finalize(&tree)
            .unwrap();

        let (left, right) = pair_slots(params.encrypted_outputs(), 0);
        for (slot, leaf) in [(left, params.leaves()[0]), (right, params.leaves()[1])] {
            let note = decrypt_note(
                slot.unwrap(),
                DecryptionMode::Symmetric,
                &account,
                &tables,
                &leaf,
                0,
            )
            .unwrap();
            assert!(note.is_some(), "own outputs decrypt under the viewing key");
        }
    }

    #[test]
    fn test_transfer_validation_names_field() {
        let account = Account::random(&mut OsRng);
        let tables = LookupTables::default();
        let (_, notes) = funded(&account, &[60]);

        let missing_relayer = ParameterBuilder::new(&account, &tables, VerifierConfig::TwoInTwoOut)
            .select_inputs(notes.clone(), &mut OsRng)
            .unwrap()
            .compute_amounts(vec![change(&account, 60)], Action::Transfer, TxAccounts::default(), &mut OsRng);
        assert_eq!(
            missing_relayer.err(),
            Some(ParameterError::Undefined { field: "relayer" })
        );

        let wrong_fee = ParameterBuilder::new(&account, &tables, VerifierConfig::TwoInTwoOut)
            .select_inputs(notes, &mut OsRng)
            .unwrap()
            .compute_amounts(
                vec![change(&account, 55)],
                Action::Transfer,
                TxAccounts::transfer(relayer()),
                &mut OsRng,
            );
        assert_eq!(
            wrong_fee.err(),
            Some(ParameterError::FeeMismatch { field: "native" })
        );
    }

    #[test]
    fn test_shield_validation() {
        let account = Account::random(&mut OsRng);
        let tables = LookupTables::default();

        let no_sender = ParameterBuilder::new(&account, &tables, VerifierConfig::TwoInTwoOut)
            .select_inputs(vec![], &mut OsRng)
            .unwrap()
            .compute_amounts(vec![change(&account, 5)], Action::Shield, TxAccounts::default(), &mut OsRng);
        assert_eq!(
            no_sender.err(),
            Some(ParameterError::Undefined { field: "sender_native" })
        );

        let mut accounts = TxAccounts::shield(Address([3u8; 32]), None);
        accounts.relayer = Some(relayer());
        let with_relayer = ParameterBuilder::new(&account, &tables, VerifierConfig::TwoInTwoOut)
            .select_inputs(vec![], &mut OsRng)
            .unwrap()
            .compute_amounts(vec![change(&account, 5)], Action::Shield, accounts, &mut OsRng);
        assert_eq!(
            with_relayer.err(),
            Some(ParameterError::UnexpectedField { field: "relayer" })
        );
    }

    #[test]
    fn test_unshield_fee_and_direction() {
        let account = Account::random(&mut OsRng);
        let tables = LookupTables::default();
        let (_, notes) = funded(&account, &[60]);
        let accounts = TxAccounts::unshield(relayer(), Address([4u8; 32]), None, true);

        let inflow = ParameterBuilder::new(&account, &tables, VerifierConfig::TwoInTwoOut)
            .select_inputs(vec![], &mut OsRng)
            .unwrap()
            .compute_amounts(vec![change(&account, 5)], Action::Unshield, accounts.clone(), &mut OsRng);
        assert_eq!(
            inflow.err(),
            Some(ParameterError::PublicAmountNotU64 { field: "native" }),
            "unshield cannot add value to the pool"
        );

        let below_fee = ParameterBuilder::new(&account, &tables, VerifierConfig::TwoInTwoOut)
            .select_inputs(notes, &mut OsRng)
            .unwrap()
            .compute_amounts(vec![change(&account, 55)], Action::Unshield, accounts, &mut OsRng);
        assert_eq!(
            below_fee.err(),
            Some(ParameterError::FeeMismatch { field: "native" })
        );
    }

    #[test]
    fn test_high_fee_when_token_account_missing() {
        let mint = Address([9u8; 32]);
        let accounts = TxAccounts::unshield(relayer(), Address([4u8; 32]), Some(mint), false);
        assert_eq!(accounts.relayer_fee(Action::Unshield), 50);
        let accounts = TxAccounts::unshield(relayer(), Address([4u8; 32]), Some(mint), true);
        assert_eq!(accounts.relayer_fee(Action::Unshield), 10);
        assert_eq!(TxAccounts::transfer(relayer()).relayer_fee(Action::Transfer), 10);
    }

    #[test]
    fn test_input_capacity() {
        let account = Account::random(&mut OsRng);
        let tables = LookupTables::default();
        let (_, notes) = funded(&account, &[1, 2, 3]);

        let result = ParameterBuilder::new(&account, &tables, VerifierConfig::TwoInTwoOut)
            .select_inputs(notes, &mut OsRng);
        assert_eq!(
            result.err(),
            Some(ParameterError::TooManyCommitments { count: 3, capacity: 2 })
        );
    }

    #[test]
    fn test_two_tokens_rejected() {
        let account = Account::random(&mut OsRng);
        let tables = LookupTables::default();
        let a = AssetId(Address([7u8; 32]));
        let b = AssetId(Address([8u8; 32]));
        let out = |asset| {
            Output::to_self(
                Note::builder(account.public_key())
                    .token(asset, 1)
                    .build(&mut OsRng)
                    .unwrap(),
            )
        };

        let result = ParameterBuilder::new(&account, &tables, VerifierConfig::TwoInTwoOut)
            .select_inputs(vec![], &mut OsRng)
            .unwrap()
            .compute_amounts(
                vec![out(a), out(b)],
                Action::Shield,
                TxAccounts::shield(Address([3u8; 32]), Some(Address([3u8; 32]))),
                &mut OsRng,
            );
        assert_eq!(result.err(), Some(ParameterError::TooManyAssets(a, b)));
    }

    #[test]
    fn test_storage_requires_message() {
        let account = Account::random(&mut OsRng);
        let tables = LookupTables::default();

        let result = ParameterBuilder::new(&account, &tables, VerifierConfig::Storage)
            .select_inputs(vec![], &mut OsRng)
            .unwrap()
            .compute_amounts(
                vec![change(&account, 5)],
                Action::Shield,
                TxAccounts::shield(Address([3u8; 32]), None),
                &mut OsRng,
            );
        assert_eq!(result.err(), Some(ParameterError::Undefined { field: "message" }));
    }

    #[test]
    fn test_finalize_requires_tree_membership() {
        let account = Account::random(&mut OsRng);
        let tables = LookupTables::default();
        let (_, notes) = funded(&account, &[60]);
        let unrelated = MerkleTree::new();

        let result = ParameterBuilder::new(&account, &tables, VerifierConfig::TwoInTwoOut)
            .select_inputs(notes.clone(), &mut OsRng)
            .unwrap()
            .compute_amounts(
                vec![change(&account, 50)],
                Action::Transfer,
                TxAccounts::transfer(relayer()),
                &mut OsRng,
            )
            .unwrap()
            .pack_outputs(&mut OsRng)
            .unwrap()
            .finalize(&unrelated);
        assert_eq!(
            result.err(),
            Some(ParameterError::MissingMerklePath(notes[0].commitment()))
        );
    }
}
