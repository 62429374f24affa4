//! Spend round-trip: select → build → prove → submit → resync.
//!
//! The client never mutates its balance speculatively. A spend changes local
//! state only through the resync that follows a landed submission.

use rand::{CryptoRng, RngCore};
use tracing::{info, warn};

use tessera_balance::{Balance, InboxBalance};
use tessera_config::TesseraConfig;
use tessera_privacy::{Account, Address, AssetId, AssetSlot, Commitment, LookupTables, Note, Recipient};

use crate::error::{ParameterError, RelayerError, Result, SpendError, SyncError};
use crate::params::{
    Action, Output, ParameterBuilder, PoolAccounts, Relayer, TransactionParameters, TxAccounts,
    VerifierConfig, merge_all, merge_commitments, select_spend,
};
use crate::prover::{Prover, check_proof};
use crate::rpc::{Indexer, LedgerRpc, RetryPolicy, Retrying};
use crate::sync::{SyncCursor, SyncReport, Synchronizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Circuit for shields, transfers and unshields. Merges always use
    /// [`VerifierConfig::TenInTwoOut`].
    pub verifier: VerifierConfig,
    pub shuffle: bool,
    pub submit_attempts: u32,
    pub retry: RetryPolicy,
    pub merge_cap: usize,
}

impl ClientOptions {
    pub fn from_config(cfg: &TesseraConfig) -> Self {
        Self {
            verifier: cfg.transaction.verifier.into(),
            shuffle: cfg.transaction.shuffle,
            submit_attempts: cfg.retry.submit_attempts,
            retry: RetryPolicy::from(&cfg.retry),
            merge_cap: cfg.transaction.merge_cap,
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&TesseraConfig::default())
    }
}

#[derive(Debug)]
pub struct SpendOutcome {
    /// `None` when the transaction was observed on the ledger after a lost
    /// response
    pub signature: Option<String>,
    pub attempts: u32,
    pub sync: SyncReport,
}

pub struct ShieldedClient<I, L, P> {
    indexer: Retrying<I>,
    ledger: Retrying<L>,
    prover: P,
    account: Account,
    tables: LookupTables,
    relayer: Relayer,
    pool: PoolAccounts,
    options: ClientOptions,
    balance: Balance,
    inbox: InboxBalance,
    balance_cursor: SyncCursor,
    inbox_cursor: SyncCursor,
    root_verified: bool,
}

impl<I: Indexer, L: LedgerRpc, P: Prover> ShieldedClient<I, L, P> {
    pub fn new(indexer: I, ledger: L, prover: P, account: Account, tables: LookupTables) -> Self {
        Self::with_options(indexer, ledger, prover, account, tables, ClientOptions::default())
    }

    /// Build a client from a loaded configuration. Malformed addresses or
    /// lookup entries are errors.
    pub fn from_config(
        indexer: I,
        ledger: L,
        prover: P,
        account: Account,
        cfg: &TesseraConfig,
    ) -> anyhow::Result<Self> {
        let relayer = cfg.relayer.runtime()?;
        let rpc = cfg.rpc.runtime()?;
        let tables = cfg.lookup.tables()?;
        Ok(Self::with_options(
            indexer,
            ledger,
            prover,
            account,
            tables,
            ClientOptions::from_config(cfg),
        )
        .relayer(Relayer::from_config(&relayer))
        .pool(PoolAccounts::from_config(&rpc)))
    }

    pub fn with_options(
        indexer: I,
        ledger: L,
        prover: P,
        account: Account,
        tables: LookupTables,
        options: ClientOptions,
    ) -> Self {
        Self {
            indexer: Retrying::new(indexer, options.retry),
            ledger: Retrying::new(ledger, options.retry),
            prover,
            account,
            tables,
            relayer: Relayer::default(),
            pool: PoolAccounts::default(),
            options,
            balance: Balance::new(),
            inbox: InboxBalance::new(),
            balance_cursor: SyncCursor::new(),
            inbox_cursor: SyncCursor::new(),
            root_verified: false,
        }
    }

    pub fn relayer(mut self, relayer: Relayer) -> Self {
        self.relayer = relayer;
        self
    }

    pub fn pool(mut self, pool: PoolAccounts) -> Self {
        self.pool = pool;
        self
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn balance(&self) -> &Balance {
        &self.balance
    }

    pub fn inbox(&self) -> &InboxBalance {
        &self.inbox
    }

    pub fn relayer_info(&self) -> &Relayer {
        &self.relayer
    }

    pub fn pool_accounts(&self) -> &PoolAccounts {
        &self.pool
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn prover(&self) -> &P {
        &self.prover
    }

    pub fn root_verified(&self) -> bool {
        self.root_verified
    }

    pub async fn sync_balance(&mut self) -> std::result::Result<SyncReport, SyncError> {
        let synchronizer = Synchronizer::new(&self.indexer, &self.ledger, &self.account, &self.tables);
        let report = synchronizer
            .sync_balance(&mut self.balance_cursor, &mut self.balance)
            .await?;
        self.root_verified = report.root_verified;
        Ok(report)
    }

    pub async fn sync_inbox(&mut self) -> std::result::Result<SyncReport, SyncError> {
        let synchronizer = Synchronizer::new(&self.indexer, &self.ledger, &self.account, &self.tables);
        synchronizer
            .sync_inbox(&mut self.inbox_cursor, &mut self.inbox)
            .await
    }

    /// Move public funds of `asset` into a note owned by this account.
    pub async fn shield<R: RngCore + CryptoRng>(
        &mut self,
        sender_native: Address,
        sender_token: Option<Address>,
        asset: AssetId,
        native_amount: u64,
        token_amount: u64,
        rng: &mut R,
    ) -> Result<SpendOutcome> {
        let note = self.note_to(self.account.public_key(), asset, native_amount.into(), token_amount.into(), rng)?;
        let accounts = TxAccounts::shield(sender_native, sender_token).with_pool(self.pool);
        let params = self.build(
            self.options.verifier,
            Vec::new(),
            vec![Output::to_self(note)],
            Action::Shield,
            accounts,
            rng,
        )?;
        self.prove_and_submit(&params).await
    }

    /// Send value to `recipient`, paying the relayer fee in native.
    pub async fn transfer<R: RngCore + CryptoRng>(
        &mut self,
        recipient: &Recipient,
        asset: AssetId,
        native_amount: u64,
        token_amount: u64,
        rng: &mut R,
    ) -> Result<SpendOutcome> {
        reject_native_token_amount(asset, token_amount.into())?;
        let accounts = TxAccounts::transfer(self.relayer).with_pool(self.pool);
        let fee = accounts.relayer_fee(Action::Transfer);
        let inputs = select_spend(
            &self.balance,
            asset,
            token_amount,
            native_amount.saturating_add(fee),
            self.options.verifier.inputs(),
        )?;

        let sent = self.note_to(recipient.public_key, asset, native_amount.into(), token_amount.into(), rng)?;
        let mut outputs = vec![Output::to_recipient(sent, recipient)];
        outputs.extend(self.change(&inputs, asset, native_amount, token_amount, fee, rng)?);

        let params = self.build(self.options.verifier, inputs, outputs, Action::Transfer, accounts, rng)?;
        self.prove_and_submit(&params).await
    }

    /// Withdraw to public accounts. Creating a missing token account for the
    /// recipient costs the relayer's high fee.
    pub async fn unshield<R: RngCore + CryptoRng>(
        &mut self,
        recipient_native: Address,
        recipient_token: Option<Address>,
        asset: AssetId,
        native_amount: u64,
        token_amount: u64,
        rng: &mut R,
    ) -> Result<SpendOutcome> {
        reject_native_token_amount(asset, token_amount.into())?;
        let recipient_token_exists = match recipient_token {
            Some(address) => self.ledger.account_exists(address).await?,
            None => true,
        };
        let accounts = TxAccounts::unshield(
            self.relayer,
            recipient_native,
            recipient_token,
            recipient_token_exists,
        )
        .with_pool(self.pool);
        let fee = accounts.relayer_fee(Action::Unshield);

        let inputs = select_spend(
            &self.balance,
            asset,
            token_amount,
            native_amount.saturating_add(fee),
            self.options.verifier.inputs(),
        )?;
        let outputs = self.change(&inputs, asset, native_amount, token_amount, fee, rng)?;

        let params = self.build(self.options.verifier, inputs, outputs, Action::Unshield, accounts, rng)?;
        self.prove_and_submit(&params).await
    }

    /// Fold the largest inbox notes of `asset`, together with the notes
    /// already held, into one note.
    pub async fn merge_all_inbox<R: RngCore + CryptoRng>(
        &mut self,
        asset: AssetId,
        rng: &mut R,
    ) -> Result<SpendOutcome> {
        let inputs = merge_all(&self.balance, &self.inbox, asset, self.options.merge_cap)?;
        self.merge(inputs, asset, rng).await
    }

    /// Fold the named inbox notes, together with the notes already held,
    /// into one note.
    pub async fn merge_inbox<R: RngCore + CryptoRng>(
        &mut self,
        asset: AssetId,
        commitments: &[Commitment],
        rng: &mut R,
    ) -> Result<SpendOutcome> {
        let inputs = merge_commitments(
            &self.balance,
            &self.inbox,
            asset,
            commitments,
            self.options.merge_cap,
        )?;
        self.merge(inputs, asset, rng).await
    }

    async fn merge<R: RngCore + CryptoRng>(
        &mut self,
        inputs: Vec<Note>,
        asset: AssetId,
        rng: &mut R,
    ) -> Result<SpendOutcome> {
        let accounts = TxAccounts::transfer(self.relayer).with_pool(self.pool);
        let fee = accounts.relayer_fee(Action::Transfer);
        let outputs = self.change(&inputs, asset, 0, 0, fee, rng)?;
        if outputs.is_empty() {
            return Err(ParameterError::Undefined { field: "recipient" }.into());
        }

        let params = self.build(
            VerifierConfig::TenInTwoOut,
            inputs,
            outputs,
            Action::Transfer,
            accounts,
            rng,
        )?;
        let outcome = self.prove_and_submit(&params).await?;
        self.sync_inbox().await?;
        Ok(outcome)
    }

    fn note_to<R: RngCore + CryptoRng>(
        &self,
        owner: [u8; 32],
        asset: AssetId,
        native_amount: i128,
        token_amount: i128,
        rng: &mut R,
    ) -> std::result::Result<Note, ParameterError> {
        reject_native_token_amount(asset, token_amount)?;
        let mut builder = Note::builder(owner).native(native_amount);
        if !asset.is_native() && token_amount != 0 {
            builder = builder.token(asset, token_amount);
        }
        Ok(builder.build(rng)?)
    }

    /// Change back to this account after spending `native + fee` and
    /// `token` out of `inputs`. Empty when nothing is left over.
    fn change<R: RngCore + CryptoRng>(
        &self,
        inputs: &[Note],
        asset: AssetId,
        native_amount: u64,
        token_amount: u64,
        fee: u64,
        rng: &mut R,
    ) -> std::result::Result<Vec<Output>, ParameterError> {
        let total = |slot| -> i128 {
            inputs
                .iter()
                .map(|n| i128::from(n.amount(slot).as_u64()))
                .sum()
        };
        let native_change = total(AssetSlot::Native) - i128::from(native_amount) - i128::from(fee);
        let token_change = total(AssetSlot::Token) - i128::from(token_amount);
        if native_change < 0 {
            return Err(ParameterError::InsufficientFunds {
                asset: AssetId::NATIVE,
                required: u128::from(native_amount) + u128::from(fee),
                available: total(AssetSlot::Native).unsigned_abs(),
            });
        }
        if native_change == 0 && token_change == 0 {
            return Ok(Vec::new());
        }
        let note = self.note_to(self.account.public_key(), asset, native_change, token_change, rng)?;
        Ok(vec![Output::to_self(note)])
    }

    fn build<R: RngCore + CryptoRng>(
        &self,
        verifier: VerifierConfig,
        inputs: Vec<Note>,
        outputs: Vec<Output>,
        action: Action,
        accounts: TxAccounts,
        rng: &mut R,
    ) -> Result<TransactionParameters> {
        if !self.root_verified {
            return Err(SpendError::StaleRoot);
        }
        let params = ParameterBuilder::new(&self.account, &self.tables, verifier)
            .shuffle(self.options.shuffle)
            .select_inputs(inputs, rng)?
            .compute_amounts(outputs, action, accounts, rng)?
            .pack_outputs(rng)?
            .finalize(self.balance_cursor.tree())?;
        Ok(params)
    }

    async fn prove_and_submit(&mut self, params: &TransactionParameters) -> Result<SpendOutcome> {
        let proof = self.prover.prove(&params.witness()).await?;
        check_proof(&proof, &params.public_inputs().to_be_bytes())?;

        let max_attempts = self.options.submit_attempts.max(1);
        let first_nullifier = params.nullifiers().first().copied();
        let mut attempt = 0;
        let signature = loop {
            attempt += 1;
            let recency_token = self.ledger.recency_token().await?;
            let envelope = params.envelope(&proof, recency_token);

            let error = match self.indexer.submit(&envelope).await {
                Ok(result) => break Some(result.signature),
                Err(e @ RelayerError::Rejected(_)) => return Err(e.into()),
                Err(e) => e,
            };
            warn!(attempt, error = %error, "submission failed");

            if let Some(nullifier) = &first_nullifier {
                if self.ledger.nullifier_exists(nullifier).await? {
                    info!(attempt, "transaction observed on ledger, not resubmitting");
                    break None;
                }
            }
            if attempt >= max_attempts {
                return Err(RelayerError::SubmissionFailed {
                    attempts: attempt,
                    last: Box::new(error),
                }
                .into());
            }
            tokio::time::sleep(self.options.retry.backoff(attempt - 1)).await;
        };

        info!(action = ?params.action(), ?signature, attempt, "spend landed");
        self.indexer.update_ledger_view().await?;
        let sync = self.sync_balance().await?;
        Ok(SpendOutcome {
            signature,
            attempts: attempt,
            sync,
        })
    }
}

/// The native asset has no token part.
fn reject_native_token_amount(asset: AssetId, token_amount: i128) -> std::result::Result<(), ParameterError> {
    if asset.is_native() && token_amount != 0 {
        return Err(ParameterError::UnexpectedField { field: "token_amount" });
    }
    Ok(())
}
