#![allow(dead_code)]

use std::time::Duration;

use rand::rngs::OsRng;

use tessera_core::mock::{MockLedger, MockRelayer};
use tessera_core::{
    Action, ClientOptions, IndexedTransaction, MockProver, Relayer, RetryPolicy, ShieldedClient,
    VerifierConfig,
};
use tessera_privacy::{
    Account, Address, AssetId, EncryptionMode, LookupTables, Note, encrypt_note, pack_slots,
};

pub type Client = ShieldedClient<MockRelayer, MockLedger, MockProver>;

pub fn token() -> AssetId {
    AssetId(Address([9u8; 32]))
}

pub fn tables() -> LookupTables {
    LookupTables::new([token()], vec![])
}

pub fn relayer() -> Relayer {
    Relayer {
        address: Address([1u8; 32]),
        fee_recipient: Address([2u8; 32]),
        fee: 10,
        high_fee: 50,
    }
}

pub fn options() -> ClientOptions {
    ClientOptions {
        verifier: VerifierConfig::TwoInTwoOut,
        shuffle: true,
        submit_attempts: 3,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        merge_cap: 10,
    }
}

/// Route `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn backend() -> (MockRelayer, MockLedger) {
    init_tracing();
    let ledger = MockLedger::new();
    (MockRelayer::new(ledger.clone()), ledger)
}

pub fn client(relayer_mock: &MockRelayer, account: Account) -> Client {
    ShieldedClient::with_options(
        relayer_mock.clone(),
        relayer_mock.ledger().clone(),
        MockProver::new(),
        account,
        tables(),
        options(),
    )
    .relayer(relayer())
}

pub fn native_note(owner: &Account, amount: u64) -> Note {
    Note::builder(owner.public_key())
        .native(amount)
        .build(&mut OsRng)
        .unwrap()
}

/// Log a landed transaction carrying `notes`, encrypted by `sender` under
/// `mode`, padded to an even leaf count.
pub async fn deposit(
    relayer_mock: &MockRelayer,
    sender: &Account,
    notes: Vec<Note>,
    mode: EncryptionMode,
) -> IndexedTransaction {
    let tx = transaction(relayer_mock, sender, notes, mode).await;
    relayer_mock.push_transaction(tx.clone()).await;
    tx
}

pub async fn transaction(
    relayer_mock: &MockRelayer,
    sender: &Account,
    mut notes: Vec<Note>,
    mode: EncryptionMode,
) -> IndexedTransaction {
    if notes.len() % 2 == 1 {
        notes.push(Note::zero(sender.public_key(), &mut OsRng));
    }
    let encrypted: Vec<_> = notes
        .iter()
        .map(|n| encrypt_note(n, mode, sender, &tables(), &mut OsRng).unwrap())
        .collect();
    IndexedTransaction {
        signature: format!("test-{}", relayer_mock.next_leaf_index().await),
        first_leaf_index: relayer_mock.next_leaf_index().await,
        leaves: notes.iter().map(Note::commitment).collect(),
        encrypted_payload: pack_slots(&encrypted).unwrap(),
        nullifiers: vec![],
        block_time: 0,
        kind: Action::Shield,
    }
}

pub fn to(recipient: &Account) -> EncryptionMode {
    EncryptionMode::Asymmetric {
        recipient: recipient.encryption_public_key(),
    }
}
