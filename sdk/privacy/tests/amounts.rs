use rand::rngs::OsRng;
use tessera_privacy::field::to_signed;
use tessera_privacy::{
    Account, Address, AssetId, AssetSlot, AssetTriple, Fr, Note, NoteError, external_amount,
};

fn mint() -> AssetId {
    AssetId(Address([21u8; 32]))
}

fn owner() -> [u8; 32] {
    Account::random(&mut OsRng).public_key()
}

#[test]
fn external_amount_net_inflow_is_positive() {
    let pk = owner();
    let inputs = vec![Note::zero(pk, &mut OsRng), Note::zero(pk, &mut OsRng)];
    let mut outputs = vec![
        Note::builder(pk).native(2).token(mint(), 4).build(&mut OsRng).unwrap(),
        Note::zero(pk, &mut OsRng),
    ];
    let triple = AssetTriple::from_notes(inputs.iter().chain(&outputs)).unwrap();

    assert_eq!(external_amount(AssetSlot::Native, &triple, &inputs, &outputs), Fr::from(2u64));
    assert_eq!(external_amount(AssetSlot::Token, &triple, &inputs, &outputs), Fr::from(4u64));

    outputs[1] = Note::builder(pk).native(3).token(mint(), 5).build(&mut OsRng).unwrap();
    assert_eq!(external_amount(AssetSlot::Token, &triple, &inputs, &outputs), Fr::from(9u64));
    assert_eq!(external_amount(AssetSlot::Native, &triple, &inputs, &outputs), Fr::from(5u64));
}

#[test]
fn external_amount_net_outflow_wraps() {
    let pk = owner();
    let inputs = vec![Note::builder(pk).native(10).token(mint(), 7).build(&mut OsRng).unwrap()];
    let outputs = vec![Note::builder(pk).native(4).token(mint(), 7).build(&mut OsRng).unwrap()];
    let triple = AssetTriple::from_notes(inputs.iter().chain(&outputs)).unwrap();

    let native = external_amount(AssetSlot::Native, &triple, &inputs, &outputs);
    assert_eq!(native, -Fr::from(6u64));
    assert_eq!(to_signed(&native), Some(-6));
    assert_eq!(external_amount(AssetSlot::Token, &triple, &inputs, &outputs), Fr::from(0u64));
}

#[test]
fn external_amount_matches_by_asset_not_position() {
    let pk = owner();
    let other = AssetId(Address([22u8; 32]));
    let outputs = vec![Note::builder(pk).token(other, 8).build(&mut OsRng).unwrap()];
    // triple built for a different token: the output does not count
    let triple = AssetTriple::for_token(Some(mint())).unwrap();

    assert_eq!(external_amount(AssetSlot::Token, &triple, &[], &outputs), Fr::from(0u64));
}

#[test]
fn two_tokens_in_one_transaction_rejected() {
    let pk = owner();
    let other = AssetId(Address([23u8; 32]));
    let notes = [
        Note::builder(pk).token(mint(), 1).build(&mut OsRng).unwrap(),
        Note::builder(pk).token(other, 1).build(&mut OsRng).unwrap(),
    ];
    let err = AssetTriple::from_notes(notes.iter()).unwrap_err();
    assert_eq!(err, NoteError::TooManyAssets(mint(), other));
}
