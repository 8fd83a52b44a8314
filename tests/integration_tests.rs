//! End-to-end scenarios: rights changing hands and recordings signed by
//! every performer

mod common;

use common::*;
use rights_ledger::assets::{AssetData, Composition, Recording, Right};
use rights_ledger::condition::derive_threshold_condition;
use rights_ledger::cosign::CosignSession;
use rights_ledger::fulfillment::{combine_threshold, fulfill_from_key, validate};
use rights_ledger::transaction::*;
use rights_ledger::*;

#[test]
fn test_right_held_jointly() -> anyhow::Result<()> {
    let ledger = new_ledger();
    let alice = keypair("alice");
    let bob = keypair("bob");
    let carol = keypair("carol");
    let alice_id = register_party(&ledger, "Alice", &alice);
    let bob_id = register_party(&ledger, "Bob", &bob);
    let carol_id = register_party(&ledger, "Carol", &carol);

    let c1 = create_asset(
        &ledger,
        AssetData::Composition(Composition::new("First Song", vec![alice_id.clone()])),
        1,
        &alice,
    );
    let right = create_asset(
        &ledger,
        AssetData::Right(Right {
            right_holders: vec![alice_id.clone(), bob_id.clone()],
            right_to: c1.id.clone(),
            transfer_id: None,
        }),
        1,
        &alice,
    );

    let mut r1 = transfer_tx(
        &right.id,
        vec![right.output_ref(0)],
        vec![vec![alice.public_key()]],
        vec![OutputSpec::new(1, vec![alice.public_key(), bob.public_key()])],
        None,
    );
    fulfill_tx(&mut r1, &alice);
    let r1_id = ledger.submit(&r1)?;
    assert_eq!(
        r1.outputs[0].condition,
        derive_threshold_condition(&[alice.public_key(), bob.public_key()], 2)
    );

    for (id, key) in [(&alice_id, &alice), (&bob_id, &bob)] {
        let proof = ledger.prove(Role::RightHolder, "challenge-1", id, &r1_id, key);
        ledger.verify(Role::RightHolder, "challenge-1", id, &r1_id, &proof)?;
    }

    let attempt = ledger.prove(Role::RightHolder, "challenge-1", &carol_id, &r1_id, &carol);
    let result = ledger.verify(Role::RightHolder, "challenge-1", &carol_id, &r1_id, &attempt);
    assert!(matches!(result, Err(LedgerError::Authorization(_))));
    Ok(())
}

#[test]
fn test_cosigned_transfer_out_of_joint_holding() -> anyhow::Result<()> {
    let ledger = new_ledger();
    let alice = keypair("alice");
    let bob = keypair("bob");
    let alice_id = register_party(&ledger, "Alice", &alice);
    let bob_id = register_party(&ledger, "Bob", &bob);
    let owners = [alice.public_key(), bob.public_key()];

    let right = create_asset(
        &ledger,
        AssetData::Right(Right {
            right_holders: vec![alice_id.clone(), bob_id.clone()],
            right_to: "composition".to_string(),
            transfer_id: None,
        }),
        1,
        &alice,
    );
    let mut joint = transfer_tx(
        &right.id,
        vec![right.output_ref(0)],
        vec![vec![alice.public_key()]],
        vec![OutputSpec::new(1, owners.to_vec())],
        None,
    );
    fulfill_tx(&mut joint, &alice);
    ledger.submit(&joint)?;

    // Bob buys Alice out; both co-owners must sign
    let mut to_bob = transfer_tx(
        &right.id,
        vec![joint.output_ref(0)],
        vec![owners.to_vec()],
        vec![OutputSpec::single(1, bob.public_key())],
        None,
    );
    let message = signing_message(&to_bob);

    let mut half_signed = to_bob.clone();
    attach_fulfillments(&mut half_signed, &[fulfill_from_key(&message, &alice)]);
    assert!(!is_fulfilled(&half_signed));
    assert!(matches!(ledger.submit(&half_signed), Err(LedgerError::FulfillmentMismatch(_))));

    let mut session = CosignSession::for_owners(message.clone(), &owners)?;
    session.add_fragment(fulfill_from_key(&message, &bob))?;
    assert!(!session.is_ready());
    session.add_fragment(fulfill_from_key(&message, &alice))?;
    attach_fulfillments(&mut to_bob, &[session.aggregate()?]);
    assert!(is_fulfilled(&to_bob));
    ledger.submit(&to_bob)?;

    // Alice was a holder once; only the current holder passes
    let alice_proof = ledger.prove(Role::RightHolder, "c2", &alice_id, &joint.id, &alice);
    assert!(matches!(
        ledger.verify(Role::RightHolder, "c2", &alice_id, &joint.id, &alice_proof),
        Err(LedgerError::Authorization(_))
    ));
    let bob_proof = ledger.prove(Role::RightHolder, "c2", &bob_id, &joint.id, &bob);
    ledger.verify(Role::RightHolder, "c2", &bob_id, &joint.id, &bob_proof)?;

    assert_eq!(ledger.fetch_transfers(&right.id)?, vec![joint, to_bob]);
    Ok(())
}

#[test]
fn test_recording_signed_by_both_performers() -> anyhow::Result<()> {
    let ledger = new_ledger();
    let first = keypair("performer-1");
    let second = keypair("performer-2");
    let third = keypair("performer-3");
    let first_id = register_party(&ledger, "First", &first);
    let second_id = register_party(&ledger, "Second", &second);
    let third_id = register_party(&ledger, "Third", &third);
    let song = create_asset(
        &ledger,
        AssetData::Composition(Composition::new("Song", vec![first_id.clone()])),
        1,
        &first,
    );

    let recording = Recording::new(vec![first_id.clone(), second_id.clone(), third_id.clone()], &song.id);
    let message = recording.signing_message();
    let from_first = recording.sign(&first);
    let from_second = recording.sign(&second);
    let condition = derive_threshold_condition(&[first.public_key(), second.public_key()], 2);

    let both = combine_threshold(vec![from_first.clone(), from_second], &[1, 1], 2);
    assert!(validate(&both, &message, &condition));
    let only_first = combine_threshold(vec![from_first], &[1], 2);
    assert!(!validate(&only_first, &message, &condition));

    let signed = recording.with_threshold_signature(&both);
    let recording_tx = create_asset(&ledger, AssetData::Recording(signed), 1, &first);

    for (id, key) in [(&first_id, &first), (&second_id, &second)] {
        let proof = ledger.prove(Role::Artist, "nonce", id, &recording_tx.id, key);
        ledger.verify(Role::Artist, "nonce", id, &recording_tx.id, &proof)?;
    }

    // Listed, but never signed the aggregate
    let proof = ledger.prove(Role::Artist, "nonce", &third_id, &recording_tx.id, &third);
    assert!(matches!(
        ledger.verify(Role::Artist, "nonce", &third_id, &recording_tx.id, &proof),
        Err(LedgerError::Authorization(_))
    ));
    Ok(())
}

#[test]
fn test_divisible_shares_conserved() -> anyhow::Result<()> {
    let ledger = new_ledger();
    let alice = keypair("alice");
    let bob = keypair("bob");
    let carol = keypair("carol");

    let song = create_asset(&ledger, AssetData::Composition(Composition::new("Song", vec![])), 100, &alice);
    let mut split = divisible_transfer_tx(
        &[60, 40],
        &song.id,
        song.output_ref(0),
        vec![bob.public_key(), carol.public_key()],
        alice.public_key(),
    );
    fulfill_tx(&mut split, &alice);
    ledger.submit(&split)?;

    assert_eq!(ledger.outputs_for_key(&bob.public_key())?, vec![split.output_ref(0)]);
    assert_eq!(ledger.outputs_for_key(&carol.public_key())?, vec![split.output_ref(1)]);
    assert!(ledger.outputs_for_key(&alice.public_key())?.is_empty());

    // Bob and Carol merge their shares back to Alice
    let mut merge = transfer_tx(
        &song.id,
        vec![split.output_ref(0), split.output_ref(1)],
        vec![vec![bob.public_key()], vec![carol.public_key()]],
        vec![OutputSpec::single(100, alice.public_key())],
        None,
    );
    let message = signing_message(&merge);
    attach_fulfillments(
        &mut merge,
        &[fulfill_from_key(&message, &bob), fulfill_from_key(&message, &carol)],
    );
    ledger.submit(&merge)?;

    assert_eq!(ledger.outputs_for_key(&alice.public_key())?, vec![merge.output_ref(0)]);
    Ok(())
}

#[test]
fn test_assets_for_key_follows_transfers() -> anyhow::Result<()> {
    let ledger = new_ledger();
    let alice = keypair("alice");
    let bob = keypair("bob");
    register_party(&ledger, "Bob", &bob);

    let song = create_asset(&ledger, AssetData::Composition(Composition::new("Song", vec![])), 1, &alice);
    let mut gift = individual_transfer_tx(1, &song.id, song.output_ref(0), bob.public_key(), alice.public_key());
    fulfill_tx(&mut gift, &alice);
    ledger.submit(&gift)?;

    let compositions = ledger.assets_for_key(&bob.public_key(), |_, data| data.kind() == "composition")?;
    assert_eq!(compositions.len(), 1);
    assert_eq!(compositions.get(&song.id), song.asset_data());

    let everything = ledger.assets_for_key(&bob.public_key(), |_, _| true)?;
    assert_eq!(everything.len(), 2);
    assert!(ledger.assets_for_key(&alice.public_key(), |_, _| true)?.is_empty());
    Ok(())
}
