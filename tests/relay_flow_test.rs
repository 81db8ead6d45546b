//! End-to-end relay scenarios over the in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};

use relay_chain::authorizer::WriteRejection;
use relay_chain::config::CryptoArgs;
use relay_chain::service::{PostReceipt, MAX_ANON_REACTIONS};
use relay_chain::types::{Digest, Gravitas, NewPost, NewReaction, Rejection};
use relay_chain::{ChainService, MemoryChain, SecrecyCodec};

fn service() -> ChainService {
    let relay = CryptoArgs::default().build_relay().unwrap();
    ChainService::new(Arc::new(MemoryChain::new()), relay)
}

fn post(title: &str, hash: &Digest) -> NewPost {
    NewPost {
        title: title.to_string(),
        author: "relay".to_string(),
        contents: format!("contents of {title}"),
        tag: 4,
        hash: hash.clone(),
    }
}

fn open(svc: &ChainService, receipt: &PostReceipt, key: &Digest) -> Digest {
    let secret = svc
        .relay()
        .codec()
        .decrypt(&receipt.ciphertext, key)
        .expect("holder can open the relay");
    SecrecyCodec::digest(&secret)
}

/// Genesis, then a chain of five holders each handing off to the next.
#[tokio::test]
async fn relay_passes_from_holder_to_holder() {
    let svc = service();

    let genesis = svc.add_post(post("genesis", &Digest::default())).await.unwrap();
    assert!(genesis.genesis);
    assert_eq!(genesis.ciphertext.as_str().len(), 32);

    let mut holders = vec![open(&svc, &genesis, svc.relay().genesis_key())];
    for n in 1..=5 {
        let held = holders.last().unwrap().clone();
        let receipt = svc.add_post(post(&format!("write {n}"), &held)).await.unwrap();
        holders.push(open(&svc, &receipt, &held));
    }

    let view = svc.chain().await.unwrap();
    assert_eq!(view.chain.len(), 6);
    assert_eq!(view.chain.last().unwrap().post.tag, 0);
    assert!(view.chain[..5].iter().all(|p| p.post.tag == 4));
}

/// Older holders wait out their window while the newest writes at once.
#[tokio::test]
async fn older_holders_regain_eligibility_over_time() {
    let svc = service();
    let genesis = svc.add_post(post("genesis", &Digest::default())).await.unwrap();
    let h1 = open(&svc, &genesis, svc.relay().genesis_key());
    let r2 = svc.add_post(post("two", &h1)).await.unwrap();
    let h2 = open(&svc, &r2, &h1);
    let r3 = svc.add_post(post("three", &h2)).await.unwrap();
    let _h3 = open(&svc, &r3, &h2);

    // h2 sits at position 1, h1 at position 2
    let err = svc.add_post(post("early two", &h2)).await.unwrap_err();
    match err.rejection() {
        Some(Rejection::Write(WriteRejection::Stale { opens_in_days, .. })) => {
            assert_eq!(*opens_in_days, 5)
        }
        other => panic!("expected stale rejection, got {other:?}"),
    }

    let day_six = Utc::now() + Duration::days(6);
    let err = svc.add_post_at(post("early one", &h1), day_six).await.unwrap_err();
    assert!(matches!(
        err.rejection(),
        Some(Rejection::Write(WriteRejection::Stale { .. }))
    ));

    let day_seven = Utc::now() + Duration::days(7) + Duration::minutes(1);
    assert!(svc.add_post_at(post("late one", &h1), day_seven).await.is_ok());
}

#[tokio::test]
async fn unknown_digest_is_never_eligible() {
    let svc = service();
    svc.add_post(post("genesis", &Digest::default())).await.unwrap();

    let stranger = SecrecyCodec::digest_str("never minted");
    let far_future = Utc::now() + Duration::days(365);
    let err = svc.add_post_at(post("intruder", &stranger), far_future).await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::Write(WriteRejection::Unknown)));
    assert_eq!(err.status_code().as_u16(), 400);
}

#[tokio::test]
async fn anonymous_reactions_are_capped() {
    let svc = service();
    let genesis = svc.add_post(post("genesis", &Digest::default())).await.unwrap();
    let descriptor = genesis.post.descriptors[3].clone();

    for i in 0..=MAX_ANON_REACTIONS {
        let result = svc
            .add_reaction(NewReaction {
                post_id: genesis.post.id,
                descriptor: descriptor.clone(),
                gravitas_hash: Digest::new("anon"),
            })
            .await;
        if i < MAX_ANON_REACTIONS {
            assert_eq!(result.unwrap().gravitas, Gravitas::ANONYMOUS);
        } else {
            assert_eq!(
                result.unwrap_err().rejection(),
                Some(&Rejection::AnonymousCapReached)
            );
        }
    }
}

#[tokio::test]
async fn unrecognized_full_digest_reacts_as_anonymous() {
    let svc = service();
    let genesis = svc.add_post(post("genesis", &Digest::default())).await.unwrap();

    let receipt = svc
        .add_reaction(NewReaction {
            post_id: genesis.post.id,
            descriptor: genesis.post.descriptors[0].clone(),
            gravitas_hash: SecrecyCodec::digest_str("stranger"),
        })
        .await
        .unwrap();
    assert_eq!(receipt.gravitas, Gravitas::ANONYMOUS);
}
