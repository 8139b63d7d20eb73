//! Behaviour every `ProfileRepository` backend must share.
//!
//! Each check is written once against the trait and run for both backends.

use super::{
    InMemoryRepository, LikeRecord, ProfileRepository, RelayTarget, SqliteRepository, Unpaired,
};
use crate::catalog::{ALL_UNIVERSITIES, OTHER_UNIVERSITY};
use crate::matching::test_support::profile;
use crate::profile::{Gender, UserId};

const AAU: &str = "Addis Ababa University";
const JU: &str = "Jimma University";

async fn register(repo: &dyn ProfileRepository, id: i64, gender: Gender, uni: &str, pref: &[&str]) {
    repo.upsert_profile(UserId(id), profile(gender, uni, pref))
        .await
        .unwrap();
}

async fn ensure_user_is_idempotent(repo: &dyn ProfileRepository) {
    register(repo, 1, Gender::Male, AAU, &[AAU]).await;
    repo.ensure_user(UserId(1)).await.unwrap();
    repo.ensure_user(UserId(2)).await.unwrap();
    repo.ensure_user(UserId(2)).await.unwrap();

    let registered = repo.get_user(UserId(1)).await.unwrap().unwrap();
    assert!(registered.is_registered());
    let stub = repo.get_user(UserId(2)).await.unwrap().unwrap();
    assert!(!stub.is_registered());
    assert!(repo.get_user(UserId(3)).await.unwrap().is_none());
    assert_eq!(repo.stats().await.unwrap().users, 2);
}

async fn upsert_roundtrips_profile(repo: &dyn ProfileRepository) {
    let p = profile(Gender::Female, OTHER_UNIVERSITY, &[AAU, JU]);
    let saved = repo.upsert_profile(UserId(5), p.clone()).await.unwrap();
    assert_eq!(saved.profile.as_ref(), Some(&p));

    let loaded = repo.get_user(UserId(5)).await.unwrap().unwrap();
    assert_eq!(loaded.profile, Some(p));
    assert_eq!(loaded.chat_partner, None);
}

async fn candidate_filters(repo: &dyn ProfileRepository) {
    register(repo, 1, Gender::Male, AAU, &[JU]).await;
    register(repo, 2, Gender::Female, AAU, &[AAU]).await; // wrong university
    register(repo, 3, Gender::Male, JU, &[AAU]).await; // wrong gender
    repo.ensure_user(UserId(4)).await.unwrap(); // unregistered
    register(repo, 5, Gender::Female, JU, &[AAU]).await;
    register(repo, 6, Gender::Female, JU, &[AAU]).await;

    let first = repo.next_candidate(UserId(1)).await.unwrap().unwrap();
    assert_eq!(first.id, UserId(5));

    repo.record_like(UserId(1), UserId(5)).await.unwrap();
    let next = repo.next_candidate(UserId(1)).await.unwrap().unwrap();
    assert_eq!(next.id, UserId(6));

    repo.record_like(UserId(1), UserId(6)).await.unwrap();
    assert!(repo.next_candidate(UserId(1)).await.unwrap().is_none());
}

async fn sentinel_accepts_every_university(repo: &dyn ProfileRepository) {
    register(repo, 1, Gender::Female, AAU, &[ALL_UNIVERSITIES]).await;
    register(repo, 2, Gender::Male, OTHER_UNIVERSITY, &[AAU]).await;
    let found = repo.next_candidate(UserId(1)).await.unwrap();
    assert_eq!(found.map(|u| u.id), Some(UserId(2)));
}

async fn unregistered_viewer_gets_nothing(repo: &dyn ProfileRepository) {
    register(repo, 2, Gender::Female, AAU, &[AAU]).await;
    repo.ensure_user(UserId(1)).await.unwrap();
    assert!(repo.next_candidate(UserId(1)).await.unwrap().is_none());
    assert!(repo.next_candidate(UserId(99)).await.unwrap().is_none());
}

async fn like_is_idempotent_and_flips_mutual(repo: &dyn ProfileRepository) {
    register(repo, 1, Gender::Male, AAU, &[ALL_UNIVERSITIES]).await;
    register(repo, 2, Gender::Female, AAU, &[ALL_UNIVERSITIES]).await;

    assert_eq!(
        repo.record_like(UserId(1), UserId(2)).await.unwrap(),
        LikeRecord::Recorded { mutual: false }
    );
    assert_eq!(
        repo.record_like(UserId(1), UserId(2)).await.unwrap(),
        LikeRecord::Duplicate
    );
    assert!(!repo.get_like(UserId(1), UserId(2)).await.unwrap().unwrap().mutual);

    assert_eq!(
        repo.record_like(UserId(2), UserId(1)).await.unwrap(),
        LikeRecord::Recorded { mutual: true }
    );
    assert!(repo.get_like(UserId(1), UserId(2)).await.unwrap().unwrap().mutual);
    assert!(repo.get_like(UserId(2), UserId(1)).await.unwrap().unwrap().mutual);

    let stats = repo.stats().await.unwrap();
    assert_eq!(stats.likes, 2);
    assert_eq!(stats.matches, 1);
}

async fn matches_listed_in_match_order(repo: &dyn ProfileRepository) {
    register(repo, 1, Gender::Male, AAU, &[ALL_UNIVERSITIES]).await;
    for id in [2, 3, 4] {
        register(repo, id, Gender::Female, JU, &[ALL_UNIVERSITIES]).await;
    }
    // 1 likes everyone; only 3 and 2 like back, in that order.
    for id in [2, 3, 4] {
        repo.record_like(UserId(1), UserId(id)).await.unwrap();
    }
    repo.record_like(UserId(3), UserId(1)).await.unwrap();
    repo.record_like(UserId(2), UserId(1)).await.unwrap();

    let ids: Vec<_> = repo
        .list_matches(UserId(1))
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.id)
        .collect();
    assert_eq!(ids, vec![UserId(2), UserId(3)]);

    let theirs: Vec<_> = repo
        .list_matches(UserId(3))
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.id)
        .collect();
    assert_eq!(theirs, vec![UserId(1)]);
}

async fn chat_pairing_lifecycle(repo: &dyn ProfileRepository) {
    for id in [1, 2, 3] {
        repo.ensure_user(UserId(id)).await.unwrap();
    }
    assert!(!repo.pair_chat(UserId(1), UserId(42)).await.unwrap());
    assert_eq!(
        repo.relay_target(UserId(1)).await.unwrap(),
        RelayTarget::NoPartner
    );

    assert!(repo.pair_chat(UserId(1), UserId(2)).await.unwrap());
    assert_eq!(
        repo.relay_target(UserId(1)).await.unwrap(),
        RelayTarget::Partner(UserId(2))
    );
    assert_eq!(
        repo.relay_target(UserId(2)).await.unwrap(),
        RelayTarget::Partner(UserId(1))
    );

    // 3 takes over 2; 1 is left dangling and heals on its next relay.
    assert!(repo.pair_chat(UserId(3), UserId(2)).await.unwrap());
    assert_eq!(
        repo.relay_target(UserId(1)).await.unwrap(),
        RelayTarget::Expired
    );
    assert_eq!(repo.get_user(UserId(1)).await.unwrap().unwrap().chat_partner, None);

    assert_eq!(
        repo.unpair_chat(UserId(2)).await.unwrap(),
        Some(Unpaired {
            partner: UserId(3),
            partner_released: true
        })
    );
    assert_eq!(repo.get_user(UserId(3)).await.unwrap().unwrap().chat_partner, None);
    assert_eq!(repo.unpair_chat(UserId(2)).await.unwrap(), None);
}

async fn unpair_leaves_moved_on_partner_alone(repo: &dyn ProfileRepository) {
    for id in [1, 2, 3] {
        repo.ensure_user(UserId(id)).await.unwrap();
    }
    repo.pair_chat(UserId(1), UserId(2)).await.unwrap();
    repo.pair_chat(UserId(2), UserId(3)).await.unwrap();

    assert_eq!(
        repo.unpair_chat(UserId(1)).await.unwrap(),
        Some(Unpaired {
            partner: UserId(2),
            partner_released: false
        })
    );
    assert_eq!(
        repo.relay_target(UserId(2)).await.unwrap(),
        RelayTarget::Partner(UserId(3))
    );
}

async fn abandoned_user_stopping_does_not_release_partner(repo: &dyn ProfileRepository) {
    for id in [1, 2, 3] {
        repo.ensure_user(UserId(id)).await.unwrap();
    }
    repo.pair_chat(UserId(1), UserId(2)).await.unwrap();
    // 1 moves on to 3; 2 still points at 1.
    repo.pair_chat(UserId(1), UserId(3)).await.unwrap();

    assert_eq!(
        repo.unpair_chat(UserId(2)).await.unwrap(),
        Some(Unpaired {
            partner: UserId(1),
            partner_released: false
        })
    );
    let one = repo.get_user(UserId(1)).await.unwrap().unwrap();
    assert_eq!(one.chat_partner, Some(UserId(3)));
    assert_eq!(
        repo.relay_target(UserId(3)).await.unwrap(),
        RelayTarget::Partner(UserId(1))
    );
}

macro_rules! contract_tests {
    ($($name:ident),* $(,)?) => {
        mod memory {
            $(
                #[tokio::test]
                async fn $name() {
                    let repo = super::InMemoryRepository::new();
                    super::$name(&repo).await;
                }
            )*
        }

        mod sqlite {
            $(
                #[tokio::test]
                async fn $name() {
                    let repo = super::SqliteRepository::new_in_memory().unwrap();
                    super::$name(&repo).await;
                }
            )*
        }
    };
}

contract_tests!(
    ensure_user_is_idempotent,
    upsert_roundtrips_profile,
    candidate_filters,
    sentinel_accepts_every_university,
    unregistered_viewer_gets_nothing,
    like_is_idempotent_and_flips_mutual,
    matches_listed_in_match_order,
    chat_pairing_lifecycle,
    unpair_leaves_moved_on_partner_alone,
    abandoned_user_stopping_does_not_release_partner,
);
