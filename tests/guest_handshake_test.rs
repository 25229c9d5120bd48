//! Guest handshake integration tests
//!
//! Drives Flows A, B and C through the public service API with the in-memory
//! store, a scripted discovery probe and a peer client that records every
//! callback instead of sending it.

mod common;

use std::sync::Arc;

use bson::{oid::ObjectId, DateTime as BsonDateTime};
use chrono::{Duration, Utc};
use tokio_test::{assert_err, assert_ok};

use common::{harness, harness_with, user_with_session, DeadProbe, PeerCall, RecordingPeer, SelfProbe, OUR_HOST};
use imp::db::schemas::{GuestDoc, UserHostDoc, UserTokenDoc};
use imp::guest::{GuestRequestForm, HostTokenOutcome, PlaceTokenForm};
use imp::store::Store;
use imp::ImpError;

fn guest_form(handle: &str, host: &str, nonce: &str) -> GuestRequestForm {
    GuestRequestForm {
        handle: handle.into(),
        host: host.into(),
        nonce: nonce.into(),
    }
}

fn place_form(host: &str, token: &str, nonce: &str) -> PlaceTokenForm {
    PlaceTokenForm {
        host: host.into(),
        token: token.into(),
        nonce: nonce.into(),
    }
}

// =============================================================================
// Flow A: local user requests a token on a peer
// =============================================================================

#[tokio::test]
async fn test_flow_a_sends_nonce_to_discovered_peer() {
    let h = harness();
    let (user, session) = user_with_session(&h.store, "alice").await;

    let outcome = h
        .guests
        .request_host_token(&session, "alice", "Peer.Example", Utc::now())
        .await
        .unwrap();
    let HostTokenOutcome::Accepted(completion) = outcome else {
        panic!("expected a pending handshake");
    };
    completion.await.unwrap();

    let host = h.store.find_or_create_host("peer.example").await.unwrap();
    assert_eq!(host.location, "peer.example");

    let row = h.store.find_user_host(user._id, host._id).await.unwrap().unwrap();
    assert!(!row.has_token());
    assert_eq!(row.nonce.len(), 50);

    assert_eq!(
        h.peer.calls(),
        vec![PeerCall::RequestGuest {
            location: "peer.example".into(),
            form: guest_form("alice", OUR_HOST, &row.nonce),
        }]
    );
}

#[tokio::test]
async fn test_flow_a_twice_yields_one_pending_row() {
    let h = harness();
    let (user, session) = user_with_session(&h.store, "alice").await;
    let now = Utc::now();

    let (first, second) = futures::join!(
        h.guests.request_host_token(&session, "alice", "peer.example", now),
        h.guests.request_host_token(&session, "alice", "peer.example", now),
    );

    let mut accepted = Vec::new();
    let mut refused = 0;
    for outcome in [first, second] {
        match outcome {
            Ok(HostTokenOutcome::Accepted(completion)) => accepted.push(completion),
            Err(ImpError::RateLimited { message, .. }) => {
                assert_eq!(message, "Too many requests for this host.");
                refused += 1;
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert_eq!(accepted.len(), 1);
    assert_eq!(refused, 1);
    for completion in futures::future::join_all(accepted).await {
        completion.unwrap();
    }

    assert_eq!(h.store.user_host_count(), 1);

    // The one nonce sent out is the one stored
    let host = h.store.find_or_create_host("peer.example").await.unwrap();
    let row = h.store.find_user_host(user._id, host._id).await.unwrap().unwrap();
    let calls = h.peer.calls();
    assert_eq!(calls.len(), 1);
    let PeerCall::RequestGuest { form, .. } = &calls[0] else {
        panic!("expected a guest request");
    };
    assert_eq!(form.nonce, row.nonce);
}

#[tokio::test]
async fn test_flow_a_retry_after_pending_window_restarts() {
    let h = harness();
    let (user, session) = user_with_session(&h.store, "alice").await;
    let now = Utc::now();

    let first = h
        .guests
        .request_host_token(&session, "alice", "peer.example", now)
        .await
        .unwrap();
    assert!(matches!(first, HostTokenOutcome::Accepted(_)));

    let host = h.store.find_or_create_host("peer.example").await.unwrap();
    let first_nonce = h
        .store
        .find_user_host(user._id, host._id)
        .await
        .unwrap()
        .unwrap()
        .nonce;

    let early = h
        .guests
        .request_host_token(&session, "alice", "peer.example", now + Duration::seconds(29))
        .await;
    assert!(matches!(early, Err(ImpError::RateLimited { .. })));

    let later = h
        .guests
        .request_host_token(&session, "alice", "peer.example", now + Duration::seconds(31))
        .await
        .unwrap();
    assert!(matches!(later, HostTokenOutcome::Accepted(_)));

    let row = h.store.find_user_host(user._id, host._id).await.unwrap().unwrap();
    assert_ne!(row.nonce, first_nonce);
    assert_eq!(h.store.user_host_count(), 1);
}

#[tokio::test]
async fn test_flow_a_returns_held_token_immediately() {
    let h = harness();
    let (user, session) = user_with_session(&h.store, "alice").await;
    let host = h.store.find_or_create_host("peer.example").await.unwrap();
    h.store.put_user_host(UserHostDoc {
        user_id: user._id,
        host_id: host._id,
        nonce: String::new(),
        token: "held-token".into(),
        created_at: BsonDateTime::now(),
    });

    let outcome = h
        .guests
        .request_host_token(&session, "alice", "PEER.example", Utc::now())
        .await
        .unwrap();
    match outcome {
        HostTokenOutcome::Ready { host, token } => {
            assert_eq!(host, "peer.example");
            assert_eq!(token, "held-token");
        }
        other => panic!("expected the held token, got {:?}", other),
    }
    assert!(h.peer.calls().is_empty());
}

#[tokio::test]
async fn test_flow_a_rejects_foreign_session_and_unknown_handle() {
    let h = harness();
    user_with_session(&h.store, "alice").await;
    let stranger = UserTokenDoc::new("someone-else".into(), ObjectId::new());

    let err = h
        .guests
        .request_host_token(&stranger, "alice", "peer.example", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, ImpError::Unauthorized(_)));

    let err = h
        .guests
        .request_host_token(&stranger, "nobody", "peer.example", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, ImpError::NotFound(_)));
    assert_eq!(h.store.user_host_count(), 0);
}

#[tokio::test]
async fn test_flow_a_discovery_failure_is_silent() {
    let h = harness_with(Arc::new(DeadProbe), RecordingPeer::new(202, 200));
    let (_, session) = user_with_session(&h.store, "alice").await;

    let outcome = h
        .guests
        .request_host_token(&session, "alice", "gone.example", Utc::now())
        .await
        .unwrap();
    let HostTokenOutcome::Accepted(completion) = outcome else {
        panic!("expected a pending handshake");
    };
    completion.await.unwrap();

    assert!(h.peer.calls().is_empty());
    let host = h.store.find_or_create_host("gone.example").await.unwrap();
    assert!(!host.is_located());
}

// =============================================================================
// Flow B: peer places the token
// =============================================================================

#[tokio::test]
async fn test_flow_b_completes_flow_a() {
    let h = harness();
    let (_, session) = user_with_session(&h.store, "alice").await;

    let HostTokenOutcome::Accepted(completion) = h
        .guests
        .request_host_token(&session, "alice", "peer.example", Utc::now())
        .await
        .unwrap()
    else {
        panic!("expected a pending handshake");
    };
    completion.await.unwrap();

    let PeerCall::RequestGuest { form, .. } = h.peer.calls().remove(0) else {
        panic!("expected a guest request");
    };

    assert_ok!(
        h.guests
            .place_host_token("alice", &place_form("peer.example", "peer-token", &form.nonce))
            .await
    );

    // Fast path from now on
    let outcome = h
        .guests
        .request_host_token(&session, "alice", "peer.example", Utc::now())
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        HostTokenOutcome::Ready { ref token, .. } if token == "peer-token"
    ));

    // The nonce was single-use
    let replay = h
        .guests
        .place_host_token("alice", &place_form("peer.example", "other", &form.nonce))
        .await;
    assert!(matches!(replay, Err(ImpError::Unauthorized(_))));
}

#[tokio::test]
async fn test_flow_b_wrong_nonce_leaves_token_untouched() {
    let h = harness();
    let (user, _) = user_with_session(&h.store, "alice").await;
    let host = h.store.find_or_create_host("peer.example").await.unwrap();
    h.store.put_user_host(UserHostDoc {
        user_id: user._id,
        host_id: host._id,
        nonce: "the-real-nonce".into(),
        token: "existing".into(),
        created_at: BsonDateTime::now(),
    });

    let err = h
        .guests
        .place_host_token("alice", &place_form("peer.example", "forged", "guessed"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "The user did not request a guest token.");

    let row = h.store.find_user_host(user._id, host._id).await.unwrap().unwrap();
    assert_eq!(row.token, "existing");
    assert_eq!(row.nonce, "the-real-nonce");
}

#[tokio::test]
async fn test_flow_b_validation_and_unknown_user() {
    let h = harness();
    user_with_session(&h.store, "alice").await;

    for (form, message) in [
        (place_form("", "t", "n"), "Host is missing."),
        (place_form("peer.example", "", "n"), "Token is missing."),
        (place_form("peer.example", "t", " "), "Nonce is missing."),
    ] {
        let err = h.guests.place_host_token("alice", &form).await.unwrap_err();
        assert!(matches!(err, ImpError::Validation(_)));
        assert_eq!(err.to_string(), message);
    }

    let err = h
        .guests
        .place_host_token("nobody", &place_form("peer.example", "t", "n"))
        .await
        .unwrap_err();
    assert!(matches!(err, ImpError::NotFound(_)));
}

// =============================================================================
// Flow C: peer requests a guest token for its user
// =============================================================================

#[tokio::test]
async fn test_flow_c_persists_token_after_confirmation() {
    let h = harness();

    let completion = h
        .guests
        .request_guest_token(&guest_form("bob", "peer.example", "their-nonce"), Utc::now())
        .await
        .unwrap();
    completion.await.unwrap();

    let calls = h.peer.calls();
    assert_eq!(calls.len(), 1);
    let PeerCall::PlaceToken { location, handle, form } = &calls[0] else {
        panic!("expected a token placement");
    };
    assert_eq!(location, "peer.example");
    assert_eq!(handle, "bob");
    assert_eq!(form.host, OUR_HOST);
    assert_eq!(form.nonce, "their-nonce");

    let host = h.store.find_or_create_host("peer.example").await.unwrap();
    let guest = h.store.find_guest("BOB", host._id).await.unwrap().unwrap();
    assert_eq!(guest.token, form.token);
    assert!(guest.created_at.is_some());
}

#[tokio::test]
async fn test_flow_c_refused_callback_never_writes_token() {
    let h = harness_with(Arc::new(SelfProbe), RecordingPeer::new(202, 401));

    let completion = h
        .guests
        .request_guest_token(&guest_form("bob", "peer.example", "forged"), Utc::now())
        .await
        .unwrap();
    completion.await.unwrap();
    assert_eq!(h.peer.calls().len(), 1);

    let host = h.store.find_or_create_host("peer.example").await.unwrap();
    let guest = h.store.find_guest("bob", host._id).await.unwrap();
    assert!(guest.map_or(true, |g| !g.has_token()));
}

#[tokio::test]
async fn test_flow_c_forged_request_cannot_replace_valid_token() {
    let h = harness_with(Arc::new(SelfProbe), RecordingPeer::new(202, 401));
    let host = h.store.find_or_create_host("peer.example").await.unwrap();
    let long_ago = BsonDateTime::from_chrono(Utc::now() - Duration::hours(1));
    h.store.put_guest(GuestDoc {
        handle: "bob".into(),
        handle_key: "bob".into(),
        host_id: host._id,
        token: "valid".into(),
        created_at: Some(long_ago),
        requested_at: long_ago,
    });

    let completion = h
        .guests
        .request_guest_token(&guest_form("bob", "peer.example", "forged"), Utc::now())
        .await
        .unwrap();
    completion.await.unwrap();

    let guest = h.store.find_guest("bob", host._id).await.unwrap().unwrap();
    assert_eq!(guest.token, "valid");
    assert_eq!(guest.created_at, Some(long_ago));
}

#[tokio::test]
async fn test_flow_c_throttles_repeat_requests() {
    let h = harness();
    let now = Utc::now();
    let form = guest_form("bob", "peer.example", "n1");

    assert_ok!(h.guests.request_guest_token(&form, now).await);

    let err = assert_err!(
        h.guests
            .request_guest_token(&form, now + Duration::seconds(5))
            .await
    );
    assert_eq!(err.to_string(), "Too many requests for this guest.");

    assert_ok!(
        h.guests
            .request_guest_token(&form, now + Duration::seconds(31))
            .await
    );
}

#[tokio::test]
async fn test_flow_c_validation() {
    let h = harness();
    for (form, message) in [
        (guest_form("", "peer.example", "n"), "Handle is missing."),
        (guest_form("bob", "", "n"), "Host is missing."),
        (guest_form("bob", "peer.example", ""), "Nonce is missing."),
    ] {
        let err = h.guests.request_guest_token(&form, Utc::now()).await.unwrap_err();
        assert_eq!(err.to_string(), message);
    }
    assert_eq!(h.store.host_count(), 0);
}
