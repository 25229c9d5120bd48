//! Shared fakes for the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use imp::db::schemas::{UserDoc, UserTokenDoc};
use imp::guest::{
    CallbackRunner, GuestConfig, GuestRequestForm, GuestService, PeerClient, PeerReply,
    PlaceTokenForm,
};
use imp::hosts::{HostDirectory, HostDiscovery, Probe};
use imp::store::{MemoryStore, Store};
use imp::Result;

pub const OUR_HOST: &str = "me.example";

/// Every host advertises itself at its bare https domain
pub struct SelfProbe;

#[async_trait]
impl Probe for SelfProbe {
    async fn probe(&self, url: &str) -> Option<String> {
        url.strip_prefix("https://").map(|host| format!("1;{}", host))
    }
}

/// No host answers
pub struct DeadProbe;

#[async_trait]
impl Probe for DeadProbe {
    async fn probe(&self, _url: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeerCall {
    RequestGuest {
        location: String,
        form: GuestRequestForm,
    },
    PlaceToken {
        location: String,
        handle: String,
        form: PlaceTokenForm,
    },
}

/// Answers every callback with a fixed status and records it
pub struct RecordingPeer {
    pub guest_status: u16,
    pub place_status: u16,
    calls: Mutex<Vec<PeerCall>>,
}

impl RecordingPeer {
    pub fn new(guest_status: u16, place_status: u16) -> Self {
        Self {
            guest_status,
            place_status,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<PeerCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerClient for RecordingPeer {
    async fn request_guest(&self, location: &str, form: &GuestRequestForm) -> Result<PeerReply> {
        self.calls.lock().unwrap().push(PeerCall::RequestGuest {
            location: location.to_string(),
            form: form.clone(),
        });
        Ok(PeerReply {
            status: self.guest_status,
            body: String::new(),
        })
    }

    async fn place_token(
        &self,
        location: &str,
        handle: &str,
        form: &PlaceTokenForm,
    ) -> Result<PeerReply> {
        self.calls.lock().unwrap().push(PeerCall::PlaceToken {
            location: location.to_string(),
            handle: handle.to_string(),
            form: form.clone(),
        });
        Ok(PeerReply {
            status: self.place_status,
            body: String::new(),
        })
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub peer: Arc<RecordingPeer>,
    pub guests: GuestService,
}

pub fn harness_with(probe: Arc<dyn Probe>, peer: RecordingPeer) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let peer = Arc::new(peer);
    let dyn_store: Arc<dyn Store> = store.clone();

    let directory = Arc::new(HostDirectory::new(
        dyn_store.clone(),
        HostDiscovery::new(probe, 4114, 5),
    ));
    let guests = GuestService::new(
        dyn_store,
        directory,
        peer.clone(),
        CallbackRunner::new(4, Duration::from_secs(5)),
        GuestConfig {
            api_host: OUR_HOST.to_string(),
            pending_window: Duration::from_secs(30),
        },
    );

    Harness { store, peer, guests }
}

pub fn harness() -> Harness {
    harness_with(Arc::new(SelfProbe), RecordingPeer::new(202, 200))
}

/// Insert a local user and a session for them
pub async fn user_with_session(store: &MemoryStore, handle: &str) -> (UserDoc, UserTokenDoc) {
    let user = UserDoc::new(handle, &format!("{}@{}", handle, OUR_HOST), "unused".into());
    store.insert_user(&user).await.unwrap();
    let session = UserTokenDoc::new(format!("session-{}", handle), user._id);
    store.insert_token(&session).await.unwrap();
    (user, session)
}
