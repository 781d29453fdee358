//! Shared fixtures: a scripted list client and temp snapshot directories.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use didlist::clock::ManualClock;
use didlist::engine::Lister;
use didlist::error::{Error, Result};
use didlist::model::Did;
use didlist::queue::QueueConfig;
use didlist::remote::{Created, ListClient, MembershipPage, SubmitError};
use didlist::storage::SnapshotStore;

pub const T0: i64 = 1_700_000_000;

pub fn did(s: &str) -> Did {
    Did::parse(s).expect("valid test did")
}

/// Fresh directory under the system temp dir.
pub fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir()
        .join("didlist-test")
        .join(uuid::Uuid::new_v4().to_string());
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// List client driven by a script. Submissions without a scripted
/// response succeed.
#[derive(Default)]
pub struct FakeListClient {
    pages: Vec<Vec<Did>>,
    responses: Mutex<VecDeque<std::result::Result<Created, SubmitError>>>,
    submitted: Mutex<Vec<Did>>,
    fail_auth: bool,
    gate: Option<Arc<Notify>>,
    auth_calls: AtomicUsize,
    page_calls: AtomicUsize,
}

impl FakeListClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote membership, one inner vec per page.
    pub fn with_pages(mut self, pages: Vec<Vec<Did>>) -> Self {
        self.pages = pages;
        self
    }

    pub fn failing_auth(mut self) -> Self {
        self.fail_auth = true;
        self
    }

    /// Hold every submission until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn script(&self, response: std::result::Result<Created, SubmitError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn submitted(&self) -> Vec<Did> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListClient for FakeListClient {
    async fn authenticate(&self) -> Result<()> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_auth {
            return Err(Error::Auth("bad password".to_string()));
        }
        Ok(())
    }

    async fn create_list_entry(
        &self,
        _list: &str,
        subject: &Did,
    ) -> std::result::Result<Created, SubmitError> {
        self.submitted.lock().unwrap().push(subject.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Created::default()))
    }

    async fn fetch_list_membership(
        &self,
        _list: &str,
        cursor: Option<&str>,
    ) -> Result<MembershipPage> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let index: usize = match cursor {
            Some(c) => c.parse().map_err(|_| Error::Other(format!("bad cursor {c}")))?,
            None => 0,
        };
        let items = self.pages.get(index).cloned().unwrap_or_default();
        let cursor = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
        Ok(MembershipPage { items, cursor })
    }
}

pub struct Harness {
    pub lister: Lister,
    pub client: Arc<FakeListClient>,
    pub clock: Arc<ManualClock>,
    pub dir: PathBuf,
}

impl Harness {
    pub fn pending_path(&self) -> PathBuf {
        self.dir.join("pending.txt")
    }

    pub fn added_path(&self) -> PathBuf {
        self.dir.join("added.txt")
    }
}

pub fn harness(client: FakeListClient) -> Harness {
    harness_in(temp_dir(), client, QueueConfig::default())
}

pub fn harness_in(dir: PathBuf, client: FakeListClient, config: QueueConfig) -> Harness {
    let client = Arc::new(client);
    let clock = Arc::new(ManualClock::at_epoch(T0));
    let lister = Lister::new(
        client.clone(),
        SnapshotStore::new(dir.join("pending.txt"), dir.join("added.txt")),
        clock.clone(),
        "at://did:plc:owner/app.bsky.graph.list/test",
        config,
    );
    Harness {
        lister,
        client,
        clock,
        dir,
    }
}
