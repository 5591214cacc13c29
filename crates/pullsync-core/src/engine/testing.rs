//! In-memory remote store and HTTP fixture for engine tests

use crate::remote::{RemoteError, RemoteStore};
use async_trait::async_trait;
use pullsync_types::{RemoteEntry, RemoteId, ROOT_ID};
use reqwest::StatusCode;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Node {
    entry: RemoteEntry,
    parent: RemoteId,
}

/// Remote tree kept in memory; file contents are served by a mock server
pub struct MemoryStore {
    base_url: Url,
    nodes: Mutex<BTreeMap<RemoteId, Node>>,
    deleted: Mutex<Vec<RemoteId>>,
    failing_lists: Mutex<HashSet<RemoteId>>,
    failing_deletes: Mutex<HashSet<RemoteId>>,
    list_calls: AtomicUsize,
    url_calls: AtomicUsize,
    /// Files between URL resolution and remote deletion
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStore {
    fn new(base_url: Url) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            ROOT_ID,
            Node {
                entry: RemoteEntry::folder(ROOT_ID, "Your Files"),
                parent: ROOT_ID,
            },
        );
        Self {
            base_url,
            nodes: Mutex::new(nodes),
            deleted: Mutex::new(Vec::new()),
            failing_lists: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            list_calls: AtomicUsize::new(0),
            url_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, parent: RemoteId, entry: RemoteEntry) {
        self.nodes
            .lock()
            .unwrap()
            .insert(entry.id, Node { entry, parent });
    }

    pub fn fail_list(&self, id: RemoteId) {
        self.failing_lists.lock().unwrap().insert(id);
    }

    pub fn fail_delete(&self, id: RemoteId) {
        self.failing_deletes.lock().unwrap().insert(id);
    }

    pub fn was_deleted(&self, id: RemoteId) -> bool {
        self.deleted.lock().unwrap().contains(&id)
    }

    pub fn deleted(&self) -> Vec<RemoteId> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn exists(&self, id: RemoteId) -> bool {
        self.nodes.lock().unwrap().contains_key(&id)
    }

    pub fn url_calls(&self) -> usize {
        self.url_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn children_of(&self, folder_id: RemoteId) -> Result<Vec<RemoteEntry>, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_lists.lock().unwrap().contains(&folder_id) {
            return Err(RemoteError::Api {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "listing failed".to_string(),
            });
        }
        let nodes = self.nodes.lock().unwrap();
        if !nodes.contains_key(&folder_id) {
            return Err(RemoteError::NotFound(folder_id));
        }
        Ok(nodes
            .values()
            .filter(|n| n.parent == folder_id && n.entry.id != ROOT_ID)
            .map(|n| n.entry.clone())
            .collect())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_root(&self) -> Result<(RemoteEntry, Vec<RemoteEntry>), RemoteError> {
        let children = self.children_of(ROOT_ID)?;
        let root = self.nodes.lock().unwrap()[&ROOT_ID].entry.clone();
        Ok((root, children))
    }

    async fn list(&self, folder_id: RemoteId) -> Result<Vec<RemoteEntry>, RemoteError> {
        self.children_of(folder_id)
    }

    async fn download_url(&self, file_id: RemoteId) -> Result<Url, RemoteError> {
        self.url_calls.fetch_add(1, Ordering::SeqCst);
        if !self.exists(file_id) {
            return Err(RemoteError::NotFound(file_id));
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Ok(self.base_url.join(&format!("files/{}", file_id))?)
    }

    async fn delete(&self, id: RemoteId) -> Result<(), RemoteError> {
        let is_file = {
            let nodes = self.nodes.lock().unwrap();
            nodes.get(&id).map(|n| !n.entry.is_directory)
        };
        if is_file == Some(true) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        if self.failing_deletes.lock().unwrap().contains(&id) {
            return Err(RemoteError::Api {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "delete failed".to_string(),
            });
        }

        let mut nodes = self.nodes.lock().unwrap();
        if nodes.remove(&id).is_none() {
            return Err(RemoteError::NotFound(id));
        }
        // Deleting a folder takes its whole subtree with it
        let mut doomed = vec![id];
        while let Some(parent) = doomed.pop() {
            let children: Vec<_> = nodes
                .values()
                .filter(|n| n.parent == parent && n.entry.id != ROOT_ID)
                .map(|n| n.entry.id)
                .collect();
            for child in children {
                nodes.remove(&child);
                doomed.push(child);
            }
        }
        self.deleted.lock().unwrap().push(id);
        Ok(())
    }
}

/// Mock server plus the store whose download URLs point at it
pub struct Fixture {
    pub server: MockServer,
    pub store: Arc<MemoryStore>,
}

impl Fixture {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = Url::parse(&format!("{}/", server.uri())).unwrap();
        Self {
            store: Arc::new(MemoryStore::new(base_url)),
            server,
        }
    }

    pub fn add_folder(&self, parent: RemoteId, id: RemoteId, name: &str) -> RemoteEntry {
        let entry = RemoteEntry::folder(id, name);
        self.store.insert(parent, entry.clone());
        entry
    }

    pub async fn add_file(
        &self,
        parent: RemoteId,
        id: RemoteId,
        name: &str,
        body: &[u8],
        checksum: Option<&str>,
    ) -> RemoteEntry {
        self.add_slow_file(parent, id, name, body, checksum, Duration::ZERO)
            .await
    }

    pub async fn add_slow_file(
        &self,
        parent: RemoteId,
        id: RemoteId,
        name: &str,
        body: &[u8],
        checksum: Option<&str>,
        delay: Duration,
    ) -> RemoteEntry {
        Mock::given(method("GET"))
            .and(path(format!("/files/{}", id)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(body.to_vec())
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;

        let mut entry = RemoteEntry::file(id, name, body.len() as u64);
        if let Some(checksum) = checksum {
            entry = entry.with_checksum(checksum);
        }
        self.store.insert(parent, entry.clone());
        entry
    }

    pub async fn add_broken_file(
        &self,
        parent: RemoteId,
        id: RemoteId,
        name: &str,
        status: u16,
    ) -> RemoteEntry {
        Mock::given(method("GET"))
            .and(path(format!("/files/{}", id)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;

        let entry = RemoteEntry::file(id, name, 0);
        self.store.insert(parent, entry.clone());
        entry
    }
}
