//! Shared fakes for integration tests: a scripted GraphQL transport and an
//! object store that records uploads and can be told to fail deletes.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use parking_lot::Mutex;
use serde_json::{json, Value};

use sudo_email::email_crypto::EmailAddressPublicInfo;
use sudo_email::object_store::{ObjectMetadata, ObjectSummary, StorageResult};
use sudo_email::sudo_keymanager::{
    DefaultKeyManager, InMemoryKeyStorage, KeyId, KeyKind, KeyManager, KeyManagerError, KeyRecord, KeyStorage,
    NoopAuditSink,
};
use sudo_email::{
    DefaultSealingService, EmailAddress, EmailAttachment, EmailClient, EmailConfig, GraphqlTransport,
    InMemoryObjectStore, MimeCodec, ObjectStore, Rfc822Codec, SimplifiedEmailMessage, StorageError, TransportError,
};

pub const OWNER: &str = "owner-1";
pub const ADDRESS_ID: &str = "addr-1";
pub const HOSTED_DOMAIN: &str = "sudo.com";

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Transport answering each operation from a script and logging every call.
#[derive(Default)]
pub struct FakeTransport {
    once: Mutex<HashMap<String, VecDeque<Result<Value, TransportError>>>>,
    always: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every call to `operation` with `data` (may be `null`).
    pub fn respond(&self, operation: &str, data: Value) {
        self.always.lock().insert(operation.to_string(), data);
    }

    /// Answer the next call to `operation` with `result`; takes priority over [`respond`](Self::respond).
    pub fn respond_once(&self, operation: &str, result: Result<Value, TransportError>) {
        self.once
            .lock()
            .entry(operation.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(op, _)| op == operation)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn answer(&self, operation: &str, variables: Value) -> Result<Value, TransportError> {
        self.calls.lock().push((operation.to_string(), variables));
        if let Some(result) = self.once.lock().get_mut(operation).and_then(|q| q.pop_front()) {
            return result.map(|data| json!({ operation: data }));
        }
        match self.always.lock().get(operation) {
            Some(data) => Ok(json!({ operation: data.clone() })),
            None => Err(TransportError::Other(format!("no response scripted for {}", operation))),
        }
    }
}

#[async_trait]
impl GraphqlTransport for FakeTransport {
    async fn query(&self, operation: &str, variables: Value) -> Result<Value, TransportError> {
        self.answer(operation, variables)
    }

    async fn mutate(&self, operation: &str, variables: Value) -> Result<Value, TransportError> {
        self.answer(operation, variables)
    }
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

/// In-memory store that records uploads and fails deletes on request.
#[derive(Default)]
pub struct RecordingStore {
    inner: InMemoryObjectStore,
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
    failing_deletes: Mutex<HashMap<String, String>>,
    fail_every_delete: Mutex<Option<String>>,
    cancel_deletes: Mutex<bool>,
    deletes: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_delete(&self, key: &str, message: &str) {
        self.failing_deletes.lock().insert(key.to_string(), message.to_string());
    }

    pub fn fail_every_delete(&self, message: &str) {
        *self.fail_every_delete.lock() = Some(message.to_string());
    }

    pub fn cancel_deletes(&self) {
        *self.cancel_deletes.lock() = true;
    }

    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.uploads.lock().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn upload(&self, data: Vec<u8>, key: &str, metadata: Option<ObjectMetadata>) -> StorageResult<String> {
        self.uploads.lock().push((key.to_string(), data.clone()));
        self.inner.upload(data, key, metadata).await
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.inner.download(key).await
    }

    async fn get_object_metadata(&self, key: &str) -> StorageResult<ObjectMetadata> {
        self.inner.get_object_metadata(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.deletes.lock().push(key.to_string());
        if *self.cancel_deletes.lock() {
            return Err(StorageError::Cancelled);
        }
        if let Some(message) = self.fail_every_delete.lock().clone() {
            return Err(StorageError::Other(message));
        }
        if let Some(message) = self.failing_deletes.lock().get(key) {
            return Err(StorageError::Other(message.clone()));
        }
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectSummary>> {
        self.inner.list(prefix).await
    }
}

// ---------------------------------------------------------------------------
// Key storage
// ---------------------------------------------------------------------------

/// In-memory key storage whose reads can be switched to fail.
#[derive(Default)]
pub struct FlakyKeyStorage {
    inner: InMemoryKeyStorage,
    failing: Mutex<bool>,
}

impl FlakyKeyStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_reads(&self) {
        *self.failing.lock() = true;
    }

    fn check(&self) -> Result<(), KeyManagerError> {
        if *self.failing.lock() {
            return Err(KeyManagerError::Storage("key store unavailable".into()));
        }
        Ok(())
    }
}

impl KeyStorage for FlakyKeyStorage {
    fn get(&self, id: &KeyId) -> Result<Option<KeyRecord>, KeyManagerError> {
        self.check()?;
        self.inner.get(id)
    }

    fn put(&self, record: &KeyRecord) -> Result<(), KeyManagerError> {
        self.inner.put(record)
    }

    fn delete(&self, id: &KeyId) -> Result<bool, KeyManagerError> {
        self.inner.delete(id)
    }

    fn list(&self) -> Result<Vec<KeyRecord>, KeyManagerError> {
        self.check()?;
        self.inner.list()
    }

    fn clear(&self) -> Result<(), KeyManagerError> {
        self.inner.clear()
    }

    fn list_by_kind(&self, kind: KeyKind) -> Result<Vec<KeyRecord>, KeyManagerError> {
        self.check()?;
        self.inner.list_by_kind(kind)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub store: Arc<RecordingStore>,
    pub keys: Arc<dyn KeyManager>,
    pub client: EmailClient,
}

impl Harness {
    /// Client over fresh fakes with default remote configuration, `sudo.com`
    /// as the only hosted domain and `addr-1` as an existing address.
    pub fn new() -> Self {
        Self::with_config(EmailConfig::default())
    }

    pub fn with_config(config: EmailConfig) -> Self {
        Self::with_key_storage(config, Arc::new(InMemoryKeyStorage::new()))
    }

    pub fn with_key_storage(config: EmailConfig, key_storage: Arc<dyn KeyStorage>) -> Self {
        let transport = FakeTransport::new();
        let store = RecordingStore::new();
        let keys: Arc<dyn KeyManager> = Arc::new(DefaultKeyManager::new(key_storage, Arc::new(NoopAuditSink)));
        transport.respond("getEmailConfig", serde_json::to_value(&config).unwrap());
        transport.respond("getConfiguredEmailDomains", json!({ "domains": [HOSTED_DOMAIN] }));
        transport.respond("getEmailAddress", json!({ "id": ADDRESS_ID }));
        transport.respond("lookupEmailAddressesPublicInfo", json!({ "items": [] }));

        let client = EmailClient::builder(transport.clone(), store.clone(), OWNER)
            .key_manager(keys.clone())
            .build()
            .unwrap();
        Self {
            transport,
            store,
            keys,
            client,
        }
    }

    /// Generate a key pair per address and publish them all in the directory.
    pub fn publish_keys(&self, addresses: &[&str]) {
        let items: Vec<EmailAddressPublicInfo> = addresses
            .iter()
            .enumerate()
            .map(|(i, address)| {
                let id = KeyId::new(format!("pair-{}-{}", i, address));
                self.keys.generate_key_pair(&id).unwrap();
                EmailAddressPublicInfo {
                    email_address: address.to_string(),
                    key_id: id.as_str().to_string(),
                    public_key: B64.encode(self.keys.public_key(&id).unwrap().unwrap()),
                }
            })
            .collect();
        self.transport
            .respond("lookupEmailAddressesPublicInfo", json!({ "items": items }));
    }

    /// A sealing service over the client's key manager, for building sealed fixtures.
    pub fn sealing(&self) -> DefaultSealingService {
        DefaultSealingService::new(self.keys.clone())
    }

    pub fn current_key(&self) -> KeyId {
        self.client.symmetric_keys().current_or_generate().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

pub fn message(from: &str, to: &[&str]) -> SimplifiedEmailMessage {
    SimplifiedEmailMessage {
        from: vec![EmailAddress::parse(from).unwrap()],
        to: to.iter().map(|a| EmailAddress::parse(a).unwrap()).collect(),
        subject: Some("Quarterly report".into()),
        body: "Numbers attached.".into(),
        ..Default::default()
    }
}

pub fn rfc822(from: &str, to: &[&str]) -> Vec<u8> {
    MimeCodec.encode(&message(from, to)).unwrap()
}

/// A message carrying a key exchange attachment but no body attachment.
pub fn malformed_secure_message() -> Vec<u8> {
    let mut m = message("me@sudo.com", &["you@sudo.com"]);
    m.attachments = vec![EmailAttachment::key_exchange(b"{}".to_vec())];
    MimeCodec.encode(&m).unwrap()
}

pub fn ids(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}
