#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;
use sudo_email::sudo_keymanager::{DefaultKeyManager, InMemoryKeyStorage, KeyId, KeyManager, NoopAuditSink};
use sudo_email::{DefaultSealingService, SealingService};

static SEALING: Lazy<(DefaultSealingService, KeyId)> = Lazy::new(|| {
    let km: Arc<dyn KeyManager> = Arc::new(DefaultKeyManager::new(
        Arc::new(InMemoryKeyStorage::new()),
        Arc::new(NoopAuditSink),
    ));
    let id = KeyId::new("fuzz");
    km.generate_symmetric_key(&id).expect("generate key");
    (DefaultSealingService::new(km), id)
});

fuzz_target!(|data: &[u8]| {
    let (service, key_id) = &*SEALING;
    let _ = service.unseal(key_id, data);
});
