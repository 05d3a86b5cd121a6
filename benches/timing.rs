use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use sudo_email::email_crypto::{DefaultEmailCryptoService, EmailAddressPublicInfo, EmailCryptoService};
use sudo_email::sealing::{DefaultSealingService, SealingService};
use sudo_keymanager::{DefaultKeyManager, InMemoryKeyStorage, KeyId, KeyManager, NoopAuditSink};

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};

fn time_it<F: FnMut()>(label: &str, iters: usize, mut f: F) {
    // warmup
    for _ in 0..(iters / 10).max(10) {
        f();
    }

    let start = Instant::now();
    for _ in 0..iters {
        f();
    }
    let elapsed = start.elapsed();

    let per_iter = elapsed / (iters as u32);
    println!("{:<20} total={:?}  per_iter={:?}", label, elapsed, per_iter);
}

fn main() {
    let km: Arc<dyn KeyManager> = Arc::new(DefaultKeyManager::new(
        Arc::new(InMemoryKeyStorage::new()),
        Arc::new(NoopAuditSink),
    ));
    let symmetric = KeyId::new("bench-symmetric");
    km.generate_symmetric_key(&symmetric).unwrap();

    let recipients: Vec<EmailAddressPublicInfo> = (0..3)
        .map(|i| {
            let id = KeyId::new(format!("bench-pair-{}", i));
            km.generate_key_pair(&id).unwrap();
            EmailAddressPublicInfo {
                email_address: format!("user{}@sudo.com", i),
                key_id: id.as_str().to_string(),
                public_key: B64.encode(km.public_key(&id).unwrap().unwrap()),
            }
        })
        .collect();

    let sealing = DefaultSealingService::new(km.clone());
    let crypto = DefaultEmailCryptoService::new(km.clone());

    let attribute = b"Quarterly report".to_vec();
    let message = vec![0x42u8; 64 * 1024];

    let sealed = sealing.seal(&symmetric, &attribute).unwrap();
    let mut sealed_tampered = sealed.clone();
    let last = sealed_tampered.len() - 1;
    sealed_tampered[last] ^= 0x01;
    let package = crypto.encrypt(&message, &recipients).unwrap();

    let iters = 5_000;

    time_it("seal", iters, || {
        black_box(sealing.seal(&symmetric, black_box(&attribute)).unwrap());
    });

    time_it("unseal", iters, || {
        black_box(sealing.unseal(&symmetric, black_box(&sealed)).unwrap());
    });

    time_it("unseal_tampered", iters, || {
        black_box(sealing.unseal(&symmetric, black_box(&sealed_tampered)).err());
    });

    time_it("unseal_short", iters, || {
        black_box(sealing.unseal(&symmetric, black_box(b"short")).err());
    });

    let iters = 500;

    time_it("e2ee_encrypt_3rcpt", iters, || {
        black_box(crypto.encrypt(black_box(&message), &recipients).unwrap());
    });

    time_it("e2ee_decrypt", iters, || {
        black_box(crypto.decrypt(black_box(&package)).unwrap());
    });

    println!("\nDone.");
}
