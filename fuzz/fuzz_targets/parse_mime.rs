#![no_main]

use libfuzzer_sys::fuzz_target;
use sudo_email::{MimeCodec, Rfc822Codec};

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = MimeCodec.decode(data) {
        if let Ok(encoded) = MimeCodec.encode(&message) {
            let _ = MimeCodec.decode(&encoded);
        }
    }
});
