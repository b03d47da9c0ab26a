use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 request signing, base64-encoded — the same scheme the cloud
/// drivers used to authenticate outbound calls, reused here for the HTTP
/// `RealtimeManager`/oracle implementations so a real deployment can point
/// them at a signed internal endpoint instead of an open one.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_for_same_input() {
        let a = sign(b"secret", b"payload");
        let b = sign(b"secret", b"payload");
        assert_eq!(a, b);
    }

    #[test]
    fn signature_changes_with_body() {
        let a = sign(b"secret", b"payload-1");
        let b = sign(b"secret", b"payload-2");
        assert_ne!(a, b);
    }
}
