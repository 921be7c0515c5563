//! Stable deduplication keys derived from an alert's identity fields.

use sha2::{Digest, Sha256};

use crate::models::alert::{AlertEvent, LABEL_ALERT_NAME, LABEL_INSTANCE, UNKNOWN};

/// The label keys, in fixed order, that define an alert's identity.
const IDENTITY_LABELS: [&str; 4] = [LABEL_ALERT_NAME, LABEL_INSTANCE, "job", "service"];

/// Separator between identity values. A control character, so it cannot
/// collide with label values.
const DELIMITER: u8 = 0x1f;

/// Hex characters kept from the digest.
const FINGERPRINT_LEN: usize = 12;

/// Derives the stable dedup key for an alert.
///
/// Pure and deterministic: two alerts with identical `alertname`, `instance`,
/// `job` and `service` labels produce the same fingerprint regardless of any
/// other label or annotation differences. Missing identity labels contribute
/// the `unknown` sentinel.
pub fn fingerprint(alert: &AlertEvent) -> String {
    let mut hasher = Sha256::new();
    for (i, key) in IDENTITY_LABELS.iter().enumerate() {
        if i > 0 {
            hasher.update([DELIMITER]);
        }
        hasher.update(alert.label(key).unwrap_or(UNKNOWN).as_bytes());
    }

    let digest = hasher.finalize();
    let mut out = String::with_capacity(FINGERPRINT_LEN);
    for byte in digest.iter().take(FINGERPRINT_LEN / 2) {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
