/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `users`: user:{user_id:020} -> User (JSON)
/// - `phones`: phone:{phone} -> user_id (decimal string)
/// - `transactions`: txn:{txn_id:020} -> Transaction (JSON)
/// - `user_transactions`: utxn:{user_id:020}:{txn_id:020} -> empty
/// - `codes`: code:{code} -> RedeemableCode (JSON)
/// - `jobs`: job:{job_id} -> Job (JSON)
/// - `user_jobs`: ujob:{user_id:020}:{job_id} -> empty
///
/// Numeric ids are zero-padded so lexicographic order matches numeric order,
/// and job ids are UUIDv7 so per-user job scans come back in creation order.
use uuid::Uuid;

/// Encode a user key: user:{user_id:020}
pub fn encode_user_key(user_id: u64) -> Vec<u8> {
    format!("user:{:020}", user_id).into_bytes()
}

/// Decode a user key: user:{user_id:020} -> user_id
pub fn decode_user_key(key: &[u8]) -> Option<u64> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("user:")?.parse().ok()
}

/// Encode a phone index key: phone:{phone}
pub fn encode_phone_key(phone: &str) -> Vec<u8> {
    format!("phone:{}", phone).into_bytes()
}

/// Encode a transaction key: txn:{txn_id:020}
pub fn encode_txn_key(txn_id: u64) -> Vec<u8> {
    format!("txn:{:020}", txn_id).into_bytes()
}

/// Decode a transaction key: txn:{txn_id:020} -> txn_id
pub fn decode_txn_key(key: &[u8]) -> Option<u64> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("txn:")?.parse().ok()
}

/// Encode a per-user transaction index key: utxn:{user_id:020}:{txn_id:020}
pub fn encode_user_txn_key(user_id: u64, txn_id: u64) -> Vec<u8> {
    format!("utxn:{:020}:{:020}", user_id, txn_id).into_bytes()
}

/// Encode a per-user transaction prefix for range scan: utxn:{user_id:020}:
pub fn encode_user_txn_prefix(user_id: u64) -> Vec<u8> {
    format!("utxn:{:020}:", user_id).into_bytes()
}

/// Decode a per-user transaction index key -> (user_id, txn_id)
pub fn decode_user_txn_key(key: &[u8]) -> Option<(u64, u64)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (user, txn) = key_str.strip_prefix("utxn:")?.split_once(':')?;
    Some((user.parse().ok()?, txn.parse().ok()?))
}

/// Encode a code key: code:{code}
pub fn encode_code_key(code: &str) -> Vec<u8> {
    format!("code:{}", code).into_bytes()
}

/// Encode a job key: job:{job_id}
pub fn encode_job_key(job_id: &Uuid) -> Vec<u8> {
    format!("job:{}", job_id).into_bytes()
}

/// Encode a per-user job index key: ujob:{user_id:020}:{job_id}
pub fn encode_user_job_key(user_id: u64, job_id: &Uuid) -> Vec<u8> {
    format!("ujob:{:020}:{}", user_id, job_id).into_bytes()
}

/// Encode a per-user job prefix for range scan: ujob:{user_id:020}:
pub fn encode_user_job_prefix(user_id: u64) -> Vec<u8> {
    format!("ujob:{:020}:", user_id).into_bytes()
}

/// Decode a per-user job index key -> (user_id, job_id)
pub fn decode_user_job_key(key: &[u8]) -> Option<(u64, Uuid)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (user, job) = key_str.strip_prefix("ujob:")?.split_once(':')?;
    Some((user.parse().ok()?, job.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_key_encoding() {
        let key = encode_user_key(42);
        assert_eq!(key, b"user:00000000000000000042");
        assert_eq!(decode_user_key(&key), Some(42));
        assert_eq!(decode_user_key(b"phone:123"), None);
    }

    #[test]
    fn test_user_keys_sort_numerically() {
        assert!(encode_user_key(9) < encode_user_key(10));
        assert!(encode_user_key(99) < encode_user_key(100));
        assert!(encode_txn_key(u64::MAX - 1) < encode_txn_key(u64::MAX));
    }

    #[test]
    fn test_txn_key_encoding() {
        let key = encode_txn_key(7);
        assert_eq!(key, b"txn:00000000000000000007");
        assert_eq!(decode_txn_key(&key), Some(7));
    }

    #[test]
    fn test_user_txn_key_encoding() {
        let key = encode_user_txn_key(3, 17);
        assert_eq!(key, b"utxn:00000000000000000003:00000000000000000017");
        assert!(key.starts_with(&encode_user_txn_prefix(3)));
        assert!(!key.starts_with(&encode_user_txn_prefix(31)));
        assert_eq!(decode_user_txn_key(&key), Some((3, 17)));
    }

    #[test]
    fn test_user_job_key_encoding() {
        let job_id = Uuid::now_v7();
        let key = encode_user_job_key(5, &job_id);
        assert!(key.starts_with(&encode_user_job_prefix(5)));
        assert_eq!(decode_user_job_key(&key), Some((5, job_id)));
    }

    #[test]
    fn test_code_and_phone_keys() {
        assert_eq!(encode_code_key("ABC123"), b"code:ABC123");
        assert_eq!(encode_phone_key("13800000000"), b"phone:13800000000");
    }
}
