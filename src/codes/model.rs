use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Single-use code exchanged for a fixed point credit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemableCode {
    pub code: String,
    pub points_value: i64,
    pub used: bool,
    pub used_by: Option<u64>,
    pub used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RedeemableCode {
    pub fn new(code: impl Into<String>, points_value: i64, expires_at: DateTime<Utc>) -> Self {
        Self {
            code: code.into(),
            points_value,
            used: false,
            used_by: None,
            used_at: None,
            expires_at,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Flip the code to used. Returns false if it already was; the first
    /// redeemer stays recorded.
    pub fn mark_used(&mut self, user_id: u64, now: DateTime<Utc>) -> bool {
        if self.used {
            return false;
        }
        self.used = true;
        self.used_by = Some(user_id);
        self.used_at = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_mark_used_is_one_way() {
        let now = Utc::now();
        let mut code = RedeemableCode::new("ABC123", 50, now + Duration::days(1));

        assert!(code.mark_used(7, now));
        assert!(!code.mark_used(8, now));
        assert_eq!(code.used_by, Some(7));
        assert!(code.used);
    }

    #[test]
    fn test_expiry_is_strict() {
        let now = Utc::now();
        let code = RedeemableCode::new("ABC123", 50, now);
        assert!(!code.is_expired(now));
        assert!(code.is_expired(now + Duration::seconds(1)));
    }
}
