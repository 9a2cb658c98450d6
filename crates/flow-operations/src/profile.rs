//! Customer and eligibility records shared by the loan operations

use serde::{Deserialize, Serialize};

/// Customer data carried in the `customerProfile` variable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerProfile {
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub contact_number: Option<String>,
    pub customer_address: Option<String>,
    pub pan_number: Option<String>,
    pub aadhar_number: Option<String>,
    pub monthly_income: Option<u64>,
    pub account_balance: Option<u64>,
}

impl CustomerProfile {
    /// Mock profile with balance and income derived from the id
    ///
    /// The same id always yields the same numbers.
    pub fn mock(customer_id: &str) -> Self {
        let hash = u64::from(id_hash(customer_id).unsigned_abs());
        Self {
            customer_id: customer_id.to_string(),
            customer_name: Some("John Doe".to_string()),
            contact_number: Some("9876543210".to_string()),
            customer_address: Some("123 Main Street, City, Zip".to_string()),
            pan_number: Some("AAAAA1234A".to_string()),
            aadhar_number: Some("123456789012".to_string()),
            monthly_income: Some(hash % 200_000 + 30_000),
            account_balance: Some(hash % 500_000 + 10_000),
        }
    }

    /// Whether both identity documents are on file
    pub fn has_kyc(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.pan_number) && present(&self.aadhar_number)
    }
}

/// 31-multiplier rolling hash over UTF-16 code units
fn id_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(i32::from(c)))
}

/// Product tier derived from the account balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    pub fn for_balance(balance: u64) -> Self {
        if balance >= 50_000 {
            Self::Platinum
        } else if balance >= 30_000 {
            Self::Gold
        } else {
            Self::Silver
        }
    }

    /// Highest amount the tier is eligible for
    pub fn limit(&self) -> f64 {
        match self {
            Self::Silver => 10_000.0,
            Self::Gold => 30_000.0,
            Self::Platinum => 50_000.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Silver => "SILVER",
            Self::Gold => "GOLD",
            Self::Platinum => "PLATINUM",
        }
    }
}

/// Outcome of an eligibility check, stored as `eligibilityResult`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResult {
    pub approved: bool,
    pub amount: f64,
    pub reason_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
}

impl EligibilityResult {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            amount: 0.0,
            reason_code: reason.into(),
            tier: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_is_deterministic() {
        let a = CustomerProfile::mock("C-100");
        let b = CustomerProfile::mock("C-100");
        assert_eq!(a, b);
        assert!(a.has_kyc());

        let balance = a.account_balance.unwrap();
        assert!((10_000..510_000).contains(&balance));
        let income = a.monthly_income.unwrap();
        assert!((30_000..230_000).contains(&income));
    }

    #[test]
    fn test_id_hash() {
        assert_eq!(id_hash(""), 0);
        assert_eq!(id_hash("a"), 97);
        assert_eq!(id_hash("ab"), 97 * 31 + 98);
    }

    #[test]
    fn test_tiers() {
        assert_eq!(Tier::for_balance(10_000), Tier::Silver);
        assert_eq!(Tier::for_balance(30_000), Tier::Gold);
        assert_eq!(Tier::for_balance(50_000), Tier::Platinum);
        assert_eq!(Tier::Gold.limit(), 30_000.0);
    }

    #[test]
    fn test_profile_serializes_camel_case() {
        let json = serde_json::to_value(CustomerProfile::mock("C1")).unwrap();
        assert_eq!(json["customerId"], "C1");
        assert!(json["accountBalance"].is_u64());
    }
}
