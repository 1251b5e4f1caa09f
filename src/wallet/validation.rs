//! Input validation for wallet provisioning
//!
//! Addresses are opaque, case-sensitive strings. The only rules enforced are
//! the ones the `wallets.address` column itself imposes.

use std::fmt;

/// Column width of `wallets.address`
pub const MAX_ADDRESS_LEN: usize = 42;

// ============================================================================
// Validation Errors
// ============================================================================

/// Validation errors for wallet provisioning input
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid format for {field}: '{value}' (expected: {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

// ============================================================================
// WalletAddress - Validated Address (Private Field)
// ============================================================================

/// Validated wallet address
///
/// Only used on the provisioning path. The transfer path looks addresses up
/// verbatim, so an address that could never have been created simply does
/// not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Create a new validated WalletAddress
    ///
    /// # Validation Rules
    /// - Length: 1-42 characters (not bytes)
    /// - No leading or trailing whitespace (addresses match exactly)
    ///
    /// # Examples
    /// ```
    /// use wallet_transfer::wallet::validation::WalletAddress;
    ///
    /// let addr = WalletAddress::new("0x0000000000000000000000000000000000000001").unwrap();
    /// assert_eq!(addr.as_str(), "0x0000000000000000000000000000000000000001");
    ///
    /// assert!(WalletAddress::new("").is_err());
    /// assert!(WalletAddress::new(" 0xabc").is_err());
    /// ```
    pub fn new(address: &str) -> Result<Self, ValidationError> {
        // VARCHAR(n) counts characters, not bytes
        let len = address.chars().count();
        if len == 0 || len > MAX_ADDRESS_LEN {
            return Err(ValidationError::InvalidLength {
                field: "address",
                min: 1,
                max: MAX_ADDRESS_LEN,
                actual: len,
            });
        }

        if address.trim() != address {
            return Err(ValidationError::InvalidFormat {
                field: "address",
                value: address.to_string(),
                expected: "no surrounding whitespace",
            });
        }

        Ok(Self(address.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for WalletAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
