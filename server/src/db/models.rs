//! Database row types for all tables.
//! These correspond 1:1 to the SQLite schema defined in migrations.rs.
use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

/// Implements the closed string enum plumbing for a status column.
macro_rules! status_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

status_enum!(SaleStatus {
    Pending => "pending",
    Tracked => "tracked",
    Success => "success",
    Invalid => "invalid",
    Disabled => "disabled",
});

impl SaleStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SaleStatus::Success | SaleStatus::Invalid | SaleStatus::Disabled)
    }
}

status_enum!(PaymentStatus {
    Pending => "pending",
    Success => "success",
    Failed => "failed",
    Invalid => "invalid",
    Disabled => "disabled",
});

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

status_enum!(ListingStatus {
    Pending => "pending",
    Posted => "posted",
    Deleted => "deleted",
});

/// Private metadata for an uploaded file (the symmetric key store)
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub file_id: String,
    pub owner_id: String,
    /// Keccak-256 of the stored bytes, lowercase hex
    pub file_hash: String,
    /// Seller's AES key when the stored bytes are client-side encrypted
    pub aes_key: Option<Vec<u8>>,
    pub encrypted: bool,
    pub size: i64,
    pub created_at: String,
}

/// A seller's registration of a for-sale file under a deployment transaction
#[derive(Debug, Clone)]
pub struct SaleRecord {
    pub contract_id: i64,
    pub tx_hash: String,
    pub post_id: i64,
    pub file_id: Option<String>,
    /// Declared seller until confirmed, on-chain seller afterwards
    pub seller_address: Option<String>,
    pub contract_address: Option<String>,
    pub status: SaleStatus,
    pub created_at: String,
}

/// A buyer's claimed payment transaction
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub payment_id: i64,
    pub tx_hash: String,
    pub requester: String,
    pub buyer_address: Option<String>,
    pub contract_address: Option<String>,
    /// Raw uint256 event word, `0x`-prefixed hex
    pub price: Option<String>,
    pub status: PaymentStatus,
    pub created_at: String,
}
