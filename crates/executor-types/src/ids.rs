//! Fixed-width identifiers used throughout the coordinator (spec §3).
//!
//! All identifiers are opaque 32-byte values except [`Signature`], which is
//! 64 bytes. They carry no semantics of their own beyond equality, ordering
//! (for use as map keys) and hex display.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! fixed_bytes_id {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{})", stringify!($name), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }
    };
}

fixed_bytes_id!(ContractKey, 32);
fixed_bytes_id!(DriveKey, 32);
fixed_bytes_id!(ExecutorKey, 32);
fixed_bytes_id!(CallerKey, 32);
fixed_bytes_id!(CallId, 32);
fixed_bytes_id!(BlockHash, 32);
fixed_bytes_id!(TransactionHash, 32);
fixed_bytes_id!(StorageHash, 32);
fixed_bytes_id!(Signature, 64);
