//! Generated identifiers.
//!
//! Each id wraps a random v4 UUID and displays with a short type prefix so
//! logs and ledger payloads stay readable.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! uuid_id_type {
    ($name:ident, $prefix:literal, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Return the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0.simple())
            }
        }
    };
}

uuid_id_type!(ReservationId, "res", "Identifier of a reservation record.");
uuid_id_type!(RequestId, "req", "Identifier of a traveler's open request.");
uuid_id_type!(TxId, "tx", "Identifier of a ledger transaction.");
