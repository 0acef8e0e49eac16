//! Shared utility functions.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::{Error, Result};

/// Await `fut`, bounded by `duration` when one is given.
pub async fn with_timeout<F, T>(duration: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    match duration {
        Some(limit) => timeout(limit, fut).await.map_err(|_| Error::Timeout(limit)),
        None => Ok(fut.await),
    }
}

/// Milliseconds elapsed since `start`, saturating at `u64::MAX`.
pub fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Declare a UUID v4 newtype id.
///
/// The id serializes as the bare UUID, displays in full, parses back with
/// `FromStr`, and offers `short()` for log lines.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Create a new unique identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Return first 8 characters of the UUID for display.
            pub fn short(&self) -> String {
                self.0.to_string()[..8].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }
        }
    };
}

pub(crate) use uuid_id;
