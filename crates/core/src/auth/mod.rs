//! Scoped bearer credentials for the APS services.
//!
//! `TokenSource` talks to the token endpoint; `CredentialProvider` caches one
//! credential per scope set and refreshes it on expiry.

mod aps;
mod provider;
mod traits;
mod types;

pub use aps::ApsTokenClient;
pub use provider::CredentialProvider;
pub use traits::*;
pub use types::*;
