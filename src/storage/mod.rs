//! Storage backends for sessions, guardians and short-lived security state

pub mod expiring;
pub mod memory;
pub mod token_revocation;
pub mod traits;

pub use expiring::{ExpiringStore, MemoryExpiringStore, SharedExpiringStore};
pub use memory::MemoryStorageProvider;
pub use token_revocation::{RevocationStore, SharedRevocationStore};
pub use traits::{
    CareSubjectStore, GuardianChange, GuardianStore, RefreshTokenRecord, RefreshTokenStore,
    SharedStorage, StorageProvider, UserStore,
};
