//! Authentication: tokens, sessions and credential checks

pub mod cleanup;
pub mod coordinator;
pub mod provider;
pub mod token;
pub mod user;
pub mod verification;

// Re-export main components
pub use cleanup::TokenCleanupService;
pub use coordinator::{AuthenticationCoordinator, LoginRequest, LogoutRequest, TokenBundle};
pub use provider::{Argon2CredentialVerifier, CredentialVerifier};
pub use token::{Claims, TokenIssuer, TokenKind};
pub use user::{User, UserIdentity, UserSummary};
pub use verification::VerificationService;
