//! Guardian relationships, invitations and permission checks

pub mod evaluator;
pub mod model;
pub mod registry;
pub mod subject;

pub use evaluator::PermissionEvaluator;
pub use model::{CareSubject, Guardian, GuardianRole, GuardianStatus, Permission, PermissionSet};
pub use registry::GuardianRegistry;
pub use subject::CareSubjectService;
