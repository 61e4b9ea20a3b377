mod authority;
mod builder;

pub use authority::{Authority, KeyWeight, LinkAuth, PermissionLevelWeight, UpdateAuth, WaitWeight};
pub use builder::{PermissionNaming, PermissionSetupBuilder};
