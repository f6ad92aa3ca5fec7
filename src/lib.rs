pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod policy;
pub mod repo;
pub mod slug;

// Re-export commonly used items for tests / external users
pub use config::{build_repo, RepoConfig};
pub use error::{RepoError, RepoResult};
pub use logging::init_tracing;
pub use policy::{Ability, ReplyPolicy, ThreadPolicy};
pub use repo::Repo;
