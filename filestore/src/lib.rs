// Network filestore client layer: SMB, SFTP and iRODS access behind one contract

pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod export_plan;
pub mod factory;
pub mod models;
pub mod paths;
pub mod process;
pub mod resource;
pub mod telemetry;
pub mod tree;

pub use auth::{AuthenticationStrategy, LoginRequest, PasswordAuthStrategy, PublicKeyAuthStrategy};
pub use client::{RemoteClient, RemoteDownload};
pub use errors::{ErrorKind, FilestoreError};
pub use export_plan::ExportPlan;
pub use factory::ClientFactory;
pub use models::{Credentials, FilestoreConfig, FilestoreKind, Target};
pub use resource::ResourceDetails;
pub use tree::{TreeNode, TreeOrder};
