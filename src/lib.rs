//! # cloudbase-manager – CloudBase control-plane client
//!
//! Issues signed administrative calls to the platform services that
//! manage environments, serverless functions, object storage, static
//! hosting and database collections.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  CloudBase  (manager.rs)                         │
//! │  ├── EnvironmentManager                          │
//! │  └── per-environment bundle of:                  │
//! │       EnvService · FunctionService               │
//! │       StorageService · HostingService            │
//! │       DatabaseService · CommonService            │
//! ├──────────────────────────────────────────────────┤
//! │  CloudApiClient  (client.rs)                     │
//! │  ├── credential resolution (config.rs)           │
//! │  ├── null stripping · envelope parsing           │
//! │  └── unified CloudBaseError (error.rs)           │
//! ├──────────────────────────────────────────────────┤
//! │  Tc3Signer  (signing.rs)                         │
//! │  └── hmac-sha256 / canonical request / signing   │
//! ├──────────────────────────────────────────────────┤
//! │  ParallelRunner  (parallel.rs)                   │
//! │  └── bounded-concurrency batch execution         │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! Every outbound call is signed with TC3-HMAC-SHA256 over a canonical
//! request; failures of any layer surface as one [`CloudBaseError`].
//! Batch storage/hosting operations run through [`ParallelRunner`] with
//! a hard concurrency ceiling and positional results.
//!
//! ## Example
//!
//! ```no_run
//! use cloudbase_manager::{CloudBase, ManagerConfig};
//!
//! # async fn run() -> Result<(), cloudbase_manager::CloudBaseError> {
//! let manager = CloudBase::new(ManagerConfig {
//!     secret_id: Some("AKID...".into()),
//!     secret_key: Some("...".into()),
//!     env_id: Some("my-env-1a2b3c".into()),
//!     ..Default::default()
//! })?;
//!
//! let envs = manager.env()?.list_envs().await?;
//! for env in envs.env_list {
//!     println!("{} ({:?})", env.env_id, env.status);
//! }
//! # Ok(())
//! # }
//! ```

// ── Sub-modules ─────────────────────────────────────────────────────────

pub mod error;
pub mod config;
pub mod signing;
pub mod client;
pub mod parallel;

// Service clients
pub mod cam;
pub mod billing;
pub mod env;
pub mod function;
pub mod storage;
pub mod hosting;
pub mod database;
pub mod common;

// Environment bundle + manager
pub mod environment;
pub mod manager;

// ── Re-exports for ergonomic access ─────────────────────────────────────

pub use client::{CloudApiClient, ResponseInfo};
pub use config::{CloudBaseContext, Credentials, ManagerConfig};
pub use environment::{AuthConfig, EnvConfigCache, Environment};
pub use error::{CloudBaseError, CloudBaseResult, ErrorKind};
pub use manager::{CloudBase, EnvironmentManager};
pub use parallel::{task, AsyncTask, ParallelRunner};

pub use billing::BillingService;
pub use cam::CamService;
pub use common::CommonService;
pub use database::DatabaseService;
pub use env::{CreateEnvParam, EnvInfo, EnvService, PaymentMode};
pub use function::{
    CloudFunction, CreateFunctionOutcome, CreateFunctionParam, FunctionCode, FunctionService,
    FunctionTrigger,
};
pub use hosting::{HostingInfo, HostingService};
pub use storage::{StorageService, TempUrlInfo, UploadFile, UploadMetadata};
