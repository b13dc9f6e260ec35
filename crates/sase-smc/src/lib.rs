//! OpenSASE SMC Client
//!
//! Talks to the Stonesoft Management Center that owns NGFW engine identities,
//! their licenses and their security policies.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     SMC CLIENT                           │
//! │                                                          │
//! │  ┌───────────────────────┐   ┌───────────────────────┐   │
//! │  │ EngineIdentityManager │   │    PolicyApplier      │   │
//! │  │ create / delete /     │   │ get-or-create, upload │   │
//! │  │ force replace         │   │ follow task progress  │   │
//! │  └───────────┬───────────┘   └───────────┬───────────┘   │
//! │              └─────────────┬─────────────┘               │
//! │                            ▼                             │
//! │               ┌─────────────────────────┐                │
//! │               │  ManagementSystem trait │                │
//! │               ├────────────┬────────────┤                │
//! │               │ SmcClient  │  InMemory  │                │
//! │               │   (REST)   │  (tests)   │                │
//! │               └────────────┴────────────┘                │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod policy;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use api::{DynamicEngineSpec, ElementRef, ManagementSystem, TaskProgress};
pub use client::SmcClient;
pub use config::SmcConfig;
pub use engine::{BootstrapToken, Deletion, EngineIdentity, EngineIdentityManager, LicenseState};
pub use error::{IdentityError, PolicyError, SmcError, SmcResult};
pub use policy::{PolicyApplier, PolicyUploadConfig};
