//! Cache-path resolution, attachment and post-run validation
//!
//! A run has two phases separated by the job's own build steps:
//!
//! 1. **attach**: resolve mode tags and manual paths into
//!    [`CachePathRequest`]s, map each onto the cache volume, attach it at its
//!    mount target and persist the list.
//! 2. **validate**: read the persisted list back and check that the
//!    attachments survived.
//!
//! # Failure policy
//!
//! | Condition | Effect |
//! |-----------|--------|
//! | Cache volume absent | Fatal, before resolution |
//! | Unknown mode / introspection failure | Warn, skip that mode |
//! | Existing content at a custom symlink target | Warn, proceed |
//! | Metadata read or write failure | Warn, proceed |
//! | Privileged filesystem step fails | Fatal, no retry |
//! | Attachment disturbed after the job | Warn, job succeeds |

pub mod attach;
pub mod detect;
pub mod mapper;
pub mod metadata;
pub mod modes;
pub mod privileged;
pub mod request;
pub mod resolver;
pub mod sys;
pub mod usage;
pub mod validate;

pub use attach::{AttachReport, Attacher, Strategy, StrategyChoice};
pub use detect::detect_modes;
pub use mapper::PathMapper;
pub use metadata::MetadataStore;
pub use modes::ModeRegistry;
pub use privileged::{privileged_fs, Elevation};
pub use request::{CachePathRequest, CacheVolume};
pub use resolver::{CacheRequestResolver, Resolution, ResolveInput};
pub use usage::DiskUsage;
pub use validate::{PostValidator, ValidationReport};
