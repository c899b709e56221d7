//! The purpose of this module is to alleviate the need to import many of the
//! `[crosspost]` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use crosspost::prelude::*;
//! ```
pub use crate::cooldown::CooldownRange;
pub use crate::fetch::FetchRequest;
pub use crate::job::{Job, JobId, JobKind, JobStatus};
pub use crate::progress::ProgressSnapshot;
pub use crate::pruner::Pruner;
pub use crate::pruner::PrunerConfig;
pub use crate::upload::UploadRequest;
pub use crate::{Config, Crosspost, CrosspostBuilder, EnqueueError};
