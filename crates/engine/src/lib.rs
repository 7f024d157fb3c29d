//! # Tapestry Engine
//!
//! The Tapestry engine turns an abstract capability reference ("install a
//! database", "run a backup") into one concrete, executable workflow for a
//! generic downstream step-runner. It recursively resolves the capability
//! into fulfiller step-graphs, inlines them collision-free, evaluates
//! conditional guard steps against already-bound inputs, injects
//! prerequisite data instances, and tracks the lineage of every data
//! object the run will produce.
//!
//! The engine executes nothing and persists nothing: fulfiller selection
//! belongs to the [`PolicyResolver`], manifests to the
//! [`ManifestRepository`], and data movement to the
//! [`DataInstanceGateway`]. Those three are consumed as read-only oracles
//! during composition.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tapestry_engine::{Composer, Config, RenderRequest};
//! use tapestry_types::CapabilityRef;
//! use tokio_util::sync::CancellationToken;
//!
//! let composer = Composer::new(Config::default(), &repository, &policy, &gateway);
//! let request = RenderRequest::new(CapabilityRef::new("cap.db.postgresql.install"));
//! let output = composer.render(&CancellationToken::new(), request)?;
//! println!("{} templates", output.workflow.templates.len());
//! ```
//!
//! ## Architecture
//!
//! - [`compose`]: the render pipeline and recursive inlining core
//! - [`guard`]: the closed guard-expression interpreter
//! - [`namespace`]: prefixing and reference rewriting for inlined graphs
//! - [`lineage`]: the produced-instance tracker behind the upload payload
//! - [`collaborators`]: the three external collaborator contracts
//! - [`error`]: the fatal, non-retried error taxonomy

pub mod collaborators;
pub mod compose;
pub mod error;
pub mod guard;
pub mod lineage;
pub mod namespace;

pub use collaborators::{
    DataInstanceGateway, DownloadSpec, ManifestRepository, MatchedRule, PolicyResolver, StepFragment, UpdateSpec,
};
pub use compose::{Composer, Config, RenderOutput, RenderRequest};
pub use error::RenderError;
pub use guard::{Evaluation, GuardError};
pub use lineage::{InstanceHandle, OutputInstanceTracker};
