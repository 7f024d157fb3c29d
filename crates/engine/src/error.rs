//! Error taxonomy for the composition engine.
//!
//! Every error is fatal to the render that raised it: no partial workflow
//! is ever returned and nothing is retried at this layer. Collaborator
//! failures propagate unchanged, annotated with the step being processed
//! when they occurred.

use tapestry_types::{ActionRefError, CapabilityRef};
use thiserror::Error;

use crate::guard::GuardError;

/// All the ways a render can fail.
#[derive(Debug, Error)]
pub enum RenderError {
    /// An abstract action reference could not be expanded: malformed,
    /// unknown alias, or method outside the import's allow list.
    #[error("unresolved action in step {step:?}")]
    UnresolvedAction {
        /// Step carrying the reference.
        step: String,
        /// The underlying expansion failure.
        #[source]
        source: ActionRefError,
    },

    /// The recursion bound was hit, most likely a cyclic fulfiller graph.
    #[error("maximum render depth of {max_depth} exceeded")]
    DepthExceeded {
        /// The configured bound.
        max_depth: usize,
    },

    /// A workflow's entrypoint names no template after a merge.
    #[error("entrypoint template {entrypoint:?} not found in workflow")]
    MissingEntrypoint {
        /// The dangling entrypoint name.
        entrypoint: String,
    },

    /// The manifest repository returned no candidate for the capability.
    #[error("no fulfiller found for capability {capability}")]
    NoFulfillerFound {
        /// The requested capability.
        capability: CapabilityRef,
    },

    /// A runner-context reference was provided with an empty name or key.
    #[error("runner context reference must have a non-empty name and key")]
    EmptyContextRef,

    /// An update declaration names a data instance nobody provided.
    #[error("update declaration {name:?} in step {step:?} does not match any known data instance")]
    UnknownUpdateTarget {
        /// Declared instance name.
        name: String,
        /// Step carrying the declaration.
        step: String,
    },

    /// A guard was satisfied but its witness artifact cannot be found.
    #[error("artifact {name:?} satisfying step {step:?} was not found among recorded arguments")]
    MissingWitnessArtifact {
        /// The witness artifact name.
        name: String,
        /// Step whose guard was satisfied.
        step: String,
    },

    /// A guard expression failed to parse.
    #[error("invalid guard expression {expression:?} on step {step:?}")]
    Guard {
        /// The offending expression.
        expression: String,
        /// Step carrying the guard.
        step: String,
        /// Parse failure detail.
        #[source]
        source: GuardError,
    },

    /// A fulfiller declares an output with no matching type declaration.
    #[error("no type reference declared for output instance {name:?} of fulfiller {fulfiller}")]
    UnknownOutputType {
        /// Declared instance name.
        name: String,
        /// Fulfiller identity.
        fulfiller: String,
    },

    /// A fulfiller's embedded step-graph could not be decoded.
    #[error("malformed embedded step graph in fulfiller {fulfiller}")]
    Decode {
        /// Fulfiller identity.
        fulfiller: String,
        /// The underlying decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// The caller-supplied parameters could not be encoded as a payload.
    #[error("failed to encode user parameters")]
    ParametersEncode {
        /// The underlying encode failure.
        #[source]
        source: serde_yaml::Error,
    },

    /// A collaborator failed; never retried here.
    #[error("collaborator failure while processing step {step:?}")]
    Collaborator {
        /// Step being processed when the failure occurred.
        step: String,
        /// The collaborator's error, unchanged.
        #[source]
        source: anyhow::Error,
    },

    /// The caller cancelled the render.
    #[error("render cancelled")]
    Cancelled,
}
