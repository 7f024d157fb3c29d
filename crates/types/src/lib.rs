//! Shared type definitions for the Tapestry composition engine.
//!
//! Two families of types live here:
//!
//! - the **workflow wire model** ([`workflow`]): the executable step-graph
//!   exchanged with the downstream step-runner, round-tripped losslessly;
//! - the **manifest model** ([`manifest`]): capability references,
//!   fulfiller recipes and data-instance descriptors served by the
//!   external manifest repository.
//!
//! The engine crate consumes both; keeping them here lets other surfaces
//! (validators, inspectors) speak the same schema without depending on the
//! engine.

pub mod manifest;
pub mod reference;
pub mod workflow;

pub use manifest::{
    ActionRefError, CapabilityRef, Fulfiller, ImportEntry, ImportedMethod, InputInstanceRef, OutputDeclaration,
    OutputInstance, OutputInstanceRelation, OutputRelationDecl, RunnerContextRef, TypeRef, resolve_action_reference,
};
pub use reference::ArtifactRef;
pub use workflow::{
    Artifact, Artifacts, ExecutionUnit, InstanceDeclaration, ParallelSteps, Step, StepTarget, StepTargetError,
    Template, Workflow,
};
