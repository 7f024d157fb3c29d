//! External collaborator contracts.
//!
//! The composer consumes three services it never reimplements: the
//! manifest repository serving capability and fulfiller definitions, the
//! policy resolver deciding which fulfiller satisfies a capability and
//! which pre-existing data to inject, and the data-instance gateway
//! building the download/upload/update step fragments the composer
//! splices in. All three are read-only oracles during composition;
//! failures bubble up as [`anyhow::Error`] and are annotated with the
//! step being processed, never retried here.

use anyhow::Result;
use tapestry_types::{CapabilityRef, Fulfiller, InputInstanceRef, OutputInstance, OutputInstanceRelation, Step, Template};

/// Serves fulfiller definitions for capability references.
pub trait ManifestRepository: Send + Sync {
    /// Ordered candidates for a capability; ranking is the repository's
    /// concern and the composer always takes the first entry.
    fn fulfillers_for(&self, capability: &CapabilityRef) -> Result<Vec<Fulfiller>>;
}

/// Decides which fulfiller satisfies a capability request.
pub trait PolicyResolver: Send + Sync {
    /// Selects exactly one fulfiller plus the policy rule that matched.
    fn resolve(&self, capability: &CapabilityRef) -> Result<(Fulfiller, MatchedRule)>;

    /// Data instances the matched rule injects for this fulfiller.
    fn instances_to_inject(&self, rule: &MatchedRule, fulfiller: &Fulfiller) -> Result<Vec<InputInstanceRef>>;
}

/// Identity of the policy rule that selected a fulfiller; produced and
/// consumed by the resolver, opaque to the composer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchedRule {
    /// Rule name in the resolver's own terms.
    pub name: String,
}

/// Builds the auxiliary step fragments that move data instances in and
/// out of a run.
pub trait DataInstanceGateway: Send + Sync {
    /// One step downloading the batch of instances to their target paths.
    fn build_download_step(&self, batch: &[DownloadSpec]) -> Result<StepFragment>;

    /// One step uploading the produced instances with their lineage.
    fn build_upload_step(&self, instances: &[OutputInstance], relations: &[OutputInstanceRelation]) -> Result<StepFragment>;

    /// One step writing back updated instances.
    fn build_update_step(&self, batch: &[UpdateSpec]) -> Result<StepFragment>;
}

/// An opaque, already-valid step plus its backing template, spliced into
/// the workflow verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFragment {
    /// The step to insert into an existing template.
    pub step: Step,
    /// The template the step invokes.
    pub template: Template,
}

/// One instance to download: where it lives and where it lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSpec {
    /// Instance identifier in the gateway.
    pub id: String,
    /// Artifact name the instance is published under.
    pub name: String,
    /// Target path inside the execution unit.
    pub path: String,
}

/// One instance to write back: its identity and the artifact holding the
/// new content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSpec {
    /// Instance identifier in the gateway.
    pub id: String,
    /// Artifact name holding the updated content.
    pub artifact: String,
}
