//! Wire model for composed workflows.
//!
//! These structures describe the executable step-graph handed to the
//! downstream step-runner: a [`Workflow`] is an entrypoint plus an ordered
//! list of [`Template`]s, each template an ordered list of parallel step
//! groups. The model is shared between the composition engine and any
//! surface that inspects rendered output, and it round-trips losslessly:
//! every field the composer does not interpret is preserved through the
//! `extra` pass-through maps.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A complete, serializable workflow: entrypoint plus template set.
///
/// Invariant maintained by the composer: after every merge the entrypoint
/// names a template that exists in `templates`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Workflow {
    /// Name of the template invoked first by the step-runner.
    #[serde(default)]
    pub entrypoint: String,
    /// Ordered template set; order is preserved for deterministic output.
    #[serde(default)]
    pub templates: Vec<Template>,
    /// Workflow-level arguments handed to the entrypoint template.
    #[serde(default, skip_serializing_if = "Artifacts::is_empty")]
    pub arguments: Artifacts,
    /// Fields the composer does not interpret, preserved verbatim.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl Workflow {
    /// Looks up a template by name.
    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|template| template.name == name)
    }

    /// Looks up a template by name for mutation.
    pub fn template_mut(&mut self, name: &str) -> Option<&mut Template> {
        self.templates.iter_mut().find(|template| template.name == name)
    }

    /// Returns the index of the entrypoint template, if it exists.
    pub fn entrypoint_index(&self) -> Option<usize> {
        self.templates.iter().position(|template| template.name == self.entrypoint)
    }
}

/// One node of the workflow tree: a named list of parallel step groups with
/// declared input/output artifacts and, for leaf templates, the execution
/// unit the step-runner schedules.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Template {
    /// Template name, unique within a composed workflow.
    pub name: String,
    /// Ordered groups of steps; steps within one group may run in parallel.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<ParallelSteps>,
    /// Artifacts this template expects from its caller.
    #[serde(default, skip_serializing_if = "Artifacts::is_empty")]
    pub inputs: Artifacts,
    /// Artifacts this template publishes; entries with a `global_name` are
    /// visible workflow-wide.
    #[serde(default, skip_serializing_if = "Artifacts::is_empty")]
    pub outputs: Artifacts,
    /// Execution unit for leaf templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<ExecutionUnit>,
    /// Fields the composer does not interpret, preserved verbatim.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// A group of steps the runner may execute concurrently.
pub type ParallelSteps = Vec<Step>;

/// A single step: a name, a target, input arguments, and the declarative
/// markers the composer consumes during rendering.
///
/// The wire form carries the target as either a `template` or an `action`
/// key; exactly one must be present, which the conversion from the wire
/// representation enforces at decode time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "StepWire", into = "StepWire")]
pub struct Step {
    /// Step name, unique within its template.
    pub name: String,
    /// What the step invokes: a concrete template or an abstract action.
    pub target: StepTarget,
    /// Input argument artifacts.
    pub arguments: Artifacts,
    /// Guard expression; the step's deeper resolution is skipped when the
    /// guard is satisfied by already-bound inputs.
    pub when: Option<String>,
    /// Data objects this step declares it produces.
    pub outputs: Vec<InstanceDeclaration>,
    /// Data objects this step declares it mutates.
    pub updates: Vec<InstanceDeclaration>,
    /// Fields the composer does not interpret, preserved verbatim.
    pub extra: IndexMap<String, Value>,
}

impl Step {
    /// Creates a step invoking a concrete template.
    pub fn invoking(name: impl Into<String>, template: impl Into<String>) -> Self {
        Step {
            name: name.into(),
            target: StepTarget::Template(template.into()),
            arguments: Artifacts::default(),
            when: None,
            outputs: Vec::new(),
            updates: Vec::new(),
            extra: IndexMap::new(),
        }
    }

    /// Returns the referenced template name when the target is concrete.
    pub fn template_name(&self) -> Option<&str> {
        match &self.target {
            StepTarget::Template(name) => Some(name.as_str()),
            StepTarget::Action(_) => None,
        }
    }

    /// Returns the action reference when the target is abstract.
    pub fn action_reference(&self) -> Option<&str> {
        match &self.target {
            StepTarget::Template(_) => None,
            StepTarget::Action(reference) => Some(reference.as_str()),
        }
    }
}

/// Step target: a concrete template reference or an abstract action
/// reference of the form `alias.method`. Exactly one holds at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepTarget {
    /// Reference to a template by name.
    Template(String),
    /// Abstract action reference, expanded against an import table.
    Action(String),
}

/// Wire-level step representation with optional target fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StepWire {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(default, skip_serializing_if = "Artifacts::is_empty")]
    arguments: Artifacts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    when: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    outputs: Vec<InstanceDeclaration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    updates: Vec<InstanceDeclaration>,
    #[serde(flatten)]
    extra: IndexMap<String, Value>,
}

/// Violations of the one-target-per-step rule, reported at decode time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepTargetError {
    /// Both `template` and `action` were set.
    #[error("step {0:?} sets both a template reference and an action reference")]
    BothTargets(String),
    /// Neither `template` nor `action` was set.
    #[error("step {0:?} sets neither a template reference nor an action reference")]
    MissingTarget(String),
}

impl TryFrom<StepWire> for Step {
    type Error = StepTargetError;

    fn try_from(wire: StepWire) -> Result<Self, Self::Error> {
        let target = match (wire.template, wire.action) {
            (Some(template), None) => StepTarget::Template(template),
            (None, Some(action)) => StepTarget::Action(action),
            (Some(_), Some(_)) => return Err(StepTargetError::BothTargets(wire.name)),
            (None, None) => return Err(StepTargetError::MissingTarget(wire.name)),
        };

        Ok(Step {
            name: wire.name,
            target,
            arguments: wire.arguments,
            when: wire.when,
            outputs: wire.outputs,
            updates: wire.updates,
            extra: wire.extra,
        })
    }
}

impl From<Step> for StepWire {
    fn from(step: Step) -> Self {
        let (template, action) = match step.target {
            StepTarget::Template(template) => (Some(template), None),
            StepTarget::Action(action) => (None, Some(action)),
        };

        StepWire {
            name: step.name,
            template,
            action,
            arguments: step.arguments,
            when: step.when,
            outputs: step.outputs,
            updates: step.updates,
            extra: step.extra,
        }
    }
}

/// Named artifact list, used for template inputs/outputs and step arguments.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Artifacts {
    /// The artifacts, in authoring order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
}

impl Artifacts {
    /// True when no artifacts are listed.
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Looks up an artifact by name.
    pub fn find(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|artifact| artifact.name == name)
    }
}

impl From<Vec<Artifact>> for Artifacts {
    fn from(artifacts: Vec<Artifact>) -> Self {
        Artifacts { artifacts }
    }
}

/// The step-runner's unit of data exchange, addressed by name.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Artifact {
    /// Logical artifact name.
    pub name: String,
    /// Reference directive naming where the artifact comes from; see
    /// [`ArtifactRef`](crate::ArtifactRef) for the recognized forms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Workflow-wide name under which the artifact is published.
    #[serde(default, rename = "globalName", skip_serializing_if = "Option::is_none")]
    pub global_name: Option<String>,
    /// Filesystem location inside the execution unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Inline payload materialized by the runner instead of a transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Whether the artifact may be absent without failing the step.
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
}

impl Artifact {
    /// Creates a named artifact with a `from` reference directive.
    pub fn wired(name: impl Into<String>, from: impl Into<String>) -> Self {
        Artifact {
            name: name.into(),
            from: Some(from.into()),
            ..Artifact::default()
        }
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Container-like execution spec carried by leaf templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ExecutionUnit {
    /// Image the runner schedules.
    pub image: String,
    /// Entry command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Arguments appended to the command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment handed to the unit.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
}

impl ExecutionUnit {
    /// A unit that only holds its slot while the runner moves artifacts.
    /// Used by every auxiliary step the composer attaches itself.
    pub fn holding() -> Self {
        ExecutionUnit {
            image: "alpine:3.7".to_string(),
            command: vec!["sh".to_string(), "-c".to_string()],
            args: vec!["sleep 1".to_string()],
            env: IndexMap::new(),
        }
    }
}

/// Declarative marker on a step: a data object the step produces or
/// mutates, sourced from one of the step's output artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct InstanceDeclaration {
    /// Data object name.
    pub name: String,
    /// Name of the step output artifact holding the object's content.
    pub from: String,
}
