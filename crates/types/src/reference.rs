//! Artifact reference directives.
//!
//! A step argument's `from` field carries a directive string naming where
//! the artifact originates. Three forms are recognized; anything else is
//! treated as opaque and passed through untouched, so runner-specific
//! directives survive composition unmodified.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

static GLOBAL_OUTPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{workflow\.outputs\.artifacts\.([A-Za-z0-9_.-]+)\}\}$").unwrap());
static STEP_OUTPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{steps\.([A-Za-z0-9_.-]+)\.outputs\.artifacts\.([A-Za-z0-9_.-]+)\}\}$").unwrap());
static TEMPLATE_INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{inputs\.artifacts\.([A-Za-z0-9_.-]+)\}\}$").unwrap());

/// Parsed artifact origin: which namespace the referenced artifact lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactRef {
    /// Output of a sibling step: `{{steps.<step>.outputs.artifacts.<name>}}`.
    StepOutput {
        /// Producing step name.
        step: String,
        /// Artifact name on that step.
        artifact: String,
    },
    /// Input of the enclosing template: `{{inputs.artifacts.<name>}}`.
    TemplateInput {
        /// Artifact name among the template inputs.
        artifact: String,
    },
    /// Workflow-global output: `{{workflow.outputs.artifacts.<name>}}`.
    GlobalOutput {
        /// Workflow-wide artifact name.
        artifact: String,
    },
}

impl ArtifactRef {
    /// Parses a directive string; `None` for unrecognized (opaque) forms.
    pub fn parse(directive: &str) -> Option<Self> {
        if let Some(captures) = GLOBAL_OUTPUT.captures(directive) {
            return Some(ArtifactRef::GlobalOutput {
                artifact: captures[1].to_string(),
            });
        }
        if let Some(captures) = STEP_OUTPUT.captures(directive) {
            return Some(ArtifactRef::StepOutput {
                step: captures[1].to_string(),
                artifact: captures[2].to_string(),
            });
        }
        if let Some(captures) = TEMPLATE_INPUT.captures(directive) {
            return Some(ArtifactRef::TemplateInput {
                artifact: captures[1].to_string(),
            });
        }
        None
    }

    /// Reference to the output `artifact` of `step`.
    pub fn step_output(step: impl Into<String>, artifact: impl Into<String>) -> Self {
        ArtifactRef::StepOutput {
            step: step.into(),
            artifact: artifact.into(),
        }
    }

    /// Reference to the enclosing template's input `artifact`.
    pub fn template_input(artifact: impl Into<String>) -> Self {
        ArtifactRef::TemplateInput {
            artifact: artifact.into(),
        }
    }

    /// Reference to the workflow-global output `artifact`.
    pub fn global_output(artifact: impl Into<String>) -> Self {
        ArtifactRef::GlobalOutput {
            artifact: artifact.into(),
        }
    }

    /// The referenced artifact name, whatever the origin.
    pub fn artifact(&self) -> &str {
        match self {
            ArtifactRef::StepOutput { artifact, .. }
            | ArtifactRef::TemplateInput { artifact }
            | ArtifactRef::GlobalOutput { artifact } => artifact,
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactRef::StepOutput { step, artifact } => {
                write!(formatter, "{{{{steps.{step}.outputs.artifacts.{artifact}}}}}")
            }
            ArtifactRef::TemplateInput { artifact } => {
                write!(formatter, "{{{{inputs.artifacts.{artifact}}}}}")
            }
            ArtifactRef::GlobalOutput { artifact } => {
                write!(formatter, "{{{{workflow.outputs.artifacts.{artifact}}}}}")
            }
        }
    }
}
