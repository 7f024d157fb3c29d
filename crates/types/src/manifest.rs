//! Manifest types consumed during composition.
//!
//! Capabilities are abstract, versioned descriptions of a desired outcome;
//! fulfillers are concrete recipes that satisfy them. Both live in the
//! manifest repository, which this crate only models: fetching, ranking
//! and policy are external concerns.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Abstract capability reference: a path plus an optional revision.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityRef {
    /// Capability path, e.g. `cap.db.postgresql.install`.
    pub path: String,
    /// Revision pin; `None` means latest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl CapabilityRef {
    /// Reference to the latest revision of `path`.
    pub fn new(path: impl Into<String>) -> Self {
        CapabilityRef {
            path: path.into(),
            revision: None,
        }
    }

    /// Reference pinned to a revision.
    pub fn with_revision(path: impl Into<String>, revision: impl Into<String>) -> Self {
        CapabilityRef {
            path: path.into(),
            revision: Some(revision.into()),
        }
    }
}

impl fmt::Display for CapabilityRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(revision) => write!(formatter, "{}:{}", self.path, revision),
            None => write!(formatter, "{}", self.path),
        }
    }
}

/// One entry of a fulfiller's import table: an aliased capability group
/// with the methods the fulfiller is allowed to call.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportEntry {
    /// Alias used by abstract action references inside the step-graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Capability group path the alias expands to.
    pub group_path: String,
    /// Allowed methods, each optionally pinned to a revision.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<ImportedMethod>,
}

/// A method allowed by an [`ImportEntry`].
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ImportedMethod {
    /// Method name appended to the group path on expansion.
    pub name: String,
    /// Revision pin carried into the expanded reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// Why an abstract action reference could not be expanded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionRefError {
    /// The reference is not of the form `<alias>.<method>`.
    #[error("action reference {0:?} does not follow the <alias>.<method> pattern")]
    Pattern(String),
    /// No import entry carries the alias and method.
    #[error("no import matches action reference {0:?}")]
    NotImported(String),
}

/// Expands `alias.method` against an import table into a full capability
/// reference. The first entry matching both alias and method wins; the
/// method's revision pin is carried along.
pub fn resolve_action_reference(imports: &[ImportEntry], reference: &str) -> Result<CapabilityRef, ActionRefError> {
    let Some((alias, method)) = reference.split_once('.') else {
        return Err(ActionRefError::Pattern(reference.to_string()));
    };
    if alias.is_empty() || method.is_empty() {
        return Err(ActionRefError::Pattern(reference.to_string()));
    }

    for entry in imports {
        if entry.alias.as_deref() != Some(alias) {
            continue;
        }
        for allowed in &entry.methods {
            if allowed.name == method {
                return Ok(CapabilityRef {
                    path: format!("{}.{}", entry.group_path, method),
                    revision: allowed.revision.clone(),
                });
            }
        }
    }

    Err(ActionRefError::NotImported(reference.to_string()))
}

/// Reference to a declared data type.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypeRef {
    /// Type path in the manifest repository.
    pub path: String,
    /// Revision pin; `None` means latest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// A data object a fulfiller declares it will produce.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutputDeclaration {
    /// Data object name, unique within the fulfiller.
    pub name: String,
    /// Declared type of the object.
    pub type_ref: TypeRef,
    /// Storage backend designation, when the fulfiller pins one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

/// A declared dependency edge: `name` uses each entry of `uses`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct OutputRelationDecl {
    /// Producing data object.
    pub name: String,
    /// Data objects the producer depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uses: Vec<String>,
}

/// Concrete recipe satisfying a capability: an embedded step-graph plus
/// its own import table and output declarations.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Fulfiller {
    /// Fulfiller path, e.g. `fulfiller.postgresql.install`.
    pub path: String,
    /// Fulfiller revision.
    #[serde(default)]
    pub revision: String,
    /// Import table used to expand the graph's abstract action steps.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ImportEntry>,
    /// Data objects the fulfiller declares as outputs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputDeclaration>,
    /// Dependency edges among the declared outputs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<OutputRelationDecl>,
    /// Embedded step-graph, decoded on demand by the engine.
    #[serde(default)]
    pub graph: Value,
}

impl Fulfiller {
    /// Identity used in error annotations: `path:revision`.
    pub fn id(&self) -> String {
        if self.revision.is_empty() {
            self.path.clone()
        } else {
            format!("{}:{}", self.path, self.revision)
        }
    }

    /// Looks up the declared type of an output by name.
    pub fn output_type(&self, name: &str) -> Option<&OutputDeclaration> {
        self.outputs.iter().find(|declaration| declaration.name == name)
    }
}

/// A data instance the caller already owns, injected instead of produced.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct InputInstanceRef {
    /// Artifact name under which the instance is published.
    pub name: String,
    /// Instance identifier in the data-instance gateway.
    pub id: String,
}

impl InputInstanceRef {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        InputInstanceRef {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// A produced data object as reported at the end of composition.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutputInstance {
    /// Final (namespaced) artifact name.
    pub name: String,
    /// Declared type of the object.
    pub type_ref: TypeRef,
    /// Storage backend designation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

/// Directed lineage edge between produced data objects.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct OutputInstanceRelation {
    /// Producer name.
    pub from: String,
    /// Dependency name.
    pub to: String,
}

/// Out-of-band reference to the execution context handed to the runner.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RunnerContextRef {
    /// Name of the context holder.
    pub name: String,
    /// Key under which the context document is stored.
    pub key: String,
}
