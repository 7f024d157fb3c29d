//! Artifact and template namespacing for inlined sub-graphs.
//!
//! Every fulfiller graph inlined into the root workflow is rewritten under
//! a prefix derived from `<enclosing template>-<step name>`, so that two
//! inlined copies of the same fulfiller can never collide: template names,
//! the entrypoint, step template references, and every globally-visible
//! output artifact name all move into the prefixed namespace. The old→new
//! mapping for global names is returned so the enclosing scope can repoint
//! its own references.

use indexmap::IndexMap;
use tapestry_types::{ArtifactRef, Artifacts, Step, StepTarget, Template, Workflow};

/// Joins a namespace prefix and a name.
pub fn prefixed(prefix: &str, name: &str) -> String {
    format!("{prefix}-{name}")
}

/// Rewrites `workflow` into the namespace of `prefix` and returns the
/// rename table for its globally-visible output artifacts.
///
/// An empty prefix leaves the graph untouched, which is the root case.
pub fn apply_prefix(prefix: &str, workflow: &mut Workflow) -> IndexMap<String, String> {
    let mut renames = IndexMap::new();
    if prefix.is_empty() {
        return renames;
    }

    for template in &mut workflow.templates {
        template.name = prefixed(prefix, &template.name);

        for artifact in &mut template.outputs.artifacts {
            if let Some(global) = &artifact.global_name {
                let renamed = prefixed(prefix, global);
                renames.insert(global.clone(), renamed.clone());
                artifact.global_name = Some(renamed);
            }
        }

        for group in &mut template.steps {
            for step in group {
                if let StepTarget::Template(target) = &mut step.target {
                    *target = prefixed(prefix, target);
                }
            }
        }
    }

    workflow.entrypoint = prefixed(prefix, &workflow.entrypoint);
    renames
}

/// Repoints workflow-global output references in an artifact list using the
/// accumulated rename table. References of any other origin, and opaque
/// directives, are left untouched.
pub fn rewrite_artifacts(artifacts: &mut Artifacts, renames: &IndexMap<String, String>) {
    if renames.is_empty() {
        return;
    }

    for artifact in &mut artifacts.artifacts {
        let Some(from) = &artifact.from else { continue };
        let Some(ArtifactRef::GlobalOutput { artifact: name }) = ArtifactRef::parse(from) else {
            continue;
        };
        if let Some(renamed) = renames.get(&name) {
            artifact.from = Some(ArtifactRef::global_output(renamed.clone()).to_string());
        }
    }
}

/// Repoints workflow-global output references in one step's arguments.
pub fn rewrite_step(step: &mut Step, renames: &IndexMap<String, String>) {
    rewrite_artifacts(&mut step.arguments, renames);
}

/// Repoints workflow-global output references everywhere in a template.
pub fn rewrite_template(template: &mut Template, renames: &IndexMap<String, String>) {
    for group in &mut template.steps {
        for step in group {
            rewrite_step(step, renames);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapestry_types::Artifact;

    fn sub_graph() -> Workflow {
        serde_yaml::from_str(
            r#"
entrypoint: helm-install
templates:
  - name: helm-install
    steps:
      - - name: run
          template: helm-run
          arguments:
            artifacts:
              - name: config
                from: "{{workflow.outputs.artifacts.config}}"
  - name: helm-run
    outputs:
      artifacts:
        - name: release
          globalName: helm-release
          path: /out/release
    unit:
      image: alpine:3.7
"#,
        )
        .unwrap()
    }

    #[test]
    fn prefix_rewrites_templates_entrypoint_and_globals() {
        let mut workflow = sub_graph();
        let renames = apply_prefix("pg-install-helm", &mut workflow);

        assert_eq!(workflow.entrypoint, "pg-install-helm-helm-install");
        assert!(workflow.template("pg-install-helm-helm-install").is_some());
        assert!(workflow.template("pg-install-helm-helm-run").is_some());

        let step = &workflow.templates[0].steps[0][0];
        assert_eq!(step.template_name(), Some("pg-install-helm-helm-run"));

        let output = &workflow.template("pg-install-helm-helm-run").unwrap().outputs.artifacts[0];
        assert_eq!(output.global_name.as_deref(), Some("pg-install-helm-helm-release"));

        assert_eq!(renames.get("helm-release").map(String::as_str), Some("pg-install-helm-helm-release"));
        assert_eq!(renames.len(), 1);
    }

    #[test]
    fn empty_prefix_is_the_identity() {
        let mut workflow = sub_graph();
        let untouched = workflow.clone();
        let renames = apply_prefix("", &mut workflow);
        assert!(renames.is_empty());
        assert_eq!(workflow, untouched);
    }

    #[test]
    fn rewrite_repoints_only_renamed_global_references() {
        let mut renames = IndexMap::new();
        renames.insert("postgresql".to_string(), "main-db-postgresql".to_string());

        let mut arguments = Artifacts::from(vec![
            Artifact::wired("db", "{{workflow.outputs.artifacts.postgresql}}"),
            Artifact::wired("other", "{{workflow.outputs.artifacts.runner-context}}"),
            Artifact::wired("local", "{{steps.install.outputs.artifacts.postgresql}}"),
            Artifact::wired("opaque", "{{item}}"),
        ]);

        rewrite_artifacts(&mut arguments, &renames);

        assert_eq!(
            arguments.artifacts[0].from.as_deref(),
            Some("{{workflow.outputs.artifacts.main-db-postgresql}}")
        );
        assert_eq!(
            arguments.artifacts[1].from.as_deref(),
            Some("{{workflow.outputs.artifacts.runner-context}}")
        );
        assert_eq!(
            arguments.artifacts[2].from.as_deref(),
            Some("{{steps.install.outputs.artifacts.postgresql}}")
        );
        assert_eq!(arguments.artifacts[3].from.as_deref(), Some("{{item}}"));
    }

    #[test]
    fn double_prefixing_composes_across_nesting_levels() {
        let mut workflow = sub_graph();
        apply_prefix("inner", &mut workflow);
        let renames = apply_prefix("outer", &mut workflow);

        assert_eq!(workflow.entrypoint, "outer-inner-helm-install");
        assert_eq!(
            renames.get("inner-helm-release").map(String::as_str),
            Some("outer-inner-helm-release")
        );
    }
}
