//! Auxiliary steps the composer attaches itself.
//!
//! Everything here produces or splices scaffolding around the fulfiller
//! graphs: the synthetic root template anchoring cross-cutting steps, the
//! fixed steps materializing out-of-band configuration (user parameters,
//! runner context), the pass-through emit steps that republish
//! already-available inputs, and the splice points for gateway-built
//! download/upload/update fragments.

use indexmap::IndexMap;
use tapestry_types::{
    Artifact, ArtifactRef, ExecutionUnit, InstanceDeclaration, RunnerContextRef, Step, Template, Workflow,
};

use crate::collaborators::StepFragment;
use crate::error::RenderError;
use crate::namespace;

/// Name of the synthetic root template wrapped around the entrypoint.
pub const ROOT_TEMPLATE: &str = "tapestry-root";
/// Name of the root step invoking the original entrypoint.
pub const ENTRYPOINT_STEP: &str = "start-entrypoint";
/// Artifact name under which caller parameters are published.
pub const USER_INPUT: &str = "input-parameters";
/// Global artifact name of the materialized execution context.
pub const RUNNER_CONTEXT: &str = "runner-context";

/// Introduces the synthetic root template whose sole step invokes the
/// original entrypoint, and repoints the workflow at it. The root is a
/// stable anchor for later-attached cross-cutting steps.
pub fn wrap_entrypoint(workflow: &mut Workflow) {
    let entrypoint_step = Step::invoking(ENTRYPOINT_STEP, workflow.entrypoint.clone());
    let root = Template {
        name: ROOT_TEMPLATE.to_string(),
        steps: vec![vec![entrypoint_step]],
        ..Template::default()
    };

    workflow.entrypoint = ROOT_TEMPLATE.to_string();
    workflow.templates.push(root);
}

/// The entrypoint template of `workflow`, or the dangling-entrypoint error.
pub fn entrypoint_template_mut<'workflow>(workflow: &'workflow mut Workflow) -> Result<&'workflow mut Template, RenderError> {
    let entrypoint = workflow.entrypoint.clone();
    workflow.template_mut(&entrypoint).ok_or(RenderError::MissingEntrypoint { entrypoint })
}

/// The root step invoking the original entrypoint; present after
/// [`wrap_entrypoint`].
pub fn entrypoint_step_mut<'workflow>(workflow: &'workflow mut Workflow) -> Option<&'workflow mut Step> {
    workflow
        .template_mut(ROOT_TEMPLATE)?
        .steps
        .iter_mut()
        .flatten()
        .find(|step| step.name == ENTRYPOINT_STEP)
}

/// Materializes caller-supplied parameters as a raw YAML artifact: one
/// fixed template publishing the payload, its invoking step prepended
/// before the entrypoint invocation, and the entrypoint step wired to it.
pub fn add_user_input(workflow: &mut Workflow, parameters: &serde_json::Value) -> Result<(), RenderError> {
    let payload = serde_yaml::to_string(parameters).map_err(|source| RenderError::ParametersEncode { source })?;

    let template = Template {
        name: format!("populate-{USER_INPUT}"),
        unit: Some(ExecutionUnit::holding()),
        outputs: vec![Artifact {
            name: USER_INPUT.to_string(),
            path: Some(format!("/input/{USER_INPUT}")),
            raw: Some(payload),
            ..Artifact::default()
        }]
        .into(),
        ..Template::default()
    };

    let step = Step::invoking(format!("{}-step", template.name), template.name.clone());
    let reference = ArtifactRef::step_output(step.name.clone(), USER_INPUT).to_string();

    let root = entrypoint_template_mut(workflow)?;
    root.steps.insert(0, vec![step]);

    if let Some(entrypoint_step) = entrypoint_step_mut(workflow) {
        entrypoint_step
            .arguments
            .artifacts
            .push(Artifact::wired(USER_INPUT, reference));
    }

    workflow.templates.push(template);
    Ok(())
}

/// Materializes the execution context as a workflow-global artifact,
/// inserted before the entrypoint invocation so every later step can
/// depend on it.
pub fn add_runner_context(workflow: &mut Workflow, context: &RunnerContextRef) -> Result<(), RenderError> {
    if context.name.is_empty() || context.key.is_empty() {
        return Err(RenderError::EmptyContextRef);
    }

    let mut unit = ExecutionUnit::holding();
    unit.env.insert("CONTEXT_SOURCE_NAME".to_string(), context.name.clone());
    unit.env.insert("CONTEXT_SOURCE_KEY".to_string(), context.key.clone());

    let template = Template {
        name: format!("inject-{RUNNER_CONTEXT}"),
        unit: Some(unit),
        outputs: vec![Artifact {
            name: RUNNER_CONTEXT.to_string(),
            global_name: Some(RUNNER_CONTEXT.to_string()),
            path: Some("/input/context.yaml".to_string()),
            ..Artifact::default()
        }]
        .into(),
        ..Template::default()
    };

    let step = Step::invoking(format!("{}-step", template.name), template.name.clone());

    let root = entrypoint_template_mut(workflow)?;
    root.steps.insert(0, vec![step]);
    workflow.templates.push(template);
    Ok(())
}

/// Builds the pass-through rewrite for a satisfied guard: a template that
/// republishes `witness` (wired from `reference`) under the step's own
/// output name, plus the replacement step invoking it.
pub fn passthrough_emit(template_name: &str, step_name: &str, witness: &str, reference: &str) -> (Step, Template) {
    let path = format!("/emit/{witness}");

    let template = Template {
        name: format!("emit-{template_name}-{step_name}"),
        unit: Some(ExecutionUnit::holding()),
        inputs: vec![Artifact {
            name: witness.to_string(),
            path: Some(path.clone()),
            ..Artifact::default()
        }]
        .into(),
        outputs: vec![Artifact {
            name: witness.to_string(),
            path: Some(path),
            ..Artifact::default()
        }]
        .into(),
        ..Template::default()
    };

    let mut step = Step::invoking(step_name, template.name.clone());
    step.arguments = vec![Artifact::wired(witness, reference)].into();

    (step, template)
}

/// Builds the emit step publishing one declared data object of `step_name`
/// under its workflow-global (prefixed) name. Returns the step, its
/// template, and the old→new name mapping.
pub fn declared_output_emit(step_name: &str, declaration: &InstanceDeclaration, prefix: &str) -> (Step, Template, (String, String)) {
    let path = "/instance".to_string();
    let emit_step_name = format!("output-{}", declaration.name).to_lowercase();

    let (template_name, global_name) = if prefix.is_empty() {
        (emit_step_name.clone(), declaration.name.clone())
    } else {
        (
            format!("output-{prefix}-{}", declaration.name),
            namespace::prefixed(prefix, &declaration.name),
        )
    };

    let template = Template {
        name: template_name.clone(),
        unit: Some(ExecutionUnit::holding()),
        inputs: vec![Artifact {
            name: declaration.name.clone(),
            path: Some(path.clone()),
            ..Artifact::default()
        }]
        .into(),
        outputs: vec![Artifact {
            name: declaration.name.clone(),
            global_name: Some(global_name.clone()),
            path: Some(path),
            ..Artifact::default()
        }]
        .into(),
        ..Template::default()
    };

    let mut step = Step::invoking(emit_step_name, template_name);
    step.arguments = vec![Artifact::wired(
        declaration.name.clone(),
        ArtifactRef::step_output(step_name, declaration.from.clone()).to_string(),
    )]
    .into();

    (step, template, (declaration.name.clone(), global_name))
}

/// Materializes every data object the graph's steps declare as an emit
/// step + template pair, and returns the name mapping for the published
/// globals. Runs after namespacing, so template names are final.
pub fn add_declared_output_steps(workflow: &mut Workflow, prefix: &str) -> IndexMap<String, String> {
    let mut renames = IndexMap::new();
    let mut new_templates = Vec::new();

    for template in &mut workflow.templates {
        let mut emitted = Vec::new();

        for group in &template.steps {
            for step in group {
                for declaration in step.outputs.iter().chain(step.updates.iter()) {
                    let (emit_step, emit_template, (old, new)) = declared_output_emit(&step.name, declaration, prefix);
                    new_templates.push(emit_template);
                    emitted.push(emit_step);
                    renames.insert(old, new);
                }
            }
        }

        for emit_step in emitted {
            template.steps.push(vec![emit_step]);
        }
    }

    workflow.templates.extend(new_templates);
    renames
}

/// Splices a download fragment in front of the entrypoint template's
/// steps, so the instances are in place before anything else runs.
pub fn splice_download(workflow: &mut Workflow, fragment: StepFragment) -> Result<(), RenderError> {
    let entrypoint = entrypoint_template_mut(workflow)?;
    entrypoint.steps.insert(0, vec![fragment.step]);
    workflow.templates.push(fragment.template);
    Ok(())
}

/// Splices an upload/update fragment after the entrypoint template's
/// steps, once everything producing data has finished.
pub fn splice_trailing(workflow: &mut Workflow, fragment: StepFragment) -> Result<(), RenderError> {
    let entrypoint = entrypoint_template_mut(workflow)?;
    entrypoint.steps.push(vec![fragment.step]);
    workflow.templates.push(fragment.template);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bare_workflow() -> Workflow {
        Workflow {
            entrypoint: "main".to_string(),
            templates: vec![Template {
                name: "main".to_string(),
                ..Template::default()
            }],
            ..Workflow::default()
        }
    }

    #[test]
    fn wrap_introduces_a_root_anchor() {
        let mut workflow = bare_workflow();
        wrap_entrypoint(&mut workflow);

        assert_eq!(workflow.entrypoint, ROOT_TEMPLATE);
        let root = workflow.template(ROOT_TEMPLATE).unwrap();
        assert_eq!(root.steps.len(), 1);
        assert_eq!(root.steps[0][0].name, ENTRYPOINT_STEP);
        assert_eq!(root.steps[0][0].template_name(), Some("main"));
    }

    #[test]
    fn user_input_step_runs_before_the_entrypoint() {
        let mut workflow = bare_workflow();
        wrap_entrypoint(&mut workflow);
        add_user_input(&mut workflow, &json!({"replicas": 3})).unwrap();

        let root = workflow.template(ROOT_TEMPLATE).unwrap();
        assert_eq!(root.steps.len(), 2);
        assert_eq!(root.steps[0][0].name, "populate-input-parameters-step");
        assert_eq!(root.steps[1][0].name, ENTRYPOINT_STEP);

        let wired = root.steps[1][0].arguments.find(USER_INPUT).unwrap();
        assert_eq!(
            wired.from.as_deref(),
            Some("{{steps.populate-input-parameters-step.outputs.artifacts.input-parameters}}")
        );

        let populate = workflow.template("populate-input-parameters").unwrap();
        let payload = populate.outputs.artifacts[0].raw.as_deref().unwrap();
        assert!(payload.contains("replicas: 3"));
    }

    #[test]
    fn runner_context_is_published_globally() {
        let mut workflow = bare_workflow();
        wrap_entrypoint(&mut workflow);
        add_runner_context(
            &mut workflow,
            &RunnerContextRef {
                name: "runner-secret".to_string(),
                key: "context.yaml".to_string(),
            },
        )
        .unwrap();

        let template = workflow.template("inject-runner-context").unwrap();
        assert_eq!(template.outputs.artifacts[0].global_name.as_deref(), Some(RUNNER_CONTEXT));

        let root = workflow.template(ROOT_TEMPLATE).unwrap();
        assert_eq!(root.steps[0][0].name, "inject-runner-context-step");
    }

    #[test]
    fn empty_context_ref_is_rejected() {
        let mut workflow = bare_workflow();
        wrap_entrypoint(&mut workflow);

        let result = add_runner_context(
            &mut workflow,
            &RunnerContextRef {
                name: String::new(),
                key: "context.yaml".to_string(),
            },
        );
        assert!(matches!(result, Err(RenderError::EmptyContextRef)));
    }

    #[test]
    fn declared_output_emit_prefixes_only_when_nested() {
        let declaration = InstanceDeclaration {
            name: "postgresql".to_string(),
            from: "config".to_string(),
        };

        let (_, template, (old, new)) = declared_output_emit("install", &declaration, "");
        assert_eq!(template.name, "output-postgresql");
        assert_eq!((old.as_str(), new.as_str()), ("postgresql", "postgresql"));

        let (step, template, (_, new)) = declared_output_emit("install", &declaration, "main-db");
        assert_eq!(template.name, "output-main-db-postgresql");
        assert_eq!(new, "main-db-postgresql");
        assert_eq!(
            step.arguments.artifacts[0].from.as_deref(),
            Some("{{steps.install.outputs.artifacts.config}}")
        );
        assert_eq!(
            template.outputs.artifacts[0].global_name.as_deref(),
            Some("main-db-postgresql")
        );
    }

    #[test]
    fn splice_fails_on_a_dangling_entrypoint() {
        let mut workflow = bare_workflow();
        workflow.entrypoint = "ghost".to_string();

        let fragment = StepFragment {
            step: Step::invoking("download-step", "download"),
            template: Template {
                name: "download".to_string(),
                ..Template::default()
            },
        };

        let result = splice_download(&mut workflow, fragment);
        assert!(matches!(result, Err(RenderError::MissingEntrypoint { entrypoint }) if entrypoint == "ghost"));
    }
}
