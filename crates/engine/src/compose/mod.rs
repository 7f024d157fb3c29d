//! The composition pipeline.
//!
//! One [`Composer`] holds the engine configuration and the three external
//! collaborators; each [`render`](Composer::render) call builds a private
//! [`Composition`] owning every piece of recursion state (processed
//! templates, per-template recorded arguments, the rename table, the
//! lineage tracker, the injected-download ledger and the shared depth
//! counter), so concurrent renders never share anything.
//!
//! A render wraps the root fulfiller's graph in a synthetic root template,
//! attaches the out-of-band materialization steps, then recursively
//! resolves every abstract action step: expand the reference against the
//! scope's import table, let the policy resolver pick a fulfiller, inline
//! its graph under a collision-free prefix, register its declared data
//! objects, and descend into the inlined graph with its own import table.

use std::mem;

use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tapestry_types::{
    Artifact, ArtifactRef, CapabilityRef, Fulfiller, ImportEntry, InputInstanceRef, RunnerContextRef, Step, StepTarget,
    Template, Workflow, resolve_action_reference,
};

use crate::collaborators::{DataInstanceGateway, DownloadSpec, ManifestRepository, PolicyResolver, UpdateSpec};
use crate::error::RenderError;
use crate::guard;
use crate::lineage::{InstanceHandle, OutputInstanceTracker};
use crate::namespace;

pub mod attach;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bound on the shared recursion counter; exceeding it aborts the
    /// render, which is what catches cyclic fulfiller graphs.
    pub max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config { max_depth: 20 }
    }
}

/// Everything a render call needs from the operator.
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    /// The capability to compose a workflow for.
    pub capability: CapabilityRef,
    /// Data instances the caller already holds, injected instead of
    /// produced.
    pub input_instances: Vec<InputInstanceRef>,
    /// Opaque user parameters, forwarded untouched as an artifact.
    pub parameters: Option<Value>,
    /// Where the runner's execution context lives, if anywhere.
    pub runner_context: Option<RunnerContextRef>,
}

impl RenderRequest {
    /// A request for `capability` with no inputs attached.
    pub fn new(capability: CapabilityRef) -> Self {
        RenderRequest {
            capability,
            ..RenderRequest::default()
        }
    }
}

/// What a successful render produces.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// The flattened, executable workflow.
    pub workflow: Workflow,
    /// Identifiers of the data instances the caller must keep locked for
    /// the run's duration (the update targets).
    pub instances_to_lock: Vec<String>,
}

/// The composition engine: configuration plus collaborators.
pub struct Composer<'a> {
    config: Config,
    repository: &'a dyn ManifestRepository,
    policy: &'a dyn PolicyResolver,
    gateway: &'a dyn DataInstanceGateway,
}

impl<'a> Composer<'a> {
    /// Creates a composer over the given collaborators.
    pub fn new(
        config: Config,
        repository: &'a dyn ManifestRepository,
        policy: &'a dyn PolicyResolver,
        gateway: &'a dyn DataInstanceGateway,
    ) -> Self {
        Composer {
            config,
            repository,
            policy,
            gateway,
        }
    }

    /// Renders one capability request into a flattened workflow.
    ///
    /// The token is checked at the top of every recursion and every step
    /// iteration; the engine itself never times out or retries. Any error
    /// aborts the render and no partial workflow is returned.
    pub fn render(&self, cancel: &CancellationToken, request: RenderRequest) -> Result<RenderOutput, RenderError> {
        let composition = Composition {
            max_depth: self.config.max_depth,
            repository: self.repository,
            policy: self.policy,
            gateway: self.gateway,
            cancel,
            depth: 0,
            processed: Vec::new(),
            recorded_arguments: IndexMap::new(),
            tracker: OutputInstanceTracker::new(),
            updates: Vec::new(),
            downloaded: IndexSet::new(),
        };
        composition.render(request)
    }
}

/// Key of an artifact visible to a template: an optional producing step
/// plus the artifact name. Step-less keys are workflow-level artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ArtifactKey {
    step: Option<String>,
    name: String,
}

impl ArtifactKey {
    fn workflow(name: impl Into<String>) -> Self {
        ArtifactKey {
            step: None,
            name: name.into(),
        }
    }

    fn step(step: impl Into<String>, name: impl Into<String>) -> Self {
        ArtifactKey {
            step: Some(step.into()),
            name: name.into(),
        }
    }
}

/// An input argument recorded against its target template, linked to a
/// known data instance when its reference points at one.
#[derive(Debug, Clone)]
struct RecordedArgument {
    artifact: Artifact,
    instance: Option<InstanceHandle>,
}

/// Private state of one render call.
struct Composition<'a> {
    max_depth: usize,
    repository: &'a dyn ManifestRepository,
    policy: &'a dyn PolicyResolver,
    gateway: &'a dyn DataInstanceGateway,
    cancel: &'a CancellationToken,

    depth: usize,
    processed: Vec<Template>,
    recorded_arguments: IndexMap<String, Vec<RecordedArgument>>,
    tracker: OutputInstanceTracker,
    updates: Vec<UpdateSpec>,
    downloaded: IndexSet<String>,
}

impl Composition<'_> {
    fn render(mut self, request: RenderRequest) -> Result<RenderOutput, RenderError> {
        info!(capability = %request.capability, "composing workflow");

        let root = self.root_fulfiller(&request.capability)?;
        let (mut workflow, _) = self.inline_fulfiller("", &root)?;

        attach::wrap_entrypoint(&mut workflow);
        if let Some(parameters) = &request.parameters {
            attach::add_user_input(&mut workflow, parameters)?;
        }
        if let Some(context) = &request.runner_context {
            attach::add_runner_context(&mut workflow, context)?;
        }
        self.add_input_instances(&mut workflow, &request.input_instances)?;

        // lineage declared by the root fulfiller itself, unprefixed
        self.register_output_instances(None, "", &root)?;

        let Workflow {
            entrypoint,
            templates,
            arguments,
            extra,
        } = workflow;
        self.render_scope(templates, &root.imports, &request.input_instances, "")?;

        let mut workflow = Workflow {
            entrypoint,
            templates: mem::take(&mut self.processed),
            arguments,
            extra,
        };

        self.add_output_instances_step(&mut workflow)?;
        self.add_update_instances_step(&mut workflow)?;

        if workflow.entrypoint_index().is_none() {
            return Err(RenderError::MissingEntrypoint {
                entrypoint: workflow.entrypoint,
            });
        }

        let instances_to_lock = self.updates.iter().map(|update| update.id.clone()).collect();
        info!(templates = workflow.templates.len(), "workflow composed");
        Ok(RenderOutput {
            workflow,
            instances_to_lock,
        })
    }

    fn root_fulfiller(&self, capability: &CapabilityRef) -> Result<Fulfiller, RenderError> {
        let candidates = self
            .repository
            .fulfillers_for(capability)
            .map_err(|source| RenderError::Collaborator {
                step: attach::ENTRYPOINT_STEP.to_string(),
                source,
            })?;

        // ranking is the repository's concern; the first candidate wins
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::NoFulfillerFound {
                capability: capability.clone(),
            })
    }

    /// The recursive core: processes every template, every parallel group,
    /// every step of one decoded fulfiller graph, in order. Returns the
    /// instance outputs produced in this scope so the caller can wire its
    /// own step outputs.
    fn render_scope(
        &mut self,
        templates: Vec<Template>,
        imports: &[ImportEntry],
        scope_instances: &[InputInstanceRef],
        prefix: &str,
    ) -> Result<IndexMap<String, InstanceHandle>, RenderError> {
        if self.cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(RenderError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }

        let mut scope_outputs: IndexMap<String, InstanceHandle> = IndexMap::new();
        let mut scope_renames: IndexMap<String, String> = IndexMap::new();
        let mut scope_indices: Vec<usize> = Vec::new();

        for mut template in templates {
            let template_name = template.name.clone();
            let mut available = self.available_for(&template_name);

            let groups = mem::take(&mut template.steps);
            let index = self.push_processed(template);
            scope_indices.push(index);

            let mut new_groups = Vec::new();
            for group in groups {
                let mut new_group = Vec::new();
                for mut step in group {
                    if self.cancel.is_cancelled() {
                        return Err(RenderError::Cancelled);
                    }

                    // 1. record the step's arguments against its target, so
                    // the target template can test what it was given
                    self.record_step_arguments(&step, &available);

                    // 2. a satisfied guard turns the step into a
                    // pass-through emit of the witness artifact
                    if step.when.is_some() {
                        self.evaluate_guard(&template_name, &mut step, scope_instances, &mut available)?;
                    }

                    // 3. update declarations must name known instances
                    self.register_update_targets(&step, &available, prefix)?;

                    // 4.-10. abstract actions pull in a fulfiller graph
                    let mut step_instance_outputs = IndexMap::new();
                    if let Some(reference) = step.action_reference().map(str::to_string) {
                        step_instance_outputs = self.expand_action_step(
                            &mut step,
                            &reference,
                            &template_name,
                            imports,
                            &available,
                            &mut scope_renames,
                        )?;
                    }

                    for (name, handle) in step_instance_outputs {
                        available.insert(ArtifactKey::step(step.name.clone(), name.clone()), handle.clone());
                        scope_outputs.insert(name, handle);
                    }

                    // declarative markers are consumed by composition
                    step.outputs.clear();
                    step.updates.clear();

                    // 11. repoint renamed global references
                    namespace::rewrite_step(&mut step, &scope_renames);
                    new_group.push(step);
                }
                if !new_group.is_empty() {
                    new_groups.push(new_group);
                }
            }
            self.processed[index].steps = new_groups;
        }

        // renames discovered late in the scope also apply to references
        // recorded before they existed
        for index in scope_indices {
            namespace::rewrite_template(&mut self.processed[index], &scope_renames);
        }

        Ok(scope_outputs)
    }

    fn expand_action_step(
        &mut self,
        step: &mut Step,
        reference: &str,
        template_name: &str,
        imports: &[ImportEntry],
        available: &IndexMap<ArtifactKey, InstanceHandle>,
        scope_renames: &mut IndexMap<String, String>,
    ) -> Result<IndexMap<String, InstanceHandle>, RenderError> {
        let capability = resolve_action_reference(imports, reference).map_err(|source| RenderError::UnresolvedAction {
            step: step.name.clone(),
            source,
        })?;
        debug!(step = %step.name, action = %reference, capability = %capability, "expanding abstract action");

        // fulfiller selection and data injection are the resolver's call
        let (fulfiller, rule) = self
            .policy
            .resolve(&capability)
            .map_err(|source| RenderError::Collaborator {
                step: step.name.clone(),
                source,
            })?;
        let inject = self
            .policy
            .instances_to_inject(&rule, &fulfiller)
            .map_err(|source| RenderError::Collaborator {
                step: step.name.clone(),
                source,
            })?;

        let workflow_prefix = namespace::prefixed(template_name, &step.name);
        let (mut imported, renames) = self.inline_fulfiller(&workflow_prefix, &fulfiller)?;
        self.inject_download_step(&mut imported, &inject, &step.name)?;
        scope_renames.extend(renames);

        step.target = StepTarget::Template(imported.entrypoint.clone());
        self.record_step_arguments(step, available);

        self.register_output_instances(Some(step), &workflow_prefix, &fulfiller)?;

        debug!(step = %step.name, fulfiller = %fulfiller.id(), prefix = %workflow_prefix, "inlining fulfiller graph");
        let Workflow { templates, .. } = imported;
        let nested = self.render_scope(templates, &fulfiller.imports, &[], &workflow_prefix)?;

        Ok(self.register_step_instance_outputs(step, &workflow_prefix, &fulfiller, &nested))
    }

    /// Evaluates a step's guard against the arguments recorded for the
    /// enclosing template, then against the caller-held instances. A
    /// template never invoked with recorded arguments contributes no
    /// symbols, so its steps keep the deeper-resolution path.
    fn evaluate_guard(
        &mut self,
        enclosing: &str,
        step: &mut Step,
        scope_instances: &[InputInstanceRef],
        available: &mut IndexMap<ArtifactKey, InstanceHandle>,
    ) -> Result<(), RenderError> {
        let Some(expression) = step.when.clone() else {
            return Ok(());
        };

        // first source: arguments recorded for the enclosing template
        if let Some(arguments) = self.recorded_arguments.get(enclosing).cloned() {
            let bound: IndexSet<String> = arguments.iter().map(|argument| argument.artifact.name.clone()).collect();
            let evaluation = guard::evaluate(&expression, &bound).map_err(|source| RenderError::Guard {
                expression: expression.clone(),
                step: step.name.clone(),
                source,
            })?;

            if evaluation.satisfied
                && let Some(witness) = evaluation.witness
            {
                let argument = arguments
                    .iter()
                    .find(|argument| argument.artifact.name == witness)
                    .ok_or_else(|| RenderError::MissingWitnessArtifact {
                        name: witness.clone(),
                        step: step.name.clone(),
                    })?;

                debug!(step = %step.name, witness = %witness, "guard satisfied by recorded arguments");
                let reference = ArtifactRef::template_input(witness.clone()).to_string();
                let (emit_step, emit_template) = attach::passthrough_emit(enclosing, &step.name, &witness, &reference);
                self.push_processed(emit_template);

                if let Some(instance) = argument.instance.clone() {
                    available.insert(ArtifactKey::step(emit_step.name.clone(), witness), instance);
                }
                *step = emit_step;
                return Ok(());
            }
        }

        // second source: instances the caller already holds
        let bound: IndexSet<String> = scope_instances.iter().map(|instance| instance.name.clone()).collect();
        let evaluation = guard::evaluate(&expression, &bound).map_err(|source| RenderError::Guard {
            expression: expression.clone(),
            step: step.name.clone(),
            source,
        })?;

        // the guard is consumed by its one evaluation
        step.when = None;

        if evaluation.satisfied
            && let Some(witness) = evaluation.witness
        {
            let instance = scope_instances
                .iter()
                .find(|instance| instance.name == witness)
                .ok_or_else(|| RenderError::MissingWitnessArtifact {
                    name: witness.clone(),
                    step: step.name.clone(),
                })?;

            debug!(step = %step.name, witness = %witness, "guard satisfied by caller-held instance");
            // lineage now refers to the caller's instance, not a new name
            self.tracker.rename(&witness, &instance.id);
            let handle = self.tracker.find(&instance.id);

            let reference = ArtifactRef::global_output(witness.clone()).to_string();
            let (emit_step, emit_template) = attach::passthrough_emit(enclosing, &step.name, &witness, &reference);
            self.push_processed(emit_template);

            if let Some(handle) = handle {
                available.insert(ArtifactKey::step(emit_step.name.clone(), witness), handle);
            }
            *step = emit_step;
        }

        Ok(())
    }

    /// Records the step's input arguments against the *target* template
    /// name, resolving each to a known instance when possible. Re-recording
    /// overwrites: the latest invocation wins.
    fn record_step_arguments(&mut self, step: &Step, available: &IndexMap<ArtifactKey, InstanceHandle>) {
        let Some(target) = step.template_name() else { return };
        if step.arguments.is_empty() {
            return;
        }

        let mut recorded = Vec::new();
        for artifact in &step.arguments.artifacts {
            let instance = artifact
                .from
                .as_deref()
                .and_then(ArtifactRef::parse)
                .and_then(|reference| match reference {
                    ArtifactRef::GlobalOutput { artifact } => available.get(&ArtifactKey::workflow(artifact)),
                    ArtifactRef::StepOutput { step, artifact } => available.get(&ArtifactKey::step(step, artifact)),
                    ArtifactRef::TemplateInput { .. } => None,
                })
                .cloned();

            recorded.push(RecordedArgument {
                artifact: artifact.clone(),
                instance,
            });
        }

        self.recorded_arguments.insert(target.to_string(), recorded);
    }

    /// Workflow-level artifacts visible to a template, derived from the
    /// arguments recorded against it.
    fn available_for(&self, template_name: &str) -> IndexMap<ArtifactKey, InstanceHandle> {
        let mut available = IndexMap::new();
        if let Some(arguments) = self.recorded_arguments.get(template_name) {
            for argument in arguments {
                if let Some(instance) = &argument.instance {
                    available.insert(ArtifactKey::workflow(argument.artifact.name.clone()), instance.clone());
                }
            }
        }
        available
    }

    fn register_update_targets(
        &mut self,
        step: &Step,
        available: &IndexMap<ArtifactKey, InstanceHandle>,
        prefix: &str,
    ) -> Result<(), RenderError> {
        for declaration in &step.updates {
            let handle =
                available
                    .get(&ArtifactKey::workflow(declaration.name.clone()))
                    .ok_or_else(|| RenderError::UnknownUpdateTarget {
                        name: declaration.name.clone(),
                        step: step.name.clone(),
                    })?;

            let artifact = if prefix.is_empty() {
                declaration.name.clone()
            } else {
                namespace::prefixed(prefix, &declaration.name)
            };

            self.updates.push(UpdateSpec {
                id: handle.name(),
                artifact,
            });
        }
        Ok(())
    }

    /// Decodes a fulfiller's embedded graph, moves it into the prefix
    /// namespace, and materializes its declared data objects as emit
    /// steps. Returns the graph and the accumulated rename table.
    fn inline_fulfiller(&mut self, prefix: &str, fulfiller: &Fulfiller) -> Result<(Workflow, IndexMap<String, String>), RenderError> {
        let mut workflow = decode_graph(fulfiller)?;
        let mut renames = namespace::apply_prefix(prefix, &mut workflow);
        renames.extend(attach::add_declared_output_steps(&mut workflow, prefix));
        Ok((workflow, renames))
    }

    /// Splices exactly one download step for the given instances into the
    /// workflow. Idempotent per render: instances that already have a
    /// download step anywhere in this render are skipped.
    fn inject_download_step(
        &mut self,
        workflow: &mut Workflow,
        instances: &[InputInstanceRef],
        step_name: &str,
    ) -> Result<(), RenderError> {
        let batch: Vec<DownloadSpec> = instances
            .iter()
            .filter(|instance| !self.downloaded.contains(&instance.id))
            .map(|instance| DownloadSpec {
                id: instance.id.clone(),
                name: instance.name.clone(),
                path: format!("/{}.yaml", instance.name),
            })
            .collect();
        if batch.is_empty() {
            return Ok(());
        }

        debug!(count = batch.len(), step = %step_name, "attaching download step");
        let fragment = self
            .gateway
            .build_download_step(&batch)
            .map_err(|source| RenderError::Collaborator {
                step: step_name.to_string(),
                source,
            })?;
        attach::splice_download(workflow, fragment)?;

        for spec in &batch {
            self.downloaded.insert(spec.id.clone());
        }
        Ok(())
    }

    /// Wires caller-held instances onto the entrypoint invocation and
    /// splices their download step into the root workflow.
    fn add_input_instances(&mut self, workflow: &mut Workflow, instances: &[InputInstanceRef]) -> Result<(), RenderError> {
        if instances.is_empty() {
            return Ok(());
        }

        let mut available = IndexMap::new();
        for instance in instances {
            let (handle, _) = self.tracker.register(&instance.id);
            available.insert(ArtifactKey::workflow(instance.name.clone()), handle);
        }

        let entrypoint = workflow.entrypoint.clone();
        let Some(entrypoint_step) = attach::entrypoint_step_mut(workflow) else {
            return Err(RenderError::MissingEntrypoint { entrypoint });
        };
        for instance in instances {
            entrypoint_step.arguments.artifacts.push(Artifact::wired(
                instance.name.clone(),
                ArtifactRef::global_output(instance.name.clone()).to_string(),
            ));
        }

        // record now, so guards in the original entrypoint template can see
        // these inputs before the root template itself is processed
        let snapshot = entrypoint_step.clone();
        self.record_step_arguments(&snapshot, &available);

        self.inject_download_step(workflow, instances, attach::ENTRYPOINT_STEP)
    }

    /// Registers the data objects a fulfiller declares, with their
    /// dependency edges, under namespaced names. With no step (the root
    /// fulfiller) names stay as declared.
    fn register_output_instances(&mut self, step: Option<&Step>, prefix: &str, fulfiller: &Fulfiller) -> Result<(), RenderError> {
        if fulfiller.relations.is_empty() {
            return Ok(());
        }

        let mut known: IndexMap<String, Option<InstanceHandle>> = IndexMap::new();
        if let Some(step) = step
            && let Some(target) = step.template_name()
            && let Some(arguments) = self.recorded_arguments.get(target)
        {
            for argument in arguments {
                known.insert(argument.artifact.name.clone(), argument.instance.clone());
            }
        }

        for relation in &fulfiller.relations {
            let name = match step {
                Some(step) => {
                    // a step-level declaration aliases the object; either way
                    // the previously registered name moves into the namespace
                    if let Some(declared) = step.outputs.iter().find(|declaration| declaration.from == relation.name) {
                        let renamed = namespace::prefixed(prefix, &declared.from);
                        self.tracker.rename(&declared.name, &renamed);
                        renamed
                    } else {
                        let renamed = namespace::prefixed(prefix, &relation.name);
                        self.tracker.rename(&relation.name, &renamed);
                        renamed
                    }
                }
                None => relation.name.clone(),
            };

            let declaration = fulfiller
                .output_type(&relation.name)
                .ok_or_else(|| RenderError::UnknownOutputType {
                    name: relation.name.clone(),
                    fulfiller: fulfiller.id(),
                })?;

            let (handle, _) = self.tracker.register(&name);
            self.tracker.track_output(&handle, declaration.type_ref.clone(), declaration.backend.clone());
            known.insert(relation.name.clone(), Some(handle.clone()));

            for dependency in &relation.uses {
                let target = match known.get(dependency) {
                    Some(Some(existing)) => existing.clone(),
                    _ => self.tracker.register(dependency).0,
                };
                self.tracker.register_relation(&handle, &target);
            }
        }

        Ok(())
    }

    /// Maps the fulfiller's declared outputs to instance handles for the
    /// enclosing scope: nested declarations flow upward, the rest are
    /// registered under their namespaced names.
    fn register_step_instance_outputs(
        &mut self,
        step: &Step,
        prefix: &str,
        fulfiller: &Fulfiller,
        nested: &IndexMap<String, InstanceHandle>,
    ) -> IndexMap<String, InstanceHandle> {
        let mut outputs = IndexMap::new();

        for declaration in &fulfiller.outputs {
            if let Some(step_declaration) = step.outputs.iter().find(|candidate| candidate.name == declaration.name)
                && let Some(handle) = nested.get(&step_declaration.from)
            {
                outputs.insert(declaration.name.clone(), handle.clone());
                continue;
            }

            let (handle, _) = self.tracker.register(&namespace::prefixed(prefix, &declaration.name));
            outputs.insert(declaration.name.clone(), handle);
        }

        outputs
    }

    fn add_output_instances_step(&mut self, workflow: &mut Workflow) -> Result<(), RenderError> {
        if self.tracker.is_empty() {
            return Ok(());
        }

        let (instances, relations) = self.tracker.snapshot();
        debug!(instances = instances.len(), relations = relations.len(), "attaching upload step");
        let fragment = self
            .gateway
            .build_upload_step(&instances, &relations)
            .map_err(|source| RenderError::Collaborator {
                step: "upload-output-instances".to_string(),
                source,
            })?;
        attach::splice_trailing(workflow, fragment)
    }

    fn add_update_instances_step(&mut self, workflow: &mut Workflow) -> Result<(), RenderError> {
        if self.updates.is_empty() {
            return Ok(());
        }

        debug!(count = self.updates.len(), "attaching update step");
        let fragment = self
            .gateway
            .build_update_step(&self.updates)
            .map_err(|source| RenderError::Collaborator {
                step: "update-data-instances".to_string(),
                source,
            })?;
        attach::splice_trailing(workflow, fragment)
    }

    fn push_processed(&mut self, template: Template) -> usize {
        self.processed.push(template);
        self.processed.len() - 1
    }
}

/// Decodes the embedded step-graph of a fulfiller.
fn decode_graph(fulfiller: &Fulfiller) -> Result<Workflow, RenderError> {
    #[derive(Deserialize)]
    struct GraphEnvelope {
        workflow: Workflow,
    }

    let envelope: GraphEnvelope =
        serde_json::from_value(fulfiller.graph.clone()).map_err(|source| RenderError::Decode {
            fulfiller: fulfiller.id(),
            source,
        })?;
    Ok(envelope.workflow)
}
