//! Runtime facade
//!
//! One entry point for hosts: convert a UI graph, deploy it and drive the
//! resulting instances. Conversion is synchronous; everything that touches
//! the engine is async.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compiler::{compile, EditorModel};
use crate::config::CompilerConfig;
use crate::definition::{to_bpmn_xml, DefinitionConverter, ProcessDefinition};
use crate::engine::{
    Deployable, Deployment, InstanceStatus, ProcessEngine, Variables, WorkItem,
};
use crate::error::Result;
use crate::registry::OperationRegistry;
use crate::types::UiGraph;
use crate::validation::validate_graph;

/// Default deployment name
pub const DEFAULT_DEPLOYMENT_NAME: &str = "flowbox-deployment";

/// Facade options
#[derive(Debug, Clone)]
pub struct FacadeSettings {
    /// Directory receiving the editor model and markup of each conversion
    pub debug_artifact_dir: Option<PathBuf>,
    pub deployment_name: String,
}

impl Default for FacadeSettings {
    fn default() -> Self {
        Self {
            debug_artifact_dir: None,
            deployment_name: DEFAULT_DEPLOYMENT_NAME.to_string(),
        }
    }
}

/// Everything one conversion produces
#[derive(Debug, Clone)]
pub struct Conversion {
    pub editor_model: EditorModel,
    pub definition: ProcessDefinition,
    pub markup: String,
}

/// Outcome of convert, deploy and start in one call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub deployment: Deployment,
    pub instance: InstanceStatus,
}

impl ExecutionSummary {
    pub fn instance_id(&self) -> &str {
        &self.instance.instance_id
    }

    pub fn pending(&self) -> &[WorkItem] {
        &self.instance.pending
    }
}

/// Converts graphs and drives a process engine
pub struct ProcessFacade {
    config: CompilerConfig,
    converter: DefinitionConverter,
    engine: Arc<dyn ProcessEngine>,
    registry: Option<Arc<OperationRegistry>>,
    settings: FacadeSettings,
}

impl ProcessFacade {
    pub fn new(config: CompilerConfig, engine: Arc<dyn ProcessEngine>) -> Self {
        Self {
            converter: DefinitionConverter::from_config(&config),
            config,
            engine,
            registry: None,
            settings: FacadeSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: FacadeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Check operation ids against this registry during validation
    pub fn with_registry(mut self, registry: Arc<OperationRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn ProcessEngine> {
        &self.engine
    }

    /// Compile, convert and render a graph
    pub fn convert(&self, graph: &UiGraph) -> Result<Conversion> {
        for warning in validate_graph(graph, &self.config, self.registry.as_deref()) {
            log::warn!("Graph validation: {}", warning);
        }

        let editor_model = compile(graph, &self.config);
        let definition = self.converter.convert(&editor_model)?;
        let markup = to_bpmn_xml(&definition)?;

        if let Some(dir) = &self.settings.debug_artifact_dir {
            write_artifacts(dir, &definition.id, &editor_model, &markup);
        }

        log::info!(
            "Converted graph into process '{}' ({} elements, {} flows)",
            definition.id,
            definition.elements.len(),
            definition.flows.len()
        );
        Ok(Conversion {
            editor_model,
            definition,
            markup,
        })
    }

    /// Convert a graph given as UI JSON text
    pub fn convert_json(&self, json: &str) -> Result<Conversion> {
        self.convert(&UiGraph::from_json_str(json)?)
    }

    pub async fn deploy(&self, graph: &UiGraph) -> Result<Deployment> {
        let conversion = self.convert(graph)?;
        self.deploy_conversion(conversion).await
    }

    /// Deploy an existing conversion
    pub async fn deploy_conversion(&self, conversion: Conversion) -> Result<Deployment> {
        let deployable = Deployable::new(
            self.settings.deployment_name.clone(),
            conversion.markup,
            conversion.definition,
        );
        self.engine.deploy(deployable).await
    }

    /// Convert, deploy and start
    pub async fn execute(&self, graph: &UiGraph, variables: Variables) -> Result<ExecutionSummary> {
        let deployment = self.deploy(graph).await?;
        let instance = self.engine.start(&deployment.process_key, variables).await?;
        Ok(ExecutionSummary {
            deployment,
            instance,
        })
    }

    pub async fn start(&self, process_key: &str, variables: Variables) -> Result<InstanceStatus> {
        self.engine.start(process_key, variables).await
    }

    pub async fn status(&self, instance_id: &str) -> Result<InstanceStatus> {
        self.engine.status(instance_id).await
    }

    pub async fn list_active(&self) -> Vec<InstanceStatus> {
        self.engine.list_active().await
    }

    pub async fn list_completed(&self) -> Vec<InstanceStatus> {
        self.engine.list_completed().await
    }

    pub async fn pending_user_steps(&self, instance_id: &str) -> Result<Vec<WorkItem>> {
        self.engine.pending_user_steps(instance_id).await
    }

    pub async fn complete(
        &self,
        instance_id: &str,
        node_id: &str,
        variables: Variables,
    ) -> Result<InstanceStatus> {
        self.engine.complete(instance_id, node_id, variables).await
    }

    pub async fn suspend(&self, instance_id: &str) -> Result<()> {
        self.engine.suspend(instance_id).await
    }

    pub async fn resume(&self, instance_id: &str) -> Result<()> {
        self.engine.resume(instance_id).await
    }

    pub async fn terminate(&self, instance_id: &str, reason: Option<String>) -> Result<()> {
        self.engine.terminate(instance_id, reason).await
    }
}

/// Best effort: failures are logged and swallowed
fn write_artifacts(dir: &Path, process_id: &str, model: &EditorModel, markup: &str) {
    if let Err(e) = fs::create_dir_all(dir) {
        log::warn!("Cannot create artifact directory {}: {}", dir.display(), e);
        return;
    }

    let editor_path = dir.join(format!("{}.editor.json", process_id));
    match model.to_json_pretty() {
        Ok(json) => {
            if let Err(e) = fs::write(&editor_path, json) {
                log::warn!("Failed to write {}: {}", editor_path.display(), e);
            }
        }
        Err(e) => log::warn!("Failed to serialize editor model: {}", e),
    }

    let markup_path = dir.join(format!("{}.bpmn20.xml", process_id));
    if let Err(e) = fs::write(&markup_path, markup) {
        log::warn!("Failed to write {}: {}", markup_path.display(), e);
    }
    log::debug!("Wrote debug artifacts to {}", dir.display());
}
