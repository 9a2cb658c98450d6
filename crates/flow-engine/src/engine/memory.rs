//! In-memory process engine
//!
//! Runs deployed definitions by walking tokens through the element graph:
//!
//! - service steps are dispatched; script steps only when they carry an operation id
//! - user steps park the token as a work item until `complete` is called
//! - parallel gateways fork on every outgoing flow and join once every incoming flow arrived
//! - exclusive gateways take the first flow whose condition holds, else the first unconditioned one
//!
//! Each instance sits behind its own `tokio::sync::Mutex`, so calls on one
//! instance are serialized while different instances progress independently.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::Context;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    Deployable, Deployment, InstanceState, InstanceStatus, ProcessEngine, Variables, WorkItem,
};
use crate::definition::{ElementKind, FlowElement, ProcessDefinition, SequenceFlow};
use crate::dispatch::OperationDispatcher;
use crate::error::{FlowError, Result};
use crate::events::{EventSink, LogEventSink, ProcessEvent};
use crate::handler::ExecutionContext;

/// Limits for the in-memory engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Maximum elements one instance may visit before it is failed
    pub max_steps: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { max_steps: 10_000 }
    }
}

struct Instance {
    id: String,
    seq: u64,
    definition: Arc<ProcessDefinition>,
    context: Context,
    variables: Variables,
    state: InstanceState,
    tokens: VecDeque<String>,
    arrivals: HashMap<String, usize>,
    pending: Vec<WorkItem>,
    detail: Option<String>,
    steps: usize,
}

impl Instance {
    fn status(&self) -> InstanceStatus {
        InstanceStatus {
            instance_id: self.id.clone(),
            process_key: self.definition.id.clone(),
            state: self.state,
            pending: self.pending.clone(),
            variables: self.variables.clone(),
            detail: self.detail.clone(),
        }
    }

    fn ensure_state(&self, expected: InstanceState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(FlowError::InstanceNotActive {
                instance_id: self.id.clone(),
                state: self.state.to_string(),
            })
        }
    }

    async fn merge(&mut self, variables: Variables) {
        for (key, value) in variables {
            self.context.set(&key, value.clone()).await;
            self.variables.insert(key, value);
        }
    }
}

/// Engine keeping deployments and instances in memory
pub struct InMemoryEngine {
    dispatcher: OperationDispatcher,
    events: Arc<dyn EventSink>,
    settings: EngineSettings,
    deployments: RwLock<HashMap<String, Arc<ProcessDefinition>>>,
    instances: RwLock<HashMap<String, Arc<Mutex<Instance>>>>,
    next_seq: AtomicU64,
}

impl InMemoryEngine {
    pub fn new(dispatcher: OperationDispatcher) -> Self {
        Self {
            dispatcher,
            events: Arc::new(LogEventSink),
            settings: EngineSettings::default(),
            deployments: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn dispatcher(&self) -> &OperationDispatcher {
        &self.dispatcher
    }

    /// Process keys with a deployment, sorted
    pub fn deployed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.deployments.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn emit(&self, event: ProcessEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!("Failed to send process event: {}", e);
        }
    }

    fn instance(&self, instance_id: &str) -> Result<Arc<Mutex<Instance>>> {
        self.instances
            .read()
            .get(instance_id)
            .cloned()
            .ok_or_else(|| FlowError::UnknownInstance(instance_id.to_string()))
    }

    async fn snapshot(&self, keep: impl Fn(InstanceState) -> bool) -> Vec<InstanceStatus> {
        let handles: Vec<_> = self.instances.read().values().cloned().collect();
        let mut found = Vec::new();
        for handle in handles {
            let instance = handle.lock().await;
            if keep(instance.state) {
                found.push((instance.seq, instance.status()));
            }
        }
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, status)| status).collect()
    }

    /// Drain the token queue until it is empty or the instance stops
    async fn advance(&self, instance: &mut Instance) -> Result<()> {
        while let Some(node_id) = instance.tokens.pop_front() {
            instance.steps += 1;
            if instance.steps > self.settings.max_steps {
                let err = FlowError::engine(format!(
                    "Instance '{}' exceeded the step limit of {}",
                    instance.id, self.settings.max_steps
                ));
                return Err(self.fail(instance, err));
            }

            let Some(element) = instance.definition.element(&node_id).cloned() else {
                let err = FlowError::engine(format!(
                    "Instance '{}' reached unknown element '{}'",
                    instance.id, node_id
                ));
                return Err(self.fail(instance, err));
            };

            match &element.kind {
                ElementKind::StartEvent => self.follow(instance, &element),
                ElementKind::EndEvent => {}
                ElementKind::ServiceTask { .. } => {
                    self.run_step(instance, &element).await?;
                    self.follow(instance, &element);
                }
                ElementKind::ScriptTask { .. } => {
                    if element.operation_id().is_some() {
                        self.run_step(instance, &element).await?;
                    }
                    self.follow(instance, &element);
                }
                ElementKind::UserTask { .. } => self.park(instance, &element),
                ElementKind::ParallelGateway => {
                    let expected = instance.definition.incoming(&element.id).count();
                    if expected > 1 {
                        let arrived = instance.arrivals.entry(element.id.clone()).or_default();
                        *arrived += 1;
                        if *arrived < expected {
                            continue;
                        }
                        instance.arrivals.remove(&element.id);
                    }
                    self.follow(instance, &element);
                }
                ElementKind::ExclusiveGateway => {
                    let chosen = choose_flow(&instance.definition, &element.id, &instance.variables)
                        .map(|flow| flow.target.clone());
                    match chosen {
                        Some(target) => instance.tokens.push_back(target),
                        None => {
                            let err = FlowError::engine(format!(
                                "No outgoing flow of gateway '{}' can be taken",
                                element.id
                            ));
                            return Err(self.fail(instance, err));
                        }
                    }
                }
            }
        }

        if instance.state == InstanceState::Active && instance.pending.is_empty() {
            if !instance.arrivals.is_empty() {
                log::warn!(
                    "Instance '{}' finished with unjoined branches at {:?}",
                    instance.id,
                    instance.arrivals.keys().collect::<Vec<_>>()
                );
            }
            instance.state = InstanceState::Completed;
            log::info!("Instance '{}' completed", instance.id);
            self.emit(ProcessEvent::InstanceCompleted {
                instance_id: instance.id.clone(),
            });
        }
        Ok(())
    }

    /// Queue the targets of every outgoing flow whose condition holds
    fn follow(&self, instance: &mut Instance, element: &FlowElement) {
        let targets: Vec<String> = instance
            .definition
            .outgoing(&element.id)
            .filter(|flow| {
                flow.condition
                    .as_deref()
                    .is_none_or(|c| condition_holds(c, &instance.variables))
            })
            .map(|flow| flow.target.clone())
            .collect();
        instance.tokens.extend(targets);
    }

    fn park(&self, instance: &mut Instance, element: &FlowElement) {
        let item = WorkItem {
            task_id: Uuid::new_v4().to_string(),
            node_id: element.id.clone(),
            name: element.name.clone(),
            operation_id: element.operation_id().map(String::from),
        };
        log::debug!(
            "Instance '{}' waiting on user step '{}'",
            instance.id,
            element.id
        );
        self.emit(ProcessEvent::WaitingForUser {
            instance_id: instance.id.clone(),
            node_id: item.node_id.clone(),
            task_id: item.task_id.clone(),
        });
        instance.pending.push(item);
    }

    /// Dispatch the element's operation and absorb the variables it wrote
    async fn run_step(&self, instance: &mut Instance, element: &FlowElement) -> Result<()> {
        self.emit(ProcessEvent::StepStarted {
            instance_id: instance.id.clone(),
            node_id: element.id.clone(),
            operation_id: element.operation_id().map(String::from),
        });

        let ctx = ExecutionContext::new(
            instance.id.clone(),
            instance.definition.id.clone(),
            element.clone(),
            instance.context.clone(),
        );
        match self.dispatcher.dispatch(&ctx).await {
            Ok(()) => {
                for key in ctx.written_keys() {
                    if let Some(value) = instance.context.get::<Value>(&key).await {
                        instance.variables.insert(key, value);
                    }
                }
                self.emit(ProcessEvent::StepCompleted {
                    instance_id: instance.id.clone(),
                    node_id: element.id.clone(),
                });
                Ok(())
            }
            Err(err) => {
                self.emit(ProcessEvent::StepFailed {
                    instance_id: instance.id.clone(),
                    node_id: element.id.clone(),
                    error: err.to_string(),
                });
                Err(self.fail(instance, err))
            }
        }
    }

    fn fail(&self, instance: &mut Instance, err: FlowError) -> FlowError {
        log::error!("Instance '{}' failed: {}", instance.id, err);
        instance.state = InstanceState::Failed;
        instance.detail = Some(err.to_string());
        instance.tokens.clear();
        instance.pending.clear();
        self.emit(ProcessEvent::InstanceFailed {
            instance_id: instance.id.clone(),
            error: err.to_string(),
        });
        err
    }
}

#[async_trait]
impl ProcessEngine for InMemoryEngine {
    async fn deploy(&self, deployable: Deployable) -> Result<Deployment> {
        let definition = deployable.definition();
        if definition.start_events().next().is_none() {
            return Err(FlowError::engine(format!(
                "Process '{}' has no start event",
                definition.id
            )));
        }

        let deployment = Deployment {
            deployment_id: Uuid::new_v4().to_string(),
            process_key: deployable.process_key().to_string(),
        };
        let replaced = self
            .deployments
            .write()
            .insert(deployment.process_key.clone(), Arc::new(definition.clone()))
            .is_some();

        log::info!(
            "Deployed '{}' as process '{}' ({}){}",
            deployable.name(),
            deployment.process_key,
            deployment.deployment_id,
            if replaced { ", replacing the previous version" } else { "" }
        );
        self.emit(ProcessEvent::Deployed {
            deployment_id: deployment.deployment_id.clone(),
            process_key: deployment.process_key.clone(),
        });
        Ok(deployment)
    }

    async fn start(&self, process_key: &str, variables: Variables) -> Result<InstanceStatus> {
        let definition = self
            .deployments
            .read()
            .get(process_key)
            .cloned()
            .ok_or_else(|| FlowError::UnknownProcess(process_key.to_string()))?;

        let mut instance = Instance {
            id: Uuid::new_v4().to_string(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            tokens: definition.start_events().map(|e| e.id.clone()).collect(),
            definition,
            context: Context::new(),
            variables: Variables::new(),
            state: InstanceState::Active,
            arrivals: HashMap::new(),
            pending: Vec::new(),
            detail: None,
            steps: 0,
        };
        instance.merge(variables).await;

        let instance_id = instance.id.clone();
        let handle = Arc::new(Mutex::new(instance));
        self.instances
            .write()
            .insert(instance_id.clone(), Arc::clone(&handle));

        log::info!("Started instance '{}' of '{}'", instance_id, process_key);
        self.emit(ProcessEvent::InstanceStarted {
            instance_id,
            process_key: process_key.to_string(),
        });

        let mut instance = handle.lock().await;
        self.advance(&mut instance).await?;
        Ok(instance.status())
    }

    async fn status(&self, instance_id: &str) -> Result<InstanceStatus> {
        let handle = self.instance(instance_id)?;
        let instance = handle.lock().await;
        Ok(instance.status())
    }

    async fn list_active(&self) -> Vec<InstanceStatus> {
        self.snapshot(|state| state.is_open()).await
    }

    async fn list_completed(&self) -> Vec<InstanceStatus> {
        self.snapshot(|state| state == InstanceState::Completed).await
    }

    async fn pending_user_steps(&self, instance_id: &str) -> Result<Vec<WorkItem>> {
        let handle = self.instance(instance_id)?;
        let instance = handle.lock().await;
        Ok(instance.pending.clone())
    }

    async fn complete(
        &self,
        instance_id: &str,
        node_id: &str,
        variables: Variables,
    ) -> Result<InstanceStatus> {
        let handle = self.instance(instance_id)?;
        let mut instance = handle.lock().await;
        instance.ensure_state(InstanceState::Active)?;

        let position = instance
            .pending
            .iter()
            .position(|item| item.node_id == node_id || item.task_id == node_id)
            .ok_or_else(|| FlowError::WorkItemNotFound {
                instance_id: instance_id.to_string(),
                node_id: node_id.to_string(),
            })?;
        let item = instance.pending.remove(position);
        instance.merge(variables).await;

        let Some(element) = instance.definition.element(&item.node_id).cloned() else {
            let err = FlowError::engine(format!("Work item '{}' has no element", item.node_id));
            return Err(self.fail(&mut instance, err));
        };

        if element.operation_id().is_some() {
            self.run_step(&mut instance, &element).await?;
        } else {
            self.emit(ProcessEvent::StepCompleted {
                instance_id: instance.id.clone(),
                node_id: element.id.clone(),
            });
        }
        log::debug!("Completed user step '{}' in '{}'", element.id, instance_id);

        self.follow(&mut instance, &element);
        self.advance(&mut instance).await?;
        Ok(instance.status())
    }

    async fn suspend(&self, instance_id: &str) -> Result<()> {
        let handle = self.instance(instance_id)?;
        let mut instance = handle.lock().await;
        instance.ensure_state(InstanceState::Active)?;
        instance.state = InstanceState::Suspended;
        log::info!("Suspended instance '{}'", instance_id);
        self.emit(ProcessEvent::InstanceSuspended {
            instance_id: instance_id.to_string(),
        });
        Ok(())
    }

    async fn resume(&self, instance_id: &str) -> Result<()> {
        let handle = self.instance(instance_id)?;
        let mut instance = handle.lock().await;
        instance.ensure_state(InstanceState::Suspended)?;
        instance.state = InstanceState::Active;
        log::info!("Resumed instance '{}'", instance_id);
        self.emit(ProcessEvent::InstanceResumed {
            instance_id: instance_id.to_string(),
        });
        Ok(())
    }

    async fn terminate(&self, instance_id: &str, reason: Option<String>) -> Result<()> {
        let handle = self.instance(instance_id)?;
        let mut instance = handle.lock().await;
        if !instance.state.is_open() {
            return Err(FlowError::InstanceNotActive {
                instance_id: instance_id.to_string(),
                state: instance.state.to_string(),
            });
        }
        instance.state = InstanceState::Terminated;
        instance.detail = reason.clone();
        instance.tokens.clear();
        instance.pending.clear();
        log::info!("Terminated instance '{}'", instance_id);
        self.emit(ProcessEvent::InstanceTerminated {
            instance_id: instance_id.to_string(),
            reason,
        });
        Ok(())
    }
}

/// First outgoing flow whose condition holds, else the first unconditioned one
fn choose_flow<'a>(
    definition: &'a ProcessDefinition,
    gateway_id: &'a str,
    variables: &Variables,
) -> Option<&'a SequenceFlow> {
    let mut fallback = None;
    for flow in definition.outgoing(gateway_id) {
        match flow.condition.as_deref() {
            Some(condition) if condition_holds(condition, variables) => return Some(flow),
            Some(_) => {}
            None => {
                fallback.get_or_insert(flow);
            }
        }
    }
    fallback
}

/// Evaluate `${var}`, `${!var}` or `${var == 'literal'}`
pub fn condition_holds(expression: &str, variables: &Variables) -> bool {
    let expression = expression.trim();
    let body = expression
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(expression)
        .trim();

    if let Some((name, literal)) = body.split_once("==") {
        let literal = literal.trim().trim_matches(|c| c == '\'' || c == '"');
        return variables
            .get(name.trim())
            .is_some_and(|value| value_text(value) == literal);
    }
    match body.strip_prefix('!') {
        Some(name) => !truthy(variables.get(name.trim())),
        None => truthy(variables.get(body)),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(_) => true,
    }
}
