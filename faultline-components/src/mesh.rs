//! The request lifecycle engine
//!
//! [`ServiceMesh`] is a single [`Component`] that owns the architecture, every
//! instance, the load balancers, the live requests and the run's [`SimRng`].
//! It drives each request through its states:
//!
//! 1. **Send**: the service's load balancer picks a running instance and the
//!    transit delay is drawn once.
//! 2. **Arrive**: the instance must still be running; the CPU demand is drawn
//!    and a process is handed to the instance's scheduler.
//! 3. **Process**: burst completions come back as events until the process
//!    finishes.
//! 4. **Fan out**: dependencies fire child requests; the parent waits for all
//!    of them. Any child failing fails the parent with `DEPENDENCY_FAILED`.
//! 5. **Return**: the result travels back and the request terminates.
//!
//! Cancellation (timeouts, killed instances) can hit a request in any live
//! state. Pending events of a canceled request are removed from the queue and
//! every handler additionally checks that its request is still in the state
//! it expects, so stale events are ignored.
//!
//! Finished requests are dropped as soon as their terminal notification has
//! reached every listener.

use crate::architecture::{Architecture, DependencyRef, OperationId, ServiceId};
use crate::cpu::{CpuProcess, ProcessId};
use crate::dependency::resolve_dependencies;
use crate::error::RequestFailedReason;
use crate::generator::LoadGenerator;
use crate::instance::{InstanceId, InstanceState, MicroserviceInstance};
use crate::listener::{fan_out, ListenerHandle, SharedListener};
use crate::load_balancer::{Candidate, LoadBalancer};
use crate::request::{Request, RequestId, RequestState};
use faultline_core::{
    Component, ConfigurationError, InvariantViolation, Key, Priority, Scheduler, SimError, SimRng,
    SimulationConfig,
};
use std::collections::BTreeMap;
use tracing::{debug, info, trace, warn};

/// Events handled by the [`ServiceMesh`].
#[derive(Debug, Clone)]
pub enum MeshEvent {
    /// An external call to `operation`; `caller` is notified first.
    Call {
        operation: OperationId,
        caller: Option<ListenerHandle>,
    },
    /// A load generator's turn to emit.
    Generate { generator: usize },
    Arrive { request: RequestId },
    BurstDone { instance: InstanceId, thread: usize },
    ResultArrived { request: RequestId },
    /// Schedule with [`Priority::VeryHigh`] so it beats completions at the same instant.
    Cancel {
        request: RequestId,
        reason: RequestFailedReason,
    },
    KillInstances { service: ServiceId, count: usize },
    SummonInstances { service: ServiceId, count: usize },
    InstanceReady { instance: InstanceId },
}

pub struct ServiceMesh {
    architecture: Architecture,
    rng: SimRng,
    instances: BTreeMap<InstanceId, MicroserviceInstance>,
    by_service: Vec<Vec<InstanceId>>,
    balancers: Vec<LoadBalancer>,
    requests: BTreeMap<RequestId, Request>,
    generators: Vec<LoadGenerator>,
    listeners: Vec<SharedListener>,
    next_request: u64,
    next_process: u64,
    next_instance: u64,
}

fn unknown_request(id: RequestId) -> InvariantViolation {
    InvariantViolation::UnknownEntity {
        kind: "request",
        id: id.0,
    }
}

fn unknown_instance(id: InstanceId) -> InvariantViolation {
    InvariantViolation::UnknownEntity {
        kind: "instance",
        id: id.0,
    }
}

impl ServiceMesh {
    /// Builds the mesh with every service's initial instances already running.
    pub fn new(architecture: Architecture, config: &SimulationConfig) -> Result<Self, ConfigurationError> {
        let balancers = architecture
            .services()
            .iter()
            .map(|service| LoadBalancer::new(service.load_balancing()))
            .collect();
        let mut mesh = Self {
            by_service: vec![Vec::new(); architecture.services().len()],
            architecture,
            rng: config.rng(),
            instances: BTreeMap::new(),
            balancers,
            requests: BTreeMap::new(),
            generators: Vec::new(),
            listeners: Vec::new(),
            next_request: 0,
            next_process: 0,
            next_instance: 0,
        };
        for index in 0..mesh.architecture.services().len() {
            let initial = mesh.architecture.services()[index].initial_instances();
            for _ in 0..initial {
                mesh.spawn_instance(ServiceId(index), InstanceState::Running)?;
            }
        }
        info!(
            services = mesh.architecture.services().len(),
            instances = mesh.instances.len(),
            seed = config.seed,
            "Service mesh created"
        );
        Ok(mesh)
    }

    /// Registers a listener that is attached to every request created from
    /// now on, after the request's own caller.
    pub fn add_listener(&mut self, listener: SharedListener) {
        self.listeners.push(listener);
    }

    /// Registers a generator and returns its index for [`MeshEvent::Generate`].
    pub fn add_generator(&mut self, generator: LoadGenerator) -> usize {
        self.generators.push(generator);
        self.generators.len() - 1
    }

    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    pub fn generators(&self) -> &[LoadGenerator] {
        &self.generators
    }

    pub fn rng(&self) -> &SimRng {
        &self.rng
    }

    pub fn instance(&self, id: InstanceId) -> Option<&MicroserviceInstance> {
        self.instances.get(&id)
    }

    /// Every instance ever created for `service`, in creation order.
    pub fn instances_of(&self, service: ServiceId) -> impl Iterator<Item = &MicroserviceInstance> + '_ {
        self.by_service
            .get(service.0)
            .into_iter()
            .flatten()
            .filter_map(|id| self.instances.get(id))
    }

    pub fn running_instances(&self, service: ServiceId) -> usize {
        self.instances_of(service).filter(|i| i.is_running()).count()
    }

    pub fn request(&self, id: RequestId) -> Option<&Request> {
        self.requests.get(&id)
    }

    /// Requests that have not reached a terminal state yet.
    pub fn live_requests(&self) -> usize {
        self.requests.len()
    }

    fn spawn_instance(&mut self, service: ServiceId, state: InstanceState) -> Result<InstanceId, ConfigurationError> {
        let microservice = self
            .architecture
            .service(service)
            .ok_or_else(|| ConfigurationError::UnknownService(service.to_string()))?;
        self.next_instance += 1;
        let id = InstanceId(self.next_instance);
        self.instances
            .insert(id, MicroserviceInstance::new(id, microservice, state)?);
        self.by_service[service.0].push(id);
        debug!(instance = %id, service = %microservice.name(), ?state, "Instance created");
        Ok(id)
    }

    fn create_request(
        &mut self,
        operation: OperationId,
        parent: Option<RequestId>,
        origin: Option<DependencyRef>,
        caller: Option<SharedListener>,
        scheduler: &Scheduler,
    ) -> RequestId {
        self.next_request += 1;
        let id = RequestId(self.next_request);
        let mut listeners: Vec<SharedListener> = caller.into_iter().collect();
        listeners.extend(self.listeners.iter().cloned());
        self.requests.insert(
            id,
            Request::new(id, operation, parent, origin, scheduler.time(), listeners),
        );
        trace!(request = %id, %operation, parent = ?parent, "Request created");
        id
    }

    fn request_mut(&mut self, id: RequestId) -> Result<&mut Request, InvariantViolation> {
        self.requests.get_mut(&id).ok_or_else(|| unknown_request(id))
    }

    fn is_in_state(&self, id: RequestId, state: RequestState) -> bool {
        self.requests.get(&id).is_some_and(|r| r.state() == state)
    }

    fn candidates(&self, service: ServiceId) -> Vec<Candidate> {
        self.instances_of(service)
            .filter(|instance| instance.is_running())
            .map(|instance| Candidate {
                instance: instance.id(),
                relative_work_demand: instance.relative_work_demand(),
            })
            .collect()
    }

    fn send(&mut self, me: Key<MeshEvent>, scheduler: &mut Scheduler, id: RequestId) -> Result<(), SimError> {
        let request = self.requests.get(&id).ok_or_else(|| unknown_request(id))?;
        let (operation, origin) = (request.operation(), request.origin());
        let service = self
            .architecture
            .operation(operation)
            .ok_or(InvariantViolation::UnknownEntity {
                kind: "operation",
                id: operation.0 as u64,
            })?
            .service();

        let candidates = self.candidates(service);
        let chosen = match self.balancers[service.0].next_instance(&candidates, &mut self.rng) {
            Ok(instance) => instance,
            Err(reason) => return self.cancel(me, scheduler, id, reason),
        };
        let transit = match origin {
            Some(edge) => self
                .architecture
                .dependency(edge)
                .ok_or_else(|| InvariantViolation::Inconsistent(format!("dangling dependency {edge:?}")))?
                .transit_delay(self.architecture.network_latency(), &mut self.rng)?,
            None => self.architecture.network_latency().sample_delay(&mut self.rng)?,
        };

        let request = self.request_mut(id)?;
        request.instance = Some(chosen);
        request.transition(RequestState::Sent)?;
        let arrival = scheduler.schedule(transit, me, MeshEvent::Arrive { request: id });
        request.pending_events.push(arrival);
        trace!(request = %id, instance = %chosen, %transit, "Request sent");

        let now = scheduler.time();
        let request = &self.requests[&id];
        fan_out(request, |l| l.on_request_send(request, now))
    }

    fn arrive(&mut self, me: Key<MeshEvent>, scheduler: &mut Scheduler, id: RequestId) -> Result<(), SimError> {
        if !self.is_in_state(id, RequestState::Sent) {
            return Ok(());
        }
        let now = scheduler.time();
        let request = self.request_mut(id)?;
        let operation = request.operation();
        let target = request
            .instance
            .ok_or_else(|| InvariantViolation::Inconsistent(format!("{id} was sent without an instance")))?;
        if !self.instances.get(&target).is_some_and(MicroserviceInstance::is_running) {
            return self.cancel(me, scheduler, id, RequestFailedReason::InstanceKilled);
        }

        let request = self.request_mut(id)?;
        request.transition(RequestState::ArrivedAtInstance)?;
        let request = &self.requests[&id];
        fan_out(request, |l| l.on_request_arrival_at_target(request, now))?;

        let demand = self
            .architecture
            .operation(operation)
            .ok_or(InvariantViolation::UnknownEntity {
                kind: "operation",
                id: operation.0 as u64,
            })?
            .demand()
            .sample_non_negative(&mut self.rng)?
            .round() as u64;
        if demand == 0 {
            return self.finish_processing(me, scheduler, id);
        }

        self.next_process += 1;
        let process = CpuProcess::new(ProcessId(self.next_process), id, demand, now);
        self.instances
            .get_mut(&target)
            .ok_or_else(|| unknown_instance(target))?
            .admit(process)?;
        self.request_mut(id)?.transition(RequestState::EnqueuedForCpu)?;
        self.dispatch(me, scheduler, target)
    }

    fn dispatch(&mut self, me: Key<MeshEvent>, scheduler: &mut Scheduler, id: InstanceId) -> Result<(), SimError> {
        let instance = self.instances.get_mut(&id).ok_or_else(|| unknown_instance(id))?;
        for burst in instance.start_bursts()? {
            let event = scheduler.schedule(
                burst.duration,
                me,
                MeshEvent::BurstDone {
                    instance: id,
                    thread: burst.thread,
                },
            );
            instance.attach_event(burst.thread, event);
            if let Some(request) = self.requests.get_mut(&burst.request) {
                if request.state() == RequestState::EnqueuedForCpu {
                    request.transition(RequestState::Processing)?;
                }
            }
        }
        Ok(())
    }

    fn burst_done(
        &mut self,
        me: Key<MeshEvent>,
        scheduler: &mut Scheduler,
        id: InstanceId,
        thread: usize,
    ) -> Result<(), SimError> {
        let instance = self.instances.get_mut(&id).ok_or_else(|| unknown_instance(id))?;
        if !instance.is_running() {
            return Ok(());
        }
        if let Some(request) = instance.complete_burst(thread)? {
            if self.is_in_state(request, RequestState::Processing) {
                self.finish_processing(me, scheduler, request)?;
            }
        }
        self.dispatch(me, scheduler, id)
    }

    /// CPU work is done: fire dependencies or complete right away.
    fn finish_processing(&mut self, me: Key<MeshEvent>, scheduler: &mut Scheduler, id: RequestId) -> Result<(), SimError> {
        let operation = self.requests.get(&id).ok_or_else(|| unknown_request(id))?.operation();
        let operation = self
            .architecture
            .operation(operation)
            .ok_or(InvariantViolation::UnknownEntity {
                kind: "operation",
                id: operation.0 as u64,
            })?;
        let fired = resolve_dependencies(operation, &mut self.rng);
        if fired.is_empty() {
            return self.complete(me, scheduler, id);
        }

        let request = self.request_mut(id)?;
        request.transition(RequestState::AwaitingDependencies)?;
        request.pending_children = fired.len();
        debug!(request = %id, children = fired.len(), "Dependencies fired");

        for edge in fired {
            // A child failing synchronously fails the parent; stop spawning then.
            if !self.is_in_state(id, RequestState::AwaitingDependencies) {
                break;
            }
            let target = self
                .architecture
                .dependency(edge)
                .ok_or_else(|| InvariantViolation::Inconsistent(format!("dangling dependency {edge:?}")))?
                .target();
            let child = self.create_request(target, Some(id), Some(edge), None, scheduler);
            self.send(me, scheduler, child)?;
        }
        Ok(())
    }

    fn complete(&mut self, me: Key<MeshEvent>, scheduler: &mut Scheduler, id: RequestId) -> Result<(), SimError> {
        let latency = self.architecture.network_latency().sample_delay(&mut self.rng)?;
        let request = self.request_mut(id)?;
        request.transition(RequestState::Completed)?;
        request.transition(RequestState::ResultTraveling)?;
        let event = scheduler.schedule(latency, me, MeshEvent::ResultArrived { request: id });
        request.pending_events.push(event);
        Ok(())
    }

    fn result_arrived(&mut self, me: Key<MeshEvent>, scheduler: &mut Scheduler, id: RequestId) -> Result<(), SimError> {
        if !self.is_in_state(id, RequestState::ResultTraveling) {
            return Ok(());
        }
        let mut request = self.requests.remove(&id).ok_or_else(|| unknown_request(id))?;
        request.transition(RequestState::ArrivedAtRequester)?;
        for event in request.pending_events.drain(..) {
            scheduler.cancel(event);
        }
        let now = scheduler.time();
        trace!(request = %id, latency = %(now - request.created_at()), "Result arrived");
        fan_out(&request, |l| l.on_request_result_arrived_at_requester(&request, now))?;

        if let Some(parent) = request.parent() {
            if let Some(waiting) = self.requests.get_mut(&parent) {
                if waiting.state() == RequestState::AwaitingDependencies {
                    waiting.pending_children = waiting.pending_children.saturating_sub(1);
                    if waiting.pending_children == 0 {
                        return self.complete(me, scheduler, parent);
                    }
                }
            }
        }
        Ok(())
    }

    /// Fails a live request. A no-op for requests that already terminated.
    fn cancel(
        &mut self,
        me: Key<MeshEvent>,
        scheduler: &mut Scheduler,
        id: RequestId,
        reason: RequestFailedReason,
    ) -> Result<(), SimError> {
        let Some(mut request) = self.requests.remove(&id) else {
            return Ok(());
        };
        request.transition(RequestState::Canceled(reason))?;
        for event in request.pending_events.drain(..) {
            scheduler.cancel(event);
        }
        let now = scheduler.time();
        warn!(request = %id, %reason, time = %now, "Request failed");
        fan_out(&request, |l| l.on_request_failed(&request, now, reason))?;

        if let Some(parent) = request.parent() {
            if self.is_in_state(parent, RequestState::AwaitingDependencies) {
                self.cancel(me, scheduler, parent, RequestFailedReason::DependencyFailed)?;
            }
        }
        Ok(())
    }

    fn kill_instances(
        &mut self,
        me: Key<MeshEvent>,
        scheduler: &mut Scheduler,
        service: ServiceId,
        count: usize,
    ) -> Result<(), SimError> {
        let victims: Vec<InstanceId> = self
            .instances_of(service)
            .filter(|instance| instance.is_running())
            .map(MicroserviceInstance::id)
            .take(count)
            .collect();
        info!(%service, requested = count, killed = victims.len(), "Killing instances");

        for victim in victims {
            let killed = self
                .instances
                .get_mut(&victim)
                .ok_or_else(|| unknown_instance(victim))?
                .kill();
            for event in killed.burst_events {
                scheduler.cancel(event);
            }
            let mut doomed = killed.requests;
            let hosted: Vec<RequestId> = self
                .requests
                .values()
                .filter(|r| r.instance() == Some(victim) && r.state().is_hosted())
                .map(Request::id)
                .filter(|id| !doomed.contains(id))
                .collect();
            doomed.extend(hosted);
            for request in doomed {
                self.cancel(me, scheduler, request, RequestFailedReason::InstanceKilled)?;
            }
        }
        Ok(())
    }

    fn summon_instances(
        &mut self,
        me: Key<MeshEvent>,
        scheduler: &mut Scheduler,
        service: ServiceId,
        count: usize,
    ) -> Result<(), SimError> {
        let startup = self
            .architecture
            .service(service)
            .ok_or_else(|| ConfigurationError::UnknownService(service.to_string()))?
            .startup_delay();
        info!(%service, count, %startup, "Summoning instances");
        for _ in 0..count {
            let instance = self.spawn_instance(service, InstanceState::Starting)?;
            scheduler.schedule(startup, me, MeshEvent::InstanceReady { instance });
        }
        Ok(())
    }

    fn generate(&mut self, me: Key<MeshEvent>, scheduler: &mut Scheduler, index: usize) -> Result<(), SimError> {
        let now = scheduler.time();
        let generator = self
            .generators
            .get_mut(index)
            .ok_or(InvariantViolation::UnknownEntity {
                kind: "generator",
                id: index as u64,
            })?;
        if !generator.should_emit(now) {
            return Ok(());
        }
        generator.record_emission();
        let operation = generator.operation();
        let timeout = generator.request_timeout();
        if let Some(delay) = generator.next_delay(now, &mut self.rng)? {
            scheduler.schedule(delay, me, MeshEvent::Generate { generator: index });
        }

        let id = self.create_request(operation, None, None, None, scheduler);
        if let Some(timeout) = timeout {
            let event = scheduler.schedule_with_priority(
                timeout,
                Priority::VeryHigh,
                me,
                MeshEvent::Cancel {
                    request: id,
                    reason: RequestFailedReason::Timeout,
                },
            );
            self.request_mut(id)?.pending_events.push(event);
        }
        self.send(me, scheduler, id)
    }
}

impl Component for ServiceMesh {
    type Event = MeshEvent;

    fn process_event(
        &mut self,
        self_id: Key<Self::Event>,
        event: &Self::Event,
        scheduler: &mut Scheduler,
    ) -> Result<(), SimError> {
        trace!(time = %scheduler.time(), ?event, "Mesh event");
        match event {
            MeshEvent::Call { operation, caller } => {
                let caller = caller.as_ref().map(|handle| handle.0.clone());
                let id = self.create_request(*operation, None, None, caller, scheduler);
                self.send(self_id, scheduler, id)
            }
            MeshEvent::Generate { generator } => self.generate(self_id, scheduler, *generator),
            MeshEvent::Arrive { request } => self.arrive(self_id, scheduler, *request),
            MeshEvent::BurstDone { instance, thread } => self.burst_done(self_id, scheduler, *instance, *thread),
            MeshEvent::ResultArrived { request } => self.result_arrived(self_id, scheduler, *request),
            MeshEvent::Cancel { request, reason } => self.cancel(self_id, scheduler, *request, *reason),
            MeshEvent::KillInstances { service, count } => self.kill_instances(self_id, scheduler, *service, *count),
            MeshEvent::SummonInstances { service, count } => {
                self.summon_instances(self_id, scheduler, *service, *count)
            }
            MeshEvent::InstanceReady { instance } => {
                let ready = self
                    .instances
                    .get_mut(instance)
                    .ok_or_else(|| unknown_instance(*instance))?;
                if ready.start() {
                    info!(instance = %instance, service = %ready.service(), "Instance running");
                }
                Ok(())
            }
        }
    }
}
