//! Requests and their lifecycle states
//!
//! A [`Request`] is one call traveling through the architecture. Its state
//! only ever moves forward:
//!
//! ```text
//! Created -> Sent -> ArrivedAtInstance -> EnqueuedForCpu -> Processing
//!         -> AwaitingDependencies -> Completed -> ResultTraveling -> ArrivedAtRequester
//! ```
//!
//! Steps may be skipped (a request without CPU demand never enters the
//! scheduler) but never revisited. `Canceled` is reachable from every
//! non-terminal state. A retry is a new request, not a rewind.

use crate::architecture::{DependencyRef, OperationId};
use crate::error::RequestFailedReason;
use crate::instance::InstanceId;
use crate::listener::SharedListener;
use faultline_core::{EventId, InvariantViolation, SimTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for requests within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Request({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Created,
    Sent,
    ArrivedAtInstance,
    EnqueuedForCpu,
    Processing,
    AwaitingDependencies,
    Completed,
    ResultTraveling,
    ArrivedAtRequester,
    Canceled(RequestFailedReason),
}

impl RequestState {
    fn rank(self) -> u8 {
        match self {
            RequestState::Created => 0,
            RequestState::Sent => 1,
            RequestState::ArrivedAtInstance => 2,
            RequestState::EnqueuedForCpu => 3,
            RequestState::Processing => 4,
            RequestState::AwaitingDependencies => 5,
            RequestState::Completed => 6,
            RequestState::ResultTraveling => 7,
            RequestState::ArrivedAtRequester | RequestState::Canceled(_) => 8,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::ArrivedAtRequester | RequestState::Canceled(_))
    }

    /// Whether the request currently occupies an instance.
    pub fn is_hosted(self) -> bool {
        matches!(
            self,
            RequestState::ArrivedAtInstance
                | RequestState::EnqueuedForCpu
                | RequestState::Processing
                | RequestState::AwaitingDependencies
        )
    }
}

/// A call traveling through the architecture.
pub struct Request {
    id: RequestId,
    parent: Option<RequestId>,
    operation: OperationId,
    origin: Option<DependencyRef>,
    state: RequestState,
    created_at: SimTime,
    listeners: Vec<SharedListener>,
    pub(crate) instance: Option<InstanceId>,
    pub(crate) pending_children: usize,
    pub(crate) pending_events: Vec<EventId>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("operation", &self.operation)
            .field("state", &self.state)
            .field("created_at", &self.created_at)
            .field("listeners", &self.listeners.len())
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

impl Request {
    pub fn new(
        id: RequestId,
        operation: OperationId,
        parent: Option<RequestId>,
        origin: Option<DependencyRef>,
        created_at: SimTime,
        listeners: Vec<SharedListener>,
    ) -> Self {
        Self {
            id,
            parent,
            operation,
            origin,
            state: RequestState::Created,
            created_at,
            listeners,
            instance: None,
            pending_children: 0,
            pending_events: Vec::new(),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn parent(&self) -> Option<RequestId> {
        self.parent
    }

    pub fn operation(&self) -> OperationId {
        self.operation
    }

    /// The dependency edge that spawned this request, if any.
    pub fn origin(&self) -> Option<DependencyRef> {
        self.origin
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn created_at(&self) -> SimTime {
        self.created_at
    }

    /// Instance chosen by the load balancer, once sent.
    pub fn instance(&self) -> Option<InstanceId> {
        self.instance
    }

    pub fn listeners(&self) -> &[SharedListener] {
        &self.listeners
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Leaving a terminal state or moving backwards is an
    /// [`InvariantViolation`].
    pub fn transition(&mut self, next: RequestState) -> Result<(), InvariantViolation> {
        let allowed = !self.state.is_terminal()
            && (matches!(next, RequestState::Canceled(_)) || next.rank() > self.state.rank());
        if !allowed {
            return Err(InvariantViolation::Inconsistent(format!(
                "{} cannot move from {:?} to {:?}",
                self.id, self.state, next
            )));
        }
        tracing::trace!(request = %self.id, from = ?self.state, to = ?next, "Request state change");
        self.state = next;
        Ok(())
    }
}
