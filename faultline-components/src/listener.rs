//! Lifecycle notifications
//!
//! Each [`Request`] carries the listeners that care about it: the external
//! caller first, then the global listeners registered on the mesh (usually a
//! reporting sink such as [`RequestTracker`]). Notifications are delivered
//! synchronously, inside the event that caused them, to every listener in
//! registration order. A listener returning an error aborts the run.

use crate::architecture::OperationId;
use crate::error::RequestFailedReason;
use crate::request::{Request, RequestId};
use faultline_core::{InvariantViolation, SimError, SimTime};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Observer of request lifecycle transitions. All methods default to no-ops.
pub trait RequestUpdateListener {
    fn on_request_send(&mut self, _request: &Request, _when: SimTime) -> Result<(), SimError> {
        Ok(())
    }

    fn on_request_arrival_at_target(&mut self, _request: &Request, _when: SimTime) -> Result<(), SimError> {
        Ok(())
    }

    /// Terminal: the request was canceled.
    fn on_request_failed(
        &mut self,
        _request: &Request,
        _when: SimTime,
        _reason: RequestFailedReason,
    ) -> Result<(), SimError> {
        Ok(())
    }

    /// Terminal: the result made it back to whoever sent the request.
    fn on_request_result_arrived_at_requester(&mut self, _request: &Request, _when: SimTime) -> Result<(), SimError> {
        Ok(())
    }
}

/// A listener shared between the request and whoever registered it.
pub type SharedListener = Rc<RefCell<dyn RequestUpdateListener>>;

/// Wraps a [`SharedListener`] so it can ride inside an event.
#[derive(Clone)]
pub struct ListenerHandle(pub SharedListener);

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ListenerHandle(..)")
    }
}

impl From<SharedListener> for ListenerHandle {
    fn from(listener: SharedListener) -> Self {
        Self(listener)
    }
}

/// Calls `notify` on every listener of `request`, in registration order.
pub(crate) fn fan_out<F>(request: &Request, mut notify: F) -> Result<(), SimError>
where
    F: FnMut(&mut dyn RequestUpdateListener) -> Result<(), SimError>,
{
    for listener in request.listeners() {
        let mut listener = listener.try_borrow_mut().map_err(|_| {
            InvariantViolation::Inconsistent(format!("listener of {} re-entered during notification", request.id()))
        })?;
        notify(&mut *listener)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Sent,
    ArrivedAtTarget,
    Failed(RequestFailedReason),
    ResultArrived,
}

/// One lifecycle notification as seen by a [`RequestTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub time: SimTime,
    pub request: RequestId,
    pub parent: Option<RequestId>,
    pub operation: OperationId,
    pub kind: NotificationKind,
}

/// Reporting sink: an ordered log of every notification plus counters.
#[derive(Debug, Default)]
pub struct RequestTracker {
    notifications: Vec<Notification>,
    sent: u64,
    completed: u64,
    failed: BTreeMap<RequestFailedReason, u64>,
    response_times: Vec<SimTime>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker already wrapped for registration on a mesh.
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Requests whose result arrived at the requester.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn failed(&self, reason: RequestFailedReason) -> u64 {
        self.failed.get(&reason).copied().unwrap_or(0)
    }

    pub fn total_failed(&self) -> u64 {
        self.failed.values().sum()
    }

    pub fn failures_by_reason(&self) -> &BTreeMap<RequestFailedReason, u64> {
        &self.failed
    }

    /// Creation-to-result times of completed requests without a parent.
    pub fn response_times(&self) -> &[SimTime] {
        &self.response_times
    }

    pub fn mean_response_time(&self) -> Option<SimTime> {
        if self.response_times.is_empty() {
            return None;
        }
        let total: u128 = self.response_times.iter().map(|t| u128::from(t.as_nanos())).sum();
        let mean = total / self.response_times.len() as u128;
        Some(SimTime::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX)))
    }

    /// Notifications about one request, in order.
    pub fn history(&self, request: RequestId) -> impl Iterator<Item = &Notification> + '_ {
        self.notifications.iter().filter(move |n| n.request == request)
    }

    fn record(&mut self, request: &Request, time: SimTime, kind: NotificationKind) {
        self.notifications.push(Notification {
            time,
            request: request.id(),
            parent: request.parent(),
            operation: request.operation(),
            kind,
        });
    }
}

impl RequestUpdateListener for RequestTracker {
    fn on_request_send(&mut self, request: &Request, when: SimTime) -> Result<(), SimError> {
        self.sent += 1;
        self.record(request, when, NotificationKind::Sent);
        Ok(())
    }

    fn on_request_arrival_at_target(&mut self, request: &Request, when: SimTime) -> Result<(), SimError> {
        self.record(request, when, NotificationKind::ArrivedAtTarget);
        Ok(())
    }

    fn on_request_failed(
        &mut self,
        request: &Request,
        when: SimTime,
        reason: RequestFailedReason,
    ) -> Result<(), SimError> {
        *self.failed.entry(reason).or_insert(0) += 1;
        self.record(request, when, NotificationKind::Failed(reason));
        Ok(())
    }

    fn on_request_result_arrived_at_requester(&mut self, request: &Request, when: SimTime) -> Result<(), SimError> {
        self.completed += 1;
        if request.parent().is_none() {
            self.response_times.push(when - request.created_at());
        }
        self.record(request, when, NotificationKind::ResultArrived);
        Ok(())
    }
}
