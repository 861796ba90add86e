//! Transition table and actor permissions.
//!
//! Pure functions over a request snapshot; no storage access. The engine
//! calls `plan` before building the next state.

use crate::models::{Actor, AppointmentRequest, RequestStatus, SuggestedSlot};

use RequestStatus::*;

/// Who may ask for a given target status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Doctor,
    Patient,
    Either,
    /// Reached only as an engine-internal hop, never on request.
    EngineOnly,
}

impl Permission {
    fn allows(self, actor: Actor) -> bool {
        match self {
            Self::Doctor => actor == Actor::Doctor,
            Self::Patient => actor == Actor::Patient,
            Self::Either => true,
            Self::EngineOnly => false,
        }
    }
}

/// Permission rule for requesting `target`.
pub fn permission_for(target: RequestStatus) -> Permission {
    match target {
        Accepted | Rejected | DoctorSuggestedAlternative => Permission::Doctor,
        PatientAcceptedAlternative | PatientRejectedAlternative => Permission::Patient,
        Cancelled => Permission::Either,
        // Created by `create_request`; completed by the engine.
        Pending | Confirmed => Permission::EngineOnly,
    }
}

/// The raw transition table, permissions aside.
pub fn is_listed(from: RequestStatus, to: RequestStatus) -> bool {
    matches!(
        (from, to),
        (Pending, Accepted)
            | (Pending, Rejected)
            | (Pending, DoctorSuggestedAlternative)
            | (DoctorSuggestedAlternative, PatientAcceptedAlternative)
            | (DoctorSuggestedAlternative, PatientRejectedAlternative)
            | (PatientAcceptedAlternative, Confirmed)
            | (Pending, Cancelled)
            | (Accepted, Cancelled)
            | (DoctorSuggestedAlternative, Cancelled)
            | (Confirmed, Cancelled)
    )
}

/// What the engine should do with a permitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Write the new state and notify.
    Apply,
    /// The stored state already reflects this transition.
    AlreadyApplied,
}

/// Why a transition was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub reason: String,
}

impl Denial {
    fn new(from: RequestStatus, to: RequestStatus, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            reason: reason.into(),
        }
    }
}

/// Decide whether `actor` may move `request` to `target`.
///
/// Permission is checked before idempotence, so a no-op success is only
/// granted to the party that could have made the change in the first place.
pub fn plan(
    request: &AppointmentRequest,
    actor: Actor,
    target: RequestStatus,
    suggested: Option<&SuggestedSlot>,
) -> Result<Plan, Denial> {
    let from = request.status;

    let permission = permission_for(target);
    if !permission.allows(actor) {
        let reason = match permission {
            Permission::Doctor => format!("only the doctor may set {target}"),
            Permission::Patient => format!("only the patient may set {target}"),
            _ => format!("{target} cannot be requested directly"),
        };
        return Err(Denial::new(from, target, reason));
    }

    if already_applied(request, target, suggested) {
        return Ok(Plan::AlreadyApplied);
    }

    if from.is_terminal() {
        return Err(Denial::new(from, target, format!("request is already {from}")));
    }
    if !is_listed(from, target) {
        return Err(Denial::new(from, target, format!("{from} cannot move to {target}")));
    }
    if target == DoctorSuggestedAlternative && !request.is_flexible {
        return Err(Denial::new(
            from,
            target,
            "request is not flexible; counter-offers are not allowed",
        ));
    }

    Ok(Plan::Apply)
}

fn already_applied(
    request: &AppointmentRequest,
    target: RequestStatus,
    suggested: Option<&SuggestedSlot>,
) -> bool {
    match (request.status, target) {
        (DoctorSuggestedAlternative, DoctorSuggestedAlternative) => {
            request.suggested.as_ref() == suggested
        }
        // The accepted alternative was confirmed in the same write.
        (Confirmed, PatientAcceptedAlternative) => request.suggested.is_some(),
        (current, target) => current == target,
    }
}

/// Statuses `actor` may request next from the request's current state.
pub fn allowed_targets(request: &AppointmentRequest, actor: Actor) -> Vec<RequestStatus> {
    RequestStatus::ALL
        .into_iter()
        .filter(|&target| {
            target != request.status
                && permission_for(target).allows(actor)
                && is_listed(request.status, target)
                && (target != DoctorSuggestedAlternative || request.is_flexible)
        })
        .collect()
}
