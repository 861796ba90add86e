use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, SubsecRound, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::transitions::{self, Plan};
use super::NegotiationError;
use crate::db::{RequestRepository, SwapOutcome};
use crate::models::*;
use crate::notification::{NotificationEmitter, NotificationEvent};

/// Maximum length for party identifiers.
const MAX_ID_LEN: usize = 200;

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Length of the appointment booked when a request is accepted or confirmed.
    pub appointment_duration: Duration,
    /// Maximum length for `reason` and `notes`.
    pub max_text_len: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            appointment_duration: Duration::minutes(30),
            max_text_len: 2000,
        }
    }
}

/// Result of a create or transition call.
#[derive(Debug, Clone, Serialize)]
pub struct NegotiationOutcome {
    pub request: AppointmentRequest,
    /// False when the call was an idempotent repeat and nothing was written.
    pub applied: bool,
    /// Non-fatal problems, e.g. a notification that could not be delivered.
    pub warnings: Vec<String>,
}

/// Applies negotiation transitions against a repository and notifies the
/// counterparty of every committed change.
pub struct NegotiationEngine {
    repository: Arc<dyn RequestRepository>,
    notifier: Arc<dyn NotificationEmitter>,
    settings: EngineSettings,
}

impl NegotiationEngine {
    pub fn new(
        repository: Arc<dyn RequestRepository>,
        notifier: Arc<dyn NotificationEmitter>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            repository,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Records a patient's preferred slot as a `pending` request and tells
    /// the doctor about it.
    pub fn create_request(
        &self,
        new: NewAppointmentRequest,
    ) -> Result<NegotiationOutcome, NegotiationError> {
        let patient_id = required_id("patient_id", &new.patient_id)?;
        let doctor_id = required_id("doctor_id", &new.doctor_id)?;
        if patient_id == doctor_id {
            return Err(NegotiationError::Validation(
                "patient_id and doctor_id must differ".into(),
            ));
        }

        let now = now_micros();
        let request = AppointmentRequest {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            clinic_id: optional_text("clinic_id", new.clinic_id, MAX_ID_LEN)?,
            preferred_date: new.preferred_date,
            preferred_start_time: new.preferred_start_time,
            is_flexible: new.is_flexible,
            status: RequestStatus::Pending,
            suggested: None,
            reason: optional_text("reason", new.reason, self.settings.max_text_len)?,
            notes: optional_text("notes", new.notes, self.settings.max_text_len)?,
            resulting_appointment_id: None,
            created_at: now,
            updated_at: now,
        };

        self.repository.insert(&request)?;
        tracing::info!(
            request_id = %request.id,
            preferred_date = %request.preferred_date,
            is_flexible = request.is_flexible,
            "Appointment request created"
        );

        let warnings = self.notify(NotificationEvent {
            event_type: NotificationKind::RequestCreated,
            request_id: request.id,
            recipient_id: request.doctor_id.clone(),
        });

        Ok(NegotiationOutcome {
            request,
            applied: true,
            warnings,
        })
    }

    /// Moves a request to `target` on behalf of `actor`.
    ///
    /// The write is a compare-and-swap on the `updated_at` read at the start
    /// of the call; losing that race yields `Conflict` and nothing is written.
    pub fn apply_transition(
        &self,
        request_id: &Uuid,
        actor: Actor,
        target: RequestStatus,
        payload: TransitionPayload,
    ) -> Result<NegotiationOutcome, NegotiationError> {
        self.validate_payload(target, &payload)?;

        let current = self.get_request(request_id)?;
        let plan = transitions::plan(&current, actor, target, payload.suggested.as_ref())
            .map_err(|denial| {
                tracing::warn!(
                    request_id = %request_id,
                    actor = %actor,
                    from = %denial.from,
                    to = %denial.to,
                    reason = %denial.reason,
                    "Transition refused"
                );
                NegotiationError::from(denial)
            })?;

        if plan == Plan::AlreadyApplied {
            tracing::debug!(request_id = %request_id, status = %current.status, "Transition already applied");
            return Ok(NegotiationOutcome {
                request: current,
                applied: false,
                warnings: Vec::new(),
            });
        }

        let now = now_micros();
        let mut next = current.clone();
        next.updated_at = next_timestamp(current.updated_at, now);
        if let Some(notes) = payload.notes {
            next.notes = Some(notes);
        }

        let mut booking = None;
        next.status = match target {
            RequestStatus::Accepted => {
                let appointment = Appointment::book(
                    &current,
                    current.preferred_date,
                    current.preferred_start_time,
                    self.settings.appointment_duration,
                    now,
                );
                next.resulting_appointment_id = Some(appointment.id);
                booking = Some(appointment);
                RequestStatus::Accepted
            }
            RequestStatus::DoctorSuggestedAlternative => {
                next.suggested = payload.suggested;
                RequestStatus::DoctorSuggestedAlternative
            }
            RequestStatus::PatientAcceptedAlternative => {
                let slot = current.suggested.ok_or_else(|| NegotiationError::InvalidTransition {
                    from: current.status,
                    to: target,
                    reason: "no counter-offer on record".into(),
                })?;
                let appointment = Appointment::book(
                    &current,
                    slot.suggested_date,
                    slot.suggested_start_time,
                    self.settings.appointment_duration,
                    now,
                );
                next.resulting_appointment_id = Some(appointment.id);
                booking = Some(appointment);
                // Accepting an alternative confirms it in the same write.
                RequestStatus::Confirmed
            }
            RequestStatus::Cancelled => {
                if let Some(appointment_id) = current.resulting_appointment_id {
                    match self.repository.get_appointment(&appointment_id)? {
                        Some(mut appointment) => {
                            appointment.status = AppointmentStatus::Cancelled;
                            booking = Some(appointment);
                        }
                        None => tracing::warn!(
                            request_id = %request_id,
                            appointment_id = %appointment_id,
                            "Resulting appointment missing while cancelling"
                        ),
                    }
                }
                next.resulting_appointment_id = None;
                RequestStatus::Cancelled
            }
            other => other,
        };

        match self.repository.compare_and_swap(
            request_id,
            current.updated_at,
            &next,
            booking.as_ref(),
        )? {
            SwapOutcome::Swapped => {}
            SwapOutcome::Stale => {
                tracing::warn!(request_id = %request_id, to = %target, "Concurrent transition lost the race");
                return Err(NegotiationError::Conflict {
                    request_id: *request_id,
                });
            }
        }

        tracing::info!(
            request_id = %request_id,
            actor = %actor,
            from = %current.status,
            to = %next.status,
            "Request transitioned"
        );

        let warnings = self.notify(NotificationEvent {
            event_type: NotificationKind::for_status(next.status),
            request_id: *request_id,
            recipient_id: current.counterparty_of(actor).to_string(),
        });

        Ok(NegotiationOutcome {
            request: next,
            applied: true,
            warnings,
        })
    }

    pub fn get_request(&self, request_id: &Uuid) -> Result<AppointmentRequest, NegotiationError> {
        self.repository
            .get(request_id)?
            .ok_or(NegotiationError::NotFound(*request_id))
    }

    pub fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<AppointmentRequest>, NegotiationError> {
        Ok(self.repository.list(filter)?)
    }

    pub fn get_appointment(&self, appointment_id: &Uuid) -> Result<Appointment, NegotiationError> {
        self.repository
            .get_appointment(appointment_id)?
            .ok_or(NegotiationError::AppointmentNotFound(*appointment_id))
    }

    /// Statuses `actor` may request next on the stored request.
    pub fn allowed_transitions(
        &self,
        request_id: &Uuid,
        actor: Actor,
    ) -> Result<Vec<RequestStatus>, NegotiationError> {
        let request = self.get_request(request_id)?;
        Ok(transitions::allowed_targets(&request, actor))
    }

    fn validate_payload(
        &self,
        target: RequestStatus,
        payload: &TransitionPayload,
    ) -> Result<(), NegotiationError> {
        match (target, payload.suggested.is_some()) {
            (RequestStatus::DoctorSuggestedAlternative, false) => {
                return Err(NegotiationError::Validation(
                    "suggested_date and suggested_start_time are required for a counter-offer"
                        .into(),
                ));
            }
            (RequestStatus::DoctorSuggestedAlternative, true) | (_, false) => {}
            (_, true) => {
                return Err(NegotiationError::Validation(format!(
                    "a suggested slot cannot accompany {target}"
                )));
            }
        }
        if let Some(ref notes) = payload.notes {
            if notes.chars().count() > self.settings.max_text_len {
                return Err(NegotiationError::Validation("notes too long".into()));
            }
        }
        Ok(())
    }

    /// Emits `event`; delivery failures come back as warnings.
    fn notify(&self, event: NotificationEvent) -> Vec<String> {
        match self.notifier.emit(&event) {
            Ok(()) => Vec::new(),
            Err(e) => {
                tracing::warn!(
                    request_id = %event.request_id,
                    event_type = %event.event_type,
                    "Notification delivery failed: {e}"
                );
                vec![e.to_string()]
            }
        }
    }
}

/// Wall clock at the precision timestamps are stored with.
fn now_micros() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(6)
}

fn required_id(field: &str, value: &str) -> Result<String, NegotiationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(NegotiationError::Validation(format!("{field} is required")));
    }
    if trimmed.len() > MAX_ID_LEN {
        return Err(NegotiationError::Validation(format!("{field} too long")));
    }
    Ok(trimmed.to_string())
}

/// Trims free text; blank becomes `None`.
fn optional_text(
    field: &str,
    value: Option<String>,
    max_len: usize,
) -> Result<Option<String>, NegotiationError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max_len {
        return Err(NegotiationError::Validation(format!("{field} too long")));
    }
    Ok(Some(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Barrier, Mutex};

    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    use crate::db::{DatabaseError, SqliteRequestRepository};
    use crate::notification::NotificationError;

    use RequestStatus::*;

    #[derive(Default)]
    struct RecordingEmitter {
        events: Mutex<Vec<NotificationEvent>>,
    }

    impl RecordingEmitter {
        fn events(&self) -> Vec<NotificationEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl NotificationEmitter for RecordingEmitter {
        fn emit(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct FailingEmitter;

    impl NotificationEmitter for FailingEmitter {
        fn emit(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
            Err(NotificationError::DeliveryFailed {
                recipient_id: event.recipient_id.clone(),
                reason: "push gateway unreachable".into(),
            })
        }
    }

    fn setup() -> (NegotiationEngine, Arc<RecordingEmitter>) {
        let repo = Arc::new(SqliteRequestRepository::in_memory().unwrap());
        let emitter = Arc::new(RecordingEmitter::default());
        let engine = NegotiationEngine::new(repo, emitter.clone(), EngineSettings::default());
        (engine, emitter)
    }

    fn preferred_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 10).unwrap()
    }

    fn preferred_time() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    fn slot() -> SuggestedSlot {
        SuggestedSlot {
            suggested_date: NaiveDate::from_ymd_opt(2024, 9, 12).unwrap(),
            suggested_start_time: NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
        }
    }

    fn new_request(is_flexible: bool) -> NewAppointmentRequest {
        NewAppointmentRequest {
            patient_id: "patient-1".into(),
            doctor_id: "doctor-1".into(),
            clinic_id: Some("clinic-north".into()),
            preferred_date: preferred_date(),
            preferred_start_time: preferred_time(),
            is_flexible,
            reason: Some("Follow-up on blood pressure".into()),
            notes: None,
        }
    }

    fn counter_offer() -> TransitionPayload {
        TransitionPayload {
            suggested: Some(slot()),
            notes: None,
        }
    }

    fn transition(
        engine: &NegotiationEngine,
        id: &Uuid,
        actor: Actor,
        target: RequestStatus,
    ) -> Result<NegotiationOutcome, NegotiationError> {
        let payload = if target == DoctorSuggestedAlternative {
            counter_offer()
        } else {
            TransitionPayload::default()
        };
        engine.apply_transition(id, actor, target, payload)
    }

    /// Creates a flexible request and walks it to `status`.
    fn reach(engine: &NegotiationEngine, status: RequestStatus) -> Uuid {
        let id = engine.create_request(new_request(true)).unwrap().request.id;
        let path: &[(Actor, RequestStatus)] = match status {
            Pending => &[],
            Accepted => &[(Actor::Doctor, Accepted)],
            Rejected => &[(Actor::Doctor, Rejected)],
            DoctorSuggestedAlternative => &[(Actor::Doctor, DoctorSuggestedAlternative)],
            PatientRejectedAlternative => &[
                (Actor::Doctor, DoctorSuggestedAlternative),
                (Actor::Patient, PatientRejectedAlternative),
            ],
            Confirmed => &[
                (Actor::Doctor, DoctorSuggestedAlternative),
                (Actor::Patient, PatientAcceptedAlternative),
            ],
            Cancelled => &[(Actor::Patient, Cancelled)],
            PatientAcceptedAlternative => unreachable!("never stored"),
        };
        for &(actor, target) in path {
            transition(engine, &id, actor, target).unwrap();
        }
        assert_eq!(engine.get_request(&id).unwrap().status, status);
        id
    }

    // ───────────────────────────────────────
    // create_request
    // ───────────────────────────────────────

    #[test]
    fn create_starts_pending_and_notifies_doctor() {
        let (engine, emitter) = setup();
        let outcome = engine.create_request(new_request(false)).unwrap();

        assert!(outcome.applied);
        assert_eq!(outcome.request.status, Pending);
        assert!(outcome.request.suggested.is_none());
        assert!(outcome.request.resulting_appointment_id.is_none());
        assert_eq!(outcome.request.created_at, outcome.request.updated_at);

        let stored = engine.get_request(&outcome.request.id).unwrap();
        assert_eq!(stored, outcome.request);

        assert_eq!(
            emitter.events(),
            vec![NotificationEvent {
                event_type: NotificationKind::RequestCreated,
                request_id: outcome.request.id,
                recipient_id: "doctor-1".into(),
            }]
        );
    }

    #[test]
    fn create_rejects_missing_parties() {
        let (engine, _) = setup();
        let mut blank = new_request(false);
        blank.patient_id = "   ".into();
        assert!(matches!(
            engine.create_request(blank),
            Err(NegotiationError::Validation(_))
        ));

        let mut same = new_request(false);
        same.doctor_id = "patient-1".into();
        assert!(matches!(
            engine.create_request(same),
            Err(NegotiationError::Validation(_))
        ));
    }

    #[test]
    fn create_trims_blank_text_to_none() {
        let (engine, _) = setup();
        let mut new = new_request(false);
        new.reason = Some("  ".into());
        new.clinic_id = Some("".into());
        let request = engine.create_request(new).unwrap().request;
        assert!(request.reason.is_none());
        assert!(request.clinic_id.is_none());
    }

    // ───────────────────────────────────────
    // apply_transition
    // ───────────────────────────────────────

    #[test]
    fn doctor_accepts_and_appointment_uses_preferred_slot() {
        let (engine, emitter) = setup();
        let id = reach(&engine, Pending);

        let outcome = transition(&engine, &id, Actor::Doctor, Accepted).unwrap();
        assert_eq!(outcome.request.status, Accepted);
        let appointment_id = outcome.request.resulting_appointment_id.unwrap();

        let appointment = engine.get_appointment(&appointment_id).unwrap();
        assert_eq!(appointment.request_id, id);
        assert_eq!(appointment.date, preferred_date());
        assert_eq!(appointment.start_time, preferred_time());
        assert_eq!(appointment.status, AppointmentStatus::Scheduled);

        let last = emitter.events().pop().unwrap();
        assert_eq!(last.event_type, NotificationKind::Accepted);
        assert_eq!(last.recipient_id, "patient-1");
    }

    #[test]
    fn accepted_alternative_confirms_with_suggested_slot() {
        let (engine, emitter) = setup();
        let id = reach(&engine, DoctorSuggestedAlternative);

        let outcome = transition(&engine, &id, Actor::Patient, PatientAcceptedAlternative).unwrap();
        assert_eq!(outcome.request.status, Confirmed);

        let appointment = engine
            .get_appointment(&outcome.request.resulting_appointment_id.unwrap())
            .unwrap();
        assert_eq!(appointment.date, slot().suggested_date);
        assert_eq!(appointment.start_time, slot().suggested_start_time);
        assert_ne!(appointment.date, preferred_date());

        // One event for the whole two-hop transition, addressed to the doctor.
        let events = emitter.events();
        assert_eq!(
            events.last().unwrap(),
            &NotificationEvent {
                event_type: NotificationKind::Confirmed,
                request_id: id,
                recipient_id: "doctor-1".into(),
            }
        );
        assert_eq!(
            events
                .iter()
                .filter(|e| e.event_type == NotificationKind::Confirmed)
                .count(),
            1
        );
    }

    #[test]
    fn counter_offer_on_rigid_request_is_invalid() {
        let (engine, emitter) = setup();
        let id = engine.create_request(new_request(false)).unwrap().request.id;
        let before = engine.get_request(&id).unwrap();

        let result = engine.apply_transition(&id, Actor::Doctor, DoctorSuggestedAlternative, counter_offer());
        assert!(matches!(result, Err(NegotiationError::InvalidTransition { .. })));
        assert_eq!(engine.get_request(&id).unwrap(), before);
        assert_eq!(emitter.events().len(), 1);
    }

    #[test]
    fn counter_offer_requires_slot() {
        let (engine, _) = setup();
        let id = reach(&engine, Pending);
        let result = engine.apply_transition(
            &id,
            Actor::Doctor,
            DoctorSuggestedAlternative,
            TransitionPayload::default(),
        );
        assert!(matches!(result, Err(NegotiationError::Validation(_))));
    }

    #[test]
    fn slot_is_refused_outside_counter_offer() {
        let (engine, _) = setup();
        let id = reach(&engine, Pending);
        let result = engine.apply_transition(&id, Actor::Doctor, Accepted, counter_offer());
        assert!(matches!(result, Err(NegotiationError::Validation(_))));
        assert_eq!(engine.get_request(&id).unwrap().status, Pending);
    }

    #[test]
    fn unknown_request_is_not_found() {
        let (engine, _) = setup();
        let missing = Uuid::new_v4();
        assert!(matches!(
            transition(&engine, &missing, Actor::Patient, Cancelled),
            Err(NegotiationError::NotFound(id)) if id == missing
        ));
    }

    #[test]
    fn every_pair_outside_the_table_is_invalid_and_leaves_storage_untouched() {
        use Actor::{Doctor, Patient};
        let allowed = [
            (Pending, Accepted, Doctor),
            (Pending, Rejected, Doctor),
            (Pending, DoctorSuggestedAlternative, Doctor),
            (DoctorSuggestedAlternative, PatientAcceptedAlternative, Patient),
            (DoctorSuggestedAlternative, PatientRejectedAlternative, Patient),
        ];
        let no_ops = [
            (Accepted, Accepted, Doctor),
            (Rejected, Rejected, Doctor),
            (DoctorSuggestedAlternative, DoctorSuggestedAlternative, Doctor),
            (PatientRejectedAlternative, PatientRejectedAlternative, Patient),
            (Confirmed, PatientAcceptedAlternative, Patient),
            (Cancelled, Cancelled, Patient),
            (Cancelled, Cancelled, Doctor),
        ];
        let cancellable = [Pending, Accepted, DoctorSuggestedAlternative, Confirmed];
        let reachable = [
            Pending,
            Accepted,
            Rejected,
            DoctorSuggestedAlternative,
            PatientRejectedAlternative,
            Confirmed,
            Cancelled,
        ];

        for from in reachable {
            for target in RequestStatus::ALL {
                for actor in [Patient, Doctor] {
                    let (engine, _) = setup();
                    let id = reach(&engine, from);
                    let before = engine.get_request(&id).unwrap();
                    let result = transition(&engine, &id, actor, target);
                    let case = format!("{from} -> {target} by {actor}");

                    let is_allowed = allowed.contains(&(from, target, actor))
                        || (target == Cancelled && cancellable.contains(&from));
                    if is_allowed {
                        let outcome = result.unwrap();
                        assert!(outcome.applied, "{case}");
                        assert_eq!(
                            outcome.request.resulting_appointment_id.is_some(),
                            outcome.request.status.has_appointment(),
                            "{case}"
                        );
                    } else if no_ops.contains(&(from, target, actor)) {
                        assert!(!result.unwrap().applied, "{case}");
                        assert_eq!(engine.get_request(&id).unwrap(), before, "{case}");
                    } else {
                        assert!(
                            matches!(result, Err(NegotiationError::InvalidTransition { .. })),
                            "{case}: {result:?}"
                        );
                        assert_eq!(engine.get_request(&id).unwrap(), before, "{case}");
                    }
                }
            }
        }
    }

    #[test]
    fn cancel_is_idempotent_and_notifies_once() {
        let (engine, emitter) = setup();
        let id = reach(&engine, Pending);

        let first = transition(&engine, &id, Actor::Patient, Cancelled).unwrap();
        assert!(first.applied);
        assert_eq!(first.request.status, Cancelled);

        let second = transition(&engine, &id, Actor::Patient, Cancelled).unwrap();
        assert!(!second.applied);
        assert_eq!(second.request, first.request);

        let cancels: Vec<_> = emitter
            .events()
            .into_iter()
            .filter(|e| e.event_type == NotificationKind::Cancelled)
            .collect();
        assert_eq!(cancels.len(), 1);
        assert_eq!(cancels[0].recipient_id, "doctor-1");
    }

    #[test]
    fn cancelling_confirmed_request_cancels_appointment() {
        let (engine, emitter) = setup();
        let id = reach(&engine, Confirmed);
        let appointment_id = engine.get_request(&id).unwrap().resulting_appointment_id.unwrap();

        let outcome = transition(&engine, &id, Actor::Doctor, Cancelled).unwrap();
        assert_eq!(outcome.request.status, Cancelled);
        assert!(outcome.request.resulting_appointment_id.is_none());

        let appointment = engine.get_appointment(&appointment_id).unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Cancelled);
        assert_eq!(appointment.request_id, id);

        // Doctor cancelled, so the patient hears about it.
        assert_eq!(emitter.events().last().unwrap().recipient_id, "patient-1");
    }

    #[test]
    fn terminal_transitions_emit_exactly_one_event() {
        let (engine, emitter) = setup();
        let id = reach(&engine, DoctorSuggestedAlternative);
        let before = emitter.events().len();

        transition(&engine, &id, Actor::Patient, PatientRejectedAlternative).unwrap();
        transition(&engine, &id, Actor::Patient, PatientRejectedAlternative).unwrap();

        let events = emitter.events();
        assert_eq!(events.len(), before + 1);
        assert_eq!(events.last().unwrap().event_type, NotificationKind::Rejected);
    }

    #[test]
    fn updated_at_advances_on_every_transition() {
        let (engine, _) = setup();
        let id = reach(&engine, Pending);
        let created = engine.get_request(&id).unwrap();

        let suggested = transition(&engine, &id, Actor::Doctor, DoctorSuggestedAlternative).unwrap();
        assert!(suggested.request.updated_at > created.updated_at);
        assert_eq!(suggested.request.created_at, created.created_at);

        let confirmed = transition(&engine, &id, Actor::Patient, PatientAcceptedAlternative).unwrap();
        assert!(confirmed.request.updated_at > suggested.request.updated_at);
    }

    #[test]
    fn notes_are_stored_with_transition() {
        let (engine, _) = setup();
        let id = reach(&engine, Pending);
        let outcome = engine
            .apply_transition(
                &id,
                Actor::Doctor,
                Rejected,
                TransitionPayload {
                    suggested: None,
                    notes: Some("Please book with the on-call clinic".into()),
                },
            )
            .unwrap();
        assert_eq!(
            engine.get_request(&id).unwrap().notes.as_deref(),
            Some("Please book with the on-call clinic")
        );
        assert_eq!(outcome.request.notes, engine.get_request(&id).unwrap().notes);
    }

    #[test]
    fn delivery_failure_is_a_warning_not_an_error() {
        let repo = Arc::new(SqliteRequestRepository::in_memory().unwrap());
        let engine = NegotiationEngine::new(repo, Arc::new(FailingEmitter), EngineSettings::default());

        let created = engine.create_request(new_request(false)).unwrap();
        assert_eq!(created.warnings.len(), 1);

        let outcome = transition(&engine, &created.request.id, Actor::Doctor, Accepted).unwrap();
        assert_eq!(outcome.request.status, Accepted);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("patient-1"));
        assert_eq!(engine.get_request(&created.request.id).unwrap().status, Accepted);
    }

    #[test]
    fn allowed_transitions_reflect_stored_state() {
        let (engine, _) = setup();
        let id = reach(&engine, DoctorSuggestedAlternative);
        assert_eq!(
            engine.allowed_transitions(&id, Actor::Patient).unwrap(),
            vec![PatientAcceptedAlternative, PatientRejectedAlternative, Cancelled]
        );
        assert_eq!(engine.allowed_transitions(&id, Actor::Doctor).unwrap(), vec![Cancelled]);
    }

    #[test]
    fn list_requests_by_doctor() {
        let (engine, _) = setup();
        reach(&engine, Pending);
        reach(&engine, Accepted);
        let mut other = new_request(false);
        other.doctor_id = "doctor-2".into();
        engine.create_request(other).unwrap();

        let filter = RequestFilter {
            doctor_id: Some("doctor-1".into()),
            ..Default::default()
        };
        assert_eq!(engine.list_requests(&filter).unwrap().len(), 2);

        let accepted = RequestFilter {
            status: Some(Accepted),
            ..Default::default()
        };
        assert_eq!(engine.list_requests(&accepted).unwrap().len(), 1);
    }

    // ───────────────────────────────────────
    // Concurrency
    // ───────────────────────────────────────

    /// Holds readers at a barrier once armed so both racers see the same
    /// snapshot before either writes.
    struct RacingRepository {
        inner: SqliteRequestRepository,
        armed: AtomicBool,
        barrier: Barrier,
    }

    impl RequestRepository for RacingRepository {
        fn insert(&self, request: &AppointmentRequest) -> Result<(), DatabaseError> {
            self.inner.insert(request)
        }

        fn get(&self, id: &Uuid) -> Result<Option<AppointmentRequest>, DatabaseError> {
            let snapshot = self.inner.get(id)?;
            if self.armed.load(Ordering::SeqCst) {
                self.barrier.wait();
            }
            Ok(snapshot)
        }

        fn list(&self, filter: &RequestFilter) -> Result<Vec<AppointmentRequest>, DatabaseError> {
            self.inner.list(filter)
        }

        fn compare_and_swap(
            &self,
            id: &Uuid,
            expected_updated_at: NaiveDateTime,
            new_value: &AppointmentRequest,
            booking: Option<&Appointment>,
        ) -> Result<SwapOutcome, DatabaseError> {
            self.inner
                .compare_and_swap(id, expected_updated_at, new_value, booking)
        }

        fn get_appointment(&self, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
            self.inner.get_appointment(id)
        }
    }

    #[test]
    fn concurrent_acceptances_yield_one_confirmation_and_one_conflict() {
        let repo = Arc::new(RacingRepository {
            inner: SqliteRequestRepository::in_memory().unwrap(),
            armed: AtomicBool::new(false),
            barrier: Barrier::new(2),
        });
        let emitter = Arc::new(RecordingEmitter::default());
        let engine = NegotiationEngine::new(repo.clone(), emitter.clone(), EngineSettings::default());
        let id = reach(&engine, DoctorSuggestedAlternative);

        repo.armed.store(true, Ordering::SeqCst);
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| transition(&engine, &id, Actor::Patient, PatientAcceptedAlternative))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        repo.armed.store(false, Ordering::SeqCst);

        let confirmed = results
            .iter()
            .filter(|r| matches!(r, Ok(o) if o.request.status == Confirmed))
            .count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(NegotiationError::Conflict { request_id }) if *request_id == id))
            .count();
        assert_eq!((confirmed, conflicts), (1, 1), "{results:?}");

        let stored = engine.get_request(&id).unwrap();
        assert_eq!(stored.status, Confirmed);
        assert_eq!(
            emitter
                .events()
                .iter()
                .filter(|e| e.event_type == NotificationKind::Confirmed)
                .count(),
            1
        );

        // The loser re-reads and finds the work already done.
        let retry = transition(&engine, &id, Actor::Patient, PatientAcceptedAlternative).unwrap();
        assert!(!retry.applied);
        assert_eq!(retry.request, stored);
    }
}
