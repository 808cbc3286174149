//! Async continuation jobs and incidents of a migrating instance

use crate::application::migration::matcher::MigratingProcessInstance;
use crate::application::working_state::WorkingState;
use crate::domain::job::JobKind;
use tracing::trace;

/// Point jobs and incidents at the target definition
///
/// Job and incident ids never change. Async continuations follow the
/// transition instance they belong to, and incidents follow their job.
pub(crate) fn reassign(state: &mut WorkingState, migrating: &MigratingProcessInstance) {
    let target_definition = state.definition.id.clone();

    for job in &mut state.jobs {
        if let JobKind::AsyncContinuation(_) = job.item.kind {
            if let Some(target) = migrating.target_of(job.owner.node()) {
                job.item.activity_id = target.clone();
            }
        }
        job.item.process_definition_id = target_definition.clone();
    }

    for incident in &mut state.incidents {
        let job = state
            .jobs
            .iter()
            .find(|job| incident.item.is_for_job(&job.item.id));
        match job {
            Some(job) => incident.item.activity_id = job.item.activity_id.clone(),
            None => {
                if let Some(target) = migrating.target_of(incident.owner.node()) {
                    incident.item.activity_id = target.clone();
                }
            }
        }
        incident.item.process_definition_id = target_definition.clone();
        trace!(incident = %incident.item.id, activity = %incident.item.activity_id, "Incident follows its job");
    }

    for subscription in &mut state.subscriptions {
        subscription.item.process_definition_id = target_definition.clone();
    }
}
