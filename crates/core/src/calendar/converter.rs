//! Calendar event to task conversion

use chrono::{DateTime, Duration, Utc};
use kindred_common::time::start_of_day;
use kindred_domain::constants::{
    CALENDAR_TASK_PRIORITY, CALENDAR_TASK_VALUE, REMINDER_BEFORE_END_MINS,
    REMINDER_BEFORE_START_MINS,
};
use kindred_domain::{event_integration_key, ProviderEvent, Reminder, TaskPayload};
use uuid::Uuid;

/// Map a provider event onto a task-creation payload.
///
/// Reminders are only generated for timed events, and only those whose
/// trigger lies strictly after `now`.
pub fn convert_event(
    event: &ProviderEvent,
    user_id: Uuid,
    category_id: Uuid,
    now: DateTime<Utc>,
) -> TaskPayload {
    let (start_time, reminders) =
        if event.is_all_day { (None, Vec::new()) } else { (Some(event.start), reminders(event, now)) };

    TaskPayload {
        user_id,
        category_id,
        priority: CALENDAR_TASK_PRIORITY,
        content: event.summary.clone(),
        value: CALENDAR_TASK_VALUE,
        recurring: false,
        public: false,
        active: true,
        notes: event_notes(event),
        integration: event_integration_key(&event.calendar_id, &event.id),
        checklist: Vec::new(),
        reminders,
        start_time,
        start_date: Some(start_of_day(&event.start)),
        deadline: Some(event.end),
    }
}

/// `Label: value` lines for every non-empty optional field, newline separated.
pub fn event_notes(event: &ProviderEvent) -> String {
    let attendees = event.attendees.join(", ");
    [
        ("Calendar", event.calendar_name.as_str()),
        ("Description", event.description.as_str()),
        ("Location", event.location.as_str()),
        ("Attendees", attendees.as_str()),
        ("Status", event.status.as_str()),
    ]
    .iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(label, value)| format!("{label}: {value}"))
    .collect::<Vec<_>>()
    .join("\n")
}

fn reminders(event: &ProviderEvent, now: DateTime<Utc>) -> Vec<Reminder> {
    let start = event.start.with_timezone(&Utc);
    let end = event.end.with_timezone(&Utc);
    let before_end = end - Duration::minutes(REMINDER_BEFORE_END_MINS);

    let mut candidates = vec![
        Reminder::before_start(start - Duration::minutes(REMINDER_BEFORE_START_MINS)),
        Reminder::at_start(start),
    ];
    if before_end > start {
        candidates.push(Reminder::before_deadline(before_end));
    }

    candidates.into_iter().filter(|reminder| reminder.trigger_time > now).collect()
}
