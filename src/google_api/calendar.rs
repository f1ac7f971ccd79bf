//! Google Calendar API v3: create, look up, reschedule and delete events.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{check_status, send_with_retry, GoogleApiError, RetryPolicy, TokenSource};
use crate::calendar::{first_upcoming_match, CalendarEvent, CalendarService, EventPatch, NewEvent};
use crate::error::SlotdeskError;
use crate::types::GoogleConfig;

const CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3/calendars";

// ============================================================================
// API response types (deserialized from Google Calendar JSON)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<GoogleEventRaw>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventRaw {
    #[serde(default)]
    id: String,
    #[serde(default)]
    summary: Option<String>,
    start: Option<EventDateTime>,
    end: Option<EventDateTime>,
    #[serde(default)]
    attendees: Vec<Attendee>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    hangout_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    date_time: Option<String>,
    date: Option<String>,
}

impl EventDateTime {
    fn parse(&self) -> Option<DateTime<Utc>> {
        parse_event_datetime(self.date_time.as_deref().or(self.date.as_deref())?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Attendee {
    #[serde(default)]
    email: String,
    #[serde(default)]
    resource: Option<bool>,
}

impl GoogleEventRaw {
    fn attendee_emails(&self) -> Vec<String> {
        self.attendees
            .iter()
            .filter(|a| a.resource != Some(true))
            .map(|a| a.email.clone())
            .filter(|e| !e.is_empty())
            .collect()
    }

    /// Cancelled events and events without a parseable window are dropped.
    fn into_event(self) -> Option<CalendarEvent> {
        if self.status.as_deref() == Some("cancelled") {
            return None;
        }
        let start = self.start.as_ref()?.parse()?;
        let end = self.end.as_ref()?.parse()?;
        let attendees = self.attendee_emails();
        Some(CalendarEvent {
            id: self.id,
            summary: self.summary.unwrap_or_default(),
            start,
            end,
            attendees,
        })
    }
}

/// Parse an ISO datetime string to a chrono DateTime<Utc>.
pub fn parse_event_datetime(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if s.contains('T') {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    } else {
        // Date-only (all-day event), treated as midnight UTC
        chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
    }
}

/// Wall-clock time plus zone name, as Calendar expects for timed events.
fn zoned_time(time: NaiveDateTime, time_zone: &str) -> serde_json::Value {
    json!({
        "dateTime": time.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "timeZone": time_zone,
    })
}

fn event_body(event: &NewEvent, time_zone: &str, attach_meet_link: bool) -> serde_json::Value {
    let attendees: Vec<serde_json::Value> = event
        .attendees
        .iter()
        .map(|email| json!({ "email": email }))
        .collect();
    let mut body = json!({
        "summary": event.summary,
        "start": zoned_time(event.start, time_zone),
        "end": zoned_time(event.end, time_zone),
        "attendees": attendees,
    });
    if attach_meet_link {
        body["conferenceData"] = json!({
            "createRequest": {
                "requestId": uuid::Uuid::new_v4().to_string(),
                "conferenceSolutionKey": { "type": "hangoutsMeet" },
            }
        });
    }
    body
}

/// Calendar answers 404 for unknown ids and 410 for events already deleted.
fn missing_event(event_id: &str, err: GoogleApiError) -> SlotdeskError {
    match err {
        GoogleApiError::ApiError { status: 404 | 410, .. } => {
            SlotdeskError::NotFound(event_id.to_string())
        }
        other => other.into(),
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct GoogleCalendarService {
    client: reqwest::Client,
    tokens: Arc<TokenSource>,
    policy: RetryPolicy,
    calendar_id: String,
    time_zone: String,
    lookup_limit: u32,
    attach_meet_link: bool,
}

impl GoogleCalendarService {
    pub fn new(tokens: Arc<TokenSource>, config: &GoogleConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            policy: RetryPolicy::default(),
            calendar_id: config.calendar_id.clone(),
            time_zone: config.time_zone.clone(),
            lookup_limit: config.upcoming_lookup_limit,
            attach_meet_link: config.attach_meet_link,
        }
    }

    fn events_url(&self) -> String {
        format!("{}/{}/events", CALENDAR_API, self.calendar_id)
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), event_id)
    }

    async fn create_event(&self, event: &NewEvent) -> Result<GoogleEventRaw, GoogleApiError> {
        let access_token = self.tokens.access_token().await?;
        let conference_version = if self.attach_meet_link { "1" } else { "0" };
        let resp = send_with_retry(
            self.client
                .post(self.events_url())
                .bearer_auth(&access_token)
                .query(&[
                    ("sendUpdates", "all"),
                    ("conferenceDataVersion", conference_version),
                ])
                .json(&event_body(event, &self.time_zone, self.attach_meet_link)),
            &self.policy,
        )
        .await?;
        Ok(check_status(resp).await?.json().await?)
    }

    async fn list_upcoming(&self) -> Result<Vec<CalendarEvent>, GoogleApiError> {
        let access_token = self.tokens.access_token().await?;
        let time_min = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let max_results = self.lookup_limit.to_string();
        let resp = send_with_retry(
            self.client
                .get(self.events_url())
                .bearer_auth(&access_token)
                .query(&[
                    ("timeMin", time_min.as_str()),
                    ("singleEvents", "true"),
                    ("orderBy", "startTime"),
                    ("maxResults", max_results.as_str()),
                ]),
            &self.policy,
        )
        .await?;
        let body: CalendarListResponse = check_status(resp).await?.json().await?;
        Ok(body.items.into_iter().filter_map(GoogleEventRaw::into_event).collect())
    }

    async fn patch_event(&self, event_id: &str, patch: &EventPatch) -> Result<(), GoogleApiError> {
        let access_token = self.tokens.access_token().await?;
        let body = json!({
            "start": zoned_time(patch.start, &self.time_zone),
            "end": zoned_time(patch.end, &self.time_zone),
        });
        let resp = send_with_retry(
            self.client
                .patch(self.event_url(event_id))
                .bearer_auth(&access_token)
                .query(&[("sendUpdates", "all")])
                .json(&body),
            &self.policy,
        )
        .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> Result<Vec<String>, GoogleApiError> {
        let access_token = self.tokens.access_token().await?;

        let resp = send_with_retry(
            self.client
                .get(self.event_url(event_id))
                .bearer_auth(&access_token),
            &self.policy,
        )
        .await?;
        let existing: GoogleEventRaw = check_status(resp).await?.json().await?;
        let attendees = existing.attendee_emails();

        let resp = send_with_retry(
            self.client
                .delete(self.event_url(event_id))
                .bearer_auth(&access_token),
            &self.policy,
        )
        .await?;
        check_status(resp).await?;
        Ok(attendees)
    }
}

#[async_trait]
impl CalendarService for GoogleCalendarService {
    async fn create(&self, event: &NewEvent) -> Result<String, SlotdeskError> {
        let created = self.create_event(event).await?;
        log::info!(
            "Calendar: created '{}' ({}){}",
            event.summary,
            created.id,
            created
                .hangout_link
                .as_deref()
                .map(|l| format!(" meet link {}", l))
                .unwrap_or_default()
        );
        Ok(created.id)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<CalendarEvent>, SlotdeskError> {
        let events = self.list_upcoming().await?;
        Ok(first_upcoming_match(&events, name, Utc::now()).cloned())
    }

    async fn update(&self, event_id: &str, patch: &EventPatch) -> Result<(), SlotdeskError> {
        self.patch_event(event_id, patch)
            .await
            .map_err(|e| missing_event(event_id, e))?;
        log::info!("Calendar: rescheduled {} to {} - {}", event_id, patch.start, patch.end);
        Ok(())
    }

    async fn delete(&self, event_id: &str) -> Result<Vec<String>, SlotdeskError> {
        let attendees = self
            .delete_event(event_id)
            .await
            .map_err(|e| missing_event(event_id, e))?;
        log::info!("Calendar: deleted {}", event_id);
        Ok(attendees)
    }
}
