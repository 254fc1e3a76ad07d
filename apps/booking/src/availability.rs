//! Date and time-slot resolution against the scheduling API.
//!
//! Two dependent queries: available dates for a (specialist, service)
//! pair, then time slots for a chosen date. A date can be proven
//! unavailable only by the slot fetch (day off, vacation), which requires
//! backward correction of the date set — see `apply_slots`.

use std::collections::BTreeSet;

use chrono::{Datelike, Months, NaiveDate};

use crate::api::BookingApi;
use crate::config::ClientConfig;
use crate::models::TimeSlot;

/// Identity of a date-availability query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatesKey {
    pub specialist_id: i64,
    pub service_id: Option<i64>,
}

/// Identity of a time-slot query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotsKey {
    pub specialist_id: i64,
    pub date: String,
}

/// Result of a slot fetch for one date.
#[derive(Debug, Clone)]
pub enum SlotsOutcome {
    Slots(Vec<TimeSlot>),
    /// Day off or vacation: the date itself is not bookable.
    Unavailable { reason: String },
}

/// A date that looked bookable was proven otherwise by the slot fetch.
/// The wizard reacts by clearing the selection and stepping back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRuledOut {
    pub date: String,
    pub reason: String,
}

/// Holds the currently valid date set and slot list, keyed by the
/// selection they were fetched for. Results whose key no longer matches
/// the current selection are discarded, so a stale slow response can
/// never overwrite a newer one.
#[derive(Debug, Default)]
pub struct AvailabilityResolver {
    dates_key: Option<DatesKey>,
    dates: BTreeSet<String>,
    slots_key: Option<SlotsKey>,
    slots: Vec<TimeSlot>,
}

impl AvailabilityResolver {
    pub fn dates(&self) -> &BTreeSet<String> {
        &self.dates
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn is_date_bookable(&self, date: &str) -> bool {
        self.dates.contains(date)
    }

    /// Point the resolver at a new (specialist, service) pair. Clears
    /// everything downstream: dates and slots are scoped to this key.
    pub fn select_dates_key(&mut self, key: DatesKey) {
        if self.dates_key.as_ref() != Some(&key) {
            self.dates.clear();
        }
        self.dates_key = Some(key);
        self.slots_key = None;
        self.slots.clear();
    }

    /// Point the resolver at a date. Clears the slot list.
    pub fn select_slots_key(&mut self, key: SlotsKey) {
        self.slots_key = Some(key);
        self.slots.clear();
    }

    /// Apply a fetched date set; ignored when the selection has moved on.
    /// Returns whether the result was applied.
    pub fn apply_dates(&mut self, key: &DatesKey, dates: BTreeSet<String>) -> bool {
        if self.dates_key.as_ref() != Some(key) {
            tracing::debug!("discarding stale date set for specialist {}", key.specialist_id);
            return false;
        }
        self.dates = dates;
        true
    }

    /// Apply a slot fetch result; ignored when the selection has moved on.
    ///
    /// A structurally unavailable day retroactively removes its date from
    /// the date set and reports a `DateRuledOut` for the wizard to consume.
    pub fn apply_slots(&mut self, key: &SlotsKey, outcome: SlotsOutcome) -> Option<DateRuledOut> {
        if self.slots_key.as_ref() != Some(key) {
            tracing::debug!("discarding stale slots for {}", key.date);
            return None;
        }
        match outcome {
            SlotsOutcome::Slots(slots) => {
                self.slots = slots;
                None
            }
            SlotsOutcome::Unavailable { reason } => {
                self.dates.remove(&key.date);
                self.slots.clear();
                self.slots_key = None;
                Some(DateRuledOut {
                    date: key.date.clone(),
                    reason,
                })
            }
        }
    }
}

// ── Fetching ──

/// Bookable dates for `key`. The booking horizon comes from the
/// specialist's schedule settings when available, otherwise from config.
/// Any transport failure collapses to an empty set — "no dates" is a
/// normal, displayable state, never an exception.
pub async fn fetch_dates(
    api: &dyn BookingApi,
    key: &DatesKey,
    config: &ClientConfig,
) -> BTreeSet<String> {
    let months = match api.fetch_schedule_settings(key.specialist_id).await {
        Ok(settings) => settings.booking_period_months,
        Err(err) => {
            tracing::warn!(
                "schedule settings unavailable for specialist {}: {err}",
                key.specialist_id
            );
            config.default_horizon_months
        }
    };

    let today = chrono::Local::now().date_naive();
    let (start, end) = horizon_window(today, months);
    match api
        .fetch_available_dates(key.specialist_id, key.service_id, &start, &end)
        .await
    {
        Ok(dates) => dates.into_iter().collect(),
        Err(err) => {
            tracing::warn!(
                "available dates fetch failed for specialist {}: {err}",
                key.specialist_id
            );
            BTreeSet::new()
        }
    }
}

/// Slots for one date. Transport failures collapse to an empty slot list;
/// a `status: "unavailable"` reply becomes `SlotsOutcome::Unavailable`.
pub async fn fetch_slots(
    api: &dyn BookingApi,
    key: &SlotsKey,
    service_duration: i64,
) -> SlotsOutcome {
    match api
        .fetch_time_slots(key.specialist_id, &key.date, service_duration)
        .await
    {
        Ok(payload) if payload.is_unavailable() => {
            let reason = payload
                .reason
                .or(payload.message)
                .unwrap_or_else(|| "день недоступен для записи".into());
            SlotsOutcome::Unavailable { reason }
        }
        Ok(payload) => SlotsOutcome::Slots(payload.time_slots),
        Err(err) => {
            tracing::warn!("time slot fetch failed for {}: {err}", key.date);
            SlotsOutcome::Slots(Vec::new())
        }
    }
}

/// Booking window: first day of the current month through the last day of
/// the horizon, both `YYYY-MM-DD`.
fn horizon_window(today: NaiveDate, months: u32) -> (String, String) {
    let start = today.with_day(1).unwrap_or(today);
    let end = start
        .checked_add_months(Months::new(months))
        .and_then(|d| d.pred_opt())
        .unwrap_or(start);
    (
        start.format("%Y-%m-%d").to_string(),
        end.format("%Y-%m-%d").to_string(),
    )
}

// ── Tests ──
