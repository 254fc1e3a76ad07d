use serde::{Deserialize, Serialize};

use crate::error::BookingError;

// ── Domain types ──

/// A bookable service offered by the studio. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: i64,
    pub name: String,
    /// Whole currency units.
    pub price: i64,
    /// Duration in minutes.
    pub duration: i64,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A specialist together with the services they offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specialist {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub service_ids: Vec<i64>,
}

impl Specialist {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn offers(&self, service_id: i64) -> bool {
        self.service_ids.contains(&service_id)
    }
}

/// A bookable start/end interval for one specialist and date.
/// Start and end are `HH:MM`; start < end and slots never overlap
/// (guaranteed by the scheduling API, not re-validated here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub start_time: String,
    pub end_time: String,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// A successfully validated promo code and the discount it grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoApplication {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    /// Resolved discount in currency units, already clamped to the base price.
    pub discount_amount: i64,
}

/// Contact fields gathered at the details step.
#[derive(Debug, Clone, Default)]
pub struct ContactDetails {
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: String,
    pub phone: String,
    /// Anonymous users may set a password to create an account on booking.
    pub password: Option<String>,
}

impl ContactDetails {
    /// firstName, email and phone are required; everything else optional.
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.first_name.trim().is_empty() {
            return Err(BookingError::validation("укажите имя"));
        }
        if self.email.trim().is_empty() {
            return Err(BookingError::validation("укажите email"));
        }
        if self.phone.trim().is_empty() {
            return Err(BookingError::validation("укажите телефон"));
        }
        Ok(())
    }
}

/// Everything the wizard has gathered so far. Created empty when the
/// wizard opens, discarded on close, turned into an `AppointmentRequest`
/// on confirm.
#[derive(Debug, Clone, Default)]
pub struct BookingDraft {
    pub service: Option<Service>,
    pub specialist: Option<Specialist>,
    /// `YYYY-MM-DD`.
    pub date: Option<String>,
    pub slot: Option<TimeSlot>,
    pub contact: ContactDetails,
}

/// Terminal success state: the appointment id plus the echoed draft
/// fields, enough to render the confirmation screen and calendar links.
#[derive(Debug, Clone)]
pub struct BookingConfirmation {
    pub appointment_id: i64,
    pub service: Service,
    pub specialist: Specialist,
    pub date: String,
    pub slot: TimeSlot,
    pub email: String,
    pub final_price: i64,
}

// ── Wire types ──

/// The platform's standard response envelope.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /specialists/{id}/schedule` — the one endpoint without an envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSettings {
    pub booking_period_months: u32,
}

/// Payload of `GET /timeslots`. A structurally unavailable day (day off,
/// vacation) comes back with `status: "unavailable"` and a reason instead
/// of slots.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlotsPayload {
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TimeSlotsPayload {
    pub fn is_unavailable(&self) -> bool {
        self.status.as_deref() == Some("unavailable")
    }
}

/// Discount terms returned by `POST /promos/validate`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoTerms {
    pub discount_type: DiscountType,
    pub discount_value: i64,
}

/// `GET /bonus/user/{id}` puts the balance beside `success`, not in `data`.
#[derive(Debug, Deserialize)]
pub struct BonusBalanceResponse {
    pub success: bool,
    #[serde(default)]
    pub balance: i64,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST /appointments`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRequest {
    pub service_id: i64,
    pub specialist_id: i64,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
    pub bonus_spent: i64,
    pub final_price: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedAppointment {
    pub id: i64,
}

/// An upcoming appointment as listed for a user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: i64,
    pub service_name: String,
    pub specialist_name: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub price: i64,
}

/// `GET /auth/me`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

// ── Tests ──
