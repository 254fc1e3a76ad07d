use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::ClientConfig;
use crate::error::BookingError;
use crate::models::{
    Appointment, AppointmentRequest, BonusBalanceResponse, CreatedAppointment, Envelope,
    PromoTerms, ScheduleSettings, Service, SessionUser, Specialist, TimeSlotsPayload,
};

/// Data access seam for everything the wizard fetches or submits.
///
/// The production implementation talks to the platform's REST API; tests
/// inject an in-memory stub. All reads are idempotent and safe to re-issue.
#[async_trait]
pub trait BookingApi: Send + Sync {
    async fn list_services(&self) -> Result<Vec<Service>, BookingError>;

    async fn list_specialists(&self) -> Result<Vec<Specialist>, BookingError>;

    /// Per-specialist schedule settings (booking horizon override).
    async fn fetch_schedule_settings(
        &self,
        specialist_id: i64,
    ) -> Result<ScheduleSettings, BookingError>;

    /// Bookable dates for a specialist (optionally narrowed to a service)
    /// within `[start_date, end_date]`, both `YYYY-MM-DD`.
    async fn fetch_available_dates(
        &self,
        specialist_id: i64,
        service_id: Option<i64>,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<String>, BookingError>;

    async fn fetch_time_slots(
        &self,
        specialist_id: i64,
        date: &str,
        service_duration: i64,
    ) -> Result<TimeSlotsPayload, BookingError>;

    /// Validate a promo code against a service. A server-side rejection
    /// surfaces as `BookingError::Api` carrying the server's message.
    async fn validate_promo(
        &self,
        code: &str,
        service_id: i64,
    ) -> Result<PromoTerms, BookingError>;

    async fn fetch_bonus_balance(&self, user_id: i64) -> Result<i64, BookingError>;

    async fn create_appointment(
        &self,
        request: &AppointmentRequest,
    ) -> Result<CreatedAppointment, BookingError>;

    /// Session probe; `BookingError::SessionExpired` when the session is gone.
    async fn current_session(&self) -> Result<SessionUser, BookingError>;

    async fn list_user_appointments(
        &self,
        user_id: i64,
    ) -> Result<Vec<Appointment>, BookingError>;

    async fn cancel_appointment(&self, appointment_id: i64) -> Result<(), BookingError>;
}

// ── REST implementation ──

/// `BookingApi` over the platform's REST API.
pub struct RestBookingApi {
    http: reqwest::Client,
    /// Base URL without a trailing slash.
    base: String,
    session_token: Option<String>,
}

impl RestBookingApi {
    pub fn new(config: &ClientConfig) -> Result<Self, BookingError> {
        Url::parse(&config.api_base_url)
            .map_err(|e| BookingError::Transport(format!("некорректный адрес API: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BookingError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base: config.api_base_url.trim_end_matches('/').to_string(),
            session_token: config.session_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Unwrap the standard `{success, data, message}` envelope.
    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BookingError> {
        let envelope = Self::decode_raw::<Envelope<T>>(response).await?;
        if !envelope.success {
            return Err(BookingError::Api(
                envelope
                    .message
                    .unwrap_or_else(|| "запрос отклонён сервером".into()),
            ));
        }
        envelope
            .data
            .ok_or_else(|| BookingError::Transport("пустой ответ сервера".into()))
    }

    /// Like `decode`, but for endpoints whose success responses carry no data.
    async fn decode_ack(response: reqwest::Response) -> Result<(), BookingError> {
        let envelope = Self::decode_raw::<Envelope<serde_json::Value>>(response).await?;
        if !envelope.success {
            return Err(BookingError::Api(
                envelope
                    .message
                    .unwrap_or_else(|| "запрос отклонён сервером".into()),
            ));
        }
        Ok(())
    }

    async fn decode_raw<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BookingError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(BookingError::SessionExpired);
        }
        if !status.is_success() {
            return Err(BookingError::Transport(format!("HTTP {status}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| BookingError::Transport(e.to_string()))
    }
}

#[async_trait]
impl BookingApi for RestBookingApi {
    async fn list_services(&self) -> Result<Vec<Service>, BookingError> {
        let response = self.with_auth(self.http.get(self.url("/services"))).send().await?;
        Self::decode(response).await
    }

    async fn list_specialists(&self) -> Result<Vec<Specialist>, BookingError> {
        let response = self
            .with_auth(self.http.get(self.url("/specialists")))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn fetch_schedule_settings(
        &self,
        specialist_id: i64,
    ) -> Result<ScheduleSettings, BookingError> {
        let url = self.url(&format!("/specialists/{specialist_id}/schedule"));
        let response = self.with_auth(self.http.get(url)).send().await?;
        Self::decode_raw(response).await
    }

    async fn fetch_available_dates(
        &self,
        specialist_id: i64,
        service_id: Option<i64>,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<String>, BookingError> {
        let url = self.url(&format!("/specialists/{specialist_id}/available-dates"));
        let mut query: Vec<(&str, String)> = vec![
            ("startDate", start_date.to_string()),
            ("endDate", end_date.to_string()),
        ];
        if let Some(service_id) = service_id {
            query.push(("serviceId", service_id.to_string()));
        }
        let response = self.with_auth(self.http.get(url).query(&query)).send().await?;
        Self::decode(response).await
    }

    async fn fetch_time_slots(
        &self,
        specialist_id: i64,
        date: &str,
        service_duration: i64,
    ) -> Result<TimeSlotsPayload, BookingError> {
        let query: Vec<(&str, String)> = vec![
            ("specialistId", specialist_id.to_string()),
            ("date", date.to_string()),
            ("serviceDuration", service_duration.to_string()),
        ];
        let response = self
            .with_auth(self.http.get(self.url("/timeslots")).query(&query))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn validate_promo(
        &self,
        code: &str,
        service_id: i64,
    ) -> Result<PromoTerms, BookingError> {
        let body = serde_json::json!({ "code": code, "serviceId": service_id });
        let response = self
            .with_auth(self.http.post(self.url("/promos/validate")).json(&body))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn fetch_bonus_balance(&self, user_id: i64) -> Result<i64, BookingError> {
        let url = self.url(&format!("/bonus/user/{user_id}"));
        let response = self.with_auth(self.http.get(url)).send().await?;
        let body: BonusBalanceResponse = Self::decode_raw(response).await?;
        if !body.success {
            return Err(BookingError::Api(
                body.message.unwrap_or_else(|| "бонусный счёт недоступен".into()),
            ));
        }
        Ok(body.balance)
    }

    async fn create_appointment(
        &self,
        request: &AppointmentRequest,
    ) -> Result<CreatedAppointment, BookingError> {
        let response = self
            .with_auth(self.http.post(self.url("/appointments")).json(request))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn current_session(&self) -> Result<SessionUser, BookingError> {
        let response = self.with_auth(self.http.get(self.url("/auth/me"))).send().await?;
        Self::decode(response).await
    }

    async fn list_user_appointments(
        &self,
        user_id: i64,
    ) -> Result<Vec<Appointment>, BookingError> {
        let url = self.url(&format!("/appointments/user/{user_id}"));
        let response = self.with_auth(self.http.get(url)).send().await?;
        Self::decode(response).await
    }

    async fn cancel_appointment(&self, appointment_id: i64) -> Result<(), BookingError> {
        let url = self.url(&format!("/appointments/{appointment_id}"));
        let response = self.with_auth(self.http.delete(url)).send().await?;
        Self::decode_ack(response).await
    }
}

// ── In-memory stub for crate tests ──

#[cfg(test)]
pub(crate) mod stub {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::models::TimeSlot;

    /// Scripted `BookingApi` used across the crate's tests. Each field
    /// holds the canned reply for one endpoint; counters record traffic.
    #[derive(Default)]
    pub struct StubApi {
        pub services: Vec<Service>,
        pub specialists: Vec<Specialist>,
        pub schedule_months: Option<u32>,
        pub dates: Mutex<Vec<String>>,
        pub dates_fail: bool,
        /// Slot replies keyed by date.
        pub slots: Mutex<std::collections::HashMap<String, SlotsReply>>,
        pub promo: Option<PromoTerms>,
        pub promo_rejection: Option<String>,
        pub promo_calls: AtomicUsize,
        pub balance: i64,
        pub balance_fail: bool,
        pub balance_calls: AtomicUsize,
        pub created_id: i64,
        pub create_fail: Option<String>,
        pub create_calls: AtomicUsize,
        pub session_expired: bool,
        pub appointments: Vec<Appointment>,
        pub cancel_calls: AtomicUsize,
    }

    #[derive(Clone)]
    pub enum SlotsReply {
        Slots(Vec<TimeSlot>),
        Unavailable(String),
    }

    impl StubApi {
        pub fn slot(start: &str, end: &str) -> TimeSlot {
            TimeSlot {
                start_time: start.into(),
                end_time: end.into(),
                available: true,
            }
        }

        pub fn set_dates(&self, dates: &[&str]) {
            *self.dates.lock().unwrap() = dates.iter().map(|d| d.to_string()).collect();
        }

        pub fn set_slots(&self, date: &str, reply: SlotsReply) {
            self.slots.lock().unwrap().insert(date.to_string(), reply);
        }
    }

    #[async_trait]
    impl BookingApi for StubApi {
        async fn list_services(&self) -> Result<Vec<Service>, BookingError> {
            Ok(self.services.clone())
        }

        async fn list_specialists(&self) -> Result<Vec<Specialist>, BookingError> {
            Ok(self.specialists.clone())
        }

        async fn fetch_schedule_settings(
            &self,
            _specialist_id: i64,
        ) -> Result<ScheduleSettings, BookingError> {
            match self.schedule_months {
                Some(months) => Ok(ScheduleSettings {
                    booking_period_months: months,
                }),
                None => Err(BookingError::Transport("no schedule".into())),
            }
        }

        async fn fetch_available_dates(
            &self,
            _specialist_id: i64,
            _service_id: Option<i64>,
            _start_date: &str,
            _end_date: &str,
        ) -> Result<Vec<String>, BookingError> {
            if self.dates_fail {
                return Err(BookingError::Transport("boom".into()));
            }
            Ok(self.dates.lock().unwrap().clone())
        }

        async fn fetch_time_slots(
            &self,
            _specialist_id: i64,
            date: &str,
            _service_duration: i64,
        ) -> Result<TimeSlotsPayload, BookingError> {
            match self.slots.lock().unwrap().get(date) {
                Some(SlotsReply::Slots(slots)) => Ok(TimeSlotsPayload {
                    time_slots: slots.clone(),
                    ..Default::default()
                }),
                Some(SlotsReply::Unavailable(reason)) => Ok(TimeSlotsPayload {
                    status: Some("unavailable".into()),
                    reason: Some(reason.clone()),
                    ..Default::default()
                }),
                None => Err(BookingError::Transport("no reply scripted".into())),
            }
        }

        async fn validate_promo(
            &self,
            _code: &str,
            _service_id: i64,
        ) -> Result<PromoTerms, BookingError> {
            self.promo_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = &self.promo_rejection {
                return Err(BookingError::Api(message.clone()));
            }
            self.promo
                .ok_or_else(|| BookingError::Transport("no promo scripted".into()))
        }

        async fn fetch_bonus_balance(&self, _user_id: i64) -> Result<i64, BookingError> {
            self.balance_calls.fetch_add(1, Ordering::SeqCst);
            if self.balance_fail {
                return Err(BookingError::Transport("boom".into()));
            }
            Ok(self.balance)
        }

        async fn create_appointment(
            &self,
            _request: &AppointmentRequest,
        ) -> Result<CreatedAppointment, BookingError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = &self.create_fail {
                return Err(BookingError::Api(message.clone()));
            }
            Ok(CreatedAppointment { id: self.created_id })
        }

        async fn current_session(&self) -> Result<SessionUser, BookingError> {
            if self.session_expired {
                return Err(BookingError::SessionExpired);
            }
            Ok(SessionUser {
                id: 7,
                first_name: "Анна".into(),
                email: None,
            })
        }

        async fn list_user_appointments(
            &self,
            _user_id: i64,
        ) -> Result<Vec<Appointment>, BookingError> {
            Ok(self.appointments.clone())
        }

        async fn cancel_appointment(&self, _appointment_id: i64) -> Result<(), BookingError> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn rest_api(base: &str) -> RestBookingApi {
        let config = ClientConfig {
            api_base_url: base.into(),
            ..Default::default()
        };
        RestBookingApi::new(&config).unwrap()
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let api = rest_api("https://api.veluna.ru/api/");
        assert_eq!(api.url("/services"), "https://api.veluna.ru/api/services");
    }

    #[test]
    fn test_url_keeps_path_segments() {
        let api = rest_api("https://api.veluna.ru/api");
        assert_eq!(
            api.url("/specialists/5/schedule"),
            "https://api.veluna.ru/api/specialists/5/schedule"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = ClientConfig {
            api_base_url: "not a url".into(),
            ..Default::default()
        };
        assert!(RestBookingApi::new(&config).is_err());
    }
}
