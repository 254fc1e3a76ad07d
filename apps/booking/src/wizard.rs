//! The booking wizard: one parameterized state machine for every entry
//! point (generic booking, booking from a service page, booking from a
//! specialist page). Pre-selected items collapse their steps instead of
//! duplicating the flow.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::api::BookingApi;
use crate::availability::{
    self, AvailabilityResolver, DateRuledOut, DatesKey, SlotsKey,
};
use crate::bonus::BonusRedemption;
use crate::config::ClientConfig;
use crate::error::BookingError;
use crate::models::{
    AppointmentRequest, BookingConfirmation, BookingDraft, ContactDetails, Service, Specialist,
    TimeSlot,
};
use crate::pricing;
use crate::promo::PromoField;

/// Steps in visual order. `Success` is terminal; a failed submission keeps
/// the wizard at `DetailsEntry` with a retryable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    ServiceSelect,
    SpecialistSelect,
    DateSelect,
    TimeSelect,
    DetailsEntry,
    Success,
}

/// Emitted after a successful submission so that an appointments listing
/// can refresh without a full reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingNotice {
    AppointmentCreated { appointment_id: i64 },
}

/// Per-wizard parameters: which steps come pre-collapsed, who the
/// authenticated user is (enables the session probe and bonus flow), and
/// where creation notices go.
#[derive(Default)]
pub struct WizardOptions {
    pub preselected_service: Option<Service>,
    pub preselected_specialist: Option<Specialist>,
    pub user_id: Option<i64>,
    pub notices: Option<UnboundedSender<BookingNotice>>,
}

/// What came out of a submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created,
    /// Server or transport failure; the wizard stays at `DetailsEntry`.
    Failed(String),
    /// A submission is already in flight; nothing was sent.
    AlreadyInFlight,
    /// The wizard already reached `Success`; nothing was sent.
    AlreadyCompleted,
}

pub struct BookingWizard {
    config: ClientConfig,
    options: WizardOptions,
    steps: Vec<WizardStep>,
    step: WizardStep,
    draft: BookingDraft,
    availability: AvailabilityResolver,
    promo: PromoField,
    bonus: BonusRedemption,
    submitting: bool,
    last_error: Option<String>,
    confirmation: Option<BookingConfirmation>,
}

impl BookingWizard {
    /// A fresh wizard with an empty draft. Dropping the wizard at any
    /// point discards the draft; there is no persistence.
    pub fn new(config: ClientConfig, options: WizardOptions) -> Self {
        let mut steps = Vec::with_capacity(5);
        if options.preselected_service.is_none() {
            steps.push(WizardStep::ServiceSelect);
        }
        if options.preselected_specialist.is_none() {
            steps.push(WizardStep::SpecialistSelect);
        }
        steps.extend([
            WizardStep::DateSelect,
            WizardStep::TimeSelect,
            WizardStep::DetailsEntry,
        ]);

        let draft = BookingDraft {
            service: options.preselected_service.clone(),
            specialist: options.preselected_specialist.clone(),
            ..Default::default()
        };

        Self {
            step: steps[0],
            steps,
            draft,
            availability: AvailabilityResolver::default(),
            promo: PromoField::default(),
            bonus: BonusRedemption::default(),
            submitting: false,
            last_error: None,
            confirmation: None,
            config,
            options,
        }
    }

    // ── Introspection ──

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &BookingDraft {
        &self.draft
    }

    pub fn confirmation(&self) -> Option<&BookingConfirmation> {
        self.confirmation.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.options.user_id
    }

    /// Animation window frontends should let elapse before mounting the
    /// next step's content. Data only; the wizard never sleeps.
    pub fn transition_delay(&self) -> Duration {
        self.config.transition_delay
    }

    pub fn available_dates(&self) -> &BTreeSet<String> {
        self.availability.dates()
    }

    pub fn time_slots(&self) -> &[TimeSlot] {
        self.availability.slots()
    }

    pub fn promo(&self) -> &PromoField {
        &self.promo
    }

    pub fn bonus(&self) -> &BonusRedemption {
        &self.bonus
    }

    // ── Pricing (recomputed on demand, never stored) ──

    pub fn base_price(&self) -> i64 {
        self.draft.service.as_ref().map_or(0, |s| s.price)
    }

    pub fn price_after_promo(&self) -> i64 {
        pricing::price_after_promo(self.base_price(), self.promo.application())
    }

    pub fn final_price(&self) -> i64 {
        pricing::final_price(self.base_price(), self.promo.application(), self.bonus.amount())
    }

    // ── Step navigation ──

    fn step_index(&self, step: WizardStep) -> usize {
        self.steps.iter().position(|s| *s == step).unwrap_or(0)
    }

    fn advance(&mut self) {
        let index = self.step_index(self.step);
        if index + 1 < self.steps.len() {
            self.step = self.steps[index + 1];
        }
    }

    /// One step back. Downstream selections survive; they are only cleared
    /// when a re-selection actually invalidates them.
    pub fn back(&mut self) {
        if self.step == WizardStep::Success {
            return;
        }
        let index = self.step_index(self.step);
        if index > 0 {
            self.step = self.steps[index - 1];
        }
    }

    fn ensure_step(&self, expected: WizardStep) -> Result<(), BookingError> {
        if self.step != expected {
            return Err(BookingError::validation("этот шаг сейчас недоступен"));
        }
        Ok(())
    }

    // ── Selections ──

    pub fn select_service(&mut self, service: Service) -> Result<(), BookingError> {
        self.ensure_step(WizardStep::ServiceSelect)?;
        if let Some(specialist) = &self.draft.specialist {
            if !specialist.offers(service.id) {
                return Err(BookingError::validation("мастер не выполняет эту услугу"));
            }
        }
        let changed = self.draft.service.as_ref().map(|s| s.id) != Some(service.id);
        self.draft.service = Some(service);
        if changed {
            // availability and the promo are both service-scoped
            self.draft.date = None;
            self.draft.slot = None;
            self.promo.cancel();
            let price = self.price_after_promo();
            self.bonus.reclamp(price);
        }
        self.advance();
        Ok(())
    }

    pub fn select_specialist(&mut self, specialist: Specialist) -> Result<(), BookingError> {
        self.ensure_step(WizardStep::SpecialistSelect)?;
        if let Some(service) = &self.draft.service {
            if !specialist.offers(service.id) {
                return Err(BookingError::validation("мастер не выполняет эту услугу"));
            }
        }
        let changed = self.draft.specialist.as_ref().map(|s| s.id) != Some(specialist.id);
        self.draft.specialist = Some(specialist);
        if changed {
            // dates and slots are specialist-specific
            self.draft.date = None;
            self.draft.slot = None;
        }
        self.advance();
        Ok(())
    }

    /// Refresh the date grid for the current (specialist, service)
    /// selection. Strictly precedes any slot fetch.
    pub async fn load_dates(&mut self, api: &dyn BookingApi) -> Result<(), BookingError> {
        let specialist_id = self
            .draft
            .specialist
            .as_ref()
            .map(|s| s.id)
            .ok_or_else(|| BookingError::validation("сначала выберите мастера"))?;
        let key = DatesKey {
            specialist_id,
            service_id: self.draft.service.as_ref().map(|s| s.id),
        };
        self.availability.select_dates_key(key.clone());
        let dates = availability::fetch_dates(api, &key, &self.config).await;
        self.availability.apply_dates(&key, dates);
        Ok(())
    }

    pub fn select_date(&mut self, date: &str) -> Result<(), BookingError> {
        self.ensure_step(WizardStep::DateSelect)?;
        if !self.availability.is_date_bookable(date) {
            return Err(BookingError::validation("эта дата недоступна для записи"));
        }
        if self.draft.date.as_deref() != Some(date) {
            self.draft.slot = None;
        }
        self.draft.date = Some(date.to_string());
        self.advance();
        Ok(())
    }

    /// Fetch slots for the selected date. When the date turns out to be
    /// structurally unavailable it is retracted from the date grid, the
    /// selection is cleared and the wizard steps back to date selection;
    /// the returned `DateRuledOut` carries the reason for display.
    pub async fn load_slots(
        &mut self,
        api: &dyn BookingApi,
    ) -> Result<Option<DateRuledOut>, BookingError> {
        let specialist_id = self
            .draft
            .specialist
            .as_ref()
            .map(|s| s.id)
            .ok_or_else(|| BookingError::validation("сначала выберите мастера"))?;
        let date = self
            .draft
            .date
            .clone()
            .ok_or_else(|| BookingError::validation("сначала выберите дату"))?;
        let duration = self.draft.service.as_ref().map_or(60, |s| s.duration);

        let key = SlotsKey {
            specialist_id,
            date,
        };
        self.availability.select_slots_key(key.clone());
        let outcome = availability::fetch_slots(api, &key, duration).await;
        if let Some(ruled_out) = self.availability.apply_slots(&key, outcome) {
            self.draft.date = None;
            self.draft.slot = None;
            if self.step == WizardStep::TimeSelect {
                self.step = WizardStep::DateSelect;
            }
            return Ok(Some(ruled_out));
        }
        Ok(None)
    }

    pub fn select_slot(&mut self, slot: TimeSlot) -> Result<(), BookingError> {
        self.ensure_step(WizardStep::TimeSelect)?;
        if !slot.available {
            return Err(BookingError::validation("это время уже занято"));
        }
        self.draft.slot = Some(slot);
        self.advance();
        Ok(())
    }

    // ── Details, promo, bonus ──

    pub fn contact(&self) -> &ContactDetails {
        &self.draft.contact
    }

    pub fn contact_mut(&mut self) -> &mut ContactDetails {
        &mut self.draft.contact
    }

    /// Promo code entry; the applied discount immediately tightens the
    /// bonus cap.
    pub async fn apply_promo(
        &mut self,
        api: &dyn BookingApi,
        code: &str,
    ) -> Result<(), BookingError> {
        let service_id = self
            .draft
            .service
            .as_ref()
            .map(|s| s.id)
            .ok_or_else(|| BookingError::validation("услуга не выбрана"))?;
        let base_price = self.base_price();
        self.promo.set_code_input(code);
        self.promo.apply(api, service_id, base_price).await?;
        let price = self.price_after_promo();
        self.bonus.reclamp(price);
        Ok(())
    }

    pub fn cancel_promo(&mut self) {
        self.promo.cancel();
        let price = self.price_after_promo();
        self.bonus.reclamp(price);
    }

    pub fn set_bonus_balance(&mut self, balance: i64) {
        let price = self.price_after_promo();
        self.bonus.set_balance(balance, price);
    }

    pub fn toggle_bonus(&mut self, on: bool) {
        let price = self.price_after_promo();
        self.bonus.toggle(on, price);
    }

    pub fn set_bonus_amount(&mut self, raw: i64) {
        let price = self.price_after_promo();
        let snap = self.config.snap;
        self.bonus.set_amount(raw, &snap, price);
    }

    // ── Submission ──

    /// One POST per confirmed booking. Validation failures and an expired
    /// session surface as errors before anything is sent; server and
    /// transport failures keep the wizard at `DetailsEntry` for retry.
    pub async fn submit(&mut self, api: &dyn BookingApi) -> Result<SubmitOutcome, BookingError> {
        if self.step == WizardStep::Success {
            return Ok(SubmitOutcome::AlreadyCompleted);
        }
        self.ensure_step(WizardStep::DetailsEntry)?;
        if self.submitting {
            return Ok(SubmitOutcome::AlreadyInFlight);
        }

        self.draft.contact.validate()?;
        let service = self
            .draft
            .service
            .clone()
            .ok_or_else(|| BookingError::validation("услуга не выбрана"))?;
        let specialist = self
            .draft
            .specialist
            .clone()
            .ok_or_else(|| BookingError::validation("мастер не выбран"))?;
        let date = self
            .draft
            .date
            .clone()
            .ok_or_else(|| BookingError::validation("дата не выбрана"))?;
        let slot = self
            .draft
            .slot
            .clone()
            .ok_or_else(|| BookingError::validation("время не выбрано"))?;

        // Opportunistic session probe for signed-in users: an expired
        // session should prompt re-authentication, not a failed POST.
        if self.options.user_id.is_some() {
            match api.current_session().await {
                Err(BookingError::SessionExpired) => return Err(BookingError::SessionExpired),
                Err(err) => tracing::warn!("session probe failed, proceeding: {err}"),
                Ok(_) => {}
            }
        }

        let request = AppointmentRequest {
            service_id: service.id,
            specialist_id: specialist.id,
            date: date.clone(),
            start_time: slot.start_time.clone(),
            end_time: slot.end_time.clone(),
            first_name: self.draft.contact.first_name.trim().to_string(),
            last_name: self.draft.contact.last_name.clone(),
            email: self.draft.contact.email.trim().to_string(),
            phone: self.draft.contact.phone.trim().to_string(),
            password: self.draft.contact.password.clone(),
            promo_code: self.promo.application().map(|p| p.code.clone()),
            bonus_spent: self.bonus.amount(),
            final_price: self.final_price(),
        };

        self.submitting = true;
        let result = api.create_appointment(&request).await;
        self.submitting = false;

        match result {
            Ok(created) => {
                tracing::info!("appointment {} created", created.id);
                if let Some(notices) = &self.options.notices {
                    let _ = notices.send(BookingNotice::AppointmentCreated {
                        appointment_id: created.id,
                    });
                }
                self.confirmation = Some(BookingConfirmation {
                    appointment_id: created.id,
                    service,
                    specialist,
                    date,
                    slot,
                    email: request.email,
                    final_price: request.final_price,
                });
                self.last_error = None;
                self.step = WizardStep::Success;
                Ok(SubmitOutcome::Created)
            }
            Err(err) => {
                tracing::error!("appointment submission failed: {err}");
                let message = err.to_string();
                self.last_error = Some(message.clone());
                Ok(SubmitOutcome::Failed(message))
            }
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::stub::{SlotsReply, StubApi};
    use crate::models::{DiscountType, PromoTerms};
    use std::sync::atomic::Ordering;

    fn service(id: i64, price: i64) -> Service {
        Service {
            id,
            name: format!("Массаж {id}"),
            price,
            duration: 60,
            image_url: None,
        }
    }

    fn specialist(id: i64, service_ids: &[i64]) -> Specialist {
        Specialist {
            id,
            first_name: "Мария".into(),
            last_name: "Иванова".into(),
            photo_url: None,
            service_ids: service_ids.to_vec(),
        }
    }

    fn stub_for_flow() -> StubApi {
        let api = StubApi {
            created_id: 42,
            ..Default::default()
        };
        api.set_dates(&["2025-04-28", "2025-04-29"]);
        api.set_slots(
            "2025-04-28",
            SlotsReply::Slots(vec![
                StubApi::slot("10:00", "11:00"),
                StubApi::slot("11:00", "12:00"),
            ]),
        );
        api
    }

    fn fill_contact(wizard: &mut BookingWizard) {
        let contact = wizard.contact_mut();
        contact.first_name = "Анна".into();
        contact.email = "anna@example.com".into();
        contact.phone = "+79990001122".into();
    }

    async fn walk_to_details(wizard: &mut BookingWizard, api: &StubApi) {
        wizard.select_service(service(1, 1000)).unwrap();
        wizard.select_specialist(specialist(5, &[1])).unwrap();
        wizard.load_dates(api).await.unwrap();
        wizard.select_date("2025-04-28").unwrap();
        wizard.load_slots(api).await.unwrap();
        wizard.select_slot(StubApi::slot("10:00", "11:00")).unwrap();
    }

    fn wizard() -> BookingWizard {
        BookingWizard::new(ClientConfig::default(), WizardOptions::default())
    }

    // ── Step flow ──

    #[tokio::test]
    async fn test_happy_path_reaches_success() {
        let api = stub_for_flow();
        let mut w = wizard();
        walk_to_details(&mut w, &api).await;
        assert_eq!(w.step(), WizardStep::DetailsEntry);

        fill_contact(&mut w);
        let outcome = w.submit(&api).await.unwrap();

        assert_eq!(outcome, SubmitOutcome::Created);
        assert_eq!(w.step(), WizardStep::Success);
        let confirmation = w.confirmation().unwrap();
        assert_eq!(confirmation.appointment_id, 42);
        assert_eq!(confirmation.final_price, 1000);
        assert_eq!(api.create_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_preselected_specialist_collapses_step() {
        let options = WizardOptions {
            preselected_specialist: Some(specialist(5, &[1, 2])),
            ..Default::default()
        };
        let w = BookingWizard::new(ClientConfig::default(), options);
        assert_eq!(w.step(), WizardStep::ServiceSelect);
        assert!(!w.steps.contains(&WizardStep::SpecialistSelect));
    }

    #[test]
    fn test_preselected_service_starts_at_specialist() {
        let options = WizardOptions {
            preselected_service: Some(service(1, 1000)),
            ..Default::default()
        };
        let w = BookingWizard::new(ClientConfig::default(), options);
        assert_eq!(w.step(), WizardStep::SpecialistSelect);
    }

    #[test]
    fn test_fully_preselected_starts_at_dates() {
        let options = WizardOptions {
            preselected_service: Some(service(1, 1000)),
            preselected_specialist: Some(specialist(5, &[1])),
            ..Default::default()
        };
        let w = BookingWizard::new(ClientConfig::default(), options);
        assert_eq!(w.step(), WizardStep::DateSelect);
    }

    #[test]
    fn test_back_goes_exactly_one_step() {
        let mut w = wizard();
        w.select_service(service(1, 1000)).unwrap();
        assert_eq!(w.step(), WizardStep::SpecialistSelect);
        w.back();
        assert_eq!(w.step(), WizardStep::ServiceSelect);
        w.back(); // already at the first step
        assert_eq!(w.step(), WizardStep::ServiceSelect);
    }

    #[test]
    fn test_selection_on_wrong_step_rejected() {
        let mut w = wizard();
        assert!(w.select_date("2025-04-28").is_err());
        assert!(w.select_slot(StubApi::slot("10:00", "11:00")).is_err());
    }

    #[test]
    fn test_specialist_must_offer_service() {
        let mut w = wizard();
        w.select_service(service(1, 1000)).unwrap();
        assert!(w.select_specialist(specialist(5, &[2])).is_err());
    }

    // ── Invalidation rules ──

    #[tokio::test]
    async fn test_switching_specialist_clears_date_and_slot() {
        let api = stub_for_flow();
        let mut w = wizard();
        walk_to_details(&mut w, &api).await;
        assert!(w.draft().date.is_some());
        assert!(w.draft().slot.is_some());

        // back to specialist selection, pick someone else
        w.back();
        w.back();
        w.back();
        assert_eq!(w.step(), WizardStep::SpecialistSelect);
        w.select_specialist(specialist(6, &[1])).unwrap();

        assert!(w.draft().date.is_none());
        assert!(w.draft().slot.is_none());
    }

    #[tokio::test]
    async fn test_reselecting_same_specialist_keeps_selections() {
        let api = stub_for_flow();
        let mut w = wizard();
        walk_to_details(&mut w, &api).await;

        w.back();
        w.back();
        w.back();
        w.select_specialist(specialist(5, &[1])).unwrap();

        assert_eq!(w.draft().date.as_deref(), Some("2025-04-28"));
        assert!(w.draft().slot.is_some());
    }

    #[tokio::test]
    async fn test_vacation_day_steps_back_and_retracts_date() {
        let api = stub_for_flow();
        api.set_slots(
            "2025-04-28",
            SlotsReply::Unavailable("Specialist on vacation".into()),
        );

        let mut w = wizard();
        w.select_service(service(1, 1000)).unwrap();
        w.select_specialist(specialist(5, &[1])).unwrap();
        w.load_dates(&api).await.unwrap();
        w.select_date("2025-04-28").unwrap();
        assert_eq!(w.step(), WizardStep::TimeSelect);

        let ruled_out = w.load_slots(&api).await.unwrap().unwrap();

        assert_eq!(ruled_out.reason, "Specialist on vacation");
        assert_eq!(w.step(), WizardStep::DateSelect);
        assert!(w.draft().date.is_none());
        assert!(!w.available_dates().contains("2025-04-28"));
        assert!(w.available_dates().contains("2025-04-29"));
    }

    // ── Submission guards ──

    #[tokio::test]
    async fn test_missing_phone_blocks_submit_without_network() {
        let api = stub_for_flow();
        let mut w = wizard();
        walk_to_details(&mut w, &api).await;
        let contact = w.contact_mut();
        contact.first_name = "Анна".into();
        contact.email = "anna@example.com".into();
        // phone left empty

        let err = w.submit(&api).await.unwrap_err();

        assert!(err.is_validation());
        assert_eq!(w.step(), WizardStep::DetailsEntry);
        assert_eq!(api.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_double_submit_sends_one_post() {
        let api = stub_for_flow();
        let mut w = wizard();
        walk_to_details(&mut w, &api).await;
        fill_contact(&mut w);

        assert_eq!(w.submit(&api).await.unwrap(), SubmitOutcome::Created);
        assert_eq!(w.submit(&api).await.unwrap(), SubmitOutcome::AlreadyCompleted);
        assert_eq!(api.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_in_flight_guard_blocks_reentry() {
        let api = stub_for_flow();
        let mut w = wizard();
        walk_to_details(&mut w, &api).await;
        fill_contact(&mut w);
        w.submitting = true;

        assert_eq!(w.submit(&api).await.unwrap(), SubmitOutcome::AlreadyInFlight);
        assert_eq!(api.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_submit_stays_retryable() {
        let mut api = stub_for_flow();
        api.create_fail = Some("Время уже занято".into());

        let mut w = wizard();
        walk_to_details(&mut w, &api).await;
        fill_contact(&mut w);

        match w.submit(&api).await.unwrap() {
            SubmitOutcome::Failed(message) => assert_eq!(message, "Время уже занято"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(w.step(), WizardStep::DetailsEntry);
        assert_eq!(w.last_error(), Some("Время уже занято"));

        // retry after the server recovers
        api.create_fail = None;
        assert_eq!(w.submit(&api).await.unwrap(), SubmitOutcome::Created);
        assert_eq!(api.create_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_session_surfaces_before_post() {
        let mut api = stub_for_flow();
        api.session_expired = true;

        let options = WizardOptions {
            user_id: Some(7),
            ..Default::default()
        };
        let mut w = BookingWizard::new(ClientConfig::default(), options);
        walk_to_details(&mut w, &api).await;
        fill_contact(&mut w);

        let err = w.submit(&api).await.unwrap_err();
        assert!(matches!(err, BookingError::SessionExpired));
        assert_eq!(api.create_calls.load(Ordering::SeqCst), 0);
        assert_eq!(w.step(), WizardStep::DetailsEntry);
    }

    #[tokio::test]
    async fn test_creation_notice_emitted() {
        let api = stub_for_flow();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let options = WizardOptions {
            notices: Some(tx),
            ..Default::default()
        };
        let mut w = BookingWizard::new(ClientConfig::default(), options);
        walk_to_details(&mut w, &api).await;
        fill_contact(&mut w);
        w.submit(&api).await.unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            BookingNotice::AppointmentCreated { appointment_id: 42 }
        );
    }

    // ── Pricing through the wizard ──

    #[tokio::test]
    async fn test_promo_scenario_save10() {
        let mut api = stub_for_flow();
        api.promo = Some(PromoTerms {
            discount_type: DiscountType::Percentage,
            discount_value: 10,
        });

        let mut w = wizard();
        walk_to_details(&mut w, &api).await;
        w.apply_promo(&api, "SAVE10").await.unwrap();

        assert_eq!(w.price_after_promo(), 900);
        assert_eq!(w.final_price(), 900);
    }

    #[tokio::test]
    async fn test_bonus_autofill_scenario() {
        let api = stub_for_flow();
        let mut w = wizard();
        walk_to_details(&mut w, &api).await;

        w.set_bonus_balance(2000);
        w.toggle_bonus(true);

        assert_eq!(w.bonus().amount(), 500);
        assert_eq!(w.final_price(), 500);
    }

    #[tokio::test]
    async fn test_promo_after_bonus_tightens_cap() {
        let mut api = stub_for_flow();
        api.promo = Some(PromoTerms {
            discount_type: DiscountType::Fixed,
            discount_value: 400,
        });

        let mut w = wizard();
        walk_to_details(&mut w, &api).await;
        w.set_bonus_balance(2000);
        w.toggle_bonus(true);
        assert_eq!(w.bonus().amount(), 500);

        // fixed 400 off: price after promo 600 → cap 300, amount clamped
        w.apply_promo(&api, "MINUS400").await.unwrap();
        assert_eq!(w.bonus().amount(), 300);
        assert_eq!(w.final_price(), 300);
    }

    #[tokio::test]
    async fn test_cancel_promo_restores_price() {
        let mut api = stub_for_flow();
        api.promo = Some(PromoTerms {
            discount_type: DiscountType::Percentage,
            discount_value: 10,
        });

        let mut w = wizard();
        walk_to_details(&mut w, &api).await;
        w.apply_promo(&api, "SAVE10").await.unwrap();
        assert_eq!(w.final_price(), 900);

        w.cancel_promo();
        assert_eq!(w.final_price(), 1000);
    }

    #[tokio::test]
    async fn test_submit_payload_carries_promo_and_bonus() {
        let mut api = stub_for_flow();
        api.promo = Some(PromoTerms {
            discount_type: DiscountType::Percentage,
            discount_value: 10,
        });

        let mut w = wizard();
        walk_to_details(&mut w, &api).await;
        fill_contact(&mut w);
        w.apply_promo(&api, "SAVE10").await.unwrap();
        w.set_bonus_balance(2000);
        w.toggle_bonus(true);

        w.submit(&api).await.unwrap();

        // 1000 − 100 promo − 450 bonus (cap of 900/2)
        assert_eq!(w.confirmation().unwrap().final_price, 450);
    }
}
