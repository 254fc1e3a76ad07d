use crate::api::BookingApi;
use crate::error::BookingError;
use crate::models::PromoApplication;
use crate::pricing;

/// Lifecycle of the promo code field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromoStatus {
    #[default]
    Idle,
    Loading,
    Applied,
    Failed,
}

/// The promo corner of the wizard: one code input, one status, at most one
/// resolved application. Server rejections and transport failures both land
/// in `Failed` with a displayable message; they never propagate.
#[derive(Debug, Default)]
pub struct PromoField {
    code_input: String,
    status: PromoStatus,
    message: Option<String>,
    application: Option<PromoApplication>,
}

impl PromoField {
    pub fn status(&self) -> PromoStatus {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn application(&self) -> Option<&PromoApplication> {
        self.application.as_ref()
    }

    pub fn code_input(&self) -> &str {
        &self.code_input
    }

    /// Editing the code drops a previously applied discount.
    pub fn set_code_input(&mut self, code: impl Into<String>) {
        let code = code.into();
        if code != self.code_input {
            self.application = None;
            if self.status == PromoStatus::Applied {
                self.status = PromoStatus::Idle;
            }
        }
        self.code_input = code;
    }

    /// Validate the entered code against a service.
    ///
    /// Ignored while a previous apply is still in flight. An empty code is a
    /// local validation error and never reaches the network.
    pub async fn apply(
        &mut self,
        api: &dyn BookingApi,
        service_id: i64,
        base_price: i64,
    ) -> Result<(), BookingError> {
        if self.status == PromoStatus::Loading {
            return Ok(());
        }
        let code = self.code_input.trim().to_uppercase();
        if code.is_empty() {
            return Err(BookingError::validation("введите промокод"));
        }

        self.status = PromoStatus::Loading;
        match api.validate_promo(&code, service_id).await {
            Ok(terms) => {
                let amount =
                    pricing::promo_discount(base_price, terms.discount_type, terms.discount_value);
                self.application = Some(PromoApplication {
                    code: code.clone(),
                    discount_type: terms.discount_type,
                    discount_value: terms.discount_value,
                    discount_amount: amount,
                });
                self.code_input = code;
                self.status = PromoStatus::Applied;
                self.message = None;
            }
            Err(err) => {
                tracing::warn!("promo validation failed: {err}");
                self.application = None;
                self.status = PromoStatus::Failed;
                self.message = Some(match &err {
                    BookingError::Api(message) if !message.is_empty() => message.clone(),
                    _ => "Не удалось применить промокод, попробуйте позже".into(),
                });
            }
        }
        Ok(())
    }

    /// Clear code, status, message and application unconditionally.
    /// Always succeeds; calling it twice is the same as calling it once.
    pub fn cancel(&mut self) {
        self.code_input.clear();
        self.status = PromoStatus::Idle;
        self.message = None;
        self.application = None;
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::stub::StubApi;
    use crate::models::{DiscountType, PromoTerms};
    use std::sync::atomic::Ordering;

    fn stub_with_promo(discount_type: DiscountType, value: i64) -> StubApi {
        StubApi {
            promo: Some(PromoTerms {
                discount_type,
                discount_value: value,
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_apply_percentage_code() {
        let api = stub_with_promo(DiscountType::Percentage, 10);
        let mut field = PromoField::default();
        field.set_code_input("save10");

        field.apply(&api, 1, 1000).await.unwrap();

        assert_eq!(field.status(), PromoStatus::Applied);
        let applied = field.application().unwrap();
        assert_eq!(applied.code, "SAVE10");
        assert_eq!(applied.discount_amount, 100);
        assert!(field.message().is_none());
    }

    #[tokio::test]
    async fn test_apply_fixed_code_clamped() {
        let api = stub_with_promo(DiscountType::Fixed, 5000);
        let mut field = PromoField::default();
        field.set_code_input("BIG");

        field.apply(&api, 1, 1000).await.unwrap();

        assert_eq!(field.application().unwrap().discount_amount, 1000);
    }

    #[tokio::test]
    async fn test_empty_code_is_local_validation_error() {
        let api = StubApi::default();
        let mut field = PromoField::default();
        field.set_code_input("   ");

        let err = field.apply(&api, 1, 1000).await.unwrap_err();

        assert!(err.is_validation());
        assert_eq!(field.status(), PromoStatus::Idle);
        assert_eq!(api.promo_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejection_surfaces_server_message() {
        let api = StubApi {
            promo_rejection: Some("Промокод не найден".into()),
            ..Default::default()
        };
        let mut field = PromoField::default();
        field.set_code_input("NOPE");

        field.apply(&api, 1, 1000).await.unwrap();

        assert_eq!(field.status(), PromoStatus::Failed);
        assert_eq!(field.message(), Some("Промокод не найден"));
        assert!(field.application().is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_gets_generic_message() {
        // No scripted promo → the stub answers with a transport error.
        let api = StubApi::default();
        let mut field = PromoField::default();
        field.set_code_input("SAVE10");

        field.apply(&api, 1, 1000).await.unwrap();

        assert_eq!(field.status(), PromoStatus::Failed);
        assert_eq!(
            field.message(),
            Some("Не удалось применить промокод, попробуйте позже")
        );
    }

    #[tokio::test]
    async fn test_reentrant_apply_ignored_while_loading() {
        let api = stub_with_promo(DiscountType::Percentage, 10);
        let mut field = PromoField::default();
        field.set_code_input("SAVE10");
        field.status = PromoStatus::Loading;

        field.apply(&api, 1, 1000).await.unwrap();

        assert_eq!(field.status(), PromoStatus::Loading);
        assert_eq!(api.promo_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let api = stub_with_promo(DiscountType::Percentage, 10);
        let mut field = PromoField::default();
        field.set_code_input("SAVE10");
        field.apply(&api, 1, 1000).await.unwrap();

        field.cancel();
        let snapshot = (
            field.code_input().to_string(),
            field.status(),
            field.message().map(str::to_string),
        );
        field.cancel();

        assert_eq!(field.code_input(), snapshot.0);
        assert_eq!(field.status(), snapshot.1);
        assert_eq!(field.message().map(str::to_string), snapshot.2);
        assert!(field.application().is_none());
        assert_eq!(field.status(), PromoStatus::Idle);
    }

    #[tokio::test]
    async fn test_editing_code_drops_application() {
        let api = stub_with_promo(DiscountType::Percentage, 10);
        let mut field = PromoField::default();
        field.set_code_input("SAVE10");
        field.apply(&api, 1, 1000).await.unwrap();

        field.set_code_input("SAVE2");

        assert!(field.application().is_none());
        assert_eq!(field.status(), PromoStatus::Idle);
    }
}
