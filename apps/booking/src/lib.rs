//! Client core of the Veluna wellness-studio booking platform.
//!
//! One parameterized booking wizard instead of a per-surface copy: pricing,
//! promo codes, bonus redemption and availability resolution all live here,
//! with data access injected through the [`BookingApi`] trait. Frontends
//! (the Telegram bot, any future surface) only render wizard state and feed
//! user input back in.

pub mod api;
pub mod availability;
pub mod bonus;
pub mod calendar;
pub mod config;
pub mod error;
pub mod models;
pub mod pricing;
pub mod promo;
pub mod wizard;

pub use api::{BookingApi, RestBookingApi};
pub use bonus::{BonusBalanceCache, BonusRedemption, SnapPolicy};
pub use config::ClientConfig;
pub use error::BookingError;
pub use wizard::{BookingNotice, BookingWizard, SubmitOutcome, WizardOptions, WizardStep};
