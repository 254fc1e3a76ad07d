//! Price derivation for a booking draft.
//!
//! Pure functions of their inputs; the wizard recomputes them whenever
//! base price, promo or bonus state changes.

use crate::models::{DiscountType, PromoApplication};

/// Discount granted by promo terms against a base price.
/// Percentage discounts round down; the result never exceeds the base price.
pub fn promo_discount(base_price: i64, discount_type: DiscountType, discount_value: i64) -> i64 {
    let raw = match discount_type {
        DiscountType::Percentage => base_price * discount_value / 100,
        DiscountType::Fixed => discount_value,
    };
    raw.clamp(0, base_price.max(0))
}

/// Price after the promo discount, never negative.
pub fn price_after_promo(base_price: i64, promo: Option<&PromoApplication>) -> i64 {
    (base_price - promo.map_or(0, |p| p.discount_amount)).max(0)
}

/// How much bonus may be redeemed: half the discounted price, capped by
/// the user's balance.
pub fn bonus_cap(price_after_promo: i64, balance: i64) -> i64 {
    (price_after_promo / 2).min(balance.max(0)).max(0)
}

/// Final payable price: base minus promo minus redeemed bonus, clamped at 0.
/// `bonus_spent` is clamped to half the discounted price even if the caller
/// hands in something larger.
pub fn final_price(base_price: i64, promo: Option<&PromoApplication>, bonus_spent: i64) -> i64 {
    let after_promo = price_after_promo(base_price, promo);
    let effective_bonus = bonus_spent.clamp(0, after_promo / 2);
    (after_promo - effective_bonus).max(0)
}

// ── Tests ──
