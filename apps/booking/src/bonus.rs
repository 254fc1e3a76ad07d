use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::api::BookingApi;
use crate::pricing;

// ── Snapping ──

/// Magnetic snapping for the bonus amount input: raw values within
/// `threshold` of a multiple of `step` stick to that multiple.
#[derive(Debug, Clone, Copy)]
pub struct SnapPolicy {
    pub step: i64,
    pub threshold: i64,
}

impl Default for SnapPolicy {
    fn default() -> Self {
        Self {
            step: 100,
            threshold: 20,
        }
    }
}

impl SnapPolicy {
    pub fn apply(&self, raw: i64) -> i64 {
        if self.step <= 0 {
            return raw;
        }
        let rem = raw.rem_euclid(self.step);
        if rem <= self.threshold {
            raw - rem
        } else if self.step - rem <= self.threshold {
            raw - rem + self.step
        } else {
            raw
        }
    }
}

// ── Redemption state ──

/// Bonus redemption state for one wizard session.
///
/// Invariant, re-established after every transition:
/// `0 ≤ amount ≤ cap` where `cap = min(balance, price_after_promo / 2)`.
#[derive(Debug, Clone, Default)]
pub struct BonusRedemption {
    balance: i64,
    use_bonus: bool,
    amount: i64,
}

impl BonusRedemption {
    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn is_active(&self) -> bool {
        self.use_bonus
    }

    /// The amount actually redeemed: 0 while the toggle is off.
    pub fn amount(&self) -> i64 {
        if self.use_bonus {
            self.amount
        } else {
            0
        }
    }

    pub fn cap(&self, price_after_promo: i64) -> i64 {
        pricing::bonus_cap(price_after_promo, self.balance)
    }

    /// The balance resolved (or changed); keep the chosen amount legal.
    pub fn set_balance(&mut self, balance: i64, price_after_promo: i64) {
        self.balance = balance.max(0);
        self.reclamp(price_after_promo);
    }

    /// Toggling on with no amount chosen auto-fills to the cap; toggling
    /// off always resets the amount to 0.
    pub fn toggle(&mut self, on: bool, price_after_promo: i64) {
        self.use_bonus = on;
        if !on {
            self.amount = 0;
            return;
        }
        if self.amount == 0 {
            self.amount = self.cap(price_after_promo);
        }
        self.reclamp(price_after_promo);
    }

    /// Raw slider/text input: snapped, then clamped into `[0, cap]`.
    pub fn set_amount(&mut self, raw: i64, snap: &SnapPolicy, price_after_promo: i64) {
        let snapped = snap.apply(raw.max(0));
        self.amount = snapped.clamp(0, self.cap(price_after_promo));
    }

    /// Re-establish the invariant after anything upstream moved the cap
    /// (promo applied or cancelled, price changed, balance refreshed).
    pub fn reclamp(&mut self, price_after_promo: i64) {
        let cap = self.cap(price_after_promo);
        if self.amount > cap {
            self.amount = cap;
        }
    }
}

// ── Balance cache ──

struct BalanceEntry {
    balance: i64,
    fetched_at: Instant,
}

/// Session-wide bonus balance cache, shared across wizard instances.
///
/// At most one fetch is in flight per user id; entries expire after `ttl`
/// so a balance is fetched once per user per window, not once per render.
pub struct BonusBalanceCache {
    entries: DashMap<i64, BalanceEntry>,
    pending: DashMap<i64, ()>,
    ttl: Duration,
}

impl BonusBalanceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            pending: DashMap::new(),
            ttl,
        }
    }

    /// Fresh cached balance, if any.
    pub fn get(&self, user_id: i64) -> Option<i64> {
        self.entries
            .get(&user_id)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.balance)
    }

    pub fn put(&self, user_id: i64, balance: i64) {
        self.entries.insert(
            user_id,
            BalanceEntry {
                balance,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Cached balance if fresh, otherwise fetch — unless a fetch for this
    /// user is already in flight, in which case nothing new is reported.
    /// Fetch failures are logged and swallowed; the caller renders a
    /// provisional zero-bonus price until a later attempt succeeds.
    pub async fn get_or_fetch(&self, api: &dyn BookingApi, user_id: i64) -> Option<i64> {
        if let Some(balance) = self.get(user_id) {
            return Some(balance);
        }
        match self.pending.entry(user_id) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(vacant) => {
                vacant.insert(());
            }
        }

        let fetched = api.fetch_bonus_balance(user_id).await;
        self.pending.remove(&user_id);
        match fetched {
            Ok(balance) => {
                self.put(user_id, balance);
                Some(balance)
            }
            Err(err) => {
                tracing::warn!("bonus balance fetch failed for user {user_id}: {err}");
                None
            }
        }
    }

    /// Drop expired entries. Call periodically from a background task.
    pub fn cleanup(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.fetched_at.elapsed() < ttl);
    }
}

// ── Tests ──
