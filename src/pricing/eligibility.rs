//! Coupon eligibility
//!
//! Failing a coupon check is an ordinary outcome, so the gate returns an
//! [`Eligibility`] value rather than an error. Only lookup failures against
//! the store surface as [`PricingError`].
//!
//! Usage limits are an advisory pre-check: two buyers racing for the last use
//! can both pass. The store has to enforce the hard limit when the redemption
//! is committed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use crate::config::UsageCountPolicy;
use crate::domain::aggregates::Coupon;
use crate::domain::value_objects::{CouponCode, CustomerEmail, Money};
use crate::PricingError;

/// Normalized result of a datastore query, whatever client produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult<T> {
    pub rows: Vec<T>,
    /// Exact count when the query asked for one.
    pub count: Option<u64>,
    pub error: Option<String>,
}

impl<T> QueryResult<T> {
    pub fn rows(rows: Vec<T>) -> Self { Self { rows, count: None, error: None } }
    pub fn counted(count: u64) -> Self { Self { rows: vec![], count: Some(count), error: None } }
    pub fn failed(error: impl Into<String>) -> Self { Self { rows: vec![], count: None, error: Some(error.into()) } }

    /// Exact count if present, otherwise the number of returned rows.
    pub fn into_count(self) -> Result<u64, String> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.count.unwrap_or(self.rows.len() as u64)),
        }
    }

    pub fn into_first(self) -> Result<Option<T>, String> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.rows.into_iter().next()),
        }
    }
}

/// Which redemptions of a coupon to count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedemptionScope {
    Global,
    User(String),
    Email(CustomerEmail),
}

#[async_trait]
pub trait RedemptionLedger: Send + Sync {
    async fn count_redemptions(&self, coupon_id: Uuid, scope: &RedemptionScope) -> QueryResult<Uuid>;
}

#[async_trait]
pub trait CouponSource: Send + Sync {
    /// Case-insensitive lookup by canonical code.
    async fn find_by_code(&self, code: &CouponCode) -> QueryResult<Coupon>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    Invalid,
    Inactive,
    MinOrderNotMet,
    LimitReachedGlobal,
    LimitReachedUser,
}

impl IneligibleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Inactive => "inactive",
            Self::MinOrderNotMet => "min_order_not_met",
            Self::LimitReachedGlobal => "limit_reached_global",
            Self::LimitReachedUser => "limit_reached_user",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Ineligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool { matches!(self, Self::Eligible) }

    pub fn reason(&self) -> &'static str {
        match self { Self::Eligible => "ok", Self::Ineligible(r) => r.as_str() }
    }
}

/// Who is redeeming. The user id is preferred over the email for per-user limits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Buyer {
    pub user_id: Option<String>,
    pub email: Option<CustomerEmail>,
}

impl Buyer {
    pub fn new(user_id: Option<String>, email: Option<&str>) -> Self {
        Self { user_id: user_id.filter(|u| !u.trim().is_empty()), email: email.and_then(CustomerEmail::normalize) }
    }

    pub fn anonymous() -> Self { Self::default() }

    fn per_user_scope(&self) -> Option<RedemptionScope> {
        match (&self.user_id, &self.email) {
            (Some(id), _) => Some(RedemptionScope::User(id.clone())),
            (None, Some(email)) => Some(RedemptionScope::Email(email.clone())),
            (None, None) => None,
        }
    }
}

pub fn is_active(coupon: &Coupon, now: DateTime<Utc>) -> bool { coupon.is_active(now) }

pub fn meets_minimum_order(coupon: &Coupon, subtotal: Money) -> bool { coupon.meets_minimum_order(subtotal) }

/// Global and per-buyer usage limits.
pub async fn can_redeem(
    ledger: &dyn RedemptionLedger,
    coupon: &Coupon,
    buyer: &Buyer,
    policy: UsageCountPolicy,
) -> Eligibility {
    if let Some(max) = coupon.max_uses {
        let used = usage_count(ledger, coupon.id, &RedemptionScope::Global, policy).await;
        if used >= u64::from(max) {
            return Eligibility::Ineligible(IneligibleReason::LimitReachedGlobal);
        }
    }

    if let Some(per_user) = coupon.max_uses_per_user.filter(|n| *n > 0) {
        // Without any buyer identity the per-user limit cannot be checked.
        if let Some(scope) = buyer.per_user_scope() {
            let used = usage_count(ledger, coupon.id, &scope, policy).await;
            if used >= u64::from(per_user) {
                return Eligibility::Ineligible(IneligibleReason::LimitReachedUser);
            }
        }
    }

    Eligibility::Eligible
}

async fn usage_count(ledger: &dyn RedemptionLedger, coupon_id: Uuid, scope: &RedemptionScope, policy: UsageCountPolicy) -> u64 {
    match ledger.count_redemptions(coupon_id, scope).await.into_count() {
        Ok(n) => n,
        Err(error) => {
            tracing::warn!(%coupon_id, ?scope, %error, ?policy, "redemption count unavailable");
            match policy {
                UsageCountPolicy::FailOpen => 0,
                UsageCountPolicy::FailClosed => u64::MAX,
            }
        }
    }
}

/// Outcome of evaluating a code at checkout.
#[derive(Clone, Debug, PartialEq)]
pub struct CouponDecision {
    pub coupon: Option<Coupon>,
    pub eligibility: Eligibility,
}

impl CouponDecision {
    /// The coupon, only when it may be applied.
    pub fn usable(&self) -> Option<&Coupon> {
        self.coupon.as_ref().filter(|_| self.eligibility.is_eligible())
    }
}

/// Composite checkout gate: active window, then minimum order, then usage limits.
pub struct CouponGate<'a> {
    coupons: &'a dyn CouponSource,
    ledger: &'a dyn RedemptionLedger,
    policy: UsageCountPolicy,
}

impl<'a> CouponGate<'a> {
    pub fn new(coupons: &'a dyn CouponSource, ledger: &'a dyn RedemptionLedger, policy: UsageCountPolicy) -> Self {
        Self { coupons, ledger, policy }
    }

    pub async fn lookup(&self, code: &CouponCode) -> Result<Coupon, PricingError> {
        self.coupons
            .find_by_code(code)
            .await
            .into_first()
            .map_err(PricingError::Storage)?
            .ok_or(PricingError::CouponNotFound)
    }

    pub async fn check(&self, coupon: &Coupon, subtotal: Money, buyer: &Buyer, now: DateTime<Utc>) -> Eligibility {
        if !is_active(coupon, now) {
            return Eligibility::Ineligible(IneligibleReason::Inactive);
        }
        if !meets_minimum_order(coupon, subtotal) {
            return Eligibility::Ineligible(IneligibleReason::MinOrderNotMet);
        }
        can_redeem(self.ledger, coupon, buyer, self.policy).await
    }

    /// Looks the code up and runs every check. An unknown code is `invalid`;
    /// only a failing store lookup is an error.
    pub async fn evaluate(&self, code: &CouponCode, subtotal: Money, buyer: &Buyer, now: DateTime<Utc>) -> Result<CouponDecision, PricingError> {
        let coupon = match self.lookup(code).await {
            Ok(c) => c,
            Err(PricingError::CouponNotFound) => {
                return Ok(CouponDecision { coupon: None, eligibility: Eligibility::Ineligible(IneligibleReason::Invalid) });
            }
            Err(e) => return Err(e),
        };
        let eligibility = self.check(&coupon, subtotal, buyer, now).await;
        tracing::debug!(code = %code, reason = eligibility.reason(), "coupon evaluated");
        Ok(CouponDecision { coupon: Some(coupon), eligibility })
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::sync::Mutex;

    /// Recorded redemptions kept in memory: (coupon, user, email).
    #[derive(Default)]
    pub struct MemoryLedger {
        pub redemptions: Mutex<Vec<(Uuid, Option<String>, Option<String>)>>,
        pub broken: bool,
    }

    impl MemoryLedger {
        pub fn record(&self, coupon_id: Uuid, user: Option<&str>, email: Option<&str>) {
            self.redemptions.lock().unwrap().push((coupon_id, user.map(str::to_string), email.map(str::to_string)));
        }
    }

    #[async_trait]
    impl RedemptionLedger for MemoryLedger {
        async fn count_redemptions(&self, coupon_id: Uuid, scope: &RedemptionScope) -> QueryResult<Uuid> {
            if self.broken { return QueryResult::failed("relation \"coupon_redemptions\" does not exist"); }
            let rows = self.redemptions.lock().unwrap().iter()
                .filter(|(c, user, email)| *c == coupon_id && match scope {
                    RedemptionScope::Global => true,
                    RedemptionScope::User(u) => user.as_deref() == Some(u.as_str()),
                    RedemptionScope::Email(e) => email.as_deref() == Some(e.as_str()),
                })
                .map(|(c, _, _)| *c)
                .collect();
            QueryResult::rows(rows)
        }
    }

    #[derive(Default)]
    pub struct MemoryCoupons(pub Vec<Coupon>);

    #[async_trait]
    impl CouponSource for MemoryCoupons {
        async fn find_by_code(&self, code: &CouponCode) -> QueryResult<Coupon> {
            QueryResult::rows(self.0.iter().filter(|c| &c.code == code).cloned().collect())
        }
    }
}
