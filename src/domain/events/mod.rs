//! Domain events
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use crate::domain::value_objects::{CouponCode, Money};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Coupon(CouponEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CouponEvent {
    Redeemed { coupon_id: Uuid, code: CouponCode, order_id: Uuid, amount: Money, at: DateTime<Utc> },
    Created { coupon_id: Uuid, code: CouponCode },
    Updated { coupon_id: Uuid, code: CouponCode },
    Toggled { coupon_id: Uuid, active: bool },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            DomainEvent::Coupon(CouponEvent::Redeemed { .. }) => "coupon.redeemed",
            DomainEvent::Coupon(CouponEvent::Created { .. }) => "coupon.created",
            DomainEvent::Coupon(CouponEvent::Updated { .. }) => "coupon.updated",
            DomainEvent::Coupon(CouponEvent::Toggled { .. }) => "coupon.toggled",
        }
    }
}
