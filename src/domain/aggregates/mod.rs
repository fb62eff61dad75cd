//! Aggregates module
pub mod coupon;
pub mod cart;
pub mod product;
pub mod receipt;

pub use coupon::{ActiveWindow, CapMode, Coupon, CouponDraft, CouponRedemption, DiscountType};
pub use cart::{Cart, CartError, LineItem};
pub use product::CatalogProduct;
pub use receipt::NormalizedLineItem;
