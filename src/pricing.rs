use crate::catalog::{Product, Promotion, PromotionCondition, PromotionDiscount};

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(u32),
}

/// Fully resolved price for one product/quantity pair. `discount` is always
/// an absolute amount; percent promotions are resolved before this struct
/// is built, so callers never see a percent/absolute shape split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Totals {
    pub base: i64,
    pub shipping: i64,
    pub discount: i64,
    pub grand_total: i64,
    pub promo_note: Option<String>,
}

/// Deterministic quote: same `(product, qty, promotions)` always yields the
/// same totals. At most the product's own referenced promotion applies; no
/// stacking.
pub fn quote(
    product: &Product,
    qty: u32,
    promotions: &[Promotion],
) -> Result<Totals, PricingError> {
    if qty == 0 {
        return Err(PricingError::InvalidQuantity(qty));
    }

    let base = product.unit_price * i64::from(qty);
    let mut shipping = product.shipping_cost;
    let mut discount = 0_i64;
    let mut promo_note = None;

    let promotion = product
        .promotion_ref
        .as_deref()
        .and_then(|reference| promotions.iter().find(|promo| promo.id == reference));
    if let Some(promotion) = promotion {
        if condition_passes(&promotion.condition, product, qty) {
            match promotion.discount {
                PromotionDiscount::FreeShipping => shipping = 0,
                PromotionDiscount::Percent(value) => {
                    discount = round_half_up(base * value, 100);
                }
                PromotionDiscount::FixedAmount(value) => discount = value,
            }
            promo_note = Some(promotion.note.clone());
        }
    }

    // Post-computation invariants: neither adjustment may go negative.
    shipping = shipping.max(0);
    discount = discount.max(0);

    Ok(Totals {
        base,
        shipping,
        discount,
        grand_total: (base + shipping - discount).max(0),
        promo_note,
    })
}

fn condition_passes(condition: &PromotionCondition, product: &Product, qty: u32) -> bool {
    match condition {
        PromotionCondition::MinQty(minimum) => qty >= *minimum,
        PromotionCondition::Product(code) => product.code == *code,
        PromotionCondition::Category(category) => product.category == *category,
        PromotionCondition::Unconditional => true,
    }
}

fn round_half_up(numerator: i64, denominator: i64) -> i64 {
    (numerator + denominator / 2) / denominator
}
