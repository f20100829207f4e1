use std::collections::BTreeMap;

pub mod loader;
pub use loader::{parse_catalog_csv, SheetCatalogSource};

pub const WILDCARD_PAYMENT_CATEGORY: &str = "all";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog fetch failed from {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("catalog payload has no data rows")]
    Empty,
    #[error("catalog row {row} is malformed: {reason}")]
    Row { row: usize, reason: String },
}

/// One sellable item from the catalog sheet. Immutable within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub code: String,
    pub name: String,
    /// Whole currency units, never negative.
    pub unit_price: i64,
    pub shipping_cost: i64,
    pub category: String,
    pub promotion_ref: Option<String>,
    /// Free-text keywords that also resolve to this product.
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionCondition {
    MinQty(u32),
    Product(String),
    Category(String),
    Unconditional,
}

impl PromotionCondition {
    pub fn parse(condition_type: &str, condition_value: &str) -> Result<Self, String> {
        match condition_type.trim().to_ascii_lowercase().as_str() {
            "min_qty" => condition_value
                .trim()
                .parse::<u32>()
                .map(Self::MinQty)
                .map_err(|_| format!("min_qty condition value `{condition_value}` is not a count")),
            "product" => Ok(Self::Product(condition_value.trim().to_string())),
            "product-category" | "category" => {
                Ok(Self::Category(condition_value.trim().to_string()))
            }
            "unconditional" => Ok(Self::Unconditional),
            other => Err(format!("unknown promotion condition type `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionDiscount {
    FreeShipping,
    Percent(i64),
    FixedAmount(i64),
}

impl PromotionDiscount {
    pub fn parse(discount_type: &str, discount_value: &str) -> Result<Self, String> {
        let parse_amount = |kind: &str| {
            discount_value
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("{kind} discount value `{discount_value}` is not a number"))
        };
        match discount_type.trim().to_ascii_lowercase().as_str() {
            "free_shipping" => Ok(Self::FreeShipping),
            "percent" => parse_amount("percent").map(Self::Percent),
            "fixed_amount" => parse_amount("fixed_amount").map(Self::FixedAmount),
            other => Err(format!("unknown promotion discount type `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub id: String,
    pub condition: PromotionCondition,
    pub discount: PromotionDiscount,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMethod {
    /// Product category this method applies to, or `all` as the wildcard.
    pub category: String,
    pub label: String,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Faq {
    pub keywords: Vec<String>,
    pub answer: String,
}

/// Point-in-time read of the storefront data. Loaded once per inbound
/// message and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub products: Vec<Product>,
    pub faqs: Vec<Faq>,
    pub payments: Vec<PaymentMethod>,
    pub promotions: Vec<Promotion>,
}

impl Catalog {
    pub fn product_by_code(&self, code: &str) -> Option<&Product> {
        self.products
            .iter()
            .find(|product| product.code.eq_ignore_ascii_case(code.trim()))
    }

    pub fn promotion_for(&self, product: &Product) -> Option<&Promotion> {
        let reference = product.promotion_ref.as_deref()?;
        self.promotions
            .iter()
            .find(|promotion| promotion.id == reference)
    }

    /// Category-first lookup with fallback to the `all` wildcard entry.
    pub fn payment_for(&self, category: &str) -> Option<&PaymentMethod> {
        self.payments
            .iter()
            .find(|method| method.category == category)
            .or_else(|| {
                self.payments
                    .iter()
                    .find(|method| method.category == WILDCARD_PAYMENT_CATEGORY)
            })
    }

    /// Compact rendering of products and FAQs handed to the fallback
    /// generator as grounding context.
    pub fn digest(&self) -> String {
        let mut lines = Vec::new();
        for product in &self.products {
            lines.push(format!(
                "{} | {} | ราคา {} บาท | ค่าส่ง {} บาท",
                product.code, product.name, product.unit_price, product.shipping_cost
            ));
        }
        for faq in &self.faqs {
            lines.push(format!("Q: {} | A: {}", faq.keywords.join("/"), faq.answer));
        }
        lines.join("\n")
    }
}

/// Boundary to the external spreadsheet-like data source. Implementations
/// may be slow or fail; callers degrade to a "not ready" reply.
pub trait CatalogSource: Send + Sync {
    fn load(&self) -> Result<Catalog, CatalogError>;
}

pub(crate) type RowRecord = BTreeMap<String, String>;
