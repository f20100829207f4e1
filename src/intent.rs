use crate::catalog::Catalog;
use crate::session::Session;
use crate::shared::text::{first_digit_run, is_digits};

/// Classified meaning of one inbound message given the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Cancel,
    ProductRef {
        code: String,
        inline_qty: Option<u32>,
    },
    Quantity(u32),
    PayTransfer,
    PayCod,
    DeliveryDetails(String),
    FaqAnswer(String),
    PriceQuery,
    Unresolved,
}

const CANCEL_KEYWORDS: &[&str] = &["ยกเลิก", "cancel"];
const TRANSFER_KEYWORDS: &[&str] = &["โอนเงิน", "โอน", "transfer", "bank transfer"];
const COD_KEYWORDS: &[&str] = &["เก็บเงินปลายทาง", "ปลายทาง", "cash on delivery"];
const DELIVERY_MARKERS: &[&str] = &["ชื่อ", "ที่อยู่", "เบอร์", "โทร", "address", "name", "phone"];
const PRICE_KEYWORDS: &[&str] = &["ราคา", "เท่าไหร่", "กี่บาท", "price", "how much"];

type Rule = fn(&str, &Session, &Catalog) -> Option<Intent>;

/// Classifier rules in precedence order. First match wins; the ordering is
/// the policy, so rules stay individually testable and the list stays
/// explicit instead of an `if` fallthrough chain.
const RULES: &[Rule] = &[
    match_cancel,
    match_product,
    match_quantity,
    match_pay_transfer,
    match_pay_cod,
    match_delivery_details,
    match_faq,
    match_price_query,
];

/// Pure classification of one trimmed message. No side effects; the
/// orchestrator owns every mutation that follows.
pub fn resolve(text: &str, session: &Session, catalog: &Catalog) -> Intent {
    let text = text.trim();
    RULES
        .iter()
        .find_map(|rule| rule(text, session, catalog))
        .unwrap_or(Intent::Unresolved)
}

fn contains_any(lowered: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| lowered.contains(keyword))
}

fn match_cancel(text: &str, _session: &Session, _catalog: &Catalog) -> Option<Intent> {
    contains_any(&text.to_lowercase(), CANCEL_KEYWORDS).then_some(Intent::Cancel)
}

/// Exact code match first, then product-name substring, then alias
/// substring. A bare 1-4 digit integer alongside the matched fragment
/// becomes `inline_qty`. This rule deliberately outranks the session-gated
/// rules below: a new product mention mid-flow wins and the orchestrator
/// abandons the stale pending order.
fn match_product(text: &str, _session: &Session, catalog: &Catalog) -> Option<Intent> {
    if let Some(product) = catalog.product_by_code(text) {
        return Some(Intent::ProductRef {
            code: product.code.clone(),
            inline_qty: None,
        });
    }

    let lowered = text.to_lowercase();
    for product in &catalog.products {
        let name = product.name.to_lowercase();
        let fragment = if !name.is_empty() && lowered.contains(&name) {
            Some(name)
        } else {
            product
                .aliases
                .iter()
                .map(|alias| alias.to_lowercase())
                .find(|alias| !alias.is_empty() && lowered.contains(alias))
        };
        if let Some(fragment) = fragment {
            let remainder = lowered.replacen(&fragment, "", 1);
            let inline_qty =
                first_digit_run(&remainder, 1, 4).and_then(|run| run.parse::<u32>().ok());
            return Some(Intent::ProductRef {
                code: product.code.clone(),
                inline_qty,
            });
        }
    }
    None
}

fn match_quantity(text: &str, session: &Session, _catalog: &Catalog) -> Option<Intent> {
    if session.last_product_code.is_none() {
        return None;
    }
    if !is_digits(text) || text.len() > 4 {
        return None;
    }
    text.parse::<u32>().ok().map(Intent::Quantity)
}

fn match_pay_transfer(text: &str, session: &Session, _catalog: &Catalog) -> Option<Intent> {
    if session.pending_order_id.is_none() {
        return None;
    }
    contains_any(&text.to_lowercase(), TRANSFER_KEYWORDS).then_some(Intent::PayTransfer)
}

fn match_pay_cod(text: &str, session: &Session, _catalog: &Catalog) -> Option<Intent> {
    if session.pending_order_id.is_none() {
        return None;
    }
    let lowered = text.to_lowercase();
    // `cod` only as a standalone token so codes like `COD123` or the word
    // `code` never trigger payment selection.
    let cod_token = lowered
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .any(|token| token == "cod");
    (cod_token || contains_any(&lowered, COD_KEYWORDS)).then_some(Intent::PayCod)
}

fn match_delivery_details(text: &str, session: &Session, _catalog: &Catalog) -> Option<Intent> {
    if session.pending_order_id.is_none() {
        return None;
    }
    contains_any(&text.to_lowercase(), DELIVERY_MARKERS)
        .then(|| Intent::DeliveryDetails(text.to_string()))
}

fn match_faq(text: &str, _session: &Session, catalog: &Catalog) -> Option<Intent> {
    let lowered = text.to_lowercase();
    catalog
        .faqs
        .iter()
        .find(|faq| {
            faq.keywords
                .iter()
                .any(|keyword| lowered.contains(&keyword.to_lowercase()))
        })
        .map(|faq| Intent::FaqAnswer(faq.answer.clone()))
}

fn match_price_query(text: &str, _session: &Session, _catalog: &Catalog) -> Option<Intent> {
    contains_any(&text.to_lowercase(), PRICE_KEYWORDS).then_some(Intent::PriceQuery)
}
