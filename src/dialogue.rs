use crate::catalog::{Catalog, CatalogSource, Product};
use crate::intent::{self, Intent};
use crate::ledger::{LedgerError, OrderLedger, OrderPatch, OrderStatus, PaymentChoice};
use crate::pricing::{self, Totals};
use crate::provider::FallbackGenerator;
use crate::session::{Session, SessionStore, Stage};

pub mod delivery;
pub use delivery::{parse_delivery_details, DeliveryDetails};

pub const SYSTEM_PROMPT: &str = "คุณคือแอดมินร้าน ใช้ข้อมูลสินค้าที่ให้มาตอบลูกค้าเท่านั้น ห้ามแต่งราคาหรือข้อมูลผิด แต่สามารถแต่งสำนวนให้เป็นธรรมชาติได้";

const REPLY_NOT_READY: &str = "ขออภัยค่ะ ตอนนี้ฐานข้อมูลยังไม่พร้อม 🙏";
const REPLY_CANCELLED: &str = "ยกเลิกรายการเรียบร้อยค่ะ 🙏";
const REPLY_ASK_PRODUCT: &str = "สนใจสินค้าตัวไหนคะ บอกชื่อรุ่นได้เลยค่ะ";
const REPLY_ASK_PAYMENT: &str = "สะดวกชำระแบบโอนเงิน หรือเก็บเงินปลายทางคะ?";
const REPLY_ASK_ADDRESS: &str = "รบกวนส่งชื่อ ที่อยู่ และเบอร์โทรด้วยค่ะ";
const REPLY_REPROMPT_QTY: &str = "รบกวนพิมพ์จำนวนเป็นตัวเลขมากกว่า 0 ค่ะ";
const REPLY_RESTART: &str = "ขออภัยค่ะ ไม่พบออเดอร์เดิมแล้ว รบกวนเริ่มรายการใหม่ค่ะ";
const REPLY_TROUBLE: &str = "ขออภัยค่ะ ระบบขัดข้องชั่วคราว รบกวนลองใหม่อีกครั้งค่ะ";
const REPLY_APOLOGY: &str = "ขออภัยค่ะ ระบบไม่ตอบกลับ";
const REPLY_COD_ADDRESS: &str = "รับทราบค่ะ เก็บเงินปลายทาง 🚚 รบกวนส่งชื่อ ที่อยู่ และเบอร์โทรด้วยค่ะ";
const REPLY_DONE_TRANSFER: &str = "บันทึกข้อมูลจัดส่งเรียบร้อยค่ะ ✅ ขอบคุณที่อุดหนุนค่ะ";
const REPLY_DONE_COD: &str = "บันทึกข้อมูลจัดส่งเรียบร้อยค่ะ ✅ รอรับสินค้าปลายทางได้เลยค่ะ";
const DEFAULT_PAYMENT_INSTRUCTIONS: &str = "โอนเข้าบัญชีร้านตามช่องทางที่แจ้งไว้ค่ะ";

/// The per-message state machine. Collaborators are injected so sessions,
/// the ledger, the catalog source, and the fallback generator can each be
/// swapped in tests or replaced with external services later.
pub struct Orchestrator {
    catalog_source: Box<dyn CatalogSource>,
    sessions: Box<dyn SessionStore>,
    ledger: Box<dyn OrderLedger>,
    fallback: Box<dyn FallbackGenerator>,
}

impl Orchestrator {
    pub fn new(
        catalog_source: Box<dyn CatalogSource>,
        sessions: Box<dyn SessionStore>,
        ledger: Box<dyn OrderLedger>,
        fallback: Box<dyn FallbackGenerator>,
    ) -> Self {
        Self {
            catalog_source,
            sessions,
            ledger,
            fallback,
        }
    }

    /// Produces exactly one reply for one inbound text message. Every
    /// failure mode resolves to a fixed in-language reply; nothing here
    /// surfaces as a transport error.
    pub fn handle_message(&self, user_id: &str, text: &str) -> String {
        let catalog = match self.catalog_source.load() {
            Ok(catalog) => catalog,
            Err(_) => return REPLY_NOT_READY.to_string(),
        };
        let session = self.sessions.get(user_id);

        match intent::resolve(text, &session, &catalog) {
            Intent::Cancel => {
                // Explicit cancellation clears dialogue state only; the
                // persisted order, if any, is left untouched.
                self.sessions.clear(user_id);
                REPLY_CANCELLED.to_string()
            }
            Intent::ProductRef { code, inline_qty } => {
                self.handle_product_ref(user_id, session, &catalog, &code, inline_qty)
            }
            Intent::Quantity(qty) => self.handle_quantity(user_id, session, &catalog, text, qty),
            Intent::PayTransfer => self.handle_pay_transfer(user_id, session, &catalog),
            Intent::PayCod => self.handle_pay_cod(user_id, session),
            Intent::DeliveryDetails(raw) => self.handle_delivery(user_id, session, &raw),
            Intent::FaqAnswer(answer) => answer,
            Intent::PriceQuery => self.handle_price_query(&session, &catalog),
            Intent::Unresolved => self.handle_unresolved(&catalog, text),
        }
    }

    fn handle_product_ref(
        &self,
        user_id: &str,
        session: Session,
        catalog: &Catalog,
        code: &str,
        inline_qty: Option<u32>,
    ) -> String {
        let Some(product) = catalog.product_by_code(code) else {
            return REPLY_ASK_PRODUCT.to_string();
        };

        // A new product mention supersedes a still-pending order: mark the
        // prior order abandoned instead of leaving it dangling. A stale id
        // is tolerated; supersession is best effort.
        if let Some(prior_order_id) = &session.pending_order_id {
            let _ = self.ledger.update(
                prior_order_id,
                &OrderPatch {
                    status: Some(OrderStatus::Abandoned),
                    ..OrderPatch::default()
                },
            );
        }

        match inline_qty {
            Some(qty) => self.place_order(user_id, product, qty, catalog),
            None => {
                self.sessions.put(
                    user_id,
                    Session {
                        stage: Stage::AwaitingQty,
                        last_product_code: Some(product.code.clone()),
                        pending_order_id: None,
                    },
                );
                format!(
                    "สนใจ {} ราคา {} บาทค่ะ ต้องการกี่ชิ้นคะ?",
                    product.name, product.unit_price
                )
            }
        }
    }

    fn handle_quantity(
        &self,
        user_id: &str,
        session: Session,
        catalog: &Catalog,
        text: &str,
        qty: u32,
    ) -> String {
        match session.stage {
            Stage::AwaitingQty => {
                let Some(product) = session
                    .last_product_code
                    .as_deref()
                    .and_then(|code| catalog.product_by_code(code))
                else {
                    // Product vanished from the snapshot since it was
                    // referenced; start over.
                    self.sessions.clear(user_id);
                    return REPLY_ASK_PRODUCT.to_string();
                };
                self.place_order(user_id, product, qty, catalog)
            }
            // The flow table only accepts a quantity while one is awaited;
            // anywhere else the stage stays put and nothing is created.
            Stage::AwaitingPaymentMethod => REPLY_ASK_PAYMENT.to_string(),
            Stage::AwaitingAddressTransfer | Stage::AwaitingAddressCod => {
                REPLY_ASK_ADDRESS.to_string()
            }
            Stage::None => self.handle_unresolved(catalog, text),
        }
    }

    fn place_order(
        &self,
        user_id: &str,
        product: &Product,
        qty: u32,
        catalog: &Catalog,
    ) -> String {
        let totals = match pricing::quote(product, qty, &catalog.promotions) {
            Ok(totals) => totals,
            Err(pricing::PricingError::InvalidQuantity(_)) => {
                self.sessions.put(
                    user_id,
                    Session {
                        stage: Stage::AwaitingQty,
                        last_product_code: Some(product.code.clone()),
                        pending_order_id: None,
                    },
                );
                return REPLY_REPROMPT_QTY.to_string();
            }
        };
        match self.ledger.create(user_id, product, qty, &totals) {
            Ok(order_id) => {
                self.sessions.put(
                    user_id,
                    Session {
                        stage: Stage::AwaitingPaymentMethod,
                        last_product_code: Some(product.code.clone()),
                        pending_order_id: Some(order_id),
                    },
                );
                order_summary_reply(product, qty, &totals)
            }
            Err(_) => REPLY_TROUBLE.to_string(),
        }
    }

    fn handle_pay_transfer(&self, user_id: &str, session: Session, catalog: &Catalog) -> String {
        let Some(order_id) = session.pending_order_id.clone() else {
            return REPLY_ASK_PRODUCT.to_string();
        };
        if session.stage != Stage::AwaitingPaymentMethod {
            return self.stage_reprompt(&session);
        }

        let patch = OrderPatch {
            payment_method: Some(PaymentChoice::Transfer),
            ..OrderPatch::default()
        };
        match self.ledger.update(&order_id, &patch) {
            Ok(()) => {
                let instructions = session
                    .last_product_code
                    .as_deref()
                    .and_then(|code| catalog.product_by_code(code))
                    .and_then(|product| catalog.payment_for(&product.category))
                    .map(|method| method.instructions.clone())
                    .unwrap_or_else(|| DEFAULT_PAYMENT_INSTRUCTIONS.to_string());
                self.sessions.put(
                    user_id,
                    Session {
                        stage: Stage::AwaitingAddressTransfer,
                        ..session
                    },
                );
                format!("{instructions}\nโอนแล้วรบกวนส่งชื่อ ที่อยู่ และเบอร์โทรด้วยค่ะ")
            }
            Err(LedgerError::NotFound { .. }) => self.abandon_pending(user_id),
            Err(_) => REPLY_TROUBLE.to_string(),
        }
    }

    fn handle_pay_cod(&self, user_id: &str, session: Session) -> String {
        let Some(order_id) = session.pending_order_id.clone() else {
            return REPLY_ASK_PRODUCT.to_string();
        };
        if session.stage != Stage::AwaitingPaymentMethod {
            return self.stage_reprompt(&session);
        }

        let patch = OrderPatch {
            payment_method: Some(PaymentChoice::Cod),
            status: Some(OrderStatus::AwaitingDelivery),
            ..OrderPatch::default()
        };
        match self.ledger.update(&order_id, &patch) {
            Ok(()) => {
                self.sessions.put(
                    user_id,
                    Session {
                        stage: Stage::AwaitingAddressCod,
                        ..session
                    },
                );
                REPLY_COD_ADDRESS.to_string()
            }
            Err(LedgerError::NotFound { .. }) => self.abandon_pending(user_id),
            Err(_) => REPLY_TROUBLE.to_string(),
        }
    }

    fn handle_delivery(&self, user_id: &str, session: Session, raw: &str) -> String {
        let Some(order_id) = session.pending_order_id.clone() else {
            return REPLY_ASK_PRODUCT.to_string();
        };

        let done_reply = match session.stage {
            Stage::AwaitingAddressTransfer => REPLY_DONE_TRANSFER,
            Stage::AwaitingAddressCod => REPLY_DONE_COD,
            _ => return self.stage_reprompt(&session),
        };

        let details = parse_delivery_details(raw);
        let mut patch = OrderPatch {
            name: Some(details.name),
            phone: Some(details.phone),
            address: Some(details.address),
            ..OrderPatch::default()
        };
        if session.stage == Stage::AwaitingAddressTransfer {
            patch.status = Some(OrderStatus::Paid);
            patch.paid_at = Some(chrono::Utc::now().timestamp());
        }

        match self.ledger.update(&order_id, &patch) {
            Ok(()) => {
                self.sessions.clear(user_id);
                done_reply.to_string()
            }
            Err(LedgerError::NotFound { .. }) => self.abandon_pending(user_id),
            Err(_) => REPLY_TROUBLE.to_string(),
        }
    }

    fn handle_price_query(&self, session: &Session, catalog: &Catalog) -> String {
        session
            .last_product_code
            .as_deref()
            .and_then(|code| catalog.product_by_code(code))
            .map(|product| format!("{} ราคา {} บาทค่ะ", product.name, product.unit_price))
            .unwrap_or_else(|| REPLY_ASK_PRODUCT.to_string())
    }

    fn handle_unresolved(&self, catalog: &Catalog, text: &str) -> String {
        let user_text = format!(
            "ข้อมูลสินค้าและ FAQ:\n{}\n\nคำถามลูกค้า: {}",
            catalog.digest(),
            text
        );
        match self.fallback.generate(SYSTEM_PROMPT, &user_text) {
            Ok(reply) if !reply.trim().is_empty() => reply,
            _ => REPLY_APOLOGY.to_string(),
        }
    }

    /// The pending order no longer exists in the ledger. Clear the stale
    /// reference and ask the user to restart instead of crashing.
    fn abandon_pending(&self, user_id: &str) -> String {
        self.sessions.clear(user_id);
        REPLY_RESTART.to_string()
    }

    fn stage_reprompt(&self, session: &Session) -> String {
        match session.stage {
            Stage::AwaitingPaymentMethod => REPLY_ASK_PAYMENT.to_string(),
            Stage::AwaitingAddressTransfer | Stage::AwaitingAddressCod => {
                REPLY_ASK_ADDRESS.to_string()
            }
            Stage::None | Stage::AwaitingQty => REPLY_ASK_PRODUCT.to_string(),
        }
    }
}

fn order_summary_reply(product: &Product, qty: u32, totals: &Totals) -> String {
    let mut reply = format!(
        "รับออเดอร์ {} x{} ค่ะ\nยอดสินค้า {} บาท\nค่าส่ง {} บาท\nส่วนลด {} บาท\nยอดรวม {} บาท",
        product.name, qty, totals.base, totals.shipping, totals.discount, totals.grand_total
    );
    if let Some(note) = &totals.promo_note {
        if !note.is_empty() {
            reply.push('\n');
            reply.push_str(note);
        }
    }
    reply.push('\n');
    reply.push_str(REPLY_ASK_PAYMENT);
    reply
}
