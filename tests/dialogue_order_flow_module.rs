use shopflow::catalog::{
    Catalog, CatalogError, CatalogSource, Faq, PaymentMethod, Product, Promotion,
    PromotionCondition, PromotionDiscount,
};
use shopflow::dialogue::Orchestrator;
use shopflow::ledger::{OrderLedger, OrderStatus, PaymentChoice, SqliteLedger};
use shopflow::provider::{FallbackError, FallbackGenerator};
use shopflow::session::{InMemorySessionStore, Session, SessionStore, Stage};
use std::path::PathBuf;
use std::sync::Arc;

const USER: &str = "user-1";

struct FixedCatalog(Catalog);

impl CatalogSource for FixedCatalog {
    fn load(&self) -> Result<Catalog, CatalogError> {
        Ok(self.0.clone())
    }
}

struct FailingCatalog;

impl CatalogSource for FailingCatalog {
    fn load(&self) -> Result<Catalog, CatalogError> {
        Err(CatalogError::Empty)
    }
}

struct StubFallback(&'static str);

impl FallbackGenerator for StubFallback {
    fn generate(&self, _system_prompt: &str, _user_text: &str) -> Result<String, FallbackError> {
        Ok(self.0.to_string())
    }
}

struct FailingFallback;

impl FallbackGenerator for FailingFallback {
    fn generate(&self, _system_prompt: &str, _user_text: &str) -> Result<String, FallbackError> {
        Err(FallbackError::EmptyCompletion)
    }
}

fn sample_catalog(with_promotion: bool) -> Catalog {
    Catalog {
        products: vec![
            Product {
                code: "WC100".to_string(),
                name: "รถเข็นไฟฟ้า".to_string(),
                unit_price: 5000,
                shipping_cost: 100,
                category: "mobility".to_string(),
                promotion_ref: with_promotion.then(|| "PROMO1".to_string()),
                aliases: vec!["วีลแชร์".to_string()],
            },
            Product {
                code: "BED20".to_string(),
                name: "เตียงผู้ป่วย".to_string(),
                unit_price: 12000,
                shipping_cost: 500,
                category: "mobility".to_string(),
                promotion_ref: None,
                aliases: Vec::new(),
            },
        ],
        faqs: vec![Faq {
            keywords: vec!["ส่งกี่วัน".to_string()],
            answer: "จัดส่งภายใน 2-3 วันค่ะ".to_string(),
        }],
        payments: vec![PaymentMethod {
            category: "all".to_string(),
            label: "โอนธนาคาร".to_string(),
            instructions: "โอนบัญชี กสิกร 123-4-56789-0".to_string(),
        }],
        promotions: vec![Promotion {
            id: "PROMO1".to_string(),
            condition: PromotionCondition::MinQty(2),
            discount: PromotionDiscount::FreeShipping,
            note: "ส่งฟรีเมื่อซื้อครบ 2 ชิ้น".to_string(),
        }],
    }
}

struct Flow {
    _dir: tempfile::TempDir,
    db_path: PathBuf,
    sessions: Arc<InMemorySessionStore>,
    orchestrator: Orchestrator,
}

impl Flow {
    fn new(catalog: Catalog) -> Self {
        Self::with_fallback(catalog, Box::new(FailingFallback))
    }

    fn with_fallback(catalog: Catalog, fallback: Box<dyn FallbackGenerator>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("orders.db");
        let sessions = Arc::new(InMemorySessionStore::new());
        let orchestrator = Orchestrator::new(
            Box::new(FixedCatalog(catalog)),
            Box::new(Arc::clone(&sessions)),
            Box::new(SqliteLedger::open(&db_path).expect("open ledger")),
            fallback,
        );
        Self {
            _dir: dir,
            db_path,
            sessions,
            orchestrator,
        }
    }

    fn send(&self, text: &str) -> String {
        self.orchestrator.handle_message(USER, text)
    }

    fn session(&self) -> Session {
        self.sessions.get(USER)
    }

    fn pending_order(&self) -> shopflow::ledger::Order {
        let order_id = self.session().pending_order_id.expect("pending order id");
        self.order(&order_id)
    }

    fn order(&self, order_id: &str) -> shopflow::ledger::Order {
        SqliteLedger::open(&self.db_path)
            .expect("reopen ledger")
            .get(order_id)
            .expect("get order")
            .expect("order exists")
    }

    fn order_count(&self) -> i64 {
        let connection = rusqlite::Connection::open(&self.db_path).expect("open db");
        connection
            .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
            .expect("count")
    }

    fn delete_order(&self, order_id: &str) {
        let connection = rusqlite::Connection::open(&self.db_path).expect("open db");
        connection
            .execute("DELETE FROM orders WHERE order_id = ?1", [order_id])
            .expect("delete");
    }
}

#[test]
fn scenario_a_product_with_inline_qty_creates_a_pending_order() {
    let flow = Flow::new(sample_catalog(false));
    let reply = flow.send("รถเข็นไฟฟ้า 2");

    assert!(reply.contains("ยอดรวม 10100 บาท"), "reply: {reply}");
    let session = flow.session();
    assert_eq!(session.stage, Stage::AwaitingPaymentMethod);
    assert_eq!(session.last_product_code.as_deref(), Some("WC100"));

    let order = flow.pending_order();
    assert_eq!(order.total, 10000);
    assert_eq!(order.shipping, 100);
    assert_eq!(order.discount, 0);
    assert_eq!(order.grand_total, 10100);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_method, PaymentChoice::Pending);
}

#[test]
fn scenario_b_min_qty_promotion_grants_free_shipping() {
    let flow = Flow::new(sample_catalog(true));
    let reply = flow.send("รถเข็นไฟฟ้า 2");

    assert!(reply.contains("ยอดรวม 10000 บาท"), "reply: {reply}");
    assert!(reply.contains("ส่งฟรีเมื่อซื้อครบ 2 ชิ้น"), "reply: {reply}");
    let order = flow.pending_order();
    assert_eq!(order.shipping, 0);
    assert_eq!(order.grand_total, 10000);
}

#[test]
fn scenario_c_transfer_choice_replies_instructions_and_advances() {
    let flow = Flow::new(sample_catalog(false));
    flow.send("รถเข็นไฟฟ้า 2");

    let reply = flow.send("โอนเงิน");
    assert!(reply.contains("โอนบัญชี กสิกร 123-4-56789-0"), "reply: {reply}");
    assert_eq!(flow.session().stage, Stage::AwaitingAddressTransfer);
    assert_eq!(flow.pending_order().payment_method, PaymentChoice::Transfer);
}

#[test]
fn transfer_delivery_details_complete_the_order_as_paid() {
    let flow = Flow::new(sample_catalog(false));
    flow.send("รถเข็นไฟฟ้า 2");
    flow.send("โอนเงิน");
    let order_id = flow.session().pending_order_id.expect("pending id");

    flow.send("ชื่อสมชาย, 0891234567, 123 ถ.สุขุมวิท");
    let order = flow.order(&order_id);
    assert_eq!(order.name, "สมชาย");
    assert_eq!(order.phone, "0891234567");
    assert_eq!(order.address, "123 ถ.สุขุมวิท");
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.paid_at.is_some());
    // Completion clears the session entirely.
    assert_eq!(flow.session(), Session::default());
}

#[test]
fn scenario_d_cod_flow_records_delivery_details() {
    let flow = Flow::new(sample_catalog(false));
    flow.send("รถเข็นไฟฟ้า 2");

    let reply = flow.send("เก็บเงินปลายทาง");
    assert!(reply.contains("ปลายทาง"), "reply: {reply}");
    assert_eq!(flow.session().stage, Stage::AwaitingAddressCod);
    let order_id = flow.session().pending_order_id.expect("pending id");
    let order = flow.order(&order_id);
    assert_eq!(order.payment_method, PaymentChoice::Cod);
    assert_eq!(order.status, OrderStatus::AwaitingDelivery);

    flow.send("ชื่อสมชาย, 0891234567, 123 ถ.สุขุมวิท");
    let order = flow.order(&order_id);
    assert_eq!(order.name, "สมชาย");
    assert_eq!(order.phone, "0891234567");
    assert_eq!(order.address, "123 ถ.สุขุมวิท");
    // COD orders stay unpaid until delivery.
    assert_eq!(order.status, OrderStatus::AwaitingDelivery);
    assert_eq!(order.paid_at, None);
    assert_eq!(flow.session(), Session::default());
}

#[test]
fn scenario_e_cancel_clears_the_session_without_touching_orders() {
    let flow = Flow::new(sample_catalog(false));
    flow.send("รถเข็นไฟฟ้า");
    assert_eq!(flow.session().stage, Stage::AwaitingQty);
    flow.send("ยกเลิก");
    assert_eq!(flow.session(), Session::default());
    assert_eq!(flow.order_count(), 0);

    // Cancelling mid-payment leaves the persisted order as-is.
    flow.send("รถเข็นไฟฟ้า 2");
    let order_id = flow.session().pending_order_id.expect("pending id");
    flow.send("ยกเลิก");
    assert_eq!(flow.session(), Session::default());
    assert_eq!(flow.order(&order_id).status, OrderStatus::Pending);
}

#[test]
fn product_without_qty_asks_for_quantity_first() {
    let flow = Flow::new(sample_catalog(false));
    let reply = flow.send("รถเข็นไฟฟ้า");
    assert!(reply.contains("กี่ชิ้น"), "reply: {reply}");
    assert_eq!(flow.session().stage, Stage::AwaitingQty);
    assert_eq!(flow.order_count(), 0);

    let reply = flow.send("2");
    assert!(reply.contains("ยอดรวม 10100 บาท"), "reply: {reply}");
    assert_eq!(flow.session().stage, Stage::AwaitingPaymentMethod);
    assert_eq!(flow.order_count(), 1);
}

#[test]
fn zero_quantity_reprompts_and_creates_nothing() {
    let flow = Flow::new(sample_catalog(false));
    flow.send("รถเข็นไฟฟ้า");
    let reply = flow.send("0");
    assert!(reply.contains("มากกว่า 0"), "reply: {reply}");
    assert_eq!(flow.session().stage, Stage::AwaitingQty);
    assert_eq!(flow.order_count(), 0);
}

#[test]
fn awaiting_qty_only_advances_on_a_quantity() {
    let flow = Flow::new(sample_catalog(false));
    flow.send("รถเข็นไฟฟ้า");

    // FAQ, price query, and unresolved chatter leave the stage alone and
    // create no order.
    let reply = flow.send("ส่งกี่วันคะ");
    assert_eq!(reply, "จัดส่งภายใน 2-3 วันค่ะ");
    assert_eq!(flow.session().stage, Stage::AwaitingQty);

    let reply = flow.send("ราคาเท่าไหร่");
    assert!(reply.contains("5000"), "reply: {reply}");
    assert_eq!(flow.session().stage, Stage::AwaitingQty);

    flow.send("สวัสดีครับ");
    assert_eq!(flow.session().stage, Stage::AwaitingQty);
    assert_eq!(flow.order_count(), 0);
}

#[test]
fn new_product_mention_supersedes_and_abandons_the_pending_order() {
    let flow = Flow::new(sample_catalog(false));
    flow.send("รถเข็นไฟฟ้า 2");
    let first_order_id = flow.session().pending_order_id.expect("pending id");

    let reply = flow.send("เตียงผู้ป่วย");
    assert!(reply.contains("กี่ชิ้น"), "reply: {reply}");
    let session = flow.session();
    assert_eq!(session.stage, Stage::AwaitingQty);
    assert_eq!(session.last_product_code.as_deref(), Some("BED20"));
    assert_eq!(session.pending_order_id, None);
    assert_eq!(flow.order(&first_order_id).status, OrderStatus::Abandoned);
}

#[test]
fn missing_order_on_update_resets_the_flow() {
    let flow = Flow::new(sample_catalog(false));
    flow.send("รถเข็นไฟฟ้า 2");
    let order_id = flow.session().pending_order_id.expect("pending id");
    flow.delete_order(&order_id);

    let reply = flow.send("โอนเงิน");
    assert!(reply.contains("เริ่มรายการใหม่"), "reply: {reply}");
    assert_eq!(flow.session(), Session::default());
}

#[test]
fn unavailable_catalog_degrades_to_a_not_ready_reply() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = Orchestrator::new(
        Box::new(FailingCatalog),
        Box::new(InMemorySessionStore::new()),
        Box::new(SqliteLedger::open(&dir.path().join("orders.db")).expect("open ledger")),
        Box::new(FailingFallback),
    );
    let reply = orchestrator.handle_message(USER, "รถเข็นไฟฟ้า 2");
    assert!(reply.contains("ยังไม่พร้อม"), "reply: {reply}");
}

#[test]
fn unresolved_text_delegates_to_the_fallback_generator() {
    let flow = Flow::with_fallback(
        sample_catalog(false),
        Box::new(StubFallback("ยินดีต้อนรับค่ะ")),
    );
    assert_eq!(flow.send("สวัสดีครับ"), "ยินดีต้อนรับค่ะ");
    assert_eq!(flow.session(), Session::default());
}

#[test]
fn failed_fallback_becomes_a_fixed_apology() {
    let flow = Flow::new(sample_catalog(false));
    let reply = flow.send("สวัสดีครับ");
    assert!(reply.contains("ขออภัย"), "reply: {reply}");
}

#[test]
fn price_query_without_context_asks_for_a_product() {
    let flow = Flow::new(sample_catalog(false));
    let reply = flow.send("ราคาเท่าไหร่");
    assert!(reply.contains("ตัวไหน"), "reply: {reply}");
}
