use crate::catalog::Product;
use crate::pricing::Totals;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create ledger database parent {path}: {source}")]
    CreateParent {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
    #[error("order `{order_id}` not found")]
    NotFound { order_id: String },
    #[error("order id `{order_id}` already exists; id allocation is broken")]
    DuplicateOrderId { order_id: String },
    #[error("invalid order status `{value}` in database")]
    InvalidStatus { value: String },
    #[error("invalid payment method `{value}` in database")]
    InvalidPaymentMethod { value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentChoice {
    Pending,
    Transfer,
    Cod,
}

impl PaymentChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Transfer => "transfer",
            Self::Cod => "COD",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "transfer" => Ok(Self::Transfer),
            "cod" => Ok(Self::Cod),
            _ => Err("payment method must be one of: pending, transfer, COD".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    AwaitingDelivery,
    Paid,
    /// Set when a newer product reference supersedes a still-pending order.
    Abandoned,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingDelivery => "awaiting_delivery",
            Self::Paid => "paid",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim() {
            "pending" => Ok(Self::Pending),
            "awaiting_delivery" => Ok(Self::AwaitingDelivery),
            "paid" => Ok(Self::Paid),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(
                "status must be one of: pending, awaiting_delivery, paid, abandoned".to_string(),
            ),
        }
    }
}

/// One persisted order row. Field names mirror the ledger's wire-contract
/// columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub order_id: String,
    pub user_id: String,
    pub product: String,
    pub qty: u32,
    pub total: i64,
    pub discount: i64,
    pub shipping: i64,
    pub grand_total: i64,
    pub promo_note: Option<String>,
    pub payment_method: PaymentChoice,
    pub status: OrderStatus,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub created_at: i64,
    pub paid_at: Option<i64>,
}

/// Partial field update applied to an existing order. Unset fields are left
/// untouched, so applying the same patch twice is idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub payment_method: Option<PaymentChoice>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub paid_at: Option<i64>,
}

/// Owns order-id assignment and status transitions against the durable
/// store. Implementations never cache; every call re-reads or re-writes the
/// store, accepting last-write-wins between concurrent updates.
pub trait OrderLedger: Send + Sync {
    fn create(
        &self,
        user_id: &str,
        product: &Product,
        qty: u32,
        totals: &Totals,
    ) -> Result<String, LedgerError>;
    fn update(&self, order_id: &str, patch: &OrderPatch) -> Result<(), LedgerError>;
    fn get(&self, order_id: &str) -> Result<Option<Order>, LedgerError>;
}

pub struct SqliteLedger {
    db_path: PathBuf,
    sequence: AtomicU64,
}

impl SqliteLedger {
    pub fn open(db_path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| LedgerError::CreateParent {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }
        let ledger = Self {
            db_path: db_path.to_path_buf(),
            sequence: AtomicU64::new(0),
        };
        ledger.ensure_schema()?;
        Ok(ledger)
    }

    fn connect(&self) -> Result<Connection, LedgerError> {
        Connection::open(&self.db_path).map_err(|source| LedgerError::Open {
            path: self.db_path.display().to_string(),
            source,
        })
    }

    fn ensure_schema(&self) -> Result<(), LedgerError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS orders (
                    order_id TEXT NOT NULL PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    product TEXT NOT NULL,
                    qty INTEGER NOT NULL,
                    total INTEGER NOT NULL,
                    discount INTEGER NOT NULL,
                    shipping INTEGER NOT NULL,
                    grand_total INTEGER NOT NULL,
                    promo_note TEXT,
                    payment_method TEXT NOT NULL,
                    status TEXT NOT NULL,
                    name TEXT NOT NULL DEFAULT '',
                    phone TEXT NOT NULL DEFAULT '',
                    address TEXT NOT NULL DEFAULT '',
                    created_at INTEGER NOT NULL,
                    paid_at INTEGER
                );
                ",
            )
            .map_err(|source| LedgerError::Sql { source })
    }

    fn allocate_order_id(&self, user_id: &str) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let sequence = self.sequence.fetch_add(1, AtomicOrdering::Relaxed);
        format!("ORD-{millis}-{sequence}-{user_id}")
    }
}

impl OrderLedger for SqliteLedger {
    fn create(
        &self,
        user_id: &str,
        product: &Product,
        qty: u32,
        totals: &Totals,
    ) -> Result<String, LedgerError> {
        let order_id = self.allocate_order_id(user_id);
        let connection = self.connect()?;
        let inserted = connection.execute(
            "INSERT INTO orders (
                order_id, user_id, product, qty, total, discount, shipping,
                grand_total, promo_note, payment_method, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                order_id,
                user_id,
                product.code,
                qty,
                totals.base,
                totals.discount,
                totals.shipping,
                totals.grand_total,
                totals.promo_note,
                PaymentChoice::Pending.as_str(),
                OrderStatus::Pending.as_str(),
                chrono::Utc::now().timestamp(),
            ],
        );
        match inserted {
            Ok(_) => Ok(order_id),
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(LedgerError::DuplicateOrderId { order_id })
            }
            Err(source) => Err(LedgerError::Sql { source }),
        }
    }

    fn update(&self, order_id: &str, patch: &OrderPatch) -> Result<(), LedgerError> {
        use rusqlite::types::Value;

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(status) = patch.status {
            sets.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(payment_method) = patch.payment_method {
            sets.push("payment_method = ?");
            values.push(Value::Text(payment_method.as_str().to_string()));
        }
        if let Some(name) = &patch.name {
            sets.push("name = ?");
            values.push(Value::Text(name.clone()));
        }
        if let Some(phone) = &patch.phone {
            sets.push("phone = ?");
            values.push(Value::Text(phone.clone()));
        }
        if let Some(address) = &patch.address {
            sets.push("address = ?");
            values.push(Value::Text(address.clone()));
        }
        if let Some(paid_at) = patch.paid_at {
            sets.push("paid_at = ?");
            values.push(Value::Integer(paid_at));
        }

        let connection = self.connect()?;
        if sets.is_empty() {
            // Nothing to write, but the caller still learns about a stale id.
            return match self.get(order_id)? {
                Some(_) => Ok(()),
                None => Err(LedgerError::NotFound {
                    order_id: order_id.to_string(),
                }),
            };
        }

        values.push(Value::Text(order_id.to_string()));
        let sql = format!("UPDATE orders SET {} WHERE order_id = ?", sets.join(", "));
        let affected = connection
            .execute(&sql, rusqlite::params_from_iter(values))
            .map_err(|source| LedgerError::Sql { source })?;
        if affected == 0 {
            return Err(LedgerError::NotFound {
                order_id: order_id.to_string(),
            });
        }
        Ok(())
    }

    fn get(&self, order_id: &str) -> Result<Option<Order>, LedgerError> {
        let connection = self.connect()?;
        connection
            .query_row(
                "SELECT order_id, user_id, product, qty, total, discount, shipping,
                        grand_total, promo_note, payment_method, status, name, phone,
                        address, created_at, paid_at
                 FROM orders WHERE order_id = ?1",
                params![order_id],
                |row| {
                    Ok(RawOrderRow {
                        order_id: row.get(0)?,
                        user_id: row.get(1)?,
                        product: row.get(2)?,
                        qty: row.get(3)?,
                        total: row.get(4)?,
                        discount: row.get(5)?,
                        shipping: row.get(6)?,
                        grand_total: row.get(7)?,
                        promo_note: row.get(8)?,
                        payment_method: row.get(9)?,
                        status: row.get(10)?,
                        name: row.get(11)?,
                        phone: row.get(12)?,
                        address: row.get(13)?,
                        created_at: row.get(14)?,
                        paid_at: row.get(15)?,
                    })
                },
            )
            .optional()
            .map_err(|source| LedgerError::Sql { source })?
            .map(RawOrderRow::into_order)
            .transpose()
    }
}

struct RawOrderRow {
    order_id: String,
    user_id: String,
    product: String,
    qty: u32,
    total: i64,
    discount: i64,
    shipping: i64,
    grand_total: i64,
    promo_note: Option<String>,
    payment_method: String,
    status: String,
    name: String,
    phone: String,
    address: String,
    created_at: i64,
    paid_at: Option<i64>,
}

impl RawOrderRow {
    fn into_order(self) -> Result<Order, LedgerError> {
        let payment_method = PaymentChoice::parse(&self.payment_method).map_err(|_| {
            LedgerError::InvalidPaymentMethod {
                value: self.payment_method.clone(),
            }
        })?;
        let status = OrderStatus::parse(&self.status).map_err(|_| LedgerError::InvalidStatus {
            value: self.status.clone(),
        })?;
        Ok(Order {
            order_id: self.order_id,
            user_id: self.user_id,
            product: self.product,
            qty: self.qty,
            total: self.total,
            discount: self.discount,
            shipping: self.shipping,
            grand_total: self.grand_total,
            promo_note: self.promo_note,
            payment_method,
            status,
            name: self.name,
            phone: self.phone,
            address: self.address,
            created_at: self.created_at,
            paid_at: self.paid_at,
        })
    }
}
