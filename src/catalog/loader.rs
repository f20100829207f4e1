use super::{
    Catalog, CatalogError, Faq, PaymentMethod, Product, Promotion, PromotionCondition,
    PromotionDiscount, RowRecord,
};

/// Fetches the catalog sheet's CSV export over HTTP. One fetch per call;
/// there is no cache, so every inbound message sees a fresh snapshot.
#[derive(Debug, Clone)]
pub struct SheetCatalogSource {
    url: String,
}

impl SheetCatalogSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl super::CatalogSource for SheetCatalogSource {
    fn load(&self) -> Result<Catalog, CatalogError> {
        let response = ureq::get(&self.url)
            .call()
            .map_err(|e| CatalogError::Fetch {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;
        let body = response
            .into_string()
            .map_err(|e| CatalogError::Fetch {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;
        parse_catalog_csv(&body)
    }
}

/// Parses the sheet's CSV export. The sheet is one wide table with a
/// `type` discriminator column (`product`, `faq`, `payment`, `promotion`);
/// rows with a blank or unknown type are skipped.
pub fn parse_catalog_csv(body: &str) -> Result<Catalog, CatalogError> {
    let mut rows = split_csv_rows(body).into_iter();
    let header = match rows.next() {
        Some(header) if !header.is_empty() => header,
        _ => return Err(CatalogError::Empty),
    };
    let header: Vec<String> = header
        .iter()
        .map(|cell| cell.trim().to_ascii_lowercase())
        .collect();

    let mut catalog = Catalog::default();
    let mut saw_data_row = false;
    for (index, cells) in rows.enumerate() {
        // Row numbers are 1-based and include the header.
        let row = index + 2;
        if cells.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        saw_data_row = true;

        let record: RowRecord = header
            .iter()
            .cloned()
            .zip(cells.iter().map(|cell| cell.trim().to_string()))
            .collect();
        match field(&record, "type").to_ascii_lowercase().as_str() {
            "product" => catalog.products.push(parse_product(&record, row)?),
            "faq" => catalog.faqs.push(parse_faq(&record, row)?),
            "payment" => catalog.payments.push(parse_payment(&record, row)?),
            "promotion" => catalog.promotions.push(parse_promotion(&record, row)?),
            _ => {}
        }
    }

    if !saw_data_row {
        return Err(CatalogError::Empty);
    }
    Ok(catalog)
}

fn field<'a>(record: &'a RowRecord, name: &str) -> &'a str {
    record.get(name).map(String::as_str).unwrap_or("")
}

fn required_field(record: &RowRecord, name: &str, row: usize) -> Result<String, CatalogError> {
    let value = field(record, name);
    if value.is_empty() {
        return Err(CatalogError::Row {
            row,
            reason: format!("missing `{name}`"),
        });
    }
    Ok(value.to_string())
}

fn amount_field(record: &RowRecord, name: &str, row: usize) -> Result<i64, CatalogError> {
    let raw = field(record, name);
    if raw.is_empty() {
        return Ok(0);
    }
    let amount = raw.replace(',', "").parse::<i64>().map_err(|_| CatalogError::Row {
        row,
        reason: format!("`{name}` value `{raw}` is not a number"),
    })?;
    if amount < 0 {
        return Err(CatalogError::Row {
            row,
            reason: format!("`{name}` must not be negative"),
        });
    }
    Ok(amount)
}

fn list_field(record: &RowRecord, name: &str) -> Vec<String> {
    field(record, name)
        .split('|')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_product(record: &RowRecord, row: usize) -> Result<Product, CatalogError> {
    let promotion_ref = field(record, "promotion_id");
    Ok(Product {
        code: required_field(record, "code", row)?,
        name: required_field(record, "name", row)?,
        unit_price: amount_field(record, "price", row)?,
        shipping_cost: amount_field(record, "shipping", row)?,
        category: field(record, "category").to_string(),
        promotion_ref: (!promotion_ref.is_empty()).then(|| promotion_ref.to_string()),
        aliases: list_field(record, "aliases"),
    })
}

fn parse_faq(record: &RowRecord, row: usize) -> Result<Faq, CatalogError> {
    let keywords = list_field(record, "keywords");
    if keywords.is_empty() {
        return Err(CatalogError::Row {
            row,
            reason: "faq row has no keywords".to_string(),
        });
    }
    Ok(Faq {
        keywords,
        answer: required_field(record, "answer", row)?,
    })
}

fn parse_payment(record: &RowRecord, row: usize) -> Result<PaymentMethod, CatalogError> {
    Ok(PaymentMethod {
        category: required_field(record, "category", row)?,
        label: required_field(record, "label", row)?,
        instructions: required_field(record, "instructions", row)?,
    })
}

fn parse_promotion(record: &RowRecord, row: usize) -> Result<Promotion, CatalogError> {
    let condition = PromotionCondition::parse(
        &required_field(record, "condition_type", row)?,
        field(record, "condition_value"),
    )
    .map_err(|reason| CatalogError::Row { row, reason })?;
    let discount = PromotionDiscount::parse(
        &required_field(record, "discount_type", row)?,
        field(record, "discount_value"),
    )
    .map_err(|reason| CatalogError::Row { row, reason })?;
    Ok(Promotion {
        id: required_field(record, "promotion_id", row)?,
        condition,
        discount,
        note: field(record, "note").to_string(),
    })
}

/// Minimal CSV splitter: quoted fields, `""` escapes, CRLF tolerant.
fn split_csv_rows(body: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = body.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                _ => cell.push(ch),
            }
            continue;
        }
        match ch {
            '"' => in_quotes = true,
            ',' => cells.push(std::mem::take(&mut cell)),
            '\r' => {}
            '\n' => {
                cells.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut cells));
            }
            _ => cell.push(ch),
        }
    }
    if !cell.is_empty() || !cells.is_empty() {
        cells.push(cell);
        rows.push(cells);
    }
    rows
}
