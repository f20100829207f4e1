use shopflow::catalog::SheetCatalogSource;
use shopflow::channel::{dispatch_events, parse_webhook_payload, HttpReplyClient};
use shopflow::config::load_settings;
use shopflow::dialogue::Orchestrator;
use shopflow::ledger::SqliteLedger;
use shopflow::provider::OpenAiGenerator;
use shopflow::session::{InMemorySessionStore, UserLocks};
use std::io::Read;

fn output_header() -> &'static str {
    "shopflow\nStorefront chat assistant: catalog lookup, order flow, model fallback."
}

// Inbound transport and webhook signature verification live outside this
// binary. It consumes one already-verified webhook batch from stdin,
// dispatches it, and prints the per-batch report as JSON.
fn run() -> Result<(), String> {
    eprintln!("{}\n", output_header());

    let settings = load_settings().map_err(|e| e.to_string())?;
    let ledger = SqliteLedger::open(&settings.ledger_db_path).map_err(|e| e.to_string())?;
    let replies = HttpReplyClient::from_env(&settings.reply_api_base).map_err(|e| e.to_string())?;
    let fallback = OpenAiGenerator::from_env(&settings.fallback.api_base, &settings.fallback.model)
        .map_err(|e| e.to_string())?;
    let orchestrator = Orchestrator::new(
        Box::new(SheetCatalogSource::new(settings.catalog_url.clone())),
        Box::new(InMemorySessionStore::new()),
        Box::new(ledger),
        Box::new(fallback),
    );
    let locks = UserLocks::new();

    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .map_err(|e| format!("failed to read webhook payload from stdin: {e}"))?;
    let payload = parse_webhook_payload(&body).map_err(|e| e.to_string())?;

    let report = dispatch_events(
        &orchestrator,
        &replies,
        &locks,
        &settings.state_root,
        &payload.events,
    );
    println!(
        "{}",
        serde_json::json!({
            "handled": report.handled,
            "skipped": report.skipped,
            "replyFailures": report.reply_failures,
        })
    );
    if report.reply_failures > 0 {
        return Err(format!(
            "{} reply deliveries failed",
            report.reply_failures
        ));
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
