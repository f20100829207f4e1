use crate::shared::text::{digit_runs, first_digit_run};

const NAME_MARKERS: &[&str] = &["ชื่อ", "name"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryDetails {
    pub name: String,
    pub phone: String,
    pub address: String,
}

/// Splits free text into name/phone/address with documented fallbacks:
/// fragments come from commas and newlines; an 8-12 digit run marks the
/// phone fragment; a name-marker fragment becomes the name with the marker
/// stripped; everything else joins, in order, into the address. Without a
/// name marker the first remaining fragment is the name; without a phone
/// fragment the whole text is rescanned for a leading-zero 9-10 digit run.
pub fn parse_delivery_details(raw: &str) -> DeliveryDetails {
    let fragments: Vec<&str> = raw
        .split([',', '\n'])
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect();

    let mut name: Option<String> = None;
    let mut phone: Option<String> = None;
    let mut rest: Vec<&str> = Vec::new();

    for fragment in &fragments {
        if phone.is_none() {
            if let Some(run) = first_digit_run(fragment, 8, 12) {
                phone = Some(run);
                continue;
            }
        }
        if name.is_none() && contains_name_marker(fragment) {
            name = Some(strip_name_markers(fragment));
            continue;
        }
        rest.push(fragment);
    }

    if name.is_none() && !rest.is_empty() {
        name = Some(rest.remove(0).to_string());
    }
    if phone.is_none() {
        // Last-resort rescan of the unsplit text. Digit runs cannot span
        // the fragment separators, so this only diverges from the loop
        // above if the fragment rules ever tighten.
        phone = digit_runs(raw)
            .into_iter()
            .find(|run| run.starts_with('0') && (run.len() == 9 || run.len() == 10));
    }

    DeliveryDetails {
        name: name.unwrap_or_default(),
        phone: phone.unwrap_or_default(),
        address: rest.join(" "),
    }
}

fn contains_name_marker(fragment: &str) -> bool {
    let lowered = fragment.to_ascii_lowercase();
    NAME_MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn strip_name_markers(fragment: &str) -> String {
    // ASCII-only lowering keeps byte offsets aligned with the original;
    // Unicode lowering can change a character's byte length. The markers
    // are Thai (caseless) or plain ASCII, so nothing is missed.
    let mut stripped = fragment.to_string();
    for marker in NAME_MARKERS {
        while let Some(position) = stripped.to_ascii_lowercase().find(marker) {
            stripped.replace_range(position..position + marker.len(), "");
        }
    }
    stripped.trim().trim_start_matches(':').trim().to_string()
}
