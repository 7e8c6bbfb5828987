// src/heuristics/mt700.rs

use crate::schema::format_date;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;
use time::{Date, Month};

static TAG_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*:(\d{2}[A-Z]?):[ \t]*").expect("tag line regex"));
static AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]{3})\s*([\d.,]+)").expect("amount regex"));
static YYMMDD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})(\d{2})(\d{2})").expect("date regex"));
static CHARGES_PARTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)(beneficiary|applicant)(?:'s)?\s+account",
        r"|account\s+of\s+(?:the\s+)?(beneficiary|applicant)",
    ))
    .expect("charges regex")
});

/// Tags we keep but have no form field for, with the label they travel under.
const UNMAPPED_TAGS: &[(&str, &str)] = &[
    ("20", "documentary_credit_number"),
    ("27", "sequence_of_total"),
    ("31D", "date_and_place_of_expiry"),
    ("39A", "amount_tolerance"),
    ("40A", "form_of_documentary_credit"),
    ("42A", "drawee_bank"),
    ("43P", "partial_shipments"),
    ("43T", "transhipment"),
    ("44D", "shipment_period"),
    ("47A", "additional_conditions"),
    ("48", "period_for_presentation"),
    ("53A", "reimbursing_bank"),
    ("72", "sender_to_receiver_information"),
    ("78", "instructions_to_paying_bank"),
];

/// Split MT700 text into (tag, content) pairs in document order.
pub fn parse_tags(text: &str) -> Vec<(String, String)> {
    let marks: Vec<(usize, usize, String)> = TAG_LINE
        .captures_iter(text)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some((whole.start(), whole.end(), c[1].to_string()))
        })
        .collect();

    marks
        .iter()
        .enumerate()
        .map(|(i, (_, body_start, tag))| {
            let body_end = marks.get(i + 1).map(|m| m.0).unwrap_or(text.len());
            (tag.clone(), text[*body_start..body_end].trim().to_string())
        })
        .collect()
}

/// Map MT700 tags onto a raw record keyed by the wire names the normalizer knows.
pub fn extract(text: &str) -> Map<String, Value> {
    let tags = parse_tags(text);
    let mut out = Map::new();
    if tags.is_empty() {
        return out;
    }

    let mut amount = Map::new();
    let mut lc = Map::new();
    let mut confirmation = Map::new();
    let mut shipment = Map::new();
    let mut importer = Map::new();
    let mut exporter = Map::new();
    let mut charges = Map::new();
    let mut attachments = Map::new();

    // An MT700 is the issuance message itself.
    lc.insert("is_issued".into(), json!(true));

    for (tag, body) in &tags {
        match tag.as_str() {
            "31C" => {
                if let Some(d) = parse_yymmdd(body) {
                    lc.insert("issue_date".into(), json!(d));
                }
            }
            "44C" => {
                if let Some(d) = parse_yymmdd(body) {
                    lc.insert("expected_shipment_date".into(), json!(d));
                }
            }
            "32B" => match parse_amount(body) {
                Some((currency, value)) if currency == "USD" => {
                    amount.insert("amount".into(), json!(value));
                }
                Some((currency, value)) => {
                    out.insert("amount_in_currency".into(), json!(format!("{currency} {value}")));
                }
                None => {
                    out.insert("currency_code_amount".into(), json!(body));
                }
            },
            "42C" => {
                if let Some(terms) = payment_terms(body) {
                    amount.insert("payment_terms".into(), json!(terms));
                }
            }
            "41A" | "41D" => {
                if body.to_uppercase().contains("DEFERRED PAYMENT") {
                    amount
                        .entry("payment_terms")
                        .or_insert_with(|| json!("Deferred LC"));
                }
                out.insert("available_with_by".into(), json!(body));
            }
            "50" => {
                let lines = party_lines(body);
                if let Some(name) = lines.first() {
                    importer.insert("applicant_name".into(), json!(name));
                }
                if let Some((city, _)) = city_country(&lines) {
                    importer.insert("import_city".into(), json!(city));
                }
            }
            "59" => {
                let lines = party_lines(body);
                if let Some(name) = lines.first() {
                    exporter.insert("beneficiary_name".into(), json!(name));
                }
                if let Some((city, country)) = city_country(&lines) {
                    exporter.insert("export_city".into(), json!(city));
                    exporter.insert("beneficiary_country".into(), json!(country));
                }
            }
            "44E" | "44A" => {
                shipment
                    .entry("loading_port")
                    .or_insert_with(|| json!(first_line(body)));
                if tag == "44E" {
                    shipment.insert("shipment_type".into(), json!("Port"));
                }
            }
            "44F" | "44B" => {
                shipment
                    .entry("destination_port")
                    .or_insert_with(|| json!(first_line(body)));
                if tag == "44F" {
                    shipment.insert("shipment_type".into(), json!("Port"));
                }
            }
            "45A" => {
                shipment.insert("product_description".into(), json!(first_line(body)));
            }
            "46A" => {
                let docs: Vec<String> = body
                    .lines()
                    .map(|l| l.trim().trim_start_matches('+').trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
                attachments.insert("documents".into(), json!(docs));
            }
            "49" => {
                let upper = body.to_uppercase();
                let send = if upper.starts_with("WITHOUT") {
                    Some(false)
                } else if upper.starts_with("CONFIRM") || upper.starts_with("MAY ADD") {
                    Some(true)
                } else {
                    None
                };
                if let Some(send) = send {
                    confirmation.insert("send_to_other_banks".into(), json!(send));
                }
            }
            "71B" | "71D" => {
                if let Some(party) = charges_party(body) {
                    charges.insert("charges_account".into(), json!(party));
                }
            }
            other => {
                if let Some((_, label)) = UNMAPPED_TAGS.iter().find(|(t, _)| *t == other) {
                    out.insert((*label).to_string(), json!(body));
                }
            }
        }
    }

    for (section, fields) in [
        ("amount_and_payment", amount),
        ("lc_details", lc),
        ("lc_confirmation", confirmation),
        ("shipment_details", shipment),
        ("importer_info", importer),
        ("exporter_info", exporter),
        ("confirmation_charges", charges),
        ("attachments", attachments),
    ] {
        if !fields.is_empty() {
            out.insert(section.to_string(), Value::Object(fields));
        }
    }

    out
}

/// Party blocks may open with an "/account" line; drop it.
fn party_lines(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('/'))
        .map(str::to_string)
        .collect()
}

/// "CITY, COUNTRY" on the last line of a multi-line party block.
fn city_country(lines: &[String]) -> Option<(String, String)> {
    if lines.len() < 2 {
        return None;
    }
    let last = lines.last()?;
    let (city, country) = last.rsplit_once(',')?;
    let (city, country) = (city.trim(), country.trim());
    if city.is_empty() || country.is_empty() {
        return None;
    }
    Some((city.to_string(), country.to_string()))
}

fn first_line(body: &str) -> String {
    body.lines()
        .map(|l| l.trim().trim_start_matches('+').trim())
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// "251031" -> "2025-10-31".
fn parse_yymmdd(body: &str) -> Option<String> {
    let c = YYMMDD.captures(body.trim())?;
    let year = 2000 + c[1].parse::<i32>().ok()?;
    let month = Month::try_from(c[2].parse::<u8>().ok()?).ok()?;
    let day = c[3].parse::<u8>().ok()?;
    Date::from_calendar_date(year, month, day)
        .ok()
        .map(format_date)
}

/// "USD100000,00" -> ("USD", 100000.0). SWIFT uses a comma as decimal mark.
fn parse_amount(body: &str) -> Option<(String, f64)> {
    let c = AMOUNT.captures(body.trim())?;
    let raw = &c[2];
    let numeric = if raw.contains(',') {
        raw.replace('.', "").replace(',', ".")
    } else {
        raw.to_string()
    };
    let value = numeric.trim_end_matches('.').parse::<f64>().ok()?;
    Some((c[1].to_string(), value))
}

fn payment_terms(body: &str) -> Option<&'static str> {
    let upper = body.to_uppercase();
    if upper.contains("DEFERRED") {
        Some("Deferred LC")
    } else if upper.contains("DAYS") {
        Some("Usance LC")
    } else if upper.contains("SIGHT") {
        Some("Sight LC")
    } else {
        None
    }
}

fn charges_party(body: &str) -> Option<&'static str> {
    let c = CHARGES_PARTY.captures(body)?;
    let party = c.get(1).or_else(|| c.get(2))?.as_str().to_lowercase();
    match party.as_str() {
        "beneficiary" => Some("Exporter (Beneficiary)"),
        "applicant" => Some("Importer (Applicant)"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
:20:LC2025-00123
:31C:250115
:40A:IRREVOCABLE
:50:/PK123456
ABC IMPORTERS LTD
1 MAIN ROAD
KARACHI, PAKISTAN
:59:XYZ TRADING LLC
PO BOX 42
DUBAI, UAE
:32B:USD100000,00
:42C:AT SIGHT
:44E:JEBEL ALI
:44F:KARACHI PORT
:45A:COTTON YARN 30S COMBED
:46A:+SIGNED COMMERCIAL INVOICE
+FULL SET OF CLEAN ON BOARD BILLS OF LADING
:49:WITHOUT
:71D:ALL CHARGES OUTSIDE PAKISTAN FOR BENEFICIARY'S ACCOUNT
";

    #[test]
    fn test_parse_tags_multiline() {
        let tags = parse_tags(concat!(
            ":20:LC2025-00123\n",
            ":50:ABC IMPORTERS LTD\nADDRESS LINE 1\nKARACHI, PAKISTAN\n",
            ":32B:USD100000,00\n",
        ));
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[1].0, "50");
        assert_eq!(tags[1].1, "ABC IMPORTERS LTD\nADDRESS LINE 1\nKARACHI, PAKISTAN");
    }

    #[test]
    fn test_amount_and_dates() {
        assert_eq!(parse_amount("USD100000,00"), Some(("USD".into(), 100000.0)));
        assert_eq!(parse_amount("EUR 1.250.000,50"), Some(("EUR".into(), 1250000.5)));
        assert_eq!(parse_yymmdd("250101"), Some("2025-01-01".into()));
        assert_eq!(parse_yymmdd("251332"), None);
    }

    #[test]
    fn test_charges_party() {
        assert_eq!(
            charges_party("ALL CHARGES OUTSIDE APPLICANT'S COUNTRY FOR BENEFICIARY'S ACCOUNT"),
            Some("Exporter (Beneficiary)")
        );
        assert_eq!(
            charges_party("CONFIRMATION CHARGES FOR ACCOUNT OF APPLICANT"),
            Some("Importer (Applicant)")
        );
        assert_eq!(charges_party("AS PER AGREEMENT"), None);
    }

    #[test]
    fn test_extract_sample_message() {
        let raw = extract(SAMPLE);
        assert_eq!(raw["documentary_credit_number"], json!("LC2025-00123"));
        assert_eq!(raw["lc_details"]["issue_date"], json!("2025-01-15"));
        assert_eq!(raw["lc_details"]["is_issued"], json!(true));
        assert_eq!(raw["amount_and_payment"]["amount"], json!(100000.0));
        assert_eq!(raw["amount_and_payment"]["payment_terms"], json!("Sight LC"));
        assert_eq!(raw["importer_info"]["applicant_name"], json!("ABC IMPORTERS LTD"));
        assert_eq!(raw["importer_info"]["import_city"], json!("KARACHI"));
        assert_eq!(raw["exporter_info"]["beneficiary_name"], json!("XYZ TRADING LLC"));
        assert_eq!(raw["exporter_info"]["beneficiary_country"], json!("UAE"));
        assert_eq!(raw["shipment_details"]["loading_port"], json!("JEBEL ALI"));
        assert_eq!(raw["shipment_details"]["destination_port"], json!("KARACHI PORT"));
        assert_eq!(raw["shipment_details"]["shipment_type"], json!("Port"));
        assert_eq!(raw["lc_confirmation"]["send_to_other_banks"], json!(false));
        assert_eq!(
            raw["confirmation_charges"]["charges_account"],
            json!("Exporter (Beneficiary)")
        );
        assert_eq!(raw["attachments"]["documents"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_non_usd_amount_is_unmapped() {
        let raw = extract(":32B:EUR50000,00\n");
        assert!(raw.get("amount_and_payment").is_none());
        assert_eq!(raw["amount_in_currency"], json!("EUR 50000"));
    }

    #[test]
    fn test_plain_text_yields_nothing() {
        assert!(extract("Dear sir, please open an LC for 12:30 delivery").is_empty());
    }

    #[test]
    fn test_payment_terms() {
        assert_eq!(payment_terms("AT SIGHT"), Some("Sight LC"));
        assert_eq!(payment_terms("60 DAYS AFTER B/L DATE"), Some("Usance LC"));
        assert_eq!(payment_terms("UNKNOWN"), None);
    }
}
