// src/schema/lc_form.rs

use super::{DataType, SchemaField, SchemaSection};

/// The Letter-of-Credit form, in the order questions are asked.
pub fn lc_form_sections() -> Vec<SchemaSection> {
    vec![
        SchemaSection::flat(
            SchemaField::new("transaction_role", "role_in_transaction", DataType::String)
                .options(&["Exporter/Supplier (Beneficiary)", "Importer (Applicant)"])
                .aliases(&["transaction role", "role", "party type", "transaction type"]),
        ),
        SchemaSection::nested(
            "amount_and_payment",
            vec![
                SchemaField::new("amount_usd", "amount", DataType::Number).aliases(&[
                    "amount",
                    "lc amount",
                    "value",
                    "transaction amount",
                    "credit amount",
                    "usd amount",
                ]),
                SchemaField::new("payment_terms", "payment_terms", DataType::String)
                    .options(&["Sight LC", "Usance LC", "Deferred LC", "UPAS LC"])
                    .aliases(&[
                        "payment terms",
                        "terms",
                        "payment type",
                        "lc terms",
                        "payment method",
                    ]),
            ],
        ),
        SchemaSection::nested(
            "lc_details",
            vec![
                SchemaField::new("lc_type", "lc_type", DataType::String)
                    .options(&["Local (Pakistan)", "International"])
                    .aliases(&["lc type", "type", "credit type", "letter type"]),
                SchemaField::new("is_lc_issued", "is_issued", DataType::Boolean).aliases(&[
                    "is issued",
                    "issued",
                    "lc issued",
                    "already issued",
                    "status",
                ]),
                SchemaField::new("expected_issuing_banks", "expected_banks", DataType::String)
                    .options(&["All_Banks"])
                    .aliases(&[
                        "expected banks",
                        "issuing banks",
                        "banks to issue",
                        "preferred banks",
                    ])
                    .collapse_to(
                        "All_Banks",
                        "Any bank from any country always maps to 'All_Banks'",
                    ),
                SchemaField::new("issuing_bank_country", "bank_country", DataType::String)
                    .aliases(&["country", "bank country", "issuing country", "country of issue"]),
                SchemaField::new("issuing_bank", "issuing_bank", DataType::String).aliases(&[
                    "bank",
                    "issuing bank",
                    "bank name",
                    "financial institution",
                ]),
                SchemaField::new("lc_issuing_date", "issue_date", DataType::Date).aliases(&[
                    "issue date",
                    "issuing date",
                    "date of issue",
                    "lc date",
                    "issuance date",
                ]),
                SchemaField::new(
                    "expected_lc_issuance_date",
                    "expected_issue_date",
                    DataType::Date,
                )
                .aliases(&["expected date", "expected issuance", "planned issue date"]),
                SchemaField::new(
                    "expected_shipment_date",
                    "expected_shipment_date",
                    DataType::Date,
                )
                .aliases(&[
                    "shipment date",
                    "shipping date",
                    "expected shipment",
                    "delivery date",
                ]),
                SchemaField::new(
                    "expected_confirmation_date",
                    "expected_confirmation_date",
                    DataType::Date,
                )
                .aliases(&[
                    "confirmation date",
                    "expected confirmation",
                    "date to add confirmation",
                ]),
            ],
        ),
        SchemaSection::nested(
            "lc_confirmation",
            vec![
                SchemaField::new("send_to_other_banks", "send_to_other_banks", DataType::Boolean)
                    .aliases(&["send to other banks", "other banks", "additional banks"]),
                SchemaField::new(
                    "preferred_confirming_banks",
                    "confirming_banks",
                    DataType::Array,
                )
                .aliases(&["confirming banks", "preferred banks", "confirmation banks"])
                .note("Each item: {country, bank, city, swift_code}"),
            ],
        ),
        SchemaSection::nested(
            "shipment_details",
            vec![
                SchemaField::new("shipment_type", "shipment_type", DataType::String)
                    .options(&["Port", "Airport", "Land"])
                    .aliases(&[
                        "shipment type",
                        "transport type",
                        "shipping method",
                        "delivery method",
                    ]),
                SchemaField::new("port_of_loading", "loading_port", DataType::String).aliases(&[
                    "port of loading",
                    "loading port",
                    "origin port",
                    "departure port",
                    "pol",
                ]),
                SchemaField::new("port_of_destination", "destination_port", DataType::String)
                    .aliases(&[
                        "port of destination",
                        "destination port",
                        "arrival port",
                        "pod",
                        "discharge port",
                    ]),
                SchemaField::new(
                    "product_description",
                    "product_description",
                    DataType::String,
                )
                .max_length(50)
                .aliases(&["product", "goods", "merchandise", "commodity", "description"]),
            ],
        ),
        SchemaSection::nested(
            "importer_info",
            vec![
                SchemaField::new("applicant_name", "applicant_name", DataType::String).aliases(&[
                    "name of applicant",
                    "applicant",
                    "buyer",
                    "importer name",
                    "importer",
                ]),
                SchemaField::new("city_of_import", "import_city", DataType::String).aliases(&[
                    "city of import",
                    "import city",
                    "buyer city",
                    "destination city",
                ]),
            ],
        ),
        SchemaSection::nested(
            "exporter_info",
            vec![
                SchemaField::new("beneficiary_name", "beneficiary_name", DataType::String)
                    .aliases(&[
                        "name of beneficiary",
                        "beneficiary",
                        "seller",
                        "exporter name",
                        "exporter",
                        "supplier",
                    ]),
                SchemaField::new("city_of_export", "export_city", DataType::String).aliases(&[
                    "city of export",
                    "export city",
                    "seller city",
                    "origin city",
                ]),
                SchemaField::new(
                    "beneficiary_country",
                    "beneficiary_country",
                    DataType::String,
                )
                .aliases(&[
                    "beneficiary country",
                    "exporter country",
                    "country of export",
                    "seller country",
                ]),
            ],
        ),
        SchemaSection::nested(
            "confirmation_charges",
            vec![
                SchemaField::new("charges_on_account_of", "charges_account", DataType::String)
                    .options(&["Exporter (Beneficiary)", "Importer (Applicant)"])
                    .aliases(&["charges on account of", "charges to", "paid by", "account of"]),
                SchemaField::new("expected_charges", "expected_charges", DataType::Number)
                    .aliases(&["expected charges", "charges", "fees", "cost"]),
                SchemaField::new("pricing_per_annum", "pricing_per_annum", DataType::Number)
                    .aliases(&["pricing per annum", "annual pricing", "yearly rate", "per annum"]),
            ],
        ),
        SchemaSection::nested(
            "attachments",
            vec![
                SchemaField::new("documents", "documents", DataType::Array).aliases(&[
                    "documents",
                    "attachments",
                    "files",
                    "lc drafts",
                    "invoice",
                ]),
            ],
        ),
        SchemaSection::nested(
            "bidding_deadline",
            vec![
                SchemaField::new("last_date_for_bids", "bid_deadline", DataType::Date)
                    .aliases(&[
                        "bidding deadline",
                        "last date",
                        "deadline",
                        "bid date",
                        "closing date",
                        "validity",
                        "valid for",
                        "validity period",
                    ])
                    .note("A validity in days is added to lc_issuing_date"),
            ],
        ),
    ]
}
