// src/llm_extract.rs

use crate::config::{LlmBackend, LlmSection};
use crate::error::ExtractError;
use crate::pipeline::{HsCodeInfo, LcExtractor};
use crate::record::LcRecord;
use crate::schema::{DataType, SchemaRegistry, SpecialMapping};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Write as _;
use tracing::{debug, info, warn};

const LC_PREAMBLE: &str = r#"You are an expert in extracting information from Letter of Credit (LC)
documents and trade finance forms. The document may use different wording; map every
value you find to the schema below, using the aliases to recognise fields."#;

const LC_RULES: &str = r#"=== EXTRACTION RULES ===
1. Use the aliases to identify fields even when they are worded differently
   ("buyer", "applicant" and "importer" are the same field).
2. ENUM fields MUST use one of the listed values exactly, with the same capitalisation.
3. Dates use YYYY-MM-DD.
4. Amounts are plain numbers without currency symbols or thousands separators.
5. If the bidding deadline is given as a validity in days (e.g. "60 days"), return it as "<N> days".
6. Use null for anything the document does not state. Never invent values.
7. Return ONLY the JSON object, no markdown fences, no commentary."#;

const VOICE_PREAMBLE: &str = r#"You are an expert at extracting Letter of Credit (LC) information
from voice conversations. The transcript is a call between a trade finance assistant and
a customer. Extract the LC details the customer states."#;

const HS_PROMPT: &str = r#"You are an expert in HS Codes (Harmonized System Codes) used in
international trade.
Given a product description:
1. Determine the most appropriate HS code (6 digits minimum, 8 if possible).
2. Give the official HS description and the chapter name.
3. Assess your confidence as "high", "medium" or "low".

HS code format: 2-digit chapter, 4-digit heading, 6-digit subheading, optional national digits.

Return ONLY JSON:
{
  "hs_code": "XXXXXX",
  "hs_description": "Official HS code description",
  "chapter": "Chapter name",
  "confidence": "high" | "medium" | "low",
  "reasoning": "Why this code was selected",
  "alternative_codes": ["code1", "code2"]
}"#;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Resolved endpoint configuration ready to make API calls.
#[derive(Debug, Clone)]
struct ResolvedEndpoint {
    base_url: String,
    model: String,
    api_key: String,
}

fn resolve_endpoint(llm: &LlmSection) -> Result<ResolvedEndpoint, ExtractError> {
    let Some(active) = llm.active_endpoint() else {
        return Err(ExtractError::Config(
            "heuristics backend selected, no LLM endpoint".to_string(),
        ));
    };
    let api_key = match llm.backend {
        LlmBackend::Remote => {
            std::env::var("LLM_API_KEY").map_err(|_| ExtractError::MissingApiKey)?
        }
        // required by the API, ignored by the local servers
        LlmBackend::Ollama => "ollama".to_string(),
        _ => "cliproxy".to_string(),
    };
    info!(
        backend = ?llm.backend,
        url = %active.base_url,
        model = %active.model,
        "Using LLM backend"
    );
    Ok(ResolvedEndpoint {
        base_url: active.base_url.clone(),
        model: active.model.clone(),
        api_key,
    })
}

/// Check if the Ollama server is reachable.
async fn check_ollama_health(client: &Client, base_url: &str) -> bool {
    // Ollama's health endpoint is at the root, not under /v1
    let health_url = base_url.trim_end_matches('/').trim_end_matches("/v1");

    match client
        .get(health_url)
        .timeout(std::time::Duration::from_secs(3))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            info!("Ollama server is reachable");
            true
        }
        Ok(resp) => {
            warn!(status = %resp.status(), "Ollama server returned non-OK status");
            false
        }
        Err(e) => {
            warn!(error = %e, "Ollama server not reachable");
            false
        }
    }
}

fn type_name(data_type: DataType) -> &'static str {
    match data_type {
        DataType::String => "string",
        DataType::Number => "number",
        DataType::Date => "date",
        DataType::Boolean => "boolean",
        DataType::Array => "array",
    }
}

/// JSON skeleton with every section and wire name, in declaration order.
fn response_skeleton(registry: &SchemaRegistry) -> String {
    let mut out = String::from("{\n");
    let sections = registry.sections();
    for (i, section) in sections.iter().enumerate() {
        let comma = if i + 1 < sections.len() { "," } else { "" };
        if section.flat {
            let _ = writeln!(out, "  \"{}\": null{comma}", section.fields[0].wire_name);
            continue;
        }
        let _ = writeln!(out, "  \"{}\": {{", section.name);
        for (j, field) in section.fields.iter().enumerate() {
            let inner = if j + 1 < section.fields.len() { "," } else { "" };
            let _ = writeln!(out, "    \"{}\": null{inner}", field.wire_name);
        }
        let _ = writeln!(out, "  }}{comma}");
    }
    out.push('}');
    out
}

/// Field guide, enum and special-rule sections rendered from the schema.
fn schema_guide(registry: &SchemaRegistry) -> String {
    let mut guide = String::from("=== LC FORM SCHEMA ===\n");
    let mut enums = String::from("=== ENUM FIELDS (use EXACT values only) ===\n");
    let mut special = String::new();

    for section in registry.sections() {
        let _ = writeln!(guide, "\n**{}:**", section.name.to_uppercase().replace('_', " "));
        for field in &section.fields {
            let kind = type_name(field.data_type);
            let _ = writeln!(guide, "  - {} (type: {kind})", field.wire_name);
            if !field.aliases.is_empty() {
                let _ = writeln!(guide, "    Aliases: {}", field.aliases.join(", "));
            }
            if let Some(max) = field.max_length {
                let _ = writeln!(guide, "    At most {max} characters");
            }
            if let Some(note) = &field.note {
                let _ = writeln!(guide, "    Note: {note}");
            }
            if field.is_enum() {
                let _ = writeln!(enums, "\n{}:", field.wire_name);
                for option in &field.options {
                    let _ = writeln!(enums, "  - \"{option}\"");
                }
            }
            if let Some(SpecialMapping::CollapseToSentinel { sentinel, description }) =
                &field.special_mapping
            {
                let _ = writeln!(
                    special,
                    "\n{}:\n  {description}\n  - Return exactly \"{sentinel}\" {}",
                    field.wire_name, "whenever any bank is mentioned."
                );
            }
        }
    }

    let mut out = guide;
    out.push('\n');
    out.push_str(&enums);
    if !special.is_empty() {
        out.push_str("\n=== SPECIAL MAPPING RULES ===\n");
        out.push_str(&special);
    }
    out
}

/// System prompt for document extraction.
pub fn extraction_prompt(registry: &SchemaRegistry) -> String {
    format!(
        "{LC_PREAMBLE}\n\n{}\n{LC_RULES}\n\nReturn JSON in exactly this shape:\n{}",
        schema_guide(registry),
        response_skeleton(registry)
    )
}

/// System prompt for a call transcript. Already provided values are shown so the
/// model does not ask for or contradict them.
pub fn transcript_prompt(registry: &SchemaRegistry, provided: &LcRecord) -> String {
    let mut prompt = format!("{VOICE_PREAMBLE}\n\n{}\n{LC_RULES}\n", schema_guide(registry));
    if !provided.is_empty() {
        let provided_json =
            serde_json::to_string_pretty(provided).unwrap_or_else(|_| "{}".to_string());
        let _ = write!(
            prompt,
            "\nALREADY PROVIDED DATA (from web form, authoritative):\n{provided_json}\n"
        );
    }
    let _ = write!(prompt, "\nReturn JSON in exactly this shape:\n{}", response_skeleton(registry));
    prompt
}

/// Truncate to at most `max_chars` characters on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Strip markdown fences and surrounding chatter, then parse the object.
pub fn parse_json_response(content: &str) -> Result<Map<String, Value>, ExtractError> {
    let stripped = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    // Some models (e.g. qwen3 with /think) prepend reasoning text.
    let json_str = extract_json_object(stripped)?;

    match serde_json::from_str::<Value>(json_str)? {
        Value::Object(map) => Ok(map),
        other => Err(ExtractError::NotAnObject(other.to_string())),
    }
}

/// The outermost `{...}` span of a string.
fn extract_json_object(s: &str) -> Result<&str, ExtractError> {
    let start = s.find('{');
    let end = s.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => Ok(&s[start..=end]),
        _ => Err(ExtractError::NoJsonObject(truncate_chars(s, 200).to_string())),
    }
}

/// Extractor backed by an OpenAI-compatible chat-completions endpoint.
pub struct LlmExtractor {
    client: Client,
    endpoint: ResolvedEndpoint,
    max_chars: usize,
    temperature: f64,
    registry: SchemaRegistry,
    lc_prompt: String,
}

impl LlmExtractor {
    /// Resolve the configured backend and, for Ollama, make sure it is up.
    pub async fn connect(llm: &LlmSection, registry: SchemaRegistry) -> Result<Self, ExtractError> {
        let endpoint = resolve_endpoint(llm)?;
        let client = Client::new();

        if llm.backend == LlmBackend::Ollama
            && !check_ollama_health(&client, &endpoint.base_url).await
        {
            return Err(ExtractError::BackendUnavailable {
                backend: "ollama".to_string(),
                url: endpoint.base_url.clone(),
            });
        }

        let lc_prompt = extraction_prompt(&registry);
        Ok(Self {
            client,
            endpoint,
            max_chars: llm.max_chars,
            temperature: llm.temperature,
            registry,
            lc_prompt,
        })
    }

    async fn complete(
        &self,
        system: &str,
        user: String,
    ) -> Result<Map<String, Value>, ExtractError> {
        let request = ChatRequest {
            model: self.endpoint.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.endpoint.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.endpoint.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::Api { status, body });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or(ExtractError::EmptyResponse)?;
        debug!(chars = content.len(), "LLM response received");

        parse_json_response(content)
    }
}

#[async_trait]
impl LcExtractor for LlmExtractor {
    fn name(&self) -> &str {
        &self.endpoint.model
    }

    async fn extract_document(&self, text: &str) -> Result<Map<String, Value>, ExtractError> {
        let text = truncate_chars(text, self.max_chars);
        self.complete(
            &self.lc_prompt,
            format!("Extract LC data from the following document text:\n\n{text}"),
        )
        .await
    }

    async fn extract_transcript(
        &self,
        transcript: &str,
        provided: &LcRecord,
    ) -> Result<Map<String, Value>, ExtractError> {
        let system = transcript_prompt(&self.registry, provided);
        let transcript = truncate_chars(transcript, self.max_chars);
        self.complete(&system, format!("CONVERSATION TRANSCRIPT:\n{transcript}"))
            .await
    }

    async fn classify_hs(&self, product: &str) -> Result<Option<HsCodeInfo>, ExtractError> {
        if product.trim().is_empty() {
            return Ok(None);
        }
        let raw = self
            .complete(HS_PROMPT, format!("Product Description: \"{product}\""))
            .await?;
        if raw.get("hs_code").is_none_or(Value::is_null) {
            warn!(product = %product, "LLM returned no HS code");
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(Value::Object(raw))?))
    }
}
