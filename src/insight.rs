//! Gemini-backed study-insight generation.
//!
//! Two operations sit on top of one `generateContent` call: free-form
//! tutoring (`ask`) and structured revision recommendations
//! (`revision_insights`), which reshapes the model's reply into JSON.

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::info;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/";

/// How many topics the insight prompt will carry at most.
const INSIGHT_TOPIC_LIMIT: usize = 30;

const SYSTEM_INSTRUCTION: &str = "You are an expert medical tutor specializing in NEET-PG preparation. \
Your goal is to help students understand complex medical concepts, clinical cases, and potential exam questions.\n\
- Provide high-yield, concise, and accurate medical format.\n\
- Use bullet points, tables, and bold text for readability.\n\
- If asked about a clinical scenario, explain the diagnosis and management steps clearly.\n\
- Maintain a professional yet encouraging tone.";

#[derive(Clone)]
pub struct InsightClient {
    http: Client,
    base_url: Url,
    api_key: String,
    model: String,
}

impl fmt::Debug for InsightClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsightClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl InsightClient {
    pub fn new(api_key: String, model: String) -> Self {
        let base_url = Url::parse(GEMINI_API_BASE).expect("valid default Gemini URL");
        Self::with_base_url(api_key, model, base_url)
    }

    pub fn with_base_url(api_key: String, model: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("studyhub/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            api_key,
            model,
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut url = self
            .base_url
            .join(&format!("v1beta/models/{}:generateContent", self.model))
            .context("invalid Gemini base URL")?;
        url.query_pairs_mut().append_pair("key", &self.api_key);

        let body = json!({
            "contents": [ { "parts": [ { "text": prompt } ] } ]
        });
        let res = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .context("failed to reach Gemini")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("gemini error {status}: {body}"));
        }

        let payload: Value = res.json().await.context("invalid Gemini response JSON")?;
        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Gemini response carried no text candidate"))
    }

    /// Free-form tutoring: prefix the tutor instruction and return the
    /// model's text verbatim.
    pub async fn ask(&self, prompt: &str) -> Result<String> {
        info!(chars = prompt.len(), "processing AI request");
        let full = format!("{SYSTEM_INSTRUCTION}\n\nUser Query: {prompt}");
        self.generate(&full).await
    }

    /// Analyze study topics and return structured revision
    /// recommendations. The reply is fence-stripped and parsed as JSON;
    /// when parsing fails the raw text is returned as `{"raw": text}`.
    pub async fn revision_insights(&self, topics: &[Value]) -> Result<Value> {
        info!(topics = topics.len(), "analyzing topics for insights");
        let prompt = build_insight_prompt(topics)?;
        let reply = self.generate(&prompt).await?;
        Ok(reshape_insight_reply(&reply))
    }
}

/// Build the analysis prompt over at most [`INSIGHT_TOPIC_LIMIT`] topics.
pub fn build_insight_prompt(topics: &[Value]) -> Result<String> {
    let capped = &topics[..topics.len().min(INSIGHT_TOPIC_LIMIT)];
    let data = serde_json::to_string_pretty(capped).context("serialize topics")?;
    Ok(format!(
        r#"You are an expert NEET-PG medical exam tutor. Analyze these study topics and provide personalized revision recommendations.

TOPICS DATA (JSON):
{data}

Based on this data, provide:
1. **Top 5 Priority Topics** to revise RIGHT NOW with reasons (consider: days since completion, priority level, subject importance)
2. **Study Pattern Insights** - brief observations about study habits
3. **Subject Recommendations** - which subjects need more attention

IMPORTANT: Respond in this exact JSON format:
{{
    "priorityTopics": [
        {{"name": "Topic Name", "reason": "Why this needs revision", "urgency": "high/medium/low"}}
    ],
    "insights": "Brief observation about their study pattern",
    "subjectFocus": ["Subject 1 that needs work", "Subject 2 that needs work"],
    "motivationalTip": "A short motivational message"
}}

Be specific and actionable. Focus on medical exam preparation strategy."#
    ))
}

/// Drop Markdown code fences the model tends to wrap JSON in.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parse the model's reply as JSON, falling back to `{"raw": text}`.
pub fn reshape_insight_reply(reply: &str) -> Value {
    let cleaned = strip_code_fences(reply);
    serde_json::from_str(&cleaned).unwrap_or_else(|_| json!({ "raw": cleaned }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_json_fences() {
        let reply = "```json\n{\"insights\": \"steady\"}\n```";
        assert_eq!(strip_code_fences(reply), "{\"insights\": \"steady\"}");
    }

    #[test]
    fn reshapes_valid_json_reply() {
        let out = reshape_insight_reply("```json\n{\"priorityTopics\": []}\n```");
        assert_eq!(out, json!({ "priorityTopics": [] }));
    }

    #[test]
    fn falls_back_to_raw_on_unparseable_reply() {
        let out = reshape_insight_reply("Revise cardiology first.");
        assert_eq!(out, json!({ "raw": "Revise cardiology first." }));
    }

    #[test]
    fn prompt_caps_topic_count() {
        let topics: Vec<Value> = (0..50).map(|i| json!({ "topic_name": i })).collect();
        let prompt = build_insight_prompt(&topics).unwrap();
        assert!(prompt.contains("\"topic_name\": 29"));
        assert!(!prompt.contains("\"topic_name\": 30"));
    }

    #[test]
    fn prompt_embeds_topic_data() {
        let topics = vec![json!({ "topic_name": "Cardiology", "priority": "High" })];
        let prompt = build_insight_prompt(&topics).unwrap();
        assert!(prompt.contains("Cardiology"));
        assert!(prompt.contains("TOPICS DATA (JSON)"));
    }
}
