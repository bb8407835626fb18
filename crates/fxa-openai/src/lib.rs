//! OpenAI adapter (AI fallback for free-form questions).
//!
//! Uses the `chat/completions` endpoint with a persona system prompt.

use async_trait::async_trait;
use fxa_core::{
    assistant::{signature, system_prompt, Assistant, AssistantRequest},
    config::Config,
    errors::Error,
    Result,
};
use serde_json::{json, Value};

#[derive(Clone, Debug)]
pub struct OpenAiAssistant {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    assistant_name: String,
    http: reqwest::Client,
}

impl OpenAiAssistant {
    /// `None` when no API key is configured.
    pub fn from_config(cfg: &Config) -> Result<Option<Self>> {
        let Some(api_key) = cfg.openai_api_key.clone() else {
            return Ok(None);
        };

        let http = reqwest::Client::builder()
            .timeout(cfg.http_timeout)
            .build()
            .map_err(|e| Error::External(format!("openai client build error: {e}")))?;

        Ok(Some(Self {
            api_key,
            model: cfg.openai_model.clone(),
            base_url: cfg.openai_base_url.clone(),
            max_tokens: cfg.openai_max_tokens,
            temperature: cfg.openai_temperature,
            assistant_name: cfg.assistant_name.clone(),
            http,
        }))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_payload(&self, req: &AssistantRequest) -> Value {
        let mut messages = vec![json!({
            "role": "system",
            "content": system_prompt(&self.assistant_name, req.channel, req.sender_name.as_deref()),
        })];
        for turn in &req.history {
            messages.push(json!({ "role": turn.role.as_str(), "content": turn.text }));
        }
        messages.push(json!({ "role": "user", "content": req.text }));

        json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }
}

fn parse_reply(v: &Value) -> Result<String> {
    let text = v
        .pointer("/choices/0/message/content")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .trim()
        .to_string();

    if text.is_empty() {
        return Err(Error::External("openai returned an empty answer".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl Assistant for OpenAiAssistant {
    async fn reply(&self, req: AssistantRequest) -> Result<String> {
        let started = std::time::Instant::now();
        let payload = self.build_payload(&req);

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::External(format!("openai request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "openai chat completion failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("openai json error: {e}")))?;

        let text = parse_reply(&v)?;
        tracing::info!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "assistant answered"
        );
        Ok(format!("{text}{}", signature(&self.assistant_name)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use fxa_core::{assistant::Turn, domain::Channel};

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let mut map: HashMap<String, String> = HashMap::new();
        map.insert("TELEGRAM_BOT_TOKEN".into(), "t".into());
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        Config::from_lookup(|k| map.get(k).cloned()).unwrap()
    }

    #[test]
    fn no_key_means_no_assistant() {
        assert!(OpenAiAssistant::from_config(&config(&[])).unwrap().is_none());
    }

    #[test]
    fn payload_has_persona_history_and_settings() {
        let a = OpenAiAssistant::from_config(&config(&[("OPENAI_API_KEY", "sk-test")]))
            .unwrap()
            .unwrap();
        let req = AssistantRequest {
            text: "Do you deliver cash?".to_string(),
            sender_name: Some("Amina".to_string()),
            channel: Channel::WhatsApp,
            history: vec![Turn::user("100 USD"), Turn::assistant("60,450 XAF")],
        };

        let p = a.build_payload(&req);
        assert_eq!(p["model"], "gpt-3.5-turbo");
        assert_eq!(p["max_tokens"], 300);
        assert!((p["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);

        let msgs = p["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0]["role"], "system");
        assert!(msgs[0]["content"].as_str().unwrap().contains("Amina"));
        assert_eq!(msgs[1]["role"], "user");
        assert_eq!(msgs[2]["role"], "assistant");
        assert_eq!(msgs[3]["content"], "Do you deliver cash?");
    }

    #[test]
    fn parses_first_choice() {
        let v = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Yes.  " } }]
        });
        assert_eq!(parse_reply(&v).unwrap(), "Yes.");

        let empty = serde_json::json!({ "choices": [] });
        assert!(parse_reply(&empty).is_err());
    }
}
