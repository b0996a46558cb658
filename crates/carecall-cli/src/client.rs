//! Blocking HTTP client for a running `carecall serve`.

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub struct Client {
    base: String,
    agent: ureq::Agent,
}

impl Client {
    pub fn new(server: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self {
            base: server.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let resp = self.agent.get(&self.url(path)).call();
        self.decode(resp)
    }

    pub fn post<T: DeserializeOwned>(&self, path: &str, body: Option<serde_json::Value>) -> anyhow::Result<T> {
        let req = self.agent.post(&self.url(path));
        let resp = match body {
            Some(body) => req.send_json(body),
            None => req.call(),
        };
        self.decode(resp)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        resp: Result<ureq::Response, ureq::Error>,
    ) -> anyhow::Result<T> {
        match resp {
            Ok(resp) => resp.into_json().context("unexpected response from server"),
            Err(ureq::Error::Status(code, resp)) => {
                let message = resp
                    .into_json::<serde_json::Value>()
                    .ok()
                    .and_then(|v| v["error"].as_str().map(str::to_string))
                    .unwrap_or_else(|| "no details".to_string());
                Err(anyhow!("server returned {code}: {message}"))
            }
            Err(e) => Err(anyhow!(e)).with_context(|| {
                format!("could not reach carecall server at {}", self.base)
            }),
        }
    }
}
