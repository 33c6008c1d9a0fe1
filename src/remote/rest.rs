use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use super::{Filter, RemoteDataService, Row};
use crate::error::{AppError, Result};
use crate::session::AccessToken;

const REST_PATH: &str = "rest/v1/";

/// PostgREST-style client: one HTTP resource per collection, equality
/// filters as `column=eq.value` query pairs.
pub struct RestDataService {
    client: Client,
    base: Url,
    anon_key: String,
    token: AccessToken,
}

impl RestDataService {
    pub fn new(base_url: &str, anon_key: &str, token: AccessToken, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("focus-planner/1.0")
            .build()?;
        let base = Url::parse(base_url)?.join(REST_PATH)?;
        Ok(Self {
            client,
            base,
            anon_key: anon_key.to_string(),
            token,
        })
    }

    fn endpoint(&self, collection: &str) -> Result<Url> {
        Ok(self.base.join(collection)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.token.get().unwrap_or_else(|| self.anon_key.clone());
        request.header("apikey", &self.anon_key).bearer_auth(bearer)
    }

    async fn check(response: Response, collection: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response.text().await?;
        Err(AppError::Remote(format!(
            "{} on {}: {}",
            status, collection, error_text
        )))
    }
}

fn filter_pair(filter: &Filter) -> (String, String) {
    let value = match &filter.value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    (filter.column.clone(), format!("eq.{}", value))
}

#[async_trait]
impl RemoteDataService for RestDataService {
    async fn select_all(&self, collection: &str, filter: &Filter) -> Result<Vec<Row>> {
        let request = self
            .client
            .get(self.endpoint(collection)?)
            .query(&[("select".to_string(), "*".to_string()), filter_pair(filter)]);

        let response = self.authorize(request).send().await?;
        let rows: Vec<Row> = Self::check(response, collection).await?.json().await?;
        tracing::debug!("Selected {} rows from {}", rows.len(), collection);
        Ok(rows)
    }

    async fn insert(&self, collection: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        let request = self
            .client
            .post(self.endpoint(collection)?)
            .header("Prefer", "return=representation")
            .json(&rows);

        let response = self.authorize(request).send().await?;
        let stored: Vec<Row> = Self::check(response, collection).await?.json().await?;
        Ok(stored)
    }

    async fn update(&self, collection: &str, id: Uuid, patch: Row) -> Result<()> {
        let request = self
            .client
            .patch(self.endpoint(collection)?)
            .query(&[filter_pair(&Filter::id(id))])
            .json(&patch);

        let response = self.authorize(request).send().await?;
        Self::check(response, collection).await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<()> {
        let request = self
            .client
            .delete(self.endpoint(collection)?)
            .query(&[filter_pair(filter)]);

        let response = self.authorize(request).send().await?;
        Self::check(response, collection).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_become_postgrest_pairs() {
        let id = Uuid::new_v4();
        assert_eq!(
            filter_pair(&Filter::id(id)),
            ("id".to_string(), format!("eq.{}", id))
        );
        assert_eq!(
            filter_pair(&Filter::eq("completed", true)),
            ("completed".to_string(), "eq.true".to_string())
        );
    }

    #[test]
    fn endpoints_live_under_rest_path() {
        let service = RestDataService::new(
            "https://example.supabase.co",
            "anon",
            AccessToken::default(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            service.endpoint("sub_tasks").unwrap().as_str(),
            "https://example.supabase.co/rest/v1/sub_tasks"
        );
    }
}
