// ABOUTME: HTTP client for the CRM REST API
// ABOUTME: Handles session auth, paginated queries, deleted-record windows, and error handling

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::models::{
    DeletedRecordsResponse, EntityMetadata, RecordPage, RemoteRecord, SessionResponse,
};
use crate::config::CrmCredentials;
use crate::session::SessionStore;
use crate::sync::engine::RemoteSource;

const SESSION_KEY: &str = "crm-session";

pub struct CrmClient {
    client: Client,
    base_url: String,
    credentials: CrmCredentials,
    sessions: SessionStore,
    supports_deletes: bool,
}

impl CrmClient {
    pub fn new(
        credentials: CrmCredentials,
        sessions: SessionStore,
        supports_deletes: bool,
    ) -> Result<Self> {
        let parsed = url::Url::parse(&credentials.base_url)
            .with_context(|| format!("Invalid CRM base URL: {}", credentials.base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("CRM base URL must be http or https: {}", credentials.base_url);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: credentials.base_url.trim_end_matches('/').to_string(),
            credentials,
            sessions,
            supports_deletes,
        })
    }

    /// Exchange credentials for a session token and cache it.
    pub async fn authenticate(&self) -> Result<String> {
        let url = format!("{}/auth/session", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "username": self.credentials.username,
                "password": self.credentials.password,
            }))
            .send()
            .await
            .context("Failed to reach the CRM authentication endpoint")?;

        if response.status() == StatusCode::UNAUTHORIZED {
            anyhow::bail!(
                "Authentication failed. Check CRM_USERNAME and CRM_PASSWORD for this instance"
            );
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("CRM authentication failed with status {}: {}", status, body);
        }

        let session: SessionResponse = response
            .json()
            .await
            .context("Failed to parse authentication response")?;

        self.sessions.put(SESSION_KEY, session.session_id.clone());
        tracing::debug!(
            "Authenticated against {} (session expires_in={:?})",
            self.base_url,
            session.expires_in
        );

        Ok(session.session_id)
    }

    async fn session_token(&self) -> Result<String> {
        if let Some(token) = self.sessions.get(SESSION_KEY) {
            return Ok(token);
        }
        self.authenticate().await
    }

    /// GET a JSON resource with a session token, re-authenticating once if the
    /// cached session has been invalidated server-side.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 0..2 {
            let token = self.session_token().await?;
            let response = self
                .client
                .get(&url)
                .query(query)
                .header("Authorization", format!("Bearer {}", token))
                .send()
                .await
                .with_context(|| format!("Failed to reach the CRM at {}", url))?;

            if response.status() == StatusCode::UNAUTHORIZED && attempt == 0 {
                tracing::debug!("CRM session rejected, re-authenticating");
                self.sessions.remove(SESSION_KEY);
                continue;
            }

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("CRM request {} failed with status {}: {}", url, status, body);
            }

            return response
                .json()
                .await
                .with_context(|| format!("Failed to parse CRM response from {}", url));
        }

        anyhow::bail!("CRM rejected the session for {} after re-authentication", url)
    }

    /// Drain a paginated record query, following `next_cursor` until the CRM
    /// reports no further pages.
    async fn fetch_paginated(
        &self,
        entity: &str,
        query: Vec<(&'static str, String)>,
    ) -> Result<Vec<RemoteRecord>> {
        let path = format!("/data/{}", entity);
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let mut page_query = query.clone();
            if let Some(ref c) = cursor {
                page_query.push(("cursor", c.clone()));
            }

            let page: RecordPage = self.get_json(&path, &page_query).await?;
            pages += 1;
            records.extend(page.records);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::debug!(
            "Fetched {} {} records in {} pages",
            records.len(),
            entity,
            pages
        );

        Ok(records)
    }

    /// Entity metadata, used by the validate command.
    pub async fn describe(&self, entity: &str) -> Result<EntityMetadata> {
        self.get_json(&format!("/meta/{}", entity), &[]).await
    }
}

#[async_trait]
impl RemoteSource for CrmClient {
    async fn fetch_all(&self, entity: &str, fields: &[&str]) -> Result<Vec<RemoteRecord>> {
        self.fetch_paginated(entity, vec![("fields", fields.join(","))])
            .await
            .with_context(|| format!("Failed to fetch all {} records", entity))
    }

    async fn fetch_updated_since(
        &self,
        entity: &str,
        since: DateTime<Utc>,
        fields: &[&str],
    ) -> Result<Vec<RemoteRecord>> {
        // The CRM filters on last-modified >= the bound and returns records in
        // ascending modification order.
        self.fetch_paginated(
            entity,
            vec![
                ("fields", fields.join(",")),
                ("modified_since", since.to_rfc3339()),
                ("order", "modified_asc".to_string()),
            ],
        )
        .await
        .with_context(|| format!("Failed to fetch {} records modified since {}", entity, since))
    }

    fn supports_deletes(&self) -> bool {
        self.supports_deletes
    }

    async fn fetch_deleted(
        &self,
        entity: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let response: DeletedRecordsResponse = self
            .get_json(
                &format!("/data/{}/deleted", entity),
                &[
                    ("start", start.to_rfc3339()),
                    ("end", end.to_rfc3339()),
                ],
            )
            .await
            .with_context(|| format!("Failed to fetch deleted {} records", entity))?;

        Ok(response.deleted_records.into_iter().map(|d| d.id).collect())
    }
}
