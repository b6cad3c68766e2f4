//! `PostgREST` access to the `bookmarks` table.
//!
//! Row-level security on the server scopes rows to the token's user; the
//! explicit `user_id` filter keeps the read correct without it.

use async_trait::async_trait;
use tracing::debug;

use super::{SupabaseClient, query_failed, realtime};
use crate::backend::{BackendError, BookmarkBackend, ChangeSubscription};
use crate::model::{Bookmark, BookmarkId, ChangeFilter, NewBookmark, UserId};

pub(crate) const TABLE: &str = "bookmarks";

/// Table URL with the given query pairs, each value URL-encoded.
pub(crate) fn table_url(base_url: &str, pairs: &[(&str, String)]) -> Result<String, BackendError> {
    let mut url = reqwest::Url::parse(&format!("{base_url}/rest/v1/{TABLE}"))
        .map_err(|e| BackendError::Request(format!("table url: {e}")))?;
    if !pairs.is_empty() {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, value);
        }
    }
    Ok(url.into())
}

pub(crate) fn list_query(user_id: UserId) -> Vec<(&'static str, String)> {
    vec![
        ("select", "*".to_owned()),
        ("user_id", format!("eq.{user_id}")),
        ("order", "created_at.desc".to_owned()),
    ]
}

pub(crate) fn delete_query(id: &BookmarkId) -> Vec<(&'static str, String)> {
    vec![("id", format!("eq.{id}"))]
}

pub(crate) fn parse_rows(body: &str) -> Result<Vec<Bookmark>, BackendError> {
    serde_json::from_str(body).map_err(|e| BackendError::Parse(format!("bookmark rows: {e}")))
}

impl SupabaseClient {
    fn table_request(
        &self,
        method: reqwest::Method,
        url: &str,
        access_token: &str,
    ) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
    }
}

#[async_trait]
impl BookmarkBackend for SupabaseClient {
    async fn list_bookmarks(&self, user_id: UserId) -> Result<Vec<Bookmark>, BackendError> {
        let token = self.valid_access_token().await?;
        let url = table_url(&self.base_url, &list_query(user_id))?;

        let response = self
            .table_request(reqwest::Method::GET, &url, &token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(query_failed(response).await);
        }

        let rows = parse_rows(&response.text().await?)?;
        debug!(%user_id, count = rows.len(), "bookmarks listed");
        Ok(rows)
    }

    async fn insert_bookmark(&self, bookmark: &NewBookmark) -> Result<(), BackendError> {
        let token = self.valid_access_token().await?;
        let url = table_url(&self.base_url, &[])?;

        let response = self
            .table_request(reqwest::Method::POST, &url, &token)
            .header("Prefer", "return=minimal")
            .json(bookmark)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(query_failed(response).await);
        }
        debug!(user_id = %bookmark.user_id, "bookmark inserted");
        Ok(())
    }

    async fn delete_bookmark(&self, id: &BookmarkId) -> Result<(), BackendError> {
        let token = self.valid_access_token().await?;
        let url = table_url(&self.base_url, &delete_query(id))?;

        let response = self
            .table_request(reqwest::Method::DELETE, &url, &token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(query_failed(response).await);
        }
        debug!(%id, "bookmark deleted");
        Ok(())
    }

    async fn subscribe_changes(&self, user_id: UserId, filter: ChangeFilter) -> Result<ChangeSubscription, BackendError> {
        let token = self.valid_access_token().await?;
        let url = realtime::socket_url(&self.base_url, &self.anon_key)?;
        Ok(realtime::subscribe(url, self.heartbeat, user_id, filter, token))
    }
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;
