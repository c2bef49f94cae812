//! Firebase-style REST replica.
//!
//! Every path maps to `{base}/{path}.json`, optionally authenticated with an
//! `auth` query parameter. Reads are `GET`, writes are `PUT`/`PATCH`/
//! `DELETE`/`POST`. Subscriptions poll the path and emit only when the value
//! changes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ReplicaStore, Subscription};
use crate::controller::normalize_base_url;
use crate::error::{Error, Result};

/// Body returned by `POST`.
#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

/// A [`ReplicaStore`] reached over HTTP.
#[derive(Debug, Clone)]
pub struct RestReplica {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    poll_interval: Duration,
}

impl RestReplica {
    /// Create a replica client for `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
            auth_token: None,
            poll_interval: Duration::from_secs(2),
        })
    }

    /// Authenticate requests with `token`.
    #[must_use]
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// How often subscriptions poll.
    #[must_use]
    pub fn poll_interval(mut self, every: Duration) -> Self {
        self.poll_interval = every;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        match &self.auth_token {
            Some(token) => format!("{}/{}.json?auth={}", self.base_url, path, token),
            None => format!("{}/{}.json", self.base_url, path),
        }
    }

    async fn fetch(&self, path: &str) -> Result<Value> {
        let response = self.client.get(self.url(path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
            });
        }
        Ok(response.json::<Value>().await?)
    }

    async fn send_write(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(Error::HttpStatus {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl ReplicaStore for RestReplica {
    async fn get(&self, path: &str) -> Result<Value> {
        self.fetch(path).await
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        debug!("PUT {}", path);
        self.send_write(self.client.put(self.url(path)).json(&value))
            .await
            .map_err(|e| Error::remote_write(path, e))?;
        Ok(())
    }

    async fn update(&self, path: &str, children: Map<String, Value>) -> Result<()> {
        debug!("PATCH {} ({} children)", path, children.len());
        self.send_write(self.client.patch(self.url(path)).json(&children))
            .await
            .map_err(|e| Error::remote_write(path, e))?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        debug!("DELETE {}", path);
        self.send_write(self.client.delete(self.url(path)))
            .await
            .map_err(|e| Error::remote_write(path, e))?;
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> Result<String> {
        debug!("POST {}", path);
        let response = self
            .send_write(self.client.post(self.url(path)).json(&value))
            .await
            .map_err(|e| Error::remote_write(path, e))?;
        let body: PushResponse = response
            .json()
            .await
            .map_err(|e| Error::remote_write(path, e))?;
        Ok(body.name)
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription> {
        // Fail fast if the path is unreachable; later poll errors are logged.
        let initial = self.fetch(path).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let task_token = cancel_token.clone();
        let replica = self.clone();
        let task_path = path.to_string();

        let _ = tx.send(initial.clone());
        tokio::spawn(async move {
            let mut last = initial;
            let mut ticker = interval(replica.poll_interval);
            // The first tick completes immediately; the initial value is already sent.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!("Subscription on {} disposed", task_path);
                        break;
                    }
                    _ = ticker.tick() => {
                        match replica.fetch(&task_path).await {
                            Ok(value) if value != last => {
                                last = value.clone();
                                if tx.send(value).is_err() {
                                    debug!("Subscriber for {} dropped, stopping", task_path);
                                    break;
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Polling {} failed: {}", task_path, e),
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(path, rx, cancel_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Json;
    use serde_json::json;

    type Tree = Arc<Mutex<HashMap<String, Value>>>;

    async fn fake_server(tree: Tree) -> String {
        let router = Router::new()
            .route(
                "/{*path}",
                get(
                    |State(tree): State<Tree>, Path(path): Path<String>| async move {
                        let value = tree.lock().unwrap().get(&path).cloned();
                        Json(value.unwrap_or(Value::Null))
                    },
                )
                .put(
                    |State(tree): State<Tree>,
                     Path(path): Path<String>,
                     Query(q): Query<HashMap<String, String>>,
                     Json(body): Json<Value>| async move {
                        if q.get("auth").map(String::as_str) == Some("bad") {
                            return StatusCode::UNAUTHORIZED;
                        }
                        tree.lock().unwrap().insert(path, body);
                        StatusCode::OK
                    },
                )
                .post(|| async { Json(json!({"name": "-key1"})) })
                .delete(|State(tree): State<Tree>, Path(path): Path<String>| async move {
                    tree.lock().unwrap().remove(&path);
                    StatusCode::OK
                }),
            )
            .with_state(tree);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_url_building() {
        let replica = RestReplica::new("https://db.example.com/").unwrap();
        assert_eq!(
            replica.url("/devices/u1/"),
            "https://db.example.com/devices/u1.json"
        );
        let replica = replica.auth_token("t0k");
        assert_eq!(
            replica.url("rooms/u1"),
            "https://db.example.com/rooms/u1.json?auth=t0k"
        );
        assert!(RestReplica::new("db.example.com").is_err());
    }

    #[tokio::test]
    async fn test_put_get_delete_push() {
        let tree = Tree::default();
        let base = fake_server(tree.clone()).await;
        let replica = RestReplica::new(&base).unwrap();

        replica
            .set("devices/u1/led-1", json!({"isOn": true}))
            .await
            .unwrap();
        assert!(tree.lock().unwrap().contains_key("devices/u1/led-1.json"));
        assert_eq!(
            replica.get("devices/u1/led-1").await.unwrap(),
            json!({"isOn": true})
        );

        assert_eq!(
            replica.push("deviceHistory/u1", json!({})).await.unwrap(),
            "-key1"
        );

        replica.remove("devices/u1/led-1").await.unwrap();
        assert_eq!(replica.get("devices/u1/led-1").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_rejected_write_is_remote_write_failure() {
        let base = fake_server(Tree::default()).await;
        let replica = RestReplica::new(&base).unwrap().auth_token("bad");
        let err = replica.set("x", json!(1)).await.unwrap_err();
        assert!(matches!(err, Error::RemoteWriteFailed { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_polling_subscription_emits_changes_only() {
        let tree = Tree::default();
        let base = fake_server(tree.clone()).await;
        let replica = RestReplica::new(&base)
            .unwrap()
            .poll_interval(Duration::from_millis(20));

        let mut sub = replica.subscribe("devices/u1").await.unwrap();
        assert_eq!(sub.next_value().await.unwrap(), Value::Null);

        tree.lock()
            .unwrap()
            .insert("devices/u1.json".into(), json!({"a": {"isOn": true}}));
        let next = tokio::time::timeout(Duration::from_secs(2), sub.next_value())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, json!({"a": {"isOn": true}}));

        sub.dispose();
        assert!(sub.next_value().await.is_none());
    }
}
