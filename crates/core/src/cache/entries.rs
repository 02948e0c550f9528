//! Entry CRUD for the SQLite backend.
//!
//! Implements [`CacheStorage`] on [`CacheDb`]. Partitions live in their own
//! table so empty partitions survive, and deleting one cascades to its entries.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

use super::connection::CacheDb;
use super::entry::{StoredEntry, headers_from_json, headers_to_json};
use super::CacheStorage;
use crate::Error;
use crate::message::RequestKey;

/// Size summary of one partition.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PartitionStats {
    pub name: String,
    pub entries: u64,
    pub bytes: u64,
}

impl CacheDb {
    /// Entry count and stored body bytes for every partition.
    pub async fn partition_stats(&self) -> Result<Vec<PartitionStats>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<PartitionStats>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT p.name, COUNT(e.key_hash), COALESCE(SUM(e.body_size), 0)
                     FROM partitions p LEFT JOIN entries e ON e.partition = p.name
                     GROUP BY p.name ORDER BY p.name",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(PartitionStats {
                        name: row.get(0)?,
                        entries: row.get::<_, i64>(1)? as u64,
                        bytes: row.get::<_, i64>(2)? as u64,
                    })
                })?;

                let mut stats = Vec::new();
                for row in rows {
                    stats.push(row?);
                }
                Ok(stats)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl CacheStorage for CacheDb {
    async fn open(&self, partition: &str) -> Result<(), Error> {
        let partition = partition.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
                    params![partition, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn lookup(&self, partition: &str, key: &RequestKey) -> Result<Option<StoredEntry>, Error> {
        let partition = partition.to_string();
        let key_hash = key.digest();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<(i64, String, Vec<u8>)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT status_code, headers_json, body FROM entries WHERE partition = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![partition, key_hash], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                });

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((status, headers_json, body)) = row else {
            return Ok(None);
        };

        let status = u16::try_from(status)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| Error::InvalidInput(format!("stored status {status} for {key}")))?;

        Ok(Some(StoredEntry { status, headers: headers_from_json(&headers_json), body: Bytes::from(body) }))
    }

    async fn put(&self, partition: &str, key: &RequestKey, entry: StoredEntry) -> Result<(), Error> {
        let partition = partition.to_string();
        let key_hash = key.digest();
        let method = key.method().to_string();
        let url = key.url().to_string();
        let status = i64::from(entry.status.as_u16());
        let headers_json = headers_to_json(&entry.headers);
        let cached_at = entry.captured_at().unwrap_or_else(Utc::now).to_rfc3339();
        let body = entry.body.to_vec();
        let body_size = body.len() as i64;
        let now = Utc::now().to_rfc3339();
        let quota = self.quota_bytes;

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
                    params![partition, now],
                )?;

                if let Some(quota) = quota {
                    let used: i64 = tx.query_row(
                        "SELECT COALESCE(SUM(body_size), 0) FROM entries
                         WHERE NOT (partition = ?1 AND key_hash = ?2)",
                        params![partition, key_hash],
                        |row| row.get(0),
                    )?;
                    if (used + body_size) as u64 > quota {
                        return Err(Error::QuotaExceeded(format!(
                            "{body_size} bytes for {url} would exceed quota of {quota} ({used} used)"
                        )));
                    }
                }

                tx.execute(
                    "INSERT INTO entries (
                        partition, key_hash, method, url, status_code,
                        headers_json, body, body_size, cached_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(partition, key_hash) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status_code = excluded.status_code,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        body_size = excluded.body_size,
                        cached_at = excluded.cached_at",
                    params![partition, key_hash, method, url, status, headers_json, body, body_size, cached_at],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>, Error> {
        let partition = partition.to_string();
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<(String, String)>, Error> {
                let mut stmt =
                    conn.prepare("SELECT method, url FROM entries WHERE partition = ?1 ORDER BY cached_at ASC")?;
                let rows = stmt.query_map(params![partition], |row| Ok((row.get(0)?, row.get(1)?)))?;

                let mut keys = Vec::new();
                for row in rows {
                    keys.push(row?);
                }
                Ok(keys)
            })
            .await
            .map_err(Error::from)?;

        let mut keys = Vec::with_capacity(rows.len());
        for (method, url) in rows {
            match (Method::from_bytes(method.as_bytes()), Url::parse(&url)) {
                (Ok(method), Ok(url)) => keys.push(RequestKey::new(method, &url)),
                _ => tracing::warn!(%method, %url, "skipping unparsable stored key"),
            }
        }
        Ok(keys)
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY name")?;
                let rows = stmt.query_map([], |row| row.get(0))?;

                let mut names = Vec::new();
                for row in rows {
                    names.push(row?);
                }
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, partition: &str) -> Result<bool, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM partitions WHERE name = ?1", params![partition])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Request, Response};
    use http::header::{CONTENT_TYPE, HeaderValue};

    fn entry(body: &'static str) -> StoredEntry {
        let response = Response::new(StatusCode::OK, body)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        StoredEntry::capture(&response)
    }

    #[tokio::test]
    async fn test_put_and_lookup() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = Request::get("https://app.example.com/manifest.json").unwrap().key();

        db.put("shelter-static-v1", &key, entry("{}")).await.unwrap();

        let stored = db.lookup("shelter-static-v1", &key).await.unwrap().unwrap();
        assert_eq!(stored.status, StatusCode::OK);
        assert_eq!(stored.body.as_ref(), b"{}");
        assert_eq!(stored.headers.get(CONTENT_TYPE).unwrap(), "text/plain");
        assert!(stored.captured_at().is_some());
    }

    #[tokio::test]
    async fn test_non_utf8_header_survives_storage() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = Request::get("https://app.example.com/report.pdf").unwrap().key();
        let raw: &[u8] = b"attachment; filename=r\xe9sum\xe9.pdf";
        let response = Response::new(StatusCode::OK, "pdf")
            .with_header(http::header::CONTENT_DISPOSITION, HeaderValue::from_bytes(raw).unwrap());

        db.put("shelter-runtime-v1", &key, StoredEntry::capture(&response)).await.unwrap();

        let stored = db.lookup("shelter-runtime-v1", &key).await.unwrap().unwrap();
        assert_eq!(stored.headers.get(http::header::CONTENT_DISPOSITION).unwrap().as_bytes(), raw);
    }

    #[tokio::test]
    async fn test_lookup_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = Request::get("https://app.example.com/").unwrap().key();
        assert!(db.lookup("shelter-static-v1", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = Request::get("https://app.example.com/app.js").unwrap().key();

        db.put("p", &key, entry("old")).await.unwrap();
        db.put("p", &key, entry("new")).await.unwrap();

        let stored = db.lookup("p", &key).await.unwrap().unwrap();
        assert_eq!(stored.body.as_ref(), b"new");
        assert_eq!(db.keys("p").await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = Request::get("https://app.example.com/").unwrap().key();
        db.put("shelter-static-v1", &key, entry("shell")).await.unwrap();

        assert!(db.delete("shelter-static-v1").await.unwrap());
        assert!(db.names().await.unwrap().is_empty());

        db.open("shelter-static-v1").await.unwrap();
        assert!(db.lookup("shelter-static-v1", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_keeps_empty_partition() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open("shelter-runtime-v1").await.unwrap();
        db.open("shelter-runtime-v1").await.unwrap();
        assert_eq!(db.names().await.unwrap(), vec!["shelter-runtime-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_quota_exceeded() {
        let db = CacheDb::open_in_memory().await.unwrap().with_quota_bytes(8);
        let a = Request::get("https://app.example.com/a").unwrap().key();
        let b = Request::get("https://app.example.com/b").unwrap().key();

        db.put("p", &a, entry("12345")).await.unwrap();
        db.put("p", &a, entry("1234567")).await.unwrap();
        let result = db.put("p", &b, entry("1234")).await;
        assert!(matches!(result, Err(Error::QuotaExceeded(_))));
        assert!(db.lookup("p", &b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partition_stats() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = Request::get("https://app.example.com/").unwrap().key();
        db.put("a", &key, entry("hello")).await.unwrap();
        db.open("b").await.unwrap();

        let stats = db.partition_stats().await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "a");
        assert_eq!(stats[0].entries, 1);
        assert_eq!(stats[0].bytes, 5);
        assert_eq!(stats[1].entries, 0);
    }
}
