//! Generation and entry operations for the SQLite backend.

use std::collections::BTreeMap;

use bytes::Bytes;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::SqliteStorage;
use super::hash::RequestKey;
use super::storage::{CacheStorage, ensure_storable};
use crate::Error;
use crate::http::Response;

fn generation_exists(conn: &rusqlite::Connection, name: &str) -> Result<bool, Error> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM generations WHERE name = ?1)",
        params![name],
        |row| row.get(0),
    )
    .map_err(Error::from)
}

#[async_trait::async_trait]
impl CacheStorage for SqliteStorage {
    async fn open(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO generations (name, created_at) VALUES (?1, ?2)
                    ON CONFLICT(name) DO NOTHING",
                    params![name, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY rowid")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, Error> {
        let name = name.to_string();
        let key_hash = key.digest();
        self.conn
            .call(move |conn| -> Result<Option<Response>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT status, headers_json, body FROM entries
                    WHERE generation = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![name, key_hash], |row| {
                    Ok((row.get::<_, u16>(0)?, row.get::<_, String>(1)?, row.get::<_, Vec<u8>>(2)?))
                });

                match result {
                    Ok((status, headers_json, body)) => {
                        let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)
                            .map_err(|e| Error::Storage(format!("corrupt headers for {key_hash}: {e}")))?;
                        Ok(Some(Response { status, headers, body: Bytes::from(body) }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Uses UPSERT semantics so a key keeps its original position in
    /// `keys` when overwritten.
    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<(), Error> {
        ensure_storable(key, response)?;

        let name = name.to_string();
        let key = key.clone();
        let key_hash = key.digest();
        let status = response.status;
        let headers_json = serde_json::to_string(&response.headers)
            .map_err(|e| Error::Storage(format!("failed to encode headers: {e}")))?;
        let body = response.body.to_vec();
        let stored_at = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                if !generation_exists(conn, &name)? {
                    return Err(Error::UnknownGeneration(name));
                }
                conn.execute(
                    "INSERT INTO entries (
                        generation, key_hash, method, url, status, headers_json, body, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(generation, key_hash) DO UPDATE SET
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![name, key_hash, key.method, key.url, status, headers_json, body, stored_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self, name: &str) -> Result<Vec<RequestKey>, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<RequestKey>, Error> {
                if !generation_exists(conn, &name)? {
                    return Err(Error::UnknownGeneration(name));
                }
                let mut stmt = conn.prepare("SELECT method, url FROM entries WHERE generation = ?1 ORDER BY rowid")?;
                let keys = stmt
                    .query_map(params![name], |row| Ok(RequestKey { method: row.get(0)?, url: row.get(1)? }))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }
}
