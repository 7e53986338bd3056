// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! Loads the watchlist from the `criminal_records` table (spec §6). The
//! connection is owned exclusively by this module; `Tracker::process` never
//! touches it (§5).

use base::{err, Error};
use registry::{Embedding, WatchlistRecord};
use rustls::ClientConfig;
use tracing::{error, info};

/// Connection parameters, read from the environment per spec §6.
pub struct PgConfig {
    pub db: String,
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl PgConfig {
    pub fn from_env() -> Result<Self, Error> {
        let get = |name: &str| {
            std::env::var(name).map_err(|_| err!(FailedPrecondition, "missing environment variable {}", name))
        };
        Ok(PgConfig {
            db: get("PG_DB")?,
            username: get("PG_USERNAME")?,
            password: get("PG_PASSWORD")?,
            host: get("PG_HOST")?,
            port: get("PG_PORT")?
                .parse()
                .map_err(|_| err!(InvalidArgument, "PG_PORT is not a valid port number"))?,
        })
    }

    fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.db, self.username, self.password
        )
    }
}

/// Connects over TLS (required — no plaintext fallback) and spawns the
/// connection-driver task `tokio-postgres` needs running in the background.
pub async fn connect(cfg: &PgConfig) -> Result<tokio_postgres::Client, Error> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    let (client, connection) = tokio_postgres::connect(&cfg.connection_string(), tls)
        .await
        .map_err(|e| err!(Unavailable, "connecting to watchlist database: {}", e))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(err = %e, "watchlist database connection closed with an error");
        }
    });
    Ok(client)
}

const LOAD_QUERY: &str = "SELECT id, name, nickname, age, police_station, crime_and_section, \
                           head_of_crime, arrested_date, img_url, embedding FROM criminal_records";

/// Runs the `criminal_records` query and decodes each row's `embedding`
/// column into a fixed-size array. Connect/query failure is non-fatal to the
/// caller (spec §7) — it's surfaced as an `Err` here and the caller falls
/// back to an empty watchlist while logging.
pub async fn load_all(client: &tokio_postgres::Client) -> Result<Vec<WatchlistRecord>, Error> {
    let rows = client
        .query(LOAD_QUERY, &[])
        .await
        .map_err(|e| err!(Unavailable, "querying criminal_records: {}", e))?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let raw: Vec<f32> = row.get("embedding");
        let embedding: Embedding = raw
            .try_into()
            .map_err(|v: Vec<f32>| err!(Internal, "criminal_records row has a {}-d embedding, not 512", v.len()))?;
        records.push(WatchlistRecord {
            store_id: row.get("id"),
            name: row.get("name"),
            nickname: row.get("nickname"),
            age: row.get("age"),
            police_station: row.get("police_station"),
            crime_and_section: row.get("crime_and_section"),
            head_of_crime: row.get("head_of_crime"),
            arrested_date: row.get("arrested_date"),
            image_url: row.get("img_url"),
            embedding,
        });
    }
    info!(count = records.len(), "loaded watchlist from criminal_records");
    Ok(records)
}

/// Connects, loads, and disconnects in one call — used by `cmds::run` for
/// the initial load and by `/api/reload_db`. Never fails: a connect or query
/// error is logged and an empty watchlist is returned (spec §7).
pub async fn load_or_empty(cfg: &PgConfig) -> Vec<WatchlistRecord> {
    let client = match connect(cfg).await {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e.chain(), "watchlist database unreachable, running with an empty watchlist");
            return Vec::new();
        }
    };
    match load_all(&client).await {
        Ok(records) => records,
        Err(e) => {
            error!(err = %e.chain(), "failed loading watchlist, running with an empty watchlist");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_includes_all_fields() {
        let cfg = PgConfig {
            db: "facetrack".into(),
            username: "svc".into(),
            password: "secret".into(),
            host: "db.internal".into(),
            port: 5432,
        };
        let s = cfg.connection_string();
        assert!(s.contains("dbname=facetrack"));
        assert!(s.contains("host=db.internal"));
        assert!(s.contains("port=5432"));
    }
}
