use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::TranscriptRow;

const CONCURRENCY: usize = 4;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Download transcript exports concurrently, saving each to the DB as it
/// arrives. `CHAT_API_TOKEN` is sent as a bearer token when set.
pub async fn fetch_transcripts(
    conn: &Connection,
    clients: Vec<(i64, String, String)>,
) -> Result<FetchStats> {
    let token = std::env::var("CHAT_API_TOKEN").ok();
    let http = Arc::new(
        reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?,
    );
    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let total = clients.len();

    let (tx, mut rx) = tokio::sync::mpsc::channel::<TranscriptRow>(CONCURRENCY * 2);

    for (client_id, client, url) in clients {
        let http = Arc::clone(&http);
        let sem = Arc::clone(&semaphore);
        let token = token.clone();
        let tx = tx.clone();

        tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            let row = fetch_with_retry(&http, token.as_deref(), client_id, &client, &url).await;
            let _ = tx.send(row).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;
    while let Some(row) = rx.recv().await {
        if row.error.is_some() {
            errors += 1;
        } else {
            ok += 1;
        }
        crate::db::save_transcript(conn, &row)?;
    }

    info!("fetched {} transcripts ({} ok, {} errors)", total, ok, errors);
    Ok(FetchStats { total, ok, errors })
}

async fn fetch_with_retry(
    http: &reqwest::Client,
    token: Option<&str>,
    client_id: i64,
    client: &str,
    url: &str,
) -> TranscriptRow {
    for attempt in 0..=MAX_RETRIES {
        let row = fetch_one(http, token, client_id, client, url).await;

        let should_retry = matches!(
            &row.error,
            Some(e) if e.contains("429") || e.contains("500") || e.contains("502") || e.contains("503")
        );
        if !should_retry || attempt == MAX_RETRIES {
            return row;
        }

        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "transient error for {} (attempt {}/{}), backing off {:.1}s",
            client,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
    }

    fetch_one(http, token, client_id, client, url).await
}

async fn fetch_one(
    http: &reqwest::Client,
    token: Option<&str>,
    client_id: i64,
    client: &str,
    url: &str,
) -> TranscriptRow {
    let start = Instant::now();
    let mut request = http.get(url);
    if let Some(t) = token {
        request = request.bearer_auth(t);
    }

    let result = async {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("export returned {}", status.as_u16());
        }
        response.text().await.map_err(anyhow::Error::from)
    }
    .await;
    let elapsed = start.elapsed().as_millis() as i64;

    match result {
        Ok(body) => TranscriptRow {
            client_id,
            client: client.to_string(),
            raw_json: Some(body),
            error: None,
            latency_ms: Some(elapsed),
        },
        Err(e) => TranscriptRow {
            client_id,
            client: client.to_string(),
            raw_json: None,
            error: Some(e.to_string()),
            latency_ms: Some(elapsed),
        },
    }
}
