use anyhow::Result;
use rusqlite::Connection;

use crate::model::{Intervention, TeamMember};

const DB_PATH: &str = "data/rapport.sqlite";

pub fn connect() -> Result<Connection> {
    if let Some(dir) = std::path::Path::new(DB_PATH).parent() {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS clients (
            id         INTEGER PRIMARY KEY,
            name       TEXT UNIQUE NOT NULL,
            export_url TEXT NOT NULL,
            fetched    BOOLEAN NOT NULL DEFAULT 0,
            fetched_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_clients_fetched ON clients(fetched);

        CREATE TABLE IF NOT EXISTS transcripts (
            id         INTEGER PRIMARY KEY,
            client_id  INTEGER NOT NULL REFERENCES clients(id),
            client     TEXT NOT NULL,
            raw_json   TEXT,
            error      TEXT,
            latency_ms INTEGER,
            processed  BOOLEAN NOT NULL DEFAULT 0,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_transcripts_client ON transcripts(client);
        CREATE INDEX IF NOT EXISTS idx_transcripts_processed ON transcripts(processed);

        CREATE TABLE IF NOT EXISTS interventions (
            id               INTEGER PRIMARY KEY,
            client           TEXT NOT NULL,
            author_email     TEXT NOT NULL,
            author_name      TEXT NOT NULL,
            day              TEXT NOT NULL,
            start_time       TEXT NOT NULL,
            last_time        TEXT NOT NULL,
            raw_text         TEXT NOT NULL,
            display_date     TEXT NOT NULL,
            date_source      TEXT NOT NULL CHECK(date_source IN ('extracted','timestamp')),
            has_before_after BOOLEAN NOT NULL DEFAULT 0,
            category         TEXT NOT NULL,
            title            TEXT,
            enhanced_text    TEXT,
            image_count      INTEGER NOT NULL DEFAULT 0,
            UNIQUE(client, author_email, day)
        );
        CREATE INDEX IF NOT EXISTS idx_interventions_client ON interventions(client);
        CREATE INDEX IF NOT EXISTS idx_interventions_day ON interventions(day);

        CREATE TABLE IF NOT EXISTS intervention_images (
            id              INTEGER PRIMARY KEY,
            intervention_id INTEGER NOT NULL REFERENCES interventions(id),
            name            TEXT NOT NULL,
            content_type    TEXT NOT NULL,
            section         TEXT NOT NULL CHECK(section IN ('before','after','regular'))
        );
        CREATE INDEX IF NOT EXISTS idx_images_intervention ON intervention_images(intervention_id);

        CREATE TABLE IF NOT EXISTS team_members (
            id         INTEGER PRIMARY KEY,
            client     TEXT NOT NULL,
            member_key TEXT NOT NULL,
            name       TEXT NOT NULL,
            email      TEXT,
            UNIQUE(client, member_key)
        );
        CREATE INDEX IF NOT EXISTS idx_team_client ON team_members(client);
        ",
    )?;
    Ok(())
}

// ── Clients / fetching ──

pub fn upsert_clients(conn: &Connection, clients: &[(String, String)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt =
            tx.prepare("INSERT OR IGNORE INTO clients (name, export_url) VALUES (?1, ?2)")?;
        for (name, url) in clients {
            count += stmt.execute(rusqlite::params![name, url])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_unfetched(
    conn: &Connection,
    limit: Option<usize>,
) -> Result<Vec<(i64, String, String)>> {
    let sql = match limit {
        Some(n) => format!(
            "SELECT id, name, export_url FROM clients WHERE fetched = 0 ORDER BY id LIMIT {}",
            n
        ),
        None => "SELECT id, name, export_url FROM clients WHERE fetched = 0 ORDER BY id".to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct TranscriptRow {
    pub client_id: i64,
    pub client: String,
    pub raw_json: Option<String>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

pub fn save_transcript(conn: &Connection, row: &TranscriptRow) -> Result<()> {
    conn.execute(
        "INSERT INTO transcripts (client_id, client, raw_json, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![row.client_id, row.client, row.raw_json, row.error, row.latency_ms],
    )?;
    conn.execute(
        "UPDATE clients SET fetched = 1, fetched_at = datetime('now') WHERE id = ?1",
        rusqlite::params![row.client_id],
    )?;
    Ok(())
}

// ── Processing ──

pub struct StoredTranscript {
    pub id: i64,
    pub client: String,
    pub raw_json: String,
}

pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<StoredTranscript>> {
    let sql = format!(
        "SELECT id, client, raw_json FROM transcripts
         WHERE raw_json IS NOT NULL AND processed = 0
         ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredTranscript {
                id: row.get(0)?,
                client: row.get(1)?,
                raw_json: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Save one processed transcript's output and mark it done.
pub fn save_processed(
    conn: &Connection,
    transcript_id: i64,
    client: &str,
    interventions: &[Intervention],
    team: &[TeamMember],
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut i_stmt = tx.prepare(
            "INSERT OR REPLACE INTO interventions
             (client, author_email, author_name, day, start_time, last_time, raw_text,
              display_date, date_source, has_before_after, category, title, enhanced_text,
              image_count)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
        )?;
        let mut img_stmt = tx.prepare(
            "INSERT INTO intervention_images (intervention_id, name, content_type, section)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for i in interventions {
            i_stmt.execute(rusqlite::params![
                client,
                i.author_id,
                i.author_name,
                i.day.to_string(),
                i.start_time.to_rfc3339(),
                i.last_time.to_rfc3339(),
                i.raw_text,
                i.display_date.to_string(),
                i.date_source.as_str(),
                i.has_before_after,
                i.category,
                i.title,
                i.enhanced_text,
                i.images.len() as i64,
            ])?;
            let intervention_id = tx.last_insert_rowid();
            let sections = [
                ("before", &i.before_images),
                ("after", &i.after_images),
                ("regular", &i.regular_images),
            ];
            for (section, images) in sections {
                for img in images.iter() {
                    img_stmt.execute(rusqlite::params![
                        intervention_id,
                        img.name,
                        img.content_type,
                        section,
                    ])?;
                }
            }
        }

        let mut t_stmt = tx.prepare(
            "INSERT OR IGNORE INTO team_members (client, member_key, name, email)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for member in team {
            let key = match &member.email {
                Some(email) => email.clone(),
                None => format!("mention_{}", member.name.to_lowercase().replace(' ', "_")),
            };
            t_stmt.execute(rusqlite::params![client, key, member.name, member.email])?;
        }

        tx.execute(
            "UPDATE transcripts SET processed = 1 WHERE id = ?1",
            rusqlite::params![transcript_id],
        )?;
    }
    tx.commit()?;
    Ok(())
}

// ── Overview ──

pub struct OverviewRow {
    pub client: String,
    pub author_name: String,
    pub display_date: String,
    pub date_source: String,
    pub category: String,
    pub image_count: i64,
    pub has_before_after: bool,
}

pub fn fetch_overview(
    conn: &Connection,
    client: Option<&str>,
    author: Option<&str>,
    limit: usize,
) -> Result<Vec<OverviewRow>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(c) = client {
        conditions.push(format!("client = ?{}", params.len() + 1));
        params.push(Box::new(c.to_string()));
    }
    if let Some(a) = author {
        conditions.push(format!("author_name LIKE ?{}", params.len() + 1));
        params.push(Box::new(format!("%{}%", a)));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT client, author_name, display_date, date_source, category,
                image_count, has_before_after
         FROM interventions{}
         ORDER BY display_date DESC, client, author_name
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(OverviewRow {
                client: row.get(0)?,
                author_name: row.get(1)?,
                display_date: row.get(2)?,
                date_source: row.get(3)?,
                category: row.get(4)?,
                image_count: row.get(5)?,
                has_before_after: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub clients: usize,
    pub fetched: usize,
    pub unfetched: usize,
    pub transcripts: usize,
    pub errors: usize,
    pub interventions: usize,
    pub team_members: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let clients: usize = conn.query_row("SELECT COUNT(*) FROM clients", [], |r| r.get(0))?;
    let fetched: usize =
        conn.query_row("SELECT COUNT(*) FROM clients WHERE fetched = 1", [], |r| r.get(0))?;
    let transcripts: usize =
        conn.query_row("SELECT COUNT(*) FROM transcripts", [], |r| r.get(0))?;
    let errors: usize = conn.query_row(
        "SELECT COUNT(*) FROM transcripts WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let interventions: usize =
        conn.query_row("SELECT COUNT(*) FROM interventions", [], |r| r.get(0))?;
    let team_members: usize =
        conn.query_row("SELECT COUNT(*) FROM team_members", [], |r| r.get(0))?;
    Ok(Stats {
        clients,
        fetched,
        unfetched: clients - fetched,
        transcripts,
        errors,
        interventions,
        team_members,
    })
}
