use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::epg::{EpgParser, FeedInput, ParseOutcome};
use crate::error::Result;
use crate::models::{Channel, ChannelMatch, DbStatistics, Program, Source, SourceDetail};

use super::schema::{PRAGMAS, SCHEMA};

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        tracing::info!("Database initialized at {}", db_path);
        Ok(Self { conn })
    }

    // Source operations

    /// Deletes a source; its channels and programs go with it.
    pub async fn delete_source(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute("DELETE FROM sources WHERE id = ?1", params![id])?;
                Ok(deleted > 0)
            })
            .await?;
        Ok(deleted)
    }

    pub async fn insert_source(&self, id: &str, name: &str, url: &str) -> Result<()> {
        let (id, name, url) = (id.to_string(), name.to_string(), url.to_string());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sources (id, name, url, channel_count, program_count) VALUES (?1, ?2, ?3, 0, 0)",
                    params![id, name, url],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        let id = id.to_string();
        let source = self
            .conn
            .call(move |conn| {
                let source = conn
                    .query_row(
                        "SELECT id, name, url, file_path, channel_count, program_count, last_updated FROM sources WHERE id = ?1",
                        params![id],
                        source_from_row,
                    )
                    .optional()?;
                Ok(source)
            })
            .await?;
        Ok(source)
    }

    /// Runs both extraction passes for a source on the database thread.
    pub async fn parse_source(
        &self,
        parser: EpgParser,
        input: FeedInput,
        source_id: String,
        source_name: String,
        updated_at: DateTime<Utc>,
    ) -> Result<ParseOutcome> {
        let outcome = self
            .conn
            .call(move |conn| Ok(parser.parse(conn, &input, &source_id, &source_name, updated_at)))
            .await??;
        Ok(outcome)
    }

    // Channel and program queries

    pub async fn get_channels(&self, source_id: &str) -> Result<Vec<Channel>> {
        let source_id = source_id.to_string();
        let channels = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, source_id, name, icon FROM channels WHERE source_id = ?1 ORDER BY id",
                )?;
                let channels = stmt
                    .query_map(params![source_id], channel_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(channels)
            })
            .await?;
        Ok(channels)
    }

    pub async fn get_programs(&self, channel_id: &str) -> Result<Vec<Program>> {
        let channel_id = channel_id.to_string();
        let programs = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, channel_id, title, description, start, stop, category
                       FROM programs WHERE channel_id = ?1 ORDER BY start"#,
                )?;
                let programs = stmt
                    .query_map(params![channel_id], program_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(programs)
            })
            .await?;
        Ok(programs)
    }

    pub async fn search_channels(&self, term: &str, limit: usize) -> Result<Vec<ChannelMatch>> {
        let pattern = format!("%{}%", term);
        let limit = limit as i64;
        let matches = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT c.id, c.name, c.icon, s.name AS source_name,
                              (SELECT COUNT(*) FROM programs WHERE channel_id = c.id) AS program_count
                       FROM channels c
                       JOIN sources s ON c.source_id = s.id
                       WHERE c.name LIKE ?1
                       ORDER BY c.name
                       LIMIT ?2"#,
                )?;
                let matches = stmt
                    .query_map(params![pattern, limit], |row| {
                        Ok(ChannelMatch {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            icon: row.get(2)?,
                            source_name: row.get(3)?,
                            program_count: row.get(4)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(matches)
            })
            .await?;
        Ok(matches)
    }

    // Maintenance

    pub async fn statistics(&self) -> Result<DbStatistics> {
        let stats = self
            .conn
            .call(|conn| {
                let count = |table: &str| -> rusqlite::Result<i64> {
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                };
                let sources = count("sources")?;
                let channels = count("channels")?;
                let programs = count("programs")?;

                let mut stmt = conn.prepare(
                    r#"SELECT name, url, channel_count, program_count, last_updated
                       FROM sources
                       ORDER BY channel_count DESC"#,
                )?;
                let source_details = stmt
                    .query_map([], |row| {
                        Ok(SourceDetail {
                            name: row.get(0)?,
                            url: row.get(1)?,
                            channel_count: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                            program_count: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                            last_updated: row
                                .get::<_, Option<String>>(4)?
                                .and_then(|s| parse_datetime(&s)),
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                Ok(DbStatistics {
                    sources,
                    channels,
                    programs,
                    source_details,
                })
            })
            .await?;
        Ok(stats)
    }

    pub async fn vacuum(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch("VACUUM")?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // RFC3339 as written by the parser (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn source_from_row(row: &Row) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        file_path: row.get(3)?,
        channel_count: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        program_count: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        last_updated: row
            .get::<_, Option<String>>(6)?
            .and_then(|s| parse_datetime(&s)),
    })
}

fn channel_from_row(row: &Row) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        source_id: row.get(1)?,
        name: row.get(2)?,
        icon: row.get(3)?,
    })
}

fn program_from_row(row: &Row) -> rusqlite::Result<Program> {
    Ok(Program {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        start: row.get(4)?,
        stop: row.get(5)?,
        category: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epg::reader::tests::write_feed;
    use chrono::TimeZone;

    const GUIDE: &str = r#"<tv>
  <channel id="news.one"><display-name>News One</display-name><icon src="n1.png"/></channel>
  <channel id="sport.two"><display-name>Sport Two</display-name></channel>
  <programme start="20240101060000 +0000" stop="20240101070000 +0000" channel="news.one"><title>Breakfast</title></programme>
  <programme start="20240101070000 +0000" stop="20240101080000 +0000" channel="news.one"><title>Headlines</title><category>News</category></programme>
  <programme start="20240101060000 +0000" stop="20240101090000 +0000" channel="sport.two"><title>Match</title></programme>
</tv>"#;

    async fn repository(dir: &tempfile::TempDir) -> Repository {
        let path = dir.path().join("data").join("epg.db");
        Repository::new(path.to_str().unwrap()).await.unwrap()
    }

    async fn load(repo: &Repository, dir: &tempfile::TempDir) -> ParseOutcome {
        let input = write_feed(dir, "guide.xml", GUIDE, false);
        repo.insert_source("s1", "guide.xml", "https://example.com/guide.xml")
            .await
            .unwrap();
        repo.parse_source(
            EpgParser::default(),
            input,
            "s1".to_string(),
            "guide.xml".to_string(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn parse_source_populates_store() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir).await;

        let outcome = load(&repo, &dir).await;
        assert_eq!((outcome.channel_count, outcome.program_count, outcome.skipped_count), (2, 3, 0));

        let source = repo.get_source("s1").await.unwrap().unwrap();
        assert_eq!(source.channel_count, 2);
        assert_eq!(source.program_count, 3);
        assert_eq!(
            source.last_updated,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert!(source.file_path.unwrap().ends_with("guide.xml"));

        let channels = repo.get_channels("s1").await.unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].icon.as_deref(), Some("n1.png"));

        let programs = repo.get_programs("news.one").await.unwrap();
        let titles: Vec<_> = programs.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Breakfast", "Headlines"]);
        assert_eq!(programs[1].category.as_deref(), Some("News"));
    }

    #[tokio::test]
    async fn deleting_source_cascades() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir).await;
        load(&repo, &dir).await;

        assert!(repo.delete_source("s1").await.unwrap());
        assert!(!repo.delete_source("s1").await.unwrap());

        let stats = repo.statistics().await.unwrap();
        assert_eq!((stats.sources, stats.channels, stats.programs), (0, 0, 0));
        assert!(repo.get_programs("news.one").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn statistics_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir).await;
        load(&repo, &dir).await;
        repo.insert_source("s2", "empty.xml", "empty.xml").await.unwrap();

        let stats = repo.statistics().await.unwrap();
        assert_eq!((stats.sources, stats.channels, stats.programs), (2, 2, 3));
        assert_eq!(stats.source_details[0].name, "guide.xml");
        assert_eq!(stats.source_details[1].channel_count, 0);
        assert!(stats.source_details[1].last_updated.is_none());

        let matches = repo.search_channels("sport", 100).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "sport.two");
        assert_eq!(matches[0].source_name, "guide.xml");
        assert_eq!(matches[0].program_count, 1);

        assert_eq!(repo.search_channels("o", 1).await.unwrap().len(), 1);

        repo.vacuum().await.unwrap();
        assert!(repo.get_source("s2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn digit_only_times_are_stored_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir).await;
        let input = write_feed(
            &dir,
            "bare.xml",
            r#"<tv>
  <channel id="c1"><display-name>One</display-name></channel>
  <programme start="0600" stop="0700" channel="c1"><title>Short form</title></programme>
  <programme start="20240101060000" stop="20240101070000" channel="c1"><title>No offset</title></programme>
</tv>"#,
            false,
        );
        repo.insert_source("s1", "bare.xml", "bare.xml").await.unwrap();
        repo.parse_source(
            EpgParser::default(),
            input,
            "s1".to_string(),
            "bare.xml".to_string(),
            Utc::now(),
        )
        .await
        .unwrap();

        let programs = repo.get_programs("c1").await.unwrap();
        let times: Vec<_> = programs
            .iter()
            .map(|p| (p.start.as_str(), p.stop.as_str()))
            .collect();
        assert_eq!(times, vec![("0600", "0700"), ("20240101060000", "20240101070000")]);
        assert_eq!(programs[0].id, "c1_0600_0700");
    }

    #[test]
    fn parses_stored_timestamps() {
        assert!(parse_datetime("2024-01-01T12:00:00+00:00").is_some());
        assert!(parse_datetime("2024-01-01 12:00:00").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }
}
