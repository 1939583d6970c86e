use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::config::Config;
use crate::db::Repository;
use crate::epg::{EpgParser, FeedInput, ParseOptions, ParseOutcome, ProgressReporter};
use crate::error::Result;
use crate::feed::SourceFetcher;
use crate::models::{source_id_for, source_name_for};

/// Result of processing one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub url: String,
    pub channel_count: usize,
    pub program_count: usize,
    pub skipped_count: usize,
    pub success: bool,
}

impl SourceOutcome {
    fn succeeded(url: &str, outcome: ParseOutcome) -> Self {
        Self {
            url: url.to_string(),
            channel_count: outcome.channel_count,
            program_count: outcome.program_count,
            skipped_count: outcome.skipped_count,
            success: true,
        }
    }

    fn failed(url: &str) -> Self {
        Self {
            url: url.to_string(),
            channel_count: 0,
            program_count: 0,
            skipped_count: 0,
            success: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<SourceOutcome>,
    pub total_sources: usize,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }
}

/// Processes sources one at a time into a single store.
pub struct Ingestor {
    pub repository: Repository,
    fetcher: SourceFetcher,
    parser: EpgParser,
}

impl Ingestor {
    /// Builds the store, fetcher and parser from `config`, reporting pass
    /// progress to `reporter`.
    pub async fn new(config: &Config, reporter: Arc<dyn ProgressReporter>) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;
        let fetcher = SourceFetcher::new(&config.cache_dir, config.cache_ttl())?;
        let parser = EpgParser::new(
            ParseOptions {
                batch_size: config.batch_size,
                progress_interval: config.progress_interval(),
            },
            reporter,
        );

        Ok(Self::with_parts(repository, fetcher, parser))
    }

    pub fn with_parts(repository: Repository, fetcher: SourceFetcher, parser: EpgParser) -> Self {
        Self {
            repository,
            fetcher,
            parser,
        }
    }

    /// Processes every source in order. `cancel` is checked between sources.
    pub async fn run(&self, sources: &[String], cancel: &AtomicBool) -> RunSummary {
        let start = Instant::now();
        let mut summary = RunSummary {
            total_sources: sources.len(),
            ..RunSummary::default()
        };

        for (idx, source) in sources.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                tracing::warn!("Process interrupted by user, stopping before {}", source);
                summary.interrupted = true;
                break;
            }

            tracing::info!("Processing source {}/{}: {}", idx + 1, sources.len(), source);
            summary.outcomes.push(self.process_source(source).await);
        }

        summary.elapsed = start.elapsed();
        tracing::info!(
            "EPG parsing complete! Processed {}/{} sources in {:.1} seconds",
            summary.succeeded(),
            summary.total_sources,
            summary.elapsed.as_secs_f64()
        );

        tracing::info!("Optimizing database...");
        match self.repository.vacuum().await {
            Ok(()) => tracing::info!("Database optimization complete"),
            Err(e) => tracing::error!("Database optimization failed: {}", e),
        }

        summary
    }

    /// Rebuilds one source from scratch. Failures are logged and reported in
    /// the outcome so the caller can move on to the next source.
    pub async fn process_source(&self, url: &str) -> SourceOutcome {
        match self.rebuild_source(url).await {
            Ok(outcome) => {
                tracing::info!(
                    "Extracted {} channels and {} programs from {}",
                    outcome.channel_count,
                    outcome.program_count,
                    url
                );
                SourceOutcome::succeeded(url, outcome)
            }
            Err(e) => {
                tracing::error!("Error processing {}: {}", url, e);
                SourceOutcome::failed(url)
            }
        }
    }

    async fn rebuild_source(&self, url: &str) -> Result<ParseOutcome> {
        let source_id = source_id_for(url);
        let source_name = source_name_for(url);

        // Start from zero rows so the channel id set matches what is stored.
        self.repository.delete_source(&source_id).await?;
        tracing::info!("Deleted existing data for source: {}", source_name);

        let local_path = self.fetcher.acquire(url).await?;

        self.repository
            .insert_source(&source_id, &source_name, url)
            .await?;

        tracing::info!(
            "Parsing EPG file: {} (source: {})",
            local_path.display(),
            source_name
        );
        self.repository
            .parse_source(
                self.parser.clone(),
                FeedInput::from_path(local_path),
                source_id,
                source_name,
                Utc::now(),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epg::TracingReporter;
    use std::path::Path;
    use std::sync::Mutex;

    const FIRST_GUIDE: &str = r#"<tv>
  <channel id="c1"><display-name>One</display-name></channel>
  <channel id="c2"><display-name>Two</display-name></channel>
  <programme start="1" stop="2" channel="c1"><title>A</title></programme>
  <programme start="2" stop="3" channel="c1"><title>B</title></programme>
  <programme start="1" stop="2" channel="c2"><title>C</title></programme>
  <programme start="1" stop="2" channel="c3"><title>D</title></programme>
</tv>"#;

    const SECOND_GUIDE: &str = r#"<tv>
  <channel id="c1"><display-name>One</display-name></channel>
  <programme start="5" stop="6" channel="c1"><title>E</title></programme>
</tv>"#;

    async fn ingestor(dir: &Path) -> Ingestor {
        let repository = Repository::new(dir.join("epg.db").to_str().unwrap())
            .await
            .unwrap();
        let fetcher = SourceFetcher::new(dir.join("cache"), Duration::from_secs(3600)).unwrap();
        let parser = EpgParser::new(ParseOptions::default(), Arc::new(TracingReporter));
        Ingestor::with_parts(repository, fetcher, parser)
    }

    fn write(dir: &Path, name: &str, xml: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, xml).unwrap();
        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn processes_worked_example() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path()).await;
        let feed = write(dir.path(), "guide.xml", FIRST_GUIDE);

        let outcome = ingestor.process_source(&feed).await;

        assert_eq!(
            outcome,
            SourceOutcome {
                url: feed.clone(),
                channel_count: 2,
                program_count: 3,
                skipped_count: 1,
                success: true,
            }
        );
        let source = ingestor
            .repository
            .get_source(&source_id_for(&feed))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(source.name, "guide.xml");
        assert_eq!(source.url.as_deref(), Some(feed.as_str()));
    }

    #[tokio::test]
    async fn reprocessing_replaces_previous_rows() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path()).await;
        let feed = write(dir.path(), "guide.xml", FIRST_GUIDE);

        ingestor.process_source(&feed).await;
        let first = ingestor.repository.statistics().await.unwrap();
        ingestor.process_source(&feed).await;
        let again = ingestor.repository.statistics().await.unwrap();
        assert_eq!(
            (first.sources, first.channels, first.programs),
            (again.sources, again.channels, again.programs)
        );

        // Same origin, new content: nothing from the old content survives.
        write(dir.path(), "guide.xml", SECOND_GUIDE);
        let outcome = ingestor.process_source(&feed).await;
        assert_eq!((outcome.channel_count, outcome.program_count), (1, 1));

        let stats = ingestor.repository.statistics().await.unwrap();
        assert_eq!((stats.sources, stats.channels, stats.programs), (1, 1, 1));
        let programs = ingestor.repository.get_programs("c1").await.unwrap();
        assert_eq!(programs[0].title, "E");
    }

    #[tokio::test]
    async fn failing_source_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path()).await;
        let broken = write(dir.path(), "broken.xml", "<tv><channel id=\"x\"></tv>");
        let missing = dir.path().join("missing.xml").to_string_lossy().to_string();
        let good = write(dir.path(), "good.xml", SECOND_GUIDE);

        let summary = ingestor
            .run(&[broken, missing, good.clone()], &AtomicBool::new(false))
            .await;

        assert_eq!(summary.total_sources, 3);
        assert_eq!(summary.succeeded(), 1);
        assert!(!summary.interrupted);
        let successes: Vec<_> = summary.outcomes.iter().map(|o| o.success).collect();
        assert_eq!(successes, vec![false, false, true]);
        assert_eq!(summary.outcomes[2].url, good);
    }

    #[tokio::test]
    async fn cancelled_run_stops_before_next_source() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path()).await;
        let good = write(dir.path(), "good.xml", SECOND_GUIDE);

        let summary = ingestor.run(&[good], &AtomicBool::new(true)).await;

        assert!(summary.interrupted);
        assert!(summary.outcomes.is_empty());
        let stats = ingestor.repository.statistics().await.unwrap();
        assert_eq!(stats.sources, 0);
    }

    #[derive(Default)]
    struct CountingReporter {
        channels: Mutex<Vec<usize>>,
        programs: Mutex<Vec<(usize, usize)>>,
    }

    impl ProgressReporter for CountingReporter {
        fn channels_processed(&self, _source_name: &str, channel_count: usize) {
            self.channels.lock().unwrap().push(channel_count);
        }

        fn programs_processed(&self, _source_name: &str, program_count: usize, skipped_count: usize) {
            self.programs
                .lock()
                .unwrap()
                .push((program_count, skipped_count));
        }
    }

    #[tokio::test]
    async fn configured_ingestor_reports_to_injected_reporter() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir.path().join("epg.db").to_string_lossy().to_string(),
            cache_dir: dir.path().join("cache").to_string_lossy().to_string(),
            batch_size: 1,
            progress_interval_secs: 0,
            ..Config::default()
        };
        let reporter = Arc::new(CountingReporter::default());
        let ingestor = Ingestor::new(&config, reporter.clone()).await.unwrap();
        let feed = write(dir.path(), "guide.xml", FIRST_GUIDE);

        let outcome = ingestor.process_source(&feed).await;

        assert!(outcome.success);
        assert_eq!(*reporter.channels.lock().unwrap(), vec![1, 2]);
        assert_eq!(
            *reporter.programs.lock().unwrap(),
            vec![(1, 0), (2, 0), (3, 0)]
        );
    }
}
