//! Paginated address-history crawl that persists anchor records until stopped.

use crate::chain::AddressHistory;
use crate::crawl::decode::decode_anchor;
use crate::ledger::{AnchorCsvWriter, LedgerError};
use std::collections::HashSet;
use std::io::Write;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const DEFAULT_PAGE_SIZE: u32 = 50;
const DEFAULT_PAGE_INTERVAL: Duration = Duration::from_secs(20);
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct CrawlConfig {
    pub address: String,
    pub page_size: u32,
    pub start_offset: u64,
    /// Pause after every successfully fetched page.
    pub page_interval: Duration,
    /// Pause before retrying a failed fetch at the same offset.
    pub retry_backoff: Duration,
}

impl CrawlConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            page_size: DEFAULT_PAGE_SIZE,
            start_offset: 0,
            page_interval: DEFAULT_PAGE_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("persist: {0}")]
    Persist(#[from] LedgerError),
}

/// Outcome of one fetch-decode-persist cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Page { fetched: usize, accepted: usize },
    /// Fetch failed; offset unchanged.
    Retry,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub pages: u64,
    pub fetch_failures: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub duplicates: u64,
}

pub struct Crawler<H, W: Write> {
    history: H,
    sink: AnchorCsvWriter<W>,
    config: CrawlConfig,
    offset: u64,
    seen: HashSet<String>,
    stats: CrawlStats,
}

impl<H: AddressHistory, W: Write> Crawler<H, W> {
    pub fn new(history: H, sink: AnchorCsvWriter<W>, config: CrawlConfig) -> Self {
        Self {
            offset: config.start_offset,
            history,
            sink,
            config,
            seen: HashSet::new(),
            stats: CrawlStats::default(),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    pub fn into_sink(self) -> AnchorCsvWriter<W> {
        self.sink
    }

    /// Fetch the page at the current offset, persist its anchors, and advance.
    /// Fetch errors are absorbed into `Step::Retry`; only persistence fails.
    pub async fn step(&mut self) -> Result<Step, CrawlError> {
        let page = match self
            .history
            .address_history(&self.config.address, self.offset, self.config.page_size)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.stats.fetch_failures += 1;
                warn!(offset = self.offset, error = %e, "fetch failed, retrying same offset");
                return Ok(Step::Retry);
            }
        };

        let fetched = page.len();
        let mut accepted = 0;
        for tx in &page {
            if !self.seen.insert(tx.hash.clone()) {
                self.stats.duplicates += 1;
                continue;
            }
            match decode_anchor(tx) {
                Ok(record) => {
                    self.sink.write(&record)?;
                    accepted += 1;
                }
                Err(reject) if reject.is_routine() => {
                    debug!(tx_hash = %tx.hash, %reject, "skipped");
                    self.stats.rejected += 1;
                }
                Err(reject) => {
                    warn!(tx_hash = %tx.hash, %reject, "skipped");
                    self.stats.rejected += 1;
                }
            }
        }

        self.offset += fetched as u64;
        self.stats.pages += 1;
        self.stats.accepted += accepted as u64;
        info!(offset = self.offset, fetched, accepted, "page done");
        Ok(Step::Page { fetched, accepted })
    }

    /// Crawl until `stop` turns true or its sender is dropped. The signal is
    /// observed between steps and interrupts the pause after each step.
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> Result<CrawlStats, CrawlError> {
        info!(address = %self.config.address, offset = self.offset, "crawl start");
        loop {
            if *stop.borrow_and_update() {
                break;
            }
            let pause = match self.step().await? {
                Step::Page { .. } => self.config.page_interval,
                Step::Retry => self.config.retry_backoff,
            };
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        self.sink.flush()?;
        info!(offset = self.offset, stats = ?self.stats, "crawl stopped");
        Ok(self.stats.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{FetchError, TxOutput, TxRecord};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const ANCHOR_SCRIPT: &str =
        "6a28466100000003eebbbe5a5e36d029fe5dad88394dd53539df09465fba9c07140630162ba47aaa37ba";

    fn tx(hash: &str, scripts: &[&str]) -> TxRecord {
        TxRecord {
            hash: hash.into(),
            time: 1_597_207_885,
            inputs: vec![],
            outputs: scripts
                .iter()
                .map(|s| TxOutput {
                    value: 0,
                    spent: false,
                    script: s.to_string(),
                })
                .collect(),
        }
    }

    /// Serves queued pages, then raises the stop signal and serves empty pages.
    struct ScriptedHistory {
        pages: Mutex<VecDeque<Result<Vec<TxRecord>, FetchError>>>,
        offsets: Mutex<Vec<u64>>,
        stop: watch::Sender<bool>,
    }

    #[async_trait]
    impl AddressHistory for ScriptedHistory {
        async fn address_history(
            &self,
            _address: &str,
            offset: u64,
            _page_size: u32,
        ) -> Result<Vec<TxRecord>, FetchError> {
            self.offsets.lock().unwrap().push(offset);
            match self.pages.lock().unwrap().pop_front() {
                Some(page) => page,
                None => {
                    let _ = self.stop.send(true);
                    Ok(vec![])
                }
            }
        }
    }

    fn crawler(
        pages: Vec<Result<Vec<TxRecord>, FetchError>>,
    ) -> (Crawler<ScriptedHistory, Vec<u8>>, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        let history = ScriptedHistory {
            pages: Mutex::new(pages.into()),
            offsets: Mutex::new(vec![]),
            stop: tx,
        };
        let sink = AnchorCsvWriter::new(Vec::new(), true).unwrap();
        (
            Crawler::new(history, sink, CrawlConfig::new("1K2SXgApmo9uZoyahvsbSanpVWbzZWVVMF")),
            rx,
        )
    }

    fn output(c: Crawler<ScriptedHistory, Vec<u8>>) -> Vec<String> {
        let bytes = c.into_sink().into_inner().unwrap();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn retries_same_offset_then_advances() {
        let (mut c, rx) = crawler(vec![
            Ok(vec![
                tx("a", &["00", ANCHOR_SCRIPT]),
                tx("b", &["00"]),
            ]),
            Err(FetchError::Upstream("rate limited".into())),
            Ok(vec![tx("c", &["00", ANCHOR_SCRIPT])]),
        ]);
        let stats = c.run(rx).await.unwrap();
        assert_eq!(*c.history.offsets.lock().unwrap(), vec![0, 2, 2, 3]);
        assert_eq!(stats.fetch_failures, 1);
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.rejected, 1);
        let rows = output(c);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("a,257723,be5a5e36"));
        assert!(rows[1].starts_with("c,257723,"));
    }

    struct BrokenDisk;

    impl Write for BrokenDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn persist_failure_ends_crawl() {
        let (stop, rx) = watch::channel(false);
        let history = ScriptedHistory {
            pages: Mutex::new(vec![Ok(vec![tx("a", &["00", ANCHOR_SCRIPT])])].into()),
            offsets: Mutex::new(vec![]),
            stop,
        };
        let sink = AnchorCsvWriter::new(BrokenDisk, false).unwrap();
        let mut c = Crawler::new(history, sink, CrawlConfig::new("addr"));
        let err = c.run(rx).await.unwrap_err();
        assert!(matches!(err, CrawlError::Persist(_)));
        assert_eq!(c.offset(), 0);
        assert_eq!(*c.history.offsets.lock().unwrap(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicates_across_pages_are_skipped() {
        let anchor = tx("dup", &["00", ANCHOR_SCRIPT]);
        let (mut c, rx) = crawler(vec![Ok(vec![anchor.clone()]), Ok(vec![anchor])]);
        let stats = c.run(rx).await.unwrap();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(output(c).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_non_anchor_shapes() {
        let wrong_marker = format!("6a284662{}", &ANCHOR_SCRIPT[8..]);
        let (mut c, _rx) = crawler(vec![Ok(vec![
            tx("one", &[ANCHOR_SCRIPT]),
            tx("three", &["00", ANCHOR_SCRIPT, "00"]),
            tx("marker", &["00", &wrong_marker]),
            tx("nothex", &["00", "xyz"]),
        ])]);
        let step = c.step().await.unwrap();
        assert_eq!(
            step,
            Step::Page {
                fetched: 4,
                accepted: 0
            }
        );
        assert_eq!(c.stats().rejected, 4);
        assert_eq!(c.offset(), 4);
        assert!(output(c).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_page_does_not_stop() {
        let (mut c, _rx) = crawler(vec![Ok(vec![]), Ok(vec![tx("x", &["00", ANCHOR_SCRIPT])])]);
        assert_eq!(
            c.step().await.unwrap(),
            Step::Page {
                fetched: 0,
                accepted: 0
            }
        );
        assert_eq!(c.offset(), 0);
        assert_eq!(
            c.step().await.unwrap(),
            Step::Page {
                fetched: 1,
                accepted: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_start_fetches_nothing() {
        let (mut c, rx) = crawler(vec![Ok(vec![tx("a", &["00", ANCHOR_SCRIPT])])]);
        c.history.stop.send(true).unwrap();
        let stats = c.run(rx).await.unwrap();
        assert_eq!(stats, CrawlStats::default());
        assert!(c.history.offsets.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_between_pages() {
        let (mut c, rx) = crawler(vec![Ok(vec![]), Err(FetchError::NotFound("x".into()))]);
        let start = tokio::time::Instant::now();
        c.run(rx).await.unwrap();
        // page interval after the first page, retry backoff after the failure,
        // then the stop arrives during the third step
        assert_eq!(start.elapsed(), Duration::from_secs(21));
    }
}
