//! anchor-cost CLI: crawl, fees, dates, stitch.

use anchor_cost::batch::{attach_dates, harvest_fees};
use anchor_cost::chain::{
    BlockchainInfoClient, Cache, Chain, EtherscanClient, FeeSource, FetchConfig, Fetcher,
    TimestampSource,
};
use anchor_cost::crawl::{CrawlConfig, Crawler};
use anchor_cost::ledger::{
    load_fee_ledger, read_anchor_refs, read_ledger_heights, AnchorCsvWriter, DatedLedgerWriter,
    FeeLedgerWriter,
};
use anchor_cost::stitch::{load_block_times, load_price_series, stitch};
use anchor_cost::ReportData;
use anchor_cost_report::{render_report, render_stitch_csv};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

const DEFAULT_ANCHOR_ADDRESS: &str = "1K2SXgApmo9uZoyahvsbSanpVWbzZWVVMF";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Crawl(args) => run_crawl(args),
        Command::Fees(args) => run_fees(args),
        Command::Dates(args) => run_dates(args),
        Command::Stitch(args) => run_stitch(args),
    }
}

#[derive(Parser)]
#[command(name = "anchor-cost")]
#[command(author = "gorusys <goru.connector@outlook.com>")]
#[command(about = "Anchor fee harvesting and cost reconciliation for Bitcoin and Ethereum")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl an address's history for anchor records until interrupted.
    Crawl(CrawlArgs),
    /// Query the fee of every anchor not yet in the output ledger.
    Fees(FeesArgs),
    /// Attach confirmation times to a fee ledger.
    Dates(DatesArgs),
    /// Join a fee ledger with block times and prices into a cumulative report.
    Stitch(StitchArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum ChainArg {
    Btc,
    Eth,
}

impl From<ChainArg> for Chain {
    fn from(c: ChainArg) -> Self {
        match c {
            ChainArg::Btc => Chain::Bitcoin,
            ChainArg::Eth => Chain::Ethereum,
        }
    }
}

#[derive(Parser)]
struct CrawlArgs {
    #[arg(long, default_value = DEFAULT_ANCHOR_ADDRESS)]
    address: String,
    /// Transaction offset to resume from.
    #[arg(long, default_value_t = 0)]
    offset: u64,
    #[arg(long, default_value = "orphans.csv")]
    out: PathBuf,
    #[arg(long, default_value_t = 20)]
    page_interval_secs: u64,
    #[arg(long, default_value_t = 1)]
    retry_secs: u64,
}

#[derive(Parser)]
struct FeesArgs {
    #[arg(long, value_enum)]
    chain: ChainArg,
    /// CSV of anchors with `Height` and `TxID` columns.
    #[arg(long)]
    anchors: PathBuf,
    /// Fee ledger; appended to, and existing heights are skipped.
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    source: SourceArgs,
}

#[derive(Parser)]
struct DatesArgs {
    #[arg(long, value_enum)]
    chain: ChainArg,
    #[arg(long)]
    ledger: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    source: SourceArgs,
}

#[derive(Parser)]
struct SourceArgs {
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    eth_api_key: Option<String>,
    #[arg(long, default_value = "./data/cache")]
    cache_dir: PathBuf,
    #[arg(long)]
    offline: bool,
}

#[derive(Parser)]
struct StitchArgs {
    #[arg(long)]
    ledger: PathBuf,
    #[arg(long)]
    prices: PathBuf,
    /// JSON object of block height to RFC 3339 time.
    #[arg(long)]
    blocktimes: PathBuf,
    #[arg(long, default_value = "BTC")]
    symbol: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    html: Option<PathBuf>,
    #[arg(long, default_value_t = 30)]
    sma_window: usize,
}

fn cache_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join("cache.sqlite")
}

fn open_fetcher(
    config: FetchConfig,
    args: &SourceArgs,
) -> Result<Fetcher, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&args.cache_dir)?;
    let cache = Cache::open(cache_path(&args.cache_dir))?;
    let config = FetchConfig {
        offline: args.offline,
        ..config
    };
    Ok(Fetcher::new(config, Some(cache))?)
}

/// Explorer client for `chain`; implements both fee and timestamp lookup.
enum Source {
    Btc(BlockchainInfoClient),
    Eth(EtherscanClient),
}

impl Source {
    fn open(chain: Chain, args: &SourceArgs) -> Result<Self, Box<dyn std::error::Error>> {
        match chain {
            Chain::Bitcoin => Ok(Source::Btc(BlockchainInfoClient::new(open_fetcher(
                FetchConfig::blockchain_info(),
                args,
            )?))),
            Chain::Ethereum => {
                let key = args
                    .eth_api_key
                    .clone()
                    .ok_or("ethereum lookups need --eth-api-key or ETHERSCAN_API_KEY")?;
                Ok(Source::Eth(EtherscanClient::new(
                    open_fetcher(FetchConfig::etherscan(), args)?,
                    key,
                )))
            }
        }
    }

    fn fees(&self) -> &dyn FeeSource {
        match self {
            Source::Btc(c) => c,
            Source::Eth(c) => c,
        }
    }

    fn timestamps(&self) -> &dyn TimestampSource {
        match self {
            Source::Btc(c) => c,
            Source::Eth(c) => c,
        }
    }

    fn request_count(&self) -> u64 {
        match self {
            Source::Btc(c) => c.fetcher().request_count(),
            Source::Eth(c) => c.fetcher().request_count(),
        }
    }
}

/// Open `path` for appending; true when the file is new or empty.
fn open_append(path: &Path) -> Result<(File, bool), std::io::Error> {
    let f = OpenOptions::new().create(true).append(true).open(path)?;
    let empty = f.metadata()?.len() == 0;
    Ok((f, empty))
}

fn run_crawl(args: CrawlArgs) -> Result<(), Box<dyn std::error::Error>> {
    let fetcher = Fetcher::new(FetchConfig::blockchain_info(), None)?;
    let history = BlockchainInfoClient::new(fetcher);
    let (file, empty) = open_append(&args.out)?;
    let sink = AnchorCsvWriter::new(file, empty)?;
    let config = CrawlConfig {
        start_offset: args.offset,
        page_interval: Duration::from_secs(args.page_interval_secs),
        retry_backoff: Duration::from_secs(args.retry_secs),
        ..CrawlConfig::new(args.address)
    };
    let mut crawler = Crawler::new(history, sink, config);
    let rt = tokio::runtime::Runtime::new()?;
    let stats = rt.block_on(async {
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping after current step");
                let _ = stop_tx.send(true);
            }
        });
        crawler.run(stop_rx).await
    })?;
    info!(
        out = %args.out.display(),
        next_offset = crawler.offset(),
        ?stats,
        "crawl complete"
    );
    println!("{}", crawler.offset());
    Ok(())
}

fn run_fees(args: FeesArgs) -> Result<(), Box<dyn std::error::Error>> {
    let chain = Chain::from(args.chain);
    let refs = read_anchor_refs(File::open(&args.anchors)?)?;
    let done = if args.out.exists() {
        read_ledger_heights(File::open(&args.out)?)?
    } else {
        BTreeSet::new()
    };
    info!(anchors = refs.len(), done = done.len(), "resuming fee harvest");
    let source = Source::open(chain, &args.source)?;
    let (file, empty) = open_append(&args.out)?;
    let mut out = FeeLedgerWriter::new(file, chain, empty)?;
    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(harvest_fees(source.fees(), &refs, &done, &mut out))?;
    info!(
        out = %args.out.display(),
        requests = source.request_count(),
        ?summary,
        "fees complete"
    );
    Ok(())
}

fn run_dates(args: DatesArgs) -> Result<(), Box<dyn std::error::Error>> {
    let chain = Chain::from(args.chain);
    let ledger = load_fee_ledger(&args.ledger)?;
    let source = Source::open(chain, &args.source)?;
    let mut out = DatedLedgerWriter::new(File::create(&args.out)?, chain)?;
    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(attach_dates(source.timestamps(), chain, &ledger, &mut out))?;
    info!(
        out = %args.out.display(),
        requests = source.request_count(),
        ?summary,
        "dates complete"
    );
    Ok(())
}

fn run_stitch(args: StitchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = load_fee_ledger(&args.ledger)?;
    let block_times = load_block_times(&args.blocktimes)?;
    let prices = load_price_series(&args.prices)?;
    let stitched = stitch(&args.symbol, &ledger, &block_times, &prices);
    render_stitch_csv(&stitched.rows, &args.out)?;
    info!(out = %args.out.display(), rows = stitched.rows.len(), "stitch csv written");
    if let Some(html_path) = &args.html {
        let data = ReportData::new(stitched, args.sma_window);
        render_report(&data, html_path)?;
        info!(html = %html_path.display(), "report written");
    }
    Ok(())
}
