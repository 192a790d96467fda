//! News Sentiment Pipeline: CLI entrypoint.
//! Each subcommand runs one stage over files; `run` chains them in memory.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_sentiment_pipeline::config::{BackendKind, PipelineConfig};
use news_sentiment_pipeline::ingest::{FetchQuery, NewsApiClient};
use news_sentiment_pipeline::metrics::Metrics;
use news_sentiment_pipeline::monitor::MonitorStatus;
use news_sentiment_pipeline::notify::{DeliveryOutcome, Notifier, WebhookNotifier};
use news_sentiment_pipeline::store::{self, RecordStore};
use news_sentiment_pipeline::summary::DatasetSummary;
use news_sentiment_pipeline::synth::{self, SynthOptions};
use news_sentiment_pipeline::{aggregate_daily, Classifier, Forecaster, Monitor, Pipeline};

const DEFAULT_ARTICLES: &str = "data/articles.csv";
const DEFAULT_RECORDS: &str = "data/news_sentiment_report.csv";
const DEFAULT_DAILY: &str = "data/daily_sentiment.csv";
const DEFAULT_FORECAST: &str = "data/sentiment_forecast.csv";

#[derive(Parser, Debug)]
#[command(author, version, about = "Classify news sentiment, aggregate it per day, forecast the trend and alert on lows")]
struct Cli {
    /// TOML config file (otherwise $PIPELINE_CONFIG_PATH or config/pipeline.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write Prometheus text exposition here when the command finishes
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch recent articles from the news API into an article file
    Fetch {
        #[arg(long, default_value = DEFAULT_ARTICLES)]
        out: PathBuf,
        #[arg(long, default_value = news_sentiment_pipeline::ingest::newsapi::DEFAULT_QUERY)]
        query: String,
        /// How many days back to search
        #[arg(long, default_value_t = 30)]
        days: u32,
        #[arg(long, default_value_t = 100)]
        page_size: u32,
    },
    /// Classify an article file and append the results to the record store
    Classify {
        #[arg(long, default_value = DEFAULT_ARTICLES)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_RECORDS)]
        store: PathBuf,
        #[command(flatten)]
        classifier: ClassifierArgs,
    },
    /// Reduce the record store to one point per day
    Aggregate {
        #[arg(long, default_value = DEFAULT_RECORDS)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_DAILY)]
        out: PathBuf,
    },
    /// Fit the daily series and project it forward
    Forecast {
        #[arg(long, default_value = DEFAULT_DAILY)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_FORECAST)]
        out: PathBuf,
        /// Days to project past the last observation
        #[arg(long)]
        horizon: Option<usize>,
    },
    /// Evaluate the latest window and deliver an alert if it is critical
    Monitor {
        #[arg(long, default_value = DEFAULT_RECORDS)]
        input: PathBuf,
        #[command(flatten)]
        monitor: MonitorArgs,
        /// Evaluate only; never call the webhook
        #[arg(long)]
        no_notify: bool,
    },
    /// Classify, store, aggregate, forecast and monitor in one pass
    Run {
        #[arg(long, default_value = DEFAULT_ARTICLES)]
        articles: PathBuf,
        #[arg(long, default_value = DEFAULT_RECORDS)]
        store: PathBuf,
        #[arg(long, default_value = DEFAULT_DAILY)]
        daily_out: PathBuf,
        #[arg(long, default_value = DEFAULT_FORECAST)]
        forecast_out: PathBuf,
        #[arg(long)]
        horizon: Option<usize>,
        #[command(flatten)]
        classifier: ClassifierArgs,
        #[command(flatten)]
        monitor: MonitorArgs,
    },
    /// Replay a record file over several past days with jittered scores
    Synth {
        #[arg(long, default_value = DEFAULT_RECORDS)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = synth::DEFAULT_DAYS)]
        days: u32,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Print totals, covered days and label distribution of a record file
    Summary {
        #[arg(long, default_value = DEFAULT_RECORDS)]
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct ClassifierArgs {
    /// lexicon | openai | gemini
    #[arg(long)]
    backend: Option<BackendKind>,
    /// Classify title plus description instead of the title alone
    #[arg(long)]
    full_text: bool,
}

#[derive(Args, Debug)]
struct MonitorArgs {
    #[arg(long, allow_hyphen_values = true)]
    threshold: Option<f64>,
    #[arg(long)]
    window_hours: Option<u32>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut cfg = PipelineConfig::load_with(cli.config.as_deref())?;
    match &cli.command {
        Command::Classify { classifier, .. } => apply_classifier_args(&mut cfg, classifier),
        Command::Forecast { horizon, .. } => apply_horizon(&mut cfg, *horizon),
        Command::Monitor { monitor, .. } => apply_monitor_args(&mut cfg, monitor),
        Command::Run {
            horizon,
            classifier,
            monitor,
            ..
        } => {
            apply_horizon(&mut cfg, *horizon);
            apply_classifier_args(&mut cfg, classifier);
            apply_monitor_args(&mut cfg, monitor);
        }
        _ => {}
    }
    cfg.sanitize();
    tracing::debug!(?cfg, "effective configuration");
    Ok(cfg)
}

fn apply_classifier_args(cfg: &mut PipelineConfig, args: &ClassifierArgs) {
    if let Some(b) = args.backend {
        cfg.classifier.backend = b;
        cfg.classifier.api_key = None;
        cfg.classifier.resolve_api_key();
    }
}

fn apply_horizon(cfg: &mut PipelineConfig, horizon: Option<usize>) {
    if let Some(h) = horizon {
        cfg.forecast.horizon_days = h;
    }
}

fn apply_monitor_args(cfg: &mut PipelineConfig, args: &MonitorArgs) {
    if let Some(t) = args.threshold {
        cfg.monitor.critical_threshold = t;
    }
    if let Some(w) = args.window_hours {
        cfg.monitor.window_hours = w;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env in local runs; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable");
            None
        }
    };

    let cfg = load_config(&cli)?;
    let result = dispatch(&cli.command, &cfg).await;

    if let (Some(path), Some(m)) = (&cli.metrics_out, &metrics) {
        if let Err(e) = m.write_to(path) {
            tracing::warn!(error = %e, "could not write metrics");
        }
    }
    result
}

async fn dispatch(command: &Command, cfg: &PipelineConfig) -> Result<()> {
    match command {
        Command::Fetch {
            out,
            query,
            days,
            page_size,
        } => {
            let client = NewsApiClient::from_env()?;
            let q = FetchQuery {
                query: query.clone(),
                days_back: *days,
                page_size: *page_size,
                ..Default::default()
            };
            let articles = client.fetch(&q, chrono::Utc::now()).await?;
            if articles.is_empty() {
                bail!("news API returned no usable articles; {} left untouched", out.display());
            }
            store::write_articles(out, &articles)?;
            println!("Fetched {} articles into {}", articles.len(), out.display());
        }

        Command::Classify {
            input,
            store: store_path,
            classifier,
        } => {
            let loaded = store::load_articles(input)?;
            let clf = Classifier::from_config(&cfg.classifier)?;
            let batch = clf.classify_batch(&loaded.items, classifier.full_text).await;
            let appended = RecordStore::new(store_path).append(&batch.records)?;
            println!(
                "Classified {} articles with {} ({} short, {} fallbacks, {} malformed rows); {} new records in {}",
                batch.records.len(),
                clf.backend_name(),
                batch.short_text,
                batch.fallbacks,
                loaded.malformed_count(),
                appended,
                store_path.display()
            );
        }

        Command::Aggregate { input, out } => {
            let loaded = RecordStore::new(input).load()?;
            let daily = aggregate_daily(&loaded.items);
            if daily.is_empty() {
                bail!("{} holds no valid records to aggregate", input.display());
            }
            store::write_daily(out, &daily)?;
            println!("Wrote {} daily points to {}", daily.len(), out.display());
        }

        Command::Forecast { input, out, .. } => {
            let daily = store::load_daily(input)?;
            let forecast = Forecaster::new(cfg.forecast).forecast(&daily.items)?;
            store::write_forecast(out, &forecast)?;
            println!(
                "Wrote {} forecast points ({} ahead) to {}",
                forecast.len(),
                cfg.forecast.horizon_days,
                out.display()
            );
        }

        Command::Monitor {
            input, no_notify, ..
        } => {
            let loaded = RecordStore::new(input).load()?;
            let status = Monitor::new(cfg.monitor).evaluate(&loaded.items);
            print_status(&status)?;
            if !no_notify {
                if let Some(alert) = status.alert() {
                    let notifier = WebhookNotifier::new(cfg.webhook_url.clone());
                    report_delivery(notifier.send(alert).await);
                }
            }
        }

        Command::Run {
            articles,
            store: store_path,
            daily_out,
            forecast_out,
            classifier,
            ..
        } => {
            let input = store::load_articles(articles)?;
            let record_store = RecordStore::new(store_path);
            let prior = if store_path.exists() {
                record_store.load()?.items
            } else {
                Vec::new()
            };

            let pipeline = Pipeline::from_config(cfg)?;
            let report = pipeline
                .run(&input.items, prior, classifier.full_text)
                .await;

            let appended = record_store.append(&report.batch.records)?;
            println!("Stored {} new records in {}", appended, store_path.display());
            write_if_any(daily_out, &report.analysis.daily, store::write_daily)?;
            match &report.analysis.forecast {
                Ok(points) => write_if_any(forecast_out, points, store::write_forecast)?,
                Err(e) => {
                    eprintln!("Forecast skipped: {e}");
                    if store::remove_stale(forecast_out)? {
                        eprintln!("Removed stale forecast {}", forecast_out.display());
                    }
                }
            }
            print_status(&report.analysis.status)?;
            if let Some(delivery) = report.delivery {
                report_delivery(delivery);
            }
        }

        Command::Synth {
            input,
            out,
            days,
            seed,
        } => {
            let loaded = RecordStore::new(input).load()?;
            let history = synth::mock_history(
                &loaded.items,
                SynthOptions {
                    days: *days,
                    seed: *seed,
                },
            );
            if history.is_empty() {
                bail!("{} holds no valid records to replay", input.display());
            }
            store::write_records(out, &history)?;
            println!(
                "Wrote {} synthetic records over {} days to {}",
                history.len(),
                days,
                out.display()
            );
        }

        Command::Summary { input, json } => {
            let loaded = RecordStore::new(input).load()?;
            let summary = DatasetSummary::from_loaded(&loaded);
            if *json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{summary}");
            }
        }
    }
    Ok(())
}

fn write_if_any<T>(path: &Path, items: &[T], write: fn(&Path, &[T]) -> Result<()>) -> Result<()> {
    if items.is_empty() {
        tracing::warn!(path = %path.display(), "nothing to write, leaving file untouched");
        return Ok(());
    }
    write(path, items)?;
    println!("Wrote {} rows to {}", items.len(), path.display());
    Ok(())
}

fn print_status(status: &MonitorStatus) -> Result<()> {
    let out = serde_json::to_string_pretty(status).context("serializing monitor status")?;
    println!("{out}");
    Ok(())
}

fn report_delivery(
    result: Result<DeliveryOutcome, news_sentiment_pipeline::PipelineError>,
) {
    match result {
        Ok(DeliveryOutcome::Sent) => println!("Alert delivered"),
        Ok(DeliveryOutcome::NotConfigured) => {
            eprintln!("Warning: no webhook URL configured, alert not sent")
        }
        Err(e) => eprintln!("Warning: {e}"),
    }
}
