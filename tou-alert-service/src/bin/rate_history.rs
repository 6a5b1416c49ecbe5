use anyhow::{bail, Context, Result};
use time::{Duration, OffsetDateTime};
use tou_alert_service::{app, config::AppConfig, observability};
use tou_client::{db::tou_rate_queries, Category, RateLevel};

const USAGE: &str = "usage: rate_history <CATEGORY> [--days N] [--limit N] [--csv PATH]";

struct Args {
    category: Category,
    days: i64,
    limit: i64,
    csv: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let Some(category) = args.next() else {
        bail!(USAGE);
    };
    let mut parsed = Args {
        category: category.parse()?,
        days: 7,
        limit: 168,
        csv: None,
    };

    while let Some(flag) = args.next() {
        let value = args.next().with_context(|| format!("{flag} needs a value; {USAGE}"))?;
        match flag.as_str() {
            "--days" => parsed.days = value.parse().context("--days must be an integer")?,
            "--limit" => parsed.limit = value.parse().context("--limit must be an integer")?,
            "--csv" => parsed.csv = Some(value),
            _ => bail!("unknown flag '{flag}'; {USAGE}"),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args = parse_args()?;
    let cfg = AppConfig::load()?;
    let pool = app::connect_pool(&cfg).await?;

    let since = OffsetDateTime::now_utc() - Duration::days(args.days);
    match tou_rate_queries::rate_summary(&pool, args.category, since).await? {
        Some(s) => {
            println!("category:  {}", s.category);
            println!("records:   {}", s.count);
            println!("average:   {:.2} ({})", s.average, RateLevel::classify(s.average).as_str());
            println!("peak:      {:.2}", s.peak);
            println!("off-peak:  {:.2}", s.off_peak);
            if let Some(latest) = &s.latest {
                println!("latest:    {:.2} at {}", latest.rate, latest.iso_timestamp()?);
            }
        }
        None => println!("no {} rates in the last {} days", args.category, args.days),
    }

    if let Some(path) = &args.csv {
        let records = tou_rate_queries::recent_rates(&pool, args.category, args.limit).await?;
        let mut wtr = csv::Writer::from_path(path).with_context(|| format!("failed to create {path}"))?;
        wtr.write_record(["timestamp", "category", "rate", "level"])?;
        for r in records.iter().rev() {
            wtr.write_record([
                r.iso_timestamp()?,
                r.category.to_string(),
                format!("{:.2}", r.rate),
                r.level().as_str().to_string(),
            ])?;
        }
        wtr.flush()?;
        tracing::info!(rows = records.len(), path = %path, "rate history exported");
    }

    Ok(())
}
