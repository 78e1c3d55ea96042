use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Instant;

use clap::Parser;
use serde::Serialize;
use shapemap_api::Mappable;
use shapemap_engine::{CacheMode, CacheStats, MapError, Mapper, MapperConfig};

#[derive(Parser)]
#[command(
    name = "shapemap-probe",
    about = "Map sample object graphs concurrently and report routine cache statistics"
)]
struct Cli {
    /// Path to TOML configuration file. Defaults apply when omitted.
    #[arg(long, env = "SHAPEMAP_CONFIG")]
    config: Option<String>,

    /// Force a bounded cache with this capacity.
    #[arg(long, env = "SHAPEMAP_CAPACITY")]
    capacity: Option<usize>,

    /// Worker threads.
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Mappings per worker thread.
    #[arg(long, default_value_t = 1000)]
    iterations: usize,

    /// Print the report as JSON instead of log lines.
    #[arg(long)]
    json: bool,
}

#[derive(Mappable, Clone, Default)]
struct Customer {
    id: u64,
    name: String,
    email: Option<String>,
}

#[derive(Mappable, Clone, Default)]
struct CustomerView {
    id: u64,
    name: String,
    email: Option<String>,
}

#[derive(Mappable, Clone, Default)]
struct Item {
    sku: String,
    quantity: u32,
    price_cents: i64,
}

#[derive(Mappable, Clone, Default)]
struct ItemView {
    sku: String,
    quantity: u32,
    price_cents: i64,
}

#[derive(Mappable, Clone, Default)]
struct Order {
    id: u64,
    customer: Option<Customer>,
    items: Vec<Item>,
    attributes: HashMap<String, u32>,
    history: Vec<String>,
}

#[derive(Mappable, Clone, Default)]
struct OrderView {
    id: u64,
    customer: Option<CustomerView>,
    items: Vec<ItemView>,
    attributes: BTreeMap<String, String>,
    history: VecDeque<String>,
    billing: Option<CustomerView>,
}

#[derive(Serialize)]
struct Report {
    threads: usize,
    iterations: usize,
    mapped: usize,
    elapsed_ms: u128,
    stats: CacheStats,
    routines: Vec<String>,
}

fn sample_order(seed: usize) -> Order {
    Order {
        id: seed as u64,
        customer: (seed % 3 != 0).then(|| Customer {
            id: (seed % 17) as u64,
            name: format!("customer-{seed}"),
            email: (seed % 2 == 0).then(|| format!("c{seed}@example.com")),
        }),
        items: (0..seed % 5)
            .map(|i| Item {
                sku: format!("sku-{i}"),
                quantity: i as u32 + 1,
                price_cents: 199 * i as i64,
            })
            .collect(),
        attributes: HashMap::from([("priority".to_string(), (seed % 4) as u32)]),
        history: vec!["created".to_string(), "paid".to_string()],
    }
}

fn build_mapper(cli: &Cli) -> Result<Mapper, MapError> {
    let config = match &cli.config {
        Some(path) => {
            tracing::info!(config = %path, "loading configuration");
            MapperConfig::load(path)?
        }
        None => MapperConfig::default(),
    };
    let mapper = Mapper::from_config(&config)?;
    if let Some(capacity) = cli.capacity {
        mapper.set_mode(CacheMode::Bounded { capacity })?;
    }
    Ok(mapper)
}

/// One unit of work: the full order graph plus a few standalone pairs.
fn map_once(mapper: &Mapper, seed: usize) -> Result<usize, MapError> {
    let order = sample_order(seed);
    let view: OrderView = mapper.map_value(&order)?;
    let customer: Option<CustomerView> = mapper.map(order.customer.as_ref())?;
    let totals: Vec<String> = mapper.map_value(&vec![seed as u32, view.items.len() as u32])?;
    let id: String = mapper.map_value(&view.id)?;
    Ok(1 + usize::from(customer.is_some()) + totals.len().min(1) + usize::from(!id.is_empty()))
}

fn run(cli: &Cli, mapper: &Mapper) -> Result<usize, MapError> {
    std::thread::scope(|s| {
        let workers: Vec<_> = (0..cli.threads)
            .map(|worker| {
                s.spawn(move || -> Result<usize, MapError> {
                    let mut mapped = 0;
                    for i in 0..cli.iterations {
                        mapped += map_once(mapper, worker * cli.iterations + i)?;
                    }
                    Ok(mapped)
                })
            })
            .collect();

        let mut total = 0;
        for worker in workers {
            match worker.join() {
                Ok(result) => total += result?,
                Err(_) => {
                    return Err(MapError::Configuration("worker thread panicked".to_string()));
                }
            }
        }
        Ok(total)
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mapper = match build_mapper(&cli) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "failed to configure mapper");
            std::process::exit(1);
        }
    };

    tracing::info!(
        threads = cli.threads,
        iterations = cli.iterations,
        bounded = mapper.is_bounded(),
        "starting probe"
    );
    let started = Instant::now();
    let mapped = match run(&cli, &mapper) {
        Ok(n) => n,
        Err(e) => {
            tracing::error!(error = %e, "mapping failed");
            std::process::exit(1);
        }
    };

    let report = Report {
        threads: cli.threads,
        iterations: cli.iterations,
        mapped,
        elapsed_ms: started.elapsed().as_millis(),
        stats: mapper.stats(),
        routines: mapper
            .snapshot()
            .iter()
            .map(|entry| entry.key.to_string())
            .collect(),
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize report");
                std::process::exit(1);
            }
        }
        return;
    }

    tracing::info!(
        mapped = report.mapped,
        elapsed_ms = report.elapsed_ms,
        hits = report.stats.hits,
        misses = report.stats.misses,
        builds = report.stats.builds,
        evictions = report.stats.evictions,
        entries = report.stats.entries,
        "probe finished"
    );
    for routine in &report.routines {
        tracing::info!(routine = %routine, "cached routine");
    }
}
