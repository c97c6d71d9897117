use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use lanepool::{
    LaneId, PoolIdSource, QueuePool, QueuePoolConfig, SelfServiceConfig, SelfServicePool,
    StepError, map_concurrent, processor_fn, supplier_fn,
};
use tokio::sync::Mutex;

struct Args {
    lanes: usize,
    items: u64,
    capacity: usize,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let args = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!();
            eprintln!("Usage: lanepool-demo [--lanes <n>] [--items <n>] [--capacity <n>]");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --lanes <n>      Lanes per pool [default: 4]");
            eprintln!("  --items <n>      Items to process [default: 20]");
            eprintln!("  --capacity <n>   Queue capacity [default: 8]");
            process::exit(2);
        }
    };

    lanepool::telemetry::init_tracing();

    if let Err(e) = run(args) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args {
        lanes: 4,
        items: 20,
        capacity: 8,
    };

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--lanes" | "--items" | "--capacity" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| format!("{flag} requires a value"))?;
                match flag {
                    "--lanes" => parsed.lanes = parse_number(flag, value)?,
                    "--items" => parsed.items = parse_number(flag, value)?,
                    _ => parsed.capacity = parse_number(flag, value)?,
                }
            }
            "--help" | "-h" => return Err(String::new()),
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }
    // A zero-capacity queue rejects every submission, so the retry loop would never end.
    if parsed.capacity == 0 {
        return Err("--capacity must be at least 1".to_string());
    }
    Ok(parsed)
}

fn parse_number<N: std::str::FromStr>(flag: &str, value: &str) -> Result<N, String> {
    value
        .parse()
        .map_err(|_| format!("{flag} expects a number, got {value:?}"))
}

fn run(args: Args) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(async {
        run_queue_pool(&args).await?;
        run_self_service(&args).await?;
        run_map(&args).await
    })
}

async fn run_queue_pool(args: &Args) -> anyhow::Result<()> {
    let processor = processor_fn(|n: u64, lane: LaneId| async move {
        tokio::time::sleep(Duration::from_millis(10 * (n % 5))).await;
        if n % 7 == 6 {
            anyhow::bail!("item {n} rejected on {lane}");
        }
        Ok(n * n)
    });
    let pool = QueuePool::new(processor, args.lanes, QueuePoolConfig::new(args.capacity))?;

    let mut completions = Vec::new();
    let mut backpressured = 0u64;
    for n in 0..args.items {
        loop {
            let completion = pool.submit(n);
            if !completion.is_rejected() {
                completions.push((n, completion));
                break;
            }
            backpressured += 1;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    for (n, completion) in completions {
        match completion.await {
            Ok(square) => tracing::info!(item = n, square, "Queue pool item done"),
            Err(e) => tracing::warn!(item = n, error = %e, "Queue pool item failed"),
        }
    }
    pool.shutdown().await;
    tracing::info!(stats = ?pool.stats(), backpressured, "Queue pool finished");
    Ok(())
}

async fn run_self_service(args: &Args) -> anyhow::Result<()> {
    let ids = PoolIdSource::new();
    let backlog = Arc::new(Mutex::new((0..args.items).collect::<Vec<_>>()));

    let supplier = supplier_fn(move |_lane: LaneId| {
        let backlog = Arc::clone(&backlog);
        async move { Ok::<_, anyhow::Error>(backlog.lock().await.pop()) }
    });
    let processor = processor_fn(|n: u64, _lane: LaneId| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if n == 3 {
            anyhow::bail!("item {n} could not be processed");
        }
        Ok(())
    });
    let config = SelfServiceConfig::default()
        .with_lane_count(args.lanes)
        .with_too_long_time(Duration::from_millis(500))
        .with_too_long_warn_interval(Duration::from_millis(250))
        .with_on_error(|item: &u64, error: &StepError<anyhow::Error>| {
            tracing::warn!(item, %error, "Self-service item failed");
        });

    let pool = SelfServicePool::new(ids.next_id(), processor, supplier, config)?;
    pool.start();
    pool.join().await;
    tracing::info!(stats = ?pool.stats(), "Self-service pool finished");
    Ok(())
}

async fn run_map(args: &Args) -> anyhow::Result<()> {
    let lengths = map_concurrent(0..args.items, args.lanes, |n, _index| async move {
        n.to_string().len()
    })
    .await?;
    tracing::info!(total_digits = lengths.iter().sum::<usize>(), "Map helper finished");
    Ok(())
}
