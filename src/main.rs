use alphagen::config::ConfigManager;
use alphagen::data::{CsvConnector, MarketFeatureBuilder};
use alphagen::engines::generation::ConsoleProgressCallback;
use alphagen::AlphaMiner;
use anyhow::{bail, Context};
use std::path::Path;

const USAGE: &str = "usage:\n  alphagen <config.toml> <prices.csv>...\n  alphagen --default-config <path>";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [flag, path] if flag == "--default-config" => {
            ConfigManager::new()
                .save_to_file(path)
                .with_context(|| format!("writing default config to {}", path))?;
            println!("Default configuration written to {}", path);
            Ok(())
        }
        [config_path, csv_paths @ ..] if !csv_paths.is_empty() && !config_path.starts_with("--") => {
            run(Path::new(config_path), csv_paths)
        }
        _ => bail!(USAGE),
    }
}

fn run(config_path: &Path, csv_paths: &[String]) -> anyhow::Result<()> {
    let manager = ConfigManager::new();
    manager
        .load_from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let config = manager.get();

    let frames = csv_paths
        .iter()
        .map(|path| {
            let (df, _) = CsvConnector::load_and_validate(path, None)
                .with_context(|| format!("loading {}", path))?;
            let meta = CsvConnector::create_metadata(path, &df)?;
            log::info!(
                "{}: {} rows, columns {:?}, close range {:.2}..{:.2}",
                meta.file_path,
                meta.num_rows,
                meta.available,
                meta.price_range.0,
                meta.price_range.1
            );
            Ok(df)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let features = MarketFeatureBuilder::new(config.features.clone()).build(&frames)?;
    let mut miner = AlphaMiner::new(config)?;
    let mut progress = ConsoleProgressCallback::new(10);

    let report = miner.mine(&features.tensor, &features.returns, &mut progress)?;

    match (&report.best_formula, report.best_score) {
        (Some(formula), Some(score)) => {
            println!("\nBest formula: {}", formula);
            println!("Score: {:.4}", score);
            if let Some(metrics) = &report.metrics {
                println!("{}", serde_json::to_string_pretty(&metrics.as_map())?);
            }
        }
        _ => println!("\nNo valid formula found"),
    }

    if !report.top.is_empty() {
        println!("\nTop formulas:");
        for (rank, elite) in report.top.iter().take(10).enumerate() {
            println!("{:>3}. {:>9.4}  {}", rank + 1, elite.score, elite.formula);
        }
    }

    Ok(())
}
