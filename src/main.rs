//! # locusfit
//!
//! Batch fit of per-locus genotype effects on migration timing.
//!
//! ```bash
//! RUST_LOG=info locusfit fish.csv --out-dir results --threads 8
//! ```

mod config;

use config::Config;
use locusfit::observable::CsvBuilder;
use locusfit::pipeline::Pipeline;
use locusfit::report::write_report;
use log::info;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let start = Instant::now();

    let config = Config::parse_and_validate()?;
    if config.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build_global()?;
    }

    let observations = CsvBuilder::new()
        .delimiter(config.delimiter_byte())
        .load(&config.input)?;

    let report = Pipeline::new(config.pipeline()).run(&observations);
    write_report(&report, &config.out_dir)?;

    eprint!("{}", report.summary());
    info!("Completed in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}
