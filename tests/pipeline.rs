use locusfit::prelude::*;
use locusfit::report::write_report;
use std::fmt::Write as _;
use std::fs;

const ALLELES: [(&str, &str); 4] = [("A", "G"), ("C", "T"), ("A", "C"), ("G", "T")];

/// 24 loci, the last 6 monomorphic, two cohorts and four years.
fn write_table(path: &std::path::Path) -> std::io::Result<()> {
    let mut csv = String::from("fish,mo_da,collection,Locus_new,genotype,sex,age_spawn,year\n");
    let mut fish = 0;
    for locus in 0..24 {
        let (a1, a2) = ALLELES[locus % ALLELES.len()];
        let genotypes: Vec<String> = if locus < 18 {
            vec![format!("{}/{}", a1, a1), format!("{}/{}", a2, a1), format!("{}/{}", a2, a2)]
        } else {
            vec![format!("{}/{}", a1, a1)]
        };
        for collection in ["Nimbus", "Coleman"] {
            for (y, year) in [2009, 2010, 2011, 2012].iter().enumerate() {
                for (k, g) in genotypes.iter().enumerate() {
                    for rep in 0..3 {
                        fish += 1;
                        let mo_da = 4.0 + 0.4 * k as f64 + 0.8 * y as f64 + 0.03 * ((fish % 11) as f64);
                        let sex = ["F", "M", "?"][rep];
                        let age = 3 + (fish % 2);
                        writeln!(
                            csv,
                            "f{},{:.3},{},Ots_{},{},{},{},{}",
                            fish, mo_da, collection, locus, g, sex, age, year
                        )
                        .unwrap();
                    }
                }
            }
        }
    }
    // A row without a locus is carried through loading and left out of every subset
    csv.push_str("f0,4.5,Nimbus,NA,NA,F,4,2010\n");
    fs::write(path, csv)
}

fn config() -> PipelineConfig {
    PipelineConfig {
        enrich: EnrichOptions {
            nh_label: "Nimbus".into(),
            ..EnrichOptions::default()
        },
        ..PipelineConfig::default()
    }
}

#[test]
fn test_reference_layout_yields_108_tasks() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("fish.csv");
    write_table(&path)?;

    let observations = load_observations(&path)?;
    assert_eq!(observations.len(), 18 * 2 * 4 * 3 * 3 + 6 * 2 * 4 * 3 + 1);

    let pipeline = Pipeline::new(config());
    let enriched = enrich(&observations, &pipeline.config().enrich);
    assert_eq!(enriched.len(), observations.len());

    let plan = pipeline.plan(&enriched);
    assert_eq!(plan.catalogs.len(), 18);
    assert_eq!(plan.monomorphic.len(), 6);
    assert!(plan.locus_failures.is_empty());
    assert_eq!(plan.tasks.len(), 108);
    assert!(plan.tasks.iter().all(|t| t.catalog.len() == 3));
    Ok(())
}

#[test]
fn test_full_run_accounts_for_every_task() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("fish.csv");
    write_table(&path)?;

    let report = Pipeline::new(config()).run(&load_observations(&path)?);
    assert_eq!(report.fits.len() + report.failures.len(), 108);
    assert!(report.failures.is_empty(), "{}", report.summary());

    let record = &report.fits[0];
    assert_eq!(record.key.to_string(), "CV/Ots_0/age");
    assert!(record.model.coefficient("d_add").is_some());

    let out = dir.path().join("out");
    write_report(&report, &out)?;
    let coefficients = fs::read_to_string(out.join("coefficients.csv"))?;
    assert!(coefficients.lines().count() > 108);
    Ok(())
}
