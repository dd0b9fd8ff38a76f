use crate::error::{Error, Result};
use crate::genetics::Genotype;
use crate::Observation;
use log::{debug, info};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Header positions of the columns an `Observation` is read from
#[derive(Clone, Debug)]
struct Fields {
    id: Option<usize>,
    mo_da: usize,
    cohort: usize,
    locus: usize,
    genotype: usize,
    sex: usize,
    age_spawn: usize,
    year: usize,
}

/// Produces `Observation`s from delimited data.
///
/// `Csv` is an iterator, so it can be collected directly or filtered
/// before collecting.
pub struct Csv {
    records: csv::StringRecordsIntoIter<Box<dyn Read>>,
    fields: Fields,
    separator: String,
    na: Vec<String>,
}

impl Csv {
    fn is_na(&self, value: &str) -> bool {
        self.na.iter().any(|na| na == value.trim())
    }

    fn text(&self, row: &csv::StringRecord, idx: usize) -> Option<String> {
        row.get(idx)
            .filter(|v| !self.is_na(v))
            .map(|v| v.trim().to_owned())
    }

    fn observation(&self, row: &csv::StringRecord) -> Result<Observation> {
        let line = row.position().map(|p| p.line());

        let mo_da = match self.text(row, self.fields.mo_da) {
            None => None,
            Some(v) => match v.parse::<f64>() {
                Ok(x) if x.is_nan() => None,
                Ok(x) if x.is_finite() => Some(x),
                _ => {
                    return Err(Error::data_load(
                        line,
                        format!("mo_da value `{}` is not a finite number", v),
                    ))
                }
            },
        };

        let genotype = match self.text(row, self.fields.genotype) {
            None => None,
            Some(v) => Some(Genotype::parse(&v, &self.separator).ok_or_else(|| {
                Error::data_load(
                    line,
                    format!("genotype `{}` is not two alleles separated by `{}`", v, self.separator),
                )
            })?),
        };

        Ok(Observation {
            id: self.fields.id.and_then(|idx| self.text(row, idx)),
            mo_da,
            cohort_label: self.text(row, self.fields.cohort).unwrap_or_default(),
            locus: self.text(row, self.fields.locus),
            genotype,
            sex: self.text(row, self.fields.sex),
            age_spawn: self.text(row, self.fields.age_spawn),
            year: self.text(row, self.fields.year),
        })
    }
}

impl Iterator for Csv {
    type Item = Result<Observation>;

    fn next(&mut self) -> Option<Result<Observation>> {
        match self.records.next()? {
            Ok(row) => Some(self.observation(&row)),
            Err(e) => {
                let line = e.position().map(|p| p.line());
                Some(Err(Error::data_load(line, e.to_string())))
            }
        }
    }
}

/// Configures how an observation table is read.
///
/// Column names default to the layout of the migration timing table:
/// `mo_da`, `collection`, `Locus_new`, `genotype`, `sex`, `age_spawn`
/// and `year`.
pub struct CsvBuilder {
    headers: bool,
    delimiter: u8,
    separator: String,
    id_field: Option<String>,
    mo_da_field: String,
    cohort_field: String,
    locus_field: String,
    genotype_field: String,
    sex_field: String,
    age_spawn_field: String,
    year_field: String,
    na: Vec<String>,
}

impl Default for CsvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvBuilder {
    /// Construct a new Csv builder
    pub fn new() -> Self {
        Self {
            headers: true,
            delimiter: b',',
            separator: "/".to_owned(),
            id_field: None,
            mo_da_field: "mo_da".to_owned(),
            cohort_field: "collection".to_owned(),
            locus_field: "Locus_new".to_owned(),
            genotype_field: "genotype".to_owned(),
            sex_field: "sex".to_owned(),
            age_spawn_field: "age_spawn".to_owned(),
            year_field: "year".to_owned(),
            na: vec!["".to_owned(), "NA".to_owned()],
        }
    }

    /// Without a header row, columns are read by position in the order
    /// `mo_da`, cohort, locus, genotype, `sex`, `age_spawn`, `year`, and
    /// the configured column names are not used.
    pub fn headers(&mut self, headers: bool) -> &mut Self {
        self.headers = headers;
        self
    }

    pub fn delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter = delimiter;
        self
    }

    /// Allele separator inside genotype strings
    pub fn separator(&mut self, separator: &str) -> &mut Self {
        self.separator = separator.to_owned();
        self
    }

    pub fn id_field(&mut self, id_field: &str) -> &mut Self {
        self.id_field = Some(id_field.to_owned());
        self
    }

    pub fn mo_da_field(&mut self, mo_da_field: &str) -> &mut Self {
        self.mo_da_field = mo_da_field.to_owned();
        self
    }

    pub fn cohort_field(&mut self, cohort_field: &str) -> &mut Self {
        self.cohort_field = cohort_field.to_owned();
        self
    }

    pub fn locus_field(&mut self, locus_field: &str) -> &mut Self {
        self.locus_field = locus_field.to_owned();
        self
    }

    pub fn genotype_field(&mut self, genotype_field: &str) -> &mut Self {
        self.genotype_field = genotype_field.to_owned();
        self
    }

    pub fn sex_field(&mut self, sex_field: &str) -> &mut Self {
        self.sex_field = sex_field.to_owned();
        self
    }

    pub fn age_spawn_field(&mut self, age_spawn_field: &str) -> &mut Self {
        self.age_spawn_field = age_spawn_field.to_owned();
        self
    }

    pub fn year_field(&mut self, year_field: &str) -> &mut Self {
        self.year_field = year_field.to_owned();
        self
    }

    /// Values read as missing, compared after trimming whitespace
    pub fn na(&mut self, na: &[&str]) -> &mut Self {
        self.na = na.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn from_reader(&self, reader: Box<dyn Read>) -> Result<Csv> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(self.headers)
            .delimiter(self.delimiter)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let fields = if self.headers {
            let headers = rdr.headers()?.clone();
            let position = |name: &str| -> Result<usize> {
                headers
                    .iter()
                    .position(|h| h == name)
                    .ok_or_else(|| Error::data_load(Some(1), format!("missing required column `{}`", name)))
            };
            Fields {
                id: match &self.id_field {
                    Some(name) => Some(position(name)?),
                    None => None,
                },
                mo_da: position(&self.mo_da_field)?,
                cohort: position(&self.cohort_field)?,
                locus: position(&self.locus_field)?,
                genotype: position(&self.genotype_field)?,
                sex: position(&self.sex_field)?,
                age_spawn: position(&self.age_spawn_field)?,
                year: position(&self.year_field)?,
            }
        } else {
            Fields {
                id: None,
                mo_da: 0,
                cohort: 1,
                locus: 2,
                genotype: 3,
                sex: 4,
                age_spawn: 5,
                year: 6,
            }
        };
        debug!("Column layout: {:?}", fields);

        Ok(Csv {
            records: rdr.into_records(),
            fields,
            separator: self.separator.clone(),
            na: self.na.clone(),
        })
    }

    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<Csv> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::data_load(None, format!("cannot open {}: {}", path.as_ref().display(), e))
        })?;
        self.from_reader(Box::new(file))
    }

    /// Reads a whole observation table.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Observation>> {
        let observations = self.from_path(path.as_ref())?.collect::<Result<Vec<_>>>()?;
        info!(
            "Loaded {} observations from {}",
            observations.len(),
            path.as_ref().display()
        );
        Ok(observations)
    }
}

/// Reads a whole observation table with the default layout.
pub fn load_observations<P: AsRef<Path>>(path: P) -> Result<Vec<Observation>> {
    CsvBuilder::new().load(path)
}
