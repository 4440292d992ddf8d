use std::io;
use std::fmt;
use std::str::FromStr;
use std::collections::{BTreeMap,BTreeSet};

use chrono::naive::NaiveDate;
use encoding_rs::mem::decode_latin1;
use log::{info,debug,warn};

use super::error::{Result,Error};
use super::graph::{Series,CasesData};
use super::population::Population;
use super::{ms,wcota,fiocruz};


/// Regional aggregation level of the case tables.
#[derive(Clone,Copy,Debug,PartialEq,Eq,PartialOrd,Ord,Hash)]
pub enum Level {
    State,
    City
}

impl Level {

    pub fn name(&self) -> &'static str {
	match self {
	    Self::State => "state",
	    Self::City => "city"
	}
    }

    pub fn title(&self) -> &'static str {
	match self {
	    Self::State => "estado",
	    Self::City => "município"
	}
    }

}

impl FromStr for Level {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
	match s {
	    "state" => Ok(Self::State),
	    "city" => Ok(Self::City),
	    other => Err(Error::UnknownLevel(other.to_string()))
	}
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	write!(f, "{}", self.name())
    }
}


/// Upstream case data providers. Each one has its own schema, normalized
/// into `CaseRecord`s by the module of the same name.
#[derive(Clone,Copy,Debug,PartialEq,Eq,Hash)]
pub enum Source {
    Ms,
    Wcota,
    Fiocruz
}

impl Source {

    pub fn name(&self) -> &'static str {
	match self {
	    Self::Ms => "ms",
	    Self::Wcota => "wcota",
	    Self::Fiocruz => "fiocruz"
	}
    }

    /// Fails for level/source combinations the provider has no data for.
    pub fn check(&self, level: Level) -> Result<()> {
	match (self, level) {
	    (Self::Ms, Level::City) => Err(Error::UnsupportedLevel(self.name(), level.name())),
	    _ => Ok(())
	}
    }

    pub fn records<R: io::Read>(&self, reader: R, level: Level) -> Result<Vec<CaseRecord>> {
	self.check(level)?;
	let records = match self {
	    Self::Ms => ms::records(reader)?,
	    Self::Wcota => wcota::records(reader, level)?,
	    Self::Fiocruz => fiocruz::records(reader, level)?
	};
	debug!("{}: {} case records by {}", self.name(), records.len(), level);
	Ok(records)
    }

}

impl FromStr for Source {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
	match s {
	    "ms" => Ok(Self::Ms),
	    "wcota" => Ok(Self::Wcota),
	    "fiocruz" => Ok(Self::Fiocruz),
	    other => Err(Error::UnknownSource(other.to_string()))
	}
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	write!(f, "{}", self.name())
    }
}


#[derive(Clone,Debug)]
pub struct Endpoints {
    pub ms: String,
    pub wcota: String,
    pub fiocruz: String
}

impl Default for Endpoints {
    fn default() -> Self {
	Self {
	    ms: ms::URL.to_string(),
	    wcota: wcota::URL.to_string(),
	    fiocruz: fiocruz::URL.to_string()
	}
    }
}

impl Endpoints {
    pub fn url(&self, source: Source) -> &str {
	match source {
	    Source::Ms => &self.ms,
	    Source::Wcota => &self.wcota,
	    Source::Fiocruz => &self.fiocruz
	}
    }
}


#[derive(Clone,Copy,Debug,PartialEq,Eq,PartialOrd,Ord,Hash)]
pub enum Measure {
    NewCases,
    TotalCases
}

impl Measure {

    pub fn name(&self) -> &'static str {
	match self {
	    Self::NewCases => "newCases",
	    Self::TotalCases => "totalCases"
	}
    }

}


/// One normalized row of an upstream table. Counts stay floating point
/// until the pivot so that empty cells and partial sums behave like
/// missing values.
#[derive(Clone,Debug,PartialEq)]
pub struct CaseRecord {
    pub date: NaiveDate,
    pub region: String,
    pub new_cases: f64,
    pub total_cases: f64
}


/// Wide case table: ascending dates by (measure, region) columns.
#[derive(Clone,Debug,PartialEq)]
pub struct CasesTable {
    dates: Vec<NaiveDate>,
    regions: Vec<String>,
    columns: BTreeMap<(Measure,String),Vec<i64>>
}

impl CasesTable {

    pub fn from_records(records: Vec<CaseRecord>) -> Result<Self> {

	let mut sums = BTreeMap::new();

	for record in records {
	    let ent = sums.entry((record.date, record.region)).or_insert((0.0,0.0));
	    ent.0 += record.new_cases;
	    ent.1 += record.total_cases;
	}

	if sums.is_empty() {
	    return Err(Error::MissingData);
	}

	let dates : Vec<NaiveDate> = sums.keys().map(|(date,_)| *date)
	    .collect::<BTreeSet<_>>().into_iter().collect();
	let regions : Vec<String> = sums.keys().map(|(_,region)| region.clone())
	    .collect::<BTreeSet<_>>().into_iter().collect();

	let mut columns = BTreeMap::new();
	for region in &regions {
	    let (new_cases, total_cases) : (Vec<i64>,Vec<i64>) = dates.iter().map(
		|date| match sums.get(&(*date, region.clone())) {
		    Some((new,total)) => (*new as i64, *total as i64),
		    None => (0, 0)
		}).unzip();
	    columns.insert((Measure::NewCases, region.clone()), new_cases);
	    columns.insert((Measure::TotalCases, region.clone()), total_cases);
	}

	Ok(Self { dates, regions, columns })

    }

    pub fn dates(&self) -> &[NaiveDate] {
	&self.dates
    }

    pub fn regions(&self) -> &[String] {
	&self.regions
    }

    /// Column keys in (measure, region) order.
    pub fn column_keys(&self) -> impl Iterator<Item = &(Measure,String)> {
	self.columns.keys()
    }

    pub fn column(&self, measure: Measure, region: &str) -> Option<&[i64]> {
	self.columns.get(&(measure, region.to_string())).map(|c| c.as_slice())
    }

    pub fn get(&self, measure: Measure, region: &str, date: NaiveDate) -> Option<i64> {
	let i = self.dates.binary_search(&date).ok()?;
	self.column(measure, region).map(|c| c[i])
    }

    pub fn series(&self, measure: Measure, region: &str) -> Result<Series> {
	let column = self.column(measure, region)
	    .ok_or_else(|| Error::MissingRegion(region.to_string()))?;
	Ok(self.dates.iter().cloned().zip(column.iter().map(|v| *v as f64)).collect())
    }

    pub fn cases_data(&self, measure: Measure, regions: &[String]) -> Result<CasesData> {
	regions.iter().map(
	    |region| Ok((region.clone(), self.series(measure, region)?))
	).collect()
    }

    /// The `n` regions with the highest peak of `measure`.
    pub fn top_regions(&self, measure: Measure, n: usize) -> Vec<String> {
	let mut peaks : Vec<(i64,&String)> = self.regions.iter().filter_map(
	    |region| self.column(measure, region)
		.and_then(|c| c.iter().max())
		.map(|peak| (*peak, region))
	).collect();
	peaks.sort_by(|a,b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
	peaks.into_iter().take(n).map(|(_,region)| region.clone()).collect()
    }

    /// Measure per 100k inhabitants. Regions missing from the population
    /// table are skipped.
    pub fn per_100k(&self, measure: Measure, regions: &[String],
		    population: &Population) -> Result<CasesData> {
	let mut data = Vec::new();
	for region in regions {
	    match population.get(region) {
		Some(pop) if *pop > 0 => data.push((region.clone(), self.series(measure, region)?
						    .into_iter().map(|(date,v)| (date, v * 1e5 / *pop as f64))
						    .collect())),
		_ => warn!("No population for region {}, skipped", region)
	    }
	}
	Ok(data)
    }

    /// Writes the table with a two-row (measure, region) header.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {

	let mut out = csv::Writer::from_writer(writer);

	out.write_record(Some("measure").into_iter()
			 .chain(self.columns.keys().map(|(measure,_)| measure.name())))?;
	out.write_record(Some("region").into_iter()
			 .chain(self.columns.keys().map(|(_,region)| region.as_str())))?;

	for (i,date) in self.dates.iter().enumerate() {
	    out.write_record(Some(date.format("%Y-%m-%d").to_string()).into_iter()
			     .chain(self.columns.values().map(|c| c[i].to_string())))?;
	}

	out.flush()?;
	Ok(())

    }

}


pub fn load_cases(level: Level, source: Source) -> Result<CasesTable> {
    load_cases_from(&Endpoints::default(), level, source)
}

pub fn load_cases_from(endpoints: &Endpoints, level: Level, source: Source) -> Result<CasesTable> {
    source.check(level)?;
    let text = download(endpoints.url(source))?;
    let table = CasesTable::from_records(source.records(text.as_bytes(), level)?)?;
    info!("Loaded {} regions over {} days from {}",
	  table.regions().len(), table.dates().len(), source);
    Ok(table)
}


fn download(url: &str) -> Result<String> {

    info!("Downloading {}...", url);

    let res = reqwest::blocking::get(url)?;

    match res.status().as_u16() {
	200 => Ok(decode_text(&res.bytes()?)),
	_ => Err(Error::HttpError(res.status())),
    }

}

fn decode_text(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
	Ok(text) => text.to_string(),
	Err(_) => decode_latin1(bytes).into_owned()
    };
    text.trim_start_matches('\u{feff}').to_string()
}


/// Parses the date part of a date or datetime cell. ISO dates are always
/// accepted; otherwise slashed dates are read day-first or month-first.
pub fn parse_date(value: &str, day_first: bool) -> Result<NaiveDate> {
    let value = value.trim();
    let value = value.split(|c| c == ' ' || c == 'T').next().unwrap_or(value);
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
	Ok(date) => Ok(date),
	Err(_) => Ok(NaiveDate::parse_from_str(value, match day_first {
	    true => "%d/%m/%Y",
	    false => "%m/%d/%Y"
	})?)
    }
}

/// Blank region cells are not regions; rows carrying one are dropped.
pub fn region_key(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
