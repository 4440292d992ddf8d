//! Long-form tables built from repeated simulation runs, and the per
//! time-step summary bands that the charts draw.

use std::io;
use std::cmp::Ordering;

use chrono::{Duration,NaiveDate,NaiveDateTime,NaiveTime};
use ndarray::Array2;
use serde::Deserialize;
use serde_json::{Map,Value,json};

use super::error::{Result,Error};


pub const DAY_COLUMN : &str = "Dias";
pub const DATE_COLUMN : &str = "Datas";


/// Simulated compartments that get their own band and color.
#[derive(Clone,Copy,Debug,PartialEq,Eq,Hash)]
pub enum Compartment {
    Exposed,
    Infected,
    Death
}

impl Compartment {

    pub fn name(&self) -> &'static str {
	match self {
	    Self::Exposed => "Exposto",
	    Self::Infected => "Infectado",
	    Self::Death => "Óbito"
	}
    }

    pub fn color(&self) -> &'static str {
	match self {
	    Self::Exposed => "#1f77b4",
	    Self::Infected => "#ff7f0e",
	    Self::Death => "#ff004d"
	}
    }

}


/// Simulator output as written to disk: one (iteration × time-step)
/// matrix per compartment.
#[derive(Deserialize,Debug)]
pub struct SimulationOutput {
    pub t_space: Vec<f64>,
    #[serde(alias = "E")]
    pub exposed: Vec<Vec<f64>>,
    #[serde(alias = "I")]
    pub infected: Vec<Vec<f64>>,
    #[serde(alias = "R", default)]
    pub removed: Vec<Vec<f64>>
}

pub fn to_array(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let ncols = rows.first().map_or(0, |row| row.len());
    if let Some(row) = rows.iter().find(|row| row.len() != ncols) {
	return Err(Error::ShapeMismatch("matrix row length", ncols, row.len()));
    }
    Ok(Array2::from_shape_vec((rows.len(), ncols), rows.concat())?)
}

/// Headerless numeric CSV, one matrix row per line.
pub fn read_matrix<R: io::Read>(reader: R) -> Result<Array2<f64>> {
    let rows = csv::ReaderBuilder::new().has_headers(false).from_reader(reader)
	.into_deserialize::<Vec<f64>>().collect::<std::result::Result<Vec<_>,_>>()?;
    to_array(&rows)
}


/// Long-form table: one row per (iteration, time-step).
#[derive(Clone,Debug,PartialEq)]
pub struct IterationFrame {
    pub iteration: Vec<usize>,
    pub days: Vec<f64>,
    pub columns: Vec<(String,Vec<f64>)>
}

impl IterationFrame {

    pub fn len(&self) -> usize {
	self.days.len()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
	self.columns.iter().find(|(n,_)| n == name).map(|(_,c)| c.as_slice())
    }

}

pub fn unstack_iterations_ndarray(arr: &Array2<f64>, t_space: &[f64],
				  name: &str) -> Result<IterationFrame> {

    if t_space.len() != arr.ncols() {
	return Err(Error::ShapeMismatch("time steps", arr.ncols(), t_space.len()));
    }

    let mut iteration = Vec::with_capacity(arr.len());
    let mut days = Vec::with_capacity(arr.len());
    let mut values = Vec::with_capacity(arr.len());

    for (i,row) in arr.outer_iter().enumerate() {
	for (day,value) in t_space.iter().zip(row.iter()) {
	    iteration.push(i);
	    days.push(*day);
	    values.push(*value);
	}
    }

    Ok(IterationFrame { iteration, days, columns: vec![(name.to_string(), values)] })

}


#[derive(Clone,Copy,Debug,PartialEq)]
pub struct BandRow {
    pub day: f64,
    pub mean: f64,
    pub std: f64,
    pub upper: f64,
    pub lower: f64
}

/// Mean ± one standard deviation of a variable per time-step.
#[derive(Clone,Debug,PartialEq)]
pub struct Bands {
    pub variable: String,
    pub rows: Vec<BandRow>
}

impl Bands {

    pub fn column_names(&self) -> [String; 4] {
	["mean", "std", "upper", "lower"].map(|stat| format!("{}_{}", self.variable, stat))
    }

}

pub fn compute_mean_and_boundaries(frame: &IterationFrame, variable: &str) -> Result<Bands> {

    let values = frame.column(variable)
	.ok_or_else(|| Error::MissingColumn(variable.to_string()))?;

    let mut pairs : Vec<(f64,f64)> = frame.days.iter().cloned()
	.zip(values.iter().cloned()).collect();
    pairs.sort_by(|a,b| a.0.total_cmp(&b.0));

    let mut rows = Vec::new();
    let mut start = 0;

    while start < pairs.len() {
	let day = pairs[start].0;
	let end = start + pairs[start..].iter()
	    .take_while(|(d,_)| d.total_cmp(&day) == Ordering::Equal).count();
	let (mean,std) = mean_std(pairs[start..end].iter().map(|(_,v)| *v));
	rows.push(BandRow { day, mean, std, upper: mean + std, lower: mean - std });
	start = end;
    }

    Ok(Bands { variable: variable.to_string(), rows })

}

/// Mean and sample standard deviation, skipping NaN.
fn mean_std<I: Iterator<Item = f64>>(values: I) -> (f64,f64) {
    let values : Vec<f64> = values.filter(|v| !v.is_nan()).collect();
    let n = values.len() as f64;
    let mean = match values.is_empty() {
	true => f64::NAN,
	false => values.iter().sum::<f64>() / n
    };
    let std = match values.len() > 1 {
	false => f64::NAN,
	true => (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    };
    (mean, std)
}


/// Band columns of one or more variables keyed by time-step, with the
/// calendar date of each step once a start date is known.
#[derive(Clone,Debug,PartialEq)]
pub struct PlotData {
    pub days: Vec<f64>,
    pub dates: Vec<NaiveDateTime>,
    pub columns: Vec<(String,Vec<f64>)>
}

impl From<&Bands> for PlotData {
    fn from(bands: &Bands) -> Self {
	let [mean,std,upper,lower] = bands.column_names();
	Self {
	    days: bands.rows.iter().map(|r| r.day).collect(),
	    dates: vec![],
	    columns: vec![
		(mean, bands.rows.iter().map(|r| r.mean).collect()),
		(std, bands.rows.iter().map(|r| r.std).collect()),
		(upper, bands.rows.iter().map(|r| r.upper).collect()),
		(lower, bands.rows.iter().map(|r| r.lower).collect())
	    ]
	}
    }
}

impl PlotData {

    pub fn len(&self) -> usize {
	self.days.len()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
	self.columns.iter().find(|(n,_)| n == name).map(|(_,c)| c.as_slice())
    }

    /// Left join on the time-step. Both sides must have unique keys;
    /// steps missing on the right get NaN.
    pub fn merge_one_to_one(mut self, other: PlotData) -> Result<PlotData> {

	unique_keys(&self.days, "left")?;
	unique_keys(&other.days, "right")?;

	let index : Vec<Option<usize>> = self.days.iter().map(
	    |day| other.days.iter().position(|d| d.total_cmp(day) == Ordering::Equal)
	).collect();

	for (name,values) in other.columns {
	    let joined = index.iter().map(|i| i.map_or(f64::NAN, |i| values[i])).collect();
	    self.columns.push((name, joined));
	}

	Ok(self)

    }

    pub fn with_dates(mut self, start: NaiveDate) -> Result<Self> {
	self.dates = self.days.iter().map(|offset| offset_datetime(start, *offset))
	    .collect::<Result<_>>()?;
	Ok(self)
    }

    pub fn rename(&mut self, from: &str, to: &str) {
	if let Some((name,_)) = self.columns.iter_mut().find(|(n,_)| n == from) {
	    *name = to.to_string();
	}
    }

    /// Replaces every value at or below zero by 1.0, so the table can be
    /// drawn on a log scale.
    pub fn clamp_non_positive(&mut self) {
	for (_,values) in self.columns.iter_mut() {
	    for value in values.iter_mut().filter(|v| **v <= 0.0) {
		*value = 1.0;
	    }
	}
    }

    /// Rounds to whole numbers, ties to even.
    pub fn round(&mut self, name: &str) {
	if let Some((_,values)) = self.columns.iter_mut().find(|(n,_)| n == name) {
	    values.iter_mut().for_each(|v| *v = v.round_ties_even());
	}
    }

    /// Rows as JSON objects, the way chart data values are embedded.
    pub fn records(&self) -> Vec<Value> {
	(0..self.len()).map(|i| {
	    let mut row = Map::new();
	    row.insert(DAY_COLUMN.to_string(), json!(self.days[i]));
	    if let Some(date) = self.dates.get(i) {
		row.insert(DATE_COLUMN.to_string(), json!(format_datetime(date)));
	    }
	    for (name,values) in &self.columns {
		row.insert(name.clone(), json!(values[i]));
	    }
	    Value::Object(row)
	}).collect()
    }

}

fn unique_keys(days: &[f64], side: &str) -> Result<()> {
    let mut sorted = days.to_vec();
    sorted.sort_by(f64::total_cmp);
    match sorted.windows(2).find(|w| w[0].total_cmp(&w[1]) == Ordering::Equal) {
	Some(w) => Err(Error::MergeCardinality(format!(
	    "{} {} appears more than once on the {} side", DAY_COLUMN, w[0], side))),
	None => Ok(())
    }
}

/// Midnight of `start` plus a possibly fractional number of days.
pub fn offset_datetime(start: NaiveDate, offset: f64) -> Result<NaiveDateTime> {
    let millis = (offset * 86_400_000.0).round();
    match millis.is_finite() && millis.abs() < i64::MAX as f64 {
	false => Err(Error::DateOutOfRange(offset)),
	true => start.and_time(NaiveTime::MIN)
	    .checked_add_signed(Duration::milliseconds(millis as i64))
	    .ok_or(Error::DateOutOfRange(offset))
    }
}

pub fn format_datetime(date: &NaiveDateTime) -> String {
    date.format("%Y-%m-%dT%H:%M:%S").to_string()
}


pub fn prep_tidy_data_to_plot(exposed: &Array2<f64>, infected: &Array2<f64>,
			      t_space: &[f64], start_date: NaiveDate) -> Result<PlotData> {

    let e = Compartment::Exposed.name();
    let i = Compartment::Infected.name();

    let bands_e = compute_mean_and_boundaries(&unstack_iterations_ndarray(exposed, t_space, e)?, e)?;
    let bands_i = compute_mean_and_boundaries(&unstack_iterations_ndarray(infected, t_space, i)?, i)?;

    Ok(PlotData::from(&bands_e)
       .merge_one_to_one(PlotData::from(&bands_i))?
       .with_dates(start_date)?)

}

pub fn prep_death_data_to_plot(removed: &Array2<f64>, t_space: &[f64],
			       start_date: NaiveDate) -> Result<PlotData> {
    let r = Compartment::Death.name();
    let bands = compute_mean_and_boundaries(&unstack_iterations_ndarray(removed, t_space, r)?, r)?;
    PlotData::from(&bands).with_dates(start_date)
}


pub const DERIVATIVE_DAY_COLUMN : &str = "day";

/// Derived demand series (beds, ventilators, ...) indexed by day offset.
#[derive(Clone,Debug,PartialEq)]
pub struct Derivatives {
    pub days: Vec<f64>,
    pub series: Vec<(String,Vec<f64>)>
}

impl Derivatives {

    pub fn read<R: io::Read>(reader: R) -> Result<Self> {

	let mut reader = csv::Reader::from_reader(reader);
	let headers = reader.headers()?.clone();
	let day = headers.iter().position(|h| h == DERIVATIVE_DAY_COLUMN)
	    .ok_or_else(|| Error::MissingColumn(DERIVATIVE_DAY_COLUMN.to_string()))?;

	let mut days = Vec::new();
	let mut series : Vec<(String,Vec<f64>)> = headers.iter().enumerate()
	    .filter(|(i,_)| *i != day).map(|(_,h)| (h.to_string(), vec![])).collect();

	for record in reader.records() {
	    let values : Vec<Option<f64>> = record?.deserialize(None)?;
	    for (i,value) in values.into_iter().map(|v| v.unwrap_or(f64::NAN)).enumerate() {
		match i.cmp(&day) {
		    Ordering::Equal => days.push(value),
		    Ordering::Less => series[i].1.push(value),
		    Ordering::Greater => series[i - 1].1.push(value)
		}
	    }
	}

	Ok(Self { days, series })

    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
	self.series.iter().map(|(name,_)| name.as_str())
    }

}
