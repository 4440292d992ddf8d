use std::io;

use serde::Deserialize;

use super::error::Result;
use super::cases::{CaseRecord,Level,parse_date,region_key};


pub const URL : &str = "https://raw.githubusercontent.com/wcota/covid19br/master/cases-brazil-cities-time.csv";

/// State value of the nationwide summary rows.
const TOTAL : &str = "TOTAL";


#[derive(Deserialize,Debug)]
#[serde(rename_all = "camelCase")]
struct Row {
    date: String,
    state: String,
    city: Option<String>,
    new_cases: Option<f64>,
    total_cases: Option<f64>
}


pub fn records<R: io::Read>(reader: R, level: Level) -> Result<Vec<CaseRecord>> {

    let mut records = Vec::new();

    for row in csv::Reader::from_reader(reader).into_deserialize::<Row>() {
	let row : Row = row?;
	if row.state == TOTAL {
	    continue;
	}
	let region = match level {
	    Level::State => region_key(Some(row.state)),
	    Level::City => region_key(row.city)
	};
	let region = match region {
	    Some(region) => region,
	    None => continue
	};
	records.push(CaseRecord {
	    date: parse_date(&row.date, false)?,
	    region,
	    new_cases: row.new_cases.unwrap_or(0.0),
	    total_cases: row.total_cases.unwrap_or(0.0)
	});
    }

    Ok(records)

}
