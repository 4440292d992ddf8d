use std::io;

use serde::Deserialize;

use super::error::Result;
use super::cases::{CaseRecord,parse_date,region_key};


pub const URL : &str = "https://raw.githubusercontent.com/3778/COVID-19/master/data/latest_cases_ms.csv";


#[derive(Deserialize,Debug)]
#[serde(rename_all = "camelCase")]
struct Row {
    date: String,
    estado: Option<String>,
    casos_novos: Option<f64>,
    casos_acumulados: Option<f64>
}


/// State-level rows of the health ministry export. The file is
/// semicolon-separated and its dates are written day first. National
/// and regional summary rows have no `estado` and are skipped.
pub fn records<R: io::Read>(reader: R) -> Result<Vec<CaseRecord>> {

    let mut records = Vec::new();
    let reader = csv::ReaderBuilder::new().delimiter(b';').from_reader(reader);

    for row in reader.into_deserialize::<Row>() {
	let row : Row = row?;
	let region = match region_key(row.estado) {
	    Some(estado) => estado,
	    None => continue
	};
	records.push(CaseRecord {
	    date: parse_date(&row.date, true)?,
	    region,
	    new_cases: row.casos_novos.unwrap_or(0.0),
	    total_cases: row.casos_acumulados.unwrap_or(0.0)
	});
    }

    Ok(records)

}
