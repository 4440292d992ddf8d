use std::io;
use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::Deserialize;

use super::error::Result;
use super::cases::{CaseRecord,Level,parse_date,region_key};


pub const URL : &str = "https://bigdata-covid19.icict.fiocruz.br/sd/dados_casos.csv";

const STATE_PREFIX : &str = "#BR";
const CITY_PREFIX : &str = "#Mun BR";

lazy_static! {
    static ref STATE_CODES : HashMap<&'static str,&'static str> = vec![
	("Acre", "AC"),
	("Alagoas", "AL"),
	("Amapá", "AP"),
	("Amazonas", "AM"),
	("Bahia", "BA"),
	("Ceará", "CE"),
	("Distrito Federal", "DF"),
	("Espírito Santo", "ES"),
	("Goiás", "GO"),
	("Maranhão", "MA"),
	("Mato Grosso", "MT"),
	("Mato Grosso do Sul", "MS"),
	("Minas Gerais", "MG"),
	("Pará", "PA"),
	("Paraíba", "PB"),
	("Paraná", "PR"),
	("Pernambuco", "PE"),
	("Piauí", "PI"),
	("Rio de Janeiro", "RJ"),
	("Rio Grande do Norte", "RN"),
	("Rio Grande do Sul", "RS"),
	("Rondônia", "RO"),
	("Roraima", "RR"),
	("Santa Catarina", "SC"),
	("São Paulo", "SP"),
	("Sergipe", "SE"),
	("Tocantins", "TO")
    ].into_iter().collect();
}


#[derive(Deserialize,Debug)]
struct Row {
    name: Option<String>,
    date: String,
    new_cases: Option<f64>
}


/// Aggregate rows of the fiocruz export. State rows are named
/// `#BR: <state name>`, city rows `#Mun BR: <city> <UF>`. The export has
/// no running total, so `total_cases` is accumulated here per region in
/// date order.
pub fn records<R: io::Read>(reader: R, level: Level) -> Result<Vec<CaseRecord>> {

    let mut records = Vec::new();

    for row in csv::Reader::from_reader(reader).into_deserialize::<Row>() {
	let row : Row = row?;
	let region = match row.name.as_ref().and_then(|name| region(name, level)) {
	    Some(region) => region,
	    None => continue
	};
	records.push(CaseRecord {
	    date: parse_date(&row.date, false)?,
	    region,
	    new_cases: row.new_cases.unwrap_or(0.0),
	    total_cases: 0.0
	});
    }

    records.sort_by_key(|r| r.date);

    let mut totals = HashMap::new();
    for record in records.iter_mut() {
	let total = totals.entry(record.region.clone()).or_insert(0.0);
	*total += record.new_cases;
	record.total_cases = *total;
    }

    Ok(records)

}


fn region(name: &str, level: Level) -> Option<String> {
    match level {
	Level::State => match name.starts_with(STATE_PREFIX) {
	    false => None,
	    true => region_key(Some(name.chars().skip(5).collect())).map(
		|state| match STATE_CODES.get(state.as_str()) {
		    Some(code) => code.to_string(),
		    None => state
		})
	},
	Level::City => match name.starts_with(CITY_PREFIX) {
	    false => None,
	    true => region_key(Some(name.chars().skip(9).collect())).map(|city| city_key(&city))
	}
    }
}

/// `São Paulo SP` -> `São Paulo/SP`
fn city_key(city: &str) -> String {
    match city.rsplit_once(' ') {
	Some((name,state)) => format!("{}/{}", name, state),
	None => city.to_string()
    }
}


#[cfg(test)]
mod tests {

    use super::*;
    use chrono::naive::NaiveDate;
    use crate::cases::{CasesTable,Measure};

    const SAMPLE : &str = "\
name,date,new_cases,new_deaths
#BR: São Paulo,2020-03-21,66,6
#BR: São Paulo,2020-03-20,110,5
#BR: Acre,2020-03-20,3,0
#BR: Acre,2020-03-21,,0
#BR: Atlântida,2020-03-21,1,0
#Mun BR: São Paulo SP,2020-03-20,47,4
#Mun BR: São Paulo SP,2020-03-21,50,2
#Mun BR: Rio Branco AC,2020-03-21,2,0
#Reg BR: Sudeste,2020-03-20,200,7
";

    fn day(d: u32) -> NaiveDate {
	NaiveDate::from_ymd_opt(2020, 3, d).unwrap()
    }

    #[test]
    fn state_rows_use_state_codes() {
	let table = CasesTable::from_records(records(SAMPLE.as_bytes(), Level::State).unwrap()).unwrap();
	assert_eq!(table.regions(), &["AC".to_string(), "Atlântida".to_string(), "SP".to_string()]);
	assert_eq!(table.get(Measure::NewCases, "SP", day(20)), Some(110));
	assert_eq!(table.get(Measure::NewCases, "AC", day(21)), Some(0));
    }

    #[test]
    fn totals_accumulate_in_date_order() {
	let table = CasesTable::from_records(records(SAMPLE.as_bytes(), Level::State).unwrap()).unwrap();
	assert_eq!(table.column(Measure::TotalCases, "SP"), Some(&[110, 176][..]));
	assert_eq!(table.column(Measure::TotalCases, "AC"), Some(&[3, 3][..]));
	for region in ["AC", "SP"].iter() {
	    let totals = table.column(Measure::TotalCases, region).unwrap();
	    assert!(totals.windows(2).all(|w| w[0] <= w[1]));
	}
    }

    #[test]
    fn city_rows_get_composite_keys() {
	let table = CasesTable::from_records(records(SAMPLE.as_bytes(), Level::City).unwrap()).unwrap();
	assert_eq!(table.regions(), &["Rio Branco/AC".to_string(), "São Paulo/SP".to_string()]);
	assert_eq!(table.get(Measure::NewCases, "São Paulo/SP", day(20)), Some(47));
	assert_eq!(table.column(Measure::TotalCases, "São Paulo/SP"), Some(&[47, 97][..]));
    }

    #[test]
    fn bare_prefixes_are_not_regions() {
	let sample = "name,date,new_cases\n#BR: ,2020-03-20,9\n#Mun BR: ,2020-03-20,4\n#BR: Acre,2020-03-20,3\n";
	let states = records(sample.as_bytes(), Level::State).unwrap();
	assert_eq!(states.iter().map(|r| r.region.as_str()).collect::<Vec<_>>(), vec!["AC"]);
	assert!(records(sample.as_bytes(), Level::City).unwrap().is_empty());
	assert_eq!(region("#BR:", Level::State), None);
    }

    #[test]
    fn moves_trailing_state_behind_slash() {
	assert_eq!(city_key("São Paulo SP"), "São Paulo/SP");
	assert_eq!(city_key("Mauá SP"), "Mauá/SP");
	assert_eq!(city_key("Brasília"), "Brasília");
    }

}
