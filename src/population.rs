use std::io;
use std::fs::File;
use std::path::Path;
use std::collections::BTreeMap;

use log::info;
use serde::Deserialize;

use super::error::Result;
use super::cases::{Level,region_key};


pub const PATH : &str = "data/ibge_population.csv";

pub type Population = BTreeMap<String,u64>;


#[derive(Deserialize,Debug)]
struct Row {
    uf: Option<String>,
    city: Option<String>,
    estimated_population: u64
}


/// IBGE population estimates keyed by state code or `city/UF`.
pub fn load_population(path: &Path, level: Level) -> Result<Population> {
    info!("Reading population estimates from {}", path.display());
    read_population(io::BufReader::new(File::open(path)?), level)
}

pub fn read_population<R: io::Read>(reader: R, level: Level) -> Result<Population> {

    let mut population = Population::new();

    for row in csv::Reader::from_reader(reader).into_deserialize::<Row>() {
	let row : Row = row?;
	let key = match (level, region_key(row.uf), region_key(row.city)) {
	    (Level::State, Some(uf), _) => uf,
	    (Level::City, Some(uf), Some(city)) => format!("{}/{}", city, uf),
	    _ => continue
	};
	*population.entry(key).or_insert(0) += row.estimated_population;
    }

    Ok(population)

}
