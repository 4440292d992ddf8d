use std::{fs,io,process};
use std::fs::File;
use std::path::{PathBuf,Path};

use chrono::naive::NaiveDate;
use clap::{Args,Parser,Subcommand};
use log::{info,error};
use unidecode::unidecode;

use covid19_br_charts::{cases,population,tidy,ms,wcota,fiocruz};
use covid19_br_charts::cases::{Endpoints,Level,Measure,Source};
use covid19_br_charts::graph::{Charts,Scale,write_chart};
use covid19_br_charts::tidy::{Derivatives,SimulationOutput};
use covid19_br_charts::error::Result;


/// Brazilian COVID-19 case tables and simulation charts.
#[derive(Parser)]
#[command(name = "covid19-br-charts")]
struct Cli {
    /// Directory receiving tables, chart specs and pages
    #[arg(short, long, default_value = "graphs", global = true)]
    out: PathBuf,

    #[command(subcommand)]
    command: Command
}

#[derive(Subcommand)]
enum Command {
    /// Download case counts, pivot them by region and chart them
    Cases {
	/// state or city
	#[arg(long, default_value = "state")]
	by: Level,
	/// ms, wcota or fiocruz
	#[arg(long, default_value = "fiocruz")]
	source: Source,
	/// Regions to chart; defaults to the ones with most cases
	#[arg(long = "region")]
	regions: Vec<String>,
	/// Number of regions charted when none are given
	#[arg(long, default_value_t = 10)]
	top: usize,
	/// Population estimates, enables the per 100k chart
	#[arg(long, env = "COVID19_POPULATION_PATH")]
	population: Option<PathBuf>,
	#[command(flatten)]
	endpoints: EndpointArgs
    },
    /// Sum population estimates by state or city
    Population {
	#[arg(long, default_value = "state")]
	by: Level,
	#[arg(long, env = "COVID19_POPULATION_PATH", default_value = population::PATH)]
	population: PathBuf
    },
    /// Exposed, infected and death charts from simulator output (JSON)
    Simulation {
	input: PathBuf,
	/// Calendar date of time-step zero
	#[arg(long)]
	start: NaiveDate,
	/// log or linear
	#[arg(long, default_value = "log")]
	scale: Scale,
	/// Only draw the mean trajectories
	#[arg(long)]
	no_uncertainty: bool
    },
    /// Reproduction number chart from a sample × day CSV matrix
    R0 {
	input: PathBuf,
	/// Date of the last column
	#[arg(long)]
	date: NaiveDate,
	#[arg(long)]
	place: String,
	#[arg(long, default_value_t = 14)]
	min_days: usize
    },
    /// Demand charts from a CSV with a `day` offset column
    Derivatives {
	input: PathBuf,
	#[arg(long)]
	start: NaiveDate
    }
}

#[derive(Args)]
struct EndpointArgs {
    #[arg(long, env = "COVID19_MS_URL", default_value = ms::URL)]
    ms_url: String,
    #[arg(long, env = "COVID19_WCOTA_URL", default_value = wcota::URL)]
    wcota_url: String,
    #[arg(long, env = "COVID19_FIOCRUZ_URL", default_value = fiocruz::URL)]
    fiocruz_url: String
}

impl From<EndpointArgs> for Endpoints {
    fn from(args: EndpointArgs) -> Self {
	Self { ms: args.ms_url, wcota: args.wcota_url, fiocruz: args.fiocruz_url }
    }
}


fn main() {

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run(Cli::parse()) {
	error!("{}", err);
	process::exit(1);
    }

}


fn run(cli: Cli) -> Result<()> {

    let charts = Charts::init();
    let graph_path = cli.out;

    fs::create_dir_all(&graph_path)?;

    match cli.command {
	Command::Cases { by, source, regions, top, population, endpoints } =>
	    case_graphs(&charts, &graph_path, &endpoints.into(), by, source,
			regions, top, population.as_deref()),
	Command::Population { by, population } =>
	    population_table(&graph_path, by, &population),
	Command::Simulation { input, start, scale, no_uncertainty } =>
	    simulation_graphs(&charts, &graph_path, &input, start, scale, !no_uncertainty),
	Command::R0 { input, date, place, min_days } =>
	    r0_graph(&charts, &graph_path, &input, date, &place, min_days),
	Command::Derivatives { input, start } =>
	    derivative_graphs(&charts, &graph_path, &input, start)
    }

}


#[allow(clippy::too_many_arguments)]
fn case_graphs(charts: &Charts, graph_path: &Path, endpoints: &Endpoints, level: Level,
	       source: Source, regions: Vec<String>, top: usize,
	       population_path: Option<&Path>) -> Result<()> {

    let table = cases::load_cases_from(endpoints, level, source)?;
    let group = graph_path.join(format!("brazil/{}/{}", source, level));

    fs::create_dir_all(&group)?;
    let csv_path = group.join("cases.csv");
    table.write_csv(io::BufWriter::new(File::create(&csv_path)?))?;
    info!("Wrote {}", csv_path.display());

    let regions = match regions.is_empty() {
	true => table.top_regions(Measure::TotalCases, top),
	false => regions
    };

    charts.cases_graph(&group, level, &table.cases_data(Measure::TotalCases, &regions)?)?;
    charts.daily_graph(&group, level, &table.cases_data(Measure::NewCases, &regions)?)?;

    if let Some(path) = population_path {
	let population = population::load_population(path, level)?;
	charts.relative_graph(&group, level,
			      &table.per_100k(Measure::TotalCases, &regions, &population)?)?;
    }

    Ok(())

}


fn population_table(graph_path: &Path, level: Level, path: &Path) -> Result<()> {

    let population = population::load_population(path, level)?;
    let out_path = graph_path.join(format!("population-{}.csv", level));

    let mut out = csv::Writer::from_writer(io::BufWriter::new(File::create(&out_path)?));
    out.write_record(&[level.name(), "estimated_population"])?;
    for (region,count) in &population {
	out.write_record(&[region.clone(), count.to_string()])?;
    }
    out.flush()?;

    info!("Wrote {} regions to {}", population.len(), out_path.display());
    Ok(())

}


fn simulation_graphs(charts: &Charts, graph_path: &Path, input: &Path, start: NaiveDate,
		     scale: Scale, show_uncertainty: bool) -> Result<()> {

    let output : SimulationOutput = serde_json::from_reader(io::BufReader::new(File::open(input)?))?;
    let group = graph_path.join("simulation");

    let data = tidy::prep_tidy_data_to_plot(&tidy::to_array(&output.exposed)?,
					    &tidy::to_array(&output.infected)?,
					    &output.t_space, start)?;
    write_chart(&group, "exposed-infected", "Pessoas expostas e infectadas",
		&charts.combined_chart(&data, scale, show_uncertainty))?;

    if !output.removed.is_empty() {
	let deaths = tidy::prep_death_data_to_plot(&tidy::to_array(&output.removed)?,
						   &output.t_space, start)?;
	write_chart(&group, "deaths", "Óbitos",
		    &charts.death_chart(&deaths, scale, show_uncertainty))?;
    }

    Ok(())

}


fn r0_graph(charts: &Charts, graph_path: &Path, input: &Path, date: NaiveDate,
	    place: &str, min_days: usize) -> Result<()> {
    let samples = tidy::read_matrix(io::BufReader::new(File::open(input)?))?;
    write_chart(&graph_path.join("r0"), &slug(place),
		&format!("Número básico de reprodução para {}", place),
		&charts.plot_r0(&samples, date, place, min_days)?)
}


fn derivative_graphs(charts: &Charts, graph_path: &Path, input: &Path,
		     start: NaiveDate) -> Result<()> {
    let derivatives = Derivatives::read(io::BufReader::new(File::open(input)?))?;
    write_chart(graph_path, "derivatives", "Demandas",
		&charts.plot_derivatives(&derivatives, start)?)
}


fn slug(name: &str) -> String {
    unidecode(name).to_lowercase()
	.split(|c: char| !c.is_ascii_alphanumeric())
	.filter(|part| !part.is_empty())
	.collect::<Vec<_>>().join("-")
}
