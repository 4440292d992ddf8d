use std::{io,fs};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use chrono::Duration;
use chrono::naive::NaiveDate;
use log::info;
use ndarray::{Array2,s};
use serde_json::{Map,Value,json};

use super::error::{Result,Error};
use super::cases::Level;
use super::tidy::{PlotData,Derivatives,Compartment,DATE_COLUMN,DERIVATIVE_DAY_COLUMN,
		  offset_datetime,format_datetime};
use super::NaiveDateRange;


pub type Series = Vec<(NaiveDate,f64)>;
pub type CasesData = Vec<(String,Series)>;

const SCHEMA : &str = "https://vega.github.io/schema/vega-lite/v4.json";

const CASE_DATE_COLUMN : &str = "Data";
const REGION_COLUMN : &str = "Região";
const VALUE_COLUMN : &str = "Valor";


#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum Scale {
    Log,
    Linear
}

impl Scale {
    pub fn name(&self) -> &'static str {
	match self {
	    Self::Log => "log",
	    Self::Linear => "linear"
	}
    }
}

impl FromStr for Scale {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
	match s {
	    "log" => Ok(Self::Log),
	    "linear" => Ok(Self::Linear),
	    other => Err(Error::UnknownScale(other.to_string()))
	}
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	write!(f, "{}", self.name())
    }
}


/// Chart factory carrying the dashboard theme. Create it once with
/// `Charts::init` before building any chart; every top-level spec gets
/// the theme's config.
pub struct Charts {
    config: Value
}

impl Charts {

    /// Tooltips on every mark, showing the encoded fields.
    pub fn init() -> Self {
	Self { config: json!({"mark": {"tooltip": {"content": "encoding"}}}) }
    }

    fn configure(&self) -> Value {
	let mut config = self.config.clone();
	config["title"] = json!({"fontSize": 16});
	config["axis"] = json!({"labelFontSize": 14, "titleFontSize": 14});
	config["legend"] = json!({"labelFontSize": 14, "titleFontSize": 14});
	config
    }

    fn vconcat(&self, charts: Vec<Value>, padding: Option<Value>) -> Value {
	let mut spec = json!({
	    "$schema": SCHEMA,
	    "config": self.configure(),
	    "vconcat": charts
	});
	if let Some(padding) = padding {
	    spec["padding"] = padding;
	}
	spec
    }

    /// Mean exposed and infected trajectories, with their ± std bands
    /// when `show_uncertainty` is set.
    pub fn combined_chart(&self, data: &PlotData, scale: Scale, show_uncertainty: bool) -> Value {
	let lines = exposed_infected_line_chart(data, scale);
	let layers = match show_uncertainty {
	    false => vec![lines],
	    true => vec![error_area_chart(data, Compartment::Exposed, scale),
			 error_area_chart(data, Compartment::Infected, scale),
			 lines]
	};
	self.vconcat(vec![interactive(json!({"layer": layers}))], Some(json!({"top": 20})))
    }

    pub fn death_chart(&self, data: &PlotData, scale: Scale, show_uncertainty: bool) -> Value {
	let death = Compartment::Death;
	let lines = json!({
	    "data": {"values": data.records()},
	    "width": 600,
	    "height": 400,
	    "title": "Evolução do total de óbitos causados pelo COVID-19",
	    "mark": {"type": "line", "color": death.color()},
	    "transform": [
		{"fold": [format!("{}_mean", death.name())], "as": ["Variável", "Valor"]}
	    ],
	    "encoding": {
		"x": date_axis(DATE_COLUMN),
		"y": {
		    "field": "Valor",
		    "type": "quantitative",
		    "title": "Qtde. de pessoas",
		    "scale": {"type": scale.name()}
		}
	    }
	});
	let layers = match show_uncertainty {
	    false => vec![lines],
	    true => vec![error_area_chart(data, death, scale), lines]
	};
	self.vconcat(vec![interactive(json!({"layer": layers}))], Some(json!({"top": 20})))
    }

    /// Reproduction number samples (sample × day) over the last
    /// `min_days` days ending at `date`: mean line and ± std band.
    pub fn plot_r0(&self, r0_samples: &Array2<f64>, date: NaiveDate,
		   place: &str, min_days: usize) -> Result<Value> {

	let days = min_days.min(r0_samples.ncols());
	if days == 0 || r0_samples.nrows() == 0 {
	    return Err(Error::MissingData);
	}

	let cut = r0_samples.slice(s![.., r0_samples.ncols() - days..]);
	let first = date.checked_sub_signed(Duration::days(days as i64 - 1))
	    .ok_or(Error::DateOutOfRange(days as f64))?;
	let dates : Vec<String> = NaiveDateRange(first, Some(date))
	    .map(|d| d.format("%Y-%m-%d").to_string()).collect();

	let values : Vec<Value> = cut.outer_iter().flat_map(
	    |sample| dates.iter().zip(sample.iter()).filter_map(
		|(day,r0)| match r0.is_finite() {
		    false => None,
		    true => Some(json!({"Dias": day, "r0": r0}))
		}).collect::<Vec<_>>()
	).collect();

	let line = json!({
	    "width": 600,
	    "height": 150,
	    "title": format!("Número básico de reprodução para {}", place),
	    "mark": "line",
	    "encoding": {
		"x": {"field": "Dias", "type": "temporal"},
		"y": {"field": "r0", "type": "quantitative", "aggregate": "mean"}
	    }
	});
	let band = json!({
	    "mark": {"type": "errorband", "extent": "stdev"},
	    "encoding": {
		"x": {"field": "Dias", "type": "temporal", "title": "Data"},
		"y": {"field": "r0", "type": "quantitative", "title": "Valor"}
	    }
	});

	Ok(self.vconcat(vec![interactive(json!({
	    "data": {"values": values},
	    "layer": [band, line]
	}))], Some(json!({"top": 20}))))

    }

    /// One line chart per derived demand series, stacked vertically.
    pub fn plot_derivatives(&self, derivatives: &Derivatives,
			    start_date: NaiveDate) -> Result<Value> {

	let values = derivatives.days.iter().enumerate().map(|(i,day)| {
	    let mut row = Map::new();
	    row.insert(DERIVATIVE_DAY_COLUMN.to_string(),
		       json!(format_datetime(&offset_datetime(start_date, *day)?)));
	    for (name,series) in &derivatives.series {
		row.insert(name.clone(), json!(series[i]));
	    }
	    Ok(Value::Object(row))
	}).collect::<Result<Vec<Value>>>()?;

	Ok(self.vconcat(derivatives.names().map(|name| json!({
	    "data": {"values": values},
	    "width": 600,
	    "height": 250,
	    "title": format!("Demanda de {}", name),
	    "mark": "line",
	    "encoding": {
		"x": date_axis(DERIVATIVE_DAY_COLUMN),
		"y": {
		    "field": name,
		    "type": "quantitative",
		    "title": format!("Qtde. de {}", name)
		}
	    }
	})).collect(), None))

    }

    /// Case counts by region, one colored line per region. Clicking a
    /// legend entry highlights its region. Log charts leave out counts
    /// at or below zero.
    pub fn cases_chart(&self, title: &str, ytitle: &str, scale: Scale,
		       data: &CasesData) -> Value {

	let values : Vec<Value> = data.iter().flat_map(
	    |(region,series)| series.iter().filter_map(
		move |(date,count)| match count.is_finite() && (scale == Scale::Linear || *count > 0.0) {
		    false => None,
		    true => Some(json!({
			CASE_DATE_COLUMN: date.format("%Y-%m-%d").to_string(),
			REGION_COLUMN: region,
			VALUE_COLUMN: count
		    }))
		})
	).collect();

	let encoding = json!({
	    "x": date_axis(CASE_DATE_COLUMN),
	    "y": {
		"field": VALUE_COLUMN,
		"type": "quantitative",
		"title": ytitle,
		"scale": {"type": scale.name()}
	    },
	    "color": {"field": REGION_COLUMN, "type": "nominal"},
	    "opacity": {"value": 0.2, "condition": {"selection": "Destaque", "value": 1}}
	});

	self.vconcat(vec![interactive(json!({
	    "data": {"values": values},
	    "width": 600,
	    "height": 400,
	    "title": title,
	    "layer": [
		{"mark": "line", "encoding": encoding.clone()},
		{
		    "mark": {"type": "point", "filled": true, "size": 20},
		    "selection": {
			"Destaque": {"type": "multi", "fields": [REGION_COLUMN], "bind": "legend"}
		    },
		    "encoding": encoding
		}
	    ]
	}))], Some(json!({"top": 20})))

    }

    pub fn cases_graph(&self, graph_path: &Path, level: Level, data: &CasesData) -> Result<()> {
	let title = format!("Número total de casos confirmados de COVID-19 por {}", level.title());
	write_chart(graph_path, "total", &title, &self.cases_chart(&title, "Casos", Scale::Log, data))
    }

    pub fn daily_graph(&self, graph_path: &Path, level: Level, data: &CasesData) -> Result<()> {
	let title = format!("Número diário de casos confirmados de COVID-19 por {}", level.title());
	write_chart(graph_path, "daily", &title, &self.cases_chart(&title, "Casos", Scale::Linear, data))
    }

    pub fn relative_graph(&self, graph_path: &Path, level: Level, data: &CasesData) -> Result<()> {
	let title = format!("Casos confirmados de COVID-19 por 100 mil habitantes por {}",
			    level.title());
	write_chart(graph_path, "relative", &title,
		    &self.cases_chart(&title, "Casos / 100 mil hab.", Scale::Log, data))
    }

}


fn date_axis(field: &str) -> Value {
    json!({
	"field": field,
	"type": "temporal",
	"axis": {"title": "Data", "labelSeparation": 3}
    })
}

/// Scale-bound zoom and pan on the first layer.
fn interactive(mut chart: Value) -> Value {
    let grid = json!({"Grid": {"bind": "scales", "type": "interval", "encodings": ["x", "y"]}});
    match chart.get_mut("layer").and_then(|layers| layers.get_mut(0)) {
	Some(first) => { first["selection"] = grid; }
	None => { chart["selection"] = grid; }
    }
    chart
}

pub fn exposed_infected_line_chart(data: &PlotData, scale: Scale) -> Value {

    let exposed = "Expostos (média)";
    let infected = "Infectados (média)";

    let mut data = data.clone();
    data.rename(&format!("{}_mean", Compartment::Exposed.name()), exposed);
    data.rename(&format!("{}_mean", Compartment::Infected.name()), infected);

    json!({
	"data": {"values": data.records()},
	"width": 600,
	"height": 400,
	"title": "Evolução no tempo de pessoas expostas e infectadas pelo COVID-19",
	"transform": [
	    {"fold": [exposed, infected], "as": ["Variável", "Valor"]}
	],
	"mark": "line",
	"encoding": {
	    "x": date_axis(DATE_COLUMN),
	    "y": {
		"field": "Valor",
		"type": "quantitative",
		"title": "Qtde. de pessoas",
		"scale": {"type": scale.name()}
	    },
	    "color": {"field": "Variável", "type": "nominal"}
	}
    })

}

/// Shaded area between the lower and upper band of a compartment. Steps
/// whose rounded lower bound is not positive are filtered out; on a log
/// scale values at or below zero are first raised to 1.
pub fn error_area_chart(data: &PlotData, compartment: Compartment, scale: Scale) -> Value {

    let lower = format!("{}_lower", compartment.name());
    let upper = format!("{}_upper", compartment.name());

    let mut source = data.clone();
    if scale == Scale::Log {
	source.clamp_non_positive();
    }
    source.round(&lower);
    source.round(&upper);

    json!({
	"data": {"values": source.records()},
	"transform": [{"filter": format!("datum.{} > 0", lower)}],
	"mark": {"type": "area", "color": compartment.color()},
	"encoding": {
	    "x": {"field": DATE_COLUMN, "type": "temporal"},
	    "y": {"field": upper, "type": "quantitative", "scale": {"type": scale.name()}},
	    "y2": {"field": lower},
	    "opacity": {"value": 0.2}
	}
    })

}


fn create_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
	fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub fn write_json(path: &Path, spec: &Value) -> Result<()> {
    create_parent(path)?;
    let mut out = io::BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(out.by_ref(), spec)?;
    out.flush()?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Standalone page rendering `spec` with vega-embed. Only the PNG and
/// SVG export actions are offered.
pub fn write_html(path: &Path, title: &str, spec: &Value) -> Result<()> {

    create_parent(path)?;

    let page = format!(r##"<!DOCTYPE html>
<html lang="pt-BR">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<script src="https://cdn.jsdelivr.net/npm/vega@5"></script>
<script src="https://cdn.jsdelivr.net/npm/vega-lite@4"></script>
<script src="https://cdn.jsdelivr.net/npm/vega-embed@6"></script>
</head>
<body>
<div id="chart"></div>
<script type="text/javascript">
vegaEmbed("#chart", {spec}, {{actions: {{export: true, source: false, compiled: false, editor: false}}}}).catch(console.error);
</script>
</body>
</html>
"##, title = title, spec = serde_json::to_string(spec)?);

    fs::write(path, page)?;

    info!("Wrote {}", path.display());
    Ok(())

}

/// JSON spec and HTML page named `name` under `dir`.
pub fn write_chart(dir: &Path, name: &str, title: &str, spec: &Value) -> Result<()> {
    write_json(&dir.join(format!("{}.json", name)), spec)?;
    write_html(&dir.join(format!("{}.html", name)), title, spec)
}


#[cfg(test)]
mod tests {

    use super::*;
    use ndarray::array;
    use crate::tidy::{prep_tidy_data_to_plot,prep_death_data_to_plot};

    fn start() -> NaiveDate {
	NaiveDate::from_ymd_opt(2020, 3, 20).unwrap()
    }

    fn tidy() -> PlotData {
	let e = array![[10.0, 20.0, 40.0], [30.0, 40.0, 60.0]];
	let i = array![[0.0, 2.0, 5.0], [0.0, 4.0, 9.0]];
	prep_tidy_data_to_plot(&e, &i, &[0.0, 1.0, 2.0], start()).unwrap()
    }

    fn check_config(spec: &Value) {
	assert_eq!(spec["$schema"], json!(SCHEMA));
	assert_eq!(spec["config"]["mark"]["tooltip"]["content"], json!("encoding"));
	assert_eq!(spec["config"]["title"]["fontSize"], json!(16));
	assert_eq!(spec["config"]["axis"], json!({"labelFontSize": 14, "titleFontSize": 14}));
	assert_eq!(spec["config"]["legend"], json!({"labelFontSize": 14, "titleFontSize": 14}));
    }

    #[test]
    fn combined_chart_layers_bands_under_lines() {

	let spec = Charts::init().combined_chart(&tidy(), Scale::Log, true);
	check_config(&spec);
	assert_eq!(spec["padding"], json!({"top": 20}));

	let layers = spec["vconcat"][0]["layer"].as_array().unwrap();
	assert_eq!(layers.len(), 3);
	assert_eq!(layers[0]["mark"]["color"], json!("#1f77b4"));
	assert_eq!(layers[1]["mark"]["color"], json!("#ff7f0e"));
	assert_eq!(layers[0]["transform"][0]["filter"], json!("datum.Exposto_lower > 0"));
	assert_eq!(layers[1]["encoding"]["y"]["field"], json!("Infectado_upper"));
	assert_eq!(layers[1]["encoding"]["y2"]["field"], json!("Infectado_lower"));
	assert_eq!(layers[0]["selection"]["Grid"]["bind"], json!("scales"));

	let lines = &layers[2];
	assert_eq!(lines["mark"], json!("line"));
	assert_eq!(lines["transform"][0]["fold"], json!(["Expostos (média)", "Infectados (média)"]));
	assert_eq!(lines["encoding"]["y"]["scale"]["type"], json!("log"));
	assert_eq!(lines["encoding"]["x"]["axis"]["title"], json!("Data"));
	assert_eq!(lines["data"]["values"][0]["Expostos (média)"], json!(20.0));
	assert_eq!(lines["data"]["values"][2]["Datas"], json!("2020-03-22T00:00:00"));

    }

    #[test]
    fn log_bands_raise_non_positive_bounds() {
	let data = tidy();
	assert!(data.column("Infectado_lower").unwrap()[0] <= 0.0);
	let log = error_area_chart(&data, Compartment::Infected, Scale::Log);
	assert_eq!(log["data"]["values"][0]["Infectado_lower"], json!(1.0));
	let linear = error_area_chart(&data, Compartment::Infected, Scale::Linear);
	assert_eq!(linear["data"]["values"][0]["Infectado_lower"], json!(0.0));
	assert_eq!(linear["encoding"]["y"]["scale"]["type"], json!("linear"));
	assert_eq!(data.column("Infectado_lower").unwrap()[0], 0.0);
    }

    #[test]
    fn charts_without_uncertainty_only_draw_lines() {
	let spec = Charts::init().combined_chart(&tidy(), Scale::Linear, false);
	let layers = spec["vconcat"][0]["layer"].as_array().unwrap();
	assert_eq!(layers.len(), 1);
	assert_eq!(layers[0]["mark"], json!("line"));
	assert_eq!(layers[0]["selection"]["Grid"]["type"], json!("interval"));
    }

    #[test]
    fn death_chart_uses_death_color() {
	let r = array![[0.0, 1.0, 3.0], [0.0, 3.0, 5.0]];
	let data = prep_death_data_to_plot(&r, &[0.0, 1.0, 2.0], start()).unwrap();
	let spec = Charts::init().death_chart(&data, Scale::Log, true);
	let layers = spec["vconcat"][0]["layer"].as_array().unwrap();
	assert_eq!(layers.len(), 2);
	assert_eq!(layers[0]["mark"]["color"], json!("#ff004d"));
	assert_eq!(layers[1]["mark"]["color"], json!("#ff004d"));
	assert_eq!(layers[1]["title"], json!("Evolução do total de óbitos causados pelo COVID-19"));
	assert_eq!(layers[1]["transform"][0]["fold"], json!(["Óbito_mean"]));
    }

    #[test]
    fn r0_keeps_most_recent_days() {

	let samples = array![[0.5, 1.0, 1.2, 1.4],
			     [0.7, 1.2, 1.4, f64::NAN]];
	let date = NaiveDate::from_ymd_opt(2020, 5, 10).unwrap();
	let spec = Charts::init().plot_r0(&samples, date, "São Paulo", 3).unwrap();
	check_config(&spec);

	let chart = &spec["vconcat"][0];
	let values = chart["data"]["values"].as_array().unwrap();
	assert_eq!(values.len(), 5);
	assert_eq!(values[0], json!({"Dias": "2020-05-08", "r0": 1.0}));
	assert_eq!(values[2], json!({"Dias": "2020-05-10", "r0": 1.4}));
	assert_eq!(values[4], json!({"Dias": "2020-05-09", "r0": 1.4}));

	let layers = chart["layer"].as_array().unwrap();
	assert_eq!(layers[0]["mark"], json!({"type": "errorband", "extent": "stdev"}));
	assert_eq!(layers[1]["title"], json!("Número básico de reprodução para São Paulo"));
	assert_eq!(layers[1]["encoding"]["y"]["aggregate"], json!("mean"));

    }

    #[test]
    fn r0_with_fewer_days_than_requested_uses_all() {
	let samples = array![[1.0, 2.0]];
	let date = NaiveDate::from_ymd_opt(2020, 5, 10).unwrap();
	let spec = Charts::init().plot_r0(&samples, date, "SP", 30).unwrap();
	assert_eq!(spec["vconcat"][0]["data"]["values"][0]["Dias"], json!("2020-05-09"));
	assert!(Charts::init().plot_r0(&Array2::zeros((2, 0)), date, "SP", 5).is_err());
    }

    #[test]
    fn one_chart_per_derivative() {
	let derivatives = Derivatives::read("day,leitos,ventiladores\n0,1,2\n1,3,4\n".as_bytes()).unwrap();
	let spec = Charts::init().plot_derivatives(&derivatives, start()).unwrap();
	check_config(&spec);
	let charts = spec["vconcat"].as_array().unwrap();
	assert_eq!(charts.len(), 2);
	assert_eq!(charts[0]["title"], json!("Demanda de leitos"));
	assert_eq!(charts[1]["encoding"]["y"]["title"], json!("Qtde. de ventiladores"));
	assert_eq!(charts[1]["encoding"]["x"]["field"], json!("day"));
	assert_eq!(charts[0]["data"]["values"][1]["day"], json!("2020-03-21T00:00:00"));
	assert!(spec.get("padding").is_none());
    }

    #[test]
    fn derivative_dates_must_fit_the_calendar() {
	let derivatives = Derivatives::read("day,leitos\n0,1\n1e13,2\n".as_bytes()).unwrap();
	assert!(matches!(Charts::init().plot_derivatives(&derivatives, start()),
			 Err(Error::DateOutOfRange(_))));
    }

    #[test]
    fn band_bounds_round_half_to_even() {
	let data = PlotData {
	    days: vec![0.0, 1.0],
	    dates: vec![],
	    columns: vec![("Exposto_lower".to_string(), vec![0.5, 2.5]),
			  ("Exposto_upper".to_string(), vec![1.5, 3.5])]
	};
	let band = error_area_chart(&data, Compartment::Exposed, Scale::Linear);
	let values = band["data"]["values"].as_array().unwrap();
	assert_eq!(values[0]["Exposto_lower"], json!(0.0));
	assert_eq!(values[1]["Exposto_lower"], json!(2.0));
	assert_eq!(values[0]["Exposto_upper"], json!(2.0));
	assert_eq!(values[1]["Exposto_upper"], json!(4.0));
	assert_eq!(band["transform"][0]["filter"], json!("datum.Exposto_lower > 0"));
    }

    #[test]
    fn case_chart_drops_zeros_on_log_scale() {
	let day = |d| NaiveDate::from_ymd_opt(2020, 3, d).unwrap();
	let data = vec![("SP".to_string(), vec![(day(20), 0.0), (day(21), 110.0)]),
			("RJ".to_string(), vec![(day(20), 3.0), (day(21), f64::NAN)])];
	let charts = Charts::init();

	let log = charts.cases_chart("Casos", "Casos", Scale::Log, &data);
	check_config(&log);
	let chart = &log["vconcat"][0];
	assert_eq!(chart["data"]["values"].as_array().unwrap().len(), 2);
	assert_eq!(chart["layer"][0]["selection"]["Grid"]["bind"], json!("scales"));
	assert_eq!(chart["layer"][1]["selection"]["Destaque"]["bind"], json!("legend"));
	assert_eq!(chart["layer"][0]["encoding"]["y"]["scale"]["type"], json!("log"));

	let linear = charts.cases_chart("Casos", "Casos", Scale::Linear, &data);
	let values = linear["vconcat"][0]["data"]["values"].as_array().unwrap();
	assert_eq!(values.len(), 3);
	assert_eq!(values[0], json!({"Data": "2020-03-20", "Região": "SP", "Valor": 0.0}));
    }

    #[test]
    fn html_page_embeds_spec() {
	let dir = std::env::temp_dir().join("covid19-br-charts-test");
	write_chart(&dir, "page", "Casos", &json!({"mark": "line"})).unwrap();
	let page = fs::read_to_string(dir.join("page.html")).unwrap();
	assert!(page.contains("<title>Casos</title>"));
	assert!(page.contains(r##"vegaEmbed("#chart", {"mark":"line"}, {actions: {export: true"##));
	let spec : Value = serde_json::from_str(&fs::read_to_string(dir.join("page.json")).unwrap()).unwrap();
	assert_eq!(spec, json!({"mark": "line"}));
    }

    #[test]
    fn parses_scales() {
	assert_eq!("log".parse::<Scale>().unwrap(), Scale::Log);
	assert_eq!("linear".parse::<Scale>().unwrap(), Scale::Linear);
	assert!("symlog".parse::<Scale>().is_err());
    }

}
