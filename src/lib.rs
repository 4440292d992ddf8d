pub mod graph;
pub mod error;
pub mod cases;
pub mod ms;
pub mod wcota;
pub mod fiocruz;
pub mod population;
pub mod tidy;

use chrono::naive::NaiveDate;


/// Consecutive days from the first date up to and including the second,
/// or without end when it is `None`.
#[derive(Clone,Debug)]
pub struct NaiveDateRange(pub NaiveDate, pub Option<NaiveDate>);

impl Iterator for NaiveDateRange {
    type Item = NaiveDate;
    fn next(&mut self) -> Option<NaiveDate> {
	match self.1.map_or(true, |end| self.0 <= end) {
	    false => None,
	    true => {
		let current = self.0;
		self.0 = current.succ_opt()?;
		Some(current)
	    }
	}
    }
}
