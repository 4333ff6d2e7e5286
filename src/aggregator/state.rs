use std::cmp::Reverse;
use std::io::{self, Write};

use ahash::AHashMap;

use crate::aggregator::AggConfig;
use crate::utils::{format_g, write_json_str};

/// One-pass variance accumulator. Also the building block of correlation.
#[derive(Debug, Clone, Default)]
pub struct VarState {
    count: f64,
    sum: f64,
    sum_of_squares: f64,
}

impl VarState {
    fn add(&mut self, x: f64) {
        if !x.is_nan() {
            self.count += 1.0;
            self.sum += x;
            self.sum_of_squares += x * x;
        }
    }

    fn value(&self) -> f64 {
        let mean = self.sum / self.count;
        self.sum_of_squares / self.count - mean * mean
    }
}

#[derive(Debug, Clone, Default)]
pub struct CovState {
    count: f64,
    sum_of_products: f64,
    sum_of_first: f64,
    sum_of_second: f64,
}

impl CovState {
    // A pair only counts when both halves are numeric.
    fn add(&mut self, x: f64, y: f64) {
        if !x.is_nan() && !y.is_nan() {
            self.count += 1.0;
            self.sum_of_products += x * y;
            self.sum_of_first += x;
            self.sum_of_second += y;
        }
    }

    fn value(&self) -> f64 {
        (self.sum_of_products / self.count)
            - (self.sum_of_first / self.count) * (self.sum_of_second / self.count)
    }
}

#[derive(Debug, Clone)]
pub struct ModeEntry {
    count: u64,
    order: usize,
}

/// Accumulated state of one aggregator instance inside one clump.
#[derive(Debug)]
pub enum AggState {
    Average {
        total: f64,
        count: f64,
    },
    Concatenate {
        joined: String,
    },
    Count {
        count: u64,
    },
    Correlation {
        cov: CovState,
        var_first: VarState,
        var_second: VarState,
    },
    Covariance {
        cov: CovState,
    },
    Maximum {
        max: f64,
    },
    Minimum {
        min: f64,
    },
    Mode {
        counts: AHashMap<Box<str>, ModeEntry>,
    },
    Percentile {
        values: Vec<f64>,
    },
    Sum {
        sum: f64,
    },
    Variance {
        var: VarState,
    },
}

impl AggState {
    pub fn new(config: &AggConfig) -> Self {
        match config {
            AggConfig::Average => AggState::Average {
                total: 0.0,
                count: 0.0,
            },
            AggConfig::Concatenate { .. } => AggState::Concatenate {
                joined: String::with_capacity(128),
            },
            AggConfig::Count => AggState::Count { count: 0 },
            AggConfig::Correlation => AggState::Correlation {
                cov: CovState::default(),
                var_first: VarState::default(),
                var_second: VarState::default(),
            },
            AggConfig::Covariance => AggState::Covariance {
                cov: CovState::default(),
            },
            AggConfig::Maximum => AggState::Maximum {
                max: f64::NEG_INFINITY,
            },
            AggConfig::Minimum => AggState::Minimum { min: f64::INFINITY },
            AggConfig::Mode => AggState::Mode {
                counts: AHashMap::with_capacity(32),
            },
            AggConfig::Percentile { .. } => AggState::Percentile {
                values: Vec::with_capacity(64),
            },
            AggConfig::Sum => AggState::Sum { sum: 0.0 },
            AggConfig::Variance => AggState::Variance {
                var: VarState::default(),
            },
        }
    }

    /// Folds one record's inputs in. `texts` and `numbers` hold the
    /// instance's gathered input values; NaN numbers are skipped by the
    /// numeric kinds, absent texts by the textual ones.
    pub fn update(&mut self, config: &AggConfig, texts: &[Option<&str>], numbers: &[f64]) {
        match self {
            AggState::Average { total, count } => {
                if !numbers[0].is_nan() {
                    *total += numbers[0];
                    *count += 1.0;
                }
            }
            AggState::Concatenate { joined } => {
                if let (AggConfig::Concatenate { delimiter }, Some(text)) = (config, texts[0]) {
                    if !joined.is_empty() {
                        joined.push_str(delimiter);
                    }
                    joined.push_str(text);
                }
            }
            AggState::Count { count } => *count += 1,
            AggState::Correlation {
                cov,
                var_first,
                var_second,
            } => {
                cov.add(numbers[0], numbers[1]);
                var_first.add(numbers[0]);
                var_second.add(numbers[1]);
            }
            AggState::Covariance { cov } => cov.add(numbers[0], numbers[1]),
            AggState::Maximum { max } => {
                if !numbers[0].is_nan() && numbers[0] > *max {
                    *max = numbers[0];
                }
            }
            AggState::Minimum { min } => {
                if !numbers[0].is_nan() && numbers[0] < *min {
                    *min = numbers[0];
                }
            }
            AggState::Mode { counts } => {
                if let Some(text) = texts[0] {
                    let next_order = counts.len();
                    match counts.get_mut(text) {
                        Some(entry) => entry.count += 1,
                        None => {
                            counts.insert(
                                Box::from(text),
                                ModeEntry {
                                    count: 1,
                                    order: next_order,
                                },
                            );
                        }
                    }
                }
            }
            AggState::Percentile { values } => {
                if !numbers[0].is_nan() {
                    values.push(numbers[0]);
                }
            }
            AggState::Sum { sum } => {
                if !numbers[0].is_nan() {
                    *sum += numbers[0];
                }
            }
            AggState::Variance { var } => var.add(numbers[0]),
        }
    }

    /// Writes the aggregate in its output form: bare numbers for the
    /// numeric kinds, quoted JSON strings for the textual ones, `null`
    /// for textual or percentile dumps over an empty group.
    pub fn dump<W: Write>(&self, config: &AggConfig, out: &mut W) -> io::Result<()> {
        match self {
            AggState::Average { total, count } => write_number(out, total / count),
            AggState::Concatenate { joined } => write_json_str(out, joined),
            AggState::Count { count } => write!(out, "{count}"),
            AggState::Correlation {
                cov,
                var_first,
                var_second,
            } => {
                let corr = cov.value() / (var_first.value() * var_second.value()).sqrt();
                write_number(out, corr)
            }
            AggState::Covariance { cov } => write_number(out, cov.value()),
            AggState::Maximum { max } => write_number(out, *max),
            AggState::Minimum { min } => write_number(out, *min),
            AggState::Mode { counts } => {
                let best = counts
                    .iter()
                    .max_by_key(|(_, entry)| (entry.count, Reverse(entry.order)));
                match best {
                    Some((value, _)) => write_json_str(out, value),
                    None => out.write_all(b"null"),
                }
            }
            AggState::Percentile { values } => {
                let AggConfig::Percentile { percentile } = config else {
                    return out.write_all(b"null");
                };
                if values.is_empty() {
                    return out.write_all(b"null");
                }
                let mut sorted = values.clone();
                sorted.sort_by(f64::total_cmp);
                let index = ((percentile / 100.0) * sorted.len() as f64).floor() as usize;
                write_number(out, sorted[index.min(sorted.len() - 1)])
            }
            AggState::Sum { sum } => write_number(out, *sum),
            AggState::Variance { var } => write_number(out, var.value()),
        }
    }
}

fn write_number<W: Write>(out: &mut W, v: f64) -> io::Result<()> {
    out.write_all(format_g(v).as_bytes())
}
