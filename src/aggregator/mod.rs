pub mod state;

use indoc::formatdoc;

use crate::aggregator::state::AggState;
use crate::errors::CollateError;
use crate::fields::FieldTable;

/// Most input fields any aggregator observes per record.
pub const MAX_INPUT_FIELDS: usize = 2;

/// Catalogue entry for one aggregator kind.
pub struct AggDescriptor {
    pub name: &'static str,
    pub short_name: &'static str,
    pub args: &'static str,
    pub summary: &'static str,
}

pub static AGGREGATORS: &[AggDescriptor] = &[
    AggDescriptor {
        name: "average",
        short_name: "avg",
        args: "<field>",
        summary: "arithmetic mean of a numeric field",
    },
    AggDescriptor {
        name: "concatenate",
        short_name: "concat",
        args: "<delimiter>,<field>",
        summary: "field values joined by a delimiter",
    },
    AggDescriptor {
        name: "count",
        short_name: "ct",
        args: "",
        summary: "number of records in the clump",
    },
    AggDescriptor {
        name: "correlation",
        short_name: "corr",
        args: "<field1>,<field2>",
        summary: "correlation of two numeric fields",
    },
    AggDescriptor {
        name: "covariance",
        short_name: "cov",
        args: "<field1>,<field2>",
        summary: "covariance of two numeric fields",
    },
    AggDescriptor {
        name: "maximum",
        short_name: "max",
        args: "<field>",
        summary: "largest value of a numeric field",
    },
    AggDescriptor {
        name: "minimum",
        short_name: "min",
        args: "<field>",
        summary: "smallest value of a numeric field",
    },
    AggDescriptor {
        name: "mode",
        short_name: "mode",
        args: "<field>",
        summary: "most frequent value, first seen wins ties",
    },
    AggDescriptor {
        name: "percentile",
        short_name: "perc",
        args: "<percentile>,<field>",
        summary: "value at a percentile of a numeric field",
    },
    AggDescriptor {
        name: "sum",
        short_name: "sum",
        args: "<field>",
        summary: "sum of a numeric field",
    },
    AggDescriptor {
        name: "variance",
        short_name: "var",
        args: "<field>",
        summary: "population variance of a numeric field",
    },
];

pub fn descriptor_for(name: &str) -> Option<&'static AggDescriptor> {
    AGGREGATORS
        .iter()
        .find(|d| d.name == name || d.short_name == name)
}

/// Per-instance configuration, produced once during spec parsing and
/// shared immutably by every clump that uses the instance.
#[derive(Debug, Clone, PartialEq)]
pub enum AggConfig {
    Average,
    Concatenate { delimiter: String },
    Count,
    Correlation,
    Covariance,
    Maximum,
    Minimum,
    Mode,
    Percentile { percentile: f64 },
    Sum,
    Variance,
}

impl AggConfig {
    pub fn init_state(&self) -> AggState {
        AggState::new(self)
    }
}

/// A configured aggregator: kind, output field name and the
/// interesting-field indices it reads. Input indices are resolved by name
/// once the field table has been finalized.
#[derive(Debug)]
pub struct AggInstance {
    pub output_field: String,
    pub config: AggConfig,
    input_names: Vec<String>,
    pub input_fields: Vec<usize>,
}

impl AggInstance {
    /// Parses one `[<fieldname>=]<aggregator>[,<arguments>]` spec and
    /// registers the fields the aggregator wants to observe. The default
    /// output name is the spec with commas turned into underscores.
    pub fn parse(spec: &str, fields: &mut FieldTable) -> Result<Self, CollateError> {
        let (output_field, rest) = match spec.split_once('=') {
            Some((name, rest)) => (name.to_string(), rest),
            None => (spec.replace(',', "_"), spec),
        };
        let (kind_name, args) = match rest.split_once(',') {
            Some((kind, args)) => (kind, Some(args)),
            None => (rest, None),
        };
        let descriptor =
            descriptor_for(kind_name).ok_or_else(|| CollateError::UnknownAggregator {
                name: kind_name.to_string(),
            })?;
        let (config, input_names) = parse_args(descriptor.name, args).ok_or_else(|| {
            CollateError::InvalidAggregatorArgs {
                spec: spec.to_string(),
            }
        })?;
        for name in &input_names {
            fields.add(name, false);
        }
        Ok(AggInstance {
            output_field,
            config,
            input_names,
            input_fields: vec![],
        })
    }

    /// Maps input names to their post-finalization table positions.
    pub fn resolve_inputs(&mut self, fields: &FieldTable) {
        self.input_fields = self
            .input_names
            .iter()
            .map(|n| {
                fields
                    .index_of(n)
                    .expect("input fields are registered before finalize")
            })
            .collect();
    }
}

fn parse_args(kind: &'static str, args: Option<&str>) -> Option<(AggConfig, Vec<String>)> {
    match kind {
        "count" => Some((AggConfig::Count, vec![])),
        "average" => one_field(args).map(|f| (AggConfig::Average, f)),
        "sum" => one_field(args).map(|f| (AggConfig::Sum, f)),
        "minimum" => one_field(args).map(|f| (AggConfig::Minimum, f)),
        "maximum" => one_field(args).map(|f| (AggConfig::Maximum, f)),
        "variance" => one_field(args).map(|f| (AggConfig::Variance, f)),
        "mode" => one_field(args).map(|f| (AggConfig::Mode, f)),
        "covariance" => two_fields(args).map(|f| (AggConfig::Covariance, f)),
        "correlation" => two_fields(args).map(|f| (AggConfig::Correlation, f)),
        "concatenate" => {
            let (delimiter, field) = args?.split_once(',')?;
            if field.is_empty() {
                return None;
            }
            Some((
                AggConfig::Concatenate {
                    delimiter: delimiter.to_string(),
                },
                vec![field.to_string()],
            ))
        }
        "percentile" => {
            let (percentile, field) = args?.split_once(',')?;
            let percentile: f64 = percentile.parse().ok()?;
            if !(0.0..=100.0).contains(&percentile) || field.is_empty() {
                return None;
            }
            Some((
                AggConfig::Percentile { percentile },
                vec![field.to_string()],
            ))
        }
        _ => unreachable!("registry names cover every kind"),
    }
}

// One-field kinds take the whole remainder as the field name, so commas
// inside field names survive. Two-field kinds split once more.
fn one_field(args: Option<&str>) -> Option<Vec<String>> {
    match args {
        Some(f) if !f.is_empty() => Some(vec![f.to_string()]),
        _ => None,
    }
}

fn two_fields(args: Option<&str>) -> Option<Vec<String>> {
    let (first, second) = args?.split_once(',')?;
    if first.is_empty() || second.is_empty() {
        return None;
    }
    Some(vec![first.to_string(), second.to_string()])
}

pub fn render_aggregator_list() -> String {
    let width = AGGREGATORS
        .iter()
        .map(|d| d.name.len() + d.short_name.len() + d.args.len())
        .max()
        .expect("the registry is not empty");
    let mut listing = String::from("Available aggregators:\n");
    for d in AGGREGATORS {
        let label = format!("{} ({}) {}", d.name, d.short_name, d.args);
        listing.push_str(&format!(
            "   {label:<pad$}   {}\n",
            d.summary,
            pad = width + 5
        ));
    }
    listing
}

pub fn render_aggregator_detail(name: &str) -> Option<String> {
    let d = descriptor_for(name)?;
    let usage = if d.args.is_empty() {
        d.name.to_string()
    } else {
        format!("{},{}", d.name, d.args)
    };
    Some(formatdoc! {"
        {name} (short form: {short})

        Usage: [<fieldname>=]{usage}

        Produces the {summary}.
        ",
        name = d.name,
        short = d.short_name,
        usage = usage,
        summary = d.summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_name_replaces_commas() {
        let mut fields = FieldTable::new();
        let inst = AggInstance::parse("sum,profit", &mut fields).unwrap();
        assert_eq!(inst.output_field, "sum_profit");
        assert_eq!(inst.config, AggConfig::Sum);
        assert_eq!(fields.index_of("profit"), Some(0));
    }

    #[test]
    fn explicit_output_name() {
        let mut fields = FieldTable::new();
        let inst = AggInstance::parse("ptd=sum,profit", &mut fields).unwrap();
        assert_eq!(inst.output_field, "ptd");
    }

    #[test]
    fn short_names_resolve() {
        let mut fields = FieldTable::new();
        let inst = AggInstance::parse("ct", &mut fields).unwrap();
        assert_eq!(inst.config, AggConfig::Count);
        assert!(fields.is_empty());
    }

    #[test]
    fn unknown_aggregator_is_rejected() {
        let mut fields = FieldTable::new();
        assert!(matches!(
            AggInstance::parse("median,x", &mut fields),
            Err(CollateError::UnknownAggregator { .. })
        ));
    }

    #[test]
    fn missing_arguments_are_rejected() {
        let mut fields = FieldTable::new();
        for spec in ["sum", "sum,", "covariance,x", "percentile,50", "concatenate"] {
            assert!(
                matches!(
                    AggInstance::parse(spec, &mut fields),
                    Err(CollateError::InvalidAggregatorArgs { .. })
                ),
                "spec {spec:?} should be rejected"
            );
        }
    }

    #[test]
    fn percentile_must_be_in_range() {
        let mut fields = FieldTable::new();
        assert!(AggInstance::parse("percentile,101,v", &mut fields).is_err());
        assert!(AggInstance::parse("percentile,abc,v", &mut fields).is_err());
        let inst = AggInstance::parse("percentile,99.9,v", &mut fields).unwrap();
        assert_eq!(
            inst.config,
            AggConfig::Percentile { percentile: 99.9 }
        );
    }

    #[test]
    fn two_field_kinds_register_both_inputs() {
        let mut fields = FieldTable::new();
        fields.add("date", true);
        let mut inst = AggInstance::parse("corr,x,y", &mut fields).unwrap();
        fields.finalize();
        inst.resolve_inputs(&fields);
        assert_eq!(inst.input_fields, vec![1, 2]);
    }

    #[test]
    fn inputs_remap_after_key_promotion() {
        // "price" is first seen as an aggregator input, then declared a key:
        // finalize moves it to the key partition and the index follows.
        let mut fields = FieldTable::new();
        let mut inst = AggInstance::parse("avg,price", &mut fields).unwrap();
        fields.add("date", true);
        fields.add("price", true);
        fields.finalize();
        inst.resolve_inputs(&fields);
        assert_eq!(fields.num_key_fields(), 2);
        assert_eq!(inst.input_fields, vec![fields.index_of("price").unwrap()]);
    }

    #[test]
    fn registry_lookups_and_rendering() {
        assert!(descriptor_for("percentile").is_some());
        assert!(descriptor_for("perc").is_some());
        assert!(descriptor_for("nope").is_none());
        assert!(render_aggregator_list().contains("percentile"));
        assert!(render_aggregator_detail("avg").unwrap().contains("average"));
        assert!(render_aggregator_detail("nope").is_none());
    }
}
