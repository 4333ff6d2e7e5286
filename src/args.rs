use clap::error::ErrorKind;
use clap::{Arg, ArgAction, Command, crate_version};
use indoc::indoc;

use crate::aggregator::{render_aggregator_detail, render_aggregator_list};
use crate::errors::CollateError;

#[derive(Debug, Clone)]
pub struct CollateConfig {
    pub keys: Vec<String>,
    pub aggregators: Vec<String>,
    /// `None` is perfect mode: the clump table is unbounded.
    pub max_clumps: Option<usize>,
    pub incremental: bool,
    pub cube: bool,
    pub cube_default: String,
    pub inputs: Vec<String>,
    pub debug: bool,
}

pub fn command() -> Command {
    Command::new("recs-collate")
        .version(crate_version!())
        .about("Collate JSON records of input (or records from <files>) into aggregated output records")
        .arg(
            Arg::new("key")
                .long("key")
                .short('k')
                .value_name("keys")
                .action(ArgAction::Append)
                .help("comma separated list of key fields"),
        )
        .arg(
            Arg::new("aggregator")
                .long("aggregator")
                .short('a')
                .value_name("aggregators")
                .action(ArgAction::Append)
                .help("colon separated list of aggregate field specifiers"),
        )
        .arg(
            Arg::new("size")
                .long("size")
                .visible_alias("sz")
                .short('n')
                .value_name("number")
                .overrides_with_all(["size", "adjacent", "perfect"])
                .help("number of running clumps to keep (default is 1)"),
        )
        .arg(
            Arg::new("adjacent")
                .long("adjacent")
                .short('1')
                .action(ArgAction::SetTrue)
                .overrides_with_all(["size", "adjacent", "perfect"])
                .help("keep exactly one running clump"),
        )
        .arg(
            Arg::new("perfect")
                .long("perfect")
                .action(ArgAction::SetTrue)
                .overrides_with_all(["size", "adjacent", "perfect"])
                .help("never purge clumps until the end"),
        )
        .arg(
            Arg::new("incremental")
                .long("incremental")
                .action(ArgAction::SetTrue)
                .help("output a record every time an input record is added to a clump"),
        )
        .arg(
            Arg::new("cube")
                .long("cube")
                .action(ArgAction::SetTrue)
                .help("also collate into rolled-up clumps for every subset of the key fields"),
        )
        .arg(
            Arg::new("cube-default")
                .long("cube-default")
                .value_name("string")
                .help("value used for rolled-up key fields (default \"ALL\")"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("print progress information on stderr"),
        )
        .arg(
            Arg::new("list-aggregators")
                .long("list-aggregators")
                .action(ArgAction::SetTrue)
                .help("bail and output a list of aggregators"),
        )
        .arg(
            Arg::new("show-aggregator")
                .long("show-aggregator")
                .value_name("aggregator")
                .help("bail and output this aggregator's detailed usage"),
        )
        .arg(
            Arg::new("files")
                .value_name("files")
                .num_args(0..)
                .help("input files (stdin when none are given)"),
        )
        .after_help(indoc! {r#"
            Aggregates:
               Aggregates are specified as [<fieldname>=]<aggregator>[,<arguments>].  The
               default field name is the aggregator and arguments joined by underscores.
               See --list-aggregators for the available aggregators.

            Cubing:
               Instead of adding one entry for each input record, add 2 ** (number of key
               fields), with every possible combination of key fields replaced with the
               default ("ALL" unless --cube-default says otherwise).  Cubing is really
               supposed to be used with --perfect.  With key fields x and y the record
               {x = 1, y = 2} lands in the clumps for {x = 1, y = 2}, {x = 1, y = ALL},
               {x = ALL, y = 2} and {x = ALL, y = ALL}.

            Examples:
               Count clumps of adjacent lines with matching x fields.
                  recs-collate --adjacent --key x --aggregator count
               Count the number of each x field in the entire file.
                  recs-collate --perfect --key x --aggregator count
               Produce a cumulative sum of field profit up to each date.
                  recs-collate --key date --incremental --aggregator profit_to_date=sum,profit
               Produce a record count for each date, hour pair.
                  recs-collate --key date,hour --perfect --aggregator count
        "#})
}

pub fn get_config() -> Result<CollateConfig, CollateError> {
    // Parse failures (missing flag arguments and the like) flow through
    // the same error-plus-usage-banner path as every other configuration
    // error; --help and --version still print on stdout and exit 0.
    let matches = match command().try_get_matches() {
        Ok(matches) => matches,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => return Err(e.into()),
    };

    if matches.get_flag("list-aggregators") {
        print!("{}", render_aggregator_list());
        std::process::exit(0);
    }
    if let Some(name) = matches.get_one::<String>("show-aggregator") {
        match render_aggregator_detail(name) {
            Some(detail) => {
                print!("{detail}");
                std::process::exit(0);
            }
            None => {
                return Err(CollateError::UnknownAggregator { name: name.clone() });
            }
        }
    }

    let keys: Vec<String> = matches
        .get_many::<String>("key")
        .unwrap_or_default()
        .flat_map(|list| list.split(','))
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect();
    let aggregators: Vec<String> = matches
        .get_many::<String>("aggregator")
        .unwrap_or_default()
        .flat_map(|list| list.split(':'))
        .filter(|spec| !spec.is_empty())
        .map(str::to_string)
        .collect();

    let max_clumps = if matches.get_flag("perfect") {
        None
    } else if let Some(size) = matches.get_one::<String>("size") {
        let size: i64 = size.parse().map_err(|_| CollateError::InvalidSizeInt {
            flag: "--size".to_string(),
        })?;
        if size < 1 {
            return Err(CollateError::SizeTooSmall);
        }
        Some(size as usize)
    } else {
        // --adjacent and the plain default both mean one running clump
        Some(1)
    };

    Ok(CollateConfig {
        keys,
        aggregators,
        max_clumps,
        incremental: matches.get_flag("incremental"),
        cube: matches.get_flag("cube"),
        cube_default: matches
            .get_one::<String>("cube-default")
            .cloned()
            .unwrap_or_else(|| "ALL".to_string()),
        inputs: matches
            .get_many::<String>("files")
            .unwrap_or_default()
            .cloned()
            .collect(),
        debug: matches.get_flag("debug"),
    })
}
