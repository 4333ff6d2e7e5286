use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};

use crate::aggregator::{AggInstance, MAX_INPUT_FIELDS};
use crate::args::CollateConfig;
use crate::clump::ClumpTable;
use crate::emitter::emit_record;
use crate::errors::CollateError;
use crate::fields::FieldTable;
use crate::parser::record_extractor::RecordExtractor;
use crate::parser::record_stream::RecordStream;

/// The collation engine. All input sources feed one shared clump table;
/// `finish` flushes whatever the table still holds at end of input.
pub struct Collator {
    fields: FieldTable,
    instances: Vec<AggInstance>,
    table: ClumpTable,
    incremental: bool,
    cube_iters: usize,
    cube_default: String,
    debug: bool,
    records_in: u64,
}

impl Collator {
    pub fn new(config: &CollateConfig) -> Result<Self, CollateError> {
        let mut fields = FieldTable::new();
        for key in &config.keys {
            fields.add(key, true);
        }
        let mut instances = config
            .aggregators
            .iter()
            .map(|spec| AggInstance::parse(spec, &mut fields))
            .collect::<Result<Vec<_>, _>>()?;
        if fields.is_empty() && instances.is_empty() {
            return Err(CollateError::NothingToCollate);
        }
        fields.finalize();
        for instance in &mut instances {
            instance.resolve_inputs(&fields);
        }

        let cube_iters = if config.cube {
            1usize << fields.num_key_fields()
        } else {
            1
        };
        if let Some(capacity) = config.max_clumps {
            if config.cube && capacity < cube_iters {
                return Err(CollateError::CubeCapacityTooSmall);
            }
        }

        Ok(Collator {
            fields,
            instances,
            table: ClumpTable::new(config.max_clumps),
            incremental: config.incremental,
            cube_iters,
            cube_default: config.cube_default.clone(),
            debug: config.debug,
            records_in: 0,
        })
    }

    /// Streams one input source through the clump table.
    pub fn collate<R: Read, W: Write>(
        &mut self,
        reader: R,
        out: &mut W,
    ) -> Result<(), CollateError> {
        let mut stream = RecordStream::new(reader);
        let mut extractor = RecordExtractor::new(&self.fields);
        let mut records = 0u64;
        while stream.next_record(&mut extractor)? {
            let values = extractor.values(stream.record_bytes());
            self.commit_record(&values, out)?;
            records += 1;
        }
        if self.debug {
            eprintln!("recs-collate: {records} records collated from input");
        }
        self.records_in += records;
        Ok(())
    }

    /// Per-record commit: numeric conversion, cube expansion, clump
    /// updates and (in incremental mode) emission.
    fn commit_record<W: Write>(
        &mut self,
        values: &[Option<Cow<'_, str>>],
        out: &mut W,
    ) -> Result<(), CollateError> {
        let Self {
            fields,
            instances,
            table,
            incremental,
            cube_iters,
            cube_default,
            ..
        } = self;

        let texts: Vec<Option<&str>> = values.iter().map(|v| v.as_deref()).collect();
        let numbers: Vec<f64> = texts
            .iter()
            .map(|t| t.map_or(f64::NAN, parse_double))
            .collect();

        // Bit i of the mask rolls key field i up to the cube default;
        // without --cube only the all-zero mask runs.
        for mask in 0..*cube_iters {
            let mut cube_texts = texts.clone();
            let mut cube_numbers = numbers.clone();
            for bit in 0..fields.num_key_fields() {
                if mask & (1 << bit) != 0 {
                    cube_texts[bit] = Some(cube_default.as_str());
                    cube_numbers[bit] = f64::NAN;
                }
            }
            add_to_clump(
                table,
                fields,
                instances,
                *incremental,
                &cube_texts,
                &cube_numbers,
                out,
            )?;
        }
        Ok(())
    }

    /// Emits every clump still resident (unless incremental mode already
    /// emitted everything record by record).
    pub fn finish<W: Write>(&mut self, out: &mut W) -> Result<(), CollateError> {
        if !self.incremental {
            for clump in self.table.iter() {
                emit_record(out, &self.fields, &self.instances, &clump.keys, &clump.states)?;
            }
        }
        if self.debug {
            eprintln!(
                "recs-collate: {} records in, {} clumps resident at end",
                self.records_in,
                self.table.len()
            );
        }
        Ok(())
    }
}

fn add_to_clump<W: Write>(
    table: &mut ClumpTable,
    fields: &FieldTable,
    instances: &[AggInstance],
    incremental: bool,
    texts: &[Option<&str>],
    numbers: &[f64],
    out: &mut W,
) -> Result<(), CollateError> {
    let key_vals = &texts[..fields.num_key_fields()];
    let (index, evicted) = table.find_or_create(key_vals, || {
        instances.iter().map(|i| i.config.init_state()).collect()
    });
    if let Some(victim) = evicted {
        if !incremental {
            emit_record(out, fields, instances, &victim.keys, &victim.states)?;
        }
    }

    let clump = table.clump_mut(index);
    for (instance, state) in instances.iter().zip(clump.states.iter_mut()) {
        let mut in_texts = [None; MAX_INPUT_FIELDS];
        let mut in_numbers = [f64::NAN; MAX_INPUT_FIELDS];
        for (slot, &field) in instance.input_fields.iter().enumerate() {
            in_texts[slot] = texts[field];
            in_numbers[slot] = numbers[field];
        }
        let inputs = instance.input_fields.len();
        state.update(&instance.config, &in_texts[..inputs], &in_numbers[..inputs]);
    }

    if incremental {
        let clump = table.clump(index);
        emit_record(out, fields, instances, &clump.keys, &clump.states)?;
    }
    Ok(())
}

// strtod semantics: skip leading whitespace, then parse the longest
// numeric prefix, NaN when none.
fn parse_double(text: &str) -> f64 {
    let text = text.trim_start_matches([' ', '\t', '\n', '\r', '\x0b', '\x0c']);
    match nom::number::complete::double::<&str, nom::error::Error<&str>>(text) {
        Ok((_, value)) => value,
        Err(_) => f64::NAN,
    }
}

/// Entry point behind `main`: opens the configured inputs (stdin when no
/// file is given) and drives the collator over each of them in order.
pub fn run(config: CollateConfig) -> Result<(), CollateError> {
    let mut collator = Collator::new(&config)?;

    // Open every input up front so a bad path fails before any output.
    let mut inputs = Vec::with_capacity(config.inputs.len());
    for path in &config.inputs {
        let file = File::open(path).map_err(|_| CollateError::InputFileNotFound {
            name: path.clone(),
        })?;
        inputs.push(BufReader::new(file));
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    if inputs.is_empty() {
        collator.collate(io::stdin().lock(), &mut out)?;
    } else {
        for input in inputs {
            collator.collate(input, &mut out)?;
        }
    }
    collator.finish(&mut out)?;
    out.flush()?;
    Ok(())
}
