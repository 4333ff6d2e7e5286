use std::io::{self, Write};

use crate::aggregator::AggInstance;
use crate::aggregator::state::AggState;
use crate::fields::FieldTable;
use crate::utils::write_json_str;

/// Renders one clump as a single-line JSON object: key fields in
/// declaration order, then aggregator outputs in registration order.
/// Absent key values render as the `null` literal.
pub fn emit_record<W: Write>(
    out: &mut W,
    fields: &FieldTable,
    instances: &[AggInstance],
    keys: &[Option<Box<str>>],
    states: &[AggState],
) -> io::Result<()> {
    out.write_all(b"{")?;
    let mut first = true;
    for (i, key) in keys.iter().enumerate() {
        separate(out, &mut first)?;
        write_json_str(out, fields.name(i))?;
        out.write_all(b":")?;
        match key {
            Some(value) => write_json_str(out, value)?,
            None => out.write_all(b"null")?,
        }
    }
    for (instance, state) in instances.iter().zip(states) {
        separate(out, &mut first)?;
        write_json_str(out, &instance.output_field)?;
        out.write_all(b":")?;
        state.dump(&instance.config, out)?;
    }
    out.write_all(b"}\n")
}

// Comma before every field except the first one actually written, so a
// zero-key configuration does not start with a stray separator.
fn separate<W: Write>(out: &mut W, first: &mut bool) -> io::Result<()> {
    if *first {
        *first = false;
        Ok(())
    } else {
        out.write_all(b",")
    }
}
