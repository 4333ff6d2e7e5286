use std::io::{self, Write};

/// Writes `s` as a quoted JSON string, escaping the minimum JSON requires.
pub fn write_json_str<W: Write>(out: &mut W, s: &str) -> io::Result<()> {
    serde_json::to_writer(out, s).map_err(io::Error::other)
}

/// Renders a double the way C `printf("%g", v)` does with the default
/// precision of 6: fixed notation while the decimal exponent stays in
/// `[-4, 5]`, scientific notation with a signed two-digit exponent
/// otherwise, trailing zeros trimmed in both styles.
pub fn format_g(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // Round to 6 significant digits first; the exponent of the rounded
    // value decides which style applies.
    let sci = format!("{v:.5e}");
    let (mantissa, exp) = sci
        .split_once('e')
        .expect("float formatted with {:e} always carries an exponent");
    let exp: i32 = exp
        .parse()
        .expect("float exponent is always a valid integer");

    if !(-4..6).contains(&exp) {
        let mantissa = trim_fraction(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (5 - exp) as usize;
        trim_fraction(&format!("{v:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        let s = s.trim_end_matches('0');
        s.strip_suffix('.').unwrap_or(s)
    } else {
        s
    }
}
