//! Argument parsing helpers.

use tablestore_core::Scalar;

/// Parses `name=value` into a condition variable.
///
/// The value is read as an integer, then a float, then `true`/`false`.
/// Anything else is a string; surrounding single or double quotes are
/// stripped, so `--var "s='42'"` binds the string `42`.
pub fn parse_variable(arg: &str) -> Result<(String, Scalar), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{arg}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{arg}'"));
    }

    let value = value.trim();
    let scalar = if let Ok(v) = value.parse::<i64>() {
        Scalar::Long(v)
    } else if let Ok(v) = value.parse::<f64>() {
        Scalar::Double(v)
    } else if value.eq_ignore_ascii_case("true") {
        Scalar::Bool(true)
    } else if value.eq_ignore_ascii_case("false") {
        Scalar::Bool(false)
    } else {
        Scalar::String(unquote(value).to_string())
    };
    Ok((name.to_string(), scalar))
}

fn unquote(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
