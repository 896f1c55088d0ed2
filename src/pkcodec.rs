use crate::error::MergeError;

/// Field separator used in the packed primary-key / value wire encoding
/// consumed from the change-feed virtual table.
const FIELD_SEP: u8 = 0x1F;
/// A field consisting of exactly this single byte decodes to SQL `NULL`
/// rather than the empty string literal.
const NULL_SENTINEL: u8 = 0x00;

/// Quote a single decoded field as a SQL literal. Text is wrapped in single
/// quotes with embedded quotes doubled, per SQL's standard escaping — this
/// is the single place untrusted bytes are turned into SQL text, since
/// identifiers and values here are composed into SQL strings rather than
/// bound as statement parameters (see DESIGN.md).
fn quote_literal(field: &[u8]) -> Result<String, String> {
    if field.len() == 1 && field[0] == NULL_SENTINEL {
        return Ok("NULL".to_string());
    }
    let s = std::str::from_utf8(field).map_err(|e| format!("non-utf8 field: {e}"))?;
    Ok(format!("'{}'", s.replace('\'', "''")))
}

/// Quote a SQL identifier (table or column name) by doubling embedded
/// double quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn split_quote_raw(packed: &[u8], n: usize) -> Result<Vec<String>, String> {
    if packed.is_empty() && n == 0 {
        return Ok(Vec::new());
    }
    let parts: Vec<&[u8]> = packed.split(|b| *b == FIELD_SEP).collect();
    if parts.len() != n {
        return Err(format!("expected {n} fields, got {}", parts.len()));
    }
    parts.iter().map(|p| quote_literal(p)).collect()
}

/// Split a packed primary-key field list into exactly `n`
/// SQL-literal-quoted fields. Fails with `MergeError::PkDecode` if arity
/// mismatches or a field is not valid UTF-8.
pub fn split_quote(packed: &[u8], n: usize) -> Result<Vec<String>, MergeError> {
    split_quote_raw(packed, n).map_err(MergeError::PkDecode)
}

/// Split a packed single-value field into one SQL-literal-quoted field.
/// Fails with `MergeError::BadValue` on the same conditions as
/// `split_quote`, with the error attributed to value decoding rather than
/// pk decoding.
pub fn split_quote_value(packed: &[u8]) -> Result<String, MergeError> {
    split_quote_raw(packed, 1)
        .map(|mut v| v.remove(0))
        .map_err(MergeError::BadValue)
}

/// `"c1"=v1 AND "c2"=v2 AND ...` — the pk predicate used in WHERE clauses.
pub fn pk_where_list(pk_cols: &[String], vals: &[String]) -> String {
    pk_cols
        .iter()
        .zip(vals.iter())
        .map(|(c, v)| format!("{}={}", quote_ident(c), v))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// `v1, v2, ...`
pub fn pk_vals_str(vals: &[String]) -> String {
    vals.join(", ")
}

/// `"c1", "c2", ...`
pub fn pk_identifier_list(pk_cols: &[String]) -> String {
    pk_cols
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_quotes_simple_values() {
        let packed = [b"1".as_slice(), b"alice".as_slice()].join(&FIELD_SEP);
        let vals = split_quote(&packed, 2).unwrap();
        assert_eq!(vals, vec!["'1'".to_string(), "'alice'".to_string()]);
    }

    #[test]
    fn escapes_embedded_quotes() {
        let vals = split_quote(b"o'brien", 1).unwrap();
        assert_eq!(vals, vec!["'o''brien'".to_string()]);
    }

    #[test]
    fn null_sentinel_decodes_to_null() {
        let vals = split_quote(&[NULL_SENTINEL], 1).unwrap();
        assert_eq!(vals, vec!["NULL".to_string()]);
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let packed = [b"1".as_slice(), b"2".as_slice()].join(&FIELD_SEP);
        assert!(split_quote(&packed, 3).is_err());
        assert!(split_quote(&packed, 1).is_err());
    }

    #[test]
    fn builds_where_and_value_lists() {
        let cols = vec!["id".to_string(), "name".to_string()];
        let vals = vec!["'1'".to_string(), "'alice'".to_string()];
        assert_eq!(pk_where_list(&cols, &vals), "\"id\"='1' AND \"name\"='alice'");
        assert_eq!(pk_vals_str(&vals), "'1', 'alice'");
        assert_eq!(pk_identifier_list(&cols), "\"id\", \"name\"");
    }
}
