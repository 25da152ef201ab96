use super::FormError;
use std::collections::HashMap;

/// Decode one `application/x-www-form-urlencoded` component.
///
/// `+` becomes a space; every `%` must introduce two hex digits and the
/// decoded bytes must be UTF-8.
pub fn percent_decode(input: &str) -> Result<String, FormError> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape_ok = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !escape_ok {
                return Err(FormError::Decode {
                    input: input.to_string(),
                });
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let spaced = input.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| FormError::Decode {
            input: input.to_string(),
        })
}

/// Parse `k=v&k2=v2` pairs into `form`, appending repeated keys in order.
///
/// Empty segments are skipped; a segment without `=` yields an empty value.
pub fn parse_into(form: &mut HashMap<String, Vec<String>>, encoded: &str) -> Result<(), FormError> {
    for pair in encoded.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = percent_decode(key)?;
        let value = percent_decode(value)?;
        form.entry(key).or_default().push(value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plus_and_escapes() {
        assert_eq!(percent_decode("a+b%20c%2Bd").unwrap(), "a b c+d");
        assert_eq!(percent_decode("caf%C3%A9").unwrap(), "café");
        assert_eq!(percent_decode("").unwrap(), "");
    }

    #[test]
    fn rejects_malformed_escapes() {
        assert!(matches!(percent_decode("100%"), Err(FormError::Decode { .. })));
        assert!(matches!(percent_decode("%zz"), Err(FormError::Decode { .. })));
        assert!(matches!(percent_decode("%4"), Err(FormError::Decode { .. })));
        assert!(matches!(percent_decode("%FF%FE"), Err(FormError::Decode { .. })));
    }

    #[test]
    fn repeated_keys_accumulate_in_order() {
        let mut form = HashMap::new();
        parse_into(&mut form, "tag=a&&tag=b&flag&name=bob+smith").unwrap();
        assert_eq!(form["tag"], vec!["a", "b"]);
        assert_eq!(form["flag"], vec![""]);
        assert_eq!(form["name"], vec!["bob smith"]);
    }

    #[test]
    fn value_keeps_later_equals_signs() {
        let mut form = HashMap::new();
        parse_into(&mut form, "expr=a%3Db=c").unwrap();
        assert_eq!(form["expr"], vec!["a=b=c"]);
    }
}
