// Last.fm request signing
// api_sig = md5(key1value1key2value2...secret), keys sorted ascending

use std::collections::BTreeMap;

/// Compute the `api_sig` value for a set of request parameters.
///
/// Parameters are sorted by key (byte order), each key is followed directly
/// by its value, the shared secret is appended and the whole string is
/// hashed with MD5. The digest is rendered as lowercase hex.
///
/// When the same key appears more than once the last value wins.
pub fn sign<'a, I>(params: I, secret: &str) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let sorted: BTreeMap<&str, &str> = params.into_iter().collect();

    let mut payload = String::new();
    for (key, value) in &sorted {
        payload.push_str(key);
        payload.push_str(value);
    }
    payload.push_str(secret);

    format!("{:x}", md5::compute(payload.as_bytes()))
}
