pub mod config_cmd;
pub mod watch_cmd;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use forumsync_core::http::Headers;

/// Parses repeated `--header KEY=VALUE` arguments.
pub fn parse_headers(raw: &[String]) -> Result<Headers> {
    let mut headers = Headers::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("header '{entry}' must look like KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("header '{entry}' has an empty name");
        }
        headers.insert(key.to_string(), value.trim().to_string());
    }
    Ok(headers)
}

/// Prints `value` as a single JSON line on stdout.
pub fn emit_json_line<T: serde::Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value).context("failed to serialize output line")?;
    println!("{line}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn headers_split_on_the_first_equals_sign() {
        let headers = parse_headers(&[
            "API-Key = abc".to_string(),
            "Cookie=a=b".to_string(),
        ])
        .expect("headers");
        assert_eq!(headers.get("API-Key").map(String::as_str), Some("abc"));
        assert_eq!(headers.get("Cookie").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(parse_headers(&["no-separator".to_string()]).is_err());
        assert!(parse_headers(&["=value".to_string()]).is_err());
    }
}
