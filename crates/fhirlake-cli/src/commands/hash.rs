use std::io::Read;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::cli::HashArgs;

/// Hex digest for the text or JSON document named by `args`.
pub fn digest(args: &HashArgs) -> Result<String> {
    match (&args.text, &args.json) {
        (Some(text), _) => Ok(fhirlake_hash::digest_hex(text.as_str())?),
        (None, Some(source)) => {
            let raw = read_source(source)?;
            let value: Value = serde_json::from_str(&raw)
                .with_context(|| format!("{source} is not valid JSON"))?;
            Ok(fhirlake_hash::digest_hex(&value)?)
        }
        (None, None) => anyhow::bail!("nothing to hash: pass TEXT or --json <FILE|->"),
    }
}

fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("failed to read {source}"))
    }
}
