use anyhow::{Context, Result, bail};

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Parse `0x`-prefixed hex or plain decimal, with an optional leading minus.
pub fn parse_int(raw: &str) -> Result<i64> {
    let trimmed = raw.trim().replace('_', "");
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.as_str()),
    };
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16)
    } else {
        digits.parse::<i64>()
    }
    .with_context(|| format!("invalid integer {raw:?}"))?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Parse a seed that must fit in 32 bits.
pub fn parse_seed(raw: &str) -> Result<u32> {
    let value = parse_int(raw)?;
    match u32::try_from(value) {
        Ok(seed) => Ok(seed),
        Err(_) => bail!("seed {raw} is outside 0x00000000..=0xFFFFFFFF"),
    }
}
