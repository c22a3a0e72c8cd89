pub(super) fn parse_min_one_usize(raw: &str) -> std::result::Result<usize, String> {
    let value = raw
        .parse::<usize>()
        .map_err(|_| format!("invalid integer value '{raw}'"))?;
    if value == 0 {
        return Err("value must be >= 1".to_string());
    }
    Ok(value)
}

pub(super) fn parse_record_id(raw: &str) -> std::result::Result<i64, String> {
    let value = raw
        .parse::<i64>()
        .map_err(|_| format!("invalid id '{raw}'"))?;
    if value < 1 {
        return Err(format!("id must be positive, got {value}"));
    }
    Ok(value)
}
