use super::ServerConfig;

/// Validate a merged configuration.
///
/// # Errors
/// Returns an error if:
/// - No usable Gemini credentials are configured
/// - Any session timing is zero
/// - The inbound chunk size is zero or odd
pub(super) fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.live_endpoint()?;
    validate_timings(config)?;
    validate_inbound_chunk_bytes(config.inbound_chunk_bytes)?;
    Ok(())
}

fn validate_timings(config: &ServerConfig) -> Result<(), String> {
    for (name, value) in [
        ("ready_timeout_ms", config.ready_timeout_ms),
        ("reconnect_delay_ms", config.reconnect_delay_ms),
        ("liveness_tick_ms", config.liveness_tick_ms),
    ] {
        if value == 0 {
            return Err(format!("{name} must be greater than zero"));
        }
    }
    Ok(())
}

fn validate_inbound_chunk_bytes(bytes: usize) -> Result<(), String> {
    if bytes == 0 || bytes % 2 != 0 {
        return Err(format!(
            "inbound_chunk_bytes must be a positive even number of bytes, got {bytes}"
        ));
    }
    Ok(())
}
