use super::ServerConfig;
use super::env::load_from_env;
use super::yaml::YamlConfig;

/// Start from environment variables (with defaults) and apply YAML overrides.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = load_from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        override_with(&mut config.host, server.host);
        override_with(&mut config.port, server.port);
        override_option(&mut config.public_url, server.public_url);
    }

    if let Some(gemini) = yaml.gemini {
        override_option(&mut config.gemini_api_key, gemini.api_key);
        override_option(&mut config.gcp_project_id, gemini.project_id);
        override_with(&mut config.vertex_location, gemini.location);
        override_option(&mut config.google_access_token, gemini.access_token);
        override_option(&mut config.gemini_ws_url, gemini.ws_url);
        override_with(&mut config.live_model, gemini.model);
        override_with(&mut config.voice, gemini.voice);
        override_with(&mut config.system_instruction, gemini.system_instruction);
        override_option(&mut config.greeting, gemini.greeting);
        override_with(&mut config.transcribe_input, gemini.transcribe_input);
        override_with(&mut config.transcribe_output, gemini.transcribe_output);
        override_with(&mut config.context_compression, gemini.context_compression);
    }

    if let Some(session) = yaml.session {
        override_with(&mut config.ready_timeout_ms, session.ready_timeout_ms);
        override_with(&mut config.reconnect_delay_ms, session.reconnect_delay_ms);
        override_with(&mut config.liveness_tick_ms, session.liveness_tick_ms);
        override_with(&mut config.reconnect_on_go_away, session.reconnect_on_go_away);
        override_with(&mut config.inbound_chunk_bytes, session.inbound_chunk_bytes);
    }

    Ok(config)
}

fn override_with<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn override_option(target: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        *target = Some(value);
    }
}
