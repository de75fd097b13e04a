use {anyhow::Result, clap::Subcommand, hostex_config::BridgeConfig, serde_json::Value};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration with access tokens masked.
    Show,
    /// Print the config file path in use (or where one would be created).
    Path,
}

pub fn handle_config(action: ConfigAction, config: &BridgeConfig) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let mut value = serde_json::to_value(config)?;
            mask_tokens(&mut value);
            println!("{}", serde_json::to_string_pretty(&value)?);
        },
        ConfigAction::Path => {
            let path = hostex_config::find_or_default_config_path()?;
            let state = if path.exists() {
                ""
            } else {
                " (not created yet)"
            };
            println!("{}{state}", path.display());
        },
    }
    Ok(())
}

fn mask_tokens(config: &mut Value) {
    let Some(logins) = config.get_mut("logins").and_then(Value::as_object_mut) else {
        return;
    };
    for login in logins.values_mut() {
        if let Some(token) = login.get_mut("access_token")
            && let Some(raw) = token.as_str()
        {
            let masked: String = raw.chars().take(4).chain("…".chars()).collect();
            *token = Value::String(masked);
        }
    }
}
