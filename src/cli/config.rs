use crate::config::{config_file, find_data_path, resolve_model, CompanionConfig, SUGGESTED_MODELS};

/// Run the config command
pub fn run_config(key: Option<&str>, value: Option<&str>, list_models: bool) -> Result<(), String> {
    if list_models {
        print_models();
        return Ok(());
    }

    let data_path =
        find_data_path().ok_or("No .companion directory found. Run 'companion init' first.")?;
    let config =
        CompanionConfig::load(&data_path).map_err(|e| format!("Failed to load config: {}", e))?;

    match (key, value) {
        (None, None) => {
            println!("Current configuration ({}):\n", data_path.display());
            for (k, v) in config.entries() {
                let shown = if v.is_empty() { "(not set)".to_string() } else { v };
                println!("  {:16} {}", k, shown.replace('\n', " "));
            }

            let (model_name, model_type) = config.resolved_embedding_model();
            println!("\n  embeddings -> {} ({}) at {}", model_name, model_type, config.embedding_url());
            if config.api_key.is_some() {
                println!("  api key    -> set from COMPANION_API_KEY");
            }
        }
        (Some(k), None) => {
            let v = config.get(k).map_err(|e| e.to_string())?;
            println!("{}: {}", k, if v.is_empty() { "(not set)" } else { v.as_str() });
        }
        (Some(k), Some(v)) => {
            // Environment overrides must not leak into the saved file
            let mut config = CompanionConfig::load_file(&config_file(&data_path))
                .map_err(|e| format!("Failed to load config: {}", e))?;
            config.set(k, v).map_err(|e| e.to_string())?;

            if k == "embedding_model" {
                let (model_name, model_type) = resolve_model(v);
                println!("Embedding model: {} ({})", model_name, model_type);
                println!("\nNote: tips embedded with another model must be re-imported.");
            }

            config
                .save(&data_path)
                .map_err(|e| format!("Failed to save: {}", e))?;
            println!("Set {} = {}", k, v);
        }
        (None, Some(_)) => {
            return Err("Key required when setting a value".to_string());
        }
    }

    Ok(())
}

fn print_models() {
    let current = find_data_path()
        .and_then(|p| CompanionConfig::load(&p).ok())
        .map(|c| c.embedding_model)
        .unwrap_or_default();

    println!("Available embedding models:\n");
    println!("{:2} {:12} {:6} {}", "", "Alias", "Dims", "Description");
    println!("{}", "-".repeat(60));

    for model in SUGGESTED_MODELS {
        let marker = if model.alias == current || model.name == current {
            " *"
        } else {
            "  "
        };

        println!("{} {:12} {:6} {}", marker, model.alias, model.dim, model.description);
    }

    println!("\n* = currently configured");
    println!("\nSet model with: companion config embedding_model <alias>");
}
