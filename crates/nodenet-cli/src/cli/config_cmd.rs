use crate::cli::{report_problems, ConfigCommands};
use crate::config::NodenetConfig;
use anyhow::Result;
use nodenet_core::kinds;
use std::fmt::Write as _;
use std::path::Path;

pub fn run(cmd: ConfigCommands, config_path: &Path) -> Result<()> {
    match cmd {
        ConfigCommands::Validate => validate(config_path),
        ConfigCommands::Show => show(config_path),
    }
}

fn validate(config_path: &Path) -> Result<()> {
    let config = match NodenetConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("❌ Failed to load {}: {:#}", config_path.display(), e);
            std::process::exit(1);
        }
    };

    if report_problems(config_path, &config.validate()) {
        std::process::exit(1);
    }

    let engine = config.build_engine()?;
    println!(
        "✅ {} is valid: {:?} splits, autolinkers [{}].",
        config_path.display(),
        engine.config().split_mode,
        engine.linkers().names().join(", ")
    );
    Ok(())
}

fn show(config_path: &Path) -> Result<()> {
    let config = NodenetConfig::load_or_default(config_path);
    let toml = toml::to_string_pretty(&config)
        .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;
    println!("{}", toml);
    println!("{}", describe(&config)?);
    Ok(())
}

/// What an engine built from `config` actually runs with.
fn describe(config: &NodenetConfig) -> Result<String> {
    let engine = config.build_engine()?;
    let mut out = String::from("# Effective engine\n");

    let names = engine.linkers().names();
    if names.is_empty() {
        out.push_str("# autolinkers: none (manual edges only)\n");
    } else {
        writeln!(out, "# autolinkers: {}", names.join(", "))?;
    }

    for kind in kinds::defaults::all() {
        writeln!(
            out,
            "# isolated {}: {:?}",
            kind,
            engine.config().isolated_policy(&kind)
        )?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodenet_core::{GraphKind, IsolatedPolicy};

    #[test]
    fn test_describe_lists_registered_linkers() {
        let config = NodenetConfig::default();
        let text = describe(&config).unwrap();
        assert!(text.contains("# autolinkers: tile_adjacency, declared"));
        assert!(text.contains("# isolated power_lv: SingletonGraph"));
    }

    #[test]
    fn test_describe_reflects_overrides() {
        let mut config = NodenetConfig::default();
        config.linkers.tile_adjacency = false;
        config.linkers.declared = false;
        config.engine.kind_policies.insert(
            GraphKind::new("device_link").unwrap(),
            IsolatedPolicy::Detached,
        );

        let text = describe(&config).unwrap();
        assert!(text.contains("manual edges only"));
        assert!(text.contains("# isolated device_link: Detached"));
        assert!(text.contains("# isolated pipe: SingletonGraph"));
    }
}
