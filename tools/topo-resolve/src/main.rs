//! Topoload Resolve - manifest resolution tool
//!
//! Loads a topology manifest, resolves it and prints the resolution report.
//!
//! # Usage
//!
//! ```bash
//! # Resolve a manifest and print the report as JSON
//! topo-resolve ./playback.yaml
//!
//! # Use loader settings from a file and print YAML
//! topo-resolve ./playback.yaml --config ./loader.toml --format yaml
//! ```
//!
//! A topology that fails to resolve prints the error and its status on
//! stderr and exits with code 2.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use topoload_core::{LoaderConfig, Manifest, ResolutionReport, TopologyLoader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit code for a topology the loader could not resolve.
const RESOLUTION_FAILED: i32 = 2;

/// Topoload Resolve - resolve topology manifests
#[derive(Parser)]
#[command(name = "topo-resolve")]
#[command(author, version)]
#[command(about = "Resolve a topology manifest and print the negotiated graph")]
struct Args {
    /// Path to the topology manifest (YAML or JSON)
    manifest: PathBuf,

    /// Loader settings file (TOML or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "json")]
    format: Format,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

/// Result of a run that got as far as the loader.
enum Outcome {
    Resolved(ResolutionReport),
    Failed(topoload_core::Error),
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    match resolve(&args.manifest, args.config.as_deref())? {
        Outcome::Resolved(report) => {
            println!("{}", render(&report, args.format)?);
            Ok(())
        }
        Outcome::Failed(e) => {
            eprintln!("error: {}", e);
            eprintln!("status: {:?} ({})", e.status(), e.status().as_u32());
            std::process::exit(RESOLUTION_FAILED);
        }
    }
}

/// Load settings and manifest, then resolve.
///
/// Errors before the loader runs are returned as `Err`; loader failures come
/// back as [`Outcome::Failed`].
fn resolve(manifest_path: &Path, config_path: Option<&Path>) -> Result<Outcome> {
    let config = LoaderConfig::load(config_path).context("Failed to load loader config")?;
    let manifest = Manifest::from_file(manifest_path)
        .with_context(|| format!("Failed to load manifest {}", manifest_path.display()))?;
    let (topology, nodes) = manifest.build().context("Failed to build topology")?;

    tracing::info!(
        name = %manifest.metadata.name,
        nodes = nodes.len(),
        "Resolving topology"
    );

    match TopologyLoader::new().with_config(config).load_with_report(&topology) {
        Ok((_, report)) => Ok(Outcome::Resolved(report)),
        Err(e) => Ok(Outcome::Failed(e)),
    }
}

fn render(report: &ResolutionReport, format: Format) -> Result<String> {
    Ok(match format {
        Format::Json => serde_json::to_string_pretty(report)?,
        Format::Yaml => serde_yaml::to_string(report)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
version: v1
nodes:
  - id: file
    kind: source
    types:
      - { major: audio, subtype: mp3, sample_rate: 44100, channels: 2 }
    current: 0
  - id: speaker
    kind: output
    types:
      - { major: audio, subtype: pcm, sample_rate: 44100, channels: 2, bits_per_sample: 16, complete: true }
    current: 0
connections:
  - { from: file, to: speaker }
"#;

    #[test]
    fn test_resolve_and_render() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playback.yaml");
        std::fs::write(&path, MANIFEST).unwrap();

        let Outcome::Resolved(report) = resolve(&path, None).unwrap() else {
            panic!("manifest should resolve");
        };
        let json = render(&report, Format::Json).unwrap();
        assert!(json.contains("mp3_decoder"));
        let yaml = render(&report, Format::Yaml).unwrap();
        assert!(yaml.contains("status: succeeded"));
    }

    #[test]
    fn test_loader_settings_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playback.yaml");
        std::fs::write(&path, MANIFEST).unwrap();
        let config = dir.path().join("loader.toml");
        std::fs::write(&config, "default_connect_method = \"direct\"\n").unwrap();

        let Outcome::Failed(e) = resolve(&path, Some(&config)).unwrap() else {
            panic!("direct-only resolution should fail");
        };
        assert_eq!(e.status(), topoload_core::ResolutionStatus::InvalidMediaType);
    }

    #[test]
    fn test_missing_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve(&dir.path().join("missing.yaml"), None).is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["topo-resolve", "t.yaml", "--format", "yaml", "-vv"]);
        assert_eq!(args.format, Format::Yaml);
        assert_eq!(args.verbose, 2);
        assert!(args.config.is_none());
    }
}
