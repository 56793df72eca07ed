//! Command-line interface for the `ymx` document expander.
//!
//! The CLI is a single conversion command: it takes an input path, an output
//! path, and optional template arguments, and picks the conversion driver
//! from the two file extensions:
//!
//! | Input            | Output           | Conversion        |
//! |------------------|------------------|-------------------|
//! | `.yaml` / `.yml` | `.yaml` / `.yml` | expand to YAML    |
//! | `.yaml` / `.yml` | `.json`          | expand to JSON    |
//! | `.yaml` / `.yml` | anything else    | encode to binary  |
//! | anything else    | `.yaml` / `.yml` | decode from binary|
//!
//! Binary conversions need a schema codec; the stock binary ships without
//! one and reports that clearly. Host applications embedding the crate build
//! their own [`Session`] and call the drivers in [`convert`](crate::convert)
//! directly.
//!
//! # Examples
//!
//! ```bash
//! ymx scene.yaml scene.expanded.yaml
//! ymx scene.yaml scene.json --template-arg variant=night -t count=4
//! ymx -v scene.yaml scene.expanded.yaml
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;

use crate::convert;
use crate::engine::Session;
use crate::template;

/// Top-level CLI arguments.
#[derive(Parser)]
#[command(
    name = "ymx",
    about = "Expand YAML macro documents and convert them between formats",
    version,
    author
)]
pub struct Cli {
    /// Input file. YAML inputs are expanded; any other extension is treated
    /// as binary data to decode.
    input: PathBuf,

    /// Output file. The extension selects the target format: `.yaml`/`.yml`,
    /// `.json`, or binary for anything else.
    output: PathBuf,

    /// Template argument as `key=value`; may be repeated. Values substitute
    /// `${key}` placeholders in the input before parsing.
    #[arg(short = 't', long = "template-arg", value_name = "KEY=VALUE")]
    template_arg: Vec<String>,

    /// Enable verbose output (equivalent to `RUST_LOG=debug`).
    #[arg(short, long)]
    pub verbose: bool,
}

/// Which conversion driver a pair of file extensions selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    YamlToYaml,
    YamlToJson,
    YamlToBin,
    BinToYaml,
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    )
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

impl Conversion {
    fn select(input: &Path, output: &Path) -> Result<Self> {
        if is_yaml(input) {
            if is_yaml(output) {
                Ok(Self::YamlToYaml)
            } else if is_json(output) {
                Ok(Self::YamlToJson)
            } else {
                Ok(Self::YamlToBin)
            }
        } else if is_yaml(output) {
            if is_json(input) {
                anyhow::bail!(
                    "JSON input is not supported; convert '{}' from YAML instead",
                    input.display()
                );
            }
            Ok(Self::BinToYaml)
        } else {
            anyhow::bail!(
                "unsupported conversion from '{}' to '{}' (one side must be YAML)",
                input.display(),
                output.display()
            );
        }
    }
}

impl Cli {
    /// Runs the selected conversion against a fresh [`Session`].
    ///
    /// # Errors
    ///
    /// Invalid template arguments, unsupported extension pairs, and any
    /// conversion failure.
    pub fn execute(self) -> Result<()> {
        let template_args = template::parse_arg_pairs(&self.template_arg)
            .map_err(|reason| anyhow::anyhow!(reason))?;
        let session = Session::new();

        match Conversion::select(&self.input, &self.output)? {
            Conversion::YamlToYaml => {
                convert::yaml_to_yaml(&session, &self.input, &self.output, &template_args)
            }
            Conversion::YamlToJson => {
                convert::yaml_to_json(&session, &self.input, &self.output, &template_args)
                    .map(|_metadata| ())
            }
            Conversion::YamlToBin => {
                convert::yaml_to_bin(&session, &self.input, &self.output, &template_args)
            }
            Conversion::BinToYaml => convert::bin_to_yaml(&session, &self.input, &self.output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_selection() {
        let select = |i: &str, o: &str| Conversion::select(Path::new(i), Path::new(o));
        assert_eq!(select("a.yaml", "b.yml").unwrap(), Conversion::YamlToYaml);
        assert_eq!(select("a.yml", "b.json").unwrap(), Conversion::YamlToJson);
        assert_eq!(select("a.yaml", "b.bin").unwrap(), Conversion::YamlToBin);
        assert_eq!(select("a.bin", "b.yaml").unwrap(), Conversion::BinToYaml);
        assert!(select("a.json", "b.yaml").is_err());
        assert!(select("a.bin", "b.json").is_err());
        assert!(select("a.bin", "b.bin").is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "ymx",
            "in.yaml",
            "out.json",
            "--template-arg",
            "a=1",
            "-t",
            "b=2",
            "-v",
        ]);
        assert_eq!(cli.input, PathBuf::from("in.yaml"));
        assert_eq!(cli.output, PathBuf::from("out.json"));
        assert_eq!(cli.template_arg, vec!["a=1", "b=2"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_requires_both_paths() {
        assert!(Cli::try_parse_from(["ymx", "in.yaml"]).is_err());
    }
}
