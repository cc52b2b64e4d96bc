//! CLI command implementations.
//!
//! Each submodule implements one `promptport` subcommand. Commands run
//! against a JSON store file loaded into an in-memory store.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `export` | Render prompts to JSON, CSV, XML or all three |
//! | `import` | Import a native, CSV or provider payload into the store |
//! | `validate` | Print the integrity report for a payload |
//!
//! # Example Usage
//!
//! ```bash
//! # Export a prompt file as gzipped CSV
//! promptport export --input prompts.json --format csv --gzip --output out/
//!
//! # Import it back, renaming colliding ids
//! promptport import --source out/export.csv --strategy rename_new
//!
//! # Check an OpenAI payload without importing it
//! promptport validate --source chats.json --format openai
//! ```

mod export;
mod import;
pub mod store;
mod validate;

pub use export::{ExportArgs, cmd_export};
pub use import::{ImportArgs, cmd_import};
pub use validate::{ValidateArgs, cmd_validate, validate_source};

use crate::io::ImportSourceFormat;
use crate::io::validation::SourcePayload;
use crate::{Error, Result};
use clap::Args;
use secrecy::SecretString;
use std::path::PathBuf;

/// Payload location shared by `import` and `validate`.
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Payload file.
    #[arg(short, long)]
    pub source: PathBuf,

    /// Payload format: native, csv, openai, anthropic or huggingface.
    /// Defaults to csv for `.csv` files and native otherwise.
    #[arg(short, long)]
    pub format: Option<String>,

    /// Expected SHA-256 of the payload. Read from `<source>.sha256` when omitted.
    #[arg(long)]
    pub checksum: Option<String>,

    /// Environment variable holding the decryption secret.
    #[arg(long)]
    pub decrypt_env: Option<String>,
}

impl SourceArgs {
    /// Resolves the payload format.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown format names.
    pub fn format(&self) -> Result<ImportSourceFormat> {
        if let Some(format) = &self.format {
            return format.parse();
        }
        let is_csv = self
            .source
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        Ok(if is_csv {
            ImportSourceFormat::Csv
        } else {
            ImportSourceFormat::Native
        })
    }

    /// Reads the payload and its declared checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload or sidecar cannot be read.
    pub fn payload(&self) -> Result<SourcePayload> {
        let bytes = std::fs::read(&self.source).map_err(|e| Error::OperationFailed {
            operation: "read_source".to_string(),
            cause: format!("{}: {e}", self.source.display()),
        })?;
        let payload = SourcePayload::new(bytes);

        let declared = match &self.checksum {
            Some(checksum) => Some(checksum.clone()),
            None => self.sidecar_checksum()?,
        };
        Ok(match declared {
            Some(checksum) => payload.with_checksum(checksum),
            None => payload,
        })
    }

    fn sidecar_checksum(&self) -> Result<Option<String>> {
        let mut sidecar = self.source.as_os_str().to_owned();
        sidecar.push(".sha256");
        let sidecar = PathBuf::from(sidecar);
        if !sidecar.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&sidecar)?;
        tracing::debug!(path = %sidecar.display(), "Using checksum sidecar");
        Ok(contents.split_whitespace().next().map(String::from))
    }
}

/// Splits a comma-separated list, dropping empty entries.
#[must_use]
pub fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

/// Reads a secret from the environment variable `var`.
///
/// # Errors
///
/// Returns an error if the variable is unset or empty.
pub fn read_secret(var: &str) -> Result<SecretString> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(SecretString::from(value)),
        _ => Err(Error::InvalidInput(format!(
            "Environment variable {var} is not set or empty"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(None, vec![]; "none")]
    #[test_case(Some(""), vec![]; "empty")]
    #[test_case(Some("a, b,,c "), vec!["a", "b", "c"]; "trims and drops empties")]
    fn test_split_list(raw: Option<&str>, expected: Vec<&str>) {
        assert_eq!(split_list(raw), expected);
    }

    #[test]
    fn test_format_from_extension() {
        let args = SourceArgs {
            source: PathBuf::from("data/prompts.CSV"),
            format: None,
            checksum: None,
            decrypt_env: None,
        };
        assert_eq!(args.format().unwrap(), ImportSourceFormat::Csv);

        let args = SourceArgs {
            format: Some("hf".to_string()),
            ..args
        };
        assert_eq!(args.format().unwrap(), ImportSourceFormat::HuggingFace);
    }

    #[test]
    fn test_explicit_checksum_beats_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("p.json");
        std::fs::write(&source, b"[]").unwrap();
        std::fs::write(dir.path().join("p.json.sha256"), "abc  p.json\n").unwrap();

        let mut args = SourceArgs {
            source,
            format: None,
            checksum: None,
            decrypt_env: None,
        };
        assert_eq!(args.payload().unwrap().declared_checksum.as_deref(), Some("abc"));

        args.checksum = Some("def".to_string());
        assert_eq!(args.payload().unwrap().declared_checksum.as_deref(), Some("def"));
    }
}
