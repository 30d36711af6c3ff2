//! PDF-to-markdown conversion via an external command
//!
//! The engine treats conversion as an opaque capability. This host
//! shells out to the command named by `LODESTONE_PDF_CONVERTER`
//! (invoked as `<command> <pdf-path>`, markdown on stdout). Without
//! one configured, PDF ingestion reports a clear error while markdown
//! files keep working.

use lodestone_core::{LodestoneError, MarkdownConverter};
use std::path::Path;
use std::process::Command;

pub struct ExternalConverter {
    command: Option<String>,
}

impl ExternalConverter {
    pub fn from_env() -> Self {
        Self::new(std::env::var("LODESTONE_PDF_CONVERTER").ok())
    }

    pub fn new(command: Option<String>) -> Self {
        Self { command }
    }
}

impl MarkdownConverter for ExternalConverter {
    fn convert(&self, path: &Path) -> lodestone_core::Result<(String, String)> {
        let command = self.command.as_ref().ok_or_else(|| {
            LodestoneError::InvalidInput(
                "no PDF converter configured; set LODESTONE_PDF_CONVERTER".into(),
            )
        })?;

        let output = Command::new(command).arg(path).output()?;
        if !output.status.success() {
            return Err(LodestoneError::InvalidInput(format!(
                "converter {} failed on {}: {}",
                command,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let markdown = String::from_utf8_lossy(&output.stdout).to_string();
        let source_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Ok((markdown, source_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_converter_rejects_pdfs() {
        let converter = ExternalConverter::new(None);
        let err = converter.convert(Path::new("/tmp/a.pdf")).unwrap_err();
        assert!(matches!(err, LodestoneError::InvalidInput(_)));
    }

    #[test]
    fn test_command_output_becomes_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.pdf");
        std::fs::write(&file, "# Converted\nbody").unwrap();

        // `cat` stands in for a real converter in tests
        let converter = ExternalConverter::new(Some("cat".to_string()));
        let (markdown, source_name) = converter.convert(&file).unwrap();
        assert_eq!(markdown, "# Converted\nbody");
        assert_eq!(source_name, "doc");
    }
}
