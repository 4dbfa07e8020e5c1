use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

pub mod catalog;
pub mod messages;
pub mod quotes;
pub mod settings;

/// Prints the server's confirmation, or `fallback` when it sent none.
pub fn announce(message: Option<String>, fallback: &str) {
    let text = message.unwrap_or_else(|| fallback.to_string());
    println!("\x1b[32m✓ {}\x1b[0m", text);
}

pub fn read_body(inline: Option<String>, file: Option<PathBuf>) -> Result<String> {
    match (inline, file) {
        (Some(body), _) => Ok(body),
        (None, Some(path)) => Ok(std::fs::read_to_string(path)?),
        (None, None) => bail!("Provide --body or --body-file"),
    }
}

pub fn write_export(csv: &str, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, csv)?;
            let rows = csv.lines().count().saturating_sub(1);
            println!("\x1b[32m✓ Wrote {} rows to {}\x1b[0m", rows, path.display());
        }
        None => print!("{}", csv),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_body_prefers_inline() {
        assert_eq!(read_body(Some("<p>Hi</p>".into()), None).unwrap(), "<p>Hi</p>");
        assert!(read_body(None, None).is_err());
    }

    #[test]
    fn test_read_body_from_file() {
        let path = std::env::temp_dir().join(format!("backoffice-body-{}.html", std::process::id()));
        std::fs::write(&path, "<p>From file</p>").unwrap();
        assert_eq!(read_body(None, Some(path.clone())).unwrap(), "<p>From file</p>");
        std::fs::remove_file(path).unwrap();
    }
}
