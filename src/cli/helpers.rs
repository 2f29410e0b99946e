//! Shared CLI plumbing: workspace discovery, id parsing, and the small
//! formatting utilities the output paths have in common.

use miette::Result;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::{Config, Workspace};
use crate::store::TaskStore;

/// Discover the workspace, load the layered configuration, and open
/// the store.
///
/// `--workspace` pins the search root; otherwise the `.taskdesk/`
/// marker is searched upward from the current directory.
pub fn open_store(global: &GlobalOpts) -> Result<(TaskStore, Config)> {
    let workspace = match &global.workspace {
        Some(root) => Workspace::discover_from(root).map_err(|e| miette::miette!("{}", e))?,
        None => Workspace::discover().map_err(|e| miette::miette!("{}", e))?,
    };
    let config = Config::load(Some(&workspace));
    let store = TaskStore::open_at(&config.database_path(&workspace))?;
    Ok((store, config))
}

/// The output format for a command: an explicit `--format` wins, then
/// the configured `default_format`, then auto.
pub fn pick_format(global: &GlobalOpts, config: &Config) -> OutputFormat {
    if global.format != OutputFormat::Auto {
        return global.format;
    }
    config
        .default_format
        .as_deref()
        .and_then(|name| <OutputFormat as clap::ValueEnum>::from_str(name, true).ok())
        .unwrap_or(OutputFormat::Auto)
}

/// Parse a prefixed id and insist on the expected entity kind
pub fn parse_id(raw: &str, expected: EntityPrefix) -> Result<EntityId> {
    let id = EntityId::parse(raw).map_err(|e| miette::miette!("{}", e))?;
    if id.prefix() != expected {
        return Err(miette::miette!(
            "'{}' is a {} id, expected a {} id",
            raw,
            id.prefix().noun(),
            expected.noun()
        ));
    }
    Ok(id)
}

/// Shorten an id for table cells.
///
/// The prefix and the front of the ULID are the recognizable part, so
/// the head is kept and the tail dropped.
pub fn format_short_id(id: &EntityId) -> String {
    const WIDTH: usize = 16;
    let s = id.to_string();
    if s.len() <= WIDTH {
        return s;
    }
    format!("{}...", &s[..WIDTH - 3])
}

/// Clip a value for fixed-width table columns, appending "..." when
/// anything was cut. Counts chars rather than bytes so a multibyte
/// value cannot split mid-character.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let keep: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", keep)
}

/// Quote a CSV field when it holds a delimiter, a quote, or a line
/// break (RFC 4180); quotes double inside quoted fields.
pub fn escape_csv(s: &str) -> String {
    let needs_quoting = s.contains(',') || s.contains('"') || s.contains('\n');
    if !needs_quoting {
        return s.to_string();
    }
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_short_id() {
        // A prefix plus a 26-char ULID never fits a 16-char cell
        let id = EntityId::new(EntityPrefix::Task);
        let formatted = format_short_id(&id);
        assert!(formatted.len() <= 16);
        assert!(formatted.ends_with("..."));
    }

    #[test]
    fn test_pick_format_prefers_flag_over_config() {
        let global = GlobalOpts {
            format: OutputFormat::Json,
            quiet: false,
            verbose: false,
            workspace: None,
        };
        let mut config = Config::default();
        config.default_format = Some("csv".to_string());
        assert_eq!(pick_format(&global, &config), OutputFormat::Json);

        let auto = GlobalOpts {
            format: OutputFormat::Auto,
            ..global
        };
        assert_eq!(pick_format(&auto, &config), OutputFormat::Csv);

        config.default_format = Some("not-a-format".to_string());
        assert_eq!(pick_format(&auto, &config), OutputFormat::Auto);
    }

    #[test]
    fn test_parse_id_rejects_wrong_prefix() {
        let id = EntityId::new(EntityPrefix::Prop).to_string();
        assert!(parse_id(&id, EntityPrefix::Prop).is_ok());
        assert!(parse_id(&id, EntityPrefix::Task).is_err());
        assert!(parse_id("not-an-id", EntityPrefix::Task).is_err());
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        assert_eq!(truncate_str("hi", 2), "hi");
        assert_eq!(truncate_str("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("has,comma"), "\"has,comma\"");
        assert_eq!(escape_csv("has\"quote"), "\"has\"\"quote\"");
        assert_eq!(escape_csv("has\nnewline"), "\"has\nnewline\"");
    }
}
