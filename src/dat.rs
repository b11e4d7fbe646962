//! Logiqx DAT catalog parsing and filtered output.
//!
//! The input is an XML `<datafile>` with a `<header>` and a flat list of
//! `<game>` elements. Each game is re-serialized at parse time so the
//! filtered output carries the entry exactly as the input described it;
//! header identity fields are rewritten to mark the output as a filtered
//! derivative, everything else in the header passes through.

use anyhow::{bail, Context, Result};
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::safety::write_atomic;

/// One `<game>` element: its name attribute and its serialized form.
#[derive(Clone, Debug)]
pub struct GameRecord {
    pub name: String,
    pub xml: String,
}

/// Header fields we rewrite, plus every other header child kept verbatim.
#[derive(Clone, Debug, Default)]
pub struct DatHeader {
    pub name: String,
    pub description: String,
    /// Serialized header children other than the rewritten identity fields
    /// (name, description, version, date, author, homepage), in input order.
    pub extra: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct Datafile {
    pub header: DatHeader,
    pub games: Vec<GameRecord>,
}

/// Trailing parenthetical on a header title, e.g. " (Parent-Clone)".
static TRAILING_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)\s*$").unwrap());

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

/// Serialize an element subtree with tab indentation, the way DAT tooling
/// conventionally formats these files.
fn serialize_element(node: roxmltree::Node, depth: usize, out: &mut String) {
    let indent = "\t".repeat(depth);
    let tag = node.tag_name().name();

    out.push_str(&indent);
    out.push('<');
    out.push_str(tag);
    for attr in node.attributes() {
        out.push(' ');
        out.push_str(attr.name());
        out.push_str("=\"");
        out.push_str(&escape_attr(attr.value()));
        out.push('"');
    }

    let element_children: Vec<roxmltree::Node> =
        node.children().filter(|c| c.is_element()).collect();
    let text: String = node
        .children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect();
    let text = text.trim();

    if element_children.is_empty() && text.is_empty() {
        out.push_str("/>");
    } else if element_children.is_empty() {
        out.push('>');
        out.push_str(&escape_text(text));
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    } else {
        out.push_str(">\n");
        for child in element_children {
            serialize_element(child, depth + 1, out);
            out.push('\n');
        }
        out.push_str(&indent);
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
}

/// Parse DAT XML text into header fields and game records.
///
/// Games without a `name` attribute cannot participate in matching and are
/// dropped with a warning.
pub fn parse_datafile(text: &str) -> Result<Datafile> {
    let doc = roxmltree::Document::parse(text).context("Failed to parse DAT XML")?;
    let root = doc.root_element();
    if root.tag_name().name() != "datafile" {
        bail!(
            "Not a DAT file: expected <datafile> root, found <{}>",
            root.tag_name().name()
        );
    }

    let mut header = DatHeader::default();
    let mut games = Vec::new();

    for node in root.children().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "header" => {
                for field in node.children().filter(|n| n.is_element()) {
                    match field.tag_name().name() {
                        "name" => header.name = field.text().unwrap_or("").trim().to_string(),
                        "description" => {
                            header.description = field.text().unwrap_or("").trim().to_string()
                        }
                        // Rewritten on output.
                        "version" | "date" | "author" | "homepage" => {}
                        _ => {
                            let mut s = String::new();
                            serialize_element(field, 2, &mut s);
                            header.extra.push(s);
                        }
                    }
                }
            }
            "game" => match node.attribute("name") {
                Some(name) => {
                    let mut xml = String::new();
                    serialize_element(node, 1, &mut xml);
                    games.push(GameRecord {
                        name: name.to_string(),
                        xml,
                    });
                }
                None => log::warn!("skipping <game> element without a name attribute"),
            },
            other => log::debug!("ignoring top-level element <{other}>"),
        }
    }

    Ok(Datafile { header, games })
}

/// Read and parse a DAT file from disk.
pub fn load_datafile(path: &Path) -> Result<Datafile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read DAT file '{}'", path.display()))?;
    parse_datafile(&text)
}

/// Header title for the filtered output: the original with any trailing
/// parenthetical replaced by "(Filtered)".
fn filtered_title(original: &str) -> String {
    let base = TRAILING_PAREN.replace(original, "");
    let base = base.trim();
    if base.is_empty() {
        "Filtered Catalog".to_string()
    } else {
        format!("{base} (Filtered)")
    }
}

/// Render a complete DAT document containing only the games at `kept`
/// indices, in ascending input order.
pub fn render_filtered(dat: &Datafile, kept: &[usize]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\"?>\n");
    out.push_str(
        "<!DOCTYPE datafile PUBLIC \"-//Logiqx//DTD ROM Management Datafile//EN\" \
         \"http://www.logiqx.com/Dats/datafile.dtd\">\n",
    );
    out.push_str("<datafile>\n");
    out.push_str("\t<header>\n");
    out.push_str(&format!(
        "\t\t<name>{}</name>\n",
        escape_text(&filtered_title(&dat.header.name))
    ));
    out.push_str(&format!(
        "\t\t<description>{}</description>\n",
        escape_text(&filtered_title(&dat.header.description))
    ));
    out.push_str(&format!(
        "\t\t<version>{}</version>\n",
        env!("CARGO_PKG_VERSION")
    ));
    out.push_str(&format!(
        "\t\t<date>{}</date>\n",
        Local::now().format("%Y-%m-%d")
    ));
    out.push_str("\t\t<author>datsieve</author>\n");
    out.push_str(&format!(
        "\t\t<homepage>{}</homepage>\n",
        env!("CARGO_PKG_NAME")
    ));
    for extra in &dat.header.extra {
        out.push_str(extra);
        out.push('\n');
    }
    out.push_str("\t</header>\n");

    for &i in kept {
        out.push_str(&dat.games[i].xml);
        out.push('\n');
    }

    out.push_str("</datafile>\n");
    out
}

/// Write the filtered DAT atomically.
pub fn write_filtered(path: &Path, dat: &Datafile, kept: &[usize]) -> Result<()> {
    write_atomic(path, &render_filtered(dat, kept))
}

/// Re-read a written DAT and return its game count, confirming the output on
/// disk holds exactly what the run decided to keep.
pub fn count_games(path: &Path) -> Result<usize> {
    Ok(load_datafile(path)?.games.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<!DOCTYPE datafile PUBLIC "-//Logiqx//DTD ROM Management Datafile//EN" "http://www.logiqx.com/Dats/datafile.dtd">
<datafile>
	<header>
		<name>Nintendo - SNES (Parent-Clone)</name>
		<description>Nintendo - SNES (Parent-Clone)</description>
		<version>2026.01.01</version>
		<date>2026-01-01</date>
		<author>somebody</author>
		<homepage>example.org</homepage>
		<url>https://example.org/dats</url>
	</header>
	<game name="Chrono Trigger (USA)">
		<description>Chrono Trigger (USA)</description>
		<rom name="Chrono Trigger (USA).sfc" size="4194304" crc="2d206bf7"/>
	</game>
	<game name="Fun &amp; Games (USA)">
		<description>Fun &amp; Games (USA)</description>
		<rom name="Fun &amp; Games (USA).sfc" size="1048576" crc="aaaaaaaa"/>
	</game>
	<game name="EarthBound (USA)">
		<description>EarthBound (USA)</description>
		<rom name="EarthBound (USA).sfc" size="3145728" crc="bbbbbbbb"/>
	</game>
</datafile>
"#;

    #[test]
    fn parses_header_and_games() {
        let dat = parse_datafile(SAMPLE).unwrap();
        assert_eq!(dat.header.name, "Nintendo - SNES (Parent-Clone)");
        assert_eq!(dat.games.len(), 3);
        assert_eq!(dat.games[1].name, "Fun & Games (USA)");
        // Pass-through header tags survive; rewritten ones do not.
        assert_eq!(dat.header.extra.len(), 1);
        assert!(dat.header.extra[0].contains("<url>https://example.org/dats</url>"));
    }

    #[test]
    fn rejects_non_datafile_root() {
        let err = parse_datafile("<catalog><game name=\"x\"/></catalog>").unwrap_err();
        assert!(err.to_string().contains("expected <datafile>"));
    }

    #[test]
    fn game_without_name_is_skipped() {
        let dat = parse_datafile(
            "<datafile><game name=\"Kept (USA)\"/><game><rom name=\"x\"/></game></datafile>",
        )
        .unwrap();
        assert_eq!(dat.games.len(), 1);
        assert_eq!(dat.games[0].name, "Kept (USA)");
    }

    #[test]
    fn render_keeps_only_selected_games() {
        let dat = parse_datafile(SAMPLE).unwrap();
        let out = render_filtered(&dat, &[0, 2]);

        assert!(out.contains("Chrono Trigger (USA)"));
        assert!(out.contains("EarthBound (USA)"));
        assert!(!out.contains("Fun &amp; Games"));

        let reread = parse_datafile(&out).unwrap();
        assert_eq!(reread.games.len(), 2);
        assert_eq!(reread.games[0].name, "Chrono Trigger (USA)");
    }

    #[test]
    fn render_rewrites_header_identity() {
        let dat = parse_datafile(SAMPLE).unwrap();
        let out = render_filtered(&dat, &[]);

        assert!(out.contains("<name>Nintendo - SNES (Filtered)</name>"));
        assert!(out.contains(&format!("<version>{}</version>", env!("CARGO_PKG_VERSION"))));
        assert!(out.contains("<author>datsieve</author>"));
        assert!(out.contains("<homepage>datsieve</homepage>"));
        assert!(!out.contains("<homepage>example.org</homepage>"));
        assert!(out.contains("<url>https://example.org/dats</url>"));
        assert!(out.contains("<date>"));
    }

    #[test]
    fn ampersands_survive_a_parse_render_cycle() {
        let dat = parse_datafile(SAMPLE).unwrap();
        let out = render_filtered(&dat, &[1]);
        assert!(out.contains("Fun &amp; Games (USA)"));

        let reread = parse_datafile(&out).unwrap();
        assert_eq!(reread.games[0].name, "Fun & Games (USA)");
    }

    #[test]
    fn filtered_title_replaces_trailing_parenthetical() {
        assert_eq!(
            filtered_title("Nintendo - SNES (Parent-Clone)"),
            "Nintendo - SNES (Filtered)"
        );
        assert_eq!(filtered_title("Plain Name"), "Plain Name (Filtered)");
        assert_eq!(filtered_title(""), "Filtered Catalog");
    }

    #[test]
    fn write_and_count_round_trip() {
        let dat = parse_datafile(SAMPLE).unwrap();
        let path = std::env::temp_dir().join(format!("datsieve-dat-{}.dat", std::process::id()));

        write_filtered(&path, &dat, &[0, 1]).unwrap();
        assert_eq!(count_games(&path).unwrap(), 2);

        std::fs::remove_file(&path).unwrap();
    }
}
