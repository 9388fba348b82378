use std::{
    io::{self, IsTerminal, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::{Input, Select};
use owo_colors::OwoColorize;
use tracing::warn;
use tree_browser::logging::init_logging;
use tree_browser::settings::Settings;
use tree_browser::{
    BrowserSession, Entry, ListingParser, ListingView, NavPath, ParseOptions, TreeTextParser,
    format_tree,
};

#[derive(Debug, Parser)]
#[command(
    name = "tree-browser",
    about = "Browse the output of tree-printing utilities one folder at a time",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    /// Settings file (defaults to ./tree-browser.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(flatten)]
    layout: LayoutArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Open a listing and browse it interactively.
    Browse(BrowseArgs),

    /// Parse a listing and print the recovered tree.
    Parse(ParseArgs),

    /// Print the entries of one folder of a listing.
    Ls(LsArgs),
}

/// Overrides for the listing layout; unset flags keep the configured value.
#[derive(Debug, Args)]
struct LayoutArgs {
    /// Lines to skip before the first entry.
    #[arg(long, global = true)]
    header_lines: Option<usize>,
    /// Lines to skip after the last entry.
    #[arg(long, global = true)]
    footer_lines: Option<usize>,
    /// Glyph characters per nesting level.
    #[arg(long, global = true)]
    indent_width: Option<usize>,
    /// Accept ASCII connectors (`|`, `+---`, `\---`) as indentation.
    #[arg(long, global = true)]
    ascii: bool,
}

impl LayoutArgs {
    fn apply(&self, options: &mut ParseOptions) {
        if let Some(n) = self.header_lines {
            options.header_lines = n;
        }
        if let Some(n) = self.footer_lines {
            options.footer_lines = n;
        }
        if let Some(n) = self.indent_width {
            options.indent_width = n;
        }
        if self.ascii {
            options.ascii_glyphs = true;
        }
    }
}

#[derive(Debug, Args)]
struct BrowseArgs {
    /// Listing produced by `tree` or a compatible tool.
    file: PathBuf,
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Listing produced by `tree` or a compatible tool.
    file: PathBuf,
    /// Emit the nested mapping as JSON instead of re-rendering it.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct LsArgs {
    /// Listing produced by `tree` or a compatible tool.
    file: PathBuf,
    /// Folder names to descend through, starting at the top level.
    path: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    cli.layout.apply(&mut settings.parse);
    settings.parse.validate()?;
    init_logging(&settings.logging, cli.verbose)?;

    let parser = TreeTextParser::new(settings.parse);
    match cli.command {
        Commands::Browse(args) => handle_browse(args, &parser),
        Commands::Parse(args) => handle_parse(args, &parser),
        Commands::Ls(args) => handle_ls(args, &parser),
    }
}

fn handle_parse(args: ParseArgs, parser: &TreeTextParser) -> Result<()> {
    let ParseArgs { file, json } = args;
    let root = parser
        .try_parse_file(&file)
        .with_context(|| format!("parsing {:?}", file))?;
    if root.is_empty() {
        eprintln!("Nothing to display in {:?}.", file);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&root)?);
    } else {
        print!("{}", format_tree(&root, &file.display().to_string()));
    }
    Ok(())
}

fn handle_ls(args: LsArgs, parser: &dyn ListingParser) -> Result<()> {
    let LsArgs { file, path } = args;
    let mut session = BrowserSession::empty();
    session
        .load_file(&file, parser)
        .with_context(|| format!("parsing {:?}", file))?;

    for segment in &path {
        if !session.descend(segment) {
            warn!(segment = %segment, at = %session.path(), "not a folder with entries; listing parent");
            break;
        }
    }

    let stdout = io::stdout();
    let color = stdout.is_terminal();
    let mut view = TextView::new(stdout.lock(), color);
    session.render(&mut view)?;
    Ok(())
}

/* ------------------------------ Interactive ------------------------------ */

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Enter(String),
    Up,
    Load,
    Quit,
}

/// Menu rows for the current folder: `..` when nested, the entries, then the
/// session commands.
fn menu(session: &BrowserSession, color: bool) -> Vec<(String, Action)> {
    let mut rows = Vec::new();
    if !session.is_at_root() {
        rows.push(("..".to_string(), Action::Up));
    }
    for entry in session.list_entries() {
        let label = entry_label(&entry, color);
        rows.push((label, Action::Enter(entry.name)));
    }
    rows.push(("[load another file]".to_string(), Action::Load));
    rows.push(("[quit]".to_string(), Action::Quit));
    rows
}

fn entry_label(entry: &Entry, color: bool) -> String {
    match (entry.has_children, color) {
        (true, true) => format!("{}/", entry.name.blue()),
        (true, false) => format!("{}/", entry.name),
        (false, _) => entry.name.clone(),
    }
}

fn handle_browse(args: BrowseArgs, parser: &dyn ListingParser) -> Result<()> {
    let mut source = args.file;
    let mut session = BrowserSession::empty();
    session
        .load_file(&source, parser)
        .with_context(|| format!("parsing {:?}", source))?;

    let color = io::stderr().is_terminal();
    loop {
        let rows = menu(&session, color);
        let prompt = if session.root().is_empty() {
            format!("{} (nothing to display)", source.display())
        } else {
            format!("{} {}", source.display(), session.path())
        };
        let labels: Vec<&str> = rows.iter().map(|(label, _)| label.as_str()).collect();
        let choice = Select::new()
            .with_prompt(prompt)
            .items(&labels)
            .default(0)
            .interact_opt()
            .context("reading selection")?;

        match choice.map(|idx| &rows[idx].1) {
            None | Some(Action::Quit) => break,
            Some(Action::Up) => {
                session.go_up();
            }
            Some(Action::Enter(name)) => {
                // Leaves are listed but not enterable.
                session.descend(name);
            }
            Some(Action::Load) => {
                let input: String = Input::new()
                    .with_prompt("Listing file")
                    .interact_text()
                    .context("reading file name")?;
                let candidate = PathBuf::from(input.trim());
                match session.load_file(&candidate, parser) {
                    Ok(()) => source = candidate,
                    Err(err) => eprintln!("Could not load {:?}: {err}", candidate),
                }
            }
        }
    }
    Ok(())
}

/* --------------------------------- Views --------------------------------- */

/// One entry per line; folders get a trailing `/` (blue when `color`).
struct TextView<W: Write> {
    out: W,
    color: bool,
}

impl<W: Write> TextView<W> {
    fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }
}

impl<W: Write> ListingView for TextView<W> {
    fn render(&mut self, _path: &NavPath, entries: &[Entry]) -> io::Result<()> {
        for entry in entries {
            writeln!(self.out, "{}", entry_label(entry, self.color))?;
        }
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const LISTING: &str = ".\n├── A\n│   ├── B\n│   └── C\n└── D\n\n1 directory, 3 files\n";

    fn session() -> BrowserSession {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("listing.txt");
        fs::write(&path, LISTING).expect("write listing");

        let mut session = BrowserSession::empty();
        session
            .load_file(&path, &TreeTextParser::new(ParseOptions::default()))
            .expect("load");
        session
    }

    #[test]
    fn menu_lists_entries_then_commands() {
        let session = session();
        let rows = menu(&session, false);
        let labels: Vec<_> = rows.iter().map(|(label, _)| label.as_str()).collect();
        assert_eq!(labels, ["A/", "D", "[load another file]", "[quit]"]);
        assert_eq!(rows[0].1, Action::Enter("A".into()));
    }

    #[test]
    fn menu_offers_up_when_nested() {
        let mut session = session();
        assert!(session.descend("A"));
        let rows = menu(&session, false);
        assert_eq!(rows[0], ("..".to_string(), Action::Up));
        assert_eq!(rows[1].0, "B");
    }

    #[test]
    fn text_view_marks_folders() {
        let session = session();
        let mut out = Vec::new();
        session
            .render(&mut TextView::new(&mut out, false))
            .expect("render");
        assert_eq!(String::from_utf8(out).unwrap(), "A/\nD\n");
    }

    #[test]
    fn layout_flags_override_settings() {
        let layout = LayoutArgs {
            header_lines: Some(3),
            footer_lines: None,
            indent_width: None,
            ascii: true,
        };
        let mut options = ParseOptions::default();
        layout.apply(&mut options);
        assert_eq!(options.header_lines, 3);
        assert_eq!(options.footer_lines, 2);
        assert!(options.ascii_glyphs);
    }

    #[test]
    fn parse_fails_on_missing_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let args = ParseArgs {
            file: tmp.path().join("missing.txt"),
            json: true,
        };
        let err = handle_parse(args, &TreeTextParser::new(ParseOptions::default())).unwrap_err();
        assert!(err.to_string().contains("missing.txt"), "{err:#}");
    }

    #[test]
    fn parse_fails_on_undecodable_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("listing.txt");
        fs::write(&path, b"\xFF\xFE\x00").expect("write listing");
        let args = ParseArgs {
            file: path,
            json: false,
        };
        assert!(handle_parse(args, &TreeTextParser::new(ParseOptions::default())).is_err());
    }
}
