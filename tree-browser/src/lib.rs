//! Folder browser for tree-printed directory listings.
//!
//! The text produced by `tree`-style utilities carries its hierarchy only through
//! indentation glyphs. This crate recovers that hierarchy into an ordered
//! [`core::FolderNode`] and exposes a [`browser::BrowserSession`] that walks it one
//! folder at a time. Rendering stays with the caller (see [`browser::ListingView`]).

pub mod core {
    use crate::error::{Result, TreeError};
    use indexmap::IndexMap;
    use serde::{Deserialize, Serialize};
    use std::fmt;

    /* ------------------------------ Folder tree ------------------------------ */

    /// A folder: child name -> child folder, in listing order.
    ///
    /// Files and empty folders look the same in a tree printout, so a leaf is
    /// simply a folder without children.
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FolderNode(pub IndexMap<String, FolderNode>);

    impl FolderNode {
        pub fn new() -> Self {
            Self(IndexMap::new())
        }

        pub fn len(&self) -> usize {
            self.0.len()
        }

        pub fn is_empty(&self) -> bool {
            self.0.is_empty()
        }

        /// Only folders with children can be entered.
        pub fn has_children(&self) -> bool {
            !self.0.is_empty()
        }

        pub fn get(&self, name: &str) -> Option<&FolderNode> {
            self.0.get(name)
        }

        /// Insert `child` under `name`. An existing entry keeps its position and
        /// its subtree is replaced; the old subtree is returned.
        pub fn insert(&mut self, name: impl Into<String>, child: FolderNode) -> Option<FolderNode> {
            self.0.insert(name.into(), child)
        }

        pub fn iter(&self) -> indexmap::map::Iter<'_, String, FolderNode> {
            self.0.iter()
        }

        /// Display pairs for the direct children, in listing order.
        pub fn entries(&self) -> Vec<Entry> {
            self.0
                .iter()
                .map(|(name, child)| Entry {
                    name: name.clone(),
                    has_children: child.has_children(),
                })
                .collect()
        }

        /// Follow `path` from this folder.
        pub fn resolve(&self, path: &[String]) -> Result<&FolderNode> {
            path.iter().try_fold(self, |folder, segment| {
                folder.get(segment).ok_or_else(|| TreeError::NotFound {
                    segment: segment.clone(),
                })
            })
        }

        /// Number of entries below this folder at any depth.
        pub fn descendant_count(&self) -> usize {
            self.0
                .values()
                .map(|child| 1 + child.descendant_count())
                .sum()
        }
    }

    // IndexMap equality ignores order; two listings are only equal when they
    // also agree on sibling order.
    impl PartialEq for FolderNode {
        fn eq(&self, other: &Self) -> bool {
            self.0.len() == other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
        }
    }

    impl Eq for FolderNode {}

    impl<K: Into<String>> FromIterator<(K, FolderNode)> for FolderNode {
        fn from_iter<I: IntoIterator<Item = (K, FolderNode)>>(iter: I) -> Self {
            let mut node = FolderNode::new();
            for (name, child) in iter {
                node.insert(name, child);
            }
            node
        }
    }

    /* ------------------------------ Value objects ------------------------------ */

    /// One listing line after indentation has been measured.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct LineRecord {
        /// Entry name with glyphs, terminator, and surrounding whitespace removed.
        pub text: String,
        /// Zero-based nesting level.
        pub depth: usize,
        /// 1-based line in the source file (header included).
        pub line_number: usize,
    }

    /// What a view needs to draw one row.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Entry {
        pub name: String,
        pub has_children: bool,
    }

    /// Names from the root down to the displayed folder.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct NavPath(Vec<String>);

    impl NavPath {
        pub fn root() -> Self {
            Self(Vec::new())
        }

        pub fn is_root(&self) -> bool {
            self.0.is_empty()
        }

        pub fn segments(&self) -> &[String] {
            &self.0
        }

        pub fn push(&mut self, segment: impl Into<String>) {
            self.0.push(segment.into());
        }

        pub fn pop(&mut self) -> Option<String> {
            self.0.pop()
        }
    }

    impl fmt::Display for NavPath {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            if self.0.is_empty() {
                return f.write_str("/");
            }
            for segment in &self.0 {
                write!(f, "/{segment}")?;
            }
            Ok(())
        }
    }

}

pub mod error {
    use std::path::PathBuf;

    #[derive(Debug, thiserror::Error)]
    pub enum TreeError {
        #[error("failed to read {path:?}: {source}")]
        Io {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        #[error("content is not valid {encoding}")]
        Decode { encoding: &'static str },
        #[error("line {line}: {message}")]
        Structure { line: usize, message: String },
        #[error("no entry named {segment:?} in the current tree")]
        NotFound { segment: String },
        #[error("configuration error: {0}")]
        Config(String),
    }

    pub type Result<T> = std::result::Result<T, TreeError>;
}

pub mod decode {
    //! Raw bytes to text lines. The encoding is guessed from a leading sample.

    use crate::error::{Result, TreeError};
    use encoding_rs::Encoding;
    use std::{fs, path::Path};
    use tracing::{debug, warn};

    pub const DEFAULT_SAMPLE_BYTES: usize = 4096;

    /// Best-guess text encoding for a byte sample.
    pub trait EncodingDetector {
        fn detect(&self, sample: &[u8]) -> &'static Encoding;
    }

    /// BOM sniffing, then `chardetng` frequency analysis.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct StatisticalDetector;

    impl EncodingDetector for StatisticalDetector {
        fn detect(&self, sample: &[u8]) -> &'static Encoding {
            if let Some((encoding, _)) = Encoding::for_bom(sample) {
                return encoding;
            }
            let mut detector = chardetng::EncodingDetector::new();
            // The sample may end mid-character.
            detector.feed(sample, false);
            detector.guess(None, true)
        }
    }

    /// Decode `bytes` with whatever the detector reports for the first
    /// `sample_bytes`. Malformed input is an error, not replacement characters.
    pub fn decode_bytes(
        bytes: &[u8],
        detector: &dyn EncodingDetector,
        sample_bytes: usize,
    ) -> Result<String> {
        let sample = &bytes[..bytes.len().min(sample_bytes)];
        let encoding = detector.detect(sample);
        let body = match Encoding::for_bom(bytes) {
            Some((bom_encoding, bom_len)) if bom_encoding == encoding => &bytes[bom_len..],
            _ => bytes,
        };
        debug!(encoding = encoding.name(), "decoding listing");
        encoding
            .decode_without_bom_handling_and_without_replacement(body)
            .map(|text| text.into_owned())
            .ok_or(TreeError::Decode {
                encoding: encoding.name(),
            })
    }

    /// Split into lines, keeping each line's terminator. `\n`, `\r\n` and a
    /// lone `\r` all end a line.
    pub fn split_lines(text: &str) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;
        let mut chars = text.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            let end = match c {
                '\n' => idx + 1,
                '\r' => match chars.next_if(|&(_, next)| next == '\n') {
                    Some((lf, _)) => lf + 1,
                    None => idx + 1,
                },
                _ => continue,
            };
            lines.push(text[start..end].to_owned());
            start = end;
        }
        if start < text.len() {
            lines.push(text[start..].to_owned());
        }
        lines
    }

    pub fn try_read_lines(
        path: &Path,
        detector: &dyn EncodingDetector,
        sample_bytes: usize,
    ) -> Result<Vec<String>> {
        let bytes = fs::read(path).map_err(|source| TreeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let text = decode_bytes(&bytes, detector, sample_bytes)?;
        Ok(split_lines(&text))
    }

    /// Like [`try_read_lines`], but any failure is logged and yields no lines.
    pub fn read_lines(path: &Path, detector: &dyn EncodingDetector, sample_bytes: usize) -> Vec<String> {
        match try_read_lines(path, detector, sample_bytes) {
            Ok(lines) => lines,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not load listing");
                Vec::new()
            }
        }
    }

}

pub mod parser {
    //! Tree-printed text to [`FolderNode`].
    //!
    //! Depth comes from the width of the leading glyph run (`│`, `├`, `─`, `└`,
    //! space), one level per `indent_width` characters. Assembly keeps a stack of
    //! open folders indexed by depth, so every entry attaches to the folder most
    //! recently opened one level above it.

    use crate::core::{FolderNode, LineRecord};
    use crate::decode::{
        DEFAULT_SAMPLE_BYTES, EncodingDetector, StatisticalDetector, read_lines, split_lines,
        try_read_lines,
    };
    use crate::error::{Result, TreeError};
    use nom::{IResult, bytes::complete::take_while, error::VerboseError};
    use serde::{Deserialize, Serialize};
    use std::path::Path;
    use tracing::{debug, trace};

    pub const UNICODE_GLYPHS: [char; 5] = [' ', '│', '├', '─', '└'];
    /// Glyphs of `tree --charset=ascii` and Windows `tree /A`.
    pub const ASCII_GLYPHS: [char; 5] = ['|', '+', '-', '\\', '`'];

    /// Layout of the listing around and inside the entry lines.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct ParseOptions {
        /// Lines before the first entry (the title line of `tree`).
        pub header_lines: usize,
        /// Lines after the last entry (blank line plus the summary).
        pub footer_lines: usize,
        /// Glyph characters per nesting level.
        pub indent_width: usize,
        /// Bytes handed to encoding detection.
        pub sample_bytes: usize,
        /// Also treat ASCII connectors as indentation.
        pub ascii_glyphs: bool,
    }

    impl Default for ParseOptions {
        fn default() -> Self {
            Self {
                header_lines: 1,
                footer_lines: 2,
                indent_width: 4,
                sample_bytes: DEFAULT_SAMPLE_BYTES,
                ascii_glyphs: false,
            }
        }
    }

    impl ParseOptions {
        pub fn validate(&self) -> Result<()> {
            if self.indent_width == 0 {
                return Err(TreeError::Config("indent_width must be at least 1".into()));
            }
            Ok(())
        }

        fn is_glyph(&self, c: char) -> bool {
            UNICODE_GLYPHS.contains(&c) || (self.ascii_glyphs && ASCII_GLYPHS.contains(&c))
        }
    }

    /* ------------------------ Public entry points ------------------------ */

    /// Parse every line of a listing, decoration included.
    pub fn parse_lines<S: AsRef<str>>(lines: &[S], options: &ParseOptions) -> Result<FolderNode> {
        let body = strip_decoration(lines, options);
        let records = calculate_depths(body, options)?;
        let root = build_tree(&records)?;
        debug!(
            entries = records.len(),
            top_level = root.len(),
            "parsed listing"
        );
        Ok(root)
    }

    pub fn parse_str(text: &str, options: &ParseOptions) -> Result<FolderNode> {
        parse_lines(&split_lines(text), options)
    }

    /// Loads a listing file into a tree.
    pub trait ListingParser {
        fn parse_file(&self, path: &Path) -> Result<FolderNode>;
    }

    /// File-backed parser: detect encoding, decode, then [`parse_lines`].
    ///
    /// Through [`ListingParser::parse_file`], unreadable or undecodable files
    /// produce an empty tree and only malformed structure is reported;
    /// [`TreeTextParser::try_parse_file`] reports both.
    #[derive(Debug, Clone)]
    pub struct TreeTextParser<D = StatisticalDetector> {
        pub options: ParseOptions,
        detector: D,
    }

    impl TreeTextParser {
        pub fn new(options: ParseOptions) -> Self {
            Self {
                options,
                detector: StatisticalDetector,
            }
        }
    }

    impl<D: EncodingDetector> TreeTextParser<D> {
        pub fn with_detector(options: ParseOptions, detector: D) -> Self {
            Self { options, detector }
        }

        /// Like [`ListingParser::parse_file`], but read and decode failures
        /// are returned instead of yielding an empty tree.
        pub fn try_parse_file(&self, path: &Path) -> Result<FolderNode> {
            let lines = try_read_lines(path, &self.detector, self.options.sample_bytes)?;
            parse_lines(&lines, &self.options)
        }
    }

    impl<D: EncodingDetector> ListingParser for TreeTextParser<D> {
        fn parse_file(&self, path: &Path) -> Result<FolderNode> {
            let lines = read_lines(path, &self.detector, self.options.sample_bytes);
            parse_lines(&lines, &self.options)
        }
    }

    /* ------------------------------- Stages ------------------------------- */

    /// Drop the header and footer. Too few lines leaves nothing.
    pub fn strip_decoration<'a, S>(lines: &'a [S], options: &ParseOptions) -> &'a [S] {
        let end = lines.len().saturating_sub(options.footer_lines);
        let start = options.header_lines.min(end);
        &lines[start..end]
    }

    /// Measure each entry line. Expects lines with the header already removed;
    /// line numbers are reported relative to the original file.
    pub fn calculate_depths<S: AsRef<str>>(
        lines: &[S],
        options: &ParseOptions,
    ) -> Result<Vec<LineRecord>> {
        options.validate()?;
        let mut records = Vec::with_capacity(lines.len());

        for (idx, raw) in lines.iter().enumerate() {
            let line_number = options.header_lines + idx + 1;
            let line = raw.as_ref().replace('\u{a0}', " ");
            let (rest, indent) = indentation(options, &line).map_err(|_| TreeError::Structure {
                line: line_number,
                message: "unreadable indentation".into(),
            })?;

            let text = strip_terminator(rest).trim();
            if text.is_empty() {
                trace!(line = line_number, "skipping blank line");
                continue;
            }

            let width = indent.chars().count();
            if width < options.indent_width {
                return Err(TreeError::Structure {
                    line: line_number,
                    message: format!(
                        "{text:?} is indented {width} characters, less than one level ({})",
                        options.indent_width
                    ),
                });
            }

            records.push(LineRecord {
                text: text.to_string(),
                depth: width / options.indent_width - 1,
                line_number,
            });
        }

        Ok(records)
    }

    /// Assemble records (in listing order) into a tree.
    pub fn build_tree(records: &[LineRecord]) -> Result<FolderNode> {
        let mut root = FolderNode::new();
        // open[d] is the folder most recently seen at depth d.
        let mut open: Vec<(String, FolderNode)> = Vec::new();

        for record in records {
            if record.depth > open.len() {
                return Err(TreeError::Structure {
                    line: record.line_number,
                    message: format!(
                        "{:?} is at depth {} but no entry at depth {} precedes it",
                        record.text,
                        record.depth,
                        record.depth - 1
                    ),
                });
            }
            close_to(&mut open, &mut root, record.depth);
            open.push((record.text.clone(), FolderNode::new()));
        }
        close_to(&mut open, &mut root, 0);

        Ok(root)
    }

    /// Attach open folders to their parents until `depth` remain open.
    fn close_to(open: &mut Vec<(String, FolderNode)>, root: &mut FolderNode, depth: usize) {
        while open.len() > depth {
            let Some((name, node)) = open.pop() else {
                break;
            };
            let parent = match open.last_mut() {
                Some((_, parent)) => parent,
                None => &mut *root,
            };
            if parent.insert(name.clone(), node).is_some() {
                debug!(name = %name, "duplicate entry replaced an earlier sibling");
            }
        }
    }

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    fn indentation<'a>(options: &ParseOptions, line: &'a str) -> PResult<'a, &'a str> {
        take_while(|c: char| options.is_glyph(c))(line)
    }

    fn strip_terminator(s: &str) -> &str {
        let s = s.strip_suffix('\n').unwrap_or(s);
        s.strip_suffix('\r').unwrap_or(s)
    }

}

pub mod format {
    //! [`FolderNode`] back to tree-printed text, in the layout the parser reads
    //! with default [`ParseOptions`](crate::parser::ParseOptions).

    use crate::core::FolderNode;

    pub fn format_tree(root: &FolderNode, header: &str) -> String {
        let mut out = String::new();
        out.push_str(header);
        out.push('\n');
        write_children(&mut out, root, "");

        let total = root.descendant_count();
        out.push('\n');
        out.push_str(&format!(
            "{total} {}\n",
            if total == 1 { "entry" } else { "entries" }
        ));
        out
    }

    fn write_children(out: &mut String, folder: &FolderNode, prefix: &str) {
        let count = folder.len();
        for (idx, (name, child)) in folder.iter().enumerate() {
            let last = idx + 1 == count;
            out.push_str(prefix);
            out.push_str(if last { "└── " } else { "├── " });
            out.push_str(name);
            out.push('\n');
            if child.has_children() {
                let nested = format!("{prefix}{}", if last { "    " } else { "│   " });
                write_children(out, child, &nested);
            }
        }
    }

}

pub mod browser {
    //! Navigation state over one loaded tree.

    use crate::core::{Entry, FolderNode, NavPath};
    use crate::error::Result;
    use crate::parser::ListingParser;
    use std::{io, path::Path};
    use tracing::{debug, info, warn};

    /// Draws the listing of the current folder. Called after every state change.
    pub trait ListingView {
        fn render(&mut self, path: &NavPath, entries: &[Entry]) -> io::Result<()>;
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct BrowserSession {
        root: FolderNode,
        path: NavPath,
    }

    impl BrowserSession {
        pub fn new(root: FolderNode) -> Self {
            Self {
                root,
                path: NavPath::root(),
            }
        }

        pub fn empty() -> Self {
            Self::default()
        }

        pub fn root(&self) -> &FolderNode {
            &self.root
        }

        pub fn path(&self) -> &NavPath {
            &self.path
        }

        pub fn is_at_root(&self) -> bool {
            self.path.is_root()
        }

        /// Replace the tree and return to its root.
        pub fn load(&mut self, root: FolderNode) {
            self.root = root;
            self.path = NavPath::root();
        }

        /// Parse `path` and load it. On error the current tree and path stay.
        pub fn load_file(&mut self, path: &Path, parser: &dyn ListingParser) -> Result<()> {
            let root = parser.parse_file(path)?;
            info!(
                path = %path.display(),
                top_level = root.len(),
                entries = root.descendant_count(),
                "loaded listing"
            );
            self.load(root);
            Ok(())
        }

        pub fn current_folder(&self) -> Result<&FolderNode> {
            self.root.resolve(self.path.segments())
        }

        pub fn list_entries(&self) -> Vec<Entry> {
            match self.current_folder() {
                Ok(folder) => folder.entries(),
                Err(err) => {
                    warn!(path = %self.path, error = %err, "current path does not resolve");
                    Vec::new()
                }
            }
        }

        /// Enter `name` if it is a folder with children. Returns whether the path moved.
        pub fn descend(&mut self, name: &str) -> bool {
            let enterable = self
                .current_folder()
                .ok()
                .and_then(|folder| folder.get(name))
                .is_some_and(FolderNode::has_children);
            if enterable {
                self.path.push(name);
            } else {
                debug!(name, "not descending into leaf or missing entry");
            }
            enterable
        }

        /// Leave the current folder. Returns false at the root.
        pub fn go_up(&mut self) -> bool {
            self.path.pop().is_some()
        }

        pub fn render(&self, view: &mut dyn ListingView) -> io::Result<()> {
            view.render(&self.path, &self.list_entries())
        }
    }

}

pub mod settings {
    //! Layered settings: defaults, `tree-browser.toml` (or an explicit file),
    //! then `TREE_BROWSER__SECTION__KEY` environment variables.

    use crate::error::{Result, TreeError};
    use crate::logging::LoggingConfig;
    use crate::parser::ParseOptions;
    use ::config::{Config, Environment, File};
    use serde::{Deserialize, Serialize};
    use std::path::Path;

    pub const CONFIG_FILE: &str = "tree-browser.toml";
    pub const ENV_PREFIX: &str = "TREE_BROWSER";

    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Settings {
        pub parse: ParseOptions,
        pub logging: LoggingConfig,
    }

    impl Settings {
        /// An explicit file must exist; the default one is optional.
        pub fn load(explicit: Option<&Path>) -> Result<Self> {
            let file = match explicit {
                Some(path) => File::from(path).required(true),
                None => File::from(Path::new(CONFIG_FILE)).required(false),
            };
            let settings: Settings = Config::builder()
                .add_source(file)
                .add_source(
                    Environment::with_prefix(ENV_PREFIX)
                        .separator("__")
                        .try_parsing(true),
                )
                .build()
                .and_then(|built| built.try_deserialize())
                .map_err(|e| TreeError::Config(e.to_string()))?;
            settings.parse.validate()?;
            Ok(settings)
        }
    }

}

pub mod logging {
    //! `tracing` subscriber setup. Output goes to stderr so listings on stdout
    //! stay clean.

    use crate::error::{Result, TreeError};
    use serde::{Deserialize, Serialize};
    use tracing_subscriber::EnvFilter;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct LoggingConfig {
        /// Filter directive used when `RUST_LOG` is unset, e.g. `warn` or `tree_browser=debug`.
        pub level: String,
        pub format: LogFormat,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: "warn".into(),
                format: LogFormat::Text,
            }
        }
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum LogFormat {
        #[default]
        Text,
        Json,
    }

    /// Install the global subscriber. `verbose` forces debug level.
    pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<()> {
        let filter = build_env_filter(config, verbose)?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false);

        let installed = match config.format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Text => builder.try_init(),
        };
        installed.map_err(|e| TreeError::Config(format!("failed to install log subscriber: {e}")))
    }

    fn build_env_filter(config: &LoggingConfig, verbose: bool) -> Result<EnvFilter> {
        if verbose {
            return Ok(EnvFilter::new("debug"));
        }
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&config.level)
            .map_err(|e| TreeError::Config(format!("invalid log level {:?}: {e}", config.level)))
    }
}

pub use crate::browser::{BrowserSession, ListingView};
pub use crate::core::{Entry, FolderNode, NavPath};
pub use crate::error::{Result, TreeError};
pub use crate::format::format_tree;
pub use crate::parser::{ListingParser, ParseOptions, TreeTextParser, parse_lines, parse_str};
