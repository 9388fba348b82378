use std::fs;
use std::path::Path;

use encoding_rs::Encoding;
use pretty_assertions::assert_eq;
use tree_browser::decode::EncodingDetector;
use tree_browser::{
    BrowserSession, Entry, FolderNode, ListingParser, ParseOptions, TreeTextParser, TreeError,
};

const LISTING: &str = "\
.
├── A
│   ├── B
│   └── C
└── D

1 directory, 3 files
";

fn tree(json: &str) -> FolderNode {
    serde_json::from_str(json).expect("tree json")
}

fn entry(name: &str, has_children: bool) -> Entry {
    Entry {
        name: name.to_string(),
        has_children,
    }
}

fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write listing");
    path
}

/// Always claims UTF-8, so malformed bytes surface as a decode failure.
struct AlwaysUtf8;

impl EncodingDetector for AlwaysUtf8 {
    fn detect(&self, _sample: &[u8]) -> &'static Encoding {
        encoding_rs::UTF_8
    }
}

#[test]
fn loads_and_navigates_sample_listing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write(tmp.path(), "listing.txt", LISTING.as_bytes());
    let parser = TreeTextParser::new(ParseOptions::default());

    let mut session = BrowserSession::empty();
    session.load_file(&path, &parser).expect("load");

    assert_eq!(session.root(), &tree(r#"{"A": {"B": {}, "C": {}}, "D": {}}"#));
    assert_eq!(
        session.list_entries(),
        vec![entry("A", true), entry("D", false)]
    );

    assert!(session.descend("A"));
    assert_eq!(
        session.list_entries(),
        vec![entry("B", false), entry("C", false)]
    );

    assert!(session.go_up());
    assert_eq!(session.list_entries().len(), 2);
}

#[test]
fn undecodable_file_loads_as_empty_tree() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write(tmp.path(), "broken.txt", b"title\n\xC3\x28\xC3\x28 bad\n\nsummary\n");
    let parser = TreeTextParser::with_detector(ParseOptions::default(), AlwaysUtf8);

    let root = parser.parse_file(&path).expect("decode failure is not an error");
    assert_eq!(root, FolderNode::new());

    let mut session = BrowserSession::empty();
    session.load_file(&path, &parser).expect("load");
    assert!(session.list_entries().is_empty());
}

#[test]
fn missing_file_loads_as_empty_tree() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let parser = TreeTextParser::new(ParseOptions::default());
    let root = parser
        .parse_file(&tmp.path().join("never-written.txt"))
        .expect("read failure is not an error");
    assert!(root.is_empty());
}

#[test]
fn utf16_listing_with_bom() {
    let text = ".\n├── 文档\n│   └── 报告.docx\n└── 图片\n\n1 directory, 2 files\n";
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));

    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write(tmp.path(), "utf16.txt", &bytes);
    let root = TreeTextParser::new(ParseOptions::default())
        .parse_file(&path)
        .expect("parse");
    assert_eq!(root, tree(r#"{"文档": {"报告.docx": {}}, "图片": {}}"#));
}

#[test]
fn malformed_listing_keeps_previous_tree() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let good = write(tmp.path(), "good.txt", LISTING.as_bytes());
    let bad = write(
        tmp.path(),
        "bad.txt",
        ".\n├── A\n│   │   └── orphan\n\n0 directories\n".as_bytes(),
    );
    let parser = TreeTextParser::new(ParseOptions::default());

    let mut session = BrowserSession::empty();
    session.load_file(&good, &parser).expect("load good");
    session.descend("A");

    let err = session.load_file(&bad, &parser).unwrap_err();
    assert!(matches!(err, TreeError::Structure { line: 3, .. }), "{err}");
    assert_eq!(session.path().to_string(), "/A");
    assert_eq!(session.list_entries().len(), 2);
}

#[test]
fn reloading_replaces_tree_and_resets_path() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let first = write(tmp.path(), "first.txt", LISTING.as_bytes());
    let second = write(
        tmp.path(),
        "second.txt",
        ".\n└── only\n    └── child\n\n1 directory, 1 file\n".as_bytes(),
    );
    let parser = TreeTextParser::new(ParseOptions::default());

    let mut session = BrowserSession::empty();
    session.load_file(&first, &parser).expect("first");
    session.descend("A");
    session.load_file(&second, &parser).expect("second");

    assert!(session.is_at_root());
    assert_eq!(session.list_entries(), vec![entry("only", true)]);
}

#[test]
fn descend_into_leaf_or_absent_is_noop() {
    let mut session = BrowserSession::new(tree(r#"{"A": {"B": {}}, "D": {}}"#));
    let before = session.list_entries();

    assert!(!session.descend("D"));
    assert!(!session.descend("nope"));
    assert!(session.is_at_root());
    assert_eq!(session.list_entries(), before);
}
