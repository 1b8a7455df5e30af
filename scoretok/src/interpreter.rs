// XML interpreter — turns a validated token stream into nested MusicXML.
//
// Tokens only ever open elements; every closing tag is inferred. The
// interpreter keeps a stack of open `(token, indent)` entries. When a new tag
// arrives at indent `d`, every open element with indent `>= d` is closed
// (deepest first) before the new one is pushed, because an element at the
// same or a shallower depth cannot be a child of them.
//
// Whitespace layout for a tag at indent `d`:
//
// - Closers are each followed by a newline. The first closer continues the
//   current line (right after the text it closes); later ones are indented to
//   their own depth.
// - If nothing was closed, a newline is emitted first.
// - Then `d` spaces and the (possibly rewritten) tag text.
//
// Text tokens are emitted verbatim right after their tag, so `<step>C` stays
// on one line and `</step>` follows it directly.
//
// A few tags are rewritten on the way out so the result is valid MusicXML:
// `<measure>` gets a running `number`, `<part>` gets a running `id` and is
// preceded by a matching `<part-list>` header, and `<beam>` gets
// `number="1"`.
//
// Streaming: every emitted fragment goes to the `Write` sink immediately.
// With a `LiveSink` attached, whenever the document so far ends in
// `</note>`, `</measure>` or `</part>`, the sink receives the document plus
// the closers that would make it well-formed at that point, so a viewer can
// follow along.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::indent::IndentTable;
use crate::merge_tree::MergeTree;
use crate::types::TokenId;
use crate::vocab::{TokenClass, tag_name};

/// XML declaration and DOCTYPE every document starts with.
pub const DOCUMENT_PROLOGUE: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
    r#"<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 3.1 Partwise//EN" "#,
    r#""http://www.musicxml.org/dtds/partwise.dtd">"#,
);

/// Receives well-formed snapshots of a document in progress.
pub trait LiveSink {
    /// `document` is everything emitted so far; `closers` completes it.
    fn snapshot(&mut self, document: &str, closers: &str) -> io::Result<()>;
}

/// Overwrites a file with each snapshot.
#[derive(Clone, Debug)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl LiveSink for FileSnapshot {
    fn snapshot(&mut self, document: &str, closers: &str) -> io::Result<()> {
        let mut content = String::with_capacity(document.len() + closers.len());
        content.push_str(document);
        content.push_str(closers);
        fs::write(&self.path, content)
    }
}

/// Keeps every snapshot in memory.
impl LiveSink for Vec<String> {
    fn snapshot(&mut self, document: &str, closers: &str) -> io::Result<()> {
        self.push(format!("{document}{closers}"));
        Ok(())
    }
}

/// Closers that complete a document ending at a note, measure or part
/// boundary.
fn live_closers(document: &str) -> Option<&'static str> {
    if document.ends_with("</note>") {
        Some("</measure></part></score-partwise>")
    } else if document.ends_with("</measure>") {
        Some("</part></score-partwise>")
    } else if document.ends_with("</part>") {
        Some("</score-partwise>")
    } else {
        None
    }
}

/// `<part-list>` header for part `id`, emitted just before `<part id="P{id}">`.
fn part_list(id: u32) -> String {
    format!(
        "<part-list>\n        \
         <score-part id=\"P{id}\">\n            \
         <part-name>Part</part-name>\n            \
         <part-abbreviation>Part</part-abbreviation>\n            \
         <score-instrument id=\"P{id}-I{id}\">\n                \
         <instrument-name>Part</instrument-name>\n            \
         </score-instrument>\n        \
         </score-part>\n    \
         </part-list>\n    "
    )
}

#[derive(Clone, Copy, Debug)]
struct OpenTag {
    token: TokenId,
    indent: usize,
}

/// One decoding session's reconstruction state.
pub struct Interpreter<'t, W: Write> {
    tree: &'t MergeTree,
    indents: &'t IndentTable,
    start_token: TokenId,
    started: bool,
    stack: Vec<OpenTag>,
    measure_counter: u32,
    part_counter: u32,
    document: String,
    out: W,
    live: Option<Box<dyn LiveSink + 't>>,
}

impl<'t, W: Write> Interpreter<'t, W> {
    /// `start_token` is interpreted implicitly before the first real token.
    pub fn new(tree: &'t MergeTree, indents: &'t IndentTable, start_token: TokenId, out: W) -> Self {
        Self {
            tree,
            indents,
            start_token,
            started: false,
            stack: Vec::new(),
            measure_counter: 0,
            part_counter: 0,
            document: DOCUMENT_PROLOGUE.to_string(),
            out,
            live: None,
        }
    }

    pub fn with_live_sink(mut self, sink: impl LiveSink + 't) -> Self {
        self.live = Some(Box::new(sink));
        self
    }

    /// Everything emitted so far, prologue included.
    pub fn document(&self) -> &str {
        &self.document
    }

    /// Number of currently open elements.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Interpret one (possibly composite) token.
    pub fn consume(&mut self, id: TokenId) -> Result<()> {
        if !self.started {
            self.started = true;
            self.interpret(self.start_token)?;
        }
        self.interpret(id)
    }

    /// Close every open element and return the finished document.
    pub fn finish(mut self) -> Result<String> {
        if !self.started {
            self.started = true;
            self.interpret(self.start_token)?;
        }
        self.close_open_tags(None)?;
        self.out.flush()?;
        Ok(self.document)
    }

    fn interpret(&mut self, id: TokenId) -> Result<()> {
        for base in self.tree.translate(id)? {
            self.interpret_base(base)?;
        }
        Ok(())
    }

    fn interpret_base(&mut self, id: TokenId) -> Result<()> {
        let tree = self.tree;
        let text = tree.text(id).ok_or(Error::UnknownToken(id))?;
        match tree.vocab().class(id) {
            Some(TokenClass::Tag { self_closing }) => {
                let indent = self.indents.indent(tag_name(text))?;
                let closed_any = self.close_open_tags(Some(indent))?;
                if !self_closing {
                    self.stack.push(OpenTag { token: id, indent });
                }
                if !closed_any {
                    self.emit("\n")?;
                }
                self.emit(&" ".repeat(indent))?;
            }
            Some(TokenClass::Text) => {}
            // The document end is not markup; finishing is the caller's call.
            Some(TokenClass::Sentinel) => return Ok(()),
            None => return Err(Error::UnknownToken(id)),
        }
        let rewritten = self.rewrite(text)?;
        self.emit(&rewritten)
    }

    /// Pop and close every open element whose indent is at least `indent`
    /// (all of them for `None`). Returns whether anything was closed.
    fn close_open_tags(&mut self, indent: Option<usize>) -> Result<bool> {
        let mut closed_any = false;
        while let Some(&top) = self.stack.last() {
            if indent.is_some_and(|indent| indent > top.indent) {
                break;
            }
            self.stack.pop();
            if closed_any {
                self.emit(&" ".repeat(top.indent))?;
            }
            let close = self.tree.close_tag_for(top.token)?;
            self.emit(&close)?;
            self.emit("\n")?;
            closed_any = true;
        }
        Ok(closed_any)
    }

    fn rewrite(&mut self, text: &str) -> Result<String> {
        Ok(match text {
            "<measure>" => {
                self.measure_counter += 1;
                format!("<measure number=\"{}\">", self.measure_counter)
            }
            "<part>" => {
                self.part_counter += 1;
                self.emit(&part_list(self.part_counter))?;
                format!("<part id=\"P{}\">", self.part_counter)
            }
            "<beam>" => "<beam number=\"1\">".to_string(),
            other => other.to_string(),
        })
    }

    fn emit(&mut self, s: &str) -> Result<()> {
        self.out.write_all(s.as_bytes())?;
        self.document.push_str(s);
        if let Some(live) = self.live.as_mut() {
            if let Some(closers) = live_closers(&self.document) {
                live.snapshot(&self.document, closers)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::BaseVocab;
    use std::cell::RefCell;
    use std::rc::Rc;

    const TOKENS: &[&str] = &[
        "<score-partwise>",
        "<part>",
        "<measure>",
        "<note>",
        "<pitch>",
        "<step>",
        "C",
        "<octave>",
        "4",
        "<duration>",
        "<chord />",
        "<beam>",
        "begin",
        "<end>",
    ];

    fn tree(merges: Vec<((TokenId, TokenId), TokenId)>) -> MergeTree {
        let stoi = TOKENS
            .iter()
            .enumerate()
            .map(|(i, s)| (s.to_string(), i as TokenId))
            .collect();
        MergeTree::new(BaseVocab::from_stoi(stoi).unwrap(), merges).unwrap()
    }

    fn id(text: &str) -> TokenId {
        TOKENS.iter().position(|t| *t == text).unwrap() as TokenId
    }

    fn run(tree: &MergeTree, texts: &[&str]) -> String {
        let indents = IndentTable::musicxml();
        let mut interp = Interpreter::new(tree, &indents, id("<score-partwise>"), Vec::new());
        for text in texts {
            interp.consume(id(text)).unwrap();
        }
        interp.finish().unwrap()
    }

    #[test]
    fn infers_closing_tags_from_depth() {
        let tree = tree(vec![]);
        let doc = run(
            &tree,
            &[
                "<part>", "<measure>", "<note>", "<pitch>", "<step>", "C", "<octave>", "4",
                "<duration>", "4", "<note>", "<chord />", "<pitch>", "<step>", "C", "<measure>",
            ],
        );

        let expected = String::new()
            + DOCUMENT_PROLOGUE
            + "\n<score-partwise>"
            + "\n    "
            + &part_list(1)
            + "<part id=\"P1\">"
            + "\n        <measure number=\"1\">"
            + "\n            <note>"
            + "\n                <pitch>"
            + "\n                    <step>C</step>\n"
            + "                    <octave>4</octave>\n"
            + "                </pitch>\n"
            + "                <duration>4</duration>\n"
            + "            </note>\n"
            + "            <note>"
            + "\n                <chord />"
            + "\n                <pitch>"
            + "\n                    <step>C</step>\n"
            + "                </pitch>\n"
            + "            </note>\n"
            + "        </measure>\n"
            + "        <measure number=\"2\">"
            + "</measure>\n"
            + "    </part>\n"
            + "</score-partwise>\n";
        assert_eq!(doc, expected);
    }

    #[test]
    fn composite_tokens_expand_before_interpretation() {
        // 14 = <step>C, 15 = <pitch><step>C
        let tree = tree(vec![((5, 6), 14), ((4, 14), 15)]);
        let composite = {
            let indents = IndentTable::musicxml();
            let mut interp = Interpreter::new(&tree, &indents, 0, Vec::new());
            for t in [id("<part>"), id("<measure>"), id("<note>"), 15] {
                interp.consume(t).unwrap();
            }
            interp.finish().unwrap()
        };
        let base = run(&tree, &["<part>", "<measure>", "<note>", "<pitch>", "<step>", "C"]);
        assert_eq!(composite, base);
    }

    #[test]
    fn rewrites_beam_and_counts_parts() {
        let tree = tree(vec![]);
        let doc = run(
            &tree,
            &["<part>", "<measure>", "<note>", "<beam>", "begin", "<part>"],
        );
        assert!(doc.contains("<beam number=\"1\">begin</beam>"));
        assert!(doc.contains("<part id=\"P1\">"));
        assert!(doc.contains("<part id=\"P2\">"));
        assert!(doc.contains("<score-part id=\"P2\">"));
        assert!(doc.contains("<score-instrument id=\"P2-I2\">"));
    }

    #[test]
    fn streams_everything_it_emits() {
        let tree = tree(vec![]);
        let indents = IndentTable::musicxml();
        let mut out = Vec::new();
        let mut interp = Interpreter::new(&tree, &indents, 0, &mut out);
        interp.consume(id("<part>")).unwrap();
        interp.consume(id("<measure>")).unwrap();
        let doc = interp.finish().unwrap();
        let streamed = String::from_utf8(out).unwrap();
        assert_eq!(format!("{DOCUMENT_PROLOGUE}{streamed}"), doc);
    }

    #[test]
    fn live_snapshots_are_well_formed_at_boundaries() {
        #[derive(Clone, Default)]
        struct Shared(Rc<RefCell<Vec<String>>>);
        impl LiveSink for Shared {
            fn snapshot(&mut self, document: &str, closers: &str) -> io::Result<()> {
                self.0.borrow_mut().snapshot(document, closers)
            }
        }

        let tree = tree(vec![]);
        let indents = IndentTable::musicxml();
        let shared = Shared::default();
        let mut interp =
            Interpreter::new(&tree, &indents, 0, io::sink()).with_live_sink(shared.clone());
        for text in ["<part>", "<measure>", "<note>", "<duration>", "4", "<note>"] {
            interp.consume(id(text)).unwrap();
        }

        let snapshots = shared.0.borrow();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].ends_with("</note></measure></part></score-partwise>"));
        drop(snapshots);

        interp.consume(id("<measure>")).unwrap();
        let snapshots = shared.0.borrow();
        assert!(snapshots.iter().any(|s| s.ends_with("</measure></part></score-partwise>")));
    }

    #[test]
    fn file_snapshot_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.xml");
        let mut sink = FileSnapshot::new(&path);
        sink.snapshot("<a>", "</a>").unwrap();
        sink.snapshot("<b>", "</b>").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "<b></b>");
    }

    #[test]
    fn unknown_tag_depth_is_an_error() {
        let stoi = [("<score-partwise>", 0), ("<glissando>", 1), ("<end>", 2)]
            .into_iter()
            .map(|(s, i)| (s.to_string(), i))
            .collect();
        let tree = MergeTree::new(BaseVocab::from_stoi(stoi).unwrap(), vec![]).unwrap();
        let indents = IndentTable::musicxml();
        let mut interp = Interpreter::new(&tree, &indents, 0, Vec::new());
        assert!(matches!(interp.consume(1), Err(Error::MissingIndent(name)) if name == "glissando"));
    }

    #[test]
    fn sentinel_emits_nothing() {
        let tree = tree(vec![]);
        let indents = IndentTable::musicxml();
        let mut interp = Interpreter::new(&tree, &indents, 0, Vec::new());
        interp.consume(id("<part>")).unwrap();
        let before = interp.document().len();
        interp.consume(id("<end>")).unwrap();
        assert_eq!(interp.document().len(), before);
        assert_eq!(interp.depth(), 2);
    }
}
