// Indent table — nominal nesting depth of each MusicXML element.
//
// The interpreter never sees closing tags; it infers them from depth alone.
// That works because, within the subset of MusicXML the tokenizer keeps, each
// element name appears at one fixed depth under `score-partwise`. A tag at a
// depth no greater than the top of the open stack closes everything down to
// (and including) the element at that depth.
//
// The built-in table covers the partwise elements the tokenizer keeps. A JSON
// object `{"tag-name": depth}` may replace it for a different subset.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{Error, Result};

/// Spaces per depth level in emitted markup.
pub const INDENT_WIDTH: usize = 4;

/// Depths of the kept MusicXML elements, grouped by level.
const MUSICXML_DEPTHS: &[(u32, &[&str])] = &[
    (0, &["score-partwise"]),
    (
        1,
        &[
            "work",
            "movement-number",
            "movement-title",
            "identification",
            "defaults",
            "credit",
            "part-list",
            "part",
        ],
    ),
    (
        2,
        &[
            "work-number",
            "work-title",
            "creator",
            "rights",
            "encoding",
            "scaling",
            "page-layout",
            "system-layout",
            "credit-words",
            "score-part",
            "part-group",
            "measure",
        ],
    ),
    (
        3,
        &[
            "software",
            "encoding-date",
            "supports",
            "millimeters",
            "tenths",
            "part-name",
            "part-abbreviation",
            "score-instrument",
            "midi-instrument",
            "attributes",
            "note",
            "backup",
            "forward",
            "direction",
            "barline",
            "harmony",
            "print",
            "sound",
        ],
    ),
    (
        4,
        &[
            "instrument-name",
            "midi-channel",
            "midi-program",
            "volume",
            "pan",
            "divisions",
            "key",
            "time",
            "clef",
            "staves",
            "transpose",
            "pitch",
            "rest",
            "unpitched",
            "duration",
            "voice",
            "type",
            "dot",
            "accidental",
            "stem",
            "notehead",
            "beam",
            "notations",
            "lyric",
            "tie",
            "chord",
            "grace",
            "cue",
            "time-modification",
            "staff",
            "direction-type",
            "offset",
            "bar-style",
            "repeat",
            "ending",
            "root",
            "kind",
            "bass",
            "degree",
        ],
    ),
    (
        5,
        &[
            "fifths",
            "mode",
            "cancel",
            "beats",
            "beat-type",
            "sign",
            "line",
            "clef-octave-change",
            "diatonic",
            "chromatic",
            "octave-change",
            "step",
            "alter",
            "octave",
            "display-step",
            "display-octave",
            "actual-notes",
            "normal-notes",
            "normal-type",
            "tied",
            "slur",
            "tuplet",
            "articulations",
            "ornaments",
            "technical",
            "dynamics",
            "fermata",
            "arpeggiate",
            "syllabic",
            "text",
            "extend",
            "words",
            "wedge",
            "metronome",
            "rehearsal",
            "segno",
            "coda",
            "pedal",
            "octave-shift",
            "dashes",
            "root-step",
            "root-alter",
            "bass-step",
            "bass-alter",
        ],
    ),
    (
        6,
        &[
            "accent",
            "strong-accent",
            "staccato",
            "staccatissimo",
            "tenuto",
            "breath-mark",
            "caesura",
            "trill-mark",
            "turn",
            "mordent",
            "inverted-mordent",
            "tremolo",
            "wavy-line",
            "up-bow",
            "down-bow",
            "fingering",
            "string",
            "fret",
            "harmonic",
            "beat-unit",
            "beat-unit-dot",
            "per-minute",
            "p",
            "pp",
            "ppp",
            "mp",
            "mf",
            "f",
            "ff",
            "fff",
            "sf",
            "sfz",
            "fp",
            "rf",
        ],
    ),
];

/// Element name → depth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndentTable {
    depths: BTreeMap<String, u32>,
}

impl Default for IndentTable {
    fn default() -> Self {
        Self::musicxml()
    }
}

impl IndentTable {
    /// The built-in MusicXML partwise table.
    pub fn musicxml() -> Self {
        let depths = MUSICXML_DEPTHS
            .iter()
            .flat_map(|&(depth, names)| names.iter().map(move |name| (name.to_string(), depth)))
            .collect();
        Self { depths }
    }

    pub fn from_depths(depths: BTreeMap<String, u32>) -> Self {
        Self { depths }
    }

    /// Load a `{"tag-name": depth}` JSON object.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let depths: BTreeMap<String, u32> = serde_json::from_reader(reader)?;
        if depths.is_empty() {
            return Err(Error::invalid("indent table", "no entries"));
        }
        Ok(Self { depths })
    }

    pub fn depth(&self, tag_name: &str) -> Option<u32> {
        self.depths.get(tag_name).copied()
    }

    /// Depth scaled to a column count.
    pub fn indent(&self, tag_name: &str) -> Result<usize> {
        self.depth(tag_name)
            .map(|depth| depth as usize * INDENT_WIDTH)
            .ok_or_else(|| Error::MissingIndent(tag_name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.depths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn builtin_table_has_one_depth_per_name() {
        let mut seen = BTreeSet::new();
        for (_, names) in MUSICXML_DEPTHS {
            for name in *names {
                assert!(seen.insert(*name), "{name} listed twice");
            }
        }
        assert_eq!(IndentTable::musicxml().len(), seen.len());
    }

    #[test]
    fn scales_depths() {
        let table = IndentTable::musicxml();
        assert_eq!(table.indent("score-partwise").unwrap(), 0);
        assert_eq!(table.indent("part").unwrap(), 4);
        assert_eq!(table.indent("measure").unwrap(), 8);
        assert_eq!(table.indent("note").unwrap(), 12);
        assert_eq!(table.indent("pitch").unwrap(), 16);
        assert_eq!(table.indent("step").unwrap(), 20);
        assert!(matches!(
            table.indent("glissando"),
            Err(Error::MissingIndent(name)) if name == "glissando"
        ));
    }

    #[test]
    fn loads_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indents.json");
        std::fs::write(&path, r#"{"root": 0, "leaf": 3}"#).unwrap();
        let table = IndentTable::load(&path).unwrap();
        assert_eq!(table.indent("leaf").unwrap(), 12);
        assert_eq!(table.depth("note"), None);

        std::fs::write(&path, "{}").unwrap();
        assert!(IndentTable::load(&path).is_err());
        std::fs::write(&path, r#"{"root": -1}"#).unwrap();
        assert!(matches!(IndentTable::load(&path), Err(Error::Json(_))));
    }
}
