use crate::error::Error;
use std::{collections::BTreeMap, path::Path};
use tracing::debug;

const PALETTE: [u32; 50] = [
    0x5548f8ff, 0xa515beff, 0x2dc305ff, 0x61458dff, 0x042547ff, 0x89561cff, 0x8c1e2fff,
    0xe44999ff, 0xaa9310ff, 0x09bf77ff, 0xafd032ff, 0x9638c3ff, 0x943e08ff, 0x386136ff,
    0x4110fbff, 0x02d97cff, 0xc67c67ff, 0x9d84e3ff, 0x886350ff, 0xe31f15ff, 0xbf6989ff,
    0x662f8eff, 0x268a06ff, 0x8a743dff, 0xc78f49ff, 0xbcbc6dff, 0x242b25ff, 0xc953a5ff,
    0x7d710cff, 0x4d150bff, 0x95394cff, 0x782907ff, 0x87f257ff, 0x20a9fbff, 0x7dd89bff,
    0x3e2097ff, 0xe5e002ff, 0xeb3353ff, 0x101681ff, 0x5467dbff, 0x520f53ff, 0xe2a4afff,
    0x295e74ff, 0x43d4e3ff, 0xe1ae0dff, 0x3d2e5dff, 0x883a17ff, 0x7e42d8ff, 0xfb04a4ff,
    0xf04c61ff,
];

pub const UNKNOWN_NAME: &str = "unknown";
pub const UNKNOWN_COLOR: u32 = 0x000000ff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub index: u32,
    pub name: String,
    pub color: u32,
}

#[derive(serde::Deserialize)]
struct JsonLabel {
    id: u32,
    label: String,
    color: String,
}

/// Index to name and display color mapping for classes or keypoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: BTreeMap<u32, Label>,
}

impl LabelTable {
    /// Load labels from a file path, or parse `source` itself when it is not a path to a file.
    pub fn load(source: &str) -> Result<Self, Error> {
        let path = Path::new(source);
        if path.is_file() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| Error::ReadLabels(e, path.to_path_buf()))?;
            Self::parse(&content)
        } else {
            Self::parse(source)
        }
    }

    /// Parse a JSON array of `{id, label, color}` objects, falling back to one label per line.
    pub fn parse(content: &str) -> Result<Self, Error> {
        if content.trim().is_empty() {
            return Err(Error::EmptyLabels);
        }
        match serde_json::from_str::<Vec<JsonLabel>>(content) {
            Ok(entries) => Self::from_json_entries(entries),
            Err(e) => {
                debug!(message = "falling back to plain text labels", error = %e);
                Self::parse_plain_text(content)
            }
        }
    }

    fn from_json_entries(entries: Vec<JsonLabel>) -> Result<Self, Error> {
        let labels = entries
            .into_iter()
            .map(|JsonLabel { id, label, color }| {
                let color = parse_color(&color)?;
                Ok((
                    id,
                    Label {
                        index: id,
                        name: label,
                        color,
                    },
                ))
            })
            .collect::<Result<_, Error>>()?;
        Ok(Self { labels })
    }

    fn parse_plain_text(content: &str) -> Result<Self, Error> {
        let mut labels = BTreeMap::new();
        let mut index = 0u32;
        for line in content.lines().map(str::trim_end) {
            if line.is_empty() {
                continue;
            }
            if line.contains("(structure)") {
                return Err(Error::DeprecatedLabelFormat);
            }
            let color = PALETTE[index as usize % PALETTE.len()];
            labels.insert(
                index,
                Label {
                    index,
                    name: line.to_owned(),
                    color,
                },
            );
            index += 1;
        }
        Ok(Self { labels })
    }

    pub fn get(&self, index: u32) -> Option<&Label> {
        self.labels.get(&index)
    }

    pub fn name(&self, index: u32) -> &str {
        self.get(index)
            .map(|label| label.name.as_str())
            .unwrap_or(UNKNOWN_NAME)
    }

    pub fn color(&self, index: u32) -> u32 {
        self.get(index).map_or(UNKNOWN_COLOR, |label| label.color)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn parse_color(hex: &str) -> Result<u32, Error> {
    let digits = hex
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .trim_start_matches('#');
    u32::from_str_radix(digits, 16).map_err(|_| Error::ParseLabelColor(hex.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parse_tests {
        use super::*;

        #[test]
        fn plain_text_skips_empty_lines() {
            let table = LabelTable::parse("person\n\nbicycle\r\ncar\n").unwrap();
            assert_eq!(table.len(), 3);
            assert_eq!(table.name(0), "person");
            assert_eq!(table.name(1), "bicycle");
            assert_eq!(table.name(2), "car");
            assert_eq!(table.color(0), PALETTE[0]);
            assert_eq!(table.color(2), PALETTE[2]);
        }

        #[test]
        fn plain_text_palette_wraps() {
            let content = (0..52).map(|i| format!("class{}\n", i)).collect::<String>();
            let table = LabelTable::parse(&content).unwrap();
            assert_eq!(table.color(50), PALETTE[0]);
            assert_eq!(table.color(51), PALETTE[1]);
        }

        #[test]
        fn json_labels() {
            let content = r#"[
                {"id": 0, "label": "nose", "color": "0xff0000ff"},
                {"id": 5, "label": "left shoulder", "color": "00ff00ff"}
            ]"#;
            let table = LabelTable::parse(content).unwrap();
            assert_eq!(table.len(), 2);
            assert_eq!(table.name(5), "left shoulder");
            assert_eq!(table.color(0), 0xff0000ff);
            assert_eq!(table.color(5), 0x00ff00ff);
        }

        #[test]
        fn json_with_bad_color() {
            let content = r#"[{"id": 0, "label": "nose", "color": "red"}]"#;
            assert!(matches!(
                LabelTable::parse(content),
                Err(Error::ParseLabelColor(_))
            ));
        }

        #[test]
        fn deprecated_structure_format() {
            let content = "(structure)\"person,id=(uint)0\"\n";
            assert!(matches!(
                LabelTable::parse(content),
                Err(Error::DeprecatedLabelFormat)
            ));
        }

        #[test]
        fn empty_source() {
            assert!(matches!(LabelTable::parse(" \n"), Err(Error::EmptyLabels)));
        }
    }

    mod lookup_tests {
        use super::*;

        #[test]
        fn unknown_index() {
            let table = LabelTable::parse("person\n").unwrap();
            assert_eq!(table.name(7), UNKNOWN_NAME);
            assert_eq!(table.color(7), UNKNOWN_COLOR);
        }

        #[test]
        fn load_reads_files() {
            let path = std::env::temp_dir().join(format!(
                "ml-postprocess-labels-{}.txt",
                std::process::id()
            ));
            std::fs::write(&path, "cat\ndog\n").unwrap();
            let table = LabelTable::load(path.to_str().unwrap()).unwrap();
            std::fs::remove_file(&path).unwrap();
            assert_eq!(table.name(1), "dog");
        }

        #[test]
        fn load_falls_back_to_inline_content() {
            let table = LabelTable::load("cat\ndog\n").unwrap();
            assert_eq!(table.name(0), "cat");
        }
    }
}
