//! Manifest targets: one delegate per `[[targets]]` entry, rendering Rust
//! constants from the fetched sources.

use std::fmt::Write as _;
use std::path::PathBuf;

use codeupdater_core::{CodeUpdater, IntermediateData, Update, UpdaterDelegate, UpdaterManager};
use codeupdater_shared::{
    AppConfig, BoxError, Result, SourceFormat, TargetEntry, identifier_from_path,
};
use codeupdater_sources::{CsvOptions, CsvTable, UnicodeData};
use url::Url;

/// Bytes per line in rendered byte arrays.
const BYTES_PER_LINE: usize = 12;

/// Register every manifest target with `manager`.
pub(crate) fn register(manager: &mut UpdaterManager, config: &AppConfig) {
    let marker = config.output.comment_marker.as_str();
    for entry in &config.targets {
        let settings = TargetSettings::from_entry(entry);
        let updater: Box<dyn Update> = match entry.format {
            SourceFormat::Bytes => {
                Box::new(CodeUpdater::new(BytesTarget(settings)).with_comment_marker(marker))
            }
            SourceFormat::Text => {
                Box::new(CodeUpdater::new(TextTarget(settings)).with_comment_marker(marker))
            }
            SourceFormat::Csv => {
                Box::new(CodeUpdater::new(CsvTarget(settings)).with_comment_marker(marker))
            }
            SourceFormat::UnicodeData => {
                Box::new(CodeUpdater::new(UnicodeDataTarget(settings)).with_comment_marker(marker))
            }
        };
        manager.add(updater);
    }
}

// ---------------------------------------------------------------------------
// Target settings
// ---------------------------------------------------------------------------

/// Resolved settings of one manifest target.
#[derive(Debug, Clone)]
pub(crate) struct TargetSettings {
    id: String,
    sources: Vec<Url>,
    destination: PathBuf,
    const_name: String,
    has_header: bool,
}

impl TargetSettings {
    fn from_entry(entry: &TargetEntry) -> Self {
        let id = entry
            .id
            .clone()
            .unwrap_or_else(|| identifier_from_path(&entry.destination));
        let const_name = entry
            .const_name
            .clone()
            .unwrap_or_else(|| const_name_for(&id));
        Self {
            id,
            sources: entry.sources.clone(),
            destination: entry.destination.clone(),
            const_name,
            has_header: entry.has_header,
        }
    }

    fn open(&self, ty: &str) -> String {
        format!("pub const {}: {ty} = &[\n", self.const_name)
    }
}

/// `scripts-table` → `SCRIPTS_TABLE`.
fn const_name_for(identifier: &str) -> String {
    let mut name: String = identifier
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

macro_rules! settings_delegate {
    ($target:ident) => {
        pub(crate) struct $target(TargetSettings);

        impl $target {
            fn settings(&self) -> &TargetSettings {
                &self.0
            }
        }
    };
}

settings_delegate!(BytesTarget);
settings_delegate!(TextTarget);
settings_delegate!(CsvTarget);
settings_delegate!(UnicodeDataTarget);

macro_rules! settings_accessors {
    () => {
        fn identifier(&self) -> String {
            self.settings().id.clone()
        }

        fn source_urls(&self) -> Vec<Url> {
            self.settings().sources.clone()
        }

        fn destination(&self) -> PathBuf {
            self.settings().destination.clone()
        }
    };
}

// ---------------------------------------------------------------------------
// Delegates
// ---------------------------------------------------------------------------

impl UpdaterDelegate for BytesTarget {
    type Intermediate = Vec<u8>;

    settings_accessors!();

    fn convert(&self, data: Vec<IntermediateData<Vec<u8>>>) -> std::result::Result<Vec<u8>, BoxError> {
        let mut out = self.settings().open("&[&[u8]]");
        for item in &data {
            writeln!(out, "    // {}", item.source_url)?;
            out.push_str("    &[\n");
            for chunk in item.content.chunks(BYTES_PER_LINE) {
                let line: Vec<String> = chunk.iter().map(|b| format!("0x{b:02x}")).collect();
                writeln!(out, "        {},", line.join(", "))?;
            }
            out.push_str("    ],\n");
        }
        out.push_str("];\n");
        Ok(out.into_bytes())
    }
}

impl UpdaterDelegate for TextTarget {
    type Intermediate = String;

    settings_accessors!();

    fn convert(&self, data: Vec<IntermediateData<String>>) -> std::result::Result<Vec<u8>, BoxError> {
        let mut out = self.settings().open("&[&str]");
        for item in &data {
            writeln!(out, "    {:?},", item.content)?;
        }
        out.push_str("];\n");
        Ok(out.into_bytes())
    }
}

impl UpdaterDelegate for CsvTarget {
    type Intermediate = CsvTable;

    settings_accessors!();

    fn prepare(&self, url: &Url, content: Vec<u8>) -> Result<IntermediateData<CsvTable>> {
        let options = CsvOptions::default().with_header(self.settings().has_header);
        let table = CsvTable::parse(url, &content, &options)?;
        Ok(IntermediateData::new(url.clone(), table))
    }

    fn convert(&self, data: Vec<IntermediateData<CsvTable>>) -> std::result::Result<Vec<u8>, BoxError> {
        let mut out = self.settings().open("&[&[&str]]");
        for item in &data {
            for row in &item.content.rows {
                let fields: Vec<String> = row.fields().iter().map(|f| format!("{f:?}")).collect();
                writeln!(out, "    &[{}],", fields.join(", "))?;
            }
        }
        out.push_str("];\n");
        Ok(out.into_bytes())
    }
}

impl UpdaterDelegate for UnicodeDataTarget {
    type Intermediate = UnicodeData;

    settings_accessors!();

    fn convert(
        &self,
        data: Vec<IntermediateData<UnicodeData>>,
    ) -> std::result::Result<Vec<u8>, BoxError> {
        let mut out = self.settings().open("&[(u32, u32, &[&str])]");
        for item in &data {
            for (range, columns) in item.content.data_rows() {
                let columns: Vec<String> = columns.iter().map(|c| format!("{c:?}")).collect();
                writeln!(
                    out,
                    "    (0x{:04X}, 0x{:04X}, &[{}]),",
                    range.start(),
                    range.end(),
                    columns.join(", ")
                )?;
            }
        }
        out.push_str("];\n");
        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeupdater_core::{SilentProgress, UpdaterManager};
    use codeupdater_fetch::FreshnessCache;
    use codeupdater_shared::FetchConfig;
    use codeupdater_sources::FromSource;

    fn settings(id: &str) -> TargetSettings {
        TargetSettings {
            id: id.into(),
            sources: vec![],
            destination: PathBuf::from(format!("{id}.rs")),
            const_name: const_name_for(id),
            has_header: false,
        }
    }

    fn url(name: &str) -> Url {
        Url::parse(&format!("https://example.com/{name}")).unwrap()
    }

    fn render<D: UpdaterDelegate>(delegate: &D, inputs: &[(&str, &str)]) -> String {
        let data = inputs
            .iter()
            .map(|(name, content)| {
                delegate
                    .prepare(&url(name), content.as_bytes().to_vec())
                    .unwrap()
            })
            .collect();
        String::from_utf8(delegate.convert(data).unwrap()).unwrap()
    }

    #[test]
    fn const_names_are_screaming_snake_case() {
        assert_eq!(const_name_for("scripts"), "SCRIPTS");
        assert_eq!(const_name_for("bidi-class.v2"), "BIDI_CLASS_V2");
        assert_eq!(const_name_for("2024data"), "_2024DATA");
    }

    #[test]
    fn entry_identifier_defaults_to_destination_stem() {
        let entry = TargetEntry {
            id: None,
            sources: vec![url("a")],
            destination: PathBuf::from("gen/WordList.rs"),
            format: SourceFormat::Text,
            const_name: None,
            has_header: false,
        };
        let settings = TargetSettings::from_entry(&entry);
        assert_eq!(settings.id, "WordList");
        assert_eq!(settings.const_name, "WORDLIST");
    }

    #[test]
    fn text_is_rendered_as_escaped_literals() {
        let out = render(&TextTarget(settings("words")), &[("a.txt", "say \"hi\"\n")]);
        assert_eq!(out, "pub const WORDS: &[&str] = &[\n    \"say \\\"hi\\\"\\n\",\n];\n");
    }

    #[test]
    fn bytes_are_rendered_per_source() {
        let out = render(&BytesTarget(settings("raw")), &[("a.bin", "AB")]);
        assert_eq!(
            out,
            "pub const RAW: &[&[u8]] = &[\n    // https://example.com/a.bin\n    &[\n        0x41, 0x42,\n    ],\n];\n"
        );
    }

    #[test]
    fn csv_rows_skip_the_header_when_configured() {
        let mut with_header = settings("people");
        with_header.has_header = true;
        let out = render(
            &CsvTarget(with_header),
            &[("a.csv", "First,Last\nJohn,Doe\n"), ("b.csv", "Given,Family\nJane,Roe\n")],
        );
        assert_eq!(
            out,
            "pub const PEOPLE: &[&[&str]] = &[\n    &[\"John\", \"Doe\"],\n    &[\"Jane\", \"Roe\"],\n];\n"
        );
    }

    #[test]
    fn unicode_data_renders_data_rows_only() {
        let content = "# comment only\n0041..005A ; L # letters\nD800..DFFF ; Cs\n00AA ; Lo ; x\n";
        let out = render(&UnicodeDataTarget(settings("bidi")), &[("Bidi.txt", content)]);
        assert_eq!(
            out,
            "pub const BIDI: &[(u32, u32, &[&str])] = &[\n    (0x0041, 0x005A, &[\"L\"]),\n    (0xD800, 0xDFFF, &[\"Cs\"]),\n    (0x00AA, 0x00AA, &[\"Lo\", \"x\"]),\n];\n"
        );
    }

    #[test]
    fn prepare_uses_the_declared_representation() {
        let text = TextTarget(settings("t"))
            .prepare(&url("bad.txt"), vec![0xff])
            .unwrap_err();
        assert!(text.to_string().contains("cannot be converted"));

        let data = UnicodeData::from_source(&url("u.txt"), b"0041 ; L\n".to_vec()).unwrap();
        assert_eq!(data.rows.len(), 1);
    }

    #[tokio::test]
    async fn manifest_targets_generate_files_from_local_sources() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("words.txt");
        std::fs::write(&source, "alpha").unwrap();
        let source_url = Url::from_file_path(&source).unwrap();

        let manifest = dir.path().join("codeupdater.toml");
        std::fs::write(
            &manifest,
            format!(
                "[output]\ncomment_marker = \"//\"\n\n[[targets]]\nsources = [\"{source_url}\"]\ndestination = \"gen/words.rs\"\nformat = \"text\"\n"
            ),
        )
        .unwrap();

        let config = codeupdater_shared::load_config(Some(&manifest)).unwrap();
        let mut manager = UpdaterManager::default();
        register(&mut manager, &config);

        let cache = FreshnessCache::with_config(&FetchConfig::from(&config)).unwrap();
        let summary = manager.run(&cache, &SilentProgress).await.unwrap();
        assert_eq!(summary.written, 1);

        let generated = std::fs::read_to_string(dir.path().join("gen/words.rs")).unwrap();
        assert!(generated.contains(&format!("// URL: {source_url}")));
        assert!(generated.ends_with("pub const WORDS: &[&str] = &[\n    \"alpha\",\n];\n"));
    }
}
