//! Workbook container access.
//!
//! An `.xlsx` file is a zip archive of XML parts. [`WorkbookPackage`] opens the archive, reads
//! the sheet list and date system from `xl/workbook.xml`, and maps each sheet to its worksheet
//! part through `xl/_rels/workbook.xml.rels`.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quick_xml::Reader;
use quick_xml::events::Event;
use zip::ZipArchive;
use zip::read::ZipFile;

use crate::error::{IngestionError, IngestionResult};

use super::decode::DateSystem;
use super::shared_strings::SharedStrings;
use super::styles::{StyleTable, attr};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const STYLES_PART: &str = "xl/styles.xml";

/// Where workbook bytes come from.
#[derive(Clone)]
pub enum SheetSource {
    /// A file on disk.
    Path(PathBuf),
    /// An in-memory copy of the file.
    Bytes(Arc<[u8]>),
}

impl fmt::Debug for SheetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSource::Path(p) => f.debug_tuple("Path").field(p).finish(),
            SheetSource::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
        }
    }
}

impl fmt::Display for SheetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSource::Path(p) => write!(f, "{}", p.display()),
            SheetSource::Bytes(b) => write!(f, "<memory: {} bytes>", b.len()),
        }
    }
}

impl From<&str> for SheetSource {
    fn from(p: &str) -> Self {
        SheetSource::Path(PathBuf::from(p))
    }
}

impl From<String> for SheetSource {
    fn from(p: String) -> Self {
        SheetSource::Path(PathBuf::from(p))
    }
}

impl From<PathBuf> for SheetSource {
    fn from(p: PathBuf) -> Self {
        SheetSource::Path(p)
    }
}

impl From<&Path> for SheetSource {
    fn from(p: &Path) -> Self {
        SheetSource::Path(p.to_path_buf())
    }
}

impl From<&PathBuf> for SheetSource {
    fn from(p: &PathBuf) -> Self {
        SheetSource::Path(p.clone())
    }
}

impl From<Vec<u8>> for SheetSource {
    fn from(bytes: Vec<u8>) -> Self {
        SheetSource::Bytes(bytes.into())
    }
}

impl From<Arc<[u8]>> for SheetSource {
    fn from(bytes: Arc<[u8]>) -> Self {
        SheetSource::Bytes(bytes)
    }
}

pub(crate) trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

impl SheetSource {
    /// Check the source exists and is non-empty without opening the archive.
    pub(crate) fn validate(&self) -> IngestionResult<()> {
        let len = match self {
            SheetSource::Path(p) => std::fs::metadata(p)?.len(),
            SheetSource::Bytes(b) => b.len() as u64,
        };
        if len == 0 {
            return Err(IngestionError::configuration(format!("source is empty: {self}")));
        }
        Ok(())
    }

    fn open(&self) -> IngestionResult<Box<dyn ReadSeek>> {
        Ok(match self {
            SheetSource::Path(p) => Box::new(BufReader::new(File::open(p)?)),
            SheetSource::Bytes(b) => Box::new(Cursor::new(Arc::clone(b))),
        })
    }
}

/// Which sheet of a workbook to read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SheetSelection {
    /// The first sheet in workbook order.
    #[default]
    First,
    /// The sheet with this name.
    Named(String),
    /// The sheet at this 0-based position in workbook order.
    Index(usize),
}

impl fmt::Display for SheetSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelection::First => f.write_str("<first>"),
            SheetSelection::Named(name) => f.write_str(name),
            SheetSelection::Index(i) => write!(f, "#{i}"),
        }
    }
}

impl From<&str> for SheetSelection {
    fn from(name: &str) -> Self {
        SheetSelection::Named(name.to_string())
    }
}

/// A sheet listed in the workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    /// Archive path of the worksheet part, e.g. `xl/worksheets/sheet1.xml`.
    pub part: String,
}

/// An opened workbook archive.
pub struct WorkbookPackage {
    archive: ZipArchive<Box<dyn ReadSeek>>,
    sheets: Vec<SheetEntry>,
    date_system: DateSystem,
}

impl fmt::Debug for WorkbookPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkbookPackage")
            .field("sheets", &self.sheets)
            .field("date_system", &self.date_system)
            .finish()
    }
}

impl WorkbookPackage {
    pub fn open(source: &SheetSource) -> IngestionResult<Self> {
        let mut archive = ZipArchive::new(source.open()?)?;

        let workbook = read_part(&mut archive, WORKBOOK_PART)?.ok_or_else(|| {
            IngestionError::invalid_document(format!("missing part {WORKBOOK_PART}"))
        })?;
        let (declared, date_system) = parse_workbook(&workbook)?;
        let targets = match read_part(&mut archive, WORKBOOK_RELS_PART)? {
            Some(bytes) => parse_relationships(&bytes)?,
            None => HashMap::new(),
        };

        let sheets: Vec<SheetEntry> = declared
            .into_iter()
            .enumerate()
            .map(|(i, (name, rel_id))| {
                let part = rel_id
                    .and_then(|id| targets.get(&id))
                    .map(|target| resolve_target(target))
                    .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", i + 1));
                SheetEntry { name, part }
            })
            .collect();
        if sheets.is_empty() {
            return Err(IngestionError::invalid_document("no sheets found in workbook"));
        }

        Ok(Self {
            archive,
            sheets,
            date_system,
        })
    }

    /// Names of all parts in the archive.
    pub fn list_parts(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Stream one part's decompressed bytes.
    pub fn open_part(&mut self, name: &str) -> IngestionResult<ZipFile<'_>> {
        match self.archive.by_name(name) {
            Ok(f) => Ok(f),
            Err(zip::result::ZipError::FileNotFound) => {
                Err(IngestionError::invalid_document(format!("missing part {name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn sheets(&self) -> &[SheetEntry] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn sheet_part(&self, selection: &SheetSelection) -> IngestionResult<&SheetEntry> {
        let found = match selection {
            SheetSelection::First => self.sheets.first(),
            SheetSelection::Named(name) => self.sheets.iter().find(|s| &s.name == name),
            SheetSelection::Index(i) => self.sheets.get(*i),
        };
        found.ok_or_else(|| {
            IngestionError::invalid_document(format!(
                "sheet not found: {selection:?}. sheets={:?}",
                self.sheet_names()
            ))
        })
    }

    /// The shared string table; empty when the workbook has none.
    pub fn shared_strings(&mut self) -> IngestionResult<SharedStrings> {
        match self.archive.by_name(SHARED_STRINGS_PART) {
            Ok(f) => SharedStrings::parse(BufReader::new(f)),
            Err(zip::result::ZipError::FileNotFound) => Ok(SharedStrings::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// The style table; empty when the workbook has none.
    pub fn styles(&mut self) -> IngestionResult<StyleTable> {
        match self.archive.by_name(STYLES_PART) {
            Ok(f) => StyleTable::parse(BufReader::new(f)),
            Err(zip::result::ZipError::FileNotFound) => Ok(StyleTable::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn date_system(&self) -> DateSystem {
        self.date_system
    }
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> IngestionResult<Option<Vec<u8>>> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;
            Ok(Some(bytes))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

type DeclaredSheet = (String, Option<String>);

fn parse_workbook(xml: &[u8]) -> IngestionResult<(Vec<DeclaredSheet>, DateSystem)> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut date_system = DateSystem::V1900;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let name = attr(&e, b"name")?.ok_or_else(|| {
                        IngestionError::invalid_document("sheet element without a name")
                    })?;
                    sheets.push((name, attr(&e, b"id")?));
                }
                b"workbookPr" => {
                    if let Some(v) = attr(&e, b"date1904")? {
                        if v == "1" || v.eq_ignore_ascii_case("true") {
                            date_system = DateSystem::V1904;
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok((sheets, date_system))
}

fn parse_relationships(xml: &[u8]) -> IngestionResult<HashMap<String, String>> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut out = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, b"Id")?, attr(&e, b"Target")?) {
                    out.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Archive path of a relationship target from `xl/_rels/workbook.xml.rels`.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => {
            let mut parts: Vec<&str> = vec!["xl"];
            for seg in target.split('/') {
                match seg {
                    "" | "." => {}
                    ".." => {
                        parts.pop();
                    }
                    s => parts.push(s),
                }
            }
            parts.join("/")
        }
    }
}
